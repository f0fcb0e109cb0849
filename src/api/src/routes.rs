//! Read-only API route handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::StoreError;
use crate::performance::{summarize, BetResult};
use crate::scoring::{load_weight_record, Factor, WeightVector};
use crate::store::{Selection, SelectionStore, SqliteStore};

/// Application state shared across handlers.
pub struct AppState {
    pub store: Mutex<SqliteStore>,
}

impl AppState {
    pub fn new(store: SqliteStore) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }
}

// ==================== Responses ====================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct PicksResponse {
    pub date: NaiveDate,
    pub count: usize,
    pub picks: Vec<Selection>,
}

#[derive(Debug, Serialize)]
pub struct ResultsResponse {
    pub date: NaiveDate,
    pub results: Vec<BetResult>,
    pub bets: usize,
    pub wins: usize,
    pub pending: usize,
    pub total_staked: Decimal,
    pub total_returned: Decimal,
    pub profit_loss: Decimal,
    pub roi: f64,
}

#[derive(Debug, Serialize)]
pub struct WeightsResponse {
    pub weights: BTreeMap<Factor, i64>,
    pub last_report_fingerprint: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

// ==================== Errors ====================

/// Error type for API handlers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        tracing::warn!("Store error serving request: {}", e);
        Self::internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.status.to_string(),
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request(format!("Invalid date '{}', expected YYYY-MM-DD", raw)))
}

fn visible_picks(state: &AppState, date: NaiveDate) -> Result<PicksResponse, ApiError> {
    let store = state.store.lock().unwrap_or_else(|e| e.into_inner());
    let mut picks: Vec<Selection> = store
        .selections_for_date(date)?
        .into_iter()
        .filter(|s| s.show_in_ui)
        .collect();
    picks.sort_by(|a, b| a.race_time.cmp(&b.race_time).then(a.bet_id.cmp(&b.bet_id)));

    Ok(PicksResponse {
        date,
        count: picks.len(),
        picks,
    })
}

// ==================== Handlers ====================

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// UI-visible picks for today.
pub async fn picks_today(State(state): State<Arc<AppState>>) -> Result<Json<PicksResponse>, ApiError> {
    visible_picks(&state, Utc::now().date_naive()).map(Json)
}

/// UI-visible picks for a race day.
pub async fn picks_for_date(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> Result<Json<PicksResponse>, ApiError> {
    let date = parse_date(&date)?;
    visible_picks(&state, date).map(Json)
}

/// Settled surfaced picks for a race day with a P&L summary.
pub async fn results_for_date(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> Result<Json<ResultsResponse>, ApiError> {
    let date = parse_date(&date)?;
    let selections = {
        let store = state.store.lock().unwrap_or_else(|e| e.into_inner());
        store.selections_for_date(date)?
    };

    let report = summarize(&selections, Some(date), Some(date));
    Ok(Json(ResultsResponse {
        date,
        bets: report.num_bets,
        wins: report.num_wins,
        pending: report.pending,
        total_staked: report.total_staked,
        total_returned: report.total_returned,
        profit_loss: report.profit(),
        roi: report.roi(),
        results: report.bets,
    }))
}

/// Current weight vector.
pub async fn weights(State(state): State<Arc<AppState>>) -> Result<Json<WeightsResponse>, ApiError> {
    let record = {
        let store = state.store.lock().unwrap_or_else(|e| e.into_inner());
        load_weight_record(&*store)?
    };

    let response = match record {
        Some(record) => WeightsResponse {
            weights: WeightVector::from_map(record.weights).as_map().clone(),
            last_report_fingerprint: record.last_report_fingerprint,
            updated_at: Some(record.updated_at),
        },
        None => WeightsResponse {
            weights: WeightVector::defaults().as_map().clone(),
            last_report_fingerprint: None,
            updated_at: None,
        },
    };
    Ok(Json(response))
}

/// Build the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/picks/today", get(picks_today))
        .route("/picks/:date", get(picks_for_date))
        .route("/results/:date", get(results_for_date))
        .route("/weights", get(weights))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::save_weights;
    use crate::store::records::fixtures::selection;
    use crate::store::{decimal, Record};
    use crate::types::Outcome;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 4).unwrap()
    }

    fn state() -> Arc<AppState> {
        let store = SqliteStore::in_memory().unwrap();

        let mut pick = selection(day(), "Kempton", "Shown", "1.1");
        pick.show_in_ui = true;
        pick.recommended_bet = true;
        pick.outcome = Outcome::Win;
        pick.profit_loss = Some(decimal(120.0));
        store.put_item(&Record::Selection(pick)).unwrap();

        let hidden = selection(day(), "Kempton", "Hidden", "1.1");
        store.put_item(&Record::Selection(hidden)).unwrap();

        Arc::new(AppState::new(store))
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health().await;
        assert_eq!(body.status, "ok");
    }

    #[tokio::test]
    async fn test_picks_only_visible() {
        let Json(body) = picks_for_date(State(state()), Path("2026-02-04".to_string()))
            .await
            .unwrap();
        assert_eq!(body.count, 1);
        assert_eq!(body.picks[0].horse, "Shown");
    }

    #[tokio::test]
    async fn test_bad_date_is_rejected() {
        let err = picks_for_date(State(state()), Path("04-02-2026".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_results_summary() {
        let Json(body) = results_for_date(State(state()), Path("2026-02-04".to_string()))
            .await
            .unwrap();
        assert_eq!(body.bets, 1);
        assert_eq!(body.wins, 1);
        assert_eq!(body.profit_loss, decimal(120.0));
        assert_eq!(body.results[0].horse, "Shown");
    }

    #[tokio::test]
    async fn test_weights_defaults_then_stored() {
        let state = state();
        let Json(body) = weights(State(state.clone())).await.unwrap();
        assert_eq!(body.weights[&Factor::SweetSpot], 30);
        assert!(body.updated_at.is_none());

        let mut learned = WeightVector::defaults();
        learned.set(Factor::SweetSpot, 27);
        {
            let store = state.store.lock().unwrap();
            save_weights(&*store, &learned, Some("abc".to_string()), Utc::now()).unwrap();
        }
        let Json(body) = weights(State(state)).await.unwrap();
        assert_eq!(body.weights[&Factor::SweetSpot], 27);
        assert_eq!(body.last_report_fingerprint.as_deref(), Some("abc"));
    }
}
