//! Settlement of pending selections against market results.
//!
//! Results come from a `ResultSource`: a local JSON file in the exchange's
//! `listMarketBook` shape, or the exchange itself. Updates are conditional on
//! the stored row still being pending, so re-running never re-applies P&L.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::{FetchError, StoreResult};
use crate::store::{decimal, ItemPatch, RecordKey, ScanFilter, Selection, SelectionStore};
use crate::types::{BetType, Outcome};

/// Markets per listMarketBook request.
const MARKET_BATCH: usize = 5;

/// Runner status as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunnerStatus {
    Winner,
    Loser,
    Removed,
    Active,
    /// Any status this crate does not act on.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerResult {
    pub selection_id: u64,
    pub status: RunnerStatus,
    #[serde(default)]
    pub last_price_traded: Option<f64>,
    #[serde(default)]
    pub runner_name: Option<String>,
    /// Finished in the each-way places.
    #[serde(default)]
    pub placed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketResult {
    pub market_id: String,
    #[serde(default)]
    pub runners: Vec<RunnerResult>,
}

impl MarketResult {
    pub fn runner(&self, selection_id: u64) -> Option<&RunnerResult> {
        self.runners.iter().find(|r| r.selection_id == selection_id)
    }

    pub fn winner(&self) -> Option<&RunnerResult> {
        self.runners
            .iter()
            .find(|r| r.status == RunnerStatus::Winner)
    }
}

/// Where settled market results come from.
pub trait ResultSource {
    fn market_results(&self, market_ids: &[String]) -> Result<Vec<MarketResult>, FetchError>;

    /// Whether runners carry each-way placings.
    fn reports_placings(&self) -> bool {
        true
    }
}

// ==================== File source ====================

/// Results read from a JSON array of market books.
pub struct FileResultSource {
    path: PathBuf,
}

impl FileResultSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ResultSource for FileResultSource {
    fn market_results(&self, market_ids: &[String]) -> Result<Vec<MarketResult>, FetchError> {
        let content = fs::read_to_string(&self.path)
            .map_err(|e| FetchError::Unavailable(format!("{}: {}", self.path.display(), e)))?;
        let markets: Vec<MarketResult> =
            serde_json::from_str(&content).map_err(|e| FetchError::Malformed(e.to_string()))?;

        Ok(markets
            .into_iter()
            .filter(|m| market_ids.contains(&m.market_id))
            .collect())
    }
}

// ==================== Exchange source ====================

/// Exchange `listMarketBook` over a pre-authenticated session.
///
/// Win-market books carry no placings, so each-way losers cannot be settled
/// from this source.
pub struct BetfairResultSource {
    client: reqwest::blocking::Client,
    base_url: String,
    app_key: String,
    session_token: String,
}

impl BetfairResultSource {
    pub fn new(
        base_url: &str,
        app_key: &str,
        session_token: &str,
        timeout_secs: u64,
    ) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            app_key: app_key.to_string(),
            session_token: session_token.to_string(),
        })
    }
}

impl ResultSource for BetfairResultSource {
    fn market_results(&self, market_ids: &[String]) -> Result<Vec<MarketResult>, FetchError> {
        let endpoint = format!("{}/listMarketBook/", self.base_url);
        let payload = serde_json::json!({
            "marketIds": market_ids,
            "priceProjection": { "priceData": ["SP_TRADED", "EX_TRADED"] },
        });

        let response = self
            .client
            .post(&endpoint)
            .header("X-Application", &self.app_key)
            .header("X-Authentication", &self.session_token)
            .header("Accept", "application/json")
            .json(&payload)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }

        response
            .json()
            .map_err(|e| FetchError::Malformed(e.to_string()))
    }

    fn reports_placings(&self) -> bool {
        false
    }
}

// ==================== Settlement ====================

/// Settlement parameters.
#[derive(Debug, Clone)]
pub struct SettleOptions {
    /// Time after the off before a race is eligible.
    pub delay: Duration,
    pub place_fraction: f64,
}

impl SettleOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            delay: Duration::minutes(config.settlement.settle_delay_mins),
            place_fraction: config.settlement.place_fraction,
        }
    }
}

impl Default for SettleOptions {
    fn default() -> Self {
        Self {
            delay: Duration::minutes(60),
            place_fraction: 0.2,
        }
    }
}

/// Counters for one settlement pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SettlementSummary {
    pub markets_checked: usize,
    pub markets_failed: usize,
    pub settled: usize,
    pub wins: usize,
    pub placed: usize,
    pub losses: usize,
    pub voided: usize,
    /// Each-way losers left pending for want of placings.
    pub awaiting_placings: usize,
    /// Settled market ids, for the track-insights updater.
    pub settled_markets: Vec<String>,
    /// Race days touched by this pass.
    pub settled_dates: BTreeSet<NaiveDate>,
    /// Net P&L over rows settled in this pass.
    pub profit_loss: Decimal,
}

/// Outcome and profit/loss of one bet.
///
/// Win bets lose on a placing. Each-way bets split the stake in halves; the
/// place half pays `(odds - 1) * place_fraction`.
pub fn settle_bet(
    bet_type: BetType,
    stake: Decimal,
    odds: Decimal,
    won: bool,
    placed: bool,
    place_fraction: Decimal,
) -> (Outcome, Decimal) {
    let profit = odds - Decimal::ONE;
    let (outcome, pl) = match bet_type {
        BetType::Win if won => (Outcome::Win, stake * profit),
        BetType::Win => (Outcome::Loss, -stake),
        BetType::EachWay => {
            let half = stake / Decimal::TWO;
            let place_return = half * profit * place_fraction;
            if won {
                (Outcome::Win, half * profit + place_return)
            } else if placed {
                (Outcome::Placed, place_return - half)
            } else {
                (Outcome::Loss, -stake)
            }
        }
    };
    (outcome, pl.round_dp(2))
}

fn patch_for(
    selection: &Selection,
    runner: &RunnerResult,
    winner_name: Option<&str>,
    place_fraction: Decimal,
    now: DateTime<Utc>,
) -> Option<ItemPatch> {
    let final_odds = runner
        .last_price_traded
        .filter(|p| p.is_finite() && *p > 1.0)
        .map(decimal)
        .or(selection.odds);

    let mut patch = ItemPatch {
        final_odds,
        actual_winner: winner_name.map(str::to_string),
        result_captured_at: Some(now),
        require_pending: true,
        ..Default::default()
    };

    match runner.status {
        RunnerStatus::Winner | RunnerStatus::Loser => {
            let won = runner.status == RunnerStatus::Winner;
            let odds = final_odds.unwrap_or(Decimal::ONE);
            let (outcome, pl) = settle_bet(
                selection.bet_type,
                selection.stake,
                odds,
                won,
                runner.placed,
                place_fraction,
            );
            patch.outcome = Some(outcome);
            patch.profit_loss = Some(pl);
        }
        RunnerStatus::Removed => {
            patch.outcome = Some(Outcome::Void);
            patch.profit_loss = Some(Decimal::ZERO);
            patch.show_in_ui = Some(false);
            patch.recommended_bet = Some(false);
        }
        RunnerStatus::Active | RunnerStatus::Other => return None,
    }
    Some(patch)
}

/// Settle every pending selection whose race went off at least `delay` ago.
///
/// Only a failure to read pending rows is an error. A failed result fetch or a
/// failed row update is logged and left for the next run.
pub fn settle(
    store: &dyn SelectionStore,
    source: &dyn ResultSource,
    opts: &SettleOptions,
    now: DateTime<Utc>,
) -> StoreResult<SettlementSummary> {
    let pending = store.scan_selections(&ScanFilter::selections().pending())?;

    let mut by_market: BTreeMap<String, Vec<Selection>> = BTreeMap::new();
    for selection in pending {
        if now - selection.race_time >= opts.delay {
            by_market
                .entry(selection.market_id.clone())
                .or_default()
                .push(selection);
        }
    }

    let mut summary = SettlementSummary::default();
    if by_market.is_empty() {
        info!("No pending selections ready for settlement");
        return Ok(summary);
    }

    let place_fraction = decimal(opts.place_fraction);
    let market_ids: Vec<String> = by_market.keys().cloned().collect();

    for batch in market_ids.chunks(MARKET_BATCH) {
        let results = match source.market_results(batch) {
            Ok(results) => results,
            Err(e) => {
                warn!("Result fetch failed for markets {:?}: {}", batch, e);
                summary.markets_failed += batch.len();
                continue;
            }
        };

        for market in results {
            let Some(selections) = by_market.get(&market.market_id) else {
                continue;
            };
            summary.markets_checked += 1;

            let winner_name = market.winner().and_then(|w| {
                selections
                    .iter()
                    .find(|s| s.selection_id == w.selection_id)
                    .map(|s| s.horse.clone())
                    .or_else(|| w.runner_name.clone())
            });

            let mut any_settled = false;
            for selection in selections {
                let Some(runner) = market.runner(selection.selection_id) else {
                    warn!(
                        "Selection {} ({}) missing from market {}",
                        selection.selection_id, selection.horse, market.market_id
                    );
                    continue;
                };
                if selection.bet_type == BetType::EachWay
                    && runner.status == RunnerStatus::Loser
                    && !source.reports_placings()
                {
                    warn!(
                        "No placings for market {}, leaving each-way {} pending",
                        market.market_id, selection.horse
                    );
                    summary.awaiting_placings += 1;
                    continue;
                }
                let Some(patch) =
                    patch_for(selection, runner, winner_name.as_deref(), place_fraction, now)
                else {
                    debug!("Market {} not settled yet for {}", market.market_id, selection.horse);
                    continue;
                };

                let key = RecordKey::new(selection.bet_date.to_string(), selection.bet_id.clone());
                match store.update_item(&key, &patch) {
                    Ok(true) => {
                        any_settled = true;
                        summary.settled_dates.insert(selection.bet_date);
                        summary.settled += 1;
                        summary.profit_loss += patch.profit_loss.unwrap_or_default();
                        match patch.outcome {
                            Some(Outcome::Win) => summary.wins += 1,
                            Some(Outcome::Placed) => summary.placed += 1,
                            Some(Outcome::Loss) => summary.losses += 1,
                            Some(Outcome::Void) => summary.voided += 1,
                            _ => {}
                        }
                    }
                    Ok(false) => debug!("{} already settled", selection.bet_id),
                    Err(e) => warn!("Failed to settle {}: {}", selection.bet_id, e),
                }
            }

            if any_settled {
                summary.settled_markets.push(market.market_id.clone());
            }
        }
    }

    info!(
        "Settled {} selections across {} markets ({} wins, {} failed fetches)",
        summary.settled,
        summary.settled_markets.len(),
        summary.wins,
        summary.markets_failed
    );
    Ok(summary)
}

#[cfg(test)]
pub(crate) mod stub {
    use super::*;

    /// Result source serving fixed markets, or failing.
    pub struct FixedResults(pub Option<Vec<MarketResult>>);

    impl ResultSource for FixedResults {
        fn market_results(&self, market_ids: &[String]) -> Result<Vec<MarketResult>, FetchError> {
            match &self.0 {
                Some(markets) => Ok(markets
                    .iter()
                    .filter(|m| market_ids.contains(&m.market_id))
                    .cloned()
                    .collect()),
                None => Err(FetchError::Timeout),
            }
        }
    }

    /// Fixed markets from a source that only knows win markets.
    pub struct WinMarketOnly(pub FixedResults);

    impl ResultSource for WinMarketOnly {
        fn market_results(&self, market_ids: &[String]) -> Result<Vec<MarketResult>, FetchError> {
            self.0.market_results(market_ids)
        }

        fn reports_placings(&self) -> bool {
            false
        }
    }

    pub fn runner(selection_id: u64, status: RunnerStatus, price: Option<f64>) -> RunnerResult {
        RunnerResult {
            selection_id,
            status,
            last_price_traded: price,
            runner_name: None,
            placed: false,
        }
    }
}
