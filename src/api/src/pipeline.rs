//! Named entry points: scoring, settlement and learning passes.
//!
//! Each pass reads what it needs from the store, computes, and writes back.
//! Only a store that cannot be read aborts a pass.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{info, warn};

use crate::adjuster::{apply_report, AdjustOutcome};
use crate::calibration::{calibrate, CalibrationReport};
use crate::config::AppConfig;
use crate::error::StoreResult;
use crate::features::{horse_history, infer_going, track_view, WeatherSource};
use crate::insights::update_track_insights;
use crate::scoring::{pick_race, PickOptions, ScoringContext, WeightCache, WeightVector};
use crate::settlement::{settle, ResultSource, SettleOptions, SettlementSummary};
use crate::store::{decimal, ItemPatch, Record, RecordKey, Selection, SelectionStore, TrackInsight};
use crate::types::{BetType, Outcome, RaceCard, RaceSnapshot};

/// Settled winners needed before today's average replaces the default.
const MIN_WINNERS_FOR_AVERAGE: usize = 3;

/// Parameters of a scoring pass.
#[derive(Debug, Clone)]
pub struct ScoringOptions {
    pub default_avg_winner_odds: f64,
    pub stake: Decimal,
    pub bet_type: BetType,
    pub lookback_days: i64,
}

impl ScoringOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_avg_winner_odds: config.scoring.avg_winner_odds,
            stake: decimal(config.settlement.stake),
            bet_type: config.settlement.bet_type,
            lookback_days: config.weather.lookback_days,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoringSummary {
    pub races: usize,
    pub runners: usize,
    pub analyzed: usize,
    pub picks: usize,
    pub recommended: usize,
    pub too_close_to_call: usize,
    pub failed_validation: usize,
    pub written: usize,
    /// Rows left alone because they were already settled.
    pub kept_settled: usize,
    /// Pending rows hidden because their runner left the snapshot.
    pub withdrawn: usize,
    pub write_failures: usize,
}

/// Surfaced picks at `course` already settled as winners.
pub fn course_winners_today(today: &[Selection], course: &str) -> u32 {
    today
        .iter()
        .filter(|s| s.show_in_ui && s.course == course && s.outcome == Outcome::Win)
        .count() as u32
}

/// Mean final odds of today's winners, or `default` with too few of them.
pub fn average_winner_odds(today: &[Selection], default: f64) -> f64 {
    let odds: Vec<f64> = today
        .iter()
        .filter(|s| s.outcome == Outcome::Win)
        .filter_map(|s| s.effective_odds())
        .collect();
    if odds.len() < MIN_WINNERS_FOR_AVERAGE {
        default
    } else {
        odds.iter().sum::<f64>() / odds.len() as f64
    }
}

fn build_context(
    store: &dyn SelectionStore,
    race: &RaceCard,
    today: &[Selection],
    weights: &WeightVector,
    weather: Option<&dyn WeatherSource>,
    opts: &ScoringOptions,
) -> ScoringContext {
    let date = race.start_time.date_naive();
    let history = race
        .runners
        .iter()
        .filter(|r| r.is_scorable())
        .map(|r| (r.name.clone(), horse_history(store, &r.name)))
        .collect();

    ScoringContext {
        weights: weights.clone(),
        going: infer_going(
            &race.course,
            date,
            race.going.as_deref(),
            weather,
            opts.lookback_days,
        ),
        track: track_view(store, date, &race.course),
        avg_winner_odds: average_winner_odds(today, opts.default_avg_winner_odds),
        course_winners_today: course_winners_today(today, &race.course),
        history,
    }
}

/// Score every race in a snapshot and persist one Selection per runner.
pub fn run_scoring_pass(
    store: &dyn SelectionStore,
    snapshot: &RaceSnapshot,
    weights: &WeightVector,
    weather: Option<&dyn WeatherSource>,
    opts: &ScoringOptions,
    now: DateTime<Utc>,
) -> StoreResult<ScoringSummary> {
    let mut summary = ScoringSummary::default();
    let mut days: BTreeMap<NaiveDate, Vec<Selection>> = BTreeMap::new();
    let pick_opts = PickOptions {
        stake: opts.stake,
        bet_type: opts.bet_type,
        analyzed_at: now,
    };

    for race in &snapshot.races {
        let date = race.start_time.date_naive();
        if !days.contains_key(&date) {
            days.insert(date, store.selections_for_date(date)?);
        }
        let today = days.get(&date).map(Vec::as_slice).unwrap_or_default();
        let settled_ids: BTreeSet<&str> = today
            .iter()
            .filter(|s| !s.outcome.is_pending())
            .map(|s| s.bet_id.as_str())
            .collect();

        let ctx = build_context(store, race, today, weights, weather, opts);
        let decision = pick_race(race, &ctx, &pick_opts);

        summary.races += 1;
        summary.runners += decision.selections.len();
        summary.analyzed += decision.validation.analyzed_count;
        if decision.is_skipped() {
            summary.too_close_to_call += 1;
        }
        if !decision.validation.passed() {
            summary.failed_validation += 1;
        }
        if let Some(pick) = decision.pick() {
            summary.picks += 1;
            if pick.recommended_bet {
                summary.recommended += 1;
                info!(
                    "Pick: {} {} - {} ({:.0}, {})",
                    race.start_time.format("%H:%M"),
                    race.course,
                    pick.horse,
                    pick.score,
                    pick.tier.as_str()
                );
            }
        }

        let current_ids: BTreeSet<&str> = decision
            .selections
            .iter()
            .map(|s| s.bet_id.as_str())
            .collect();
        let hide = ItemPatch {
            show_in_ui: Some(false),
            recommended_bet: Some(false),
            require_pending: true,
            ..Default::default()
        };
        for stale in today.iter().filter(|s| {
            s.market_id == race.market_id
                && s.outcome.is_pending()
                && (s.show_in_ui || s.recommended_bet)
                && !current_ids.contains(s.bet_id.as_str())
        }) {
            let key = RecordKey::new(stale.bet_date.to_string(), stale.bet_id.clone());
            match store.update_item(&key, &hide) {
                Ok(true) => {
                    summary.withdrawn += 1;
                    info!(
                        "Withdrawn: {} {} - {}",
                        race.start_time.format("%H:%M"),
                        race.course,
                        stale.horse
                    );
                }
                Ok(false) => {}
                Err(e) => {
                    summary.write_failures += 1;
                    warn!(
                        "Failed to hide {} ({}, market {}): {}",
                        stale.bet_id, race.course, race.market_id, e
                    );
                }
            }
        }

        for selection in &decision.selections {
            if settled_ids.contains(selection.bet_id.as_str()) {
                summary.kept_settled += 1;
                continue;
            }
            match store.put_item(&Record::Selection(selection.clone())) {
                Ok(()) => summary.written += 1,
                Err(e) => {
                    summary.write_failures += 1;
                    warn!(
                        "Failed to write {} ({}, market {}): {}",
                        selection.bet_id, race.course, race.market_id, e
                    );
                }
            }
        }
    }

    info!(
        "Scored {} races: {} picks, {} recommended, {} too close to call",
        summary.races, summary.picks, summary.recommended, summary.too_close_to_call
    );
    Ok(summary)
}

/// Settle ready selections, then fold the results into track insights.
pub fn run_settlement_pass(
    store: &dyn SelectionStore,
    source: &dyn ResultSource,
    opts: &SettleOptions,
    now: DateTime<Utc>,
) -> StoreResult<(SettlementSummary, Vec<TrackInsight>)> {
    let summary = settle(store, source, opts, now)?;

    let mut insights = Vec::new();
    for date in &summary.settled_dates {
        insights.extend(update_track_insights(store, *date, now)?);
    }
    Ok((summary, insights))
}

/// Calibrate, write the report, and apply it to the weights.
pub fn run_learning_pass(
    store: &dyn SelectionStore,
    cache: Option<&WeightCache>,
    window_days: i64,
    report_path: &Path,
    archive_dir: Option<&Path>,
    now: DateTime<Utc>,
) -> anyhow::Result<(CalibrationReport, AdjustOutcome)> {
    let report = calibrate(store, window_days, now)?;
    report.write(report_path, archive_dir)?;
    let outcome = apply_report(store, cache, &report, now)?;
    Ok((report, outcome))
}
