//! Closed-loop weight adjustment from a calibration report.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::calibration::{CalibrationReport, RATIO_HIGH, RATIO_LOW};
use crate::error::StoreResult;
use crate::scoring::{load_weight_record, save_weights, Factor, WeightCache, WeightVector};
use crate::store::{LearningArtifact, Record, SelectionStore};

/// Strongest single scaling step in either direction.
const MAX_SCALE_DOWN: f64 = 0.7;
const MAX_SCALE_UP: f64 = 1.2;
/// Overconfident bins smaller than this are left alone.
const MIN_BIN_SAMPLES_FOR_DECREMENT: usize = 10;
const FAILING_FACTOR_COUNT: usize = 3;
const FAILING_FACTOR_STEP: i64 = 2;
const TAG_WORKING_STEP: i64 = 1;

/// Result of applying one report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Adjustment {
    pub fingerprint: String,
    pub ratio: Option<f64>,
    pub changes: Vec<String>,
    pub before: WeightVector,
    pub after: WeightVector,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdjustOutcome {
    Applied(Adjustment),
    /// The report's fingerprint matches the last one applied.
    AlreadyApplied { fingerprint: String },
}

/// Scale every positive weight by `factor`, keeping an integer floor of 1.
fn scale_weights(weights: &mut WeightVector, factor: f64) {
    let scaled: Vec<(Factor, i64)> = weights
        .iter()
        .filter(|(_, w)| *w > 0)
        .map(|(f, w)| (f, ((w as f64 * factor).round() as i64).max(1)))
        .collect();
    for (factor, value) in scaled {
        weights.set(factor, value);
    }
}

/// Apply the adjustment rules to `current`. Pure.
pub fn adjust_weights(current: &WeightVector, report: &CalibrationReport) -> (WeightVector, Vec<String>) {
    let mut weights = current.clone();
    let mut changes = Vec::new();

    match report.ratio {
        Some(r) if r < RATIO_LOW => {
            let factor = r.max(MAX_SCALE_DOWN);
            scale_weights(&mut weights, factor);
            changes.push(format!(
                "Overconfident (ratio {:.3}): scaled positive weights by {:.3}",
                r, factor
            ));
        }
        Some(r) if r > RATIO_HIGH => {
            let factor = r.min(MAX_SCALE_UP);
            scale_weights(&mut weights, factor);
            changes.push(format!(
                "Underconfident (ratio {:.3}): scaled positive weights by {:.3}",
                r, factor
            ));
        }
        _ => {}
    }

    for bin in report
        .overconfident_bins()
        .filter(|b| b.sample_size >= MIN_BIN_SAMPLES_FOR_DECREMENT)
    {
        let failing: Vec<Factor> = bin
            .top_failing_factors(bin.failing_factors.len())
            .into_iter()
            .filter(|f| f.default_weight().is_some())
            .take(FAILING_FACTOR_COUNT)
            .collect();
        for factor in failing {
            let old = weights.raw(factor);
            let new = (old - FAILING_FACTOR_STEP).max(1);
            weights.set(factor, new);
            changes.push(format!(
                "Bin {} overconfident: {} {} -> {}",
                bin.label(),
                factor,
                old,
                new
            ));
        }
    }

    for tag in report.working_tags() {
        let Some(factor) = Factor::parse(tag).filter(|f| f.default_weight().is_some()) else {
            continue;
        };
        let old = weights.raw(factor);
        weights.set(factor, old + TAG_WORKING_STEP);
        changes.push(format!("Tag '{}' working: {} {} -> {}", tag, factor, old, old + TAG_WORKING_STEP));
    }

    weights.bound();
    (weights, changes)
}

/// Apply a report to the stored weights.
///
/// Re-applying the report last applied is a no-op. Otherwise the new weights
/// are persisted with the report's fingerprint, a learning artifact is
/// written and the cache is invalidated.
pub fn apply_report(
    store: &dyn SelectionStore,
    cache: Option<&WeightCache>,
    report: &CalibrationReport,
    now: DateTime<Utc>,
) -> StoreResult<AdjustOutcome> {
    let fingerprint = if report.fingerprint.is_empty() {
        report.compute_fingerprint()
    } else {
        report.fingerprint.clone()
    };

    let record = load_weight_record(store)?;
    if record
        .as_ref()
        .and_then(|r| r.last_report_fingerprint.as_deref())
        == Some(fingerprint.as_str())
    {
        info!("Report {} already applied, weights unchanged", &fingerprint[..12.min(fingerprint.len())]);
        return Ok(AdjustOutcome::AlreadyApplied { fingerprint });
    }

    let before = record
        .map(|r| WeightVector::from_map(r.weights))
        .unwrap_or_default();
    let (after, changes) = adjust_weights(&before, report);

    save_weights(store, &after, Some(fingerprint.clone()), now)?;

    let artifact = LearningArtifact {
        created_at: now,
        report_fingerprint: fingerprint.clone(),
        ratio: report.ratio,
        adjustments: changes.clone(),
        weights_before: before.as_map().clone(),
        weights_after: after.as_map().clone(),
    };
    if let Err(e) = store.put_item(&Record::LearningArtifact(artifact)) {
        warn!("Failed to write learning artifact: {}", e);
    }

    if let Some(cache) = cache {
        cache.invalidate();
    }

    info!("Applied {} weight adjustments", changes.len());
    for change in &changes {
        info!("  {}", change);
    }

    Ok(AdjustOutcome::Applied(Adjustment {
        fingerprint,
        ratio: report.ratio,
        changes,
        before,
        after,
    }))
}
