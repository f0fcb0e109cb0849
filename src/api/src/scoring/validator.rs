//! Race-completeness validator.
//!
//! A race may only surface a pick when enough of the field was analyzed and
//! no last-time-out winner was left out.

use serde::{Deserialize, Serialize};

use crate::store::ValidationIssue;
use crate::types::RaceCard;

/// Fields smaller than this need near-complete coverage.
const SMALL_FIELD: usize = 6;
const REQUIRED_COVERAGE_PCT: f64 = 75.0;
const REQUIRED_COVERAGE_SMALL_FIELD_PCT: f64 = 90.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceValidation {
    pub analyzed_count: usize,
    pub total_runners: usize,
    /// Analyzed share of the field, as a percentage.
    pub coverage_pct: f64,
    pub issues: Vec<ValidationIssue>,
}

impl RaceValidation {
    pub fn passed(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Coverage required for a field of this size.
pub fn required_coverage(field_size: usize) -> f64 {
    if field_size < SMALL_FIELD {
        REQUIRED_COVERAGE_SMALL_FIELD_PCT
    } else {
        REQUIRED_COVERAGE_PCT
    }
}

/// Check a race before any pick from it is made visible.
pub fn validate_race(race: &RaceCard) -> RaceValidation {
    let total_runners = race.field_size();
    let analyzed_count = race.runners.iter().filter(|r| r.is_scorable()).count();
    let coverage_pct = if total_runners == 0 {
        0.0
    } else {
        analyzed_count as f64 / total_runners as f64 * 100.0
    };

    let mut issues = Vec::new();
    let required_pct = required_coverage(total_runners);
    if coverage_pct < required_pct {
        issues.push(ValidationIssue::Coverage {
            coverage_pct,
            required_pct,
        });
    }

    for runner in &race.runners {
        if runner.is_lto_winner() && !runner.is_scorable() {
            issues.push(ValidationIssue::UnanalyzedLtoWinner {
                horse: runner.name.clone(),
            });
        }
    }

    RaceValidation {
        analyzed_count,
        total_runners,
        coverage_pct,
        issues,
    }
}
