//! Records held by the Selection Store.
//!
//! The store is a single table of heterogeneous rows. Each row is one variant
//! of `Record`, discriminated by its `record_type`.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::scoring::Factor;
use crate::types::{BetType, Outcome, RaceType, Tier};

/// Partition holding configuration rows (weights, learning artifacts).
pub const CONFIG_PARTITION: &str = "CONFIG";
/// Sort key of the persisted WeightVector.
pub const WEIGHTS_KEY: &str = "SYSTEM_WEIGHTS";
pub const TRACK_INSIGHTS_PREFIX: &str = "TRACK_INSIGHTS#";
pub const LEARNING_PREFIX: &str = "LEARNING#";

/// Composite primary key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub bet_date: String,
    pub bet_id: String,
}

impl RecordKey {
    pub fn new(bet_date: impl Into<String>, bet_id: impl Into<String>) -> Self {
        Self {
            bet_date: bet_date.into(),
            bet_id: bet_id.into(),
        }
    }

    pub fn weights() -> Self {
        Self::new(CONFIG_PARTITION, WEIGHTS_KEY)
    }

    pub fn track_insight(date: NaiveDate, course: &str) -> Self {
        Self::new(date.to_string(), format!("{}{}", TRACK_INSIGHTS_PREFIX, course))
    }
}

/// Discriminator values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Selection,
    WeightVector,
    TrackInsight,
    LearningArtifact,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Selection => "selection",
            RecordType::WeightVector => "weight_vector",
            RecordType::TrackInsight => "track_insight",
            RecordType::LearningArtifact => "learning_artifact",
        }
    }
}

/// One row of the Selection Store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record_type", rename_all = "snake_case")]
pub enum Record {
    Selection(Selection),
    WeightVector(WeightRecord),
    TrackInsight(TrackInsight),
    LearningArtifact(LearningArtifact),
}

impl Record {
    pub fn key(&self) -> RecordKey {
        match self {
            Record::Selection(s) => RecordKey::new(s.bet_date.to_string(), s.bet_id.clone()),
            Record::WeightVector(_) => RecordKey::weights(),
            Record::TrackInsight(t) => RecordKey::track_insight(t.bet_date, &t.course),
            Record::LearningArtifact(a) => RecordKey::new(CONFIG_PARTITION, a.bet_id()),
        }
    }

    pub fn record_type(&self) -> RecordType {
        match self {
            Record::Selection(_) => RecordType::Selection,
            Record::WeightVector(_) => RecordType::WeightVector,
            Record::TrackInsight(_) => RecordType::TrackInsight,
            Record::LearningArtifact(_) => RecordType::LearningArtifact,
        }
    }

    /// Horse name, for selection rows.
    pub fn horse(&self) -> Option<&str> {
        match self {
            Record::Selection(s) => Some(&s.horse),
            _ => None,
        }
    }

    /// Outcome, for selection rows.
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            Record::Selection(s) => Some(s.outcome),
            _ => None,
        }
    }

    pub fn into_selection(self) -> Option<Selection> {
        match self {
            Record::Selection(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_track_insight(self) -> Option<TrackInsight> {
        match self {
            Record::TrackInsight(t) => Some(t),
            _ => None,
        }
    }

    pub fn into_weights(self) -> Option<WeightRecord> {
        match self {
            Record::WeightVector(w) => Some(w),
            _ => None,
        }
    }
}

/// Build the selection sort key from race time, course and horse.
pub fn selection_bet_id(start_time: DateTime<Utc>, course: &str, horse: &str) -> String {
    format!(
        "{}_{}_{}",
        start_time.format("%Y-%m-%dT%H:%M:%SZ"),
        course,
        horse.trim().replace(' ', "_")
    )
}

/// Convert a float to a decimal attribute.
pub fn decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

// ==================== Selection ====================

/// Why a runner could not be scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Omission {
    MissingOdds,
    MissingForm,
    MissingOddsAndForm,
}

impl Omission {
    pub fn reason(&self) -> &'static str {
        match self {
            Omission::MissingOdds => "Not scored: no odds available",
            Omission::MissingForm => "Not scored: no form string",
            Omission::MissingOddsAndForm => "Not scored: no odds and no form",
        }
    }
}

/// A race-completeness rule that failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    Coverage { coverage_pct: f64, required_pct: f64 },
    UnanalyzedLtoWinner { horse: String },
}

impl ValidationIssue {
    pub fn describe(&self) -> String {
        match self {
            ValidationIssue::Coverage {
                coverage_pct,
                required_pct,
            } => format!(
                "coverage {:.0}% below required {:.0}%",
                coverage_pct, required_pct
            ),
            ValidationIssue::UnanalyzedLtoWinner { horse } => {
                format!("last-time-out winner {} not analyzed", horse)
            }
        }
    }
}

/// Why a race produced no visible pick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    TooCloseToCall { contenders: Vec<String> },
}

/// The primary persisted record: one scored runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub bet_date: NaiveDate,
    pub bet_id: String,

    // Race denormalisation
    pub market_id: String,
    pub course: String,
    pub race_time: DateTime<Utc>,
    pub market_name: String,
    pub race_type: RaceType,
    #[serde(default)]
    pub race_class: Option<String>,
    #[serde(default)]
    pub distance: Option<String>,
    pub going: String,
    pub going_adjustment: i32,
    pub field_size: usize,

    // Runner denormalisation
    pub horse: String,
    pub selection_id: u64,
    #[serde(default)]
    pub odds: Option<Decimal>,
    #[serde(default)]
    pub form: Option<String>,
    #[serde(default)]
    pub trainer: Option<String>,
    #[serde(default)]
    pub jockey: Option<String>,
    #[serde(default)]
    pub weight_lbs: Option<f64>,
    #[serde(default)]
    pub age: Option<u8>,
    #[serde(default)]
    pub draw: Option<u8>,

    // Scoring
    pub raw_score: f64,
    pub score: f64,
    #[serde(default)]
    pub p_win: Option<f64>,
    pub tier: Tier,
    pub score_breakdown: BTreeMap<Factor, f64>,
    pub reasons: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub analyzed: bool,
    #[serde(default)]
    pub omission: Option<Omission>,

    // Surface flags
    pub is_pick: bool,
    pub show_in_ui: bool,
    pub recommended_bet: bool,
    pub coverage_pct: f64,
    pub analyzed_count: usize,
    pub total_runners: usize,
    #[serde(default)]
    pub validation_issues: Vec<ValidationIssue>,
    #[serde(default)]
    pub skip_reason: Option<SkipReason>,

    // Outcome
    #[serde(default)]
    pub outcome: Outcome,
    #[serde(default)]
    pub bet_type: BetType,
    pub stake: Decimal,
    #[serde(default)]
    pub profit_loss: Option<Decimal>,
    #[serde(default)]
    pub actual_winner: Option<String>,
    #[serde(default)]
    pub final_odds: Option<Decimal>,
    #[serde(default)]
    pub result_captured_at: Option<DateTime<Utc>>,

    pub analyzed_at: DateTime<Utc>,
}

impl Selection {
    /// Predicted win probability.
    pub fn probability(&self) -> f64 {
        self.p_win.unwrap_or(self.score / 100.0).clamp(0.0, 1.0)
    }

    pub fn is_win(&self) -> bool {
        self.outcome == Outcome::Win
    }

    /// Factors that contributed positively.
    pub fn positive_factors(&self) -> impl Iterator<Item = (Factor, f64)> + '_ {
        self.score_breakdown
            .iter()
            .filter(|(_, points)| **points > 0.0)
            .map(|(f, p)| (*f, *p))
    }

    /// Odds as a float, preferring the settled price.
    pub fn effective_odds(&self) -> Option<f64> {
        use rust_decimal::prelude::ToPrimitive;
        self.final_odds.or(self.odds).and_then(|d| d.to_f64())
    }
}

// ==================== WeightVector ====================

/// Persisted weights, keyed `CONFIG / SYSTEM_WEIGHTS`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightRecord {
    pub weights: BTreeMap<Factor, i64>,
    /// Fingerprint of the last calibration report applied.
    #[serde(default)]
    pub last_report_fingerprint: Option<String>,
    pub updated_at: DateTime<Utc>,
}

// ==================== TrackInsight ====================

/// Pattern label for a winner, named after its dominant factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WinningPattern {
    RecentForm,
    CourseSpecialist,
    DistanceSuited,
    ProvenWinner,
    GoingSpecialist,
    ValueBet,
    Balanced,
}

impl WinningPattern {
    pub fn from_factor(factor: Factor) -> Option<Self> {
        match factor {
            Factor::RecentWin => Some(WinningPattern::RecentForm),
            Factor::CourseBonus => Some(WinningPattern::CourseSpecialist),
            Factor::SweetSpot => Some(WinningPattern::DistanceSuited),
            Factor::DatabaseHistory => Some(WinningPattern::ProvenWinner),
            Factor::GoingSuitability => Some(WinningPattern::GoingSpecialist),
            Factor::OptimalOdds => Some(WinningPattern::ValueBet),
            _ => None,
        }
    }

    /// The factor a boost for this pattern is applied to.
    pub fn factor(&self) -> Option<Factor> {
        match self {
            WinningPattern::RecentForm => Some(Factor::RecentWin),
            WinningPattern::CourseSpecialist => Some(Factor::CourseBonus),
            WinningPattern::DistanceSuited => Some(Factor::SweetSpot),
            WinningPattern::ProvenWinner => Some(Factor::DatabaseHistory),
            WinningPattern::GoingSpecialist => Some(Factor::GoingSuitability),
            WinningPattern::ValueBet => Some(Factor::OptimalOdds),
            WinningPattern::Balanced => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WinningPattern::RecentForm => "RECENT_FORM",
            WinningPattern::CourseSpecialist => "COURSE_SPECIALIST",
            WinningPattern::DistanceSuited => "DISTANCE_SUITED",
            WinningPattern::ProvenWinner => "PROVEN_WINNER",
            WinningPattern::GoingSpecialist => "GOING_SPECIALIST",
            WinningPattern::ValueBet => "VALUE_BET",
            WinningPattern::Balanced => "BALANCED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentWinner {
    pub horse: String,
    pub market_id: String,
    pub race_time: DateTime<Utc>,
    pub pattern: WinningPattern,
    #[serde(default)]
    pub final_odds: Option<Decimal>,
}

/// Per-(date, course) winning-pattern tally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInsight {
    pub bet_date: NaiveDate,
    pub course: String,
    pub races_analyzed: u32,
    pub pattern_counts: BTreeMap<WinningPattern, u32>,
    #[serde(default)]
    pub dominant_pattern: Option<WinningPattern>,
    #[serde(default)]
    pub dominant_share: f64,
    pub suggested_boost: BTreeMap<Factor, i64>,
    /// Most recent winners, newest last.
    pub recent_winners: Vec<RecentWinner>,
    /// Markets already tallied.
    pub counted_markets: BTreeSet<String>,
    pub updated_at: DateTime<Utc>,
}

impl TrackInsight {
    pub fn empty(bet_date: NaiveDate, course: &str, now: DateTime<Utc>) -> Self {
        Self {
            bet_date,
            course: course.to_string(),
            races_analyzed: 0,
            pattern_counts: BTreeMap::new(),
            dominant_pattern: None,
            dominant_share: 0.0,
            suggested_boost: BTreeMap::new(),
            recent_winners: Vec::new(),
            counted_markets: BTreeSet::new(),
            updated_at: now,
        }
    }
}

// ==================== LearningArtifact ====================

/// Audit trail of one weight adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningArtifact {
    pub created_at: DateTime<Utc>,
    pub report_fingerprint: String,
    #[serde(default)]
    pub ratio: Option<f64>,
    pub adjustments: Vec<String>,
    pub weights_before: BTreeMap<Factor, i64>,
    pub weights_after: BTreeMap<Factor, i64>,
}

impl LearningArtifact {
    pub fn bet_id(&self) -> String {
        format!(
            "{}{}",
            LEARNING_PREFIX,
            self.created_at.format("%Y-%m-%dT%H:%M:%S%.3fZ")
        )
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    /// A pending selection with neutral defaults.
    pub fn selection(date: NaiveDate, course: &str, horse: &str, market_id: &str) -> Selection {
        let race_time = Utc
            .from_utc_datetime(&date.and_hms_opt(14, 30, 0).unwrap());
        Selection {
            bet_date: date,
            bet_id: selection_bet_id(race_time, course, horse),
            market_id: market_id.to_string(),
            course: course.to_string(),
            race_time,
            market_name: "2m Hcap Hrd".to_string(),
            race_type: RaceType::NationalHunt,
            race_class: None,
            distance: None,
            going: "Good".to_string(),
            going_adjustment: 5,
            field_size: 8,
            horse: horse.to_string(),
            selection_id: 1,
            odds: Some(decimal(5.0)),
            form: Some("123".to_string()),
            trainer: None,
            jockey: None,
            weight_lbs: None,
            age: None,
            draw: None,
            raw_score: 50.0,
            score: 50.0,
            p_win: None,
            tier: Tier::Good,
            score_breakdown: BTreeMap::new(),
            reasons: Vec::new(),
            tags: Vec::new(),
            analyzed: true,
            omission: None,
            is_pick: false,
            show_in_ui: false,
            recommended_bet: false,
            coverage_pct: 100.0,
            analyzed_count: 8,
            total_runners: 8,
            validation_issues: Vec::new(),
            skip_reason: None,
            outcome: Outcome::Pending,
            bet_type: BetType::Win,
            stake: decimal(30.0),
            profit_loss: None,
            actual_winner: None,
            final_odds: None,
            result_captured_at: None,
            analyzed_at: race_time,
        }
    }
}
