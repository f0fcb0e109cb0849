//! Snapshot input types and shared enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::PipelineError;

/// Score at or above which a pick is surfaced and recommended.
pub const UI_THRESHOLD: f64 = 85.0;

/// Confidence tier, a pure function of the clamped score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Tier {
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            Tier::Excellent
        } else if score >= 50.0 {
            Tier::Good
        } else if score >= 35.0 {
            Tier::Fair
        } else {
            Tier::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Excellent => "EXCELLENT",
            Tier::Good => "GOOD",
            Tier::Fair => "FAIR",
            Tier::Poor => "POOR",
        }
    }
}

/// Settlement state of a Selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    #[default]
    Pending,
    Win,
    Placed,
    Loss,
    /// Non-runner; no P&L charged.
    Void,
}

impl Outcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending)
    }

    /// Settled with a result usable for calibration.
    pub fn is_resolved(&self) -> bool {
        matches!(self, Outcome::Win | Outcome::Placed | Outcome::Loss)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pending => "pending",
            Outcome::Win => "win",
            Outcome::Placed => "placed",
            Outcome::Loss => "loss",
            Outcome::Void => "void",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetType {
    #[default]
    Win,
    EachWay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceType {
    Flat,
    NationalHunt,
}

impl RaceType {
    /// Classify from the market name ("2m4f Hcap Hrd", "Novice Chase", "7f Hcap").
    pub fn from_market_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        let nh_tokens = ["hurdle", "hrd", "chase", "chs", "bumper", "nhf", "n.h.f", "national hunt"];
        if nh_tokens.iter().any(|t| lower.contains(t)) {
            RaceType::NationalHunt
        } else {
            RaceType::Flat
        }
    }

    /// Peak age window for this race type.
    pub fn peak_ages(&self) -> (u8, u8) {
        match self {
            RaceType::NationalHunt => (6, 9),
            RaceType::Flat => (3, 5),
        }
    }

    /// Ages outside this band are unproven or veteran.
    pub fn proven_ages(&self) -> (u8, u8) {
        match self {
            RaceType::NationalHunt => (4, 11),
            RaceType::Flat => (3, 7),
        }
    }
}

/// Carried weight as it appears in the snapshot: pounds or "st-lb".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WeightField {
    Pounds(f64),
    Text(String),
}

impl WeightField {
    pub fn to_pounds(&self) -> Option<f64> {
        match self {
            WeightField::Pounds(lbs) if *lbs > 0.0 => Some(*lbs),
            WeightField::Pounds(_) => None,
            WeightField::Text(text) => parse_weight_lbs(text),
        }
    }
}

/// Parse "158" or "11-4" (stones-pounds) into pounds.
pub fn parse_weight_lbs(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Some((st, lb)) = text.split_once('-') {
        let stones: f64 = st.trim().parse().ok()?;
        let pounds: f64 = lb.trim().parse().ok()?;
        return Some(stones * 14.0 + pounds);
    }
    text.parse::<f64>().ok().filter(|w| *w > 0.0)
}

/// Runner as delivered by the upcoming-races snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerCard {
    pub name: String,
    #[serde(alias = "selectionId")]
    pub selection_id: u64,
    #[serde(default)]
    pub odds: Option<f64>,
    #[serde(default)]
    pub form: Option<String>,
    #[serde(default)]
    pub trainer: Option<String>,
    #[serde(default)]
    pub jockey: Option<String>,
    #[serde(default)]
    pub weight: Option<WeightField>,
    #[serde(default)]
    pub age: Option<u8>,
    #[serde(default)]
    pub draw: Option<u8>,
}

impl RunnerCard {
    /// Decimal odds, if present and sane.
    pub fn usable_odds(&self) -> Option<f64> {
        self.odds.filter(|o| o.is_finite() && *o > 1.0)
    }

    /// Non-empty form string.
    pub fn usable_form(&self) -> Option<&str> {
        self.form
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }

    /// Both odds and form are present, so the runner can be scored.
    pub fn is_scorable(&self) -> bool {
        self.usable_odds().is_some() && self.usable_form().is_some()
    }

    pub fn weight_lbs(&self) -> Option<f64> {
        self.weight.as_ref().and_then(WeightField::to_pounds)
    }

    /// Last-time-out winner: form string begins with '1'.
    pub fn is_lto_winner(&self) -> bool {
        self.usable_form().is_some_and(|f| f.starts_with('1'))
    }
}

/// Race as delivered by the upcoming-races snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceCard {
    pub market_id: String,
    #[serde(alias = "venue")]
    pub course: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub market_name: String,
    #[serde(default)]
    pub race_class: Option<String>,
    #[serde(default)]
    pub distance: Option<String>,
    #[serde(default)]
    pub going: Option<String>,
    #[serde(default)]
    pub runners: Vec<RunnerCard>,
}

impl RaceCard {
    pub fn race_type(&self) -> RaceType {
        RaceType::from_market_name(&self.market_name)
    }

    pub fn field_size(&self) -> usize {
        self.runners.len()
    }

    /// Novice and maiden races carry a penalty.
    pub fn is_novice_race(&self) -> bool {
        let lower = self.market_name.to_lowercase();
        ["novice", "nov ", "maiden", "mdn"]
            .iter()
            .any(|t| lower.contains(t))
            || lower.ends_with(" nov")
    }
}

/// Upcoming-races snapshot document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RaceSnapshot {
    #[serde(default)]
    pub races: Vec<RaceCard>,
}

impl RaceSnapshot {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| PipelineError::Snapshot {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| PipelineError::Snapshot {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(Tier::from_score(100.0), Tier::Excellent);
        assert_eq!(Tier::from_score(70.0), Tier::Excellent);
        assert_eq!(Tier::from_score(69.9), Tier::Good);
        assert_eq!(Tier::from_score(50.0), Tier::Good);
        assert_eq!(Tier::from_score(35.0), Tier::Fair);
        assert_eq!(Tier::from_score(34.9), Tier::Poor);
        assert_eq!(Tier::from_score(0.0), Tier::Poor);
    }

    #[test]
    fn test_race_type_detection() {
        assert_eq!(RaceType::from_market_name("Novice Hurdle"), RaceType::NationalHunt);
        assert_eq!(RaceType::from_market_name("3m Hcap Chs"), RaceType::NationalHunt);
        assert_eq!(RaceType::from_market_name("7f Hcap"), RaceType::Flat);
    }

    #[test]
    fn test_parse_weight() {
        assert_eq!(parse_weight_lbs("11-4"), Some(158.0));
        assert_eq!(parse_weight_lbs("140"), Some(140.0));
        assert_eq!(parse_weight_lbs("heavy"), None);
    }

    #[test]
    fn test_snapshot_json() {
        let json = r#"{
            "races": [{
                "market_id": "1.234",
                "venue": "Kempton",
                "start_time": "2026-02-04T14:35:00Z",
                "market_name": "Novice Hurdle",
                "runners": [
                    {"name": "Dust Cover", "selectionId": 11, "odds": 4.0, "form": "1-2-1", "weight": "11-4"},
                    {"name": "No Price", "selection_id": 12}
                ]
            }]
        }"#;
        let snapshot: RaceSnapshot = serde_json::from_str(json).unwrap();
        let race = &snapshot.races[0];
        assert_eq!(race.course, "Kempton");
        assert_eq!(race.field_size(), 2);
        assert!(race.is_novice_race());
        assert!(race.runners[0].is_scorable());
        assert!(race.runners[0].is_lto_winner());
        assert_eq!(race.runners[0].weight_lbs(), Some(158.0));
        assert!(!race.runners[1].is_scorable());
    }
}
