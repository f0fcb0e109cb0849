//! Scoring factors.
//!
//! Every contribution to a runner's score is keyed by a `Factor`. All but
//! `ClaimingJockey` carry a learnable weight.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single additive contribution to a runner's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    SweetSpot,
    OptimalOdds,
    RecentWin,
    TotalWins,
    Consistency,
    CourseBonus,
    DatabaseHistory,
    GoingSuitability,
    TrackPatternBonus,
    TrainerReputation,
    FavoriteCorrection,
    JockeyQuality,
    ClaimingJockey,
    NoviceRacePenalty,
    BounceBackBonus,
    ShortFormImprovement,
    WeightPenalty,
    AgeBonus,
    DistanceSuitability,
}

impl Factor {
    /// All factors in evaluation order.
    pub const ALL: [Factor; 19] = [
        Factor::SweetSpot,
        Factor::OptimalOdds,
        Factor::RecentWin,
        Factor::TotalWins,
        Factor::Consistency,
        Factor::CourseBonus,
        Factor::DatabaseHistory,
        Factor::GoingSuitability,
        Factor::TrackPatternBonus,
        Factor::TrainerReputation,
        Factor::FavoriteCorrection,
        Factor::JockeyQuality,
        Factor::ClaimingJockey,
        Factor::NoviceRacePenalty,
        Factor::BounceBackBonus,
        Factor::ShortFormImprovement,
        Factor::WeightPenalty,
        Factor::AgeBonus,
        Factor::DistanceSuitability,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Factor::SweetSpot => "sweet_spot",
            Factor::OptimalOdds => "optimal_odds",
            Factor::RecentWin => "recent_win",
            Factor::TotalWins => "total_wins",
            Factor::Consistency => "consistency",
            Factor::CourseBonus => "course_bonus",
            Factor::DatabaseHistory => "database_history",
            Factor::GoingSuitability => "going_suitability",
            Factor::TrackPatternBonus => "track_pattern_bonus",
            Factor::TrainerReputation => "trainer_reputation",
            Factor::FavoriteCorrection => "favorite_correction",
            Factor::JockeyQuality => "jockey_quality",
            Factor::ClaimingJockey => "claiming_jockey",
            Factor::NoviceRacePenalty => "novice_race_penalty",
            Factor::BounceBackBonus => "bounce_back_bonus",
            Factor::ShortFormImprovement => "short_form_improvement",
            Factor::WeightPenalty => "weight_penalty",
            Factor::AgeBonus => "age_bonus",
            Factor::DistanceSuitability => "distance_suitability",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Factor::ALL.iter().copied().find(|f| f.as_str() == name)
    }

    /// Compiled-in default weight; `None` for unweighted factors.
    pub fn default_weight(&self) -> Option<i64> {
        let w = match self {
            Factor::SweetSpot => 30,
            Factor::OptimalOdds => 20,
            Factor::RecentWin => 25,
            Factor::TotalWins => 5,
            Factor::Consistency => 2,
            Factor::CourseBonus => 10,
            Factor::DatabaseHistory => 15,
            Factor::GoingSuitability => 8,
            Factor::TrackPatternBonus => 10,
            Factor::TrainerReputation => 15,
            Factor::FavoriteCorrection => 10,
            Factor::JockeyQuality => 10,
            Factor::ClaimingJockey => return None,
            Factor::NoviceRacePenalty => 25,
            Factor::BounceBackBonus => 8,
            Factor::ShortFormImprovement => 10,
            Factor::WeightPenalty => 10,
            Factor::AgeBonus => 5,
            Factor::DistanceSuitability => 8,
        };
        Some(w)
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
