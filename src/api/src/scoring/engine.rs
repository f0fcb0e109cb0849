//! Per-runner scoring.
//!
//! `score_runner` is a pure function of the runner, the race and an immutable
//! `ScoringContext`. Every contribution is recorded in the breakdown with a
//! one-line reason. The returned `raw_score` is the unclipped sum.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Factor, WeightVector};
use crate::features::{
    analyze_form, claiming_allowance, is_elite_jockey, is_elite_trainer,
    underperforms_on_testing_ground, FormAnalysis, GoingAssessment, HorseHistory, TrackView,
};
use crate::store::Omission;
use crate::types::{RaceCard, RunnerCard};

/// Carried weight above which a penalty applies, in pounds.
const WEIGHT_PENALTY_THRESHOLD: f64 = 150.0;
/// Reduction applied to an elite trainer who struggles on Heavy or Soft.
const TESTING_GROUND_TRAINER_PENALTY: f64 = 15.0;
const TESTING_GROUND_TRAINER_FLOOR: f64 = 5.0;
/// Fraction of favorite_correction kept under the same penalty.
const TESTING_GROUND_FAVORITE_FACTOR: f64 = 0.5;

/// Everything scoring needs besides the runner and race.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoringContext {
    pub weights: WeightVector,
    pub going: GoingAssessment,
    pub track: TrackView,
    pub avg_winner_odds: f64,
    /// Surfaced picks at this course already settled as winners today.
    pub course_winners_today: u32,
    /// Settled history by horse name.
    pub history: BTreeMap<String, HorseHistory>,
}

/// Result of scoring one runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerScore {
    pub raw_score: f64,
    pub breakdown: BTreeMap<Factor, f64>,
    pub reasons: Vec<String>,
    pub omission: Option<Omission>,
}

impl RunnerScore {
    pub fn is_analyzed(&self) -> bool {
        self.omission.is_none()
    }

    /// Score clamped to [0, 100].
    pub fn clamped(&self) -> f64 {
        self.raw_score.clamp(0.0, 100.0)
    }
}

/// Share of the sweet_spot weight earned at given odds.
pub fn sweet_spot_fraction(odds: f64) -> f64 {
    if (3.0..=9.0).contains(&odds) {
        1.0
    } else if (2.0..3.0).contains(&odds) {
        0.6
    } else if (1.5..2.0).contains(&odds) {
        0.4
    } else if odds < 1.5 {
        0.2
    } else if odds <= 15.0 {
        0.5
    } else {
        0.2
    }
}

#[derive(Default)]
struct Tally {
    breakdown: BTreeMap<Factor, f64>,
    reasons: Vec<String>,
}

impl Tally {
    fn add(&mut self, factor: Factor, points: f64, reason: String) {
        if points == 0.0 {
            return;
        }
        *self.breakdown.entry(factor).or_insert(0.0) += points;
        self.reasons.push(reason);
    }

    fn points(&self, factor: Factor) -> f64 {
        self.breakdown.get(&factor).copied().unwrap_or(0.0)
    }

    fn total(&self) -> f64 {
        self.breakdown.values().sum()
    }
}

fn omission_for(runner: &RunnerCard) -> Option<Omission> {
    match (runner.usable_odds(), runner.usable_form()) {
        (Some(_), Some(_)) => None,
        (None, Some(_)) => Some(Omission::MissingOdds),
        (Some(_), None) => Some(Omission::MissingForm),
        (None, None) => Some(Omission::MissingOddsAndForm),
    }
}

/// Score one runner.
pub fn score_runner(runner: &RunnerCard, race: &RaceCard, ctx: &ScoringContext) -> RunnerScore {
    let (odds, form) = match (runner.usable_odds(), runner.usable_form()) {
        (Some(odds), Some(form)) => (odds, analyze_form(form)),
        _ => {
            let omission = omission_for(runner);
            return RunnerScore {
                raw_score: 0.0,
                breakdown: BTreeMap::new(),
                reasons: omission.iter().map(|o| o.reason().to_string()).collect(),
                omission,
            };
        }
    };

    let w = &ctx.weights;
    let mut tally = Tally::default();
    let testing_ground = ctx.going.going.is_testing();

    // Odds
    let fraction = sweet_spot_fraction(odds);
    tally.add(
        Factor::SweetSpot,
        w.get(Factor::SweetSpot) * fraction,
        format!("Odds {:.2}: {:.0}% of sweet-spot weight", odds, fraction * 100.0),
    );

    let distance_from_avg = (odds - ctx.avg_winner_odds).abs();
    let optimal = if distance_from_avg < 1.0 {
        1.0
    } else if distance_from_avg < 2.0 {
        0.5
    } else {
        0.0
    };
    tally.add(
        Factor::OptimalOdds,
        w.get(Factor::OptimalOdds) * optimal,
        format!(
            "Odds {:.2} near average winner odds {:.2}",
            odds, ctx.avg_winner_odds
        ),
    );

    // Form
    score_form(&mut tally, w, &form, ctx.going.adjustment, testing_ground);

    if ctx.course_winners_today > 0 {
        tally.add(
            Factor::CourseBonus,
            w.get(Factor::CourseBonus),
            format!(
                "{} of our picks already won at {} today",
                ctx.course_winners_today, race.course
            ),
        );
    }

    match ctx.history.get(&runner.name) {
        Some(history) if history.wins > 0 => tally.add(
            Factor::DatabaseHistory,
            w.get(Factor::DatabaseHistory),
            format!(
                "Previous winner for us ({} wins, {} losses)",
                history.wins, history.losses
            ),
        ),
        _ => {}
    }

    // Connections
    score_connections(&mut tally, w, runner, odds, testing_ground);

    // Race conditions
    let novice = race.is_novice_race();
    if novice {
        tally.add(
            Factor::NoviceRacePenalty,
            -w.get(Factor::NoviceRacePenalty),
            format!("Novice/maiden race: {}", race.market_name),
        );
    }
    if form.is_bounce_back() {
        tally.add(
            Factor::BounceBackBonus,
            w.get(Factor::BounceBackBonus),
            "Bounce-back pattern: good, poor, good".to_string(),
        );
    }
    if novice && form.run_count() <= 3 && form.has_second() {
        tally.add(
            Factor::ShortFormImprovement,
            w.get(Factor::ShortFormImprovement),
            "Lightly raced with a second place".to_string(),
        );
    }

    if let Some(weight) = runner.weight_lbs() {
        if weight > WEIGHT_PENALTY_THRESHOLD {
            let penalty = w
                .get(Factor::WeightPenalty)
                .min((weight - WEIGHT_PENALTY_THRESHOLD) / 2.0);
            tally.add(
                Factor::WeightPenalty,
                -penalty,
                format!("Carrying {:.0}lb", weight),
            );
        }
    }

    if let Some(age) = runner.age {
        let race_type = race.race_type();
        let (peak_lo, peak_hi) = race_type.peak_ages();
        let (proven_lo, proven_hi) = race_type.proven_ages();
        if (peak_lo..=peak_hi).contains(&age) {
            tally.add(
                Factor::AgeBonus,
                w.get(Factor::AgeBonus),
                format!("Age {} in peak window", age),
            );
        } else if !(proven_lo..=proven_hi).contains(&age) {
            tally.add(
                Factor::AgeBonus,
                -w.get(Factor::AgeBonus) / 2.0,
                format!("Age {} unproven or veteran", age),
            );
        }
    }

    if form.wins >= 2 && form.lto_winner {
        tally.add(
            Factor::DistanceSuitability,
            w.get(Factor::DistanceSuitability),
            format!("{} wins including last time out", form.wins),
        );
    } else if form.wins >= 3 {
        tally.add(
            Factor::DistanceSuitability,
            w.get(Factor::DistanceSuitability) / 2.0,
            format!("{} wins in form", form.wins),
        );
    }

    // Track pattern runs last: it reads the other contributions.
    let mut track_points = 0.0;
    for (factor, boost) in &ctx.track.suggested_boost {
        if tally.points(*factor) > 0.0 {
            track_points += *boost as f64;
        }
    }
    let cap = w.get(Factor::TrackPatternBonus);
    if track_points > 0.0 {
        let pattern = ctx
            .track
            .dominant_pattern
            .map(|p| p.as_str())
            .unwrap_or("track");
        tally.add(
            Factor::TrackPatternBonus,
            track_points.min(cap),
            format!("Fits today's {} pattern at {}", pattern, race.course),
        );
    }

    RunnerScore {
        raw_score: tally.total(),
        breakdown: tally.breakdown,
        reasons: tally.reasons,
        omission: None,
    }
}

fn score_form(
    tally: &mut Tally,
    w: &WeightVector,
    form: &FormAnalysis,
    going_adj: i32,
    testing_ground: bool,
) {
    if form.lto_winner {
        tally.add(
            Factor::RecentWin,
            w.get(Factor::RecentWin),
            "Won last time out".to_string(),
        );
    }
    if form.wins > 0 {
        tally.add(
            Factor::TotalWins,
            form.wins as f64 * w.get(Factor::TotalWins),
            format!("{} wins in form", form.wins),
        );
    }
    if form.places > 0 {
        tally.add(
            Factor::Consistency,
            form.places as f64 * w.get(Factor::Consistency),
            format!("{} places in form", form.places),
        );
    }

    let suits_going = (form.lto_winner && going_adj.abs() <= 5)
        || (going_adj.abs() > 5 && form.wins >= 2);
    if suits_going {
        let multiplier = if testing_ground { 2.0 } else { 1.0 };
        tally.add(
            Factor::GoingSuitability,
            w.get(Factor::GoingSuitability) * multiplier,
            format!("Form suits going (adjustment {:+})", going_adj),
        );
    }
}

fn score_connections(
    tally: &mut Tally,
    w: &WeightVector,
    runner: &RunnerCard,
    odds: f64,
    testing_ground: bool,
) {
    let trainer = runner.trainer.as_deref().unwrap_or("");
    if is_elite_trainer(trainer) {
        let struggles = testing_ground && underperforms_on_testing_ground(trainer);

        let reputation = if struggles {
            (w.get(Factor::TrainerReputation) - TESTING_GROUND_TRAINER_PENALTY)
                .max(TESTING_GROUND_TRAINER_FLOOR)
        } else {
            w.get(Factor::TrainerReputation)
        };
        tally.add(
            Factor::TrainerReputation,
            reputation,
            if struggles {
                format!("Elite trainer {} (weaker on testing ground)", trainer)
            } else {
                format!("Elite trainer {}", trainer)
            },
        );

        let base = w.get(Factor::FavoriteCorrection);
        let mut correction = if odds < 2.0 {
            1.5 * base
        } else if odds < 4.0 {
            base
        } else {
            0.5 * base
        };
        if struggles {
            correction *= TESTING_GROUND_FAVORITE_FACTOR;
        }
        tally.add(
            Factor::FavoriteCorrection,
            correction,
            format!("Elite-trained at {:.2}", odds),
        );
    }

    let jockey = runner.jockey.as_deref().unwrap_or("");
    if is_elite_jockey(jockey) {
        tally.add(
            Factor::JockeyQuality,
            w.get(Factor::JockeyQuality),
            format!("Elite jockey {}", jockey),
        );
    }

    let allowance = claiming_allowance(jockey);
    if allowance > 0 {
        let multiplier = if testing_ground { 2.0 } else { 1.0 };
        tally.add(
            Factor::ClaimingJockey,
            allowance as f64 * multiplier,
            format!("Claiming {}lb", allowance),
        );
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::types::WeightField;
    use chrono::{TimeZone, Utc};

    pub fn runner(name: &str, odds: f64, form: &str) -> RunnerCard {
        RunnerCard {
            name: name.to_string(),
            selection_id: name.bytes().map(u64::from).sum(),
            odds: Some(odds),
            form: Some(form.to_string()),
            trainer: None,
            jockey: None,
            weight: None,
            age: None,
            draw: None,
        }
    }

    pub fn elite_runner(name: &str, odds: f64, form: &str) -> RunnerCard {
        RunnerCard {
            trainer: Some("W. P. Mullins".to_string()),
            jockey: Some("Paul Townend".to_string()),
            ..runner(name, odds, form)
        }
    }

    pub fn heavy_runner(name: &str, lbs: f64) -> RunnerCard {
        RunnerCard {
            weight: Some(WeightField::Pounds(lbs)),
            ..runner(name, 7.0, "45")
        }
    }

    pub fn race(course: &str, market_name: &str, runners: Vec<RunnerCard>) -> RaceCard {
        RaceCard {
            market_id: format!("1.{}", course.len() + market_name.len()),
            course: course.to_string(),
            start_time: Utc.with_ymd_and_hms(2026, 2, 4, 14, 35, 0).unwrap(),
            market_name: market_name.to_string(),
            race_class: None,
            distance: None,
            going: None,
            runners,
        }
    }

    pub fn context() -> ScoringContext {
        ScoringContext {
            weights: WeightVector::defaults(),
            going: GoingAssessment::all_weather(),
            track: TrackView::default(),
            avg_winner_odds: 4.65,
            course_winners_today: 0,
            history: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::features::going::{Going, GoingSource};
    use crate::store::WinningPattern;

    fn testing_going() -> GoingAssessment {
        GoingAssessment {
            going: Going::Heavy,
            adjustment: -8,
            surface: None,
            source: GoingSource::Weather,
            rainfall_mm: Some(25.0),
        }
    }

    #[test]
    fn test_sweet_spot_boundaries() {
        assert_eq!(sweet_spot_fraction(3.0), 1.0);
        assert_eq!(sweet_spot_fraction(9.0), 1.0);
        assert_eq!(sweet_spot_fraction(2.99), 0.6);
        assert_eq!(sweet_spot_fraction(9.01), 0.5);
        assert_eq!(sweet_spot_fraction(1.5), 0.4);
        assert_eq!(sweet_spot_fraction(1.2), 0.2);
        assert_eq!(sweet_spot_fraction(15.0), 0.5);
        assert_eq!(sweet_spot_fraction(21.0), 0.2);
    }

    #[test]
    fn test_elite_favourite_normal_going() {
        let runner = elite_runner("Dust Cover", 4.0, "1-2-1");
        let race = race("Kempton", "7f Hcap", vec![runner.clone()]);
        let score = score_runner(&runner, &race, &context());

        let b = &score.breakdown;
        assert_eq!(b[&Factor::SweetSpot], 30.0);
        assert_eq!(b[&Factor::OptimalOdds], 20.0);
        assert_eq!(b[&Factor::RecentWin], 25.0);
        assert_eq!(b[&Factor::TotalWins], 10.0);
        assert_eq!(b[&Factor::Consistency], 2.0);
        assert_eq!(b[&Factor::GoingSuitability], 8.0);
        assert_eq!(b[&Factor::TrainerReputation], 15.0);
        assert_eq!(b[&Factor::FavoriteCorrection], 5.0);
        assert_eq!(b[&Factor::JockeyQuality], 10.0);
        assert_eq!(b[&Factor::DistanceSuitability], 8.0);
        assert_eq!(score.raw_score, 133.0);
        assert_eq!(score.clamped(), 100.0);
        assert_eq!(score.reasons.len(), b.len());
    }

    #[test]
    fn test_novice_race_with_short_form() {
        let runner = elite_runner("Dust Cover", 4.0, "2");
        let race = race("Kempton", "Novice Hurdle", vec![runner.clone()]);
        let score = score_runner(&runner, &race, &context());

        assert_eq!(score.breakdown[&Factor::NoviceRacePenalty], -25.0);
        assert_eq!(score.breakdown[&Factor::ShortFormImprovement], 10.0);
        assert!(!score.breakdown.contains_key(&Factor::RecentWin));
        assert_eq!(score.raw_score, 67.0);
    }

    #[test]
    fn test_unscorable_runner_gets_zero() {
        let mut runner = runner("No Price", 5.0, "123");
        runner.odds = None;
        let race = race("Ludlow", "2m Hcap Hrd", vec![runner.clone()]);
        let score = score_runner(&runner, &race, &context());
        assert_eq!(score.raw_score, 0.0);
        assert_eq!(score.omission, Some(Omission::MissingOdds));
        assert_eq!(score.reasons, vec![Omission::MissingOdds.reason().to_string()]);
    }

    #[test]
    fn test_testing_ground_trainer_penalty() {
        let mut runner = elite_runner("Mud Lark", 3.5, "11");
        runner.trainer = Some("Nicky Henderson".to_string());
        let race = race("Carlisle", "3m Hcap Chs", vec![runner.clone()]);
        let ctx = ScoringContext {
            going: testing_going(),
            ..context()
        };
        let score = score_runner(&runner, &race, &ctx);

        assert_eq!(score.breakdown[&Factor::TrainerReputation], 5.0);
        assert_eq!(score.breakdown[&Factor::FavoriteCorrection], 5.0);
        // two wins on going beyond +/-5, doubled on Heavy
        assert_eq!(score.breakdown[&Factor::GoingSuitability], 16.0);
    }

    #[test]
    fn test_claiming_doubles_on_testing_ground() {
        let mut runner = runner("Young Claimer", 6.0, "34");
        runner.jockey = Some("Danny Gilligan (5)".to_string());
        let race = race("Carlisle", "2m Hcap Hrd", vec![runner.clone()]);

        let good = score_runner(&runner, &race, &context());
        assert_eq!(good.breakdown[&Factor::ClaimingJockey], 5.0);

        let ctx = ScoringContext {
            going: testing_going(),
            ..context()
        };
        let heavy = score_runner(&runner, &race, &ctx);
        assert_eq!(heavy.breakdown[&Factor::ClaimingJockey], 10.0);
    }

    #[test]
    fn test_weight_penalty_capped() {
        let race = race("Ludlow", "2m Hcap Hrd", vec![]);
        let light = score_runner(&heavy_runner("Light", 150.0), &race, &context());
        assert!(!light.breakdown.contains_key(&Factor::WeightPenalty));

        let heavier = score_runner(&heavy_runner("Heavier", 156.0), &race, &context());
        assert_eq!(heavier.breakdown[&Factor::WeightPenalty], -3.0);

        let top = score_runner(&heavy_runner("Top Weight", 180.0), &race, &context());
        assert_eq!(top.breakdown[&Factor::WeightPenalty], -10.0);
    }

    #[test]
    fn test_age_windows() {
        let nh = race("Ludlow", "2m Hcap Hrd", vec![]);
        let flat = race("Ludlow", "1m Hcap", vec![]);
        let aged = |age| RunnerCard {
            age: Some(age),
            ..runner("Aged", 7.0, "45")
        };

        assert_eq!(score_runner(&aged(7), &nh, &context()).breakdown[&Factor::AgeBonus], 5.0);
        assert_eq!(score_runner(&aged(12), &nh, &context()).breakdown[&Factor::AgeBonus], -2.5);
        assert!(!score_runner(&aged(10), &nh, &context())
            .breakdown
            .contains_key(&Factor::AgeBonus));
        assert_eq!(score_runner(&aged(4), &flat, &context()).breakdown[&Factor::AgeBonus], 5.0);
        assert_eq!(score_runner(&aged(8), &flat, &context()).breakdown[&Factor::AgeBonus], -2.5);
    }

    #[test]
    fn test_bounce_back_and_history() {
        let runner = runner("Comeback", 6.0, "281");
        let race = race("Ludlow", "2m Hcap Hrd", vec![runner.clone()]);
        let mut ctx = context();
        ctx.history.insert(
            "Comeback".to_string(),
            HorseHistory {
                wins: 1,
                losses: 2,
                last_outcome: None,
                win_rate: 1.0 / 3.0,
            },
        );
        ctx.course_winners_today = 2;

        let score = score_runner(&runner, &race, &ctx);
        assert_eq!(score.breakdown[&Factor::BounceBackBonus], 8.0);
        assert_eq!(score.breakdown[&Factor::DatabaseHistory], 15.0);
        assert_eq!(score.breakdown[&Factor::CourseBonus], 10.0);
    }

    #[test]
    fn test_track_pattern_boost_capped() {
        let winner = runner("Last Winner", 6.0, "1");
        let loser = runner("Out Of Form", 6.0, "5");
        let race = race("Kempton", "7f Hcap", vec![]);
        let mut ctx = context();
        ctx.track.dominant_pattern = Some(WinningPattern::RecentForm);
        ctx.track.suggested_boost.insert(Factor::RecentWin, 8);
        ctx.track.suggested_boost.insert(Factor::SweetSpot, 5);

        let boosted = score_runner(&winner, &race, &ctx);
        // 8 + 5 capped at the default weight of 10
        assert_eq!(boosted.breakdown[&Factor::TrackPatternBonus], 10.0);

        let other = score_runner(&loser, &race, &ctx);
        assert_eq!(other.breakdown[&Factor::TrackPatternBonus], 5.0);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let runner = elite_runner("Dust Cover", 4.0, "1-2-1");
        let race = race("Kempton", "7f Hcap", vec![runner.clone()]);
        let ctx = context();
        assert_eq!(score_runner(&runner, &race, &ctx), score_runner(&runner, &race, &ctx));
    }
}
