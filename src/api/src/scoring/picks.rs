//! Pick-selection policy.
//!
//! Every runner of a race becomes a Selection so losers are kept as training
//! data. At most one of them is surfaced, and none when two or more runners
//! reach the UI threshold.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::cmp::Ordering;

use super::engine::{score_runner, RunnerScore, ScoringContext};
use super::validator::{validate_race, RaceValidation};
use crate::store::{decimal, selection_bet_id, Selection, SkipReason};
use crate::types::{BetType, Outcome, RaceCard, RunnerCard, Tier, UI_THRESHOLD};

/// Per-invocation settings stamped onto every Selection.
#[derive(Debug, Clone)]
pub struct PickOptions {
    pub stake: Decimal,
    pub bet_type: BetType,
    pub analyzed_at: DateTime<Utc>,
}

/// Outcome of `pick_race`.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceDecision {
    /// One Selection per runner, in card order.
    pub selections: Vec<Selection>,
    /// Index into `selections` of the top-scored runner.
    pub pick_index: Option<usize>,
    pub skip_reason: Option<SkipReason>,
    pub validation: RaceValidation,
}

impl RaceDecision {
    /// The race's pick, if any.
    pub fn pick(&self) -> Option<&Selection> {
        self.pick_index.map(|i| &self.selections[i])
    }

    pub fn is_skipped(&self) -> bool {
        self.skip_reason.is_some()
    }
}

/// Higher score first, then shorter odds, then name.
fn rank(a: &Selection, b: &Selection) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            let (oa, ob) = (a.odds.unwrap_or(Decimal::MAX), b.odds.unwrap_or(Decimal::MAX));
            oa.cmp(&ob)
        })
        .then_with(|| a.horse.cmp(&b.horse))
}

/// Tags: positive factor names plus the lower-case tier.
fn tags_for(score: &RunnerScore, tier: Tier) -> Vec<String> {
    let mut tags: Vec<String> = score
        .breakdown
        .iter()
        .filter(|(_, points)| **points > 0.0)
        .map(|(factor, _)| factor.as_str().to_string())
        .collect();
    tags.push(tier.as_str().to_lowercase());
    tags
}

fn build_selection(
    runner: &RunnerCard,
    race: &RaceCard,
    ctx: &ScoringContext,
    score: RunnerScore,
    validation: &RaceValidation,
    opts: &PickOptions,
) -> Selection {
    let clamped = score.clamped();
    let tier = Tier::from_score(clamped);
    let tags = tags_for(&score, tier);

    Selection {
        bet_date: race.start_time.date_naive(),
        bet_id: selection_bet_id(race.start_time, &race.course, &runner.name),
        market_id: race.market_id.clone(),
        course: race.course.clone(),
        race_time: race.start_time,
        market_name: race.market_name.clone(),
        race_type: race.race_type(),
        race_class: race.race_class.clone(),
        distance: race.distance.clone(),
        going: ctx.going.going.label().to_string(),
        going_adjustment: ctx.going.adjustment,
        field_size: race.field_size(),
        horse: runner.name.clone(),
        selection_id: runner.selection_id,
        odds: runner.usable_odds().map(decimal),
        form: runner.form.clone(),
        trainer: runner.trainer.clone(),
        jockey: runner.jockey.clone(),
        weight_lbs: runner.weight_lbs(),
        age: runner.age,
        draw: runner.draw,
        raw_score: score.raw_score,
        score: clamped,
        p_win: None,
        tier,
        analyzed: score.is_analyzed(),
        omission: score.omission,
        score_breakdown: score.breakdown,
        reasons: score.reasons,
        tags,
        is_pick: false,
        show_in_ui: false,
        recommended_bet: false,
        coverage_pct: validation.coverage_pct,
        analyzed_count: validation.analyzed_count,
        total_runners: validation.total_runners,
        validation_issues: validation.issues.clone(),
        skip_reason: None,
        outcome: Outcome::Pending,
        bet_type: opts.bet_type,
        stake: opts.stake,
        profit_loss: None,
        actual_winner: None,
        final_odds: None,
        result_captured_at: None,
        analyzed_at: opts.analyzed_at,
    }
}

/// Score a race and decide its pick.
pub fn pick_race(race: &RaceCard, ctx: &ScoringContext, opts: &PickOptions) -> RaceDecision {
    let validation = validate_race(race);

    let mut selections: Vec<Selection> = race
        .runners
        .iter()
        .map(|runner| {
            let score = score_runner(runner, race, ctx);
            build_selection(runner, race, ctx, score, &validation, opts)
        })
        .collect();

    let contenders: Vec<usize> = selections
        .iter()
        .enumerate()
        .filter(|(_, s)| s.analyzed && s.score >= UI_THRESHOLD)
        .map(|(i, _)| i)
        .collect();

    if contenders.len() >= 2 {
        let mut names: Vec<String> = contenders
            .iter()
            .map(|&i| selections[i].horse.clone())
            .collect();
        names.sort();
        let reason = SkipReason::TooCloseToCall { contenders: names };
        for &i in &contenders {
            let sel = &mut selections[i];
            sel.skip_reason = Some(reason.clone());
            sel.reasons.push(format!(
                "Suppressed: too close to call, {} runners at {:.0}+",
                contenders.len(),
                UI_THRESHOLD
            ));
        }
        return RaceDecision {
            selections,
            pick_index: None,
            skip_reason: Some(reason),
            validation,
        };
    }

    let pick_index = selections
        .iter()
        .enumerate()
        .filter(|(_, s)| s.analyzed)
        .min_by(|(_, a), (_, b)| rank(a, b))
        .map(|(i, _)| i);

    if let Some(i) = pick_index {
        let sel = &mut selections[i];
        sel.is_pick = true;
        let visible = sel.score >= UI_THRESHOLD && validation.passed();
        sel.show_in_ui = visible;
        sel.recommended_bet = visible;
        if sel.score >= UI_THRESHOLD && !validation.passed() {
            let issues: Vec<String> = validation.issues.iter().map(|i| i.describe()).collect();
            sel.reasons
                .push(format!("Hidden: race failed validation ({})", issues.join("; ")));
        }
    }

    RaceDecision {
        selections,
        pick_index,
        skip_reason: None,
        validation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::engine::fixtures::{context, elite_runner, race, runner};
    use crate::store::ValidationIssue;

    fn opts() -> PickOptions {
        PickOptions {
            stake: decimal(30.0),
            bet_type: BetType::Win,
            analyzed_at: Utc::now(),
        }
    }

    #[test]
    fn test_elite_favourite_is_recommended() {
        let race = race(
            "Kempton",
            "7f Hcap",
            vec![
                elite_runner("Dust Cover", 4.0, "1-2-1"),
                runner("Also Ran", 12.0, "5-6-7"),
            ],
        );
        let decision = pick_race(&race, &context(), &opts());
        let pick = decision.pick().unwrap();

        assert_eq!(pick.horse, "Dust Cover");
        assert_eq!(pick.tier, Tier::Excellent);
        assert!(pick.score >= 85.0);
        assert!(pick.show_in_ui && pick.recommended_bet);
        assert!(pick.tags.contains(&"recent_win".to_string()));
        assert!(pick.tags.contains(&"excellent".to_string()));
        assert_eq!(decision.selections.len(), 2);
        assert!(!decision.selections[1].show_in_ui);
    }

    #[test]
    fn test_novice_race_is_not_recommended() {
        let race = race(
            "Kempton",
            "Novice Hurdle",
            vec![elite_runner("Dust Cover", 4.0, "2")],
        );
        let decision = pick_race(&race, &context(), &opts());
        let pick = decision.pick().unwrap();

        assert_eq!(pick.tier, Tier::Good);
        assert!(pick.score_breakdown[&crate::scoring::Factor::NoviceRacePenalty] < 0.0);
        assert!(!pick.recommended_bet);
        assert!(!pick.show_in_ui);
    }

    #[test]
    fn test_too_close_to_call() {
        let race = race(
            "Kempton",
            "7f Hcap",
            vec![
                elite_runner("Dust Cover", 4.0, "1-2-1"),
                elite_runner("Twin Star", 4.5, "1-1-2"),
                runner("Outsider", 20.0, "0-0"),
            ],
        );
        let decision = pick_race(&race, &context(), &opts());

        assert!(decision.pick().is_none());
        assert!(decision.is_skipped());
        assert_eq!(decision.selections.len(), 3);
        assert!(decision.selections.iter().all(|s| !s.show_in_ui));
        for sel in decision.selections.iter().filter(|s| s.score >= 85.0) {
            assert!(matches!(sel.skip_reason, Some(SkipReason::TooCloseToCall { .. })));
            assert!(sel.reasons.last().unwrap().starts_with("Suppressed"));
        }
    }

    #[test]
    fn test_coverage_gate_hides_pick() {
        let mut runners = vec![elite_runner("Dust Cover", 4.0, "1-2-1")];
        for name in ["A", "B", "C"] {
            let mut r = runner(name, 5.0, "3");
            r.odds = None;
            r.form = None;
            runners.push(r);
        }
        let race = race("Kempton", "7f Hcap", runners);
        let decision = pick_race(&race, &context(), &opts());
        let pick = decision.pick().unwrap();

        assert_eq!(pick.coverage_pct, 25.0);
        assert!(pick.score >= 85.0);
        assert!(!pick.show_in_ui);
        assert!(!pick.recommended_bet);
        assert!(pick
            .validation_issues
            .iter()
            .any(|i| matches!(i, ValidationIssue::Coverage { .. })));
        let unscored = &decision.selections[1];
        assert_eq!(unscored.score, 0.0);
        assert!(!unscored.analyzed);
    }

    #[test]
    fn test_no_scorable_runners() {
        let mut r = runner("Ghost", 5.0, "1");
        r.odds = None;
        let race = race("Ludlow", "Hcap", vec![r]);
        let decision = pick_race(&race, &context(), &opts());
        assert!(decision.pick().is_none());
        assert!(!decision.is_skipped());
        assert_eq!(decision.selections.len(), 1);
    }

    #[test]
    fn test_tie_broken_by_shorter_odds() {
        let race = race(
            "Ludlow",
            "Hcap",
            vec![runner("Longer", 5.0, "45"), runner("Shorter", 4.9, "45")],
        );
        let decision = pick_race(&race, &context(), &opts());
        let longer = &decision.selections[0];
        let shorter = &decision.selections[1];
        assert_eq!(longer.score, shorter.score);
        assert_eq!(decision.pick().unwrap().horse, "Shorter");
    }

    #[test]
    fn test_at_most_one_visible_per_race() {
        let race = race(
            "Kempton",
            "7f Hcap",
            vec![
                elite_runner("Dust Cover", 4.0, "1-2-1"),
                runner("Plodder", 8.0, "4-5"),
                runner("Chancer", 10.0, "2-3"),
            ],
        );
        let decision = pick_race(&race, &context(), &opts());
        let visible = decision
            .selections
            .iter()
            .filter(|s| s.show_in_ui && s.score >= 85.0)
            .count();
        assert!(visible <= 1);
        for s in &decision.selections {
            assert_eq!(s.tier, Tier::from_score(s.score));
            assert!(!s.recommended_bet || (s.show_in_ui && s.score >= 85.0));
        }
    }
}
