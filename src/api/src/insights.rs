//! Track insights: which kind of horse is winning at each course today.
//!
//! Runs after settlement. Each settled market's winner is classified by the
//! factor contributing most of its score, tallied per course and day, and a
//! boost is suggested for the factor behind a dominant pattern.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::error::StoreResult;
use crate::scoring::Factor;
use crate::store::{
    Record, RecentWinner, RecordKey, Selection, SelectionStore, TrackInsight, WinningPattern,
};
use crate::types::Outcome;

/// Minimum share of positive points for a factor to name the pattern.
const PATTERN_SHARE: f64 = 0.25;
const STRONG_SHARE: f64 = 0.6;
const MODERATE_SHARE: f64 = 0.4;
/// Fewer races than this never produce a boost.
const MIN_RACES_FOR_BOOST: u32 = 2;
const RECENT_WINNERS_KEPT: usize = 3;

/// Classify a winner by the factor with the largest share of its positive points.
pub fn classify_winner(winner: &Selection) -> WinningPattern {
    let total: f64 = winner.positive_factors().map(|(_, p)| p).sum();
    if total <= 0.0 {
        return WinningPattern::Balanced;
    }

    let mut best: Option<(WinningPattern, f64)> = None;
    for (factor, points) in winner.positive_factors() {
        let Some(pattern) = WinningPattern::from_factor(factor) else {
            continue;
        };
        let share = points / total;
        if best.map_or(true, |(_, s)| share > s) {
            best = Some((pattern, share));
        }
    }

    match best {
        Some((pattern, share)) if share > PATTERN_SHARE => pattern,
        _ => WinningPattern::Balanced,
    }
}

/// Boost for a dominant pattern's factor at a given share of races.
pub fn suggested_boost(pattern: WinningPattern, share: f64) -> Option<(Factor, i64)> {
    let factor = pattern.factor()?;
    let strong = share > STRONG_SHARE;
    if !strong && share < MODERATE_SHARE {
        return None;
    }
    let boost = match (factor, strong) {
        (Factor::RecentWin, true) => 10,
        (Factor::CourseBonus, true) | (Factor::SweetSpot, true) | (Factor::DatabaseHistory, true) => 8,
        (_, true) => 6,
        (Factor::RecentWin, false) | (Factor::CourseBonus, false) | (Factor::SweetSpot, false) => 5,
        (Factor::DatabaseHistory, false) => 4,
        (_, false) => 3,
    };
    Some((factor, boost))
}

/// Recompute the dominant pattern and boost from the tally.
fn refresh(insight: &mut TrackInsight) {
    let mut dominant: Option<(WinningPattern, u32)> = None;
    for (pattern, count) in &insight.pattern_counts {
        if dominant.map_or(true, |(_, c)| *count > c) {
            dominant = Some((*pattern, *count));
        }
    }

    insight.suggested_boost.clear();
    insight.dominant_pattern = dominant.map(|(p, _)| p);
    insight.dominant_share = match dominant {
        Some((_, count)) if insight.races_analyzed > 0 => {
            count as f64 / insight.races_analyzed as f64
        }
        _ => 0.0,
    };

    if insight.races_analyzed < MIN_RACES_FOR_BOOST {
        return;
    }
    if let Some((factor, boost)) = insight
        .dominant_pattern
        .and_then(|p| suggested_boost(p, insight.dominant_share))
    {
        insight.suggested_boost.insert(factor, boost);
    }
}

/// Fold newly settled markets for one day into the per-course insights.
///
/// Markets already counted are skipped, so repeated runs converge.
pub fn update_track_insights(
    store: &dyn SelectionStore,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> StoreResult<Vec<TrackInsight>> {
    let selections = store.selections_for_date(date)?;

    // course -> market -> rows
    let mut markets: BTreeMap<String, BTreeMap<String, Vec<&Selection>>> = BTreeMap::new();
    for s in &selections {
        markets
            .entry(s.course.clone())
            .or_default()
            .entry(s.market_id.clone())
            .or_default()
            .push(s);
    }

    let mut updated = Vec::new();
    for (course, by_market) in markets {
        let key = RecordKey::track_insight(date, &course);
        let mut insight = match store.get_item(&key)? {
            Some(Record::TrackInsight(insight)) => insight,
            _ => TrackInsight::empty(date, &course, now),
        };

        let mut changed = false;
        for (market_id, rows) in by_market {
            if insight.counted_markets.contains(&market_id) {
                continue;
            }
            let Some(winner) = rows.iter().find(|s| s.outcome == Outcome::Win) else {
                debug!("No settled winner among our rows for {}", market_id);
                continue;
            };

            let pattern = classify_winner(winner);
            *insight.pattern_counts.entry(pattern).or_insert(0) += 1;
            insight.races_analyzed += 1;
            insight.counted_markets.insert(market_id.clone());
            insight.recent_winners.push(RecentWinner {
                horse: winner.horse.clone(),
                market_id,
                race_time: winner.race_time,
                pattern,
                final_odds: winner.final_odds,
            });
            changed = true;
        }

        if !changed {
            continue;
        }

        insight
            .recent_winners
            .sort_by(|a, b| a.race_time.cmp(&b.race_time));
        let excess = insight.recent_winners.len().saturating_sub(RECENT_WINNERS_KEPT);
        insight.recent_winners.drain(..excess);
        refresh(&mut insight);
        insight.updated_at = now;

        info!(
            "{}: {} races, dominant {} ({:.0}%)",
            course,
            insight.races_analyzed,
            insight
                .dominant_pattern
                .map(|p| p.as_str())
                .unwrap_or("none"),
            insight.dominant_share * 100.0
        );

        if let Err(e) = store.put_item(&Record::TrackInsight(insight.clone())) {
            warn!("Failed to write track insight for {}: {}", course, e);
            continue;
        }
        updated.push(insight);
    }

    Ok(updated)
}

/// Stored insights for one day, ordered by course.
pub fn track_insights_for_date(store: &dyn SelectionStore, date: NaiveDate) -> StoreResult<Vec<TrackInsight>> {
    Ok(store
        .query(&date.to_string())?
        .into_iter()
        .filter_map(Record::into_track_insight)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::track_view;
    use crate::scoring::engine::fixtures::{context, race, runner};
    use crate::scoring::score_runner;
    use crate::store::records::fixtures::selection;
    use crate::store::SqliteStore;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 4).unwrap()
    }

    fn winner(market_id: &str, horse: &str, breakdown: &[(Factor, f64)]) -> Selection {
        let mut s = selection(day(), "Kempton", horse, market_id);
        s.outcome = Outcome::Win;
        s.score_breakdown = breakdown.iter().copied().collect();
        s
    }

    #[test]
    fn test_classify_winner() {
        let recent = winner("1.1", "A", &[(Factor::RecentWin, 25.0), (Factor::SweetSpot, 15.0), (Factor::Consistency, 2.0)]);
        assert_eq!(classify_winner(&recent), WinningPattern::RecentForm);

        // No mapped factor above 25%
        let spread = winner(
            "1.2",
            "B",
            &[
                (Factor::SweetSpot, 10.0),
                (Factor::TrainerReputation, 15.0),
                (Factor::JockeyQuality, 10.0),
                (Factor::FavoriteCorrection, 10.0),
            ],
        );
        assert_eq!(classify_winner(&spread), WinningPattern::Balanced);

        let empty = winner("1.3", "C", &[]);
        assert_eq!(classify_winner(&empty), WinningPattern::Balanced);
    }

    #[test]
    fn test_suggested_boost_bands() {
        assert_eq!(suggested_boost(WinningPattern::RecentForm, 0.67), Some((Factor::RecentWin, 10)));
        assert_eq!(suggested_boost(WinningPattern::ValueBet, 0.61), Some((Factor::OptimalOdds, 6)));
        // Exactly 60% is still the moderate band
        assert_eq!(suggested_boost(WinningPattern::ValueBet, 0.6), Some((Factor::OptimalOdds, 3)));
        assert_eq!(suggested_boost(WinningPattern::RecentForm, 0.6), Some((Factor::RecentWin, 5)));
        assert_eq!(suggested_boost(WinningPattern::RecentForm, 0.5), Some((Factor::RecentWin, 5)));
        assert_eq!(suggested_boost(WinningPattern::GoingSpecialist, 0.4), Some((Factor::GoingSuitability, 3)));
        assert_eq!(suggested_boost(WinningPattern::RecentForm, 0.39), None);
        assert_eq!(suggested_boost(WinningPattern::Balanced, 1.0), None);
    }

    #[test]
    fn test_track_pattern_carry_over() {
        let store = SqliteStore::in_memory().unwrap();
        let rows = [
            winner("1.1", "First", &[(Factor::RecentWin, 25.0), (Factor::SweetSpot, 10.0)]),
            winner("1.2", "Second", &[(Factor::RecentWin, 25.0), (Factor::OptimalOdds, 10.0)]),
            winner("1.3", "Third", &[(Factor::CourseBonus, 10.0), (Factor::Consistency, 2.0)]),
        ];
        for s in rows {
            store.put_item(&Record::Selection(s)).unwrap();
        }
        let mut loser = selection(day(), "Kempton", "Beaten", "1.1");
        loser.outcome = Outcome::Loss;
        store.put_item(&Record::Selection(loser)).unwrap();

        let updated = update_track_insights(&store, day(), Utc::now()).unwrap();
        assert_eq!(updated.len(), 1);
        let insight = &updated[0];
        assert_eq!(insight.races_analyzed, 3);
        assert_eq!(insight.dominant_pattern, Some(WinningPattern::RecentForm));
        assert!((insight.dominant_share - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(insight.suggested_boost.get(&Factor::RecentWin), Some(&10));
        assert_eq!(insight.recent_winners.len(), 3);

        // Later scoring at Kempton picks the boost up, capped by the weight
        let mut ctx = context();
        ctx.track = track_view(&store, day(), "Kempton");
        let card = race("Kempton", "7f Hcap", vec![]);
        let lto = score_runner(&runner("In Form", 6.0, "1"), &card, &ctx);
        assert_eq!(lto.breakdown[&Factor::TrackPatternBonus], 10.0);
        let other = score_runner(&runner("Out Of Form", 6.0, "5"), &card, &ctx);
        assert!(!other.breakdown.contains_key(&Factor::TrackPatternBonus));

        // Re-running counts nothing twice
        assert!(update_track_insights(&store, day(), Utc::now()).unwrap().is_empty());
        assert_eq!(track_view(&store, day(), "Kempton").races_analyzed, 3);
        assert_eq!(track_insights_for_date(&store, day()).unwrap().len(), 1);
    }

    #[test]
    fn test_single_race_gives_no_boost() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .put_item(&Record::Selection(winner("1.1", "Only", &[(Factor::RecentWin, 25.0)])))
            .unwrap();
        let updated = update_track_insights(&store, day(), Utc::now()).unwrap();
        assert_eq!(updated[0].dominant_pattern, Some(WinningPattern::RecentForm));
        assert!(updated[0].suggested_boost.is_empty());
    }
}
