//! Read-only view over today's track insights for a course.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::scoring::Factor;
use crate::store::{Record, RecordKey, SelectionStore, TrackInsight, WinningPattern};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackView {
    pub dominant_pattern: Option<WinningPattern>,
    pub suggested_boost: BTreeMap<Factor, i64>,
    pub races_analyzed: u32,
}

impl From<TrackInsight> for TrackView {
    fn from(insight: TrackInsight) -> Self {
        Self {
            dominant_pattern: insight.dominant_pattern,
            suggested_boost: insight.suggested_boost,
            races_analyzed: insight.races_analyzed,
        }
    }
}

/// Insights for a course on a date; empty if none recorded or the store fails.
pub fn track_view(store: &dyn SelectionStore, date: NaiveDate, course: &str) -> TrackView {
    match store.get_item(&RecordKey::track_insight(date, course)) {
        Ok(Some(Record::TrackInsight(insight))) => insight.into(),
        Ok(_) => TrackView::default(),
        Err(e) => {
            warn!(course, error = %e, "Track insight lookup failed, using no boosts");
            TrackView::default()
        }
    }
}
