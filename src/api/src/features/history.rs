//! Horse history from previously settled selections.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::{ScanFilter, Selection, SelectionStore};
use crate::types::Outcome;

/// Settled record of one horse across earlier selections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HorseHistory {
    pub wins: u32,
    pub losses: u32,
    pub last_outcome: Option<Outcome>,
    pub win_rate: f64,
}

impl HorseHistory {
    /// Tally from settled selections of one horse, in any order.
    pub fn from_selections<'a>(selections: impl IntoIterator<Item = &'a Selection>) -> Self {
        let mut settled: Vec<&Selection> = selections
            .into_iter()
            .filter(|s| s.outcome.is_resolved())
            .collect();
        settled.sort_by(|a, b| a.race_time.cmp(&b.race_time));

        let wins = settled.iter().filter(|s| s.outcome == Outcome::Win).count() as u32;
        let losses = settled.len() as u32 - wins;
        let win_rate = if settled.is_empty() {
            0.0
        } else {
            wins as f64 / settled.len() as f64
        };

        Self {
            wins,
            losses,
            last_outcome: settled.last().map(|s| s.outcome),
            win_rate,
        }
    }
}

/// Look up a horse's history. Store failures degrade to an empty history.
pub fn horse_history(store: &dyn SelectionStore, horse: &str) -> HorseHistory {
    match store.scan_selections(&ScanFilter::selections().horse(horse).settled()) {
        Ok(rows) => HorseHistory::from_selections(&rows),
        Err(e) => {
            warn!(horse, error = %e, "History lookup failed, treating as no history");
            HorseHistory::default()
        }
    }
}
