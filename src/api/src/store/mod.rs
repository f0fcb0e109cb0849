//! Selection Store
//!
//! Durable table of selections, learned weights, track insights and learning
//! artifacts. Single source of truth for every pass.

pub mod records;
pub mod repository;
pub mod schema;

pub use records::{
    decimal, selection_bet_id, LearningArtifact, Omission, RecentWinner, Record, RecordKey,
    RecordType, Selection, SkipReason, TrackInsight, ValidationIssue, WeightRecord,
    WinningPattern, CONFIG_PARTITION,
};
pub use repository::{ItemPatch, ScanFilter, SelectionStore, SqliteStore};
pub use schema::create_tables;
