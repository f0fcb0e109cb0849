//! Scoring engine, race validator and pick policy.

pub mod engine;
pub mod factors;
pub mod picks;
pub mod validator;
pub mod weights;

pub use engine::{score_runner, RunnerScore, ScoringContext};
pub use factors::Factor;
pub use picks::{pick_race, PickOptions, RaceDecision};
pub use validator::{validate_race, RaceValidation};
pub use weights::{load_weight_record, load_weights, save_weights, WeightCache, WeightVector};
