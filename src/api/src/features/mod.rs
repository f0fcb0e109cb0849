//! Feature providers.
//!
//! Pure functions from (runner, race, store state) to feature values. They
//! never mutate the store and degrade to neutral values on failure.

pub mod connections;
pub mod form;
pub mod going;
pub mod history;
pub mod track;

pub use connections::{
    claiming_allowance, is_elite_jockey, is_elite_trainer, underperforms_on_testing_ground,
};
pub use form::{analyze_form, FormAnalysis};
pub use going::{infer_going, Going, GoingAssessment, OpenMeteo, WeatherSource};
pub use history::{horse_history, HorseHistory};
pub use track::{track_view, TrackView};
