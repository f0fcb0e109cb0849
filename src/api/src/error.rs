//! Error taxonomy for the pipeline.
//!
//! Only store failures are fatal. Fetch failures are transient and are turned
//! into neutral values by the feature providers; malformed input, validation
//! failures and too-close-to-call races are recorded on the Selection itself.

use thiserror::Error;

/// Selection Store failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("selection store unavailable: {0}")]
    Unavailable(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("record not found: {bet_date}/{bet_id}")]
    NotFound { bet_date: String, bet_id: String },

    #[error("record {bet_date}/{bet_id} is not a selection")]
    NotASelection { bet_date: String, bet_id: String },
}

/// Transient failures from external collaborators (weather, market results).
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("http error: {0}")]
    Http(reqwest::Error),

    #[error("unexpected status {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("source unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Http(e)
        }
    }
}

/// Failures that abort an invocation.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unreadable snapshot {path}: {message}")]
    Snapshot { path: String, message: String },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
