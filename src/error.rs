//! Error types shared across the crate.

use std::sync::Arc;

/// Errors raised by store persistence.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid blob key: {0:?}")]
    InvalidKey(String),
}

/// Validation failures for cron expressions.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CronError {
    #[error("expected 5 fields, got {0}")]
    FieldCount(usize),

    #[error("{field}: {value:?} is not a number")]
    Invalid { field: &'static str, value: String },

    #[error("{field}: {value} outside {min}-{max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("{field}: unsupported syntax {value:?}")]
    Unsupported { field: &'static str, value: String },
}

/// Terminal conditions that halt a schedule.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("cron expression {expression:?}: {source}")]
    Cron {
        expression: String,
        #[source]
        source: CronError,
    },

    #[error("no execution time for {expression:?} within 5 years")]
    Exhausted { expression: String },
}

/// Errors produced by fetch functions and surfaced through query results.
///
/// Cheap to clone so the same failure can sit in a shared result and be
/// handed to every reader.
#[derive(thiserror::Error, Debug, Clone)]
pub enum FetchError {
    #[error("HTTP: {0}")]
    Http(String),

    #[error("HTTP status {status}: {url}")]
    Status { status: u16, url: String },

    #[error("decode: {0}")]
    Decode(Arc<serde_json::Error>),

    #[error("resource task aborted")]
    Aborted,

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(Arc::new(err))
    }
}

impl FetchError {
    /// Wrap any displayable failure from a user fetch function.
    pub fn other(err: impl std::fmt::Display) -> Self {
        Self::Other(err.to_string())
    }
}
