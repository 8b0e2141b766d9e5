//! Error taxonomy for ledger, planner, tracker and store operations.

use std::path::PathBuf;
use thiserror::Error;

/// Failures of the durable snapshot store.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error on {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("cannot sell {requested} shares of {ticker}: holding {held:.4}")]
    InsufficientShares {
        ticker: String,
        requested: f64,
        held: f64,
    },

    #[error("no price available for {0}")]
    NoPriceAvailable(String),

    #[error("snapshot version {0} not found")]
    VersionNotFound(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("external service error: {0}")]
    ExternalService(String),

    #[error("invalid order parameters: {0}")]
    InvalidOrderParameters(String),

    /// Option trades only move forward out of `open`.
    #[error("option trade #{index} is {status} and cannot transition")]
    InvalidTransition { index: usize, status: String },
}

pub type LedgerResult<T> = Result<T, LedgerError>;
