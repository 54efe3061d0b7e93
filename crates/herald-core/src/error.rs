//! Herald error types.

use thiserror::Error;

/// Errors surfaced by every Herald crate.
#[derive(Debug, Error)]
pub enum HeraldError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Campaign {0} is already running")]
    AlreadyRunning(String),

    #[error("Campaign {0} is not running")]
    NotRunning(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Security violation: {0}")]
    Security(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl HeraldError {
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn gateway(msg: impl Into<String>) -> Self {
        Self::Gateway(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, HeraldError>;
