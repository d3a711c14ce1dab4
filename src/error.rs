//! Error types for Somna

use thiserror::Error;

/// Errors that can occur while loading, storing or ingesting sleep data
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Date parse error: {0}")]
    DateParseError(String),

    #[error("Invalid sleep session: {0}")]
    InvalidSession(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}
