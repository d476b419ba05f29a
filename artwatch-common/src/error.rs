//! Common error types for artwatch

use thiserror::Error;

/// Common result type for artwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the artwatch services
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Canceled")]
    Canceled,

    #[error("Internal error: {0}")]
    Internal(String),
}
