//! # Error Module
//!
//! Error type of the binary. Every variant ends up in the run status message.

use automate_ids_core::CoreError;
use thiserror::Error;

/// Result alias for app operations.
pub type AppResult<T> = std::result::Result<T, AppError>;

/// Errors raised by the binary.
#[derive(Debug, Error)]
pub enum AppError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing a local file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The compliance engine rejected its input.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A server answered with an error status or GraphQL errors.
    #[error("Server error: {0}")]
    Server(String),

    /// The automation context was used incorrectly.
    #[error("Automation error: {0}")]
    Automation(String),

    /// A command line argument could not be used.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
