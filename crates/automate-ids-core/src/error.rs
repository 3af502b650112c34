//! # Error Module
//!
//! Error type for every fallible core operation.

use thiserror::Error;

/// Result alias used across the core.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by the core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A Speckle object was not shaped like a Base (e.g. missing `id`).
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// JSON parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The IDS document could not be parsed.
    #[error("IDS error at byte {position}: {message}")]
    Ids { position: u64, message: String },

    /// A bsDD sheet or API payload was malformed.
    #[error("bsDD error: {0}")]
    Bsdd(String),

    /// A value pattern is not a valid regular expression.
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// Function inputs or run data were out of range.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    /// Create an IDS error at the given byte position.
    pub fn ids(position: u64, message: impl Into<String>) -> Self {
        Self::Ids {
            position,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_error_display_includes_position() {
        let err = CoreError::ids(42, "unexpected tag");
        assert_eq!(err.to_string(), "IDS error at byte 42: unexpected tag");
    }

    #[test]
    fn json_error_converts() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").err();
        let err = json_err.map(CoreError::from);
        assert!(matches!(err, Some(CoreError::Json(_))));
    }
}
