//! Error types shared by all Multibook crates.

use thiserror::Error;

/// Input rejected at construction time.
///
/// Raised for non-positive rates, pairs made of one currency, empty
/// currency codes and similar malformed values. Such values are never
/// stored.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed input: {message}")]
pub struct MalformedInputError {
    /// Human-readable message.
    pub message: String,
    /// Field that caused the rejection (if applicable).
    pub field: Option<String>,
}

impl MalformedInputError {
    /// Create with field.
    pub fn with_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Error code for callers that map errors onto their own protocol.
    pub fn error_code(&self) -> &'static str {
        "MALFORMED_INPUT"
    }
}

/// Result type alias for input validation.
pub type InputResult<T> = std::result::Result<T, MalformedInputError>;
