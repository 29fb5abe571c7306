//! FX error types.

use multibook_common::{ConversionPair, Currency, MalformedInputError, UtcDay};
use thiserror::Error;

/// Errors that can occur while storing or resolving rates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FxError {
    /// A rate for this day and pair exists already, in either direction.
    #[error("Rate for {pair} on {day} is already recorded")]
    DuplicateRate { day: UtcDay, pair: ConversionPair },

    /// Neither a direct nor a chained rate exists.
    #[error("No rate available for {from} -> {to}")]
    NoRate { from: Currency, to: Currency },

    #[error(transparent)]
    Malformed(#[from] MalformedInputError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl FxError {
    pub(crate) fn no_rate(from: &Currency, to: &Currency) -> Self {
        FxError::NoRate {
            from: from.clone(),
            to: to.clone(),
        }
    }

    /// Get error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            FxError::DuplicateRate { .. } => "DUPLICATE_RATE",
            FxError::NoRate { .. } => "NO_RATE",
            FxError::Malformed(_) => "MALFORMED_INPUT",
            FxError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;
