//! Ledger error types.

use multibook_common::{Currency, CurrencyMismatchError, MalformedInputError};
use multibook_fx::FxError;
use thiserror::Error;

use crate::reconciliation::ReconciliationReport;

/// Failure reported by an external collaborator (treasury, accounter,
/// subject directory).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{collaborator} failed: {message}")]
pub struct CollaboratorError {
    /// Which collaborator failed.
    pub collaborator: String,
    /// Human-readable message.
    pub message: String,
}

impl CollaboratorError {
    pub fn new(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }
}

/// Result type for collaborator calls.
pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

/// Errors raised by postponement and reconciliation.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Fx(#[from] FxError),

    #[error(transparent)]
    Malformed(#[from] MalformedInputError),

    /// An external post failed; the pending entry was left in place.
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// Amount currency does not match the account it is posted to.
    #[error("Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: Currency, actual: Currency },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A reconciliation pass stopped early. `reports` covers what was
    /// settled before and after the failure; those entries left the ledger.
    #[error("Reconciliation incomplete after {} settled entries: {source}", settled_count(.reports))]
    Reconciliation {
        reports: Vec<ReconciliationReport>,
        source: Box<LedgerError>,
    },
}

fn settled_count(reports: &[ReconciliationReport]) -> usize {
    reports.iter().map(ReconciliationReport::settled).sum()
}

impl From<CurrencyMismatchError> for LedgerError {
    fn from(err: CurrencyMismatchError) -> Self {
        LedgerError::CurrencyMismatch {
            expected: err.expected,
            actual: err.actual,
        }
    }
}

impl LedgerError {
    /// Check if re-running the operation may succeed.
    ///
    /// Only collaborator failures qualify: the entry stays pending and a
    /// later reconciliation pass picks it up again.
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Collaborator(_) => true,
            LedgerError::Reconciliation { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Reports of entries settled by a pass that then failed.
    pub fn partial_reports(&self) -> &[ReconciliationReport] {
        match self {
            LedgerError::Reconciliation { reports, .. } => reports,
            _ => &[],
        }
    }

    /// Get error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::Fx(err) => err.error_code(),
            LedgerError::Malformed(_) => "MALFORMED_INPUT",
            LedgerError::Collaborator(_) => "COLLABORATOR_FAILED",
            LedgerError::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            LedgerError::Configuration(_) => "CONFIGURATION_ERROR",
            LedgerError::Reconciliation { .. } => "RECONCILIATION_INCOMPLETE",
        }
    }
}

/// Result type alias for ledger operations.
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;
