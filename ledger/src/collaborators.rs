//! Contracts of the external services reconciliation posts to.
//!
//! Persistence, transactions and account creation live behind these
//! traits. Implementations are expected to apply each call atomically.

use multibook_common::{AccountId, Money, SubjectId};

use crate::error::CollaboratorResult;
use crate::events::{ExchangeRecord, FundsMutationEvent};

/// Lookup of accounting subjects by well-known code.
pub trait SubjectDirectory: Send + Sync {
    /// Return the subject registered under `code`, creating it if missing.
    fn resolve_or_create(&self, code: &str) -> CollaboratorResult<SubjectId>;
}

/// Balance account storage.
pub trait Treasury: Send + Sync {
    /// Add `amount` (negative to withdraw) to the account balance.
    fn add_amount(&self, amount: &Money, account: &AccountId) -> CollaboratorResult<()>;

    /// Current balance in the account's own currency.
    fn account_balance(&self, account: &AccountId) -> CollaboratorResult<Money>;
}

/// Event journal of the bookkeeping system.
pub trait Accounter: Send + Sync {
    fn record_mutation(&self, event: &FundsMutationEvent) -> CollaboratorResult<()>;

    fn record_exchange(&self, exchange: &ExchangeRecord) -> CollaboratorResult<()>;
}
