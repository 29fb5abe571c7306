//! Multibook Ledger
//!
//! Postponement of events that cannot be converted yet and their
//! reconciliation once the rates of their day arrive.
//!
//! Events are posted through three collaborator traits
//! ([`SubjectDirectory`], [`Treasury`], [`Accounter`]); in-memory
//! implementations live in [`memory`].

pub mod bookkeeper;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod events;
pub mod journal;
pub mod memory;
pub mod postponed;
pub mod reconciliation;

pub use bookkeeper::{Bookkeeper, Submission};
pub use collaborators::{Accounter, SubjectDirectory, Treasury};
pub use config::{LedgerConfig, CONVERSION_DIFFERENCE_SUBJECT};
pub use error::{CollaboratorError, CollaboratorResult, LedgerError, LedgerResult};
pub use events::{
    BalanceAccount, ExchangeRecord, FundsMutationEvent, PendingEntry, PostponedExchange,
    PostponedMutationEvent, SettlementProgress,
};
pub use journal::{EntryType, JournalEntry};
pub use memory::{InMemoryAccounter, InMemorySubjects, InMemoryTreasury};
pub use postponed::{PendingStream, PostponementLedger, PostponingReasons};
pub use reconciliation::{
    ExchangeSettlement, MutationSettlement, ReconciliationEngine, ReconciliationReport,
};
