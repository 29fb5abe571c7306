//! In-memory collaborators for tests and embedded use.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dashmap::DashMap;
use multibook_common::{AccountId, Currency, Money, SubjectId};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::collaborators::{Accounter, SubjectDirectory, Treasury};
use crate::error::{CollaboratorError, CollaboratorResult};
use crate::events::{BalanceAccount, ExchangeRecord, FundsMutationEvent};
use crate::journal::JournalEntry;

/// Subject directory creating subjects on first lookup.
#[derive(Default)]
pub struct InMemorySubjects {
    subjects: DashMap<String, SubjectId>,
}

impl InMemorySubjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}

impl SubjectDirectory for InMemorySubjects {
    fn resolve_or_create(&self, code: &str) -> CollaboratorResult<SubjectId> {
        let subject = self
            .subjects
            .entry(code.to_string())
            .or_insert_with(|| {
                info!(code = %code, "Created subject");
                SubjectId::new(code)
            })
            .clone();
        Ok(subject)
    }
}

/// Account balances plus a journal of every change.
///
/// Accounts must be opened before amounts are posted to them.
#[derive(Default)]
pub struct InMemoryTreasury {
    balances: DashMap<AccountId, Money>,
    journal: Mutex<Vec<JournalEntry>>,
    unavailable: AtomicBool,
    adds: AtomicUsize,
    // 0 when no add is set to fail
    failing_add: AtomicUsize,
}

impl InMemoryTreasury {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account with a zero balance. Existing accounts keep
    /// their balance.
    pub fn open_account(&self, account: &BalanceAccount) {
        self.balances
            .entry(account.id.clone())
            .or_insert_with(|| Money::zero(account.currency.clone()));
    }

    /// Make every following call fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make the `nth` following `add_amount` call fail, once. Counting
    /// starts at 1.
    pub fn fail_add_amount(&self, nth: usize) {
        let target = self.adds.load(Ordering::SeqCst) + nth;
        self.failing_add.store(target, Ordering::SeqCst);
    }

    /// Balance changes in posting order.
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.journal.lock().clone()
    }

    /// Journal entries of one account.
    pub fn entries_for(&self, account: &AccountId) -> Vec<JournalEntry> {
        self.journal
            .lock()
            .iter()
            .filter(|entry| entry.account_id == *account)
            .cloned()
            .collect()
    }

    fn check_available(&self) -> CollaboratorResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CollaboratorError::new("treasury", "treasury is unavailable"));
        }
        Ok(())
    }
}

impl Treasury for InMemoryTreasury {
    fn add_amount(&self, amount: &Money, account: &AccountId) -> CollaboratorResult<()> {
        self.check_available()?;

        let call = self.adds.fetch_add(1, Ordering::SeqCst) + 1;
        if self
            .failing_add
            .compare_exchange(call, 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return Err(CollaboratorError::new(
                "treasury",
                format!("add to {account} failed"),
            ));
        }

        let mut balance = self.balances.get_mut(account).ok_or_else(|| {
            CollaboratorError::new("treasury", format!("unknown account {account}"))
        })?;

        if balance.currency != amount.currency {
            return Err(CollaboratorError::new(
                "treasury",
                format!(
                    "account {account} holds {}, cannot add {}",
                    balance.currency, amount
                ),
            ));
        }

        balance.value += amount.value;
        let entry = JournalEntry::for_change(account.clone(), amount, balance.value);
        drop(balance);

        debug!(account = %account, amount = %amount, "Balance changed");
        self.journal.lock().push(entry);
        Ok(())
    }

    fn account_balance(&self, account: &AccountId) -> CollaboratorResult<Money> {
        self.check_available()?;
        self.balances
            .get(account)
            .map(|balance| balance.clone())
            .ok_or_else(|| CollaboratorError::new("treasury", format!("unknown account {account}")))
    }
}

/// Keeps recorded events in memory.
#[derive(Default)]
pub struct InMemoryAccounter {
    mutations: Mutex<Vec<FundsMutationEvent>>,
    exchanges: Mutex<Vec<ExchangeRecord>>,
    unavailable: AtomicBool,
}

impl InMemoryAccounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn mutations(&self) -> Vec<FundsMutationEvent> {
        self.mutations.lock().clone()
    }

    pub fn exchanges(&self) -> Vec<ExchangeRecord> {
        self.exchanges.lock().clone()
    }

    /// Recorded mutations of one subject.
    pub fn mutations_for(&self, subject: &SubjectId) -> Vec<FundsMutationEvent> {
        self.mutations
            .lock()
            .iter()
            .filter(|event| event.subject == *subject)
            .cloned()
            .collect()
    }

    fn check_available(&self) -> CollaboratorResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CollaboratorError::new("accounter", "accounter is unavailable"));
        }
        Ok(())
    }
}

impl Accounter for InMemoryAccounter {
    fn record_mutation(&self, event: &FundsMutationEvent) -> CollaboratorResult<()> {
        self.check_available()?;
        self.mutations.lock().push(event.clone());
        Ok(())
    }

    fn record_exchange(&self, exchange: &ExchangeRecord) -> CollaboratorResult<()> {
        self.check_available()?;
        self.exchanges.lock().push(exchange.clone());
        Ok(())
    }
}
