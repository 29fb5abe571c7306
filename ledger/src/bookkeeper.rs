//! Caller-facing API over rates, postponement and reconciliation.

use std::sync::Arc;

use multibook_common::{AgentId, Currency, Money, PendingId, Timestamp, UtcDay};
use multibook_fx::{ConversionRate, RateResolver, RateTable};
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use crate::collaborators::{Accounter, SubjectDirectory, Treasury};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::events::{
    BalanceAccount, FundsMutationEvent, PendingEntry, PostponedExchange, PostponedMutationEvent,
};
use crate::postponed::{PendingStream, PostponementLedger, PostponingReasons};
use crate::reconciliation::{
    ExchangeSettlement, MutationSettlement, ReconciliationEngine, ReconciliationReport,
};

/// Outcome of submitting an event for settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission<T> {
    /// Posted right away.
    Settled(T),
    /// Parked in the postponement ledger: no rate yet, or posting stopped
    /// partway and is finished by a later reconciliation.
    Postponed(PendingId),
}

impl<T> Submission<T> {
    pub fn is_postponed(&self) -> bool {
        matches!(self, Submission::Postponed(_))
    }

    pub fn pending_id(&self) -> Option<PendingId> {
        match self {
            Submission::Postponed(id) => Some(*id),
            Submission::Settled(_) => None,
        }
    }

    pub fn settled(&self) -> Option<&T> {
        match self {
            Submission::Settled(settlement) => Some(settlement),
            Submission::Postponed(_) => None,
        }
    }
}

/// Multi-currency bookkeeping entry point.
///
/// Owns the rate table and the postponement ledger and posts through the
/// injected collaborators. All methods take `&self`; share it behind an
/// `Arc` to call from several threads.
pub struct Bookkeeper {
    config: LedgerConfig,
    table: Arc<RateTable>,
    resolver: RateResolver,
    ledger: Arc<PostponementLedger>,
    engine: ReconciliationEngine,
    treasury: Arc<dyn Treasury>,
}

impl Bookkeeper {
    /// Create a bookkeeper with an empty rate table and ledger.
    pub fn new(
        config: LedgerConfig,
        subjects: Arc<dyn SubjectDirectory>,
        treasury: Arc<dyn Treasury>,
        accounter: Arc<dyn Accounter>,
    ) -> LedgerResult<Self> {
        Self::with_parts(
            config,
            Arc::new(RateTable::new()),
            Arc::new(PostponementLedger::new()),
            subjects,
            treasury,
            accounter,
        )
    }

    /// Create a bookkeeper over an existing table and ledger.
    pub fn with_parts(
        config: LedgerConfig,
        table: Arc<RateTable>,
        ledger: Arc<PostponementLedger>,
        subjects: Arc<dyn SubjectDirectory>,
        treasury: Arc<dyn Treasury>,
        accounter: Arc<dyn Accounter>,
    ) -> LedgerResult<Self> {
        config.validate()?;

        let resolver = RateResolver::with_config(table.clone(), &config.fx);
        let engine = ReconciliationEngine::new(
            resolver.clone(),
            ledger.clone(),
            subjects,
            treasury.clone(),
            accounter,
            config.conversion_difference_subject.clone(),
        );

        info!(
            reference_currency = %config.fx.reference_currency,
            max_rate_age_days = config.fx.max_rate_age_days,
            "Bookkeeper ready"
        );

        Ok(Self {
            config,
            table,
            resolver,
            ledger,
            engine,
            treasury,
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn table(&self) -> &Arc<RateTable> {
        &self.table
    }

    pub fn ledger(&self) -> &Arc<PostponementLedger> {
        &self.ledger
    }

    // ========================================================================
    // Rates
    // ========================================================================

    /// Store the rate of `day` for `from -> to`.
    pub fn add_rate(
        &self,
        day: UtcDay,
        from: Currency,
        to: Currency,
        rate: Decimal,
    ) -> LedgerResult<ConversionRate> {
        Ok(self.table.add_rate(day, from, to, rate)?)
    }

    /// Store a rate, then settle whatever on that day it makes priceable.
    ///
    /// A leg to the reference currency can unlock chained pairs, so every
    /// bucket of the day is retried.
    pub fn add_rate_and_reconcile(
        &self,
        day: UtcDay,
        from: Currency,
        to: Currency,
        rate: Decimal,
    ) -> LedgerResult<Vec<ReconciliationReport>> {
        self.add_rate(day, from, to, rate)?;
        self.reconcile_day(day)
    }

    /// Direct multiplier for `day` (today when `None`).
    pub fn get_conversion_multiplier(
        &self,
        day: Option<UtcDay>,
        from: &Currency,
        to: &Currency,
    ) -> Option<Decimal> {
        let day = day.unwrap_or_else(UtcDay::today);
        self.resolver.get_conversion_multiplier(day, from, to)
    }

    /// Latest direct multiplier, else a chain through the reference currency.
    pub fn get_latest_conversion_multiplier(
        &self,
        from: &Currency,
        to: &Currency,
    ) -> LedgerResult<Decimal> {
        Ok(self.resolver.get_latest_conversion_multiplier(from, to)?)
    }

    /// Whether `currency` lacks a recent enough rate against the reference
    /// currency.
    pub fn is_rate_stale(&self, currency: &Currency) -> bool {
        self.table.is_stale(
            currency,
            &self.config.fx.reference_currency,
            self.config.fx.max_rate_age_days,
        )
    }

    // ========================================================================
    // Postponement
    // ========================================================================

    pub fn remember_postponed_mutation(
        &self,
        event: FundsMutationEvent,
        target: Currency,
        custom_rate: Option<Decimal>,
    ) -> LedgerResult<PendingId> {
        self.ledger.remember_exchangeable(event, target, custom_rate)
    }

    pub fn remember_postponed_exchange(
        &self,
        to_buy: Money,
        buy_account: BalanceAccount,
        sell_account: BalanceAccount,
        custom_rate: Option<Decimal>,
        timestamp: Timestamp,
        agent: AgentId,
    ) -> LedgerResult<PendingId> {
        self.ledger.remember_exchange(
            to_buy,
            buy_account,
            sell_account,
            custom_rate,
            timestamp,
            agent,
        )
    }

    pub fn stream_remembered_reasons(&self) -> PostponingReasons {
        self.ledger.stream_postponing_reasons()
    }

    pub fn stream_pending(&self, day: UtcDay, a: &Currency, b: &Currency) -> PendingStream {
        self.ledger.stream_pending(day, a, b)
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    pub fn reconcile(
        &self,
        day: UtcDay,
        a: &Currency,
        b: &Currency,
    ) -> LedgerResult<ReconciliationReport> {
        self.engine.reconcile(day, a, b)
    }

    pub fn reconcile_day(&self, day: UtcDay) -> LedgerResult<Vec<ReconciliationReport>> {
        self.engine.reconcile_day(day)
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Convert a mutation into `target` and post it, or postpone it when
    /// its day has no usable rate.
    ///
    /// An event already in `target` needs no conversion and is rejected as
    /// malformed.
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub fn submit_mutation(
        &self,
        event: FundsMutationEvent,
        target: Currency,
        custom_rate: Option<Decimal>,
    ) -> LedgerResult<Submission<MutationSettlement>> {
        let mut pending = PostponedMutationEvent::new(event, target, custom_rate)?;
        let pair = pending.pair();

        if !self.resolver.can_resolve_on(pending.day(), &pair.from, &pair.to) {
            debug!(day = %pending.day(), "No rate for the event day");
            return Ok(Submission::Postponed(
                self.ledger.remember(PendingEntry::Mutation(pending)),
            ));
        }

        match self.engine.settle_mutation(&mut pending) {
            Ok(settlement) => Ok(Submission::Settled(settlement)),
            Err(err) => self.park_started(PendingEntry::Mutation(pending), err),
        }
    }

    /// Buy `to_buy` into `buy_account` paying from `sell_account`, or
    /// postpone the exchange when its day has no usable rate.
    #[instrument(skip(self, buy_account, sell_account), fields(buy = %buy_account.id, sell = %sell_account.id))]
    pub fn submit_exchange(
        &self,
        to_buy: Money,
        buy_account: BalanceAccount,
        sell_account: BalanceAccount,
        custom_rate: Option<Decimal>,
        timestamp: Timestamp,
        agent: AgentId,
    ) -> LedgerResult<Submission<ExchangeSettlement>> {
        let mut exchange = PostponedExchange::new(
            to_buy,
            buy_account,
            sell_account,
            custom_rate,
            timestamp,
            agent,
        )?;
        let pair = exchange.pair();

        if !self.resolver.can_resolve_on(exchange.day(), &pair.from, &pair.to) {
            debug!(day = %exchange.day(), "No rate for the exchange day");
            return Ok(Submission::Postponed(
                self.ledger.remember(PendingEntry::Exchange(exchange)),
            ));
        }

        match self.engine.settle_exchange(&mut exchange) {
            Ok(settlement) => Ok(Submission::Settled(settlement)),
            Err(err) => self.park_started(PendingEntry::Exchange(exchange), err),
        }
    }

    /// An entry that failed after some of its posts went through is parked
    /// with its progress, so the next reconciliation finishes it. Anything
    /// else returns the error.
    fn park_started<T>(
        &self,
        entry: PendingEntry,
        err: LedgerError,
    ) -> LedgerResult<Submission<T>> {
        if !entry.progress().is_started() {
            return Err(err);
        }

        warn!(
            pending_id = %entry.id(),
            posts_done = entry.progress().posts_done,
            error = %err,
            "Settlement interrupted, entry parked"
        );
        Ok(Submission::Postponed(self.ledger.remember(entry)))
    }

    // ========================================================================
    // Totals
    // ========================================================================

    /// Sum of the accounts' balances expressed in `currency` at the latest
    /// known multipliers, rounded to its minor units.
    pub fn calculate_total_amount(
        &self,
        accounts: &[BalanceAccount],
        currency: &Currency,
    ) -> LedgerResult<Money> {
        let mut total = Decimal::ZERO;

        for account in accounts {
            let balance = self.treasury.account_balance(&account.id)?;
            if balance.currency != account.currency {
                return Err(LedgerError::CurrencyMismatch {
                    expected: account.currency.clone(),
                    actual: balance.currency,
                });
            }

            let multiplier = self.get_latest_conversion_multiplier(&balance.currency, currency)?;
            total += balance.value * multiplier;
        }

        Ok(Money::new(total, currency.clone()).round())
    }
}
