//! Settlement of postponed entries once their rate is known.

use std::collections::BTreeMap;
use std::sync::Arc;

use multibook_common::{AccountId, ConversionPair, Currency, Money, UtcDay};
use multibook_fx::RateResolver;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::collaborators::{Accounter, SubjectDirectory, Treasury};
use crate::error::{LedgerError, LedgerResult};
use crate::events::{
    ExchangeRecord, FundsMutationEvent, PendingEntry, PostponedExchange, PostponedMutationEvent,
    SettlementProgress,
};
use crate::postponed::PostponementLedger;

/// A mutation event as it was posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationSettlement {
    /// The event at the table rate, as recorded with the accounter.
    pub booked: FundsMutationEvent,
    /// Amount actually added to the account.
    pub posted: Money,
    /// `posted - booked`, recorded against the conversion difference subject.
    pub difference: Option<FundsMutationEvent>,
}

/// An exchange as it was posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeSettlement {
    pub record: ExchangeRecord,
    /// Sell-side amount at the table rate minus the amount actually sold,
    /// recorded against the conversion difference subject.
    pub difference: Option<FundsMutationEvent>,
}

/// Summary of one reconciliation pass over a (day, pair) bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub day: UtcDay,
    pub pair: ConversionPair,
    pub mutations_settled: usize,
    pub exchanges_settled: usize,
    /// Total booked conversion difference per currency.
    pub differences: BTreeMap<Currency, Decimal>,
}

impl ReconciliationReport {
    fn new(day: UtcDay, pair: ConversionPair) -> Self {
        Self {
            day,
            pair,
            mutations_settled: 0,
            exchanges_settled: 0,
            differences: BTreeMap::new(),
        }
    }

    /// Number of entries removed from the ledger.
    pub fn settled(&self) -> usize {
        self.mutations_settled + self.exchanges_settled
    }

    fn add_difference(&mut self, difference: Option<&FundsMutationEvent>) {
        if let Some(event) = difference {
            *self
                .differences
                .entry(event.amount.currency.clone())
                .or_insert(Decimal::ZERO) += event.amount.value;
        }
    }
}

/// One call to a collaborator made while settling an entry.
enum Post {
    Record(FundsMutationEvent),
    Amount { amount: Money, account: AccountId },
    Exchange(ExchangeRecord),
}

/// Replays postponed entries through the treasury and accounter.
///
/// Every entry is settled as a fixed list of posts. Progress through that
/// list is stored on the entry, so a retry after a failed post resumes
/// with the failed one instead of repeating the earlier ones.
pub struct ReconciliationEngine {
    resolver: RateResolver,
    ledger: Arc<PostponementLedger>,
    subjects: Arc<dyn SubjectDirectory>,
    treasury: Arc<dyn Treasury>,
    accounter: Arc<dyn Accounter>,
    difference_subject: String,
}

impl ReconciliationEngine {
    pub fn new(
        resolver: RateResolver,
        ledger: Arc<PostponementLedger>,
        subjects: Arc<dyn SubjectDirectory>,
        treasury: Arc<dyn Treasury>,
        accounter: Arc<dyn Accounter>,
        difference_subject: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            ledger,
            subjects,
            treasury,
            accounter,
            difference_subject: difference_subject.into(),
        }
    }

    /// Settle every entry pending on `day` for the pair `a`/`b`.
    ///
    /// Entries leave the ledger only once all their posts succeeded. The
    /// first failure ends the pass; that entry and the ones after it stay
    /// pending and [`LedgerError::Reconciliation`] carries the report of
    /// what was settled before it.
    #[instrument(skip(self))]
    pub fn reconcile(
        &self,
        day: UtcDay,
        a: &Currency,
        b: &Currency,
    ) -> LedgerResult<ReconciliationReport> {
        let pair = ConversionPair::new(a.clone(), b.clone())?;
        let mut report = ReconciliationReport::new(day, pair);

        let outcome = self.ledger.settle_bucket(day, a, b, |entry| -> LedgerResult<()> {
            let difference = match entry {
                PendingEntry::Mutation(pending) => {
                    let settlement = self.settle_mutation(pending)?;
                    report.mutations_settled += 1;
                    settlement.difference
                }
                PendingEntry::Exchange(pending) => {
                    let settlement = self.settle_exchange(pending)?;
                    report.exchanges_settled += 1;
                    settlement.difference
                }
            };
            report.add_difference(difference.as_ref());
            Ok(())
        });

        if let Some(err) = outcome.failure {
            warn!(
                day = %day,
                pair = %report.pair,
                settled = report.settled(),
                error = %err,
                "Reconciliation stopped, remaining entries stay pending"
            );
            return Err(LedgerError::Reconciliation {
                reports: vec![report],
                source: Box::new(err),
            });
        }

        if report.settled() > 0 {
            info!(
                day = %day,
                pair = %report.pair,
                mutations = report.mutations_settled,
                exchanges = report.exchanges_settled,
                "Reconciled postponed entries"
            );
        }
        Ok(report)
    }

    /// Settle every bucket of `day` that can be priced now, directly or
    /// through the reference currency. Buckets still lacking a rate are
    /// left alone.
    ///
    /// A failing bucket does not stop the others. If any failed, the
    /// first error is returned together with the reports of everything
    /// that was settled.
    pub fn reconcile_day(&self, day: UtcDay) -> LedgerResult<Vec<ReconciliationReport>> {
        let mut reports = Vec::new();
        let mut failure = None;

        for pair in self.ledger.pending_keys_on(day) {
            if !self.resolver.can_resolve_on(day, &pair.from, &pair.to) {
                debug!(day = %day, pair = %pair, "Still no rate");
                continue;
            }

            match self.reconcile(day, &pair.from, &pair.to) {
                Ok(report) => reports.push(report),
                Err(LedgerError::Reconciliation {
                    reports: partial,
                    source,
                }) => {
                    reports.extend(partial);
                    failure.get_or_insert(source);
                }
                Err(err) => {
                    failure.get_or_insert(Box::new(err));
                }
            }
        }

        match failure {
            Some(source) => Err(LedgerError::Reconciliation { reports, source }),
            None => Ok(reports),
        }
    }

    /// Post a pending mutation converted into its target currency at the
    /// rate of its day.
    ///
    /// With a custom rate the account receives the amount at that rate
    /// while the event is booked at the table rate; the gap goes to the
    /// conversion difference subject. On failure the posts made so far are
    /// kept in `pending.progress`.
    pub fn settle_mutation(
        &self,
        pending: &mut PostponedMutationEvent,
    ) -> LedgerResult<MutationSettlement> {
        let event = &pending.event;
        let target = &pending.convert_to;
        let table_rate = self.table_rate(
            &mut pending.progress,
            event.day(),
            &event.amount.currency,
            target,
        )?;
        let effective = pending.custom_rate.unwrap_or(table_rate);

        let posted = event.amount.convert(effective, target);
        let booked = event.with_amount(event.amount.convert(table_rate, target));
        let residue = posted.checked_sub(&booked.amount)?;

        let difference = if residue.is_zero() {
            None
        } else {
            Some(FundsMutationEvent {
                id: pending.difference_id,
                subject: self.subjects.resolve_or_create(&self.difference_subject)?,
                account: event.account.clone(),
                amount: residue,
                timestamp: event.timestamp,
                agent: event.agent.clone(),
            })
        };

        let mut posts = vec![
            Post::Record(booked.clone()),
            Post::Amount {
                amount: posted.clone(),
                account: event.account.clone(),
            },
        ];
        posts.extend(difference.clone().map(Post::Record));
        self.apply(&posts, &mut pending.progress)?;

        debug!(
            event_id = %event.id,
            rate = %effective,
            posted = %posted,
            "Mutation settled"
        );

        Ok(MutationSettlement {
            booked,
            posted,
            difference,
        })
    }

    /// Post a pending exchange at the rate of its day: credit the buy
    /// account, debit the sell account.
    ///
    /// The exchange is recorded at the table rate; with a custom rate the
    /// extra amount taken from the sell account is recorded as a
    /// conversion difference on that account.
    pub fn settle_exchange(
        &self,
        pending: &mut PostponedExchange,
    ) -> LedgerResult<ExchangeSettlement> {
        let buy = &pending.buy_account;
        let sell = &pending.sell_account;

        let table_rate = self.table_rate(
            &mut pending.progress,
            UtcDay::of(pending.timestamp),
            &buy.currency,
            &sell.currency,
        )?;
        let effective = pending.custom_rate.unwrap_or(table_rate);

        let sold = pending.to_buy.convert(effective, &sell.currency);
        let booked_sold = pending.to_buy.convert(table_rate, &sell.currency);
        let residue = booked_sold.checked_sub(&sold)?;

        let difference = if residue.is_zero() {
            None
        } else {
            Some(FundsMutationEvent {
                id: pending.difference_id,
                subject: self.subjects.resolve_or_create(&self.difference_subject)?,
                account: sell.id.clone(),
                amount: residue,
                timestamp: pending.timestamp,
                agent: pending.agent.clone(),
            })
        };

        let record = ExchangeRecord {
            id: pending.record_id,
            bought: pending.to_buy.clone(),
            buy_account: buy.id.clone(),
            sold: booked_sold,
            sell_account: sell.id.clone(),
            rate: table_rate,
            timestamp: pending.timestamp,
            agent: pending.agent.clone(),
        };

        let mut posts = vec![
            Post::Amount {
                amount: pending.to_buy.clone(),
                account: buy.id.clone(),
            },
            Post::Amount {
                amount: -sold.clone(),
                account: sell.id.clone(),
            },
            Post::Exchange(record.clone()),
        ];
        posts.extend(difference.clone().map(Post::Record));
        self.apply(&posts, &mut pending.progress)?;

        debug!(
            exchange_id = %record.id,
            rate = %effective,
            bought = %record.bought,
            sold = %sold,
            "Exchange settled"
        );

        Ok(ExchangeSettlement { record, difference })
    }

    /// Table rate of an entry, resolved on the first attempt and reused on
    /// retries.
    fn table_rate(
        &self,
        progress: &mut SettlementProgress,
        day: UtcDay,
        from: &Currency,
        to: &Currency,
    ) -> LedgerResult<Decimal> {
        if let Some(rate) = progress.table_rate {
            return Ok(rate);
        }
        let rate = self.resolver.resolve_on(day, from, to)?;
        progress.table_rate = Some(rate);
        Ok(rate)
    }

    /// Make the posts not yet recorded in `progress`, in order.
    fn apply(&self, posts: &[Post], progress: &mut SettlementProgress) -> LedgerResult<()> {
        if progress.is_started() {
            debug!(skipped = progress.posts_done, "Resuming settlement");
        }

        for post in posts.iter().skip(progress.posts_done) {
            match post {
                Post::Record(event) => self.accounter.record_mutation(event)?,
                Post::Amount { amount, account } => self.treasury.add_amount(amount, account)?,
                Post::Exchange(record) => self.accounter.record_exchange(record)?,
            }
            progress.posts_done += 1;
        }
        Ok(())
    }
}
