//! Events waiting for a usable conversion rate.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dashmap::DashMap;
use multibook_common::{AgentId, ConversionPair, Currency, Money, PendingId, Timestamp, UtcDay};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::LedgerResult;
use crate::events::{
    BalanceAccount, FundsMutationEvent, PendingEntry, PostponedExchange, PostponedMutationEvent,
};

/// Day and unordered pair an entry waits on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    day: UtcDay,
    pair: ConversionPair,
}

impl BucketKey {
    fn new(day: UtcDay, pair: &ConversionPair) -> Self {
        Self {
            day,
            pair: pair.canonical(),
        }
    }

    fn lookup(day: UtcDay, a: &Currency, b: &Currency) -> Option<Self> {
        let pair = ConversionPair::new(a.clone(), b.clone()).ok()?;
        Some(Self::new(day, &pair))
    }
}

type Bucket = Arc<Mutex<Vec<PendingEntry>>>;

/// Snapshot of pending entries. Cloning it restarts the sequence.
pub type PendingStream = std::vec::IntoIter<PendingEntry>;

/// Per day, the currencies that have postponed entries on that day.
pub type PostponingReasons = std::collections::btree_map::IntoIter<UtcDay, BTreeSet<Currency>>;

/// Outcome of settling one bucket.
#[derive(Debug)]
pub(crate) struct BucketSettlement<E> {
    /// Entries removed from the ledger, in settlement order.
    pub settled: Vec<PendingEntry>,
    /// First failure; the failing entry and everything after it stay pending.
    pub failure: Option<E>,
}

/// Tracks mutation and exchange events until their (day, pair) bucket can
/// be priced.
///
/// Registration and settlement of one bucket are serialized on that
/// bucket's mutex; distinct buckets proceed independently.
#[derive(Default)]
pub struct PostponementLedger {
    buckets: DashMap<BucketKey, Bucket>,
}

impl PostponementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mutation event to be converted into `target` once a rate
    /// exists.
    ///
    /// The caller has already established that the event cannot be priced
    /// now; this is not checked again.
    pub fn remember_exchangeable(
        &self,
        event: FundsMutationEvent,
        target: Currency,
        custom_rate: Option<Decimal>,
    ) -> LedgerResult<PendingId> {
        let pending = PostponedMutationEvent::new(event, target, custom_rate)?;
        Ok(self.remember(PendingEntry::Mutation(pending)))
    }

    /// Register an exchange buying `to_buy` into `buy_account` and paying
    /// from `sell_account`.
    pub fn remember_exchange(
        &self,
        to_buy: Money,
        buy_account: BalanceAccount,
        sell_account: BalanceAccount,
        custom_rate: Option<Decimal>,
        timestamp: Timestamp,
        agent: AgentId,
    ) -> LedgerResult<PendingId> {
        let pending = PostponedExchange::new(
            to_buy,
            buy_account,
            sell_account,
            custom_rate,
            timestamp,
            agent,
        )?;
        Ok(self.remember(PendingEntry::Exchange(pending)))
    }

    /// Register an already validated entry.
    pub fn remember(&self, entry: PendingEntry) -> PendingId {
        let id = entry.id();
        let key = BucketKey::new(entry.day(), &entry.pair());

        // The Arc clone is taken under the shard lock, which keeps the
        // bucket from being dropped before the push below.
        let bucket = self.buckets.entry(key.clone()).or_default().clone();
        bucket.lock().push(entry);

        info!(
            pending_id = %id,
            day = %key.day,
            pair = %key.pair,
            "Postponed until a rate is available"
        );
        id
    }

    /// Entries waiting on `day` for the pair `a`/`b`, in any order.
    pub fn stream_pending(&self, day: UtcDay, a: &Currency, b: &Currency) -> PendingStream {
        let Some(key) = BucketKey::lookup(day, a, b) else {
            return Vec::new().into_iter();
        };
        let Some(bucket) = self.bucket(&key) else {
            return Vec::new().into_iter();
        };
        let entries = bucket.lock().clone();
        drop(bucket);

        if entries.is_empty() {
            self.drop_if_unused(&key);
        }
        entries.into_iter()
    }

    /// Currencies with postponed entries, grouped by day in ascending order.
    pub fn stream_postponing_reasons(&self) -> PostponingReasons {
        let mut reasons: BTreeMap<UtcDay, BTreeSet<Currency>> = BTreeMap::new();

        self.with_snapshot(|key, entries| {
            let currencies = reasons.entry(key.day).or_default();
            for entry in entries {
                let pair = entry.pair();
                currencies.insert(pair.from);
                currencies.insert(pair.to);
            }
        });

        reasons.into_iter()
    }

    /// Pairs (canonical order) with pending entries on `day`.
    pub fn pending_keys_on(&self, day: UtcDay) -> Vec<ConversionPair> {
        let mut pairs = Vec::new();
        self.with_snapshot(|key, _| {
            if key.day == day {
                pairs.push(key.pair.clone());
            }
        });
        pairs.sort();
        pairs
    }

    /// Get the number of pending entries.
    pub fn len(&self) -> usize {
        let mut total = 0;
        self.with_snapshot(|_, entries| total += entries.len());
        total
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `settle` over the bucket's entries in registration order while
    /// holding the bucket lock, removing each entry it accepts. Stops at the
    /// first failure; whatever `settle` wrote into the failing entry stays
    /// with it.
    pub(crate) fn settle_bucket<E>(
        &self,
        day: UtcDay,
        a: &Currency,
        b: &Currency,
        mut settle: impl FnMut(&mut PendingEntry) -> Result<(), E>,
    ) -> BucketSettlement<E> {
        let mut outcome = BucketSettlement {
            settled: Vec::new(),
            failure: None,
        };

        let Some(key) = BucketKey::lookup(day, a, b) else {
            return outcome;
        };
        let Some(bucket) = self.bucket(&key) else {
            return outcome;
        };

        {
            let mut entries = bucket.lock();
            let mut done = 0;
            for entry in entries.iter_mut() {
                if let Err(e) = settle(entry) {
                    outcome.failure = Some(e);
                    break;
                }
                done += 1;
            }
            outcome.settled = entries.drain(..done).collect();
        }
        drop(bucket);

        self.drop_if_unused(&key);
        debug!(
            day = %key.day,
            pair = %key.pair,
            settled = outcome.settled.len(),
            failed = outcome.failure.is_some(),
            "Bucket settled"
        );
        outcome
    }

    fn bucket(&self, key: &BucketKey) -> Option<Bucket> {
        self.buckets.get(key).map(|bucket| bucket.clone())
    }

    /// Visit every non-empty bucket, then drop the empty ones nobody holds.
    fn with_snapshot(&self, mut visit: impl FnMut(&BucketKey, &[PendingEntry])) {
        let snapshot: Vec<(BucketKey, Bucket)> = self
            .buckets
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut empty = Vec::new();
        for (key, bucket) in snapshot {
            let entries = bucket.lock();
            if entries.is_empty() {
                empty.push(key);
            } else {
                visit(&key, &entries);
            }
        }

        for key in &empty {
            self.drop_if_unused(key);
        }
    }

    /// Remove an empty bucket nobody else holds.
    fn drop_if_unused(&self, key: &BucketKey) {
        self.buckets
            .remove_if(key, |_, bucket| Arc::strong_count(bucket) == 1 && bucket.lock().is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use multibook_common::{AccountId, SubjectId};
    use rust_decimal_macros::dec;

    fn at(day: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 8, day, 12, 0, 0).unwrap()
    }

    fn day(d: u32) -> UtcDay {
        UtcDay::from_ymd(2024, 8, d).unwrap()
    }

    fn purchase(d: u32, currency: Currency) -> FundsMutationEvent {
        FundsMutationEvent::new(
            SubjectId::new("travel"),
            AccountId::new("card-rub"),
            Money::new(dec!(-25), currency),
            at(d),
            AgentId::new("bob"),
        )
    }

    #[test]
    fn test_stream_matches_both_orders() {
        let ledger = PostponementLedger::new();
        let id = ledger
            .remember_exchangeable(purchase(1, Currency::usd()), Currency::rub(), None)
            .unwrap();

        let forward: Vec<_> = ledger
            .stream_pending(day(1), &Currency::usd(), &Currency::rub())
            .collect();
        let backward: Vec<_> = ledger
            .stream_pending(day(1), &Currency::rub(), &Currency::usd())
            .collect();

        assert_eq!(forward.len(), 1);
        assert_eq!(forward, backward);
        assert_eq!(forward[0].id(), id);
        assert_eq!(
            ledger
                .stream_pending(day(2), &Currency::usd(), &Currency::rub())
                .count(),
            0
        );
    }

    #[test]
    fn test_stream_is_restartable() {
        let ledger = PostponementLedger::new();
        ledger
            .remember_exchangeable(purchase(1, Currency::usd()), Currency::rub(), None)
            .unwrap();
        ledger
            .remember_exchangeable(purchase(1, Currency::rub()), Currency::usd(), None)
            .unwrap();

        let stream = ledger.stream_pending(day(1), &Currency::usd(), &Currency::rub());
        assert_eq!(stream.clone().count(), 2);
        assert_eq!(stream.count(), 2);
    }

    #[test]
    fn test_exchange_keyed_by_account_currencies() {
        let ledger = PostponementLedger::new();
        ledger
            .remember_exchange(
                Money::new(dec!(100), Currency::eur()),
                BalanceAccount::new("wallet-eur", Currency::eur(), "EUR wallet"),
                BalanceAccount::new("card-rub", Currency::rub(), "RUB card"),
                None,
                at(3),
                AgentId::new("bob"),
            )
            .unwrap();

        let pending: Vec<_> = ledger
            .stream_pending(day(3), &Currency::rub(), &Currency::eur())
            .collect();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].is_exchange());
    }

    #[test]
    fn test_malformed_registration_rejected() {
        let ledger = PostponementLedger::new();
        assert!(ledger
            .remember_exchangeable(purchase(1, Currency::rub()), Currency::rub(), None)
            .is_err());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_postponing_reasons_by_day() {
        let ledger = PostponementLedger::new();
        ledger
            .remember_exchangeable(purchase(1, Currency::usd()), Currency::rub(), None)
            .unwrap();
        ledger
            .remember_exchangeable(purchase(1, Currency::eur()), Currency::rub(), None)
            .unwrap();
        ledger
            .remember_exchangeable(purchase(2, Currency::gbp()), Currency::usd(), None)
            .unwrap();

        let reasons: Vec<_> = ledger.stream_postponing_reasons().collect();
        assert_eq!(reasons.len(), 2);

        let (first_day, first) = &reasons[0];
        assert_eq!(*first_day, day(1));
        let expected: BTreeSet<Currency> =
            [Currency::usd(), Currency::eur(), Currency::rub()].into_iter().collect();
        assert_eq!(*first, expected);

        let (second_day, second) = &reasons[1];
        assert_eq!(*second_day, day(2));
        assert_eq!(second.len(), 2);
        assert_eq!(ledger.pending_keys_on(day(1)).len(), 2);
    }

    #[test]
    fn test_settle_bucket_keeps_failed_tail() {
        let ledger = PostponementLedger::new();
        for _ in 0..3 {
            ledger
                .remember_exchangeable(purchase(1, Currency::usd()), Currency::rub(), None)
                .unwrap();
        }

        let mut calls = 0;
        let outcome = ledger.settle_bucket(day(1), &Currency::rub(), &Currency::usd(), |_| {
            calls += 1;
            if calls == 2 {
                Err("treasury offline")
            } else {
                Ok(())
            }
        });

        assert_eq!(outcome.settled.len(), 1);
        assert_eq!(outcome.failure, Some("treasury offline"));
        assert_eq!(ledger.len(), 2);

        let outcome =
            ledger.settle_bucket(day(1), &Currency::usd(), &Currency::rub(), |_| Ok::<(), ()>(()));
        assert_eq!(outcome.settled.len(), 2);
        assert!(ledger.is_empty());
        assert_eq!(ledger.stream_postponing_reasons().count(), 0);
    }

    #[test]
    fn test_concurrent_registration_and_settlement() {
        let ledger = PostponementLedger::new();
        let settled = Mutex::new(Vec::new());

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        ledger
                            .remember_exchangeable(purchase(1, Currency::usd()), Currency::rub(), None)
                            .unwrap();
                    }
                });
            }
            scope.spawn(|| {
                for _ in 0..20 {
                    let outcome = ledger.settle_bucket(
                        day(1),
                        &Currency::usd(),
                        &Currency::rub(),
                        |_| Ok::<(), ()>(()),
                    );
                    settled.lock().extend(outcome.settled.into_iter().map(|e| e.id()));
                }
            });
        });

        let outcome =
            ledger.settle_bucket(day(1), &Currency::usd(), &Currency::rub(), |_| Ok::<(), ()>(()));
        let mut ids = settled.into_inner();
        ids.extend(outcome.settled.into_iter().map(|e| e.id()));

        let unique: BTreeSet<_> = ids.iter().copied().collect();
        assert_eq!(ids.len(), 200);
        assert_eq!(unique.len(), 200);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_empty_bucket_held_during_settlement_is_dropped_later() {
        let ledger = PostponementLedger::new();
        ledger
            .remember_exchangeable(purchase(4, Currency::usd()), Currency::rub(), None)
            .unwrap();

        let key = BucketKey::lookup(day(4), &Currency::usd(), &Currency::rub()).unwrap();
        let reader = ledger.bucket(&key).unwrap();
        let outcome =
            ledger.settle_bucket(day(4), &Currency::usd(), &Currency::rub(), |_| Ok::<(), ()>(()));
        assert_eq!(outcome.settled.len(), 1);
        // still referenced by the reader
        assert_eq!(ledger.buckets.len(), 1);

        drop(reader);
        assert_eq!(
            ledger
                .stream_pending(day(4), &Currency::rub(), &Currency::usd())
                .count(),
            0
        );
        assert!(ledger.buckets.is_empty());
    }

    #[test]
    fn test_settle_keeps_progress_of_failed_entry() {
        let ledger = PostponementLedger::new();
        ledger
            .remember_exchangeable(purchase(5, Currency::usd()), Currency::rub(), None)
            .unwrap();

        let outcome = ledger.settle_bucket(day(5), &Currency::usd(), &Currency::rub(), |entry| {
            if let PendingEntry::Mutation(pending) = entry {
                pending.progress.posts_done = 1;
            }
            Err("accounter offline")
        });
        assert!(outcome.settled.is_empty());

        let pending: Vec<_> = ledger
            .stream_pending(day(5), &Currency::usd(), &Currency::rub())
            .collect();
        assert_eq!(pending[0].progress().posts_done, 1);
    }
}
