//! Day-stamped rate storage.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use multibook_common::{ConversionPair, Currency, UtcDay};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::{FxError, FxResult};
use crate::rate::ConversionRate;

/// Rates of one unordered pair, by day.
type DaySeries = BTreeMap<UtcDay, ConversionRate>;

/// Thread-safe table holding at most one rate per day and unordered pair.
///
/// All writes go through one lock, so two concurrent inserts for the same
/// key cannot both succeed.
#[derive(Default)]
pub struct RateTable {
    series: RwLock<HashMap<ConversionPair, DaySeries>>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a rate converting `from` into `to` on `day`.
    ///
    /// Fails with [`FxError::DuplicateRate`] if the day already has a rate
    /// for this pair in either direction.
    pub fn add_rate(
        &self,
        day: UtcDay,
        from: Currency,
        to: Currency,
        rate: Decimal,
    ) -> FxResult<ConversionRate> {
        let entry = ConversionRate::new(day, from, to, rate)?;
        let key = entry.pair.canonical();

        let mut series = self.series.write();
        let days = series.entry(key).or_default();
        if days.contains_key(&day) {
            debug!(day = %day, pair = %entry.pair, "Rejected duplicate rate");
            return Err(FxError::DuplicateRate {
                day,
                pair: entry.pair,
            });
        }
        days.insert(day, entry.clone());
        drop(series);

        info!(day = %day, pair = %entry.pair, rate = %entry.rate, "Rate recorded");
        Ok(entry)
    }

    /// Stored entry for `day`, whatever its orientation.
    pub fn entry(&self, day: UtcDay, from: &Currency, to: &Currency) -> Option<ConversionRate> {
        let key = Self::key(from, to)?;
        self.series.read().get(&key)?.get(&day).cloned()
    }

    /// Most recent stored entry for the pair.
    pub fn latest_entry(&self, from: &Currency, to: &Currency) -> Option<ConversionRate> {
        let key = Self::key(from, to)?;
        self.series
            .read()
            .get(&key)?
            .last_key_value()
            .map(|(_, rate)| rate.clone())
    }

    /// Rate converting `from` into `to` on `day`.
    pub fn get_rate(&self, day: UtcDay, from: &Currency, to: &Currency) -> Option<Decimal> {
        self.entry(day, from, to)?.oriented(from, to)
    }

    /// Most recent rate converting `from` into `to`.
    pub fn latest_rate(&self, from: &Currency, to: &Currency) -> Option<Decimal> {
        self.latest_entry(from, to)?.oriented(from, to)
    }

    /// Whether `currency` lacks a rate against `reference` recorded within
    /// the last `max_age_days` days.
    pub fn is_stale(&self, currency: &Currency, reference: &Currency, max_age_days: u32) -> bool {
        self.is_stale_at(currency, reference, max_age_days, UtcDay::today())
    }

    /// [`RateTable::is_stale`] against an explicit current day.
    pub fn is_stale_at(
        &self,
        currency: &Currency,
        reference: &Currency,
        max_age_days: u32,
        today: UtcDay,
    ) -> bool {
        if currency == reference {
            return false;
        }

        let oldest_fresh = today.days_before(max_age_days);
        match self.latest_entry(currency, reference) {
            Some(latest) => latest.day < oldest_fresh,
            None => true,
        }
    }

    /// Days that have at least one rate, ascending.
    pub fn days(&self) -> BTreeSet<UtcDay> {
        self.series
            .read()
            .values()
            .flat_map(|days| days.keys().copied())
            .collect()
    }

    /// All rates recorded for `day`.
    pub fn rates_on(&self, day: UtcDay) -> Vec<ConversionRate> {
        self.series
            .read()
            .values()
            .filter_map(|days| days.get(&day).cloned())
            .collect()
    }

    /// Get the number of stored rates.
    pub fn len(&self) -> usize {
        self.series.read().values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key(from: &Currency, to: &Currency) -> Option<ConversionPair> {
        ConversionPair::new(from.clone(), to.clone())
            .ok()
            .map(|pair| pair.canonical())
    }
}
