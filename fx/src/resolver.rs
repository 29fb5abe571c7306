//! Conversion multipliers derived from the rate table.

use std::sync::Arc;

use multibook_common::{Currency, UtcDay};
use rust_decimal::Decimal;
use tracing::{debug, instrument};

use crate::config::FxConfig;
use crate::error::{FxError, FxResult};
use crate::rate::{divide, ConversionRate};
use crate::table::RateTable;

/// Derives multipliers from [`RateTable`] entries.
///
/// Holds no state of its own beyond the table handle and the reference
/// currency used as the chaining hub.
#[derive(Clone)]
pub struct RateResolver {
    table: Arc<RateTable>,
    reference: Currency,
}

impl RateResolver {
    pub fn new(table: Arc<RateTable>, reference: Currency) -> Self {
        Self { table, reference }
    }

    pub fn with_config(table: Arc<RateTable>, config: &FxConfig) -> Self {
        Self::new(table, config.reference_currency.clone())
    }

    pub fn table(&self) -> &Arc<RateTable> {
        &self.table
    }

    pub fn reference_currency(&self) -> &Currency {
        &self.reference
    }

    /// Direct rate for `day`, reciprocal applied when only the reverse
    /// direction is stored. `None` when the day has no rate for the pair.
    pub fn get_conversion_multiplier(
        &self,
        day: UtcDay,
        from: &Currency,
        to: &Currency,
    ) -> Option<Decimal> {
        if from == to {
            return Some(Decimal::ONE);
        }
        self.table.get_rate(day, from, to)
    }

    /// Latest direct rate, or a chain through the reference currency built
    /// from each side's latest rate.
    ///
    /// A direct rate wins even when the chain legs are more recent.
    #[instrument(skip(self))]
    pub fn get_latest_conversion_multiplier(
        &self,
        from: &Currency,
        to: &Currency,
    ) -> FxResult<Decimal> {
        if from == to {
            return Ok(Decimal::ONE);
        }

        if let Some(rate) = self.table.latest_rate(from, to) {
            return Ok(rate);
        }

        debug!("No direct rate, chaining through reference currency");
        self.chain(
            from,
            to,
            self.table.latest_entry(from, &self.reference),
            self.table.latest_entry(to, &self.reference),
        )
    }

    /// Rate usable on `day`: the direct rate, else a chain through the
    /// reference currency using that day's legs.
    pub fn resolve_on(&self, day: UtcDay, from: &Currency, to: &Currency) -> FxResult<Decimal> {
        if let Some(rate) = self.get_conversion_multiplier(day, from, to) {
            return Ok(rate);
        }

        self.chain(
            from,
            to,
            self.table.entry(day, from, &self.reference),
            self.table.entry(day, to, &self.reference),
        )
    }

    /// Whether [`RateResolver::resolve_on`] would succeed.
    pub fn can_resolve_on(&self, day: UtcDay, from: &Currency, to: &Currency) -> bool {
        self.resolve_on(day, from, to).is_ok()
    }

    /// `from -> to` as the ratio of both currencies' worth in the reference
    /// currency. Inverted legs stay exact until the final rounding.
    fn chain(
        &self,
        from: &Currency,
        to: &Currency,
        from_leg: Option<ConversionRate>,
        to_leg: Option<ConversionRate>,
    ) -> FxResult<Decimal> {
        let reference = &self.reference;
        if from == reference || to == reference {
            // the direct lookup already covered the only possible leg
            return Err(FxError::no_rate(from, to));
        }

        let from_worth = from_leg.and_then(|leg| leg.exact(from, reference));
        let to_worth = to_leg.and_then(|leg| leg.exact(to, reference));

        match (from_worth, to_worth) {
            (Some(from_worth), Some(to_worth)) => {
                divide(from_worth, to_worth).ok_or_else(|| FxError::no_rate(from, to))
            }
            _ => Err(FxError::no_rate(from, to)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> UtcDay {
        UtcDay::from_ymd(2024, 6, d).unwrap()
    }

    fn setup() -> RateResolver {
        RateResolver::new(Arc::new(RateTable::new()), Currency::rub())
    }

    #[test]
    fn test_reverse_law() {
        let resolver = setup();
        resolver
            .table()
            .add_rate(day(1), Currency::usd(), Currency::eur(), dec!(2))
            .unwrap();

        assert_eq!(
            resolver.get_conversion_multiplier(day(1), &Currency::eur(), &Currency::usd()),
            Some(dec!(0.5))
        );
        assert_eq!(
            resolver.get_conversion_multiplier(day(2), &Currency::eur(), &Currency::usd()),
            None
        );
    }

    #[test]
    fn test_identity_multiplier() {
        let resolver = setup();
        assert_eq!(
            resolver.get_conversion_multiplier(day(1), &Currency::usd(), &Currency::usd()),
            Some(Decimal::ONE)
        );
        assert_eq!(
            resolver
                .get_latest_conversion_multiplier(&Currency::usd(), &Currency::usd())
                .unwrap(),
            Decimal::ONE
        );
    }

    #[test]
    fn test_chaining_law() {
        let resolver = setup();
        let table = resolver.table();
        table
            .add_rate(day(1), Currency::usd(), Currency::rub(), dec!(55))
            .unwrap();
        table
            .add_rate(day(1), Currency::eur(), Currency::rub(), dec!(65))
            .unwrap();

        let rate = resolver
            .get_latest_conversion_multiplier(&Currency::usd(), &Currency::eur())
            .unwrap();
        assert_eq!(rate, dec!(0.8462));
        assert_eq!(rate.to_string(), "0.8462");
    }

    #[test]
    fn test_chaining_with_legs_from_reference() {
        let resolver = setup();
        let table = resolver.table();
        // one RUB buys 55 USD, one RUB buys 65 EUR
        table
            .add_rate(day(1), Currency::rub(), Currency::usd(), dec!(55))
            .unwrap();
        table
            .add_rate(day(1), Currency::rub(), Currency::eur(), dec!(65))
            .unwrap();

        // 65 / 55 = 1.18181.., rounded half-down
        assert_eq!(
            resolver
                .get_latest_conversion_multiplier(&Currency::usd(), &Currency::eur())
                .unwrap(),
            dec!(1.1818)
        );
        assert_eq!(
            resolver
                .resolve_on(day(1), &Currency::usd(), &Currency::eur())
                .unwrap(),
            dec!(1.1818)
        );
    }

    #[test]
    fn test_chaining_with_reference_stored_first() {
        let resolver = setup();
        let table = resolver.table();
        // 1 RUB buys 0.02 USD and 0.01 EUR
        table
            .add_rate(day(1), Currency::rub(), Currency::usd(), dec!(0.02))
            .unwrap();
        table
            .add_rate(day(1), Currency::rub(), Currency::eur(), dec!(0.01))
            .unwrap();

        assert_eq!(
            resolver.resolve_on(day(1), &Currency::usd(), &Currency::eur()).unwrap(),
            dec!(0.5)
        );
        assert_eq!(
            resolver.resolve_on(day(1), &Currency::eur(), &Currency::usd()).unwrap(),
            dec!(2)
        );
    }

    #[test]
    fn test_chaining_missing_leg() {
        let resolver = setup();
        resolver
            .table()
            .add_rate(day(1), Currency::usd(), Currency::rub(), dec!(55))
            .unwrap();

        let result = resolver.get_latest_conversion_multiplier(&Currency::usd(), &Currency::eur());
        assert!(matches!(result, Err(FxError::NoRate { .. })));

        let result = resolver.get_latest_conversion_multiplier(&Currency::gbp(), &Currency::rub());
        assert!(matches!(result, Err(FxError::NoRate { .. })));
    }

    #[test]
    fn test_latest_chain_uses_each_sides_latest_day() {
        let resolver = setup();
        let table = resolver.table();
        table
            .add_rate(day(1), Currency::usd(), Currency::rub(), dec!(50))
            .unwrap();
        table
            .add_rate(day(3), Currency::usd(), Currency::rub(), dec!(60))
            .unwrap();
        table
            .add_rate(day(2), Currency::eur(), Currency::rub(), dec!(80))
            .unwrap();

        assert_eq!(
            resolver
                .get_latest_conversion_multiplier(&Currency::usd(), &Currency::eur())
                .unwrap(),
            dec!(0.75)
        );
        // no same-day legs on day 3
        assert!(resolver.resolve_on(day(3), &Currency::usd(), &Currency::eur()).is_err());
    }

    #[test]
    fn test_stale_direct_rate_wins_over_fresh_chain() {
        let resolver = setup();
        let table = resolver.table();
        table
            .add_rate(day(1), Currency::usd(), Currency::eur(), dec!(0.9))
            .unwrap();
        table
            .add_rate(day(5), Currency::usd(), Currency::rub(), dec!(55))
            .unwrap();
        table
            .add_rate(day(5), Currency::eur(), Currency::rub(), dec!(65))
            .unwrap();

        assert_eq!(
            resolver
                .get_latest_conversion_multiplier(&Currency::usd(), &Currency::eur())
                .unwrap(),
            dec!(0.9)
        );
        // a specific day still prefers its own chain over another day's direct rate
        assert_eq!(
            resolver.resolve_on(day(5), &Currency::usd(), &Currency::eur()).unwrap(),
            dec!(0.8462)
        );
    }
}
