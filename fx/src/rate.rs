//! Stored conversion rates and the fixed-scale arithmetic applied to them.
//!
//! Every multiplier handed out by this crate has at most four fractional
//! digits, rounded half-down, with trailing zeros stripped.

use multibook_common::{ConversionPair, Currency, InputResult, MalformedInputError, UtcDay};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Fractional digits kept for every rate.
pub const RATE_SCALE: u32 = 4;

/// Round to [`RATE_SCALE`] half-down and strip trailing zeros.
pub fn normalize_rate(value: Decimal) -> Decimal {
    value
        .round_dp_with_strategy(RATE_SCALE, RoundingStrategy::MidpointTowardZero)
        .normalize()
}

/// `numerator / denominator` at the rate scale. `None` on a zero
/// denominator or overflow.
pub fn divide(numerator: Decimal, denominator: Decimal) -> Option<Decimal> {
    numerator.checked_div(denominator).map(normalize_rate)
}

/// Reciprocal of a rate at the rate scale.
///
/// Rates above 20000 have a reciprocal below the scale and come back as
/// zero.
pub fn reciprocal(rate: Decimal) -> Option<Decimal> {
    divide(Decimal::ONE, rate)
}

/// Validate and normalize a user-supplied rate.
pub fn validate_rate(rate: Decimal) -> InputResult<Decimal> {
    let normalized = normalize_rate(rate);
    if normalized <= Decimal::ZERO {
        return Err(MalformedInputError::with_field(
            "rate",
            format!("rate must be positive at scale {RATE_SCALE}, got {rate}"),
        ));
    }
    Ok(normalized)
}

/// One rate for one day and pair. `rate` converts `pair.from` into
/// `pair.to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRate {
    pub day: UtcDay,
    pub pair: ConversionPair,
    pub rate: Decimal,
}

impl ConversionRate {
    /// Create a rate, rejecting identical currencies and non-positive values.
    pub fn new(day: UtcDay, from: Currency, to: Currency, rate: Decimal) -> InputResult<Self> {
        Ok(Self {
            day,
            pair: ConversionPair::new(from, to)?,
            rate: validate_rate(rate)?,
        })
    }

    /// The multiplier converting `from` into `to`, reciprocal applied if the
    /// rate is stored the other way round.
    pub fn oriented(&self, from: &Currency, to: &Currency) -> Option<Decimal> {
        if self.pair.from == *from && self.pair.to == *to {
            Some(self.rate)
        } else if self.pair.from == *to && self.pair.to == *from {
            reciprocal(self.rate)
        } else {
            None
        }
    }

    /// Like [`ConversionRate::oriented`] but without rounding the
    /// reciprocal. Used as an intermediate step of chained conversions.
    pub fn exact(&self, from: &Currency, to: &Currency) -> Option<Decimal> {
        if self.pair.from == *from && self.pair.to == *to {
            Some(self.rate)
        } else if self.pair.from == *to && self.pair.to == *from {
            Decimal::ONE.checked_div(self.rate)
        } else {
            None
        }
    }
}
