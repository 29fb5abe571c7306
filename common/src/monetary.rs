//! Monetary types: currencies, amounts and conversion pairs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;
use thiserror::Error;

use crate::error::{InputResult, MalformedInputError};

/// Currency code such as `USD` or `RUB`.
///
/// Codes are opaque: two currencies are equal when their upper-cased codes
/// are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Currency from a code; surrounding blanks are dropped and the code
    /// is upper-cased.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_uppercase())
    }

    /// Create a currency, rejecting blank codes.
    pub fn parse(code: &str) -> InputResult<Self> {
        let currency = Self::new(code);
        if currency.0.is_empty() {
            return Err(MalformedInputError::with_field(
                "currency",
                "currency code cannot be empty",
            ));
        }
        Ok(currency)
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    /// Minor units of the currency (ISO 4217 exponent), 2 unless listed.
    pub fn decimal_places(&self) -> u32 {
        const ZERO_DECIMALS: [&str; 4] = ["JPY", "KRW", "VND", "CLP"];
        const THREE_DECIMALS: [&str; 4] = ["BHD", "KWD", "OMR", "TND"];

        let code = self.code();
        if ZERO_DECIMALS.contains(&code) {
            0
        } else if THREE_DECIMALS.contains(&code) {
            3
        } else {
            2
        }
    }

    pub fn rub() -> Self {
        Self::new("RUB")
    }

    pub fn usd() -> Self {
        Self::new("USD")
    }

    pub fn eur() -> Self {
        Self::new("EUR")
    }

    pub fn gbp() -> Self {
        Self::new("GBP")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Currency {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl From<String> for Currency {
    fn from(code: String) -> Self {
        Self::new(code)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

/// Signed amount in one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub value: Decimal,
    pub currency: Currency,
}

impl Money {
    pub fn new(value: Decimal, currency: Currency) -> Self {
        Self { value, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.value.is_sign_negative() && !self.value.is_zero()
    }

    /// Same amount cut to the currency's minor units.
    pub fn round(&self) -> Self {
        Self::new(
            self.value.round_dp(self.currency.decimal_places()),
            self.currency.clone(),
        )
    }

    /// Amount in `target` after applying `multiplier`, rounded to the
    /// target's minor units.
    pub fn convert(&self, multiplier: Decimal, target: &Currency) -> Money {
        Money::new(self.value * multiplier, target.clone()).round()
    }

    /// `self - other`; both must share a currency.
    pub fn checked_sub(&self, other: &Money) -> Result<Money, CurrencyMismatchError> {
        self.same_currency(other)?;
        Ok(Money::new(self.value - other.value, self.currency.clone()))
    }

    /// `self + other`; both must share a currency.
    pub fn checked_add(&self, other: &Money) -> Result<Money, CurrencyMismatchError> {
        self.same_currency(other)?;
        Ok(Money::new(self.value + other.value, self.currency.clone()))
    }

    fn same_currency(&self, other: &Money) -> Result<(), CurrencyMismatchError> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(CurrencyMismatchError {
                expected: self.currency.clone(),
                actual: other.currency.clone(),
            })
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.currency)
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money::new(-self.value, self.currency)
    }
}

/// Arithmetic across two currencies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Currency mismatch: expected {expected}, got {actual}")]
pub struct CurrencyMismatchError {
    pub expected: Currency,
    pub actual: Currency,
}

/// Two distinct currencies a rate converts between.
///
/// The pair is directed (`from` -> `to`) but rate storage treats it as
/// unordered; see [`ConversionPair::canonical`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversionPair {
    pub from: Currency,
    pub to: Currency,
}

impl ConversionPair {
    /// Create a pair, rejecting identical currencies.
    pub fn new(from: Currency, to: Currency) -> InputResult<Self> {
        if from == to {
            return Err(MalformedInputError::with_field(
                "pair",
                format!("conversion pair needs two distinct currencies, got {from}/{to}"),
            ));
        }
        Ok(Self { from, to })
    }

    /// Whether the pair is made of `a` and `b`, in any order.
    pub fn contains_ignore_order(&self, a: &Currency, b: &Currency) -> bool {
        (self.from == *a && self.to == *b) || (self.from == *b && self.to == *a)
    }

    /// Same currencies, opposite direction.
    pub fn inverse(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
        }
    }

    /// Order-independent form, lower code first.
    pub fn canonical(&self) -> Self {
        if self.from <= self.to {
            self.clone()
        } else {
            self.inverse()
        }
    }
}

impl fmt::Display for ConversionPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.from, self.to)
    }
}
