//! Multibook FX
//!
//! Day-stamped exchange rates and the conversion multipliers derived from
//! them.
//!
//! # Features
//!
//! - One rate per day and unordered currency pair, safe under concurrent
//!   inserts
//! - Reverse rates computed as reciprocals at a fixed scale
//! - Two-hop chaining through a reference currency
//! - Staleness checks against the reference currency
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use multibook_common::{Currency, UtcDay};
//! use multibook_fx::{RateResolver, RateTable};
//! use rust_decimal::Decimal;
//!
//! let table = Arc::new(RateTable::new());
//! let day = UtcDay::from_ymd(2024, 1, 15).unwrap();
//! table.add_rate(day, Currency::usd(), Currency::eur(), Decimal::TWO).unwrap();
//!
//! let resolver = RateResolver::new(table, Currency::rub());
//! let back = resolver.get_conversion_multiplier(day, &Currency::eur(), &Currency::usd());
//! assert_eq!(back, Some(Decimal::new(5, 1)));
//! ```

pub mod config;
pub mod error;
pub mod rate;
pub mod resolver;
pub mod table;

pub use config::FxConfig;
pub use error::{FxError, FxResult};
pub use rate::{reciprocal, ConversionRate, RATE_SCALE};
pub use resolver::RateResolver;
pub use table::RateTable;
