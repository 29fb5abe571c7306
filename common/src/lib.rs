//! Multibook Common Types
//!
//! Shared types used across the Multibook crates: currencies, monetary
//! amounts, UTC days, identifiers and input validation errors.

pub mod identifiers;
pub mod monetary;
pub mod error;
pub mod time;
pub mod telemetry;

pub use identifiers::*;
pub use monetary::*;
pub use error::*;
pub use time::*;
