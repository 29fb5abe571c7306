//! Identifier types for bookkeeping entities.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Fresh time-ordered (v7) identifier.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn parse(input: &str) -> Result<Self, uuid::Error> {
                Uuid::parse_str(input).map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a recorded funds-mutation or exchange event.
    EventId
);

uuid_id!(
    /// Identifier of an entry waiting in the postponement ledger.
    PendingId
);

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identifier of a balance account (wallet, card, deposit).
    AccountId
);

string_id!(
    /// Identifier of an accounting subject (expense or income category).
    SubjectId
);

string_id!(
    /// User who recorded an event.
    AgentId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_ids_are_distinct_and_parse_back() {
        let first = EventId::new();
        let second = EventId::new();
        assert_ne!(first, second);
        assert_eq!(EventId::parse(&first.to_string()).unwrap(), first);
        assert!(PendingId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn test_string_ids() {
        let account = AccountId::from("cash-usd");
        assert_eq!(account.as_str(), "cash-usd");
        assert_eq!(SubjectId::new("food").to_string(), "food");
    }
}
