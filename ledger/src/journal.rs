//! Journal entries kept by the in-memory treasury.

use chrono::{DateTime, Utc};
use multibook_common::{AccountId, Money};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type of journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    /// Balance increased.
    Credit,
    /// Balance decreased.
    Debit,
}

/// One balance change of one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Unique entry ID.
    pub id: Uuid,
    /// Account affected.
    pub account_id: AccountId,
    /// Entry type (debit or credit).
    pub entry_type: EntryType,
    /// Absolute amount.
    pub amount: Money,
    /// Balance after this entry.
    pub balance_after: Decimal,
    /// When this entry was created.
    pub created_at: DateTime<Utc>,
}

impl JournalEntry {
    /// Entry for a signed change; negative amounts become debits.
    pub fn for_change(account_id: AccountId, change: &Money, balance_after: Decimal) -> Self {
        let entry_type = if change.is_negative() {
            EntryType::Debit
        } else {
            EntryType::Credit
        };

        Self {
            id: Uuid::now_v7(),
            account_id,
            entry_type,
            amount: Money::new(change.value.abs(), change.currency.clone()),
            balance_after,
            created_at: Utc::now(),
        }
    }

    /// The change with its sign restored.
    pub fn signed_amount(&self) -> Decimal {
        match self.entry_type {
            EntryType::Credit => self.amount.value,
            EntryType::Debit => -self.amount.value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multibook_common::Currency;
    use rust_decimal_macros::dec;

    #[test]
    fn test_entry_type_from_sign() {
        let debit = JournalEntry::for_change(
            AccountId::new("card"),
            &Money::new(dec!(-12.50), Currency::usd()),
            dec!(87.50),
        );
        assert_eq!(debit.entry_type, EntryType::Debit);
        assert_eq!(debit.amount.value, dec!(12.50));
        assert_eq!(debit.signed_amount(), dec!(-12.50));

        let credit = JournalEntry::for_change(
            AccountId::new("card"),
            &Money::new(dec!(5), Currency::usd()),
            dec!(92.50),
        );
        assert_eq!(credit.entry_type, EntryType::Credit);
    }
}
