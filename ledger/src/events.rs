//! Bookkeeping events and the pending entries built from them.

use multibook_common::{
    AccountId, AgentId, ConversionPair, Currency, EventId, InputResult, MalformedInputError,
    Money, PendingId, SubjectId, Timestamp, UtcDay,
};
use multibook_fx::rate::validate_rate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A purchase or an income recorded against a balance account.
///
/// Positive amounts are income, negative amounts are expenses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundsMutationEvent {
    pub id: EventId,
    /// Accounting subject (category).
    pub subject: SubjectId,
    /// Account whose balance changes.
    pub account: AccountId,
    pub amount: Money,
    pub timestamp: Timestamp,
    /// Who recorded the event.
    pub agent: AgentId,
}

impl FundsMutationEvent {
    pub fn new(
        subject: SubjectId,
        account: AccountId,
        amount: Money,
        timestamp: Timestamp,
        agent: AgentId,
    ) -> Self {
        Self {
            id: EventId::new(),
            subject,
            account,
            amount,
            timestamp,
            agent,
        }
    }

    /// UTC day the event belongs to.
    pub fn day(&self) -> UtcDay {
        UtcDay::of(self.timestamp)
    }

    /// Same event expressed in another amount.
    pub fn with_amount(&self, amount: Money) -> Self {
        Self {
            amount,
            ..self.clone()
        }
    }
}

/// Read-only view of an externally stored balance account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BalanceAccount {
    pub id: AccountId,
    pub currency: Currency,
    pub name: String,
}

impl BalanceAccount {
    pub fn new(id: impl Into<AccountId>, currency: Currency, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            currency,
            name: name.into(),
        }
    }
}

/// Posts already applied for a pending entry, and the table rate they
/// were computed with.
///
/// A retried settlement reuses the rate and skips the first `posts_done`
/// posts, so nothing is applied twice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementProgress {
    pub table_rate: Option<Decimal>,
    pub posts_done: usize,
}

impl SettlementProgress {
    pub fn is_started(&self) -> bool {
        self.posts_done > 0
    }
}

/// A mutation event still to be converted into `convert_to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostponedMutationEvent {
    pub id: PendingId,
    pub event: FundsMutationEvent,
    pub convert_to: Currency,
    /// User-supplied multiplier from the event currency to `convert_to`.
    pub custom_rate: Option<Decimal>,
    /// Id of the conversion difference event, fixed across retries.
    pub difference_id: EventId,
    #[serde(default)]
    pub progress: SettlementProgress,
}

impl PostponedMutationEvent {
    pub fn new(
        event: FundsMutationEvent,
        convert_to: Currency,
        custom_rate: Option<Decimal>,
    ) -> InputResult<Self> {
        ConversionPair::new(event.amount.currency.clone(), convert_to.clone())?;
        Ok(Self {
            id: PendingId::new(),
            event,
            convert_to,
            custom_rate: custom_rate.map(validate_rate).transpose()?,
            difference_id: EventId::new(),
            progress: SettlementProgress::default(),
        })
    }

    pub fn day(&self) -> UtcDay {
        self.event.day()
    }

    /// Event currency to target currency.
    pub fn pair(&self) -> ConversionPair {
        ConversionPair {
            from: self.event.amount.currency.clone(),
            to: self.convert_to.clone(),
        }
    }
}

/// A currency exchange waiting for a rate.
///
/// `to_buy` is denominated in the buy account's currency; the amount
/// taken from the sell account is derived on settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostponedExchange {
    pub id: PendingId,
    pub to_buy: Money,
    pub buy_account: BalanceAccount,
    pub sell_account: BalanceAccount,
    /// User-supplied multiplier from the buy currency to the sell currency.
    pub custom_rate: Option<Decimal>,
    pub timestamp: Timestamp,
    pub agent: AgentId,
    /// Id of the exchange record, fixed across retries.
    pub record_id: EventId,
    /// Id of the conversion difference event, fixed across retries.
    pub difference_id: EventId,
    #[serde(default)]
    pub progress: SettlementProgress,
}

impl PostponedExchange {
    pub fn new(
        to_buy: Money,
        buy_account: BalanceAccount,
        sell_account: BalanceAccount,
        custom_rate: Option<Decimal>,
        timestamp: Timestamp,
        agent: AgentId,
    ) -> InputResult<Self> {
        if to_buy.currency != buy_account.currency {
            return Err(MalformedInputError::with_field(
                "to_buy",
                format!(
                    "amount to buy is in {}, buy account {} holds {}",
                    to_buy.currency, buy_account.id, buy_account.currency
                ),
            ));
        }
        if to_buy.value <= Decimal::ZERO {
            return Err(MalformedInputError::with_field(
                "to_buy",
                "amount to buy must be positive",
            ));
        }
        ConversionPair::new(buy_account.currency.clone(), sell_account.currency.clone())?;

        Ok(Self {
            id: PendingId::new(),
            to_buy,
            buy_account,
            sell_account,
            custom_rate: custom_rate.map(validate_rate).transpose()?,
            timestamp,
            agent,
            record_id: EventId::new(),
            difference_id: EventId::new(),
            progress: SettlementProgress::default(),
        })
    }

    pub fn day(&self) -> UtcDay {
        UtcDay::of(self.timestamp)
    }

    /// Buy currency to sell currency.
    pub fn pair(&self) -> ConversionPair {
        ConversionPair {
            from: self.buy_account.currency.clone(),
            to: self.sell_account.currency.clone(),
        }
    }
}

/// Anything the postponement ledger can hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingEntry {
    Mutation(PostponedMutationEvent),
    Exchange(PostponedExchange),
}

impl PendingEntry {
    pub fn id(&self) -> PendingId {
        match self {
            PendingEntry::Mutation(m) => m.id,
            PendingEntry::Exchange(x) => x.id,
        }
    }

    pub fn day(&self) -> UtcDay {
        match self {
            PendingEntry::Mutation(m) => m.day(),
            PendingEntry::Exchange(x) => x.day(),
        }
    }

    pub fn pair(&self) -> ConversionPair {
        match self {
            PendingEntry::Mutation(m) => m.pair(),
            PendingEntry::Exchange(x) => x.pair(),
        }
    }

    pub fn is_exchange(&self) -> bool {
        matches!(self, PendingEntry::Exchange(_))
    }

    pub fn progress(&self) -> &SettlementProgress {
        match self {
            PendingEntry::Mutation(m) => &m.progress,
            PendingEntry::Exchange(x) => &x.progress,
        }
    }
}

/// A settled exchange as handed to the accounter.
///
/// `sold` is the sell-side amount at the table rate; a custom rate's
/// excess is recorded separately as a conversion difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRecord {
    pub id: EventId,
    pub bought: Money,
    pub buy_account: AccountId,
    pub sold: Money,
    pub sell_account: AccountId,
    /// Table multiplier, buy currency to sell currency.
    pub rate: Decimal,
    pub timestamp: Timestamp,
    pub agent: AgentId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn purchase(amount: Decimal, currency: Currency) -> FundsMutationEvent {
        FundsMutationEvent::new(
            SubjectId::new("food"),
            AccountId::new("card-rub"),
            Money::new(amount, currency),
            Utc.with_ymd_and_hms(2024, 7, 1, 18, 30, 0).unwrap(),
            AgentId::new("alice"),
        )
    }

    #[test]
    fn test_postponed_mutation_key() {
        let pending =
            PostponedMutationEvent::new(purchase(dec!(-10), Currency::usd()), Currency::rub(), None)
                .unwrap();
        assert_eq!(pending.day(), UtcDay::from_ymd(2024, 7, 1).unwrap());
        assert!(pending.pair().contains_ignore_order(&Currency::rub(), &Currency::usd()));
    }

    #[test]
    fn test_postponed_mutation_validation() {
        let same_currency =
            PostponedMutationEvent::new(purchase(dec!(-10), Currency::rub()), Currency::rub(), None);
        assert!(same_currency.is_err());

        let bad_rate = PostponedMutationEvent::new(
            purchase(dec!(-10), Currency::usd()),
            Currency::rub(),
            Some(dec!(-90)),
        );
        assert!(bad_rate.is_err());

        let rounded = PostponedMutationEvent::new(
            purchase(dec!(-10), Currency::usd()),
            Currency::rub(),
            Some(dec!(90.123456)),
        )
        .unwrap();
        assert_eq!(rounded.custom_rate, Some(dec!(90.1235)));
    }

    #[test]
    fn test_exchange_validation() {
        let usd = BalanceAccount::new("wallet-usd", Currency::usd(), "USD wallet");
        let rub = BalanceAccount::new("card-rub", Currency::rub(), "RUB card");
        let now = Utc::now();

        assert!(PostponedExchange::new(
            Money::new(dec!(100), Currency::usd()),
            usd.clone(),
            rub.clone(),
            None,
            now,
            AgentId::new("alice"),
        )
        .is_ok());

        // amount not in the buy account currency
        assert!(PostponedExchange::new(
            Money::new(dec!(100), Currency::rub()),
            usd.clone(),
            rub.clone(),
            None,
            now,
            AgentId::new("alice"),
        )
        .is_err());

        // both accounts in one currency
        assert!(PostponedExchange::new(
            Money::new(dec!(100), Currency::usd()),
            usd.clone(),
            usd,
            None,
            now,
            AgentId::new("alice"),
        )
        .is_err());
    }
}
