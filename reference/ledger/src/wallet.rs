//! Wallet balance tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use swapsettle_common::{Currency, Money, MoneyResult, TradeReference, UserId};
use uuid::Uuid;

/// A user's holdings in one currency, at the currency's native scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBalance {
    /// Owner.
    pub user_id: UserId,
    /// Currency.
    pub currency: Currency,
    /// Total held, including reserved funds.
    pub balance: Money,
    /// Reserved for in-flight trades and withdrawals.
    pub pending: Money,
    /// When this balance was last updated.
    pub updated_at: DateTime<Utc>,
}

impl WalletBalance {
    /// Create a new zero balance.
    pub fn zero(user_id: UserId, currency: Currency, now: DateTime<Utc>) -> Self {
        let scale = currency.scale();
        Self {
            user_id,
            balance: Money::zero(currency.clone(), scale),
            pending: Money::zero(currency.clone(), scale),
            currency,
            updated_at: now,
        }
    }

    /// Get available balance (`balance - pending`).
    pub fn available(&self) -> MoneyResult<Money> {
        self.balance.checked_sub(&self.pending)
    }

    /// Check if an amount could be reserved right now.
    pub fn can_reserve(&self, amount: &Money) -> MoneyResult<bool> {
        Ok(self.available()?.compare(amount)?.is_ge())
    }
}

/// Journal record of one balance mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    /// Unique change ID.
    pub id: Uuid,
    /// Wallet owner.
    pub user_id: UserId,
    /// Change type.
    pub change_type: BalanceChangeType,
    /// Amount moved.
    pub amount: Money,
    /// Balance after change.
    pub balance_after: Money,
    /// Pending after change.
    pub pending_after: Money,
    /// Trade reference the change belongs to.
    pub reference: TradeReference,
    /// When the change occurred.
    pub timestamp: DateTime<Utc>,
}

/// Type of balance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceChangeType {
    /// Funds arrive (`balance += x`).
    Credit,
    /// Hold funds for a trade (`pending += x`).
    Reserve,
    /// Drop a hold (`pending -= x`).
    Release,
    /// Spend held funds (`pending -= x`, `balance -= x`).
    Commit,
}

impl std::fmt::Display for BalanceChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BalanceChangeType::Credit => "credit",
            BalanceChangeType::Reserve => "reserve",
            BalanceChangeType::Release => "release",
            BalanceChangeType::Commit => "commit",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_operations() {
        let mut wallet = WalletBalance::zero(UserId::new("user_1"), Currency::ngn(), Utc::now());
        wallet.balance = Money::native(1_000_000, Currency::ngn());
        wallet.pending = Money::native(200_000, Currency::ngn());

        assert_eq!(wallet.available().unwrap().to_string(), "8000.00");
        assert!(wallet
            .can_reserve(&Money::native(800_000, Currency::ngn()))
            .unwrap());
        assert!(!wallet
            .can_reserve(&Money::native(800_001, Currency::ngn()))
            .unwrap());
    }
}
