//! Quote model.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use swapsettle_common::{
    Currency, CurrencyPair, FeeBreakdown, Money, QuoteId, Timestamp, TradeType, UserId,
};

/// A priced offer for a conversion, valid until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub user_id: UserId,
    pub trade_type: TradeType,
    pub from_currency: Currency,
    pub to_currency: Currency,
    /// Amount the caller asked about, in `from_currency`.
    pub requested: Money,
    /// Quantity of the base asset.
    pub amount: Money,
    /// Counter units per base unit.
    pub rate: Decimal,
    pub fees: FeeBreakdown,
    /// `amount × rate` in the counter currency.
    pub total: Money,
    /// Debited from the user's `from_currency` wallet on confirmation.
    pub pay: Money,
    /// Credited to the user's `to_currency` wallet on completion.
    pub receive: Money,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

impl Quote {
    /// The market this quote was priced on.
    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(
            self.amount.currency().clone(),
            self.total.currency().clone(),
        )
    }

    /// Whether the quote may still be confirmed at `now`.
    pub fn is_live(&self, now: Timestamp, grace: chrono::Duration) -> bool {
        !swapsettle_common::is_past(self.expires_at, grace, now)
    }
}

/// Request for a quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub user_id: UserId,
    pub from_currency: Currency,
    pub to_currency: Currency,
    /// Decimal string in `from_currency`.
    pub amount: String,
    pub trade_type: TradeType,
}

impl QuoteRequest {
    /// Create a new quote request.
    pub fn new(
        user_id: UserId,
        from_currency: Currency,
        to_currency: Currency,
        amount: impl Into<String>,
        trade_type: TradeType,
    ) -> Self {
        Self {
            user_id,
            from_currency,
            to_currency,
            amount: amount.into(),
            trade_type,
        }
    }
}
