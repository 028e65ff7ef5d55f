//! Error types for SwapSettle.

use crate::{Currency, InvalidTransition, Money, MoneyError, QuoteId, TradeStatus, UserId};
use thiserror::Error;

/// Main error type for SwapSettle operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwapSettleError {
    /// Bad input: non-positive amount, same-currency swap, wrong trade type.
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Currency outside the supported set.
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(Currency),

    /// Amount is malformed, non-positive or too precise.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Rate source failed or returned a non-positive price.
    #[error("Rate unavailable for {pair}: {reason}")]
    RateUnavailable { pair: String, reason: String },

    /// Quote is unknown, expired, or not owned by the caller.
    #[error("Quote expired: {0}")]
    QuoteExpired(QuoteId),

    /// Quote already turned into a trade.
    #[error("Quote already consumed: {0}")]
    QuoteAlreadyConsumed(QuoteId),

    /// Requested amount exceeds the available balance.
    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: String, requested: String },

    /// Requested amount is below the provider minimum.
    #[error("Amount below minimum {minimum}")]
    BelowMinimum { minimum: String },

    /// Synchronous provider call failed.
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// Webhook signature check failed.
    #[error("Webhook authentication failed")]
    WebhookAuthentication,

    /// Trade not found.
    #[error("Trade not found: {0}")]
    TradeNotFound(String),

    /// Invalid state transition.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: TradeStatus, to: TradeStatus },

    /// Account is not allowed to transact.
    #[error("Account not active: {0}")]
    AccountFrozen(UserId),

    /// Storage collaborator failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Fixed-point arithmetic failed.
    #[error("Money error: {0}")]
    Money(#[from] MoneyError),
}

impl SwapSettleError {
    /// Create a validation error for a field.
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        SwapSettleError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create an insufficient balance error with display amounts.
    pub fn insufficient_balance(available: &Money, requested: &Money) -> Self {
        SwapSettleError::InsufficientBalance {
            available: available.to_string(),
            requested: requested.to_string(),
        }
    }

    /// Check if the caller may retry the same request.
    ///
    /// Provider errors are deliberately excluded: a retry must be a new
    /// attempt with a fresh reference.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SwapSettleError::RateUnavailable { .. } | SwapSettleError::Store(_)
        )
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            SwapSettleError::Validation { .. } => "VALIDATION_ERROR",
            SwapSettleError::UnsupportedCurrency(_) => "UNSUPPORTED_CURRENCY",
            SwapSettleError::InvalidAmount(_) => "INVALID_AMOUNT",
            SwapSettleError::RateUnavailable { .. } => "RATE_UNAVAILABLE",
            SwapSettleError::QuoteExpired(_) => "QUOTE_EXPIRED",
            SwapSettleError::QuoteAlreadyConsumed(_) => "QUOTE_ALREADY_CONSUMED",
            SwapSettleError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            SwapSettleError::BelowMinimum { .. } => "BELOW_MINIMUM",
            SwapSettleError::ProviderError(_) => "PROVIDER_ERROR",
            SwapSettleError::WebhookAuthentication => "WEBHOOK_AUTHENTICATION_ERROR",
            SwapSettleError::TradeNotFound(_) => "TRADE_NOT_FOUND",
            SwapSettleError::InvalidTransition { .. } => "INVALID_TRANSITION",
            SwapSettleError::AccountFrozen(_) => "ACCOUNT_FROZEN",
            SwapSettleError::Store(_) => "STORE_ERROR",
            SwapSettleError::Configuration(_) => "CONFIGURATION_ERROR",
            SwapSettleError::Money(_) => "INVALID_AMOUNT",
        }
    }
}

impl From<InvalidTransition> for SwapSettleError {
    fn from(err: InvalidTransition) -> Self {
        SwapSettleError::InvalidTransition {
            from: err.from,
            to: err.to,
        }
    }
}

/// Result type alias for SwapSettle operations.
pub type Result<T> = std::result::Result<T, SwapSettleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_balance_strings() {
        let available = Money::from_minor(1, Currency::btc(), 8);
        let requested = Money::from_minor(2, Currency::btc(), 8);

        let err = SwapSettleError::insufficient_balance(&available, &requested);
        assert_eq!(
            err,
            SwapSettleError::InsufficientBalance {
                available: "0.00000001".to_string(),
                requested: "0.00000002".to_string(),
            }
        );
        assert_eq!(err.error_code(), "INSUFFICIENT_BALANCE");
    }

    #[test]
    fn test_provider_error_not_retryable() {
        assert!(!SwapSettleError::ProviderError("timeout".into()).is_retryable());
        assert!(SwapSettleError::RateUnavailable {
            pair: "BTC/NGN".into(),
            reason: "down".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_money_error_converts() {
        let err: SwapSettleError = MoneyError::Overflow.into();
        assert_eq!(err.error_code(), "INVALID_AMOUNT");
    }
}
