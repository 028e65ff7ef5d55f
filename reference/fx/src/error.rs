//! Rate source error types.

use rust_decimal::Decimal;
use swapsettle_common::{CurrencyPair, SwapSettleError};
use thiserror::Error;

/// Errors that can occur while obtaining a rate.
#[derive(Debug, Clone, Error)]
pub enum FxError {
    /// Rate not available for the requested currency pair.
    #[error("Rate not available for {0}")]
    RateNotAvailable(CurrencyPair),

    /// Provider quoted a zero or negative price.
    #[error("Non-positive rate {price} for {pair}")]
    NonPositiveRate { pair: CurrencyPair, price: Decimal },

    /// Provider returned an error.
    #[error("Rate provider error for {pair}: {message}")]
    ProviderError { pair: CurrencyPair, message: String },
}

impl FxError {
    /// The market the failure relates to.
    pub fn pair(&self) -> &CurrencyPair {
        match self {
            FxError::RateNotAvailable(pair) => pair,
            FxError::NonPositiveRate { pair, .. } => pair,
            FxError::ProviderError { pair, .. } => pair,
        }
    }
}

impl From<FxError> for SwapSettleError {
    fn from(err: FxError) -> Self {
        SwapSettleError::RateUnavailable {
            pair: err.pair().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Result type for rate operations.
pub type FxResult<T> = Result<T, FxError>;
