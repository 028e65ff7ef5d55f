//! Liquidity provider contract.

use async_trait::async_trait;
use swapsettle_common::SwapSettleError;
use thiserror::Error;

use crate::messages::{InstantOrderRequest, ProviderAck, WithdrawRequest};

/// Failure of a synchronous provider call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Provider answered with a non-success status.
    #[error("Provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Provider could not be reached.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// Provider answered with a body we could not decode.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl From<ProviderError> for SwapSettleError {
    fn from(err: ProviderError) -> Self {
        SwapSettleError::ProviderError(err.to_string())
    }
}

/// External execution venue for orders and withdrawals.
#[async_trait]
pub trait LiquidityProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Execute an instant order at the locked price.
    async fn execute_order(&self, request: &InstantOrderRequest) -> Result<ProviderAck, ProviderError>;

    /// Send funds out of a sub-account.
    async fn withdraw(&self, request: &WithdrawRequest) -> Result<ProviderAck, ProviderError>;
}

/// Mock liquidity provider for testing.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Default)]
pub struct MockLiquidityProvider {
    orders: parking_lot::Mutex<Vec<InstantOrderRequest>>,
    withdrawals: parking_lot::Mutex<Vec<WithdrawRequest>>,
    failure: parking_lot::Mutex<Option<ProviderError>>,
    ack_status: parking_lot::Mutex<Option<String>>,
    counter: std::sync::atomic::AtomicU64,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockLiquidityProvider {
    /// Create a provider that acknowledges everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call with `error` until cleared with `None`.
    pub fn set_failure(&self, error: Option<ProviderError>) {
        *self.failure.lock() = error;
    }

    /// Acknowledge with `status` instead of `submitted`.
    pub fn set_ack_status(&self, status: &str) {
        *self.ack_status.lock() = Some(status.to_string());
    }

    /// Orders received so far.
    pub fn orders(&self) -> Vec<InstantOrderRequest> {
        self.orders.lock().clone()
    }

    /// Withdrawals received so far.
    pub fn withdrawals(&self) -> Vec<WithdrawRequest> {
        self.withdrawals.lock().clone()
    }

    fn ack(&self, prefix: &str, reference: &str) -> Result<ProviderAck, ProviderError> {
        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }
        let n = self
            .counter
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1;
        Ok(ProviderAck {
            id: format!("{}_{}", prefix, n),
            status: self
                .ack_status
                .lock()
                .clone()
                .unwrap_or_else(|| "submitted".to_string()),
            reference: Some(reference.to_string()),
        })
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl LiquidityProvider for MockLiquidityProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn execute_order(&self, request: &InstantOrderRequest) -> Result<ProviderAck, ProviderError> {
        self.orders.lock().push(request.clone());
        self.ack("ord", &request.reference)
    }

    async fn withdraw(&self, request: &WithdrawRequest) -> Result<ProviderAck, ProviderError> {
        self.withdrawals.lock().push(request.clone());
        self.ack("wd", &request.reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::OrderSide;

    fn make_test_order() -> InstantOrderRequest {
        InstantOrderRequest {
            account_id: "acct-1".to_string(),
            market: "btcngn".to_string(),
            side: OrderSide::Buy,
            unit: "btc".to_string(),
            volume: "0.002".to_string(),
            price: "50000000".to_string(),
            reference: "q_1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_mock_acks_with_sequential_ids() {
        let provider = MockLiquidityProvider::new();

        let first = provider.execute_order(&make_test_order()).await.unwrap();
        let second = provider.execute_order(&make_test_order()).await.unwrap();

        assert_eq!(first.id, "ord_1");
        assert_eq!(second.id, "ord_2");
        assert_eq!(first.reference.as_deref(), Some("q_1"));
        assert_eq!(provider.orders().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let provider = MockLiquidityProvider::new();
        provider.set_failure(Some(ProviderError::Unavailable("down".into())));

        let err = provider.execute_order(&make_test_order()).await.unwrap_err();
        let core: SwapSettleError = err.into();
        assert_eq!(core.error_code(), "PROVIDER_ERROR");
        assert!(!core.is_retryable());
    }
}
