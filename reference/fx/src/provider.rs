//! Rate provider trait and test double.

use async_trait::async_trait;
use swapsettle_common::{CurrencyPair, FxRate};

use crate::error::FxResult;

/// Upstream source of market prices.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Get the current price for a market.
    async fn get_rate(&self, pair: &CurrencyPair) -> FxResult<FxRate>;

    /// Check if this provider quotes the given market.
    fn supports_pair(&self, pair: &CurrencyPair) -> bool;

    /// Get all quoted markets.
    fn supported_pairs(&self) -> Vec<CurrencyPair>;
}

/// Mock rate provider for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateProvider {
    name: String,
    rates: dashmap::DashMap<CurrencyPair, rust_decimal::Decimal>,
    failing: std::sync::atomic::AtomicBool,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateProvider {
    /// Create a new mock provider.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rates: dashmap::DashMap::new(),
            failing: std::sync::atomic::AtomicBool::new(false),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Set the price for a market.
    pub fn set_rate(&self, pair: CurrencyPair, price: rust_decimal::Decimal) {
        self.rates.insert(pair, price);
    }

    /// Make every lookup fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    /// Number of upstream lookups served.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateProvider for MockRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_rate(&self, pair: &CurrencyPair) -> FxResult<FxRate> {
        use crate::error::FxError;
        use std::sync::atomic::Ordering;

        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(FxError::ProviderError {
                pair: pair.clone(),
                message: "mock provider unavailable".to_string(),
            });
        }

        self.rates
            .get(pair)
            .map(|price| FxRate::new(pair.clone(), *price, chrono::Utc::now(), self.name.clone()))
            .ok_or_else(|| FxError::RateNotAvailable(pair.clone()))
    }

    fn supports_pair(&self, pair: &CurrencyPair) -> bool {
        self.rates.contains_key(pair)
    }

    fn supported_pairs(&self) -> Vec<CurrencyPair> {
        self.rates.iter().map(|r| r.key().clone()).collect()
    }
}
