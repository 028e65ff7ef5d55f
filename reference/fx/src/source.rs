//! Rate source: provider lookups behind a short-lived cache.

use std::sync::Arc;

use rust_decimal::Decimal;
use swapsettle_common::{Clock, CurrencyPair, FxRate};
use tracing::{debug, instrument, warn};

use crate::cache::{CacheStats, RateCache, RateCacheConfig};
use crate::error::{FxError, FxResult};
use crate::provider::RateProvider;

/// Current market prices, never stale beyond the cache TTL.
pub struct RateSource {
    provider: Arc<dyn RateProvider>,
    cache: RateCache,
}

impl RateSource {
    /// Create a rate source over the given provider.
    pub fn new(
        provider: Arc<dyn RateProvider>,
        config: RateCacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            cache: RateCache::with_clock(config, clock),
        }
    }

    /// Get the current price for a market.
    ///
    /// A provider failure is returned as-is; no previously cached value
    /// past its TTL is ever substituted.
    #[instrument(skip(self), fields(pair = %pair, provider = self.provider.name()))]
    pub async fn get_rate(&self, pair: &CurrencyPair) -> FxResult<FxRate> {
        if let Some(cached) = self.cache.get(pair) {
            debug!("Using cached rate");
            return Ok(cached);
        }

        let rate = self.provider.get_rate(pair).await.map_err(|e| {
            warn!(error = %e, "Rate lookup failed");
            e
        })?;

        if rate.price <= Decimal::ZERO {
            warn!(price = %rate.price, "Provider quoted a non-positive price");
            return Err(FxError::NonPositiveRate {
                pair: pair.clone(),
                price: rate.price,
            });
        }

        self.cache.insert(rate.clone());
        Ok(rate)
    }

    /// Name of the upstream provider.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Markets the upstream provider quotes.
    pub fn supported_pairs(&self) -> Vec<CurrencyPair> {
        self.provider.supported_pairs()
    }

    /// Drop cached prices past their TTL.
    pub fn cleanup(&self) {
        self.cache.evict_expired();
    }

    /// Cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
