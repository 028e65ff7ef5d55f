//! Rate caching with TTL support.

use std::sync::Arc;

use chrono::Duration;
use dashmap::DashMap;
use swapsettle_common::{constants, Clock, CurrencyPair, FxRate, SystemClock, Timestamp};
use tracing::debug;

/// Cached rate entry.
#[derive(Debug, Clone)]
struct CacheEntry {
    rate: FxRate,
    cached_at: Timestamp,
}

impl CacheEntry {
    fn is_valid(&self, now: Timestamp, ttl: Duration) -> bool {
        now.signed_duration_since(self.cached_at) < ttl && self.rate.is_usable()
    }
}

/// Configuration for rate cache.
#[derive(Debug, Clone)]
pub struct RateCacheConfig {
    /// Lifetime of a cached rate.
    pub ttl: Duration,
    /// Maximum number of entries.
    pub max_entries: usize,
}

impl Default for RateCacheConfig {
    fn default() -> Self {
        Self {
            ttl: constants::rate_cache_ttl(),
            max_entries: 1024,
        }
    }
}

/// Thread-safe rate cache with TTL.
pub struct RateCache {
    cache: DashMap<CurrencyPair, CacheEntry>,
    config: RateCacheConfig,
    clock: Arc<dyn Clock>,
}

impl RateCache {
    /// Create a new rate cache on the wall clock.
    pub fn new(config: RateCacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a rate cache driven by the given clock.
    pub fn with_clock(config: RateCacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache: DashMap::new(),
            config,
            clock,
        }
    }

    /// Get a rate from cache if still fresh.
    pub fn get(&self, pair: &CurrencyPair) -> Option<FxRate> {
        let now = self.clock.now();

        if let Some(entry) = self.cache.get(pair) {
            if entry.is_valid(now, self.config.ttl) {
                debug!(pair = %pair, "Cache hit");
                return Some(entry.rate.clone());
            }
            drop(entry);
            self.cache
                .remove_if(pair, |_, e| !e.is_valid(now, self.config.ttl));
            debug!(pair = %pair, "Cache entry expired");
        }

        None
    }

    /// Insert a rate into cache.
    pub fn insert(&self, rate: FxRate) {
        if self.cache.len() >= self.config.max_entries && !self.cache.contains_key(&rate.pair) {
            self.evict_expired();
        }

        let entry = CacheEntry {
            cached_at: self.clock.now(),
            rate,
        };
        self.cache.insert(entry.rate.pair.clone(), entry);
    }

    /// Remove a rate from cache.
    pub fn remove(&self, pair: &CurrencyPair) {
        self.cache.remove(pair);
    }

    /// Clear all cached rates.
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Get the number of entries in cache.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Evict expired entries.
    pub fn evict_expired(&self) {
        let now = self.clock.now();
        let ttl = self.config.ttl;
        self.cache.retain(|_, entry| entry.is_valid(now, ttl));
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let total = self.cache.len();
        let valid = self
            .cache
            .iter()
            .filter(|e| e.is_valid(now, self.config.ttl))
            .count();

        CacheStats {
            total_entries: total,
            valid_entries: valid,
            expired_entries: total - valid,
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use swapsettle_common::{Currency, ManualClock};

    fn make_rate(base: Currency, counter: Currency) -> FxRate {
        FxRate::new(
            CurrencyPair::new(base, counter),
            dec!(50000000),
            Utc::now(),
            "TEST",
        )
    }

    fn setup_cache() -> (RateCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let cache = RateCache::with_clock(RateCacheConfig::default(), clock.clone());
        (cache, clock)
    }

    #[test]
    fn test_cache_insert_and_get() {
        let (cache, _) = setup_cache();
        let rate = make_rate(Currency::btc(), Currency::ngn());
        let pair = rate.pair.clone();

        cache.insert(rate.clone());

        let cached = cache.get(&pair).unwrap();
        assert_eq!(cached.price, rate.price);
    }

    #[test]
    fn test_cache_miss() {
        let (cache, _) = setup_cache();
        let pair = CurrencyPair::new(Currency::eth(), Currency::ngn());

        assert!(cache.get(&pair).is_none());
    }

    #[test]
    fn test_cache_expiry() {
        let (cache, clock) = setup_cache();
        let rate = make_rate(Currency::btc(), Currency::ngn());
        let pair = rate.pair.clone();

        cache.insert(rate);
        clock.advance(Duration::seconds(4));
        assert!(cache.get(&pair).is_some());

        clock.advance(Duration::seconds(1));
        assert!(cache.get(&pair).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stats_count_expired() {
        let (cache, clock) = setup_cache();
        cache.insert(make_rate(Currency::btc(), Currency::ngn()));
        clock.advance(Duration::seconds(10));
        cache.insert(make_rate(Currency::eth(), Currency::ngn()));

        let stats = cache.stats();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.valid_entries, 1);
        assert_eq!(stats.expired_entries, 1);

        cache.evict_expired();
        assert_eq!(cache.len(), 1);
    }
}
