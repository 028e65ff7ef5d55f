//! Quote service: prices a conversion and issues a short-lived quote.

use std::sync::Arc;

use chrono::Duration;
use swapsettle_common::{
    constants, AssetKind, Clock, Currency, CurrencyPair, Money, QuoteId, Result, SwapSettleError,
    TradeType, UserId,
};
use tracing::{info, instrument};

use crate::book::{QuoteBook, QuoteBookStats};
use crate::cache::{CacheStats, RateCacheConfig};
use crate::fees::FeeSchedule;
use crate::provider::RateProvider;
use crate::quote::{Quote, QuoteRequest};
use crate::source::RateSource;

/// Configuration for the quote service.
#[derive(Debug, Clone)]
pub struct QuoteConfig {
    /// How long a quote stays confirmable.
    pub quote_ttl: Duration,
    /// Skew allowance past expiry at confirmation time.
    pub confirmation_grace: Duration,
    /// Upstream rate cache lifetime.
    pub rate_cache_ttl: Duration,
    /// Currencies a quote may use.
    pub supported_currencies: Vec<Currency>,
    /// Maximum quotes held before expired ones are evicted.
    pub max_entries: usize,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            quote_ttl: constants::quote_ttl(),
            confirmation_grace: constants::confirmation_grace(),
            rate_cache_ttl: constants::rate_cache_ttl(),
            supported_currencies: vec![
                Currency::ngn(),
                Currency::usd(),
                Currency::btc(),
                Currency::eth(),
                Currency::usdt(),
            ],
            max_entries: 100_000,
        }
    }
}

impl QuoteConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = env_secs("SWAPSETTLE_QUOTE_TTL_SECS") {
            config.quote_ttl = secs;
        }

        if let Some(secs) = env_secs("SWAPSETTLE_QUOTE_GRACE_SECS") {
            config.confirmation_grace = secs;
        }

        if let Some(secs) = env_secs("SWAPSETTLE_RATE_CACHE_TTL_SECS") {
            config.rate_cache_ttl = secs;
        }

        if let Ok(list) = std::env::var("SWAPSETTLE_SUPPORTED_CURRENCIES") {
            config.supported_currencies = list
                .split(',')
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .map(Currency::new)
                .collect();
        }

        if let Ok(max) = std::env::var("SWAPSETTLE_MAX_QUOTES") {
            if let Ok(max) = max.parse() {
                config.max_entries = max;
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.quote_ttl <= Duration::zero() {
            return Err("Quote TTL must be positive".to_string());
        }

        if self.confirmation_grace < Duration::zero() {
            return Err("Confirmation grace cannot be negative".to_string());
        }

        if self.rate_cache_ttl >= self.quote_ttl {
            return Err("Rate cache TTL must be shorter than the quote TTL".to_string());
        }

        if self.supported_currencies.is_empty() {
            return Err("At least one supported currency is required".to_string());
        }

        if self.max_entries == 0 {
            return Err("Quote book capacity cannot be 0".to_string());
        }

        Ok(())
    }

    /// Check if a currency may be quoted.
    pub fn supports(&self, currency: &Currency) -> bool {
        self.supported_currencies.contains(currency)
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .map(Duration::seconds)
}

/// Issues quotes and guards their single use.
pub struct QuoteService {
    rates: RateSource,
    book: QuoteBook,
    fees: FeeSchedule,
    config: QuoteConfig,
    clock: Arc<dyn Clock>,
}

impl QuoteService {
    /// Create a new quote service.
    pub fn new(
        provider: Arc<dyn RateProvider>,
        config: QuoteConfig,
        fees: FeeSchedule,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = RateCacheConfig {
            ttl: config.rate_cache_ttl,
            ..Default::default()
        };

        Self {
            rates: RateSource::new(provider, cache, clock.clone()),
            book: QuoteBook::new(config.confirmation_grace, config.max_entries),
            fees,
            config,
            clock,
        }
    }

    /// Price a conversion and store the resulting quote.
    #[instrument(skip(self, request), fields(
        user_id = %request.user_id,
        from = %request.from_currency,
        to = %request.to_currency,
        trade_type = %request.trade_type
    ))]
    pub async fn get_quote(&self, request: QuoteRequest) -> Result<Quote> {
        let from = request.from_currency.clone();
        let to = request.to_currency.clone();

        if !request.trade_type.is_quotable() {
            return Err(SwapSettleError::validation(
                format!("{} cannot be quoted", request.trade_type),
                "type",
            ));
        }

        if from == to {
            return Err(SwapSettleError::validation(
                "Source and target currency must differ",
                "toCurrency",
            ));
        }

        for currency in [&from, &to] {
            if !self.config.supports(currency) {
                return Err(SwapSettleError::UnsupportedCurrency(currency.clone()));
            }
        }

        let pair = Self::pair_for(request.trade_type, &from, &to)?;

        let requested = Money::parse(&request.amount, from.clone(), from.scale())
            .map_err(|e| SwapSettleError::InvalidAmount(e.to_string()))?;
        if !requested.is_positive() {
            return Err(SwapSettleError::InvalidAmount(
                "amount must be greater than zero".to_string(),
            ));
        }

        let rate = self.rates.get_rate(&pair).await?.price;
        let base = pair.base.clone();
        let counter = pair.counter.clone();

        let amount = if request.trade_type == TradeType::Buy {
            requested.div_rate(rate, base.clone(), base.scale())?
        } else {
            requested.clone()
        };
        if !amount.is_positive() {
            return Err(SwapSettleError::InvalidAmount(format!(
                "amount rounds to zero {}",
                base
            )));
        }

        let total = amount.mul_rate(rate, counter.clone(), counter.scale())?;
        let fees = self.fees.apply(&total)?;

        let (pay, receive) = if request.trade_type == TradeType::Buy {
            (total.checked_add(&fees.total)?, amount.clone())
        } else {
            (amount.clone(), total.checked_sub(&fees.total)?)
        };
        if !receive.is_positive() {
            return Err(SwapSettleError::InvalidAmount(
                "amount does not cover fees".to_string(),
            ));
        }

        let created_at = self.clock.now();
        let quote = Quote {
            id: QuoteId::new(),
            user_id: request.user_id,
            trade_type: request.trade_type,
            from_currency: from,
            to_currency: to,
            requested,
            amount,
            rate,
            fees,
            total,
            pay,
            receive,
            created_at,
            expires_at: created_at + self.config.quote_ttl,
        };

        info!(
            quote_id = %quote.id,
            pair = %pair,
            rate = %rate,
            total = %quote.total,
            expires_at = %quote.expires_at,
            "Quote issued"
        );

        self.book.insert(quote.clone(), created_at);
        Ok(quote)
    }

    /// Resolve the priced market for a trade type.
    ///
    /// The base is always the crypto leg; for a swap it is the source asset.
    fn pair_for(trade_type: TradeType, from: &Currency, to: &Currency) -> Result<CurrencyPair> {
        let shape = (from.kind(), to.kind());
        match (trade_type, shape) {
            (TradeType::Buy, (AssetKind::Fiat, AssetKind::Crypto)) => {
                Ok(CurrencyPair::new(to.clone(), from.clone()))
            }
            (TradeType::Sell, (AssetKind::Crypto, AssetKind::Fiat))
            | (TradeType::Swap, (AssetKind::Crypto, AssetKind::Crypto)) => {
                Ok(CurrencyPair::new(from.clone(), to.clone()))
            }
            (trade_type, _) => Err(SwapSettleError::validation(
                format!("{} is not valid from {} to {}", trade_type, from, to),
                "type",
            )),
        }
    }

    /// Take a quote for confirmation.
    pub fn consume(&self, id: &QuoteId, user_id: &UserId) -> Result<Quote> {
        self.book.consume(id, user_id, self.clock.now())
    }

    /// Release a consumed quote whose confirmation created no trade.
    pub fn restore(&self, id: &QuoteId) {
        self.book.restore(id);
    }

    /// Get a stored quote.
    pub fn get(&self, id: &QuoteId) -> Option<Quote> {
        self.book.get(id)
    }

    /// The fee schedule applied to quotes.
    pub fn fee_schedule(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Service configuration.
    pub fn config(&self) -> &QuoteConfig {
        &self.config
    }

    /// Drop expired quotes and cached rates.
    pub fn cleanup(&self) -> usize {
        self.rates.cleanup();
        self.book.cleanup_expired(self.clock.now())
    }

    /// Get service statistics.
    pub fn stats(&self) -> QuoteServiceStats {
        QuoteServiceStats {
            book: self.book.stats(self.clock.now()),
            cache: self.rates.stats(),
        }
    }
}

/// Quote service statistics.
#[derive(Debug, Clone)]
pub struct QuoteServiceStats {
    pub book: QuoteBookStats,
    pub cache: CacheStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockRateProvider;
    use rust_decimal_macros::dec;
    use swapsettle_common::ManualClock;

    struct Fixture {
        service: QuoteService,
        provider: Arc<MockRateProvider>,
        clock: Arc<ManualClock>,
    }

    fn setup_service() -> Fixture {
        let provider = Arc::new(MockRateProvider::new("test"));
        provider.set_rate(
            CurrencyPair::new(Currency::btc(), Currency::ngn()),
            dec!(50000000),
        );
        provider.set_rate(
            CurrencyPair::new(Currency::btc(), Currency::eth()),
            dec!(20.5),
        );
        let clock = Arc::new(ManualClock::default());
        let service = QuoteService::new(
            provider.clone(),
            QuoteConfig::default(),
            FeeSchedule::default(),
            clock.clone(),
        );
        Fixture {
            service,
            provider,
            clock,
        }
    }

    fn buy_request(amount: &str) -> QuoteRequest {
        QuoteRequest::new(
            UserId::new("user_1"),
            Currency::ngn(),
            Currency::btc(),
            amount,
            TradeType::Buy,
        )
    }

    #[tokio::test]
    async fn test_buy_quote() {
        let fx = setup_service();

        let quote = fx.service.get_quote(buy_request("100000")).await.unwrap();

        assert_eq!(quote.rate, dec!(50000000));
        assert_eq!(quote.amount.to_string(), "0.00200000");
        assert_eq!(quote.amount.currency(), &Currency::btc());
        assert_eq!(quote.total.to_string(), "100000.00");
        assert_eq!(quote.fees.platform_fee.to_string(), "1600.00");
        assert_eq!(quote.fees.processing_fee.to_string(), "1400.00");
        assert_eq!(quote.fees.total.to_string(), "3000.00");
        assert_eq!(quote.pay.to_string(), "103000.00");
        assert_eq!(quote.receive, quote.amount);
        assert_eq!(quote.expires_at - quote.created_at, constants::quote_ttl());
    }

    #[tokio::test]
    async fn test_sell_quote() {
        let fx = setup_service();
        let request = QuoteRequest::new(
            UserId::new("user_1"),
            Currency::btc(),
            Currency::ngn(),
            "0.002",
            TradeType::Sell,
        );

        let quote = fx.service.get_quote(request).await.unwrap();

        assert_eq!(quote.pay.to_string(), "0.00200000");
        assert_eq!(quote.total.to_string(), "100000.00");
        assert_eq!(quote.receive.to_string(), "97000.00");
    }

    #[tokio::test]
    async fn test_swap_quote() {
        let fx = setup_service();
        let request = QuoteRequest::new(
            UserId::new("user_1"),
            Currency::btc(),
            Currency::eth(),
            "0.1",
            TradeType::Swap,
        );

        let quote = fx.service.get_quote(request).await.unwrap();

        assert_eq!(quote.total.to_string(), "2.05000000");
        assert_eq!(quote.fees.total.to_string(), "0.06150000");
        assert_eq!(quote.receive.to_string(), "1.98850000");
    }

    #[tokio::test]
    async fn test_fee_total_is_exact_sum() {
        let fx = setup_service();

        let quote = fx.service.get_quote(buy_request("12345.67")).await.unwrap();
        let sum = quote
            .fees
            .platform_fee
            .checked_add(&quote.fees.processing_fee)
            .unwrap();
        assert_eq!(quote.fees.total, sum);

        let recomputed = quote
            .amount
            .mul_rate(quote.rate, Currency::ngn(), 2)
            .unwrap();
        assert_eq!(quote.total, recomputed);
    }

    #[tokio::test]
    async fn test_rejects_same_currency() {
        let fx = setup_service();
        let request = QuoteRequest::new(
            UserId::new("user_1"),
            Currency::btc(),
            Currency::btc(),
            "1",
            TradeType::Swap,
        );

        let err = fx.service.get_quote(request).await.unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_rejects_unsupported_currency() {
        let fx = setup_service();
        let request = QuoteRequest::new(
            UserId::new("user_1"),
            Currency::new("XYZ"),
            Currency::btc(),
            "1",
            TradeType::Buy,
        );

        let err = fx.service.get_quote(request).await.unwrap_err();
        assert_eq!(err, SwapSettleError::UnsupportedCurrency(Currency::new("XYZ")));
    }

    #[tokio::test]
    async fn test_rejects_bad_amounts() {
        let fx = setup_service();

        for amount in ["0", "-5", "abc", "100.001"] {
            let err = fx.service.get_quote(buy_request(amount)).await.unwrap_err();
            assert_eq!(err.error_code(), "INVALID_AMOUNT", "amount {}", amount);
        }
        assert_eq!(fx.provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_rejects_wrong_direction_and_type() {
        let fx = setup_service();

        let wrong_direction = QuoteRequest::new(
            UserId::new("user_1"),
            Currency::btc(),
            Currency::ngn(),
            "0.1",
            TradeType::Buy,
        );
        let err = fx.service.get_quote(wrong_direction).await.unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");

        let withdrawal = QuoteRequest::new(
            UserId::new("user_1"),
            Currency::btc(),
            Currency::ngn(),
            "0.1",
            TradeType::Withdrawal,
        );
        let err = fx.service.get_quote(withdrawal).await.unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_rate_unavailable_surfaces() {
        let fx = setup_service();
        fx.provider.set_failing(true);

        let err = fx.service.get_quote(buy_request("100000")).await.unwrap_err();
        assert!(matches!(err, SwapSettleError::RateUnavailable { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_each_request_is_distinct_quote() {
        let fx = setup_service();

        let first = fx.service.get_quote(buy_request("100000")).await.unwrap();
        let second = fx.service.get_quote(buy_request("100000")).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(fx.service.stats().book.total_quotes, 2);
    }

    #[tokio::test]
    async fn test_consume_after_expiry_fails() {
        let fx = setup_service();
        let quote = fx.service.get_quote(buy_request("100000")).await.unwrap();

        fx.clock
            .advance(constants::quote_ttl() + constants::confirmation_grace() + Duration::milliseconds(1));

        assert_eq!(
            fx.service.consume(&quote.id, &UserId::new("user_1")),
            Err(SwapSettleError::QuoteExpired(quote.id))
        );
    }

    #[test]
    fn test_config_validation() {
        assert!(QuoteConfig::default().validate().is_ok());

        let config = QuoteConfig {
            rate_cache_ttl: Duration::seconds(14),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
