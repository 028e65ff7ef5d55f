//! Provider client configuration.

use std::time::Duration;

use swapsettle_common::{Currency, CurrencyPair};

/// Configuration for the liquidity provider client.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of the provider API.
    pub base_url: String,
    /// Bearer API key.
    pub api_key: String,
    /// Request timeout.
    pub request_timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Markets the provider quotes.
    pub markets: Vec<CurrencyPair>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        let pair = |base: Currency, counter: Currency| CurrencyPair::new(base, counter);

        Self {
            base_url: "http://localhost:9090/api/v1".to_string(),
            api_key: String::new(),
            request_timeout: Duration::from_secs(10),
            user_agent: format!("swapsettle/{}", env!("CARGO_PKG_VERSION")),
            markets: vec![
                pair(Currency::btc(), Currency::ngn()),
                pair(Currency::eth(), Currency::ngn()),
                pair(Currency::usdt(), Currency::ngn()),
                pair(Currency::btc(), Currency::usd()),
                pair(Currency::eth(), Currency::usd()),
                pair(Currency::btc(), Currency::usdt()),
                pair(Currency::eth(), Currency::usdt()),
                pair(Currency::btc(), Currency::eth()),
            ],
        }
    }
}

impl ProviderConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("SWAPSETTLE_PROVIDER_URL") {
            config.base_url = url;
        }

        if let Ok(key) = std::env::var("SWAPSETTLE_PROVIDER_API_KEY") {
            config.api_key = key;
        }

        if let Ok(ms) = std::env::var("SWAPSETTLE_PROVIDER_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                config.request_timeout = Duration::from_millis(ms);
            }
        }

        if let Ok(markets) = std::env::var("SWAPSETTLE_PROVIDER_MARKETS") {
            config.markets = markets
                .split(',')
                .filter_map(|m| m.trim().split_once('/'))
                .map(|(base, counter)| CurrencyPair::new(Currency::new(base), Currency::new(counter)))
                .collect();
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.is_empty() {
            return Err("Provider URL cannot be empty".to_string());
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(format!("Provider URL must be http(s): {}", self.base_url));
        }

        if self.request_timeout.is_zero() {
            return Err("Request timeout cannot be zero".to_string());
        }

        if self.markets.is_empty() {
            return Err("At least one market is required".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ProviderConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_url() {
        let config = ProviderConfig {
            base_url: "ftp://provider".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
