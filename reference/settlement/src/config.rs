//! Service configuration.

use swapsettle_common::UserId;
use swapsettle_crypto::{CryptoError, SharedSecret, VerifyingKey, WebhookVerifier};
use swapsettle_fx::{FeeSchedule, QuoteConfig};
use swapsettle_ledger::WithdrawalLimits;
use swapsettle_provider::ProviderConfig;

/// Webhook authentication configuration.
#[derive(Debug, Clone, Default)]
pub struct WebhookConfig {
    /// HMAC-SHA256 shared secret.
    pub shared_secret: Option<String>,
    /// Provider Ed25519 public key, hex encoded.
    pub public_key_hex: Option<String>,
}

impl WebhookConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        Self {
            shared_secret: std::env::var("SWAPSETTLE_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            public_key_hex: std::env::var("SWAPSETTLE_WEBHOOK_PUBLIC_KEY")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }

    /// Build the verifier for inbound webhooks.
    pub fn verifier(&self) -> Result<WebhookVerifier, CryptoError> {
        let secret = self
            .shared_secret
            .as_deref()
            .map(SharedSecret::new)
            .transpose()?;
        let public_key = self
            .public_key_hex
            .as_deref()
            .map(VerifyingKey::from_hex)
            .transpose()?;

        WebhookVerifier::new(secret, public_key)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.verifier().map(|_| ()).map_err(|e| e.to_string())
    }
}

/// Main service configuration.
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Listen address.
    pub listen_addr: String,
    /// Listen port.
    pub listen_port: u16,
    /// Quote lifetime, grace, cache and supported currencies.
    pub quote: QuoteConfig,
    /// Platform and processing fee split.
    pub fees: FeeSchedule,
    /// Provider-side withdrawal minimums.
    pub withdrawal_limits: WithdrawalLimits,
    /// Webhook authentication.
    pub webhook: WebhookConfig,
    /// Liquidity provider client.
    pub provider: ProviderConfig,
    /// Users and their provider sub-accounts known at startup.
    pub accounts: Vec<(UserId, String)>,
    /// Webhook audit entries kept in memory.
    pub audit_capacity: usize,
    /// Trade event channel capacity.
    pub event_capacity: usize,
    /// Enable metrics endpoint.
    pub metrics_enabled: bool,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 8080,
            quote: QuoteConfig::default(),
            fees: FeeSchedule::default(),
            withdrawal_limits: WithdrawalLimits::default(),
            webhook: WebhookConfig::default(),
            provider: ProviderConfig::default(),
            accounts: Vec::new(),
            audit_capacity: 10_000,
            event_capacity: 1024,
            metrics_enabled: true,
        }
    }
}

impl SettlementConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self {
            quote: QuoteConfig::from_env(),
            fees: FeeSchedule::from_env(),
            withdrawal_limits: WithdrawalLimits::from_env(),
            webhook: WebhookConfig::from_env(),
            provider: ProviderConfig::from_env(),
            ..Self::default()
        };

        if let Ok(addr) = std::env::var("SWAPSETTLE_LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        if let Ok(port) = std::env::var("SWAPSETTLE_LISTEN_PORT") {
            if let Ok(port) = port.parse() {
                config.listen_port = port;
            }
        }

        if let Ok(accounts) = std::env::var("SWAPSETTLE_ACCOUNTS") {
            config.accounts = parse_accounts(&accounts);
        }

        if let Ok(capacity) = std::env::var("SWAPSETTLE_AUDIT_CAPACITY") {
            if let Ok(capacity) = capacity.parse() {
                config.audit_capacity = capacity;
            }
        }

        if let Ok(capacity) = std::env::var("SWAPSETTLE_EVENT_CAPACITY") {
            if let Ok(capacity) = capacity.parse() {
                config.event_capacity = capacity;
            }
        }

        if let Ok(enabled) = std::env::var("SWAPSETTLE_METRICS_ENABLED") {
            config.metrics_enabled = !matches!(enabled.as_str(), "0" | "false" | "no");
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_port == 0 {
            return Err("Listen port cannot be 0".to_string());
        }

        self.quote.validate()?;
        self.fees.validate()?;
        self.withdrawal_limits.validate()?;
        self.webhook.validate()?;
        self.provider.validate()?;

        if self.audit_capacity == 0 {
            return Err("Audit capacity cannot be 0".to_string());
        }

        if self.event_capacity == 0 {
            return Err("Event capacity cannot be 0".to_string());
        }

        Ok(())
    }
}

/// Parse `user=account,user=account`.
fn parse_accounts(value: &str) -> Vec<(UserId, String)> {
    value
        .split(',')
        .filter_map(|pair| pair.trim().split_once('='))
        .map(|(user, account)| (UserId::new(user.trim()), account.trim().to_string()))
        .filter(|(user, account)| user.is_valid() && !account.is_empty())
        .collect()
}
