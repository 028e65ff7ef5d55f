//! Withdrawal validation against live balances and provider minimums.
//!
//! Both sides of every comparison are converted to [`Money`] at
//! [`WITHDRAWAL_SCALE`] first, so an amount equal to the balance is never
//! misjudged by rounding.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use swapsettle_common::{Currency, Money, Result, SwapSettleError, TradeReference, UserId};
use tracing::{info, instrument, warn};

use crate::engine::WalletLedger;
use crate::wallet::BalanceChange;

/// Fixed scale for withdrawal comparisons (crypto precision).
pub const WITHDRAWAL_SCALE: u32 = 8;

/// Provider-side minimum withdrawal amounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalLimits {
    minimums: HashMap<Currency, Decimal>,
    network_minimums: HashMap<(Currency, String), Decimal>,
}

impl Default for WithdrawalLimits {
    fn default() -> Self {
        Self::empty()
            .with_minimum(Currency::btc(), Decimal::new(1, 4))
            .with_minimum(Currency::eth(), Decimal::new(5, 3))
            .with_minimum(Currency::usdt(), Decimal::new(10, 0))
            .with_network_minimum(Currency::usdt(), "trc20", Decimal::new(1, 0))
            .with_minimum(Currency::ngn(), Decimal::new(1000, 0))
    }
}

impl WithdrawalLimits {
    /// No minimums at all.
    pub fn empty() -> Self {
        Self {
            minimums: HashMap::new(),
            network_minimums: HashMap::new(),
        }
    }

    /// Set the minimum for a currency.
    pub fn with_minimum(mut self, currency: Currency, minimum: Decimal) -> Self {
        self.minimums.insert(currency, minimum);
        self
    }

    /// Set a minimum that applies to one network of a currency.
    pub fn with_network_minimum(
        mut self,
        currency: Currency,
        network: impl Into<String>,
        minimum: Decimal,
    ) -> Self {
        self.network_minimums
            .insert((currency, network.into().to_lowercase()), minimum);
        self
    }

    /// Load from `SWAPSETTLE_WITHDRAWAL_MINIMUMS`, e.g. `BTC=0.0001,USDT:TRC20=1`.
    pub fn from_env() -> Self {
        let mut limits = Self::default();

        if let Ok(raw) = std::env::var("SWAPSETTLE_WITHDRAWAL_MINIMUMS") {
            for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let Some((key, value)) = item.split_once('=') else {
                    continue;
                };
                let Ok(minimum) = value.trim().parse::<Decimal>() else {
                    continue;
                };
                limits = match key.trim().split_once(':') {
                    Some((code, network)) => {
                        limits.with_network_minimum(Currency::new(code), network, minimum)
                    }
                    None => limits.with_minimum(Currency::new(key.trim()), minimum),
                };
            }
        }

        limits
    }

    /// Validate the limits.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let all = self
            .minimums
            .iter()
            .chain(self.network_minimums.iter().map(|((c, _), m)| (c, m)));

        for (currency, minimum) in all {
            if minimum.is_sign_negative() {
                return Err(format!("Minimum for {} cannot be negative", currency));
            }
            if minimum.normalize().scale() > WITHDRAWAL_SCALE {
                return Err(format!(
                    "Minimum for {} has more than {} decimals",
                    currency, WITHDRAWAL_SCALE
                ));
            }
        }

        Ok(())
    }

    /// Minimum for a currency, preferring a network-specific value.
    pub fn minimum_for(&self, currency: &Currency, network: Option<&str>) -> Option<Decimal> {
        network
            .and_then(|n| {
                self.network_minimums
                    .get(&(currency.clone(), n.to_lowercase()))
                    .copied()
            })
            .or_else(|| self.minimums.get(currency).copied())
    }

    /// Published minimums, sorted for display.
    pub fn summary(&self) -> Vec<MinimumWithdrawal> {
        let mut rows: Vec<MinimumWithdrawal> = self
            .minimums
            .iter()
            .map(|(currency, minimum)| MinimumWithdrawal {
                currency: currency.clone(),
                network: None,
                minimum: *minimum,
            })
            .chain(
                self.network_minimums
                    .iter()
                    .map(|((currency, network), minimum)| MinimumWithdrawal {
                        currency: currency.clone(),
                        network: Some(network.clone()),
                        minimum: *minimum,
                    }),
            )
            .collect();
        rows.sort_by(|a, b| {
            (a.currency.code(), a.network.as_deref()).cmp(&(b.currency.code(), b.network.as_deref()))
        });
        rows
    }
}

/// One published minimum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinimumWithdrawal {
    pub currency: Currency,
    pub network: Option<String>,
    pub minimum: Decimal,
}

/// Outcome of a successful withdrawal check, at the currency's native scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalCheck {
    pub currency: Currency,
    pub network: Option<String>,
    pub requested: Money,
    pub available: Money,
    pub minimum: Option<Money>,
}

/// Guards the withdrawal path.
pub struct WithdrawalValidator {
    ledger: Arc<dyn WalletLedger>,
    limits: WithdrawalLimits,
}

impl WithdrawalValidator {
    /// Create a validator over the given ledger.
    pub fn new(ledger: Arc<dyn WalletLedger>, limits: WithdrawalLimits) -> Self {
        Self { ledger, limits }
    }

    /// Configured minimums.
    pub fn limits(&self) -> &WithdrawalLimits {
        &self.limits
    }

    /// Check a withdrawal without reserving anything.
    #[instrument(skip(self), fields(user_id = %user_id, currency = %currency))]
    pub async fn check(
        &self,
        user_id: &UserId,
        currency: &Currency,
        amount: &str,
        network: Option<&str>,
    ) -> Result<WithdrawalCheck> {
        let requested = Money::parse(amount, currency.clone(), WITHDRAWAL_SCALE)
            .map_err(|e| SwapSettleError::InvalidAmount(e.to_string()))?;
        if !requested.is_positive() {
            return Err(SwapSettleError::InvalidAmount(
                "amount must be greater than zero".to_string(),
            ));
        }
        let requested_native = requested
            .rescale_exact(currency.scale())
            .map_err(|e| SwapSettleError::InvalidAmount(e.to_string()))?;

        let minimum = match self.limits.minimum_for(currency, network) {
            Some(minimum) => Some(Money::from_decimal(
                minimum,
                currency.clone(),
                WITHDRAWAL_SCALE,
            )?),
            None => None,
        };
        if let Some(minimum) = &minimum {
            if requested.compare(minimum)?.is_lt() {
                warn!(requested = %requested_native, minimum = %minimum, "Withdrawal below minimum");
                return Err(SwapSettleError::BelowMinimum {
                    minimum: minimum.rescale(currency.scale())?.to_string(),
                });
            }
        }

        let available_native = self.ledger.balance(user_id, currency).await?.available()?;
        let available = available_native.rescale(WITHDRAWAL_SCALE)?;
        if requested.compare(&available)?.is_gt() {
            warn!(
                requested = %requested_native,
                available = %available_native,
                "Withdrawal exceeds available balance"
            );
            return Err(SwapSettleError::insufficient_balance(
                &available_native,
                &requested_native,
            ));
        }

        Ok(WithdrawalCheck {
            currency: currency.clone(),
            network: network.map(str::to_string),
            requested: requested_native,
            available: available_native,
            minimum: match minimum {
                Some(m) => Some(m.rescale(currency.scale())?),
                None => None,
            },
        })
    }

    /// Check and reserve the amount in one step on the ledger.
    #[instrument(skip(self), fields(user_id = %user_id, currency = %currency, reference = %reference))]
    pub async fn reserve(
        &self,
        user_id: &UserId,
        currency: &Currency,
        amount: &str,
        network: Option<&str>,
        reference: &TradeReference,
    ) -> Result<(WithdrawalCheck, BalanceChange)> {
        let check = self.check(user_id, currency, amount, network).await?;
        let change = self
            .ledger
            .reserve(user_id, &check.requested, reference)
            .await?;

        info!(amount = %check.requested, "Withdrawal reserved");
        Ok((check, change))
    }
}
