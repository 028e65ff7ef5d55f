//! Simulation scenarios.

use serde::{Deserialize, Serialize};
use swapsettle_common::{TradeStatus, TradeType};

/// A simulation scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Steps in the scenario.
    pub steps: Vec<ScenarioStep>,
}

/// A step in a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScenarioStep {
    /// Queue a provider deposit notification.
    Deposit {
        user: String,
        currency: String,
        amount: String,
    },
    /// Deliver queued webhooks, each `copies` times concurrently.
    DeliverWebhooks { copies: usize },
    /// Request a quote; it becomes the current quote.
    RequestQuote {
        user: String,
        from: String,
        to: String,
        amount: String,
        trade_type: TradeType,
    },
    /// Confirm the current quote.
    ConfirmQuote { user: String, expect: Expectation },
    /// Request a withdrawal.
    Withdraw {
        user: String,
        currency: String,
        amount: String,
        network: Option<String>,
        address: String,
        expect: Expectation,
    },
    /// Move the simulation clock forward.
    AdvanceClock { seconds: i64 },
    /// Take the exchange offline or bring it back.
    SetExchangeOffline { offline: bool },
    /// Settle or cancel subsequent fills.
    SetFillOutcome { settle: bool },
    /// Check the current state.
    Assert { condition: AssertCondition },
}

/// Expected result of a confirm or withdraw call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expectation {
    /// The call returns a trade in this status.
    Status(TradeStatus),
    /// The call fails with this error code.
    Error(String),
}

/// Conditions that can be asserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AssertCondition {
    /// Wallet total and reserved amount.
    Balance {
        user: String,
        currency: String,
        total: String,
        pending: String,
    },
    /// Status of the trade created by the last confirm or withdraw.
    LastTradeStatus(TradeStatus),
    /// Webhook outcome counters.
    Webhooks { applied: u64, stale: u64 },
}

const ALICE: &str = "alice";
const BOB: &str = "bob";
const CAROL: &str = "carol";

/// Users every scenario may act as.
pub const USERS: [&str; 3] = [ALICE, BOB, CAROL];

fn deposit(user: &str, currency: &str, amount: &str) -> ScenarioStep {
    ScenarioStep::Deposit {
        user: user.to_string(),
        currency: currency.to_string(),
        amount: amount.to_string(),
    }
}

fn deliver(copies: usize) -> ScenarioStep {
    ScenarioStep::DeliverWebhooks { copies }
}

fn quote(user: &str, from: &str, to: &str, amount: &str, trade_type: TradeType) -> ScenarioStep {
    ScenarioStep::RequestQuote {
        user: user.to_string(),
        from: from.to_string(),
        to: to.to_string(),
        amount: amount.to_string(),
        trade_type,
    }
}

fn confirm(user: &str, expect: Expectation) -> ScenarioStep {
    ScenarioStep::ConfirmQuote {
        user: user.to_string(),
        expect,
    }
}

fn withdraw(user: &str, currency: &str, amount: &str, expect: Expectation) -> ScenarioStep {
    ScenarioStep::Withdraw {
        user: user.to_string(),
        currency: currency.to_string(),
        amount: amount.to_string(),
        network: None,
        address: "bc1qsimulateddestination0000000000000000".to_string(),
        expect,
    }
}

fn balance(user: &str, currency: &str, total: &str, pending: &str) -> ScenarioStep {
    ScenarioStep::Assert {
        condition: AssertCondition::Balance {
            user: user.to_string(),
            currency: currency.to_string(),
            total: total.to_string(),
            pending: pending.to_string(),
        },
    }
}

fn last_trade(status: TradeStatus) -> ScenarioStep {
    ScenarioStep::Assert {
        condition: AssertCondition::LastTradeStatus(status),
    }
}

fn error(code: &str) -> Expectation {
    Expectation::Error(code.to_string())
}

impl Scenario {
    /// Names accepted by [`Scenario::load`].
    pub fn names() -> &'static [&'static str] {
        &[
            "buy-and-settle",
            "sell-and-settle",
            "withdrawal",
            "webhook-replay",
            "quote-expiry",
            "provider-failure",
        ]
    }

    /// Load a scenario by name.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        match name {
            "buy-and-settle" => Ok(Self::buy_and_settle()),
            "sell-and-settle" => Ok(Self::sell_and_settle()),
            "withdrawal" => Ok(Self::withdrawal()),
            "webhook-replay" => Ok(Self::webhook_replay()),
            "quote-expiry" => Ok(Self::quote_expiry()),
            "provider-failure" => Ok(Self::provider_failure()),
            _ => Err(anyhow::anyhow!("Unknown scenario: {}", name)),
        }
    }

    /// Buy 100,000 NGN of BTC at 50,000,000 NGN/BTC with a 3% fee.
    fn buy_and_settle() -> Self {
        Self {
            name: "buy-and-settle".to_string(),
            description: "Fiat to crypto buy, settled by webhook".to_string(),
            steps: vec![
                deposit(ALICE, "NGN", "200000"),
                deliver(1),
                balance(ALICE, "NGN", "200000", "0"),
                quote(ALICE, "NGN", "BTC", "100000", TradeType::Buy),
                confirm(ALICE, Expectation::Status(TradeStatus::Processing)),
                balance(ALICE, "NGN", "200000", "103000"),
                deliver(1),
                last_trade(TradeStatus::Completed),
                balance(ALICE, "NGN", "97000", "0"),
                balance(ALICE, "BTC", "0.002", "0"),
            ],
        }
    }

    fn sell_and_settle() -> Self {
        Self {
            name: "sell-and-settle".to_string(),
            description: "Crypto to fiat sell, settled by webhook".to_string(),
            steps: vec![
                deposit(BOB, "BTC", "0.01"),
                deliver(1),
                quote(BOB, "BTC", "NGN", "0.005", TradeType::Sell),
                confirm(BOB, Expectation::Status(TradeStatus::Processing)),
                balance(BOB, "BTC", "0.01", "0.005"),
                deliver(1),
                last_trade(TradeStatus::Completed),
                balance(BOB, "BTC", "0.005", "0"),
                balance(BOB, "NGN", "242500", "0"),
            ],
        }
    }

    fn withdrawal() -> Self {
        Self {
            name: "withdrawal".to_string(),
            description: "Withdrawal minimums, balance checks and settlement".to_string(),
            steps: vec![
                deposit(CAROL, "BTC", "0.01"),
                deliver(1),
                withdraw(CAROL, "BTC", "0.00005", error("BELOW_MINIMUM")),
                withdraw(CAROL, "BTC", "0.02", error("INSUFFICIENT_BALANCE")),
                balance(CAROL, "BTC", "0.01", "0"),
                withdraw(CAROL, "BTC", "0.004", Expectation::Status(TradeStatus::Processing)),
                balance(CAROL, "BTC", "0.01", "0.004"),
                deliver(1),
                last_trade(TradeStatus::Completed),
                balance(CAROL, "BTC", "0.006", "0"),
            ],
        }
    }

    /// Every webhook arrives three times at once; each applies exactly once.
    fn webhook_replay() -> Self {
        Self {
            name: "webhook-replay".to_string(),
            description: "Duplicate concurrent webhook deliveries".to_string(),
            steps: vec![
                deposit(ALICE, "NGN", "200000"),
                deliver(3),
                balance(ALICE, "NGN", "200000", "0"),
                quote(ALICE, "NGN", "BTC", "100000", TradeType::Buy),
                confirm(ALICE, Expectation::Status(TradeStatus::Processing)),
                deliver(3),
                last_trade(TradeStatus::Completed),
                balance(ALICE, "NGN", "97000", "0"),
                balance(ALICE, "BTC", "0.002", "0"),
                ScenarioStep::Assert {
                    condition: AssertCondition::Webhooks {
                        applied: 2,
                        stale: 4,
                    },
                },
            ],
        }
    }

    fn quote_expiry() -> Self {
        Self {
            name: "quote-expiry".to_string(),
            description: "A quote confirmed after its lifetime is refused".to_string(),
            steps: vec![
                deposit(ALICE, "NGN", "200000"),
                deliver(1),
                quote(ALICE, "NGN", "BTC", "100000", TradeType::Buy),
                ScenarioStep::AdvanceClock { seconds: 20 },
                confirm(ALICE, error("QUOTE_EXPIRED")),
                balance(ALICE, "NGN", "200000", "0"),
                quote(ALICE, "NGN", "BTC", "100000", TradeType::Buy),
                ScenarioStep::AdvanceClock { seconds: 10 },
                confirm(ALICE, Expectation::Status(TradeStatus::Processing)),
            ],
        }
    }

    fn provider_failure() -> Self {
        Self {
            name: "provider-failure".to_string(),
            description: "Synchronous and asynchronous provider failures release funds".to_string(),
            steps: vec![
                deposit(ALICE, "NGN", "200000"),
                deliver(1),
                quote(ALICE, "NGN", "BTC", "100000", TradeType::Buy),
                ScenarioStep::SetExchangeOffline { offline: true },
                confirm(ALICE, error("PROVIDER_ERROR")),
                last_trade(TradeStatus::Failed),
                balance(ALICE, "NGN", "200000", "0"),
                ScenarioStep::SetExchangeOffline { offline: false },
                ScenarioStep::SetFillOutcome { settle: false },
                quote(ALICE, "NGN", "BTC", "100000", TradeType::Buy),
                confirm(ALICE, Expectation::Status(TradeStatus::Processing)),
                balance(ALICE, "NGN", "200000", "103000"),
                deliver(1),
                last_trade(TradeStatus::Failed),
                balance(ALICE, "NGN", "200000", "0"),
                balance(ALICE, "BTC", "0", "0"),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_listed_scenario_loads() {
        for name in Scenario::names() {
            let scenario = Scenario::load(name).unwrap();
            assert_eq!(&scenario.name, name);
            assert!(!scenario.steps.is_empty());
        }
        assert!(Scenario::load("high-volume").is_err());
    }
}
