//! Simulation controller.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tracing::{info, warn};

use swapsettle_common::{
    Currency, CurrencyPair, ManualClock, Money, SwapSettleError, Trade, TradeReference,
    UserId,
};
use swapsettle_crypto::{SharedSecret, SigningKey, WebhookSigner, WebhookVerifier};
use swapsettle_fx::{FeeSchedule, Quote, QuoteConfig, QuoteRequest, QuoteService};
use swapsettle_ledger::{AccountDirectory, InMemoryWalletLedger, WalletLedger, WithdrawalLimits};
use swapsettle_settlement::{
    InMemoryTradeStore, Metrics, SettlementEngine, TradeStore, WebhookReconciler,
    WithdrawalRequest,
};

use crate::exchange::{FillOutcome, SimulatedExchange};
use crate::metrics::SimulationMetrics;
use crate::scenario::{AssertCondition, Expectation, Scenario, ScenarioStep, USERS};

/// How the simulated exchange signs webhooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Signing {
    Hmac,
    Ed25519,
}

/// Runs scenarios against a freshly wired engine.
pub struct SimulationController {
    engine: SettlementEngine,
    reconciler: WebhookReconciler,
    exchange: Arc<SimulatedExchange>,
    ledger: Arc<InMemoryWalletLedger>,
    store: Arc<InMemoryTradeStore>,
    clock: Arc<ManualClock>,
    settlement_metrics: Arc<Metrics>,
    metrics: SimulationMetrics,
    current_quote: Option<Quote>,
    last_reference: Option<TradeReference>,
    withdrawals: u64,
}

impl SimulationController {
    /// Wire the engine, reconciler and exchange.
    pub fn new(signing: Signing, seed: Option<u64>) -> anyhow::Result<Self> {
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let key: [u8; 32] = rng.gen();
        let (signer, verifier) = match signing {
            Signing::Hmac => {
                let secret = SharedSecret::new(key.to_vec())?;
                (
                    WebhookSigner::SharedSecret(secret.clone()),
                    WebhookVerifier::shared_secret(secret),
                )
            }
            Signing::Ed25519 => {
                let signing_key = SigningKey::from_bytes(&key)?;
                let verifier = WebhookVerifier::ed25519(signing_key.verifying_key());
                (WebhookSigner::Ed25519(signing_key), verifier)
            }
        };

        let clock = Arc::new(ManualClock::default());
        let exchange = Arc::new(SimulatedExchange::new(signer, clock.clone()));
        exchange.set_rate(
            CurrencyPair::new(Currency::btc(), Currency::ngn()),
            Decimal::new(50_000_000, 0),
        );
        exchange.set_rate(
            CurrencyPair::new(Currency::usdt(), Currency::ngn()),
            Decimal::new(1_550, 0),
        );

        let quotes = Arc::new(QuoteService::new(
            exchange.clone(),
            QuoteConfig::default(),
            FeeSchedule::default(),
            clock.clone(),
        ));
        let ledger = Arc::new(InMemoryWalletLedger::with_clock(clock.clone()));
        let store = Arc::new(InMemoryTradeStore::new());
        let accounts = Arc::new(AccountDirectory::new());
        for user in USERS {
            accounts.register(UserId::new(user), account_for(user));
        }
        let settlement_metrics = Arc::new(Metrics::new());

        let engine = SettlementEngine::new(
            quotes,
            exchange.clone(),
            ledger.clone(),
            store.clone(),
            accounts.clone(),
            WithdrawalLimits::default(),
            clock.clone(),
        )
        .with_metrics(settlement_metrics.clone());

        let reconciler = WebhookReconciler::new(
            verifier,
            store.clone(),
            ledger.clone(),
            accounts,
            clock.clone(),
        )
        .with_metrics(settlement_metrics.clone());

        Ok(Self {
            engine,
            reconciler,
            exchange,
            ledger,
            store,
            clock,
            settlement_metrics,
            metrics: SimulationMetrics::new(),
            current_quote: None,
            last_reference: None,
            withdrawals: 0,
        })
    }

    /// Run a scenario.
    pub async fn run_scenario(&mut self, scenario: &Scenario) -> anyhow::Result<()> {
        info!(
            scenario = %scenario.name,
            description = %scenario.description,
            steps = scenario.steps.len(),
            "Running scenario"
        );

        for step in &scenario.steps {
            self.execute_step(step).await?;
            self.metrics.record_step();
        }

        Ok(())
    }

    /// Execute a single scenario step.
    async fn execute_step(&mut self, step: &ScenarioStep) -> anyhow::Result<()> {
        match step {
            ScenarioStep::Deposit {
                user,
                currency,
                amount,
            } => {
                info!(user = %user, currency = %currency, amount = %amount, "Deposit");
                self.exchange.deposit(&account_for(user), currency, amount)?;
            }
            ScenarioStep::DeliverWebhooks { copies } => {
                let webhooks = self.exchange.drain_webhooks();
                for webhook in &webhooks {
                    let deliveries = (0..*copies).map(|_| {
                        self.reconciler
                            .handle(&webhook.body, Some(webhook.signature.as_str()))
                    });
                    for result in join_all(deliveries).await {
                        let outcome = result?;
                        info!(event_type = %webhook.event, outcome = ?outcome, "Webhook delivered");
                        self.metrics.record_webhook();
                    }
                }
            }
            ScenarioStep::RequestQuote {
                user,
                from,
                to,
                amount,
                trade_type,
            } => {
                let quote = self
                    .engine
                    .get_quote(QuoteRequest::new(
                        UserId::new(user),
                        Currency::new(from),
                        Currency::new(to),
                        amount.clone(),
                        *trade_type,
                    ))
                    .await?;
                info!(
                    quote_id = %quote.id,
                    pay = %quote.pay,
                    receive = %quote.receive,
                    "Quote issued"
                );
                self.current_quote = Some(quote);
            }
            ScenarioStep::ConfirmQuote { user, expect } => {
                let quote = self
                    .current_quote
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("No quote to confirm"))?;
                self.last_reference = Some(TradeReference::for_quote(&quote.id));

                let started = Instant::now();
                let result = self.engine.confirm_trade(&quote.id, &UserId::new(user)).await;
                self.metrics.record_call(started.elapsed());
                self.check_expectation("confirm", result, expect);
            }
            ScenarioStep::Withdraw {
                user,
                currency,
                amount,
                network,
                address,
                expect,
            } => {
                self.withdrawals += 1;
                let key = format!("sim-{}", self.withdrawals);
                self.last_reference =
                    Some(TradeReference::for_withdrawal(&UserId::new(user), Some(&key)));

                let started = Instant::now();
                let result = self
                    .engine
                    .withdraw(WithdrawalRequest {
                        user_id: UserId::new(user),
                        currency: Currency::new(currency),
                        amount: amount.clone(),
                        network: network.clone(),
                        destination: address.clone(),
                        idempotency_key: Some(key),
                    })
                    .await;
                self.metrics.record_call(started.elapsed());
                self.check_expectation("withdraw", result, expect);
            }
            ScenarioStep::AdvanceClock { seconds } => {
                info!(seconds = seconds, "Advancing clock");
                self.clock.advance(chrono::Duration::seconds(*seconds));
            }
            ScenarioStep::SetExchangeOffline { offline } => {
                info!(offline = offline, "Exchange availability changed");
                self.exchange.set_offline(*offline);
            }
            ScenarioStep::SetFillOutcome { settle } => {
                let outcome = if *settle {
                    FillOutcome::Settle
                } else {
                    FillOutcome::Cancel
                };
                info!(outcome = ?outcome, "Fill outcome changed");
                self.exchange.set_outcome(outcome);
            }
            ScenarioStep::Assert { condition } => {
                let result = self.evaluate(condition).await?;
                match result {
                    Ok(()) => self.metrics.record_assertion(true),
                    Err(message) => {
                        warn!(condition = ?condition, "Assertion failed: {}", message);
                        self.metrics.record_assertion(false);
                    }
                }
            }
        }

        Ok(())
    }

    fn check_expectation(
        &mut self,
        operation: &str,
        result: Result<Trade, SwapSettleError>,
        expect: &Expectation,
    ) {
        let passed = match (&result, expect) {
            (Ok(trade), Expectation::Status(status)) => trade.status == *status,
            (Err(e), Expectation::Error(code)) => e.error_code() == code,
            _ => false,
        };

        match &result {
            Ok(trade) => info!(
                operation = operation,
                trade_id = %trade.id,
                status = %trade.status,
                "Call returned trade"
            ),
            Err(e) => info!(operation = operation, code = e.error_code(), error = %e, "Call failed"),
        }
        if !passed {
            warn!(operation = operation, expected = ?expect, "Unexpected result");
        }
        self.metrics.record_assertion(passed);
    }

    /// Check a condition; the inner error describes a mismatch.
    async fn evaluate(
        &self,
        condition: &AssertCondition,
    ) -> anyhow::Result<Result<(), String>> {
        match condition {
            AssertCondition::Balance {
                user,
                currency,
                total,
                pending,
            } => {
                let currency = Currency::new(currency);
                let wallet = self.ledger.balance(&UserId::new(user), &currency).await?;
                let total = Money::parse(total, currency.clone(), wallet.balance.scale())?;
                let pending = Money::parse(pending, currency.clone(), wallet.pending.scale())?;

                let total_ok = wallet.balance.compare(&total)?.is_eq();
                let pending_ok = wallet.pending.compare(&pending)?.is_eq();
                Ok(if total_ok && pending_ok {
                    Ok(())
                } else {
                    Err(format!(
                        "{} {}: total {} pending {}, expected total {} pending {}",
                        user, currency, wallet.balance, wallet.pending, total, pending
                    ))
                })
            }
            AssertCondition::LastTradeStatus(expected) => {
                let reference = self
                    .last_reference
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("No trade created yet"))?;
                let trade = self.store.find_by_reference(reference).await?;
                Ok(match trade {
                    Some(trade) if trade.status == *expected => Ok(()),
                    Some(trade) => Err(format!(
                        "trade {} is {}, expected {}",
                        trade.id, trade.status, expected
                    )),
                    None => Err(format!("no trade for {}", reference)),
                })
            }
            AssertCondition::Webhooks { applied, stale } => {
                let snapshot = self.settlement_metrics.snapshot();
                Ok(
                    if snapshot.webhooks_applied == *applied && snapshot.webhooks_stale == *stale {
                        Ok(())
                    } else {
                        Err(format!(
                            "applied {} stale {}, expected applied {} stale {}",
                            snapshot.webhooks_applied, snapshot.webhooks_stale, applied, stale
                        ))
                    },
                )
            }
        }
    }

    /// Simulation metrics so far.
    pub fn metrics(&self) -> &SimulationMetrics {
        &self.metrics
    }
}

/// Provider sub-account of a simulated user.
fn account_for(user: &str) -> String {
    format!("acct-{}", user)
}
