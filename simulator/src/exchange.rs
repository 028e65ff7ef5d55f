//! Simulated exchange: quotes prices, acknowledges orders and withdrawals,
//! and queues the signed webhooks a real venue would deliver later.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;

use swapsettle_common::{Clock, CurrencyPair, FxRate};
use swapsettle_crypto::WebhookSigner;
use swapsettle_fx::{FxError, FxResult, RateProvider};
use swapsettle_protocol::{
    InstantOrderRequest, LiquidityProvider, ProviderAck, ProviderError, WebhookData,
    WebhookEnvelope, WithdrawRequest,
};

/// How the exchange finishes the next orders and withdrawals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    Settle,
    Cancel,
}

/// A signed delivery waiting to be sent.
#[derive(Debug, Clone)]
pub struct PendingWebhook {
    pub event: String,
    pub body: Vec<u8>,
    pub signature: String,
}

/// In-process exchange used as both rate source and liquidity provider.
pub struct SimulatedExchange {
    rates: RwLock<HashMap<CurrencyPair, Decimal>>,
    signer: WebhookSigner,
    clock: Arc<dyn Clock>,
    outbox: Mutex<Vec<PendingWebhook>>,
    outcome: Mutex<FillOutcome>,
    offline: AtomicBool,
    counter: AtomicU64,
}

impl SimulatedExchange {
    /// Create an exchange that signs its webhooks with `signer`.
    pub fn new(signer: WebhookSigner, clock: Arc<dyn Clock>) -> Self {
        Self {
            rates: RwLock::new(HashMap::new()),
            signer,
            clock,
            outbox: Mutex::new(Vec::new()),
            outcome: Mutex::new(FillOutcome::Settle),
            offline: AtomicBool::new(false),
            counter: AtomicU64::new(0),
        }
    }

    /// Set the price for a market.
    pub fn set_rate(&self, pair: CurrencyPair, price: Decimal) {
        self.rates.write().insert(pair, price);
    }

    /// Refuse synchronous calls while offline.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Outcome reported for subsequent fills.
    pub fn set_outcome(&self, outcome: FillOutcome) {
        *self.outcome.lock() = outcome;
    }

    /// Queue a deposit notification for a sub-account.
    pub fn deposit(&self, account_id: &str, currency: &str, amount: &str) -> anyhow::Result<()> {
        let id = self.next_id("dep");
        self.queue(
            "deposit.successful",
            WebhookData {
                id,
                account_id: Some(account_id.to_string()),
                currency: Some(currency.to_lowercase()),
                amount: Some(amount.to_string()),
                status: Some("success".to_string()),
                ..Default::default()
            },
        )
    }

    /// Take every queued webhook.
    pub fn drain_webhooks(&self) -> Vec<PendingWebhook> {
        std::mem::take(&mut *self.outbox.lock())
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}_{}", prefix, self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn queue(&self, event: &str, data: WebhookData) -> anyhow::Result<()> {
        let envelope = WebhookEnvelope {
            event: event.to_string(),
            data,
        };
        let body = serde_json::to_vec(&envelope)?;
        let signature = self.signer.header(&body, Some(self.clock.now().timestamp()))?;

        self.outbox.lock().push(PendingWebhook {
            event: event.to_string(),
            body,
            signature,
        });
        Ok(())
    }

    fn check_online(&self) -> Result<(), ProviderError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ProviderError::Unavailable(
                "exchange is offline".to_string(),
            ));
        }
        Ok(())
    }

    fn fill(
        &self,
        prefix: &str,
        success_event: &str,
        failure_event: &str,
        data: WebhookData,
    ) -> Result<ProviderAck, ProviderError> {
        let event = match *self.outcome.lock() {
            FillOutcome::Settle => success_event,
            FillOutcome::Cancel => failure_event,
        };
        let id = self.next_id(prefix);
        let reference = data.reference.clone();

        self.queue(event, WebhookData { id: id.clone(), ..data })
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(ProviderAck {
            id,
            status: "pending".to_string(),
            reference,
        })
    }
}

#[async_trait]
impl RateProvider for SimulatedExchange {
    fn name(&self) -> &str {
        "simulated-exchange"
    }

    async fn get_rate(&self, pair: &CurrencyPair) -> FxResult<FxRate> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(FxError::ProviderError {
                pair: pair.clone(),
                message: "exchange is offline".to_string(),
            });
        }

        self.rates
            .read()
            .get(pair)
            .map(|price| FxRate::new(pair.clone(), *price, self.clock.now(), RateProvider::name(self)))
            .ok_or_else(|| FxError::RateNotAvailable(pair.clone()))
    }

    fn supports_pair(&self, pair: &CurrencyPair) -> bool {
        self.rates.read().contains_key(pair)
    }

    fn supported_pairs(&self) -> Vec<CurrencyPair> {
        self.rates.read().keys().cloned().collect()
    }
}

#[async_trait]
impl LiquidityProvider for SimulatedExchange {
    fn name(&self) -> &str {
        "simulated-exchange"
    }

    async fn execute_order(&self, request: &InstantOrderRequest) -> Result<ProviderAck, ProviderError> {
        self.check_online()?;
        self.fill(
            "ord",
            "instant_order.done",
            "instant_order.cancelled",
            WebhookData {
                reference: Some(request.reference.clone()),
                account_id: Some(request.account_id.clone()),
                currency: Some(request.unit.clone()),
                amount: Some(request.volume.clone()),
                ..Default::default()
            },
        )
    }

    async fn withdraw(&self, request: &WithdrawRequest) -> Result<ProviderAck, ProviderError> {
        self.check_online()?;
        self.fill(
            "wd",
            "withdraw.successful",
            "withdraw.failed",
            WebhookData {
                reference: Some(request.reference.clone()),
                account_id: Some(request.account_id.clone()),
                currency: Some(request.currency.clone()),
                amount: Some(request.amount.clone()),
                ..Default::default()
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swapsettle_common::{Currency, ManualClock};
    use swapsettle_crypto::{SharedSecret, WebhookVerifier};
    use swapsettle_protocol::OrderSide;

    fn make_test_exchange() -> (SimulatedExchange, WebhookVerifier) {
        let secret = SharedSecret::new("whsec_sim").unwrap();
        let verifier = WebhookVerifier::shared_secret(secret.clone());
        let exchange = SimulatedExchange::new(
            WebhookSigner::SharedSecret(secret),
            Arc::new(ManualClock::default()),
        );
        (exchange, verifier)
    }

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
    async fn test_order_queues_signed_webhook() {
        let (exchange, verifier) = make_test_exchange();

        let ack = exchange.execute_order(&make_test_order()).await.unwrap();
        assert_eq!(ack.id, "ord_1");

        let webhooks = exchange.drain_webhooks();
        assert_eq!(webhooks.len(), 1);
        assert_eq!(webhooks[0].event, "instant_order.done");
        assert!(verifier
            .verify(&webhooks[0].body, Some(&webhooks[0].signature))
            .is_ok());

        let envelope = WebhookEnvelope::from_slice(&webhooks[0].body).unwrap();
        assert_eq!(envelope.data.id, "ord_1");
        assert_eq!(envelope.data.reference.as_deref(), Some("q_1"));
        assert!(exchange.drain_webhooks().is_empty());
    }

    #[tokio::test]
    async fn test_offline_and_cancel() {
        let (exchange, _) = make_test_exchange();

        exchange.set_offline(true);
        assert!(matches!(
            exchange.execute_order(&make_test_order()).await,
            Err(ProviderError::Unavailable(_))
        ));
        assert!(exchange.drain_webhooks().is_empty());

        exchange.set_offline(false);
        exchange.set_outcome(FillOutcome::Cancel);
        exchange.execute_order(&make_test_order()).await.unwrap();
        assert_eq!(exchange.drain_webhooks()[0].event, "instant_order.cancelled");
    }

    #[tokio::test]
    async fn test_rates() {
        let (exchange, _) = make_test_exchange();
        let pair = CurrencyPair::new(Currency::btc(), Currency::ngn());
        exchange.set_rate(pair.clone(), Decimal::new(50_000_000, 0));

        let rate = exchange.get_rate(&pair).await.unwrap();
        assert_eq!(rate.price, Decimal::new(50_000_000, 0));

        let missing = CurrencyPair::new(Currency::eth(), Currency::ngn());
        assert!(matches!(
            exchange.get_rate(&missing).await,
            Err(FxError::RateNotAvailable(_))
        ));
    }
}
