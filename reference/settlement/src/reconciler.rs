//! Webhook reconciler.
//!
//! Applies the provider's asynchronous status reports to local trades. Every
//! status change is a conditional write from an open status and every wallet
//! effect is keyed by the trade reference, so a replayed or reordered
//! delivery never applies twice and never leaves a terminal state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use swapsettle_common::{
    Clock, Currency, Money, Result, SwapSettleError, Trade, TradeFailure, TradeId,
    TradeReference, TradeStatus, TradeType, UserId,
};
use swapsettle_crypto::{PayloadDigest, WebhookVerifier};
use swapsettle_ledger::{AccountDirectory, WalletLedger};
use swapsettle_protocol::{FailureKind, ProviderEvent, WebhookData, WebhookEnvelope};
use tracing::{debug, error, info, instrument, warn};

use crate::audit::{AuditEntry, AuditLog};
use crate::events::{TradeEvent, TradeEvents};
use crate::metrics::Metrics;
use crate::store::{CreateOutcome, StatusUpdate, TradeStore};

/// What a webhook delivery did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// An existing trade moved to `status`.
    Applied { trade_id: TradeId, status: TradeStatus },
    /// A trade with no local origin was recorded.
    Recorded { trade_id: TradeId },
    /// The trade was already terminal; nothing changed.
    Stale { trade_id: TradeId, status: TradeStatus },
    /// Nothing to do for this event.
    Ignored { event_type: String },
}

impl ReconcileOutcome {
    fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Applied { .. } => "applied",
            ReconcileOutcome::Recorded { .. } => "recorded",
            ReconcileOutcome::Stale { .. } => "stale",
            ReconcileOutcome::Ignored { .. } => "ignored",
        }
    }
}

/// Handles inbound provider webhooks.
pub struct WebhookReconciler {
    verifier: WebhookVerifier,
    store: Arc<dyn TradeStore>,
    ledger: Arc<dyn WalletLedger>,
    accounts: Arc<AccountDirectory>,
    audit: Arc<AuditLog>,
    events: TradeEvents,
    metrics: Arc<Metrics>,
    clock: Arc<dyn Clock>,
}

impl WebhookReconciler {
    /// Create a new reconciler.
    pub fn new(
        verifier: WebhookVerifier,
        store: Arc<dyn TradeStore>,
        ledger: Arc<dyn WalletLedger>,
        accounts: Arc<AccountDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            verifier,
            store,
            ledger,
            accounts,
            audit: Arc::new(AuditLog::default()),
            events: TradeEvents::default(),
            metrics: Arc::new(Metrics::new()),
            clock,
        }
    }

    /// Record deliveries in the given audit log.
    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    /// Publish status changes on the given channel.
    pub fn with_events(mut self, events: TradeEvents) -> Self {
        self.events = events;
        self
    }

    /// Count into the given metrics.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Authenticate and apply one delivery.
    #[instrument(skip(self, body, signature), fields(body_len = body.len()))]
    pub async fn handle(&self, body: &[u8], signature: Option<&str>) -> Result<ReconcileOutcome> {
        if let Err(e) = self.verifier.verify(body, signature) {
            self.metrics.webhook_rejected();
            warn!(error = %e, "Webhook authentication failed");
            return Err(SwapSettleError::WebhookAuthentication);
        }

        let envelope = WebhookEnvelope::from_slice(body).map_err(|e| {
            warn!(error = %e, "Malformed webhook body");
            SwapSettleError::validation(format!("Malformed webhook body: {}", e), "body")
        })?;
        self.metrics.webhook_received();

        let received_at = self.clock.now();
        let outcome = self.apply(&envelope).await?;

        self.audit.record(AuditEntry {
            event_type: envelope.event.clone(),
            external_id: Some(envelope.data.id.clone()),
            payload_sha256: PayloadDigest::of(body).to_hex(),
            received_at,
            outcome: outcome.label().to_string(),
        });

        match &outcome {
            ReconcileOutcome::Applied { .. } | ReconcileOutcome::Recorded { .. } => {
                self.metrics.webhook_applied()
            }
            ReconcileOutcome::Stale { .. } => self.metrics.webhook_stale(),
            ReconcileOutcome::Ignored { .. } => self.metrics.webhook_ignored(),
        }

        info!(
            event_type = %envelope.event,
            external_id = %envelope.data.id,
            outcome = outcome.label(),
            "Webhook handled"
        );
        Ok(outcome)
    }

    async fn apply(&self, envelope: &WebhookEnvelope) -> Result<ReconcileOutcome> {
        let data = &envelope.data;

        match ProviderEvent::classify(&envelope.event) {
            ProviderEvent::OrderCompleted => match self.locate(data).await? {
                Some(trade) => self.complete(trade).await,
                None => self.record_external(envelope).await,
            },
            ProviderEvent::WithdrawCompleted => match self.locate(data).await? {
                Some(trade) => self.complete(trade).await,
                None => Ok(self.ignore(envelope, "No trade for withdrawal")),
            },
            ProviderEvent::DepositCompleted => self.record_deposit(envelope).await,
            ProviderEvent::Failed(kind) => match self.locate(data).await? {
                Some(trade) => self.fail(trade, kind, envelope).await,
                None => Ok(self.ignore(envelope, "No trade for failure event")),
            },
            ProviderEvent::Unknown => Ok(self.ignore(envelope, "Unknown webhook event type")),
        }
    }

    fn ignore(&self, envelope: &WebhookEnvelope, reason: &str) -> ReconcileOutcome {
        warn!(event_type = %envelope.event, external_id = %envelope.data.id, "{}", reason);
        ReconcileOutcome::Ignored {
            event_type: envelope.event.clone(),
        }
    }

    /// Find the trade by provider id, then by the echoed reference.
    async fn locate(&self, data: &WebhookData) -> Result<Option<Trade>> {
        if !data.id.is_empty() {
            if let Some(trade) = self.store.find_by_external_reference(&data.id).await? {
                return Ok(Some(trade));
            }
        }

        let Some(reference) = data.reference.as_deref().filter(|r| !r.is_empty()) else {
            return Ok(None);
        };
        let Some(trade) = self
            .store
            .find_by_reference(&TradeReference::from(reference))
            .await?
        else {
            return Ok(None);
        };

        // The webhook overtook the synchronous acknowledgment.
        if trade.external_reference.is_none() && !data.id.is_empty() {
            self.store.assign_external_reference(&trade.id, &data.id).await?;
        }
        Ok(Some(trade))
    }

    async fn complete(&self, trade: Trade) -> Result<ReconcileOutcome> {
        let update = self
            .store
            .update_status_if(
                &trade.id,
                TradeStatus::open(),
                TradeStatus::Completed,
                None,
                self.clock.now(),
            )
            .await?;

        let (trade, previous) = match update {
            StatusUpdate::Updated { trade, previous } => (trade, previous),
            StatusUpdate::Unchanged(current) => return self.replay_terminal(current).await,
        };

        self.settle_wallet(&trade).await?;

        self.metrics.trade_completed();
        self.events.publish(TradeEvent::for_trade(&trade, Some(previous)));
        info!(trade_id = %trade.id, reference = %trade.reference, "Trade completed");

        Ok(ReconcileOutcome::Applied {
            trade_id: trade.id,
            status: trade.status,
        })
    }

    async fn fail(
        &self,
        trade: Trade,
        kind: FailureKind,
        envelope: &WebhookEnvelope,
    ) -> Result<ReconcileOutcome> {
        let now = self.clock.now();
        let message = envelope
            .data
            .reason
            .clone()
            .unwrap_or_else(|| envelope.event.clone());
        let failure = TradeFailure::new(kind.failure_code(), message, now);

        let update = self
            .store
            .update_status_if(&trade.id, TradeStatus::open(), TradeStatus::Failed, Some(failure), now)
            .await?;

        let (trade, previous) = match update {
            StatusUpdate::Updated { trade, previous } => (trade, previous),
            StatusUpdate::Unchanged(current) => return self.replay_terminal(current).await,
        };

        self.settle_wallet(&trade).await?;

        self.metrics.trade_failed();
        self.events.publish(TradeEvent::for_trade(&trade, Some(previous)));
        warn!(trade_id = %trade.id, reference = %trade.reference, kind = ?kind, "Trade failed");

        Ok(ReconcileOutcome::Applied {
            trade_id: trade.id,
            status: trade.status,
        })
    }

    /// Wallet effects of a terminal trade. Every step is keyed by the trade
    /// reference, so running them again after a partial failure only applies
    /// what is missing.
    async fn settle_wallet(&self, trade: &Trade) -> Result<()> {
        match trade.status {
            TradeStatus::Completed => {
                if let Some(funding) = &trade.funding {
                    self.ledger.commit(&trade.user_id, funding, &trade.reference).await?;
                }
                if let Some(proceeds) = &trade.proceeds {
                    self.ledger.credit(&trade.user_id, proceeds, &trade.reference).await?;
                }
            }
            TradeStatus::Failed => {
                if let Some(funding) = &trade.funding {
                    self.ledger.release(&trade.user_id, funding, &trade.reference).await?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// A delivery for a trade that is already terminal. Its wallet effects
    /// are re-applied before reporting it stale; an error here lets the
    /// provider retry.
    async fn replay_terminal(&self, trade: Trade) -> Result<ReconcileOutcome> {
        if let Err(e) = self.settle_wallet(&trade).await {
            error!(trade_id = %trade.id, status = %trade.status, error = %e, "Wallet settlement retry failed");
            return Err(e);
        }
        Ok(self.stale(trade))
    }

    fn stale(&self, trade: Trade) -> ReconcileOutcome {
        debug!(trade_id = %trade.id, status = %trade.status, "Webhook for terminal trade");
        ReconcileOutcome::Stale {
            trade_id: trade.id,
            status: trade.status,
        }
    }

    /// Resolve the owner and amount of a provider-initiated movement.
    fn external_movement(&self, data: &WebhookData) -> Option<(UserId, Money)> {
        let user_id = data
            .account_id
            .as_deref()
            .and_then(|account| self.accounts.find_by_provider_account(account))?;
        let currency = Currency::new(data.currency.as_deref()?);
        let amount = Money::parse(data.amount.as_deref()?, currency.clone(), currency.scale()).ok()?;
        amount.is_positive().then_some((user_id, amount))
    }

    /// Create a completed trade for an event with no local origin.
    async fn create_completed(
        &self,
        user_id: UserId,
        trade_type: TradeType,
        reference: TradeReference,
        amount: Money,
        external_id: &str,
    ) -> Result<CreateOutcome> {
        let now = self.clock.now();
        let mut trade = Trade::new(user_id, trade_type, reference, amount, now);
        trade.assign_external_reference(external_id);
        trade.transition_to(TradeStatus::Completed, now)?;

        self.store.create_if_absent(trade).await
    }

    /// A completed order the engine never created.
    async fn record_external(&self, envelope: &WebhookEnvelope) -> Result<ReconcileOutcome> {
        let data = &envelope.data;
        let Some((user_id, amount)) = self.external_movement(data) else {
            return Ok(self.ignore(envelope, "Completed order for unknown account"));
        };

        let created = self
            .create_completed(
                user_id,
                TradeType::Swap,
                TradeReference::for_external(&data.id),
                amount,
                &data.id,
            )
            .await?;

        match created {
            CreateOutcome::Created(trade) => {
                self.metrics.trade_completed();
                self.events.publish(TradeEvent::for_trade(&trade, None));
                info!(trade_id = %trade.id, external_id = %data.id, "External trade recorded");
                Ok(ReconcileOutcome::Recorded { trade_id: trade.id })
            }
            CreateOutcome::Existing(existing) => Ok(self.stale(existing)),
        }
    }

    /// Funds arriving in a sub-account.
    async fn record_deposit(&self, envelope: &WebhookEnvelope) -> Result<ReconcileOutcome> {
        let data = &envelope.data;
        if data.id.is_empty() {
            return Ok(self.ignore(envelope, "Deposit without provider id"));
        }
        let Some((user_id, amount)) = self.external_movement(data) else {
            return Ok(self.ignore(envelope, "Deposit for unknown account"));
        };

        let reference = TradeReference::for_deposit(&data.id);
        let created = self
            .create_completed(user_id, TradeType::Deposit, reference.clone(), amount, &data.id)
            .await?;

        let (trade, created) = match created {
            CreateOutcome::Created(trade) => (trade, true),
            CreateOutcome::Existing(existing) => (existing, false),
        };

        // Credited on every delivery; the ledger applies it once.
        if let Err(e) = self.ledger.credit(&trade.user_id, &trade.amount, &reference).await {
            error!(trade_id = %trade.id, error = %e, "Deposit credit failed");
            return Err(e);
        }
        if !created {
            return Ok(self.stale(trade));
        }

        self.metrics.trade_completed();
        self.events.publish(TradeEvent::for_trade(&trade, None));
        info!(trade_id = %trade.id, amount = %trade.amount, "Deposit recorded");
        Ok(ReconcileOutcome::Recorded { trade_id: trade.id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{
        btc, buy_quote, fund, ngn, setup_harness, setup_harness_with, user, FlakyLedger, TestHarness,
    };
    use crate::store::InMemoryTradeStore;
    use async_trait::async_trait;
    use std::sync::OnceLock;
    use swapsettle_common::FailureCode;
    use swapsettle_crypto::{SharedSecret, WebhookSigner};
    use swapsettle_protocol::{
        InstantOrderRequest, LiquidityProvider, ProviderAck, ProviderError, WithdrawRequest,
    };

    const SECRET: &str = "whsec_test";

    fn make_test_reconciler(harness: &TestHarness) -> WebhookReconciler {
        WebhookReconciler::new(
            WebhookVerifier::shared_secret(SharedSecret::new(SECRET).unwrap()),
            harness.store.clone(),
            harness.ledger.clone(),
            harness.accounts.clone(),
            harness.clock.clone(),
        )
        .with_metrics(harness.metrics.clone())
        .with_events(harness.events.clone())
    }

    fn signed(event: &str, data: serde_json::Value) -> (Vec<u8>, String) {
        let body = serde_json::to_vec(&serde_json::json!({"event": event, "data": data})).unwrap();
        let header = WebhookSigner::SharedSecret(SharedSecret::new(SECRET).unwrap())
            .header(&body, Some(1_700_000_000))
            .unwrap();
        (body, header)
    }

    async fn deliver(
        reconciler: &WebhookReconciler,
        event: &str,
        data: serde_json::Value,
    ) -> Result<ReconcileOutcome> {
        let (body, header) = signed(event, data);
        reconciler.handle(&body, Some(&header)).await
    }

    async fn setup_processing_buy(harness: &TestHarness) -> Trade {
        fund(harness, ngn("200000")).await;
        let quote = buy_quote(harness).await;
        harness.engine.confirm_trade(&quote.id, &user()).await.unwrap()
    }

    #[tokio::test]
    async fn test_order_done_completes_and_settles_wallets() {
        let harness = setup_harness();
        let reconciler = make_test_reconciler(&harness);
        let trade = setup_processing_buy(&harness).await;

        let outcome = deliver(&reconciler, "order.done", serde_json::json!({"id": "ord_1"}))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Applied {
                trade_id: trade.id,
                status: TradeStatus::Completed
            }
        );

        let ngn_wallet = harness.ledger.balance(&user(), &Currency::ngn()).await.unwrap();
        assert_eq!(ngn_wallet.balance, ngn("97000"));
        assert!(ngn_wallet.pending.is_zero());

        let btc_wallet = harness.ledger.balance(&user(), &Currency::btc()).await.unwrap();
        assert_eq!(btc_wallet.balance, btc("0.002"));
        assert_eq!(harness.metrics.snapshot().trades_completed, 1);
    }

    #[tokio::test]
    async fn test_replayed_webhook_is_idempotent() {
        let harness = setup_harness();
        let reconciler = make_test_reconciler(&harness);
        let trade = setup_processing_buy(&harness).await;

        let (body, header) = signed("instant_order.done", serde_json::json!({"id": "ord_1"}));
        reconciler.handle(&body, Some(&header)).await.unwrap();
        let journal = harness.ledger.journal_len();

        let replay = reconciler.handle(&body, Some(&header)).await.unwrap();
        assert_eq!(
            replay,
            ReconcileOutcome::Stale {
                trade_id: trade.id,
                status: TradeStatus::Completed
            }
        );
        assert_eq!(harness.ledger.journal_len(), journal);

        let btc_wallet = harness.ledger.balance(&user(), &Currency::btc()).await.unwrap();
        assert_eq!(btc_wallet.balance, btc("0.002"));

        let snapshot = harness.metrics.snapshot();
        assert_eq!(snapshot.webhooks_received, 2);
        assert_eq!(snapshot.webhooks_applied, 1);
        assert_eq!(snapshot.webhooks_stale, 1);
        assert_eq!(reconciler.audit().len(), 2);
        assert_eq!(reconciler.audit().recent(1)[0].outcome, "stale");
    }

    #[tokio::test]
    async fn test_failure_releases_and_terminal_states_hold() {
        let harness = setup_harness();
        let reconciler = make_test_reconciler(&harness);
        let trade = setup_processing_buy(&harness).await;

        let outcome = deliver(
            &reconciler,
            "instant_order.cancelled",
            serde_json::json!({"id": "ord_1", "reason": "market closed"}),
        )
        .await
        .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Applied { status: TradeStatus::Failed, .. }));

        let stored = harness.store.get(&trade.id).await.unwrap().unwrap();
        let failure = stored.failure.unwrap();
        assert_eq!(failure.code, FailureCode::Cancelled);
        assert_eq!(failure.message, "market closed");

        let wallet = harness.ledger.balance(&user(), &Currency::ngn()).await.unwrap();
        assert!(wallet.pending.is_zero());
        assert_eq!(wallet.balance, ngn("200000"));

        let late = deliver(&reconciler, "order.done", serde_json::json!({"id": "ord_1"}))
            .await
            .unwrap();
        assert!(matches!(late, ReconcileOutcome::Stale { status: TradeStatus::Failed, .. }));
        let btc_wallet = harness.ledger.balance(&user(), &Currency::btc()).await.unwrap();
        assert!(btc_wallet.balance.is_zero());
    }

    #[tokio::test]
    async fn test_late_failure_does_not_override_completion() {
        let harness = setup_harness();
        let reconciler = make_test_reconciler(&harness);
        setup_processing_buy(&harness).await;

        deliver(&reconciler, "order.done", serde_json::json!({"id": "ord_1"}))
            .await
            .unwrap();
        let late = deliver(&reconciler, "order.reversed", serde_json::json!({"id": "ord_1"}))
            .await
            .unwrap();

        assert!(matches!(late, ReconcileOutcome::Stale { status: TradeStatus::Completed, .. }));
        let wallet = harness.ledger.balance(&user(), &Currency::ngn()).await.unwrap();
        assert_eq!(wallet.balance, ngn("97000"));
    }

    #[tokio::test]
    async fn test_withdraw_successful_commits_debit() {
        let harness = setup_harness();
        let reconciler = make_test_reconciler(&harness);
        fund(&harness, btc("1")).await;
        let trade = harness
            .engine
            .withdraw(crate::engine::WithdrawalRequest {
                user_id: user(),
                currency: Currency::btc(),
                amount: "0.25".to_string(),
                network: None,
                destination: "bc1qexample".to_string(),
                idempotency_key: None,
            })
            .await
            .unwrap();

        let outcome = deliver(
            &reconciler,
            "withdraw.successful",
            serde_json::json!({"id": "wd_1", "reference": trade.reference.as_str()}),
        )
        .await
        .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Applied { status: TradeStatus::Completed, .. }));

        let wallet = harness.ledger.balance(&user(), &Currency::btc()).await.unwrap();
        assert_eq!(wallet.balance, btc("0.75"));
        assert!(wallet.pending.is_zero());
    }

    #[tokio::test]
    async fn test_deposit_is_recorded_once() {
        let harness = setup_harness();
        let reconciler = make_test_reconciler(&harness);
        let data = serde_json::json!({
            "id": "dep_1", "user_id": "acct-1", "currency": "usdt", "amount": "25.5"
        });

        let first = deliver(&reconciler, "deposit.successful", data.clone()).await.unwrap();
        assert!(matches!(first, ReconcileOutcome::Recorded { .. }));
        let second = deliver(&reconciler, "deposit.successful", data).await.unwrap();
        assert!(matches!(second, ReconcileOutcome::Stale { status: TradeStatus::Completed, .. }));

        let wallet = harness.ledger.balance(&user(), &Currency::usdt()).await.unwrap();
        assert_eq!(wallet.balance, Money::parse("25.5", Currency::usdt(), 8).unwrap());

        let trade = harness
            .store
            .find_by_reference(&TradeReference::for_deposit("dep_1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(trade.trade_type, TradeType::Deposit);
        assert_eq!(trade.status, TradeStatus::Completed);
    }

    #[tokio::test]
    async fn test_unmatched_order_records_external_trade() {
        let harness = setup_harness();
        let reconciler = make_test_reconciler(&harness);

        let outcome = deliver(
            &reconciler,
            "swap.completed",
            serde_json::json!({"id": "swp_9", "account_id": "acct-1", "currency": "eth", "amount": "1.5"}),
        )
        .await
        .unwrap();
        let ReconcileOutcome::Recorded { trade_id } = outcome else {
            panic!("expected a recorded trade");
        };

        let trade = harness.store.get(&trade_id).await.unwrap().unwrap();
        assert_eq!(trade.user_id, user());
        assert_eq!(trade.status, TradeStatus::Completed);
        assert_eq!(trade.external_reference.as_deref(), Some("swp_9"));
        assert_eq!(harness.ledger.journal_len(), 0);

        let unknown_account = deliver(
            &reconciler,
            "swap.completed",
            serde_json::json!({"id": "swp_10", "account_id": "nobody", "currency": "eth", "amount": "1"}),
        )
        .await
        .unwrap();
        assert!(matches!(unknown_account, ReconcileOutcome::Ignored { .. }));
    }

    #[tokio::test]
    async fn test_unknown_event_is_ignored() {
        let harness = setup_harness();
        let reconciler = make_test_reconciler(&harness);

        let outcome = deliver(&reconciler, "wallet.updated", serde_json::json!({"id": "x"}))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Ignored {
                event_type: "wallet.updated".to_string()
            }
        );
        assert_eq!(harness.metrics.snapshot().webhooks_ignored, 1);
    }

    #[tokio::test]
    async fn test_bad_signature_has_no_side_effects() {
        let harness = setup_harness();
        let reconciler = make_test_reconciler(&harness);
        let trade = setup_processing_buy(&harness).await;

        let (body, _) = signed("order.done", serde_json::json!({"id": "ord_1"}));
        let forged = WebhookSigner::SharedSecret(SharedSecret::new("wrong").unwrap())
            .header(&body, None)
            .unwrap();

        let err = reconciler.handle(&body, Some(&forged)).await.unwrap_err();
        assert_eq!(err, SwapSettleError::WebhookAuthentication);
        let err = reconciler.handle(&body, None).await.unwrap_err();
        assert_eq!(err, SwapSettleError::WebhookAuthentication);

        let stored = harness.store.get(&trade.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TradeStatus::Processing);
        assert!(reconciler.audit().is_empty());
        assert_eq!(harness.metrics.snapshot().webhooks_rejected, 2);
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let harness = setup_harness();
        let reconciler = make_test_reconciler(&harness);
        let body = b"not json";
        let header = WebhookSigner::SharedSecret(SharedSecret::new(SECRET).unwrap())
            .header(body, None)
            .unwrap();

        let err = reconciler.handle(body, Some(&header)).await.unwrap_err();
        assert!(matches!(err, SwapSettleError::Validation { .. }));
    }

    /// Delivers the completion webhook before acknowledging the order.
    struct WebhookFirstProvider {
        reconciler: OnceLock<Arc<WebhookReconciler>>,
    }

    #[async_trait]
    impl LiquidityProvider for WebhookFirstProvider {
        fn name(&self) -> &str {
            "webhook-first"
        }

        async fn execute_order(
            &self,
            request: &InstantOrderRequest,
        ) -> std::result::Result<ProviderAck, ProviderError> {
            let reconciler = self.reconciler.get().expect("reconciler installed");
            let (body, header) = signed(
                "instant_order.done",
                serde_json::json!({"id": "ord_fast", "note": request.reference}),
            );
            reconciler.handle(&body, Some(&header)).await.unwrap();

            Ok(ProviderAck {
                id: "ord_fast".to_string(),
                status: "done".to_string(),
                reference: Some(request.reference.clone()),
            })
        }

        async fn withdraw(
            &self,
            _request: &WithdrawRequest,
        ) -> std::result::Result<ProviderAck, ProviderError> {
            Err(ProviderError::Unavailable("not used".into()))
        }
    }

    #[tokio::test]
    async fn test_webhook_before_acknowledgment() {
        let provider = Arc::new(WebhookFirstProvider {
            reconciler: OnceLock::new(),
        });
        let harness = setup_harness_with(provider.clone());
        let reconciler = Arc::new(make_test_reconciler(&harness));
        let _ = provider.reconciler.set(reconciler.clone());

        let trade = setup_processing_buy(&harness).await;

        assert_eq!(trade.status, TradeStatus::Completed);
        assert_eq!(trade.external_reference.as_deref(), Some("ord_fast"));
        let btc_wallet = harness.ledger.balance(&user(), &Currency::btc()).await.unwrap();
        assert_eq!(btc_wallet.balance, btc("0.002"));
        assert_eq!(harness.metrics.snapshot().trades_processing, 0);
    }

    #[tokio::test]
    async fn test_failure_event_for_unknown_trade_is_ignored() {
        let harness = setup_harness();
        let reconciler = WebhookReconciler::new(
            WebhookVerifier::shared_secret(SharedSecret::new(SECRET).unwrap()),
            Arc::new(InMemoryTradeStore::new()),
            harness.ledger.clone(),
            harness.accounts.clone(),
            harness.clock.clone(),
        );

        let outcome = deliver(&reconciler, "withdraw.failed", serde_json::json!({"id": "wd_404"}))
            .await
            .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Ignored { .. }));
    }

    fn make_flaky_reconciler(harness: &TestHarness, ledger: FlakyLedger) -> WebhookReconciler {
        WebhookReconciler::new(
            WebhookVerifier::shared_secret(SharedSecret::new(SECRET).unwrap()),
            harness.store.clone(),
            Arc::new(ledger),
            harness.accounts.clone(),
            harness.clock.clone(),
        )
        .with_metrics(harness.metrics.clone())
    }

    #[tokio::test]
    async fn test_retry_finishes_wallet_settlement_after_ledger_error() {
        let harness = setup_harness();
        let ledger = FlakyLedger::new(harness.ledger.clone());
        ledger.fail_next_commit();
        let reconciler = make_flaky_reconciler(&harness, ledger);
        let trade = setup_processing_buy(&harness).await;

        let (body, header) = signed("order.done", serde_json::json!({"id": "ord_1"}));
        assert!(reconciler.handle(&body, Some(&header)).await.is_err());

        let stored = harness.store.get(&trade.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TradeStatus::Completed);
        let wallet = harness.ledger.balance(&user(), &Currency::ngn()).await.unwrap();
        assert_eq!(wallet.pending, ngn("103000"));

        let retry = reconciler.handle(&body, Some(&header)).await.unwrap();
        assert!(matches!(retry, ReconcileOutcome::Stale { status: TradeStatus::Completed, .. }));

        let ngn_wallet = harness.ledger.balance(&user(), &Currency::ngn()).await.unwrap();
        assert_eq!(ngn_wallet.balance, ngn("97000"));
        assert!(ngn_wallet.pending.is_zero());
        let btc_wallet = harness.ledger.balance(&user(), &Currency::btc()).await.unwrap();
        assert_eq!(btc_wallet.balance, btc("0.002"));

        let journal = harness.ledger.journal_len();
        reconciler.handle(&body, Some(&header)).await.unwrap();
        assert_eq!(harness.ledger.journal_len(), journal);
    }

    #[tokio::test]
    async fn test_retry_credits_deposit_after_ledger_error() {
        let harness = setup_harness();
        let ledger = FlakyLedger::new(harness.ledger.clone());
        ledger.fail_next_credit();
        let reconciler = make_flaky_reconciler(&harness, ledger);
        let data = serde_json::json!({
            "id": "dep_7", "account_id": "acct-1", "currency": "btc", "amount": "0.1"
        });

        assert!(deliver(&reconciler, "deposit.successful", data.clone()).await.is_err());
        let wallet = harness.ledger.balance(&user(), &Currency::btc()).await.unwrap();
        assert!(wallet.balance.is_zero());

        let retry = deliver(&reconciler, "deposit.successful", data.clone()).await.unwrap();
        assert!(matches!(retry, ReconcileOutcome::Stale { status: TradeStatus::Completed, .. }));
        let wallet = harness.ledger.balance(&user(), &Currency::btc()).await.unwrap();
        assert_eq!(wallet.balance, btc("0.1"));

        deliver(&reconciler, "deposit.successful", data).await.unwrap();
        let wallet = harness.ledger.balance(&user(), &Currency::btc()).await.unwrap();
        assert_eq!(wallet.balance, btc("0.1"));
    }
}
