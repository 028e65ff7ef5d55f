//! Trade settlement engine.
//!
//! Turns a live quote or a withdrawal request into a trade, reserves the
//! funding leg, and executes it at the liquidity provider. The synchronous
//! acknowledgment moves the trade to `PROCESSING`; completion arrives later
//! through the webhook reconciler.

use std::sync::Arc;

use swapsettle_common::{
    Clock, Currency, FailureCode, Money, QuoteId, Result, SwapSettleError, Trade, TradeFailure,
    TradeId, TradeReference, TradeStatus, TradeType, UserId,
};
use swapsettle_fx::{Quote, QuoteRequest, QuoteService};
use swapsettle_ledger::{
    AccountDirectory, WalletLedger, WithdrawalCheck, WithdrawalLimits, WithdrawalValidator,
};
use swapsettle_protocol::{
    InstantOrderRequest, LiquidityProvider, OrderSide, ProviderAck, ProviderError,
    WithdrawRequest,
};
use tracing::{error, info, instrument, warn};

use crate::events::{TradeEvent, TradeEvents};
use crate::metrics::Metrics;
use crate::store::{CreateOutcome, StatusUpdate, TradeStore};

/// Parameters of a withdrawal request.
#[derive(Debug, Clone)]
pub struct WithdrawalRequest {
    pub user_id: UserId,
    pub currency: Currency,
    /// Decimal string.
    pub amount: String,
    pub network: Option<String>,
    /// Destination address or bank account.
    pub destination: String,
    /// Client key; a retry with the same key returns the same trade.
    pub idempotency_key: Option<String>,
}

/// Confirms quotes and withdrawals into trades and executes them.
pub struct SettlementEngine {
    quotes: Arc<QuoteService>,
    provider: Arc<dyn LiquidityProvider>,
    ledger: Arc<dyn WalletLedger>,
    store: Arc<dyn TradeStore>,
    accounts: Arc<AccountDirectory>,
    validator: WithdrawalValidator,
    events: TradeEvents,
    metrics: Arc<Metrics>,
    clock: Arc<dyn Clock>,
}

impl SettlementEngine {
    /// Create a new engine.
    pub fn new(
        quotes: Arc<QuoteService>,
        provider: Arc<dyn LiquidityProvider>,
        ledger: Arc<dyn WalletLedger>,
        store: Arc<dyn TradeStore>,
        accounts: Arc<AccountDirectory>,
        limits: WithdrawalLimits,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            validator: WithdrawalValidator::new(ledger.clone(), limits),
            quotes,
            provider,
            ledger,
            store,
            accounts,
            events: TradeEvents::default(),
            metrics: Arc::new(Metrics::new()),
            clock,
        }
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

    /// Issue a quote.
    pub async fn get_quote(&self, request: QuoteRequest) -> Result<Quote> {
        let quote = self.quotes.get_quote(request).await?;
        self.metrics.quote_issued();
        Ok(quote)
    }

    /// Convert a live quote into a trade and execute it.
    #[instrument(skip(self), fields(quote_id = %quote_id, user_id = %user_id))]
    pub async fn confirm_trade(&self, quote_id: &QuoteId, user_id: &UserId) -> Result<Trade> {
        let account = self.accounts.ensure_active(user_id)?;
        let quote = self.quotes.consume(quote_id, user_id)?;
        let reference = TradeReference::for_quote(&quote.id);

        if let Err(e) = self.ledger.reserve(user_id, &quote.pay, &reference).await {
            warn!(error = %e, "Funding reservation failed");
            self.quotes.restore(&quote.id);
            return Err(e);
        }

        let mut trade = Trade::new(
            user_id.clone(),
            quote.trade_type,
            reference.clone(),
            quote.amount.clone(),
            self.clock.now(),
        );
        trade.quote_id = Some(quote.id);
        trade.rate = Some(quote.rate);
        trade.fees = Some(quote.fees.clone());
        trade.funding = Some(quote.pay.clone());
        trade.proceeds = Some(quote.receive.clone());

        let trade = match self.store.create_if_absent(trade).await {
            Ok(CreateOutcome::Created(trade)) => trade,
            Ok(CreateOutcome::Existing(existing)) => {
                // The reservation above was a replay of the existing trade's own.
                warn!(trade_id = %existing.id, "Quote already has a trade");
                return Err(SwapSettleError::QuoteAlreadyConsumed(quote.id));
            }
            Err(e) => {
                error!(error = %e, "Trade creation failed");
                self.release_quietly(user_id, &quote.pay, &reference).await;
                self.quotes.restore(&quote.id);
                return Err(e);
            }
        };

        self.metrics.trade_confirmed();
        self.events.publish(TradeEvent::for_trade(&trade, None));
        info!(trade_id = %trade.id, reference = %reference, pay = %quote.pay, "Trade created");

        let request = InstantOrderRequest {
            account_id: account.provider_account_id,
            market: quote.pair().market_symbol(),
            side: match quote.trade_type {
                TradeType::Buy => OrderSide::Buy,
                _ => OrderSide::Sell,
            },
            unit: quote.amount.currency().code().to_lowercase(),
            volume: quote.amount.to_string(),
            price: quote.rate.to_string(),
            reference: reference.to_string(),
        };

        let result = self.provider.execute_order(&request).await;
        self.settle_response(trade, result).await
    }

    /// Side-effect-free withdrawal pre-check.
    pub async fn validate_withdrawal(
        &self,
        user_id: &UserId,
        currency: &Currency,
        amount: &str,
        network: Option<&str>,
    ) -> Result<WithdrawalCheck> {
        self.validator.check(user_id, currency, amount, network).await
    }

    /// Validate, reserve and send a withdrawal.
    #[instrument(skip(self, request), fields(user_id = %request.user_id, currency = %request.currency))]
    pub async fn withdraw(&self, request: WithdrawalRequest) -> Result<Trade> {
        let user_id = &request.user_id;
        let account = self.accounts.ensure_active(user_id)?;

        if request.destination.trim().is_empty() {
            return Err(SwapSettleError::validation(
                "Destination is required",
                "address",
            ));
        }

        let reference = TradeReference::for_withdrawal(user_id, request.idempotency_key.as_deref());
        if request.idempotency_key.is_some() {
            if let Some(existing) = self.store.find_by_reference(&reference).await? {
                info!(trade_id = %existing.id, reference = %reference, "Withdrawal replayed");
                return Ok(existing);
            }
        }

        let (check, _) = self
            .validator
            .reserve(
                user_id,
                &request.currency,
                &request.amount,
                request.network.as_deref(),
                &reference,
            )
            .await?;

        let mut trade = Trade::new(
            user_id.clone(),
            TradeType::Withdrawal,
            reference.clone(),
            check.requested.clone(),
            self.clock.now(),
        );
        trade.funding = Some(check.requested.clone());
        trade.network = request.network.clone();
        trade.destination = Some(request.destination.clone());

        let trade = match self.store.create_if_absent(trade).await {
            Ok(CreateOutcome::Created(trade)) => trade,
            Ok(CreateOutcome::Existing(existing)) => return Ok(existing),
            Err(e) => {
                error!(error = %e, "Trade creation failed");
                self.release_quietly(user_id, &check.requested, &reference).await;
                return Err(e);
            }
        };

        self.metrics.withdrawal_requested();
        self.events.publish(TradeEvent::for_trade(&trade, None));
        info!(trade_id = %trade.id, reference = %reference, amount = %check.requested, "Withdrawal created");

        let withdraw = WithdrawRequest {
            account_id: account.provider_account_id,
            currency: request.currency.code().to_lowercase(),
            amount: check.requested.to_string(),
            network: request.network,
            fund_uid: request.destination,
            reference: reference.to_string(),
        };

        let result = self.provider.withdraw(&withdraw).await;
        self.settle_response(trade, result).await
    }

    /// Get a trade owned by `user_id`.
    pub async fn get_trade(&self, id: &TradeId, user_id: &UserId) -> Result<Trade> {
        match self.store.get(id).await? {
            Some(trade) if &trade.user_id == user_id => Ok(trade),
            _ => Err(SwapSettleError::TradeNotFound(id.to_string())),
        }
    }

    /// All trades of a user, oldest first.
    pub async fn trades_for_user(&self, user_id: &UserId) -> Result<Vec<Trade>> {
        self.store.list_for_user(user_id).await
    }

    /// Receive trade status changes.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<TradeEvent> {
        self.events.subscribe()
    }

    /// Quote service backing `get_quote`.
    pub fn quotes(&self) -> &QuoteService {
        &self.quotes
    }

    /// Configured withdrawal minimums.
    pub fn withdrawal_limits(&self) -> &WithdrawalLimits {
        self.validator.limits()
    }

    /// Apply the provider's synchronous answer to a pending trade.
    async fn settle_response(
        &self,
        trade: Trade,
        result: std::result::Result<ProviderAck, ProviderError>,
    ) -> Result<Trade> {
        let now = self.clock.now();

        let ack = match result {
            Ok(ack) => ack,
            Err(provider_error) => {
                warn!(trade_id = %trade.id, error = %provider_error, "Provider call failed");
                let failure =
                    TradeFailure::new(FailureCode::ProviderError, provider_error.to_string(), now);
                return self.fail_pending(trade, failure, provider_error.into()).await;
            }
        };

        match self.store.assign_external_reference(&trade.id, &ack.id).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(trade_id = %trade.id, external_id = %ack.id, "External reference already set")
            }
            Err(e) => {
                error!(trade_id = %trade.id, external_id = %ack.id, error = %e, "Failed to record external reference")
            }
        }

        if let Some(kind) = ack.failure() {
            warn!(trade_id = %trade.id, external_id = %ack.id, status = %ack.status, "Provider refused the request");
            let message = format!("Provider answered {} with status {}", ack.id, ack.status);
            let failure = TradeFailure::new(kind.failure_code(), message.clone(), now);
            return self
                .fail_pending(trade, failure, SwapSettleError::ProviderError(message))
                .await;
        }

        match self
            .store
            .update_status_if(&trade.id, &[TradeStatus::Pending], TradeStatus::Processing, None, now)
            .await?
        {
            StatusUpdate::Updated { trade, previous } => {
                self.metrics.trade_processing();
                self.events.publish(TradeEvent::for_trade(&trade, Some(previous)));
                info!(trade_id = %trade.id, external_id = %ack.id, "Trade processing");
                Ok(trade)
            }
            StatusUpdate::Unchanged(current) => {
                info!(trade_id = %current.id, status = %current.status, "Trade already advanced by webhook");
                Ok(current)
            }
        }
    }

    /// Fail a pending trade and drop its hold. A trade a webhook already
    /// finalized is returned as it stands.
    async fn fail_pending(
        &self,
        trade: Trade,
        failure: TradeFailure,
        error: SwapSettleError,
    ) -> Result<Trade> {
        match self
            .store
            .update_status_if(
                &trade.id,
                &[TradeStatus::Pending],
                TradeStatus::Failed,
                Some(failure),
                self.clock.now(),
            )
            .await?
        {
            StatusUpdate::Updated { trade, previous } => {
                if let Some(funding) = &trade.funding {
                    self.release_quietly(&trade.user_id, funding, &trade.reference).await;
                }
                self.metrics.trade_failed();
                self.events.publish(TradeEvent::for_trade(&trade, Some(previous)));
                Err(error)
            }
            StatusUpdate::Unchanged(current) if current.is_final() => {
                info!(trade_id = %current.id, status = %current.status, "Trade already finalized by webhook");
                Ok(current)
            }
            StatusUpdate::Unchanged(_) => Err(error),
        }
    }

    async fn release_quietly(&self, user_id: &UserId, amount: &Money, reference: &TradeReference) {
        if let Err(e) = self.ledger.release(user_id, amount, reference).await {
            error!(reference = %reference, error = %e, "Failed to release reservation");
        }
    }
}
