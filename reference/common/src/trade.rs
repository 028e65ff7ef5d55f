//! Trade types and state machine for SwapSettle.

use crate::{Currency, Money, QuoteId, Timestamp, TradeId, TradeReference, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Kind of value movement a trade represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeType {
    Buy,
    Sell,
    Withdrawal,
    Deposit,
    Swap,
}

impl TradeType {
    /// Whether a price quote can be issued for this type.
    pub fn is_quotable(&self) -> bool {
        matches!(self, TradeType::Buy | TradeType::Sell | TradeType::Swap)
    }
}

impl std::fmt::Display for TradeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TradeType::Buy => "buy",
            TradeType::Sell => "sell",
            TradeType::Withdrawal => "withdrawal",
            TradeType::Deposit => "deposit",
            TradeType::Swap => "swap",
        };
        f.write_str(name)
    }
}

/// Trade status representing the lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    /// Created locally, provider not yet acknowledged.
    Pending,
    /// Provider acknowledged receipt.
    Processing,
    /// Settled.
    Completed,
    /// Rejected synchronously or failed asynchronously.
    Failed,
}

impl TradeStatus {
    /// Check if this is a final state.
    pub fn is_final(&self) -> bool {
        matches!(self, TradeStatus::Completed | TradeStatus::Failed)
    }

    /// Get valid next states from current state.
    pub fn valid_transitions(&self) -> &[TradeStatus] {
        match self {
            // A webhook may overtake the synchronous acknowledgment.
            TradeStatus::Pending => &[
                TradeStatus::Processing,
                TradeStatus::Completed,
                TradeStatus::Failed,
            ],
            TradeStatus::Processing => &[TradeStatus::Completed, TradeStatus::Failed],
            TradeStatus::Completed => &[],
            TradeStatus::Failed => &[],
        }
    }

    /// Check if transition to given state is valid.
    pub fn can_transition_to(&self, next: TradeStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    /// Statuses from which a trade may still move.
    pub fn open() -> &'static [TradeStatus] {
        &[TradeStatus::Pending, TradeStatus::Processing]
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TradeStatus::Pending => "PENDING",
            TradeStatus::Processing => "PROCESSING",
            TradeStatus::Completed => "COMPLETED",
            TradeStatus::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Fee lines of a quote or trade, all in the counter currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub platform_fee: Money,
    pub processing_fee: Money,
    /// Sum of the two rounded fee lines.
    pub total: Money,
}

/// A trade or transaction record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Unique trade identifier.
    pub id: TradeId,
    /// Owning user.
    pub user_id: UserId,
    /// Trade kind.
    pub trade_type: TradeType,
    /// Internal idempotency key.
    pub reference: TradeReference,
    /// Provider-assigned identifier, set once on acknowledgment.
    pub external_reference: Option<String>,
    /// Originating quote, for quoted trades.
    pub quote_id: Option<QuoteId>,
    /// Primary asset of the trade.
    pub currency: Currency,
    /// Primary amount.
    pub amount: Money,
    /// Locked rate, for quoted trades.
    pub rate: Option<Decimal>,
    /// Fee lines, for quoted trades.
    pub fees: Option<FeeBreakdown>,
    /// Amount reserved from the user's wallet while in flight.
    pub funding: Option<Money>,
    /// Amount credited to the user's wallet on completion.
    pub proceeds: Option<Money>,
    /// Withdrawal network.
    pub network: Option<String>,
    /// Withdrawal destination.
    pub destination: Option<String>,
    /// Current status.
    pub status: TradeStatus,
    /// Failure information (if failed).
    pub failure: Option<TradeFailure>,
    /// When the trade was created.
    pub created_at: Timestamp,
    /// When the trade last changed.
    pub updated_at: Timestamp,
}

impl Trade {
    /// Create a new pending trade.
    pub fn new(
        user_id: UserId,
        trade_type: TradeType,
        reference: TradeReference,
        amount: Money,
        now: Timestamp,
    ) -> Self {
        Self {
            id: TradeId::new(),
            user_id,
            trade_type,
            reference,
            external_reference: None,
            quote_id: None,
            currency: amount.currency().clone(),
            amount,
            rate: None,
            fees: None,
            funding: None,
            proceeds: None,
            network: None,
            destination: None,
            status: TradeStatus::Pending,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition to a new status.
    pub fn transition_to(
        &mut self,
        new_status: TradeStatus,
        now: Timestamp,
    ) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(new_status) {
            return Err(InvalidTransition {
                from: self.status,
                to: new_status,
            });
        }

        self.status = new_status;
        self.updated_at = now;
        Ok(())
    }

    /// Mark trade as failed.
    pub fn fail(&mut self, failure: TradeFailure) -> Result<(), InvalidTransition> {
        self.transition_to(TradeStatus::Failed, failure.failed_at)?;
        self.failure = Some(failure);
        Ok(())
    }

    /// Record the provider identifier. Returns false if one is already set.
    pub fn assign_external_reference(&mut self, external_reference: impl Into<String>) -> bool {
        if self.external_reference.is_some() {
            return false;
        }
        self.external_reference = Some(external_reference.into());
        true
    }

    /// Check if the trade has reached a terminal state.
    pub fn is_final(&self) -> bool {
        self.status.is_final()
    }
}

/// Trade failure information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeFailure {
    /// Failure code.
    pub code: FailureCode,
    /// Human-readable message.
    pub message: String,
    /// When the failure occurred.
    pub failed_at: Timestamp,
}

impl TradeFailure {
    pub fn new(code: FailureCode, message: impl Into<String>, failed_at: Timestamp) -> Self {
        Self {
            code,
            message: message.into(),
            failed_at,
        }
    }
}

/// Failure codes for trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    /// Synchronous provider call failed.
    ProviderError,
    /// Provider reported cancellation.
    Cancelled,
    /// Provider reported a failure.
    Failed,
    /// Provider rejected the request.
    Rejected,
    /// Provider reversed a settled movement.
    Reversed,
}

/// Error when attempting invalid state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: TradeStatus,
    pub to: TradeStatus,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid state transition from {} to {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}
