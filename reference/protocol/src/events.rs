//! Provider event classification.

use swapsettle_common::FailureCode;

use crate::messages::ProviderAck;

/// How a failed event describes the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Cancelled,
    Failed,
    Rejected,
    Reversed,
}

impl FailureKind {
    /// Failure code recorded on the trade.
    pub fn failure_code(&self) -> FailureCode {
        match self {
            FailureKind::Cancelled => FailureCode::Cancelled,
            FailureKind::Failed => FailureCode::Failed,
            FailureKind::Rejected => FailureCode::Rejected,
            FailureKind::Reversed => FailureCode::Reversed,
        }
    }

    /// Failure described by a bare status word, if any.
    pub fn from_status(status: &str) -> Option<Self> {
        match status.trim().to_ascii_lowercase().as_str() {
            "cancelled" | "canceled" => Some(FailureKind::Cancelled),
            "failed" | "failure" | "error" => Some(FailureKind::Failed),
            "rejected" | "declined" => Some(FailureKind::Rejected),
            "reversed" => Some(FailureKind::Reversed),
            _ => None,
        }
    }
}

impl ProviderAck {
    /// Failure carried by the initial status of a synchronous answer.
    pub fn failure(&self) -> Option<FailureKind> {
        FailureKind::from_status(&self.status)
    }
}

/// Local meaning of a provider event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderEvent {
    /// An order or swap settled.
    OrderCompleted,
    /// A withdrawal left the provider.
    WithdrawCompleted,
    /// Funds arrived in a sub-account.
    DepositCompleted,
    /// The referenced movement did not happen or was undone.
    Failed(FailureKind),
    /// Not relevant here.
    Unknown,
}

impl ProviderEvent {
    /// Classify an event type. Case-insensitive; `-` and `_` are equivalent.
    pub fn classify(event_type: &str) -> Self {
        let normalized = event_type.trim().to_ascii_lowercase().replace('-', "_");

        match normalized.as_str() {
            "order.done" | "instant_order.done" | "swap.completed" | "swap_transaction.completed" => {
                return ProviderEvent::OrderCompleted
            }
            "withdraw.successful" | "withdrawal.successful" => {
                return ProviderEvent::WithdrawCompleted
            }
            "deposit.successful" => return ProviderEvent::DepositCompleted,
            _ => {}
        }

        let outcome = normalized.rsplit('.').next().unwrap_or_default();
        match outcome {
            "cancelled" | "canceled" => ProviderEvent::Failed(FailureKind::Cancelled),
            "failed" => ProviderEvent::Failed(FailureKind::Failed),
            "rejected" => ProviderEvent::Failed(FailureKind::Rejected),
            "reversed" => ProviderEvent::Failed(FailureKind::Reversed),
            _ => ProviderEvent::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_events() {
        assert_eq!(ProviderEvent::classify("order.done"), ProviderEvent::OrderCompleted);
        assert_eq!(
            ProviderEvent::classify("Instant-Order.DONE"),
            ProviderEvent::OrderCompleted
        );
        assert_eq!(
            ProviderEvent::classify("withdraw.successful"),
            ProviderEvent::WithdrawCompleted
        );
        assert_eq!(
            ProviderEvent::classify("deposit.successful"),
            ProviderEvent::DepositCompleted
        );
    }

    #[test]
    fn test_failure_events() {
        assert_eq!(
            ProviderEvent::classify("instant_order.cancelled"),
            ProviderEvent::Failed(FailureKind::Cancelled)
        );
        assert_eq!(
            ProviderEvent::classify("withdraw.rejected"),
            ProviderEvent::Failed(FailureKind::Rejected)
        );
        assert_eq!(
            ProviderEvent::classify("swap_transaction.reversed"),
            ProviderEvent::Failed(FailureKind::Reversed)
        );
        assert_eq!(
            FailureKind::Failed.failure_code(),
            FailureCode::Failed
        );
    }

    #[test]
    fn test_ack_status() {
        let ack = |status: &str| ProviderAck {
            id: "ord_1".to_string(),
            status: status.to_string(),
            reference: None,
        };
        assert_eq!(ack("pending").failure(), None);
        assert_eq!(ack("submitted").failure(), None);
        assert_eq!(ack("done").failure(), None);
        assert_eq!(ack("Cancelled").failure(), Some(FailureKind::Cancelled));
        assert_eq!(ack("rejected").failure(), Some(FailureKind::Rejected));
        assert_eq!(ack("failed").failure(), Some(FailureKind::Failed));
    }

    #[test]
    fn test_unknown_events() {
        assert_eq!(ProviderEvent::classify("wallet.updated"), ProviderEvent::Unknown);
        assert_eq!(ProviderEvent::classify(""), ProviderEvent::Unknown);
    }
}
