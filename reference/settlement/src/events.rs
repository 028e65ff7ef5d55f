//! Trade status notifications.

use serde::{Deserialize, Serialize};
use swapsettle_common::{Timestamp, Trade, TradeId, TradeReference, TradeStatus, UserId};
use tokio::sync::broadcast;
use tracing::trace;

/// Published whenever a trade is created or changes status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub trade_id: TradeId,
    pub user_id: UserId,
    pub reference: TradeReference,
    /// `None` for a newly created trade.
    pub previous: Option<TradeStatus>,
    pub status: TradeStatus,
    pub at: Timestamp,
}

impl TradeEvent {
    /// Event for a trade as it currently stands.
    pub fn for_trade(trade: &Trade, previous: Option<TradeStatus>) -> Self {
        Self {
            trade_id: trade.id,
            user_id: trade.user_id.clone(),
            reference: trade.reference.clone(),
            previous,
            status: trade.status,
            at: trade.updated_at,
        }
    }
}

/// Broadcast channel of [`TradeEvent`]s. Cloning shares the channel.
#[derive(Debug, Clone)]
pub struct TradeEvents {
    sender: broadcast::Sender<TradeEvent>,
}

impl TradeEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TradeEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: TradeEvent) {
        if self.sender.send(event).is_err() {
            trace!("No trade event subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for TradeEvents {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use swapsettle_common::{Currency, Money, TradeType};

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let events = TradeEvents::new(8);
        let mut rx = events.subscribe();

        let trade = Trade::new(
            UserId::new("user_1"),
            TradeType::Deposit,
            TradeReference::for_deposit("dep_1"),
            Money::parse("10", Currency::usdt(), 8).unwrap(),
            Utc::now(),
        );
        events.publish(TradeEvent::for_trade(&trade, None));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.trade_id, trade.id);
        assert_eq!(event.status, TradeStatus::Pending);
        assert!(event.previous.is_none());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let events = TradeEvents::default();
        assert_eq!(events.subscriber_count(), 0);

        let trade = Trade::new(
            UserId::new("user_1"),
            TradeType::Deposit,
            TradeReference::for_deposit("dep_2"),
            Money::parse("10", Currency::usdt(), 8).unwrap(),
            Utc::now(),
        );
        events.publish(TradeEvent::for_trade(&trade, None));
    }
}
