//! Trade storage.
//!
//! The store is the only place trade status changes. Creation is keyed by
//! the trade reference and status updates are conditional on the current
//! status, so concurrent confirmations and webhook deliveries cannot
//! duplicate a trade or move it out of a terminal state.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use swapsettle_common::{
    Result, SwapSettleError, Timestamp, Trade, TradeFailure, TradeId, TradeReference,
    TradeStatus, UserId,
};
use tracing::debug;

/// Result of [`TradeStore::create_if_absent`].
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    /// The trade was stored.
    Created(Trade),
    /// A trade with the same reference already exists.
    Existing(Trade),
}

/// Result of [`TradeStore::update_status_if`].
#[derive(Debug, Clone)]
pub enum StatusUpdate {
    /// The write happened; carries the updated trade.
    Updated { trade: Trade, previous: TradeStatus },
    /// The current status was not expected; carries the trade as it is.
    Unchanged(Trade),
}

/// Persistent store collaborator for trades.
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Store a trade unless one with the same reference exists.
    async fn create_if_absent(&self, trade: Trade) -> Result<CreateOutcome>;

    /// Move a trade to `status` only if its current status is in `expected`.
    async fn update_status_if(
        &self,
        id: &TradeId,
        expected: &[TradeStatus],
        status: TradeStatus,
        failure: Option<TradeFailure>,
        at: Timestamp,
    ) -> Result<StatusUpdate>;

    /// Record the provider identifier. Returns false if one is already set.
    async fn assign_external_reference(&self, id: &TradeId, external_reference: &str)
        -> Result<bool>;

    async fn get(&self, id: &TradeId) -> Result<Option<Trade>>;

    async fn find_by_reference(&self, reference: &TradeReference) -> Result<Option<Trade>>;

    async fn find_by_external_reference(&self, external_reference: &str) -> Result<Option<Trade>>;

    /// A user's trades, oldest first.
    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Trade>>;
}

/// In-process trade store backed by `DashMap`s.
#[derive(Default)]
pub struct InMemoryTradeStore {
    trades: DashMap<TradeId, Trade>,
    by_reference: DashMap<TradeReference, TradeId>,
    by_external: DashMap<String, TradeId>,
}

impl InMemoryTradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored trades.
    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    fn lookup(&self, id: Option<TradeId>) -> Option<Trade> {
        id.and_then(|id| self.trades.get(&id).map(|t| t.clone()))
    }
}

#[async_trait]
impl TradeStore for InMemoryTradeStore {
    async fn create_if_absent(&self, trade: Trade) -> Result<CreateOutcome> {
        match self.by_reference.entry(trade.reference.clone()) {
            Entry::Occupied(existing) => {
                let existing = self
                    .trades
                    .get(existing.get())
                    .map(|t| t.clone())
                    .ok_or_else(|| {
                        SwapSettleError::Store(format!(
                            "Reference {} points at a missing trade",
                            trade.reference
                        ))
                    })?;
                debug!(reference = %trade.reference, trade_id = %existing.id, "Trade already exists");
                Ok(CreateOutcome::Existing(existing))
            }
            Entry::Vacant(slot) => {
                if let Some(external) = &trade.external_reference {
                    self.by_external.insert(external.clone(), trade.id);
                }
                self.trades.insert(trade.id, trade.clone());
                slot.insert(trade.id);
                Ok(CreateOutcome::Created(trade))
            }
        }
    }

    async fn update_status_if(
        &self,
        id: &TradeId,
        expected: &[TradeStatus],
        status: TradeStatus,
        failure: Option<TradeFailure>,
        at: Timestamp,
    ) -> Result<StatusUpdate> {
        let mut trade = self
            .trades
            .get_mut(id)
            .ok_or_else(|| SwapSettleError::TradeNotFound(id.to_string()))?;

        let previous = trade.status;
        if !expected.contains(&previous) || !previous.can_transition_to(status) {
            return Ok(StatusUpdate::Unchanged(trade.clone()));
        }

        trade.transition_to(status, at)?;
        if failure.is_some() {
            trade.failure = failure;
        }

        Ok(StatusUpdate::Updated {
            trade: trade.clone(),
            previous,
        })
    }

    async fn assign_external_reference(
        &self,
        id: &TradeId,
        external_reference: &str,
    ) -> Result<bool> {
        let mut trade = self
            .trades
            .get_mut(id)
            .ok_or_else(|| SwapSettleError::TradeNotFound(id.to_string()))?;

        if !trade.assign_external_reference(external_reference) {
            return Ok(false);
        }
        self.by_external.insert(external_reference.to_string(), *id);
        Ok(true)
    }

    async fn get(&self, id: &TradeId) -> Result<Option<Trade>> {
        Ok(self.trades.get(id).map(|t| t.clone()))
    }

    async fn find_by_reference(&self, reference: &TradeReference) -> Result<Option<Trade>> {
        Ok(self.lookup(self.by_reference.get(reference).map(|id| *id)))
    }

    async fn find_by_external_reference(&self, external_reference: &str) -> Result<Option<Trade>> {
        Ok(self.lookup(self.by_external.get(external_reference).map(|id| *id)))
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Trade>> {
        let mut trades: Vec<Trade> = self
            .trades
            .iter()
            .filter(|t| &t.user_id == user_id)
            .map(|t| t.clone())
            .collect();
        trades.sort_by_key(|t| (t.created_at, t.id.to_string()));
        Ok(trades)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use swapsettle_common::{Currency, FailureCode, Money, TradeType};

    fn make_test_trade(reference: &str) -> Trade {
        Trade::new(
            UserId::new("user_1"),
            TradeType::Withdrawal,
            TradeReference::from(reference),
            Money::parse("0.5", Currency::btc(), 8).unwrap(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_create_if_absent_is_keyed_by_reference() {
        let store = InMemoryTradeStore::new();

        let first = store.create_if_absent(make_test_trade("w_1")).await.unwrap();
        let second = store.create_if_absent(make_test_trade("w_1")).await.unwrap();

        let (CreateOutcome::Created(created), CreateOutcome::Existing(existing)) = (first, second)
        else {
            panic!("expected one creation and one existing");
        };
        assert_eq!(created.id, existing.id);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_creation_yields_one_trade() {
        let store = Arc::new(InMemoryTradeStore::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.create_if_absent(make_test_trade("w_race")).await })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if let CreateOutcome::Created(_) = handle.await.unwrap().unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_conditional_status_update() {
        let store = InMemoryTradeStore::new();
        let trade = make_test_trade("w_2");
        let id = trade.id;
        store.create_if_absent(trade).await.unwrap();

        let update = store
            .update_status_if(&id, TradeStatus::open(), TradeStatus::Processing, None, Utc::now())
            .await
            .unwrap();
        assert!(matches!(
            update,
            StatusUpdate::Updated { previous: TradeStatus::Pending, .. }
        ));

        let failure = TradeFailure::new(FailureCode::Rejected, "rejected", Utc::now());
        store
            .update_status_if(&id, TradeStatus::open(), TradeStatus::Failed, Some(failure), Utc::now())
            .await
            .unwrap();

        let late = store
            .update_status_if(&id, TradeStatus::open(), TradeStatus::Completed, None, Utc::now())
            .await
            .unwrap();
        let StatusUpdate::Unchanged(current) = late else {
            panic!("terminal trade must not change");
        };
        assert_eq!(current.status, TradeStatus::Failed);
        assert_eq!(current.failure.unwrap().code, FailureCode::Rejected);
    }

    #[tokio::test]
    async fn test_external_reference_index() {
        let store = InMemoryTradeStore::new();
        let trade = make_test_trade("w_3");
        let id = trade.id;
        store.create_if_absent(trade).await.unwrap();

        assert!(store.assign_external_reference(&id, "wd_9").await.unwrap());
        assert!(!store.assign_external_reference(&id, "wd_10").await.unwrap());

        let found = store.find_by_external_reference("wd_9").await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(store.find_by_external_reference("wd_10").await.unwrap().is_none());
        assert!(store
            .find_by_reference(&TradeReference::from("w_3"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_missing_trade() {
        let store = InMemoryTradeStore::new();
        let err = store
            .update_status_if(
                &TradeId::new(),
                TradeStatus::open(),
                TradeStatus::Completed,
                None,
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "TRADE_NOT_FOUND");
    }
}
