//! Wallet ledger: atomic balance deltas per `(user, currency)`.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use swapsettle_common::{
    Clock, Currency, Money, Result, SwapSettleError, SystemClock, TradeReference, UserId,
};

use crate::wallet::{BalanceChange, BalanceChangeType, WalletBalance};

/// Balance store contract.
///
/// Every mutation is a single atomic delta scoped to `(user, currency)` and
/// is applied at most once per `(user, reference, change type)`; a replay
/// returns the change recorded the first time.
#[async_trait]
pub trait WalletLedger: Send + Sync {
    /// Current balance, zero if the wallet was never touched.
    async fn balance(&self, user_id: &UserId, currency: &Currency) -> Result<WalletBalance>;

    /// Add funds.
    async fn credit(
        &self,
        user_id: &UserId,
        amount: &Money,
        reference: &TradeReference,
    ) -> Result<BalanceChange>;

    /// Hold funds if available, in one step.
    async fn reserve(
        &self,
        user_id: &UserId,
        amount: &Money,
        reference: &TradeReference,
    ) -> Result<BalanceChange>;

    /// Drop a hold.
    async fn release(
        &self,
        user_id: &UserId,
        amount: &Money,
        reference: &TradeReference,
    ) -> Result<BalanceChange>;

    /// Spend held funds.
    async fn commit(
        &self,
        user_id: &UserId,
        amount: &Money,
        reference: &TradeReference,
    ) -> Result<BalanceChange>;

    /// Journaled changes for a user, oldest first.
    async fn history(&self, user_id: &UserId) -> Result<Vec<BalanceChange>>;
}

type WalletKey = (UserId, Currency);
type AppliedKey = (UserId, TradeReference, BalanceChangeType);

/// In-process ledger backed by `DashMap`s.
pub struct InMemoryWalletLedger {
    wallets: DashMap<WalletKey, WalletBalance>,
    applied: DashMap<AppliedKey, BalanceChange>,
    journal: RwLock<Vec<BalanceChange>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryWalletLedger {
    /// Create an empty ledger on the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty ledger driven by the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            wallets: DashMap::new(),
            applied: DashMap::new(),
            journal: RwLock::new(Vec::new()),
            clock,
        }
    }

    /// Number of journaled changes.
    pub fn journal_len(&self) -> usize {
        self.journal.read().len()
    }

    /// Apply one delta while holding the wallet's entry lock.
    fn apply(
        &self,
        user_id: &UserId,
        amount: &Money,
        reference: &TradeReference,
        change_type: BalanceChangeType,
    ) -> Result<BalanceChange> {
        let currency = amount.currency().clone();
        let amount = amount
            .rescale_exact(currency.scale())
            .map_err(|e| SwapSettleError::InvalidAmount(e.to_string()))?;
        if !amount.is_positive() {
            return Err(SwapSettleError::InvalidAmount(format!(
                "{} amount must be greater than zero",
                change_type
            )));
        }

        let now = self.clock.now();
        let mut wallet = self
            .wallets
            .entry((user_id.clone(), currency.clone()))
            .or_insert_with(|| WalletBalance::zero(user_id.clone(), currency.clone(), now));

        let slot = match self.applied.entry((user_id.clone(), reference.clone(), change_type)) {
            Entry::Occupied(existing) => {
                debug!(
                    reference = %reference,
                    change_type = %change_type,
                    "Balance change already applied"
                );
                return Ok(existing.get().clone());
            }
            Entry::Vacant(slot) => slot,
        };

        let (balance, pending) = match change_type {
            BalanceChangeType::Credit => (wallet.balance.checked_add(&amount)?, wallet.pending.clone()),
            BalanceChangeType::Reserve => {
                let available = wallet.available()?;
                if available.compare(&amount)?.is_lt() {
                    return Err(SwapSettleError::insufficient_balance(&available, &amount));
                }
                (wallet.balance.clone(), wallet.pending.checked_add(&amount)?)
            }
            BalanceChangeType::Release | BalanceChangeType::Commit => {
                if wallet.pending.compare(&amount)?.is_lt() {
                    return Err(SwapSettleError::InvalidAmount(format!(
                        "{} of {} exceeds pending {}",
                        change_type, amount, wallet.pending
                    )));
                }
                let pending = wallet.pending.checked_sub(&amount)?;
                let balance = if change_type == BalanceChangeType::Commit {
                    wallet.balance.checked_sub(&amount)?
                } else {
                    wallet.balance.clone()
                };
                (balance, pending)
            }
        };

        wallet.balance = balance;
        wallet.pending = pending;
        wallet.updated_at = now;

        let change = BalanceChange {
            id: Uuid::now_v7(),
            user_id: user_id.clone(),
            change_type,
            amount,
            balance_after: wallet.balance.clone(),
            pending_after: wallet.pending.clone(),
            reference: reference.clone(),
            timestamp: now,
        };
        slot.insert(change.clone());
        self.journal.write().push(change.clone());

        info!(
            user_id = %user_id,
            currency = %currency,
            change_type = %change_type,
            amount = %change.amount,
            reference = %reference,
            "Balance changed"
        );

        Ok(change)
    }
}

impl Default for InMemoryWalletLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletLedger for InMemoryWalletLedger {
    async fn balance(&self, user_id: &UserId, currency: &Currency) -> Result<WalletBalance> {
        Ok(self
            .wallets
            .get(&(user_id.clone(), currency.clone()))
            .map(|w| w.clone())
            .unwrap_or_else(|| {
                WalletBalance::zero(user_id.clone(), currency.clone(), self.clock.now())
            }))
    }

    #[instrument(skip(self), fields(amount = %amount))]
    async fn credit(
        &self,
        user_id: &UserId,
        amount: &Money,
        reference: &TradeReference,
    ) -> Result<BalanceChange> {
        self.apply(user_id, amount, reference, BalanceChangeType::Credit)
    }

    #[instrument(skip(self), fields(amount = %amount))]
    async fn reserve(
        &self,
        user_id: &UserId,
        amount: &Money,
        reference: &TradeReference,
    ) -> Result<BalanceChange> {
        self.apply(user_id, amount, reference, BalanceChangeType::Reserve)
    }

    #[instrument(skip(self), fields(amount = %amount))]
    async fn release(
        &self,
        user_id: &UserId,
        amount: &Money,
        reference: &TradeReference,
    ) -> Result<BalanceChange> {
        self.apply(user_id, amount, reference, BalanceChangeType::Release)
    }

    #[instrument(skip(self), fields(amount = %amount))]
    async fn commit(
        &self,
        user_id: &UserId,
        amount: &Money,
        reference: &TradeReference,
    ) -> Result<BalanceChange> {
        self.apply(user_id, amount, reference, BalanceChangeType::Commit)
    }

    async fn history(&self, user_id: &UserId) -> Result<Vec<BalanceChange>> {
        Ok(self
            .journal
            .read()
            .iter()
            .filter(|c| &c.user_id == user_id)
            .cloned()
            .collect())
    }
}
