//! User accounts at the liquidity provider.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use swapsettle_common::{Result, SwapSettleError, UserId};
use tracing::info;

/// Account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Account is active and can transact.
    Active,
    /// Account is frozen (no transactions allowed).
    Frozen,
    /// Account is closed.
    Closed,
}

/// A user's sub-account at the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Owning user.
    pub user_id: UserId,
    /// Identifier the provider uses in requests and webhooks.
    pub provider_account_id: String,
    /// Account status.
    pub status: AccountStatus,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new active account.
    pub fn new(user_id: UserId, provider_account_id: impl Into<String>) -> Self {
        let now = Utc::now();

        Self {
            user_id,
            provider_account_id: provider_account_id.into(),
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if account can transact.
    pub fn can_transact(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Maps users to provider accounts and back.
#[derive(Default)]
pub struct AccountDirectory {
    by_user: DashMap<UserId, Account>,
    by_provider: DashMap<String, UserId>,
}

impl AccountDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user's provider account, replacing any previous mapping.
    pub fn register(&self, user_id: UserId, provider_account_id: impl Into<String>) -> Account {
        let account = Account::new(user_id.clone(), provider_account_id);

        if let Some(previous) = self.by_user.insert(user_id.clone(), account.clone()) {
            self.by_provider.remove(&previous.provider_account_id);
        }
        self.by_provider
            .insert(account.provider_account_id.clone(), user_id.clone());

        info!(
            user_id = %user_id,
            provider_account_id = %account.provider_account_id,
            "Account registered"
        );
        account
    }

    /// Get a user's account.
    pub fn get(&self, user_id: &UserId) -> Option<Account> {
        self.by_user.get(user_id).map(|a| a.clone())
    }

    /// Resolve a provider account identifier to its user.
    pub fn find_by_provider_account(&self, provider_account_id: &str) -> Option<UserId> {
        self.by_provider
            .get(provider_account_id)
            .map(|u| u.clone())
    }

    /// Change an account's status. Returns false for unknown users.
    pub fn set_status(&self, user_id: &UserId, status: AccountStatus) -> bool {
        match self.by_user.get_mut(user_id) {
            Some(mut account) => {
                account.status = status;
                account.updated_at = Utc::now();
                info!(user_id = %user_id, status = ?status, "Account status changed");
                true
            }
            None => false,
        }
    }

    /// Check if a user may transact.
    pub fn can_transact(&self, user_id: &UserId) -> bool {
        self.by_user
            .get(user_id)
            .map(|a| a.can_transact())
            .unwrap_or(false)
    }

    /// Get the user's account if it may transact.
    pub fn ensure_active(&self, user_id: &UserId) -> Result<Account> {
        let account = self.get(user_id).ok_or_else(|| {
            SwapSettleError::validation("No provider account for user", "user_id")
        })?;

        if !account.can_transact() {
            return Err(SwapSettleError::AccountFrozen(user_id.clone()));
        }

        Ok(account)
    }

    /// Number of registered accounts.
    pub fn len(&self) -> usize {
        self.by_user.len()
    }

    /// Check if the directory is empty.
    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }
}
