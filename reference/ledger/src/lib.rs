//! SwapSettle Wallet Ledger
//!
//! Per-user wallet balances with atomic, idempotent reserve, release,
//! commit and credit operations, the provider account directory, and the
//! withdrawal validator.

pub mod account;
pub mod engine;
pub mod wallet;
pub mod withdrawal;

pub use account::{Account, AccountDirectory, AccountStatus};
pub use engine::{InMemoryWalletLedger, WalletLedger};
pub use wallet::{BalanceChange, BalanceChangeType, WalletBalance};
pub use withdrawal::{
    MinimumWithdrawal, WithdrawalCheck, WithdrawalLimits, WithdrawalValidator, WITHDRAWAL_SCALE,
};
