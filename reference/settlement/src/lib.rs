//! SwapSettle Settlement Service
//!
//! Turns quotes into trades, reserves funds before any provider call, and
//! reconciles asynchronous provider webhooks into final trade states.

pub mod api;
pub mod audit;
pub mod config;
pub mod engine;
pub mod events;
pub mod metrics;
pub mod reconciler;
pub mod store;

pub use api::{router, AppState};
pub use audit::{AuditEntry, AuditLog};
pub use config::{SettlementConfig, WebhookConfig};
pub use engine::{SettlementEngine, WithdrawalRequest};
pub use events::{TradeEvent, TradeEvents};
pub use metrics::{Metrics, MetricsSnapshot};
pub use reconciler::{ReconcileOutcome, WebhookReconciler};
pub use store::{CreateOutcome, InMemoryTradeStore, StatusUpdate, TradeStore};
