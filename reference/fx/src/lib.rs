//! SwapSettle Rate Source and Quote Service
//!
//! Prices conversions between fiat and crypto assets and issues short-lived,
//! fee-inclusive quotes.
//!
//! # Features
//!
//! - Provider lookups behind a TTL cache shorter than the quote lifetime
//! - Configurable platform and processing fee split
//! - Single-use quotes with lazy, clock-driven expiry
//!
//! # Example
//!
//! ```rust,ignore
//! use swapsettle_fx::{FeeSchedule, QuoteConfig, QuoteRequest, QuoteService};
//! use swapsettle_common::{Currency, SystemClock, TradeType, UserId};
//!
//! let service = QuoteService::new(provider, QuoteConfig::default(), FeeSchedule::default(), Arc::new(SystemClock));
//!
//! let quote = service
//!     .get_quote(QuoteRequest::new(UserId::new("u1"), Currency::ngn(), Currency::btc(), "100000", TradeType::Buy))
//!     .await?;
//! ```

pub mod book;
pub mod cache;
pub mod error;
pub mod fees;
pub mod provider;
pub mod quote;
pub mod service;
pub mod source;

pub use book::{QuoteBook, QuoteBookStats};
pub use cache::{RateCache, RateCacheConfig};
pub use error::{FxError, FxResult};
pub use fees::FeeSchedule;
pub use provider::RateProvider;
#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateProvider;
pub use quote::{Quote, QuoteRequest};
pub use service::{QuoteConfig, QuoteService, QuoteServiceStats};
pub use source::RateSource;
