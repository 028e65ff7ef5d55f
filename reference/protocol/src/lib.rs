//! SwapSettle Provider Protocol
//!
//! Wire types exchanged with the external liquidity provider, the
//! classification of its webhook events, and the [`LiquidityProvider`]
//! trait the settlement engine calls through.

pub mod events;
pub mod liquidity;
pub mod messages;

pub use events::{FailureKind, ProviderEvent};
pub use liquidity::{LiquidityProvider, ProviderError};
#[cfg(any(test, feature = "test-utils"))]
pub use liquidity::MockLiquidityProvider;
pub use messages::*;
