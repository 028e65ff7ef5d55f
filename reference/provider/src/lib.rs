//! SwapSettle Provider Client
//!
//! HTTP client for the external liquidity provider. One
//! [`HttpLiquidityProvider`] serves both as the market data
//! [`RateProvider`](swapsettle_fx::RateProvider) and as the execution venue
//! behind [`LiquidityProvider`](swapsettle_protocol::LiquidityProvider).

pub mod client;
pub mod config;

pub use client::HttpLiquidityProvider;
pub use config::ProviderConfig;
