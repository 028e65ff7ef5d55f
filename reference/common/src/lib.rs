//! SwapSettle Common Types
//!
//! Shared types used across SwapSettle: fixed-point money, identifiers,
//! the trade state machine, the error taxonomy and time handling.

pub mod identifiers;
pub mod money;
pub mod trade;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use money::*;
pub use trade::*;
pub use error::*;
pub use time::*;
