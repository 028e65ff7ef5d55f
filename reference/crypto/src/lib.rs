//! SwapSettle Cryptographic Primitives
//!
//! Digests, shared-secret MACs and Ed25519 signatures used to authenticate
//! provider webhooks.

pub mod hash;
pub mod mac;
pub mod signing;
pub mod verifier;

pub use hash::PayloadDigest;
pub use mac::SharedSecret;
pub use signing::{SigningKey, VerifyingKey};
pub use verifier::{SignatureHeader, WebhookSigner, WebhookVerifier};

use swapsettle_common::SwapSettleError;

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Missing signature")]
    MissingSignature,

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

impl From<CryptoError> for SwapSettleError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidSignature | CryptoError::MissingSignature => {
                SwapSettleError::WebhookAuthentication
            }
            CryptoError::InvalidKey(msg) => SwapSettleError::Configuration(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, CryptoError>;
