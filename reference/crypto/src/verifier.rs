//! Webhook signature headers.
//!
//! A header is either a bare hex signature over the raw body, or
//! `t=<timestamp>,s=<hex>` where the signature covers `"<timestamp>.<body>"`.

use crate::mac::SharedSecret;
use crate::signing::{SigningKey, VerifyingKey};
use crate::{CryptoError, Result};

/// A parsed signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: Option<String>,
    pub signature: Vec<u8>,
}

impl SignatureHeader {
    /// Parse a header value.
    pub fn parse(header: &str) -> Result<Self> {
        let header = header.trim();
        if header.is_empty() {
            return Err(CryptoError::MissingSignature);
        }

        if !header.contains('=') {
            return Ok(Self {
                timestamp: None,
                signature: decode_hex(header)?,
            });
        }

        let mut timestamp = None;
        let mut signature = None;
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value.to_string()),
                Some(("s", value)) | Some(("v1", value)) => signature = Some(decode_hex(value)?),
                _ => {}
            }
        }

        Ok(Self {
            timestamp,
            signature: signature.ok_or(CryptoError::MissingSignature)?,
        })
    }

    /// The bytes the signature covers.
    pub fn signed_payload(&self, body: &[u8]) -> Vec<u8> {
        signed_payload(self.timestamp.as_deref(), body)
    }
}

fn signed_payload(timestamp: Option<&str>, body: &[u8]) -> Vec<u8> {
    match timestamp {
        Some(t) => {
            let mut payload = Vec::with_capacity(t.len() + 1 + body.len());
            payload.extend_from_slice(t.as_bytes());
            payload.push(b'.');
            payload.extend_from_slice(body);
            payload
        }
        None => body.to_vec(),
    }
}

fn decode_hex(value: &str) -> Result<Vec<u8>> {
    hex::decode(value.trim()).map_err(|_| CryptoError::InvalidSignature)
}

/// Checks that an inbound webhook came from the provider.
///
/// Accepts a signature from any configured scheme.
#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    secret: Option<SharedSecret>,
    public_key: Option<VerifyingKey>,
}

impl WebhookVerifier {
    /// Create a verifier. At least one scheme is required.
    pub fn new(secret: Option<SharedSecret>, public_key: Option<VerifyingKey>) -> Result<Self> {
        if secret.is_none() && public_key.is_none() {
            return Err(CryptoError::InvalidKey(
                "No webhook secret or public key configured".to_string(),
            ));
        }
        Ok(Self { secret, public_key })
    }

    /// Verifier for a shared secret only.
    pub fn shared_secret(secret: SharedSecret) -> Self {
        Self {
            secret: Some(secret),
            public_key: None,
        }
    }

    /// Verifier for an Ed25519 public key only.
    pub fn ed25519(public_key: VerifyingKey) -> Self {
        Self {
            secret: None,
            public_key: Some(public_key),
        }
    }

    /// Verify the raw body against the signature header.
    pub fn verify(&self, body: &[u8], header: Option<&str>) -> Result<()> {
        let header = SignatureHeader::parse(header.ok_or(CryptoError::MissingSignature)?)?;
        let payload = header.signed_payload(body);

        if let Some(secret) = &self.secret {
            if secret.verify(&payload, &header.signature).is_ok() {
                return Ok(());
            }
        }

        if let Some(key) = &self.public_key {
            if key.verify(&payload, &header.signature).is_ok() {
                return Ok(());
            }
        }

        Err(CryptoError::InvalidSignature)
    }
}

/// Produces signature headers; the provider side of [`WebhookVerifier`].
pub enum WebhookSigner {
    SharedSecret(SharedSecret),
    Ed25519(SigningKey),
}

impl WebhookSigner {
    /// Build a header for a body, optionally bound to a timestamp.
    pub fn header(&self, body: &[u8], timestamp: Option<i64>) -> Result<String> {
        let t = timestamp.map(|t| t.to_string());
        let payload = signed_payload(t.as_deref(), body);

        let signature = match self {
            WebhookSigner::SharedSecret(secret) => secret.sign_hex(&payload)?,
            WebhookSigner::Ed25519(key) => key.sign_hex(&payload),
        };

        Ok(match t {
            Some(t) => format!("t={},s={}", t, signature),
            None => signature,
        })
    }
}
