//! Webhook payload digests.

use std::fmt;

use sha2::{Digest, Sha256};

/// SHA-256 of a raw webhook body, as recorded in the audit trail.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PayloadDigest([u8; 32]);

impl PayloadDigest {
    /// Digest a body exactly as received.
    pub fn of(body: &[u8]) -> Self {
        Self(Sha256::digest(body).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for PayloadDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PayloadDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PayloadDigest({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        assert_eq!(
            PayloadDigest::of(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            PayloadDigest::of(br#"{"event":"order.done"}"#),
            PayloadDigest::of(br#"{"event":"order.done"}"#)
        );
    }

    #[test]
    fn test_whitespace_changes_digest() {
        let compact = PayloadDigest::of(br#"{"a":1}"#);
        let spaced = PayloadDigest::of(br#"{"a": 1}"#);
        assert_ne!(compact, spaced);
        assert_eq!(compact.as_bytes().len(), 32);
    }
}
