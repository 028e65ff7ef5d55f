//! Webhook audit log.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use swapsettle_common::Timestamp;

/// One received webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event_type: String,
    pub external_id: Option<String>,
    /// SHA-256 of the raw body, hex encoded.
    pub payload_sha256: String,
    pub received_at: Timestamp,
    pub outcome: String,
}

/// Bounded in-memory ring buffer; the oldest entry is dropped when full.
pub struct AuditLog {
    entries: Mutex<VecDeque<AuditEntry>>,
    capacity: usize,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn record(&self, entry: AuditEntry) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Up to `n` entries, newest first.
    pub fn recent(&self, n: usize) -> Vec<AuditEntry> {
        self.entries.lock().iter().rev().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_test_entry(event_type: &str) -> AuditEntry {
        AuditEntry {
            event_type: event_type.to_string(),
            external_id: Some("ord_1".to_string()),
            payload_sha256: "00".repeat(32),
            received_at: Utc::now(),
            outcome: "ignored".to_string(),
        }
    }

    #[test]
    fn test_ring_buffer_drops_oldest() {
        let log = AuditLog::new(2);
        log.record(make_test_entry("a"));
        log.record(make_test_entry("b"));
        log.record(make_test_entry("c"));

        let recent = log.recent(10);
        assert_eq!(log.len(), 2);
        assert_eq!(recent[0].event_type, "c");
        assert_eq!(recent[1].event_type, "b");
    }

    #[test]
    fn test_recent_limits_count() {
        let log = AuditLog::default();
        assert!(log.is_empty());
        for name in ["a", "b", "c"] {
            log.record(make_test_entry(name));
        }
        assert_eq!(log.recent(1)[0].event_type, "c");
    }
}
