//! Metrics collection for settlement monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Settlement metrics.
#[derive(Default)]
pub struct Metrics {
    /// Quotes issued.
    pub quotes_issued: AtomicU64,
    /// Quotes turned into trades.
    pub trades_confirmed: AtomicU64,
    /// Trades acknowledged by the provider.
    pub trades_processing: AtomicU64,
    /// Trades settled.
    pub trades_completed: AtomicU64,
    /// Trades failed, synchronously or by webhook.
    pub trades_failed: AtomicU64,
    /// Withdrawals accepted.
    pub withdrawals: AtomicU64,
    /// Authenticated webhook deliveries.
    pub webhooks_received: AtomicU64,
    /// Webhooks that changed a trade or recorded a new one.
    pub webhooks_applied: AtomicU64,
    /// Webhooks for trades already terminal.
    pub webhooks_stale: AtomicU64,
    /// Webhooks with nothing to do.
    pub webhooks_ignored: AtomicU64,
    /// Webhooks failing authentication.
    pub webhooks_rejected: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quote_issued(&self) {
        self.quotes_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn trade_confirmed(&self) {
        self.trades_confirmed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn trade_processing(&self) {
        self.trades_processing.fetch_add(1, Ordering::Relaxed);
    }

    pub fn trade_completed(&self) {
        self.trades_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn trade_failed(&self) {
        self.trades_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn withdrawal_requested(&self) {
        self.withdrawals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn webhook_received(&self) {
        self.webhooks_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn webhook_applied(&self) {
        self.webhooks_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn webhook_stale(&self) {
        self.webhooks_stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn webhook_ignored(&self) {
        self.webhooks_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn webhook_rejected(&self) {
        self.webhooks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            quotes_issued: self.quotes_issued.load(Ordering::Relaxed),
            trades_confirmed: self.trades_confirmed.load(Ordering::Relaxed),
            trades_processing: self.trades_processing.load(Ordering::Relaxed),
            trades_completed: self.trades_completed.load(Ordering::Relaxed),
            trades_failed: self.trades_failed.load(Ordering::Relaxed),
            withdrawals: self.withdrawals.load(Ordering::Relaxed),
            webhooks_received: self.webhooks_received.load(Ordering::Relaxed),
            webhooks_applied: self.webhooks_applied.load(Ordering::Relaxed),
            webhooks_stale: self.webhooks_stale.load(Ordering::Relaxed),
            webhooks_ignored: self.webhooks_ignored.load(Ordering::Relaxed),
            webhooks_rejected: self.webhooks_rejected.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let counters = [
            ("quotes_issued_total", "Quotes issued", snapshot.quotes_issued),
            ("trades_confirmed_total", "Quotes confirmed into trades", snapshot.trades_confirmed),
            ("trades_processing_total", "Trades acknowledged by the provider", snapshot.trades_processing),
            ("trades_completed_total", "Trades settled", snapshot.trades_completed),
            ("trades_failed_total", "Trades failed", snapshot.trades_failed),
            ("withdrawals_total", "Withdrawals accepted", snapshot.withdrawals),
            ("webhooks_received_total", "Authenticated webhook deliveries", snapshot.webhooks_received),
            ("webhooks_applied_total", "Webhooks applied", snapshot.webhooks_applied),
            ("webhooks_stale_total", "Webhooks for terminal trades", snapshot.webhooks_stale),
            ("webhooks_ignored_total", "Webhooks ignored", snapshot.webhooks_ignored),
            ("webhooks_rejected_total", "Webhooks failing authentication", snapshot.webhooks_rejected),
        ];

        let mut out = String::new();
        for (name, help, value) in counters {
            out.push_str(&format!(
                "# HELP swapsettle_{name} {help}\n# TYPE swapsettle_{name} counter\nswapsettle_{name} {value}\n\n"
            ));
        }
        out
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub quotes_issued: u64,
    pub trades_confirmed: u64,
    pub trades_processing: u64,
    pub trades_completed: u64,
    pub trades_failed: u64,
    pub withdrawals: u64,
    pub webhooks_received: u64,
    pub webhooks_applied: u64,
    pub webhooks_stale: u64,
    pub webhooks_ignored: u64,
    pub webhooks_rejected: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = Metrics::new();

        metrics.trade_confirmed();
        metrics.trade_confirmed();
        metrics.trade_completed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.trades_confirmed, 2);
        assert_eq!(snapshot.trades_completed, 1);
        assert_eq!(snapshot.trades_failed, 0);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new();
        metrics.webhook_rejected();

        let output = metrics.to_prometheus();
        assert!(output.contains("# TYPE swapsettle_webhooks_rejected_total counter"));
        assert!(output.contains("swapsettle_webhooks_rejected_total 1"));
        assert!(output.contains("swapsettle_quotes_issued_total 0"));
    }
}
