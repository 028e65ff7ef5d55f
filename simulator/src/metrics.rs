//! Simulation metrics.

use std::collections::VecDeque;
use std::time::Duration;

const MAX_SAMPLES: usize = 10_000;

/// Counters for one scenario run.
#[derive(Debug, Clone, Default)]
pub struct SimulationMetrics {
    /// Steps executed.
    pub steps: u64,
    /// Webhook deliveries, replays included.
    pub webhooks_delivered: u64,
    /// Expectations and assertions that held.
    pub assertions_passed: u64,
    /// Expectations and assertions that did not.
    pub assertions_failed: u64,
    /// Confirm and withdraw call latencies (µs).
    latency_samples: VecDeque<u64>,
}

impl SimulationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_step(&mut self) {
        self.steps += 1;
    }

    pub fn record_webhook(&mut self) {
        self.webhooks_delivered += 1;
    }

    pub fn record_assertion(&mut self, passed: bool) {
        if passed {
            self.assertions_passed += 1;
        } else {
            self.assertions_failed += 1;
        }
    }

    /// Record an engine call latency.
    pub fn record_call(&mut self, elapsed: Duration) {
        if self.latency_samples.len() >= MAX_SAMPLES {
            self.latency_samples.pop_front();
        }
        self.latency_samples
            .push_back(u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX));
    }

    /// Whether every check held.
    pub fn passed(&self) -> bool {
        self.assertions_failed == 0
    }

    /// Get average call latency in µs.
    pub fn average_latency_us(&self) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let sum: u64 = self.latency_samples.iter().sum();
        sum / self.latency_samples.len() as u64
    }

    /// Get p99 call latency in µs.
    pub fn p99_latency_us(&self) -> u64 {
        self.percentile_latency(99)
    }

    fn percentile_latency(&self, percentile: usize) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let mut sorted: Vec<_> = self.latency_samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        sorted[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics() {
        let mut metrics = SimulationMetrics::new();

        metrics.record_call(Duration::from_micros(100));
        metrics.record_call(Duration::from_micros(200));
        metrics.record_call(Duration::from_micros(150));
        metrics.record_assertion(true);
        metrics.record_assertion(false);

        assert_eq!(metrics.average_latency_us(), 150);
        assert_eq!(metrics.p99_latency_us(), 200);
        assert_eq!(metrics.assertions_passed, 1);
        assert!(!metrics.passed());
    }
}
