// =============================================================================
// Metrics Aggregator — rolling counters and latency samples
// =============================================================================
//
// Written to on every processed message by the consumer task; read by the
// metrics broadcaster (1s cadence), the sync /metrics endpoint, and /health.
// Counters are atomics; the latency ring sits behind a short-held mutex.
//
// The latency ring is bounded: it grows to 1000 samples, then rotates down to
// the most recent 500.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

/// Ring capacity before rotation.
const LATENCY_RING_MAX: usize = 1000;
/// Samples retained after a rotation.
const LATENCY_RING_KEEP: usize = 500;
/// Window for the streaming mean shown to metric subscribers.
const STREAM_MEAN_WINDOW: usize = 100;
/// Window for the mean shown on the sync /metrics endpoint.
const SYNC_MEAN_WINDOW: usize = 1000;

// =============================================================================
// Snapshot payloads
// =============================================================================

/// Frame pushed to metric subscribers once per second.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsFrame {
    pub transactions_processed: u64,
    pub alerts_generated: u64,
    /// Throughput over the whole service uptime.
    pub tps: f64,
    /// Mean over the last <= 100 latency samples.
    pub avg_latency_ms: f64,
    pub velocity_violations: u64,
    pub connected_clients: usize,
    pub timestamp: String,
}

/// Response body for `GET /metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsResponse {
    pub transactions_per_second: f64,
    /// Mean over the last <= 1000 latency samples.
    pub average_latency_ms: f64,
    /// Alerts as a percentage of processed transactions.
    pub fraud_rate: f64,
    pub velocity_violations: u64,
    pub dlq_messages: u64,
}

// =============================================================================
// MetricsAggregator
// =============================================================================

/// Process-wide counters for the pipeline.
pub struct MetricsAggregator {
    transactions_processed: AtomicU64,
    alerts_generated: AtomicU64,
    velocity_violations: AtomicU64,
    dlq_count: AtomicU64,
    latencies: Mutex<Vec<f64>>,
    start_time: Instant,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            transactions_processed: AtomicU64::new(0),
            alerts_generated: AtomicU64::new(0),
            velocity_violations: AtomicU64::new(0),
            dlq_count: AtomicU64::new(0),
            latencies: Mutex::new(Vec::new()),
            start_time: Instant::now(),
        }
    }

    // ── Writers ─────────────────────────────────────────────────────────

    pub fn record_transaction(&self) {
        self.transactions_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert(&self) {
        self.alerts_generated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_velocity_violation(&self) {
        self.velocity_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_letter(&self) {
        self.dlq_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Append a processing-latency sample, rotating the ring when full.
    pub fn record_latency(&self, latency_ms: f64) {
        let mut ring = self.latencies.lock();
        ring.push(latency_ms);
        if ring.len() > LATENCY_RING_MAX {
            let excess = ring.len() - LATENCY_RING_KEEP;
            ring.drain(..excess);
        }
    }

    // ── Readers ─────────────────────────────────────────────────────────

    pub fn transactions_processed(&self) -> u64 {
        self.transactions_processed.load(Ordering::Relaxed)
    }

    pub fn alerts_generated(&self) -> u64 {
        self.alerts_generated.load(Ordering::Relaxed)
    }

    pub fn velocity_violations(&self) -> u64 {
        self.velocity_violations.load(Ordering::Relaxed)
    }

    pub fn dlq_count(&self) -> u64 {
        self.dlq_count.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    fn mean_latency(&self, window: usize) -> f64 {
        let ring = self.latencies.lock();
        if ring.is_empty() {
            return 0.0;
        }
        let tail = &ring[ring.len().saturating_sub(window)..];
        tail.iter().sum::<f64>() / tail.len() as f64
    }

    fn tps(&self) -> f64 {
        let uptime = self.uptime_seconds();
        if uptime > 0.0 {
            self.transactions_processed() as f64 / uptime
        } else {
            0.0
        }
    }

    /// Build the per-second frame for metric subscribers.
    pub fn stream_frame(&self, connected_clients: usize) -> MetricsFrame {
        MetricsFrame {
            transactions_processed: self.transactions_processed(),
            alerts_generated: self.alerts_generated(),
            tps: round2(self.tps()),
            avg_latency_ms: round2(self.mean_latency(STREAM_MEAN_WINDOW)),
            velocity_violations: self.velocity_violations(),
            connected_clients,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Build the response body for `GET /metrics`.
    pub fn sync_response(&self) -> MetricsResponse {
        let processed = self.transactions_processed();
        let fraud_rate = if processed > 0 {
            self.alerts_generated() as f64 / processed as f64 * 100.0
        } else {
            0.0
        };
        MetricsResponse {
            transactions_per_second: round2(self.tps()),
            average_latency_ms: round2(self.mean_latency(SYNC_MEAN_WINDOW)),
            fraud_rate: round2(fraud_rate),
            velocity_violations: self.velocity_violations(),
            dlq_messages: self.dlq_count(),
        }
    }

    #[cfg(test)]
    fn latency_sample_count(&self) -> usize {
        self.latencies.lock().len()
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = MetricsAggregator::new();
        metrics.record_transaction();
        metrics.record_transaction();
        metrics.record_alert();
        metrics.record_velocity_violation();
        metrics.record_dead_letter();

        assert_eq!(metrics.transactions_processed(), 2);
        assert_eq!(metrics.alerts_generated(), 1);
        assert_eq!(metrics.velocity_violations(), 1);
        assert_eq!(metrics.dlq_count(), 1);
    }

    #[test]
    fn latency_ring_rotates_to_last_500() {
        let metrics = MetricsAggregator::new();
        for i in 0..1001 {
            metrics.record_latency(i as f64);
        }
        assert_eq!(metrics.latency_sample_count(), LATENCY_RING_KEEP);
        // The ring kept the most recent samples: 501..=1000.
        let mean = metrics.mean_latency(LATENCY_RING_KEEP);
        assert!((mean - 750.5).abs() < 1e-9);
    }

    #[test]
    fn stream_mean_covers_last_100_samples() {
        let metrics = MetricsAggregator::new();
        for _ in 0..200 {
            metrics.record_latency(1.0);
        }
        for _ in 0..100 {
            metrics.record_latency(3.0);
        }
        let frame = metrics.stream_frame(0);
        assert!((frame.avg_latency_ms - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn mean_latency_empty_ring_is_zero() {
        let metrics = MetricsAggregator::new();
        assert!((metrics.mean_latency(100) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn fraud_rate_is_percentage_of_processed() {
        let metrics = MetricsAggregator::new();
        for _ in 0..50 {
            metrics.record_transaction();
        }
        for _ in 0..5 {
            metrics.record_alert();
        }
        let response = metrics.sync_response();
        assert!((response.fraud_rate - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn fraud_rate_zero_when_nothing_processed() {
        let metrics = MetricsAggregator::new();
        assert!((metrics.sync_response().fraud_rate - 0.0).abs() < f64::EPSILON);
    }
}
