//! Pipeline and connection metrics.
//!
//! [`PipelineMetrics`] counts what happens to inbound messages: decoded,
//! dropped, applied, skipped, or discarded as stale. Dropped and skipped data
//! never surfaces as an error, so these counters are the only place it shows.
//!
//! [`ConnectionMetrics`] tracks handshake latency and reconnect outcomes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Metrics for a single operation type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationMetrics {
    /// Total number of operations.
    pub count: u64,
    /// Number of successful operations.
    pub success_count: u64,
    /// Number of failed operations.
    pub failure_count: u64,
    /// Total duration of all operations.
    pub total_duration_ms: u64,
    /// Minimum operation duration.
    pub min_duration_ms: Option<u64>,
    /// Maximum operation duration.
    pub max_duration_ms: Option<u64>,
    /// Average operation duration.
    pub avg_duration_ms: Option<f64>,
}

/// Thread-safe atomic operation metrics tracker.
#[derive(Debug)]
pub struct AtomicOperationMetrics {
    count: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    total_duration_ms: AtomicU64,
    min_duration_ms: AtomicU64,
    max_duration_ms: AtomicU64,
}

impl Default for AtomicOperationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicOperationMetrics {
    /// Create new empty metrics.
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            min_duration_ms: AtomicU64::new(u64::MAX),
            max_duration_ms: AtomicU64::new(0),
        }
    }

    /// Record a successful operation.
    pub fn record_success(&self, duration: Duration) {
        self.record(duration, &self.success_count);
    }

    /// Record a failed operation.
    pub fn record_failure(&self, duration: Duration) {
        self.record(duration, &self.failure_count);
    }

    fn record(&self, duration: Duration, outcome: &AtomicU64) {
        let ms = duration.as_millis() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        outcome.fetch_add(1, Ordering::Relaxed);
        self.total_duration_ms.fetch_add(ms, Ordering::Relaxed);
        self.min_duration_ms.fetch_min(ms, Ordering::Relaxed);
        self.max_duration_ms.fetch_max(ms, Ordering::Relaxed);
    }

    /// Get a snapshot of the current metrics.
    pub fn snapshot(&self) -> OperationMetrics {
        let count = self.count.load(Ordering::Relaxed);
        let total_duration_ms = self.total_duration_ms.load(Ordering::Relaxed);
        let min = self.min_duration_ms.load(Ordering::Relaxed);
        let max = self.max_duration_ms.load(Ordering::Relaxed);

        OperationMetrics {
            count,
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            total_duration_ms,
            min_duration_ms: (min != u64::MAX).then_some(min),
            max_duration_ms: (count > 0).then_some(max),
            avg_duration_ms: (count > 0).then(|| total_duration_ms as f64 / count as f64),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.success_count.store(0, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);
        self.total_duration_ms.store(0, Ordering::Relaxed);
        self.min_duration_ms.store(u64::MAX, Ordering::Relaxed);
        self.max_duration_ms.store(0, Ordering::Relaxed);
    }
}

/// Counters for the decode/apply pipeline.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    messages_received: AtomicU64,
    messages_dropped: AtomicU64,
    readings_applied: AtomicU64,
    tuples_skipped: AtomicU64,
    stale_discarded: AtomicU64,
}

impl PipelineMetrics {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// A message left the inbound queue.
    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// A whole message was dropped as malformed.
    pub fn record_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Readings were applied to the store.
    pub fn record_applied(&self, readings: usize) {
        self.readings_applied
            .fetch_add(readings as u64, Ordering::Relaxed);
    }

    /// Tuples inside a valid message were skipped.
    pub fn record_skipped(&self, tuples: usize) {
        self.tuples_skipped
            .fetch_add(tuples as u64, Ordering::Relaxed);
    }

    /// A message from a superseded generation was discarded.
    pub fn record_stale(&self) {
        self.stale_discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counter values.
    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        PipelineMetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            readings_applied: self.readings_applied.load(Ordering::Relaxed),
            tuples_skipped: self.tuples_skipped.load(Ordering::Relaxed),
            stale_discarded: self.stale_discarded.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of [`PipelineMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineMetricsSnapshot {
    /// Messages taken off the inbound queue.
    pub messages_received: u64,
    /// Messages dropped whole (not JSON, not an array).
    pub messages_dropped: u64,
    /// Readings applied to the store.
    pub readings_applied: u64,
    /// Malformed tuples skipped.
    pub tuples_skipped: u64,
    /// Messages discarded because their generation was superseded.
    pub stale_discarded: u64,
}

/// Connection-level metrics.
#[derive(Debug, Default)]
pub struct ConnectionMetrics {
    /// Handshake attempts, per endpoint tried.
    pub handshakes: AtomicOperationMetrics,
    /// Reconnection attempts.
    pub reconnects: AtomicOperationMetrics,
    disconnects: AtomicU64,
}

impl ConnectionMetrics {
    /// Create new empty connection metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an unexpected disconnect.
    pub fn record_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of unexpected disconnects.
    pub fn disconnects(&self) -> u64 {
        self.disconnects.load(Ordering::Relaxed)
    }

    /// Get a summary of all metrics.
    pub fn summary(&self) -> ConnectionMetricsSummary {
        ConnectionMetricsSummary {
            handshakes: self.handshakes.snapshot(),
            reconnects: self.reconnects.snapshot(),
            disconnects: self.disconnects(),
        }
    }
}

/// Serializable summary of connection metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionMetricsSummary {
    /// Handshake metrics.
    pub handshakes: OperationMetrics,
    /// Reconnection metrics.
    pub reconnects: OperationMetrics,
    /// Unexpected disconnects.
    pub disconnects: u64,
}
