//! Pipeline counters.
//!
//! Lock-free counters updated on the hot path and read by the health endpoint.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Value that moves both ways, e.g. in-flight work.
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements without wrapping below zero.
    pub fn dec(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Collected metrics for the ingestion pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    // Producer gateway
    pub events_published: Counter,
    pub publish_errors: Counter,

    // Consumer group and assemblers
    pub messages_consumed: Counter,
    pub batches_assembled: Counter,
    pub group_rejoins: Counter,

    // Coordinator
    pub decode_errors: Counter,
    pub rows_persisted: Counter,
    pub persist_errors: Counter,
    pub batches_in_flight: Gauge,
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub events_published: u64,
    pub publish_errors: u64,
    pub messages_consumed: u64,
    pub batches_assembled: u64,
    pub group_rejoins: u64,
    pub decode_errors: u64,
    pub rows_persisted: u64,
    pub persist_errors: u64,
    pub batches_in_flight: u64,
}

impl Metrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            events_published: self.events_published.get(),
            publish_errors: self.publish_errors.get(),
            messages_consumed: self.messages_consumed.get(),
            batches_assembled: self.batches_assembled.get(),
            group_rejoins: self.group_rejoins.get(),
            decode_errors: self.decode_errors.get(),
            rows_persisted: self.rows_persisted.get(),
            persist_errors: self.persist_errors.get(),
            batches_in_flight: self.batches_in_flight.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::default);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
