//! Per-handler delivery counters

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Metrics for a single handler
#[derive(Debug, Default)]
pub struct HandlerMetrics {
    /// Envelopes waiting in the worker queue
    queue_len: AtomicUsize,
    /// `handle` returned Ok
    delivered: AtomicU64,
    /// `handle` returned an error
    failed: AtomicU64,
    /// Envelopes dropped because the worker was gone
    dropped: AtomicU64,
    /// Envelopes dropped after waiting `handler_timeout` for queue space
    timed_out: AtomicU64,
}

impl HandlerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn inc_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn inc_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn timed_out(&self) -> u64 {
        self.timed_out.load(Ordering::Relaxed)
    }

    pub fn inc_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> HandlerMetricsSnapshot {
        HandlerMetricsSnapshot {
            queue_len: self.queue_len(),
            delivered: self.delivered(),
            failed: self.failed(),
            dropped: self.dropped(),
            timed_out: self.timed_out(),
        }
    }
}

/// Snapshot of handler metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerMetricsSnapshot {
    pub queue_len: usize,
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
    pub timed_out: u64,
}

impl HandlerMetricsSnapshot {
    /// Envelopes shed or timed out instead of being delivered
    pub fn lost(&self) -> u64 {
        self.dropped + self.timed_out
    }
}

impl std::fmt::Display for HandlerMetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "delivered={}, failed={}, dropped={}, timed_out={}",
            self.delivered, self.failed, self.dropped, self.timed_out
        )
    }
}
