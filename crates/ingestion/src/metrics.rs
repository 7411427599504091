//! Frame source counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared between a source and whoever reports on it
#[derive(Debug, Default)]
pub struct SourceMetrics {
    /// Frames handed to the pipeline
    frames_supplied: AtomicU64,

    /// Pulls that produced no frame
    failures: AtomicU64,

    /// Frames deliberately corrupted (simulation only)
    corrupted: AtomicU64,
}

impl SourceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_supplied(&self) {
        self.frames_supplied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_corrupted(&self) {
        self.corrupted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SourceMetricsSnapshot {
        SourceMetricsSnapshot {
            frames_supplied: self.frames_supplied.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            corrupted: self.corrupted.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SourceMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceMetricsSnapshot {
    pub frames_supplied: u64,
    pub failures: u64,
    pub corrupted: u64,
}
