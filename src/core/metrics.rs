//! Delivery counters for the secondary paths
//!
//! Shared by the collector sink and the batching exporter so callers can see
//! what happened to entries that never surface as errors.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for best-effort delivery
///
/// # Example
///
/// ```
/// use rust_trace_logger::core::DeliveryMetrics;
///
/// let metrics = DeliveryMetrics::new();
/// metrics.record_sent(3);
/// metrics.record_failed(1);
///
/// assert_eq!(metrics.sent_count(), 3);
/// assert_eq!(metrics.failed_count(), 1);
/// ```
#[derive(Debug)]
pub struct DeliveryMetrics {
    /// Entries accepted by the remote end
    sent: AtomicU64,

    /// Entries whose delivery attempt failed
    failed: AtomicU64,

    /// Entries discarded before any attempt (queue full or worker gone)
    dropped: AtomicU64,

    /// Requests issued, single or batched
    batches: AtomicU64,
}

impl DeliveryMetrics {
    pub const fn new() -> Self {
        Self {
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            batches: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn batch_count(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    /// Record `n` entries delivered in one request
    #[inline]
    pub fn record_sent(&self, n: u64) -> u64 {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.sent.fetch_add(n, Ordering::Relaxed)
    }

    /// Record `n` entries lost in one failed request
    #[inline]
    pub fn record_failed(&self, n: u64) -> u64 {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(n, Ordering::Relaxed)
    }

    /// Returns the previous dropped count
    #[inline]
    pub fn record_dropped(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed)
    }

    /// Share of entries that did not arrive, as a percentage
    pub fn loss_rate(&self) -> f64 {
        let lost = (self.failed_count() + self.dropped_count()) as f64;
        let total = self.sent_count() as f64 + lost;
        if total == 0.0 {
            0.0
        } else {
            (lost / total) * 100.0
        }
    }

    pub fn reset(&self) {
        self.sent.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.batches.store(0, Ordering::Relaxed);
    }
}

impl Default for DeliveryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for DeliveryMetrics {
    /// Snapshot of the current values
    fn clone(&self) -> Self {
        Self {
            sent: AtomicU64::new(self.sent_count()),
            failed: AtomicU64::new(self.failed_count()),
            dropped: AtomicU64::new(self.dropped_count()),
            batches: AtomicU64::new(self.batch_count()),
        }
    }
}
