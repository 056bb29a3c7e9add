//! Sink metrics for observability
//!
//! Counters for both sides of the queue: what producers managed to admit or
//! lost, and what the draining worker forwarded to the sink.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for async sink observability
///
/// Counters are monotonic for the lifetime of the sink. In particular the
/// failed-admission count is never reset: every forced-through record reports
/// the lifetime total.
///
/// # Example
///
/// ```
/// use sharded_log_sink::SinkMetrics;
///
/// let metrics = SinkMetrics::new();
///
/// metrics.record_admitted();
/// assert_eq!(metrics.record_failed_admission(), 1);
///
/// assert_eq!(metrics.admitted(), 1);
/// assert_eq!(metrics.failed_admissions(), 1);
/// ```
#[derive(Debug)]
pub struct SinkMetrics {
    /// Records accepted into a shard
    admitted: AtomicU64,

    /// Non-blocking admissions that found their shard full
    failed_admissions: AtomicU64,

    /// Records escalated to a blocking enqueue with the drop count attached
    forced_through: AtomicU64,

    /// Times a producer had to wait for shard capacity
    block_events: AtomicU64,

    /// Records refused because the sink was already closed
    rejected_after_close: AtomicU64,

    /// Records forwarded to the sink successfully
    written: AtomicU64,

    /// Sink write or flush calls that returned an error
    write_errors: AtomicU64,

    /// Successful sink flushes
    flushes: AtomicU64,

    /// Sink calls that panicked inside the worker
    worker_panics: AtomicU64,
}

impl SinkMetrics {
    /// Create a new metrics instance with all counters at zero
    pub const fn new() -> Self {
        Self {
            admitted: AtomicU64::new(0),
            failed_admissions: AtomicU64::new(0),
            forced_through: AtomicU64::new(0),
            block_events: AtomicU64::new(0),
            rejected_after_close: AtomicU64::new(0),
            written: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            worker_panics: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn failed_admissions(&self) -> u64 {
        self.failed_admissions.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn forced_through(&self) -> u64 {
        self.forced_through.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn block_events(&self) -> u64 {
        self.block_events.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rejected_after_close(&self) -> u64 {
        self.rejected_after_close.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn write_errors(&self) -> u64 {
        self.write_errors.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn worker_panics(&self) -> u64 {
        self.worker_panics.load(Ordering::Relaxed)
    }

    /// Records that never reached a shard: failed admissions that were not
    /// forced through, plus rejections after close
    pub fn dropped(&self) -> u64 {
        self.failed_admissions()
            .saturating_sub(self.forced_through())
            + self.rejected_after_close()
    }

    #[inline]
    pub fn record_admitted(&self) -> u64 {
        self.admitted.fetch_add(1, Ordering::Relaxed)
    }

    /// Record a failed non-blocking admission
    ///
    /// Returns the new cumulative count, which decides whether this record
    /// is forced through.
    #[inline]
    pub fn record_failed_admission(&self) -> u64 {
        self.failed_admissions.fetch_add(1, Ordering::AcqRel) + 1
    }

    #[inline]
    pub fn record_forced_through(&self) -> u64 {
        self.forced_through.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_block(&self) -> u64 {
        self.block_events.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_rejected(&self) -> u64 {
        self.rejected_after_close.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_written(&self) -> u64 {
        self.written.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_write_error(&self) -> u64 {
        self.write_errors.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_flush(&self) -> u64 {
        self.flushes.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_worker_panic(&self) -> u64 {
        self.worker_panics.fetch_add(1, Ordering::Relaxed)
    }

    /// Get drop rate as a percentage (0.0 - 100.0)
    ///
    /// Returns 0.0 if nothing has been offered yet.
    pub fn drop_rate(&self) -> f64 {
        let dropped = self.dropped() as f64;
        let total = self.admitted() as f64 + dropped;
        if total == 0.0 {
            0.0
        } else {
            (dropped / total) * 100.0
        }
    }
}

impl Default for SinkMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SinkMetrics {
    /// Create a snapshot of the current metrics values
    fn clone(&self) -> Self {
        Self {
            admitted: AtomicU64::new(self.admitted()),
            failed_admissions: AtomicU64::new(self.failed_admissions()),
            forced_through: AtomicU64::new(self.forced_through()),
            block_events: AtomicU64::new(self.block_events()),
            rejected_after_close: AtomicU64::new(self.rejected_after_close()),
            written: AtomicU64::new(self.written()),
            write_errors: AtomicU64::new(self.write_errors()),
            flushes: AtomicU64::new(self.flushes()),
            worker_panics: AtomicU64::new(self.worker_panics()),
        }
    }
}
