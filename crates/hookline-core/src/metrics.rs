//! Global atomic counters for pipeline observability.
//!
//! Counters are incremented silently by the pipelines. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when a host shuts down).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters; no allocations, no locking.
pub struct Metrics {
    queries_executed: AtomicU64,
    filters_applied: AtomicU64,
    submissions_completed: AtomicU64,
    validation_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            queries_executed: AtomicU64::new(0),
            filters_applied: AtomicU64::new(0),
            submissions_completed: AtomicU64::new(0),
            validation_failures: AtomicU64::new(0),
        }
    }

    /// Increment the queries-executed counter by one.
    pub fn inc_queries_executed(&self) {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "queries_executed", "counter incremented");
    }

    /// Increment the filters-applied counter by one.
    pub fn inc_filters_applied(&self) {
        self.filters_applied.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "filters_applied", "counter incremented");
    }

    pub fn inc_submissions_completed(&self) {
        self.submissions_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "submissions_completed", "counter incremented");
    }

    /// Counted once per rejected change set, not per error result.
    pub fn inc_validation_failures(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "validation_failures", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            queries_executed = self.queries_executed(),
            filters_applied = self.filters_applied(),
            submissions_completed = self.submissions_completed(),
            validation_failures = self.validation_failures(),
        );
    }

    pub fn queries_executed(&self) -> u64 {
        self.queries_executed.load(Ordering::Relaxed)
    }

    pub fn filters_applied(&self) -> u64 {
        self.filters_applied.load(Ordering::Relaxed)
    }

    pub fn submissions_completed(&self) -> u64 {
        self.submissions_completed.load(Ordering::Relaxed)
    }

    pub fn validation_failures(&self) -> u64 {
        self.validation_failures.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.queries_executed.store(0, Ordering::Relaxed);
        self.filters_applied.store(0, Ordering::Relaxed);
        self.submissions_completed.store(0, Ordering::Relaxed);
        self.validation_failures.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        assert_eq!(m.queries_executed(), 0);
        m.inc_queries_executed();
        m.inc_queries_executed();
        assert_eq!(m.queries_executed(), 2);

        m.inc_filters_applied();
        assert_eq!(m.filters_applied(), 1);

        m.inc_submissions_completed();
        m.inc_validation_failures();
        m.inc_validation_failures();
        assert_eq!(m.submissions_completed(), 1);
        assert_eq!(m.validation_failures(), 2);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_queries_executed();
        m.inc_filters_applied();
        m.inc_submissions_completed();
        m.inc_validation_failures();
        m.reset();
        assert_eq!(m.queries_executed(), 0);
        assert_eq!(m.filters_applied(), 0);
        assert_eq!(m.submissions_completed(), 0);
        assert_eq!(m.validation_failures(), 0);
    }
}
