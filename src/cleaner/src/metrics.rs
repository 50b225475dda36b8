//! Cleanup Metrics
//!
//! Thread-safe counters for monitoring cleanup runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Thread-safe metrics for tracking cleanup runs
#[derive(Debug, Clone)]
pub struct CleanupMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Number of runs that acquired the lock and started scanning
    runs_started: AtomicUsize,
    /// Number of runs that reached end of data or terminated early
    runs_completed: AtomicUsize,
    /// Number of runs stopped by a shutdown request
    runs_aborted: AtomicUsize,
    /// Number of candidate pages fetched
    pages_scanned: AtomicUsize,
    /// Number of entities purged without error
    entities_processed: AtomicUsize,
    /// Number of entities skipped (gone or unversioned)
    entities_skipped: AtomicUsize,
    /// Number of entities whose purge failed
    entities_failed: AtomicUsize,
    /// Total number of revisions deleted
    revisions_deleted: AtomicUsize,
    /// Number of times the run lock was refreshed against the lock service
    lock_refreshes: AtomicUsize,
    /// Duration of the last run in milliseconds
    last_run_duration_ms: AtomicU64,
}

impl Default for CleanupMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CleanupMetrics {
    /// Create a new metrics tracker
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub fn record_run_started(&self) {
        self.inner.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_completed(&self) {
        self.inner.runs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_aborted(&self) {
        self.inner.runs_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_page_scanned(&self) {
        self.inner.pages_scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_entity_processed(&self) {
        self.inner.entities_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_entity_skipped(&self) {
        self.inner.entities_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_entity_failed(&self) {
        self.inner.entities_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_revisions_deleted(&self, count: usize) {
        self.inner
            .revisions_deleted
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_lock_refresh(&self) {
        self.inner.lock_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_duration_ms(&self, duration_ms: u64) {
        self.inner
            .last_run_duration_ms
            .store(duration_ms, Ordering::Relaxed);
    }

    pub fn runs_started(&self) -> usize {
        self.inner.runs_started.load(Ordering::Relaxed)
    }

    pub fn runs_completed(&self) -> usize {
        self.inner.runs_completed.load(Ordering::Relaxed)
    }

    pub fn runs_aborted(&self) -> usize {
        self.inner.runs_aborted.load(Ordering::Relaxed)
    }

    pub fn pages_scanned(&self) -> usize {
        self.inner.pages_scanned.load(Ordering::Relaxed)
    }

    pub fn entities_processed(&self) -> usize {
        self.inner.entities_processed.load(Ordering::Relaxed)
    }

    pub fn entities_skipped(&self) -> usize {
        self.inner.entities_skipped.load(Ordering::Relaxed)
    }

    pub fn entities_failed(&self) -> usize {
        self.inner.entities_failed.load(Ordering::Relaxed)
    }

    pub fn revisions_deleted(&self) -> usize {
        self.inner.revisions_deleted.load(Ordering::Relaxed)
    }

    pub fn lock_refreshes(&self) -> usize {
        self.inner.lock_refreshes.load(Ordering::Relaxed)
    }

    pub fn last_run_duration_ms(&self) -> u64 {
        self.inner.last_run_duration_ms.load(Ordering::Relaxed)
    }

    /// Point-in-time snapshot of all counters
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            runs_started: self.runs_started(),
            runs_completed: self.runs_completed(),
            runs_aborted: self.runs_aborted(),
            pages_scanned: self.pages_scanned(),
            entities_processed: self.entities_processed(),
            entities_skipped: self.entities_skipped(),
            entities_failed: self.entities_failed(),
            revisions_deleted: self.revisions_deleted(),
            lock_refreshes: self.lock_refreshes(),
            last_run_duration_ms: self.last_run_duration_ms(),
        }
    }
}

/// Snapshot of [`CleanupMetrics`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSummary {
    pub runs_started: usize,
    pub runs_completed: usize,
    pub runs_aborted: usize,
    pub pages_scanned: usize,
    pub entities_processed: usize,
    pub entities_skipped: usize,
    pub entities_failed: usize,
    pub revisions_deleted: usize,
    pub lock_refreshes: usize,
    pub last_run_duration_ms: u64,
}

impl MetricsSummary {
    /// Log the summary at info level
    pub fn log(&self) {
        tracing::info!(
            runs_started = self.runs_started,
            runs_completed = self.runs_completed,
            runs_aborted = self.runs_aborted,
            pages_scanned = self.pages_scanned,
            entities_processed = self.entities_processed,
            entities_skipped = self.entities_skipped,
            entities_failed = self.entities_failed,
            revisions_deleted = self.revisions_deleted,
            lock_refreshes = self.lock_refreshes,
            last_run_duration_ms = self.last_run_duration_ms,
            "Cleanup metrics summary"
        );
    }
}
