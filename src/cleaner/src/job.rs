//! Cleanup job: one `execute()` call drives one run.
//!
//! A run validates the configuration, bypasses read-only stores, acquires the
//! cluster-wide lock, scans every page of candidates and releases the lock on
//! every exit path. The run state (start, end, running flag) can be read at
//! any time by monitors.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::batch::BatchCoordinator;
use crate::config::CleanupConfig;
use crate::error::CleanupError;
use crate::lock::RunLock;
use crate::metrics::CleanupMetrics;
use crate::purger::RevisionPurger;
use crate::retention::RetentionPolicy;
use crate::scanner::{PageScanner, ScanOutcome, ScanSummary};
use crate::store::{HistoryStore, LockService, RevisionListener, SearchService, TransactionService};

/// Lifecycle of a job. Terminal states are kept until the next `execute()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Validating,
    Running,
    Completed,
    Aborted,
    Failed,
}

/// Run bookkeeping exposed to monitors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_running: bool,
}

/// Result of a run that acquired the lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub dry_run: bool,
    pub pages: usize,
    pub entities_attempted: usize,
    pub entities_skipped: usize,
    pub entities_failed: usize,
    pub revisions_deleted: usize,
    /// Revisions selected but left in place by a dry run.
    pub revisions_selected: usize,
    /// Offset at which an unexpected error stopped the scan.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminated_at_offset: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<String>,
}

impl RunSummary {
    fn new(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        dry_run: bool,
        scan: ScanSummary,
    ) -> Self {
        let (terminated_at_offset, termination_reason) = match scan.outcome {
            ScanOutcome::TerminatedEarly { offset, reason } => (Some(offset), Some(reason)),
            ScanOutcome::EndOfData | ScanOutcome::Aborted => (None, None),
        };

        Self {
            run_id,
            started_at,
            completed_at,
            dry_run,
            pages: scan.pages,
            entities_attempted: scan.entities_attempted,
            entities_skipped: scan.entities_skipped,
            entities_failed: scan.entities_failed,
            revisions_deleted: scan.revisions_deleted,
            revisions_selected: scan.revisions_selected,
            terminated_at_offset,
            termination_reason,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.terminated_at_offset.is_some()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }
}

/// What a call to [`CleanupJob::execute`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// The store is read-only; nothing was attempted.
    Bypassed,
    /// Another process holds the run lock.
    LockUnavailable,
    /// This job is already executing a run.
    AlreadyRunning,
    /// The scan reached the end of data or terminated early.
    Completed(RunSummary),
    /// Shutdown was requested during the scan.
    Aborted(RunSummary),
}

impl JobOutcome {
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            JobOutcome::Completed(summary) | JobOutcome::Aborted(summary) => Some(summary),
            JobOutcome::Bypassed | JobOutcome::LockUnavailable | JobOutcome::AlreadyRunning => {
                None
            }
        }
    }
}

/// The external services a job is wired with.
#[derive(Clone)]
pub struct Collaborators {
    pub search: Arc<dyn SearchService>,
    pub history: Arc<dyn HistoryStore>,
    pub transactions: Arc<dyn TransactionService>,
    pub locks: Arc<dyn LockService>,
    /// Notified in order before every deletion.
    pub listeners: Vec<Arc<dyn RevisionListener>>,
}

impl Collaborators {
    /// Use one backend for every service.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: SearchService + HistoryStore + TransactionService + LockService + 'static,
    {
        Self {
            search: backend.clone(),
            history: backend.clone(),
            transactions: backend.clone(),
            locks: backend,
            listeners: Vec::new(),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn RevisionListener>) -> Self {
        self.listeners.push(listener);
        self
    }
}

/// Revision cleanup job.
pub struct CleanupJob {
    collaborators: Collaborators,
    config: RwLock<CleanupConfig>,
    state: RwLock<JobState>,
    run_state: RwLock<RunState>,
    in_flight: AtomicBool,
    cancellation: CancellationToken,
    metrics: CleanupMetrics,
}

impl CleanupJob {
    pub fn new(collaborators: Collaborators, config: CleanupConfig) -> Self {
        Self {
            collaborators,
            config: RwLock::new(config),
            state: RwLock::new(JobState::Idle),
            run_state: RwLock::new(RunState::default()),
            in_flight: AtomicBool::new(false),
            cancellation: CancellationToken::new(),
            metrics: CleanupMetrics::new(),
        }
    }

    /// Use `cancellation` as the shutdown signal.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_metrics(mut self, metrics: CleanupMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replace the configuration; takes effect on the next run.
    pub fn configure(&self, config: CleanupConfig) {
        *write(&self.config) = config;
    }

    pub fn config(&self) -> CleanupConfig {
        read(&self.config).clone()
    }

    pub fn state(&self) -> JobState {
        *read(&self.state)
    }

    pub fn run_state(&self) -> RunState {
        read(&self.run_state).clone()
    }

    pub fn start_date(&self) -> Option<DateTime<Utc>> {
        read(&self.run_state).start_date
    }

    pub fn end_date(&self) -> Option<DateTime<Utc>> {
        read(&self.run_state).end_date
    }

    pub fn is_running(&self) -> bool {
        read(&self.run_state).is_running
    }

    pub fn metrics(&self) -> &CleanupMetrics {
        &self.metrics
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Run one cleanup pass over the repository.
    ///
    /// Only an invalid configuration is returned as an error. Every other
    /// failure is logged and reflected in the returned outcome.
    ///
    /// Overlapping calls on the same job are turned away with
    /// [`JobOutcome::AlreadyRunning`] without touching the state of the run
    /// in flight. If the returned future is dropped mid-run, the run state
    /// is closed as aborted and the lock is released in the background.
    pub async fn execute(&self) -> Result<JobOutcome, CleanupError> {
        let Some(mut execution) = Execution::begin(self) else {
            info!("Revision cleanup already running on this job, skipping");
            return Ok(JobOutcome::AlreadyRunning);
        };

        let config = self.config();
        self.set_state(JobState::Validating);

        let policy = match self.validate(&config) {
            Ok(policy) => policy,
            Err(e) => {
                error!(error = %e, "Revision cleanup configuration is invalid");
                self.set_state(JobState::Failed);
                return Err(e);
            }
        };

        if self.collaborators.transactions.is_read_only() {
            info!("Store is read-only, bypassing revision cleanup");
            self.set_state(JobState::Idle);
            return Ok(JobOutcome::Bypassed);
        }

        let mut lock = RunLock::new(
            self.collaborators.locks.clone(),
            config.lock_name.clone(),
            config.lock_ttl,
            self.metrics.clone(),
        );
        if let Err(e) = lock.acquire().await {
            info!(
                lock = %config.lock_name,
                error = %e,
                "Run lock unavailable, another cleanup is probably in progress"
            );
            self.set_state(JobState::Idle);
            return Ok(JobOutcome::LockUnavailable);
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        self.set_state(JobState::Running);
        *write(&self.run_state) = RunState {
            start_date: Some(started_at),
            end_date: None,
            is_running: true,
        };
        self.metrics.record_run_started();
        execution.running = true;

        info!(
            run_id = %run_id,
            max_versions_to_keep = config.retention.max_versions_to_keep,
            min_versions_to_keep = config.retention.min_versions_to_keep,
            max_days_to_keep = config.retention.max_days_to_keep,
            cutoff = %policy.cutoff(),
            page_size = config.page_size,
            worker_count = config.worker_count,
            dry_run = config.dry_run,
            "Starting revision cleanup run"
        );

        let scan = self.scanner(&config).scan(&mut lock, &policy).await;
        lock.release().await;

        let completed_at = Utc::now();
        {
            let mut run_state = write(&self.run_state);
            run_state.is_running = false;
            run_state.end_date = Some(completed_at);
        }
        execution.running = false;

        let aborted = scan.outcome == ScanOutcome::Aborted;
        let summary = RunSummary::new(run_id, started_at, completed_at, config.dry_run, scan);
        self.metrics
            .record_run_duration_ms(summary.duration_ms().max(0) as u64);

        if aborted {
            self.metrics.record_run_aborted();
            self.set_state(JobState::Aborted);
            info!(
                run_id = %run_id,
                pages = summary.pages,
                revisions_deleted = summary.revisions_deleted,
                "Revision cleanup run aborted by shutdown"
            );
            return Ok(JobOutcome::Aborted(summary));
        }

        if let Some(offset) = summary.terminated_at_offset {
            warn!(
                run_id = %run_id,
                offset,
                "Revision cleanup run ended early, repository only partially covered"
            );
        }

        self.metrics.record_run_completed();
        self.set_state(JobState::Completed);
        info!(
            run_id = %run_id,
            pages = summary.pages,
            entities_attempted = summary.entities_attempted,
            entities_failed = summary.entities_failed,
            revisions_deleted = summary.revisions_deleted,
            revisions_selected = summary.revisions_selected,
            duration_ms = summary.duration_ms(),
            "Revision cleanup run completed"
        );
        Ok(JobOutcome::Completed(summary))
    }

    fn validate(&self, config: &CleanupConfig) -> Result<RetentionPolicy, CleanupError> {
        for warning in config.validate()? {
            warn!("{warning}");
        }
        Ok(RetentionPolicy::new(&config.retention, Utc::now())?)
    }

    fn scanner(&self, config: &CleanupConfig) -> PageScanner {
        let purger = Arc::new(RevisionPurger::new(
            self.collaborators.history.clone(),
            self.collaborators.listeners.clone(),
            config.dry_run,
        ));
        let coordinator = BatchCoordinator::new(
            purger,
            self.collaborators.transactions.clone(),
            config.worker_count,
            self.metrics.clone(),
        );

        PageScanner::new(
            self.collaborators.search.clone(),
            self.collaborators.transactions.clone(),
            coordinator,
            config.store_scope.clone(),
            config.search_query(),
            config.page_size,
            self.cancellation.clone(),
            self.metrics.clone(),
        )
    }

    fn set_state(&self, state: JobState) {
        *write(&self.state) = state;
    }
}

/// Marks a job as executing for the lifetime of one `execute()` call.
///
/// While `running` is set the run has been announced to monitors; dropping
/// the guard in that state closes the run as aborted.
struct Execution<'a> {
    job: &'a CleanupJob,
    running: bool,
}

impl<'a> Execution<'a> {
    fn begin(job: &'a CleanupJob) -> Option<Self> {
        job.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(Self {
            job,
            running: false,
        })
    }
}

impl Drop for Execution<'_> {
    fn drop(&mut self) {
        if self.running {
            warn!("Revision cleanup run dropped before it finished");
            {
                let mut run_state = write(&self.job.run_state);
                run_state.is_running = false;
                run_state.end_date = Some(Utc::now());
            }
            self.job.metrics.record_run_aborted();
            self.job.set_state(JobState::Aborted);
        }
        self.job.in_flight.store(false, Ordering::Release);
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
