//! Concurrent purging of one page of entities.
//!
//! A fixed pool of workers pulls entities from a shared queue until it is
//! empty. Each entity is purged in its own transaction; a failure is logged
//! with the entity id and recorded, but never stops the other workers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::error::CleanupError;
use crate::metrics::CleanupMetrics;
use crate::model::EntityId;
use crate::purger::{PurgeOutcome, RevisionPurger};
use crate::retention::RetentionPolicy;
use crate::store::TransactionService;

/// What happened to the entities of one page.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Entities a worker picked up.
    pub attempted: usize,
    /// Entities purged without error, including those with nothing to delete.
    pub processed: usize,
    /// Entities that no longer existed or had no history.
    pub skipped: usize,
    /// Revisions deleted across the page.
    pub revisions_deleted: usize,
    /// Revisions a dry run would have deleted.
    pub revisions_selected: usize,
    /// One [`CleanupError::EntityProcessing`] per failed entity.
    pub failures: Vec<CleanupError>,
}

impl BatchReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn failed_entities(&self) -> Vec<&EntityId> {
        self.failures
            .iter()
            .filter_map(|failure| match failure {
                CleanupError::EntityProcessing { entity, .. } => Some(entity),
                _ => None,
            })
            .collect()
    }

    fn merge(&mut self, other: BatchReport) {
        self.attempted += other.attempted;
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.revisions_deleted += other.revisions_deleted;
        self.revisions_selected += other.revisions_selected;
        self.failures.extend(other.failures);
    }
}

/// Runs the purger over a page with a bounded number of workers.
pub struct BatchCoordinator {
    purger: Arc<RevisionPurger>,
    transactions: Arc<dyn TransactionService>,
    worker_count: usize,
    metrics: CleanupMetrics,
}

impl BatchCoordinator {
    pub fn new(
        purger: Arc<RevisionPurger>,
        transactions: Arc<dyn TransactionService>,
        worker_count: usize,
        metrics: CleanupMetrics,
    ) -> Self {
        Self {
            purger,
            transactions,
            worker_count: worker_count.max(1),
            metrics,
        }
    }

    /// Purge every entity of the page and wait until all were attempted.
    ///
    /// Per-entity failures are part of the report. An error is returned only
    /// when a worker died outside the per-entity boundary; the remaining
    /// workers still drain the queue first.
    pub async fn process(
        &self,
        entities: Vec<EntityId>,
        policy: &RetentionPolicy,
        offset: usize,
    ) -> Result<BatchReport, CleanupError> {
        if entities.is_empty() {
            return Ok(BatchReport::default());
        }

        let queue: Arc<[EntityId]> = entities.into();
        let next = Arc::new(AtomicUsize::new(0));
        let workers = self.worker_count.min(queue.len());

        debug!(
            offset,
            entities = queue.len(),
            workers,
            "Dispatching page to worker pool"
        );

        let mut pool = JoinSet::new();
        for worker_id in 0..workers {
            let worker = Worker {
                id: worker_id,
                purger: self.purger.clone(),
                transactions: self.transactions.clone(),
                queue: queue.clone(),
                next: next.clone(),
                policy: policy.clone(),
                metrics: self.metrics.clone(),
            };
            pool.spawn(worker.run());
        }

        let mut report = BatchReport::default();
        let mut dispatch_errors = Vec::new();
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(worker_report) => report.merge(worker_report),
                Err(e) => {
                    error!(offset, error = %e, "Cleanup worker terminated abnormally");
                    dispatch_errors.push(e.to_string());
                }
            }
        }

        if !dispatch_errors.is_empty() {
            return Err(CleanupError::BatchDispatch {
                offset,
                message: dispatch_errors.join("; "),
            });
        }

        Ok(report)
    }
}

struct Worker {
    id: usize,
    purger: Arc<RevisionPurger>,
    transactions: Arc<dyn TransactionService>,
    queue: Arc<[EntityId]>,
    next: Arc<AtomicUsize>,
    policy: RetentionPolicy,
    metrics: CleanupMetrics,
}

impl Worker {
    async fn run(self) -> BatchReport {
        let mut report = BatchReport::default();

        loop {
            let index = self.next.fetch_add(1, Ordering::Relaxed);
            let Some(entity) = self.queue.get(index) else {
                break;
            };
            report.attempted += 1;

            let result = self
                .purger
                .purge_in_transaction(self.transactions.as_ref(), entity, &self.policy)
                .await;

            match result {
                Ok(PurgeOutcome::Skipped(reason)) => {
                    report.skipped += 1;
                    self.metrics.record_entity_skipped();
                    debug!(worker = self.id, entity = %entity, ?reason, "Skipped entity");
                }
                Ok(PurgeOutcome::Purged { deleted }) => {
                    report.processed += 1;
                    report.revisions_deleted += deleted;
                    self.metrics.record_entity_processed();
                    self.metrics.record_revisions_deleted(deleted);
                }
                Ok(PurgeOutcome::DryRun { would_delete }) => {
                    report.processed += 1;
                    report.revisions_selected += would_delete;
                    self.metrics.record_entity_processed();
                }
                Err(source) => {
                    warn!(
                        worker = self.id,
                        entity = %entity,
                        error = %source,
                        "Failed to purge revisions"
                    );
                    self.metrics.record_entity_failed();
                    report.failures.push(CleanupError::EntityProcessing {
                        entity: entity.clone(),
                        source,
                    });
                }
            }
        }

        report
    }
}
