//! Revision deletion for a single entity.
//!
//! Applies the count pass, deletes its selection, re-reads the history and
//! applies the age pass to what is left. Listeners are notified before every
//! individual deletion. The whole purge runs in one unit of work, so a failure
//! at any step rolls back that entity only.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::model::{EntityId, Revision, RevisionHistory};
use crate::retention::RetentionPolicy;
use crate::store::{HistoryStore, RevisionListener, TransactionService, UnitOfWork};

/// Why an entity was left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The entity was deleted before its page was processed.
    Missing,
    /// The entity has no revision history.
    Unversioned,
}

/// Result of purging one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeOutcome {
    Skipped(SkipReason),
    Purged { deleted: usize },
    /// Dry-run: nothing was deleted, `would_delete` revisions were selected.
    DryRun { would_delete: usize },
}

impl PurgeOutcome {
    /// Number of revisions actually deleted.
    pub fn deleted(&self) -> usize {
        match self {
            PurgeOutcome::Purged { deleted } => *deleted,
            _ => 0,
        }
    }
}

/// Deletes the revisions of one entity that fall outside the retention policy.
pub struct RevisionPurger {
    history_store: Arc<dyn HistoryStore>,
    listeners: Vec<Arc<dyn RevisionListener>>,
    dry_run: bool,
}

impl RevisionPurger {
    pub fn new(
        history_store: Arc<dyn HistoryStore>,
        listeners: Vec<Arc<dyn RevisionListener>>,
        dry_run: bool,
    ) -> Self {
        Self {
            history_store,
            listeners,
            dry_run,
        }
    }

    /// Purge `entity` inside its own transaction.
    pub async fn purge_in_transaction(
        &self,
        transactions: &dyn TransactionService,
        entity: &EntityId,
        policy: &RetentionPolicy,
    ) -> StoreResult<PurgeOutcome> {
        let work = PurgeWork {
            purger: self,
            entity,
            policy,
            outcome: Mutex::new(None),
        };
        transactions.run_in_transaction(&work, true).await?;

        let outcome = work
            .outcome
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        outcome.ok_or_else(|| {
            warn!(entity = %entity, "Transaction committed without running the purge");
            StoreError::Backend(format!(
                "transaction for {entity} committed without running its unit of work"
            ))
        })
    }

    /// Apply the retention policy to `entity`.
    ///
    /// Must run inside a transaction; deletions become visible to other
    /// processes only once it commits. Re-invoking from scratch after a
    /// rollback is safe.
    pub async fn purge(
        &self,
        entity: &EntityId,
        policy: &RetentionPolicy,
    ) -> StoreResult<PurgeOutcome> {
        if !self.history_store.exists(entity).await? {
            debug!(entity = %entity, "Entity no longer exists, skipping");
            return Ok(PurgeOutcome::Skipped(SkipReason::Missing));
        }

        let history = match self.history_store.history(entity).await? {
            Some(history) if !history.is_empty() => history,
            _ => {
                debug!(entity = %entity, "Entity has no revision history, skipping");
                return Ok(PurgeOutcome::Skipped(SkipReason::Unversioned));
            }
        };

        debug!(
            entity = %entity,
            revisions = history.len(),
            "Checking revisions"
        );

        if self.dry_run {
            return Ok(self.report_dry_run(&history, policy));
        }

        let original_len = history.len();
        let excess = policy.select_excess(&history);
        for revision in &excess {
            debug!(
                entity = %entity,
                label = %revision.label,
                max_versions_to_keep = policy.max_versions_to_keep(),
                "Revision exceeds max_versions_to_keep, deleting"
            );
        }
        let mut deleted = self.delete_revisions(entity, &excess).await?;

        if !policy.needs_age_pass(original_len) {
            return Ok(PurgeOutcome::Purged { deleted });
        }

        debug!(entity = %entity, "Checking remaining revisions against age cutoff");

        let Some(history) = self.history_store.history(entity).await? else {
            return Ok(PurgeOutcome::Purged { deleted });
        };

        let expired = policy.select_expired(&history);
        for revision in &expired {
            debug!(
                entity = %entity,
                label = %revision.label,
                frozen_modified_date = %revision.frozen_modified_date,
                cutoff = %policy.cutoff(),
                "Revision is older than cutoff, deleting"
            );
        }
        deleted += self.delete_revisions(entity, &expired).await?;

        Ok(PurgeOutcome::Purged { deleted })
    }

    /// Delete revisions one at a time, notifying every listener in
    /// registration order before each deletion.
    async fn delete_revisions(
        &self,
        entity: &EntityId,
        revisions: &[Revision],
    ) -> StoreResult<usize> {
        for revision in revisions {
            if !self.listeners.is_empty() {
                let current = self
                    .history_store
                    .history(entity)
                    .await?
                    .unwrap_or_else(|| RevisionHistory::new(entity.clone(), Vec::new()));

                for listener in &self.listeners {
                    if let Err(e) = listener.before_delete(&current, revision).await {
                        warn!(
                            entity = %entity,
                            label = %revision.label,
                            listener = listener.name(),
                            error = %e,
                            "Listener rejected revision deletion"
                        );
                        return Err(e);
                    }
                }
            }

            self.history_store.delete_revision(entity, revision).await?;
        }
        Ok(revisions.len())
    }

    fn report_dry_run(&self, history: &RevisionHistory, policy: &RetentionPolicy) -> PurgeOutcome {
        let selected = policy.select_for_deletion(history);
        for revision in &selected {
            info!(
                entity = %history.entity,
                label = %revision.label,
                frozen_modified_date = %revision.frozen_modified_date,
                "[DRY-RUN] Would delete revision"
            );
        }
        PurgeOutcome::DryRun {
            would_delete: selected.len(),
        }
    }
}

/// Unit of work purging one entity. Each attempt overwrites the outcome of
/// the previous one.
struct PurgeWork<'a> {
    purger: &'a RevisionPurger,
    entity: &'a EntityId,
    policy: &'a RetentionPolicy,
    outcome: Mutex<Option<PurgeOutcome>>,
}

#[async_trait]
impl UnitOfWork for PurgeWork<'_> {
    async fn execute(&self) -> StoreResult<()> {
        let outcome = self.purger.purge(self.entity, self.policy).await?;
        *self
            .outcome
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(outcome);
        Ok(())
    }
}
