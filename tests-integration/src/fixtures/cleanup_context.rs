use anyhow::Result;
use cleaner::store::RevisionListener;
use cleaner::{CleanupConfig, CleanupJob, Collaborators, EntityId, InMemoryRepository, JobOutcome};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::create_cleanup_config;

/// Test context wiring a cleanup job to an in-memory repository
pub struct CleanupTestContext {
    pub repository: Arc<InMemoryRepository>,
    pub config: CleanupConfig,
    pub cancellation: CancellationToken,
    listeners: Vec<Arc<dyn RevisionListener>>,
}

impl CleanupTestContext {
    /// Creates a context over an empty repository with the test configuration
    pub fn new() -> Self {
        Self::with_repository(InMemoryRepository::new())
    }

    /// Creates a context over an existing repository
    pub fn with_repository(repository: InMemoryRepository) -> Self {
        Self {
            repository: Arc::new(repository),
            config: create_cleanup_config(),
            cancellation: CancellationToken::new(),
            listeners: Vec::new(),
        }
    }

    /// Replaces the cleanup configuration
    pub fn with_config(mut self, config: CleanupConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a pre-delete listener; listeners run in registration order
    pub fn with_listener(mut self, listener: Arc<dyn RevisionListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Builds a new job sharing this context's repository and cancellation
    pub fn job(&self) -> CleanupJob {
        let collaborators = self
            .listeners
            .iter()
            .cloned()
            .fold(Collaborators::from_backend(self.repository.clone()), |c, l| {
                c.with_listener(l)
            });

        CleanupJob::new(collaborators, self.config.clone())
            .with_cancellation(self.cancellation.clone())
    }

    /// Runs one cleanup pass with a fresh job
    pub async fn run(&self) -> Result<JobOutcome> {
        Ok(self.job().execute().await?)
    }

    /// Number of revisions currently held by `entity`, zero if it is gone or
    /// unversioned
    pub fn revision_count(&self, entity: &EntityId) -> usize {
        self.revision_labels(entity).len()
    }

    /// Labels of the revisions currently held by `entity`, sorted
    pub fn revision_labels(&self, entity: &EntityId) -> Vec<String> {
        let mut labels: Vec<String> = self
            .repository
            .snapshot()
            .entities
            .into_iter()
            .find(|e| &e.id == entity)
            .and_then(|e| e.revisions)
            .unwrap_or_default()
            .into_iter()
            .map(|r| r.label)
            .collect();
        labels.sort();
        labels
    }

    /// Total number of revisions in the repository
    pub fn total_revisions(&self) -> usize {
        self.repository.snapshot().revision_count()
    }

    /// Whether the run lock configured for this context is currently held
    pub fn is_locked(&self) -> bool {
        self.repository.is_locked(&self.config.lock_name)
    }
}

impl Default for CleanupTestContext {
    fn default() -> Self {
        Self::new()
    }
}
