//! Revision cleanup engine.
//!
//! Removes historical revisions of versioned entities according to a count-
//! and age-based retention policy, without holding long transactions against
//! the repository.
//!
//! A run is driven by [`CleanupJob::execute`]:
//! - the cluster-wide [`RunLock`] keeps a single run active at a time
//! - the [`PageScanner`] walks the candidate entities page by page
//! - the [`BatchCoordinator`] purges each page with a fixed worker pool
//! - the [`RevisionPurger`] applies the [`RetentionPolicy`] to one entity in
//!   its own transaction
//!
//! The engine only talks to the collaborator traits in [`store`];
//! [`memory::InMemoryRepository`] implements all of them.

pub mod batch;
pub mod config;
pub mod error;
pub mod job;
pub mod lock;
pub mod memory;
pub mod metrics;
pub mod model;
pub mod purger;
pub mod retention;
pub mod scanner;
pub mod store;

// Re-export commonly used types
pub use batch::{BatchCoordinator, BatchReport};
pub use config::{CleanupConfig, ConfigError};
pub use error::{CleanupError, LockError, StoreError, StoreResult};
pub use job::{CleanupJob, Collaborators, JobOutcome, JobState, RunState, RunSummary};
pub use lock::RunLock;
pub use memory::{InMemoryRepository, RepositorySnapshot};
pub use metrics::{CleanupMetrics, MetricsSummary};
pub use model::{EntityId, Revision, RevisionHistory};
pub use purger::{PurgeOutcome, RevisionPurger, SkipReason};
pub use retention::{RetentionConfig, RetentionPolicy, RetentionWarning};
pub use scanner::{PageScanner, ScanOutcome, ScanSummary};
