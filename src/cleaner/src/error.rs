//! Error types for the cleanup engine and its collaborators.

use crate::config::ConfigError;
use crate::model::EntityId;
use thiserror::Error;

/// Errors raised by the external collaborators (search, history store,
/// transaction runner, listeners).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The referenced entity or revision does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transient serialization conflict; the transaction runner may retry.
    #[error("Concurrency conflict: {0}")]
    Conflict(String),

    /// The store refused a write because it is in read-only mode.
    #[error("Store is read-only")]
    ReadOnly,

    /// The search collaborator failed to evaluate a query.
    #[error("Search failed for '{query}': {message}")]
    Search { query: String, message: String },

    /// A pre-delete listener rejected the deletion.
    #[error("Listener '{listener}' failed: {message}")]
    Listener { listener: String, message: String },

    /// Any other backend failure.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether the transaction runner should retry the unit of work.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the cluster-wide lock service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Another holder owns the lock.
    #[error("Lock '{name}' is held by another process")]
    Unavailable { name: String },

    /// The token presented does not own the lock (expired or released).
    #[error("Lock '{name}' is no longer held by token {token}")]
    NotHeld { name: String, token: String },

    /// Lock backend failure.
    #[error("Lock backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by the cleanup engine.
///
/// Only [`CleanupError::Configuration`] crosses the `execute()` boundary; the
/// other variants are absorbed and logged by the job.
#[derive(Error, Debug)]
pub enum CleanupError {
    /// Invalid retention or scan configuration. Fatal, raised before any run.
    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigError),

    /// The process is shutting down. Unwinds the scan; not a failure.
    #[error("Cleanup aborted: shutdown requested")]
    ShutdownRequested,

    /// Purging one entity failed. Does not affect sibling entities.
    #[error("Failed to purge revisions of {entity}: {source}")]
    EntityProcessing {
        entity: EntityId,
        #[source]
        source: StoreError,
    },

    /// Fetching a page of candidates failed.
    #[error("Failed to fetch candidate page at offset {offset}: {source}")]
    PageFetch {
        offset: usize,
        #[source]
        source: StoreError,
    },

    /// The worker pool failed outside the per-entity boundary.
    #[error("Batch dispatch failed at offset {offset}: {message}")]
    BatchDispatch { offset: usize, message: String },

    /// Run lock could not be refreshed.
    #[error("Run lock error: {0}")]
    Lock(#[from] LockError),
}
