//! Collaborator interfaces consumed by the cleanup engine.
//!
//! The engine never talks to a concrete repository. It is wired with
//! implementations of these traits: a search index that returns candidate
//! entities, a history store that owns revisions, a transaction runner that
//! retries units of work on conflicts, a cluster-wide lock service and an
//! ordered list of pre-delete listeners.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{LockError, StoreError, StoreResult};
use crate::model::{EntityId, Revision, RevisionHistory};

/// Store that a search is evaluated against, e.g. `workspace://SpacesStore`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreScope {
    pub protocol: String,
    pub identifier: String,
}

impl StoreScope {
    pub fn new(protocol: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            identifier: identifier.into(),
        }
    }
}

impl Default for StoreScope {
    fn default() -> Self {
        Self::new("workspace", "SpacesStore")
    }
}

impl fmt::Display for StoreScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.identifier)
    }
}

impl FromStr for StoreScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once("://") {
            Some((protocol, identifier)) if !protocol.is_empty() && !identifier.is_empty() => {
                Ok(Self::new(protocol, identifier))
            }
            _ => Err(format!(
                "store scope '{s}' must have the form <protocol>://<identifier>"
            )),
        }
    }
}

/// Query language understood by the search collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryLanguage {
    FullText,
}

/// Parameters of one candidate search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParameters {
    pub scope: StoreScope,
    pub language: QueryLanguage,
    pub query: String,
    /// Number of leading results to skip.
    pub skip_count: usize,
    /// Maximum number of results; `None` is unbounded.
    pub max_items: Option<usize>,
}

/// Result of a search. Must be closed once the caller is done with it.
pub trait ResultSet: Send {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entity_id(&self, index: usize) -> Option<EntityId>;

    /// Release the resources held by this result set.
    fn close(self: Box<Self>);
}

#[async_trait]
pub trait SearchService: Send + Sync {
    async fn query(&self, params: &SearchParameters) -> StoreResult<Box<dyn ResultSet>>;
}

/// Owner of entities and their revision histories.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn exists(&self, entity: &EntityId) -> StoreResult<bool>;

    /// Current history, or `None` if the entity is not versioned.
    async fn history(&self, entity: &EntityId) -> StoreResult<Option<RevisionHistory>>;

    async fn delete_revision(&self, entity: &EntityId, revision: &Revision) -> StoreResult<()>;
}

/// A unit of work run inside a transaction.
///
/// The runner may invoke `execute` several times when the transaction is
/// retried, so every invocation must start from scratch.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn execute(&self) -> StoreResult<()>;
}

#[async_trait]
pub trait TransactionService: Send + Sync {
    /// Whether the store currently rejects writes (maintenance mode).
    fn is_read_only(&self) -> bool;

    /// Run `work` transactionally, retrying on transient conflicts. Effects
    /// become visible to other processes only once this returns `Ok`.
    async fn run_in_transaction(
        &self,
        work: &dyn UnitOfWork,
        requires_new: bool,
    ) -> StoreResult<()>;
}

/// Cluster-wide named lock with a time-to-live.
#[async_trait]
pub trait LockService: Send + Sync {
    async fn acquire(&self, name: &str, ttl: Duration) -> Result<String, LockError>;

    async fn refresh(&self, token: &str, name: &str, ttl: Duration) -> Result<(), LockError>;

    async fn release(&self, token: &str, name: &str) -> Result<(), LockError>;
}

/// Hook invoked synchronously before each revision is deleted.
///
/// An error aborts the transaction of the entity being purged.
#[async_trait]
pub trait RevisionListener: Send + Sync {
    fn name(&self) -> &str;

    async fn before_delete(
        &self,
        history: &RevisionHistory,
        revision: &Revision,
    ) -> Result<(), StoreError>;
}
