//! In-memory implementation of every collaborator.
//!
//! Backs the `run` command and the tests. Entities carry an index text that
//! the search matches clause by clause (`A AND B` matches when the index
//! contains both `A` and `B`). Deletions made inside a transaction are
//! journalled per task and restored on rollback, so concurrent transactions
//! on different entities do not interfere. Deletions made outside a
//! transaction auto-commit and are counted by
//! [`InMemoryRepository::auto_committed_deletions`].

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::config::VERSIONABLE_PREDICATE;
use crate::error::{LockError, StoreError, StoreResult};
use crate::model::{EntityId, Revision, RevisionHistory};
use crate::store::{
    HistoryStore, LockService, ResultSet, SearchParameters, SearchService, TransactionService,
    UnitOfWork,
};

/// Attempts made by the transaction runner before a conflict is surfaced.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

tokio::task_local! {
    static JOURNAL: Arc<Mutex<Vec<Revision>>>;
}

/// Serialisable contents of an [`InMemoryRepository`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositorySnapshot {
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub entities: Vec<EntitySnapshot>,
}

impl RepositorySnapshot {
    pub fn revision_count(&self) -> usize {
        self.entities
            .iter()
            .filter_map(|e| e.revisions.as_ref())
            .map(Vec::len)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    /// Text the search predicate is matched against.
    #[serde(default = "default_index")]
    pub index: String,
    /// `None` for entities that are not versioned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revisions: Option<Vec<RevisionSnapshot>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionSnapshot {
    pub label: String,
    pub frozen_modified_date: DateTime<Utc>,
}

fn default_index() -> String {
    VERSIONABLE_PREDICATE.to_string()
}

#[derive(Debug, Clone)]
struct EntityRecord {
    index: String,
    revisions: Option<Vec<Revision>>,
}

#[derive(Debug)]
struct HeldLock {
    token: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct RepositoryState {
    /// Search order; an id listed twice is returned twice.
    order: Vec<EntityId>,
    entities: HashMap<EntityId, EntityRecord>,
    locks: HashMap<String, HeldLock>,
    entity_failures: HashMap<EntityId, StoreError>,
    pending_conflicts: HashMap<EntityId, usize>,
    search_failures: HashMap<usize, StoreError>,
    searches: Vec<SearchParameters>,
    fail_lock_refresh: bool,
    fail_lock_release: bool,
}

/// Repository held entirely in memory.
#[derive(Debug)]
pub struct InMemoryRepository {
    state: Mutex<RepositoryState>,
    read_only: AtomicBool,
    max_attempts: usize,
    open_result_sets: Arc<AtomicUsize>,
    committed: AtomicUsize,
    rolled_back: AtomicUsize,
    auto_committed: AtomicUsize,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RepositoryState::default()),
            read_only: AtomicBool::new(false),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            open_result_sets: Arc::new(AtomicUsize::new(0)),
            committed: AtomicUsize::new(0),
            rolled_back: AtomicUsize::new(0),
            auto_committed: AtomicUsize::new(0),
        }
    }

    pub fn from_snapshot(snapshot: RepositorySnapshot) -> Self {
        let repo = Self::new();
        repo.set_read_only(snapshot.read_only);
        {
            let mut state = repo.lock_state();
            for entity in snapshot.entities {
                let revisions = entity.revisions.map(|revisions| {
                    revisions
                        .into_iter()
                        .map(|r| Revision::new(entity.id.clone(), r.label, r.frozen_modified_date))
                        .collect()
                });
                if !state.entities.contains_key(&entity.id) {
                    state.order.push(entity.id.clone());
                }
                state.entities.insert(
                    entity.id,
                    EntityRecord {
                        index: entity.index,
                        revisions,
                    },
                );
            }
        }
        repo
    }

    /// Current contents, entities in search order.
    pub fn snapshot(&self) -> RepositorySnapshot {
        let state = self.lock_state();
        let mut seen = HashSet::new();
        let entities = state
            .order
            .iter()
            .filter(|id| seen.insert(*id))
            .filter_map(|id| {
                state.entities.get(id).map(|record| EntitySnapshot {
                    id: id.clone(),
                    index: record.index.clone(),
                    revisions: record.revisions.as_ref().map(|revisions| {
                        revisions
                            .iter()
                            .map(|r| RevisionSnapshot {
                                label: r.label.clone(),
                                frozen_modified_date: r.frozen_modified_date,
                            })
                            .collect()
                    }),
                })
            })
            .collect();

        RepositorySnapshot {
            read_only: self.is_read_only(),
            entities,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Add an entity without revision history.
    pub fn insert_entity(&self, entity: EntityId, index: impl Into<String>) {
        let mut state = self.lock_state();
        if !state.entities.contains_key(&entity) {
            state.order.push(entity.clone());
        }
        state.entities.insert(
            entity,
            EntityRecord {
                index: index.into(),
                revisions: None,
            },
        );
    }

    /// Add a versionable entity with `count` revisions, the newest frozen at
    /// `newest` and each further one `step` older. Revisions are stored
    /// oldest first; the returned labels are newest first.
    pub fn insert_history(
        &self,
        entity: &EntityId,
        count: usize,
        newest: DateTime<Utc>,
        step: ChronoDuration,
    ) -> Vec<String> {
        let newest_first: Vec<Revision> = (0..count)
            .map(|i| {
                Revision::new(
                    entity.clone(),
                    format!("1.{}", count - 1 - i),
                    newest - step * i as i32,
                )
            })
            .collect();
        let labels = newest_first.iter().map(|r| r.label.clone()).collect();

        let mut state = self.lock_state();
        if !state.entities.contains_key(entity) {
            state.order.push(entity.clone());
        }
        state.entities.insert(
            entity.clone(),
            EntityRecord {
                index: default_index(),
                revisions: Some(newest_first.into_iter().rev().collect()),
            },
        );
        labels
    }

    /// Remove an entity, as if it had been deleted by another process.
    pub fn remove_entity(&self, entity: &EntityId) {
        let mut state = self.lock_state();
        state.entities.remove(entity);
    }

    /// List `entity` once more in search results.
    pub fn duplicate_in_search(&self, entity: &EntityId) {
        self.lock_state().order.push(entity.clone());
    }

    /// Make every history read and deletion of `entity` fail with `error`.
    pub fn fail_entity(&self, entity: &EntityId, error: StoreError) {
        self.lock_state()
            .entity_failures
            .insert(entity.clone(), error);
    }

    /// Make the next `count` deletions on `entity` fail with a conflict.
    pub fn inject_conflicts(&self, entity: &EntityId, count: usize) {
        self.lock_state()
            .pending_conflicts
            .insert(entity.clone(), count);
    }

    /// Make the search starting at `skip_count` fail with `error`.
    pub fn fail_search_at(&self, skip_count: usize, error: StoreError) {
        self.lock_state()
            .search_failures
            .insert(skip_count, error);
    }

    pub fn fail_lock_refresh(&self, fail: bool) {
        self.lock_state().fail_lock_refresh = fail;
    }

    pub fn fail_lock_release(&self, fail: bool) {
        self.lock_state().fail_lock_release = fail;
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock_state();
        state.entity_failures.clear();
        state.pending_conflicts.clear();
        state.search_failures.clear();
        state.fail_lock_refresh = false;
        state.fail_lock_release = false;
    }

    /// Every search executed so far, in order.
    pub fn searches(&self) -> Vec<SearchParameters> {
        self.lock_state().searches.clone()
    }

    pub fn open_result_sets(&self) -> usize {
        self.open_result_sets.load(Ordering::SeqCst)
    }

    pub fn committed_transactions(&self) -> usize {
        self.committed.load(Ordering::SeqCst)
    }

    pub fn rolled_back_transactions(&self) -> usize {
        self.rolled_back.load(Ordering::SeqCst)
    }

    /// Deletions made outside `run_in_transaction`. They take effect at once
    /// and are not undone by a later rollback.
    pub fn auto_committed_deletions(&self) -> usize {
        self.auto_committed.load(Ordering::SeqCst)
    }

    /// Whether `name` is currently held by an unexpired lock.
    pub fn is_locked(&self, name: &str) -> bool {
        let now = Instant::now();
        self.lock_state()
            .locks
            .get(name)
            .is_some_and(|held| held.expires_at > now)
    }

    fn lock_state(&self) -> MutexGuard<'_, RepositoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn rollback(&self, journal: &Mutex<Vec<Revision>>) {
        let deleted: Vec<Revision> = journal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();
        if deleted.is_empty() {
            return;
        }

        let mut state = self.lock_state();
        for revision in deleted.into_iter().rev() {
            if let Some(revisions) = state
                .entities
                .get_mut(&revision.entity)
                .and_then(|record| record.revisions.as_mut())
            {
                revisions.push(revision);
            }
        }
    }
}

fn matches_query(index: &str, query: &str) -> bool {
    query
        .split(" AND ")
        .map(str::trim)
        .filter(|clause| !clause.is_empty())
        .all(|clause| index.contains(clause))
}

/// Result set over a materialised list of ids.
struct MemoryResultSet {
    ids: Vec<EntityId>,
    open: Arc<AtomicUsize>,
}

impl ResultSet for MemoryResultSet {
    fn len(&self) -> usize {
        self.ids.len()
    }

    fn entity_id(&self, index: usize) -> Option<EntityId> {
        self.ids.get(index).cloned()
    }

    fn close(self: Box<Self>) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SearchService for InMemoryRepository {
    async fn query(&self, params: &SearchParameters) -> StoreResult<Box<dyn ResultSet>> {
        let mut state = self.lock_state();
        state.searches.push(params.clone());

        if let Some(error) = state.search_failures.get(&params.skip_count) {
            return Err(error.clone());
        }

        let ids: Vec<EntityId> = state
            .order
            .iter()
            .filter(|id| {
                state
                    .entities
                    .get(*id)
                    .is_some_and(|record| matches_query(&record.index, &params.query))
            })
            .skip(params.skip_count)
            .take(params.max_items.unwrap_or(usize::MAX))
            .cloned()
            .collect();

        self.open_result_sets.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryResultSet {
            ids,
            open: self.open_result_sets.clone(),
        }))
    }
}

#[async_trait]
impl HistoryStore for InMemoryRepository {
    async fn exists(&self, entity: &EntityId) -> StoreResult<bool> {
        Ok(self.lock_state().entities.contains_key(entity))
    }

    async fn history(&self, entity: &EntityId) -> StoreResult<Option<RevisionHistory>> {
        let state = self.lock_state();
        if let Some(error) = state.entity_failures.get(entity) {
            return Err(error.clone());
        }

        let record = state
            .entities
            .get(entity)
            .ok_or_else(|| StoreError::NotFound(entity.to_string()))?;
        Ok(record
            .revisions
            .as_ref()
            .map(|revisions| RevisionHistory::new(entity.clone(), revisions.clone())))
    }

    async fn delete_revision(&self, entity: &EntityId, revision: &Revision) -> StoreResult<()> {
        if self.is_read_only() {
            return Err(StoreError::ReadOnly);
        }

        let mut state = self.lock_state();
        if let Some(error) = state.entity_failures.get(entity) {
            return Err(error.clone());
        }
        if let Some(remaining) = state.pending_conflicts.get_mut(entity) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Conflict(format!(
                    "concurrent update of {entity}"
                )));
            }
        }

        let revisions = state
            .entities
            .get_mut(entity)
            .and_then(|record| record.revisions.as_mut())
            .ok_or_else(|| StoreError::NotFound(entity.to_string()))?;
        let position = revisions
            .iter()
            .position(|r| r.label == revision.label)
            .ok_or_else(|| StoreError::NotFound(format!("{entity} revision {}", revision.label)))?;
        let removed = revisions.remove(position);
        drop(state);

        // Outside `run_in_transaction` there is no journal: the deletion is
        // applied immediately (auto-commit) and can never be rolled back.
        let journalled = JOURNAL
            .try_with(|journal| {
                journal
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(removed.clone());
            })
            .is_ok();
        if !journalled {
            self.auto_committed.fetch_add(1, Ordering::SeqCst);
            debug!(
                entity = %entity,
                label = %removed.label,
                "Revision deleted outside a transaction, applied immediately"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionService for InMemoryRepository {
    fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    async fn run_in_transaction(
        &self,
        work: &dyn UnitOfWork,
        _requires_new: bool,
    ) -> StoreResult<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let journal = Arc::new(Mutex::new(Vec::new()));
            let result = JOURNAL.scope(journal.clone(), work.execute()).await;

            match result {
                Ok(()) => {
                    self.committed.fetch_add(1, Ordering::SeqCst);
                    return Ok(());
                }
                Err(e) => {
                    self.rollback(&journal);
                    self.rolled_back.fetch_add(1, Ordering::SeqCst);
                    if e.is_retryable() && attempt < self.max_attempts {
                        debug!(attempt, error = %e, "Retrying transaction after conflict");
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl LockService for InMemoryRepository {
    async fn acquire(&self, name: &str, ttl: Duration) -> Result<String, LockError> {
        let now = Instant::now();
        let mut state = self.lock_state();
        if state.locks.get(name).is_some_and(|held| held.expires_at > now) {
            return Err(LockError::Unavailable {
                name: name.to_string(),
            });
        }

        let token = uuid::Uuid::new_v4().to_string();
        state.locks.insert(
            name.to_string(),
            HeldLock {
                token: token.clone(),
                expires_at: now + ttl,
            },
        );
        Ok(token)
    }

    async fn refresh(&self, token: &str, name: &str, ttl: Duration) -> Result<(), LockError> {
        let now = Instant::now();
        let mut state = self.lock_state();
        if state.fail_lock_refresh {
            return Err(LockError::Backend("lock service unreachable".to_string()));
        }

        match state.locks.get_mut(name) {
            Some(held) if held.token == token && held.expires_at > now => {
                held.expires_at = now + ttl;
                Ok(())
            }
            _ => Err(LockError::NotHeld {
                name: name.to_string(),
                token: token.to_string(),
            }),
        }
    }

    async fn release(&self, token: &str, name: &str) -> Result<(), LockError> {
        let mut state = self.lock_state();
        if state.fail_lock_release {
            return Err(LockError::Backend("lock service unreachable".to_string()));
        }

        match state.locks.get(name) {
            Some(held) if held.token == token => {
                state.locks.remove(name);
                Ok(())
            }
            _ => Err(LockError::NotHeld {
                name: name.to_string(),
                token: token.to_string(),
            }),
        }
    }
}
