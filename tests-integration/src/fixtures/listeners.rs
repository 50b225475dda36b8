use async_trait::async_trait;
use cleaner::store::RevisionListener;
use cleaner::{EntityId, InMemoryRepository, Revision, RevisionHistory, StoreError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// One notification received by a [`RecordingListener`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerCall {
    pub listener: String,
    pub entity: EntityId,
    pub label: String,
    /// Size of the history handed to the listener
    pub history_len: usize,
}

/// Records every notification into a log that may be shared between
/// listeners, so their relative order can be checked.
pub struct RecordingListener {
    name: String,
    calls: Arc<Mutex<Vec<ListenerCall>>>,
}

impl RecordingListener {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_log(name, Arc::new(Mutex::new(Vec::new())))
    }

    pub fn with_log(name: impl Into<String>, calls: Arc<Mutex<Vec<ListenerCall>>>) -> Self {
        Self {
            name: name.into(),
            calls,
        }
    }

    pub fn calls(&self) -> Vec<ListenerCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RevisionListener for RecordingListener {
    fn name(&self) -> &str {
        &self.name
    }

    async fn before_delete(
        &self,
        history: &RevisionHistory,
        revision: &Revision,
    ) -> Result<(), StoreError> {
        self.calls.lock().unwrap().push(ListenerCall {
            listener: self.name.clone(),
            entity: revision.entity.clone(),
            label: revision.label.clone(),
            history_len: history.len(),
        });
        Ok(())
    }
}

/// Rejects deletions of one entity from its `fail_on`-th notification on
/// (1-based); other entities pass through.
pub struct FailingListener {
    entity: EntityId,
    fail_on: usize,
    seen: AtomicUsize,
}

impl FailingListener {
    pub fn new(entity: EntityId, fail_on: usize) -> Self {
        Self {
            entity,
            fail_on: fail_on.max(1),
            seen: AtomicUsize::new(0),
        }
    }

    /// Notifications received for the watched entity, retries included
    pub fn seen(&self) -> usize {
        self.seen.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RevisionListener for FailingListener {
    fn name(&self) -> &str {
        "failing"
    }

    async fn before_delete(
        &self,
        _history: &RevisionHistory,
        revision: &Revision,
    ) -> Result<(), StoreError> {
        if revision.entity != self.entity {
            return Ok(());
        }

        let seen = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
        if seen >= self.fail_on {
            return Err(StoreError::Listener {
                listener: self.name().to_string(),
                message: format!("refusing to delete {}", revision.label),
            });
        }
        Ok(())
    }
}

/// Requests shutdown on the first notification.
pub struct CancellingListener {
    cancellation: CancellationToken,
}

impl CancellingListener {
    pub fn new(cancellation: CancellationToken) -> Self {
        Self { cancellation }
    }
}

#[async_trait]
impl RevisionListener for CancellingListener {
    fn name(&self) -> &str {
        "cancelling"
    }

    async fn before_delete(
        &self,
        _history: &RevisionHistory,
        _revision: &Revision,
    ) -> Result<(), StoreError> {
        self.cancellation.cancel();
        Ok(())
    }
}

/// Removes another entity from the repository on the first notification,
/// as a concurrent user deleting content mid-page would.
pub struct EntityRemovingListener {
    repository: Arc<InMemoryRepository>,
    target: EntityId,
}

impl EntityRemovingListener {
    pub fn new(repository: Arc<InMemoryRepository>, target: EntityId) -> Self {
        Self { repository, target }
    }
}

#[async_trait]
impl RevisionListener for EntityRemovingListener {
    fn name(&self) -> &str {
        "entity-removing"
    }

    async fn before_delete(
        &self,
        _history: &RevisionHistory,
        _revision: &Revision,
    ) -> Result<(), StoreError> {
        self.repository.remove_entity(&self.target);
        Ok(())
    }
}

/// Parks the first deletion until the test opens the gate.
#[derive(Default)]
pub struct GateListener {
    entered: Notify,
    opened: Notify,
    calls: AtomicUsize,
}

impl GateListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until a run is parked on the gate
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Let the parked run continue
    pub fn open(&self) {
        self.opened.notify_one();
    }
}

#[async_trait]
impl RevisionListener for GateListener {
    fn name(&self) -> &str {
        "gate"
    }

    async fn before_delete(
        &self,
        _history: &RevisionHistory,
        _revision: &Revision,
    ) -> Result<(), StoreError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.entered.notify_one();
            self.opened.notified().await;
        }
        Ok(())
    }
}
