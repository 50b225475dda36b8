//! Cluster-wide run lock.
//!
//! Only one cleanup run may be active across the cluster. The lock is
//! acquired once per run, refreshed lazily between pages and always released
//! when the run ends.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::LockError;
use crate::metrics::CleanupMetrics;
use crate::store::LockService;

/// Credential returned by the lock service, with the instant it was last
/// confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LockToken {
    token: String,
    refreshed_at: Instant,
}

impl LockToken {
    fn new(token: String) -> Self {
        Self {
            token,
            refreshed_at: Instant::now(),
        }
    }

    fn age(&self) -> Duration {
        self.refreshed_at.elapsed()
    }
}

/// Named lock with a fixed time-to-live, owned by a single run.
pub struct RunLock {
    service: Arc<dyn LockService>,
    name: String,
    ttl: Duration,
    token: Option<LockToken>,
    metrics: CleanupMetrics,
}

impl RunLock {
    pub fn new(
        service: Arc<dyn LockService>,
        name: impl Into<String>,
        ttl: Duration,
        metrics: CleanupMetrics,
    ) -> Self {
        Self {
            service,
            name: name.into(),
            ttl,
            token: None,
            metrics,
        }
    }

    pub fn is_held(&self) -> bool {
        self.token.is_some()
    }

    /// Acquire the lock. Fails with [`LockError::Unavailable`] while another
    /// process holds it.
    pub async fn acquire(&mut self) -> Result<(), LockError> {
        let token = self.service.acquire(&self.name, self.ttl).await?;
        info!(lock = %self.name, ttl = ?self.ttl, "Acquired run lock");
        self.token = Some(LockToken::new(token));
        Ok(())
    }

    /// Refresh the lock if the token is older than half its time-to-live.
    ///
    /// Returns whether the lock service was contacted.
    pub async fn refresh(&mut self) -> Result<bool, LockError> {
        let Some(token) = self.token.as_mut() else {
            return Err(LockError::NotHeld {
                name: self.name.clone(),
                token: String::new(),
            });
        };

        if token.age() <= self.ttl / 2 {
            return Ok(false);
        }

        self.service
            .refresh(&token.token, &self.name, self.ttl)
            .await?;
        token.refreshed_at = Instant::now();
        self.metrics.record_lock_refresh();
        debug!(lock = %self.name, "Refreshed run lock");
        Ok(true)
    }

    /// Release the lock. The local token is cleared even if the lock service
    /// call fails; the lock then expires with its time-to-live.
    pub async fn release(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };

        match self.service.release(&token.token, &self.name).await {
            Ok(()) => info!(lock = %self.name, "Released run lock"),
            Err(e) => warn!(
                lock = %self.name,
                error = %e,
                "Failed to release run lock, it will expire with its TTL"
            ),
        }
    }
}

/// A lock still held when its run is dropped (task aborted, timed out) is
/// released from a background task instead of waiting out its TTL.
impl Drop for RunLock {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                lock = %self.name,
                "No runtime to release run lock, it will expire with its TTL"
            );
            return;
        };

        warn!(lock = %self.name, "Run dropped while holding the lock, releasing it");
        let service = self.service.clone();
        let name = std::mem::take(&mut self.name);
        runtime.spawn(async move {
            match service.release(&token.token, &name).await {
                Ok(()) => info!(lock = %name, "Released run lock"),
                Err(e) => warn!(
                    lock = %name,
                    error = %e,
                    "Failed to release run lock, it will expire with its TTL"
                ),
            }
        });
    }
}
