//! Cleanup job configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::retention::config::{RetentionConfig, RetentionWarning};
use crate::store::StoreScope;

/// Base predicate selecting versionable entities.
pub const VERSIONABLE_PREDICATE: &str = "ASPECT:\"versionable\"";

/// Name of the cluster-wide lock guarding cleanup runs.
pub const DEFAULT_LOCK_NAME: &str = "revision-cleaner";

/// Complete configuration of a cleanup job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Count- and age-based retention bounds.
    #[serde(flatten)]
    pub retention: RetentionConfig,

    /// Number of candidate entities fetched and processed per page.
    pub page_size: usize,

    /// Number of concurrent workers purging entities within a page.
    pub worker_count: usize,

    /// Fragment appended to the base predicate to narrow the candidates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_limiter: Option<String>,

    /// Store the candidate search runs against.
    pub store_scope: StoreScope,

    /// Name of the cluster-wide run lock.
    pub lock_name: String,

    /// Time-to-live of the run lock.
    #[serde(with = "humantime_serde")]
    pub lock_ttl: Duration,

    /// Log the revisions that would be deleted without deleting them.
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            retention: RetentionConfig::default(),
            page_size: 50_000,
            worker_count: 2,
            search_limiter: None,
            store_scope: StoreScope::default(),
            lock_name: DEFAULT_LOCK_NAME.to_string(),
            lock_ttl: Duration::from_secs(2 * 3600),
            dry_run: false,
        }
    }
}

impl From<&common::config::CleanerConfig> for CleanupConfig {
    fn from(config: &common::config::CleanerConfig) -> Self {
        Self {
            retention: RetentionConfig {
                max_versions_to_keep: config.max_versions_to_keep,
                min_versions_to_keep: config.min_versions_to_keep,
                max_days_to_keep: config.max_days_to_keep,
            },
            page_size: config.page_size,
            worker_count: config.worker_count,
            search_limiter: config.search_limiter.clone(),
            store_scope: StoreScope::new(
                config.store_protocol.clone(),
                config.store_identifier.clone(),
            ),
            lock_name: config.lock_name.clone(),
            lock_ttl: config.lock_ttl,
            dry_run: config.dry_run,
        }
    }
}

impl CleanupConfig {
    pub fn with_max_versions_to_keep(mut self, max_versions_to_keep: i32) -> Self {
        self.retention.max_versions_to_keep = max_versions_to_keep;
        self
    }

    pub fn with_min_versions_to_keep(mut self, min_versions_to_keep: i32) -> Self {
        self.retention.min_versions_to_keep = min_versions_to_keep;
        self
    }

    pub fn with_max_days_to_keep(mut self, max_days_to_keep: i32) -> Self {
        self.retention.max_days_to_keep = max_days_to_keep;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_search_limiter(mut self, search_limiter: impl Into<String>) -> Self {
        self.search_limiter = Some(search_limiter.into());
        self
    }

    pub fn with_lock_ttl(mut self, lock_ttl: Duration) -> Self {
        self.lock_ttl = lock_ttl;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Base predicate with the optional limiter appended.
    pub fn search_query(&self) -> String {
        match &self.search_limiter {
            Some(limiter) => format!("{VERSIONABLE_PREDICATE}{limiter}"),
            None => VERSIONABLE_PREDICATE.to_string(),
        }
    }

    /// Validate the configuration, returning warnings for legal but
    /// destructive settings.
    pub fn validate(&self) -> Result<Vec<RetentionWarning>, ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::NotPositive { field: "page_size" });
        }
        if self.worker_count == 0 {
            return Err(ConfigError::NotPositive {
                field: "worker_count",
            });
        }
        if self.lock_ttl.is_zero() {
            return Err(ConfigError::NotPositive { field: "lock_ttl" });
        }
        if self.lock_name.trim().is_empty() {
            return Err(ConfigError::EmptyLockName);
        }
        self.retention.validate()
    }
}

/// Errors that can occur during configuration validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A version count is negative.
    #[error("Property '{field}' must be 0 or greater, got {value}")]
    NegativeVersionCount { field: &'static str, value: i32 },

    /// `min_versions_to_keep` exceeds `max_versions_to_keep`.
    #[error(
        "Property 'min_versions_to_keep' ({min}) must not be greater than 'max_versions_to_keep' ({max})"
    )]
    MinExceedsMax { min: i32, max: i32 },

    /// A size, count or duration that must be positive is zero.
    #[error("Property '{field}' must be positive")]
    NotPositive { field: &'static str },

    /// The run lock has no name.
    #[error("Property 'lock_name' must not be empty")]
    EmptyLockName,
}
