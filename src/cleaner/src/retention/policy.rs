//! Per-entity retention algorithm.
//!
//! Two passes over a history sorted newest first:
//!
//! 1. **Count pass**: every revision past `max_versions_to_keep` is deleted.
//! 2. **Age pass**: on the history as it stands after the count pass, every
//!    revision past `min_versions_to_keep` whose frozen date is before the
//!    cutoff is deleted. Skipped when the count pass leaves at most
//!    `min_versions_to_keep` revisions.
//!
//! The purger applies the passes separately so that the age pass runs on
//! freshly re-read state; [`RetentionPolicy::select_for_deletion`] combines
//! them for callers that only need the decision.

use chrono::{DateTime, Duration, Utc};

use super::config::RetentionConfig;
use crate::config::ConfigError;
use crate::model::{Revision, RevisionHistory};

/// Retention bounds resolved against a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    max_versions_to_keep: usize,
    min_versions_to_keep: usize,
    cutoff: DateTime<Utc>,
}

impl RetentionPolicy {
    /// Build a policy from configuration, validating the bounds.
    pub fn new(config: &RetentionConfig, now: DateTime<Utc>) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            max_versions_to_keep: config.max_versions_to_keep as usize,
            min_versions_to_keep: config.min_versions_to_keep as usize,
            cutoff: compute_cutoff(config.max_days_to_keep, now),
        })
    }

    pub fn max_versions_to_keep(&self) -> usize {
        self.max_versions_to_keep
    }

    pub fn min_versions_to_keep(&self) -> usize {
        self.min_versions_to_keep
    }

    /// Revisions frozen strictly before this instant are old enough to delete.
    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    pub fn is_expired(&self, revision: &Revision) -> bool {
        revision.frozen_modified_date < self.cutoff
    }

    /// Count pass: the revisions beyond the `max_versions_to_keep` newest.
    pub fn select_excess(&self, history: &RevisionHistory) -> Vec<Revision> {
        history
            .newest_first()
            .into_iter()
            .skip(self.max_versions_to_keep)
            .collect()
    }

    /// Whether the age pass can delete anything once the count pass has run
    /// on a history of `original_len` revisions.
    pub fn needs_age_pass(&self, original_len: usize) -> bool {
        original_len.min(self.max_versions_to_keep) > self.min_versions_to_keep
    }

    /// Age pass: revisions beyond the `min_versions_to_keep` newest that are
    /// older than the cutoff.
    ///
    /// Every remaining revision is evaluated; the scan does not stop at the
    /// first revision younger than the cutoff.
    pub fn select_expired(&self, history: &RevisionHistory) -> Vec<Revision> {
        history
            .newest_first()
            .into_iter()
            .skip(self.min_versions_to_keep)
            .filter(|revision| self.is_expired(revision))
            .collect()
    }

    /// Both passes combined, the age pass evaluated against the state the
    /// count pass leaves behind.
    pub fn select_for_deletion(&self, history: &RevisionHistory) -> Vec<Revision> {
        let sorted = history.newest_first();
        let mut selected = self.select_excess(history);

        if !self.needs_age_pass(sorted.len()) {
            return selected;
        }

        let survivors = RevisionHistory::new(
            history.entity.clone(),
            sorted.into_iter().take(self.max_versions_to_keep).collect(),
        );
        selected.extend(self.select_expired(&survivors));
        selected
    }
}

/// `now - max_days_to_keep days`, with non-positive values clamped to `now`.
pub fn compute_cutoff(max_days_to_keep: i32, now: DateTime<Utc>) -> DateTime<Utc> {
    let days = i64::from(max_days_to_keep.max(0));
    now.checked_sub_signed(Duration::days(days))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Revisions of `history` to delete under `config` at `now`.
pub fn select_for_deletion(
    history: &RevisionHistory,
    config: &RetentionConfig,
    now: DateTime<Utc>,
) -> Result<Vec<Revision>, ConfigError> {
    Ok(RetentionPolicy::new(config, now)?.select_for_deletion(history))
}
