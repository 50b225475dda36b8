//! Core data model: versionable entities and their revision histories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, stable identifier of a versionable entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One immutable historical snapshot of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    /// Owning entity.
    pub entity: EntityId,
    /// Revision label ("1.0", "1.1", ...). Not guaranteed to sort numerically.
    pub label: String,
    /// Instant at which this revision became historical. The only ordering key.
    pub frozen_modified_date: DateTime<Utc>,
}

impl Revision {
    pub fn new(
        entity: EntityId,
        label: impl Into<String>,
        frozen_modified_date: DateTime<Utc>,
    ) -> Self {
        Self {
            entity,
            label: label.into(),
            frozen_modified_date,
        }
    }
}

/// All revisions of one entity, unordered at rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionHistory {
    pub entity: EntityId,
    pub revisions: Vec<Revision>,
}

impl RevisionHistory {
    pub fn new(entity: EntityId, revisions: Vec<Revision>) -> Self {
        Self { entity, revisions }
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    /// Revisions ordered newest first. The sort is stable, so revisions with
    /// equal dates keep their stored relative order.
    pub fn newest_first(&self) -> Vec<Revision> {
        let mut revisions = self.revisions.clone();
        revisions.sort_by(|a, b| b.frozen_modified_date.cmp(&a.frozen_modified_date));
        revisions
    }
}
