use chrono::{DateTime, Duration, Utc};
use cleaner::memory::{EntitySnapshot, RevisionSnapshot};
use cleaner::{EntityId, InMemoryRepository, RepositorySnapshot};

/// Builds entities with evenly spaced revision histories.
///
/// Entity ids are `<prefix>-000`, `<prefix>-001`, ... The newest revision of
/// every entity is `newest_age` old and each older one is `step` further in
/// the past. Labels run `1.0` (oldest) to `1.<n-1>` (newest).
#[derive(Debug, Clone)]
pub struct HistoryGenerator {
    prefix: String,
    entities: usize,
    revisions: usize,
    newest_age: Duration,
    step: Duration,
}

impl HistoryGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            entities: 1,
            revisions: 1,
            newest_age: Duration::hours(1),
            step: Duration::hours(1),
        }
    }

    pub fn entities(mut self, entities: usize) -> Self {
        self.entities = entities;
        self
    }

    pub fn revisions(mut self, revisions: usize) -> Self {
        self.revisions = revisions;
        self
    }

    pub fn newest_age(mut self, newest_age: Duration) -> Self {
        self.newest_age = newest_age;
        self
    }

    pub fn step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    /// Ids of the generated entities, in search order
    pub fn entity_ids(&self) -> Vec<EntityId> {
        (0..self.entities)
            .map(|i| EntityId::new(format!("{}-{i:03}", self.prefix)))
            .collect()
    }

    /// Insert the histories into `repository`
    pub fn populate(&self, repository: &InMemoryRepository) -> Vec<EntityId> {
        let newest = self.newest(Utc::now());
        let ids = self.entity_ids();
        for id in &ids {
            repository.insert_history(id, self.revisions, newest, self.step);
        }
        ids
    }

    /// Serialisable snapshot holding the histories
    pub fn snapshot(&self) -> RepositorySnapshot {
        let newest = self.newest(Utc::now());
        let entities = self
            .entity_ids()
            .into_iter()
            .map(|id| EntitySnapshot {
                id,
                index: cleaner::config::VERSIONABLE_PREDICATE.to_string(),
                revisions: Some(
                    (0..self.revisions)
                        .map(|i| RevisionSnapshot {
                            label: format!("1.{i}"),
                            frozen_modified_date: newest
                                - self.step * (self.revisions - 1 - i) as i32,
                        })
                        .collect(),
                ),
            })
            .collect();

        RepositorySnapshot {
            read_only: false,
            entities,
        }
    }

    fn newest(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.newest_age
    }
}
