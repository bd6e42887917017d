//! Concurrent in-memory repository backed by DashMap.
//!
//! The reference [`EntityRepository`] backend: every record lives in a
//! sharded hashmap, ownership is checked on every access, and the whole
//! record set can be snapshotted into the durable store and restored on the
//! next start. Stands in for the external persistence layer in the CLI and
//! in tests.

use dashmap::DashMap;

use crate::entity::{Entity, EntityId, EntityKind, Event, Note, Project, Task, UserId};
use crate::error::RepoError;
use crate::repo::{EntityRepository, ListFilter, RepoResult};
use crate::store::DurableStore;

/// Key prefix for snapshot entries in the durable store.
const SNAPSHOT_PREFIX: &str = "ent:";

/// Concurrent in-memory entity store.
pub struct MemoryRepository {
    entries: DashMap<EntityId, Entity>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Total records held, tombstoned ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn owned_live(entity: &Entity, user: &UserId, kind: EntityKind) -> bool {
        entity.user_id() == user && entity.kind() == kind && !entity.is_deleted()
    }

    fn encode(entity: &Entity) -> RepoResult<Vec<u8>> {
        // Concrete structs go through bincode; the tagged `Entity` wrapper is
        // a wire-only shape.
        let encoded = match entity {
            Entity::Task(t) => bincode::serialize(t),
            Entity::Event(e) => bincode::serialize(e),
            Entity::Note(n) => bincode::serialize(n),
            Entity::Project(p) => bincode::serialize(p),
        };
        encoded.map_err(|e| RepoError::Serialization {
            message: format!("failed to serialize entity: {e}"),
        })
    }

    fn decode(kind: EntityKind, raw: &[u8]) -> RepoResult<Entity> {
        let corrupt = |e: bincode::Error| RepoError::Serialization {
            message: format!("failed to deserialize {kind} snapshot: {e}"),
        };
        Ok(match kind {
            EntityKind::Task => Entity::Task(bincode::deserialize::<Task>(raw).map_err(corrupt)?),
            EntityKind::Event => {
                Entity::Event(bincode::deserialize::<Event>(raw).map_err(corrupt)?)
            }
            EntityKind::Note => Entity::Note(bincode::deserialize::<Note>(raw).map_err(corrupt)?),
            EntityKind::Project => {
                Entity::Project(bincode::deserialize::<Project>(raw).map_err(corrupt)?)
            }
        })
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRepository")
            .field("count", &self.len())
            .finish()
    }
}

impl EntityRepository for MemoryRepository {
    fn find_by_id(
        &self,
        user: &UserId,
        kind: EntityKind,
        id: EntityId,
    ) -> RepoResult<Option<Entity>> {
        Ok(self
            .entries
            .get(&id)
            .filter(|entry| Self::owned_live(entry.value(), user, kind))
            .map(|entry| entry.value().clone()))
    }

    fn find_by_title_substring(
        &self,
        user: &UserId,
        kind: EntityKind,
        needle: &str,
    ) -> RepoResult<Vec<Entity>> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| Self::owned_live(entry.value(), user, kind))
            .filter(|entry| entry.value().title().to_lowercase().contains(needle))
            .map(|entry| entry.value().clone())
            .collect())
    }

    fn list_filtered(
        &self,
        user: &UserId,
        kind: EntityKind,
        filter: &ListFilter,
    ) -> RepoResult<Vec<Entity>> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| Self::owned_live(entry.value(), user, kind))
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect())
    }

    fn insert(&self, entity: Entity) -> RepoResult<()> {
        let id = entity.id();
        match self.entries.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(RepoError::Conflict {
                message: format!("entity {id} already exists"),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(entity);
                Ok(())
            }
        }
    }

    fn update(&self, entity: Entity) -> RepoResult<bool> {
        let Some(mut existing) = self.entries.get_mut(&entity.id()) else {
            return Ok(false);
        };
        if !Self::owned_live(existing.value(), entity.user_id(), entity.kind()) {
            return Ok(false);
        }
        *existing.value_mut() = entity;
        Ok(true)
    }

    fn soft_delete(
        &self,
        user: &UserId,
        kind: EntityKind,
        id: EntityId,
    ) -> RepoResult<Option<Entity>> {
        let Some(mut existing) = self.entries.get_mut(&id) else {
            return Ok(None);
        };
        if !Self::owned_live(existing.value(), user, kind) {
            return Ok(None);
        }
        existing.value_mut().tombstone();
        Ok(Some(existing.value().clone()))
    }

    fn count(&self, user: &UserId, kind: EntityKind) -> RepoResult<usize> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| Self::owned_live(entry.value(), user, kind))
            .count())
    }

    /// Snapshot every record (tombstones included, so trash survives a
    /// restart) as `ent:{kind}:{id}` → bincode, in one batch transaction.
    fn persist(&self, store: &DurableStore) -> RepoResult<()> {
        let mut batch = Vec::with_capacity(self.entries.len());
        for entry in self.entries.iter() {
            let entity = entry.value();
            let key = format!("{SNAPSHOT_PREFIX}{}:{}", entity.kind(), entity.id());
            batch.push((key.into_bytes(), Self::encode(entity)?));
        }
        store.put_batch(&batch)?;
        Ok(())
    }

    /// Load a snapshot back. Meant for an empty repository at startup;
    /// records already present are overwritten by id.
    fn restore(&self, store: &DurableStore) -> RepoResult<usize> {
        let entries = store.scan_prefix(SNAPSHOT_PREFIX.as_bytes())?;
        let mut restored = 0;
        for (key, value) in entries {
            let key = String::from_utf8_lossy(&key);
            let kind = key
                .strip_prefix(SNAPSHOT_PREFIX)
                .and_then(|rest| rest.split(':').next())
                .and_then(EntityKind::from_label)
                .ok_or_else(|| RepoError::Serialization {
                    message: format!("malformed snapshot key `{key}`"),
                })?;
            let entity = Self::decode(kind, &value)?;
            self.entries.insert(entity.id(), entity);
            restored += 1;
        }
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::TaskStatus;
    use tempfile::TempDir;

    fn owner() -> UserId {
        UserId::new("u-1")
    }

    fn other() -> UserId {
        UserId::new("u-2")
    }

    fn task(user: &UserId, title: &str) -> Entity {
        Entity::Task(Task::new(user.clone(), title))
    }

    #[test]
    fn insert_and_find_by_id() {
        let repo = MemoryRepository::new();
        let ent = task(&owner(), "Buy milk");
        let id = ent.id();
        repo.insert(ent).unwrap();

        let found = repo.find_by_id(&owner(), EntityKind::Task, id).unwrap();
        assert_eq!(found.unwrap().title(), "Buy milk");
    }

    #[test]
    fn duplicate_insert_conflicts() {
        let repo = MemoryRepository::new();
        let ent = task(&owner(), "Buy milk");
        repo.insert(ent.clone()).unwrap();
        let err = repo.insert(ent).unwrap_err();
        assert!(matches!(err, RepoError::Conflict { .. }));
    }

    #[test]
    fn cross_user_lookups_come_back_empty() {
        let repo = MemoryRepository::new();
        let ent = task(&owner(), "Secret plan");
        let id = ent.id();
        repo.insert(ent).unwrap();

        assert!(
            repo.find_by_id(&other(), EntityKind::Task, id)
                .unwrap()
                .is_none()
        );
        assert!(
            repo.find_by_title_substring(&other(), EntityKind::Task, "secret")
                .unwrap()
                .is_empty()
        );
        assert_eq!(repo.count(&other(), EntityKind::Task).unwrap(), 0);
    }

    #[test]
    fn kind_scoping_is_enforced() {
        let repo = MemoryRepository::new();
        let ent = task(&owner(), "Buy milk");
        let id = ent.id();
        repo.insert(ent).unwrap();
        assert!(
            repo.find_by_id(&owner(), EntityKind::Note, id)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn title_substring_is_case_insensitive() {
        let repo = MemoryRepository::new();
        repo.insert(task(&owner(), "Team Meeting Prep")).unwrap();
        repo.insert(task(&owner(), "Buy milk")).unwrap();

        let hits = repo
            .find_by_title_substring(&owner(), EntityKind::Task, "meeting")
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title(), "Team Meeting Prep");
    }

    #[test]
    fn soft_delete_hides_from_all_reads() {
        let repo = MemoryRepository::new();
        let ent = task(&owner(), "Old chore");
        let id = ent.id();
        repo.insert(ent).unwrap();

        let deleted = repo.soft_delete(&owner(), EntityKind::Task, id).unwrap();
        assert!(deleted.unwrap().is_deleted());

        assert!(
            repo.find_by_id(&owner(), EntityKind::Task, id)
                .unwrap()
                .is_none()
        );
        assert!(
            repo.find_by_title_substring(&owner(), EntityKind::Task, "chore")
                .unwrap()
                .is_empty()
        );
        assert_eq!(repo.count(&owner(), EntityKind::Task).unwrap(), 0);

        // A second delete finds nothing live.
        assert!(
            repo.soft_delete(&owner(), EntityKind::Task, id)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn update_replaces_owned_records_only() {
        let repo = MemoryRepository::new();
        let ent = task(&owner(), "Draft report");
        let id = ent.id();
        repo.insert(ent.clone()).unwrap();

        let mut changed = ent.clone();
        if let Entity::Task(t) = &mut changed {
            t.set_status(TaskStatus::Done);
        }
        assert!(repo.update(changed).unwrap());
        let stored = repo
            .find_by_id(&owner(), EntityKind::Task, id)
            .unwrap()
            .unwrap();
        assert!(matches!(stored, Entity::Task(t) if t.status == TaskStatus::Done));

        // Same id claimed by a different user never lands.
        let mut stolen = ent;
        if let Entity::Task(t) = &mut stolen {
            t.user_id = other();
        }
        assert!(!repo.update(stolen).unwrap());
    }

    #[test]
    fn list_filtered_applies_constraints() {
        let repo = MemoryRepository::new();
        let mut urgent = Task::new(owner(), "Pay taxes");
        urgent.priority = crate::entity::Priority::Urgent;
        repo.insert(Entity::Task(urgent)).unwrap();
        repo.insert(task(&owner(), "Water plants")).unwrap();

        let filter = ListFilter {
            priority: Some(crate::entity::Priority::Urgent),
            ..Default::default()
        };
        let hits = repo
            .list_filtered(&owner(), EntityKind::Task, &filter)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title(), "Pay taxes");
    }

    #[test]
    fn concurrent_inserts_from_many_threads() {
        use std::sync::Arc;
        let repo = Arc::new(MemoryRepository::new());
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let repo = Arc::clone(&repo);
                std::thread::spawn(move || {
                    let user = UserId::new(format!("u-{}", i % 4));
                    repo.insert(Entity::Task(Task::new(user, format!("t{i}"))))
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(repo.len(), 32);
        assert_eq!(repo.count(&UserId::new("u-0"), EntityKind::Task).unwrap(), 8);
    }

    #[test]
    fn snapshot_round_trip_preserves_records_and_tombstones() {
        let dir = TempDir::new().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();

        let repo = MemoryRepository::new();
        let keep = task(&owner(), "Keep me");
        let trash = task(&owner(), "Trash me");
        let trash_id = trash.id();
        let keep_id = keep.id();
        repo.insert(keep).unwrap();
        repo.insert(trash).unwrap();
        repo.insert(Entity::Note(Note::new(owner(), "Standup notes")))
            .unwrap();
        repo.soft_delete(&owner(), EntityKind::Task, trash_id).unwrap();
        repo.persist(&store).unwrap();

        let restored = MemoryRepository::new();
        assert_eq!(restored.restore(&store).unwrap(), 3);
        assert!(
            restored
                .find_by_id(&owner(), EntityKind::Task, keep_id)
                .unwrap()
                .is_some()
        );
        // The tombstone came back as a tombstone.
        assert!(
            restored
                .find_by_id(&owner(), EntityKind::Task, trash_id)
                .unwrap()
                .is_none()
        );
        assert_eq!(restored.len(), 3);
        assert_eq!(restored.count(&owner(), EntityKind::Task).unwrap(), 1);
        assert_eq!(restored.count(&owner(), EntityKind::Note).unwrap(), 1);
    }
}
