//! Narrow repository seam over the four entity kinds.
//!
//! The engine talks to storage exclusively through [`EntityRepository`]:
//! id lookup, title-substring lookup, filtered listing, and single-record
//! writes, every call scoped to one [`UserId`]. The production persistence
//! layer lives outside this crate; [`MemoryRepository`] is the reference
//! backend, concurrent and snapshot-persistable, used by the CLI and tests.

pub mod mem;

pub use mem::MemoryRepository;

use chrono::{DateTime, Utc};

use crate::entity::{Entity, EntityId, EntityKind, Priority, UserId};
use crate::error::RepoError;
use crate::store::DurableStore;

/// Result type for repository operations.
pub type RepoResult<T> = std::result::Result<T, RepoError>;

/// Equality constraints of listing mode, already resolved to typed values.
///
/// A populated field a kind does not carry excludes that kind: a priority
/// filter never matches a note, a due-date window never matches a project.
/// The filter is a contract, not a hint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListFilter {
    /// Workflow status label; interpreted per kind (task statuses for tasks,
    /// lifecycle states for projects).
    pub status: Option<String>,
    pub priority: Option<Priority>,
    /// Membership in a project, by resolved id.
    pub project: Option<EntityId>,
    pub due_before: Option<DateTime<Utc>>,
    pub due_after: Option<DateTime<Utc>>,
}

impl ListFilter {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether `entity` satisfies every populated constraint.
    pub fn matches(&self, entity: &Entity) -> bool {
        if let Some(status) = &self.status {
            let ok = match entity {
                Entity::Task(t) => {
                    crate::entity::TaskStatus::from_label(status) == Some(t.status)
                }
                Entity::Project(p) => {
                    crate::entity::ProjectStatus::from_label(status) == Some(p.status)
                }
                Entity::Event(_) | Entity::Note(_) => false,
            };
            if !ok {
                return false;
            }
        }

        if let Some(priority) = self.priority {
            match entity {
                Entity::Task(t) if t.priority == priority => {}
                _ => return false,
            }
        }

        if let Some(project) = self.project {
            if entity.project_id() != Some(project) {
                return false;
            }
        }

        if self.due_before.is_some() || self.due_after.is_some() {
            // The window reads each kind's scheduling field; kinds without
            // one (notes, projects) fall outside any window.
            let when = match entity {
                Entity::Task(t) => t.due_at,
                Entity::Event(e) => Some(e.starts_at),
                Entity::Note(_) | Entity::Project(_) => None,
            };
            let Some(when) = when else { return false };
            if self.due_before.is_some_and(|bound| when > bound) {
                return false;
            }
            if self.due_after.is_some_and(|bound| when < bound) {
                return false;
            }
        }

        true
    }
}

/// Capability interface the engine requires of any storage backend.
///
/// Ownership is enforced on every call: no method ever returns a record whose
/// owner differs from the given user, and soft-deleted records are invisible
/// to every read.
pub trait EntityRepository: Send + Sync {
    /// Direct lookup by id. `None` when absent, deleted, or owned by someone
    /// else (indistinguishable on purpose).
    fn find_by_id(&self, user: &UserId, kind: EntityKind, id: EntityId)
    -> RepoResult<Option<Entity>>;

    /// All live records of `kind` whose title contains `needle`,
    /// case-insensitively. `needle` must already be lowercased.
    fn find_by_title_substring(
        &self,
        user: &UserId,
        kind: EntityKind,
        needle: &str,
    ) -> RepoResult<Vec<Entity>>;

    /// All live records of `kind` satisfying `filter`, in no defined order;
    /// callers sort.
    fn list_filtered(
        &self,
        user: &UserId,
        kind: EntityKind,
        filter: &ListFilter,
    ) -> RepoResult<Vec<Entity>>;

    /// Store a new record. Fails with [`RepoError::Conflict`] when the id is
    /// already taken.
    fn insert(&self, entity: Entity) -> RepoResult<()>;

    /// Replace an existing record in full, matched by owner, kind, and id.
    /// Returns whether a record was replaced.
    fn update(&self, entity: Entity) -> RepoResult<bool>;

    /// Tombstone a record. Returns the record as it stands after deletion,
    /// or `None` when there was nothing live to delete.
    fn soft_delete(
        &self,
        user: &UserId,
        kind: EntityKind,
        id: EntityId,
    ) -> RepoResult<Option<Entity>>;

    /// Number of live records of `kind`.
    fn count(&self, user: &UserId, kind: EntityKind) -> RepoResult<usize>;

    /// Write the full record set into the engine's durable store. Backends
    /// with their own persistence may no-op.
    fn persist(&self, store: &DurableStore) -> RepoResult<()> {
        let _ = store;
        Ok(())
    }

    /// Load records from the engine's durable store, returning how many were
    /// restored. Backends with their own persistence may no-op.
    fn restore(&self, store: &DurableStore) -> RepoResult<usize> {
        let _ = store;
        Ok(0)
    }
}
