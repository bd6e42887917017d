//! Dual-mode retrieval: structured listing and free-text search.
//!
//! Listing mode ([`QuerySpec`]) is pure filtered retrieval with a
//! deterministic sort; search mode ([`SearchSpec`]) adds case-insensitive
//! substring matching over each kind's textual fields. Both run their
//! per-kind sub-queries in parallel and merge into one [`GroupedResults`]
//! where every requested kind is present as an array, never null. An empty
//! listing is a legitimate "nothing matches"; an empty search is usually a
//! cue to list instead — that nudge is the dispatcher's job, not this
//! module's.

use rayon::prelude::*;
use serde_json::{Value, json};

use crate::entity::{Entity, EntityKind, UserId};
use crate::repo::{EntityRepository, ListFilter, RepoResult};
use crate::trace::TraceLog;

/// Limits applied per kind.
#[derive(Debug, Clone, Copy)]
pub struct QueryLimits {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 50,
        }
    }
}

impl QueryLimits {
    /// Clamp a caller-supplied limit into `1..=max`, defaulting when absent.
    pub fn clamp(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit)
    }
}

/// Sortable fields of listing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    UpdatedAt,
    CreatedAt,
    Title,
    /// Tasks sort by due date, events by start; kinds without a scheduling
    /// field sort last.
    DueDate,
}

impl SortField {
    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "updatedAt" => Some(Self::UpdatedAt),
            "createdAt" => Some(Self::CreatedAt),
            "title" => Some(Self::Title),
            "dueDate" => Some(Self::DueDate),
            _ => None,
        }
    }
}

/// Sort direction. Default: most recently updated first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// Listing-mode request: filters, sort, limit — no text matching.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub kinds: Vec<EntityKind>,
    pub filter: ListFilter,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    pub limit: usize,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            kinds: EntityKind::ALL.to_vec(),
            filter: ListFilter::default(),
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
            limit: QueryLimits::default().default_limit,
        }
    }
}

/// Search-mode request: a keyword plus the listing filters and limit.
#[derive(Debug, Clone)]
pub struct SearchSpec {
    pub query_text: String,
    pub kinds: Vec<EntityKind>,
    pub filter: ListFilter,
    pub limit: usize,
}

/// One result shape for both modes, grouped by kind.
///
/// Every one of the four kinds is always present; a kind that was not
/// requested (or matched nothing) contributes an empty list.
#[derive(Debug, Clone, Default)]
pub struct GroupedResults {
    pub task: Vec<Entity>,
    pub event: Vec<Entity>,
    pub note: Vec<Entity>,
    pub project: Vec<Entity>,
}

impl GroupedResults {
    pub fn of_kind(&self, kind: EntityKind) -> &[Entity] {
        match kind {
            EntityKind::Task => &self.task,
            EntityKind::Event => &self.event,
            EntityKind::Note => &self.note,
            EntityKind::Project => &self.project,
        }
    }

    fn of_kind_mut(&mut self, kind: EntityKind) -> &mut Vec<Entity> {
        match kind {
            EntityKind::Task => &mut self.task,
            EntityKind::Event => &mut self.event,
            EntityKind::Note => &mut self.note,
            EntityKind::Project => &mut self.project,
        }
    }

    /// Returned records across all kinds.
    pub fn total(&self) -> usize {
        EntityKind::ALL
            .iter()
            .map(|k| self.of_kind(*k).len())
            .sum()
    }

    /// The wire payload: `{task: [...], event: [...], note: [...],
    /// project: [...], total}`.
    pub fn to_json(&self) -> Value {
        json!({
            "task": self.task,
            "event": self.event,
            "note": self.note,
            "project": self.project,
            "total": self.total(),
        })
    }
}

/// Executes both retrieval modes against a repository.
pub struct QueryEngine<'a> {
    repo: &'a dyn EntityRepository,
    trace: &'a TraceLog,
}

impl<'a> QueryEngine<'a> {
    pub fn new(repo: &'a dyn EntityRepository, trace: &'a TraceLog) -> Self {
        Self { repo, trace }
    }

    /// Listing mode: filter, sort, cap — per kind, in parallel.
    pub fn list(&self, user: &UserId, spec: &QuerySpec) -> RepoResult<GroupedResults> {
        self.run(&spec.kinds, |kind| {
            let mut rows = self.repo.list_filtered(user, kind, &spec.filter)?;
            self.trace.query(kind, "list", rows.len());
            sort_entities(&mut rows, spec.sort_by, spec.sort_order);
            rows.truncate(spec.limit);
            Ok(rows)
        })
    }

    /// Search mode: the listing filters plus a substring match over each
    /// kind's textual fields. Results keep the default recency order.
    pub fn search(&self, user: &UserId, spec: &SearchSpec) -> RepoResult<GroupedResults> {
        let needle = spec.query_text.trim().to_lowercase();
        self.run(&spec.kinds, |kind| {
            let mut rows: Vec<Entity> = self
                .repo
                .list_filtered(user, kind, &spec.filter)?
                .into_iter()
                .filter(|e| e.matches_text(&needle))
                .collect();
            self.trace
                .query(kind, &format!("search `{needle}`"), rows.len());
            sort_entities(&mut rows, SortField::UpdatedAt, SortOrder::Desc);
            rows.truncate(spec.limit);
            Ok(rows)
        })
    }

    fn run<F>(&self, kinds: &[EntityKind], per_kind: F) -> RepoResult<GroupedResults>
    where
        F: Fn(EntityKind) -> RepoResult<Vec<Entity>> + Sync,
    {
        let per_kind_rows = kinds
            .par_iter()
            .map(|kind| per_kind(*kind).map(|rows| (*kind, rows)))
            .collect::<RepoResult<Vec<_>>>()?;

        let mut grouped = GroupedResults::default();
        for (kind, rows) in per_kind_rows {
            *grouped.of_kind_mut(kind) = rows;
        }
        Ok(grouped)
    }
}

/// Deterministic in-place sort: the requested key, ties broken by id so
/// identical queries return identical orderings.
fn sort_entities(rows: &mut [Entity], field: SortField, order: SortOrder) {
    rows.sort_by(|a, b| {
        let key = match field {
            SortField::UpdatedAt => a.updated_at().cmp(&b.updated_at()),
            SortField::CreatedAt => a.created_at().cmp(&b.created_at()),
            SortField::Title => a.title().to_lowercase().cmp(&b.title().to_lowercase()),
            SortField::DueDate => {
                let when = |e: &Entity| match e {
                    Entity::Task(t) => t.due_at,
                    Entity::Event(ev) => Some(ev.starts_at),
                    Entity::Note(_) | Entity::Project(_) => None,
                };
                // Undated records sort last in either direction.
                match (when(a), when(b)) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => return std::cmp::Ordering::Less,
                    (None, Some(_)) => return std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                }
            }
        };
        let key = match order {
            SortOrder::Asc => key,
            SortOrder::Desc => key.reverse(),
        };
        key.then_with(|| a.id().cmp(&b.id()))
    });
}
