//! Core entity types for the amanu engine.
//!
//! The engine operates on four first-class record kinds: [`Task`], [`Event`],
//! [`Note`], and [`Project`]. The closed [`Entity`] enum ties them together so
//! dispatch over kinds is exhaustiveness-checked at compile time. [`EntityRef`]
//! is the ephemeral product of resolution, valid only within one dispatch.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════

/// Unique identifier for an entity record (UUID v4 under the hood).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Mint a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from string syntax.
    ///
    /// Returns `None` when `s` is not well-formed UUID text. The resolver
    /// relies on this to distinguish "direct lookup" from "free text".
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }

    /// Get the underlying UUID.
    pub fn get(self) -> Uuid {
        self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the record owner, validated upstream of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A blank user id means no authenticated session reached us.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one model conversation; scopes short-term memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Kinds & enums
// ═══════════════════════════════════════════════════════════════════════

/// The closed set of record kinds the engine operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Task,
    Event,
    Note,
    Project,
}

impl EntityKind {
    /// All kinds, in canonical order.
    pub const ALL: [EntityKind; 4] = [Self::Task, Self::Event, Self::Note, Self::Project];

    /// Serialize to the wire label.
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Event => "event",
            Self::Note => "note",
            Self::Project => "project",
        }
    }

    /// Parse from label (case-insensitive, plural tolerated).
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "task" | "tasks" => Some(Self::Task),
            "event" | "events" => Some(Self::Event),
            "note" | "notes" => Some(Self::Note),
            "project" | "projects" => Some(Self::Project),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Workflow state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }

    /// Parse from label (case-insensitive).
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "todo" | "open" => Some(Self::Todo),
            "in_progress" | "in-progress" | "doing" => Some(Self::InProgress),
            "done" | "completed" => Some(Self::Done),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Task urgency. Variant order defines aggregation order (low to urgent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Self::Low, Self::Medium, Self::High, Self::Urgent];

    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "normal" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" | "critical" => Some(Self::Urgent),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Lifecycle state of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Archived,
}

impl ProjectStatus {
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "archived" | "archive" => Some(Self::Archived),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Records
// ═══════════════════════════════════════════════════════════════════════

/// An actionable to-do item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: EntityId,
    pub user_id: UserId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    /// Owning project, when the task belongs to one.
    #[serde(default)]
    pub project_id: Option<EntityId>,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    /// Set exactly when status transitions to done, cleared when it leaves.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(user_id: UserId, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            user_id,
            title: title.into(),
            description: None,
            status: TaskStatus::Todo,
            priority: Priority::Medium,
            project_id: None,
            due_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Apply a status change, keeping `completed_at` in sync.
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.completed_at = match status {
            TaskStatus::Done => Some(Utc::now()),
            _ => None,
        };
    }
}

/// A scheduled calendar item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EntityId,
    pub user_id: UserId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub project_id: Option<EntityId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Event {
    pub fn new(user_id: UserId, title: impl Into<String>, starts_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            user_id,
            title: title.into(),
            description: None,
            location: None,
            starts_at,
            ends_at: None,
            project_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// Free-form text capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: EntityId,
    pub user_id: UserId,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub project_id: Option<EntityId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Note {
    pub fn new(user_id: UserId, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            user_id,
            title: title.into(),
            content: None,
            project_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// A grouping of related tasks, events, and notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: EntityId,
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Project {
    pub fn new(user_id: UserId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            user_id,
            name: name.into(),
            description: None,
            status: ProjectStatus::Active,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// The closed variant over all four kinds
// ═══════════════════════════════════════════════════════════════════════

/// Any record the engine can resolve or return.
///
/// Internally tagged so wire payloads carry `"kind": "task"` etc. Adding a
/// fifth kind is a compile-time exhaustiveness gap in every match below,
/// never a silent runtime miss.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Entity {
    Task(Task),
    Event(Event),
    Note(Note),
    Project(Project),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Task(_) => EntityKind::Task,
            Self::Event(_) => EntityKind::Event,
            Self::Note(_) => EntityKind::Note,
            Self::Project(_) => EntityKind::Project,
        }
    }

    pub fn id(&self) -> EntityId {
        match self {
            Self::Task(t) => t.id,
            Self::Event(e) => e.id,
            Self::Note(n) => n.id,
            Self::Project(p) => p.id,
        }
    }

    pub fn user_id(&self) -> &UserId {
        match self {
            Self::Task(t) => &t.user_id,
            Self::Event(e) => &e.user_id,
            Self::Note(n) => &n.user_id,
            Self::Project(p) => &p.user_id,
        }
    }

    /// Display title (projects use their name).
    pub fn title(&self) -> &str {
        match self {
            Self::Task(t) => &t.title,
            Self::Event(e) => &e.title,
            Self::Note(n) => &n.title,
            Self::Project(p) => &p.name,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Task(t) => t.created_at,
            Self::Event(e) => e.created_at,
            Self::Note(n) => n.created_at,
            Self::Project(p) => p.created_at,
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            Self::Task(t) => t.updated_at,
            Self::Event(e) => e.updated_at,
            Self::Note(n) => n.updated_at,
            Self::Project(p) => p.updated_at,
        }
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Task(t) => t.deleted_at,
            Self::Event(e) => e.deleted_at,
            Self::Note(n) => n.deleted_at,
            Self::Project(p) => p.deleted_at,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }

    /// Bump the modification timestamp.
    pub fn touch(&mut self) {
        let now = Utc::now();
        match self {
            Self::Task(t) => t.updated_at = now,
            Self::Event(e) => e.updated_at = now,
            Self::Note(n) => n.updated_at = now,
            Self::Project(p) => p.updated_at = now,
        }
    }

    /// Mark soft-deleted. Returns false when already tombstoned.
    pub fn tombstone(&mut self) -> bool {
        if self.is_deleted() {
            return false;
        }
        let now = Utc::now();
        match self {
            Self::Task(t) => t.deleted_at = Some(now),
            Self::Event(e) => e.deleted_at = Some(now),
            Self::Note(n) => n.deleted_at = Some(now),
            Self::Project(p) => p.deleted_at = Some(now),
        }
        self.touch();
        true
    }

    /// The project this record belongs to, where the kind supports one.
    pub fn project_id(&self) -> Option<EntityId> {
        match self {
            Self::Task(t) => t.project_id,
            Self::Event(e) => e.project_id,
            Self::Note(n) => n.project_id,
            Self::Project(_) => None,
        }
    }

    /// Case-insensitive substring test over the kind's textual fields.
    ///
    /// `needle` must already be lowercased by the caller; each record
    /// lowercases its own fields here. Title/name always participates;
    /// description, note content, and event location where present.
    pub fn matches_text(&self, needle: &str) -> bool {
        let hit = |field: &str| field.to_lowercase().contains(needle);
        let opt_hit = |field: &Option<String>| field.as_deref().is_some_and(|f| hit(f));
        match self {
            Self::Task(t) => hit(&t.title) || opt_hit(&t.description),
            Self::Event(e) => hit(&e.title) || opt_hit(&e.description) || opt_hit(&e.location),
            Self::Note(n) => hit(&n.title) || opt_hit(&n.content),
            Self::Project(p) => hit(&p.name) || opt_hit(&p.description),
        }
    }

    /// One short field that tells look-alike candidates apart.
    ///
    /// Tasks differ by workflow status, events by start time, notes by last
    /// edit, projects by lifecycle state.
    pub fn distinguishing_field(&self) -> String {
        match self {
            Self::Task(t) => match t.due_at {
                Some(due) if t.status != TaskStatus::Done => {
                    format!("status: {}, due: {}", t.status, due.format("%Y-%m-%d"))
                }
                _ => format!("status: {}", t.status),
            },
            Self::Event(e) => format!("starts: {}", e.starts_at.format("%Y-%m-%d %H:%M")),
            Self::Note(n) => format!("updated: {}", n.updated_at.format("%Y-%m-%d")),
            Self::Project(p) => format!("status: {}", p.status),
        }
    }

    /// Build the ephemeral reference handed to the dispatcher.
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef {
            kind: self.kind(),
            id: self.id(),
            display_name: self.title().to_string(),
        }
    }
}

/// Resolved pointer to one owned record.
///
/// Produced by the resolver, recorded into conversation context, and consumed
/// within the same dispatch. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: EntityId,
    pub display_name: String,
}

// ═══════════════════════════════════════════════════════════════════════
// Time parsing
// ═══════════════════════════════════════════════════════════════════════

/// Parse a model-supplied point in time.
///
/// Accepts full RFC 3339 (`2026-08-21T14:30:00Z`, offset forms included) or a
/// bare date (`2026-08-21`, read as midnight UTC).
pub fn parse_when(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> UserId {
        UserId::new("u-1")
    }

    #[test]
    fn entity_id_parse_accepts_uuid_syntax_only() {
        let id = EntityId::new();
        assert_eq!(EntityId::parse(&id.to_string()), Some(id));
        assert!(EntityId::parse("buy milk").is_none());
        assert!(EntityId::parse("").is_none());
    }

    #[test]
    fn kind_labels_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_label(kind.as_label()), Some(kind));
        }
        assert_eq!(EntityKind::from_label("Tasks"), Some(EntityKind::Task));
        assert_eq!(EntityKind::from_label("projects"), Some(EntityKind::Project));
        assert!(EntityKind::from_label("reminder").is_none());
    }

    #[test]
    fn status_labels_round_trip() {
        for s in [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Done] {
            assert_eq!(TaskStatus::from_label(s.as_label()), Some(s));
        }
        assert_eq!(
            TaskStatus::from_label("in-progress"),
            Some(TaskStatus::InProgress)
        );
    }

    #[test]
    fn priority_orders_low_to_urgent() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::High < Priority::Urgent);
    }

    #[test]
    fn set_status_tracks_completion() {
        let mut task = Task::new(owner(), "Ship release");
        assert!(task.completed_at.is_none());
        task.set_status(TaskStatus::Done);
        assert!(task.completed_at.is_some());
        task.set_status(TaskStatus::Todo);
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn tombstone_is_idempotent() {
        let mut ent = Entity::Task(Task::new(owner(), "Old chore"));
        assert!(!ent.is_deleted());
        assert!(ent.tombstone());
        assert!(ent.is_deleted());
        assert!(!ent.tombstone());
    }

    #[test]
    fn matches_text_covers_kind_fields() {
        let mut note = Note::new(owner(), "Standup");
        note.content = Some("Discussed the Q3 roadmap".into());
        let ent = Entity::Note(note);
        assert!(ent.matches_text("roadmap"));
        assert!(ent.matches_text("standup"));
        assert!(!ent.matches_text("invoice"));

        let mut event = Event::new(owner(), "Offsite", Utc::now());
        event.location = Some("Lisbon".into());
        let ent = Entity::Event(event);
        assert!(ent.matches_text("lisbon"));
    }

    #[test]
    fn distinguishing_field_names_task_status() {
        let mut done = Task::new(owner(), "Test");
        done.set_status(TaskStatus::Done);
        let todo = Task::new(owner(), "Test");
        assert_eq!(Entity::Task(done).distinguishing_field(), "status: done");
        assert_eq!(Entity::Task(todo).distinguishing_field(), "status: todo");
    }

    #[test]
    fn entity_ref_uses_project_name() {
        let project = Project::new(owner(), "Home renovation");
        let r = Entity::Project(project.clone()).entity_ref();
        assert_eq!(r.kind, EntityKind::Project);
        assert_eq!(r.id, project.id);
        assert_eq!(r.display_name, "Home renovation");
    }

    #[test]
    fn wire_json_is_tagged_and_camel_cased() {
        let task = Task::new(owner(), "Water plants");
        let json = serde_json::to_value(Entity::Task(task)).unwrap();
        assert_eq!(json["kind"], "task");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("created_at").is_none());
    }

    #[test]
    fn parse_when_accepts_rfc3339_and_bare_dates() {
        let full = parse_when("2026-08-21T14:30:00Z").unwrap();
        assert_eq!(full.format("%H:%M").to_string(), "14:30");
        let bare = parse_when("2026-08-21").unwrap();
        assert_eq!(bare.format("%Y-%m-%d %H:%M").to_string(), "2026-08-21 00:00");
        assert!(parse_when("next tuesday").is_none());
    }
}
