//! Built-in tool handlers, one file per tool.
//!
//! A [`ToolHandler`] implements the Execute stage for one registered tool.
//! By the time a handler runs, parameters have been validated against the
//! schema and every entity-identifier parameter has been resolved into the
//! [`ResolvedRefs`] map, so handlers work with typed values and concrete
//! owned records only.

pub mod create_event;
pub mod create_note;
pub mod create_project;
pub mod create_task;
pub mod delete_entity;
pub mod get_statistics;
pub mod query_entities;
pub mod search_entities;
pub mod update_task;

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::context::ContextTracker;
use crate::entity::{
    ConversationId, Entity, EntityKind, EntityRef, Priority, UserId, parse_when,
};
use crate::error::{DispatchError, SchemaError};
use crate::query::QueryLimits;
use crate::repo::{EntityRepository, ListFilter};
use crate::resolve::Resolver;
use crate::trace::TraceLog;

/// Result type for tool execution: a JSON payload or a dispatch failure.
pub type ToolResult = std::result::Result<Value, DispatchError>;

/// A resolved entity-identifier parameter.
#[derive(Debug, Clone)]
pub enum RefValue {
    One(EntityRef),
    Many(Vec<EntityRef>),
}

/// Resolution results keyed by parameter name, produced by the dispatcher's
/// Resolve stage before execution begins.
#[derive(Debug, Clone, Default)]
pub struct ResolvedRefs {
    map: HashMap<String, RefValue>,
}

impl ResolvedRefs {
    pub fn insert_one(&mut self, param: impl Into<String>, entity_ref: EntityRef) {
        self.map.insert(param.into(), RefValue::One(entity_ref));
    }

    pub fn insert_many(&mut self, param: impl Into<String>, refs: Vec<EntityRef>) {
        self.map.insert(param.into(), RefValue::Many(refs));
    }

    pub fn one(&self, param: &str) -> Option<&EntityRef> {
        match self.map.get(param)? {
            RefValue::One(r) => Some(r),
            RefValue::Many(_) => None,
        }
    }

    pub fn many(&self, param: &str) -> Option<&[EntityRef]> {
        match self.map.get(param)? {
            RefValue::Many(refs) => Some(refs),
            RefValue::One(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Everything a handler needs for one execution.
pub struct ToolCtx<'a> {
    pub tool_name: &'a str,
    pub repo: &'a dyn EntityRepository,
    pub contexts: &'a ContextTracker,
    pub trace: &'a TraceLog,
    pub user: &'a UserId,
    pub conversation: &'a ConversationId,
    pub params: &'a Map<String, Value>,
    pub refs: &'a ResolvedRefs,
    pub limits: QueryLimits,
    pub candidate_cap: usize,
}

impl<'a> ToolCtx<'a> {
    /// String parameter, trimmed. Validation guarantees the type when the
    /// parameter is present.
    pub fn str_param(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str).map(str::trim)
    }

    pub fn bool_param(&self, name: &str) -> Option<bool> {
        self.params.get(name).and_then(Value::as_bool)
    }

    pub fn usize_param(&self, name: &str) -> Option<usize> {
        self.params
            .get(name)
            .and_then(Value::as_u64)
            .map(|n| n as usize)
    }

    /// A resolver for identifiers that live inside nested values (e.g. the
    /// `filters.project` field), which the dispatcher's Resolve stage does
    /// not see.
    pub fn resolver(&self) -> Resolver<'a> {
        Resolver::new(self.repo, self.contexts, self.trace)
            .with_candidate_cap(self.candidate_cap)
    }

    /// Record a successful mutation's subject into conversation memory.
    pub fn mention(&self, entity: &Entity) {
        self.contexts
            .record_mention(self.conversation, entity.entity_ref());
    }

    /// Wrap a repository failure for the wire.
    pub fn exec_err(&self, err: impl std::fmt::Display) -> DispatchError {
        DispatchError::Execution {
            tool: self.tool_name.to_string(),
            message: err.to_string(),
        }
    }

    /// The `entityKinds` array parameter, defaulting to all four kinds.
    /// Labels were checked during validation.
    pub fn kinds_param(&self) -> Vec<EntityKind> {
        let Some(raw) = self.params.get("entityKinds").and_then(Value::as_array) else {
            return EntityKind::ALL.to_vec();
        };
        let mut kinds: Vec<EntityKind> = raw
            .iter()
            .filter_map(Value::as_str)
            .filter_map(EntityKind::from_label)
            .collect();
        kinds.dedup();
        if kinds.is_empty() {
            EntityKind::ALL.to_vec()
        } else {
            kinds
        }
    }

    /// Parse the `filters` object into a typed [`ListFilter`].
    ///
    /// The schema only guarantees `filters` is an object; field values are
    /// checked here, and a `project` filter goes through the resolver so an
    /// ambiguous project name surfaces as a structured choice.
    pub fn filters_param(&self) -> Result<ListFilter, DispatchError> {
        let Some(raw) = self.params.get("filters").and_then(Value::as_object) else {
            return Ok(ListFilter::default());
        };

        let invalid = |field: &str, message: String| {
            DispatchError::Validation(SchemaError::InvalidValue {
                tool: self.tool_name.to_string(),
                param: format!("filters.{field}"),
                message,
            })
        };

        let mut filter = ListFilter::default();
        if let Some(status) = raw.get("status").and_then(Value::as_str) {
            filter.status = Some(status.trim().to_lowercase());
        }
        if let Some(priority) = raw.get("priority").and_then(Value::as_str) {
            filter.priority = Some(Priority::from_label(priority).ok_or_else(|| {
                invalid(
                    "priority",
                    format!("`{priority}` is not one of low, medium, high, urgent"),
                )
            })?);
        }
        if let Some(project) = raw.get("project").and_then(Value::as_str) {
            let r = self.resolver().resolve(
                project,
                EntityKind::Project,
                self.user,
                self.conversation,
            )?;
            filter.project = Some(r.id);
        }
        for (field, slot) in [
            ("dueBefore", &mut filter.due_before),
            ("dueAfter", &mut filter.due_after),
        ] {
            if let Some(when) = raw.get(field).and_then(Value::as_str) {
                *slot = Some(parse_when(when).ok_or_else(|| {
                    invalid(
                        field,
                        format!("`{when}` is not an RFC 3339 timestamp or YYYY-MM-DD date"),
                    )
                })?);
            }
        }
        Ok(filter)
    }

    /// The project a new or updated record should belong to, when the call
    /// carried a `project` parameter (already resolved).
    pub fn project_ref(&self) -> Option<&EntityRef> {
        self.refs.one("project")
    }
}

/// The Execute stage of one tool.
pub trait ToolHandler: Send + Sync {
    /// Must match the registered [`ToolSpec`](crate::schema::ToolSpec) name.
    fn name(&self) -> &'static str;

    fn execute(&self, ctx: &ToolCtx<'_>) -> ToolResult;
}

/// Handlers for the nine built-in tools, keyed by name.
pub fn builtin_handlers() -> HashMap<&'static str, Box<dyn ToolHandler>> {
    let handlers: Vec<Box<dyn ToolHandler>> = vec![
        Box::new(create_task::CreateTask),
        Box::new(create_event::CreateEvent),
        Box::new(create_note::CreateNote),
        Box::new(create_project::CreateProject),
        Box::new(query_entities::QueryEntities),
        Box::new(search_entities::SearchEntities),
        Box::new(update_task::UpdateTask),
        Box::new(delete_entity::DeleteEntity),
        Box::new(get_statistics::GetStatistics),
    ];
    handlers.into_iter().map(|h| (h.name(), h)).collect()
}
