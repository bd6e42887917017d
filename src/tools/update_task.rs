//! update_task: change one task, or several at once.
//!
//! Ownership of every referenced task was already proven during the
//! dispatcher's Resolve stage, so the bulk path mutates per item and
//! reports a per-item outcome list; one failed item never rolls back the
//! others.

use serde_json::json;

use crate::entity::{Entity, EntityKind, EntityRef, Priority, TaskStatus, parse_when};
use crate::error::SchemaError;
use crate::tools::{ToolCtx, ToolHandler, ToolResult};

pub struct UpdateTask;

impl ToolHandler for UpdateTask {
    fn name(&self) -> &'static str {
        "update_task"
    }

    fn execute(&self, ctx: &ToolCtx<'_>) -> ToolResult {
        if let Some(subjects) = ctx.refs.many("ids") {
            return self.execute_bulk(ctx, subjects);
        }
        let Some(subject) = ctx.refs.one("id") else {
            // The dispatcher fills `id` from conversation context when
            // absent, so reaching here means the call named neither form.
            return Err(SchemaError::MissingParameter {
                tool: self.name().into(),
                param: "id".into(),
            }
            .into());
        };

        let entity = self.apply(ctx, subject).map_err(|e| ctx.exec_err(e))?;
        ctx.mention(&entity);
        Ok(json!({ "task": entity }))
    }
}

impl UpdateTask {
    fn execute_bulk(&self, ctx: &ToolCtx<'_>, subjects: &[EntityRef]) -> ToolResult {
        let mut outcomes = Vec::with_capacity(subjects.len());
        let mut updated = 0usize;
        let mut last_ok: Option<Entity> = None;

        for subject in subjects {
            match self.apply(ctx, subject) {
                Ok(entity) => {
                    updated += 1;
                    outcomes.push(json!({
                        "id": subject.id,
                        "title": entity.title(),
                        "success": true,
                    }));
                    last_ok = Some(entity);
                }
                Err(message) => outcomes.push(json!({
                    "id": subject.id,
                    "title": subject.display_name,
                    "success": false,
                    "error": message,
                })),
            }
        }

        if let Some(entity) = &last_ok {
            ctx.mention(entity);
        }
        Ok(json!({
            "outcomes": outcomes,
            "updated": updated,
            "failed": subjects.len() - updated,
        }))
    }

    /// Fetch, mutate, and store one task. String errors feed the per-item
    /// outcome list.
    fn apply(&self, ctx: &ToolCtx<'_>, subject: &EntityRef) -> Result<Entity, String> {
        let found = ctx
            .repo
            .find_by_id(ctx.user, EntityKind::Task, subject.id)
            .map_err(|e| e.to_string())?;
        // Resolution proved ownership moments ago; a miss here means the
        // record was deleted in between.
        let Some(Entity::Task(mut task)) = found else {
            return Err(format!("task {} no longer exists", subject.id));
        };

        if let Some(title) = ctx.str_param("title") {
            task.title = title.to_string();
        }
        if let Some(description) = ctx.str_param("description") {
            task.description = Some(description.to_string());
        }
        if let Some(status) = ctx.str_param("status").and_then(TaskStatus::from_label) {
            task.set_status(status);
        }
        if let Some(priority) = ctx.str_param("priority").and_then(Priority::from_label) {
            task.priority = priority;
        }
        if let Some(due) = ctx.str_param("dueDate").and_then(parse_when) {
            task.due_at = Some(due);
        }
        if let Some(project) = ctx.project_ref() {
            task.project_id = Some(project.id);
        }

        let mut entity = Entity::Task(task);
        entity.touch();
        let replaced = ctx.repo.update(entity.clone()).map_err(|e| e.to_string())?;
        if !replaced {
            return Err(format!("task {} no longer exists", subject.id));
        }
        Ok(entity)
    }
}
