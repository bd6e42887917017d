//! create_task: mint a new task for the user.

use serde_json::json;

use crate::entity::{Entity, Priority, Task, TaskStatus, parse_when};
use crate::tools::{ToolCtx, ToolHandler, ToolResult};

pub struct CreateTask;

impl ToolHandler for CreateTask {
    fn name(&self) -> &'static str {
        "create_task"
    }

    fn execute(&self, ctx: &ToolCtx<'_>) -> ToolResult {
        let title = ctx.str_param("title").unwrap_or_default();
        let mut task = Task::new(ctx.user.clone(), title);

        if let Some(description) = ctx.str_param("description") {
            task.description = Some(description.to_string());
        }
        if let Some(priority) = ctx.str_param("priority").and_then(Priority::from_label) {
            task.priority = priority;
        }
        if let Some(status) = ctx.str_param("status").and_then(TaskStatus::from_label) {
            task.set_status(status);
        }
        if let Some(due) = ctx.str_param("dueDate").and_then(parse_when) {
            task.due_at = Some(due);
        }
        if let Some(project) = ctx.project_ref() {
            task.project_id = Some(project.id);
        }

        let entity = Entity::Task(task);
        ctx.repo.insert(entity.clone()).map_err(|e| ctx.exec_err(e))?;
        ctx.mention(&entity);
        Ok(json!({ "task": entity }))
    }
}
