//! create_project: start a grouping for related work.

use serde_json::json;

use crate::entity::{Entity, Project};
use crate::tools::{ToolCtx, ToolHandler, ToolResult};

pub struct CreateProject;

impl ToolHandler for CreateProject {
    fn name(&self) -> &'static str {
        "create_project"
    }

    fn execute(&self, ctx: &ToolCtx<'_>) -> ToolResult {
        let name = ctx.str_param("name").unwrap_or_default();
        let mut project = Project::new(ctx.user.clone(), name);

        if let Some(description) = ctx.str_param("description") {
            project.description = Some(description.to_string());
        }

        let entity = Entity::Project(project);
        ctx.repo.insert(entity.clone()).map_err(|e| ctx.exec_err(e))?;
        ctx.mention(&entity);
        Ok(json!({ "project": entity }))
    }
}
