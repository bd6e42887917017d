//! create_note: capture a note.

use serde_json::json;

use crate::entity::{Entity, Note};
use crate::tools::{ToolCtx, ToolHandler, ToolResult};

pub struct CreateNote;

impl ToolHandler for CreateNote {
    fn name(&self) -> &'static str {
        "create_note"
    }

    fn execute(&self, ctx: &ToolCtx<'_>) -> ToolResult {
        let title = ctx.str_param("title").unwrap_or_default();
        let mut note = Note::new(ctx.user.clone(), title);

        if let Some(content) = ctx.str_param("content") {
            note.content = Some(content.to_string());
        }
        if let Some(project) = ctx.project_ref() {
            note.project_id = Some(project.id);
        }

        let entity = Entity::Note(note);
        ctx.repo.insert(entity.clone()).map_err(|e| ctx.exec_err(e))?;
        ctx.mention(&entity);
        Ok(json!({ "note": entity }))
    }
}
