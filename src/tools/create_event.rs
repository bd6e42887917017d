//! create_event: schedule a calendar event.

use serde_json::json;

use crate::entity::{Entity, Event, parse_when};
use crate::error::SchemaError;
use crate::tools::{ToolCtx, ToolHandler, ToolResult};

pub struct CreateEvent;

impl ToolHandler for CreateEvent {
    fn name(&self) -> &'static str {
        "create_event"
    }

    fn execute(&self, ctx: &ToolCtx<'_>) -> ToolResult {
        let title = ctx.str_param("title").unwrap_or_default();
        // Validated as date syntax; parse cannot miss here.
        let starts_at = ctx
            .str_param("startTime")
            .and_then(parse_when)
            .ok_or_else(|| SchemaError::MissingParameter {
                tool: self.name().into(),
                param: "startTime".into(),
            })
            .map_err(crate::error::DispatchError::Validation)?;

        let mut event = Event::new(ctx.user.clone(), title, starts_at);
        if let Some(ends_at) = ctx.str_param("endTime").and_then(parse_when) {
            event.ends_at = Some(ends_at);
        }
        if let Some(location) = ctx.str_param("location") {
            event.location = Some(location.to_string());
        }
        if let Some(description) = ctx.str_param("description") {
            event.description = Some(description.to_string());
        }
        if let Some(project) = ctx.project_ref() {
            event.project_id = Some(project.id);
        }

        let entity = Entity::Event(event);
        ctx.repo.insert(entity.clone()).map_err(|e| ctx.exec_err(e))?;
        ctx.mention(&entity);
        Ok(json!({ "event": entity }))
    }
}
