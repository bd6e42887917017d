//! delete_entity: move a record to trash.
//!
//! The engine's only destructive semantic is the soft delete, so the
//! payload always carries `reversible: true`; the caller words its
//! confirmation from that marker, not from prompt-text convention.

use serde_json::json;

use crate::entity::EntityKind;
use crate::error::SchemaError;
use crate::tools::{ToolCtx, ToolHandler, ToolResult};

pub struct DeleteEntity;

impl ToolHandler for DeleteEntity {
    fn name(&self) -> &'static str {
        "delete_entity"
    }

    fn execute(&self, ctx: &ToolCtx<'_>) -> ToolResult {
        let kind = ctx
            .str_param("entityType")
            .and_then(EntityKind::from_label)
            .ok_or_else(|| SchemaError::MissingParameter {
                tool: self.name().into(),
                param: "entityType".into(),
            })
            .map_err(crate::error::DispatchError::Validation)?;
        let Some(subject) = ctx.refs.one("id") else {
            return Err(SchemaError::MissingParameter {
                tool: self.name().into(),
                param: "id".into(),
            }
            .into());
        };

        let deleted = ctx
            .repo
            .soft_delete(ctx.user, kind, subject.id)
            .map_err(|e| ctx.exec_err(e))?;
        let Some(entity) = deleted else {
            return Err(ctx.exec_err(format!("{kind} {} no longer exists", subject.id)));
        };

        // A pronoun must not keep pointing at the trashed record.
        if ctx
            .contexts
            .resolve_pronoun(ctx.conversation, kind)
            .is_some_and(|m| m.id == subject.id)
        {
            ctx.contexts.forget_mention(ctx.conversation, kind);
        }

        Ok(json!({
            "deleted": {
                "kind": kind.as_label(),
                "id": entity.id(),
                "title": entity.title(),
            },
            "reversible": true,
            "confirmed": ctx.bool_param("confirmed").unwrap_or(false),
        }))
    }
}
