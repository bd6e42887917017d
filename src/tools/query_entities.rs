//! query_entities: structured filtered listing, no text matching.

use crate::query::{QueryEngine, QuerySpec, SortField, SortOrder};
use crate::tools::{ToolCtx, ToolHandler, ToolResult};

pub struct QueryEntities;

impl ToolHandler for QueryEntities {
    fn name(&self) -> &'static str {
        "query_entities"
    }

    fn execute(&self, ctx: &ToolCtx<'_>) -> ToolResult {
        let spec = QuerySpec {
            kinds: ctx.kinds_param(),
            filter: ctx.filters_param()?,
            sort_by: ctx
                .str_param("sortBy")
                .and_then(SortField::from_label)
                .unwrap_or_default(),
            sort_order: ctx
                .str_param("sortOrder")
                .and_then(SortOrder::from_label)
                .unwrap_or_default(),
            limit: ctx.limits.clamp(ctx.usize_param("limit")),
        };

        let grouped = QueryEngine::new(ctx.repo, ctx.trace)
            .list(ctx.user, &spec)
            .map_err(crate::error::DispatchError::Repo)?;
        Ok(grouped.to_json())
    }
}
