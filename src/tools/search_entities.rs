//! search_entities: free-text substring retrieval.

use serde_json::json;

use crate::query::{QueryEngine, SearchSpec};
use crate::tools::{ToolCtx, ToolHandler, ToolResult};

pub struct SearchEntities;

impl ToolHandler for SearchEntities {
    fn name(&self) -> &'static str {
        "search_entities"
    }

    fn execute(&self, ctx: &ToolCtx<'_>) -> ToolResult {
        let spec = SearchSpec {
            query_text: ctx.str_param("queryText").unwrap_or_default().to_string(),
            kinds: ctx.kinds_param(),
            filter: ctx.filters_param()?,
            limit: ctx.limits.clamp(ctx.usize_param("limit")),
        };

        let grouped = QueryEngine::new(ctx.repo, ctx.trace)
            .search(ctx.user, &spec)
            .map_err(crate::error::DispatchError::Repo)?;

        let mut payload = grouped.to_json();
        if grouped.total() == 0 {
            // An empty keyword search usually means the keyword was wrong,
            // not that nothing exists; nudge the model toward listing mode.
            payload["hint"] = json!(
                "no text matched; for \"all\" or \"recent\" style requests use \
                 query_entities with filters instead of a keyword"
            );
        }
        Ok(payload)
    }
}
