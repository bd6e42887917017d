//! get_statistics: fixed aggregate metrics over the user's data.

use chrono::Utc;
use serde_json::{Value, json};

use crate::entity::{Entity, EntityKind, Priority, Task, TaskStatus};
use crate::error::SchemaError;
use crate::repo::ListFilter;
use crate::tools::{ToolCtx, ToolHandler, ToolResult};

pub struct GetStatistics;

impl ToolHandler for GetStatistics {
    fn name(&self) -> &'static str {
        "get_statistics"
    }

    fn execute(&self, ctx: &ToolCtx<'_>) -> ToolResult {
        let metric = ctx.str_param("metric").unwrap_or_default().to_lowercase();

        // Optional project scope, resolved by the dispatcher.
        let mut filter = ListFilter::default();
        let scope = ctx.project_ref().map(|p| {
            filter.project = Some(p.id);
            p.display_name.clone()
        });

        let tasks = |ctx: &ToolCtx<'_>| -> Result<Vec<Task>, crate::error::DispatchError> {
            let rows = ctx
                .repo
                .list_filtered(ctx.user, EntityKind::Task, &filter)
                .map_err(crate::error::DispatchError::Repo)?;
            ctx.trace.query(EntityKind::Task, "statistics", rows.len());
            Ok(rows
                .into_iter()
                .filter_map(|e| match e {
                    Entity::Task(t) => Some(t),
                    _ => None,
                })
                .collect())
        };

        let now = Utc::now();
        let today = now.date_naive();
        let payload: Value = match metric.as_str() {
            "overdue_tasks" => {
                let overdue: Vec<_> = tasks(ctx)?
                    .into_iter()
                    .filter(|t| {
                        t.status != TaskStatus::Done
                            && t.due_at.is_some_and(|due| due < now)
                    })
                    .collect();
                json!({
                    "count": overdue.len(),
                    "titles": overdue.iter().map(|t| t.title.as_str()).collect::<Vec<_>>(),
                })
            }
            "tasks_due_today" => {
                let due: Vec<_> = tasks(ctx)?
                    .into_iter()
                    .filter(|t| {
                        t.status != TaskStatus::Done
                            && t.due_at.is_some_and(|d| d.date_naive() == today)
                    })
                    .collect();
                json!({
                    "count": due.len(),
                    "titles": due.iter().map(|t| t.title.as_str()).collect::<Vec<_>>(),
                })
            }
            "tasks_completed_today" => {
                let count = tasks(ctx)?
                    .iter()
                    .filter(|t| t.completed_at.is_some_and(|c| c.date_naive() == today))
                    .count();
                json!({ "count": count })
            }
            "tasks_by_priority" => {
                let rows = tasks(ctx)?;
                let mut buckets = serde_json::Map::new();
                for priority in Priority::ALL {
                    let count = rows.iter().filter(|t| t.priority == priority).count();
                    buckets.insert(priority.as_label().into(), json!(count));
                }
                Value::Object(buckets)
            }
            "tasks_by_status" => {
                let rows = tasks(ctx)?;
                let mut buckets = serde_json::Map::new();
                for status in [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Done] {
                    let count = rows.iter().filter(|t| t.status == status).count();
                    buckets.insert(status.as_label().into(), json!(count));
                }
                Value::Object(buckets)
            }
            "upcoming_events" => {
                let horizon = now + chrono::Duration::days(7);
                let rows = ctx
                    .repo
                    .list_filtered(ctx.user, EntityKind::Event, &filter)
                    .map_err(crate::error::DispatchError::Repo)?;
                ctx.trace.query(EntityKind::Event, "statistics", rows.len());
                let upcoming: Vec<_> = rows
                    .iter()
                    .filter_map(|e| match e {
                        Entity::Event(ev) if ev.starts_at >= now && ev.starts_at <= horizon => {
                            Some(json!({ "title": ev.title, "startsAt": ev.starts_at }))
                        }
                        _ => None,
                    })
                    .collect();
                json!({ "count": upcoming.len(), "events": upcoming })
            }
            "entity_counts" => {
                let mut counts = serde_json::Map::new();
                for kind in EntityKind::ALL {
                    let rows = ctx
                        .repo
                        .list_filtered(ctx.user, kind, &filter)
                        .map_err(crate::error::DispatchError::Repo)?;
                    counts.insert(kind.as_label().into(), json!(rows.len()));
                }
                Value::Object(counts)
            }
            other => {
                // The enum check upstream makes this unreachable in practice.
                return Err(SchemaError::InvalidEnumValue {
                    tool: self.name().into(),
                    param: "metric".into(),
                    value: other.to_string(),
                    allowed: "overdue_tasks, tasks_due_today, tasks_completed_today, \
                              tasks_by_priority, tasks_by_status, upcoming_events, \
                              entity_counts"
                        .into(),
                }
                .into());
            }
        };

        Ok(json!({
            "metric": metric,
            "scope": scope,
            "data": payload,
        }))
    }
}
