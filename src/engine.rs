//! The engine facade: one object wiring repository, context tracker,
//! trace log, and dispatcher together behind a small surface.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::context::ContextTracker;
use crate::dispatch::Dispatcher;
use crate::error::{AmanuError, AmanuResult, ConfigError};
use crate::protocol::{ToolCallRequest, ToolCallResult};
use crate::repo::{EntityRepository, MemoryRepository};
use crate::schema::SchemaRegistry;
use crate::store::DurableStore;
use crate::trace::{ConsoleSink, DurableSink, LogEvent, LogSink, MemorySink, TraceLog};

/// Snapshot of the engine's moving parts for status display.
#[derive(Debug, Clone)]
pub struct EngineInfo {
    pub tool_count: usize,
    pub entity_count: usize,
    pub conversation_count: usize,
    pub dropped_log_events: u64,
    pub data_dir: Option<PathBuf>,
}

impl std::fmt::Display for EngineInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "amanu engine")?;
        writeln!(f, "  tools:          {}", self.tool_count)?;
        writeln!(f, "  entities:       {}", self.entity_count)?;
        writeln!(f, "  conversations:  {}", self.conversation_count)?;
        writeln!(f, "  dropped events: {}", self.dropped_log_events)?;
        match &self.data_dir {
            Some(dir) => writeln!(f, "  data dir:       {}", dir.display()),
            None => writeln!(f, "  data dir:       (memory only)"),
        }
    }
}

/// Owns every subsystem and routes tool calls through the dispatcher.
pub struct Engine {
    config: EngineConfig,
    repo: Arc<MemoryRepository>,
    contexts: Arc<ContextTracker>,
    trace: Arc<TraceLog>,
    memory_log: Arc<MemorySink>,
    store: Option<Arc<DurableStore>>,
    dispatcher: Dispatcher,
}

impl Engine {
    /// Bring the engine up from a validated config.
    ///
    /// When a data directory is configured the durable store is opened and
    /// any snapshot in it is restored before the first call is accepted.
    pub fn new(config: EngineConfig) -> AmanuResult<Self> {
        config.validate()?;

        let store = match &config.data_dir {
            Some(dir) => Some(Arc::new(DurableStore::open(dir)?)),
            None => None,
        };

        let repo = Arc::new(MemoryRepository::new());
        if let Some(store) = &store {
            let restored = repo.restore(store)?;
            if restored > 0 {
                tracing::info!(restored, "restored entity snapshot");
            }
        }

        let memory_log = Arc::new(MemorySink::new(config.memory_log_events));
        let mut sinks: Vec<Arc<dyn LogSink>> = vec![Arc::new(ConsoleSink), memory_log.clone()];
        if config.durable_log {
            // validate() guarantees a data dir accompanies durable_log.
            let store = store.as_ref().ok_or_else(|| ConfigError::Invalid {
                message: "durable_log requires data_dir".into(),
            })?;
            sinks.push(Arc::new(DurableSink::new(Arc::clone(store))?));
        }
        let trace = Arc::new(TraceLog::new(sinks));

        let contexts = Arc::new(ContextTracker::new());
        let dispatcher = Dispatcher::new(
            SchemaRegistry::builtin(),
            Arc::clone(&repo) as Arc<dyn EntityRepository>,
            Arc::clone(&contexts),
            Arc::clone(&trace),
            config.limits(),
            config.candidate_cap,
        );

        Ok(Self {
            config,
            repo,
            contexts,
            trace,
            memory_log,
            store,
            dispatcher,
        })
    }

    /// An ephemeral engine with defaults, nothing on disk.
    pub fn in_memory() -> AmanuResult<Self> {
        Self::new(EngineConfig::default())
    }

    /// Run one tool call end to end.
    pub fn dispatch(&self, request: &ToolCallRequest) -> ToolCallResult {
        self.dispatcher.dispatch(request)
    }

    /// Run a batch of calls in order. Each call sees the effects of the ones
    /// before it, so "create, then update it" works within a batch. A failed
    /// call does not stop the rest.
    pub fn dispatch_all(&self, requests: &[ToolCallRequest]) -> Vec<ToolCallResult> {
        requests.iter().map(|r| self.dispatch(r)).collect()
    }

    /// The full tool catalog as a JSON schema array, for prompt assembly.
    pub fn catalog_json(&self) -> serde_json::Value {
        self.dispatcher.registry().catalog_json()
    }

    /// Write the current entity set into the durable store, if one is open.
    pub fn persist(&self) -> AmanuResult<()> {
        if let Some(store) = &self.store {
            self.repo.persist(store).map_err(AmanuError::from)?;
            tracing::debug!("entity snapshot written");
        }
        Ok(())
    }

    /// Drop conversation contexts idle past the configured window.
    pub fn evict_idle_contexts(&self) -> usize {
        let max_idle = chrono::Duration::minutes(self.config.context_idle_minutes as i64);
        self.contexts.evict_idle(max_idle)
    }

    /// The most recent trace events still held in memory, oldest first.
    pub fn recent_events(&self) -> Vec<LogEvent> {
        self.memory_log.snapshot()
    }

    pub fn info(&self) -> EngineInfo {
        EngineInfo {
            tool_count: self.dispatcher.registry().len(),
            entity_count: self.repo.len(),
            conversation_count: self.contexts.len(),
            dropped_log_events: self.trace.dropped(),
            data_dir: self.config.data_dir.clone(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> Option<&Arc<DurableStore>> {
        self.store.as_ref()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("entities", &self.repo.len())
            .field("conversations", &self.contexts.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ConversationId, UserId};
    use serde_json::json;

    fn request(tool: &str, params: serde_json::Value) -> ToolCallRequest {
        ToolCallRequest::new(
            tool,
            params.as_object().cloned().unwrap_or_default(),
            UserId::new("u-1"),
            ConversationId::new("c-1"),
        )
    }

    #[test]
    fn in_memory_engine_serves_the_full_catalog() {
        let engine = Engine::in_memory().unwrap();
        let catalog = engine.catalog_json();
        assert_eq!(catalog.as_array().unwrap().len(), engine.info().tool_count);
    }

    #[test]
    fn batch_calls_see_earlier_effects() {
        let engine = Engine::in_memory().unwrap();
        let results = engine.dispatch_all(&[
            request("create_task", json!({"title": "First"})),
            request("update_task", json!({"id": "it", "status": "done"})),
        ]);
        assert!(results.iter().all(|r| r.success), "{results:?}");
    }

    #[test]
    fn every_dispatch_leaves_a_timed_trace_event() {
        let engine = Engine::in_memory().unwrap();
        engine.dispatch(&request("create_task", json!({"title": "Traced"})));

        let events = engine.recent_events();
        let finished = events
            .iter()
            .find(|e| e.message.starts_with("tool ok"))
            .expect("completion event");
        assert!(finished.execution_time_ms.is_some());
    }

    #[test]
    fn snapshot_survives_an_engine_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            data_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };

        let first = Engine::new(config.clone()).unwrap();
        let created = first.dispatch(&request("create_task", json!({"title": "Durable"})));
        assert!(created.success);
        first.persist().unwrap();
        drop(first);

        let second = Engine::new(config).unwrap();
        assert_eq!(second.info().entity_count, 1);
        let listed = second.dispatch(&request("query_entities", json!({})));
        assert_eq!(listed.data.unwrap()["total"], json!(1));
    }

    #[test]
    fn idle_contexts_are_evicted() {
        let config = EngineConfig {
            context_idle_minutes: 0,
            ..Default::default()
        };
        let engine = Engine::new(config).unwrap();
        engine.dispatch(&request("create_task", json!({"title": "Lonely"})));
        assert_eq!(engine.info().conversation_count, 1);
        assert_eq!(engine.evict_idle_contexts(), 1);
        assert_eq!(engine.info().conversation_count, 0);
    }
}
