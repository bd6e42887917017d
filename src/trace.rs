//! Structured, leveled event log of every dispatch decision.
//!
//! [`TraceLog`] fans [`LogEvent`]s out to pluggable [`LogSink`]s: the
//! console sink bridges into `tracing` and is always on in a default
//! engine, the durable sink appends to redb for replayable debugging, and
//! the memory sink is a bounded ring buffer for embedders and tests. Sink
//! failures are swallowed and counted, never propagated — logging must not
//! be able to fail a dispatch.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::entity::EntityKind;
use crate::protocol::{ToolCallRequest, ToolCallResult};
use crate::store::{DurableStore, StoreResult};

/// Severity of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "WARNING" | "WARN" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// One append-only log record. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Arbitrary JSON context; consumers filter on `toolName` and
    /// `conversationId`.
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl LogEvent {
    pub fn new(level: LogLevel, message: impl Into<String>, context: Map<String, Value>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            context,
            execution_time_ms: None,
        }
    }

    pub fn with_timing(mut self, elapsed_ms: u64) -> Self {
        self.execution_time_ms = Some(elapsed_ms);
        self
    }

    /// String field of the context map, when present.
    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(Value::as_str)
    }
}

/// Destination for log events.
pub trait LogSink: Send + Sync {
    fn append(&self, event: &LogEvent) -> StoreResult<()>;
}

// ── Console sink ─────────────────────────────────────────────────────────

/// Bridges log events into the `tracing` macros, so the engine's structured
/// trail shows up alongside everything else the process logs.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn append(&self, event: &LogEvent) -> StoreResult<()> {
        let context = Value::Object(event.context.clone()).to_string();
        match event.level {
            LogLevel::Debug => {
                tracing::debug!(context = %context, elapsed_ms = event.execution_time_ms, "{}", event.message)
            }
            LogLevel::Info => {
                tracing::info!(context = %context, elapsed_ms = event.execution_time_ms, "{}", event.message)
            }
            LogLevel::Warning => {
                tracing::warn!(context = %context, elapsed_ms = event.execution_time_ms, "{}", event.message)
            }
            LogLevel::Error => {
                tracing::error!(context = %context, elapsed_ms = event.execution_time_ms, "{}", event.message)
            }
        }
        Ok(())
    }
}

// ── Durable sink ─────────────────────────────────────────────────────────

/// Key prefix for log entries in the durable store.
const LOG_PREFIX: &str = "log:";

/// Appends events to the durable store as `log:{seq:016}` → JSON.
///
/// The sequence counter resumes from the highest existing key, so restarts
/// keep appending instead of overwriting.
pub struct DurableSink {
    store: Arc<DurableStore>,
    seq: AtomicU64,
}

impl DurableSink {
    pub fn new(store: Arc<DurableStore>) -> StoreResult<Self> {
        let next = store
            .scan_prefix(LOG_PREFIX.as_bytes())?
            .last()
            .and_then(|(key, _)| {
                std::str::from_utf8(key)
                    .ok()?
                    .strip_prefix(LOG_PREFIX)?
                    .parse::<u64>()
                    .ok()
            })
            .map_or(0, |n| n + 1);
        Ok(Self {
            store,
            seq: AtomicU64::new(next),
        })
    }

    /// All stored events, oldest first.
    pub fn load_all(store: &DurableStore) -> StoreResult<Vec<LogEvent>> {
        let mut events = Vec::new();
        for (_, value) in store.scan_prefix(LOG_PREFIX.as_bytes())? {
            if let Ok(event) = serde_json::from_slice::<LogEvent>(&value) {
                events.push(event);
            }
        }
        Ok(events)
    }
}

impl LogSink for DurableSink {
    fn append(&self, event: &LogEvent) -> StoreResult<()> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let key = format!("{LOG_PREFIX}{seq:016}");
        let value =
            serde_json::to_vec(event).map_err(|e| crate::error::StoreError::Serialization {
                message: format!("failed to serialize log event: {e}"),
            })?;
        self.store.put(key.as_bytes(), &value)
    }
}

impl std::fmt::Debug for DurableSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableSink")
            .field("next_seq", &self.seq.load(Ordering::Relaxed))
            .finish()
    }
}

// ── Memory sink ──────────────────────────────────────────────────────────

/// Bounded ring buffer of recent events, for embedders and tests.
pub struct MemorySink {
    events: Mutex<VecDeque<LogEvent>>,
    capacity: usize,
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    /// Copy of the buffered events, oldest first.
    pub fn snapshot(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .map(|buf| buf.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|buf| buf.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSink for MemorySink {
    fn append(&self, event: &LogEvent) -> StoreResult<()> {
        if let Ok(mut buf) = self.events.lock() {
            if buf.len() == self.capacity {
                buf.pop_front();
            }
            buf.push_back(event.clone());
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemorySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySink")
            .field("events", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

// ── TraceLog ─────────────────────────────────────────────────────────────

/// Fan-out over the configured sinks, with the dispatch-shaped helpers.
///
/// Append failures from any sink are counted in `dropped` and otherwise
/// ignored; the primary dispatch path never blocks on logging.
pub struct TraceLog {
    sinks: Vec<Arc<dyn LogSink>>,
    dropped: AtomicU64,
}

impl TraceLog {
    pub fn new(sinks: Vec<Arc<dyn LogSink>>) -> Self {
        Self {
            sinks,
            dropped: AtomicU64::new(0),
        }
    }

    /// A log with no sinks; events vanish. Used where tracing is noise.
    pub fn disabled() -> Self {
        Self::new(Vec::new())
    }

    /// Emit one event to every sink.
    pub fn log(&self, event: LogEvent) {
        for sink in &self.sinks {
            if sink.append(&event).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Events a sink failed to take.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// INFO event at the start of a dispatch.
    pub fn tool_call(&self, request: &ToolCallRequest) {
        let mut context = Map::new();
        context.insert("toolName".into(), json!(request.tool_name));
        context.insert("conversationId".into(), json!(request.conversation_id.as_str()));
        context.insert("userId".into(), json!(request.user_id.as_str()));
        context.insert(
            "parameterKeys".into(),
            json!(request.parameters.keys().collect::<Vec<_>>()),
        );
        self.log(LogEvent::new(
            LogLevel::Info,
            format!("tool call: {}", request.tool_name),
            context,
        ));
    }

    /// INFO/ERROR event at the end of a dispatch, with elapsed time.
    pub fn tool_result(
        &self,
        tool_name: &str,
        conversation_id: &str,
        elapsed_ms: u64,
        result: &ToolCallResult,
    ) {
        let mut context = Map::new();
        context.insert("toolName".into(), json!(tool_name));
        context.insert("conversationId".into(), json!(conversation_id));
        context.insert("success".into(), json!(result.success));
        let (level, message) = match &result.error {
            None => (LogLevel::Info, format!("tool ok: {tool_name}")),
            Some(err) => {
                context.insert("errorKind".into(), json!(err.kind.as_label()));
                context.insert("errorMessage".into(), json!(err.message));
                (
                    LogLevel::Error,
                    format!("tool failed: {tool_name} ({})", err.kind),
                )
            }
        };
        self.log(LogEvent::new(level, message, context).with_timing(elapsed_ms));
    }

    /// DEBUG event per repository or query access, with the row count.
    pub fn query(&self, kind: EntityKind, conditions: &str, result_count: usize) {
        let mut context = Map::new();
        context.insert("entityKind".into(), json!(kind.as_label()));
        context.insert("conditions".into(), json!(conditions));
        context.insert("resultCount".into(), json!(result_count));
        self.log(LogEvent::new(
            LogLevel::Debug,
            format!("query {kind}: {conditions} → {result_count}"),
            context,
        ));
    }
}

impl std::fmt::Debug for TraceLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceLog")
            .field("sinks", &self.sinks.len())
            .field("dropped", &self.dropped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ErrorKind;
    use tempfile::TempDir;

    fn event(level: LogLevel, message: &str) -> LogEvent {
        LogEvent::new(level, message, Map::new())
    }

    #[test]
    fn level_labels_round_trip() {
        for level in [
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warning,
            LogLevel::Error,
        ] {
            assert_eq!(LogLevel::from_label(level.as_label()), Some(level));
        }
        assert_eq!(LogLevel::from_label("warn"), Some(LogLevel::Warning));
        assert!(LogLevel::from_label("verbose").is_none());
    }

    #[test]
    fn wire_json_shape() {
        let e = event(LogLevel::Info, "hello").with_timing(12);
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["level"], "INFO");
        assert_eq!(json["executionTimeMs"], 12);
        // Untimed events omit the field entirely.
        let json = serde_json::to_value(event(LogLevel::Debug, "x")).unwrap();
        assert!(json.get("executionTimeMs").is_none());
    }

    #[test]
    fn memory_sink_keeps_a_bounded_window() {
        let sink = MemorySink::new(3);
        for i in 0..5 {
            sink.append(&event(LogLevel::Info, &format!("e{i}"))).unwrap();
        }
        let events = sink.snapshot();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].message, "e2");
        assert_eq!(events[2].message, "e4");
    }

    #[test]
    fn durable_sink_appends_and_resumes_sequence() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(DurableStore::open(dir.path()).unwrap());

        let sink = DurableSink::new(Arc::clone(&store)).unwrap();
        sink.append(&event(LogLevel::Info, "first")).unwrap();
        sink.append(&event(LogLevel::Error, "second")).unwrap();

        // A new sink over the same store continues, not overwrites.
        let resumed = DurableSink::new(Arc::clone(&store)).unwrap();
        resumed.append(&event(LogLevel::Debug, "third")).unwrap();

        let events = DurableSink::load_all(&store).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].message, "first");
        assert_eq!(events[2].message, "third");
    }

    #[test]
    fn tool_call_and_result_events_carry_filterable_context() {
        let sink = Arc::new(MemorySink::new(16));
        let trace = TraceLog::new(vec![sink.clone()]);

        let request = ToolCallRequest::new(
            "create_task",
            Map::new(),
            crate::entity::UserId::new("u-1"),
            crate::entity::ConversationId::new("c-9"),
        );
        trace.tool_call(&request);
        trace.tool_result(
            "create_task",
            "c-9",
            7,
            &ToolCallResult::fail(ErrorKind::NotFound, "gone"),
        );

        let events = sink.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].level, LogLevel::Info);
        assert_eq!(events[0].context_str("toolName"), Some("create_task"));
        assert_eq!(events[0].context_str("conversationId"), Some("c-9"));
        assert_eq!(events[1].level, LogLevel::Error);
        assert_eq!(events[1].context_str("errorKind"), Some("not_found"));
        assert_eq!(events[1].execution_time_ms, Some(7));
    }

    #[test]
    fn query_events_record_row_counts() {
        let sink = Arc::new(MemorySink::new(4));
        let trace = TraceLog::new(vec![sink.clone()]);
        trace.query(EntityKind::Note, "title contains `standup`", 2);

        let events = sink.snapshot();
        assert_eq!(events[0].level, LogLevel::Debug);
        assert_eq!(events[0].context["resultCount"], 2);
    }

    #[test]
    fn sink_failures_are_counted_not_propagated() {
        struct FailingSink;
        impl LogSink for FailingSink {
            fn append(&self, _event: &LogEvent) -> StoreResult<()> {
                Err(crate::error::StoreError::NotFound { key: "x".into() })
            }
        }

        let trace = TraceLog::new(vec![Arc::new(FailingSink), Arc::new(MemorySink::new(4))]);
        trace.log(event(LogLevel::Info, "survives"));
        trace.log(event(LogLevel::Info, "still"));
        assert_eq!(trace.dropped(), 2);
    }
}
