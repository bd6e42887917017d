//! The dispatch state machine: Validate → Resolve → Execute.
//!
//! Every inbound tool call passes through the three stages in order; a
//! failure at any stage short-circuits the rest and comes back as a
//! structured [`ToolCallResult`] — the dispatcher never panics across the
//! boundary and never leaks raw internal errors. Each dispatch produces an
//! INFO event at start, DEBUG events per repository access (emitted by the
//! resolver and query engine), and an INFO/ERROR event with elapsed time at
//! the end.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Value, json};

use crate::context::ContextTracker;
use crate::entity::EntityKind;
use crate::error::DispatchError;
use crate::protocol::{ToolCallRequest, ToolCallResult};
use crate::query::QueryLimits;
use crate::repo::EntityRepository;
use crate::resolve::Resolver;
use crate::schema::{ParamSpec, RefTarget, SchemaRegistry, ToolSpec};
use crate::tools::{ResolvedRefs, ToolCtx, ToolHandler, builtin_handlers};
use crate::trace::TraceLog;

/// Backoff before the single read retry.
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Validates, resolves, and executes tool calls against one repository.
pub struct Dispatcher {
    registry: SchemaRegistry,
    handlers: HashMap<&'static str, Box<dyn ToolHandler>>,
    repo: Arc<dyn EntityRepository>,
    contexts: Arc<ContextTracker>,
    trace: Arc<TraceLog>,
    limits: QueryLimits,
    candidate_cap: usize,
}

impl Dispatcher {
    pub fn new(
        registry: SchemaRegistry,
        repo: Arc<dyn EntityRepository>,
        contexts: Arc<ContextTracker>,
        trace: Arc<TraceLog>,
        limits: QueryLimits,
        candidate_cap: usize,
    ) -> Self {
        Self {
            registry,
            handlers: builtin_handlers(),
            repo,
            contexts,
            trace,
            limits,
            candidate_cap,
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Run one tool call through all three stages.
    ///
    /// Always returns a result; every failure mode is mapped into the wire
    /// error taxonomy with candidates attached for ambiguity.
    pub fn dispatch(&self, request: &ToolCallRequest) -> ToolCallResult {
        let started = Instant::now();
        self.trace.tool_call(request);

        let outcome = self.run_stages(request);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(data) => ToolCallResult::ok(data),
            Err(err) => match err.candidates() {
                Some(candidates) => ToolCallResult::fail_with_candidates(
                    err.wire_kind(),
                    err.to_string(),
                    candidates.to_vec(),
                ),
                None => ToolCallResult::fail(err.wire_kind(), err.to_string()),
            },
        };

        self.trace.tool_result(
            &request.tool_name,
            request.conversation_id.as_str(),
            elapsed_ms,
            &result,
        );
        result
    }

    fn run_stages(&self, request: &ToolCallRequest) -> Result<Value, DispatchError> {
        // Session validation happens upstream; all the engine can verify is
        // that an identity arrived at all.
        if request.user_id.is_blank() {
            return Err(DispatchError::Unauthorized);
        }

        // Validate.
        let spec = self.registry.lookup(&request.tool_name)?;
        spec.validate(&request.parameters)?;

        // Resolve. All identifier parameters resolve before execution
        // begins; the first failure aborts with nothing mutated.
        let refs = self.resolve_refs(request, spec)?;

        // Execute, with one backed-off retry for read-only tools on
        // transport failure. Mutations never retry.
        let mut outcome = self.execute(request, spec, &refs);
        if spec.category.is_read_only()
            && outcome.as_ref().is_err_and(DispatchError::is_transient)
        {
            tracing::warn!(tool = %request.tool_name, "transient read failure, retrying once");
            std::thread::sleep(RETRY_BACKOFF);
            outcome = self.execute(request, spec, &refs);
        }
        outcome
    }

    fn resolve_refs(
        &self,
        request: &ToolCallRequest,
        spec: &ToolSpec,
    ) -> Result<ResolvedRefs, DispatchError> {
        let resolver = Resolver::new(self.repo.as_ref(), &self.contexts, &self.trace)
            .with_candidate_cap(self.candidate_cap);
        let mut refs = ResolvedRefs::default();

        // First pass: parameters the call actually carries.
        let mut resolved_kinds = Vec::new();
        for param in spec.ref_params() {
            let Some(value) = request.parameters.get(&param.name) else {
                continue;
            };
            let kind = self.target_kind(request, spec, param)?;
            match value {
                Value::String(identifier) => {
                    let r = resolver.resolve(
                        identifier,
                        kind,
                        &request.user_id,
                        &request.conversation_id,
                    )?;
                    refs.insert_one(param.name.clone(), r);
                    resolved_kinds.push(kind);
                }
                Value::Array(identifiers) => {
                    let mut many = Vec::with_capacity(identifiers.len());
                    for identifier in identifiers.iter().filter_map(Value::as_str) {
                        many.push(resolver.resolve(
                            identifier,
                            kind,
                            &request.user_id,
                            &request.conversation_id,
                        )?);
                    }
                    if !many.is_empty() {
                        refs.insert_many(param.name.clone(), many);
                        resolved_kinds.push(kind);
                    }
                }
                // Type mismatches were rejected during validation.
                _ => {}
            }
        }

        // Second pass: absent subject parameters fall back to conversation
        // context, unless a sibling already named a record of that kind
        // (e.g. `ids` was given, so an omitted `id` means nothing).
        for param in spec.ref_params() {
            let Some(ref_spec) = &param.resolves else { continue };
            if !ref_spec.context_fallback || request.parameters.contains_key(&param.name) {
                continue;
            }
            let kind = self.target_kind(request, spec, param)?;
            if resolved_kinds.contains(&kind) {
                continue;
            }
            let r = resolver.resolve("", kind, &request.user_id, &request.conversation_id)?;
            refs.insert_one(param.name.clone(), r);
        }

        Ok(refs)
    }

    /// The entity kind an identifier parameter points at, fixed by the tool
    /// or named by a sibling parameter.
    fn target_kind(
        &self,
        request: &ToolCallRequest,
        spec: &ToolSpec,
        param: &ParamSpec,
    ) -> Result<EntityKind, DispatchError> {
        let ref_spec = param.resolves.as_ref().ok_or_else(|| {
            DispatchError::Execution {
                tool: spec.name.clone(),
                message: format!("parameter `{}` is not an identifier", param.name),
            }
        })?;
        match &ref_spec.target {
            RefTarget::Fixed(kind) => Ok(*kind),
            RefTarget::FromParam(sibling) => request
                .parameters
                .get(sibling)
                .and_then(Value::as_str)
                .and_then(EntityKind::from_label)
                .ok_or_else(|| {
                    crate::error::SchemaError::MissingParameter {
                        tool: spec.name.clone(),
                        param: sibling.clone(),
                    }
                    .into()
                }),
        }
    }

    fn execute(
        &self,
        request: &ToolCallRequest,
        spec: &ToolSpec,
        refs: &ResolvedRefs,
    ) -> Result<Value, DispatchError> {
        let handler = self
            .handlers
            .get(request.tool_name.as_str())
            .ok_or_else(|| DispatchError::Execution {
                tool: request.tool_name.clone(),
                message: "tool is registered but has no handler".into(),
            })?;

        let ctx = ToolCtx {
            tool_name: &spec.name,
            repo: self.repo.as_ref(),
            contexts: &self.contexts,
            trace: &self.trace,
            user: &request.user_id,
            conversation: &request.conversation_id,
            params: &request.parameters,
            refs,
            limits: self.limits,
            candidate_cap: self.candidate_cap,
        };

        // A handler panic is a logic bug: log it at ERROR with full context,
        // then abort this dispatch only.
        match std::panic::catch_unwind(AssertUnwindSafe(|| handler.execute(&ctx))) {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                let mut context = serde_json::Map::new();
                context.insert("toolName".into(), json!(request.tool_name));
                context.insert(
                    "conversationId".into(),
                    json!(request.conversation_id.as_str()),
                );
                context.insert("panic".into(), json!(message));
                self.trace.log(crate::trace::LogEvent::new(
                    crate::trace::LogLevel::Error,
                    format!("internal fault in {}", request.tool_name),
                    context,
                ));
                Err(DispatchError::Execution {
                    tool: request.tool_name.clone(),
                    message: format!("internal fault: {message}"),
                })
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("tools", &self.registry.len())
            .finish()
    }
}
