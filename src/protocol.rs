//! Wire contract between the model-calling client and the engine.
//!
//! A [`ToolCallRequest`] comes in from the model, untrusted; a
//! [`ToolCallResult`] goes back out. The result must be informative enough for
//! the model to ask a clarifying question or retry, so failures carry a
//! machine-readable [`ErrorKind`] and, for ambiguity, a [`Candidate`] list.
//! Field names follow the JSON convention of the calling client (camelCase).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::{ConversationId, EntityId, UserId};

/// One tool call selected by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRequest {
    pub tool_name: String,
    /// Raw parameter map as the model produced it. Validated against the
    /// registry before anything else touches it.
    #[serde(default)]
    pub parameters: serde_json::Map<String, Value>,
    pub user_id: UserId,
    pub conversation_id: ConversationId,
}

impl ToolCallRequest {
    pub fn new(
        tool_name: impl Into<String>,
        parameters: serde_json::Map<String, Value>,
        user_id: UserId,
        conversation_id: ConversationId,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters,
            user_id,
            conversation_id,
        }
    }
}

/// Machine-readable failure classification surfaced to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    NotFound,
    AmbiguousMatch,
    Unauthorized,
    ExecutionError,
}

impl ErrorKind {
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::ValidationError => "validation_error",
            Self::NotFound => "not_found",
            Self::AmbiguousMatch => "ambiguous_match",
            Self::Unauthorized => "unauthorized",
            Self::ExecutionError => "execution_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// One disambiguation choice offered back to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: EntityId,
    pub title: String,
    /// Short human-readable field that tells this candidate apart from the
    /// others (task status, event start, last edit).
    pub distinguishing_field: String,
}

/// Structured failure payload of a [`ToolCallResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<Candidate>>,
}

/// Outcome of one dispatched tool call.
///
/// Never both successful and carrying an error; build through [`Self::ok`]
/// and [`Self::fail`] to keep that invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolCallError>,
}

impl ToolCallResult {
    /// Successful result with a payload.
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed result.
    pub fn fail(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ToolCallError {
                kind,
                message: message.into(),
                candidates: None,
            }),
        }
    }

    /// Failed result carrying disambiguation candidates.
    pub fn fail_with_candidates(
        kind: ErrorKind,
        message: impl Into<String>,
        candidates: Vec<Candidate>,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ToolCallError {
                kind,
                message: message.into(),
                candidates: Some(candidates),
            }),
        }
    }

    /// The error kind, when this is a failure.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}
