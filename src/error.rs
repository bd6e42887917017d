//! Rich diagnostic error types for the amanu engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]`
//! derives, providing error codes and help text so callers know exactly what
//! went wrong and how to fix it. The dispatcher flattens these into the wire
//! taxonomy (`validation_error`, `not_found`, `ambiguous_match`,
//! `unauthorized`, `execution_error`) via [`DispatchError::wire_kind`].

use miette::Diagnostic;
use thiserror::Error;

use crate::entity::EntityKind;
use crate::protocol::{Candidate, ErrorKind};

/// Top-level error type for the amanu engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full
/// diagnostic chain (error codes, help text) through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum AmanuError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),
}

// ---------------------------------------------------------------------------
// Schema errors
// ---------------------------------------------------------------------------

/// Parameter validation failures, raised before any repository access.
#[derive(Debug, Error, Diagnostic)]
pub enum SchemaError {
    #[error("unknown tool: {name}")]
    #[diagnostic(
        code(amanu::schema::unknown_tool),
        help(
            "No tool with this name is registered. The callable catalog is \
             fixed at startup; list it with `amanu schema`."
        )
    )]
    UnknownTool { name: String },

    #[error("tool {tool}: missing required parameter `{param}`")]
    #[diagnostic(
        code(amanu::schema::missing_parameter),
        help("Supply the parameter. Required parameters are listed in the tool catalog.")
    )]
    MissingParameter { tool: String, param: String },

    #[error("tool {tool}: parameter `{param}` must be {expected}, got {actual}")]
    #[diagnostic(
        code(amanu::schema::wrong_type),
        help(
            "The parameter value has the wrong JSON type. Check the tool \
             catalog for the declared parameter shapes."
        )
    )]
    WrongType {
        tool: String,
        param: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("tool {tool}: parameter `{param}` value `{value}` is not one of {allowed}")]
    #[diagnostic(
        code(amanu::schema::invalid_enum_value),
        help("Use one of the allowed values exactly as listed in the tool catalog.")
    )]
    InvalidEnumValue {
        tool: String,
        param: String,
        value: String,
        allowed: String,
    },

    #[error("tool {tool}: parameter `{param}` is invalid: {message}")]
    #[diagnostic(
        code(amanu::schema::invalid_value),
        help(
            "The value parsed as the right JSON type but failed semantic \
             checks (date syntax, known entity kind, non-empty string)."
        )
    )]
    InvalidValue {
        tool: String,
        param: String,
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Resolution errors
// ---------------------------------------------------------------------------

/// Outcomes of turning an identifier string into a concrete owned record.
#[derive(Debug, Error, Diagnostic)]
pub enum ResolveError {
    #[error("no {kind} matching `{identifier}` found")]
    #[diagnostic(
        code(amanu::resolve::not_found),
        help(
            "The identifier matched no record owned by this user. A well-formed \
             UUID that misses fails here on purpose; it is never retried as a \
             text search. For text, try query_entities to list what exists."
        )
    )]
    NotFound {
        identifier: String,
        kind: EntityKind,
    },

    #[error("no prior {kind} reference in this conversation")]
    #[diagnostic(
        code(amanu::resolve::no_prior_mention),
        help(
            "Pronoun-like identifiers resolve from conversation memory, and \
             none of this kind has been mentioned yet. Refer to the record by \
             title or id once; later turns can then say `it` or `that`."
        )
    )]
    NoPriorMention { kind: EntityKind },

    #[error("`{identifier}` matches {count} {kind} records")]
    #[diagnostic(
        code(amanu::resolve::ambiguous),
        help(
            "More than one owned record matches. Pick one of the returned \
             candidates and retry with its id, never a guess."
        )
    )]
    Ambiguous {
        identifier: String,
        kind: EntityKind,
        count: usize,
        candidates: Vec<Candidate>,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Repo(#[from] RepoError),
}

// ---------------------------------------------------------------------------
// Repository errors
// ---------------------------------------------------------------------------

/// Failures surfaced by an [`EntityRepository`](crate::repo::EntityRepository)
/// backend.
#[derive(Debug, Error, Diagnostic)]
pub enum RepoError {
    #[error("constraint violation: {message}")]
    #[diagnostic(
        code(amanu::repo::conflict),
        help("The write conflicted with an existing record or invariant of the backend.")
    )]
    Conflict { message: String },

    #[error("repository unavailable: {message}")]
    #[diagnostic(
        code(amanu::repo::unavailable),
        help(
            "The backing store could not be reached. Read operations are \
             retried once; mutations are not, to avoid duplicate side effects."
        )
    )]
    Unavailable { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(amanu::repo::serde),
        help(
            "Failed to serialize or deserialize a record. This usually means \
             the stored snapshot format changed between versions."
        )
    )]
    Serialization { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Failures in the embedded durable store (snapshots, the durable log sink).
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error: {source}")]
    #[diagnostic(
        code(amanu::store::io),
        help(
            "A filesystem operation failed. Check that the data directory \
             exists, has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(amanu::store::redb),
        help(
            "The embedded database encountered a transaction error. This may \
             indicate corruption; try a fresh data directory."
        )
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(amanu::store::serde),
        help("Failed to serialize or deserialize stored data.")
    )]
    Serialization { message: String },

    #[error("key not found: {key}")]
    #[diagnostic(
        code(amanu::store::not_found),
        help("The requested key does not exist in the store.")
    )]
    NotFound { key: String },
}

// ---------------------------------------------------------------------------
// Dispatch errors
// ---------------------------------------------------------------------------

/// Everything that can stop a tool call, in wire-taxonomy terms.
#[derive(Debug, Error, Diagnostic)]
pub enum DispatchError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] SchemaError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Repo(#[from] RepoError),

    #[error("no authenticated user on this request")]
    #[diagnostic(
        code(amanu::dispatch::unauthorized),
        help(
            "The userId field was empty. Session validation happens upstream \
             of the engine; it must hand every request a user identity."
        )
    )]
    Unauthorized,

    #[error("tool {tool} failed: {message}")]
    #[diagnostic(
        code(amanu::dispatch::execution),
        help(
            "The operation was valid but the repository or an internal step \
             failed while executing it. Safe to retry for reads; inspect the \
             log before retrying mutations."
        )
    )]
    Execution { tool: String, message: String },
}

impl DispatchError {
    /// The wire `error.kind` this failure maps to.
    pub fn wire_kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::Resolve(e) => match e {
                ResolveError::Ambiguous { .. } => ErrorKind::AmbiguousMatch,
                ResolveError::NotFound { .. } | ResolveError::NoPriorMention { .. } => {
                    ErrorKind::NotFound
                }
                ResolveError::Repo(_) => ErrorKind::ExecutionError,
            },
            Self::Repo(_) => ErrorKind::ExecutionError,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Execution { .. } => ErrorKind::ExecutionError,
        }
    }

    /// Candidate list for disambiguation, when this failure carries one.
    pub fn candidates(&self) -> Option<&[Candidate]> {
        match self {
            Self::Resolve(ResolveError::Ambiguous { candidates, .. }) => Some(candidates),
            _ => None,
        }
    }

    /// Transport failures worth one retry — for read operations only.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Repo(RepoError::Unavailable { .. })
                | Self::Resolve(ResolveError::Repo(RepoError::Unavailable { .. }))
        )
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    #[diagnostic(
        code(amanu::config::read),
        help("Check that the file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {path} is not valid TOML: {message}")]
    #[diagnostic(
        code(amanu::config::parse),
        help("Fix the TOML syntax. See `EngineConfig` for the recognized fields.")
    )]
    Parse { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(amanu::config::invalid),
        help("Check the EngineConfig fields. {message}")
    )]
    Invalid { message: String },
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(amanu::engine::invalid_config),
        help("Check the EngineConfig fields. {message}")
    )]
    InvalidConfig { message: String },

    #[error("data directory error: {path}")]
    #[diagnostic(
        code(amanu::engine::data_dir),
        help(
            "The data directory could not be created or accessed. Ensure the \
             path exists and has read/write permissions."
        )
    )]
    DataDir { path: String },
}

/// Convenience alias for functions returning amanu results.
pub type AmanuResult<T> = std::result::Result<T, AmanuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_converts_to_amanu_error() {
        let err = SchemaError::UnknownTool {
            name: "create_widget".into(),
        };
        let top: AmanuError = err.into();
        assert!(matches!(
            top,
            AmanuError::Schema(SchemaError::UnknownTool { .. })
        ));
    }

    #[test]
    fn resolve_error_wraps_repo_error() {
        let repo = RepoError::Unavailable {
            message: "connection reset".into(),
        };
        let resolve: ResolveError = repo.into();
        assert!(matches!(resolve, ResolveError::Repo(_)));
    }

    #[test]
    fn wire_kind_mapping_is_total() {
        let validation: DispatchError = SchemaError::MissingParameter {
            tool: "create_task".into(),
            param: "title".into(),
        }
        .into();
        assert_eq!(validation.wire_kind(), ErrorKind::ValidationError);

        let ambiguous: DispatchError = ResolveError::Ambiguous {
            identifier: "Test".into(),
            kind: EntityKind::Task,
            count: 2,
            candidates: vec![],
        }
        .into();
        assert_eq!(ambiguous.wire_kind(), ErrorKind::AmbiguousMatch);

        let missing: DispatchError = ResolveError::NoPriorMention {
            kind: EntityKind::Note,
        }
        .into();
        assert_eq!(missing.wire_kind(), ErrorKind::NotFound);

        assert_eq!(
            DispatchError::Unauthorized.wire_kind(),
            ErrorKind::Unauthorized
        );

        let transport: DispatchError = ResolveError::Repo(RepoError::Unavailable {
            message: "timeout".into(),
        })
        .into();
        assert_eq!(transport.wire_kind(), ErrorKind::ExecutionError);
    }

    #[test]
    fn only_unavailable_repo_errors_are_transient() {
        let transient: DispatchError = RepoError::Unavailable {
            message: "connection reset".into(),
        }
        .into();
        assert!(transient.is_transient());

        let conflict: DispatchError = RepoError::Conflict {
            message: "duplicate".into(),
        }
        .into();
        assert!(!conflict.is_transient());
        assert!(!DispatchError::Unauthorized.is_transient());
    }

    #[test]
    fn error_display_messages_are_descriptive() {
        let err = SchemaError::WrongType {
            tool: "create_task".into(),
            param: "title".into(),
            expected: "string",
            actual: "number",
        };
        let msg = format!("{err}");
        assert!(msg.contains("create_task"));
        assert!(msg.contains("title"));
        assert!(msg.contains("string"));
    }

    #[test]
    fn ambiguous_carries_candidates() {
        let err: DispatchError = ResolveError::Ambiguous {
            identifier: "Test".into(),
            kind: EntityKind::Task,
            count: 2,
            candidates: vec![
                Candidate {
                    id: crate::entity::EntityId::new(),
                    title: "Test".into(),
                    distinguishing_field: "status: todo".into(),
                },
                Candidate {
                    id: crate::entity::EntityId::new(),
                    title: "Test".into(),
                    distinguishing_field: "status: done".into(),
                },
            ],
        }
        .into();
        assert_eq!(err.candidates().map(<[Candidate]>::len), Some(2));
    }
}
