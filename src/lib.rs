//! # amanu
//!
//! A conversational tool-dispatch and entity-resolution engine for a
//! personal organizer. A language model plans; amanu validates, resolves,
//! and executes.
//!
//! ## Architecture
//!
//! - **Schema registry** (`schema`): typed parameter contracts for every tool
//! - **Resolver** (`resolve`): free text, UUIDs, and pronouns to exact records
//! - **Query engine** (`query`): structured listing and free-text search, grouped by kind
//! - **Context tracker** (`context`): per-conversation last-mentioned records
//! - **Dispatcher** (`dispatch`): Validate → Resolve → Execute with a panic wall
//! - **Trace log** (`trace`): structured events fanned out to console, memory, and disk
//!
//! ## Library usage
//!
//! ```no_run
//! use amanu::engine::Engine;
//! use amanu::entity::{ConversationId, UserId};
//! use amanu::protocol::ToolCallRequest;
//! use serde_json::json;
//!
//! let engine = Engine::in_memory().unwrap();
//! let request = ToolCallRequest::new(
//!     "create_task",
//!     json!({"title": "Water the plants"}).as_object().cloned().unwrap(),
//!     UserId::new("u-1"),
//!     ConversationId::new("c-1"),
//! );
//! let result = engine.dispatch(&request);
//! assert!(result.success);
//! ```

pub mod config;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod entity;
pub mod error;
pub mod protocol;
pub mod query;
pub mod repo;
pub mod resolve;
pub mod schema;
pub mod store;
pub mod tools;
pub mod trace;
