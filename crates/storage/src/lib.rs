//! Checkpoint persistence for suspended agent runs.
//!
//! When a tool call needs approval, the run is parked: its message history
//! and the intercepted call are written to a [`CheckpointStore`] and the
//! process moves on. Whoever later receives the approver's decision loads
//! the checkpoint back, exactly once, and continues the run.
//!
//! # Core Concepts
//!
//! ## Checkpoint
//!
//! A [`Checkpoint`] holds:
//! - the [`RunId`] of the run that was parked
//! - the message history up to the assistant turn that made the call
//! - the [`PendingCall`] (call id, tool name, arguments)
//!
//! Checkpoints are immutable once saved.
//!
//! ## CheckpointStore
//!
//! The [`CheckpointStore`] trait is the persistence contract. Besides
//! `save`/`load`/`consume` it offers `take`, an atomic load-and-consume: two
//! coordinators racing on the same id will see exactly one success and one
//! [`Error::NotFound`]. This is what keeps a side-effecting tool from running
//! twice when a decision is delivered twice.
//!
//! Two implementations ship here:
//! - [`SqliteCheckpointStore`]: durable, safe to share between processes
//! - [`MemoryCheckpointStore`]: process-local, for tests and embedding
//!
//! ## Messages
//!
//! The conversation types ([`Message`], [`Part`], [`ToolCall`], [`ToolResult`])
//! live here because checkpoints capture them.
//!
//! # Example
//!
//! ```no_run
//! use storage::{Checkpoint, CheckpointStore, Message, PendingCall, RunId, SqliteCheckpointStore};
//!
//! let store = SqliteCheckpointStore::open("checkpoints.db")?;
//!
//! let checkpoint = Checkpoint::new(
//!     RunId::new(),
//!     vec![Message::user("Make it warm and sunny in Paris")],
//!     PendingCall {
//!         tool_call_id: "call_1".into(),
//!         tool_name: "changeWeather".into(),
//!         arguments: serde_json::json!({"city": "Paris"}),
//!     },
//! );
//! let id = store.save(&checkpoint)?;
//!
//! // Later, on another process perhaps:
//! let parked = store.take(&id)?;
//! assert_eq!(parked.pending_call.tool_name, "changeWeather");
//! assert!(store.take(&id).unwrap_err().is_not_found());
//! # Ok::<(), storage::Error>(())
//! ```

mod checkpoint;
mod error;
mod memory;
mod message;
mod store;

pub use checkpoint::{Checkpoint, CheckpointId, CheckpointSummary, PendingCall, RunId};
pub use error::{Error, Result};
pub use memory::MemoryCheckpointStore;
pub use message::{
    Message, Part, Role, ToolCall, ToolOutcome, ToolResult, push_tool_result,
    unanswered_tool_calls,
};
pub use store::{CheckpointStore, SqliteCheckpointStore};
