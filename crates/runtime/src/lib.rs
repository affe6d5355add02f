//! Lockkeeper runtime: an agent loop whose side-effecting tools wait for approval.
//!
//! # Overview
//!
//! - **AgentLoop**: calls the model, dispatches its tool calls, and stops when
//!   the model answers or a gated tool suspends the run.
//! - **ApprovalGate**: wraps a tool so that calling it saves a checkpoint,
//!   submits an approval request, and suspends instead of running.
//! - **ResumeCoordinator**: applies a decision to its checkpoint. Approved
//!   calls run the original tool; rejected calls get the approver's feedback
//!   as their result. Either way the continued history goes back to the loop.
//!
//! # Example
//!
//! ```no_run
//! use approval::LedgerGateway;
//! use runtime::{
//!     AgentLoop, AnthropicBackend, ApprovalGate, FnTool, LoopOutcome, ResumeCoordinator,
//!     ToolSet, ToolSpec,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use storage::SqliteCheckpointStore;
//!
//! # async fn example() -> runtime::Result<()> {
//! let store = Arc::new(SqliteCheckpointStore::open("lockkeeper.db")?);
//! let gateway = Arc::new(LedgerGateway::open("lockkeeper.db")?);
//! let gate = ApprovalGate::new(store.clone(), gateway.clone());
//!
//! let mut tools = ToolSet::new();
//! let deploy = FnTool::new(
//!     ToolSpec::new("deploy", "Deploy a service", json!({"type": "object"})),
//!     |_| async { Ok(json!("deployed")) },
//! );
//! tools.register_gated(deploy, &gate)?;
//! let tools = Arc::new(tools);
//!
//! let backend = AnthropicBackend::builder("sk-ant-...", "claude-sonnet-4-20250514").build();
//! let agent = AgentLoop::new(backend, tools.clone());
//! let coordinator = ResumeCoordinator::new(store, tools);
//!
//! let (_, outcome) = agent.start("ship it").await?;
//! if let LoopOutcome::Suspended { pending, .. } = outcome {
//!     let resumed = coordinator
//!         .wait_for_decision(gateway.as_ref(), &pending.approval_request_id, Duration::from_secs(1))
//!         .await?;
//!     let _ = agent.resume(resumed).await?;
//! }
//! # Ok(())
//! # }
//! ```

mod agent;
mod coordinator;
mod error;
mod interrupt;
pub mod model;
mod providers;
pub mod tools;

pub use agent::{AgentLoop, LoopOutcome};
pub use coordinator::{DEFAULT_REJECTION, ResumeCoordinator, ResumeKind, ResumeState, Resumed};
pub use error::{Error, Result};
pub use interrupt::{ApprovalGate, InterruptibleTool, PendingApproval};
pub use model::{Backend, ModelError, ModelRequest, ModelResponse, ToolSpec, Usage};
pub use providers::{AnthropicBackend, AnthropicBackendBuilder, ScriptedBackend};
pub use tools::{
    CONTACT_HUMAN, ContactHuman, FnTool, Tool, ToolContext, ToolError, ToolFlow, ToolSet,
};
