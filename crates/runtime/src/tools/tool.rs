//! Tool trait.

use crate::interrupt::PendingApproval;
use crate::model::{Message, ToolCall, ToolSpec};
use crate::tools::ToolError;
use async_trait::async_trait;
use serde_json::Value;
use storage::RunId;

/// What the agent loop knows at the moment it invokes a tool.
#[derive(Debug, Clone, Copy)]
pub struct ToolContext<'a> {
    pub run_id: RunId,
    /// History up to the assistant turn that made the call, plus results
    /// already produced for earlier calls of that turn.
    pub history: &'a [Message],
    pub call: &'a ToolCall,
}

/// How a tool invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolFlow {
    Complete(Value),
    /// The call was parked for approval; there is no result yet.
    Suspend(PendingApproval),
}

/// Trait for tools the agent can call.
///
/// This is the boundary between the model loop and side effects. Ordinary
/// tools only implement [`execute`](Tool::execute); wrappers that need the
/// loop's state override [`invoke`](Tool::invoke).
#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> &ToolSpec;

    /// Run the tool body.
    async fn execute(&self, args: Value) -> Result<Value, ToolError>;

    /// Entry point used by the agent loop.
    async fn invoke(&self, ctx: &ToolContext<'_>, args: Value) -> Result<ToolFlow, ToolError> {
        let _ = ctx;
        self.execute(args).await.map(ToolFlow::Complete)
    }

    /// Result for a call an approver has approved. `response` is the text
    /// the approver sent with the decision; most tools ignore it and run.
    async fn approved(&self, args: Value, response: Option<&str>) -> Result<Value, ToolError> {
        let _ = response;
        self.execute(args).await
    }
}
