//! Approval gating for side-effecting tools.
//!
//! A gated tool never runs when the model calls it. Instead the run is
//! snapshotted into the checkpoint store, an approval request is submitted,
//! and the invocation returns [`ToolFlow::Suspend`]. The body only runs later,
//! through the resume coordinator, once a decision approves it.

use crate::model::ToolSpec;
use crate::tools::{Tool, ToolContext, ToolError, ToolFlow};
use approval::{ApprovalGateway, ApprovalRequest, ApprovalRequestId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use storage::{Checkpoint, CheckpointId, CheckpointStore, PendingCall};

/// A tool call parked until an approver decides on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub approval_request_id: ApprovalRequestId,
    pub checkpoint_id: CheckpointId,
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// Wraps tools so that calling them suspends the run for approval.
#[derive(Clone)]
pub struct ApprovalGate {
    store: Arc<dyn CheckpointStore>,
    gateway: Arc<dyn ApprovalGateway>,
}

impl ApprovalGate {
    pub fn new(store: Arc<dyn CheckpointStore>, gateway: Arc<dyn ApprovalGateway>) -> Self {
        Self { store, gateway }
    }

    /// Wrap `tool`; the result has the same spec but suspends on invoke.
    pub fn require_approval(&self, tool: impl Tool + 'static) -> InterruptibleTool {
        self.wrap(Arc::new(tool))
    }

    pub(crate) fn wrap(&self, tool: Arc<dyn Tool>) -> InterruptibleTool {
        InterruptibleTool {
            inner: tool,
            gate: self.clone(),
        }
    }

    /// Checkpoint the run and submit an approval request for `args`.
    ///
    /// Nothing is submitted if the checkpoint cannot be saved. If the submit
    /// fails the checkpoint is consumed again so no orphan can be resumed.
    pub async fn suspend(
        &self,
        ctx: &ToolContext<'_>,
        tool_name: &str,
        args: Value,
    ) -> Result<PendingApproval, ToolError> {
        let checkpoint = Checkpoint::new(
            ctx.run_id,
            ctx.history.to_vec(),
            PendingCall {
                tool_call_id: ctx.call.id.clone(),
                tool_name: tool_name.to_string(),
                arguments: args.clone(),
            },
        );

        let checkpoint_id = self.store.save(&checkpoint).map_err(|e| {
            tracing::error!(run_id = %ctx.run_id, tool = %tool_name, error = %e, "checkpoint save failed");
            ToolError::StoreUnavailable(e.to_string())
        })?;

        let request = ApprovalRequest::new(tool_name, args.clone(), checkpoint_id.as_str());
        let approval_request_id = match self.gateway.submit(&request).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(
                    run_id = %ctx.run_id,
                    checkpoint_id = %checkpoint_id,
                    tool = %tool_name,
                    error = %e,
                    "approval submit failed"
                );
                if let Err(consume_err) = self.store.consume(&checkpoint_id) {
                    tracing::warn!(
                        checkpoint_id = %checkpoint_id,
                        error = %consume_err,
                        "could not discard checkpoint after failed submit"
                    );
                }
                return Err(ToolError::Gateway(e.to_string()));
            }
        };

        tracing::info!(
            run_id = %ctx.run_id,
            checkpoint_id = %checkpoint_id,
            approval_request_id = %approval_request_id,
            tool = %tool_name,
            "tool call suspended pending approval"
        );

        Ok(PendingApproval {
            approval_request_id,
            checkpoint_id,
            tool_call_id: ctx.call.id.clone(),
            tool_name: tool_name.to_string(),
            arguments: args,
        })
    }
}

/// A tool that asks for approval instead of running.
pub struct InterruptibleTool {
    inner: Arc<dyn Tool>,
    gate: ApprovalGate,
}

impl InterruptibleTool {
    /// The wrapped tool.
    pub fn inner(&self) -> &Arc<dyn Tool> {
        &self.inner
    }
}

#[async_trait]
impl Tool for InterruptibleTool {
    fn spec(&self) -> &ToolSpec {
        self.inner.spec()
    }

    async fn execute(&self, _args: Value) -> Result<Value, ToolError> {
        Err(ToolError::ApprovalRequired(self.spec().name.clone()))
    }

    async fn invoke(&self, ctx: &ToolContext<'_>, args: Value) -> Result<ToolFlow, ToolError> {
        let pending = self.gate.suspend(ctx, &self.spec().name, args).await?;
        Ok(ToolFlow::Suspend(pending))
    }

    async fn approved(&self, args: Value, response: Option<&str>) -> Result<Value, ToolError> {
        self.inner.approved(args, response).await
    }
}
