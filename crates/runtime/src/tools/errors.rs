use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("timeout after {0}ms")]
    Timeout(u64),
    #[error("execution failed: {0}")]
    Execution(String),
    /// The tool is gated and may only run once an approver says so.
    #[error("tool {0} requires approval before it can run")]
    ApprovalRequired(String),
    #[error("checkpoint store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("approval gateway failed: {0}")]
    Gateway(String),
    #[error("tool already registered: {0}")]
    Duplicate(String),
}

impl ToolError {
    /// Errors that abort the agent step instead of being reported to the model.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Gateway(_))
    }
}
