//! Approval request and decision payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// Feedback attached to decisions synthesized for expired requests.
pub const EXPIRED_FEEDBACK: &str = "approval request expired without a decision";

/// Opaque identifier assigned by a gateway on submit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalRequestId(String);

impl ApprovalRequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ApprovalRequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ApprovalRequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ApprovalRequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an approver is asked to decide on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub tool_name: String,
    /// Arguments the agent supplied, already valid against the tool schema.
    pub arguments: Value,
    /// Correlation value echoed back on the decision.
    pub checkpoint_id: String,
}

impl ApprovalRequest {
    pub fn new(
        tool_name: impl Into<String>,
        arguments: Value,
        checkpoint_id: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            checkpoint_id: checkpoint_id.into(),
        }
    }
}

/// An approver's answer to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub approval_request_id: ApprovalRequestId,
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    /// The checkpoint id from the original request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<String>,
}

impl Decision {
    /// Create an approval.
    pub fn approve(approval_request_id: impl Into<ApprovalRequestId>) -> Self {
        Self {
            approval_request_id: approval_request_id.into(),
            approved: true,
            feedback: None,
            correlation: None,
        }
    }

    /// Create a rejection.
    pub fn reject(approval_request_id: impl Into<ApprovalRequestId>) -> Self {
        Self {
            approved: false,
            ..Self::approve(approval_request_id)
        }
    }

    /// Set feedback.
    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }

    /// Set the correlation value (checkpoint id).
    pub fn with_correlation(mut self, correlation: impl Into<String>) -> Self {
        self.correlation = Some(correlation.into());
        self
    }
}

/// Deadline after which a parked request is answered with a rejection.
pub(crate) fn deadline(submitted_at: DateTime<Utc>, expire_after: Option<Duration>) -> Option<DateTime<Utc>> {
    let ttl = chrono::Duration::from_std(expire_after?).ok()?;
    Some(submitted_at + ttl)
}

/// Synthetic rejection for a request whose deadline passed.
pub(crate) fn expired_decision(id: &ApprovalRequestId, correlation: &str) -> Decision {
    Decision::reject(id.clone())
        .with_feedback(EXPIRED_FEEDBACK)
        .with_correlation(correlation)
}
