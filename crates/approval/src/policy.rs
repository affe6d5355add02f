//! Policy configuration and enforcement.
//!
//! A policy answers the easy requests on the approver's behalf. Tools on the
//! allow list are approved, tools on the deny list are rejected, everything
//! else escalates to a human through the wrapped gateway.

use crate::{
    ApprovalGateway, ApprovalRequest, ApprovalRequestId, Decision, Error, RecordDecision, Result,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_DENY_FEEDBACK: &str = "denied by policy";

/// Policy configuration loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Tools approved without asking.
    #[serde(default)]
    pub allow: AllowRules,

    /// Tools rejected without asking (overrides allow).
    #[serde(default)]
    pub deny: DenyRules,
}

/// Rules for approved tools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllowRules {
    /// Tool name patterns: exact, `prefix*`, or `*`.
    #[serde(default)]
    pub tools: Vec<String>,
}

/// Rules for rejected tools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DenyRules {
    #[serde(default)]
    pub tools: Vec<String>,

    /// Feedback handed to the agent on a policy rejection.
    #[serde(default)]
    pub feedback: Option<String>,
}

/// Result of a policy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Approve,
    Reject { feedback: String },
    Escalate,
}

impl Policy {
    /// Load policy from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse policy from TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        toml::from_str(toml).map_err(|e| Error::Parse(e.to_string()))
    }

    /// True when the policy never answers on its own.
    pub fn is_empty(&self) -> bool {
        self.allow.tools.is_empty() && self.deny.tools.is_empty()
    }

    /// Check an approval request against the rules.
    pub fn check(&self, request: &ApprovalRequest) -> Verdict {
        let name = request.tool_name.as_str();

        // Check explicit denials first
        if matches_any(&self.deny.tools, name) {
            return Verdict::Reject {
                feedback: self
                    .deny
                    .feedback
                    .clone()
                    .unwrap_or_else(|| DEFAULT_DENY_FEEDBACK.to_string()),
            };
        }

        if matches_any(&self.allow.tools, name) {
            Verdict::Approve
        } else {
            Verdict::Escalate
        }
    }
}

fn matches_any(patterns: &[String], name: &str) -> bool {
    patterns.iter().any(|pattern| {
        if pattern == "*" {
            return true;
        }
        match pattern.strip_suffix('*') {
            Some(prefix) => name.starts_with(prefix),
            None => pattern == name,
        }
    })
}

/// Gateway that applies a [`Policy`] before escalating.
///
/// Every request is still submitted to the inner gateway, so policy answers
/// are recorded there and look like any other decision to a poller in
/// another process.
pub struct PolicyGateway<G> {
    policy: Policy,
    inner: G,
}

impl<G> PolicyGateway<G> {
    pub fn new(policy: Policy, inner: G) -> Self {
        Self { policy, inner }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }
}

#[async_trait]
impl<G> ApprovalGateway for PolicyGateway<G>
where
    G: ApprovalGateway + RecordDecision,
{
    async fn submit(&self, request: &ApprovalRequest) -> Result<ApprovalRequestId> {
        let id = self.inner.submit(request).await?;
        match self.policy.check(request) {
            Verdict::Approve => {
                tracing::info!(approval_request_id = %id, tool = %request.tool_name, "approved by policy");
                self.inner.record(&id, true, None)?;
            }
            Verdict::Reject { feedback } => {
                tracing::info!(approval_request_id = %id, tool = %request.tool_name, "rejected by policy");
                self.inner.record(&id, false, Some(feedback))?;
            }
            Verdict::Escalate => {}
        }
        Ok(id)
    }

    async fn fetch_decision(&self, id: &ApprovalRequestId) -> Result<Option<Decision>> {
        self.inner.fetch_decision(id).await
    }
}

impl<G: RecordDecision> RecordDecision for PolicyGateway<G> {
    fn record(
        &self,
        id: &ApprovalRequestId,
        approved: bool,
        feedback: Option<String>,
    ) -> Result<Decision> {
        self.inner.record(id, approved, feedback)
    }
}
