//! Approval gateway contract.

use crate::{ApprovalRequest, ApprovalRequestId, Decision, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// The boundary to whoever approves tool calls.
///
/// `submit` only records that a decision is expected; it never waits for the
/// approver. Decisions come back either through [`fetch_decision`] (poll) or
/// pushed by the transport straight into the resume coordinator.
///
/// [`fetch_decision`]: ApprovalGateway::fetch_decision
#[async_trait]
pub trait ApprovalGateway: Send + Sync {
    /// Submit a request, returning the gateway-assigned id.
    async fn submit(&self, request: &ApprovalRequest) -> Result<ApprovalRequestId>;

    /// Current decision for a request, or `None` while it is still pending.
    async fn fetch_decision(&self, id: &ApprovalRequestId) -> Result<Option<Decision>>;
}

/// Gateways that can record a decision locally (an approver acting in-process
/// or a policy engine answering on the approver's behalf).
pub trait RecordDecision {
    /// Record the decision for a pending request.
    ///
    /// Fails with [`Error::AlreadyDecided`](crate::Error::AlreadyDecided) if a
    /// decision exists; the first decision is final.
    fn record(
        &self,
        id: &ApprovalRequestId,
        approved: bool,
        feedback: Option<String>,
    ) -> Result<Decision>;
}

#[async_trait]
impl<T: ApprovalGateway + ?Sized> ApprovalGateway for Arc<T> {
    async fn submit(&self, request: &ApprovalRequest) -> Result<ApprovalRequestId> {
        (**self).submit(request).await
    }

    async fn fetch_decision(&self, id: &ApprovalRequestId) -> Result<Option<Decision>> {
        (**self).fetch_decision(id).await
    }
}

impl<T: RecordDecision + ?Sized> RecordDecision for Arc<T> {
    fn record(
        &self,
        id: &ApprovalRequestId,
        approved: bool,
        feedback: Option<String>,
    ) -> Result<Decision> {
        (**self).record(id, approved, feedback)
    }
}
