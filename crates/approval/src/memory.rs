//! In-process approval gateway.

use crate::request::{deadline, expired_decision};
use crate::{
    ApprovalGateway, ApprovalRequest, ApprovalRequestId, Decision, Error, RecordDecision, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
struct Entry {
    request: ApprovalRequest,
    submitted_at: DateTime<Utc>,
    decision: Option<Decision>,
}

/// Approval gateway that keeps requests in memory.
///
/// Decisions are recorded with [`RecordDecision::record`]. When a push
/// channel is attached, each recorded decision is also sent down it, which
/// is how tests and embedders emulate webhook delivery.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    entries: Mutex<HashMap<ApprovalRequestId, Entry>>,
    expire_after: Option<Duration>,
    push: Option<mpsc::UnboundedSender<Decision>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests still pending after `ttl` with a rejection.
    pub fn with_expiry(mut self, ttl: Duration) -> Self {
        self.expire_after = Some(ttl);
        self
    }

    /// Push every recorded decision to `tx`.
    pub fn with_push(mut self, tx: mpsc::UnboundedSender<Decision>) -> Self {
        self.push = Some(tx);
        self
    }

    /// Requests without a decision, in no particular order.
    pub fn pending(&self) -> Result<Vec<(ApprovalRequestId, ApprovalRequest)>> {
        Ok(self
            .lock()?
            .iter()
            .filter(|(_, e)| e.decision.is_none())
            .map(|(id, e)| (id.clone(), e.request.clone()))
            .collect())
    }

    /// The request as submitted.
    pub fn request(&self, id: &ApprovalRequestId) -> Result<ApprovalRequest> {
        self.lock()?
            .get(id)
            .map(|e| e.request.clone())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Total number of submissions.
    pub fn submitted(&self) -> usize {
        self.lock().map(|e| e.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<ApprovalRequestId, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Unavailable("gateway lock poisoned".into()))
    }
}

#[async_trait]
impl ApprovalGateway for MemoryGateway {
    async fn submit(&self, request: &ApprovalRequest) -> Result<ApprovalRequestId> {
        let id = ApprovalRequestId::generate();
        self.lock()?.insert(
            id.clone(),
            Entry {
                request: request.clone(),
                submitted_at: Utc::now(),
                decision: None,
            },
        );
        tracing::info!(
            approval_request_id = %id,
            tool = %request.tool_name,
            checkpoint_id = %request.checkpoint_id,
            "approval requested"
        );
        Ok(id)
    }

    async fn fetch_decision(&self, id: &ApprovalRequestId) -> Result<Option<Decision>> {
        let mut entries = self.lock()?;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if entry.decision.is_none() {
            let expired = deadline(entry.submitted_at, self.expire_after)
                .is_some_and(|at| Utc::now() >= at);
            if expired {
                tracing::warn!(approval_request_id = %id, "approval request expired");
                entry.decision = Some(expired_decision(id, &entry.request.checkpoint_id));
            }
        }
        Ok(entry.decision.clone())
    }
}

impl RecordDecision for MemoryGateway {
    fn record(
        &self,
        id: &ApprovalRequestId,
        approved: bool,
        feedback: Option<String>,
    ) -> Result<Decision> {
        let decision = {
            let mut entries = self.lock()?;
            let entry = entries
                .get_mut(id)
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            if entry.decision.is_some() {
                return Err(Error::AlreadyDecided(id.to_string()));
            }
            let decision = Decision {
                approval_request_id: id.clone(),
                approved,
                feedback,
                correlation: Some(entry.request.checkpoint_id.clone()),
            };
            entry.decision = Some(decision.clone());
            decision
        };

        if let Some(tx) = &self.push {
            if tx.send(decision.clone()).is_err() {
                tracing::warn!(approval_request_id = %id, "decision receiver dropped");
            }
        }
        Ok(decision)
    }
}
