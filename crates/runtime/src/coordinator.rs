//! Resume coordinator.
//!
//! Turns an approval decision back into a runnable history. The checkpoint
//! named by the decision's correlation is taken from the store in one atomic
//! step, so a duplicate or concurrent delivery for the same checkpoint finds
//! nothing and the tool body runs at most once.

use crate::interrupt::PendingApproval;
use crate::model::{Message, ToolOutcome, ToolResult};
use crate::tools::{ToolError, ToolSet};
use crate::{Error, Result};
use approval::{ApprovalGateway, ApprovalRequestId, Decision};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storage::{Checkpoint, CheckpointId, CheckpointStore, PendingCall, RunId, push_tool_result};

/// Tool output used when a rejection carries no feedback.
pub const DEFAULT_REJECTION: &str = "tool call rejected";

/// Finished checkpoints whose state stays visible through `status`.
const DEFAULT_FINISHED_RETAINED: usize = 256;

/// Where a checkpoint is in its resume lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeState {
    Pending,
    Resolving,
    Completed,
    Failed,
}

impl ResumeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// How the pending call was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeKind {
    /// Approved and the tool succeeded.
    Executed,
    /// Approved but the tool failed; the error is in the history.
    ExecutionFailed,
    Rejected,
}

/// A run ready to continue.
#[derive(Debug, Clone, PartialEq)]
pub struct Resumed {
    pub run_id: RunId,
    pub checkpoint_id: CheckpointId,
    /// Checkpointed history with the tool result folded in.
    pub history: Vec<Message>,
    pub kind: ResumeKind,
}

impl Resumed {
    /// The result folded in for the pending call.
    pub fn outcome(&self) -> Option<&ToolOutcome> {
        self.history
            .last()
            .and_then(|m| m.tool_results_iter().last())
            .map(|r| &r.outcome)
    }
}

/// Observed states. Terminal entries are evicted oldest first once more
/// than `retain` have accumulated.
#[derive(Default)]
struct StateTable {
    states: HashMap<CheckpointId, ResumeState>,
    finished: VecDeque<CheckpointId>,
}

impl StateTable {
    fn set(&mut self, id: &CheckpointId, state: ResumeState, retain: usize) {
        self.states.insert(id.clone(), state);
        if !state.is_terminal() {
            return;
        }
        self.finished.push_back(id.clone());
        while self.finished.len() > retain {
            let Some(oldest) = self.finished.pop_front() else {
                break;
            };
            if self.states.get(&oldest).is_some_and(|s| s.is_terminal()) {
                self.states.remove(&oldest);
            }
        }
    }
}

/// Applies approval decisions to checkpointed runs.
pub struct ResumeCoordinator {
    store: Arc<dyn CheckpointStore>,
    tools: Arc<ToolSet>,
    tool_timeout: Option<Duration>,
    finished_retained: usize,
    states: Mutex<StateTable>,
}

impl ResumeCoordinator {
    pub fn new(store: Arc<dyn CheckpointStore>, tools: Arc<ToolSet>) -> Self {
        Self {
            store,
            tools,
            tool_timeout: None,
            finished_retained: DEFAULT_FINISHED_RETAINED,
            states: Mutex::new(StateTable::default()),
        }
    }

    /// Bound how long an approved tool may run.
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }

    /// How many finished checkpoints `status` keeps reporting.
    pub fn with_finished_retention(mut self, retained: usize) -> Self {
        self.finished_retained = retained;
        self
    }

    /// Record that a suspension was observed.
    pub fn track(&self, pending: &PendingApproval) {
        self.set_state(&pending.checkpoint_id, ResumeState::Pending);
    }

    /// State observed by this coordinator, if it has seen the checkpoint.
    pub fn status(&self, checkpoint_id: &CheckpointId) -> Option<ResumeState> {
        self.states
            .lock()
            .ok()
            .and_then(|table| table.states.get(checkpoint_id).copied())
    }

    /// Push entry point for transports that deliver decisions.
    pub async fn on_decision(&self, decision: Decision) -> Result<Resumed> {
        self.resume(&decision).await
    }

    /// Fetch the decision once; resume if there is one.
    pub async fn poll(
        &self,
        gateway: &dyn ApprovalGateway,
        id: &ApprovalRequestId,
    ) -> Result<Option<Resumed>> {
        match gateway.fetch_decision(id).await? {
            Some(decision) => self.resume(&decision).await.map(Some),
            None => Ok(None),
        }
    }

    /// Poll every `interval` until a decision arrives, then resume.
    pub async fn wait_for_decision(
        &self,
        gateway: &dyn ApprovalGateway,
        id: &ApprovalRequestId,
        interval: Duration,
    ) -> Result<Resumed> {
        loop {
            if let Some(resumed) = self.poll(gateway, id).await? {
                return Ok(resumed);
            }
            tracing::debug!(approval_request_id = %id, "no decision yet");
            tokio::time::sleep(interval).await;
        }
    }

    /// Apply a decision to the checkpoint it correlates with.
    pub async fn resume(&self, decision: &Decision) -> Result<Resumed> {
        let Some(correlation) = decision.correlation.as_deref() else {
            tracing::warn!(
                approval_request_id = %decision.approval_request_id,
                "decision carries no checkpoint id"
            );
            return Err(Error::MissingCorrelation(decision.approval_request_id.clone()));
        };
        let checkpoint_id = CheckpointId::from(correlation);

        let checkpoint = match self.store.take(&checkpoint_id) {
            Ok(checkpoint) => checkpoint,
            Err(e) if e.is_not_found() => {
                tracing::warn!(
                    checkpoint_id = %checkpoint_id,
                    approval_request_id = %decision.approval_request_id,
                    "checkpoint not found; decision already applied or never issued"
                );
                self.fail_unresolved(&checkpoint_id);
                return Err(Error::CheckpointNotFound(checkpoint_id));
            }
            Err(e) => {
                tracing::error!(checkpoint_id = %checkpoint_id, error = %e, "checkpoint take failed");
                self.set_state(&checkpoint_id, ResumeState::Failed);
                return Err(Error::StoreUnavailable(e.to_string()));
            }
        };
        self.set_state(&checkpoint_id, ResumeState::Resolving);

        let Checkpoint {
            run_id,
            mut history,
            pending_call,
            ..
        } = checkpoint;

        let (outcome, kind) = if decision.approved {
            self.execute(&pending_call, decision.feedback.as_deref()).await
        } else {
            let feedback = decision
                .feedback
                .clone()
                .unwrap_or_else(|| DEFAULT_REJECTION.to_string());
            (ToolOutcome::rejected(feedback), ResumeKind::Rejected)
        };
        push_tool_result(
            &mut history,
            ToolResult::new(pending_call.tool_call_id.clone(), outcome),
        );
        self.set_state(&checkpoint_id, ResumeState::Completed);

        tracing::info!(
            run_id = %run_id,
            checkpoint_id = %checkpoint_id,
            approval_request_id = %decision.approval_request_id,
            tool = %pending_call.tool_name,
            approved = decision.approved,
            ?kind,
            "run resumed"
        );

        Ok(Resumed {
            run_id,
            checkpoint_id,
            history,
            kind,
        })
    }

    async fn execute(&self, call: &PendingCall, response: Option<&str>) -> (ToolOutcome, ResumeKind) {
        let result = match self.tools.original(&call.tool_name) {
            None => Err(ToolError::NotFound(call.tool_name.clone())),
            Some(tool) => {
                let run = tool.approved(call.arguments.clone(), response);
                match self.tool_timeout {
                    Some(limit) => tokio::time::timeout(limit, run)
                        .await
                        .unwrap_or_else(|_| Err(ToolError::Timeout(limit.as_millis() as u64))),
                    None => run.await,
                }
            }
        };

        match result {
            Ok(output) => (ToolOutcome::success_json(output), ResumeKind::Executed),
            Err(e) => {
                tracing::warn!(tool = %call.tool_name, error = %e, "approved tool failed");
                (ToolOutcome::error(e.to_string()), ResumeKind::ExecutionFailed)
            }
        }
    }

    fn set_state(&self, id: &CheckpointId, state: ResumeState) {
        if let Ok(mut table) = self.states.lock() {
            table.set(id, state, self.finished_retained);
        }
    }

    /// Mark a tracked checkpoint Failed. Ids never tracked here, and ones
    /// another delivery already resolved, are left alone.
    fn fail_unresolved(&self, id: &CheckpointId) {
        if let Ok(mut table) = self.states.lock()
            && table.states.get(id) == Some(&ResumeState::Pending)
        {
            table.set(id, ResumeState::Failed, self.finished_retained);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::ApprovalGate;
    use crate::model::{Part, Role, ToolCall, ToolSpec};
    use crate::tools::{FnTool, ToolContext, ToolFlow};
    use approval::{MemoryGateway, RecordDecision};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use storage::MemoryCheckpointStore;

    struct Fixture {
        store: Arc<MemoryCheckpointStore>,
        gateway: Arc<MemoryGateway>,
        tools: Arc<ToolSet>,
        runs: Arc<AtomicUsize>,
    }

    fn fixture(fail: bool) -> Fixture {
        let store = Arc::new(MemoryCheckpointStore::new());
        let gateway = Arc::new(MemoryGateway::new());
        let gate = ApprovalGate::new(store.clone(), gateway.clone());
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        let tool = FnTool::new(
            ToolSpec::new("changeWeather", "Change the weather", json!({"type": "object"})),
            move |args| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if fail {
                        Err(ToolError::Execution("weather service down".into()))
                    } else {
                        Ok(json!({"changed": args}))
                    }
                }
            },
        );
        let mut tools = ToolSet::new();
        tools.register_gated(tool, &gate).unwrap();

        Fixture {
            store,
            gateway,
            tools: Arc::new(tools),
            runs,
        }
    }

    async fn suspend(f: &Fixture) -> PendingApproval {
        let call = ToolCall {
            id: "t1".into(),
            name: "changeWeather".into(),
            input: json!({"city": "Paris"}),
        };
        let history = vec![
            Message::user("make Paris sunny"),
            Message::from_parts(Role::Assistant, vec![Part::ToolCall(call.clone())]),
        ];
        let ctx = ToolContext {
            run_id: RunId::new(),
            history: &history,
            call: &call,
        };
        match f.tools.dispatch(&ctx).await.unwrap() {
            ToolFlow::Suspend(pending) => pending,
            ToolFlow::Complete(_) => panic!("gated tool completed"),
        }
    }

    fn coordinator(f: &Fixture) -> ResumeCoordinator {
        ResumeCoordinator::new(f.store.clone(), f.tools.clone())
    }

    #[tokio::test]
    async fn approved_runs_tool_once() {
        let f = fixture(false);
        let pending = suspend(&f).await;
        let coordinator = coordinator(&f);
        coordinator.track(&pending);
        assert_eq!(coordinator.status(&pending.checkpoint_id), Some(ResumeState::Pending));

        let decision = Decision::approve(pending.approval_request_id.clone())
            .with_correlation(pending.checkpoint_id.as_str());
        let resumed = coordinator.on_decision(decision.clone()).await.unwrap();
        assert_eq!(resumed.kind, ResumeKind::Executed);
        assert_eq!(
            resumed.outcome(),
            Some(&ToolOutcome::success_json(json!({"changed": {"city": "Paris"}})))
        );
        assert_eq!(f.runs.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.status(&pending.checkpoint_id), Some(ResumeState::Completed));

        let err = coordinator.on_decision(decision).await.unwrap_err();
        assert!(matches!(err, Error::CheckpointNotFound(_)));
        assert_eq!(f.runs.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.status(&pending.checkpoint_id), Some(ResumeState::Completed));
    }

    #[tokio::test]
    async fn rejected_never_runs_tool() {
        let f = fixture(false);
        let coordinator = coordinator(&f);

        let pending = suspend(&f).await;
        let decision = Decision::reject(pending.approval_request_id.clone())
            .with_feedback("too hot")
            .with_correlation(pending.checkpoint_id.as_str());
        let resumed = coordinator.resume(&decision).await.unwrap();
        assert_eq!(resumed.kind, ResumeKind::Rejected);
        assert_eq!(resumed.outcome(), Some(&ToolOutcome::rejected("too hot")));

        let pending = suspend(&f).await;
        let decision = Decision::reject(pending.approval_request_id.clone())
            .with_correlation(pending.checkpoint_id.as_str());
        let resumed = coordinator.resume(&decision).await.unwrap();
        assert_eq!(resumed.outcome(), Some(&ToolOutcome::rejected(DEFAULT_REJECTION)));

        assert_eq!(f.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn tool_failure_is_folded_in() {
        let f = fixture(true);
        let pending = suspend(&f).await;
        let decision = Decision::approve(pending.approval_request_id.clone())
            .with_correlation(pending.checkpoint_id.as_str());

        let resumed = coordinator(&f).resume(&decision).await.unwrap();
        assert_eq!(resumed.kind, ResumeKind::ExecutionFailed);
        assert!(resumed.outcome().unwrap().is_error());
        assert!(resumed.outcome().unwrap().content().contains("weather service down"));
    }

    #[tokio::test]
    async fn missing_and_unknown_correlation() {
        let f = fixture(false);
        let coordinator = coordinator(&f);

        let err = coordinator.resume(&Decision::approve("r1")).await.unwrap_err();
        assert!(matches!(err, Error::MissingCorrelation(_)));

        let err = coordinator
            .resume(&Decision::approve("r1").with_correlation("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CheckpointNotFound(_)));
        assert_eq!(coordinator.status(&CheckpointId::from("nope")), None);
        assert_eq!(f.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn finished_states_are_bounded() {
        let f = fixture(false);
        let coordinator = coordinator(&f).with_finished_retention(2);

        let mut finished = Vec::new();
        for _ in 0..3 {
            let pending = suspend(&f).await;
            coordinator.track(&pending);
            let decision = Decision::approve(pending.approval_request_id.clone())
                .with_correlation(pending.checkpoint_id.as_str());
            coordinator.resume(&decision).await.unwrap();
            finished.push(pending.checkpoint_id);
        }
        for bogus in ["x1", "x2", "x3"] {
            let decision = Decision::approve("r").with_correlation(bogus);
            assert!(coordinator.resume(&decision).await.is_err());
        }

        assert_eq!(coordinator.status(&finished[0]), None);
        assert_eq!(coordinator.status(&finished[1]), Some(ResumeState::Completed));
        assert_eq!(coordinator.status(&finished[2]), Some(ResumeState::Completed));
        let table = coordinator.states.lock().unwrap();
        assert_eq!(table.states.len(), 2);
        assert_eq!(table.finished.len(), 2);
    }

    #[tokio::test]
    async fn tracked_checkpoint_fails_when_gone() {
        let f = fixture(false);
        let coordinator = coordinator(&f);
        let pending = suspend(&f).await;
        coordinator.track(&pending);
        f.store.consume(&pending.checkpoint_id).unwrap();

        let decision = Decision::approve(pending.approval_request_id.clone())
            .with_correlation(pending.checkpoint_id.as_str());
        assert!(coordinator.resume(&decision).await.is_err());
        assert_eq!(coordinator.status(&pending.checkpoint_id), Some(ResumeState::Failed));
    }

    #[tokio::test]
    async fn poll_waits_for_decision() {
        let f = fixture(false);
        let pending = suspend(&f).await;
        let coordinator = coordinator(&f);

        let polled = coordinator
            .poll(f.gateway.as_ref(), &pending.approval_request_id)
            .await
            .unwrap();
        assert!(polled.is_none());
        assert_eq!(f.store.len(), 1);

        f.gateway
            .record(&pending.approval_request_id, true, None)
            .unwrap();
        let resumed = coordinator
            .wait_for_decision(
                f.gateway.as_ref(),
                &pending.approval_request_id,
                Duration::from_millis(5),
            )
            .await
            .unwrap();
        assert_eq!(resumed.kind, ResumeKind::Executed);
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn slow_tool_times_out() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let gate = ApprovalGate::new(store.clone(), Arc::new(MemoryGateway::new()));
        let slow = FnTool::new(
            ToolSpec::new("slow", "Sleeps", json!({"type": "object"})),
            |_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(json!("late"))
            },
        );
        let mut tools = ToolSet::new();
        tools.register_gated(slow, &gate).unwrap();
        let tools = Arc::new(tools);

        let call = ToolCall {
            id: "t1".into(),
            name: "slow".into(),
            input: json!({}),
        };
        let ctx = ToolContext {
            run_id: RunId::new(),
            history: &[],
            call: &call,
        };
        let ToolFlow::Suspend(pending) = tools.dispatch(&ctx).await.unwrap() else {
            panic!("expected suspension");
        };

        let coordinator = ResumeCoordinator::new(store, tools)
            .with_tool_timeout(Duration::from_millis(10));
        let resumed = coordinator
            .resume(
                &Decision::approve(pending.approval_request_id)
                    .with_correlation(pending.checkpoint_id.as_str()),
            )
            .await
            .unwrap();
        assert_eq!(resumed.kind, ResumeKind::ExecutionFailed);
        assert_eq!(resumed.outcome(), Some(&ToolOutcome::error("timeout after 10ms")));
    }
}
