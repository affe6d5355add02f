//! Asking a human instead of acting.

use crate::model::ToolSpec;
use crate::tools::{Tool, ToolError};
use async_trait::async_trait;
use serde_json::{Value, json};

pub const CONTACT_HUMAN: &str = "contact_human";

/// A tool that lets the model put a question to a human.
///
/// Register it behind an [`ApprovalGate`](crate::ApprovalGate): the question
/// travels as the approval request, the run parks, and the approver's
/// feedback comes back as the tool result once they approve. A rejection
/// reaches the model like any other rejected call.
pub struct ContactHuman {
    spec: ToolSpec,
}

impl ContactHuman {
    pub fn new() -> Self {
        Self {
            spec: ToolSpec::new(
                CONTACT_HUMAN,
                "Contact a human for more information",
                json!({
                    "type": "object",
                    "properties": {"message": {"type": "string"}},
                    "required": ["message"]
                }),
            ),
        }
    }
}

impl Default for ContactHuman {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ContactHuman {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(&self, _args: Value) -> Result<Value, ToolError> {
        Err(ToolError::ApprovalRequired(CONTACT_HUMAN.to_string()))
    }

    async fn approved(&self, _args: Value, response: Option<&str>) -> Result<Value, ToolError> {
        match response.map(str::trim) {
            Some(answer) if !answer.is_empty() => Ok(json!({ "response": answer })),
            _ => Err(ToolError::Execution("the human replied without a message".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::ApprovalGate;
    use crate::model::{Message, Part, Role, ToolCall, ToolOutcome};
    use crate::tools::{ToolContext, ToolFlow, ToolSet};
    use crate::{ResumeCoordinator, ResumeKind};
    use approval::{Decision, MemoryGateway, RecordDecision};
    use std::sync::Arc;
    use storage::{MemoryCheckpointStore, RunId};

    fn setup() -> (Arc<MemoryGateway>, ResumeCoordinator, Arc<ToolSet>) {
        let store = Arc::new(MemoryCheckpointStore::new());
        let gateway = Arc::new(MemoryGateway::new());
        let gate = ApprovalGate::new(store.clone(), gateway.clone());
        let mut tools = ToolSet::new();
        tools.register_gated(ContactHuman::new(), &gate).unwrap();
        let tools = Arc::new(tools);
        (gateway, ResumeCoordinator::new(store, tools.clone()), tools)
    }

    async fn ask(tools: &ToolSet, question: &str) -> crate::PendingApproval {
        let call = ToolCall {
            id: "ask_1".into(),
            name: CONTACT_HUMAN.into(),
            input: json!({ "message": question }),
        };
        let history = vec![
            Message::user("change the weather somewhere nice"),
            Message::from_parts(Role::Assistant, vec![Part::ToolCall(call.clone())]),
        ];
        let ctx = ToolContext {
            run_id: RunId::new(),
            history: &history,
            call: &call,
        };
        match tools.dispatch(&ctx).await.unwrap() {
            ToolFlow::Suspend(pending) => pending,
            ToolFlow::Complete(_) => panic!("question answered without a human"),
        }
    }

    #[tokio::test]
    async fn reply_becomes_tool_result() {
        let (gateway, coordinator, tools) = setup();
        let pending = ask(&tools, "Which city?").await;
        assert_eq!(pending.tool_name, CONTACT_HUMAN);
        assert_eq!(pending.arguments, json!({"message": "Which city?"}));

        let decision = gateway
            .record(&pending.approval_request_id, true, Some("Paris, please".into()))
            .unwrap();
        let resumed = coordinator.on_decision(decision).await.unwrap();

        assert_eq!(resumed.kind, ResumeKind::Executed);
        assert_eq!(
            resumed.outcome(),
            Some(&ToolOutcome::success_json(json!({"response": "Paris, please"})))
        );
    }

    #[tokio::test]
    async fn empty_reply_is_an_error_result() {
        let (_, coordinator, tools) = setup();
        let pending = ask(&tools, "Which city?").await;

        let decision = Decision::approve(pending.approval_request_id.clone())
            .with_feedback("   ")
            .with_correlation(pending.checkpoint_id.as_str());
        let resumed = coordinator.resume(&decision).await.unwrap();

        assert_eq!(resumed.kind, ResumeKind::ExecutionFailed);
        assert!(resumed.outcome().unwrap().is_error());
    }

    #[tokio::test]
    async fn ungated_question_does_not_answer_itself() {
        let err = ContactHuman::new()
            .execute(json!({"message": "hello?"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ApprovalRequired(_)));
    }
}
