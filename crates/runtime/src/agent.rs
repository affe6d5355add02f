//! The tool-calling agent loop.

use crate::coordinator::Resumed;
use crate::interrupt::PendingApproval;
use crate::model::{Backend, Message, ModelRequest, ToolResult};
use crate::tools::{ToolContext, ToolFlow, ToolSet};
use crate::{Error, Result};
use std::sync::Arc;
use storage::{RunId, push_tool_result, unanswered_tool_calls};

const DEFAULT_MAX_TURNS: usize = 16;

/// Where a run stands after a step.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutcome {
    /// Tool results were added; the model should be called again.
    Continue(Vec<Message>),
    /// A gated tool parked the run. `history` is what was checkpointed.
    Suspended {
        pending: PendingApproval,
        history: Vec<Message>,
    },
    /// The model answered without calling tools.
    Final {
        answer: String,
        history: Vec<Message>,
    },
}

impl LoopOutcome {
    pub fn history(&self) -> &[Message] {
        match self {
            Self::Continue(history)
            | Self::Suspended { history, .. }
            | Self::Final { history, .. } => history,
        }
    }
}

/// Drives a model and its tools until the model answers or a tool suspends.
pub struct AgentLoop<B> {
    backend: B,
    tools: Arc<ToolSet>,
    system: Option<String>,
    max_turns: usize,
}

impl<B: Backend> AgentLoop<B> {
    pub fn new(backend: B, tools: Arc<ToolSet>) -> Self {
        Self {
            backend,
            tools,
            system: None,
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    /// Set the system prompt used by [`start`](Self::start).
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn tools(&self) -> &Arc<ToolSet> {
        &self.tools
    }

    /// Begin a new run from a user prompt.
    pub async fn start(&self, prompt: impl Into<String>) -> Result<(RunId, LoopOutcome)> {
        let run_id = RunId::new();
        let mut history = Vec::new();
        if let Some(system) = &self.system {
            history.push(Message::system(system.clone()));
        }
        history.push(Message::user(prompt));

        tracing::info!(run_id = %run_id, "run started");
        let outcome = self.run(run_id, history).await?;
        Ok((run_id, outcome))
    }

    /// Continue a run from a coordinator result.
    pub async fn resume(&self, resumed: Resumed) -> Result<LoopOutcome> {
        self.run(resumed.run_id, resumed.history).await
    }

    /// Step until the run suspends or finishes.
    pub async fn run(&self, run_id: RunId, mut history: Vec<Message>) -> Result<LoopOutcome> {
        for _ in 0..self.max_turns {
            match self.step(run_id, history).await? {
                LoopOutcome::Continue(next) => history = next,
                outcome => {
                    if let LoopOutcome::Final { .. } = outcome {
                        tracing::info!(run_id = %run_id, "run finished");
                    }
                    return Ok(outcome);
                }
            }
        }
        tracing::warn!(run_id = %run_id, max_turns = self.max_turns, "turn limit reached");
        Err(Error::TurnLimit(self.max_turns))
    }

    /// One unit of progress.
    ///
    /// Tool calls of the latest assistant turn that still lack a result are
    /// dispatched first; this is how the rest of a turn runs after a resume.
    /// Otherwise the model is called once and its tool calls dispatched.
    pub async fn step(&self, run_id: RunId, mut history: Vec<Message>) -> Result<LoopOutcome> {
        let mut calls = unanswered_tool_calls(&history);

        if calls.is_empty() {
            let response = self
                .backend
                .call(ModelRequest {
                    messages: &history,
                    tools: self.tools.specs(),
                })
                .await?;
            calls = response.message.tool_calls().into_iter().cloned().collect();
            let answer = response.message.text();
            history.push(response.message);

            if calls.is_empty() {
                return Ok(LoopOutcome::Final { answer, history });
            }
        }

        for call in calls {
            let flow = {
                let ctx = ToolContext {
                    run_id,
                    history: &history,
                    call: &call,
                };
                self.tools.dispatch(&ctx).await
            };

            match flow {
                Ok(ToolFlow::Complete(output)) => {
                    push_tool_result(&mut history, ToolResult::success(&call.id, output));
                }
                Ok(ToolFlow::Suspend(pending)) => {
                    return Ok(LoopOutcome::Suspended { pending, history });
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!(run_id = %run_id, tool = %call.name, error = %e, "tool call aborted the step");
                    return Err(e.into());
                }
                Err(e) => {
                    tracing::warn!(run_id = %run_id, tool = %call.name, error = %e, "tool call failed");
                    push_tool_result(&mut history, ToolResult::error(&call.id, e.to_string()));
                }
            }
        }

        Ok(LoopOutcome::Continue(history))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Part, Role, ToolCall, ToolOutcome, ToolSpec};
    use crate::providers::ScriptedBackend;
    use crate::tools::FnTool;
    use serde_json::json;

    fn tool_call(id: &str, name: &str, input: serde_json::Value) -> Message {
        Message::from_parts(
            Role::Assistant,
            vec![Part::ToolCall(ToolCall {
                id: id.into(),
                name: name.into(),
                input,
            })],
        )
    }

    fn tools() -> Arc<ToolSet> {
        let mut tools = ToolSet::new();
        tools
            .register(FnTool::new(
                ToolSpec::new(
                    "add",
                    "Add two numbers",
                    json!({
                        "type": "object",
                        "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
                        "required": ["a", "b"]
                    }),
                ),
                |args| async move {
                    let a = args["a"].as_i64().unwrap_or(0);
                    let b = args["b"].as_i64().unwrap_or(0);
                    Ok(json!(a + b))
                },
            ))
            .unwrap();
        Arc::new(tools)
    }

    #[tokio::test]
    async fn tool_then_answer() {
        let backend = ScriptedBackend::new([
            tool_call("t1", "add", json!({"a": 2, "b": 3})),
            Message::assistant("5"),
        ]);
        let agent = AgentLoop::new(backend, tools()).with_system("be exact");

        let (_, outcome) = agent.start("2+3?").await.unwrap();
        let LoopOutcome::Final { answer, history } = outcome else {
            panic!("expected final answer");
        };
        assert_eq!(answer, "5");
        assert_eq!(history.len(), 5);
        assert_eq!(history[0].role, Role::System);
        let result = history[3].tool_results_iter().next().unwrap();
        assert_eq!(result.outcome, ToolOutcome::success_json(json!(5)));

        let requests = agent.backend().requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].len(), 4);
    }

    #[tokio::test]
    async fn bad_arguments_reported_to_model() {
        let backend = ScriptedBackend::new([
            tool_call("t1", "add", json!({"a": "two"})),
            tool_call("t2", "nope", json!({})),
            Message::assistant("gave up"),
        ]);
        let agent = AgentLoop::new(backend, tools());

        let (_, outcome) = agent.start("2+?").await.unwrap();
        let history = outcome.history();
        let first = history[2].tool_results_iter().next().unwrap();
        assert!(matches!(first.outcome, ToolOutcome::Error { .. }));
        let second = history[4].tool_results_iter().next().unwrap();
        assert_eq!(second.outcome, ToolOutcome::error("tool not found: nope"));
    }

    #[tokio::test]
    async fn turn_limit() {
        let backend = ScriptedBackend::new([
            tool_call("t1", "add", json!({"a": 1, "b": 1})),
            tool_call("t2", "add", json!({"a": 1, "b": 1})),
        ]);
        let agent = AgentLoop::new(backend, tools()).with_max_turns(2);

        let err = agent.start("loop").await.unwrap_err();
        assert!(matches!(err, Error::TurnLimit(2)));
    }

    #[tokio::test]
    async fn script_exhaustion_surfaces() {
        let agent = AgentLoop::new(ScriptedBackend::default(), tools());
        let err = agent.start("hi").await.unwrap_err();
        assert!(matches!(err, Error::Model(_)));
    }
}
