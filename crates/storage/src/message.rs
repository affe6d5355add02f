//! Conversation types (provider-agnostic).
//!
//! These are the values a checkpoint captures, so they live next to the
//! store rather than in the runtime.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The role of a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this call (used to correlate results).
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Arguments as JSON.
    pub input: Value,
}

/// Outcome of a tool call as reported back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolOutcome {
    /// Tool executed successfully.
    Success { output: Value },
    /// Tool execution failed.
    Error { message: String },
    /// An approver declined the call; the tool never ran.
    Rejected { feedback: String },
}

impl ToolOutcome {
    /// Create a successful outcome with text output.
    pub fn success(output: impl Into<String>) -> Self {
        Self::Success {
            output: Value::String(output.into()),
        }
    }

    /// Create a successful outcome with JSON output.
    pub fn success_json(output: Value) -> Self {
        Self::Success { output }
    }

    /// Create an error outcome.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Create a rejection outcome.
    pub fn rejected(feedback: impl Into<String>) -> Self {
        Self::Rejected {
            feedback: feedback.into(),
        }
    }

    /// Whether the model should treat this as a failed call.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Rejected { .. })
    }

    /// Text content handed to the model.
    pub fn content(&self) -> String {
        match self {
            Self::Success {
                output: Value::String(s),
            } => s.clone(),
            Self::Success { output } => output.to_string(),
            Self::Error { message } => message.clone(),
            Self::Rejected { feedback } => feedback.clone(),
        }
    }
}

/// Result of a tool call, paired with the call ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// ID of the tool call this result corresponds to.
    pub tool_call_id: String,
    /// Outcome of the call.
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn new(tool_call_id: impl Into<String>, outcome: ToolOutcome) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            outcome,
        }
    }

    /// Create a successful result with JSON output.
    pub fn success(tool_call_id: impl Into<String>, output: Value) -> Self {
        Self::new(tool_call_id, ToolOutcome::success_json(output))
    }

    /// Create an error result.
    pub fn error(tool_call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(tool_call_id, ToolOutcome::error(message))
    }

    /// Create a rejection result.
    pub fn rejected(tool_call_id: impl Into<String>, feedback: impl Into<String>) -> Self {
        Self::new(tool_call_id, ToolOutcome::rejected(feedback))
    }
}

/// A part of a message's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    /// Plain text content.
    Text { text: String },
    /// Tool call from assistant.
    ToolCall(ToolCall),
    /// Tool result from user.
    ToolResult(ToolResult),
}

impl Part {
    /// Create a text part.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text { text: s.into() }
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    /// Create a message with a role and text content.
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part::text(text)],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    /// Create a user message carrying tool results.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self {
            role: Role::User,
            parts: results.into_iter().map(Part::ToolResult).collect(),
        }
    }

    /// Create a message from parts.
    pub fn from_parts(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    /// Add a part to this message.
    pub fn with_part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    /// Get combined text content.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Extract all tool calls.
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::ToolCall(tc) => Some(tc),
                _ => None,
            })
            .collect()
    }

    /// Extract all tool results.
    pub fn tool_results_iter(&self) -> impl Iterator<Item = &ToolResult> {
        self.parts.iter().filter_map(|p| match p {
            Part::ToolResult(r) => Some(r),
            _ => None,
        })
    }

    /// Whether every part of this message is a tool result.
    pub fn is_tool_results(&self) -> bool {
        self.role == Role::User
            && !self.parts.is_empty()
            && self.parts.iter().all(|p| matches!(p, Part::ToolResult(_)))
    }
}

/// Fold a tool result into the history.
///
/// Results answering one assistant turn share a single user message, so the
/// result joins a trailing tool-results message when there is one.
pub fn push_tool_result(history: &mut Vec<Message>, result: ToolResult) {
    match history.last_mut() {
        Some(last) if last.is_tool_results() => last.parts.push(Part::ToolResult(result)),
        _ => history.push(Message::tool_results(vec![result])),
    }
}

/// Tool calls of the latest assistant turn that have no result yet, in call order.
pub fn unanswered_tool_calls(history: &[Message]) -> Vec<ToolCall> {
    let Some(idx) = history.iter().rposition(|m| m.role == Role::Assistant) else {
        return Vec::new();
    };
    let answered: Vec<&str> = history[idx + 1..]
        .iter()
        .flat_map(|m| m.tool_results_iter())
        .map(|r| r.tool_call_id.as_str())
        .collect();

    history[idx]
        .tool_calls()
        .into_iter()
        .filter(|call| !answered.contains(&call.id.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(id: &str, name: &str) -> Part {
        Part::ToolCall(ToolCall {
            id: id.into(),
            name: name.into(),
            input: json!({}),
        })
    }

    #[test]
    fn message_builder() {
        let msg = Message::user("hello").with_part(Part::text(" world"));
        assert_eq!(msg.text(), "hello world");
    }

    #[test]
    fn outcome_content() {
        assert_eq!(ToolOutcome::success("done").content(), "done");
        assert_eq!(
            ToolOutcome::success_json(json!({"a": 1})).content(),
            r#"{"a":1}"#
        );
        assert_eq!(ToolOutcome::rejected("too hot").content(), "too hot");
        assert!(ToolOutcome::rejected("no").is_error());
        assert!(!ToolOutcome::success("ok").is_error());
    }

    #[test]
    fn results_for_one_turn_share_a_message() {
        let mut history = vec![Message::from_parts(
            Role::Assistant,
            vec![call("1", "a"), call("2", "b")],
        )];
        push_tool_result(&mut history, ToolResult::success("1", json!("x")));
        push_tool_result(&mut history, ToolResult::error("2", "boom"));

        assert_eq!(history.len(), 2);
        assert_eq!(history[1].tool_results_iter().count(), 2);
    }

    #[test]
    fn unanswered_calls_skip_answered_ones() {
        let mut history = vec![
            Message::user("go"),
            Message::from_parts(
                Role::Assistant,
                vec![Part::text("sure"), call("1", "a"), call("2", "b"), call("3", "c")],
            ),
        ];
        push_tool_result(&mut history, ToolResult::success("1", json!(null)));

        let pending = unanswered_tool_calls(&history);
        let ids: Vec<_> = pending.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["2", "3"]);
    }

    #[test]
    fn no_assistant_means_nothing_unanswered() {
        assert!(unanswered_tool_calls(&[Message::user("hi")]).is_empty());
    }

    #[test]
    fn serde_shape() {
        let msg = Message::tool_results(vec![ToolResult::rejected("t1", "nope")]);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["parts"][0]["type"], "tool_result");
        assert_eq!(value["parts"][0]["outcome"]["status"], "rejected");
    }
}
