//! Checkpoint types.

use crate::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A unique identifier for one agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Opaque identifier assigned by a checkpoint store.
///
/// Approval decisions echo it back as their correlation value, so any string
/// is accepted; stores mint UUIDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(String);

impl CheckpointId {
    /// Mint a fresh identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CheckpointId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CheckpointId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The tool call that was intercepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingCall {
    /// Model-assigned call id; the eventual tool result answers it.
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// Snapshot of a run at the moment a tool call was intercepted.
///
/// Never mutated once saved. Resumption reads it exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: RunId,
    /// Message history up to and including the assistant turn that made the call.
    pub history: Vec<Message>,
    pub pending_call: PendingCall,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(run_id: RunId, history: Vec<Message>, pending_call: PendingCall) -> Self {
        Self {
            run_id,
            history,
            pending_call,
            created_at: Utc::now(),
        }
    }
}

/// Listing entry for a checkpoint that has not been consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointSummary {
    pub id: CheckpointId,
    pub run_id: RunId,
    pub tool_name: String,
    pub created_at: DateTime<Utc>,
}
