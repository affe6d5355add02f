//! Closure-backed tools.

use crate::model::ToolSpec;
use crate::tools::{Tool, ToolError};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

type BoxFuture = Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send>>;
type Handler = dyn Fn(Value) -> BoxFuture + Send + Sync;

/// A tool whose body is an async closure.
pub struct FnTool {
    spec: ToolSpec,
    handler: Box<Handler>,
}

impl FnTool {
    pub fn new<F, Fut>(spec: ToolSpec, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        Self {
            spec,
            handler: Box::new(move |args| Box::pin(handler(args))),
        }
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool").field("spec", &self.spec).finish()
    }
}

#[async_trait]
impl Tool for FnTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        (self.handler)(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn closure_runs_on_execute() {
        let tool = FnTool::new(
            ToolSpec::new("echo", "Echo the input", json!({"type": "object"})),
            |args| async move { Ok(json!({"echo": args})) },
        );
        assert_eq!(tool.spec().name, "echo");
        let out = tool.execute(json!({"a": 1})).await.unwrap();
        assert_eq!(out, json!({"echo": {"a": 1}}));
    }
}
