//! Named collection of tools exposed to the model.

use crate::interrupt::ApprovalGate;
use crate::model::ToolSpec;
use crate::tools::{Tool, ToolContext, ToolError, ToolFlow, validate_arguments};
use std::collections::HashMap;
use std::sync::Arc;

struct Entry {
    /// What the agent loop invokes.
    exposed: Arc<dyn Tool>,
    /// The unwrapped body; differs from `exposed` only for gated tools.
    original: Arc<dyn Tool>,
}

/// The tools available to one agent, keyed by name.
#[derive(Default)]
pub struct ToolSet {
    entries: HashMap<String, Entry>,
    specs: Vec<ToolSpec>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool that runs as soon as the model calls it.
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), ToolError> {
        let tool: Arc<dyn Tool> = Arc::new(tool);
        self.insert(tool.clone(), tool)
    }

    /// Register a tool that suspends for approval before it runs.
    pub fn register_gated(
        &mut self,
        tool: impl Tool + 'static,
        gate: &ApprovalGate,
    ) -> Result<(), ToolError> {
        let original: Arc<dyn Tool> = Arc::new(tool);
        let exposed: Arc<dyn Tool> = Arc::new(gate.wrap(original.clone()));
        self.insert(exposed, original)
    }

    fn insert(&mut self, exposed: Arc<dyn Tool>, original: Arc<dyn Tool>) -> Result<(), ToolError> {
        let spec = exposed.spec().clone();
        if self.entries.contains_key(&spec.name) {
            return Err(ToolError::Duplicate(spec.name));
        }
        self.entries
            .insert(spec.name.clone(), Entry { exposed, original });
        self.specs.push(spec);
        Ok(())
    }

    /// Specs in registration order.
    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// The tool as the agent loop sees it.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.entries.get(name).map(|e| &e.exposed)
    }

    /// The unwrapped tool body, used to execute an approved call.
    pub fn original(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.entries.get(name).map(|e| &e.original)
    }

    pub fn is_gated(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .is_some_and(|e| !Arc::ptr_eq(&e.exposed, &e.original))
    }

    /// Validate and invoke the call in `ctx`.
    pub async fn dispatch(&self, ctx: &ToolContext<'_>) -> Result<ToolFlow, ToolError> {
        let call = ctx.call;
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        validate_arguments(tool.spec(), &call.input)?;
        tool.invoke(ctx, call.input.clone()).await
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSet")
            .field("tools", &self.specs.iter().map(|s| &s.name).collect::<Vec<_>>())
            .finish()
    }
}
