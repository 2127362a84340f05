//! Tool trait, registry and the three engine-cooperating built-in tools.
//!
//! `Tool`'s shape is name/spec/call, but `call` returns a `ToolResult`
//! directly rather than `Result<_, Error>`: tool failure is data
//! (`ToolResult.error`), not a fault the loop unwinds for, so there is
//! nothing for the trait to propagate as `Err`. `ToolRegistry` is a
//! HashMap-by-name plus a list surface for prompt construction, with
//! insertion order preserved and later registrations overwriting earlier
//! ones under the same name.
//!
//! Concrete tool implementations beyond the three built-ins below (a shell
//! or filesystem tool, a search tool, an editor tool, ...) are out of scope
//! here, left for embedding applications to register themselves.

mod builtins;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub use builtins::{
    AskUserTool, CodeRunner, ExecuteCodeTool, ExecutePlanTool, PlanExecutor, TOOL_ASK_USER,
    TOOL_EXECUTE_CODE, TOOL_EXECUTE_PLAN,
};

use crate::events::EventSink;
use crate::types::{Message, ToolDefinition, ToolResult};

/// Per-call context available to tools: recent conversation messages, an
/// optional event sink for progress events, and the cancellation token
/// governing the enclosing turn.
#[derive(Clone, Default)]
pub struct ToolCallContext {
    pub recent_messages: Vec<Message>,
    pub events: Option<EventSink>,
    pub thread_id: Option<String>,
    pub cancel: Option<CancellationToken>,
}

/// A single operation the LLM may invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name; must match what's registered under in a `ToolRegistry`.
    fn name(&self) -> &str;

    /// Description and JSON-schema parameters shown to the model.
    fn spec(&self) -> ToolDefinition;

    /// Executes the tool. Never returns `Err` for ordinary failures — those
    /// are reported via `ToolResult::error`.
    async fn call(&self, args: Value, ctx: &ToolCallContext) -> ToolResult;
}

/// Name -> tool map with insertion order preserved for prompt listing.
/// Registering a name that already exists overwrites the
/// existing entry in place, keeping its original position.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    order: Vec<String>,
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tool definitions in registration order, for inclusion in a `ChatRequest`.
    pub fn list(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.spec())
            .collect()
    }

    /// Executes the named tool. An unknown name is itself error-as-data,
    /// not a panic or `Result::Err` — the loop always has a
    /// `ToolResult` to append as the next message.
    pub async fn execute(&self, name: &str, args: Value, ctx: &ToolCallContext) -> ToolResult {
        match self.tools.get(name) {
            Some(tool) => tool.call(args, ctx).await,
            None => ToolResult::error(format!("unknown tool: {name}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn spec(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo".into(),
                description: "Echoes its input".into(),
                parameters: json!({"type": "object"}),
            }
        }

        async fn call(&self, args: Value, _ctx: &ToolCallContext) -> ToolResult {
            ToolResult::ok(args.to_string())
        }
    }

    #[tokio::test]
    async fn unknown_tool_yields_error_result_not_panic() {
        let registry = ToolRegistry::new();
        let ctx = ToolCallContext::default();
        let result = registry.execute("does_not_exist", Value::Null, &ctx).await;
        assert!(result.is_error());
        assert_eq!(result.error.as_deref(), Some("unknown tool: does_not_exist"));
    }

    #[tokio::test]
    async fn registering_same_name_twice_overwrites_in_place() {
        struct OtherEcho;
        #[async_trait]
        impl Tool for OtherEcho {
            fn name(&self) -> &str {
                "echo"
            }
            fn spec(&self) -> ToolDefinition {
                ToolDefinition {
                    name: "echo".into(),
                    description: "v2".into(),
                    parameters: json!({}),
                }
            }
            async fn call(&self, _args: Value, _ctx: &ToolCallContext) -> ToolResult {
                ToolResult::ok("v2")
            }
        }

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(OtherEcho));
        assert_eq!(registry.list().len(), 1);
        let ctx = ToolCallContext::default();
        let result = registry.execute("echo", Value::Null, &ctx).await;
        assert_eq!(result.content, "v2");
    }
}
