//! Built-in tools requiring engine cooperation: `ask_user` suspends the loop
//! for human input, `execute_code` delegates to a sandboxed runner
//! collaborator, `execute_plan` re-enters the agent loop with a list of
//! sub-steps. Each holds an `Arc<dyn Collaborator>` and delegates to it,
//! generalized to whatever collaborator each built-in needs.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::types::ToolResult;

use super::{Tool, ToolCallContext};

pub const TOOL_ASK_USER: &str = "ask_user";
pub const TOOL_EXECUTE_CODE: &str = "execute_code";
pub const TOOL_EXECUTE_PLAN: &str = "execute_plan";

/// Signals the agent loop to suspend and request human input. The tool itself performs no I/O: the loop recognizes
/// this tool's name before dispatch and emits `StreamEvent::InputRequest` /
/// `Suspend` instead of calling `Tool::call`. This impl exists so the tool
/// still has a well-defined spec for prompt construction and so a caller that
/// invokes it directly (bypassing the loop's special-case) gets a sane,
/// non-panicking result.
pub struct AskUserTool;

#[derive(Deserialize)]
struct AskUserArgs {
    question: String,
}

#[async_trait]
impl Tool for AskUserTool {
    fn name(&self) -> &str {
        TOOL_ASK_USER
    }

    fn spec(&self) -> crate::types::ToolDefinition {
        crate::types::ToolDefinition {
            name: TOOL_ASK_USER.into(),
            description: "Ask the human a clarifying question and wait for their reply.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "question": {"type": "string"}
                },
                "required": ["question"]
            }),
        }
    }

    async fn call(&self, args: Value, _ctx: &ToolCallContext) -> ToolResult {
        match serde_json::from_value::<AskUserArgs>(args) {
            Ok(parsed) => ToolResult::ok(parsed.question),
            Err(e) => ToolResult::error(format!("invalid ask_user arguments: {e}")),
        }
    }
}

/// Sandboxed code execution collaborator. The engine
/// embedding this crate supplies a concrete implementation; this crate
/// carries no sandbox of its own.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn run(&self, language: &str, code: &str) -> Result<String, String>;
}

pub struct ExecuteCodeTool {
    runner: Arc<dyn CodeRunner>,
}

impl ExecuteCodeTool {
    pub fn new(runner: Arc<dyn CodeRunner>) -> Self {
        Self { runner }
    }
}

#[derive(Deserialize)]
struct ExecuteCodeArgs {
    language: String,
    code: String,
}

#[async_trait]
impl Tool for ExecuteCodeTool {
    fn name(&self) -> &str {
        TOOL_EXECUTE_CODE
    }

    fn spec(&self) -> crate::types::ToolDefinition {
        crate::types::ToolDefinition {
            name: TOOL_EXECUTE_CODE.into(),
            description: "Run a short snippet of code in a sandboxed interpreter.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "language": {"type": "string"},
                    "code": {"type": "string"}
                },
                "required": ["language", "code"]
            }),
        }
    }

    async fn call(&self, args: Value, _ctx: &ToolCallContext) -> ToolResult {
        let parsed: ExecuteCodeArgs = match serde_json::from_value(args) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("invalid execute_code arguments: {e}")),
        };
        match self.runner.run(&parsed.language, &parsed.code).await {
            Ok(output) => ToolResult::ok(output),
            Err(message) => ToolResult::error(message),
        }
    }
}

/// Re-enters the agent loop with a list of sub-instructions and folds the
/// combined transcript back into one `ToolResult`. The actual
/// recursive run lives on whatever owns the agent loop (`agent` module);
/// this tool only defines the collaborator seam, mirroring `ExecuteCodeTool`.
#[async_trait]
pub trait PlanExecutor: Send + Sync {
    async fn execute_plan(&self, steps: Vec<String>) -> Result<String, String>;
}

pub struct ExecutePlanTool {
    executor: Arc<dyn PlanExecutor>,
}

impl ExecutePlanTool {
    pub fn new(executor: Arc<dyn PlanExecutor>) -> Self {
        Self { executor }
    }
}

#[derive(Deserialize)]
struct ExecutePlanArgs {
    steps: Vec<String>,
}

#[async_trait]
impl Tool for ExecutePlanTool {
    fn name(&self) -> &str {
        TOOL_EXECUTE_PLAN
    }

    fn spec(&self) -> crate::types::ToolDefinition {
        crate::types::ToolDefinition {
            name: TOOL_EXECUTE_PLAN.into(),
            description: "Execute an ordered list of sub-steps as nested agent turns.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "steps": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["steps"]
            }),
        }
    }

    async fn call(&self, args: Value, _ctx: &ToolCallContext) -> ToolResult {
        let parsed: ExecutePlanArgs = match serde_json::from_value(args) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("invalid execute_plan arguments: {e}")),
        };
        if parsed.steps.is_empty() {
            return ToolResult::error("execute_plan requires at least one step");
        }
        match self.executor.execute_plan(parsed.steps).await {
            Ok(summary) => ToolResult::ok(summary),
            Err(message) => ToolResult::error(message),
        }
    }
}
