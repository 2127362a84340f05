//! Network/router: delegates to named sub-agents through synthetic
//! `agent_<name>` tool calls. An agent runner is exposed as an ordinary
//! `Tool` so a parent agent's LLM can call it like any other tool; this
//! module generalizes that single-runner adapter into a registry of named
//! sub-agents plus stream-forwarding and drain-timeout machinery on top of it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::agent::LlmAgent;
use crate::error::{AgentError, Result};
use crate::events::{send_checked, EventSink, StreamEvent};
use crate::tools::{Tool, ToolCallContext};
use crate::types::{AgentTask, ToolDefinition, ToolResult};

#[derive(Clone, Debug)]
pub struct NetworkConfig {
    /// How long the router waits for a sub-agent's forwarded event stream to
    /// go quiet before giving up and returning whatever text it produced so
    /// far. Default 60s.
    pub drain_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(60),
        }
    }
}

/// A named collection of sub-agents a router `Network` can delegate to.
/// Each is exposed to the parent's LLM as a tool named `agent_<name>`.
pub struct Network {
    agents: HashMap<String, Arc<LlmAgent>>,
    config: NetworkConfig,
}

impl Network {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            agents: HashMap::new(),
            config,
        }
    }

    pub fn register(&mut self, name: impl Into<String>, agent: Arc<LlmAgent>) {
        self.agents.insert(name.into(), agent);
    }

    /// Synthetic tool definitions for every registered sub-agent, ready to be
    /// merged into a router's `ToolRegistry`.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.agents
            .keys()
            .map(|name| ToolDefinition {
                name: synthetic_tool_name(name),
                description: format!("Delegate a task to the {name} sub-agent."),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "task": {"type": "string", "description": "Task to hand to the sub-agent. Include all needed context; it has no memory of this conversation."}
                    },
                    "required": ["task"]
                }),
            })
            .collect()
    }

    /// Wraps each registered sub-agent as a `Tool` named `agent_<name>`,
    /// for direct registration into a `ToolRegistry`.
    pub fn as_tools(self: &Arc<Self>) -> Vec<Arc<dyn Tool>> {
        self.agents
            .keys()
            .map(|name| {
                Arc::new(SubAgentTool {
                    network: self.clone(),
                    tool_name: synthetic_tool_name(name),
                    name: name.clone(),
                }) as Arc<dyn Tool>
            })
            .collect()
    }

    /// Runs the named sub-agent, forwarding its stream events onto `parent`'s
    /// sink tagged with `with_sub_agent`, bounded by
    /// `drain_timeout`.
    async fn delegate(
        &self,
        name: &str,
        task: AgentTask,
        parent_sink: Option<&EventSink>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let agent = self
            .agents
            .get(name)
            .ok_or_else(|| AgentError::ProcessorRejected {
                stage: "network_delegate",
                message: format!("no sub-agent registered under {name:?}"),
            })?
            .clone();

        let (sub_tx, mut sub_rx) = crate::events::channel(crate::events::DEFAULT_CHANNEL_CAPACITY);
        let sub_cancel = cancel.clone();
        let name_owned = name.to_string();
        let join = tokio::spawn(async move { agent.run(task, Some(sub_tx), sub_cancel).await });

        if let Some(parent) = parent_sink {
            loop {
                let recv = tokio::time::timeout(self.config.drain_timeout, sub_rx.recv()).await;
                match recv {
                    Ok(Some(event)) => {
                        if event.is_input_received() {
                            continue;
                        }
                        if !send_checked(parent, cancel, event.with_sub_agent(name_owned.clone())).await {
                            break;
                        }
                    }
                    Ok(None) => break, // sub-agent's sink closed: it finished
                    Err(_) => break,   // drain timeout elapsed
                }
            }
        }

        match join.await {
            Ok(Ok(result)) => Ok(result.output),
            Ok(Err(e)) => Err(e),
            Err(join_err) => Err(AgentError::SubagentPanic {
                name: name.to_string(),
                message: join_err.to_string(),
            }),
        }
    }
}

fn synthetic_tool_name(agent_name: &str) -> String {
    format!("agent_{}", agent_name.replace([' ', '-'], "_"))
}

struct SubAgentTool {
    network: Arc<Network>,
    name: String,
    tool_name: String,
}

#[async_trait]
impl Tool for SubAgentTool {
    fn name(&self) -> &str {
        &self.tool_name
    }

    fn spec(&self) -> ToolDefinition {
        ToolDefinition {
            name: synthetic_tool_name(&self.name),
            description: format!("Delegate a task to the {} sub-agent.", self.name),
            parameters: json!({
                "type": "object",
                "properties": {
                    "task": {"type": "string"}
                },
                "required": ["task"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value, ctx: &ToolCallContext) -> ToolResult {
        let task = match args.get("task").and_then(|v| v.as_str()) {
            Some(t) => AgentTask::new(t),
            None => return ToolResult::error("missing required argument: task"),
        };
        let cancel = ctx.cancel.clone().unwrap_or_default();
        match self
            .network
            .delegate(&self.name, task, ctx.events.as_ref(), &cancel)
            .await
        {
            Ok(text) => ToolResult::ok(text),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}
