//! Processor chain: ordered hooks over a turn's request/response/tool-result
//! data. An around-pattern middleware (wrap the step being hooked) is
//! generalized into three flat, ordered hook lists keyed to the three points
//! in the loop where mutation or rejection makes sense: before the provider
//! call, after it, and after each tool call.
//!
//! Any hook can reject the turn; the loop then stops and surfaces
//! `AgentError::ProcessorRejected` rather than continuing with unvetted data.
//! A rejected turn never reaches the provider or the caller silently.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::types::{ChatRequest, ChatResponse, ToolCall, ToolResult};

/// Shared read-only context passed to every hook.
#[derive(Clone, Debug, Default)]
pub struct ProcessorContext {
    pub agent_name: String,
    pub thread_id: Option<String>,
}

#[async_trait]
pub trait PreLlmProcessor: Send + Sync {
    /// Runs before the provider call; may mutate `request` in place (e.g.
    /// inject retrieved memory, trim history) or reject the turn.
    async fn process(&self, request: &mut ChatRequest, ctx: &ProcessorContext) -> Result<()>;
}

#[async_trait]
pub trait PostLlmProcessor: Send + Sync {
    /// Runs after the provider call, before tool calls are dispatched.
    async fn process(&self, response: &mut ChatResponse, ctx: &ProcessorContext) -> Result<()>;
}

#[async_trait]
pub trait PostToolProcessor: Send + Sync {
    /// Runs after each individual tool call completes; may redact or augment
    /// `result` (e.g. strip secrets from tool output) or reject the turn.
    async fn process(
        &self,
        call: &ToolCall,
        result: &mut ToolResult,
        ctx: &ProcessorContext,
    ) -> Result<()>;
}

/// The three ordered hook lists an `Agent` runs a turn through. Hooks run in registration order; the first rejection wins.
#[derive(Clone, Default)]
pub struct ProcessorChain {
    pre_llm: Vec<Arc<dyn PreLlmProcessor>>,
    post_llm: Vec<Arc<dyn PostLlmProcessor>>,
    post_tool: Vec<Arc<dyn PostToolProcessor>>,
}

impl ProcessorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pre_llm(mut self, p: Arc<dyn PreLlmProcessor>) -> Self {
        self.pre_llm.push(p);
        self
    }

    pub fn with_post_llm(mut self, p: Arc<dyn PostLlmProcessor>) -> Self {
        self.post_llm.push(p);
        self
    }

    pub fn with_post_tool(mut self, p: Arc<dyn PostToolProcessor>) -> Self {
        self.post_tool.push(p);
        self
    }

    pub async fn run_pre_llm(&self, request: &mut ChatRequest, ctx: &ProcessorContext) -> Result<()> {
        for p in &self.pre_llm {
            p.process(request, ctx).await.map_err(|e| reject("pre_llm", e))?;
        }
        Ok(())
    }

    pub async fn run_post_llm(&self, response: &mut ChatResponse, ctx: &ProcessorContext) -> Result<()> {
        for p in &self.post_llm {
            p.process(response, ctx).await.map_err(|e| reject("post_llm", e))?;
        }
        Ok(())
    }

    pub async fn run_post_tool(
        &self,
        call: &ToolCall,
        result: &mut ToolResult,
        ctx: &ProcessorContext,
    ) -> Result<()> {
        for p in &self.post_tool {
            p.process(call, result, ctx)
                .await
                .map_err(|e| reject("post_tool", e))?;
        }
        Ok(())
    }
}

fn reject(stage: &'static str, cause: AgentError) -> AgentError {
    match cause {
        // a hook that already produced a typed rejection keeps its message
        AgentError::ProcessorRejected { message, .. } => AgentError::ProcessorRejected { stage, message },
        other => AgentError::ProcessorRejected {
            stage,
            message: other.to_string(),
        },
    }
}
