//! # Weft
//!
//! A runtime for building and operating LLM agents: single agents, networks of
//! delegating sub-agents, and DAG workflows, all sharing one event stream, one
//! tool-call contract, and one memory model.
//!
//! ## Design principles
//!
//! - **Provider-agnostic core**: agents talk to any [`Provider`] — the trait
//!   is the only seam between this crate and a concrete LLM backend.
//! - **Tool failures are data, not faults**: [`Tool::call`] returns a
//!   [`ToolResult`] directly; only infrastructure failures (panics, unknown
//!   tool names) become [`AgentError`].
//! - **One event stream**: every run emits [`StreamEvent`]s — text/thinking
//!   deltas, tool call lifecycle, suspend/resume, usage — whether it's a
//!   single agent, a sub-agent delegated to through a [`Network`], or a step
//!   inside a [`Workflow`].
//! - **Memory composes, it doesn't dictate**: [`MemoryBundle`] assembles
//!   per-turn context from a recent window, semantic recall, and durable
//!   facts; agents that don't need memory simply omit it.
//!
//! ## Main modules
//!
//! - [`types`]: wire types shared everywhere — [`Message`], [`ChatRequest`],
//!   [`ToolCall`], [`ToolResult`], [`Fact`], [`AgentTask`], [`AgentResult`].
//! - [`provider`]: the [`Provider`] trait, [`RetryingProvider`] retry
//!   middleware, [`ChatDelta`] streaming.
//! - [`tools`]: [`Tool`] trait, [`ToolRegistry`]; built-ins [`AskUserTool`],
//!   [`ExecuteCodeTool`], [`ExecutePlanTool`].
//! - [`processors`]: [`ProcessorChain`] of pre-LLM/post-LLM/post-tool hooks.
//! - [`memory`]: [`Store`] trait and [`InMemoryStore`], semantic
//!   [`MemoryStore`] of [`Fact`]s, and [`MemoryBundle`] composition.
//! - [`agent`]: [`AgentCore`], [`LlmAgent`], the run loop.
//! - [`network`]: [`Network`] — expose sub-agents as synthetic
//!   `agent_<name>` tools.
//! - [`workflow`]: [`Workflow`]/[`CompiledWorkflow`] — DAG of agent/tool
//!   steps with `for_each`/`do_until`/`do_while` control flow.
//! - [`ingestion`]: [`IngestionPipeline`] — extract, chunk, embed, optionally
//!   enrich documents into a [`Store`].
//! - [`events`]: [`StreamEvent`], [`EventSink`]/[`EventSource`], `channel`.
//! - [`error`]: [`AgentError`], [`ProviderError`], [`WorkflowError`].
//!
//! Key types are re-exported at crate root.

pub mod agent;
pub mod error;
pub mod events;
pub mod ingestion;
pub mod memory;
pub mod network;
pub mod processors;
pub mod provider;
pub mod tools;
pub mod types;
pub mod workflow;

pub use agent::{AgentCore, InputHandler, LlmAgent};
pub use error::{AgentError, ProviderError, Result, WorkflowError};
pub use events::{channel, send_checked, EventSink, EventSource, StreamEvent, DEFAULT_CHANNEL_CAPACITY};
pub use ingestion::{
    ChunkEnricher, ChunkingConfig, Extractor, ExtractorRegistry, IngestedChunk, IngestionConfig,
    IngestionPipeline,
};
pub use memory::{
    ComposedContext, FilterOp, InMemoryStore, Item, MemoryBundle, MemoryBundleConfig, MemoryStore,
    MemoryStoreConfig, Namespace, RecordOutcome, SearchItem, SearchOptions, Store, StoreError,
};
pub use network::{Network, NetworkConfig};
pub use processors::{PostLlmProcessor, PostToolProcessor, PreLlmProcessor, ProcessorChain, ProcessorContext};
pub use provider::{ChatDelta, ChatDeltaSink, Provider, RetryConfig, RetryingProvider};
pub use tools::{
    AskUserTool, CodeRunner, ExecuteCodeTool, ExecutePlanTool, PlanExecutor, Tool, ToolCallContext,
    ToolRegistry,
};
pub use types::{
    AgentResult, AgentTask, Attachment, AttachmentSource, ChatRequest, ChatResponse, Fact,
    GenerationParams, Message, Role, ScheduledAction, Thread, ToolCall, ToolDefinition, ToolResult,
    Usage,
};
pub use workflow::{CompiledWorkflow, Step, StepBody, Workflow, WorkflowContext};
