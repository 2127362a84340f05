//! The agent loop: a think/act/observe/compress cycle built as a literal
//! sequential state machine rather than a cyclic graph walk. Per-turn
//! mechanics (compose context, call provider, dispatch tool calls, append
//! results, repeat) follow the `auto_execute_loop` shape from the sibling
//! pack repo `slb350-open-agent-sdk-rust`'s `client.rs`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, ProviderError, Result};
use crate::events::{send_checked, EventSink, StreamEvent};
use crate::memory::MemoryBundle;
use crate::processors::{ProcessorChain, ProcessorContext};
use crate::provider::Provider;
use crate::tools::{PlanExecutor, ToolCallContext, ToolRegistry};
use crate::types::{AgentResult, AgentTask, ChatRequest, Message, Thread, ToolDefinition, Usage};

/// Text substituted for a terminal turn whose assistant message has both
/// empty content and no tool calls.
const DONE_TEXT: &str = "Done.";

/// Suspends the loop for human input. Callers
/// supply a concrete implementation (a CLI prompt, a chat-bot reply-wait,
/// ...); the runtime carries no UI of its own.
#[async_trait]
pub trait InputHandler: Send + Sync {
    async fn request_input(&self, question: &str) -> String;
}

/// Shared, engine-agnostic agent configuration.
pub struct AgentCore {
    pub name: String,
    pub system_prompt: String,
    pub tools: ToolRegistry,
    pub processors: ProcessorChain,
    pub memory: Option<Arc<MemoryBundle>>,
    /// Hard cap on think/act iterations per invocation.
    pub max_iterations: usize,
    /// Hard cap on `ask_user` suspensions per invocation, guarding against an
    /// LLM that loops on asking.
    pub max_suspensions: usize,
    /// Hard cap, in bytes, on the combined size of suspension snapshots (the
    /// question plus accumulated history) taken across an invocation's
    /// `ask_user` calls. A call that would exceed it returns a
    /// policy-violation `ToolResult` instead of suspending.
    pub max_suspend_bytes: usize,
    /// Optional predicate over a tool name: when it returns `true` for the
    /// sole tool call of a turn whose result is not an error, the loop treats
    /// that result as the final answer instead of calling the provider again.
    pub short_circuit: Option<Arc<dyn Fn(&str) -> bool + Send + Sync>>,
    /// Per-task system prompt override; falls back to `system_prompt` when it
    /// returns `None`.
    pub dynamic_prompt: Option<Arc<dyn Fn(&AgentTask) -> Option<String> + Send + Sync>>,
    /// Per-task tool-definition override shown to the model this turn; falls
    /// back to `tools.list()` when it returns `None`. Dispatch still resolves
    /// against the full `tools` registry regardless of this override.
    pub dynamic_tools: Option<Arc<dyn Fn(&AgentTask) -> Option<Vec<ToolDefinition>> + Send + Sync>>,
}

impl AgentCore {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            tools: ToolRegistry::new(),
            processors: ProcessorChain::new(),
            memory: None,
            max_iterations: 25,
            max_suspensions: 10,
            max_suspend_bytes: 1 << 20,
            short_circuit: None,
            dynamic_prompt: None,
            dynamic_tools: None,
        }
    }
}

/// A concrete agent: an `AgentCore` plus the `Provider` it talks to.
pub struct LlmAgent {
    pub core: AgentCore,
    pub provider: Arc<dyn Provider>,
    pub input_handler: Option<Arc<dyn InputHandler>>,
    /// Per-task provider override; falls back to `provider` when it returns
    /// `None`.
    pub dynamic_model: Option<Arc<dyn Fn(&AgentTask) -> Option<Arc<dyn Provider>> + Send + Sync>>,
}

impl LlmAgent {
    pub fn new(core: AgentCore, provider: Arc<dyn Provider>) -> Self {
        Self {
            core,
            provider,
            input_handler: None,
            dynamic_model: None,
        }
    }

    pub fn with_input_handler(mut self, handler: Arc<dyn InputHandler>) -> Self {
        self.input_handler = Some(handler);
        self
    }

    pub fn with_dynamic_model(
        mut self,
        f: Arc<dyn Fn(&AgentTask) -> Option<Arc<dyn Provider>> + Send + Sync>,
    ) -> Self {
        self.dynamic_model = Some(f);
        self
    }

    /// Runs one full agent turn to completion. Emits exactly
    /// one `AgentStart` on entry and one `AgentEnd` on exit, streaming intermediate events to `events` if given.
    pub async fn run(
        &self,
        task: AgentTask,
        events: Option<EventSink>,
        cancel: CancellationToken,
    ) -> Result<AgentResult> {
        let thread_id = task
            .thread_id()
            .map(ToString::to_string)
            .unwrap_or_else(|| Thread::new("default").id);
        let user_id = task
            .context
            .get("user_id")
            .and_then(|v| v.as_str())
            .unwrap_or("anonymous")
            .to_string();

        if let Some(sink) = &events {
            if !send_checked(
                sink,
                &cancel,
                StreamEvent::InputReceived {
                    agent: self.core.name.clone(),
                    sub_agent: None,
                    input: task.input.clone(),
                },
            )
            .await
            {
                return Err(AgentError::Cancelled);
            }
            if !send_checked(
                sink,
                &cancel,
                StreamEvent::AgentStart {
                    agent: self.core.name.clone(),
                    sub_agent: None,
                },
            )
            .await
            {
                return Err(AgentError::Cancelled);
            }
        }

        let result = self.run_inner(&task, &thread_id, &user_id, events.as_ref(), &cancel).await;

        if let Some(sink) = &events {
            let _ = send_checked(
                sink,
                &cancel,
                StreamEvent::AgentEnd {
                    agent: self.core.name.clone(),
                    sub_agent: None,
                },
            )
            .await;
        }

        result
    }

    async fn run_inner(
        &self,
        task: &AgentTask,
        thread_id: &str,
        user_id: &str,
        events: Option<&EventSink>,
        cancel: &CancellationToken,
    ) -> Result<AgentResult> {
        let mut history: Vec<Message> = vec![Message::user(thread_id, task.input.clone())];
        let mut total_usage = Usage::default();
        let mut suspensions = 0usize;
        let mut suspend_bytes = 0usize;
        let proc_ctx = ProcessorContext {
            agent_name: self.core.name.clone(),
            thread_id: Some(thread_id.to_string()),
        };

        let provider: Arc<dyn Provider> = match &self.dynamic_model {
            Some(f) => f(task).unwrap_or_else(|| self.provider.clone()),
            None => self.provider.clone(),
        };

        for _ in 0..self.core.max_iterations {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            let mut request = self.build_request(thread_id, user_id, &history, task, None).await?;
            self.core
                .processors
                .run_pre_llm(&mut request, &proc_ctx)
                .await?;

            let mut response = provider.chat(&request, cancel).await.map_err(AgentError::Provider)?;
            self.core
                .processors
                .run_post_llm(&mut response, &proc_ctx)
                .await?;

            if let Some(usage) = response.usage {
                total_usage = total_usage + usage;
                if let Some(sink) = events {
                    let _ = send_checked(
                        sink,
                        cancel,
                        StreamEvent::UsageUpdate {
                            agent: self.core.name.clone(),
                            sub_agent: None,
                            usage: total_usage,
                        },
                    )
                    .await;
                }
            }

            if response.tool_calls.is_empty() {
                let output = if response.content.is_empty() {
                    DONE_TEXT.to_string()
                } else {
                    response.content.clone()
                };
                if let Some(sink) = events {
                    let _ = send_checked(
                        sink,
                        cancel,
                        StreamEvent::TextDelta {
                            agent: self.core.name.clone(),
                            sub_agent: None,
                            text: output.clone(),
                        },
                    )
                    .await;
                }
                return Ok(AgentResult {
                    output,
                    usage: total_usage,
                    attachments: response.attachments,
                });
            }

            history.push(Message::assistant_with_tool_calls(thread_id, response.tool_calls.clone()));

            let mut short_circuit_output: Option<String> = None;
            let is_single_call = response.tool_calls.len() == 1;
            for call in &response.tool_calls {
                if call.name == crate::tools::TOOL_ASK_USER {
                    let question = call
                        .arguments
                        .get("question")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();

                    let snapshot_size = question.len()
                        + history.iter().map(|m| m.content.len()).sum::<usize>();
                    if suspend_bytes.saturating_add(snapshot_size) > self.core.max_suspend_bytes {
                        let mut result = crate::types::ToolResult::error(format!(
                            "suspend snapshot cap exceeded: max_suspend_bytes ({}) reached",
                            self.core.max_suspend_bytes
                        ));
                        self.core
                            .processors
                            .run_post_tool(call, &mut result, &proc_ctx)
                            .await?;
                        history.push(Message::tool_result(thread_id, &call.id, result.content));
                        continue;
                    }
                    suspend_bytes += snapshot_size;

                    suspensions += 1;
                    if suspensions > self.core.max_suspensions {
                        return Err(AgentError::SuspendCapExceeded {
                            count: suspensions,
                            max: self.core.max_suspensions,
                        });
                    }
                    if let Some(sink) = events {
                        let _ = send_checked(
                            sink,
                            cancel,
                            StreamEvent::InputRequest {
                                agent: self.core.name.clone(),
                                sub_agent: None,
                                question: question.clone(),
                            },
                        )
                        .await;
                        let _ = send_checked(
                            sink,
                            cancel,
                            StreamEvent::Suspend {
                                agent: self.core.name.clone(),
                                sub_agent: None,
                            },
                        )
                        .await;
                    }
                    let answer = match &self.input_handler {
                        Some(handler) => handler.request_input(&question).await,
                        None => String::new(),
                    };
                    if let Some(sink) = events {
                        let _ = send_checked(
                            sink,
                            cancel,
                            StreamEvent::Resume {
                                agent: self.core.name.clone(),
                                sub_agent: None,
                            },
                        )
                        .await;
                    }
                    let mut result = crate::types::ToolResult::ok(answer);
                    self.core
                        .processors
                        .run_post_tool(call, &mut result, &proc_ctx)
                        .await?;
                    history.push(Message::tool_result(thread_id, &call.id, result.content));
                    continue;
                }

                let mut result = self.call_tool_contained(call, &history, events, cancel).await;
                self.core
                    .processors
                    .run_post_tool(call, &mut result, &proc_ctx)
                    .await?;

                if let Some(sink) = events {
                    let _ = send_checked(
                        sink,
                        cancel,
                        StreamEvent::ToolResultEvent {
                            agent: self.core.name.clone(),
                            sub_agent: None,
                            id: call.id.clone(),
                            result: result.clone(),
                        },
                    )
                    .await;
                }

                history.push(Message::tool_result(thread_id, &call.id, result.content.clone()));

                if let Some(predicate) = &self.core.short_circuit {
                    if is_single_call && !result.is_error() && predicate(&call.name) {
                        short_circuit_output = Some(result.content.clone());
                    }
                }
            }

            if let Some(output) = short_circuit_output {
                return Ok(AgentResult {
                    output,
                    usage: total_usage,
                    attachments: Vec::new(),
                });
            }
        }

        // maxIter reached: forced synthesis round with tools disabled, yielding
        // a final textual answer instead of failing the turn.
        let mut request = self.build_request(thread_id, user_id, &history, task, Some(Vec::new())).await?;
        self.core
            .processors
            .run_pre_llm(&mut request, &proc_ctx)
            .await?;
        let mut response = provider.chat(&request, cancel).await.map_err(AgentError::Provider)?;
        self.core
            .processors
            .run_post_llm(&mut response, &proc_ctx)
            .await?;
        if let Some(usage) = response.usage {
            total_usage = total_usage + usage;
        }
        let output = if response.content.is_empty() {
            DONE_TEXT.to_string()
        } else {
            response.content
        };
        if let Some(sink) = events {
            let _ = send_checked(
                sink,
                cancel,
                StreamEvent::TextDelta {
                    agent: self.core.name.clone(),
                    sub_agent: None,
                    text: output.clone(),
                },
            )
            .await;
        }
        Ok(AgentResult {
            output,
            usage: total_usage,
            attachments: response.attachments,
        })
    }

    /// Calls a tool inside a contained task so a panicking tool never takes
    /// down the loop; the panic becomes error-as-data on the `ToolResult`
    /// instead of unwinding the caller.
    async fn call_tool_contained(
        &self,
        call: &crate::types::ToolCall,
        history: &[Message],
        events: Option<&EventSink>,
        cancel: &CancellationToken,
    ) -> crate::types::ToolResult {
        let registry = &self.core.tools;
        let ctx = ToolCallContext {
            recent_messages: history.to_vec(),
            events: events.cloned(),
            thread_id: history.first().map(|m| m.thread_id.clone()),
            cancel: Some(cancel.clone()),
        };

        if !registry.contains(&call.name) {
            return crate::types::ToolResult::error(format!("unknown tool: {}", call.name));
        }

        let Some(tool) = registry.get(&call.name) else {
            return crate::types::ToolResult::error(format!("unknown tool: {}", call.name));
        };
        let args = call.arguments.clone();
        let call_id = call.id.clone();

        let joined = tokio::spawn(async move { tool.call(args, &ctx).await }).await;
        match joined {
            Ok(result) => result,
            Err(join_err) => crate::types::ToolResult::error(format!(
                "tool {} (call {}) panicked: {}",
                call.name, call_id, join_err
            )),
        }
    }

    /// Builds the `ChatRequest` for one turn. `tools_override`, when given,
    /// replaces the tool list shown to the model this turn regardless of
    /// `dynamic_tools` (used for the maxIter forced-synthesis round, which
    /// disables tools entirely by passing `Some(Vec::new())`).
    async fn build_request(
        &self,
        thread_id: &str,
        user_id: &str,
        history: &[Message],
        task: &AgentTask,
        tools_override: Option<Vec<ToolDefinition>>,
    ) -> Result<ChatRequest> {
        let tools = match tools_override {
            Some(t) => t,
            None => match &self.core.dynamic_tools {
                Some(f) => f(task).unwrap_or_else(|| self.core.tools.list()),
                None => self.core.tools.list(),
            },
        };
        let system_prompt = match &self.core.dynamic_prompt {
            Some(f) => f(task).unwrap_or_else(|| self.core.system_prompt.clone()),
            None => self.core.system_prompt.clone(),
        };
        let messages = match &self.core.memory {
            Some(bundle) => {
                let last_input = history
                    .iter()
                    .rev()
                    .find(|m| m.role == crate::types::Role::User)
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                let ctx = bundle
                    .compose(thread_id, user_id, history.to_vec(), &last_input)
                    .await?;
                ctx.messages
            }
            None => history.to_vec(),
        };

        let mut all_messages = Vec::with_capacity(messages.len() + 1);
        all_messages.push(Message::system(thread_id, system_prompt));
        all_messages.extend(messages);

        Ok(ChatRequest {
            messages: all_messages,
            response_schema: None,
            params: Default::default(),
            tools,
        })
    }
}

/// Re-enters the loop once per plan step, running each as an independent
/// `AgentTask` and folding the resulting outputs into one transcript. Bounded
/// by `max_iterations` rather than letting `execute_plan` run an unbounded
/// number of nested turns.
#[async_trait]
impl PlanExecutor for LlmAgent {
    async fn execute_plan(&self, steps: Vec<String>) -> std::result::Result<String, String> {
        if steps.len() > self.core.max_iterations {
            return Err(format!(
                "execute_plan: {} steps exceeds max_iterations ({})",
                steps.len(),
                self.core.max_iterations
            ));
        }
        let mut summary = String::new();
        for (index, step) in steps.iter().enumerate() {
            let result = self
                .run(AgentTask::new(step.clone()), None, CancellationToken::new())
                .await
                .map_err(|e| format!("plan step {} ({step:?}) failed: {e}", index + 1))?;
            if !summary.is_empty() {
                summary.push('\n');
            }
            summary.push_str(&result.output);
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::channel;
    use crate::tools::{Tool, ToolCallContext as TCC};
    use crate::types::{ChatResponse, ToolCall, ToolDefinition, ToolResult};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedProvider {
        turns: std::sync::Mutex<Vec<ChatResponse>>,
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn chat(
            &self,
            _req: &ChatRequest,
            _cancel: &CancellationToken,
        ) -> std::result::Result<ChatResponse, ProviderError> {
            let mut turns = self.turns.lock().unwrap();
            Ok(turns.remove(0))
        }
        async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts.iter().map(|_| vec![0.0]).collect())
        }
    }

    struct CountingTool(Arc<AtomicUsize>);

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            "counter"
        }
        fn spec(&self) -> ToolDefinition {
            ToolDefinition {
                name: "counter".into(),
                description: "increments a counter".into(),
                parameters: json!({"type": "object"}),
            }
        }
        async fn call(&self, _args: serde_json::Value, _ctx: &TCC) -> ToolResult {
            self.0.fetch_add(1, Ordering::SeqCst);
            ToolResult::ok("incremented")
        }
    }

    #[tokio::test]
    async fn runs_tool_then_returns_final_text_reply() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut core = AgentCore::new("assistant", "You are helpful.");
        core.tools.register(Arc::new(CountingTool(counter.clone())));

        let tool_call = ToolCall::new("counter", json!({}));
        let provider = ScriptedProvider {
            turns: std::sync::Mutex::new(vec![
                ChatResponse {
                    content: String::new(),
                    tool_calls: vec![tool_call],
                    usage: Some(Usage {
                        input_tokens: 10,
                        output_tokens: 5,
                        cached_tokens: 0,
                    }),
                    attachments: vec![],
                },
                ChatResponse {
                    content: "done".into(),
                    tool_calls: vec![],
                    usage: None,
                    attachments: vec![],
                },
            ]),
        };

        let agent = LlmAgent::new(core, Arc::new(provider));
        let result = agent
            .run(AgentTask::new("do it"), None, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.output, "done");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn agent_start_and_end_are_each_emitted_exactly_once() {
        let core = AgentCore::new("assistant", "sys");
        let provider = ScriptedProvider {
            turns: std::sync::Mutex::new(vec![ChatResponse {
                content: "hi".into(),
                tool_calls: vec![],
                usage: None,
                attachments: vec![],
            }]),
        };
        let agent = LlmAgent::new(core, Arc::new(provider));
        let (tx, mut rx) = channel(16);
        agent
            .run(AgentTask::new("hello"), Some(tx), CancellationToken::new())
            .await
            .unwrap();

        let mut starts = 0;
        let mut ends = 0;
        while let Ok(event) = rx.try_recv() {
            if event.is_agent_start() {
                starts += 1;
            }
            if event.is_agent_end() {
                ends += 1;
            }
        }
        assert_eq!(starts, 1);
        assert_eq!(ends, 1);
    }

    #[tokio::test]
    async fn empty_terminal_response_becomes_done_text() {
        let core = AgentCore::new("assistant", "sys");
        let provider = ScriptedProvider {
            turns: std::sync::Mutex::new(vec![ChatResponse {
                content: String::new(),
                tool_calls: vec![],
                usage: None,
                attachments: vec![],
            }]),
        };
        let agent = LlmAgent::new(core, Arc::new(provider));
        let result = agent
            .run(AgentTask::new("hello"), None, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.output, "Done.");
    }

    #[tokio::test]
    async fn exhausting_max_iterations_triggers_a_forced_synthesis_round() {
        let mut core = AgentCore::new("assistant", "sys");
        core.max_iterations = 2;
        let counter = Arc::new(AtomicUsize::new(0));
        core.tools.register(Arc::new(CountingTool(counter.clone())));

        let tool_call = || ToolCall::new("counter", json!({}));
        let looping = ChatResponse {
            content: String::new(),
            tool_calls: vec![tool_call()],
            usage: None,
            attachments: vec![],
        };
        let provider = ScriptedProvider {
            turns: std::sync::Mutex::new(vec![
                looping.clone(),
                looping,
                ChatResponse {
                    content: "synthesized answer".into(),
                    tool_calls: vec![],
                    usage: None,
                    attachments: vec![],
                },
            ]),
        };
        let agent = LlmAgent::new(core, Arc::new(provider));
        let result = agent
            .run(AgentTask::new("keep going"), None, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.output, "synthesized answer");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn short_circuit_does_not_apply_when_the_tool_call_errored() {
        let mut core = AgentCore::new("assistant", "sys");
        core.short_circuit = Some(Arc::new(|name| name == "counter"));
        let counter = Arc::new(AtomicUsize::new(0));
        core.tools.register(Arc::new(CountingTool(counter.clone())));

        let provider = ScriptedProvider {
            turns: std::sync::Mutex::new(vec![
                ChatResponse {
                    content: String::new(),
                    tool_calls: vec![ToolCall::new("missing_tool", json!({}))],
                    usage: None,
                    attachments: vec![],
                },
                ChatResponse {
                    content: "recovered".into(),
                    tool_calls: vec![],
                    usage: None,
                    attachments: vec![],
                },
            ]),
        };
        let agent = LlmAgent::new(core, Arc::new(provider));
        let result = agent
            .run(AgentTask::new("go"), None, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.output, "recovered");
    }

    #[tokio::test]
    async fn short_circuit_does_not_apply_when_multiple_tools_are_called_in_one_turn() {
        let mut core = AgentCore::new("assistant", "sys");
        core.short_circuit = Some(Arc::new(|name| name == "counter"));
        let counter = Arc::new(AtomicUsize::new(0));
        core.tools.register(Arc::new(CountingTool(counter.clone())));

        let provider = ScriptedProvider {
            turns: std::sync::Mutex::new(vec![
                ChatResponse {
                    content: String::new(),
                    tool_calls: vec![ToolCall::new("counter", json!({})), ToolCall::new("counter", json!({}))],
                    usage: None,
                    attachments: vec![],
                },
                ChatResponse {
                    content: "final".into(),
                    tool_calls: vec![],
                    usage: None,
                    attachments: vec![],
                },
            ]),
        };
        let agent = LlmAgent::new(core, Arc::new(provider));
        let result = agent
            .run(AgentTask::new("go"), None, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.output, "final");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn input_received_is_emitted_exactly_once_and_before_agent_start() {
        let core = AgentCore::new("assistant", "sys");
        let provider = ScriptedProvider {
            turns: std::sync::Mutex::new(vec![ChatResponse {
                content: "hi".into(),
                tool_calls: vec![],
                usage: None,
                attachments: vec![],
            }]),
        };
        let agent = LlmAgent::new(core, Arc::new(provider));
        let (tx, mut rx) = channel(16);
        agent
            .run(AgentTask::new("hello"), Some(tx), CancellationToken::new())
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        let received_count = events.iter().filter(|e| e.is_input_received()).count();
        assert_eq!(received_count, 1);
        let received_index = events.iter().position(|e| e.is_input_received()).unwrap();
        let start_index = events.iter().position(|e| e.is_agent_start()).unwrap();
        assert!(received_index < start_index);
    }

    #[tokio::test]
    async fn execute_plan_reenters_the_loop_once_per_step() {
        let core = AgentCore::new("assistant", "sys");
        let provider = ScriptedProvider {
            turns: std::sync::Mutex::new(vec![
                ChatResponse {
                    content: "step one done".into(),
                    tool_calls: vec![],
                    usage: None,
                    attachments: vec![],
                },
                ChatResponse {
                    content: "step two done".into(),
                    tool_calls: vec![],
                    usage: None,
                    attachments: vec![],
                },
            ]),
        };
        let agent = LlmAgent::new(core, Arc::new(provider));
        let summary = agent
            .execute_plan(vec!["first step".to_string(), "second step".to_string()])
            .await
            .unwrap();
        assert!(summary.contains("step one done"));
        assert!(summary.contains("step two done"));
    }

    #[tokio::test]
    async fn suspend_byte_cap_exceeded_returns_policy_violation_instead_of_suspending() {
        let mut core = AgentCore::new("assistant", "sys");
        core.max_suspend_bytes = 4;
        let ask = || {
            ToolCall::new(
                crate::tools::TOOL_ASK_USER,
                json!({"question": "what is your favorite color?"}),
            )
        };
        let provider = ScriptedProvider {
            turns: std::sync::Mutex::new(vec![
                ChatResponse {
                    content: String::new(),
                    tool_calls: vec![ask()],
                    usage: None,
                    attachments: vec![],
                },
                ChatResponse {
                    content: "carried on without asking".into(),
                    tool_calls: vec![],
                    usage: None,
                    attachments: vec![],
                },
            ]),
        };
        let agent = LlmAgent::new(core, Arc::new(provider));
        let result = agent
            .run(AgentTask::new("go"), None, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.output, "carried on without asking");
    }

    #[tokio::test]
    async fn unregistered_tool_call_becomes_error_result_not_a_panic() {
        let core = AgentCore::new("assistant", "sys");
        let provider = ScriptedProvider {
            turns: std::sync::Mutex::new(vec![
                ChatResponse {
                    content: String::new(),
                    tool_calls: vec![ToolCall::new("missing_tool", json!({}))],
                    usage: None,
                    attachments: vec![],
                },
                ChatResponse {
                    content: "ok".into(),
                    tool_calls: vec![],
                    usage: None,
                    attachments: vec![],
                },
            ]),
        };
        let agent = LlmAgent::new(core, Arc::new(provider));
        let result = agent
            .run(AgentTask::new("go"), None, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.output, "ok");
    }
}
