//! Core data model: threads, messages, tool calls, attachments, facts, and
//! scheduled actions, each deriving `Serialize`/`Deserialize` since all of
//! them can cross a store or provider boundary.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

fn now_unix_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Message role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// An attachment on a message: either inline bytes or a URL, never both.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Attachment {
    pub mime_type: String,
    #[serde(flatten)]
    pub source: AttachmentSource,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttachmentSource {
    Inline { base64: String },
    Url { url: String },
}

/// A model-emitted intent to invoke a named operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Opaque JSON arguments, preserved verbatim — the engine never assumes a shape.
    pub arguments: Value,
    /// Provider-specific metadata (e.g. signed reasoning tokens) echoed back unchanged
    /// on the next turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_metadata: Option<Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            arguments,
            provider_metadata: None,
        }
    }
}

/// {name, description, JSON-schema parameters} — consumed only to instruct the LLM.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Error-as-data result of executing a tool call.
/// A non-empty `error` means the tool failed but the loop continues.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl ToolResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            error: None,
            attachments: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            content: String::new(),
            error: Some(message),
            attachments: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// One message in a thread.
///
/// Invariant: a `Role::Tool` message carries `tool_result_id` pointing at a
/// prior `Role::Assistant` tool call id from the same thread.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result_id: Option<String>,
    pub created_at: i64,
}

impl Message {
    fn new(thread_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            role,
            content: content.into(),
            embedding: None,
            attachments: Vec::new(),
            tool_calls: Vec::new(),
            tool_result_id: None,
            created_at: now_unix_secs(),
        }
    }

    pub fn system(thread_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(thread_id, Role::System, content)
    }

    pub fn user(thread_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(thread_id, Role::User, content)
    }

    pub fn assistant(thread_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(thread_id, Role::Assistant, content)
    }

    pub fn assistant_with_tool_calls(thread_id: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut m = Self::new(thread_id, Role::Assistant, String::new());
        m.tool_calls = tool_calls;
        m
    }

    pub fn tool_result(
        thread_id: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut m = Self::new(thread_id, Role::Tool, content);
        m.tool_result_id = Some(tool_call_id.into());
        m
    }
}

/// A conversation container keyed by (chat_id, id).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub chat_id: String,
    pub title: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Thread {
    pub fn new(chat_id: impl Into<String>) -> Self {
        let now = now_unix_secs();
        Self {
            id: Uuid::new_v4().to_string(),
            chat_id: chat_id.into(),
            title: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Generation parameters for one `ChatRequest`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

/// Request to a `Provider`. `messages[0]` with
/// `role = system` carries the system prompt implicitly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
    #[serde(default)]
    pub params: GenerationParams,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// Accumulated token usage.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cached_tokens: u32,
}

impl std::ops::Add for Usage {
    type Output = Usage;
    fn add(self, rhs: Usage) -> Usage {
        Usage {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
            cached_tokens: self.cached_tokens + rhs.cached_tokens,
        }
    }
}

/// Response from a `Provider`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// User-memory record. Invariant: `confidence` in `[0, 1]`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Fact {
    pub id: String,
    pub text: String,
    pub category: String,
    pub confidence: f32,
    pub embedding: Vec<f32>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Fact {
    pub fn new(text: impl Into<String>, category: impl Into<String>, embedding: Vec<f32>) -> Self {
        let now = now_unix_secs();
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            category: category.into(),
            confidence: 1.0,
            embedding,
            created_at: now,
            updated_at: now,
        }
    }
}

/// {id, description, cron-like schedule, serialized tool calls, ...} consumed
/// by an external scheduler loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduledAction {
    pub id: String,
    pub description: String,
    pub schedule: String,
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesis_prompt: Option<String>,
    pub next_run_unix: i64,
    pub enabled: bool,
}

/// Input to one agent invocation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AgentTask {
    pub input: String,
    #[serde(default)]
    pub context: std::collections::HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl AgentTask {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            context: std::collections::HashMap::new(),
            attachments: Vec::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.context.get("thread_id").and_then(|v| v.as_str())
    }
}

/// Output of one agent invocation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AgentResult {
    pub output: String,
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_error_marks_is_error() {
        let r = ToolResult::error("boom");
        assert!(r.is_error());
        assert_eq!(r.content, "");
    }

    #[test]
    fn tool_result_ok_is_not_error() {
        let r = ToolResult::ok("done");
        assert!(!r.is_error());
    }

    #[test]
    fn message_tool_result_links_tool_call_id() {
        let m = Message::tool_result("t1", "call-1", "20°C");
        assert_eq!(m.role, Role::Tool);
        assert_eq!(m.tool_result_id.as_deref(), Some("call-1"));
    }

    #[test]
    fn usage_add_accumulates_all_fields() {
        let a = Usage {
            input_tokens: 10,
            output_tokens: 5,
            cached_tokens: 1,
        };
        let b = Usage {
            input_tokens: 3,
            output_tokens: 2,
            cached_tokens: 0,
        };
        let total = a + b;
        assert_eq!(total.input_tokens, 13);
        assert_eq!(total.output_tokens, 7);
        assert_eq!(total.cached_tokens, 1);
    }

    #[test]
    fn agent_task_with_context_round_trips_thread_id() {
        let task = AgentTask::new("hi").with_context("thread_id", "t-42");
        assert_eq!(task.thread_id(), Some("t-42"));
    }
}
