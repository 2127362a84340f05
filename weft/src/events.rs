//! Typed event stream protocol.
//!
//! Builds on the `weft-stream-event` crate's type+payload/envelope split and
//! a channel-based emission style: every agent invocation emits exactly one
//! `AgentStart` on entry and exactly one `AgentEnd` on exit, over a bounded
//! `tokio::sync::mpsc` channel with a default capacity of 64.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::types::{ToolCall, ToolResult, Usage};

/// Default event channel buffer size.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Discriminated event union streamed by every agent.
/// Each variant carries the emitting agent's name and, for forwarded
/// sub-agent events, the originating sub-agent's name.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    TextDelta {
        agent: String,
        sub_agent: Option<String>,
        text: String,
    },
    ThinkingDelta {
        agent: String,
        sub_agent: Option<String>,
        text: String,
    },
    ToolCallStart {
        agent: String,
        sub_agent: Option<String>,
        call: ToolCall,
    },
    ToolCallDelta {
        agent: String,
        sub_agent: Option<String>,
        id: String,
        arguments_delta: String,
    },
    ToolCallEnd {
        agent: String,
        sub_agent: Option<String>,
        id: String,
    },
    ToolResultEvent {
        agent: String,
        sub_agent: Option<String>,
        id: String,
        result: ToolResult,
    },
    AgentStart {
        agent: String,
        sub_agent: Option<String>,
    },
    AgentEnd {
        agent: String,
        sub_agent: Option<String>,
    },
    InputReceived {
        agent: String,
        sub_agent: Option<String>,
        input: String,
    },
    InputRequest {
        agent: String,
        sub_agent: Option<String>,
        question: String,
    },
    InputResponse {
        agent: String,
        sub_agent: Option<String>,
        text: String,
    },
    Suspend {
        agent: String,
        sub_agent: Option<String>,
    },
    Resume {
        agent: String,
        sub_agent: Option<String>,
    },
    UsageUpdate {
        agent: String,
        sub_agent: Option<String>,
        usage: Usage,
    },
}

impl StreamEvent {
    /// The emitting agent's own name (never the forwarded sub-agent name).
    pub fn agent(&self) -> &str {
        match self {
            StreamEvent::TextDelta { agent, .. }
            | StreamEvent::ThinkingDelta { agent, .. }
            | StreamEvent::ToolCallStart { agent, .. }
            | StreamEvent::ToolCallDelta { agent, .. }
            | StreamEvent::ToolCallEnd { agent, .. }
            | StreamEvent::ToolResultEvent { agent, .. }
            | StreamEvent::AgentStart { agent, .. }
            | StreamEvent::AgentEnd { agent, .. }
            | StreamEvent::InputReceived { agent, .. }
            | StreamEvent::InputRequest { agent, .. }
            | StreamEvent::InputResponse { agent, .. }
            | StreamEvent::Suspend { agent, .. }
            | StreamEvent::Resume { agent, .. }
            | StreamEvent::UsageUpdate { agent, .. } => agent,
        }
    }

    pub fn is_input_received(&self) -> bool {
        matches!(self, StreamEvent::InputReceived { .. })
    }

    pub fn is_agent_start(&self) -> bool {
        matches!(self, StreamEvent::AgentStart { .. })
    }

    pub fn is_agent_end(&self) -> bool {
        matches!(self, StreamEvent::AgentEnd { .. })
    }

    /// Bridges this in-process event into the wire protocol's `ProtocolEvent`
    /// (see `weft-stream-event`), for a remote consumer such as a CLI or
    /// websocket client. This crate never serializes `StreamEvent` directly
    /// onto the wire; the bridge keeps the protocol shape independent of the
    /// runtime's internal enum.
    pub fn to_protocol_event(&self) -> weft_stream_event::ProtocolEvent {
        use weft_stream_event::ProtocolEvent as P;
        match self {
            StreamEvent::TextDelta { agent, sub_agent, text } => P::TextDelta {
                agent: agent.clone(),
                sub_agent: sub_agent.clone(),
                text: text.clone(),
            },
            StreamEvent::ThinkingDelta { agent, sub_agent, text } => P::ThinkingDelta {
                agent: agent.clone(),
                sub_agent: sub_agent.clone(),
                text: text.clone(),
            },
            StreamEvent::ToolCallStart { agent, sub_agent, call } => P::ToolCallStart {
                agent: agent.clone(),
                sub_agent: sub_agent.clone(),
                call: serde_json::to_value(call).unwrap_or(serde_json::Value::Null),
            },
            StreamEvent::ToolCallDelta {
                agent,
                sub_agent,
                id,
                arguments_delta,
            } => P::ToolCallDelta {
                agent: agent.clone(),
                sub_agent: sub_agent.clone(),
                id: id.clone(),
                arguments_delta: arguments_delta.clone(),
            },
            StreamEvent::ToolCallEnd { agent, sub_agent, id } => P::ToolCallEnd {
                agent: agent.clone(),
                sub_agent: sub_agent.clone(),
                id: id.clone(),
            },
            StreamEvent::ToolResultEvent {
                agent,
                sub_agent,
                id,
                result,
            } => P::ToolResultEvent {
                agent: agent.clone(),
                sub_agent: sub_agent.clone(),
                id: id.clone(),
                result: serde_json::to_value(result).unwrap_or(serde_json::Value::Null),
            },
            StreamEvent::AgentStart { agent, sub_agent } => P::AgentStart {
                agent: agent.clone(),
                sub_agent: sub_agent.clone(),
            },
            StreamEvent::AgentEnd { agent, sub_agent } => P::AgentEnd {
                agent: agent.clone(),
                sub_agent: sub_agent.clone(),
            },
            StreamEvent::InputReceived { agent, sub_agent, input } => P::InputReceived {
                agent: agent.clone(),
                sub_agent: sub_agent.clone(),
                input: input.clone(),
            },
            StreamEvent::InputRequest {
                agent,
                sub_agent,
                question,
            } => P::InputRequest {
                agent: agent.clone(),
                sub_agent: sub_agent.clone(),
                question: question.clone(),
            },
            StreamEvent::InputResponse { agent, sub_agent, text } => P::InputResponse {
                agent: agent.clone(),
                sub_agent: sub_agent.clone(),
                text: text.clone(),
            },
            StreamEvent::Suspend { agent, sub_agent } => P::Suspend {
                agent: agent.clone(),
                sub_agent: sub_agent.clone(),
            },
            StreamEvent::Resume { agent, sub_agent } => P::Resume {
                agent: agent.clone(),
                sub_agent: sub_agent.clone(),
            },
            StreamEvent::UsageUpdate { agent, sub_agent, usage } => P::UsageUpdate {
                agent: agent.clone(),
                sub_agent: sub_agent.clone(),
                usage: serde_json::to_value(usage).unwrap_or(serde_json::Value::Null),
            },
        }
    }

    /// Re-tags this event as arriving from `sub_agent`, for forwarding across
    /// the Network/router boundary.
    pub fn with_sub_agent(mut self, sub_agent: impl Into<String>) -> Self {
        let sub = Some(sub_agent.into());
        match &mut self {
            StreamEvent::TextDelta { sub_agent, .. }
            | StreamEvent::ThinkingDelta { sub_agent, .. }
            | StreamEvent::ToolCallStart { sub_agent, .. }
            | StreamEvent::ToolCallDelta { sub_agent, .. }
            | StreamEvent::ToolCallEnd { sub_agent, .. }
            | StreamEvent::ToolResultEvent { sub_agent, .. }
            | StreamEvent::AgentStart { sub_agent, .. }
            | StreamEvent::AgentEnd { sub_agent, .. }
            | StreamEvent::InputReceived { sub_agent, .. }
            | StreamEvent::InputRequest { sub_agent, .. }
            | StreamEvent::InputResponse { sub_agent, .. }
            | StreamEvent::Suspend { sub_agent, .. }
            | StreamEvent::Resume { sub_agent, .. }
            | StreamEvent::UsageUpdate { sub_agent, .. } => *sub_agent = sub,
        }
        self
    }
}

/// The consumer-supplied sink every streaming agent writes into.
pub type EventSink = mpsc::Sender<StreamEvent>;
pub type EventSource = mpsc::Receiver<StreamEvent>;

pub fn channel(capacity: usize) -> (EventSink, EventSource) {
    mpsc::channel(capacity)
}

/// Sends one event honouring cancellation. Returns `false` if the context cancelled before the send
/// completed, in which case the caller must stop emitting and fall through to
/// its cleanup path.
pub async fn send_checked(sink: &EventSink, cancel: &CancellationToken, event: StreamEvent) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        result = sink.send(event) => result.is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_checked_delivers_when_not_cancelled() {
        let (tx, mut rx) = channel(4);
        let cancel = CancellationToken::new();
        let sent = send_checked(
            &tx,
            &cancel,
            StreamEvent::AgentStart {
                agent: "a".into(),
                sub_agent: None,
            },
        )
        .await;
        assert!(sent);
        let event = rx.recv().await.unwrap();
        assert!(event.is_agent_start());
    }

    #[tokio::test]
    async fn send_checked_returns_false_once_cancelled() {
        let (tx, _rx) = channel(4);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let sent = send_checked(
            &tx,
            &cancel,
            StreamEvent::AgentEnd {
                agent: "a".into(),
                sub_agent: None,
            },
        )
        .await;
        assert!(!sent);
    }

    #[test]
    fn to_protocol_event_preserves_type_and_fields() {
        let event = StreamEvent::TextDelta {
            agent: "writer".into(),
            sub_agent: None,
            text: "hi".into(),
        };
        let protocol = event.to_protocol_event();
        assert_eq!(protocol.agent(), "writer");
        assert!(!protocol.is_agent_start());
        let value = protocol.to_value().unwrap();
        assert_eq!(value["type"], "text_delta");
        assert_eq!(value["text"], "hi");
    }

    #[test]
    fn with_sub_agent_tags_forwarded_event() {
        let event = StreamEvent::TextDelta {
            agent: "network".into(),
            sub_agent: None,
            text: "hi".into(),
        }
        .with_sub_agent("chat");
        assert_eq!(event.agent(), "network");
        match event {
            StreamEvent::TextDelta { sub_agent, .. } => {
                assert_eq!(sub_agent.as_deref(), Some("chat"));
            }
            _ => panic!("wrong variant"),
        }
    }
}
