//! Wire-level event types (type + payload), independent of `weft`'s in-process
//! `StreamEvent` enum so this crate never depends on the runtime crate. `weft`
//! bridges its `StreamEvent` into `ProtocolEvent` before handing it to
//! `envelope::to_json` for a remote consumer (a CLI, a websocket client).

use serde::Serialize;
use serde_json::Value;

/// One stream event's wire shape: variant name + payload, mirroring
/// `weft::events::StreamEvent` one-for-one. Every variant carries the
/// emitting agent's name and, for forwarded sub-agent events, the
/// originating sub-agent's name — the envelope uses `agent` to track which
/// run a sequence of events belongs to.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
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
        call: Value,
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
        result: Value,
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
        usage: Value,
    },
}

impl ProtocolEvent {
    /// The emitting agent's own name (never the forwarded sub-agent name).
    pub fn agent(&self) -> &str {
        match self {
            ProtocolEvent::TextDelta { agent, .. }
            | ProtocolEvent::ThinkingDelta { agent, .. }
            | ProtocolEvent::ToolCallStart { agent, .. }
            | ProtocolEvent::ToolCallDelta { agent, .. }
            | ProtocolEvent::ToolCallEnd { agent, .. }
            | ProtocolEvent::ToolResultEvent { agent, .. }
            | ProtocolEvent::AgentStart { agent, .. }
            | ProtocolEvent::AgentEnd { agent, .. }
            | ProtocolEvent::InputReceived { agent, .. }
            | ProtocolEvent::InputRequest { agent, .. }
            | ProtocolEvent::InputResponse { agent, .. }
            | ProtocolEvent::Suspend { agent, .. }
            | ProtocolEvent::Resume { agent, .. }
            | ProtocolEvent::UsageUpdate { agent, .. } => agent,
        }
    }

    pub fn is_agent_start(&self) -> bool {
        matches!(self, ProtocolEvent::AgentStart { .. })
    }

    /// Serializes this event to a JSON object (type + payload only; no envelope).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_value_tags_by_type() {
        let event = ProtocolEvent::TextDelta {
            agent: "writer".into(),
            sub_agent: None,
            text: "hi".into(),
        };
        let value = event.to_value().unwrap();
        assert_eq!(value["type"], "text_delta");
        assert_eq!(value["agent"], "writer");
        assert_eq!(value["text"], "hi");
    }

    #[test]
    fn agent_returns_emitting_agent_not_sub_agent() {
        let event = ProtocolEvent::AgentStart {
            agent: "router".into(),
            sub_agent: Some("researcher".into()),
        };
        assert_eq!(event.agent(), "router");
    }
}
