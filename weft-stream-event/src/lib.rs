//! Stream event wire protocol: type + payload + envelope.
//!
//! This crate defines the wire shape of a single stream event and envelope injection.
//! It does not depend on `weft`. `weft::events::StreamEvent::to_protocol_event` bridges
//! the runtime's in-process event enum into `ProtocolEvent` before handing it to `to_json`.

pub mod envelope;
pub mod event;

pub use envelope::{to_json, Envelope, EnvelopeState};
pub use event::ProtocolEvent;
