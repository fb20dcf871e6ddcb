//! Schemas for the JSON carried on SSE `data:` lines.
//!
//! Each decoded value is validated against an explicit struct before the
//! orchestrator or chat service branches on it. Values that do not fit are
//! logged and dropped.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// Payload of `POST /api/fields/{id}/generate/stream`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GenerationPayload {
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
    /// Final content, sent alongside `done`.
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    Chunk(String),
    Done { content: Option<String> },
    Error(String),
}

impl GenerationPayload {
    /// Events carried by this payload, chunk first. A payload with none of
    /// the recognised members yields nothing.
    pub fn into_events(self) -> Vec<GenerationEvent> {
        let mut events = Vec::with_capacity(2);
        if let Some(chunk) = self.chunk.filter(|c| !c.is_empty()) {
            events.push(GenerationEvent::Chunk(chunk));
        }
        if let Some(error) = self.error {
            events.push(GenerationEvent::Error(error));
        } else if self.done {
            events.push(GenerationEvent::Done {
                content: self.content,
            });
        }
        events
    }
}

/// Payload of `POST /api/agent/stream`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AgentPayload {
    /// Graph node that produced this update, e.g. `"intent"` or `"research"`.
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentStreamEvent {
    Node { node: String, content: String },
    Done { content: Option<String> },
    Error(String),
}

impl AgentPayload {
    pub fn into_event(self) -> Option<AgentStreamEvent> {
        if let Some(error) = self.error {
            return Some(AgentStreamEvent::Error(error));
        }
        if self.done {
            return Some(AgentStreamEvent::Done {
                content: self.content,
            });
        }
        match (self.node, self.content) {
            (Some(node), content) => Some(AgentStreamEvent::Node {
                node,
                content: content.unwrap_or_default(),
            }),
            (None, _) => None,
        }
    }
}

/// Validate a decoded SSE value against `T`, logging and discarding misfits.
pub fn validate<T: DeserializeOwned>(value: Value) -> Option<T> {
    match serde_json::from_value::<T>(value) {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::debug!(
                error = %e,
                schema = std::any::type_name::<T>(),
                "Dropping SSE payload that does not match schema",
            );
            None
        }
    }
}
