//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] fans out [`WorkspaceEvent`]s from the generation
//! orchestrator and project services to any number of views. Share it via
//! `Arc<EventBus>`.

use chrono::{DateTime, Utc};
use quill_core::types::{EntityId, PhaseId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// WorkspaceEvent
// ---------------------------------------------------------------------------

/// Something observable changed in the workspace cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkspaceEvent {
    /// A unit entered `generating`; its partial content was cleared.
    GenerationStarted { unit_id: EntityId },

    /// One streamed chunk was appended, in arrival order.
    ChunkAppended {
        unit_id: EntityId,
        chunk: String,
        /// Length in bytes of the accumulated partial content.
        accumulated_len: usize,
    },

    /// The unit reached `completed` with its final content.
    GenerationCompleted { unit_id: EntityId, content: String },

    /// The backend reported an error; the unit is `failed`.
    GenerationFailed { unit_id: EntityId, message: String },

    /// The caller cancelled. Status is left as last observed.
    GenerationCancelled { unit_id: EntityId },

    /// The stream ended without a terminal event.
    GenerationInterrupted { unit_id: EntityId },

    /// Generation refused because dependencies are unmet.
    GenerationBlocked {
        unit_id: EntityId,
        /// Display names of the blocking units.
        blockers: Vec<String>,
    },

    /// The project's units were re-fetched from the backend.
    UnitsReconciled { project_id: EntityId, count: usize },

    /// Project metadata changed (phase order, autonomy, status).
    ProjectUpdated {
        project_id: EntityId,
        current_phase: PhaseId,
    },

    /// A block subtree was detached locally and is pending deletion.
    BlockDeleted { block_id: EntityId },

    /// A pending deletion was undone.
    BlockRestored { block_id: EntityId },

    /// The undo window lapsed and the backend delete was issued.
    BlockDeletionCommitted { block_id: EntityId },
}

impl WorkspaceEvent {
    /// Unit or block the event concerns, if any.
    pub fn unit_id(&self) -> Option<&str> {
        match self {
            Self::GenerationStarted { unit_id }
            | Self::ChunkAppended { unit_id, .. }
            | Self::GenerationCompleted { unit_id, .. }
            | Self::GenerationFailed { unit_id, .. }
            | Self::GenerationCancelled { unit_id }
            | Self::GenerationInterrupted { unit_id }
            | Self::GenerationBlocked { unit_id, .. } => Some(unit_id.as_str()),
            Self::BlockDeleted { block_id }
            | Self::BlockRestored { block_id }
            | Self::BlockDeletionCommitted { block_id } => Some(block_id.as_str()),
            Self::UnitsReconciled { .. } | Self::ProjectUpdated { .. } => None,
        }
    }
}

/// An event plus the time it was published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub event: WorkspaceEvent,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
///
/// Chunk events are frequent, so this is sized for a few long generations
/// running side by side.
const DEFAULT_CAPACITY: usize = 4096;

/// In-process fan-out event bus.
///
/// ```rust
/// use quill_events::bus::{EventBus, WorkspaceEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(WorkspaceEvent::GenerationStarted { unit_id: "f1".into() });
/// ```
pub struct EventBus {
    sender: broadcast::Sender<Envelope>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed messages are dropped
    /// and slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers. Dropped silently when
    /// nobody is listening.
    pub fn publish(&self, event: WorkspaceEvent) {
        tracing::trace!(event = ?event, "Publishing workspace event");
        // SendError only means there are zero receivers.
        let _ = self.sender.send(Envelope {
            event,
            timestamp: Utc::now(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_in_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        for chunk in ["a", "b", "c"] {
            bus.publish(WorkspaceEvent::ChunkAppended {
                unit_id: "f1".into(),
                chunk: chunk.into(),
                accumulated_len: 0,
            });
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            match rx.recv().await.expect("should receive").event {
                WorkspaceEvent::ChunkAppended { chunk, .. } => seen.push(chunk),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(seen, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(WorkspaceEvent::GenerationCancelled {
            unit_id: "f1".into(),
        });

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");
        assert_eq!(e1.event, e2.event);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(WorkspaceEvent::BlockDeleted {
            block_id: "b1".into(),
        });
    }

    #[test]
    fn envelope_serializes_with_type_tag() {
        let envelope = Envelope {
            event: WorkspaceEvent::GenerationFailed {
                unit_id: "f1".into(),
                message: "boom".into(),
            },
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "generation_failed");
        assert_eq!(json["unit_id"], "f1");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn unit_id_accessor() {
        let event = WorkspaceEvent::UnitsReconciled {
            project_id: "p1".into(),
            count: 3,
        };
        assert_eq!(event.unit_id(), None);
        let event = WorkspaceEvent::BlockRestored {
            block_id: "b1".into(),
        };
        assert_eq!(event.unit_id(), Some("b1"));
    }
}
