//! Network side of the Quill client.
//!
//! - [`ApiClient`]: typed REST access to the backend.
//! - [`sse`]: decoding of `data: <json>` event streams.
//! - [`Orchestrator`]: drives unit generation and keeps the
//!   [`Workspace`](quill_core::workspace::Workspace) cache in step.
//! - [`ChatService`], [`ProjectService`], [`BlockService`]: the remaining
//!   user actions.

pub mod api;
pub mod blocks;
pub mod chat;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod payload;
pub mod projects;
pub mod sse;

use std::sync::Arc;

use quill_core::workspace::Workspace;
use tokio::sync::RwLock;

pub use api::ApiClient;
pub use blocks::BlockService;
pub use chat::ChatService;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use orchestrator::{GenerationOutcome, Orchestrator, PhaseRun};
pub use projects::ProjectService;

/// Workspace cache shared between services. Never held across a network
/// await.
pub type SharedWorkspace = Arc<RwLock<Workspace>>;
