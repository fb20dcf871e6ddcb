//! Agent chat: messages with `@name` references to generated units.

use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use quill_core::error::CoreError;
use quill_core::references::{dedupe_references, parse_references, resolve_references};
use quill_events::{EventBus, WorkspaceEvent};

use crate::api::{ApiClient, ChatRequest, ChatResponse};
use crate::error::ClientResult;
use crate::payload::{validate, AgentPayload, AgentStreamEvent};
use crate::SharedWorkspace;

pub type AgentEventStream = BoxStream<'static, ClientResult<AgentStreamEvent>>;

pub struct ChatService {
    api: ApiClient,
    workspace: SharedWorkspace,
    bus: Arc<EventBus>,
}

impl ChatService {
    pub fn new(api: ApiClient, workspace: SharedWorkspace, bus: Arc<EventBus>) -> Self {
        Self { api, workspace, bus }
    }

    /// `@name` references in `text` that match no unit in the workspace,
    /// deduplicated in first-occurrence order. The message can still be
    /// sent; the agent just has nothing to look up for these names.
    pub async fn unresolved_references(&self, text: &str) -> Vec<String> {
        let references = dedupe_references(parse_references(text));
        if references.is_empty() {
            return references;
        }
        let known = self.workspace.read().await.snapshot();
        resolve_references(&references, &known).unresolved
    }

    /// Send a message and apply the agent's phase decision to the cached
    /// project. `waiting_for_human` in the reply tells the caller whether
    /// the agent paused for confirmation.
    pub async fn send(&self, text: &str) -> ClientResult<ChatResponse> {
        let request = self.build_request(text).await?;
        let response = self.api.chat(&request).await?;

        let current_phase = {
            let mut ws = self.workspace.write().await;
            let project = ws.project_mut().ok_or_else(no_project)?;
            project.current_phase = response.phase.clone();
            project
                .phase_status
                .extend(response.phase_status.iter().map(|(k, v)| (k.clone(), *v)));
            project.current_phase.clone()
        };
        self.bus.publish(WorkspaceEvent::ProjectUpdated {
            project_id: request.project_id.clone(),
            current_phase,
        });
        tracing::info!(
            project_id = %request.project_id,
            phase = %response.phase,
            waiting_for_human = response.waiting_for_human,
            "Agent replied",
        );
        Ok(response)
    }

    /// Send a message to the streaming agent endpoint. Node updates arrive
    /// as they are produced; payloads that fail the schema are skipped.
    pub async fn stream(&self, text: &str) -> ClientResult<AgentEventStream> {
        let request = self.build_request(text).await?;
        let values = self.api.agent_stream(&request).await?;
        let events = values.filter_map(|item| async move {
            match item {
                Ok(value) => validate::<AgentPayload>(value)
                    .and_then(AgentPayload::into_event)
                    .map(Ok),
                Err(e) => Some(Err(e)),
            }
        });
        Ok(events.boxed())
    }

    async fn build_request(&self, text: &str) -> ClientResult<ChatRequest> {
        let references = dedupe_references(parse_references(text));
        let ws = self.workspace.read().await;
        let project = ws.project().ok_or_else(no_project)?;
        Ok(ChatRequest {
            project_id: project.id.clone(),
            message: text.to_string(),
            current_phase: project.current_phase.clone(),
            references,
        })
    }
}

fn no_project() -> CoreError {
    CoreError::Validation("No project is loaded in the workspace".into())
}
