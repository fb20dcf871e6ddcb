//! REST client for the Quill backend.
//!
//! Wraps the project, field, block and agent endpoints with [`reqwest`].
//! Plain calls carry the configured request timeout; streaming calls do not,
//! since a generation may legitimately run for minutes.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::stream::{BoxStream, StreamExt};
use quill_core::project::{Project, ProjectUpdate};
use quill_core::status::PhaseStatus;
use quill_core::tree::MoveBlock;
use quill_core::types::{EntityId, PhaseId};
use quill_core::unit::{ContentUnit, NewBlock, UnitKind, UnitUpdate};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{api_error_message, ClientError, ClientResult};
use crate::sse::decode_sse;

/// JSON values decoded from an SSE response body.
pub type SseStream = BoxStream<'static, ClientResult<Value>>;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Body for `POST /api/agent/chat` and `POST /api/agent/stream`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub project_id: EntityId,
    pub message: String,
    pub current_phase: PhaseId,
    /// Names referenced with `@name` in the message, deduplicated.
    pub references: Vec<String>,
}

/// Response of `POST /api/agent/chat`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub message_id: Option<EntityId>,
    pub message: String,
    pub phase: PhaseId,
    #[serde(default)]
    pub phase_status: BTreeMap<PhaseId, PhaseStatus>,
    #[serde(default)]
    pub waiting_for_human: bool,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    pre_answers: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct VersionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    version_note: Option<&'a str>,
}

/// A block as listed by the backend, possibly with nested children.
#[derive(Deserialize)]
struct BlockRecord {
    #[serde(flatten)]
    unit: ContentUnit,
    #[serde(default)]
    children: Vec<BlockRecord>,
}

fn flatten_blocks(records: Vec<BlockRecord>, out: &mut Vec<ContentUnit>) {
    for record in records {
        let mut unit = record.unit;
        unit.kind = UnitKind::Block;
        let id = unit.id.clone();
        out.push(unit);
        let mut children = record.children;
        for child in &mut children {
            if child.unit.parent_id.is_none() {
                child.unit.parent_id = Some(id.clone());
            }
        }
        flatten_blocks(children, out);
    }
}

fn as_kind(mut unit: ContentUnit, kind: UnitKind) -> ContentUnit {
    unit.kind = kind;
    unit
}

// ---------------------------------------------------------------------------
// ApiClient
// ---------------------------------------------------------------------------

/// HTTP client for a single Quill backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self::with_client(client, config))
    }

    /// Reuse an existing [`reqwest::Client`] (shared connection pool).
    pub fn with_client(client: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            client,
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ---- projects ----

    pub async fn list_projects(&self) -> ClientResult<Vec<Project>> {
        self.get_json("/api/projects/").await
    }

    pub async fn get_project(&self, id: &str) -> ClientResult<Project> {
        self.get_json(&format!("/api/projects/{id}")).await
    }

    pub async fn update_project(&self, id: &str, update: &ProjectUpdate) -> ClientResult<Project> {
        let request = self.client.put(self.url(&format!("/api/projects/{id}"))).json(update);
        self.send_json(request).await
    }

    pub async fn delete_project(&self, id: &str) -> ClientResult<()> {
        let request = self.client.delete(self.url(&format!("/api/projects/{id}")));
        self.send_empty(request).await
    }

    /// Snapshot the project as a new version. Returns the new project record.
    pub async fn create_version(&self, id: &str, version_note: Option<&str>) -> ClientResult<Project> {
        let request = self
            .client
            .post(self.url(&format!("/api/projects/{id}/versions")))
            .json(&VersionRequest { version_note });
        self.send_json(request).await
    }

    // ---- fields ----

    /// Fields of a project, optionally restricted to one phase.
    pub async fn list_fields(&self, project_id: &str, phase: Option<&str>) -> ClientResult<Vec<ContentUnit>> {
        let mut request = self
            .client
            .get(self.url(&format!("/api/fields/project/{project_id}")));
        if let Some(phase) = phase {
            request = request.query(&[("phase", phase)]);
        }
        let fields: Vec<ContentUnit> = self.send_json(request).await?;
        Ok(fields
            .into_iter()
            .map(|f| as_kind(f, UnitKind::Field))
            .collect())
    }

    pub async fn get_field(&self, id: &str) -> ClientResult<ContentUnit> {
        let field = self.get_json(&format!("/api/fields/{id}")).await?;
        Ok(as_kind(field, UnitKind::Field))
    }

    pub async fn update_field(&self, id: &str, update: &UnitUpdate) -> ClientResult<ContentUnit> {
        let request = self.client.put(self.url(&format!("/api/fields/{id}"))).json(update);
        let field = self.send_json(request).await?;
        Ok(as_kind(field, UnitKind::Field))
    }

    pub async fn delete_field(&self, id: &str) -> ClientResult<()> {
        let request = self.client.delete(self.url(&format!("/api/fields/{id}")));
        self.send_empty(request).await
    }

    /// Non-streaming generation. Returns the updated field.
    pub async fn generate_field(
        &self,
        id: &str,
        pre_answers: &BTreeMap<String, String>,
    ) -> ClientResult<ContentUnit> {
        let request = self
            .client
            .post(self.url(&format!("/api/fields/{id}/generate")))
            .json(&GenerateRequest { pre_answers });
        let field = self.send_json(request).await?;
        Ok(as_kind(field, UnitKind::Field))
    }

    /// Streaming generation: JSON values from the SSE body, in order.
    pub async fn generate_field_stream(
        &self,
        id: &str,
        pre_answers: &BTreeMap<String, String>,
    ) -> ClientResult<SseStream> {
        let request = self
            .client
            .post(self.url(&format!("/api/fields/{id}/generate/stream")))
            .json(&GenerateRequest { pre_answers });
        self.open_stream(request).await
    }

    // ---- agent ----

    pub async fn chat(&self, body: &ChatRequest) -> ClientResult<ChatResponse> {
        let request = self.client.post(self.url("/api/agent/chat")).json(body);
        self.send_json(request).await
    }

    pub async fn agent_stream(
        &self,
        body: &ChatRequest,
    ) -> ClientResult<SseStream> {
        let request = self.client.post(self.url("/api/agent/stream")).json(body);
        self.open_stream(request).await
    }

    // ---- blocks ----

    /// Every block of a project, flattened in pre-order when the backend
    /// returns a nested tree.
    pub async fn list_blocks(&self, project_id: &str) -> ClientResult<Vec<ContentUnit>> {
        let records: Vec<BlockRecord> = self
            .get_json(&format!("/api/blocks/project/{project_id}"))
            .await?;
        let mut blocks = Vec::new();
        flatten_blocks(records, &mut blocks);
        Ok(blocks)
    }

    pub async fn create_block(&self, block: &NewBlock) -> ClientResult<ContentUnit> {
        let request = self.client.post(self.url("/api/blocks/")).json(block);
        let block = self.send_json(request).await?;
        Ok(as_kind(block, UnitKind::Block))
    }

    pub async fn update_block(&self, id: &str, update: &UnitUpdate) -> ClientResult<ContentUnit> {
        let request = self.client.put(self.url(&format!("/api/blocks/{id}"))).json(update);
        let block = self.send_json(request).await?;
        Ok(as_kind(block, UnitKind::Block))
    }

    pub async fn delete_block(&self, id: &str) -> ClientResult<()> {
        let request = self.client.delete(self.url(&format!("/api/blocks/{id}")));
        self.send_empty(request).await
    }

    pub async fn move_block(&self, mv: &MoveBlock) -> ClientResult<ContentUnit> {
        let request = self
            .client
            .post(self.url(&format!("/api/blocks/{}/move", mv.block_id)))
            .json(mv);
        let block = self.send_json(request).await?;
        Ok(as_kind(block, UnitKind::Block))
    }

    /// Blocking block generation. Returns the block with its final content.
    pub async fn generate_block(&self, id: &str) -> ClientResult<ContentUnit> {
        let request = self
            .client
            .post(self.url(&format!("/api/blocks/{id}/generate")))
            .json(&serde_json::json!({}));
        let block = self.send_json(request).await?;
        Ok(as_kind(block, UnitKind::Block))
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let request = self.client.get(self.url(path));
        self.send_json(request).await
    }

    /// Send with the request timeout and decode a JSON body.
    async fn send_json<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> ClientResult<T> {
        let response = request.timeout(self.request_timeout).send().await?;
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Send with the request timeout, discarding the body.
    async fn send_empty(&self, request: reqwest::RequestBuilder) -> ClientResult<()> {
        let response = request.timeout(self.request_timeout).send().await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    /// Send without a timeout and decode the body as SSE.
    async fn open_stream(
        &self,
        request: reqwest::RequestBuilder,
    ) -> ClientResult<SseStream> {
        let response = request
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        tracing::debug!(url = %response.url(), "SSE stream opened");
        let body = response.bytes_stream().map(|chunk| chunk.map_err(ClientError::from));
        Ok(decode_sse(body).boxed())
    }

    /// Return the response unchanged on 2xx, otherwise a
    /// [`ClientError::Api`] with the backend's `detail` message.
    async fn ensure_success(response: reqwest::Response) -> ClientResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().to_string();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        let message = api_error_message(&body);
        tracing::warn!(status = status.as_u16(), url = %url, message = %message, "Backend request failed");
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }
}
