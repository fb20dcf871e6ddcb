#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use quill_client::{ApiClient, ClientConfig, SharedWorkspace};
use quill_core::phase::PhaseLayout;
use quill_core::project::Project;
use quill_core::unit::{ContentUnit, UnitKind};
use quill_core::workspace::Workspace;
use quill_events::EventBus;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use wiremock::{MockServer, ResponseTemplate};

pub const PROJECT_ID: &str = "p1";

/// Config pointing at the mock server, with a short undo window.
pub fn test_config(server: &MockServer) -> ClientConfig {
    let mut config = ClientConfig::default().with_backend_url(server.uri());
    config.request_timeout = Duration::from_secs(5);
    config.undo_window = Duration::from_millis(200);
    config
}

pub fn api(server: &MockServer) -> ApiClient {
    ApiClient::new(&test_config(server)).expect("client builds")
}

pub fn bus() -> Arc<EventBus> {
    Arc::new(EventBus::default())
}

pub fn project() -> Project {
    Project::new(PROJECT_ID, "Launch brief", PhaseLayout::default().default_order())
}

/// Workspace with the test project loaded plus the given fields and blocks.
pub fn workspace(fields: Vec<ContentUnit>, blocks: Vec<ContentUnit>) -> SharedWorkspace {
    let mut ws = Workspace::new();
    ws.set_project(project());
    ws.replace_units(UnitKind::Field, fields);
    ws.replace_units(UnitKind::Block, blocks);
    Arc::new(RwLock::new(ws))
}

pub fn field(id: &str, name: &str) -> ContentUnit {
    ContentUnit::new(id, PROJECT_ID, "intent", name)
}

pub fn block(id: &str, name: &str) -> ContentUnit {
    ContentUnit::new(id, PROJECT_ID, "produce_inner", name).with_kind(UnitKind::Block)
}

/// JSON record of a unit as the backend returns it.
pub fn unit_json(unit: &ContentUnit) -> Value {
    serde_json::to_value(unit).expect("unit serializes")
}

pub fn project_json(project: &Project) -> Value {
    serde_json::to_value(project).expect("project serializes")
}

/// SSE body with one `data:` line per payload.
pub fn sse_body(payloads: &[Value]) -> String {
    payloads
        .iter()
        .map(|p| format!("data: {p}\n\n"))
        .collect()
}

pub fn sse_response(payloads: &[Value]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(sse_body(payloads), "text/event-stream")
}

pub fn detail(status: u16, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({ "detail": message }))
}
