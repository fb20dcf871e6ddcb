mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use quill_client::{BlockService, ClientError, SharedWorkspace};
use quill_core::error::CoreError;
use quill_core::unit::ContentUnit;
use quill_events::WorkspaceEvent;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;

/// `root` with children `a` then `b`.
fn tree() -> Vec<ContentUnit> {
    let root = block("root", "Chapter");
    let mut a = block("a", "Scene A").with_parent("root");
    a.depth = 1;
    let mut b = block("b", "Scene B").with_parent("root");
    b.depth = 1;
    b.order_index = 1;
    vec![root, a, b]
}

fn service(server: &MockServer) -> (Arc<BlockService>, SharedWorkspace) {
    let ws = workspace(vec![], tree());
    let window = test_config(server).undo_window;
    let service = BlockService::new(api(server), ws.clone(), bus(), window);
    (Arc::new(service), ws)
}

async fn children(ws: &SharedWorkspace, id: &str) -> Vec<String> {
    ws.read().await.blocks().children(id).to_vec()
}

// ---------------------------------------------------------------------------
// Test: moves
// ---------------------------------------------------------------------------

#[tokio::test]
async fn move_posts_new_position_and_updates_tree() {
    let server = MockServer::start().await;
    let (service, ws) = service(&server);

    let moved = block("b", "Scene B").with_parent("a");
    Mock::given(method("POST"))
        .and(path("/api/blocks/b/move"))
        .and(body_json(json!({ "new_parent_id": "a", "new_order_index": 0 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(unit_json(&moved)))
        .expect(1)
        .mount(&server)
        .await;

    let unit = service.move_block("b", Some("a"), 0).await.unwrap();
    assert_eq!(unit.parent_id.as_deref(), Some("a"));
    assert_eq!(unit.depth, 2);
    assert_eq!(children(&ws, "root").await, vec!["a"]);
    assert_eq!(children(&ws, "a").await, vec!["b"]);
}

#[tokio::test]
async fn move_into_own_subtree_never_reaches_backend() {
    let server = MockServer::start().await;
    let (service, ws) = service(&server);

    let err = service.move_block("root", Some("a"), 0).await.unwrap_err();
    assert_matches!(err, ClientError::Core(CoreError::Validation(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(children(&ws, "root").await, vec!["a", "b"]);
}

// ---------------------------------------------------------------------------
// Test: delete with undo
// ---------------------------------------------------------------------------

#[tokio::test]
async fn undo_within_window_skips_backend_delete() {
    let server = MockServer::start().await;
    let (service, ws) = service(&server);
    Mock::given(method("DELETE"))
        .and(path("/api/blocks/a"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    service.delete_with_undo("a").await.unwrap();
    assert!(ws.read().await.unit("a").is_none());
    assert_eq!(service.pending_deletions(), vec!["a".to_string()]);

    assert!(service.undo("a").await.unwrap());
    assert!(!service.undo("a").await.unwrap());
    assert_eq!(children(&ws, "root").await, vec!["a", "b"]);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(service.pending_deletions().is_empty());
}

#[tokio::test]
async fn delete_commits_after_window() {
    let server = MockServer::start().await;
    let ws = workspace(vec![], tree());
    let bus = bus();
    let mut rx = bus.subscribe();
    let window = test_config(&server).undo_window;
    let service = Arc::new(BlockService::new(api(&server), ws.clone(), bus, window));

    Mock::given(method("DELETE"))
        .and(path("/api/blocks/b"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    service.delete_with_undo("b").await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(service.pending_deletions().is_empty());
    assert!(!service.undo("b").await.unwrap());
    assert_eq!(children(&ws, "root").await, vec!["a"]);

    let mut events = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        events.push(envelope.event);
    }
    assert_eq!(
        events,
        vec![
            WorkspaceEvent::BlockDeleted { block_id: "b".into() },
            WorkspaceEvent::BlockDeletionCommitted { block_id: "b".into() },
        ]
    );
}

#[tokio::test]
async fn failed_delete_restores_block() {
    let server = MockServer::start().await;
    let (service, ws) = service(&server);
    Mock::given(method("DELETE"))
        .and(path("/api/blocks/a"))
        .respond_with(detail(500, "database unavailable"))
        .expect(1)
        .mount(&server)
        .await;

    service.delete_with_undo("a").await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(ws.read().await.unit("a").is_some());
    assert_eq!(children(&ws, "root").await, vec!["a", "b"]);
}

#[tokio::test]
async fn already_deleted_block_counts_as_committed() {
    let server = MockServer::start().await;
    let (service, ws) = service(&server);
    Mock::given(method("DELETE"))
        .and(path("/api/blocks/b"))
        .respond_with(detail(404, "Block not found"))
        .expect(1)
        .mount(&server)
        .await;

    service.delete_with_undo("b").await.unwrap();
    service.flush().await.unwrap();

    assert!(service.pending_deletions().is_empty());
    assert!(ws.read().await.unit("b").is_none());
}

#[tokio::test]
async fn deleting_parent_removes_subtree() {
    let server = MockServer::start().await;
    let (service, ws) = service(&server);
    Mock::given(method("DELETE"))
        .and(path("/api/blocks/root"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    service.delete_with_undo("root").await.unwrap();
    {
        let guard = ws.read().await;
        assert!(guard.blocks().is_empty());
    }

    service.flush().await.unwrap();
    // The timer fires later and finds nothing left to commit.
    tokio::time::sleep(Duration::from_millis(400)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn flush_waits_for_commit_already_in_progress() {
    let server = MockServer::start().await;
    let ws = workspace(vec![], tree());
    let bus = bus();
    let mut rx = bus.subscribe();
    let window = test_config(&server).undo_window;
    let service = Arc::new(BlockService::new(api(&server), ws.clone(), bus, window));

    Mock::given(method("DELETE"))
        .and(path("/api/blocks/b"))
        .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&server)
        .await;

    service.delete_with_undo("b").await.unwrap();
    // Let the timer take the deletion and start its DELETE.
    tokio::time::sleep(window + Duration::from_millis(50)).await;
    assert!(service.pending_deletions().is_empty());

    service.flush().await.unwrap();

    let mut events = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        events.push(envelope.event);
    }
    assert_eq!(
        events.last(),
        Some(&WorkspaceEvent::BlockDeletionCommitted { block_id: "b".into() })
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}
