mod common;

use assert_matches::assert_matches;
use quill_client::{ClientError, ProjectService};
use quill_core::autonomy::PhaseTransition;
use quill_core::error::CoreError;
use quill_core::phase::DragState;
use quill_core::status::{DependencyType, PhaseStatus};
use quill_core::unit::Dependencies;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;

fn order(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Test: load
// ---------------------------------------------------------------------------

#[tokio::test]
async fn load_fetches_project_fields_and_blocks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/api/projects/{PROJECT_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(project_json(&project())))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api/fields/project/{PROJECT_ID}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([unit_json(&field("f1", "Hook"))])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api/blocks/project/{PROJECT_ID}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([unit_json(&block("b1", "Intro"))])),
        )
        .mount(&server)
        .await;

    let ws = std::sync::Arc::new(tokio::sync::RwLock::new(
        quill_core::workspace::Workspace::new(),
    ));
    let service = ProjectService::new(api(&server), ws.clone(), bus());
    let loaded = service.load(PROJECT_ID).await.unwrap();
    assert_eq!(loaded.name, "Launch brief");

    let guard = ws.read().await;
    assert_eq!(guard.project().unwrap().id, PROJECT_ID);
    assert_eq!(guard.fields().len(), 1);
    assert!(guard.unit("b1").is_some());
}

// ---------------------------------------------------------------------------
// Test: phase reordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reorder_persists_full_order() {
    let server = MockServer::start().await;
    let expected = order(&[
        "intent",
        "research",
        "produce_inner",
        "design_inner",
        "design_outer",
        "produce_outer",
        "simulate",
        "evaluate",
    ]);
    let mut saved = project();
    saved.phase_order = expected.clone();
    Mock::given(method("PUT"))
        .and(path(format!("/api/projects/{PROJECT_ID}")))
        .and(body_json(json!({ "phase_order": expected })))
        .respond_with(ResponseTemplate::new(200).set_body_json(project_json(&saved)))
        .expect(1)
        .mount(&server)
        .await;

    let ws = workspace(vec![], vec![]);
    let service = ProjectService::new(api(&server), ws.clone(), bus());
    let result = service
        .reorder_phases(&order(&["produce_inner", "design_inner", "design_outer", "produce_outer"]))
        .await
        .unwrap();

    assert_eq!(result.unwrap().phase_order, expected);
    assert_eq!(ws.read().await.project().unwrap().phase_order, expected);
}

#[tokio::test]
async fn reorder_that_is_not_a_permutation_sends_nothing() {
    let server = MockServer::start().await;
    let service = ProjectService::new(api(&server), workspace(vec![], vec![]), bus());

    let result = service
        .reorder_phases(&order(&["design_inner", "design_inner", "design_outer", "produce_outer"]))
        .await
        .unwrap();
    assert_eq!(result, None);

    let result = service.reorder_phases(&order(&["intent"])).await.unwrap();
    assert_eq!(result, None);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn dropping_onto_fixed_phase_sends_nothing() {
    let server = MockServer::start().await;
    let service = ProjectService::new(api(&server), workspace(vec![], vec![]), bus());

    let mut drag = DragState::default();
    assert!(drag.drag_start(service.layout(), "design_outer"));
    let result = service.drop_phase(&mut drag, "simulate").await.unwrap();
    assert_eq!(result, None);
    assert!(!drag.is_dragging());
    assert!(server.received_requests().await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Test: autonomy and advancement
// ---------------------------------------------------------------------------

#[tokio::test]
async fn advance_into_autonomous_phase_persists() {
    let server = MockServer::start().await;
    let mut saved = project();
    saved.current_phase = "research".into();
    saved.phase_status.insert("intent".into(), PhaseStatus::Completed);
    saved.phase_status.insert("research".into(), PhaseStatus::InProgress);
    Mock::given(method("PUT"))
        .and(path(format!("/api/projects/{PROJECT_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(project_json(&saved)))
        .expect(1)
        .mount(&server)
        .await;

    let ws = workspace(vec![], vec![]);
    let service = ProjectService::new(api(&server), ws.clone(), bus());
    let transition = service.advance().await.unwrap();
    assert_eq!(
        transition,
        PhaseTransition::Advanced {
            from: "intent".into(),
            to: "research".into()
        }
    );
    assert_eq!(ws.read().await.project().unwrap().current_phase, "research");
}

#[tokio::test]
async fn advance_into_supervised_phase_waits_for_confirmation() {
    let server = MockServer::start().await;
    let ws = workspace(vec![], vec![]);
    ws.write()
        .await
        .project_mut()
        .unwrap()
        .agent_autonomy
        .insert("research".into(), false);
    let service = ProjectService::new(api(&server), ws.clone(), bus());

    let transition = service.advance().await.unwrap();
    assert_matches!(transition, PhaseTransition::AwaitingConfirmation { ref to, .. } if to == "research");
    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(ws.read().await.project().unwrap().current_phase, "intent");

    let mut saved = project();
    saved.current_phase = "research".into();
    Mock::given(method("PUT"))
        .and(path(format!("/api/projects/{PROJECT_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(project_json(&saved)))
        .expect(1)
        .mount(&server)
        .await;
    let transition = service.confirm_advance().await.unwrap();
    assert_matches!(transition, PhaseTransition::Advanced { .. });
}

#[tokio::test]
async fn set_all_autonomy_sends_every_phase() {
    let server = MockServer::start().await;
    let phases = project().phase_order;
    let expected: serde_json::Map<String, serde_json::Value> =
        phases.iter().map(|p| (p.clone(), json!(false))).collect();
    Mock::given(method("PUT"))
        .and(path(format!("/api/projects/{PROJECT_ID}")))
        .and(body_json(json!({ "agent_autonomy": expected })))
        .respond_with(ResponseTemplate::new(200).set_body_json(project_json(&project())))
        .expect(1)
        .mount(&server)
        .await;

    let service = ProjectService::new(api(&server), workspace(vec![], vec![]), bus());
    service.set_all_autonomy(false).await.unwrap();
}

// ---------------------------------------------------------------------------
// Test: unit edits
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dependency_cycle_is_rejected_locally() {
    let server = MockServer::start().await;
    let a = field("a", "Outline").with_dependencies(Dependencies::all(["b"]));
    let b = field("b", "Draft");
    let service = ProjectService::new(api(&server), workspace(vec![a, b], vec![]), bus());

    let err = service
        .set_dependencies("b", vec!["a".into()], DependencyType::All)
        .await
        .unwrap_err();
    assert_matches!(err, ClientError::Core(CoreError::Conflict(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn dependencies_are_saved_through_the_field_endpoint() {
    let server = MockServer::start().await;
    let a = field("a", "Outline");
    let b = field("b", "Draft");
    let saved = b.clone().with_dependencies(Dependencies::any(["a"]));
    Mock::given(method("PUT"))
        .and(path("/api/fields/b"))
        .and(body_json(json!({
            "dependencies": { "depends_on": ["a"], "dependency_type": "any" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(unit_json(&saved)))
        .expect(1)
        .mount(&server)
        .await;

    let ws = workspace(vec![a, b], vec![]);
    let service = ProjectService::new(api(&server), ws.clone(), bus());
    service
        .set_dependencies("b", vec!["a".into()], DependencyType::Any)
        .await
        .unwrap();
    assert_eq!(
        ws.read().await.unit("b").unwrap().dependencies,
        Dependencies::any(["a"])
    );
}
