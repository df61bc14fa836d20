//! HTTP API tests: wire contract, error mapping, and write-through
//! consistency.

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

use taskmill::adapters::http::{build_router, AppState};
use taskmill::adapters::sqlite::SqliteTaskStore;
use taskmill::application::{AgentRegistry, ExecutorPool, TaskQueue, WorkflowMachine};
use taskmill::domain::models::StoreRetryConfig;

use helpers::agents::fast_workflow_config;
use helpers::database::setup_test_db;

async fn test_app() -> (axum::Router, TaskQueue) {
    let pool = setup_test_db().await;
    let queue = TaskQueue::new(Arc::new(SqliteTaskStore::new(pool)));
    let executor_pool = Arc::new(ExecutorPool::new(
        4,
        queue.clone(),
        Arc::new(AgentRegistry::new()),
        Arc::new(WorkflowMachine::five_phase_tdd(&fast_workflow_config())),
        StoreRetryConfig::default(),
    ));
    let router = build_router(AppState { queue: queue.clone(), pool: executor_pool });
    (router, queue)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn submit_body() -> Value {
    json!({
        "kind": "five_phase_tdd",
        "priority": 5,
        "payload": {
            "feature": "login",
            "target_url": "http://localhost:3000"
        }
    })
}

#[tokio::test]
async fn submit_then_get_is_write_through() {
    let (app, _queue) = test_app().await;

    let response = app.clone().oneshot(post_json("/api/tasks", submit_body())).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "QUEUED");
    let id = body["id"].as_str().expect("submit returns an id").to_string();

    // No eventual-consistency window: the task is immediately visible.
    let response = app.oneshot(get(&format!("/api/tasks/{id}"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], id.as_str());
    assert_eq!(body["status"], "QUEUED");
    assert_eq!(body["phase"], "E2E_TEST_GEN");
    assert_eq!(body["attempts"], 0);
    assert_eq!(body["priority"], 5);
}

#[tokio::test]
async fn invalid_payload_is_rejected_with_400() {
    let (app, _queue) = test_app().await;

    // Missing required target_url.
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/tasks",
            json!({"kind": "five_phase_tdd", "payload": {"feature": "login"}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_payload");
    assert!(body["detail"].is_string());

    // Unknown workflow kind.
    let response = app
        .oneshot(post_json(
            "/api/tasks",
            json!({"kind": "six_phase", "payload": {"feature": "x", "target_url": "http://x"}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_task_is_404() {
    let (app, _queue) = test_app().await;

    let response = app
        .clone()
        .oneshot(get("/api/tasks/00000000-0000-0000-0000-000000000000"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "not_found");

    // A malformed id is equally not found.
    let response = app.oneshot(get("/api/tasks/not-a-uuid")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_filters_by_status() {
    let (app, queue) = test_app().await;

    for _ in 0..3 {
        let response =
            app.clone().oneshot(post_json("/api/tasks", submit_body())).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
    queue.claim("api-test").await.unwrap().unwrap();

    let response = app.clone().oneshot(get("/api/tasks?status=QUEUED")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let response = app.clone().oneshot(get("/api/tasks?status=RUNNING")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let response = app.oneshot(get("/api/tasks?status=BOGUS")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cancel_contract() {
    let (app, queue) = test_app().await;

    // Queued task cancels immediately.
    let response = app.clone().oneshot(post_json("/api/tasks", submit_body())).await.unwrap();
    let id = body_json(response).await["id"].as_str().unwrap().to_string();
    let response =
        app.clone().oneshot(post_json(&format!("/api/tasks/{id}/cancel"), json!({}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await["status"], "cancelled");

    // Running task goes into cancelling.
    let response = app.clone().oneshot(post_json("/api/tasks", submit_body())).await.unwrap();
    let id = body_json(response).await["id"].as_str().unwrap().to_string();
    queue.claim("api-test").await.unwrap().unwrap();
    let response =
        app.clone().oneshot(post_json(&format!("/api/tasks/{id}/cancel"), json!({}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await["status"], "cancelling");

    // Cancelling an already-CANCELLED task stays idempotent.
    let id = uuid::Uuid::parse_str(&id).unwrap();
    let running = queue.get(id).await.unwrap().unwrap();
    assert!(running.cancel_requested);
    queue.finalize_cancelled(id).await.unwrap();
    let response = app
        .clone()
        .oneshot(post_json(&format!("/api/tasks/{id}/cancel"), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await["status"], "cancelled");

    // A FAILED task conflicts with 409.
    let response = app.clone().oneshot(post_json("/api/tasks", submit_body())).await.unwrap();
    let failed_id = body_json(response).await["id"].as_str().unwrap().to_string();
    let failed_id = uuid::Uuid::parse_str(&failed_id).unwrap();
    queue.claim("api-test").await.unwrap().unwrap();
    queue.fail(failed_id, "deploy broke").await.unwrap();
    let response = app
        .clone()
        .oneshot(post_json(&format!("/api/tasks/{failed_id}/cancel"), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Unknown id is 404.
    let response = app
        .oneshot(post_json(
            "/api/tasks/00000000-0000-0000-0000-000000000001/cancel",
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_and_metrics_respond() {
    let (app, queue) = test_app().await;

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");

    app.clone().oneshot(post_json("/api/tasks", submit_body())).await.unwrap();
    queue.claim("api-test").await.unwrap().unwrap();

    let response = app.oneshot(get("/api/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["queue"]["RUNNING"], 1);
    assert_eq!(body["pool"]["max_concurrent"], 4);
    assert_eq!(body["pool"]["active"], 0);
}
