//! Specialist service HTTP surface
//!
//! Drives the router in-process with `tower::ServiceExt::oneshot` and a
//! fixed generation backend.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use sdk::card::AgentCard;
use sdk::errors::ErrorKind;
use sdk::protocol::{TaskState, TaskUpdate};
use sdk::types::SpecialistKind;
use waypoint_engine::injection_detector::InjectionDetector;
use waypoint_engine::llm::{GenerationBackend, GenerationRequest, LLMError, Result as LLMResult};
use waypoint_engine::specialist::{server, SpecialistAdapter};

/// Backend that answers with a fixed text and records prompts
struct FixedBackend {
    reply: Option<&'static str>,
    prompts: Mutex<Vec<GenerationRequest>>,
}

impl FixedBackend {
    fn new(reply: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            reply,
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl GenerationBackend for FixedBackend {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn generate(&self, request: &GenerationRequest) -> LLMResult<String> {
        self.prompts.lock().unwrap().push(request.clone());
        self.reply
            .map(str::to_string)
            .ok_or_else(|| LLMError::ProviderUnavailable("offline".to_string()))
    }
}

fn service(kind: SpecialistKind, backend: Arc<FixedBackend>) -> axum::Router {
    let adapter = SpecialistAdapter::new(
        kind,
        backend,
        Arc::new(InjectionDetector::new().unwrap()),
    );
    let card = adapter.card("http://localhost:10001");
    server::router(Arc::new(adapter), card)
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

#[tokio::test]
async fn test_card_endpoint_serves_card() {
    let app = service(SpecialistKind::Weather, FixedBackend::new(Some("Sunny")));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/.well-known/agent.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let card: AgentCard = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(card.name, "Weather Specialist");
    assert_eq!(card.url, "http://localhost:10001");
    assert!(card.capabilities.streaming);
    assert_eq!(card.skills[0].id, "weather_forecast");
}

#[tokio::test]
async fn test_task_endpoint_completes() {
    let backend = FixedBackend::new(Some("  Clear skies, 75F  "));
    let app = service(SpecialistKind::Weather, Arc::clone(&backend));

    let response = app
        .oneshot(post_json(
            "/tasks",
            json!({
                "taskId": "t-1",
                "conversationId": "c-1",
                "query": "Weather in LA, CA for June 20-25?"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let update: TaskUpdate = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(update.task_id, "t-1");
    assert_eq!(update.state, TaskState::Completed);
    assert_eq!(update.text, "Clear skies, 75F");

    let prompts = backend.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].prompt.contains("LA, CA"));
}

#[tokio::test]
async fn test_task_endpoint_reports_backend_outage() {
    let app = service(SpecialistKind::Lodging, FixedBackend::new(None));

    let response = app
        .oneshot(post_json(
            "/tasks",
            json!({ "taskId": "t-2", "conversationId": "c-1", "query": "A cabin near Tahoe" }),
        ))
        .await
        .unwrap();

    let update: TaskUpdate = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(update.state, TaskState::Failed);
    assert_eq!(
        update.error.map(|e| e.kind),
        Some(ErrorKind::BackendUnavailable)
    );
}

#[tokio::test]
async fn test_empty_query_is_rejected_without_backend_call() {
    let backend = FixedBackend::new(Some("unused"));
    let app = service(SpecialistKind::Weather, Arc::clone(&backend));

    let response = app
        .oneshot(post_json(
            "/tasks",
            json!({ "taskId": "t-3", "conversationId": "c-1", "query": "   " }),
        ))
        .await
        .unwrap();

    let update: TaskUpdate = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(update.state, TaskState::Failed);
    assert_eq!(update.error.map(|e| e.kind), Some(ErrorKind::InvalidRequest));
    assert!(backend.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_submission_is_client_error() {
    let app = service(SpecialistKind::Weather, FixedBackend::new(Some("Sunny")));

    let response = app
        .oneshot(post_json("/tasks", json!({ "query": "no task id" })))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_stream_endpoint_emits_working_then_completed() {
    let app = service(SpecialistKind::Lodging, FixedBackend::new(Some("Harbor Inn, 2 nights")));

    let response = app
        .oneshot(post_json(
            "/tasks/stream",
            json!({
                "taskId": "t-4",
                "conversationId": "c-1",
                "query": "Find a room in LA, CA",
                "context": "Weather summary:\nclear skies, 75F"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/x-ndjson"
    );

    let body = String::from_utf8(body_bytes(response).await).unwrap();
    let updates: Vec<TaskUpdate> = body
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].state, TaskState::Working);
    assert_eq!(updates[1].state, TaskState::Completed);
    assert_eq!(updates[1].task_id, "t-4");
    assert_eq!(updates[1].text, "Harbor Inn, 2 nights");
}
