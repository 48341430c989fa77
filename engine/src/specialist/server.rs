//! HTTP surface of a specialist service
//!
//! # Endpoints
//!
//! - GET /.well-known/agent.json - Capability card
//! - POST /tasks - Run a task, respond with the terminal update
//! - POST /tasks/stream - NDJSON: one `working` update, then the terminal update

use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use sdk::card::{AgentCard, CARD_PATH};
use sdk::errors::EngineError;
use sdk::protocol::{TaskSubmission, TaskUpdate, NDJSON_CONTENT_TYPE, TASKS_PATH, TASKS_STREAM_PATH};
use std::convert::Infallible;
use std::sync::Arc;

use super::SpecialistAdapter;

/// State shared across handlers
#[derive(Clone)]
struct ServiceState {
    adapter: Arc<SpecialistAdapter>,
    card: Arc<AgentCard>,
}

/// Build the router for one specialist
pub fn router(adapter: Arc<SpecialistAdapter>, card: AgentCard) -> Router {
    let state = ServiceState {
        adapter,
        card: Arc::new(card),
    };

    Router::new()
        .route(CARD_PATH, get(card_handler))
        .route(TASKS_PATH, post(task_handler))
        .route(TASKS_STREAM_PATH, post(stream_handler))
        .with_state(state)
}

/// Bind and serve until ctrl-c
pub async fn serve(adapter: Arc<SpecialistAdapter>, card: AgentCard, bind: &str) -> Result<(), EngineError> {
    let kind = adapter.kind();
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| EngineError::Network(format!("Failed to bind to {}: {}", bind, e)))?;

    let addr = listener
        .local_addr()
        .map_err(|e| EngineError::Network(format!("Failed to get local address: {}", e)))?;
    tracing::info!("{} specialist listening on http://{}", kind, addr);

    axum::serve(listener, router(adapter, card))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Specialist service shutting down gracefully");
        })
        .await
        .map_err(|e| EngineError::Network(format!("Specialist server error: {}", e)))
}

async fn card_handler(State(state): State<ServiceState>) -> Json<AgentCard> {
    Json(state.card.as_ref().clone())
}

async fn task_handler(
    State(state): State<ServiceState>,
    Json(submission): Json<TaskSubmission>,
) -> Json<TaskUpdate> {
    let task_id = submission.task_id.clone();
    let request = submission.into_request(state.adapter.kind());
    let result = state.adapter.handle(&request).await;
    Json(TaskUpdate::from_result(task_id, &result))
}

async fn stream_handler(
    State(state): State<ServiceState>,
    Json(submission): Json<TaskSubmission>,
) -> Response {
    let kind = state.adapter.kind();
    let task_id = submission.task_id.clone();
    let request = submission.into_request(kind);

    let working = TaskUpdate::working(&task_id, format!("Working on your {} request", kind));
    let first = futures::stream::once(async move { ndjson_line(&working) });
    let rest = futures::stream::once(async move {
        let result = state.adapter.handle(&request).await;
        ndjson_line(&TaskUpdate::from_result(task_id, &result))
    });

    let body = Body::from_stream(first.chain(rest).map(Ok::<_, Infallible>));
    ([(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)], body).into_response()
}

fn ndjson_line(update: &TaskUpdate) -> String {
    let mut line = serde_json::to_string(update).unwrap_or_else(|e| {
        tracing::error!("Failed to encode task update: {}", e);
        String::from(r#"{"taskId":"","state":"failed"}"#)
    });
    line.push('\n');
    line
}
