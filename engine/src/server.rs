//! Host HTTP entry point
//!
//! # Endpoints
//!
//! - GET /.well-known/agent.json - Host capability card
//! - POST /v1/conversations/:id/messages - Run a turn, respond with the reply
//! - POST /v1/conversations/:id/messages/stream - Run a turn, NDJSON turn events
//! - GET /v1/conversations/:id - Conversation transcript
//! - DELETE /v1/conversations/:id/turn - Cancel the in-flight turn(s)
//!
//! A client that disconnects mid-turn cancels that turn.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use futures::StreamExt;
use sdk::card::{AgentCard, AgentSkill, CARD_PATH};
use sdk::errors::{EngineError, ErrorExt};
use sdk::protocol::NDJSON_CONTENT_TYPE;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::conductor::{Orchestrator, TurnError, TurnEvent};
use crate::config::HostConfig;

const EVENT_CAPACITY: usize = 32;

/// Body of a message submission
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

/// Cancellation tokens of turns that are still running
#[derive(Debug, Clone, Default)]
pub struct TurnRegistry {
    turns: Arc<Mutex<HashMap<String, Vec<(String, CancellationToken)>>>>,
}

impl TurnRegistry {
    pub async fn register(&self, conversation_id: &str) -> (String, CancellationToken) {
        let turn_id = uuid::Uuid::new_v4().to_string();
        let token = CancellationToken::new();
        self.turns
            .lock()
            .await
            .entry(conversation_id.to_string())
            .or_default()
            .push((turn_id.clone(), token.clone()));
        (turn_id, token)
    }

    pub async fn release(&self, conversation_id: &str, turn_id: &str) {
        let mut turns = self.turns.lock().await;
        if let Some(entries) = turns.get_mut(conversation_id) {
            entries.retain(|(id, _)| id != turn_id);
            if entries.is_empty() {
                turns.remove(conversation_id);
            }
        }
    }

    /// Cancel every running or queued turn of a conversation
    pub async fn cancel(&self, conversation_id: &str) -> usize {
        let entries = self.turns.lock().await.remove(conversation_id);
        let entries = entries.unwrap_or_default();
        for (_, token) in &entries {
            token.cancel();
        }
        entries.len()
    }
}

/// State shared across handlers
#[derive(Clone)]
pub struct HostState {
    orchestrator: Arc<Orchestrator>,
    card: Arc<AgentCard>,
    registry: TurnRegistry,
}

impl HostState {
    pub fn new(orchestrator: Arc<Orchestrator>, card: AgentCard) -> Self {
        Self {
            orchestrator,
            card: Arc::new(card),
            registry: TurnRegistry::default(),
        }
    }

    pub fn registry(&self) -> &TurnRegistry {
        &self.registry
    }
}

/// Capability card the host publishes about itself
pub fn host_card(config: &HostConfig) -> AgentCard {
    AgentCard::new(
        config.name.clone(),
        "Travel planning assistant that reviews the forecast for hazards before recommending lodging",
        config.public_base_url.clone(),
    )
    .with_version(env!("CARGO_PKG_VERSION"))
    .with_skill(
        AgentSkill::new(
            "trip_planning",
            "Trip planning",
            "Weather outlooks and lodging ideas, with lodging paused when the forecast is hazardous",
        )
        .with_tags(&["weather", "lodging", "travel"])
        .with_examples(&[
            "What's the weather in Seattle, WA this weekend?",
            "Find a room in LA, CA for June 20-25, two adults",
        ]),
    )
    .with_streaming(true)
}

pub fn router(state: HostState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(Any);

    Router::new()
        .route(CARD_PATH, get(card_handler))
        .route("/v1/conversations/:id", get(transcript_handler))
        .route("/v1/conversations/:id/messages", post(message_handler))
        .route("/v1/conversations/:id/messages/stream", post(stream_handler))
        .route("/v1/conversations/:id/turn", delete(cancel_handler))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until ctrl-c
pub async fn serve(state: HostState, bind: &str) -> Result<(), EngineError> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| EngineError::Network(format!("Failed to bind to {}: {}", bind, e)))?;

    let addr = listener
        .local_addr()
        .map_err(|e| EngineError::Network(format!("Failed to get local address: {}", e)))?;
    tracing::info!("Host listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Host shutting down gracefully");
        })
        .await
        .map_err(|e| EngineError::Network(format!("Host server error: {}", e)))
}

async fn card_handler(State(state): State<HostState>) -> Json<AgentCard> {
    Json(state.card.as_ref().clone())
}

async fn transcript_handler(
    State(state): State<HostState>,
    Path(id): Path<String>,
) -> Response {
    match state.orchestrator.store().snapshot(&id).await {
        Some(conversation) => Json(conversation).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Conversation not found"),
    }
}

async fn message_handler(
    State(state): State<HostState>,
    Path(id): Path<String>,
    Json(request): Json<MessageRequest>,
) -> Response {
    if request.text.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Message text is required");
    }

    let (turn_id, token) = state.registry.register(&id).await;
    // Cancels the turn if the client goes away before it completes
    let guard = token.clone().drop_guard();

    let task = tokio::spawn(async move {
        let outcome = state
            .orchestrator
            .run_turn(&id, &request.text, token, None)
            .await;
        state.registry.release(&id, &turn_id).await;
        outcome
    });

    let outcome = task.await;
    let _ = guard.disarm();

    match outcome {
        Ok(Ok(reply)) => Json(reply).into_response(),
        Ok(Err(e)) => turn_error_response(&e),
        Err(e) => {
            tracing::error!("Turn task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Turn did not complete")
        }
    }
}

async fn stream_handler(
    State(state): State<HostState>,
    Path(id): Path<String>,
    Json(request): Json<MessageRequest>,
) -> Response {
    if request.text.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Message text is required");
    }

    let (turn_id, token) = state.registry.register(&id).await;
    let (tx, rx) = mpsc::channel(EVENT_CAPACITY);

    let turn_token = token.clone();
    tokio::spawn(async move {
        let outcome = state
            .orchestrator
            .run_turn(&id, &request.text, turn_token, Some(tx.clone()))
            .await;
        state.registry.release(&id, &turn_id).await;

        if let Err(TurnError::Transition(e)) = outcome {
            tracing::error!("Turn on conversation {} failed: {}", id, e);
            let failed = TurnEvent::Failed {
                message: TurnError::Transition(e).user_hint().to_string(),
            };
            tx.send(failed).await.ok();
        }
    });

    // The guard travels with the body; dropping the body cancels the turn
    let guard = token.drop_guard();
    let lines = futures::stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let event = rx.recv().await?;
        Some((ndjson_line(&event), (rx, guard)))
    });

    let body = Body::from_stream(lines.map(Ok::<_, Infallible>));
    ([(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)], body).into_response()
}

async fn cancel_handler(State(state): State<HostState>, Path(id): Path<String>) -> Response {
    let cancelled = state.registry.cancel(&id).await;
    if cancelled == 0 {
        return error_response(StatusCode::NOT_FOUND, "No turn in progress");
    }
    tracing::info!("Cancelled {} turn(s) on conversation {}", cancelled, id);
    (StatusCode::ACCEPTED, Json(json!({ "cancelled": cancelled }))).into_response()
}

fn turn_error_response(error: &TurnError) -> Response {
    let status = match error {
        TurnError::Cancelled { .. } => StatusCode::CONFLICT,
        TurnError::Transition(e) => {
            tracing::error!("Turn failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, error.user_hint())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn ndjson_line(event: &TurnEvent) -> String {
    let mut line = serde_json::to_string(event).unwrap_or_else(|e| {
        tracing::error!("Failed to encode turn event: {}", e);
        String::from(r#"{"event":"failed","message":"encoding error"}"#)
    });
    line.push('\n');
    line
}
