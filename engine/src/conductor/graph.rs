//! Orchestrator
//!
//! Drives the [`GraphState`] machine for one turn: runs the specialist
//! effects it asks for, sanitizes every result on receipt, emits progress
//! events and finally appends the user and agent turns together.
//!
//! The conversation lock is held for the whole turn. A cancelled turn leaves
//! the conversation untouched, and a conversation created by a turn that
//! never completed is dropped again.

use futures::StreamExt;
use sdk::errors::{EngineError, ErrorExt};
use sdk::types::{ResultStatus, SpecialistRequest, SpecialistResult};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::events::{EventSink, TurnEvent};
use super::state::{Effect, GraphState, Next, Outcome, TransitionContext, TransitionError};
use super::types::Decision;
use crate::config::Config;
use crate::injection_detector::InjectionDetector;
use crate::policy::{HazardPolicy, IntentClassifier};
use crate::remote::SpecialistGateway;
use crate::session::{Conversation, ConversationStore, Turn};

/// Reply for a completed turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnReply {
    pub conversation_id: String,
    pub text: String,
    pub decision: Decision,
}

/// Why a turn produced no reply
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// The caller cancelled; `in_flight` is the terminal result of the
    /// specialist call that was running, if any
    #[error("turn cancelled")]
    Cancelled { in_flight: Option<SpecialistResult> },

    #[error("orchestration fault: {0}")]
    Transition(#[from] TransitionError),
}

impl ErrorExt for TurnError {
    fn user_hint(&self) -> &str {
        match self {
            TurnError::Cancelled { .. } => "The request was cancelled before it finished",
            TurnError::Transition(_) => "Something went wrong while handling your request",
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, TurnError::Cancelled { .. })
    }
}

/// Per-turn orchestration over the conversation store
pub struct Orchestrator {
    classifier: IntentClassifier,
    hazard: HazardPolicy,
    detector: Arc<InjectionDetector>,
    gateway: Arc<dyn SpecialistGateway>,
    store: ConversationStore,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        detector: Arc<InjectionDetector>,
        gateway: Arc<dyn SpecialistGateway>,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            classifier: IntentClassifier::new(&config.policy)?,
            hazard: HazardPolicy::new(&config.policy, Arc::clone(&detector)),
            detector,
            gateway,
            store: ConversationStore::new(config.session.max_turns),
        })
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Run one user turn to completion
    ///
    /// Turns on the same conversation run one at a time in arrival order.
    /// Specialist failures never surface here; they are folded into the
    /// composed reply. Only cancellation or an internal fault returns an
    /// error, and in both cases the conversation is unchanged.
    pub async fn run_turn(
        &self,
        conversation_id: &str,
        text: &str,
        cancel: CancellationToken,
        events: Option<mpsc::Sender<TurnEvent>>,
    ) -> Result<TurnReply, TurnError> {
        let events = EventSink::new(events);
        let conversation = self.store.get_or_create(conversation_id).await;
        let outcome = self
            .drive_turn(&conversation, conversation_id, text, &cancel, &events)
            .await;
        drop(conversation);

        if outcome.is_err() {
            self.store.discard_if_empty(conversation_id).await;
        }
        outcome
    }

    async fn drive_turn(
        &self,
        conversation: &Mutex<Conversation>,
        conversation_id: &str,
        text: &str,
        cancel: &CancellationToken,
        events: &EventSink,
    ) -> Result<TurnReply, TurnError> {
        let mut guard = conversation.lock().await;

        let user_turn = Turn::user(text);
        let mut state = GraphState::Start;

        let mut reply = None;

        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled(events, None).await);
            }

            let next = {
                let ctx = TransitionContext {
                    text,
                    prior_turns: guard.turns(),
                    previous: guard.last_decision(),
                    classifier: &self.classifier,
                    hazard: &self.hazard,
                };
                state.next(&ctx)?
            };

            match next {
                Next::Goto(next_state) => {
                    self.announce(&state, &next_state, events).await;
                    tracing::debug!("{} -> {}", state.name(), next_state.name());
                    state = next_state;
                }
                Next::Run(effect) => {
                    let result = self
                        .run_effect(conversation_id, text, &effect, cancel, events)
                        .await?;
                    let outcome = match effect {
                        Effect::FetchWeather { .. } => Outcome::Weather(result),
                        Effect::FetchLodging { .. } => Outcome::Lodging(result),
                    };
                    let from = state.name();
                    state = state.resume(outcome)?;
                    tracing::debug!("{} -> {}", from, state.name());
                }
                Next::Commit => {
                    let composed = std::mem::replace(&mut state, GraphState::End);
                    if let Some(decision) = composed.into_decision() {
                        events
                            .emit(TurnEvent::Composed {
                                intent: decision.intent(),
                                hazard: decision.hazard(),
                                text: decision.composed_text().to_string(),
                            })
                            .await;

                        guard.append_exchange(user_turn.clone(), Turn::agent(decision.clone()));

                        tracing::info!(
                            "Turn complete for conversation {}: intent={}, hazard={}",
                            conversation_id,
                            decision.intent(),
                            decision.hazard()
                        );

                        reply = Some(TurnReply {
                            conversation_id: conversation_id.to_string(),
                            text: decision.composed_text().to_string(),
                            decision,
                        });
                    }
                    tracing::debug!("COMPOSED -> END");
                }
                Next::Finished => break,
            }
        }

        reply.ok_or_else(|| TurnError::Transition(TransitionError::Incomplete))
    }

    async fn announce(&self, from: &GraphState, to: &GraphState, events: &EventSink) {
        match (from, to) {
            (GraphState::Start, GraphState::Classified(plan)) => {
                tracing::info!("Classified as {}", plan.intent);
                events
                    .emit(TurnEvent::Classified {
                        intent: plan.intent,
                        location: plan.location.clone(),
                    })
                    .await;
            }
            (GraphState::WeatherDone { .. }, GraphState::HazardBlocked { assessment, .. })
            | (
                GraphState::WeatherDone { .. },
                GraphState::LodgingPending {
                    assessment: Some(assessment),
                    ..
                },
            ) => {
                events
                    .emit(TurnEvent::HazardEvaluated {
                        hazard: assessment.hazard,
                        rationale: assessment.rationale.clone(),
                        matched_terms: assessment.matched_terms.clone(),
                    })
                    .await;
            }
            _ => {}
        }
    }

    fn build_request(
        &self,
        conversation_id: &str,
        text: &str,
        effect: &Effect,
    ) -> SpecialistRequest {
        let task_id = uuid::Uuid::new_v4().to_string();
        let request = SpecialistRequest::new(task_id, effect.specialist(), text, conversation_id);

        let context = match effect {
            Effect::FetchWeather { location } => {
                location.as_ref().map(|l| format!("Destination: {}", l))
            }
            Effect::FetchLodging {
                location,
                weather_summary,
            } => {
                let mut lines = Vec::new();
                if let Some(location) = location {
                    lines.push(format!("Destination: {}", location));
                }
                if let Some(summary) = weather_summary {
                    lines.push(format!("Weather summary:\n{}", summary));
                }
                (!lines.is_empty()).then(|| lines.join("\n"))
            }
        };

        match context {
            Some(context) => request.with_context(context),
            None => request,
        }
    }

    async fn run_effect(
        &self,
        conversation_id: &str,
        text: &str,
        effect: &Effect,
        cancel: &CancellationToken,
        events: &EventSink,
    ) -> Result<SpecialistResult, TurnError> {
        let request = self.build_request(conversation_id, text, effect);
        let kind = request.specialist;

        events
            .emit(TurnEvent::SpecialistDispatched {
                specialist: kind,
                task_id: request.task_id.clone(),
            })
            .await;

        // Dispatch may block on discovery, so it races the token too
        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let result = SpecialistResult::cancelled(kind);
                self.finished(&result, events).await;
                return Err(self.cancelled(events, Some(result)).await);
            }
            stream = self.gateway.dispatch(request) => stream,
        };

        loop {
            let update = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let result = stream.cancel();
                    self.finished(&result, events).await;
                    return Err(self.cancelled(events, Some(result)).await);
                }
                update = stream.next() => update,
            };

            let Some(update) = update else {
                // The stream always ends with a terminal result
                let result = SpecialistResult::failed(
                    kind,
                    sdk::errors::SpecialistError::transport("specialist stream ended early"),
                );
                self.finished(&result, events).await;
                return Ok(result);
            };

            let update = self.sanitize(update);
            if update.status == ResultStatus::Partial {
                if !update.payload.is_empty() {
                    events
                        .emit(TurnEvent::SpecialistProgress {
                            specialist: kind,
                            text: update.payload.clone(),
                        })
                        .await;
                }
                continue;
            }

            self.finished(&update, events).await;
            return Ok(update);
        }
    }

    async fn finished(&self, result: &SpecialistResult, events: &EventSink) {
        match &result.error {
            Some(error) => tracing::warn!(
                "{} specialist finished with {}: {}",
                result.specialist,
                result.status,
                error
            ),
            None => tracing::info!(
                "{} specialist finished with {} after {} attempt(s)",
                result.specialist,
                result.status,
                result.meta.attempts
            ),
        }
        events
            .emit(TurnEvent::SpecialistFinished {
                specialist: result.specialist,
                status: result.status,
                error: result.error_kind(),
            })
            .await;
    }

    async fn cancelled(&self, events: &EventSink, in_flight: Option<SpecialistResult>) -> TurnError {
        tracing::info!("Turn cancelled");
        events.emit(TurnEvent::Cancelled).await;
        TurnError::Cancelled { in_flight }
    }

    /// Strip untrusted content from a result's payload
    fn sanitize(&self, mut result: SpecialistResult) -> SpecialistResult {
        let sanitized = self.detector.sanitize(&result.payload);
        if !sanitized.warnings.is_empty() {
            tracing::warn!(
                "Removed {} suspicious line(s) from {} specialist output",
                sanitized.warnings.len(),
                result.specialist
            );
        }
        if sanitized.truncated {
            tracing::warn!(
                "{} specialist output exceeded the sanitizer limit and was cut",
                result.specialist
            );
        }
        result.meta.redacted |= !sanitized.is_clean();
        result.payload = sanitized.text;
        if let Some(card_name) = result.meta.card_name.take() {
            result.meta.card_name = Some(self.detector.clean(&card_name));
        }
        result
    }
}
