//! Progress events emitted while a turn runs
//!
//! Streaming entry points forward these as NDJSON lines. Event text that
//! originates from a specialist is sanitized before it is emitted.

use sdk::errors::ErrorKind;
use sdk::types::{ResultStatus, SpecialistKind};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::policy::Intent;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TurnEvent {
    Classified {
        intent: Intent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<String>,
    },
    SpecialistDispatched {
        specialist: SpecialistKind,
        task_id: String,
    },
    SpecialistProgress {
        specialist: SpecialistKind,
        text: String,
    },
    SpecialistFinished {
        specialist: SpecialistKind,
        status: ResultStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorKind>,
    },
    HazardEvaluated {
        hazard: bool,
        rationale: String,
        matched_terms: Vec<String>,
    },
    Composed {
        intent: Intent,
        hazard: bool,
        text: String,
    },
    Cancelled,
    /// The turn ended without a reply because of an internal fault
    Failed {
        message: String,
    },
}

/// Optional sink for turn events
///
/// Sending never fails the turn: a closed receiver just stops delivery.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<TurnEvent>>,
}

impl EventSink {
    pub fn new(tx: Option<mpsc::Sender<TurnEvent>>) -> Self {
        Self { tx }
    }

    pub async fn emit(&self, event: TurnEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).await.is_err() {
                tracing::debug!("Turn event receiver dropped");
            }
        }
    }
}
