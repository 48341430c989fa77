//! Specialist request/result types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{EngineError, ErrorKind, SpecialistError};

/// The specialist domains the host knows how to route to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecialistKind {
    Weather,
    Lodging,
}

impl SpecialistKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecialistKind::Weather => "weather",
            SpecialistKind::Lodging => "lodging",
        }
    }
}

impl fmt::Display for SpecialistKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpecialistKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weather" => Ok(SpecialistKind::Weather),
            "lodging" => Ok(SpecialistKind::Lodging),
            other => Err(EngineError::UnknownSpecialist(other.to_string())),
        }
    }
}

/// A single outbound call to a specialist
///
/// Built fresh for every dispatch and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialistRequest {
    /// Correlates streamed updates with this request
    pub task_id: String,

    /// Target specialist
    pub specialist: SpecialistKind,

    /// Natural-language query
    pub query: String,

    /// Conversation the request belongs to
    pub conversation_id: String,

    /// Optional prior context (already sanitized by the caller)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl SpecialistRequest {
    pub fn new(
        task_id: impl Into<String>,
        specialist: SpecialistKind,
        query: impl Into<String>,
        conversation_id: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            specialist,
            query: query.into(),
            conversation_id: conversation_id.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Status of a specialist result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    /// Terminal: the specialist answered
    Success,
    /// Non-terminal: an incremental update from a stream
    Partial,
    /// Terminal: the call failed (see the error kind)
    Failed,
    /// Terminal: the call was cancelled by the caller
    Cancelled,
}

impl ResultStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ResultStatus::Partial)
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResultStatus::Success => "SUCCESS",
            ResultStatus::Partial => "PARTIAL",
            ResultStatus::Failed => "FAILED",
            ResultStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// Transport details recorded alongside a result
///
/// Everything except `redacted` originates from the network and is untrusted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportMeta {
    /// Name advertised by the specialist's capability card, if discovered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_name: Option<String>,

    /// HTTP status of the last response, if one arrived
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,

    /// Number of attempts made (1 when no retry happened)
    #[serde(default)]
    pub attempts: u32,

    /// Whether the result was delivered over the streaming endpoint
    #[serde(default)]
    pub streamed: bool,

    /// Set by the host when its sanitizer removed or cut part of the payload
    #[serde(default)]
    pub redacted: bool,
}

/// Outcome of a specialist call
///
/// The payload is untrusted input and must pass through the host's sanitizer
/// before it is embedded in composed text or forwarded to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialistResult {
    pub specialist: SpecialistKind,
    pub status: ResultStatus,
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SpecialistError>,
    #[serde(default)]
    pub meta: TransportMeta,
}

impl SpecialistResult {
    pub fn success(specialist: SpecialistKind, payload: impl Into<String>) -> Self {
        Self {
            specialist,
            status: ResultStatus::Success,
            payload: payload.into(),
            error: None,
            meta: TransportMeta::default(),
        }
    }

    pub fn partial(specialist: SpecialistKind, payload: impl Into<String>) -> Self {
        Self {
            specialist,
            status: ResultStatus::Partial,
            payload: payload.into(),
            error: None,
            meta: TransportMeta::default(),
        }
    }

    pub fn failed(specialist: SpecialistKind, error: SpecialistError) -> Self {
        Self {
            specialist,
            status: ResultStatus::Failed,
            payload: String::new(),
            error: Some(error),
            meta: TransportMeta::default(),
        }
    }

    pub fn cancelled(specialist: SpecialistKind) -> Self {
        Self {
            specialist,
            status: ResultStatus::Cancelled,
            payload: String::new(),
            error: None,
            meta: TransportMeta::default(),
        }
    }

    pub fn with_meta(mut self, meta: TransportMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }

    /// Error kind of a failed result
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specialist_kind_parsing() {
        assert_eq!(
            "Weather".parse::<SpecialistKind>().unwrap(),
            SpecialistKind::Weather
        );
        assert_eq!(
            " lodging ".parse::<SpecialistKind>().unwrap(),
            SpecialistKind::Lodging
        );
        assert!("airline".parse::<SpecialistKind>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(ResultStatus::Success.is_terminal());
        assert!(ResultStatus::Failed.is_terminal());
        assert!(ResultStatus::Cancelled.is_terminal());
        assert!(!ResultStatus::Partial.is_terminal());
    }

    #[test]
    fn test_failed_result_carries_kind() {
        let result = SpecialistResult::failed(
            SpecialistKind::Weather,
            SpecialistError::timeout("no answer"),
        );
        assert_eq!(result.status, ResultStatus::Failed);
        assert_eq!(result.error_kind(), Some(ErrorKind::TransportTimeout));
        assert!(result.payload.is_empty());
    }

    #[test]
    fn test_request_serialization_skips_empty_context() {
        let request = SpecialistRequest::new("t-1", SpecialistKind::Weather, "rain?", "c-1");
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("context"));
        assert!(json.contains(r#""specialist":"weather""#));
    }
}
