//! Task protocol messages exchanged between the host and a specialist
//!
//! - `POST /tasks` takes a [`TaskSubmission`] and answers with one terminal
//!   [`TaskUpdate`].
//! - `POST /tasks/stream` takes the same body and answers with newline
//!   delimited JSON: zero or more `working` updates followed by exactly one
//!   terminal update.

use serde::{Deserialize, Serialize};

use crate::errors::SpecialistError;
use crate::types::{ResultStatus, SpecialistKind, SpecialistRequest, SpecialistResult};

/// Path of the blocking task endpoint
pub const TASKS_PATH: &str = "/tasks";

/// Path of the streaming task endpoint
pub const TASKS_STREAM_PATH: &str = "/tasks/stream";

/// Content type used by the streaming endpoint
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Body of a task submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSubmission {
    pub task_id: String,
    pub conversation_id: String,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl From<&SpecialistRequest> for TaskSubmission {
    fn from(request: &SpecialistRequest) -> Self {
        Self {
            task_id: request.task_id.clone(),
            conversation_id: request.conversation_id.clone(),
            query: request.query.clone(),
            context: request.context.clone(),
        }
    }
}

impl TaskSubmission {
    /// Rebuild the request on the specialist side
    pub fn into_request(self, specialist: SpecialistKind) -> SpecialistRequest {
        SpecialistRequest {
            task_id: self.task_id,
            specialist,
            query: self.query,
            conversation_id: self.conversation_id,
            context: self.context,
        }
    }
}

/// Lifecycle state of a task on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Working,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Working)
    }
}

/// One update about a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub task_id: String,
    pub state: TaskState,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SpecialistError>,
}

impl TaskUpdate {
    pub fn working(task_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            state: TaskState::Working,
            text: text.into(),
            error: None,
        }
    }

    /// Wire form of a specialist result
    pub fn from_result(task_id: impl Into<String>, result: &SpecialistResult) -> Self {
        let state = match result.status {
            ResultStatus::Success => TaskState::Completed,
            ResultStatus::Partial => TaskState::Working,
            ResultStatus::Failed => TaskState::Failed,
            ResultStatus::Cancelled => TaskState::Cancelled,
        };
        Self {
            task_id: task_id.into(),
            state,
            text: result.payload.clone(),
            error: result.error.clone(),
        }
    }

    /// Convert an update received from the network into a result
    ///
    /// A `failed` update without an error is reported as a protocol error,
    /// since the peer did not say what went wrong.
    pub fn into_result(self, specialist: SpecialistKind) -> SpecialistResult {
        match self.state {
            TaskState::Working => SpecialistResult::partial(specialist, self.text),
            TaskState::Completed => SpecialistResult::success(specialist, self.text),
            TaskState::Cancelled => SpecialistResult::cancelled(specialist),
            TaskState::Failed => {
                let error = self.error.unwrap_or_else(|| {
                    SpecialistError::protocol("peer reported failure without an error")
                });
                SpecialistResult::failed(specialist, error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_update_wire_format() {
        let update = TaskUpdate::working("t-1", "Checking radar");
        let json = serde_json::to_string(&update).unwrap();
        assert_eq!(
            json,
            r#"{"taskId":"t-1","state":"working","text":"Checking radar"}"#
        );
    }

    #[test]
    fn test_failed_update_without_error_is_protocol_error() {
        let update: TaskUpdate =
            serde_json::from_str(r#"{"taskId":"t-1","state":"failed"}"#).unwrap();
        let result = update.into_result(SpecialistKind::Weather);
        assert_eq!(result.status, ResultStatus::Failed);
        assert_eq!(result.error_kind(), Some(ErrorKind::ProtocolError));
    }

    #[test]
    fn test_result_maps_to_terminal_state() {
        let result = SpecialistResult::success(SpecialistKind::Lodging, "Loft near the pier");
        let update = TaskUpdate::from_result("t-9", &result);
        assert_eq!(update.state, TaskState::Completed);
        assert!(update.state.is_terminal());
        assert_eq!(update.text, "Loft near the pier");
    }
}
