//! Waypoint SDK
//!
//! Shared types for the Waypoint host and its specialist services: the error
//! taxonomy, specialist request/result types, capability cards and the task
//! protocol messages.

/// Capability card types
pub mod card;

/// Error types and handling
pub mod errors;

/// Task protocol messages
pub mod protocol;

/// Specialist request/result types
pub mod types;

// Re-export commonly used types
pub use card::{AgentCapabilities, AgentCard, AgentSkill, CARD_PATH};
pub use errors::{EngineError, ErrorExt, ErrorKind, SpecialistError};
pub use protocol::{TaskState, TaskSubmission, TaskUpdate};
pub use types::{
    ResultStatus, SpecialistKind, SpecialistRequest, SpecialistResult, TransportMeta,
};
