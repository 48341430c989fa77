//! Error types and handling
//!
//! This module provides the error taxonomy shared by the host engine, the
//! remote specialist client and the specialist services. Every error kind
//! has a stable wire name so that a specialist can report a failure to the
//! host without leaking backend details.
//!
//! # Security
//!
//! Error messages carried across the wire come from untrusted peers. They are
//! never shown to end users verbatim: callers use [`ErrorExt::user_hint`]
//! for user-facing text and keep the message for logs only.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Trait for Waypoint error extensions
///
/// Provides a user-safe hint and whether the failure is worth retrying.
pub trait ErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint never contains peer-supplied text, URLs or secrets.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is transient and may be retried
    fn is_retryable(&self) -> bool;
}

/// Closed set of failure kinds a specialist call can end with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed input to an adapter (e.g. empty query)
    InvalidRequest,
    /// Generation backend could not be reached
    BackendUnavailable,
    /// Generation backend answered with an error
    BackendError,
    /// The specialist did not answer within the configured bound
    TransportTimeout,
    /// Network-level failure reaching a specialist
    TransportError,
    /// Malformed or untrusted specialist response that failed validation
    ProtocolError,
}

impl ErrorKind {
    /// Stable wire name, e.g. `TRANSPORT_TIMEOUT`
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "INVALID_REQUEST",
            ErrorKind::BackendUnavailable => "BACKEND_UNAVAILABLE",
            ErrorKind::BackendError => "BACKEND_ERROR",
            ErrorKind::TransportTimeout => "TRANSPORT_TIMEOUT",
            ErrorKind::TransportError => "TRANSPORT_ERROR",
            ErrorKind::ProtocolError => "PROTOCOL_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ErrorExt for ErrorKind {
    fn user_hint(&self) -> &str {
        match self {
            ErrorKind::InvalidRequest => "The request could not be understood by the specialist",
            ErrorKind::BackendUnavailable => "The specialist's content service is unavailable",
            ErrorKind::BackendError => "The specialist's content service reported an error",
            ErrorKind::TransportTimeout => "The specialist took too long to respond",
            ErrorKind::TransportError => "The specialist could not be reached",
            ErrorKind::ProtocolError => "The specialist sent a response that could not be trusted",
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::TransportTimeout | ErrorKind::TransportError
        )
    }
}

/// A classified specialist failure
///
/// # Examples
///
/// ```
/// use sdk::errors::{ErrorExt, ErrorKind, SpecialistError};
///
/// let err = SpecialistError::new(ErrorKind::TransportTimeout, "no answer after 60s");
/// assert!(err.is_retryable());
/// assert_eq!(err.to_string(), "TRANSPORT_TIMEOUT: no answer after 60s");
///
/// let err = SpecialistError::protocol("task id mismatch");
/// assert!(!err.is_retryable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct SpecialistError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SpecialistError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransportTimeout, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransportError, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProtocolError, message)
    }
}

impl ErrorExt for SpecialistError {
    fn user_hint(&self) -> &str {
        self.kind.user_hint()
    }

    fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Process-level engine errors (startup, configuration, serving)
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Specialist lookup errors
    #[error("Unknown specialist: {0}")]
    UnknownSpecialist(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::UnknownSpecialist(_) => "Specialist must be one of: weather, lodging",
            Self::Network(_) => "Network operation failed. Check your connection",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}
