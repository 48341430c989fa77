//! Generation Backend Abstraction Layer
//!
//! Specialist services turn a query into text through a content-generation
//! backend. The [`GenerationBackend`] trait is the contract every backend
//! implements (Ollama, OpenAI-compatible), so the specialist adapter never
//! depends on a particular provider's wire format.

use async_trait::async_trait;
use sdk::errors::{EngineError, ErrorKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::LLMConfig;

pub mod ollama;
pub mod openai;

/// Result type for generation operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during generation
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl LLMError {
    /// Error kind reported to the caller of a specialist
    ///
    /// Connect failures and timeouts mean the backend could not be used at
    /// all; everything else is the backend misbehaving.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LLMError::ProviderUnavailable(_) | LLMError::NetworkError(_) | LLMError::Timeout => {
                ErrorKind::BackendUnavailable
            }
            _ => ErrorKind::BackendError,
        }
    }

    /// Map a reqwest transport error
    pub(crate) fn from_transport(err: reqwest::Error, base_url: &str) -> Self {
        if err.is_timeout() {
            LLMError::Timeout
        } else if err.is_connect() {
            LLMError::ProviderUnavailable(format!("Cannot connect to {}", base_url))
        } else {
            LLMError::NetworkError(err.to_string())
        }
    }
}

/// A single generation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model override; `None` uses the backend's configured model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Fixed domain instructions
    pub system: String,

    /// Sanitized user content
    pub prompt: String,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: None,
            system: system.into(),
            prompt: prompt.into(),
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

/// Content-generation backend used by specialist services
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Returns the name of the provider (e.g., "ollama", "openai")
    fn name(&self) -> &str;

    /// Generate text for a request
    ///
    /// # Returns
    /// * `Ok(String)` - The generated text
    /// * `Err(LLMError)` - If the request fails
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Check if the backend is currently reachable
    /// Default implementation returns true.
    async fn check_health(&self) -> bool {
        true
    }
}

/// Build the configured default backend
pub fn backend_from_config(
    config: &LLMConfig,
) -> std::result::Result<Arc<dyn GenerationBackend>, EngineError> {
    match config.default_provider.as_str() {
        "ollama" => Ok(Arc::new(ollama::OllamaProvider::new(
            config.ollama.base_url.clone(),
            config.ollama.model.clone(),
        )?)),
        "openai" => Ok(Arc::new(openai::OpenAIProvider::new(config.openai.clone())?)),
        other => Err(EngineError::Config(format!(
            "Unknown generation provider '{}'",
            other
        ))),
    }
}

pub(crate) fn http_client() -> std::result::Result<reqwest::Client, EngineError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()
        .map_err(|e| EngineError::Network(format!("Failed to create HTTP client: {}", e)))
}
