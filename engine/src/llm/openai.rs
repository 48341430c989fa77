use super::{GenerationBackend, GenerationRequest, LLMError, Result};
use crate::config::OpenAIConfig;
use async_trait::async_trait;
use sdk::errors::EngineError;
use serde_json::json;

pub struct OpenAIProvider {
    config: OpenAIConfig,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig) -> std::result::Result<Self, EngineError> {
        Ok(Self {
            config,
            client: super::http_client()?,
        })
    }

    fn api_key(&self) -> Result<String> {
        std::env::var(&self.config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                LLMError::AuthenticationFailed(format!("{} is not set", self.config.api_key_env))
            })
    }
}

#[async_trait]
impl GenerationBackend for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn check_health(&self) -> bool {
        self.api_key().is_ok()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let api_key = self.api_key()?;

        let base_url = self.config.base_url.trim_end_matches('/');
        let url = format!("{}/chat/completions", base_url);

        let payload = json!({
            "model": request.model.as_deref().unwrap_or(&self.config.model),
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| LLMError::from_transport(e, base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(LLMError::AuthenticationFailed(text));
            } else if status.as_u16() == 429 {
                return Err(LLMError::RateLimitExceeded);
            } else if status.is_server_error() {
                return Err(LLMError::Unknown(format!("{}: {}", status, text)));
            } else {
                return Err(LLMError::InvalidRequest(text));
            }
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        data.get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .filter(|content| !content.trim().is_empty())
            .map(|content| content.to_string())
            .ok_or_else(|| LLMError::ParseError("Empty content".to_string()))
    }
}
