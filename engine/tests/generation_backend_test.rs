//! Integration tests for the generation backends
//!
//! The Ollama and OpenAI-compatible APIs are played by `wiremock` servers, so
//! no model needs to be running.

use serde_json::json;
use sdk::errors::ErrorKind;
use waypoint_engine::config::OpenAIConfig;
use waypoint_engine::llm::{
    ollama::OllamaProvider, openai::OpenAIProvider, GenerationBackend, GenerationRequest,
    LLMError,
};
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn weather_request() -> GenerationRequest {
    GenerationRequest::new("You forecast weather", "Seattle, WA this weekend")
}

#[tokio::test]
async fn test_ollama_generates_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "llama3.1:8b",
            "stream": false,
            "messages": [
                { "role": "system", "content": "You forecast weather" },
                { "role": "user", "content": "Seattle, WA this weekend" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.1:8b",
            "message": { "role": "assistant", "content": "Showers Saturday, 54F" },
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(server.uri(), "llama3.1:8b").unwrap();
    let text = provider.generate(&weather_request()).await.unwrap();

    assert_eq!(provider.name(), "ollama");
    assert_eq!(text, "Showers Saturday, 54F");
}

#[tokio::test]
async fn test_ollama_model_override() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({ "model": "qwen2.5:7b" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": { "role": "assistant", "content": "Clear" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(server.uri(), "llama3.1:8b").unwrap();
    let request = weather_request().with_model(Some("qwen2.5:7b".to_string()));
    assert_eq!(provider.generate(&request).await.unwrap(), "Clear");
}

#[tokio::test]
async fn test_ollama_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(server.uri(), "missing").unwrap();
    let err = provider.generate(&weather_request()).await.unwrap_err();

    assert!(matches!(err, LLMError::InvalidRequest(_)));
    assert_eq!(err.kind(), ErrorKind::BackendError);
}

#[tokio::test]
async fn test_ollama_empty_content_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": { "role": "assistant", "content": "   " }
        })))
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(server.uri(), "llama3.1:8b").unwrap();
    let err = provider.generate(&weather_request()).await.unwrap_err();
    assert!(matches!(err, LLMError::ParseError(_)));
}

#[tokio::test]
async fn test_ollama_connection_error() {
    // Nothing listens on port 1
    let provider = OllamaProvider::new("http://127.0.0.1:1", "llama3.1:8b").unwrap();

    let err = provider.generate(&weather_request()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    assert!(!provider.check_health().await);
}

#[tokio::test]
async fn test_ollama_health_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": [] })))
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(format!("{}/", server.uri()), "llama3.1:8b").unwrap();
    assert!(provider.check_health().await);
}

fn openai_config(base_url: String, key_env: &str) -> OpenAIConfig {
    OpenAIConfig {
        base_url,
        model: "gpt-4o-mini".to_string(),
        api_key_env: key_env.to_string(),
    }
}

#[tokio::test]
async fn test_openai_generates_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(json!({ "model": "gpt-4o-mini" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [
                { "message": { "role": "assistant", "content": "Harbor Inn, Sea View Motel" } }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    std::env::set_var("WAYPOINT_TEST_OPENAI_KEY", "test-key");
    let provider =
        OpenAIProvider::new(openai_config(server.uri(), "WAYPOINT_TEST_OPENAI_KEY")).unwrap();

    assert!(provider.check_health().await);
    let text = provider.generate(&weather_request()).await.unwrap();
    assert_eq!(text, "Harbor Inn, Sea View Motel");
}

#[tokio::test]
async fn test_openai_maps_error_statuses() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    std::env::set_var("WAYPOINT_TEST_OPENAI_KEY_429", "test-key");
    let provider =
        OpenAIProvider::new(openai_config(server.uri(), "WAYPOINT_TEST_OPENAI_KEY_429")).unwrap();

    let err = provider.generate(&weather_request()).await.unwrap_err();
    assert!(matches!(err, LLMError::RateLimitExceeded));
}

#[tokio::test]
async fn test_openai_without_key_fails_before_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let provider =
        OpenAIProvider::new(openai_config(server.uri(), "WAYPOINT_TEST_UNSET_KEY")).unwrap();

    assert!(!provider.check_health().await);
    let err = provider.generate(&weather_request()).await.unwrap_err();
    assert!(matches!(err, LLMError::AuthenticationFailed(_)));
}
