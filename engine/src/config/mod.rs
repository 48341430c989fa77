//! Configuration management
//!
//! This module handles loading, validation, and management of the Waypoint
//! configuration. Configuration is stored in TOML format at
//! ~/.waypoint/config.toml and is read once at startup; there is no hot
//! reload. The resulting [`Config`] is passed by reference to the components
//! that need it.
//!
//! # Configuration Sections
//!
//! - **core**: Log level
//! - **host**: Host identity, bind address and public base URL of its card
//! - **specialists**: Specialist endpoint URLs, timeouts and retry policy
//! - **llm**: Generation backend provider settings
//! - **service**: Per-domain settings used when running as a specialist
//! - **policy**: Classifier and hazard term lists
//! - **session**: Conversation history bounds
//!
//! # Environment Overrides
//!
//! `WEATHER_AGENT_URL` and `LODGING_AGENT_URL` replace the configured
//! specialist endpoints when set.
//!
//! # Examples
//!
//! ```no_run
//! use waypoint_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Weather specialist: {}", config.specialists.weather_url);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use sdk::types::SpecialistKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the weather specialist endpoint
pub const WEATHER_URL_ENV: &str = "WEATHER_AGENT_URL";

/// Environment variable overriding the lodging specialist endpoint
pub const LODGING_URL_ENV: &str = "LODGING_AGENT_URL";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Host entry point settings
    #[serde(default)]
    pub host: HostConfig,

    /// Remote specialist settings
    #[serde(default)]
    pub specialists: SpecialistsConfig,

    /// Generation backend configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Specialist service settings
    #[serde(default)]
    pub service: ServiceConfig,

    /// Policy term lists
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Conversation store settings
    #[serde(default)]
    pub session: SessionConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Host entry point configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Display name on the host's capability card
    #[serde(default = "default_host_name")]
    pub name: String,

    /// Socket address the host HTTP server binds to
    #[serde(default = "default_host_bind")]
    pub bind: String,

    /// Public-facing base URL advertised on the host's capability card
    #[serde(default = "default_host_public_url")]
    pub public_base_url: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            name: default_host_name(),
            bind: default_host_bind(),
            public_base_url: default_host_public_url(),
        }
    }
}

/// Remote specialist configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistsConfig {
    /// Weather specialist endpoint
    #[serde(default = "default_weather_url")]
    pub weather_url: String,

    /// Lodging specialist endpoint
    #[serde(default = "default_lodging_url")]
    pub lodging_url: String,

    /// Upper bound for a single call attempt (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries after the first attempt for transient transport failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial retry backoff (milliseconds), doubled per retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Largest accepted payload from a specialist (bytes)
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Use the streaming endpoint when the card advertises it
    #[serde(default = "default_true")]
    pub prefer_streaming: bool,
}

impl SpecialistsConfig {
    /// Configured endpoint for a specialist
    pub fn endpoint(&self, kind: SpecialistKind) -> &str {
        match kind {
            SpecialistKind::Weather => &self.weather_url,
            SpecialistKind::Lodging => &self.lodging_url,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for SpecialistsConfig {
    fn default() -> Self {
        Self {
            weather_url: default_weather_url(),
            lodging_url: default_lodging_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_payload_bytes: default_max_payload_bytes(),
            prefer_streaming: true,
        }
    }
}

/// Generation backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Provider used by specialist services (ollama, openai)
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Ollama provider settings
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// OpenAI-compatible provider settings
    #[serde(default)]
    pub openai: OpenAIConfig,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            ollama: OllamaConfig::default(),
            openai: OpenAIConfig::default(),
        }
    }
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL for Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

/// OpenAI-compatible provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// Base URL for the chat completions API
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// Environment variable holding the API key
    // Note: the key itself is never written to the config file
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            api_key_env: default_openai_key_env(),
        }
    }
}

/// Settings for running a specialist service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_weather_service")]
    pub weather: SpecialistServiceConfig,

    #[serde(default = "default_lodging_service")]
    pub lodging: SpecialistServiceConfig,
}

impl ServiceConfig {
    pub fn for_kind(&self, kind: SpecialistKind) -> &SpecialistServiceConfig {
        match kind {
            SpecialistKind::Weather => &self.weather,
            SpecialistKind::Lodging => &self.lodging,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            weather: default_weather_service(),
            lodging: default_lodging_service(),
        }
    }
}

/// One specialist service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistServiceConfig {
    /// Socket address the service binds to
    pub bind: String,

    /// URL published on the service's capability card
    pub public_url: String,

    /// Model identifier passed to the generation backend
    #[serde(default)]
    pub model: Option<String>,
}

/// Policy term lists
///
/// These are configuration artifacts: extending a list changes behavior
/// without touching the orchestration graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Terms that flag a forecast as hazardous
    #[serde(default = "default_hazard_terms")]
    pub hazard_terms: Vec<String>,

    /// Terms that mark a weather request
    #[serde(default = "default_weather_terms")]
    pub weather_terms: Vec<String>,

    /// Terms that mark a lodging request
    #[serde(default = "default_lodging_terms")]
    pub lodging_terms: Vec<String>,

    /// Terms that ask for an explicit safety check
    #[serde(default = "default_safety_terms")]
    pub safety_terms: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            hazard_terms: default_hazard_terms(),
            weather_terms: default_weather_terms(),
            lodging_terms: default_lodging_terms(),
            safety_terms: default_safety_terms(),
        }
    }
}

/// Conversation store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum turns retained per conversation
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_host_name() -> String {
    "Waypoint Host".to_string()
}

fn default_host_bind() -> String {
    "127.0.0.1:10000".to_string()
}

fn default_host_public_url() -> String {
    "http://localhost:10000".to_string()
}

fn default_weather_url() -> String {
    "http://localhost:10001".to_string()
}

fn default_lodging_url() -> String {
    "http://localhost:10002".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    250
}

fn default_max_payload_bytes() -> usize {
    64 * 1024
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_weather_service() -> SpecialistServiceConfig {
    SpecialistServiceConfig {
        bind: "127.0.0.1:10001".to_string(),
        public_url: default_weather_url(),
        model: None,
    }
}

fn default_lodging_service() -> SpecialistServiceConfig {
    SpecialistServiceConfig {
        bind: "127.0.0.1:10002".to_string(),
        public_url: default_lodging_url(),
        model: None,
    }
}

fn terms(list: &[&str]) -> Vec<String> {
    list.iter().map(|t| t.to_string()).collect()
}

fn default_hazard_terms() -> Vec<String> {
    terms(&[
        "storm",
        "warning",
        "advisory",
        "hazard",
        "flood",
        "blizzard",
        "hurricane",
        "tornado",
        "heat wave",
        "extreme heat",
        "extreme cold",
        "wildfire",
        "dangerous",
    ])
}

fn default_weather_terms() -> Vec<String> {
    terms(&[
        "weather",
        "forecast",
        "temperature",
        "rain",
        "snow",
        "storm",
        "thunderstorm",
        "wind",
        "sunny",
        "humid",
        "degrees",
    ])
}

fn default_lodging_terms() -> Vec<String> {
    terms(&[
        "airbnb",
        "stay",
        "rental",
        "lodging",
        "apartment",
        "condo",
        "cabin",
        "hotel",
        "motel",
        "hostel",
        "room",
        "accommodation",
        "bnb",
    ])
}

fn default_safety_terms() -> Vec<String> {
    terms(&["safe", "safety", "hazard", "danger", "risk", "conditions"])
}

fn default_max_turns() -> usize {
    50
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Config {
    /// Load configuration from the default location (~/.waypoint/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read or written
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default_config();

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = config;
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.waypoint/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".waypoint").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig::default(),
            host: HostConfig::default(),
            specialists: SpecialistsConfig::default(),
            llm: LLMConfig::default(),
            service: ServiceConfig::default(),
            policy: PolicyConfig::default(),
            session: SessionConfig::default(),
        }
    }

    /// Replace specialist endpoints from the environment when set
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(WEATHER_URL_ENV) {
            if !url.trim().is_empty() {
                self.specialists.weather_url = url.trim().to_string();
            }
        }
        if let Ok(url) = std::env::var(LODGING_URL_ENV) {
            if !url.trim().is_empty() {
                self.specialists.lodging_url = url.trim().to_string();
            }
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The log level or provider is unknown
    /// - A URL is not http(s)
    /// - The timeout is zero
    /// - The hazard term list is empty
    pub fn validate(&self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_providers = ["ollama", "openai"];
        if !valid_providers.contains(&self.llm.default_provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid default provider '{}'. Must be one of: {}",
                self.llm.default_provider,
                valid_providers.join(", ")
            )));
        }

        for (field, url) in [
            ("specialists.weather_url", &self.specialists.weather_url),
            ("specialists.lodging_url", &self.specialists.lodging_url),
            ("host.public_base_url", &self.host.public_base_url),
            ("service.weather.public_url", &self.service.weather.public_url),
            ("service.lodging.public_url", &self.service.lodging.public_url),
            ("llm.ollama.base_url", &self.llm.ollama.base_url),
            ("llm.openai.base_url", &self.llm.openai.base_url),
        ] {
            validate_http_url(field, url)?;
        }

        if self.specialists.timeout_secs == 0 {
            return Err(EngineError::Config(
                "specialists.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.specialists.max_payload_bytes == 0 {
            return Err(EngineError::Config(
                "specialists.max_payload_bytes must be greater than 0".to_string(),
            ));
        }

        if self.policy.hazard_terms.iter().all(|t| t.trim().is_empty()) {
            return Err(EngineError::Config(
                "policy.hazard_terms must contain at least one term".to_string(),
            ));
        }

        if self.session.max_turns < 2 {
            return Err(EngineError::Config(
                "session.max_turns must be at least 2".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_http_url(field: &str, url: &str) -> Result<(), EngineError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| EngineError::Config(format!("Invalid URL for {}: {}", field, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(EngineError::Config(format!(
            "Invalid URL scheme '{}' for {}. Must be http or https",
            other, field
        ))),
    }
}
