//! Remote specialists
//!
//! [`RemoteSpecialistClient`] speaks the task protocol over HTTP.
//! [`SpecialistDirectory`] binds specialist kinds to their configured
//! endpoints and is what the orchestrator calls through the
//! [`SpecialistGateway`] trait.

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::{SpecialistKind, SpecialistRequest};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub mod client;
pub mod stream;

pub use client::{ClientSettings, RemoteSpecialistClient};
pub use stream::{SpecialistStream, StreamProducer};

use crate::config::SpecialistsConfig;
use crate::injection_detector::InjectionDetector;

/// How the orchestrator reaches specialists
///
/// Implementations return a stream that ends with exactly one terminal
/// result. Tests substitute scripted gateways.
#[async_trait]
pub trait SpecialistGateway: Send + Sync {
    async fn dispatch(&self, request: SpecialistRequest) -> SpecialistStream;
}

/// How long a failed card lookup is remembered before it is tried again
pub const DISCOVERY_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Specialist endpoints resolved from configuration
pub struct SpecialistDirectory {
    client: RemoteSpecialistClient,
    endpoints: HashMap<SpecialistKind, String>,
    prefer_streaming: bool,
    failed_discovery: Mutex<HashMap<String, Instant>>,
    discovery_retry: Duration,
}

impl SpecialistDirectory {
    pub fn new(
        client: RemoteSpecialistClient,
        endpoints: HashMap<SpecialistKind, String>,
        prefer_streaming: bool,
    ) -> Self {
        Self {
            client,
            endpoints,
            prefer_streaming,
            failed_discovery: Mutex::new(HashMap::new()),
            discovery_retry: DISCOVERY_RETRY_AFTER,
        }
    }

    pub fn with_discovery_retry(mut self, retry_after: Duration) -> Self {
        self.discovery_retry = retry_after;
        self
    }

    pub fn from_config(
        config: &SpecialistsConfig,
        detector: Arc<InjectionDetector>,
    ) -> Result<Self, EngineError> {
        let client = RemoteSpecialistClient::new(ClientSettings::from(config), detector)?;
        let endpoints = [SpecialistKind::Weather, SpecialistKind::Lodging]
            .into_iter()
            .map(|kind| (kind, config.endpoint(kind).to_string()))
            .collect();
        Ok(Self::new(client, endpoints, config.prefer_streaming))
    }

    pub fn client(&self) -> &RemoteSpecialistClient {
        &self.client
    }

    pub fn endpoint(&self, kind: SpecialistKind) -> Option<&str> {
        self.endpoints.get(&kind).map(String::as_str)
    }
}

impl SpecialistDirectory {
    /// Whether the endpoint's card advertises streaming
    ///
    /// A failed lookup counts as "no" and is not retried until
    /// `discovery_retry` has passed, so an unreachable card costs one
    /// timeout per window rather than one per call.
    async fn advertises_streaming(&self, kind: SpecialistKind, endpoint: &str) -> bool {
        if let Some(failed_at) = self.failed_discovery.lock().await.get(endpoint) {
            if failed_at.elapsed() < self.discovery_retry {
                tracing::debug!("Skipping card discovery for {} specialist", kind);
                return false;
            }
        }

        match self.client.discover(endpoint).await {
            Ok(card) => {
                self.failed_discovery.lock().await.remove(endpoint);
                card.capabilities.streaming
            }
            Err(e) => {
                tracing::warn!("Card discovery for {} specialist failed: {}", kind, e);
                self.failed_discovery
                    .lock()
                    .await
                    .insert(endpoint.to_string(), Instant::now());
                false
            }
        }
    }
}

#[async_trait]
impl SpecialistGateway for SpecialistDirectory {
    async fn dispatch(&self, request: SpecialistRequest) -> SpecialistStream {
        let kind = request.specialist;
        let Some(endpoint) = self.endpoint(kind) else {
            return SpecialistStream::from_results(
                kind,
                vec![sdk::types::SpecialistResult::failed(
                    kind,
                    sdk::errors::SpecialistError::transport("no endpoint configured"),
                )],
            );
        };

        // The card is only advisory: routing always uses the configured URL
        let advertised = self.advertises_streaming(kind, endpoint).await;
        let streaming = self.prefer_streaming && advertised;

        tracing::debug!(
            "Dispatching task {} to {} specialist (streaming: {})",
            request.task_id,
            kind,
            streaming
        );

        if streaming {
            self.client.send_streaming(endpoint, request)
        } else {
            self.client.spawn_send(endpoint, request)
        }
    }
}
