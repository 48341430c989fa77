//! HTTP client for remote specialists
//!
//! Talks to any endpoint that serves the task protocol: a capability card at
//! `/.well-known/agent.json`, blocking submission at `/tasks` and NDJSON
//! streaming at `/tasks/stream`.
//!
//! Every attempt is bounded by the configured timeout. Transient transport
//! failures (connect errors, timeouts, HTTP 5xx and 429) are retried with
//! exponential backoff; anything that looks like a misbehaving peer is a
//! `PROTOCOL_ERROR` and is never retried.

use futures::StreamExt;
use reqwest::StatusCode;
use sdk::card::{AgentCard, CARD_PATH};
use sdk::errors::{EngineError, ErrorExt, SpecialistError};
use sdk::protocol::{TaskSubmission, TaskUpdate, NDJSON_CONTENT_TYPE, TASKS_PATH, TASKS_STREAM_PATH};
use sdk::types::{SpecialistRequest, SpecialistResult, TransportMeta};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::stream::{SpecialistStream, StreamProducer, STREAM_CAPACITY};
use crate::config::SpecialistsConfig;
use crate::injection_detector::InjectionDetector;

const MAX_CARD_NAME: usize = 256;
const MAX_CARD_DESCRIPTION: usize = 4096;
const MAX_CARD_SKILLS: usize = 32;

/// Transport settings for specialist calls
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub max_payload_bytes: usize,
}

impl From<&SpecialistsConfig> for ClientSettings {
    fn from(config: &SpecialistsConfig) -> Self {
        Self {
            timeout: config.timeout(),
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff(),
            max_payload_bytes: config.max_payload_bytes,
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::from(&SpecialistsConfig::default())
    }
}

/// One failed attempt
#[derive(Debug)]
struct AttemptError {
    error: SpecialistError,
    http_status: Option<u16>,
}

impl AttemptError {
    fn new(error: SpecialistError) -> Self {
        Self {
            error,
            http_status: None,
        }
    }

    fn with_status(mut self, status: StatusCode) -> Self {
        self.http_status = Some(status.as_u16());
        self
    }
}

/// Client for remote specialist endpoints
///
/// Cheap to clone; clones share the HTTP connection pool and card cache.
#[derive(Clone)]
pub struct RemoteSpecialistClient {
    http: reqwest::Client,
    settings: ClientSettings,
    detector: Arc<InjectionDetector>,
    cards: Arc<RwLock<HashMap<String, AgentCard>>>,
}

impl RemoteSpecialistClient {
    pub fn new(
        settings: ClientSettings,
        detector: Arc<InjectionDetector>,
    ) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| EngineError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            settings,
            detector,
            cards: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Fetch and validate a specialist's capability card
    ///
    /// Successful lookups are cached per endpoint for the life of the
    /// process. Text fields are sanitized before caching.
    pub async fn discover(&self, endpoint: &str) -> Result<AgentCard, SpecialistError> {
        let key = normalize(endpoint);
        if let Some(card) = self.cards.read().await.get(&key) {
            return Ok(card.clone());
        }

        let url = format!("{}{}", key, CARD_PATH);
        tracing::debug!("Discovering specialist card at {}", url);

        let body = tokio::time::timeout(self.settings.timeout, async {
            let response = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| AttemptError::new(map_reqwest_error(e)))?;
            let status = response.status();
            check_status(status)?;
            read_limited(response, self.settings.max_payload_bytes)
                .await
                .map_err(|e| e.with_status(status))
        })
        .await
        .map_err(|_| {
            SpecialistError::timeout(format!(
                "card not returned within {}s",
                self.settings.timeout.as_secs()
            ))
        })?
        .map_err(|e| e.error)?;

        let card: AgentCard = serde_json::from_slice(&body)
            .map_err(|e| SpecialistError::protocol(format!("invalid capability card: {}", e)))?;
        let card = self.validate_card(card)?;

        tracing::info!(
            "Discovered specialist '{}' at {} (streaming: {})",
            card.name,
            key,
            card.capabilities.streaming
        );

        self.cards.write().await.insert(key, card.clone());
        Ok(card)
    }

    fn validate_card(&self, mut card: AgentCard) -> Result<AgentCard, SpecialistError> {
        if card.name.len() > MAX_CARD_NAME
            || card.description.len() > MAX_CARD_DESCRIPTION
            || card.skills.len() > MAX_CARD_SKILLS
        {
            return Err(SpecialistError::protocol("capability card fields too large"));
        }

        card.name = self.detector.clean(&card.name);
        if card.name.is_empty() {
            return Err(SpecialistError::protocol("capability card has no name"));
        }
        card.description = self.detector.clean(&card.description);
        for skill in &mut card.skills {
            skill.name = self.detector.clean(&skill.name);
            skill.description = self.detector.clean(&skill.description);
        }
        Ok(card)
    }

    /// Name of the cached card for an endpoint, if discovered
    async fn card_name(&self, endpoint: &str) -> Option<String> {
        self.cards
            .read()
            .await
            .get(&normalize(endpoint))
            .map(|card| card.name.clone())
    }

    /// Submit a task and wait for its terminal result
    ///
    /// Never fails: transport and protocol problems come back as a `FAILED`
    /// result, and cancellation as `CANCELLED`.
    pub async fn send(
        &self,
        endpoint: &str,
        request: &SpecialistRequest,
        cancel: &CancellationToken,
    ) -> SpecialistResult {
        let kind = request.specialist;
        let url = format!("{}{}", normalize(endpoint), TASKS_PATH);
        let submission = TaskSubmission::from(request);
        let mut meta = TransportMeta {
            card_name: self.card_name(endpoint).await,
            ..TransportMeta::default()
        };

        loop {
            meta.attempts += 1;
            let start = Instant::now();

            let attempt = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Task {} cancelled during attempt {}", request.task_id, meta.attempts);
                    return SpecialistResult::cancelled(kind).with_meta(meta);
                }
                attempt = tokio::time::timeout(
                    self.settings.timeout,
                    self.post_task(&url, &submission),
                ) => attempt,
            };

            let attempt = attempt.unwrap_or_else(|_| {
                Err(AttemptError::new(SpecialistError::timeout(format!(
                    "no response within {}s",
                    self.settings.timeout.as_secs()
                ))))
            });

            tracing::info!(
                "{} specialist at {} attempt {} finished in {:.2}s",
                kind,
                url,
                meta.attempts,
                start.elapsed().as_secs_f64()
            );

            match attempt {
                Ok((update, status)) => {
                    meta.http_status = Some(status);
                    let result = match self.check_update(&update, request) {
                        Ok(()) if update.state.is_terminal() => update.into_result(kind),
                        Ok(()) => SpecialistResult::failed(
                            kind,
                            SpecialistError::protocol("final response was not in a terminal state"),
                        ),
                        Err(e) => SpecialistResult::failed(kind, e),
                    };
                    return result.with_meta(meta);
                }
                Err(failure) => {
                    meta.http_status = failure.http_status;
                    if !self.should_retry(&failure.error, meta.attempts) {
                        tracing::warn!(
                            "{} specialist call failed after {} attempt(s): {}",
                            kind,
                            meta.attempts,
                            failure.error
                        );
                        return SpecialistResult::failed(kind, failure.error).with_meta(meta);
                    }

                    let delay = self.backoff(meta.attempts);
                    tracing::warn!(
                        "{} specialist attempt {} failed ({}), retrying in {}ms",
                        kind,
                        meta.attempts,
                        failure.error.kind,
                        delay.as_millis()
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return SpecialistResult::cancelled(kind).with_meta(meta);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Submit a task in the background and expose its result as a stream
    ///
    /// The stream yields exactly one terminal result.
    pub fn spawn_send(&self, endpoint: &str, request: SpecialistRequest) -> SpecialistStream {
        let (producer, stream) = SpecialistStream::channel(request.specialist, 1);
        let client = self.clone();
        let endpoint = endpoint.to_string();

        tokio::spawn(async move {
            let token = producer.token();
            let result = client.send(&endpoint, &request, &token).await;
            producer.send(result).await;
        });

        stream
    }

    /// Submit a task to the streaming endpoint
    ///
    /// Partial updates are forwarded as they arrive; the stream ends with one
    /// terminal result. Retries happen only before the first update has been
    /// delivered. Dropping or cancelling the returned stream aborts the HTTP
    /// request.
    pub fn send_streaming(&self, endpoint: &str, request: SpecialistRequest) -> SpecialistStream {
        let (producer, stream) = SpecialistStream::channel(request.specialist, STREAM_CAPACITY);
        let client = self.clone();
        let endpoint = endpoint.to_string();

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = producer.cancelled() => {
                    tracing::debug!("Streaming task {} cancelled", request.task_id);
                    return;
                }
                result = client.stream_with_retries(&endpoint, &request, &producer) => result,
            };
            producer.send(result).await;
        });

        stream
    }

    async fn stream_with_retries(
        &self,
        endpoint: &str,
        request: &SpecialistRequest,
        producer: &StreamProducer,
    ) -> SpecialistResult {
        let kind = request.specialist;
        let url = format!("{}{}", normalize(endpoint), TASKS_STREAM_PATH);
        let submission = TaskSubmission::from(request);
        let mut meta = TransportMeta {
            card_name: self.card_name(endpoint).await,
            streamed: true,
            ..TransportMeta::default()
        };
        let mut delivered = 0usize;

        loop {
            meta.attempts += 1;
            let start = Instant::now();

            let attempt = tokio::time::timeout(
                self.settings.timeout,
                self.stream_once(&url, &submission, request, producer, &mut delivered, &mut meta),
            )
            .await
            .unwrap_or_else(|_| {
                Err(AttemptError::new(SpecialistError::timeout(format!(
                    "stream did not finish within {}s",
                    self.settings.timeout.as_secs()
                ))))
            });

            tracing::info!(
                "{} specialist stream at {} attempt {} finished in {:.2}s",
                kind,
                url,
                meta.attempts,
                start.elapsed().as_secs_f64()
            );

            match attempt {
                Ok(result) => return result.with_meta(meta),
                Err(failure) => {
                    if failure.http_status.is_some() {
                        meta.http_status = failure.http_status;
                    }
                    if delivered > 0 || !self.should_retry(&failure.error, meta.attempts) {
                        tracing::warn!(
                            "{} specialist stream failed after {} attempt(s): {}",
                            kind,
                            meta.attempts,
                            failure.error
                        );
                        return SpecialistResult::failed(kind, failure.error).with_meta(meta);
                    }

                    let delay = self.backoff(meta.attempts);
                    tracing::warn!(
                        "{} specialist stream attempt {} failed ({}), retrying in {}ms",
                        kind,
                        meta.attempts,
                        failure.error.kind,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn stream_once(
        &self,
        url: &str,
        submission: &TaskSubmission,
        request: &SpecialistRequest,
        producer: &StreamProducer,
        delivered: &mut usize,
        meta: &mut TransportMeta,
    ) -> Result<SpecialistResult, AttemptError> {
        let response = self
            .http
            .post(url)
            .header(reqwest::header::ACCEPT, NDJSON_CONTENT_TYPE)
            .json(submission)
            .send()
            .await
            .map_err(|e| AttemptError::new(map_reqwest_error(e)))?;

        let status = response.status();
        check_status(status)?;
        meta.http_status = Some(status.as_u16());

        let max = self.settings.max_payload_bytes;
        let mut body = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        loop {
            let chunk = body.next().await;
            let finished = chunk.is_none();
            if let Some(chunk) = chunk {
                let chunk = chunk.map_err(|e| AttemptError::new(map_reqwest_error(e)))?;
                buffer.extend_from_slice(&chunk);
            }

            let mut lines: Vec<Vec<u8>> = Vec::new();
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                lines.push(buffer.drain(..=pos).collect());
            }
            if finished && !buffer.is_empty() {
                lines.push(std::mem::take(&mut buffer));
            }
            if buffer.len() > max {
                return Err(AttemptError::new(SpecialistError::protocol(
                    "stream line exceeds the payload limit",
                )));
            }

            for line in lines {
                let line = trim_ascii(&line);
                if line.is_empty() {
                    continue;
                }
                if line.len() > max {
                    return Err(AttemptError::new(SpecialistError::protocol(
                        "stream line exceeds the payload limit",
                    )));
                }
                let update: TaskUpdate = serde_json::from_slice(line).map_err(|e| {
                    AttemptError::new(SpecialistError::protocol(format!(
                        "malformed stream update: {}",
                        e
                    )))
                })?;
                self.check_update(&update, request)
                    .map_err(AttemptError::new)?;

                if update.state.is_terminal() {
                    return Ok(update.into_result(request.specialist));
                }

                let partial = update
                    .into_result(request.specialist)
                    .with_meta(meta.clone());
                *delivered += 1;
                if !producer.send(partial).await {
                    return Ok(SpecialistResult::cancelled(request.specialist));
                }
            }

            if finished {
                return Err(AttemptError::new(SpecialistError::protocol(
                    "stream ended before a terminal update",
                )));
            }
        }
    }

    async fn post_task(
        &self,
        url: &str,
        submission: &TaskSubmission,
    ) -> Result<(TaskUpdate, u16), AttemptError> {
        let response = self
            .http
            .post(url)
            .json(submission)
            .send()
            .await
            .map_err(|e| AttemptError::new(map_reqwest_error(e)))?;

        let status = response.status();
        check_status(status)?;

        let body = read_limited(response, self.settings.max_payload_bytes)
            .await
            .map_err(|e| e.with_status(status))?;

        let update: TaskUpdate = serde_json::from_slice(&body).map_err(|e| {
            AttemptError::new(SpecialistError::protocol(format!(
                "malformed task response: {}",
                e
            )))
            .with_status(status)
        })?;

        Ok((update, status.as_u16()))
    }

    fn check_update(
        &self,
        update: &TaskUpdate,
        request: &SpecialistRequest,
    ) -> Result<(), SpecialistError> {
        if update.task_id != request.task_id {
            return Err(SpecialistError::protocol(format!(
                "response for task '{}' does not match task '{}'",
                truncate(&update.task_id, 64),
                request.task_id
            )));
        }
        if update.text.len() > self.settings.max_payload_bytes {
            return Err(SpecialistError::protocol("payload exceeds the size limit"));
        }
        Ok(())
    }

    fn should_retry(&self, error: &SpecialistError, attempts: u32) -> bool {
        error.is_retryable() && attempts <= self.settings.max_retries
    }

    fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(16);
        self.settings.retry_backoff.saturating_mul(1u32 << exponent)
    }
}

fn normalize(endpoint: &str) -> String {
    endpoint.trim().trim_end_matches('/').to_string()
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |p| p + 1);
    &bytes[start..end]
}

fn map_reqwest_error(err: reqwest::Error) -> SpecialistError {
    if err.is_timeout() {
        SpecialistError::timeout(err.to_string())
    } else {
        SpecialistError::transport(err.to_string())
    }
}

fn check_status(status: StatusCode) -> Result<(), AttemptError> {
    if status.is_success() {
        Ok(())
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(
            AttemptError::new(SpecialistError::transport(format!("peer returned {}", status)))
                .with_status(status),
        )
    } else {
        Err(
            AttemptError::new(SpecialistError::protocol(format!(
                "unexpected status {}",
                status
            )))
            .with_status(status),
        )
    }
}

async fn read_limited(
    mut response: reqwest::Response,
    max_bytes: usize,
) -> Result<Vec<u8>, AttemptError> {
    if response.content_length().is_some_and(|len| len as usize > max_bytes) {
        return Err(AttemptError::new(SpecialistError::protocol(
            "response exceeds the payload limit",
        )));
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| AttemptError::new(map_reqwest_error(e)))?
    {
        body.extend_from_slice(&chunk);
        if body.len() > max_bytes {
            return Err(AttemptError::new(SpecialistError::protocol(
                "response exceeds the payload limit",
            )));
        }
    }
    Ok(body)
}
