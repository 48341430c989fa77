//! Command handlers for CLI operations
//!
//! - ask: Run one turn and print the reply
//! - chat: Interactive conversation on stdin
//! - serve: Host HTTP entry point
//! - specialist: One specialist service
//! - discover: Fetch a specialist's capability card
//! - card: Print the host's capability card

use anyhow::{Context, Result};
use sdk::card::AgentCard;
use sdk::errors::ErrorExt;
use sdk::types::SpecialistKind;
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::conductor::{Orchestrator, TurnError, TurnReply};
use crate::config::Config;
use crate::injection_detector::InjectionDetector;
use crate::llm::backend_from_config;
use crate::remote::{ClientSettings, RemoteSpecialistClient, SpecialistDirectory};
use crate::server::{self, HostState};
use crate::specialist::{self, SpecialistAdapter};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Wire the orchestrator to the configured specialists
pub fn build_orchestrator(config: &Config) -> Result<Arc<Orchestrator>> {
    // Anything the client accepts must fit through the sanitizer uncut
    let detector = Arc::new(
        InjectionDetector::new()
            .context("Failed to build sanitizer")?
            .with_max_len(config.specialists.max_payload_bytes),
    );
    let directory = SpecialistDirectory::from_config(&config.specialists, Arc::clone(&detector))
        .context("Failed to set up specialist client")?;

    tracing::info!(
        "Specialists: weather at {}, lodging at {}",
        config.specialists.weather_url,
        config.specialists.lodging_url
    );

    let orchestrator = Orchestrator::new(config, detector, Arc::new(directory))
        .context("Failed to set up orchestrator")?;
    Ok(Arc::new(orchestrator))
}

/// Run a single turn
pub async fn handle_ask(
    text: String,
    conversation: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let conversation_id = conversation.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let outcome = run_cancellable_turn(&orchestrator, &conversation_id, &text).await;
    match outcome {
        Ok(reply) => {
            print_reply(&reply, format)?;
            Ok(())
        }
        Err(e) => {
            print_turn_error(&e, format)?;
            Err(e).context("Turn did not complete")
        }
    }
}

/// Interactive conversation
///
/// Ctrl-C cancels the turn in progress; `exit`, `quit` or end of input
/// leaves the session.
pub async fn handle_chat(
    conversation: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let conversation_id = conversation.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    if let OutputFormat::Text = format {
        println!("Waypoint chat (conversation {})", conversation_id);
        println!("Ask about the weather or places to stay. Type 'exit' to quit.");
        println!();
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        if let OutputFormat::Text = format {
            stdout.write_all(b"> ").await?;
            stdout.flush().await?;
        }

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        match run_cancellable_turn(&orchestrator, &conversation_id, line).await {
            Ok(reply) => print_reply(&reply, format)?,
            Err(e) => print_turn_error(&e, format)?,
        }
    }

    Ok(())
}

/// Run a turn that Ctrl-C cancels
async fn run_cancellable_turn(
    orchestrator: &Orchestrator,
    conversation_id: &str,
    text: &str,
) -> std::result::Result<TurnReply, TurnError> {
    let cancel = CancellationToken::new();
    let turn = orchestrator.run_turn(conversation_id, text, cancel.clone(), None);
    tokio::pin!(turn);

    tokio::select! {
        outcome = &mut turn => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::debug!("Ctrl-C received, cancelling turn");
            cancel.cancel();
            turn.await
        }
    }
}

/// Serve the host entry point
pub async fn handle_serve(config: &Config) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let state = HostState::new(orchestrator, server::host_card(&config.host));

    server::serve(state, &config.host.bind)
        .await
        .context("Host server stopped with an error")
}

/// Serve one specialist domain
pub async fn handle_specialist(domain: SpecialistKind, config: &Config) -> Result<()> {
    let service = config.service.for_kind(domain);
    let backend = backend_from_config(&config.llm).context("Failed to set up generation backend")?;

    if !backend.check_health().await {
        tracing::warn!("Generation backend {} is not reachable yet", backend.name());
    }

    let detector = Arc::new(InjectionDetector::new().context("Failed to build sanitizer")?);
    let adapter = SpecialistAdapter::new(domain, backend, detector).with_model(service.model.clone());
    let card = adapter.card(&service.public_url);

    specialist::server::serve(Arc::new(adapter), card, &service.bind)
        .await
        .with_context(|| format!("{} specialist stopped with an error", domain))
}

/// Fetch and print a specialist's card
pub async fn handle_discover(url: String, config: &Config, format: OutputFormat) -> Result<()> {
    let detector = Arc::new(InjectionDetector::new().context("Failed to build sanitizer")?);
    let client = RemoteSpecialistClient::new(ClientSettings::from(&config.specialists), detector)
        .context("Failed to set up specialist client")?;

    let card = client
        .discover(&url)
        .await
        .with_context(|| format!("Failed to discover specialist at {}", url))?;

    print_card(&card, format)
}

/// Print the host's own card
pub fn handle_card(config: &Config, format: OutputFormat) -> Result<()> {
    print_card(&server::host_card(&config.host), format)
}

fn print_reply(reply: &TurnReply, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("{}", reply.text);
            println!();
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(reply)?);
        }
    }
    Ok(())
}

fn print_turn_error(error: &TurnError, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("✗ {}", error.user_hint());
            println!();
        }
        OutputFormat::Json => {
            let output = json!({
                "status": "failed",
                "error": error.to_string(),
                "hint": error.user_hint(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn print_card(card: &AgentCard, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("{} (v{})", card.name, card.version);
            println!("  {}", card.description);
            println!("  URL: {}", card.url);
            println!("  Streaming: {}", card.capabilities.streaming);
            if !card.skills.is_empty() {
                println!("  Skills:");
                for skill in &card.skills {
                    println!("    - {}: {}", skill.id, skill.description);
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(card)?);
        }
    }
    Ok(())
}
