//! Waypoint Engine Library
//!
//! Host orchestration, specialist services and their shared plumbing.
//! Used by the `waypoint` binary and the integration tests.

/// Configuration management module
pub mod config;

/// Untrusted-content sanitizer
pub mod injection_detector;

/// Generation backends used by specialist services
pub mod llm;

/// Intent classification and hazard policy
pub mod policy;

/// Remote specialist client
pub mod remote;

/// Specialist service adapter and its HTTP surface
pub mod specialist;

/// Conversation store
pub mod session;

/// Per-turn orchestration graph
pub mod conductor;

/// Host HTTP entry point
pub mod server;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
