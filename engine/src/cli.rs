//! CLI interface for Waypoint
//!
//! Command-line interface built with clap's derive API. One binary runs the
//! host, either specialist service, or a one-off turn from the terminal.

use clap::{Parser, Subcommand};
use sdk::types::SpecialistKind;
use std::path::PathBuf;

/// Waypoint travel assistant
///
/// Routes weather and lodging requests to specialist services and pauses
/// lodging recommendations when the forecast is hazardous.
#[derive(Parser, Debug)]
#[command(name = "waypoint")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a single turn and print the reply
    Ask {
        /// What to ask
        text: String,

        /// Conversation to continue
        #[arg(short, long)]
        conversation: Option<String>,
    },

    /// Interactive conversation on stdin (Ctrl-C cancels the current turn)
    Chat {
        /// Conversation id to use
        #[arg(short, long)]
        conversation: Option<String>,
    },

    /// Serve the host HTTP entry point
    Serve,

    /// Serve a specialist
    Specialist {
        /// Specialist domain (weather, lodging)
        #[arg(short, long)]
        domain: SpecialistKind,
    },

    /// Fetch and print a specialist's capability card
    Discover {
        /// Base URL of the specialist
        url: String,
    },

    /// Print the host's capability card
    Card,
}
