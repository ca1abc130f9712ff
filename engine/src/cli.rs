//! CLI interface for Roster
//!
//! Defines the commands and global flags using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Roster query engine
///
/// Ask questions about who is where, at what rank, with which skills and
/// when they are available.
#[derive(Parser, Debug)]
#[command(name = "roster")]
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

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Answer a single question
    Ask {
        /// The question, e.g. "python developers in London week 2"
        text: String,

        /// Conversation id (default: "cli")
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Start an interactive conversation
    Chat {
        /// Conversation id (default: a new random id)
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Import a roster fixture (JSON) into the database
    Import {
        /// Path to the fixture file
        file: PathBuf,
    },

    /// Show LLM provider health, cache settings and roster size
    Status,

    /// Show recently answered questions
    History {
        /// Number of entries to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}
