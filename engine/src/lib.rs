//! Roster Engine Library
//!
//! Conversational query engine over a roster of people. Used by the
//! `roster` binary and by integration tests.

/// Configuration management module
pub mod config;

/// Secret management module
pub mod secrets;

/// Database persistence module
pub mod db;

/// LLM provider abstraction layer
pub mod llm;

/// Structured query filters and fingerprints
pub mod filter;

/// Rank hierarchy and relative rank resolution
pub mod rank;

/// Free text to filter translation
pub mod translator;

/// Fingerprinted result cache
pub mod cache;

/// Resource data store abstraction
pub mod store;

/// Conversation sessions
pub mod session;

/// Per-turn state machine
pub mod orchestrator;

/// Reply templates
pub mod response;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
