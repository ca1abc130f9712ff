//! Error types and handling
//!
//! This module provides the error types shared by the roster engine and its
//! collaborators. All errors implement the `RosterErrorExt` trait which
//! provides user-friendly hints and indicates whether errors are recoverable.
//!
//! # Security
//!
//! Error messages never carry provider API keys or raw LLM payloads; the
//! hints returned by `user_hint` are static strings safe to show in a chat.

use thiserror::Error;

/// Trait for roster error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait RosterErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors degrade the current turn only; the session and the
    /// result cache stay usable. Non-recoverable errors need operator action.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Database**: SQLite operation failures
/// - **LLM Provider**: translation backend failures (always recovered by the
///   rule-based translator)
/// - **Translation**: nothing usable extracted, unknown vocabulary
/// - **Backend**: data store unreachable or too slow
/// - **Session**: turn abandoned because the session was torn down
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, RosterErrorExt};
///
/// let error = EngineError::StoreTimeout(5);
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::Config("duplicate rank".into());
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // LLM provider errors
    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    #[error("All LLM providers exhausted")]
    AllProvidersExhausted,

    #[error("LLM call timed out")]
    LLMTimeout,

    // Translation errors
    #[error("Could not extract any search criteria from the message")]
    ParseAmbiguous,

    #[error("Unknown {field}: {token}")]
    UnknownVocabulary { field: String, token: String },

    // Data store errors
    #[error("Backend {backend} unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    #[error("Data store call timed out after {0}s")]
    StoreTimeout(u64),

    // Session errors
    #[error("Session {0} was closed")]
    SessionClosed(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RosterErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Database(_) => "Database operation failed. Try importing the roster again",

            Self::LLMProvider(_) => "LLM provider unavailable. Falling back to keyword matching",
            Self::AllProvidersExhausted => "No LLM providers available. Check configuration",
            Self::LLMTimeout => "LLM provider took too long to respond",

            Self::ParseAmbiguous => {
                "Try mentioning a location, rank, skill or week, e.g. 'python developers in London'"
            }
            Self::UnknownVocabulary { .. } => "Some words were not recognised and were ignored",

            Self::BackendUnavailable { .. } => "The roster is unavailable right now. Please try again",
            Self::StoreTimeout(_) => "The roster took too long to answer. Please try again",

            Self::SessionClosed(_) => "The conversation was closed. Start a new one",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::Config(_) | Self::AllProvidersExhausted => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}
