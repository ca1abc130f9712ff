//! Roster SDK
//!
//! Shared types and error taxonomy for the roster query engine and the
//! collaborators around it (data store, presentation layer).

/// Error types and handling
pub mod errors;

/// Roster record types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, RosterErrorExt};
pub use types::{AvailabilityRecord, AvailabilityStatus, Resource};
