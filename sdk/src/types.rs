//! Roster record types
//!
//! Read-only projections of the data store's records. The engine never
//! mutates them; the store hands them out and the cache shares them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A person on the roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub employee_number: String,
    pub location: String,
    pub rank_name: String,
    #[serde(default)]
    pub skills: Vec<String>,
}

impl Resource {
    /// Case-insensitive skill check
    pub fn has_skill(&self, skill: &str) -> bool {
        self.skills.iter().any(|s| s.eq_ignore_ascii_case(skill))
    }
}

/// Availability of one resource in one week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityRecord {
    pub week_number: u32,
    pub status: AvailabilityStatus,
    #[serde(default)]
    pub hours: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Weekly availability status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityStatus {
    Available,
    Partial,
    Unavailable,
}

impl AvailabilityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Partial => "partial",
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for AvailabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a status string is outside the known set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown availability status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for AvailabilityStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "available" | "free" => Ok(Self::Available),
            "partial" | "partially available" => Ok(Self::Partial),
            "unavailable" | "not available" | "busy" => Ok(Self::Unavailable),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
