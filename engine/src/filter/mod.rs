//! Filter model
//!
//! A [`Filter`] is the structured form of one resource query: locations,
//! a rank expression, skills, and the availability window. Sets are ordered
//! so two filters built from differently phrased questions compare equal,
//! and [`Filter::fingerprint`] gives the order- and case-independent cache key.

use sdk::types::AvailabilityStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Seniority constraint of a query.
///
/// Rank names are canonical hierarchy names. `Between(low, high)` always has
/// `low` strictly senior to `high`; build it through
/// [`crate::rank::RankHierarchy::between`], which swaps reversed pairs and
/// collapses equal ones to `Exact`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "op", content = "rank", rename_all = "snake_case")]
pub enum RankExpr {
    Exact(String),
    Above(String),
    Below(String),
    Between(String, String),
}

impl RankExpr {
    /// Stable lower-case form used in cache keys
    fn canonical(&self) -> String {
        match self {
            Self::Exact(r) => format!("exact:{}", r.to_lowercase()),
            Self::Above(r) => format!("above:{}", r.to_lowercase()),
            Self::Below(r) => format!("below:{}", r.to_lowercase()),
            Self::Between(low, high) => {
                format!("between:{}..{}", low.to_lowercase(), high.to_lowercase())
            }
        }
    }
}

impl fmt::Display for RankExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(r) => write!(f, "{}", r),
            Self::Above(r) => write!(f, "above {}", r),
            Self::Below(r) => write!(f, "below {}", r),
            Self::Between(low, high) => write!(f, "between {} and {}", low, high),
        }
    }
}

/// Structured query intent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub locations: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<RankExpr>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub skills: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub availability_weeks: BTreeSet<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_status: Option<AvailabilityStatus>,
}

/// Cache key derived from a filter
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.locations.insert(location.into());
        self
    }

    pub fn with_rank(mut self, rank: RankExpr) -> Self {
        self.rank = Some(rank);
        self
    }

    pub fn with_skill(mut self, skill: impl Into<String>) -> Self {
        self.skills.insert(skill.into());
        self
    }

    pub fn with_week(mut self, week: u32) -> Self {
        self.availability_weeks.insert(week);
        self
    }

    pub fn with_status(mut self, status: AvailabilityStatus) -> Self {
        self.availability_status = Some(status);
        self
    }

    /// No field populated: not a resource query
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
            && self.rank.is_none()
            && self.skills.is_empty()
            && !self.requests_availability()
    }

    /// How many of {location, rank, skill} are present
    pub fn core_field_count(&self) -> usize {
        usize::from(!self.locations.is_empty())
            + usize::from(self.rank.is_some())
            + usize::from(!self.skills.is_empty())
    }

    pub fn has_core_fields(&self) -> bool {
        self.core_field_count() > 0
    }

    pub fn requests_availability(&self) -> bool {
        !self.availability_weeks.is_empty() || self.availability_status.is_some()
    }

    /// The part of the filter the data store answers: locations, rank, skills.
    ///
    /// Availability is resolved per resource id after the fetch, so it is not
    /// part of the resource cache key.
    pub fn resource_scope(&self) -> Filter {
        Filter {
            locations: self.locations.clone(),
            rank: self.rank.clone(),
            skills: self.skills.clone(),
            availability_weeks: BTreeSet::new(),
            availability_status: None,
        }
    }

    /// Canonical serialization: lower-cased, sorted, empty fields omitted.
    ///
    /// ```
    /// use roster_engine::filter::Filter;
    ///
    /// let f = Filter::new().with_skill("Python").with_location("London").with_week(2);
    /// assert_eq!(f.canonical_key(), "loc=london;skill=python;week=2");
    /// ```
    pub fn canonical_key(&self) -> String {
        fn lowered(set: &BTreeSet<String>) -> String {
            set.iter()
                .map(|s| s.trim().to_lowercase())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect::<Vec<_>>()
                .join(",")
        }

        let mut parts = Vec::new();
        if !self.locations.is_empty() {
            parts.push(format!("loc={}", lowered(&self.locations)));
        }
        if let Some(rank) = &self.rank {
            parts.push(format!("rank={}", rank.canonical()));
        }
        if !self.skills.is_empty() {
            parts.push(format!("skill={}", lowered(&self.skills)));
        }
        if !self.availability_weeks.is_empty() {
            let weeks: Vec<String> = self
                .availability_weeks
                .iter()
                .map(|w| w.to_string())
                .collect();
            parts.push(format!("week={}", weeks.join(",")));
        }
        if let Some(status) = self.availability_status {
            parts.push(format!("status={}", status.as_str()));
        }
        parts.join(";")
    }

    /// blake3 digest of [`Filter::canonical_key`]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint(
            blake3::hash(self.canonical_key().as_bytes())
                .to_hex()
                .to_string(),
        )
    }

    /// Short human-readable summary, also sent to the LLM as prior context
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.locations.is_empty() {
            parts.push(format!("locations: {}", join(&self.locations)));
        }
        if let Some(rank) = &self.rank {
            parts.push(format!("rank: {}", rank));
        }
        if !self.skills.is_empty() {
            parts.push(format!("skills: {}", join(&self.skills)));
        }
        if !self.availability_weeks.is_empty() {
            let weeks: Vec<String> = self
                .availability_weeks
                .iter()
                .map(|w| w.to_string())
                .collect();
            parts.push(format!("weeks: {}", weeks.join(", ")));
        }
        if let Some(status) = self.availability_status {
            parts.push(format!("status: {}", status));
        }
        if parts.is_empty() {
            "no criteria".to_string()
        } else {
            parts.join("; ")
        }
    }
}

fn join(set: &BTreeSet<String>) -> String {
    set.iter().cloned().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter() {
        let filter = Filter::new();
        assert!(filter.is_empty());
        assert_eq!(filter.core_field_count(), 0);
        assert_eq!(filter.canonical_key(), "");
    }

    #[test]
    fn test_availability_only_filter_is_not_empty() {
        let filter = Filter::new().with_status(AvailabilityStatus::Unavailable);
        assert!(!filter.is_empty());
        assert!(!filter.has_core_fields());
        assert!(filter.requests_availability());
    }

    #[test]
    fn test_core_field_count() {
        let filter = Filter::new()
            .with_location("London")
            .with_location("Oslo")
            .with_skill("python")
            .with_week(3);
        assert_eq!(filter.core_field_count(), 2);
    }

    #[test]
    fn test_canonical_key_ignores_case_and_order() {
        let a = Filter::new()
            .with_location("Oslo")
            .with_location("London")
            .with_rank(RankExpr::Above("Manager".into()));
        let b = Filter::new()
            .with_location("LONDON")
            .with_location("oslo")
            .with_rank(RankExpr::Above("manager".into()));
        assert_eq!(a.canonical_key(), "loc=london,oslo;rank=above:manager");
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_distinguishes_rank_direction() {
        let above = Filter::new().with_rank(RankExpr::Above("Manager".into()));
        let below = Filter::new().with_rank(RankExpr::Below("Manager".into()));
        assert_ne!(above.fingerprint(), below.fingerprint());
    }

    #[test]
    fn test_resource_scope_drops_availability() {
        let filter = Filter::new()
            .with_location("London")
            .with_week(2)
            .with_status(AvailabilityStatus::Available);
        let scope = filter.resource_scope();
        assert!(!scope.requests_availability());
        assert_eq!(scope.fingerprint(), Filter::new().with_location("london").fingerprint());
    }

    #[test]
    fn test_summary() {
        let filter = Filter::new()
            .with_location("London")
            .with_rank(RankExpr::Between("Partner".into(), "Manager".into()))
            .with_week(2)
            .with_week(1);
        assert_eq!(
            filter.summary(),
            "locations: London; rank: between Partner and Manager; weeks: 1, 2"
        );
    }

    #[test]
    fn test_serde_omits_empty_fields() {
        let filter = Filter::new().with_skill("python");
        let json = serde_json::to_string(&filter).unwrap();
        assert_eq!(json, r#"{"skills":["python"]}"#);

        let back: Filter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, filter);
    }
}
