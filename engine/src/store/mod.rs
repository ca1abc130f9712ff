//! Resource store abstraction
//!
//! The engine reads roster data through [`ResourceStore`]. Queries are plain
//! equality/containment predicates: a resource matches when its location is
//! one of `locations`, its rank one of `ranks`, and it has every skill in
//! `skills`. Empty predicate sets do not constrain.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryResourceStore;
pub use sqlite::SqliteResourceStore;

use crate::filter::Filter;
use crate::rank::RankHierarchy;
use async_trait::async_trait;
use sdk::types::{AvailabilityRecord, Resource};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store query failed: {0}")]
    Query(String),

    #[error("invalid data in store: {0}")]
    InvalidData(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::Unavailable(err.to_string()),
            other => Self::Query(other.to_string()),
        }
    }
}

/// Availability records per resource id
pub type AvailabilityMap = HashMap<String, Vec<AvailabilityRecord>>;

/// A resolved, store-ready query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceQuery {
    /// Lower-cased location names
    pub locations: BTreeSet<String>,
    /// Lower-cased canonical rank names
    pub ranks: BTreeSet<String>,
    /// Lower-cased skills, all required
    pub skills: BTreeSet<String>,
    pub limit: usize,
}

impl ResourceQuery {
    /// Resolve a filter's resource scope against the hierarchy.
    ///
    /// Returns `None` when the rank expression admits no rank at all, in
    /// which case nothing can match and the store need not be asked.
    pub fn from_filter(filter: &Filter, hierarchy: &RankHierarchy, limit: usize) -> Option<Self> {
        let ranks = match &filter.rank {
            Some(expr) => {
                let ranks = hierarchy.resolve(expr);
                if ranks.is_empty() {
                    return None;
                }
                ranks.iter().map(|r| r.to_lowercase()).collect()
            }
            None => BTreeSet::new(),
        };

        Some(Self {
            locations: filter.locations.iter().map(|l| l.to_lowercase()).collect(),
            ranks,
            skills: filter.skills.iter().map(|s| s.to_lowercase()).collect(),
            limit,
        })
    }

    pub fn matches(&self, resource: &Resource) -> bool {
        (self.locations.is_empty() || self.locations.contains(&resource.location.to_lowercase()))
            && (self.ranks.is_empty() || self.ranks.contains(&resource.rank_name.to_lowercase()))
            && self.skills.iter().all(|s| resource.has_skill(s))
    }
}

/// Read access to roster data
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Resources matching the query, ordered by name, at most `query.limit`
    async fn find_resources(&self, query: &ResourceQuery) -> Result<Vec<Resource>, StoreError>;

    /// Availability of the given resources. An empty `weeks` set returns every
    /// recorded week. Resources without records are absent from the map.
    async fn availability(
        &self,
        ids: &[String],
        weeks: &BTreeSet<u32>,
    ) -> Result<AvailabilityMap, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RanksConfig;
    use crate::filter::RankExpr;

    fn hierarchy() -> RankHierarchy {
        RankHierarchy::from_config(&RanksConfig::default()).unwrap()
    }

    fn resource(location: &str, rank: &str, skills: &[&str]) -> Resource {
        Resource {
            id: "r".to_string(),
            name: "Someone".to_string(),
            employee_number: "E1".to_string(),
            location: location.to_string(),
            rank_name: rank.to_string(),
            skills: skills.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_from_filter_resolves_ranks() {
        let filter = Filter::new()
            .with_location("London")
            .with_rank(RankExpr::Above("Consulting Director".into()));
        let query = ResourceQuery::from_filter(&filter, &hierarchy(), 50).unwrap();

        assert_eq!(query.locations, ["london".to_string()].into_iter().collect());
        assert_eq!(
            query.ranks,
            ["partner".to_string(), "associate partner".to_string()]
                .into_iter()
                .collect()
        );
        assert_eq!(query.limit, 50);
    }

    #[test]
    fn test_empty_rank_resolution_short_circuits() {
        let filter = Filter::new().with_rank(RankExpr::Above("Partner".into()));
        assert!(ResourceQuery::from_filter(&filter, &hierarchy(), 50).is_none());
    }

    #[test]
    fn test_matches_requires_every_skill() {
        let filter = Filter::new().with_skill("python").with_skill("rust");
        let query = ResourceQuery::from_filter(&filter, &hierarchy(), 50).unwrap();

        assert!(query.matches(&resource("Oslo", "Analyst", &["Python", "rust", "sql"])));
        assert!(!query.matches(&resource("Oslo", "Analyst", &["python"])));
    }

    #[test]
    fn test_matches_location_case_insensitive() {
        let filter = Filter::new().with_location("New York");
        let query = ResourceQuery::from_filter(&filter, &hierarchy(), 50).unwrap();
        assert!(query.matches(&resource("new york", "Partner", &[])));
        assert!(!query.matches(&resource("Chicago", "Partner", &[])));
    }
}
