//! Follow-up classification and merge

use crate::filter::Filter;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a turn relates to the conversation so far
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    /// Nothing extractable; answered with a clarification
    NotResourceQuery,
    /// Replaces whatever the session asked before
    Fresh,
    /// Refines the previous filter
    FollowUp,
}

impl fmt::Display for TurnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotResourceQuery => "not_resource_query",
            Self::Fresh => "fresh",
            Self::FollowUp => "follow_up",
        };
        f.write_str(s)
    }
}

/// Classify a candidate filter.
///
/// An empty candidate is never a resource query, prior context or not. A
/// candidate with fewer than `threshold` of {location, rank, skill} refines
/// the prior filter when there is one.
pub fn classify(candidate: &Filter, prior: Option<&Filter>, threshold: usize) -> TurnKind {
    if candidate.is_empty() {
        return TurnKind::NotResourceQuery;
    }
    match prior {
        Some(_) if candidate.core_field_count() < threshold => TurnKind::FollowUp,
        _ => TurnKind::Fresh,
    }
}

/// Field-wise merge: populated candidate fields override, empty ones carry
/// the prior value over unchanged.
pub fn merge(candidate: &Filter, prior: &Filter) -> Filter {
    Filter {
        locations: if candidate.locations.is_empty() {
            prior.locations.clone()
        } else {
            candidate.locations.clone()
        },
        rank: candidate.rank.clone().or_else(|| prior.rank.clone()),
        skills: if candidate.skills.is_empty() {
            prior.skills.clone()
        } else {
            candidate.skills.clone()
        },
        availability_weeks: if candidate.availability_weeks.is_empty() {
            prior.availability_weeks.clone()
        } else {
            candidate.availability_weeks.clone()
        },
        availability_status: candidate.availability_status.or(prior.availability_status),
    }
}
