//! Response assembly
//!
//! Deterministic text templates over a filter, the matched resources and
//! their availability. Nothing here performs I/O.

use crate::filter::Filter;
use crate::rank::RankHierarchy;
use crate::store::AvailabilityMap;
use sdk::errors::{EngineError, RosterErrorExt};
use sdk::types::Resource;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;

/// Default number of resources listed by name
pub const DEFAULT_LISTING_LIMIT: usize = 10;

/// A filter field that can be relaxed after an empty result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelaxField {
    Status,
    Weeks,
    Skills,
    Rank,
    Locations,
}

impl fmt::Display for RelaxField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Status => "availability status",
            Self::Weeks => "weeks",
            Self::Skills => "skills",
            Self::Rank => "rank",
            Self::Locations => "locations",
        };
        f.write_str(s)
    }
}

pub struct ResponseAssembler {
    hierarchy: Arc<RankHierarchy>,
    listing_limit: usize,
}

impl ResponseAssembler {
    pub fn new(hierarchy: Arc<RankHierarchy>) -> Self {
        Self {
            hierarchy,
            listing_limit: DEFAULT_LISTING_LIMIT,
        }
    }

    pub fn with_listing_limit(mut self, limit: usize) -> Self {
        self.listing_limit = limit.max(1);
        self
    }

    /// Reply for a resolved turn
    pub fn answer(
        &self,
        filter: &Filter,
        resources: &[Resource],
        availability: Option<&AvailabilityMap>,
    ) -> String {
        if resources.is_empty() {
            return self.empty(filter);
        }

        let mut out = String::new();
        let noun = if resources.len() == 1 { "resource" } else { "resources" };
        let _ = writeln!(
            out,
            "Found {} {} matching {}.",
            resources.len(),
            noun,
            filter.summary()
        );

        let mut by_location: BTreeMap<&str, usize> = BTreeMap::new();
        let mut by_rank: BTreeMap<&str, usize> = BTreeMap::new();
        for r in resources {
            *by_location.entry(r.location.as_str()).or_default() += 1;
            *by_rank.entry(r.rank_name.as_str()).or_default() += 1;
        }

        let _ = writeln!(out, "By location: {}", counts(by_location.into_iter()));

        // Senior ranks first; names outside the hierarchy go last
        let mut ranks: Vec<(&str, usize)> = by_rank.into_iter().collect();
        ranks.sort_by_key(|(name, _)| self.hierarchy.position(name).unwrap_or(usize::MAX));
        let _ = writeln!(out, "By rank: {}", counts(ranks.into_iter()));

        for r in resources.iter().take(self.listing_limit) {
            let _ = write!(
                out,
                "- {} ({}), {}, {}",
                r.name, r.employee_number, r.rank_name, r.location
            );
            if !r.skills.is_empty() {
                let _ = write!(out, ". Skills: {}", r.skills.join(", "));
            }
            if let Some(records) = availability.and_then(|a| a.get(&r.id)) {
                for rec in records {
                    let _ = write!(
                        out,
                        " | week {}: {} ({}h)",
                        rec.week_number, rec.status, rec.hours
                    );
                    if let Some(notes) = rec.notes.as_deref().filter(|n| !n.is_empty()) {
                        let _ = write!(out, " {}", notes);
                    }
                }
            } else if availability.is_some() {
                out.push_str(" | no availability recorded");
            }
            out.push('\n');
        }

        if resources.len() > self.listing_limit {
            let _ = writeln!(out, "...and {} more.", resources.len() - self.listing_limit);
        }

        out.trim_end().to_string()
    }

    /// Reply for an empty result, suggesting which criterion to relax
    pub fn empty(&self, filter: &Filter) -> String {
        match self.relax_suggestion(filter) {
            Some(field) => format!(
                "No resources found for {}. Try relaxing the {} criterion.",
                filter.summary(),
                field
            ),
            None => "No resources found.".to_string(),
        }
    }

    /// The populated field with the fewest values.
    ///
    /// Ties go to the first of status, weeks, skills, rank, locations.
    pub fn relax_suggestion(&self, filter: &Filter) -> Option<RelaxField> {
        let candidates = [
            (
                RelaxField::Status,
                filter.availability_status.map(|_| 1),
            ),
            (
                RelaxField::Weeks,
                non_zero(filter.availability_weeks.len()),
            ),
            (RelaxField::Skills, non_zero(filter.skills.len())),
            (
                RelaxField::Rank,
                filter
                    .rank
                    .as_ref()
                    .map(|expr| self.hierarchy.resolve(expr).len()),
            ),
            (RelaxField::Locations, non_zero(filter.locations.len())),
        ];

        let mut best: Option<(RelaxField, usize)> = None;
        for (field, size) in candidates {
            let Some(size) = size else { continue };
            if best.map_or(true, |(_, b)| size < b) {
                best = Some((field, size));
            }
        }
        best.map(|(field, _)| field)
    }

    /// Reply when the message contained no search criteria
    pub fn clarification(&self) -> String {
        format!(
            "I couldn't find anything to search for in that message. {}.",
            EngineError::ParseAmbiguous.user_hint()
        )
    }

    /// Reply when a backend failed; the conversation is unchanged
    pub fn degraded(&self, error: &EngineError) -> String {
        format!(
            "Sorry, I couldn't look that up. {}.",
            error.user_hint().trim_end_matches('.')
        )
    }
}

fn non_zero(n: usize) -> Option<usize> {
    (n > 0).then_some(n)
}

fn counts<'a>(items: impl Iterator<Item = (&'a str, usize)>) -> String {
    items
        .map(|(name, n)| format!("{} ({})", name, n))
        .collect::<Vec<_>>()
        .join(", ")
}
