//! Rule-based translation
//!
//! Deterministic keyword and regex extraction. Matching runs in a fixed
//! order and every consumed span is blanked out before the next pass, so a
//! skill such as "Product Manager" never also yields the rank synonym
//! "manager", and "more senior than X" never yields the rank "senior".
//!
//! Order: locations, skills, relative rank phrases, exact ranks, weeks,
//! availability status. A bare "available" only sets a status when no week
//! was asked for, since "available week 2" asks about week 2 in general.

use crate::filter::{Filter, RankExpr};
use crate::rank::{Direction, RankHierarchy};
use crate::translator::vocabulary::Vocabulary;
use regex::Regex;
use sdk::errors::EngineError;
use sdk::types::AvailabilityStatus;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, warn};

/// Week numbers outside this range are dropped
pub const WEEK_RANGE: std::ops::RangeInclusive<u32> = 1..=53;

const ABOVE_PHRASES: &[&str] = &[
    "above",
    "higher than",
    "more senior than",
    "senior to",
    "over",
];

const BELOW_PHRASES: &[&str] = &[
    "below",
    "lower than",
    "more junior than",
    "junior to",
    "under",
];

pub struct RuleExtractor {
    vocabulary: Arc<Vocabulary>,
    hierarchy: Arc<RankHierarchy>,
    location_re: Regex,
    skill_re: Regex,
    rank_re: Regex,
    relative_re: Regex,
    between_re: Regex,
    week_range_res: Vec<Regex>,
    week_list_re: Regex,
    number_re: Regex,
    unavailable_re: Regex,
    partial_re: Regex,
    available_re: Regex,
    bare_available_re: Regex,
}

impl RuleExtractor {
    pub fn new(
        vocabulary: Arc<Vocabulary>,
        hierarchy: Arc<RankHierarchy>,
    ) -> Result<Self, EngineError> {
        let locations = alternation(vocabulary.location_surfaces());
        let skills = alternation(vocabulary.skill_surfaces());
        let ranks = alternation(hierarchy.surface_forms().iter().map(String::as_str));

        let relative_phrases = alternation(ABOVE_PHRASES.iter().chain(BELOW_PHRASES).copied());
        let article = r"(?:(?:an?|the)\s+)?";

        Ok(Self {
            location_re: compile(&format!(r"(?i)\b({})\b", locations))?,
            skill_re: compile(&format!(r"(?i)\b({})(?:e?s)?\b", skills))?,
            rank_re: compile(&format!(r"(?i)\b({})(?:e?s)?\b", ranks))?,
            relative_re: compile(&format!(
                r"(?i)\b({})\s+{}({})(?:e?s)?\b",
                relative_phrases, article, ranks
            ))?,
            between_re: compile(&format!(
                r"(?i)\bbetween\s+{a}({r})(?:e?s)?\s+and\s+{a}({r})(?:e?s)?\b",
                a = article,
                r = ranks
            ))?,
            week_range_res: vec![
                compile(r"(?i)\bbetween\s+weeks?\s*(\d{1,3})\s+and\s+(?:weeks?\s*)?(\d{1,3})\b")?,
                compile(
                    r"(?i)\b(?:from\s+)?weeks?\s*(\d{1,3})\s*(?:-|–|to|through|until|till)\s*(?:weeks?\s*)?(\d{1,3})\b",
                )?,
            ],
            week_list_re: compile(
                r"(?i)\bweeks?\s*(\d{1,3}(?:\s*(?:,|and|&|or|/)\s*(?:weeks?\s*)?\d{1,3})*)\b",
            )?,
            number_re: compile(r"\d+")?,
            unavailable_re: compile(r"(?i)\b(?:unavailable|not\s+available|busy|booked)\b")?,
            partial_re: compile(r"(?i)\bpartial(?:ly)?\b")?,
            available_re: compile(
                r"(?i)\b(?:fully\s+available|free\s+(?:in|on|during|for|from|between|next|this|people|resources|consultants|staff|ones)\b|(?:is|are|am|be|being|'s)\s+free\b|free\s*(?:\?|$))",
            )?,
            bare_available_re: compile(r"(?i)\bavailable\b")?,
            vocabulary,
            hierarchy,
        })
    }

    /// Extract a candidate filter from raw text
    pub fn extract(&self, text: &str) -> Filter {
        let mut work = text.to_string();
        let mut filter = Filter::new();

        let mut consumed = Vec::new();
        for caps in self.location_re.captures_iter(&work) {
            if let (Some(whole), Some(token)) = (caps.get(0), caps.get(1)) {
                if let Some(locations) = self.vocabulary.resolve_location(token.as_str()) {
                    filter.locations.extend(locations);
                    consumed.push(whole.range());
                }
            }
        }
        mask(&mut work, consumed);

        let mut consumed = Vec::new();
        for caps in self.skill_re.captures_iter(&work) {
            if let (Some(whole), Some(token)) = (caps.get(0), caps.get(1)) {
                if let Some(skill) = self.vocabulary.resolve_skill(token.as_str()) {
                    filter.skills.insert(skill);
                    consumed.push(whole.range());
                }
            }
        }
        mask(&mut work, consumed);

        filter.rank = self.extract_rank(&mut work);

        self.extract_weeks(&mut work, &mut filter);
        filter.availability_status =
            self.extract_status(&work, filter.availability_weeks.is_empty());

        debug!("Rule-based extraction: {}", filter.summary());
        filter
    }

    fn extract_rank(&self, work: &mut String) -> Option<RankExpr> {
        if let Some(caps) = self.between_re.captures(work) {
            if let (Some(whole), Some(a), Some(b)) = (caps.get(0), caps.get(1), caps.get(2)) {
                let range = whole.range();
                match self.hierarchy.between(a.as_str(), b.as_str()) {
                    Ok(expr) => {
                        mask(work, vec![range]);
                        return Some(expr);
                    }
                    Err(e) => warn!("Dropping rank range: {}", e),
                }
            }
        }

        if let Some(caps) = self.relative_re.captures(work) {
            if let (Some(whole), Some(phrase), Some(token)) = (caps.get(0), caps.get(1), caps.get(2))
            {
                let direction = direction_of(phrase.as_str());
                let range = whole.range();
                match self.hierarchy.expr(Some(direction), token.as_str()) {
                    Ok(expr) => {
                        mask(work, vec![range]);
                        return Some(expr);
                    }
                    Err(e) => warn!("Dropping relative rank: {}", e),
                }
            }
        }

        // (is canonical name, expression) for every exact rank mention
        let exact: Vec<(bool, RankExpr)> = self
            .rank_re
            .captures_iter(work)
            .filter_map(|caps| caps.get(1))
            .filter_map(|token| {
                let expr = self.hierarchy.expr(None, token.as_str()).ok()?;
                Some((self.hierarchy.is_canonical(token.as_str()), expr))
            })
            .collect();

        // A canonical name beats a synonym: "senior partners" is Partner
        let chosen = exact
            .iter()
            .find(|(canonical, _)| *canonical)
            .or_else(|| exact.first())
            .map(|(_, expr)| expr.clone());
        if let Some((_, extra)) = exact.iter().find(|(_, e)| Some(e) != chosen.as_ref()) {
            debug!("Ignoring additional rank {} (one rank per query)", extra);
        }
        chosen
    }

    fn extract_weeks(&self, work: &mut String, filter: &mut Filter) {
        for range_re in &self.week_range_res {
            let mut consumed = Vec::new();
            for caps in range_re.captures_iter(work) {
                let (Some(whole), Some(start), Some(end)) = (caps.get(0), caps.get(1), caps.get(2))
                else {
                    continue;
                };
                match (parse_week(start.as_str()), parse_week(end.as_str())) {
                    (Some(start), Some(end)) if start <= end => {
                        filter.availability_weeks.extend(start..=end);
                    }
                    _ => warn!(
                        "Dropping invalid week range {}-{}",
                        start.as_str(),
                        end.as_str()
                    ),
                }
                consumed.push(whole.range());
            }
            mask(work, consumed);
        }

        let mut consumed = Vec::new();
        for caps in self.week_list_re.captures_iter(work) {
            let (Some(whole), Some(list)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            for number in self.number_re.find_iter(list.as_str()) {
                match parse_week(number.as_str()) {
                    Some(week) => {
                        filter.availability_weeks.insert(week);
                    }
                    None => warn!("Dropping invalid week number {}", number.as_str()),
                }
            }
            consumed.push(whole.range());
        }
        mask(work, consumed);
    }

    fn extract_status(&self, work: &str, no_weeks: bool) -> Option<AvailabilityStatus> {
        if self.unavailable_re.is_match(work) {
            Some(AvailabilityStatus::Unavailable)
        } else if self.partial_re.is_match(work) {
            Some(AvailabilityStatus::Partial)
        } else if self.available_re.is_match(work)
            || (no_weeks && self.bare_available_re.is_match(work))
        {
            Some(AvailabilityStatus::Available)
        } else {
            None
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, EngineError> {
    Regex::new(pattern)
        .map_err(|e| EngineError::Config(format!("Invalid vocabulary pattern: {}", e)))
}

/// Longest-first alternation of escaped surface forms
fn alternation<'a>(surfaces: impl Iterator<Item = &'a str>) -> String {
    let mut forms: Vec<&str> = surfaces.filter(|s| !s.trim().is_empty()).collect();
    forms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    forms.dedup();
    forms
        .iter()
        .map(|f| {
            f.split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"[\s-]+")
        })
        .collect::<Vec<_>>()
        .join("|")
}

fn direction_of(phrase: &str) -> Direction {
    let phrase = crate::translator::vocabulary::normalize(phrase);
    if BELOW_PHRASES.contains(&phrase.as_str()) {
        Direction::Below
    } else {
        Direction::Above
    }
}

fn parse_week(s: &str) -> Option<u32> {
    s.parse::<u32>().ok().filter(|w| WEEK_RANGE.contains(w))
}

/// Blank out consumed spans, keeping byte offsets stable
fn mask(work: &mut String, ranges: Vec<Range<usize>>) {
    for range in ranges {
        let blank = " ".repeat(range.len());
        work.replace_range(range, &blank);
    }
}
