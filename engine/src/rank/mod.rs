//! Rank hierarchy
//!
//! An immutable, ordered seniority scale (most senior first) with O(1)
//! position lookup. Relative rank expressions are resolved against it:
//! `Above`/`Below` are strict, `Between` is inclusive on both ends.

use crate::config::RanksConfig;
use crate::filter::RankExpr;
use sdk::errors::EngineError;
use std::collections::{BTreeMap, HashMap};

/// A rank token that is not in the hierarchy
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown rank: {0}")]
pub struct UnknownRank(pub String);

/// Direction of a relative rank expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Above,
    Below,
}

#[derive(Debug, Clone)]
pub struct RankHierarchy {
    ranks: Vec<String>,
    positions: HashMap<String, usize>,
    synonyms: HashMap<String, usize>,
}

impl RankHierarchy {
    /// Build a hierarchy from canonical names (most senior first) and a
    /// synonym table mapping alternative spellings to canonical names.
    ///
    /// Fails on an empty hierarchy, duplicate names (case-insensitive) or a
    /// synonym pointing at an unknown rank.
    pub fn new(ranks: Vec<String>, synonyms: &BTreeMap<String, String>) -> Result<Self, EngineError> {
        if ranks.is_empty() {
            return Err(EngineError::Config("rank hierarchy is empty".to_string()));
        }

        let mut positions = HashMap::with_capacity(ranks.len());
        for (idx, rank) in ranks.iter().enumerate() {
            let key = normalize(rank);
            if key.is_empty() {
                return Err(EngineError::Config("rank names must not be blank".to_string()));
            }
            if positions.insert(key, idx).is_some() {
                return Err(EngineError::Config(format!(
                    "duplicate rank in hierarchy: {}",
                    rank
                )));
            }
        }

        let mut synonym_positions = HashMap::with_capacity(synonyms.len());
        for (synonym, target) in synonyms {
            let idx = positions.get(&normalize(target)).copied().ok_or_else(|| {
                EngineError::Config(format!(
                    "rank synonym '{}' refers to unknown rank '{}'",
                    synonym, target
                ))
            })?;
            synonym_positions.insert(normalize(synonym), idx);
        }

        Ok(Self {
            ranks,
            positions,
            synonyms: synonym_positions,
        })
    }

    pub fn from_config(config: &RanksConfig) -> Result<Self, EngineError> {
        Self::new(config.hierarchy.clone(), &config.synonyms)
    }

    /// Canonical names, most senior first
    pub fn ranks(&self) -> &[String] {
        &self.ranks
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// Position of a canonical rank name (0 = most senior)
    pub fn position(&self, rank: &str) -> Option<usize> {
        self.positions.get(&normalize(rank)).copied()
    }

    /// Resolve a free-form token to its canonical rank name.
    ///
    /// Accepts canonical names and synonyms in any case, with a plural `s`
    /// or `es` suffix.
    pub fn canonical(&self, token: &str) -> Option<&str> {
        let key = normalize(token);
        self.lookup(&key)
            .or_else(|| key.strip_suffix("es").and_then(|k| self.lookup(k)))
            .or_else(|| key.strip_suffix('s').and_then(|k| self.lookup(k)))
            .map(|idx| self.ranks[idx].as_str())
    }

    /// True when the token spells a canonical rank name rather than a synonym
    pub fn is_canonical(&self, token: &str) -> bool {
        let key = normalize(token);
        let found = [Some(key.as_str()), key.strip_suffix("es"), key.strip_suffix('s')]
            .into_iter()
            .flatten()
            .any(|k| self.positions.contains_key(k));
        found
    }

    fn lookup(&self, key: &str) -> Option<usize> {
        self.positions
            .get(key)
            .or_else(|| self.synonyms.get(key))
            .copied()
    }

    fn position_or_err(&self, rank: &str) -> Result<usize, UnknownRank> {
        self.canonical(rank)
            .and_then(|name| self.position(name))
            .ok_or_else(|| UnknownRank(rank.to_string()))
    }

    /// Ranks between and including `low` and `high`, senior to junior.
    ///
    /// The bounds may be given in either order.
    pub fn resolve_range(&self, low: &str, high: &str) -> Result<Vec<String>, UnknownRank> {
        let a = self.position_or_err(low)?;
        let b = self.position_or_err(high)?;
        let (start, end) = if a <= b { (a, b) } else { (b, a) };
        Ok(self.ranks[start..=end].to_vec())
    }

    /// Ranks strictly above or below `rank`, senior to junior
    pub fn resolve_relative(
        &self,
        direction: Direction,
        rank: &str,
    ) -> Result<Vec<String>, UnknownRank> {
        let pos = self.position_or_err(rank)?;
        Ok(match direction {
            Direction::Above => self.ranks[..pos].to_vec(),
            Direction::Below => self.ranks[pos + 1..].to_vec(),
        })
    }

    /// The set of ranks an expression admits, senior to junior.
    ///
    /// Unknown names resolve to no ranks.
    pub fn resolve(&self, expr: &RankExpr) -> Vec<String> {
        let resolved = match expr {
            RankExpr::Exact(rank) => self
                .canonical(rank)
                .map(|name| vec![name.to_string()])
                .ok_or_else(|| UnknownRank(rank.clone())),
            RankExpr::Above(rank) => self.resolve_relative(Direction::Above, rank),
            RankExpr::Below(rank) => self.resolve_relative(Direction::Below, rank),
            RankExpr::Between(low, high) => self.resolve_range(low, high),
        };

        resolved.unwrap_or_else(|e| {
            tracing::warn!("{}; treating as no match", e);
            Vec::new()
        })
    }

    /// Build a normalized `Between` expression.
    ///
    /// The more senior rank goes first; equal ranks collapse to `Exact`.
    pub fn between(&self, a: &str, b: &str) -> Result<RankExpr, UnknownRank> {
        let pa = self.position_or_err(a)?;
        let pb = self.position_or_err(b)?;
        let (low, high) = if pa <= pb { (pa, pb) } else { (pb, pa) };
        if low == high {
            return Ok(RankExpr::Exact(self.ranks[low].clone()));
        }
        Ok(RankExpr::Between(
            self.ranks[low].clone(),
            self.ranks[high].clone(),
        ))
    }

    /// Build an `Exact`, `Above` or `Below` expression from a free-form token
    pub fn expr(&self, direction: Option<Direction>, token: &str) -> Result<RankExpr, UnknownRank> {
        let name = self
            .canonical(token)
            .ok_or_else(|| UnknownRank(token.to_string()))?
            .to_string();
        Ok(match direction {
            None => RankExpr::Exact(name),
            Some(Direction::Above) => RankExpr::Above(name),
            Some(Direction::Below) => RankExpr::Below(name),
        })
    }

    /// Every spelling that resolves to a rank: canonical names and synonyms
    pub fn surface_forms(&self) -> Vec<String> {
        self.ranks
            .iter()
            .map(|r| r.to_lowercase())
            .chain(self.synonyms.keys().cloned())
            .collect()
    }
}

fn normalize(token: &str) -> String {
    token
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
