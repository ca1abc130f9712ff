//! Recognized locations and skills
//!
//! Both translation strategies resolve tokens through the same tables, so a
//! value the rule-based path could never produce is also rejected when the
//! LLM suggests it.

use crate::config::TranslatorConfig;
use sdk::errors::EngineError;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Vocabulary {
    locations: HashMap<String, String>,
    regions: HashMap<String, Vec<String>>,
    skills: HashMap<String, String>,
}

impl Vocabulary {
    pub fn from_config(config: &TranslatorConfig) -> Result<Self, EngineError> {
        let locations: HashMap<String, String> = config
            .locations
            .iter()
            .map(|l| (normalize(l), l.trim().to_string()))
            .collect();

        let mut regions = HashMap::new();
        for (region, members) in &config.regions {
            let resolved = members
                .iter()
                .map(|m| {
                    locations.get(&normalize(m)).cloned().ok_or_else(|| {
                        EngineError::Config(format!(
                            "Region '{}' refers to unknown location '{}'",
                            region, m
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            regions.insert(normalize(region), resolved);
        }

        let mut skills = HashMap::new();
        for (canonical, synonyms) in &config.skills {
            let canonical = canonical.trim().to_string();
            skills.insert(normalize(&canonical), canonical.clone());
            for synonym in synonyms {
                skills.insert(normalize(synonym), canonical.clone());
            }
        }

        Ok(Self {
            locations,
            regions,
            skills,
        })
    }

    /// A location or region name, expanded to canonical locations
    pub fn resolve_location(&self, token: &str) -> Option<Vec<String>> {
        let key = normalize(token);
        if let Some(location) = self.locations.get(&key) {
            return Some(vec![location.clone()]);
        }
        self.regions.get(&key).cloned()
    }

    /// A skill name or synonym, tolerating a plural suffix
    pub fn resolve_skill(&self, token: &str) -> Option<String> {
        let key = normalize(token);
        self.skills
            .get(&key)
            .or_else(|| key.strip_suffix("es").and_then(|k| self.skills.get(k)))
            .or_else(|| key.strip_suffix('s').and_then(|k| self.skills.get(k)))
            .cloned()
    }

    /// Lower-case spellings that resolve to a location or region
    pub fn location_surfaces(&self) -> impl Iterator<Item = &str> {
        self.locations
            .keys()
            .chain(self.regions.keys())
            .map(String::as_str)
    }

    /// Lower-case spellings that resolve to a skill
    pub fn skill_surfaces(&self) -> impl Iterator<Item = &str> {
        self.skills.keys().map(String::as_str)
    }

    /// Canonical location names, sorted
    pub fn location_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.locations.values().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Region names, sorted
    pub fn region_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.regions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Canonical skill names, sorted and deduplicated
    pub fn skill_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.skills.values().map(String::as_str).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

pub(crate) fn normalize(token: &str) -> String {
    token
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> Vocabulary {
        Vocabulary::from_config(&TranslatorConfig::default()).unwrap()
    }

    #[test]
    fn test_location_case_insensitive() {
        assert_eq!(vocab().resolve_location("LONDON"), Some(vec!["London".to_string()]));
        assert_eq!(vocab().resolve_location("Atlantis"), None);
    }

    #[test]
    fn test_region_expansion() {
        let nordics = vocab().resolve_location("Nordics").unwrap();
        assert_eq!(nordics, vec!["Oslo", "Stockholm", "Copenhagen"]);
    }

    #[test]
    fn test_skill_synonyms_and_plurals() {
        let v = vocab();
        assert_eq!(v.resolve_skill("front-end"), Some("Frontend Developer".to_string()));
        assert_eq!(v.resolve_skill("Agile Coaches"), Some("Agile Coach".to_string()));
        assert_eq!(v.resolve_skill("Python"), Some("python".to_string()));
        assert_eq!(v.resolve_skill("cobol"), None);
    }

    #[test]
    fn test_unknown_region_member_rejected() {
        let mut config = TranslatorConfig::default();
        config
            .regions
            .insert("moon".to_string(), vec!["Tranquility Base".to_string()]);
        assert!(Vocabulary::from_config(&config).is_err());
    }
}
