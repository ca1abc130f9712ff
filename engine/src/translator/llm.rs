//! LLM-backed translation
//!
//! The model is asked for a fixed JSON shape. Its answer is treated as
//! untrusted input: every value is checked against the vocabulary and the
//! rank hierarchy, and anything unrecognized is dropped with a warning.

use crate::filter::{Filter, RankExpr};
use crate::llm::router::LLMRouter;
use crate::llm::{extract_json_object, Message};
use crate::rank::{Direction, RankHierarchy};
use crate::translator::rules::WEEK_RANGE;
use crate::translator::vocabulary::Vocabulary;
use sdk::errors::EngineError;
use sdk::types::AvailabilityStatus;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct LlmExtractor {
    router: Arc<LLMRouter>,
    vocabulary: Arc<Vocabulary>,
    hierarchy: Arc<RankHierarchy>,
}

impl LlmExtractor {
    pub fn new(
        router: Arc<LLMRouter>,
        vocabulary: Arc<Vocabulary>,
        hierarchy: Arc<RankHierarchy>,
    ) -> Self {
        Self {
            router,
            vocabulary,
            hierarchy,
        }
    }

    /// Ask the model for a candidate filter.
    ///
    /// `Ok(None)` means the model signalled it could not parse the text.
    pub async fn extract(
        &self,
        text: &str,
        prior: Option<&Filter>,
    ) -> Result<Option<Filter>, EngineError> {
        let messages = self.build_messages(text, prior);

        let (completion, provider) = self
            .router
            .call(&messages)
            .await
            .map_err(|e| EngineError::LLMProvider(e.to_string()))?;

        debug!("Translation completion from {}: {} chars", provider, completion.len());

        let value = extract_json_object(&completion).ok_or_else(|| {
            EngineError::LLMProvider("completion did not contain a JSON object".to_string())
        })?;

        Ok(self.validate(&value))
    }

    pub fn build_messages(&self, text: &str, prior: Option<&Filter>) -> Vec<Message> {
        let system = format!(
            "You convert questions about consultants into a JSON search filter.\n\
             Reply with ONE JSON object and nothing else, using only these keys:\n\
             - \"locations\": list of locations or regions. Known locations: {locations}. Known regions: {regions}.\n\
             - \"skills\": list of skills. Known skills: {skills}.\n\
             - \"rank\": {{\"relation\": \"exact\" | \"above\" | \"below\" | \"between\", \"ranks\": [rank names]}}. \
             Ranks from most to least senior: {ranks}. \"between\" takes two ranks.\n\
             - \"weeks\": list of week numbers (1-53).\n\
             - \"availability_status\": \"available\", \"partial\" or \"unavailable\", only if the user asks for that status.\n\
             Omit keys the question does not mention. For a follow-up, include ONLY what the new message adds or changes.\n\
             If the message is not a question about people, reply {{\"unparseable\": true}}.",
            locations = self.vocabulary.location_names().join(", "),
            regions = self.vocabulary.region_names().join(", "),
            skills = self.vocabulary.skill_names().join(", "),
            ranks = self.hierarchy.ranks().join(", "),
        );

        let user = match prior {
            Some(prior) => format!(
                "Previous filter: {}\nFollow-up message: {}",
                prior.summary(),
                text
            ),
            None => text.to_string(),
        };

        vec![Message::system(system), Message::user(user)]
    }

    /// Turn a model reply into a filter, keeping only recognized values
    pub fn validate(&self, value: &Value) -> Option<Filter> {
        if value.get("unparseable").and_then(Value::as_bool) == Some(true) {
            debug!("Model reported the message as unparseable");
            return None;
        }

        let mut filter = Filter::new();

        for token in string_list(value.get("locations")) {
            match self.vocabulary.resolve_location(&token) {
                Some(locations) => filter.locations.extend(locations),
                None => drop_unknown("location", &token),
            }
        }

        for token in string_list(value.get("skills")) {
            match self.vocabulary.resolve_skill(&token) {
                Some(skill) => {
                    filter.skills.insert(skill);
                }
                None => drop_unknown("skill", &token),
            }
        }

        filter.rank = self.validate_rank(value.get("rank").or_else(|| value.get("ranks")));

        for week in week_list(value.get("weeks")) {
            match week {
                Some(week) if WEEK_RANGE.contains(&week) => {
                    filter.availability_weeks.insert(week);
                }
                _ => drop_unknown("week", &format!("{:?}", week)),
            }
        }

        if let Some(status) = first_string(value.get("availability_status")) {
            match status.parse::<AvailabilityStatus>() {
                Ok(status) => filter.availability_status = Some(status),
                Err(_) => drop_unknown("availability status", &status),
            }
        }

        Some(filter)
    }

    fn validate_rank(&self, value: Option<&Value>) -> Option<RankExpr> {
        let value = value?;

        // Accept a bare name or a list of names as an exact rank
        let (relation, names) = match value {
            Value::Object(map) => {
                let relation = map
                    .get("relation")
                    .and_then(Value::as_str)
                    .unwrap_or("exact")
                    .to_lowercase();
                let names = string_list(map.get("ranks").or_else(|| map.get("rank")));
                (relation, names)
            }
            other => ("exact".to_string(), string_list(Some(other))),
        };

        let result = match (relation.as_str(), names.as_slice()) {
            (_, []) => return None,
            ("between", [a, b, ..]) => self.hierarchy.between(a, b),
            ("above", [name, ..]) => self.hierarchy.expr(Some(Direction::Above), name),
            ("below", [name, ..]) => self.hierarchy.expr(Some(Direction::Below), name),
            ("exact" | "between", [name, ..]) => self.hierarchy.expr(None, name),
            (other, _) => {
                drop_unknown("rank relation", other);
                return None;
            }
        };

        match result {
            Ok(expr) => Some(expr),
            Err(e) => {
                drop_unknown("rank", &e.0);
                None
            }
        }
    }
}

fn drop_unknown(field: &str, token: &str) {
    let err = EngineError::UnknownVocabulary {
        field: field.to_string(),
        token: token.to_string(),
    };
    warn!("Dropping LLM output: {}", err);
}

/// A string or a list of strings; anything else yields nothing
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn first_string(value: Option<&Value>) -> Option<String> {
    string_list(value).into_iter().next()
}

/// Week numbers given as integers or numeric strings; `None` marks a
/// malformed entry
fn week_list(value: Option<&Value>) -> Vec<Option<u32>> {
    let parse = |v: &Value| match v {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    };
    match value {
        Some(Value::Array(items)) => items.iter().map(parse).collect(),
        Some(single @ (Value::Number(_) | Value::String(_))) => vec![parse(single)],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LLMConfig, RanksConfig, TranslatorConfig};
    use serde_json::json;

    fn extractor() -> LlmExtractor {
        let router = Arc::new(LLMRouter::new(vec![], Arc::new(LLMConfig::default())));
        let vocabulary = Arc::new(Vocabulary::from_config(&TranslatorConfig::default()).unwrap());
        let hierarchy = Arc::new(RankHierarchy::from_config(&RanksConfig::default()).unwrap());
        LlmExtractor::new(router, vocabulary, hierarchy)
    }

    #[test]
    fn test_valid_payload() {
        let value = json!({
            "locations": ["london"],
            "skills": ["Python"],
            "rank": {"relation": "exact", "ranks": ["Senior Consultant"]},
            "weeks": [2]
        });
        let filter = extractor().validate(&value).unwrap();
        assert_eq!(
            filter,
            Filter::new()
                .with_location("London")
                .with_skill("python")
                .with_rank(RankExpr::Exact("Senior Consultant".into()))
                .with_week(2)
        );
    }

    #[test]
    fn test_unknown_values_are_dropped() {
        let value = json!({
            "locations": ["Atlantis", "Oslo"],
            "skills": ["telepathy"],
            "rank": "Grand Vizier",
            "weeks": [0, 54, "x", 7],
            "availability_status": "sometimes"
        });
        let filter = extractor().validate(&value).unwrap();
        assert_eq!(filter, Filter::new().with_location("Oslo").with_week(7));
    }

    #[test]
    fn test_lenient_shapes() {
        let value = json!({
            "locations": "Nordics",
            "ranks": ["partners"],
            "weeks": "3",
            "availability_status": ["Unavailable"]
        });
        let filter = extractor().validate(&value).unwrap();
        assert_eq!(filter.locations.len(), 3);
        assert_eq!(filter.rank, Some(RankExpr::Exact("Partner".into())));
        assert_eq!(filter.availability_weeks, [3].into_iter().collect());
        assert_eq!(filter.availability_status, Some(AvailabilityStatus::Unavailable));
    }

    #[test]
    fn test_relative_rank_payload() {
        let value = json!({"rank": {"relation": "between", "ranks": ["Analyst", "Principal Consultant"]}});
        let filter = extractor().validate(&value).unwrap();
        assert_eq!(
            filter.rank,
            Some(RankExpr::Between(
                "Principal Consultant".into(),
                "Analyst".into()
            ))
        );
    }

    #[test]
    fn test_unparseable_signal() {
        assert!(extractor().validate(&json!({"unparseable": true})).is_none());
    }

    #[test]
    fn test_prompt_includes_prior_summary() {
        let prior = Filter::new().with_location("London");
        let messages = extractor().build_messages("what about week 3?", Some(&prior));
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("Senior Consultant"));
        assert!(messages[1].content.contains("locations: London"));
        assert!(messages[1].content.ends_with("what about week 3?"));
    }
}
