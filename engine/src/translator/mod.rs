//! Query translator
//!
//! Turns one chat message into a [`Filter`]. When an LLM router is attached
//! the model is asked first; on any error, timeout, empty or unparseable
//! answer the deterministic rule-based extractor runs instead. The candidate
//! is then classified and, for follow-ups, merged with the session's prior
//! filter.

pub mod llm;
pub mod merge;
pub mod rules;
pub mod vocabulary;

pub use merge::TurnKind;

use crate::config::TranslatorConfig;
use crate::filter::Filter;
use crate::llm::router::LLMRouter;
use crate::rank::RankHierarchy;
use self::llm::LlmExtractor;
use self::rules::RuleExtractor;
use self::vocabulary::Vocabulary;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which extractor produced the candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Llm,
    Rules,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Llm => f.write_str("llm"),
            Self::Rules => f.write_str("rules"),
        }
    }
}

/// Outcome of translating one message
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub kind: TurnKind,
    /// What the message itself said
    pub candidate: Filter,
    /// The filter to execute: the candidate, or the merge for follow-ups
    pub filter: Filter,
    pub strategy: Strategy,
}

pub struct QueryTranslator {
    vocabulary: Arc<Vocabulary>,
    hierarchy: Arc<RankHierarchy>,
    rules: RuleExtractor,
    llm: Option<LlmExtractor>,
    followup_threshold: usize,
}

impl QueryTranslator {
    pub fn new(
        config: &TranslatorConfig,
        hierarchy: Arc<RankHierarchy>,
    ) -> Result<Self, EngineError> {
        let vocabulary = Arc::new(Vocabulary::from_config(config)?);
        let rules = RuleExtractor::new(Arc::clone(&vocabulary), Arc::clone(&hierarchy))?;

        Ok(Self {
            vocabulary,
            hierarchy,
            rules,
            llm: None,
            followup_threshold: config.followup_threshold,
        })
    }

    /// Try the LLM before the rule-based extractor
    pub fn with_llm(mut self, router: Arc<LLMRouter>) -> Self {
        if router.is_empty() {
            warn!("LLM translation enabled but no providers are configured");
            return self;
        }
        self.llm = Some(LlmExtractor::new(
            router,
            Arc::clone(&self.vocabulary),
            Arc::clone(&self.hierarchy),
        ));
        self
    }

    pub fn hierarchy(&self) -> &Arc<RankHierarchy> {
        &self.hierarchy
    }

    pub fn uses_llm(&self) -> bool {
        self.llm.is_some()
    }

    /// Translate a message, merging with `prior` for follow-ups
    pub async fn translate(&self, text: &str, prior: Option<&Filter>) -> Translation {
        if text.trim().is_empty() {
            return self.finish(Filter::new(), prior, Strategy::Rules);
        }

        if let Some(llm) = &self.llm {
            match llm.extract(text, prior).await {
                Ok(Some(candidate)) if !candidate.is_empty() => {
                    return self.finish(candidate, prior, Strategy::Llm);
                }
                Ok(_) => debug!("LLM produced no usable fields; using rules"),
                Err(e) => warn!("LLM translation failed, using rules: {}", e),
            }
        }

        self.translate_with_rules(text, prior)
    }

    /// Deterministic translation without the LLM
    pub fn translate_with_rules(&self, text: &str, prior: Option<&Filter>) -> Translation {
        let candidate = self.rules.extract(text);
        self.finish(candidate, prior, Strategy::Rules)
    }

    fn finish(&self, candidate: Filter, prior: Option<&Filter>, strategy: Strategy) -> Translation {
        let kind = merge::classify(&candidate, prior, self.followup_threshold);
        let filter = match (kind, prior) {
            (TurnKind::FollowUp, Some(prior)) => merge::merge(&candidate, prior),
            (TurnKind::NotResourceQuery, _) => Filter::new(),
            _ => candidate.clone(),
        };

        debug!(
            kind = %kind,
            strategy = %strategy,
            "Translated to {}",
            filter.summary()
        );

        Translation {
            kind,
            candidate,
            filter,
            strategy,
        }
    }
}
