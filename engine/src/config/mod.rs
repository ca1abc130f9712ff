//! Configuration management
//!
//! This module handles loading, validation, and management of the roster
//! configuration. Configuration is stored in TOML format at ~/.roster/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **llm**: LLM-backed translation toggle and provider settings
//! - **cache**: Result cache TTL and size bound
//! - **translator**: Follow-up threshold and the location/skill vocabulary
//! - **ranks**: Rank hierarchy (most senior first) and rank synonyms
//! - **session**: Conversation history length
//! - **store**: Database path, store timeout and fetch limit
//!
//! The configuration is loaded once at startup and never mutated afterwards;
//! the only runtime knob is the cache TTL, which lives on the cache itself.
//!
//! # Examples
//!
//! ```no_run
//! use roster_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Cache TTL: {}s", config.cache.ttl_secs);
//! println!("Default provider: {}", config.llm.default_provider);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// LLM provider configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Result cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Query translator configuration
    #[serde(default)]
    pub translator: TranslatorConfig,

    /// Rank hierarchy
    #[serde(default)]
    pub ranks: RanksConfig,

    /// Session configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Data store configuration
    #[serde(default)]
    pub store: StoreConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Use the LLM-backed translator before the rule-based one
    #[serde(default)]
    pub enabled: bool,

    /// Default LLM provider (ollama, openai, anthropic)
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Per-call timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Ollama provider settings
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// OpenAI provider settings
    #[serde(default)]
    pub openai: OpenAIConfig,

    /// Anthropic provider settings
    #[serde(default)]
    pub anthropic: AnthropicConfig,
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL for Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

/// OpenAI provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// Base URL for OpenAI API
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
}

/// Anthropic provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    /// Base URL for Anthropic API
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_anthropic_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_anthropic_key_env")]
    pub api_key_env: String,
}

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Time-to-live for new entries, in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Maximum number of entries (LRU eviction); unbounded when absent
    #[serde(default)]
    pub max_entries: Option<usize>,
}

/// Query translator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorConfig {
    /// A non-empty candidate with fewer than this many of {location, rank,
    /// skill} is merged with the prior filter
    #[serde(default = "default_followup_threshold")]
    pub followup_threshold: usize,

    /// Canonical location names
    #[serde(default = "default_locations")]
    pub locations: Vec<String>,

    /// Region name -> locations it expands to
    #[serde(default = "default_regions")]
    pub regions: BTreeMap<String, Vec<String>>,

    /// Canonical skill name -> synonyms
    #[serde(default = "default_skills")]
    pub skills: BTreeMap<String, Vec<String>>,
}

/// Rank hierarchy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RanksConfig {
    /// Canonical rank names, most senior first
    #[serde(default = "default_hierarchy")]
    pub hierarchy: Vec<String>,

    /// Synonym -> canonical rank name
    #[serde(default = "default_rank_synonyms")]
    pub synonyms: BTreeMap<String, String>,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Number of turns kept in each conversation's history
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

/// Data store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path; defaults to `<data_dir>/roster.db`
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Per-call timeout in seconds
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,

    /// Maximum resources returned by one fetch
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: u32,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.roster")
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_llm_timeout() -> u64 {
    10
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_anthropic_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_followup_threshold() -> usize {
    3
}

fn default_history_limit() -> usize {
    10
}

fn default_store_timeout() -> u64 {
    5
}

fn default_fetch_limit() -> u32 {
    200
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_locations() -> Vec<String> {
    strings(&[
        "London",
        "Bristol",
        "Manchester",
        "Belfast",
        "Oslo",
        "Stockholm",
        "Copenhagen",
        "New York",
        "Chicago",
        "San Francisco",
    ])
}

fn default_regions() -> BTreeMap<String, Vec<String>> {
    let nordics = strings(&["Oslo", "Stockholm", "Copenhagen"]);
    let uk = strings(&["London", "Manchester", "Belfast", "Bristol"]);
    let us = strings(&["New York", "Chicago", "San Francisco"]);

    let mut regions = BTreeMap::new();
    for name in ["nordics", "nordic", "scandinavia"] {
        regions.insert(name.to_string(), nordics.clone());
    }
    for name in ["uk", "united kingdom", "britain"] {
        regions.insert(name.to_string(), uk.clone());
    }
    for name in ["usa", "united states", "america"] {
        regions.insert(name.to_string(), us.clone());
    }
    regions
}

fn default_skills() -> BTreeMap<String, Vec<String>> {
    let table: &[(&str, &[&str])] = &[
        ("python", &[]),
        ("java", &[]),
        ("javascript", &["js"]),
        ("typescript", &["ts"]),
        ("react", &["reactjs"]),
        ("rust", &[]),
        ("kotlin", &[]),
        ("sql", &[]),
        (
            "Frontend Developer",
            &["frontend", "front-end", "front end", "ui developer"],
        ),
        ("Backend Developer", &["backend", "back-end", "back end"]),
        (
            "Full Stack Developer",
            &["full stack", "fullstack", "full-stack"],
        ),
        ("AWS Engineer", &["aws"]),
        ("Cloud Engineer", &["cloud"]),
        ("DevOps Engineer", &["devops"]),
        ("Solution Architect", &["solutions architect", "architect"]),
        ("Business Analyst", &["business analysis"]),
        ("Product Manager", &["product owner"]),
        ("Agile Coach", &["agile coaches"]),
        ("Scrum Master", &["scrum"]),
        ("Project Manager", &["project management"]),
        ("Data Engineer", &["data engineering"]),
    ];
    table
        .iter()
        .map(|(name, synonyms)| (name.to_string(), strings(synonyms)))
        .collect()
}

fn default_hierarchy() -> Vec<String> {
    strings(&[
        "Partner",
        "Associate Partner",
        "Consulting Director",
        "Management Consultant",
        "Principal Consultant",
        "Senior Consultant",
        "Consultant",
        "Consultant Analyst",
        "Analyst",
    ])
}

fn default_rank_synonyms() -> BTreeMap<String, String> {
    [
        ("partnership", "Partner"),
        ("associate", "Associate Partner"),
        ("director", "Consulting Director"),
        ("manager", "Management Consultant"),
        ("principal", "Principal Consultant"),
        ("senior", "Senior Consultant"),
        ("seniors", "Senior Consultant"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            default_provider: default_provider(),
            timeout_secs: default_llm_timeout(),
            ollama: OllamaConfig::default(),
            openai: OpenAIConfig::default(),
            anthropic: AnthropicConfig::default(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            api_key_env: default_openai_key_env(),
        }
    }
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            base_url: default_anthropic_base_url(),
            model: default_anthropic_model(),
            api_key_env: default_anthropic_key_env(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_entries: None,
        }
    }
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            followup_threshold: default_followup_threshold(),
            locations: default_locations(),
            regions: default_regions(),
            skills: default_skills(),
        }
    }
}

impl Default for RanksConfig {
    fn default() -> Self {
        Self {
            hierarchy: default_hierarchy(),
            synonyms: default_rank_synonyms(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            timeout_secs: default_store_timeout(),
            fetch_limit: default_fetch_limit(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.roster/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default_config();

        // Serialize before processing so the file keeps the portable ~ paths
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.roster/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".roster").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig::default(),
            llm: LLMConfig::default(),
            cache: CacheConfig::default(),
            translator: TranslatorConfig::default(),
            ranks: RanksConfig::default(),
            session: SessionConfig::default(),
            store: StoreConfig::default(),
        }
    }

    /// Resolved database path
    pub fn db_path(&self) -> PathBuf {
        self.store
            .db_path
            .clone()
            .unwrap_or_else(|| self.core.data_dir.join("roster.db"))
    }

    /// Validate and process configuration
    ///
    /// Checks value ranges and vocabulary consistency, expands ~ in paths and
    /// creates the data directory.
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        self.validate()?;

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        if let Some(db_path) = &self.store.db_path {
            self.store.db_path = Some(expand_path(db_path)?);
        }

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }

    /// Pure validation, no filesystem access
    pub fn validate(&self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_providers = ["ollama", "openai", "anthropic"];
        if !valid_providers.contains(&self.llm.default_provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid default provider '{}'. Must be one of: {}",
                self.llm.default_provider,
                valid_providers.join(", ")
            )));
        }

        if self.llm.timeout_secs == 0 || self.store.timeout_secs == 0 {
            return Err(EngineError::Config(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.cache.ttl_secs == 0 {
            return Err(EngineError::Config(
                "cache.ttl_secs must be greater than zero".to_string(),
            ));
        }

        if self.cache.max_entries == Some(0) {
            return Err(EngineError::Config(
                "cache.max_entries must be at least 1 when set".to_string(),
            ));
        }

        if !(1..=3).contains(&self.translator.followup_threshold) {
            return Err(EngineError::Config(
                "translator.followup_threshold must be 1, 2, or 3".to_string(),
            ));
        }

        if self.translator.locations.is_empty() {
            return Err(EngineError::Config(
                "translator.locations must not be empty".to_string(),
            ));
        }

        let known_locations: HashSet<String> = self
            .translator
            .locations
            .iter()
            .map(|l| l.to_lowercase())
            .collect();
        for (region, members) in &self.translator.regions {
            if let Some(unknown) = members
                .iter()
                .find(|m| !known_locations.contains(&m.to_lowercase()))
            {
                return Err(EngineError::Config(format!(
                    "Region '{}' refers to unknown location '{}'",
                    region, unknown
                )));
            }
        }

        if self.ranks.hierarchy.is_empty() {
            return Err(EngineError::Config(
                "ranks.hierarchy must not be empty".to_string(),
            ));
        }

        let known_ranks: HashSet<String> = self
            .ranks
            .hierarchy
            .iter()
            .map(|r| r.to_lowercase())
            .collect();
        if known_ranks.len() != self.ranks.hierarchy.len() {
            return Err(EngineError::Config(
                "ranks.hierarchy contains a duplicate rank".to_string(),
            ));
        }
        for (synonym, rank) in &self.ranks.synonyms {
            if !known_ranks.contains(&rank.to_lowercase()) {
                return Err(EngineError::Config(format!(
                    "Rank synonym '{}' refers to unknown rank '{}'",
                    synonym, rank
                )));
            }
        }

        if self.session.history_limit == 0 {
            return Err(EngineError::Config(
                "session.history_limit must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;
        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = Config::default_config();
        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.llm.default_provider, "ollama");
        assert!(!config.llm.enabled);
        assert_eq!(config.cache.ttl_secs, 3600);
        assert_eq!(config.cache.max_entries, None);
        assert_eq!(config.translator.followup_threshold, 3);
        assert_eq!(config.ranks.hierarchy[0], "Partner");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();
        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        let expanded = expand_path(&path).unwrap();
        assert_eq!(expanded, path);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default_config();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(config.ranks.hierarchy, deserialized.ranks.hierarchy);
        assert_eq!(config.translator.skills, deserialized.translator.skills);
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let mut config = Config::default_config();
        config.translator.followup_threshold = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_ttl() {
        let mut config = Config::default_config();
        config.cache.ttl_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_synonym_to_unknown_rank() {
        let mut config = Config::default_config();
        config
            .ranks
            .synonyms
            .insert("boss".to_string(), "Overlord".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_rank() {
        let mut config = Config::default_config();
        config.ranks.hierarchy.push("partner".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_db_path_defaults_to_data_dir() {
        let config = Config::default_config();
        assert_eq!(config.db_path(), PathBuf::from("~/.roster/roster.db"));
    }
}
