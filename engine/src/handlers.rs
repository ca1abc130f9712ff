//! Command handlers for CLI operations
//!
//! - ask: answer one question
//! - chat: interactive conversation with admin commands
//! - import: load a roster fixture into the database
//! - status: provider health, cache settings, roster size
//! - history: show the query log

use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cache::ResultCache;
use crate::config::Config;
use crate::db::{Database, RosterFixture};
use crate::llm::anthropic::AnthropicProvider;
use crate::llm::ollama::OllamaProvider;
use crate::llm::openai::OpenAIProvider;
use crate::llm::router::LLMRouter;
use crate::llm::LLMProvider;
use crate::orchestrator::{Orchestrator, OrchestratorSettings, TurnReply};
use crate::rank::RankHierarchy;
use crate::secrets::SecretCache;
use crate::session::SessionRegistry;
use crate::store::SqliteResourceStore;
use crate::translator::QueryTranslator;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// A wired-up engine over the configured database
pub struct Engine {
    pub database: Database,
    pub orchestrator: Orchestrator,
}

impl Engine {
    pub async fn close(self) -> Result<()> {
        self.database.close().await
    }
}

/// Providers in configuration order; cloud providers only when their API
/// key is present
pub fn build_router(config: &Config, secrets: &SecretCache) -> LLMRouter {
    let mut providers: Vec<Box<dyn LLMProvider>> = vec![Box::new(OllamaProvider::new(
        config.llm.ollama.base_url.clone(),
        config.llm.ollama.model.clone(),
    ))];

    if secrets.has_secret(&config.llm.openai.api_key_env) {
        providers.push(Box::new(OpenAIProvider::new(
            config.llm.openai.clone(),
            secrets.clone(),
        )));
    }

    if secrets.has_secret(&config.llm.anthropic.api_key_env) {
        providers.push(Box::new(AnthropicProvider::new(
            config.llm.anthropic.clone(),
            secrets.clone(),
        )));
    }

    LLMRouter::new(providers, Arc::new(config.llm.clone()))
}

/// Open the database and assemble translator, cache, store and sessions
pub async fn build_engine(config: &Config) -> Result<Engine> {
    let database = Database::new(&config.db_path())
        .await
        .context("Failed to open database")?;

    let hierarchy = Arc::new(RankHierarchy::from_config(&config.ranks)?);
    let mut translator = QueryTranslator::new(&config.translator, hierarchy)?;
    if config.llm.enabled {
        let router = build_router(config, &SecretCache::new());
        translator = translator.with_llm(Arc::new(router));
    }

    let orchestrator = Orchestrator::new(
        Arc::new(translator),
        Arc::new(ResultCache::from_config(&config.cache)),
        Arc::new(SqliteResourceStore::new(database.pool().clone())),
        Arc::new(SessionRegistry::from_config(&config.session)),
        OrchestratorSettings::from_config(&config.store),
    )
    .with_query_log(database.query_log());

    Ok(Engine {
        database,
        orchestrator,
    })
}

fn print_reply(reply: &TurnReply, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{}", reply.text),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(reply)?),
    }
    Ok(())
}

/// Answer a single question
pub async fn handle_ask(
    text: String,
    session: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let engine = build_engine(config).await?;
    let session = session.unwrap_or_else(|| "cli".to_string());

    let reply = engine.orchestrator.handle_turn(&session, &text).await?;
    print_reply(&reply, format)?;

    engine.close().await
}

/// A line typed in the chat REPL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Message(String),
    Stats,
    ClearCache,
    SetTtl(u64),
    Reset,
    Quit,
    Invalid(String),
}

impl ChatInput {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let Some(command) = line.strip_prefix('/') else {
            return Self::Message(line.to_string());
        };

        let mut parts = command.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("stats"), None) => Self::Stats,
            (Some("clear"), None) => Self::ClearCache,
            (Some("ttl"), Some(secs)) => match secs.parse::<u64>() {
                Ok(secs) if secs > 0 => Self::SetTtl(secs),
                _ => Self::Invalid(format!("TTL must be a positive number of seconds: {}", secs)),
            },
            (Some("reset"), None) => Self::Reset,
            (Some("quit" | "exit"), None) => Self::Quit,
            _ => Self::Invalid(format!("Unknown command: /{}", command)),
        }
    }
}

/// Interactive conversation on stdin/stdout
pub async fn handle_chat(session: Option<String>, config: &Config, format: OutputFormat) -> Result<()> {
    let engine = build_engine(config).await?;
    let session = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let orchestrator = &engine.orchestrator;

    if let OutputFormat::Text = format {
        println!("Roster chat (session {}).", session);
        println!("Commands: /stats, /clear, /ttl <secs>, /reset, /quit");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if let OutputFormat::Text = format {
            eprint!("> ");
        }
        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };

        match ChatInput::parse(&line) {
            ChatInput::Message(text) if text.is_empty() => continue,
            ChatInput::Message(text) => {
                let reply = orchestrator.handle_turn(&session, &text).await?;
                print_reply(&reply, format)?;
            }
            ChatInput::Stats => {
                let stats = orchestrator.cache_stats().await;
                match format {
                    OutputFormat::Text => println!(
                        "Cache: {} entries (max {}), {} hits, {} misses, hit rate {:.0}%, TTL {}s",
                        stats.size,
                        stats
                            .max_entries
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| "unbounded".to_string()),
                        stats.hits,
                        stats.misses,
                        stats.hit_rate * 100.0,
                        stats.ttl_secs
                    ),
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                }
            }
            ChatInput::ClearCache => {
                orchestrator.clear_cache().await;
                println!("Cache cleared.");
            }
            ChatInput::SetTtl(secs) => {
                orchestrator.set_cache_ttl(secs)?;
                println!("Cache TTL set to {}s for new entries.", secs);
            }
            ChatInput::Reset => {
                orchestrator.end_session(&session);
                println!("Conversation reset.");
            }
            ChatInput::Quit => break,
            ChatInput::Invalid(message) => println!("{}", message),
        }
    }

    orchestrator.end_session(&session);
    engine.close().await
}

/// Import a roster fixture
pub async fn handle_import(
    file: std::path::PathBuf,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let fixture = RosterFixture::from_file(&file).await?;

    let database = Database::new(&config.db_path())
        .await
        .context("Failed to open database")?;
    let summary = database.roster().import(&fixture).await?;
    let total = database.roster().count().await?;

    match format {
        OutputFormat::Text => {
            println!(
                "Imported {} resources ({} skills, {} availability records) from {}",
                summary.resources,
                summary.skills,
                summary.availability,
                file.display()
            );
            println!("Roster now holds {} resources.", total);
        }
        OutputFormat::Json => {
            let output = json!({
                "imported": summary,
                "total_resources": total,
                "file": file.display().to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await
}

/// Report provider health, cache settings and roster size
pub async fn handle_status(config: &Config, format: OutputFormat) -> Result<()> {
    let router = build_router(config, &SecretCache::new());
    let health = router.check_health().await;

    let database = Database::new(&config.db_path())
        .await
        .context("Failed to open database")?;
    let resources = database.roster().count().await?;

    match format {
        OutputFormat::Text => {
            println!(
                "LLM translation: {}",
                if config.llm.enabled { "enabled" } else { "disabled" }
            );
            println!("Providers:");
            for (name, healthy) in &health {
                println!(
                    "  {:<10} {}",
                    name,
                    if *healthy { "available" } else { "unavailable" }
                );
            }
            println!(
                "Cache: TTL {}s, max entries {}",
                config.cache.ttl_secs,
                config
                    .cache
                    .max_entries
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "unbounded".to_string())
            );
            println!("Roster: {} resources", resources);
        }
        OutputFormat::Json => {
            let providers: Vec<_> = health
                .iter()
                .map(|(name, healthy)| json!({"name": name, "healthy": healthy}))
                .collect();
            let output = json!({
                "llm_enabled": config.llm.enabled,
                "providers": providers,
                "cache": config.cache,
                "resources": resources,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await
}

/// Show the query log
pub async fn handle_history(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.db_path())
        .await
        .context("Failed to open database")?;

    let entries = database
        .query_log()
        .recent(limit as i64)
        .await
        .context("Failed to fetch query history")?;

    match format {
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No queries in history");
            } else {
                println!("Query History (last {} queries):", limit);
                println!();

                for entry in &entries {
                    let created = chrono::DateTime::from_timestamp(entry.created_at, 0)
                        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "Unknown".to_string());

                    println!("[{}] session {}", created, entry.session_id);
                    println!("  Input: {}", entry.input);
                    println!("  Filter: {}", entry.filter_json);
                    println!("  Results: {}", entry.result_count);
                    if let Some(outcome) = &entry.cache_outcome {
                        println!("  Source: {}", outcome);
                    }
                    println!();
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "queries": entries,
                "count": entries.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await
}
