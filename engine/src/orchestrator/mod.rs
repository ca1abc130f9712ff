//! Session orchestrator
//!
//! Runs one conversational turn:
//!
//! ```text
//! Idle -> Classifying -> Translating -> ResolvingResources
//!      -> [ResolvingAvailability] -> Responding -> Idle
//! ```
//!
//! A turn performs at most one cache read, one store fetch, one availability
//! lookup and one context update. The context is only written once the reply
//! is ready; a failed or abandoned turn leaves it as it was.

use crate::cache::{CacheOutcome, CacheStats, ResourceList, ResultCache};
use crate::db::{QueryLogEntry, QueryLogRepository};
use crate::filter::Filter;
use crate::response::ResponseAssembler;
use crate::session::{ConversationContext, Session, SessionRegistry, TurnRecord};
use crate::store::{AvailabilityMap, ResourceQuery, ResourceStore, StoreError};
use crate::translator::{QueryTranslator, Strategy, Translation, TurnKind};
use sdk::errors::EngineError;
use sdk::types::Resource;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Orchestrator states, in the order a full turn visits them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    Classifying,
    Translating,
    ResolvingResources,
    ResolvingAvailability,
    Responding,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Classifying => "classifying",
            Self::Translating => "translating",
            Self::ResolvingResources => "resolving_resources",
            Self::ResolvingAvailability => "resolving_availability",
            Self::Responding => "responding",
        };
        f.write_str(s)
    }
}

/// What kind of reply a turn produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    Answer,
    Clarification,
    Degraded,
}

/// Where a turn's resource list came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceSource {
    Cache(CacheOutcome),
    /// Reused from the conversation for an availability-only follow-up
    Context,
    /// The rank expression admits no rank, so nothing was fetched
    Empty,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnReply {
    pub session_id: String,
    pub text: String,
    pub kind: ReplyKind,
    pub turn_kind: TurnKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ResourceSource>,
    pub resources: Vec<Resource>,
    #[serde(skip_serializing_if = "AvailabilityMap::is_empty")]
    pub availability: AvailabilityMap,
    pub states: Vec<TurnState>,
}

/// Tunables taken from configuration
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    pub store_timeout: Duration,
    pub fetch_limit: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
            fetch_limit: 200,
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &crate::config::StoreConfig) -> Self {
        Self {
            store_timeout: Duration::from_secs(config.timeout_secs),
            fetch_limit: config.fetch_limit as usize,
        }
    }
}

/// State transitions of one turn, logged as they happen
struct Trace {
    session_id: String,
    states: Vec<TurnState>,
}

impl Trace {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            states: vec![TurnState::Idle],
        }
    }

    fn enter(&mut self, state: TurnState) {
        debug!(session = %self.session_id, "Turn state -> {}", state);
        self.states.push(state);
    }

    fn finish(mut self) -> Vec<TurnState> {
        self.enter(TurnState::Idle);
        self.states
    }
}

pub struct Orchestrator {
    translator: Arc<QueryTranslator>,
    cache: Arc<ResultCache>,
    store: Arc<dyn ResourceStore>,
    sessions: Arc<SessionRegistry>,
    assembler: ResponseAssembler,
    settings: OrchestratorSettings,
    query_log: Option<QueryLogRepository>,
}

impl Orchestrator {
    pub fn new(
        translator: Arc<QueryTranslator>,
        cache: Arc<ResultCache>,
        store: Arc<dyn ResourceStore>,
        sessions: Arc<SessionRegistry>,
        settings: OrchestratorSettings,
    ) -> Self {
        let assembler = ResponseAssembler::new(Arc::clone(translator.hierarchy()));
        Self {
            translator,
            cache,
            store,
            sessions,
            assembler,
            settings,
            query_log: None,
        }
    }

    /// Persist every answered turn to the query log
    pub fn with_query_log(mut self, query_log: QueryLogRepository) -> Self {
        self.query_log = Some(query_log);
        self
    }

    /// Answer one message in a session.
    ///
    /// Backend failures come back as a degraded reply, not an error. The only
    /// error is [`EngineError::SessionClosed`], when the session is ended
    /// while the turn waits or runs.
    pub async fn handle_turn(&self, session_id: &str, text: &str) -> Result<TurnReply, EngineError> {
        let session = self.sessions.get_or_create(session_id);

        tokio::select! {
            biased;
            _ = session.closed() => {
                info!("Abandoning turn for closed session {}", session_id);
                Err(EngineError::SessionClosed(session_id.to_string()))
            }
            reply = self.run_turn(&session, text) => Ok(reply),
        }
    }

    async fn run_turn(&self, session: &Session, text: &str) -> TurnReply {
        let mut ctx = session.lock().await;
        let mut trace = Trace::new(session.id());

        trace.enter(TurnState::Classifying);
        let translation = self.translator.translate(text, ctx.last_filter()).await;

        if translation.kind == TurnKind::NotResourceQuery {
            debug!("{}", EngineError::ParseAmbiguous);
            trace.enter(TurnState::Responding);
            return TurnReply {
                session_id: session.id().to_string(),
                text: self.assembler.clarification(),
                kind: ReplyKind::Clarification,
                turn_kind: translation.kind,
                filter: None,
                strategy: Some(translation.strategy),
                source: None,
                resources: Vec::new(),
                availability: AvailabilityMap::new(),
                states: trace.finish(),
            };
        }

        trace.enter(TurnState::Translating);
        debug!(
            kind = %translation.kind,
            "Resolved filter: {}",
            translation.filter.summary()
        );

        match self.resolve(&ctx, &translation, &mut trace).await {
            Ok(resolved) => {
                trace.enter(TurnState::Responding);
                let text_out = self.assembler.answer(
                    &translation.filter,
                    &resolved.matched,
                    resolved.availability_requested.then_some(&resolved.availability),
                );

                let record = TurnRecord::new(
                    text,
                    translation.kind,
                    translation.filter.clone(),
                    resolved.matched.len(),
                );
                ctx.commit(
                    translation.filter.clone(),
                    Arc::clone(&resolved.scope),
                    resolved.availability.clone(),
                    record,
                );
                drop(ctx);

                self.log_query(session.id(), text, &translation, &resolved)
                    .await;

                TurnReply {
                    session_id: session.id().to_string(),
                    text: text_out,
                    kind: ReplyKind::Answer,
                    turn_kind: translation.kind,
                    filter: Some(translation.filter),
                    strategy: Some(translation.strategy),
                    source: Some(resolved.source),
                    resources: resolved.matched,
                    availability: resolved.availability,
                    states: trace.finish(),
                }
            }
            Err(err) => {
                warn!("Turn degraded for session {}: {}", session.id(), err);
                trace.enter(TurnState::Responding);
                TurnReply {
                    session_id: session.id().to_string(),
                    text: self.assembler.degraded(&err),
                    kind: ReplyKind::Degraded,
                    turn_kind: translation.kind,
                    filter: Some(translation.filter),
                    strategy: Some(translation.strategy),
                    source: None,
                    resources: Vec::new(),
                    availability: AvailabilityMap::new(),
                    states: trace.finish(),
                }
            }
        }
    }

    async fn resolve(
        &self,
        ctx: &ConversationContext,
        translation: &Translation,
        trace: &mut Trace,
    ) -> Result<Resolved, EngineError> {
        let filter = &translation.filter;

        trace.enter(TurnState::ResolvingResources);
        let (scope, source) = self.resolve_resources(ctx, translation).await?;

        let availability_requested = filter.requests_availability();
        let mut availability = AvailabilityMap::new();
        let mut matched: Vec<Resource> = scope.as_ref().clone();

        if availability_requested && !scope.is_empty() {
            trace.enter(TurnState::ResolvingAvailability);
            let ids: Vec<String> = scope.iter().map(|r| r.id.clone()).collect();
            availability = self
                .with_store_timeout(self.store.availability(&ids, &filter.availability_weeks))
                .await?;

            if let Some(status) = filter.availability_status {
                matched.retain(|r| {
                    availability
                        .get(&r.id)
                        .map_or(false, |records| records.iter().any(|rec| rec.status == status))
                });
                availability.retain(|id, _| matched.iter().any(|r| &r.id == id));
            }
        }

        Ok(Resolved {
            scope,
            source,
            matched,
            availability,
            availability_requested,
        })
    }

    async fn resolve_resources(
        &self,
        ctx: &ConversationContext,
        translation: &Translation,
    ) -> Result<(ResourceList, ResourceSource), EngineError> {
        // Availability-only follow-up: same resource scope as last turn
        if translation.kind == TurnKind::FollowUp
            && !translation.candidate.has_core_fields()
            && ctx.last_filter().is_some()
        {
            debug!("Reusing {} resources from context", ctx.last_resources().len());
            return Ok((Arc::clone(ctx.last_resources()), ResourceSource::Context));
        }

        let scope = translation.filter.resource_scope();
        let Some(query) = ResourceQuery::from_filter(
            &scope,
            self.translator.hierarchy(),
            self.settings.fetch_limit,
        ) else {
            debug!("Rank expression admits no ranks; skipping fetch");
            return Ok((ResourceList::default(), ResourceSource::Empty));
        };

        let (resources, outcome) = self
            .cache
            .get_or_fetch(&scope, || {
                self.with_store_timeout(self.store.find_resources(&query))
            })
            .await
            .map_err(|e| self.unshare(e))?;

        debug!("Resolved {} resources ({})", resources.len(), outcome);
        Ok((resources, ResourceSource::Cache(outcome)))
    }

    async fn with_store_timeout<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, EngineError> {
        match tokio::time::timeout(self.settings.store_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(EngineError::BackendUnavailable {
                backend: self.store.name().to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(EngineError::StoreTimeout(self.settings.store_timeout.as_secs())),
        }
    }

    /// Recover the error from a fetch whose failure was shared with waiters
    fn unshare(&self, error: Arc<EngineError>) -> EngineError {
        Arc::try_unwrap(error).unwrap_or_else(|shared| match shared.as_ref() {
            EngineError::StoreTimeout(secs) => EngineError::StoreTimeout(*secs),
            EngineError::BackendUnavailable { backend, reason } => {
                EngineError::BackendUnavailable {
                    backend: backend.clone(),
                    reason: reason.clone(),
                }
            }
            other => EngineError::BackendUnavailable {
                backend: self.store.name().to_string(),
                reason: other.to_string(),
            },
        })
    }

    async fn log_query(
        &self,
        session_id: &str,
        text: &str,
        translation: &Translation,
        resolved: &Resolved,
    ) {
        let Some(query_log) = &self.query_log else {
            return;
        };

        let filter_json = match serde_json::to_string(&translation.filter) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize filter for query log: {}", e);
                return;
            }
        };

        let mut entry = QueryLogEntry::new(session_id, text, filter_json, resolved.matched.len());
        entry.fingerprint = Some(translation.filter.resource_scope().fingerprint().to_string());
        entry.cache_outcome = Some(match resolved.source {
            ResourceSource::Cache(outcome) => outcome.to_string(),
            ResourceSource::Context => "context".to_string(),
            ResourceSource::Empty => "empty".to_string(),
        });

        if let Err(e) = query_log.record(&entry).await {
            warn!("Failed to write query log: {}", e);
        }
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        info!("Result cache cleared");
    }

    /// Change the TTL for entries written from now on
    pub fn set_cache_ttl(&self, ttl_secs: u64) -> Result<(), EngineError> {
        if ttl_secs == 0 {
            return Err(EngineError::Config("cache TTL must be greater than 0".to_string()));
        }
        self.cache.set_ttl(Duration::from_secs(ttl_secs));
        info!("Result cache TTL set to {}s", ttl_secs);
        Ok(())
    }

    /// Discard a session's context and abandon its in-flight turn
    pub fn end_session(&self, session_id: &str) -> bool {
        self.sessions.end(session_id)
    }

    /// Copy of a session's context, if the session exists
    pub async fn context(&self, session_id: &str) -> Option<ConversationContext> {
        let session = self.sessions.get(session_id)?;
        let ctx = session.lock().await;
        Some(ctx.clone())
    }
}

struct Resolved {
    /// Resources in the filter's resource scope
    scope: ResourceList,
    source: ResourceSource,
    /// Scope narrowed by availability status
    matched: Vec<Resource>,
    availability: AvailabilityMap,
    availability_requested: bool,
}
