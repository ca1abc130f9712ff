//! Conversation sessions
//!
//! Each session owns one [`ConversationContext`] behind an async mutex.
//! Turns lock it for their whole duration, so turns of one session run one
//! at a time in arrival order while different sessions proceed in parallel.
//! Ending a session removes it from the registry and signals any in-flight
//! turn to abandon.

use crate::cache::ResourceList;
use crate::filter::Filter;
use crate::store::AvailabilityMap;
use crate::translator::TurnKind;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Mutex as AsyncMutex, MutexGuard};
use tracing::{debug, info};

/// One answered turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRecord {
    pub text: String,
    pub kind: TurnKind,
    pub filter: Filter,
    pub result_count: usize,
    pub at: DateTime<Utc>,
}

impl TurnRecord {
    pub fn new(text: &str, kind: TurnKind, filter: Filter, result_count: usize) -> Self {
        Self {
            text: text.to_string(),
            kind,
            filter,
            result_count,
            at: Utc::now(),
        }
    }
}

/// What a conversation remembers between turns
#[derive(Debug, Clone)]
pub struct ConversationContext {
    session_id: String,
    last_filter: Option<Filter>,
    /// Resources matching the last filter's resource scope
    last_resources: ResourceList,
    last_availability: AvailabilityMap,
    history: VecDeque<TurnRecord>,
    history_limit: usize,
}

impl ConversationContext {
    pub fn new(session_id: impl Into<String>, history_limit: usize) -> Self {
        Self {
            session_id: session_id.into(),
            last_filter: None,
            last_resources: ResourceList::default(),
            last_availability: AvailabilityMap::new(),
            history: VecDeque::new(),
            history_limit: history_limit.max(1),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn last_filter(&self) -> Option<&Filter> {
        self.last_filter.as_ref()
    }

    pub fn last_resources(&self) -> &ResourceList {
        &self.last_resources
    }

    pub fn last_availability(&self) -> &AvailabilityMap {
        &self.last_availability
    }

    /// Oldest turn first
    pub fn history(&self) -> impl Iterator<Item = &TurnRecord> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Record a successful turn. This is the only mutation a turn makes.
    pub fn commit(
        &mut self,
        filter: Filter,
        resources: ResourceList,
        availability: AvailabilityMap,
        record: TurnRecord,
    ) {
        self.last_filter = Some(filter);
        self.last_resources = resources;
        self.last_availability = availability;

        self.history.push_back(record);
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }
}

/// A live session: its context plus a close signal
pub struct Session {
    id: String,
    context: AsyncMutex<ConversationContext>,
    closed: watch::Sender<bool>,
}

impl Session {
    fn new(id: &str, history_limit: usize) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id: id.to_string(),
            context: AsyncMutex::new(ConversationContext::new(id, history_limit)),
            closed,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for exclusive access to the context (FIFO)
    pub async fn lock(&self) -> MutexGuard<'_, ConversationContext> {
        self.context.lock().await
    }

    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the session is closed
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives as long as `self`, so this only ends on close
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

/// All live sessions, keyed by id
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    history_limit: usize,
}

impl SessionRegistry {
    pub fn new(history_limit: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            history_limit,
        }
    }

    pub fn from_config(config: &crate::config::SessionConfig) -> Self {
        Self::new(config.history_limit)
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The live session for `id`, created on first use
    pub fn get_or_create(&self, id: &str) -> Arc<Session> {
        let mut sessions = self.sessions();
        let session = sessions.entry(id.to_string()).or_insert_with(|| {
            debug!("Creating session {}", id);
            Arc::new(Session::new(id, self.history_limit))
        });
        Arc::clone(session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions().get(id).map(Arc::clone)
    }

    /// Discard a session. In-flight turns are abandoned without touching
    /// its context; the next turn with the same id starts fresh.
    pub fn end(&self, id: &str) -> bool {
        match self.sessions().remove(id) {
            Some(session) => {
                session.close();
                info!("Ended session {}", id);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
