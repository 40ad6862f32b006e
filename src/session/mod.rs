pub mod flow;

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::models::user::UserId;
use crate::session::flow::{Flow, TripDraft};
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct Session {
    pub flow: Option<Flow>,
    pub trip_draft: Option<TripDraft>,
    touched_at: Instant,
}

impl Session {
    fn new() -> Self {
        Self {
            flow: None,
            trip_draft: None,
            touched_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.touched_at.elapsed() >= ttl
    }

    fn expire(&mut self) {
        self.flow = None;
        self.trip_draft = None;
    }

    pub fn is_idle(&self) -> bool {
        self.flow.is_none() && self.trip_draft.is_none()
    }
}

/// Volatile per-user conversation state.
///
/// [`SessionStore::update`] runs its closure under the user's map-shard lock,
/// so duplicate deliveries for one user are applied one after another and
/// never interleave partial writes.
pub struct SessionStore {
    sessions: DashMap<UserId, Session>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    pub fn update<R>(&self, user_id: UserId, apply: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self.sessions.entry(user_id).or_insert_with(Session::new);
        if session.is_expired(self.ttl) {
            session.expire();
        }

        let result = apply(&mut session);
        session.touched_at = Instant::now();
        result
    }

    pub fn get(&self, user_id: UserId) -> Option<Session> {
        let mut session = self.sessions.get(&user_id)?.value().clone();
        if session.is_expired(self.ttl) {
            session.expire();
        }
        Some(session).filter(|session| !session.is_idle())
    }

    /// Drops the active flow and trip draft. Persisted entities are never
    /// touched.
    pub fn abort(&self, user_id: UserId) -> Option<Flow> {
        self.update(user_id, |session| {
            session.trip_draft = None;
            session.flow.take()
        })
    }

    pub fn evict_expired(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired(self.ttl));
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

pub async fn run_session_janitor(state: Arc<AppState>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        let evicted = state.sessions.evict_expired();
        if evicted > 0 {
            debug!(evicted, remaining = state.sessions.len(), "evicted idle sessions");
        }
    }
}
