//! Session persistence.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use crate::session::{Session, SessionError};

/// Durable per-client store addressed by session id.
pub trait SessionStore: Send + Sync {
    /// Load the session for `id`, creating a fresh one when absent or expired.
    fn load(&self, id: Option<&str>) -> Result<Session, SessionError>;

    /// Persist the session.
    fn save(&self, session: &Session) -> Result<(), SessionError>;
}

#[derive(Debug, Clone)]
struct StoredSession {
    values: HashMap<String, serde_json::Value>,
    expires_at: Instant,
}

/// Saves between two sweeps of expired sessions.
pub const DEFAULT_PURGE_EVERY: usize = 256;

/// In-process store with sliding expiry.
///
/// Expired sessions are swept on every `purge_every`-th save, so the store
/// stays bounded by the sessions active within `max_age`.
#[derive(Debug, Clone)]
pub struct MemorySessionStore {
    inner: Arc<DashMap<String, StoredSession>>,
    max_age: Duration,
    purge_every: usize,
    saves: Arc<AtomicUsize>,
}

impl MemorySessionStore {
    pub fn new(max_age: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            max_age,
            purge_every: DEFAULT_PURGE_EVERY,
            saves: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sweep expired sessions every `saves` saves. Zero is treated as one.
    pub fn with_purge_every(mut self, saves: usize) -> Self {
        self.purge_every = saves.max(1);
        self
    }

    /// Number of stored sessions, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drop expired sessions. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, stored| stored.expires_at > now);
        before - self.inner.len()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, id: Option<&str>) -> Result<Session, SessionError> {
        if let Some(id) = id {
            if let Some(stored) = self.inner.get(id) {
                if stored.expires_at > Instant::now() {
                    return Ok(Session::restore(id.to_string(), stored.values.clone()));
                }
            }
        }
        Ok(Session::new(Uuid::new_v4().to_string()))
    }

    fn save(&self, session: &Session) -> Result<(), SessionError> {
        let saves = self.saves.fetch_add(1, Ordering::Relaxed) + 1;
        if saves % self.purge_every == 0 {
            let purged = self.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, remaining = self.inner.len(), "Purged expired sessions");
            }
        }

        self.inner.insert(
            session.id().to_string(),
            StoredSession {
                values: session.values().clone(),
                expires_at: Instant::now() + self.max_age,
            },
        );
        Ok(())
    }
}
