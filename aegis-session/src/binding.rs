//! Session bindings: the tuple `(session_key, identity_id, last_active,
//! expires_at, is_active)`, and the in-memory + durable stores that
//! back the identity resolver's cache and durable-session paths.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SessionError, SessionResult};

/// One session binding: a transport-level session key bound to an
/// identity. At most one binding per identity may have `is_active =
/// true` at any instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionBinding {
    pub session_key: String,
    pub identity_id: Uuid,
    pub last_active: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
}

impl SessionBinding {
    pub fn new(session_key: String, identity_id: Uuid, idle_timeout: Duration) -> Self {
        let now = Utc::now();
        Self {
            session_key,
            identity_id,
            last_active: now,
            expires_at: now + chrono::Duration::from_std(idle_timeout).unwrap_or_default(),
            is_active: true,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.is_active || now > self.expires_at
    }

    pub fn touch(&mut self, idle_timeout: Duration) {
        let now = Utc::now();
        self.last_active = now;
        self.expires_at = now + chrono::Duration::from_std(idle_timeout).unwrap_or_default();
    }
}

/// Durable session store: every binding ever created, keyed by
/// `session_key`, plus a reverse index enforcing at-most-one-active-
/// binding-per-identity. Concurrency-safe via `DashMap`, the same
/// pattern `ai_session::core::SessionManager` uses.
#[derive(Debug, Default)]
pub struct SessionStore {
    by_key: DashMap<String, SessionBinding>,
    active_by_identity: DashMap<Uuid, String>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            by_key: DashMap::new(),
            active_by_identity: DashMap::new(),
        }
    }

    /// Look up a binding by session key, regardless of whether it is
    /// still active.
    pub fn get(&self, session_key: &str) -> Option<SessionBinding> {
        self.by_key.get(session_key).map(|e| e.value().clone())
    }

    /// True if `identity_id` currently has an active binding under a
    /// *different* session key than `excluding`.
    pub fn has_active_elsewhere(&self, identity_id: Uuid, excluding: &str) -> bool {
        match self.active_by_identity.get(&identity_id) {
            Some(key) => key.value() != excluding,
            None => false,
        }
    }

    pub fn active_session_key(&self, identity_id: Uuid) -> Option<String> {
        self.active_by_identity
            .get(&identity_id)
            .map(|e| e.value().clone())
    }

    /// Atomically bind `session_key` to `identity_id`, failing if the
    /// identity is already actively bound elsewhere. This is the
    /// enforcement point for the at-most-one-active-binding invariant
    /// and for the "identity already in use" security policy — the
    /// caller never learns the other session's key.
    ///
    /// The check-then-insert on `active_by_identity` happens under a
    /// single `entry()` guard rather than a separate read followed by
    /// a separate write, so two concurrent binds for the same identity
    /// cannot both observe "unclaimed" and both win.
    pub fn bind(
        &self,
        session_key: String,
        identity_id: Uuid,
        idle_timeout: Duration,
    ) -> SessionResult<SessionBinding> {
        use dashmap::mapref::entry::Entry;

        match self.active_by_identity.entry(identity_id) {
            Entry::Occupied(mut occupied) if occupied.get() != &session_key => {
                return Err(SessionError::IdentityInUse);
            }
            Entry::Occupied(mut occupied) => {
                occupied.insert(session_key.clone());
            }
            Entry::Vacant(vacant) => {
                vacant.insert(session_key.clone());
            }
        }

        let binding = SessionBinding::new(session_key.clone(), identity_id, idle_timeout);
        self.by_key.insert(session_key, binding.clone());
        Ok(binding)
    }

    /// Refresh `last_active`/`expires_at` on an existing active binding.
    pub fn touch(&self, session_key: &str, idle_timeout: Duration) -> SessionResult<SessionBinding> {
        let mut entry = self
            .by_key
            .get_mut(session_key)
            .ok_or_else(|| SessionError::NotBound(session_key.to_string()))?;
        entry.touch(idle_timeout);
        Ok(entry.clone())
    }

    /// End a binding explicitly (logout, identity archive, etc).
    pub fn end(&self, session_key: &str) {
        if let Some((_, mut binding)) = self.by_key.remove(session_key) {
            binding.is_active = false;
            self.active_by_identity
                .remove_if(&binding.identity_id, |_, v| v == session_key);
        }
    }

    /// Sweep expired bindings. Returns the number removed. Run
    /// periodically (session expiry is swept, not just checked
    /// lazily on access) and opportunistically before a bind attempt.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = self
            .by_key
            .iter()
            .filter(|e| e.value().is_expired(now))
            .map(|e| e.key().clone())
            .collect();

        let count = expired.len();
        for key in expired {
            self.end(&key);
        }
        count
    }
}

/// Shared handle, cheap to clone, suitable for stashing in an
/// `Arc<SessionStore>` and handing out to resolver/dispatcher code.
pub type SharedSessionStore = Arc<SessionStore>;
