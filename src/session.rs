//! Registry of authenticated org sessions.
//!
//! The single source of truth for "who is logged in", keyed by the opaque
//! organization identifier the remote service returns. At most one live
//! session exists per identifier; re-login replaces it.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// An authenticated context for one remote organization.
///
/// The access token is a secret: it never crosses to an untrusted surface
/// and never goes through the log store.
#[derive(Debug, Clone)]
pub struct OrgSession {
    pub instance_url: String,
    pub access_token: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// Owned session map plus per-identifier operation locks.
///
/// Individual map operations are atomic, but a lookup-await-mutate sequence
/// spanning a remote call is not. Callers hold the identifier's operation
/// lock across any such sequence so a login and a logout for the same org
/// cannot interleave mid-flight.
pub struct SessionRegistry {
    sessions: DashMap<String, OrgSession>,
    op_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            op_locks: DashMap::new(),
        }
    }

    /// Register a session, replacing any prior session for the same org.
    pub fn register(&self, org_id: &str, session: OrgSession) {
        self.sessions.insert(org_id.to_string(), session);
    }

    /// Remove and return the session for an org, if present.
    pub fn remove(&self, org_id: &str) -> Option<OrgSession> {
        self.sessions.remove(org_id).map(|(_, session)| session)
    }

    pub fn get(&self, org_id: &str) -> Option<OrgSession> {
        self.sessions.get(org_id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, org_id: &str) -> bool {
        self.sessions.contains_key(org_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Operation lock for one org identifier. The same `Arc` is returned for
    /// every caller asking about the same id, so holding the mutex serializes
    /// login/logout sequences for that org while leaving other orgs free.
    pub fn op_lock(&self, org_id: &str) -> Arc<Mutex<()>> {
        self.op_locks
            .entry(org_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
