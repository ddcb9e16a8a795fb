//! Session table with sliding expiration.
//!
//! # Responsibilities
//! - Resolve a client-supplied session id to a live record, or mint a new one
//! - Slide expiry to `now + ttl` on every resolution
//! - Sweep expired records on a fixed period, independent of traffic
//!
//! # Design Decisions
//! - `DashMap` sharded table: unrelated ids never contend on one lock
//! - Sweep collects expired keys first, then removes each with `remove_if`,
//!   so a record touched between the scan and the removal survives
//! - Ids are random UUID v4 (simple form), never chosen by the client
//! - Expiry is stored as epoch milliseconds in an atomic so touching a record
//!   needs only a shared reference

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::observability::metrics;

/// One client's session: id, expiry, and free-form state.
#[derive(Debug)]
pub struct Session {
    id: String,
    expires_at_ms: AtomicI64,
    state: DashMap<String, Value>,
}

impl Session {
    fn new(id: String, expires_at_ms: i64) -> Self {
        Self {
            id,
            expires_at_ms: AtomicI64::new(expires_at_ms),
            state: DashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Absolute expiry time.
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.expires_at_ms.load(Ordering::Relaxed)).unwrap_or_default()
    }

    /// True once `now` is past the expiry time.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() > self.expires_at_ms.load(Ordering::Relaxed)
    }

    fn touch(&self, now: DateTime<Utc>, ttl_ms: i64) {
        self.expires_at_ms
            .store(now.timestamp_millis().saturating_add(ttl_ms), Ordering::Relaxed);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.get(key).map(|v| v.value().clone())
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.state.insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.state.remove(key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.state.contains_key(key)
    }

    /// Stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    fn clear_state(&self) {
        self.state.clear();
    }
}

/// Result of correlating a request with the table.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub session: Arc<Session>,
    /// True when no live record matched and a new one was minted.
    pub created: bool,
}

/// Shortest period the sweeper will run at.
pub const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(1);

/// Process-wide session table.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<Session>>,
    ttl_ms: i64,
    sweep_period: Duration,
}

impl SessionStore {
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_ttl(
            Duration::from_secs(config.ttl_secs),
            Duration::from_secs(config.sweep_period_secs),
        )
    }

    /// A zero `sweep_period` is raised to [`MIN_SWEEP_PERIOD`].
    pub fn with_ttl(ttl: Duration, sweep_period: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl_ms: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
            sweep_period: sweep_period.max(MIN_SWEEP_PERIOD),
        }
    }

    /// Number of records currently in the table, expired or not.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Look up a record without touching its expiry.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Resolve `id` to a live record or create a new one.
    pub fn resolve_or_create(&self, id: Option<&str>) -> Resolution {
        self.resolve_or_create_at(id, Utc::now())
    }

    pub fn resolve_or_create_at(&self, id: Option<&str>, now: DateTime<Utc>) -> Resolution {
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            {
                if let Some(entry) = self.sessions.get(id) {
                    if !entry.is_expired_at(now) {
                        // Touch while the shard guard is held so a concurrent
                        // sweep re-checks the new expiry.
                        entry.touch(now, self.ttl_ms);
                        return Resolution {
                            session: entry.value().clone(),
                            created: false,
                        };
                    }
                }
            }
            // Expired but not swept yet.
            self.sessions.remove_if(id, |_, session| session.is_expired_at(now));
        }

        let session = self.insert_new(now);
        metrics::record_session_created(self.sessions.len());
        tracing::debug!(session_id = %session.id(), "Session created");
        Resolution {
            session,
            created: true,
        }
    }

    fn insert_new(&self, now: DateTime<Utc>) -> Arc<Session> {
        let expires_at_ms = now.timestamp_millis().saturating_add(self.ttl_ms);
        loop {
            let id = Uuid::new_v4().simple().to_string();
            if let Entry::Vacant(slot) = self.sessions.entry(id) {
                let session = Arc::new(Session::new(slot.key().clone(), expires_at_ms));
                slot.insert(session.clone());
                return session;
            }
        }
    }

    /// Remove a record and drop its state. Returns false if it was already gone.
    pub fn clear(&self, session: &Session) -> bool {
        session.clear_state();
        let removed = self.sessions.remove(session.id()).is_some();
        if removed {
            tracing::debug!(session_id = %session.id(), "Session cleared");
        }
        removed
    }

    /// Remove every record whose expiry has passed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_expired_at(now))
            .map(|entry| entry.key().clone())
            .collect();

        let removed = expired
            .iter()
            .filter(|id| {
                self.sessions
                    .remove_if(id.as_str(), |_, session| session.is_expired_at(now))
                    .is_some()
            })
            .count();

        metrics::record_sessions_expired(removed, self.sessions.len());
        removed
    }

    /// Start the periodic sweep. The task exits when `shutdown` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            tracing::info!(
                period_ms = store.sweep_period.as_millis() as u64,
                "Session sweeper starting"
            );

            let mut ticker = time::interval(store.sweep_period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = store.sweep();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = store.len(), "Expired sessions swept");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Session sweeper received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }
}
