//! Transport-session bookkeeping with time-based expiry
//!
//! The store remembers which connection ids have been admitted so a client
//! reconnecting with `?sid=<id>` can be recognised. Entries are not removed
//! when a connection closes; they age out through `cleanup`, which leaves a
//! window for brief reconnects after a transport hiccup. Nothing in here is
//! consulted for room or player state.

use log::info;
use shared::ConnectionId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const DEFAULT_TRANSPORT: &str = "websocket";

/// Metadata captured from the handshake of an admitted connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionData {
    pub transport: String,
}

impl Default for SessionData {
    fn default() -> Self {
        Self {
            transport: DEFAULT_TRANSPORT.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub data: SessionData,
    /// Overwritten on every `put`
    pub stamped_at: Instant,
}

impl Session {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.stamped_at)
    }
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<ConnectionId, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, id: ConnectionId, data: SessionData) {
        self.put_at(id, data, Instant::now());
    }

    pub fn put_at(&mut self, id: ConnectionId, data: SessionData, stamped_at: Instant) {
        self.sessions.insert(id, Session { data, stamped_at });
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn has(&self, id: &ConnectionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn delete(&mut self, id: &ConnectionId) -> bool {
        self.sessions.remove(id).is_some()
    }

    /// Removes every session older than `max_age`, returning how many went
    pub fn cleanup(&mut self, max_age: Duration) -> usize {
        self.cleanup_at(Instant::now(), max_age)
    }

    pub fn cleanup_at(&mut self, now: Instant, max_age: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.age(now) <= max_age);
        let removed = before - self.sessions.len();

        if removed > 0 {
            info!(
                "Expired {} sessions, {} remaining",
                removed,
                self.sessions.len()
            );
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
