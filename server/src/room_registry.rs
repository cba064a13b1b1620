//! Room membership tracking
//!
//! Maps room names to the set of connections currently inside them. Rooms
//! come into existence on first join and are dropped the moment their last
//! member leaves, so ad-hoc room names never accumulate. Room names are
//! taken as given; normalising blank names is the caller's job.

use log::debug;
use shared::ConnectionId;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the member set for `room`, creating an empty one if needed
    ///
    /// Callers are expected to insert a member straight away; `join` is the
    /// only caller inside this crate.
    pub fn get_or_create(&mut self, room: &str) -> &mut HashSet<ConnectionId> {
        self.rooms.entry(room.to_string()).or_insert_with(|| {
            debug!("Created room {}", room);
            HashSet::new()
        })
    }

    pub fn join(&mut self, room: &str, id: ConnectionId) {
        self.get_or_create(room).insert(id);
    }

    /// Removes `id` from `room`, deleting the room once it is empty
    ///
    /// Returns true if the connection was a member.
    pub fn leave(&mut self, room: &str, id: ConnectionId) -> bool {
        let Some(members) = self.rooms.get_mut(room) else {
            return false;
        };

        let removed = members.remove(&id);
        if members.is_empty() {
            self.rooms.remove(room);
            debug!("Deleted empty room {}", room);
        }
        removed
    }

    pub fn size(&self, room: &str) -> usize {
        self.rooms.get(room).map_or(0, HashSet::len)
    }

    pub fn contains(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    pub fn is_member(&self, room: &str, id: &ConnectionId) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|members| members.contains(id))
    }

    /// Point-in-time snapshot of a room's members
    pub fn members(&self, room: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
