//! Room event relay and per-connection protocol state
//!
//! This module turns inbound client events into addressed outbound events:
//! - Connection lifecycle (welcome, join, leave, disconnect)
//! - Room membership and player records, always updated together
//! - Fan-out as unicast, sender-exclusive broadcast or inclusive broadcast
//! - Targeted forwarding of WebRTC signaling
//!
//! The relay does no I/O. Every call returns an [`Outcome`] listing the
//! envelopes to send, or the reason the event was dropped, and the network
//! layer delivers them. Broadcast recipients are read from the room
//! registry at the moment the event is handled.

use crate::config::RelayConfig;
use crate::player_table::PlayerTable;
use crate::room_registry::RoomRegistry;
use crate::signaling;
use crate::utils::{get_timestamp, normalize_room_name};
use log::{debug, info};
use serde::Serialize;
use shared::{AnnounceKind, ClientEvent, ConnectionId, ServerEvent, SignalEnvelope};
use std::collections::HashMap;

/// Where a connection stands in the join protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Admitted but not yet in a room
    Unjoined,
    Joined { room: String },
    /// Left its room with `leaveRoom`; may join again
    Left,
}

/// One outbound event addressed to one connection
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub to: ConnectionId,
    pub event: ServerEvent,
}

impl Envelope {
    pub fn new(to: ConnectionId, event: ServerEvent) -> Self {
        Self { to, event }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Gameplay event from a connection that is not in a room
    NotJoined,
    AlreadyJoined,
    EmptyChat,
    UnknownConnection,
    TargetNotConnected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Delivered(Vec<Envelope>),
    Ignored(IgnoreReason),
}

impl Outcome {
    pub fn envelopes(&self) -> &[Envelope] {
        match self {
            Outcome::Delivered(envelopes) => envelopes,
            Outcome::Ignored(_) => &[],
        }
    }

    pub fn into_envelopes(self) -> Vec<Envelope> {
        match self {
            Outcome::Delivered(envelopes) => envelopes,
            Outcome::Ignored(_) => Vec::new(),
        }
    }

    pub fn ignored(&self) -> Option<IgnoreReason> {
        match self {
            Outcome::Ignored(reason) => Some(*reason),
            Outcome::Delivered(_) => None,
        }
    }
}

/// Snapshot of relay occupancy, served by the health endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub rooms: usize,
    pub connections: usize,
    pub players: usize,
}

/// Owns all room, player and connection state
///
/// Intended to be driven from a single task; every method runs to
/// completion and leaves membership and player records consistent.
pub struct EventRelay {
    rooms: RoomRegistry,
    players: PlayerTable,
    connections: HashMap<ConnectionId, ConnectionState>,
    default_room: String,
    max_room_name_len: usize,
}

impl EventRelay {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            rooms: RoomRegistry::new(),
            players: PlayerTable::new(config.spawn_bounds, config.palette_size),
            connections: HashMap::new(),
            default_room: config.default_room.clone(),
            max_room_name_len: config.max_room_name_len,
        }
    }

    /// Registers an admitted connection and greets it with its id
    pub fn connect(&mut self, id: ConnectionId) -> Outcome {
        if self.connections.contains_key(&id) {
            return Outcome::Ignored(IgnoreReason::AlreadyJoined);
        }
        self.connections.insert(id, ConnectionState::Unjoined);
        debug!("Connection {} registered", id);

        Outcome::Delivered(vec![Envelope::new(
            id,
            ServerEvent::Connected { connection_id: id },
        )])
    }

    pub fn handle(&mut self, id: ConnectionId, event: ClientEvent) -> Outcome {
        let outcome = match event {
            ClientEvent::JoinRoom { room } => self.join(id, room.as_deref()),
            ClientEvent::PlayerMove { x, y } => self.move_player(id, x, y),
            ClientEvent::ChatMessage { text } => self.chat(id, &text),
            ClientEvent::GetRoomStatus => self.room_status(id),
            ClientEvent::LeaveRoom => self.leave(id),
            ClientEvent::Signal(signal) => self.signal(id, signal),
        };

        if let Outcome::Ignored(reason) = &outcome {
            debug!("Dropped event from {}: {:?}", id, reason);
        }
        outcome
    }

    /// Forgets a closed connection, cleaning up its room if it was in one
    pub fn disconnect(&mut self, id: ConnectionId) -> Outcome {
        match self.connections.remove(&id) {
            None => Outcome::Ignored(IgnoreReason::UnknownConnection),
            Some(ConnectionState::Joined { room }) => Outcome::Delivered(self.depart(id, &room)),
            Some(_) => Outcome::Ignored(IgnoreReason::NotJoined),
        }
    }

    fn join(&mut self, id: ConnectionId, requested: Option<&str>) -> Outcome {
        match self.connections.get(&id) {
            None => return Outcome::Ignored(IgnoreReason::UnknownConnection),
            Some(ConnectionState::Joined { .. }) => {
                return Outcome::Ignored(IgnoreReason::AlreadyJoined)
            }
            Some(ConnectionState::Unjoined | ConnectionState::Left) => {}
        }

        let room = normalize_room_name(requested, &self.default_room);
        if room.chars().count() > self.max_room_name_len {
            return Outcome::Delivered(vec![Envelope::new(
                id,
                ServerEvent::RoomError {
                    message: format!(
                        "Room name must be at most {} characters",
                        self.max_room_name_len
                    ),
                },
            )]);
        }

        self.rooms.join(&room, id);
        let player = self.players.create(&room, id);
        self.connections
            .insert(id, ConnectionState::Joined { room: room.clone() });
        info!(
            "Connection {} joined {} ({} players)",
            id,
            room,
            self.rooms.size(&room)
        );

        let all_players = self.players.list_all(&room);
        let mut envelopes = vec![
            Envelope::new(
                id,
                ServerEvent::PlayerJoined {
                    player_id: id,
                    player_data: player.clone(),
                    all_players: all_players.clone(),
                    room_name: room.clone(),
                },
            ),
            Envelope::new(
                id,
                ServerEvent::ExistingPlayers {
                    players: all_players,
                },
            ),
        ];
        envelopes.extend(self.broadcast(&room, ServerEvent::NewPlayer(player), Some(id)));
        envelopes.extend(self.broadcast(
            &room,
            ServerEvent::Announce {
                kind: AnnounceKind::Join,
                player_id: id,
                message: format!("{} joined {}", id.short_name(), room),
            },
            None,
        ));

        Outcome::Delivered(envelopes)
    }

    fn move_player(&mut self, id: ConnectionId, x: f64, y: f64) -> Outcome {
        let Some(room) = self.joined_room(&id).map(str::to_owned) else {
            return Outcome::Ignored(IgnoreReason::NotJoined);
        };

        let moved = self
            .players
            .update(&room, id, x, y)
            .map(|player| ServerEvent::PlayerMoved {
                player_id: player.id,
                x: player.x,
                y: player.y,
                character: player.character,
            });

        match moved {
            Some(event) => Outcome::Delivered(self.broadcast(&room, event, Some(id))),
            None => Outcome::Ignored(IgnoreReason::NotJoined),
        }
    }

    fn chat(&self, id: ConnectionId, text: &str) -> Outcome {
        let Some(room) = self.joined_room(&id) else {
            return Outcome::Ignored(IgnoreReason::NotJoined);
        };

        let message = text.trim();
        if message.is_empty() {
            return Outcome::Ignored(IgnoreReason::EmptyChat);
        }

        Outcome::Delivered(self.broadcast(
            room,
            ServerEvent::ChatMessage {
                player_id: id,
                player_name: id.short_name(),
                message: message.to_string(),
                timestamp: get_timestamp(),
            },
            None,
        ))
    }

    fn room_status(&self, id: ConnectionId) -> Outcome {
        if !self.connections.contains_key(&id) {
            return Outcome::Ignored(IgnoreReason::UnknownConnection);
        }

        let room = self
            .joined_room(&id)
            .unwrap_or(self.default_room.as_str());
        Outcome::Delivered(vec![Envelope::new(
            id,
            ServerEvent::RoomStatus {
                room_name: room.to_string(),
                players_in_room: self.rooms.size(room),
                total_players_tracked: self.players.total(),
                players_list: self.players.list_all(room),
            },
        )])
    }

    fn leave(&mut self, id: ConnectionId) -> Outcome {
        let Some(room) = self.joined_room(&id).map(str::to_owned) else {
            return Outcome::Ignored(IgnoreReason::NotJoined);
        };

        let envelopes = self.depart(id, &room);
        self.connections.insert(id, ConnectionState::Left);
        Outcome::Delivered(envelopes)
    }

    fn signal(&self, id: ConnectionId, signal: SignalEnvelope) -> Outcome {
        if !self.connections.contains_key(&id) {
            return Outcome::Ignored(IgnoreReason::UnknownConnection);
        }

        match signaling::forward(signal, id, |target| self.connections.contains_key(target)) {
            Some(envelope) => Outcome::Delivered(vec![envelope]),
            None => Outcome::Ignored(IgnoreReason::TargetNotConnected),
        }
    }

    /// Removes the player and membership together, then tells the room
    fn depart(&mut self, id: ConnectionId, room: &str) -> Vec<Envelope> {
        self.players.remove(room, id);
        self.rooms.leave(room, id);
        info!(
            "Connection {} left {} ({} players remain)",
            id,
            room,
            self.rooms.size(room)
        );

        let mut envelopes = self.broadcast(room, ServerEvent::PlayerLeft { player_id: id }, Some(id));
        envelopes.extend(self.broadcast(
            room,
            ServerEvent::Announce {
                kind: AnnounceKind::Leave,
                player_id: id,
                message: format!("{} left {}", id.short_name(), room),
            },
            None,
        ));
        envelopes
    }

    fn broadcast(
        &self,
        room: &str,
        event: ServerEvent,
        exclude: Option<ConnectionId>,
    ) -> Vec<Envelope> {
        self.rooms
            .members(room)
            .into_iter()
            .filter(|member| Some(*member) != exclude)
            .map(|member| Envelope::new(member, event.clone()))
            .collect()
    }

    fn joined_room(&self, id: &ConnectionId) -> Option<&str> {
        match self.connections.get(id) {
            Some(ConnectionState::Joined { room }) => Some(room.as_str()),
            _ => None,
        }
    }

    pub fn state(&self, id: &ConnectionId) -> Option<&ConnectionState> {
        self.connections.get(id)
    }

    pub fn is_connected(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    pub fn players(&self) -> &PlayerTable {
        &self.players
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            rooms: self.rooms.room_count(),
            connections: self.connections.len(),
            players: self.players.total(),
        }
    }
}
