use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_ROOM: &str = "lobby";
pub const SHORT_NAME_LEN: usize = 6;
pub const CHARACTER_PREFIX: &str = "character";

/// Server-assigned identifier of one transport session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Display name shown to other players, a prefix of the id itself
    pub fn short_name(&self) -> String {
        self.0.to_string().chars().take(SHORT_NAME_LEN).collect()
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Sprite tag, serialized as `character1`, `character2`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Character(u32);

impl Character {
    pub fn new(index: u32) -> Self {
        Self(index.max(1))
    }

    /// Round-robin pick keyed by how many players are already in the room
    pub fn from_occupancy(occupancy: usize, palette_size: u32) -> Self {
        let palette = palette_size.max(1) as usize;
        Self((occupancy % palette) as u32 + 1)
    }

    pub fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Character {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", CHARACTER_PREFIX, self.0)
    }
}

impl From<Character> for String {
    fn from(character: Character) -> Self {
        character.to_string()
    }
}

impl TryFrom<String> for Character {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value
            .strip_prefix(CHARACTER_PREFIX)
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|n| *n >= 1)
            .map(Character)
            .ok_or_else(|| format!("invalid character tag: {}", value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: ConnectionId,
    pub x: f64,
    pub y: f64,
    pub character: Character,
    pub room: String,
}

impl Player {
    pub fn new(id: ConnectionId, x: f64, y: f64, character: Character, room: &str) -> Self {
        Self {
            id,
            x,
            y,
            character,
            room: room.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    pub fn event_name(&self) -> &'static str {
        match self {
            SignalKind::Offer => "webrtc-offer",
            SignalKind::Answer => "webrtc-answer",
            SignalKind::IceCandidate => "webrtc-ice-candidate",
        }
    }

    /// Name of the field carrying the opaque payload
    pub fn payload_field(&self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "candidate",
        }
    }

    fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "webrtc-offer" => Some(SignalKind::Offer),
            "webrtc-answer" => Some(SignalKind::Answer),
            "webrtc-ice-candidate" => Some(SignalKind::IceCandidate),
            _ => None,
        }
    }
}

/// Addressed WebRTC signaling message; the payload is never inspected
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEnvelope {
    pub kind: SignalKind,
    pub target: String,
    pub payload: Value,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    #[error("invalid payload for {event}: {reason}")]
    InvalidPayload { event: String, reason: String },
}

/// Envelope every message travels in: `{"event": "...", "data": ...}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    JoinRoom { room: Option<String> },
    PlayerMove { x: f64, y: f64 },
    ChatMessage { text: String },
    GetRoomStatus,
    LeaveRoom,
    Signal(SignalEnvelope),
}

#[derive(Deserialize)]
struct JoinPayload {
    #[serde(default)]
    room: Option<String>,
}

#[derive(Deserialize)]
struct MovePayload {
    x: f64,
    y: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChatPayload {
    Text(String),
    Object {
        #[serde(alias = "message")]
        text: String,
    },
}

impl ClientEvent {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let frame: Frame = serde_json::from_str(text)?;
        Self::from_frame(frame)
    }

    pub fn from_frame(frame: Frame) -> Result<Self, ProtocolError> {
        let Frame { event, data } = frame;
        match event.as_str() {
            "joinRoom" => {
                let room = if data.is_null() {
                    None
                } else {
                    payload::<JoinPayload>(&event, data)?.room
                };
                Ok(ClientEvent::JoinRoom { room })
            }
            "playerMove" => {
                let MovePayload { x, y } = payload(&event, data)?;
                Ok(ClientEvent::PlayerMove { x, y })
            }
            "chatMessage" => {
                let text = match payload::<ChatPayload>(&event, data)? {
                    ChatPayload::Text(text) => text,
                    ChatPayload::Object { text } => text,
                };
                Ok(ClientEvent::ChatMessage { text })
            }
            "getRoomStatus" => Ok(ClientEvent::GetRoomStatus),
            "leaveRoom" => Ok(ClientEvent::LeaveRoom),
            name => match SignalKind::from_event_name(name) {
                Some(kind) => decode_signal(kind, data).map(ClientEvent::Signal),
                None => Err(ProtocolError::UnknownEvent(event)),
            },
        }
    }
}

fn payload<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|e| ProtocolError::InvalidPayload {
        event: event.to_string(),
        reason: e.to_string(),
    })
}

fn decode_signal(kind: SignalKind, data: Value) -> Result<SignalEnvelope, ProtocolError> {
    let invalid = |reason: &str| ProtocolError::InvalidPayload {
        event: kind.event_name().to_string(),
        reason: reason.to_string(),
    };

    let Value::Object(mut fields) = data else {
        return Err(invalid("expected an object"));
    };
    let target = match fields.remove("target") {
        Some(Value::String(target)) => target,
        _ => return Err(invalid("missing target")),
    };
    let payload = fields
        .remove(kind.payload_field())
        .ok_or_else(|| invalid(&format!("missing {}", kind.payload_field())))?;

    Ok(SignalEnvelope {
        kind,
        target,
        payload,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnounceKind {
    Join,
    Leave,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "connected", rename_all = "camelCase")]
    Connected { connection_id: ConnectionId },
    #[serde(rename = "playerJoined", rename_all = "camelCase")]
    PlayerJoined {
        player_id: ConnectionId,
        player_data: Player,
        all_players: Vec<Player>,
        room_name: String,
    },
    #[serde(rename = "newPlayer")]
    NewPlayer(Player),
    #[serde(rename = "existingPlayers")]
    ExistingPlayers { players: Vec<Player> },
    #[serde(rename = "announce", rename_all = "camelCase")]
    Announce {
        #[serde(rename = "type")]
        kind: AnnounceKind,
        player_id: ConnectionId,
        message: String,
    },
    #[serde(rename = "playerMoved", rename_all = "camelCase")]
    PlayerMoved {
        player_id: ConnectionId,
        x: f64,
        y: f64,
        character: Character,
    },
    #[serde(rename = "playerLeft", rename_all = "camelCase")]
    PlayerLeft { player_id: ConnectionId },
    #[serde(rename = "chatMessage", rename_all = "camelCase")]
    ChatMessage {
        player_id: ConnectionId,
        player_name: String,
        message: String,
        timestamp: u64,
    },
    #[serde(rename = "roomStatus", rename_all = "camelCase")]
    RoomStatus {
        room_name: String,
        players_in_room: usize,
        total_players_tracked: usize,
        players_list: Vec<Player>,
    },
    #[serde(rename = "roomError")]
    RoomError { message: String },
    #[serde(rename = "webrtc-offer")]
    WebrtcOffer { offer: Value, from: ConnectionId },
    #[serde(rename = "webrtc-answer")]
    WebrtcAnswer { answer: Value, from: ConnectionId },
    #[serde(rename = "webrtc-ice-candidate")]
    WebrtcIceCandidate { candidate: Value, from: ConnectionId },
}

impl ServerEvent {
    pub fn signal(kind: SignalKind, payload: Value, from: ConnectionId) -> Self {
        match kind {
            SignalKind::Offer => ServerEvent::WebrtcOffer {
                offer: payload,
                from,
            },
            SignalKind::Answer => ServerEvent::WebrtcAnswer {
                answer: payload,
                from,
            },
            SignalKind::IceCandidate => ServerEvent::WebrtcIceCandidate {
                candidate: payload,
                from,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::PlayerJoined { .. } => "playerJoined",
            ServerEvent::NewPlayer(_) => "newPlayer",
            ServerEvent::ExistingPlayers { .. } => "existingPlayers",
            ServerEvent::Announce { .. } => "announce",
            ServerEvent::PlayerMoved { .. } => "playerMoved",
            ServerEvent::PlayerLeft { .. } => "playerLeft",
            ServerEvent::ChatMessage { .. } => "chatMessage",
            ServerEvent::RoomStatus { .. } => "roomStatus",
            ServerEvent::RoomError { .. } => "roomError",
            ServerEvent::WebrtcOffer { .. } => SignalKind::Offer.event_name(),
            ServerEvent::WebrtcAnswer { .. } => SignalKind::Answer.event_name(),
            ServerEvent::WebrtcIceCandidate { .. } => SignalKind::IceCandidate.event_name(),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
