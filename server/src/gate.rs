//! Admission checks run on the upgrade request, before any room logic

use crate::config::RelayConfig;
use crate::session_store::SessionStore;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use shared::ConnectionId;
use thiserror::Error;

/// Handshake metadata a client supplies when opening the transport
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Handshake {
    /// Id of an earlier session the client is resuming
    #[serde(default)]
    pub sid: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub transport: Option<String>,
    /// Filled from the `Origin` header, not the query string
    #[serde(skip)]
    pub origin: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("origin not allowed: {0}")]
    OriginNotAllowed(String),
    #[error("invalid token")]
    InvalidToken,
    #[error("unknown session: {0}")]
    UnknownSession(String),
}

pub struct ConnectionGate {
    allowed_origins: Option<Vec<String>>,
    token_digest: Option<[u8; 32]>,
}

impl ConnectionGate {
    pub fn new(config: &RelayConfig) -> Self {
        let allowed_origins = if config.any_origin_allowed() {
            None
        } else {
            Some(config.allowed_origins.clone())
        };

        Self {
            allowed_origins,
            token_digest: config.auth_token.as_deref().map(digest),
        }
    }

    /// Accepts or rejects a connection; never writes to the session store
    pub fn admit(&self, handshake: &Handshake, sessions: &SessionStore) -> Result<(), AdmissionError> {
        if let (Some(allowed), Some(origin)) = (&self.allowed_origins, &handshake.origin) {
            if !allowed.iter().any(|o| o == origin) {
                return Err(AdmissionError::OriginNotAllowed(origin.clone()));
            }
        }

        if let Some(expected) = &self.token_digest {
            match handshake.token.as_deref() {
                Some(token) if digest(token) == *expected => {}
                _ => return Err(AdmissionError::InvalidToken),
            }
        }

        match handshake.sid.as_deref().filter(|sid| !sid.is_empty()) {
            None => Ok(()),
            Some(sid) => match sid.parse::<ConnectionId>() {
                Ok(id) if sessions.has(&id) => Ok(()),
                _ => Err(AdmissionError::UnknownSession(sid.to_string())),
            },
        }
    }
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}
