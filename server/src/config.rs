//! Runtime configuration for the relay server
//!
//! `RelayConfig` carries every tunable the server reads: the listening
//! address, transport admission rules, the spawn area for new players and
//! the timers driving session expiry and connection liveness. `main` builds
//! one from command-line flags; tests build one from `Default` and tweak it.

use shared::DEFAULT_ROOM;
use std::time::Duration;
use thiserror::Error;

/// Wildcard entry accepting any transport origin
pub const ANY_ORIGIN: &str = "*";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("spawn bounds must be finite: {axis} min {min}, max {max}")]
    NonFiniteBounds { axis: char, min: f64, max: f64 },
    #[error("spawn bounds are inverted: {axis} min {min} > max {max}")]
    InvertedBounds { axis: char, min: f64, max: f64 },
    #[error("character palette must hold at least one entry")]
    EmptyPalette,
    #[error("default room name must not be blank")]
    BlankDefaultRoom,
    #[error("{name} must be longer than zero")]
    ZeroInterval { name: &'static str },
    #[error("ping timeout ({timeout:?}) must exceed ping interval ({interval:?})")]
    PingTimeoutTooShort {
        interval: Duration,
        timeout: Duration,
    },
}

/// Rectangle new players are dropped into
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnBounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl SpawnBounds {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_y..=self.max_y).contains(&y)
    }
}

impl Default for SpawnBounds {
    fn default() -> Self {
        Self {
            min_x: 100.0,
            max_x: 1900.0,
            min_y: 100.0,
            max_y: 1000.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed to open the transport; `*` allows all
    pub allowed_origins: Vec<String>,
    /// Shared secret clients must present as `?token=`
    pub auth_token: Option<String>,
    pub spawn_bounds: SpawnBounds,
    pub palette_size: u32,
    pub default_room: String,
    pub max_room_name_len: usize,
    pub session_max_age: Duration,
    pub session_sweep_interval: Duration,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    pub max_message_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec![ANY_ORIGIN.to_string()],
            auth_token: None,
            spawn_bounds: SpawnBounds::default(),
            palette_size: 5,
            default_room: DEFAULT_ROOM.to_string(),
            max_room_name_len: 64,
            session_max_age: Duration::from_secs(24 * 60 * 60),
            session_sweep_interval: Duration::from_secs(60 * 60),
            ping_interval: Duration::from_secs(25),
            ping_timeout: Duration::from_secs(60),
            max_message_bytes: 100_000,
        }
    }
}

impl RelayConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn any_origin_allowed(&self) -> bool {
        self.allowed_origins.iter().any(|origin| origin == ANY_ORIGIN)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let bounds = &self.spawn_bounds;
        for (axis, min, max) in [
            ('x', bounds.min_x, bounds.max_x),
            ('y', bounds.min_y, bounds.max_y),
        ] {
            if !min.is_finite() || !max.is_finite() {
                return Err(ConfigError::NonFiniteBounds { axis, min, max });
            }
        }
        if bounds.min_x > bounds.max_x {
            return Err(ConfigError::InvertedBounds {
                axis: 'x',
                min: bounds.min_x,
                max: bounds.max_x,
            });
        }
        if bounds.min_y > bounds.max_y {
            return Err(ConfigError::InvertedBounds {
                axis: 'y',
                min: bounds.min_y,
                max: bounds.max_y,
            });
        }
        if self.palette_size == 0 {
            return Err(ConfigError::EmptyPalette);
        }
        if self.default_room.trim().is_empty() {
            return Err(ConfigError::BlankDefaultRoom);
        }
        // tokio intervals panic on a zero period
        if self.ping_interval.is_zero() {
            return Err(ConfigError::ZeroInterval {
                name: "ping interval",
            });
        }
        if self.session_sweep_interval.is_zero() {
            return Err(ConfigError::ZeroInterval {
                name: "session sweep interval",
            });
        }
        if self.ping_timeout <= self.ping_interval {
            return Err(ConfigError::PingTimeoutTooShort {
                interval: self.ping_interval,
                timeout: self.ping_timeout,
            });
        }
        Ok(())
    }
}
