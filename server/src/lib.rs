//! # Room Relay Server Library
//!
//! This library provides the realtime relay behind a small multiplayer web
//! game. Browser clients connect over a WebSocket, join named rooms and
//! exchange movement, chat and WebRTC signaling through the server. The
//! server keeps the current position of every player so late joiners can be
//! brought up to date, but runs no simulation of its own.
//!
//! ## Core Responsibilities
//!
//! ### Admission
//! Every upgrade request passes the connection gate before any room logic
//! runs. The gate checks the `Origin` header against an allowlist, an
//! optional shared token and, when a client claims to resume a session,
//! that the session is still known.
//!
//! ### Rooms and Players
//! Rooms are created on first join and deleted when their last member
//! leaves. Each room member owns exactly one player record holding a
//! position and a sprite tag.
//!
//! ### Fan-out
//! Inbound events are answered with unicasts, broadcasts that exclude the
//! sender, or broadcasts that include it, depending on the event.
//!
//! ## Architecture Design
//!
//! ### Single Event Loop
//! Transport tasks decode frames and forward them over a channel to one
//! loop that owns all relay state. Events are applied in arrival order and
//! each runs to completion, so room membership and player records are
//! never observed half-updated.
//!
//! ### Pure Relay Core
//! `relay::EventRelay` performs no I/O. It returns the list of addressed
//! envelopes to deliver, which keeps the protocol testable without sockets.
//!
//! ## Module Organization
//!
//! - `config`: runtime tunables and their validation
//! - `gate`: handshake admission checks
//! - `session_store`: admitted transport sessions with expiry
//! - `room_registry`: room name to member set
//! - `player_table`: per-room player records
//! - `relay`: the per-connection protocol state machine
//! - `signaling`: targeted forwarding of WebRTC negotiation messages
//! - `network`: HTTP/WebSocket transport and the main loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::RelayConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let mut server = Server::new(RelayConfig::default()).await?;
//!
//!     // Serves `/ws` and `/health` until shut down through a handle
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod gate;
pub mod network;
pub mod player_table;
pub mod relay;
pub mod room_registry;
pub mod session_store;
pub mod signaling;
pub mod utils;
