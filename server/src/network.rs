//! Server network layer handling WebSocket transports and the relay event loop

use crate::config::{RelayConfig, ANY_ORIGIN};
use crate::gate::{AdmissionError, ConnectionGate, Handshake};
use crate::relay::{EventRelay, Outcome, RelayStats};
use crate::session_store::{SessionData, SessionStore, DEFAULT_TRANSPORT};
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde::Serialize;
use shared::{ClientEvent, ConnectionId, ServerEvent};
use std::collections::HashMap;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};
use tower_http::cors::{Any, CorsLayer};

pub type ServerResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Messages sent from transport tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    Connected {
        connection_id: ConnectionId,
        sender: mpsc::UnboundedSender<ServerEvent>,
    },
    EventReceived {
        connection_id: ConnectionId,
        event: ClientEvent,
    },
    Disconnected {
        connection_id: ConnectionId,
    },
    StatsRequested {
        reply: oneshot::Sender<RelayStats>,
    },
    Shutdown,
}

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub rooms: usize,
    pub connections: usize,
    pub players: usize,
    pub uptime_secs: u64,
}

/// State shared by every HTTP handler and transport task
#[derive(Clone)]
struct AppState {
    config: Arc<RelayConfig>,
    gate: Arc<ConnectionGate>,
    sessions: Arc<RwLock<SessionStore>>,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    started_at: Instant,
}

/// Cloneable control surface for a running server
#[derive(Clone)]
pub struct ServerHandle {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ServerHandle {
    pub fn shutdown(&self) {
        if self.server_tx.send(ServerMessage::Shutdown).is_err() {
            debug!("Shutdown requested after server loop exited");
        }
    }

    /// Occupancy snapshot from the event loop; `None` once it has stopped
    pub async fn stats(&self) -> Option<RelayStats> {
        let (reply, response) = oneshot::channel();
        self.server_tx
            .send(ServerMessage::StatsRequested { reply })
            .ok()?;
        response.await.ok()
    }
}

/// Main server coordinating transports and the room relay
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    config: Arc<RelayConfig>,
    sessions: Arc<RwLock<SessionStore>>,
    relay: EventRelay,
    outbound: HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>,
    started_at: Instant,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn new(config: RelayConfig) -> ServerResult<Self> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_addr()).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            relay: EventRelay::new(&config),
            config: Arc::new(config),
            sessions: Arc::new(RwLock::new(SessionStore::new())),
            outbound: HashMap::new(),
            started_at: Instant::now(),
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            server_tx: self.server_tx.clone(),
        }
    }

    fn app_state(&self) -> AppState {
        AppState {
            config: Arc::clone(&self.config),
            gate: Arc::new(ConnectionGate::new(&self.config)),
            sessions: Arc::clone(&self.sessions),
            server_tx: self.server_tx.clone(),
            started_at: self.started_at,
        }
    }

    /// Spawns the HTTP task serving `/ws` upgrades and `/health`
    fn spawn_http(&self, listener: TcpListener) -> JoinHandle<()> {
        let router = build_router(self.app_state());

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!("HTTP server stopped: {}", e);
            }
        })
    }

    /// Spawns task that periodically expires old transport sessions
    fn spawn_session_sweeper(&self) -> JoinHandle<()> {
        let sessions = Arc::clone(&self.sessions);
        let sweep_every = self.config.session_sweep_interval;
        let max_age = self.config.session_max_age;

        tokio::spawn(async move {
            let mut ticker = interval(sweep_every);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let mut sessions = sessions.write().await;
                sessions.cleanup(max_age);
            }
        })
    }

    /// Sends every envelope to its recipient's transport task
    fn deliver(&self, outcome: Outcome) {
        for envelope in outcome.into_envelopes() {
            let Some(sender) = self.outbound.get(&envelope.to) else {
                debug!("No transport for {}, dropping {}", envelope.to, envelope.event.name());
                continue;
            };
            if sender.send(envelope.event).is_err() {
                debug!("Transport for {} already closed", envelope.to);
            }
        }
    }

    fn handle_message(&mut self, message: ServerMessage) -> bool {
        match message {
            ServerMessage::Connected {
                connection_id,
                sender,
            } => {
                self.outbound.insert(connection_id, sender);
                let outcome = self.relay.connect(connection_id);
                self.deliver(outcome);
            }
            ServerMessage::EventReceived {
                connection_id,
                event,
            } => {
                let outcome = self.relay.handle(connection_id, event);
                self.deliver(outcome);
            }
            ServerMessage::Disconnected { connection_id } => {
                // Dropping the sender lets the transport's writer finish
                self.outbound.remove(&connection_id);
                let outcome = self.relay.disconnect(connection_id);
                self.deliver(outcome);
                info!("Connection {} closed", connection_id);
            }
            ServerMessage::StatsRequested { reply } => {
                if reply.send(self.relay.stats()).is_err() {
                    debug!("Stats requester went away");
                }
            }
            ServerMessage::Shutdown => return false,
        }
        true
    }

    /// Main server loop; all relay state is touched only from here
    pub async fn run(&mut self) -> ServerResult<()> {
        let listener = self.listener.take().ok_or("server is already running")?;

        // Initialize concurrent tasks
        let http = self.spawn_http(listener);
        let sweeper = self.spawn_session_sweeper();

        info!("Server started successfully");

        while let Some(message) = self.server_rx.recv().await {
            if !self.handle_message(message) {
                break;
            }
        }

        info!("Server shutting down");
        http.abort();
        sweeper.abort();
        self.outbound.clear();
        Ok(())
    }
}

fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(cors)
}

fn cors_layer(config: &RelayConfig) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods([Method::GET, Method::OPTIONS]);

    if config.any_origin_allowed() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter(|origin| origin.as_str() != ANY_ORIGIN)
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    cors.allow_origin(origins)
}

fn rejection_status(error: &AdmissionError) -> StatusCode {
    match error {
        AdmissionError::OriginNotAllowed(_) => StatusCode::FORBIDDEN,
        AdmissionError::InvalidToken => StatusCode::UNAUTHORIZED,
        AdmissionError::UnknownSession(_) => StatusCode::BAD_REQUEST,
    }
}

async fn health_handler(State(state): State<AppState>) -> Result<Json<HealthReport>, StatusCode> {
    let (reply, response) = oneshot::channel();
    state
        .server_tx
        .send(ServerMessage::StatsRequested { reply })
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    let stats = response
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    Ok(Json(HealthReport {
        status: "ok",
        rooms: stats.rooms,
        connections: stats.connections,
        players: stats.players,
        uptime_secs: state.started_at.elapsed().as_secs(),
    }))
}

/// Runs the admission gate, then upgrades the request to a WebSocket
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(mut handshake): Query<Handshake>,
    headers: HeaderMap,
) -> Response {
    handshake.origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    let admitted = {
        let sessions = state.sessions.read().await;
        state.gate.admit(&handshake, &sessions)
    };
    if let Err(e) = admitted {
        warn!("Rejected connection: {}", e);
        return (rejection_status(&e), e.to_string()).into_response();
    }

    let connection_id = ConnectionId::new();
    let session = SessionData {
        transport: handshake
            .transport
            .unwrap_or_else(|| DEFAULT_TRANSPORT.to_string()),
    };

    match handshake.sid.as_deref().filter(|sid| !sid.is_empty()) {
        Some(sid) => info!("Connection {} admitted (resuming {})", connection_id, sid),
        None => info!("Connection {} admitted", connection_id),
    }

    ws.max_message_size(state.config.max_message_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state, connection_id, session))
}

/// Pumps one WebSocket until it closes, errors or stops answering pings
///
/// The session is recorded only once the upgrade has completed.
async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    connection_id: ConnectionId,
    session: SessionData,
) {
    state.sessions.write().await.put(connection_id, session);

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    if state
        .server_tx
        .send(ServerMessage::Connected {
            connection_id,
            sender: tx,
        })
        .is_err()
    {
        error!("Server loop gone, dropping connection {}", connection_id);
        return;
    }

    let ping_every = state.config.ping_interval;
    let send_task = tokio::spawn(async move {
        let mut ping = interval(ping_every);
        ping.tick().await;

        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    match event.encode() {
                        Ok(json) => {
                            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => error!("Failed to encode {}: {}", event.name(), e),
                    }
                },
                _ = ping.tick() => {
                    if ws_sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                },
            }
        }
        let _ = ws_sender.close().await;
    });

    // Any inbound frame, pongs included, counts as liveness
    let ping_timeout = state.config.ping_timeout;
    loop {
        let frame = match timeout(ping_timeout, ws_receiver.next()).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(_) => {
                warn!("Connection {} timed out", connection_id);
                break;
            }
        };

        match frame {
            Ok(Message::Text(text)) => match ClientEvent::decode(text.as_str()) {
                Ok(event) => {
                    let message = ServerMessage::EventReceived {
                        connection_id,
                        event,
                    };
                    if state.server_tx.send(message).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Bad frame from {}: {}", connection_id, e),
            },
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => debug!("Ignoring binary frame from {}", connection_id),
            Ok(_) => {}
            Err(e) => {
                debug!("Transport error on {}: {}", connection_id, e);
                break;
            }
        }
    }

    if state
        .server_tx
        .send(ServerMessage::Disconnected { connection_id })
        .is_err()
    {
        debug!("Server loop gone before {} disconnected", connection_id);
    }
    send_task.abort();
}
