use clap::Parser;
use log::info;
use server::config::{RelayConfig, SpawnBounds};
use server::network::{Server, ServerResult};
use std::time::Duration;

/// Realtime room relay for browser multiplayer games
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, env = "RELAY_HOST", default_value = "0.0.0.0")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, env = "PORT", default_value = "8080")]
    port: u16,
    /// Origin allowed to open a connection; repeat for several, `*` for any
    #[clap(
        long = "allowed-origin",
        env = "RELAY_ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = "*"
    )]
    allowed_origins: Vec<String>,
    /// Shared secret clients must pass as `?token=`
    #[clap(long, env = "RELAY_AUTH_TOKEN")]
    auth_token: Option<String>,
    #[clap(long, default_value = "100")]
    min_x: f64,
    #[clap(long, default_value = "1900")]
    max_x: f64,
    #[clap(long, default_value = "100")]
    min_y: f64,
    #[clap(long, default_value = "1000")]
    max_y: f64,
    /// Number of distinct character sprites handed out round-robin
    #[clap(long, default_value = "5")]
    palette_size: u32,
    /// Room used when a join names none
    #[clap(long, default_value = "lobby")]
    default_room: String,
    #[clap(long, default_value = "64")]
    max_room_name_len: usize,
    /// Lifetime of a transport session before it is swept
    #[clap(long, default_value = "86400")]
    session_max_age_secs: u64,
    #[clap(long, default_value = "3600")]
    session_sweep_secs: u64,
    #[clap(long, default_value = "25")]
    ping_interval_secs: u64,
    /// Silence after which a connection is dropped
    #[clap(long, default_value = "60")]
    ping_timeout_secs: u64,
    #[clap(long, default_value = "100000")]
    max_message_bytes: usize,
}

impl From<Args> for RelayConfig {
    fn from(args: Args) -> Self {
        RelayConfig {
            host: args.host,
            port: args.port,
            allowed_origins: args
                .allowed_origins
                .into_iter()
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
            auth_token: args.auth_token.filter(|token| !token.is_empty()),
            spawn_bounds: SpawnBounds {
                min_x: args.min_x,
                max_x: args.max_x,
                min_y: args.min_y,
                max_y: args.max_y,
            },
            palette_size: args.palette_size,
            default_room: args.default_room,
            max_room_name_len: args.max_room_name_len,
            session_max_age: Duration::from_secs(args.session_max_age_secs),
            session_sweep_interval: Duration::from_secs(args.session_sweep_secs),
            ping_interval: Duration::from_secs(args.ping_interval_secs),
            ping_timeout: Duration::from_secs(args.ping_timeout_secs),
            max_message_bytes: args.max_message_bytes,
        }
    }
}

#[tokio::main]
async fn main() -> ServerResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = RelayConfig::from(args);
    config.validate()?;

    info!("Starting relay server on {}", config.bind_addr());
    if config.auth_token.is_some() {
        info!("Token authentication enabled");
    }

    let mut server = Server::new(config).await?;
    let handle = server.handle();

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            handle.shutdown();
        }
    }

    Ok(())
}
