//! gwlive service - live relay connection and HTTP API.
//!
//! Run with: `cargo run -p gwlive-service`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use gwlive_core::{BearerToken, LiveSession, MqttTransport, SensorStateStore};
use gwlive_service::{AppState, Config, api, ws};

/// gwlive service - live sensor telemetry over HTTP and WebSocket.
#[derive(Parser, Debug)]
#[command(name = "gwlive-service")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long)]
    bind: Option<String>,

    /// Bearer token for the relay (overrides config).
    #[arg(long, env = "GWLIVE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Tenant id (overrides config).
    #[arg(long, env = "GWLIVE_TENANT")]
    tenant: Option<String>,

    /// Classify unrecognised status codes without thresholds as warnings.
    #[arg(long)]
    strict: bool,

    /// Do not open the session at startup.
    #[arg(long)]
    no_connect: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gwlive_service=info".parse()?)
                .add_directive("gwlive_core=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if args.token.is_some() {
        config.credentials.token = args.token;
    }
    if args.tenant.is_some() {
        config.credentials.tenant_id = args.tenant;
    }
    if args.strict {
        config.analytics.strict = true;
    }
    if args.no_connect {
        config.connection.auto_open = false;
    }
    config.validate()?;

    info!(
        "Relay {} (fallback: {}), {} catalogued sensors",
        config.connection.primary_url,
        config.connection.fallback_url.as_deref().unwrap_or("none"),
        config.sensors.len()
    );

    let transport = MqttTransport::new(config.connection.client_id.clone())
        .keep_alive(config.connection.keep_alive());
    let session = LiveSession::new(
        Arc::new(transport),
        config.connection.to_options(),
        Arc::new(SensorStateStore::new()),
    );
    let state = AppState::new(session, config.clone());

    if config.connection.auto_open {
        match config.credentials.pair() {
            Some((token, tenant)) => {
                state.session.open(BearerToken::new(token), tenant).await?;
            }
            None => warn!("No credentials configured; waiting for POST /api/session/open"),
        }
    }

    let app = Router::new()
        .merge(api::router())
        .merge(ws::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(Arc::clone(&state));

    let addr: SocketAddr = config.server.bind.parse()?;
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.session.close().await;
    info!("Session closed, exiting");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
