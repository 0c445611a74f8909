//! # switchboard-server
//!
//! Chat relay that bridges IRC networks and a native group network to
//! browser sessions.
//!
//! This binary provides:
//! - **IRC gateway** turning IRC traffic into per-window state and
//!   client notifications
//! - **Loopback backend** for native groups and 1on1 chats
//! - **Connection manager** owning one socket per (user, network), behind a
//!   global connect rate limit
//! - **Session service** bootstrapping clients from their `cachedUpto`
//!   watermark
//! - **REST API** (axum) for starting sessions, polling notifications and
//!   forwarding requests

mod api;
mod config;
mod connection_manager;
mod context;
mod error;
mod gateway;
mod loopback;
mod outbox;
mod rate_limit;
mod session;
mod text_line;
mod view;

#[cfg(test)]
mod test_support;

use anyhow::Context as _;
use tracing::info;
use tracing_subscriber::EnvFilter;

use switchboard_bus::Courier;
use switchboard_store::StateStore;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::connection_manager::ConnectionManager;
use crate::context::Context;
use crate::gateway::Gateway;
use crate::loopback::Loopback;
use crate::rate_limit::ConnectLimiter;
use crate::session::SessionService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,switchboard_server=debug")),
        )
        .init();

    info!("Starting switchboard relay v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");
    info!(networks = ?config.network_names(), "Bridged networks");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let store = StateStore::open_at(&config.database_path)
        .with_context(|| format!("opening {}", config.database_path.display()))?;

    let courier = Courier::new();
    let limiter = ConnectLimiter::new(config.connect_rate, config.connect_burst);
    let http_addr = config.http_addr;
    let session_idle_timeout = config.session_idle_timeout;
    let networks = config.irc_networks.clone();
    let ctx = Context::new(store, courier.clone(), config);

    let gateway = Gateway::new(ctx.clone());
    let loopback = Loopback::new(ctx.clone());
    let connections = ConnectionManager::new(courier, networks, limiter.clone());

    gateway.register().start();
    loopback.register().start();
    connections.register().start();

    // Every IRC socket died with the previous process.
    connections.announce_restart()?;

    let sessions = SessionService::new(ctx.clone());

    // Sessions that stopped polling before the previous shutdown.
    sessions
        .reap_idle(session_idle_timeout)
        .await
        .context("closing stale sessions")?;

    let app_state = AppState {
        sessions: sessions.clone(),
        ctx,
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Forget per-network buckets idle for over 10 minutes
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            limiter.purge_stale(600.0).await;
        }
    });

    // Close sessions whose client went away without saying so
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(session_idle_timeout / 2);
        loop {
            interval.tick().await;
            if let Err(e) = sessions.reap_idle(session_idle_timeout).await {
                tracing::warn!(error = %e, "Idle session sweep failed");
            }
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
