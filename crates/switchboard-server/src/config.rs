//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the relay can start with zero
//! configuration for local development.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use switchboard_shared::constants::{DEFAULT_MAX_BACKLOG, DEFAULT_REAL_NAME, NATIVE_NETWORK};

/// Address of one bridged IRC network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcServer {
    pub host: String,
    pub port: u16,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database holding all relay state.
    /// Env: `DATABASE_PATH`
    /// Default: `./switchboard.db`
    pub database_path: PathBuf,

    /// Bridged IRC networks by name.
    /// Env: `IRC_NETWORKS` as `name=host:port,name=host:port`
    /// Default: none
    pub irc_networks: BTreeMap<String, IrcServer>,

    /// Backlog lines per window sent on session start when the client does
    /// not ask for a specific amount.
    /// Env: `MAX_BACKLOG`
    pub max_backlog: usize,

    /// Sustained IRC connects per second across all users.
    /// Env: `CONNECT_RATE`
    /// Default: `1.0`
    pub connect_rate: f64,

    /// Connects allowed in a burst before `connect_rate` applies.
    /// Env: `CONNECT_BURST`
    /// Default: `5`
    pub connect_burst: f64,

    /// A session that has not polled for this long is closed.
    /// Env: `SESSION_IDLE_SECS`
    /// Default: `120`
    pub session_idle_timeout: Duration,

    /// Real name sent in the IRC `USER` command.
    /// Env: `REAL_NAME`
    pub real_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            database_path: PathBuf::from("./switchboard.db"),
            irc_networks: BTreeMap::new(),
            max_backlog: DEFAULT_MAX_BACKLOG,
            connect_rate: 1.0,
            connect_burst: 5.0,
            session_idle_timeout: Duration::from_secs(120),
            real_name: DEFAULT_REAL_NAME.to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(path) = var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(list) = var("IRC_NETWORKS") {
            match parse_networks(&list) {
                Ok(networks) => config.irc_networks = networks,
                Err(e) => tracing::warn!(error = %e, "Invalid IRC_NETWORKS, no IRC networks configured"),
            }
        }

        if let Some(val) = var("MAX_BACKLOG") {
            match val.parse::<usize>() {
                Ok(n) => config.max_backlog = n,
                Err(_) => tracing::warn!(value = %val, "Invalid MAX_BACKLOG, using default"),
            }
        }

        if let Some(val) = var("CONNECT_RATE") {
            match val.parse::<f64>() {
                Ok(rate) if rate > 0.0 => config.connect_rate = rate,
                _ => tracing::warn!(value = %val, "Invalid CONNECT_RATE, using default"),
            }
        }

        if let Some(val) = var("CONNECT_BURST") {
            match val.parse::<f64>() {
                Ok(burst) if burst >= 1.0 => config.connect_burst = burst,
                _ => tracing::warn!(value = %val, "Invalid CONNECT_BURST, using default"),
            }
        }

        if let Some(val) = var("SESSION_IDLE_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.session_idle_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid SESSION_IDLE_SECS, using default"),
            }
        }

        if let Some(name) = var("REAL_NAME") {
            if !name.is_empty() {
                config.real_name = name;
            }
        }

        config
    }

    /// Every network a user can be on: the native one first, then the
    /// configured IRC networks in name order.
    pub fn network_names(&self) -> Vec<String> {
        std::iter::once(NATIVE_NETWORK.to_string())
            .chain(self.irc_networks.keys().cloned())
            .collect()
    }
}

/// Parse `name=host:port,name=host:port`.
fn parse_networks(list: &str) -> Result<BTreeMap<String, IrcServer>, String> {
    let mut networks = BTreeMap::new();

    for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, addr) = entry
            .split_once('=')
            .ok_or_else(|| format!("expected name=host:port, got {entry:?}"))?;
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| format!("missing port in {entry:?}"))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| format!("invalid port in {entry:?}"))?;

        if name == NATIVE_NETWORK {
            return Err(format!("{NATIVE_NETWORK} is reserved for the native network"));
        }

        networks.insert(
            name.to_string(),
            IrcServer {
                host: host.to_string(),
                port,
            },
        );
    }

    Ok(networks)
}
