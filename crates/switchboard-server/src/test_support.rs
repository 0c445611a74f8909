//! Fixtures shared by the unit tests of this crate.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use switchboard_bus::Courier;
use switchboard_shared::constants::CONNECTION_MANAGER_ENDPOINT;
use switchboard_shared::events::{self, ConnectionParams, WriteParams};
use switchboard_shared::protocol::Notification;
use switchboard_shared::types::{SessionId, UserId};
use switchboard_store::StateStore;

use crate::config::{IrcServer, ServerConfig};
use crate::context::Context;

pub fn config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.irc_networks.insert(
        "IRCNet".to_string(),
        IrcServer {
            host: "127.0.0.1".to_string(),
            port: 6667,
        },
    );
    config
}

pub fn context() -> Context {
    Context::new(StateStore::in_memory().unwrap(), Courier::new(), config())
}

/// A user with one live session.
pub async fn user_with_session(ctx: &Context, id: &str, nick: &str) -> (UserId, SessionId) {
    let user = UserId::new(id);
    let session = SessionId::new();
    ctx.store.run(|db| db.upsert_user(&user, nick)).await.unwrap();
    ctx.outbox.open_session(&user, &session).await.unwrap();
    (user, session)
}

/// Everything queued for the session so far, acknowledged.
pub async fn drain(ctx: &Context, user: &UserId, session: &SessionId) -> Vec<Notification> {
    let batch = ctx
        .outbox
        .next_batch(user, session, None, Duration::ZERO)
        .await
        .unwrap();
    if let Some((last, _)) = batch.last() {
        ctx.outbox
            .next_batch(user, session, Some(*last), Duration::ZERO)
            .await
            .unwrap();
    }
    batch.into_iter().map(|(_, n)| n).collect()
}

/// What the gateway asked the connection manager to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Wire {
    Connect(ConnectionParams),
    Write(WriteParams),
    Disconnect(ConnectionParams),
}

/// Register a connection manager stand-in that records every request.
pub fn fake_connection_manager(courier: &Courier) -> mpsc::UnboundedReceiver<Wire> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut endpoint = courier.register_endpoint(CONNECTION_MANAGER_ENDPOINT);

    let sink = tx.clone();
    endpoint.on(events::CONNECT, move |p: ConnectionParams| {
        let _ = sink.send(Wire::Connect(p));
        async { Ok(Value::Null) }
    });
    let sink = tx.clone();
    endpoint.on(events::WRITE, move |p: WriteParams| {
        let _ = sink.send(Wire::Write(p));
        async { Ok(Value::Null) }
    });
    endpoint.on(events::DISCONNECT, move |p: ConnectionParams| {
        let _ = tx.send(Wire::Disconnect(p));
        async { Ok(Value::Null) }
    });

    endpoint.start();
    rx
}

/// Requests recorded until the fake stays quiet for a moment.
pub async fn wire(rx: &mut mpsc::UnboundedReceiver<Wire>) -> Vec<Wire> {
    let mut seen = Vec::new();
    while let Ok(Some(item)) = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await {
        seen.push(item);
    }
    seen
}

/// Only the IRC lines among the recorded requests.
pub async fn written(rx: &mut mpsc::UnboundedReceiver<Wire>) -> Vec<String> {
    wire(rx)
        .await
        .into_iter()
        .filter_map(|item| match item {
            Wire::Write(p) => Some(p.lines),
            _ => None,
        })
        .flatten()
        .collect()
}
