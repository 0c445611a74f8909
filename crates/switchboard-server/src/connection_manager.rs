//! Owner of the IRC sockets, one per (user, network).
//!
//! The manager knows nothing about IRC beyond line framing and keep-alive:
//! every received line except `PING` is forwarded to the gateway as a
//! `data` event, and socket lifecycle changes become `connected` /
//! `disconnected` events.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use switchboard_bus::{Courier, Endpoint};
use switchboard_shared::constants::{CONNECTION_MANAGER_ENDPOINT, GATEWAY_ENDPOINT};
use switchboard_shared::events::{self, ConnectionParams, DataParams, DisconnectedParams, WriteParams};

use crate::config::IrcServer;
use crate::context::route;
use crate::error::Result;
use crate::rate_limit::ConnectLimiter;

/// Longest line accepted from a server. The rest of a longer line is
/// dropped.
const MAX_LINE_LEN: usize = 8192;

struct Socket {
    writer: mpsc::UnboundedSender<String>,
    close: oneshot::Sender<()>,
}

enum Slot {
    /// TCP connect in flight.
    Pending,
    Open(Socket),
}

struct Entry {
    generation: u64,
    slot: Slot,
}

#[derive(Clone)]
pub struct ConnectionManager {
    courier: Courier,
    networks: Arc<BTreeMap<String, IrcServer>>,
    limiter: ConnectLimiter,
    sockets: Arc<Mutex<HashMap<ConnectionParams, Entry>>>,
    generation: Arc<AtomicU64>,
}

impl ConnectionManager {
    pub fn new(courier: Courier, networks: BTreeMap<String, IrcServer>, limiter: ConnectLimiter) -> Self {
        Self {
            courier,
            networks: Arc::new(networks),
            limiter,
            sockets: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn register(&self) -> Endpoint {
        let mut endpoint = self.courier.register_endpoint(CONNECTION_MANAGER_ENDPOINT);

        route(&mut endpoint, events::CONNECT, self, |cm: ConnectionManager, p: ConnectionParams| async move {
            cm.connect(p);
            Ok(())
        });
        route(&mut endpoint, events::WRITE, self, |cm: ConnectionManager, p: WriteParams| async move {
            cm.write(p);
            Ok(())
        });
        route(&mut endpoint, events::DISCONNECT, self, |cm: ConnectionManager, p: ConnectionParams| async move {
            cm.disconnect(p);
            Ok(())
        });

        endpoint
    }

    /// Tell the gateway that every socket it knew of is gone.
    pub fn announce_restart(&self) -> Result<()> {
        let reached = self
            .courier
            .broadcast(events::RESTARTED, &serde_json::json!({}))?;
        info!(endpoints = reached, "Announced connection manager start");
        Ok(())
    }

    /// Open a socket in the background. The outcome arrives at the gateway
    /// as `connected` or `disconnected`. A connection that is open or still
    /// being opened is left alone.
    pub fn connect(&self, params: ConnectionParams) {
        let Some(server) = self.networks.get(&params.network).cloned() else {
            warn!(user = %params.user_id, network = %params.network, "Unknown IRC network");
            self.disconnected(&params, "Unknown IRC network");
            return;
        };

        let generation = {
            let mut sockets = self.lock_sockets();
            if sockets.contains_key(&params) {
                debug!(user = %params.user_id, network = %params.network, "Already connected");
                return;
            }
            let generation = self.generation.fetch_add(1, Ordering::Relaxed);
            sockets.insert(
                params.clone(),
                Entry {
                    generation,
                    slot: Slot::Pending,
                },
            );
            generation
        };

        let cm = self.clone();
        tokio::spawn(async move {
            cm.limiter.acquire(&params.network).await;

            match TcpStream::connect((server.host.as_str(), server.port)).await {
                Ok(stream) => cm.attach(params, generation, stream),
                Err(e) => {
                    if cm.release(&params, generation) {
                        warn!(user = %params.user_id, network = %params.network, error = %e, "IRC connect failed");
                        cm.disconnected(&params, &e.to_string());
                    }
                }
            }
        });
    }

    pub fn write(&self, params: WriteParams) {
        let key = ConnectionParams {
            user_id: params.user_id,
            network: params.network,
        };

        let sockets = self.lock_sockets();
        let Some(Entry {
            slot: Slot::Open(socket),
            ..
        }) = sockets.get(&key)
        else {
            debug!(user = %key.user_id, network = %key.network, lines = params.lines.len(), "Write to a closed connection dropped");
            return;
        };
        for line in params.lines {
            if socket.writer.send(line).is_err() {
                break;
            }
        }
    }

    /// Send `QUIT` and close. A connect still in flight is abandoned.
    /// Without a socket the gateway hears about the disconnect right away.
    pub fn disconnect(&self, params: ConnectionParams) {
        let entry = self.lock_sockets().remove(&params);
        match entry.map(|e| e.slot) {
            None => self.disconnected(&params, "Not connected"),
            Some(Slot::Pending) => {
                debug!(user = %params.user_id, network = %params.network, "Pending connect cancelled");
                self.disconnected(&params, "Connection closed");
            }
            Some(Slot::Open(socket)) => {
                let _ = socket.writer.send("QUIT".to_string());
                let _ = socket.close.send(());
            }
        }
    }

    /// Drop the entry if it still belongs to `generation`.
    fn release(&self, params: &ConnectionParams, generation: u64) -> bool {
        let mut sockets = self.lock_sockets();
        if sockets.get(params).is_some_and(|e| e.generation == generation) {
            sockets.remove(params);
            true
        } else {
            false
        }
    }

    fn attach(&self, params: ConnectionParams, generation: u64, stream: TcpStream) {
        let (writer, lines) = mpsc::unbounded_channel();
        let (close, closed) = oneshot::channel();

        {
            let mut sockets = self.lock_sockets();
            match sockets.get_mut(&params) {
                Some(entry) if entry.generation == generation => {
                    entry.slot = Slot::Open(Socket {
                        writer: writer.clone(),
                        close,
                    });
                }
                _ => {
                    debug!(user = %params.user_id, network = %params.network, "Connect finished after cancel, socket dropped");
                    return;
                }
            }
        }

        let (read, write) = stream.into_split();
        info!(user = %params.user_id, network = %params.network, "IRC socket connected");
        self.emit(events::CONNECTED, &params);

        tokio::spawn(write_loop(write, lines));

        let cm = self.clone();
        tokio::spawn(async move {
            let reason = cm.read_loop(&params, read, writer, closed).await;
            cm.release(&params, generation);
            cm.disconnected(&params, &reason);
        });
    }

    /// Pump lines to the gateway until the socket or the manager closes
    /// it. Returns the reason.
    async fn read_loop(
        &self,
        params: &ConnectionParams,
        read: OwnedReadHalf,
        writer: mpsc::UnboundedSender<String>,
        mut closed: oneshot::Receiver<()>,
    ) -> String {
        let mut reader = BufReader::new(read);
        let mut buf = Vec::with_capacity(512);

        loop {
            let line = tokio::select! {
                line = read_line(&mut reader, &mut buf) => line,
                _ = &mut closed => return "Connection closed".to_string(),
            };

            match line {
                Ok(Some(line)) => {
                    if line.is_empty() {
                        continue;
                    }
                    if let Some(rest) = line.strip_prefix("PING") {
                        let _ = writer.send(format!("PONG{rest}"));
                        continue;
                    }
                    self.emit(
                        events::DATA,
                        &DataParams {
                            user_id: params.user_id.clone(),
                            network: params.network.clone(),
                            line,
                        },
                    );
                }
                Ok(None) => return "Connection closed by server".to_string(),
                Err(e) => return e.to_string(),
            }
        }
    }

    fn disconnected(&self, params: &ConnectionParams, reason: &str) {
        self.emit(
            events::DISCONNECTED,
            &DisconnectedParams {
                user_id: params.user_id.clone(),
                network: params.network.clone(),
                reason: reason.to_string(),
            },
        );
    }

    fn emit<P: Serialize>(&self, event: &str, params: &P) {
        if let Err(e) = self.courier.call_no_wait(GATEWAY_ENDPOINT, event, params) {
            warn!(event, error = %e, "Gateway unreachable");
        }
    }

    fn lock_sockets(&self) -> MutexGuard<'_, HashMap<ConnectionParams, Entry>> {
        self.sockets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Read one line without its `\r\n`. Bytes that are not UTF-8 are
/// replaced, and a line longer than [`MAX_LINE_LEN`] is cut there.
/// `None` at end of stream.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let read = (&mut *reader)
        .take(MAX_LINE_LEN as u64)
        .read_until(b'\n', buf)
        .await?;
    if read == 0 {
        return Ok(None);
    }

    if read == MAX_LINE_LEN && buf.last() != Some(&b'\n') {
        let mut rest = Vec::new();
        loop {
            rest.clear();
            let skipped = (&mut *reader)
                .take(MAX_LINE_LEN as u64)
                .read_until(b'\n', &mut rest)
                .await?;
            if skipped == 0 || rest.last() == Some(&b'\n') {
                break;
            }
        }
    }

    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

async fn write_loop(mut write: OwnedWriteHalf, mut lines: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = lines.recv().await {
        let framed = format!("{line}\r\n");
        if let Err(e) = write.write_all(framed.as_bytes()).await {
            debug!(error = %e, "IRC socket write failed");
            return;
        }
    }
    let _ = write.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::Value;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    use switchboard_shared::types::UserId;

    #[derive(Debug, PartialEq)]
    enum Seen {
        Connected,
        Data(String),
        Disconnected(String),
    }

    fn fake_gateway(courier: &Courier) -> mpsc::UnboundedReceiver<Seen> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut endpoint = courier.register_endpoint(GATEWAY_ENDPOINT);

        let sink = tx.clone();
        endpoint.on(events::CONNECTED, move |_: ConnectionParams| {
            let _ = sink.send(Seen::Connected);
            async { Ok(Value::Null) }
        });
        let sink = tx.clone();
        endpoint.on(events::DATA, move |p: DataParams| {
            let _ = sink.send(Seen::Data(p.line));
            async { Ok(Value::Null) }
        });
        endpoint.on(events::DISCONNECTED, move |p: DisconnectedParams| {
            let _ = tx.send(Seen::Disconnected(p.reason));
            async { Ok(Value::Null) }
        });
        endpoint.start();
        rx
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    fn params() -> ConnectionParams {
        ConnectionParams {
            user_id: UserId::new("m1"),
            network: "TestNet".into(),
        }
    }

    #[tokio::test]
    async fn test_socket_lifecycle() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let courier = Courier::new();
        let mut seen = fake_gateway(&courier);
        let networks = BTreeMap::from([(
            "TestNet".to_string(),
            IrcServer {
                host: "127.0.0.1".into(),
                port,
            },
        )]);
        let cm = ConnectionManager::new(courier, networks, ConnectLimiter::default());

        cm.connect(params());
        let (server, _) = listener.accept().await.unwrap();
        let (read, mut write) = server.into_split();
        let mut from_client = BufReader::new(read).lines();

        assert_eq!(next(&mut seen).await, Seen::Connected);

        write
            .write_all(b"PING :irc.example.org\r\n:srv 001 alice :Welcome\r\n")
            .await
            .unwrap();
        assert_eq!(
            from_client.next_line().await.unwrap().as_deref(),
            Some("PONG :irc.example.org")
        );
        assert_eq!(next(&mut seen).await, Seen::Data(":srv 001 alice :Welcome".into()));

        cm.write(WriteParams {
            user_id: UserId::new("m1"),
            network: "TestNet".into(),
            lines: vec!["NICK alice".into(), "JOIN #rust".into()],
        });
        assert_eq!(from_client.next_line().await.unwrap().as_deref(), Some("NICK alice"));
        assert_eq!(from_client.next_line().await.unwrap().as_deref(), Some("JOIN #rust"));

        cm.disconnect(params());
        assert_eq!(from_client.next_line().await.unwrap().as_deref(), Some("QUIT"));
        assert!(matches!(next(&mut seen).await, Seen::Disconnected(_)));
        assert!(cm.lock_sockets().is_empty());
    }

    #[tokio::test]
    async fn test_server_hangup_reports_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let courier = Courier::new();
        let mut seen = fake_gateway(&courier);
        let networks = BTreeMap::from([(
            "TestNet".to_string(),
            IrcServer {
                host: "127.0.0.1".into(),
                port,
            },
        )]);
        let cm = ConnectionManager::new(courier, networks, ConnectLimiter::default());

        cm.connect(params());
        let (server, _) = listener.accept().await.unwrap();
        assert_eq!(next(&mut seen).await, Seen::Connected);

        drop(server);
        assert_eq!(
            next(&mut seen).await,
            Seen::Disconnected("Connection closed by server".into())
        );
    }

    async fn listening() -> (TcpListener, ConnectionManager, mpsc::UnboundedReceiver<Seen>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let courier = Courier::new();
        let seen = fake_gateway(&courier);
        let networks = BTreeMap::from([(
            "TestNet".to_string(),
            IrcServer {
                host: "127.0.0.1".into(),
                port,
            },
        )]);
        let cm = ConnectionManager::new(courier, networks, ConnectLimiter::default());
        (listener, cm, seen)
    }

    #[tokio::test]
    async fn test_invalid_utf8_keeps_connection() {
        let (listener, cm, mut seen) = listening().await;

        cm.connect(params());
        let (mut server, _) = listener.accept().await.unwrap();
        assert_eq!(next(&mut seen).await, Seen::Connected);

        server
            .write_all(b":bob!b@h PRIVMSG #rust :caf\xe9\r\n:srv 001 alice :Welcome\r\n")
            .await
            .unwrap();
        assert_eq!(
            next(&mut seen).await,
            Seen::Data(":bob!b@h PRIVMSG #rust :caf\u{FFFD}".into())
        );
        assert_eq!(next(&mut seen).await, Seen::Data(":srv 001 alice :Welcome".into()));
    }

    #[tokio::test]
    async fn test_overlong_line_is_cut() {
        let (listener, cm, mut seen) = listening().await;

        cm.connect(params());
        let (mut server, _) = listener.accept().await.unwrap();
        assert_eq!(next(&mut seen).await, Seen::Connected);

        let mut flood = vec![b'a'; MAX_LINE_LEN * 2 + 100];
        flood.extend_from_slice(b"\r\n:srv 002 alice :Next\r\n");
        server.write_all(&flood).await.unwrap();

        assert_eq!(next(&mut seen).await, Seen::Data("a".repeat(MAX_LINE_LEN)));
        assert_eq!(next(&mut seen).await, Seen::Data(":srv 002 alice :Next".into()));
    }

    #[tokio::test]
    async fn test_connect_while_pending_opens_one_socket() {
        let (listener, cm, mut seen) = listening().await;

        cm.connect(params());
        cm.connect(params());

        let (_server, _) = listener.accept().await.unwrap();
        assert_eq!(next(&mut seen).await, Seen::Connected);

        let second = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
        assert!(second.is_err());
        assert_eq!(cm.lock_sockets().len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_cancels_pending_connect() {
        let (listener, cm, mut seen) = listening().await;

        cm.connect(params());
        cm.disconnect(params());
        assert_eq!(next(&mut seen).await, Seen::Disconnected("Connection closed".into()));

        let (server, _) = listener.accept().await.unwrap();
        let mut from_client = BufReader::new(server).lines();
        assert_eq!(from_client.next_line().await.unwrap(), None);

        let late = tokio::time::timeout(Duration::from_millis(200), seen.recv()).await;
        assert!(late.is_err());
        assert!(cm.lock_sockets().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_network_and_idle_disconnect() {
        let courier = Courier::new();
        let mut seen = fake_gateway(&courier);
        let cm = ConnectionManager::new(courier, BTreeMap::new(), ConnectLimiter::default());

        cm.connect(params());
        assert_eq!(next(&mut seen).await, Seen::Disconnected("Unknown IRC network".into()));

        cm.disconnect(params());
        assert_eq!(next(&mut seen).await, Seen::Disconnected("Not connected".into()));
    }
}
