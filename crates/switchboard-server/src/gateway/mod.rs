//! IRC gateway: per-user connection state machine and IRC protocol
//! translation.
//!
//! The gateway owns no sockets. It tells the connection manager what to
//! write and reacts to the lines and connection events the manager reports
//! back. Everything concerning one (user, network) pair arrives on the same
//! courier lane, so handlers for a connection never interleave.

mod backoff;
mod commands;
mod irc;
mod mode;
mod nick;
mod parser;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use switchboard_bus::Endpoint;
use switchboard_shared::channel::normalize_channel_name;
use switchboard_shared::constants::{CONNECTION_MANAGER_ENDPOINT, GATEWAY_ENDPOINT, NATIVE_NETWORK};
use switchboard_shared::events::{
    self, ChatParams, CloseParams, ConnectionParams, DataParams, DisconnectedParams, JoinParams,
    PasswordParams, SendParams, TopicParams, UserParams, WhoisParams, WriteParams,
};
use switchboard_shared::nick::irc_nick;
use switchboard_shared::protocol::{Notification, Response};
use switchboard_shared::types::{NetworkState, UserId, WindowType};
use switchboard_store::{NewWindow, StoreError};

use crate::context::{route, Context};
use crate::error::Result;
use crate::text_line::{self, CAT_INFO, CAT_MSG};
use crate::view;

use backoff::{backoff, Backoff};

/// Internal event fired by the reconnect timer.
const RECONNECT: &str = "reconnect";

const RESTART_NOTICE: &str = "Server restarted. Global rate limiting to avoid flooding IRC server \
                              enabled. Next connect will be slow.";

/// Payload of [`RECONNECT`]. `timer` must still be the connection's
/// current timer generation when it fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReconnectParams {
    user_id: UserId,
    network: String,
    timer: u64,
}

#[derive(Clone)]
pub struct Gateway {
    ctx: Context,
    rng: Arc<Mutex<StdRng>>,
    timers: Arc<Mutex<HashMap<ConnectionParams, u64>>>,
}

impl Gateway {
    pub fn new(ctx: Context) -> Self {
        Self::with_rng(ctx, StdRng::from_entropy())
    }

    /// Gateway with a caller supplied random source for nick fallbacks.
    pub fn with_rng(ctx: Context, rng: StdRng) -> Self {
        Self {
            ctx,
            rng: Arc::new(Mutex::new(rng)),
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register the gateway endpoint and install its handlers. The caller
    /// starts the returned endpoint.
    pub fn register(&self) -> Endpoint {
        let mut endpoint = self.ctx.courier.register_endpoint(GATEWAY_ENDPOINT);

        route(&mut endpoint, events::SEND, self, |gw: Gateway, p: SendParams| async move {
            gw.send(p).await
        });
        route(&mut endpoint, events::JOIN, self, |gw: Gateway, p: JoinParams| async move {
            gw.join(p).await
        });
        route(&mut endpoint, events::CHAT, self, |gw: Gateway, p: ChatParams| async move {
            gw.chat(p).await
        });
        route(&mut endpoint, events::CLOSE, self, |gw: Gateway, p: CloseParams| async move {
            gw.close(p).await
        });
        route(&mut endpoint, events::UPDATE_PASSWORD, self, |gw: Gateway, p: PasswordParams| async move {
            gw.update_password(p).await
        });
        route(&mut endpoint, events::UPDATE_TOPIC, self, |gw: Gateway, p: TopicParams| async move {
            gw.update_topic(p).await
        });
        route(&mut endpoint, events::WHOIS, self, |gw: Gateway, p: WhoisParams| async move {
            gw.whois(p).await
        });
        route(&mut endpoint, events::RESTARTED, self, |gw: Gateway, _: serde_json::Value| async move {
            gw.restarted().await
        });
        route(&mut endpoint, events::RECONNECT_IF_INACTIVE, self, |gw: Gateway, p: UserParams| async move {
            gw.reconnect_if_inactive(&p.user_id).await
        });
        route(&mut endpoint, events::DATA, self, |gw: Gateway, p: DataParams| async move {
            gw.handle_line(&p.user_id, &p.network, &p.line).await
        });
        route(&mut endpoint, events::CONNECTED, self, |gw: Gateway, p: ConnectionParams| async move {
            gw.connected(&p.user_id, &p.network).await
        });
        route(&mut endpoint, events::DISCONNECTED, self, |gw: Gateway, p: DisconnectedParams| async move {
            gw.disconnected(&p.user_id, &p.network, &p.reason).await
        });
        route(&mut endpoint, RECONNECT, self, |gw: Gateway, p: ReconnectParams| async move {
            gw.reconnect(p).await
        });

        endpoint
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// Ask the connection manager for a connection to `network`.
    pub async fn connect(&self, user: &UserId, network: &str, keep_retry_count: bool) -> Result<()> {
        // Any reconnect timer still running is obsolete now.
        self.arm_timer(user, network);

        let nick = self
            .ctx
            .store
            .run(|db| {
                let nick = db
                    .user_nick(user)?
                    .ok_or_else(|| StoreError::NotFound(format!("nick of user {user}")))?;
                db.set_current_nick(user, network, &nick)?;
                db.set_network_state(user, network, NetworkState::Connecting)?;
                if !keep_retry_count {
                    db.reset_retry_count(user, network)?;
                }
                Ok(nick)
            })
            .await?;

        info!(user = %user, network, nick = %nick, "Connecting to IRC network");
        text_line::broadcast(&self.ctx, user, network, CAT_INFO, "Connecting to IRC server...").await?;

        self.ctx.courier.call_no_wait(
            CONNECTION_MANAGER_ENDPOINT,
            events::CONNECT,
            &ConnectionParams {
                user_id: user.clone(),
                network: network.to_string(),
            },
        )?;
        Ok(())
    }

    /// Close the connection on purpose. The following `disconnected`
    /// event does not trigger a reconnect.
    pub async fn disconnect(&self, user: &UserId, network: &str) -> Result<()> {
        self.ctx
            .store
            .run(|db| db.set_network_state(user, network, NetworkState::Closing))
            .await?;

        self.ctx.courier.call_no_wait(
            CONNECTION_MANAGER_ENDPOINT,
            events::DISCONNECT,
            &ConnectionParams {
                user_id: user.clone(),
                network: network.to_string(),
            },
        )?;
        Ok(())
    }

    async fn connected(&self, user: &UserId, network: &str) -> Result<()> {
        let nick = self.nick_of(user, network).await?;
        debug!(user = %user, network, "Socket connected, registering");

        self.write(
            user,
            network,
            vec![
                format!("NICK {nick}"),
                format!("USER {nick} 8 * :{}", self.ctx.config.real_name),
            ],
        )
    }

    async fn disconnected(&self, user: &UserId, network: &str, reason: &str) -> Result<()> {
        let (previous, retry_count) = self
            .ctx
            .store
            .run(|db| {
                let previous = db.swap_network_state(user, network, NetworkState::Disconnected)?;
                Ok((previous, db.retry_count(user, network)?))
            })
            .await?;

        if previous == Some(NetworkState::Closing) {
            info!(user = %user, network, "Connection closed");
            return Ok(());
        }

        let Backoff { delay, message } = backoff(retry_count, reason);
        warn!(user = %user, network, reason, retry_count, delay_secs = delay.as_secs(), "Lost IRC connection");

        self.ctx
            .store
            .run(|db| db.incr_retry_count(user, network))
            .await?;
        text_line::broadcast(&self.ctx, user, network, CAT_INFO, &message).await?;

        let courier = self.ctx.courier.clone();
        let params = ReconnectParams {
            user_id: user.clone(),
            network: network.to_string(),
            timer: self.arm_timer(user, network),
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = courier.call_no_wait(GATEWAY_ENDPOINT, RECONNECT, &params) {
                warn!(error = %e, "Reconnect timer could not reach the gateway");
            }
        });
        Ok(())
    }

    /// Timer expiry. The user may have closed the network meanwhile, or a
    /// later connect may have replaced this timer.
    async fn reconnect(&self, p: ReconnectParams) -> Result<()> {
        let (user, network) = (&p.user_id, p.network.as_str());
        if !self.is_current_timer(user, network, p.timer) {
            debug!(user = %user, network, timer = p.timer, "Stale reconnect timer");
            return Ok(());
        }

        let state = self
            .ctx
            .store
            .run(|db| db.network_state(user, network))
            .await?;

        if state == Some(NetworkState::Disconnected) {
            self.connect(user, network, true).await?;
        } else {
            debug!(user = %user, network, ?state, "Skipping reconnect");
        }
        Ok(())
    }

    /// The connection manager lost every socket. Reconnect everyone, slowly.
    async fn restarted(&self) -> Result<()> {
        let targets = self
            .ctx
            .store
            .run(|db| {
                let mut targets = Vec::new();
                for user in db.user_list()? {
                    for network in db.networks_for_user(&user)? {
                        if network != NATIVE_NETWORK {
                            targets.push((user.clone(), network));
                        }
                    }
                }
                Ok(targets)
            })
            .await?;

        info!(connections = targets.len(), "Connection manager restarted, reconnecting");

        for (user, network) in targets {
            if !self.ctx.config.irc_networks.contains_key(&network) {
                warn!(user = %user, network = %network, "Network no longer configured");
                continue;
            }
            text_line::broadcast(&self.ctx, &user, &network, CAT_INFO, RESTART_NOTICE).await?;
            self.connect(&user, &network, false).await?;
        }
        Ok(())
    }

    /// A session started; bring back networks that are not connected.
    async fn reconnect_if_inactive(&self, user: &UserId) -> Result<()> {
        let inactive = self
            .ctx
            .store
            .run(|db| {
                let mut inactive = Vec::new();
                for network in db.networks_for_user(user)? {
                    if network == NATIVE_NETWORK {
                        continue;
                    }
                    let state = db.network_state(user, &network)?;
                    if matches!(state, None | Some(NetworkState::Disconnected)) {
                        inactive.push(network);
                    }
                }
                Ok(inactive)
            })
            .await?;

        for network in inactive {
            self.connect(user, &network, false).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Session requests
    // ------------------------------------------------------------------

    async fn send(&self, p: SendParams) -> Result<()> {
        let target = match (&p.name, &p.target_user_id) {
            (Some(name), _) => name.clone(),
            (None, Some(peer)) => irc_nick(peer)?,
            (None, None) => {
                warn!(user = %p.user_id, "Message without a target");
                return Ok(());
            }
        };

        self.write(&p.user_id, &p.network, vec![format!("PRIVMSG {target} :{}", p.text)])?;

        // IRC does not echo our own lines back.
        let window_id = self
            .ctx
            .store
            .run(|db| match (&p.name, &p.target_user_id) {
                (Some(name), _) => db.group_window_id(&p.user_id, &p.network, name),
                (None, Some(peer)) => db.one_on_one_window_id(&p.user_id, &p.network, peer),
                (None, None) => Ok(None),
            })
            .await?;

        if let Some(window_id) = window_id {
            text_line::send(&self.ctx, &p.user_id, window_id, Some(&p.user_id), CAT_MSG, &p.text).await?;
        }
        Ok(())
    }

    async fn join(&self, p: JoinParams) -> Result<()> {
        let name = match normalize_channel_name(&p.name) {
            Ok(name) => name,
            Err(e) => {
                return self
                    .ctx
                    .outbox
                    .queue(&p.user_id, &p.session_id, Notification::JoinResp(Response::error(e.to_string())))
                    .await;
            }
        };
        let password = p.password.as_deref().filter(|pw| !pw.is_empty());

        let (state, existing) = self
            .ctx
            .store
            .run(|db| {
                Ok((
                    db.network_state(&p.user_id, &p.network)?,
                    db.group_window_id(&p.user_id, &p.network, &name)?,
                ))
            })
            .await?;

        match state {
            None | Some(NetworkState::Disconnected) => self.connect(&p.user_id, &p.network, false).await?,
            Some(NetworkState::Connected) => self.write(&p.user_id, &p.network, vec![join_line(&name, password)])?,
            // Registration in progress, the channel is joined on end of MOTD.
            Some(NetworkState::Connecting | NetworkState::Closing) => {}
        }

        self.ctx
            .outbox
            .queue(&p.user_id, &p.session_id, Notification::JoinResp(Response::ok()))
            .await?;

        if existing.is_some() {
            return Ok(());
        }

        let info = self
            .ctx
            .store
            .run(|db| {
                let window = db.create_window(
                    &p.user_id,
                    NewWindow {
                        network: &p.network,
                        name: &name,
                        window_type: WindowType::Group,
                        peer: None,
                        password,
                    },
                )?;
                view::window_info(db, &p.user_id, &window)
            })
            .await?;

        self.ctx
            .outbox
            .queue_all(&p.user_id, Notification::AddWindow(info))
            .await
    }

    async fn chat(&self, p: ChatParams) -> Result<()> {
        let created = self
            .ctx
            .store
            .run(|db| {
                if db
                    .one_on_one_window_id(&p.user_id, &p.network, &p.target_user_id)?
                    .is_some()
                {
                    return Ok(None);
                }
                let window = db.create_window(
                    &p.user_id,
                    NewWindow {
                        network: &p.network,
                        name: p.target_user_id.as_str(),
                        window_type: WindowType::OneOnOne,
                        peer: Some(&p.target_user_id),
                        password: None,
                    },
                )?;
                Ok(Some(view::window_info(db, &p.user_id, &window)?))
            })
            .await?;

        self.ctx
            .outbox
            .queue(&p.user_id, &p.session_id, Notification::ChatResp(Response::ok()))
            .await?;
        if let Some(info) = created {
            self.ctx
                .outbox
                .queue_all(&p.user_id, Notification::AddWindow(info))
                .await?;
        }
        Ok(())
    }

    async fn close(&self, p: CloseParams) -> Result<()> {
        let state = self
            .ctx
            .store
            .run(|db| db.network_state(&p.user_id, &p.network))
            .await?;

        if state == Some(NetworkState::Connected) && p.window_type == WindowType::Group {
            self.write(&p.user_id, &p.network, vec![format!("PART {}", p.name)])?;
        }

        if p.last {
            self.disconnect(&p.user_id, &p.network).await?;
        }
        Ok(())
    }

    async fn update_password(&self, p: PasswordParams) -> Result<()> {
        let response = if self.is_connected(&p.user_id, &p.network).await? {
            let line = match p.password.as_deref().filter(|pw| !pw.is_empty()) {
                Some(password) => format!("MODE {} +k {password}", p.name),
                // Some servers insist on a parameter for -k.
                None => format!("MODE {} -k foobar", p.name),
            };
            self.write(&p.user_id, &p.network, vec![line])?;
            Response::ok()
        } else {
            Response::error("Can't change the password. You are not connected to the IRC network")
        };

        self.ctx
            .outbox
            .queue(&p.user_id, &p.session_id, Notification::UpdatePasswordResp(response))
            .await
    }

    async fn update_topic(&self, p: TopicParams) -> Result<()> {
        let response = if self.is_connected(&p.user_id, &p.network).await? {
            self.write(&p.user_id, &p.network, vec![format!("TOPIC {} :{}", p.name, p.topic)])?;
            Response::ok()
        } else {
            Response::error("Can't change the topic. You are not connected to the IRC network")
        };

        self.ctx
            .outbox
            .queue(&p.user_id, &p.session_id, Notification::UpdateTopicResp(response))
            .await
    }

    async fn whois(&self, p: WhoisParams) -> Result<()> {
        self.write(&p.user_id, &p.network, vec![format!("WHOIS {}", p.nick)])
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Start a new timer generation for the connection and return it.
    fn arm_timer(&self, user: &UserId, network: &str) -> u64 {
        let mut timers = self.lock_timers();
        let generation = timers
            .entry(ConnectionParams {
                user_id: user.clone(),
                network: network.to_string(),
            })
            .or_insert(0);
        *generation += 1;
        *generation
    }

    fn is_current_timer(&self, user: &UserId, network: &str, timer: u64) -> bool {
        let key = ConnectionParams {
            user_id: user.clone(),
            network: network.to_string(),
        };
        self.lock_timers().get(&key) == Some(&timer)
    }

    fn lock_timers(&self) -> MutexGuard<'_, HashMap<ConnectionParams, u64>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, user: &UserId, network: &str, lines: Vec<String>) -> Result<()> {
        self.ctx.courier.call_no_wait(
            CONNECTION_MANAGER_ENDPOINT,
            events::WRITE,
            &WriteParams {
                user_id: user.clone(),
                network: network.to_string(),
                lines,
            },
        )?;
        Ok(())
    }

    async fn is_connected(&self, user: &UserId, network: &str) -> Result<bool> {
        let state = self
            .ctx
            .store
            .run(|db| db.network_state(user, network))
            .await?;
        Ok(state == Some(NetworkState::Connected))
    }

    /// Nick in use on `network`, falling back to the account nick.
    async fn nick_of(&self, user: &UserId, network: &str) -> Result<String> {
        Ok(self
            .ctx
            .store
            .run(|db| {
                view::own_name(db, user, network)?
                    .ok_or_else(|| StoreError::NotFound(format!("nick of user {user}")))
            })
            .await?)
    }

    /// Push the user's nick on every network to all sessions.
    async fn send_nicks(&self, user: &UserId) -> Result<()> {
        let networks = &self.ctx.config.irc_networks;
        let nicks = self
            .ctx
            .store
            .run(|db| {
                let mut nicks = db.current_nicks(user, networks.keys().map(String::as_str))?;
                if let Some(nick) = db.user_nick(user)? {
                    nicks.insert(NATIVE_NETWORK.to_string(), nick);
                }
                Ok(nicks)
            })
            .await?;

        self.ctx
            .outbox
            .queue_all(user, Notification::Nick { nicks })
            .await
    }
}

fn join_line(channel: &str, password: Option<&str>) -> String {
    match password {
        Some(password) => format!("JOIN {channel} {password}"),
        None => format!("JOIN {channel}"),
    }
}
