//! Client sessions: bootstrap on first contact, request routing and
//! message edits.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use switchboard_shared::constants::{GATEWAY_ENDPOINT, LOOPBACK_ENDPOINT, NATIVE_NETWORK};
use switchboard_shared::events::{
    self, ChatParams, CloseParams, CreateParams, JoinParams, PasswordParams, SendParams, TopicParams,
    UserParams, WhoisParams,
};
use switchboard_shared::protocol::{
    ClientRequest, FriendInfo, MembersUpdate, Notification, Response, WindowMessages,
};
use switchboard_shared::types::{Gid, MessageStatus, SessionId, UserId, WindowId};
use switchboard_store::{Database, Message};

use crate::context::Context;
use crate::error::{Result, ServerError};
use crate::view;

#[derive(Clone)]
pub struct SessionService {
    ctx: Context,
}

impl SessionService {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Register a new session and queue its bootstrap. The client already
    /// holds every message up to `cached_upto`.
    pub async fn start(
        &self,
        user: &UserId,
        session: &SessionId,
        cached_upto: Gid,
        max_backlog: usize,
    ) -> Result<()> {
        self.ctx.outbox.open_session(user, session).await?;

        let bootstrap = self.bootstrap(user, cached_upto, max_backlog).await?;
        info!(user = %user, session = %session, notifications = bootstrap.len(), "Session started");
        self.ctx.outbox.queue_many(user, session, bootstrap).await?;

        self.announce_presence(user, true).await?;

        self.ctx.courier.call_no_wait(
            GATEWAY_ENDPOINT,
            events::RECONNECT_IF_INACTIVE,
            &UserParams {
                user_id: user.clone(),
            },
        )?;
        Ok(())
    }

    pub async fn end(&self, user: &UserId, session: &SessionId) -> Result<()> {
        self.ctx.outbox.close_session(user, session).await?;

        let remaining = self
            .ctx
            .store
            .run(|db| db.live_sessions(user))
            .await?;
        if remaining.is_empty() {
            self.announce_presence(user, false).await?;
        }
        info!(user = %user, session = %session, "Session ended");
        Ok(())
    }

    /// Close sessions that stopped polling. Users left without a session
    /// go offline for their friends.
    pub async fn reap_idle(&self, max_idle: Duration) -> Result<usize> {
        let reaped = self.ctx.outbox.reap_idle(max_idle).await?;

        let users: BTreeSet<UserId> = reaped.iter().map(|(user, _)| user.clone()).collect();
        for user in &users {
            let remaining = self.ctx.store.run(|db| db.live_sessions(user)).await?;
            if remaining.is_empty() {
                self.announce_presence(user, false).await?;
            }
        }

        if !reaped.is_empty() {
            info!(sessions = reaped.len(), "Idle sessions closed");
        }
        Ok(reaped.len())
    }

    /// Everything a fresh session needs to rebuild its model, prefixed with
    /// `STARTUP_SEQUENCE`.
    pub async fn bootstrap(
        &self,
        user: &UserId,
        cached_upto: Gid,
        max_backlog: usize,
    ) -> Result<Vec<Notification>> {
        let networks = self.ctx.config.network_names();

        let mut list = self
            .ctx
            .store
            .run(|db| build_bootstrap(db, user, networks, cached_upto, max_backlog))
            .await?;

        list.insert(0, Notification::StartupSequence { length: list.len() });
        Ok(list)
    }

    pub async fn handle_request(
        &self,
        user: &UserId,
        session: &SessionId,
        request: ClientRequest,
    ) -> Result<()> {
        let user_id = user.clone();
        let session_id = session.clone();

        match request {
            ClientRequest::Set { settings } => {
                self.ctx
                    .store
                    .run(|db| db.update_settings(user, &settings))
                    .await?;
                self.ctx
                    .outbox
                    .queue_all(user, Notification::UpdateSettings { settings })
                    .await
            }
            ClientRequest::Send {
                network,
                name,
                target_user_id,
                text,
            } => {
                let target = self.backend(&network)?;
                let params = SendParams {
                    user_id,
                    session_id,
                    network,
                    name,
                    target_user_id,
                    text,
                };
                self.forward(target, events::SEND, &params)
            }
            ClientRequest::Join {
                network,
                name,
                password,
            } => {
                let target = self.backend(&network)?;
                let params = JoinParams {
                    user_id,
                    session_id,
                    network,
                    name,
                    password,
                };
                self.forward(target, events::JOIN, &params)
            }
            ClientRequest::Create { name, password } => {
                let params = CreateParams {
                    user_id,
                    session_id,
                    name,
                    password,
                };
                self.forward(LOOPBACK_ENDPOINT, events::CREATE, &params)
            }
            ClientRequest::Close {
                network,
                name,
                window_type,
                last,
            } => {
                let target = self.backend(&network)?;
                let params = CloseParams {
                    user_id,
                    session_id,
                    network,
                    name,
                    window_type,
                    last,
                };
                self.forward(target, events::CLOSE, &params)
            }
            ClientRequest::UpdatePassword {
                network,
                name,
                password,
            } => {
                if network == NATIVE_NETWORK {
                    let response = Response::error("Group passwords can't be changed.");
                    return self
                        .ctx
                        .outbox
                        .queue(user, session, Notification::UpdatePasswordResp(response))
                        .await;
                }
                let target = self.backend(&network)?;
                let params = PasswordParams {
                    user_id,
                    session_id,
                    network,
                    name,
                    password,
                };
                self.forward(target, events::UPDATE_PASSWORD, &params)
            }
            ClientRequest::UpdateTopic {
                network,
                name,
                topic,
            } => {
                if network == NATIVE_NETWORK {
                    let response = Response::error("Group topics can't be changed.");
                    return self
                        .ctx
                        .outbox
                        .queue(user, session, Notification::UpdateTopicResp(response))
                        .await;
                }
                let target = self.backend(&network)?;
                let params = TopicParams {
                    user_id,
                    session_id,
                    network,
                    name,
                    topic,
                };
                self.forward(target, events::UPDATE_TOPIC, &params)
            }
            ClientRequest::Whois { network, nick } => {
                if network == NATIVE_NETWORK {
                    debug!(user = %user, "WHOIS on the native network ignored");
                    return Ok(());
                }
                let target = self.backend(&network)?;
                let params = WhoisParams {
                    user_id,
                    session_id,
                    network,
                    nick,
                };
                self.forward(target, events::WHOIS, &params)
            }
            ClientRequest::Chat {
                network,
                target_user_id,
            } => {
                let target = self.backend(&network)?;
                let params = ChatParams {
                    user_id,
                    session_id,
                    network,
                    target_user_id,
                };
                self.forward(target, events::CHAT, &params)
            }
            ClientRequest::Edit {
                window_id,
                gid,
                text,
            } => {
                self.update_message(user, window_id, gid, MessageStatus::Edited, Some(&text))
                    .await
            }
            ClientRequest::Delete { window_id, gid } => {
                self.update_message(user, window_id, gid, MessageStatus::Deleted, None)
                    .await
            }
        }
    }

    /// Rewrite one of the user's messages and push the new version to all
    /// sessions.
    async fn update_message(
        &self,
        user: &UserId,
        window_id: WindowId,
        gid: Gid,
        status: MessageStatus,
        body: Option<&str>,
    ) -> Result<()> {
        let message = self
            .ctx
            .store
            .run(|db| {
                if db.find_window(user, window_id)?.is_none() {
                    return Ok(None);
                }
                let message = db.get_message(gid)?;
                if message.window_id != window_id || message.user_id.as_ref() != Some(user) {
                    return Ok(None);
                }
                db.update_message(gid, status, body).map(Some)
            })
            .await?;

        let Some(message) = message else {
            return Err(ServerError::BadRequest(format!(
                "message {gid} in window {window_id} can't be changed"
            )));
        };

        self.ctx
            .outbox
            .queue_all(user, Notification::single_message(window_id, message.to_info()))
            .await
    }

    /// Endpoint serving `network`.
    fn backend(&self, network: &str) -> Result<&'static str> {
        if network == NATIVE_NETWORK {
            Ok(LOOPBACK_ENDPOINT)
        } else if self.ctx.config.irc_networks.contains_key(network) {
            Ok(GATEWAY_ENDPOINT)
        } else {
            Err(ServerError::BadRequest(format!("unknown network {network}")))
        }
    }

    fn forward<P: serde::Serialize>(&self, target: &str, event: &str, params: &P) -> Result<()> {
        self.ctx.courier.call_no_wait(target, event, params)?;
        Ok(())
    }

    /// Tell every friend with a live session that the user came or went.
    async fn announce_presence(&self, user: &UserId, online: bool) -> Result<()> {
        let friends = self.ctx.store.run(|db| db.friends(user)).await?;

        for friend in friends {
            self.ctx
                .outbox
                .queue_all(
                    &friend,
                    Notification::UpdateFriends {
                        reset: false,
                        friends: vec![FriendInfo {
                            user_id: user.clone(),
                            online,
                        }],
                    },
                )
                .await?;
        }
        Ok(())
    }
}

fn build_bootstrap(
    db: &Database,
    user: &UserId,
    networks: Vec<String>,
    cached_upto: Gid,
    max_backlog: usize,
) -> switchboard_store::Result<Vec<Notification>> {
    let mut list = vec![
        Notification::UpdateSettings {
            settings: db.settings(user)?,
        },
        Notification::UpdateNetworks { networks },
    ];

    let friends: BTreeSet<UserId> = db.friends(user)?;
    let mut infos = Vec::with_capacity(friends.len());
    for friend in friends {
        let online = !db.live_sessions(&friend)?.is_empty();
        infos.push(FriendInfo {
            user_id: friend,
            online,
        });
    }
    list.push(Notification::UpdateFriends {
        reset: true,
        friends: infos,
    });
    list.push(Notification::ConfirmFriends {
        friends: db.friend_requests(user)?,
    });

    let now = Utc::now();
    for alert in db.pending_alerts(user)? {
        if alert.expires_at > now {
            list.push(Notification::AddAlert {
                alert_id: alert.id,
                message: alert.body,
            });
        }
    }

    let mut backlog = Vec::new();
    for window_id in db.window_ids(user)? {
        let Some(window) = db.find_window(user, window_id)? else {
            warn!(user = %user, window = %window_id, "Window list entry without a window");
            continue;
        };

        list.push(Notification::AddWindow(view::window_info(db, user, &window)?));
        list.push(Notification::UpdateMembers(MembersUpdate {
            window_id,
            reset: true,
            members: view::members(db, user, &window)?,
        }));

        // Edits reach the client even when the line is older than the
        // backlog slice.
        let mut merged: BTreeMap<Gid, Message> = db
            .last_messages(window_id, max_backlog)?
            .into_iter()
            .filter(|m| m.is_newer_than(cached_upto))
            .map(|m| (m.gid, m))
            .collect();
        for edit in db.edits_since(window_id, cached_upto)? {
            merged.insert(edit.gid, edit);
        }
        let messages: Vec<_> = merged.values().map(Message::to_info).collect();
        if !messages.is_empty() {
            backlog.push(WindowMessages {
                window_id,
                messages,
            });
        }
    }

    list.push(Notification::AddMessages { messages: backlog });
    list.push(Notification::FinishInit);
    Ok(list)
}
