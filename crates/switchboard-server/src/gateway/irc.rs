//! Handlers for lines received from IRC servers.

use std::collections::BTreeMap;
use std::sync::PoisonError;

use tracing::{debug, trace, warn};

use switchboard_shared::channel::is_channel;
use switchboard_shared::nick::irc_user_id;
use switchboard_shared::protocol::{
    Member, MemberRef, MembersRemoval, MembersUpdate, Notification, WindowUpdate,
};
use switchboard_shared::types::{NetworkState, Role, UserId, WindowId, WindowType};
use switchboard_store::NewWindow;

use super::commands::{lookup, Command};
use super::mode;
use super::nick::next_nick;
use super::parser::IrcMessage;
use super::{join_line, Gateway};
use crate::error::Result;
use crate::text_line::{self, CAT_BANNER, CAT_ERROR, CAT_INFO, CAT_MSG};
use crate::view;

impl Gateway {
    /// Process one line received on the user's connection to `network`.
    pub async fn handle_line(&self, user: &UserId, network: &str, line: &str) -> Result<()> {
        let Some(msg) = IrcMessage::parse(line) else {
            return Ok(());
        };
        let Some(command) = lookup(&msg.command) else {
            trace!(user = %user, network, command = %msg.command, "Ignoring IRC command");
            return Ok(());
        };

        match command {
            Command::ServerText => self.server_text(user, network, &msg).await,
            Command::ForcedNick => self.forced_nick(user, network, &msg).await,
            Command::TopicReply => self.topic_reply(user, network, &msg).await,
            Command::Names => self.names_chunk(user, network, &msg).await,
            Command::EndOfNames => self.end_of_names(user, network, &msg).await,
            Command::EndOfMotd => self.end_of_motd(user, network).await,
            Command::NickRefused => self.try_different_nick(user, network).await,
            Command::NotOperator => self.not_operator(user, network, &msg).await,
            Command::Join => self.irc_join(user, network, &msg).await,
            Command::Part => self.irc_part(user, network, &msg).await,
            Command::Quit => self.irc_quit(user, network, &msg).await,
            Command::Nick => self.irc_nick_change(user, network, &msg).await,
            Command::Mode => self.irc_mode(user, network, &msg).await,
            Command::Topic => self.irc_topic(user, network, &msg).await,
            Command::Privmsg => self.irc_privmsg(user, network, &msg).await,
            Command::Error => self.irc_error(user, network, &msg).await,
        }
    }

    async fn server_text(&self, user: &UserId, network: &str, msg: &IrcMessage) -> Result<()> {
        let text = msg.params.join(" ");
        if text.is_empty() {
            return Ok(());
        }
        let cat = if msg.command == "372" { CAT_BANNER } else { CAT_INFO };
        text_line::broadcast(&self.ctx, user, network, cat, &text).await
    }

    async fn forced_nick(&self, user: &UserId, network: &str, msg: &IrcMessage) -> Result<()> {
        if let Some(forced) = msg.param(0) {
            self.ctx
                .store
                .run(|db| db.set_current_nick(user, network, forced))
                .await?;
        }
        self.try_different_nick(user, network).await
    }

    pub(super) async fn try_different_nick(&self, user: &UserId, network: &str) -> Result<()> {
        let (preferred, current, state) = self
            .ctx
            .store
            .run(|db| {
                let preferred = db.user_nick(user)?.unwrap_or_default();
                let current = db.current_nick(user, network)?.unwrap_or_else(|| preferred.clone());
                Ok((preferred, current, db.network_state(user, network)?))
            })
            .await?;

        let choice = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            next_nick(&preferred, &current, &mut *rng)
        };
        debug!(user = %user, network, nick = %choice.nick, "Trying another nick");

        self.ctx
            .store
            .run(|db| db.set_current_nick(user, network, &choice.nick))
            .await?;

        if !(state == Some(NetworkState::Connected) && choice.numeric) {
            self.write(user, network, vec![format!("NICK {}", choice.nick)])?;
        }
        Ok(())
    }

    async fn topic_reply(&self, user: &UserId, network: &str, msg: &IrcMessage) -> Result<()> {
        let (Some(channel), Some(topic)) = (msg.param(0), msg.param(1)) else {
            return Ok(());
        };
        let Some(window_id) = self.channel_window(user, network, channel).await? else {
            return Ok(());
        };
        self.set_topic(user, window_id, topic).await
    }

    async fn names_chunk(&self, user: &UserId, network: &str, msg: &IrcMessage) -> Result<()> {
        let (Some(channel), Some(list)) = (msg.param(1), msg.param(2)) else {
            return Ok(());
        };
        let Some(window_id) = self.channel_window(user, network, channel).await? else {
            return Ok(());
        };

        let names: BTreeMap<String, Role> = list.split_whitespace().map(parse_name).collect();
        self.ctx
            .store
            .run(|db| db.add_names(user, window_id, &names))
            .await?;
        Ok(())
    }

    async fn end_of_names(&self, user: &UserId, network: &str, msg: &IrcMessage) -> Result<()> {
        let Some(channel) = msg.param(0) else {
            return Ok(());
        };
        let Some(window_id) = self.channel_window(user, network, channel).await? else {
            return Ok(());
        };

        let members = self
            .ctx
            .store
            .run(|db| {
                let window = db.window(user, window_id)?;
                view::members(db, user, &window)
            })
            .await?;

        self.ctx
            .outbox
            .queue_all(
                user,
                Notification::AddMembers(MembersUpdate {
                    window_id,
                    reset: true,
                    members,
                }),
            )
            .await
    }

    async fn end_of_motd(&self, user: &UserId, network: &str) -> Result<()> {
        let windows = self
            .ctx
            .store
            .run(|db| {
                db.set_network_state(user, network, NetworkState::Connected)?;
                db.reset_retry_count(user, network)?;
                db.group_windows_for_network(user, network)
            })
            .await?;

        if windows.is_empty() {
            debug!(user = %user, network, "No channels left, closing connection");
            return self.disconnect(user, network).await;
        }

        let mut lines = Vec::with_capacity(windows.len());
        for window in &windows {
            self.ctx
                .store
                .run(|db| db.clear_names(user, window.id))
                .await?;
            self.ctx
                .outbox
                .queue_all(
                    user,
                    Notification::AddMembers(MembersUpdate {
                        window_id: window.id,
                        reset: true,
                        members: Vec::new(),
                    }),
                )
                .await?;
            lines.push(join_line(&window.name, window.password.as_deref()));
        }
        self.write(user, network, lines)?;

        self.send_nicks(user).await
    }

    async fn not_operator(&self, user: &UserId, network: &str, msg: &IrcMessage) -> Result<()> {
        let Some(channel) = msg.param(0) else {
            return Ok(());
        };
        if let Some(window_id) = self.channel_window(user, network, channel).await? {
            text_line::send(&self.ctx, user, window_id, None, CAT_ERROR, "You're not channel operator").await?;
        }
        Ok(())
    }

    async fn irc_join(&self, user: &UserId, network: &str, msg: &IrcMessage) -> Result<()> {
        let (Some(channel), Some(nick)) = (msg.param(0), msg.nick()) else {
            return Ok(());
        };

        let Some(window_id) = self.channel_window(user, network, channel).await? else {
            // Joined something we have no window for, e.g. a forced join.
            return self.write(user, network, vec![format!("PART {channel}")]);
        };

        let own = self.nick_of(user, network).await?;
        if nick == own {
            self.ctx
                .store
                .run(|db| db.clear_names(user, window_id))
                .await?;
        } else {
            self.ctx
                .store
                .run(|db| db.set_role(user, window_id, nick, Role::User))
                .await?;
            self.ctx
                .outbox
                .queue_all(
                    user,
                    Notification::AddMembers(MembersUpdate {
                        window_id,
                        reset: false,
                        members: vec![Member {
                            user_id: irc_user_id(nick),
                            role: Role::User,
                        }],
                    }),
                )
                .await?;
        }

        let text = format!("{nick} ({}) has joined channel {channel}", msg.user_host());
        text_line::send(&self.ctx, user, window_id, None, CAT_INFO, &text).await?;
        Ok(())
    }

    async fn irc_part(&self, user: &UserId, network: &str, msg: &IrcMessage) -> Result<()> {
        let (Some(channel), Some(nick)) = (msg.param(0), msg.nick()) else {
            return Ok(());
        };
        let reason = msg.param(1).unwrap_or_default();

        let Some(window_id) = self.channel_window(user, network, channel).await? else {
            return Ok(());
        };

        let own = self.nick_of(user, network).await?;
        let text = if nick == own {
            format!("You have left channel {channel}. {reason}")
        } else {
            format!("{nick} ({}) has left channel {channel}. {reason}", msg.user_host())
        };
        self.remove_participant(user, window_id, nick, &own, text.trim_end())
            .await
    }

    async fn irc_quit(&self, user: &UserId, network: &str, msg: &IrcMessage) -> Result<()> {
        let Some(nick) = msg.nick() else {
            return Ok(());
        };
        let reason = msg.param(0).unwrap_or_default();
        let text = format!("{nick} ({}) has quit IRC. Reason: {reason}", msg.user_host());

        let own = self.nick_of(user, network).await?;
        let windows = self
            .ctx
            .store
            .run(|db| db.group_windows_for_network(user, network))
            .await?;

        for window in windows {
            self.remove_participant(user, window.id, nick, &own, &text).await?;
        }
        Ok(())
    }

    /// Drop `nick` from a window, telling the user only if it was a member.
    async fn remove_participant(
        &self,
        user: &UserId,
        window_id: WindowId,
        nick: &str,
        own: &str,
        text: &str,
    ) -> Result<()> {
        let removed = self
            .ctx
            .store
            .run(|db| db.remove_name(user, window_id, nick))
            .await?;
        if !removed {
            return Ok(());
        }

        text_line::send(&self.ctx, user, window_id, None, CAT_INFO, text).await?;
        self.ctx
            .outbox
            .queue_all(
                user,
                Notification::DelMembers(MembersRemoval {
                    window_id,
                    members: vec![MemberRef {
                        user_id: member_id(nick, own, user),
                    }],
                }),
            )
            .await
    }

    async fn irc_nick_change(&self, user: &UserId, network: &str, msg: &IrcMessage) -> Result<()> {
        let (Some(old), Some(new)) = (msg.nick(), msg.param(0)) else {
            return Ok(());
        };

        let own = self.nick_of(user, network).await?;
        let is_own = old == own;

        let windows = self
            .ctx
            .store
            .run(|db| db.group_windows_for_network(user, network))
            .await?;

        for window in windows {
            let role = self
                .ctx
                .store
                .run(|db| db.rename_name(user, window.id, old, new))
                .await?;
            let Some(role) = role else {
                continue;
            };

            if !is_own {
                self.ctx
                    .outbox
                    .queue_all_many(
                        user,
                        vec![
                            Notification::DelMembers(MembersRemoval {
                                window_id: window.id,
                                members: vec![MemberRef {
                                    user_id: irc_user_id(old),
                                }],
                            }),
                            Notification::AddMembers(MembersUpdate {
                                window_id: window.id,
                                reset: false,
                                members: vec![Member {
                                    user_id: irc_user_id(new),
                                    role,
                                }],
                            }),
                        ],
                    )
                    .await?;
            }

            let text = format!("{old} is now known as {new}");
            text_line::send(&self.ctx, user, window.id, None, CAT_INFO, &text).await?;
        }

        if is_own {
            self.ctx
                .store
                .run(|db| db.set_current_nick(user, network, new))
                .await?;
            self.send_nicks(user).await?;
        }
        Ok(())
    }

    async fn irc_mode(&self, user: &UserId, network: &str, msg: &IrcMessage) -> Result<()> {
        let Some(target) = msg.param(0) else {
            return Ok(());
        };
        if !is_channel(target) {
            // User modes.
            return Ok(());
        }
        let Some(window_id) = self.channel_window(user, network, target).await? else {
            return Ok(());
        };

        let text = format!("Mode change: {} by {}", msg.params[1..].join(" "), msg.source());
        text_line::send(&self.ctx, user, window_id, None, CAT_INFO, &text).await?;

        let parsed = mode::parse_modes(&msg.params[1..]);
        if parsed.broken {
            warn!(user = %user, network, params = ?msg.params, "Malformed MODE line");
        }

        let names = self
            .ctx
            .store
            .run(|db| db.names(user, window_id))
            .await?;
        let plan = mode::plan(&parsed.changes, |nick| names.get(nick).copied());

        for password in plan.passwords {
            let text = match &password {
                Some(pw) => format!("The password for this channel has been changed to {pw}."),
                None => "Password protection has been removed from this channel.".to_string(),
            };
            self.ctx
                .store
                .run(|db| db.set_window_password(user, window_id, password.as_deref()))
                .await?;
            text_line::send(&self.ctx, user, window_id, None, CAT_INFO, &text).await?;
            self.ctx
                .outbox
                .queue_all(
                    user,
                    Notification::Update(WindowUpdate {
                        window_id,
                        topic: None,
                        password: Some(password),
                    }),
                )
                .await?;
        }

        if plan.roles.is_empty() {
            return Ok(());
        }

        let own = self.nick_of(user, network).await?;
        self.ctx
            .store
            .run(|db| {
                for (nick, role) in &plan.roles {
                    db.set_role(user, window_id, nick, *role)?;
                }
                Ok(())
            })
            .await?;

        let members = plan
            .roles
            .iter()
            .map(|(nick, role)| Member {
                user_id: member_id(nick, &own, user),
                role: *role,
            })
            .collect();
        self.ctx
            .outbox
            .queue_all(
                user,
                Notification::AddMembers(MembersUpdate {
                    window_id,
                    reset: false,
                    members,
                }),
            )
            .await
    }

    async fn irc_topic(&self, user: &UserId, network: &str, msg: &IrcMessage) -> Result<()> {
        let (Some(channel), Some(topic)) = (msg.param(0), msg.param(1)) else {
            return Ok(());
        };
        let Some(window_id) = self.channel_window(user, network, channel).await? else {
            return Ok(());
        };

        self.set_topic(user, window_id, topic).await?;

        let text = format!("{} has changed the topic to: \"{topic}\".", msg.source());
        text_line::send(&self.ctx, user, window_id, None, CAT_INFO, &text).await?;
        Ok(())
    }

    async fn irc_privmsg(&self, user: &UserId, network: &str, msg: &IrcMessage) -> Result<()> {
        let (Some(target), Some(text), Some(nick)) = (msg.param(0), msg.param(1), msg.nick()) else {
            return Ok(());
        };
        let sender = irc_user_id(nick);
        let own = self.nick_of(user, network).await?;

        let window_id = if target == own {
            Some(self.private_window(user, network, &sender).await?)
        } else {
            self.channel_window(user, network, target).await?
        };

        match window_id {
            Some(window_id) => {
                text_line::send(&self.ctx, user, window_id, Some(&sender), CAT_MSG, text).await?;
            }
            None => debug!(user = %user, network, target, "Message to a window that is gone"),
        }
        Ok(())
    }

    async fn irc_error(&self, user: &UserId, network: &str, msg: &IrcMessage) -> Result<()> {
        let reason = msg.param(0).unwrap_or_default();
        warn!(user = %user, network, reason, "IRC server error");

        let text = format!("Connection lost. Server error: {reason}");
        text_line::broadcast(&self.ctx, user, network, CAT_ERROR, &text).await?;

        if reason.contains("Too many host connections") {
            let text = format!(
                "{network} IRC network doesn't allow more connections. Close this window and rejoin to try again."
            );
            text_line::broadcast(&self.ctx, user, network, CAT_ERROR, &text).await?;

            // No automatic reconnect.
            self.ctx
                .store
                .run(|db| db.set_network_state(user, network, NetworkState::Closing))
                .await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn channel_window(&self, user: &UserId, network: &str, channel: &str) -> Result<Option<WindowId>> {
        let window_id = self
            .ctx
            .store
            .run(|db| db.group_window_id(user, network, channel))
            .await?;
        if window_id.is_none() {
            debug!(user = %user, network, channel, "No window for channel");
        }
        Ok(window_id)
    }

    /// 1-on-1 window with `peer`, created and announced on first contact.
    async fn private_window(&self, user: &UserId, network: &str, peer: &UserId) -> Result<WindowId> {
        let (window_id, created) = self
            .ctx
            .store
            .run(|db| {
                if let Some(id) = db.one_on_one_window_id(user, network, peer)? {
                    return Ok((id, None));
                }
                let window = db.create_window(
                    user,
                    NewWindow {
                        network,
                        name: peer.as_str(),
                        window_type: WindowType::OneOnOne,
                        peer: Some(peer),
                        password: None,
                    },
                )?;
                Ok((window.id, Some(view::window_info(db, user, &window)?)))
            })
            .await?;

        if let Some(info) = created {
            self.ctx
                .outbox
                .queue_all(user, Notification::AddWindow(info))
                .await?;
        }
        Ok(window_id)
    }

    async fn set_topic(&self, user: &UserId, window_id: WindowId, topic: &str) -> Result<()> {
        self.ctx
            .store
            .run(|db| db.set_window_topic(user, window_id, topic))
            .await?;
        self.ctx
            .outbox
            .queue_all(
                user,
                Notification::Update(WindowUpdate {
                    window_id,
                    topic: Some(topic.to_string()),
                    password: None,
                }),
            )
            .await
    }
}

/// `@alice` -> (`alice`, oper).
fn parse_name(entry: &str) -> (String, Role) {
    if let Some(nick) = entry.strip_prefix('@') {
        (nick.to_string(), Role::Oper)
    } else if let Some(nick) = entry.strip_prefix('+') {
        (nick.to_string(), Role::Voice)
    } else {
        (entry.to_string(), Role::User)
    }
}

/// Member id of a nick; our own nick maps to the account.
fn member_id(nick: &str, own: &str, user: &UserId) -> UserId {
    if nick == own {
        user.clone()
    } else {
        irc_user_id(nick)
    }
}
