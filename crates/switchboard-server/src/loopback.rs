//! Backend of the native network: groups that live entirely inside the
//! relay. Lines are delivered straight into the members' windows.

use tracing::{debug, info};

use switchboard_bus::Endpoint;
use switchboard_shared::constants::{LOOPBACK_ENDPOINT, NATIVE_NETWORK};
use switchboard_shared::events::{self, ChatParams, CloseParams, CreateParams, JoinParams, SendParams};
use switchboard_shared::protocol::{
    Member, MemberRef, MembersRemoval, MembersUpdate, Notification, Response, WindowInfo,
};
use switchboard_shared::types::{Role, UserId, WindowId, WindowType};
use switchboard_store::{Database, NewWindow, Result as StoreResult};

use crate::context::{route, Context};
use crate::error::Result;
use crate::text_line::{self, CAT_MSG};
use crate::view;

const GROUP_EXISTS: &str =
    "A group by this name already exists. If you'd like, you can try to join it.";

#[derive(Clone)]
pub struct Loopback {
    ctx: Context,
}

impl Loopback {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    pub fn register(&self) -> Endpoint {
        let mut endpoint = self.ctx.courier.register_endpoint(LOOPBACK_ENDPOINT);

        route(&mut endpoint, events::CREATE, self, |lb: Loopback, p: CreateParams| async move {
            lb.create(p).await
        });
        route(&mut endpoint, events::JOIN, self, |lb: Loopback, p: JoinParams| async move {
            lb.join(p).await
        });
        route(&mut endpoint, events::SEND, self, |lb: Loopback, p: SendParams| async move {
            lb.send(p).await
        });
        route(&mut endpoint, events::CLOSE, self, |lb: Loopback, p: CloseParams| async move {
            lb.close(p).await
        });
        route(&mut endpoint, events::CHAT, self, |lb: Loopback, p: ChatParams| async move {
            lb.chat(p).await
        });

        endpoint
    }

    async fn create(&self, p: CreateParams) -> Result<()> {
        let password = p.password.as_deref().filter(|pw| !pw.is_empty());

        let created = self
            .ctx
            .store
            .run(|db| {
                if !db.create_group(&p.name, &p.user_id, password)? {
                    return Ok(None);
                }
                db.add_group_member(&p.name, &p.user_id)?;
                group_window(db, &p.user_id, &p.name, password).map(Some)
            })
            .await?;

        let Some((_, info)) = created else {
            return self
                .ctx
                .outbox
                .queue(&p.user_id, &p.session_id, Notification::CreateResp(Response::error(GROUP_EXISTS)))
                .await;
        };

        info!(user = %p.user_id, group = %p.name, "Group created");
        self.ctx
            .outbox
            .queue(&p.user_id, &p.session_id, Notification::CreateResp(Response::ok()))
            .await?;
        if let Some(info) = info {
            self.ctx
                .outbox
                .queue_all(&p.user_id, Notification::AddWindow(info))
                .await?;
        }
        Ok(())
    }

    async fn join(&self, p: JoinParams) -> Result<()> {
        let (exists, expected) = self
            .ctx
            .store
            .run(|db| Ok((db.group_exists(&p.name)?, db.group_password(&p.name)?)))
            .await?;

        let error = if !exists {
            Some("Group doesn't exist.")
        } else if expected.is_some() && expected != p.password {
            Some("Incorrect password.")
        } else {
            None
        };
        if let Some(error) = error {
            return self
                .ctx
                .outbox
                .queue(&p.user_id, &p.session_id, Notification::JoinResp(Response::error(error)))
                .await;
        }

        let (others, created) = self
            .ctx
            .store
            .run(|db| {
                db.add_group_member(&p.name, &p.user_id)?;
                let (_, info) = group_window(db, &p.user_id, &p.name, expected.as_deref())?;
                let others = member_windows(db, &p.name, Some(&p.user_id))?;
                Ok((others, info))
            })
            .await?;

        self.ctx
            .outbox
            .queue(&p.user_id, &p.session_id, Notification::JoinResp(Response::ok()))
            .await?;
        if let Some(info) = created {
            self.ctx
                .outbox
                .queue_all(&p.user_id, Notification::AddWindow(info))
                .await?;
        }

        for (member, window_id) in others {
            self.ctx
                .outbox
                .queue_all(
                    &member,
                    Notification::AddMembers(MembersUpdate {
                        window_id,
                        reset: false,
                        members: vec![Member {
                            user_id: p.user_id.clone(),
                            role: Role::User,
                        }],
                    }),
                )
                .await?;
        }
        Ok(())
    }

    async fn send(&self, p: SendParams) -> Result<()> {
        let deliveries = match (&p.name, &p.target_user_id) {
            (Some(name), _) => {
                let members = self
                    .ctx
                    .store
                    .run(|db| {
                        if !db.group_members(name)?.contains(&p.user_id) {
                            return Ok(Vec::new());
                        }
                        member_windows(db, name, None)
                    })
                    .await?;
                if members.is_empty() {
                    debug!(user = %p.user_id, group = %name, "Not a member, message dropped");
                }
                members
            }
            (None, Some(peer)) => {
                let own = self.private_window(&p.user_id, peer).await?;
                let theirs = self.private_window(peer, &p.user_id).await?;
                vec![(p.user_id.clone(), own), (peer.clone(), theirs)]
            }
            (None, None) => return Ok(()),
        };

        for (member, window_id) in deliveries {
            text_line::send(&self.ctx, &member, window_id, Some(&p.user_id), CAT_MSG, &p.text).await?;
        }
        Ok(())
    }

    async fn chat(&self, p: ChatParams) -> Result<()> {
        self.private_window(&p.user_id, &p.target_user_id).await?;
        self.ctx
            .outbox
            .queue(&p.user_id, &p.session_id, Notification::ChatResp(Response::ok()))
            .await
    }

    /// Leaving a group window gives up the membership.
    async fn close(&self, p: CloseParams) -> Result<()> {
        if p.window_type != WindowType::Group {
            return Ok(());
        }

        let others = self
            .ctx
            .store
            .run(|db| {
                if !db.remove_group_member(&p.name, &p.user_id)? {
                    return Ok(Vec::new());
                }
                member_windows(db, &p.name, None)
            })
            .await?;

        for (member, window_id) in others {
            self.ctx
                .outbox
                .queue_all(
                    &member,
                    Notification::DelMembers(MembersRemoval {
                        window_id,
                        members: vec![MemberRef {
                            user_id: p.user_id.clone(),
                        }],
                    }),
                )
                .await?;
        }
        Ok(())
    }

    /// `owner`'s 1-on-1 window with `peer`, created on first use.
    async fn private_window(&self, owner: &UserId, peer: &UserId) -> Result<WindowId> {
        let (window_id, created) = self
            .ctx
            .store
            .run(|db| {
                if let Some(id) = db.one_on_one_window_id(owner, NATIVE_NETWORK, peer)? {
                    return Ok((id, None));
                }
                let window = db.create_window(
                    owner,
                    NewWindow {
                        network: NATIVE_NETWORK,
                        name: peer.as_str(),
                        window_type: WindowType::OneOnOne,
                        peer: Some(peer),
                        password: None,
                    },
                )?;
                Ok((window.id, Some(view::window_info(db, owner, &window)?)))
            })
            .await?;

        if let Some(info) = created {
            self.ctx
                .outbox
                .queue_all(owner, Notification::AddWindow(info))
                .await?;
        }
        Ok(window_id)
    }
}

/// The user's window of a group, created if missing. The window info is
/// returned only when the window is new.
fn group_window(
    db: &mut Database,
    user: &UserId,
    group: &str,
    password: Option<&str>,
) -> StoreResult<(WindowId, Option<WindowInfo>)> {
    if let Some(id) = db.group_window_id(user, NATIVE_NETWORK, group)? {
        return Ok((id, None));
    }
    let window = db.create_window(
        user,
        NewWindow {
            network: NATIVE_NETWORK,
            name: group,
            window_type: WindowType::Group,
            peer: None,
            password,
        },
    )?;
    let info = view::window_info(db, user, &window)?;
    Ok((window.id, Some(info)))
}

/// Every member of a group that has a window for it, except `skip`.
fn member_windows(
    db: &Database,
    group: &str,
    skip: Option<&UserId>,
) -> StoreResult<Vec<(UserId, WindowId)>> {
    let mut windows = Vec::new();
    for member in db.group_members(group)? {
        if Some(&member) == skip {
            continue;
        }
        if let Some(id) = db.group_window_id(&member, NATIVE_NETWORK, group)? {
            windows.push((member, id));
        }
    }
    Ok(windows)
}
