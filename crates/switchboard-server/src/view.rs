//! Client-facing views of stored windows.

use switchboard_shared::constants::NATIVE_NETWORK;
use switchboard_shared::nick::irc_user_id;
use switchboard_shared::protocol::{Member, WindowInfo};
use switchboard_shared::types::{Role, UserId, WindowType};
use switchboard_store::{Database, Result, Window};

/// Key of the user's own entry in a window's names table: the user id on
/// the native network, the current nick elsewhere.
pub fn own_name(db: &Database, user: &UserId, network: &str) -> Result<Option<String>> {
    if network == NATIVE_NETWORK {
        return Ok(Some(user.to_string()));
    }
    Ok(match db.current_nick(user, network)? {
        Some(nick) => Some(nick),
        None => db.user_nick(user)?,
    })
}

/// Members of a window as the client sees them, addressed by user id.
pub fn members(db: &Database, user: &UserId, window: &Window) -> Result<Vec<Member>> {
    if window.window_type == WindowType::OneOnOne {
        let mut members = vec![Member {
            user_id: user.clone(),
            role: Role::User,
        }];
        if let Some(peer) = &window.peer {
            members.push(Member {
                user_id: peer.clone(),
                role: Role::User,
            });
        }
        return Ok(members);
    }

    if window.network == NATIVE_NETWORK {
        let owner = db.group_owner(&window.name)?;
        return Ok(db
            .group_members(&window.name)?
            .into_iter()
            .map(|member| {
                let role = if owner.as_ref() == Some(&member) {
                    Role::Oper
                } else {
                    Role::User
                };
                Member {
                    user_id: member,
                    role,
                }
            })
            .collect());
    }

    let own = own_name(db, user, &window.network)?;
    Ok(db
        .names(user, window.id)?
        .into_iter()
        .map(|(nick, role)| Member {
            user_id: if own.as_deref() == Some(nick.as_str()) {
                user.clone()
            } else {
                irc_user_id(&nick)
            },
            role,
        })
        .collect())
}

/// The other party of a 1-on-1 window.
pub fn counterpart(members: &[Member], user: &UserId) -> Option<UserId> {
    members
        .iter()
        .find(|m| &m.user_id != user)
        .map(|m| m.user_id.clone())
}

/// `ADD_WINDOW` payload of a stored window.
pub fn window_info(db: &Database, user: &UserId, window: &Window) -> Result<WindowInfo> {
    let members = members(db, user, window)?;

    let role = members
        .iter()
        .find(|m| &m.user_id == user)
        .map(|m| m.role)
        .unwrap_or(Role::User);

    let peer = match window.window_type {
        WindowType::OneOnOne => counterpart(&members, user),
        WindowType::Group => None,
    };

    Ok(WindowInfo {
        window_id: window.id,
        name: window.name.clone(),
        user_id: peer,
        window_type: window.window_type,
        network: window.network.clone(),
        password: window.password.clone(),
        topic: window.topic.clone(),
        alerts: window.alerts.clone(),
        row: window.row,
        column: window.column,
        minimized_names_list: window.minimized_names_list,
        desktop: window.desktop,
        role,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use switchboard_store::NewWindow;

    #[test]
    fn test_irc_window_members_and_role() {
        let mut db = Database::open_in_memory().unwrap();
        let user = UserId::new("m1");
        db.upsert_user(&user, "alice").unwrap();
        db.set_current_nick(&user, "IRCNet", "alice_").unwrap();

        let window = db
            .create_window(
                &user,
                NewWindow {
                    network: "IRCNet",
                    name: "#rust",
                    window_type: WindowType::Group,
                    peer: None,
                    password: None,
                },
            )
            .unwrap();
        let names = BTreeMap::from([
            ("alice_".to_string(), Role::Oper),
            ("bob".to_string(), Role::Voice),
        ]);
        db.add_names(&user, window.id, &names).unwrap();

        let info = window_info(&db, &user, &window).unwrap();
        assert_eq!(info.role, Role::Oper);
        assert_eq!(info.user_id, None);

        let members = members(&db, &user, &window).unwrap();
        assert!(members.contains(&Member {
            user_id: irc_user_id("bob"),
            role: Role::Voice
        }));
        assert!(members.iter().any(|m| m.user_id == user));
    }

    #[test]
    fn test_one_on_one_counterpart() {
        let mut db = Database::open_in_memory().unwrap();
        let user = UserId::new("m1");
        let peer = irc_user_id("bob");

        let window = db
            .create_window(
                &user,
                NewWindow {
                    network: "IRCNet",
                    name: peer.as_str(),
                    window_type: WindowType::OneOnOne,
                    peer: Some(&peer),
                    password: None,
                },
            )
            .unwrap();

        let info = window_info(&db, &user, &window).unwrap();
        assert_eq!(info.user_id, Some(peer));
        assert_eq!(info.role, Role::User);
    }

    #[test]
    fn test_native_group_owner_is_oper() {
        let mut db = Database::open_in_memory().unwrap();
        let owner = UserId::new("m1");
        let guest = UserId::new("m2");
        db.create_group("rustaceans", &owner, None).unwrap();
        db.add_group_member("rustaceans", &guest).unwrap();

        let window = db
            .create_window(
                &guest,
                NewWindow {
                    network: NATIVE_NETWORK,
                    name: "rustaceans",
                    window_type: WindowType::Group,
                    peer: None,
                    password: None,
                },
            )
            .unwrap();

        let info = window_info(&db, &guest, &window).unwrap();
        assert_eq!(info.role, Role::User);

        let members = members(&db, &guest, &window).unwrap();
        assert!(members.contains(&Member {
            user_id: owner,
            role: Role::Oper
        }));
    }
}
