//! Local model rebuilt from relay notifications.
//!
//! Every collection is keyed by its primary key: windows by `windowId`,
//! messages by `gid`, friends by `userId`, alerts by `alertId`. Applying a
//! notification twice therefore has the same effect as applying it once.

use std::collections::BTreeMap;

use tracing::debug;

use switchboard_shared::protocol::{
    Member, MessageInfo, Notification, Response, Settings, WindowInfo, WindowMessages,
};
use switchboard_shared::types::{Gid, MessageStatus, Role, UserId, WindowId};

/// A window and everything the client knows about it.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowModel {
    pub info: WindowInfo,
    pub members: BTreeMap<UserId, Role>,
    pub messages: BTreeMap<Gid, MessageInfo>,
}

impl WindowModel {
    pub fn new(info: WindowInfo) -> Self {
        Self {
            info,
            members: BTreeMap::new(),
            messages: BTreeMap::new(),
        }
    }

    /// Insert or replace a message. A message the window already holds is
    /// only replaced by a version with a higher `updatedId`, so originals
    /// never overwrite anything and a stale edit never undoes a newer one.
    pub fn upsert_message(&mut self, message: MessageInfo) {
        if let Some(held) = self.messages.get(&message.gid) {
            if message.updated_id <= held.updated_id {
                return;
            }
        }
        self.messages.insert(message.gid, message);
    }

    pub fn set_members(&mut self, members: Vec<Member>, reset: bool) {
        if reset {
            self.members.clear();
        }
        for member in members {
            self.members.insert(member.user_id, member.role);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientStore {
    user_id: UserId,
    init_done: bool,
    windows: BTreeMap<WindowId, WindowModel>,
    friends: BTreeMap<UserId, bool>,
    friend_requests: Vec<UserId>,
    alerts: BTreeMap<u64, String>,
    networks: Vec<String>,
    nicks: BTreeMap<String, String>,
    settings: Settings,
}

impl ClientStore {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            init_done: false,
            windows: BTreeMap::new(),
            friends: BTreeMap::new(),
            friend_requests: Vec::new(),
            alerts: BTreeMap::new(),
            networks: Vec::new(),
            nicks: BTreeMap::new(),
            settings: Settings::new(),
        }
    }

    /// Apply one notification. Responses to earlier requests are handed
    /// back to the caller instead of being stored.
    pub fn apply(&mut self, notification: Notification) -> Option<Response> {
        match notification {
            Notification::StartupSequence { length } => {
                debug!(length, "Startup sequence begins");
                self.init_done = false;
            }
            Notification::FinishInit => self.init_done = true,
            Notification::AddWindow(info) => self.upsert_window(info),
            Notification::UpdateMembers(update) | Notification::AddMembers(update) => {
                match self.windows.get_mut(&update.window_id) {
                    Some(window) => window.set_members(update.members, update.reset),
                    None => debug!(window = %update.window_id, "Members for unknown window"),
                }
            }
            Notification::DelMembers(removal) => {
                if let Some(window) = self.windows.get_mut(&removal.window_id) {
                    for member in removal.members {
                        window.members.remove(&member.user_id);
                    }
                }
            }
            Notification::Update(update) => {
                if let Some(window) = self.windows.get_mut(&update.window_id) {
                    if let Some(topic) = update.topic {
                        window.info.topic = Some(topic);
                    }
                    if let Some(password) = update.password {
                        window.info.password = password;
                    }
                }
            }
            Notification::AddMessages { messages } => {
                for batch in messages {
                    self.add_messages(batch);
                }
            }
            Notification::UpdateNetworks { networks } => self.networks = networks,
            Notification::AddAlert { alert_id, message } => {
                self.alerts.insert(alert_id, message);
            }
            Notification::UpdateSettings { settings } => self.settings.extend(settings),
            Notification::UpdateFriends { reset, friends } => {
                if reset {
                    self.friends.clear();
                }
                for friend in friends {
                    self.friends.insert(friend.user_id, friend.online);
                }
            }
            Notification::ConfirmFriends { friends } => self.friend_requests = friends,
            Notification::Nick { nicks } => self.nicks.extend(nicks),
            Notification::JoinResp(resp)
            | Notification::CreateResp(resp)
            | Notification::ChatResp(resp)
            | Notification::UpdatePasswordResp(resp)
            | Notification::UpdateTopicResp(resp) => return Some(resp),
        }
        None
    }

    fn upsert_window(&mut self, info: WindowInfo) {
        match self.windows.get_mut(&info.window_id) {
            Some(window) => window.info = info,
            None => {
                self.windows.insert(info.window_id, WindowModel::new(info));
            }
        }
    }

    fn add_messages(&mut self, batch: WindowMessages) {
        let Some(window) = self.windows.get_mut(&batch.window_id) else {
            debug!(window = %batch.window_id, count = batch.messages.len(), "Messages for unknown window dropped");
            return;
        };
        for message in batch.messages {
            window.upsert_message(message);
        }
    }

    /// Forget an alert the user has seen.
    pub fn dismiss_alert(&mut self, alert_id: u64) -> bool {
        self.alerts.remove(&alert_id).is_some()
    }

    /// Highest gid held in any window.
    pub fn cached_upto(&self) -> Gid {
        self.windows
            .values()
            .filter_map(|w| w.messages.keys().next_back().copied())
            .max()
            .unwrap_or(Gid(0))
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn init_done(&self) -> bool {
        self.init_done
    }

    pub fn windows(&self) -> impl Iterator<Item = &WindowModel> {
        self.windows.values()
    }

    pub fn window(&self, id: WindowId) -> Option<&WindowModel> {
        self.windows.get(&id)
    }

    /// Friends and whether they are online.
    pub fn friends(&self) -> &BTreeMap<UserId, bool> {
        &self.friends
    }

    pub fn friend_requests(&self) -> &[UserId] {
        &self.friend_requests
    }

    pub fn alerts(&self) -> &BTreeMap<u64, String> {
        &self.alerts
    }

    pub fn networks(&self) -> &[String] {
        &self.networks
    }

    /// Current nick per network.
    pub fn nicks(&self) -> &BTreeMap<String, String> {
        &self.nicks
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub(crate) fn restore_window(&mut self, window: WindowModel) {
        self.windows.insert(window.info.window_id, window);
    }

    pub(crate) fn restore_friends(&mut self, friends: BTreeMap<UserId, bool>) {
        self.friends = friends;
    }

    pub(crate) fn restore_profile(&mut self, networks: Vec<String>, nicks: BTreeMap<String, String>, settings: Settings) {
        self.networks = networks;
        self.nicks = nicks;
        self.settings = settings;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use switchboard_shared::protocol::{AlertFlags, FriendInfo, MemberRef, MembersRemoval, MembersUpdate, WindowUpdate};
    use switchboard_shared::types::WindowType;

    pub(crate) fn window(id: u64, name: &str) -> WindowInfo {
        WindowInfo {
            window_id: WindowId(id),
            name: name.into(),
            user_id: None,
            window_type: WindowType::Group,
            network: "IRCNet".into(),
            password: None,
            topic: None,
            alerts: AlertFlags::default(),
            row: 0,
            column: 0,
            minimized_names_list: false,
            desktop: 0,
            role: Role::User,
        }
    }

    pub(crate) fn message(gid: u64, body: &str) -> MessageInfo {
        MessageInfo {
            gid: Gid(gid),
            user_id: Some(UserId::new("m2")),
            body: body.into(),
            cat: "msg".into(),
            ts: 1_700_000_000 + gid as i64,
            status: MessageStatus::Original,
            updated_id: None,
            updated_ts: None,
        }
    }

    fn member(id: &str, role: Role) -> Member {
        Member {
            user_id: UserId::new(id),
            role,
        }
    }

    fn bootstrap() -> Vec<Notification> {
        let body = vec![
            Notification::UpdateNetworks {
                networks: vec!["MAS".into(), "IRCNet".into()],
            },
            Notification::UpdateSettings {
                settings: json!({ "theme": "dark" }).as_object().cloned().unwrap(),
            },
            Notification::UpdateFriends {
                reset: true,
                friends: vec![FriendInfo {
                    user_id: UserId::new("m2"),
                    online: true,
                }],
            },
            Notification::AddWindow(window(1, "#rust")),
            Notification::UpdateMembers(MembersUpdate {
                window_id: WindowId(1),
                reset: true,
                members: vec![member("m1", Role::Oper), member("m2", Role::User)],
            }),
            Notification::AddMessages {
                messages: vec![WindowMessages {
                    window_id: WindowId(1),
                    messages: vec![message(10, "hello"), message(12, "world")],
                }],
            },
            Notification::FinishInit,
        ];

        let mut all = vec![Notification::StartupSequence { length: body.len() }];
        all.extend(body);
        all
    }

    #[test]
    fn test_bootstrap_replay_is_idempotent() {
        let mut once = ClientStore::new(UserId::new("m1"));
        for ntf in bootstrap() {
            once.apply(ntf);
        }

        let mut twice = once.clone();
        for ntf in bootstrap() {
            twice.apply(ntf);
        }

        assert_eq!(once, twice);
        assert!(once.init_done());
        assert_eq!(once.cached_upto(), Gid(12));
        assert_eq!(once.window(WindowId(1)).unwrap().messages.len(), 2);
    }

    #[test]
    fn test_original_message_is_immutable() {
        let mut store = ClientStore::new(UserId::new("m1"));
        store.apply(Notification::AddWindow(window(1, "#rust")));
        store.apply(Notification::single_message(WindowId(1), message(5, "first")));

        store.apply(Notification::single_message(WindowId(1), message(5, "replayed")));
        assert_eq!(store.window(WindowId(1)).unwrap().messages[&Gid(5)].body, "first");

        let mut edited = message(5, "fixed");
        edited.status = MessageStatus::Edited;
        edited.updated_id = Some(Gid(9));
        store.apply(Notification::single_message(WindowId(1), edited));

        let stored = &store.window(WindowId(1)).unwrap().messages[&Gid(5)];
        assert_eq!(stored.body, "fixed");
        assert_eq!(stored.status, MessageStatus::Edited);
        assert_eq!(store.cached_upto(), Gid(5));
    }

    #[test]
    fn test_stale_edit_does_not_undo_delete() {
        let mut store = ClientStore::new(UserId::new("m1"));
        store.apply(Notification::AddWindow(window(1, "#rust")));
        store.apply(Notification::single_message(WindowId(1), message(5, "teh")));

        let mut deleted = message(5, "");
        deleted.status = MessageStatus::Deleted;
        deleted.updated_id = Some(Gid(11));
        store.apply(Notification::single_message(WindowId(1), deleted.clone()));

        let mut edited = message(5, "the");
        edited.status = MessageStatus::Edited;
        edited.updated_id = Some(Gid(8));
        store.apply(Notification::single_message(WindowId(1), edited));

        assert_eq!(store.window(WindowId(1)).unwrap().messages[&Gid(5)], deleted);
    }

    #[test]
    fn test_member_updates() {
        let mut store = ClientStore::new(UserId::new("m1"));
        store.apply(Notification::AddWindow(window(1, "#rust")));
        store.apply(Notification::UpdateMembers(MembersUpdate {
            window_id: WindowId(1),
            reset: true,
            members: vec![member("m1", Role::User), member("m2", Role::User)],
        }));
        store.apply(Notification::AddMembers(MembersUpdate {
            window_id: WindowId(1),
            reset: false,
            members: vec![member("m2", Role::Voice), member("m3", Role::User)],
        }));
        store.apply(Notification::DelMembers(MembersRemoval {
            window_id: WindowId(1),
            members: vec![MemberRef {
                user_id: UserId::new("m1"),
            }],
        }));

        let members = &store.window(WindowId(1)).unwrap().members;
        assert_eq!(members.len(), 2);
        assert_eq!(members[&UserId::new("m2")], Role::Voice);

        store.apply(Notification::AddMembers(MembersUpdate {
            window_id: WindowId(1),
            reset: true,
            members: vec![member("m4", Role::Oper)],
        }));
        let members = &store.window(WindowId(1)).unwrap().members;
        assert_eq!(members.keys().collect::<Vec<_>>(), vec![&UserId::new("m4")]);
    }

    #[test]
    fn test_window_update_and_readd() {
        let mut store = ClientStore::new(UserId::new("m1"));
        store.apply(Notification::AddWindow(window(1, "#rust")));
        store.apply(Notification::single_message(WindowId(1), message(3, "kept")));
        store.apply(Notification::Update(WindowUpdate {
            window_id: WindowId(1),
            topic: Some("Rust talk".into()),
            password: Some(Some("sesame".into())),
        }));

        let info = &store.window(WindowId(1)).unwrap().info;
        assert_eq!(info.topic.as_deref(), Some("Rust talk"));
        assert_eq!(info.password.as_deref(), Some("sesame"));

        store.apply(Notification::Update(WindowUpdate {
            window_id: WindowId(1),
            topic: None,
            password: Some(None),
        }));
        assert_eq!(store.window(WindowId(1)).unwrap().info.password, None);

        let mut moved = window(1, "#rust");
        moved.row = 2;
        store.apply(Notification::AddWindow(moved));
        let window = store.window(WindowId(1)).unwrap();
        assert_eq!(window.info.row, 2);
        assert_eq!(window.messages.len(), 1);
    }

    #[test]
    fn test_messages_for_unknown_window_are_dropped() {
        let mut store = ClientStore::new(UserId::new("m1"));
        store.apply(Notification::single_message(WindowId(7), message(1, "lost")));

        assert_eq!(store.windows().count(), 0);
        assert_eq!(store.cached_upto(), Gid(0));
    }

    #[test]
    fn test_friends_and_responses() {
        let mut store = ClientStore::new(UserId::new("m1"));
        store.apply(Notification::UpdateFriends {
            reset: true,
            friends: vec![FriendInfo {
                user_id: UserId::new("m2"),
                online: false,
            }],
        });
        store.apply(Notification::UpdateFriends {
            reset: false,
            friends: vec![FriendInfo {
                user_id: UserId::new("m2"),
                online: true,
            }],
        });
        assert!(store.friends()[&UserId::new("m2")]);

        let resp = store.apply(Notification::JoinResp(Response::error("Incorrect password.")));
        assert_eq!(resp, Some(Response::error("Incorrect password.")));
        assert_eq!(store.apply(Notification::FinishInit), None);

        store.apply(Notification::AddAlert {
            alert_id: 4,
            message: "Maintenance tonight".into(),
        });
        assert!(store.dismiss_alert(4));
        assert!(!store.dismiss_alert(4));
    }
}
