//! Window records and per-window member name tables.

use std::collections::{BTreeMap, BTreeSet};

use switchboard_shared::protocol::AlertFlags;
use switchboard_shared::types::{Role, UserId, WindowId, WindowType};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::keys;
use crate::models::{NewWindow, Window};

const NETWORK: &str = "network";
const NAME: &str = "name";
const TYPE: &str = "type";
const PEER: &str = "peer";
const PASSWORD: &str = "password";
const TOPIC: &str = "topic";
const ROW: &str = "row";
const COLUMN: &str = "column";
const DESKTOP: &str = "desktop";
const MINIMIZED_NAMES_LIST: &str = "minimizedNamesList";
const EMAIL_ALERT: &str = "emailAlert";
const NOTIFICATION_ALERT: &str = "notificationAlert";
const SOUND_ALERT: &str = "soundAlert";
const TITLE_ALERT: &str = "titleAlert";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Allocate a window id and store a new window with default placement.
    pub fn create_window(&mut self, user: &UserId, new: NewWindow<'_>) -> Result<Window> {
        let id = WindowId(self.hincrby(keys::COUNTERS, keys::WINDOW_ID_COUNTER, 1)? as u64);

        let window = Window {
            id,
            network: new.network.to_string(),
            name: new.name.to_string(),
            window_type: new.window_type,
            peer: new.peer.cloned(),
            password: new.password.filter(|p| !p.is_empty()).map(str::to_string),
            topic: None,
            row: 0,
            column: 0,
            desktop: 0,
            minimized_names_list: false,
            alerts: AlertFlags {
                email: false,
                notification: true,
                sound: false,
                title: true,
            },
        };

        let key = keys::window(user, id);
        let row = window.row.to_string();
        let column = window.column.to_string();
        let desktop = window.desktop.to_string();
        let peer = window.peer.as_ref().map(|p| p.to_string()).unwrap_or_default();
        let password = window.password.clone().unwrap_or_default();

        self.hmset(
            &key,
            [
                (NETWORK, window.network.as_str()),
                (NAME, window.name.as_str()),
                (TYPE, window.window_type.as_str()),
                (PEER, peer.as_str()),
                (PASSWORD, password.as_str()),
                (TOPIC, ""),
                (ROW, row.as_str()),
                (COLUMN, column.as_str()),
                (DESKTOP, desktop.as_str()),
                (MINIMIZED_NAMES_LIST, bool_str(window.minimized_names_list)),
                (EMAIL_ALERT, bool_str(window.alerts.email)),
                (NOTIFICATION_ALERT, bool_str(window.alerts.notification)),
                (SOUND_ALERT, bool_str(window.alerts.sound)),
                (TITLE_ALERT, bool_str(window.alerts.title)),
            ],
        )?;
        self.sadd(&keys::window_list(user), &id.to_string())?;

        tracing::debug!(user = %user, window = %id, network = %window.network, name = %window.name, "created window");

        Ok(window)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Window record, `None` if the id has no stored record.
    pub fn find_window(&self, user: &UserId, id: WindowId) -> Result<Option<Window>> {
        let fields = self.hgetall(&keys::window(user, id))?;

        if fields.is_empty() {
            return Ok(None);
        }

        let text = |field: &str| fields.get(field).cloned().unwrap_or_default();
        let optional = |field: &str| fields.get(field).filter(|v| !v.is_empty()).cloned();
        let int = |field: &str| fields.get(field).and_then(|v| v.parse().ok()).unwrap_or(0);
        let flag = |field: &str| fields.get(field).is_some_and(|v| v == "true");

        let window_type: WindowType = fields
            .get(TYPE)
            .map(String::as_str)
            .unwrap_or("group")
            .parse()?;

        Ok(Some(Window {
            id,
            network: text(NETWORK),
            name: text(NAME),
            window_type,
            peer: optional(PEER).map(UserId),
            password: optional(PASSWORD),
            topic: optional(TOPIC),
            row: int(ROW),
            column: int(COLUMN),
            desktop: int(DESKTOP),
            minimized_names_list: flag(MINIMIZED_NAMES_LIST),
            alerts: AlertFlags {
                email: flag(EMAIL_ALERT),
                notification: flag(NOTIFICATION_ALERT),
                sound: flag(SOUND_ALERT),
                title: flag(TITLE_ALERT),
            },
        }))
    }

    /// Window record, [`StoreError::NotFound`] if missing.
    pub fn window(&self, user: &UserId, id: WindowId) -> Result<Window> {
        self.find_window(user, id)?
            .ok_or_else(|| StoreError::NotFound(keys::window(user, id)))
    }

    /// Ids listed for the user, ascending. Entries that do not parse are
    /// skipped.
    pub fn window_ids(&self, user: &UserId) -> Result<Vec<WindowId>> {
        let mut ids: Vec<WindowId> = self
            .smembers(&keys::window_list(user))?
            .iter()
            .filter_map(|id| id.parse().ok().map(WindowId))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Every window with a stored record.
    pub fn windows(&self, user: &UserId) -> Result<Vec<Window>> {
        let mut windows = Vec::new();
        for id in self.window_ids(user)? {
            if let Some(window) = self.find_window(user, id)? {
                windows.push(window);
            }
        }
        Ok(windows)
    }

    pub fn windows_for_network(&self, user: &UserId, network: &str) -> Result<Vec<Window>> {
        Ok(self
            .windows(user)?
            .into_iter()
            .filter(|w| w.network == network)
            .collect())
    }

    pub fn group_windows_for_network(&self, user: &UserId, network: &str) -> Result<Vec<Window>> {
        Ok(self
            .windows_for_network(user, network)?
            .into_iter()
            .filter(|w| w.window_type == WindowType::Group)
            .collect())
    }

    /// Group window of a channel. Channel names compare case-insensitively.
    pub fn group_window_id(
        &self,
        user: &UserId,
        network: &str,
        channel: &str,
    ) -> Result<Option<WindowId>> {
        let channel = channel.to_lowercase();

        Ok(self
            .group_windows_for_network(user, network)?
            .into_iter()
            .find(|w| w.name.to_lowercase() == channel)
            .map(|w| w.id))
    }

    pub fn one_on_one_window_id(
        &self,
        user: &UserId,
        network: &str,
        peer: &UserId,
    ) -> Result<Option<WindowId>> {
        Ok(self
            .windows_for_network(user, network)?
            .into_iter()
            .find(|w| w.window_type == WindowType::OneOnOne && w.peer.as_ref() == Some(peer))
            .map(|w| w.id))
    }

    /// Networks the user has at least one window on.
    pub fn networks_for_user(&self, user: &UserId) -> Result<BTreeSet<String>> {
        Ok(self.windows(user)?.into_iter().map(|w| w.network).collect())
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    pub fn set_window_topic(&self, user: &UserId, id: WindowId, topic: &str) -> Result<()> {
        self.hset(&keys::window(user, id), TOPIC, topic)
    }

    /// `None` removes the password.
    pub fn set_window_password(
        &self,
        user: &UserId,
        id: WindowId,
        password: Option<&str>,
    ) -> Result<()> {
        self.hset(&keys::window(user, id), PASSWORD, password.unwrap_or(""))
    }

    // ------------------------------------------------------------------
    // Member names
    // ------------------------------------------------------------------

    /// Nick -> role table of a window. Unknown glyphs read as
    /// [`Role::User`].
    pub fn names(&self, user: &UserId, id: WindowId) -> Result<BTreeMap<String, Role>> {
        Ok(self
            .hgetall(&keys::names(user, id))?
            .into_iter()
            .map(|(nick, glyph)| {
                let role = glyph.parse().unwrap_or(Role::User);
                (nick, role)
            })
            .collect())
    }

    pub fn role(&self, user: &UserId, id: WindowId, nick: &str) -> Result<Option<Role>> {
        Ok(self
            .hget(&keys::names(user, id), nick)?
            .and_then(|glyph| glyph.parse().ok()))
    }

    /// Merge entries into the table, overwriting existing roles.
    pub fn add_names(
        &mut self,
        user: &UserId,
        id: WindowId,
        names: &BTreeMap<String, Role>,
    ) -> Result<()> {
        self.hmset(
            &keys::names(user, id),
            names.iter().map(|(nick, role)| (nick.as_str(), role.glyph())),
        )
    }

    pub fn set_role(&self, user: &UserId, id: WindowId, nick: &str, role: Role) -> Result<()> {
        self.hset(&keys::names(user, id), nick, role.glyph())
    }

    /// Returns `true` if the nick was a member.
    pub fn remove_name(&self, user: &UserId, id: WindowId, nick: &str) -> Result<bool> {
        self.hdel(&keys::names(user, id), nick)
    }

    pub fn clear_names(&self, user: &UserId, id: WindowId) -> Result<()> {
        self.del(&keys::names(user, id))
    }

    /// Move a member to a new nick, keeping the role. Returns the role if
    /// the old nick was a member.
    pub fn rename_name(
        &self,
        user: &UserId,
        id: WindowId,
        old: &str,
        new: &str,
    ) -> Result<Option<Role>> {
        let Some(role) = self.role(user, id, old)? else {
            return Ok(None);
        };

        self.remove_name(user, id, old)?;
        self.set_role(user, id, new, role)?;
        Ok(Some(role))
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}
