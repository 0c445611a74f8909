//! Key layout of the key/value tables.
//!
//! Role glyphs live under `names:*`, channel passwords and topics under
//! `window:*`, so a nick can never shadow a window attribute.

use switchboard_shared::types::{UserId, WindowId};

/// Set of every known user id.
pub const USER_LIST: &str = "userlist";

/// Hash with the global id counters.
pub const COUNTERS: &str = "counters";

pub const WINDOW_ID_COUNTER: &str = "windowId";
pub const GID_COUNTER: &str = "gid";
pub const ALERT_ID_COUNTER: &str = "alertId";

/// Hash of session id -> owning user id.
pub const SESSION_OWNERS: &str = "sessionowners";

/// Hash of session id -> unix seconds of its last poll.
pub const SESSION_SEEN: &str = "sessionseen";

/// `user:{user}` -> { nick, ... }
pub fn user(user: &UserId) -> String {
    format!("user:{user}")
}

/// `networks:{user}:{network}` -> { state, retryCount, currentNick }
pub fn network(user: &UserId, network: &str) -> String {
    format!("networks:{user}:{network}")
}

/// `windowlist:{user}` -> set of window ids
pub fn window_list(user: &UserId) -> String {
    format!("windowlist:{user}")
}

/// `window:{user}:{windowId}` -> window record
pub fn window(user: &UserId, window_id: WindowId) -> String {
    format!("window:{user}:{window_id}")
}

/// `names:{user}:{windowId}` -> { nick -> role glyph }
pub fn names(user: &UserId, window_id: WindowId) -> String {
    format!("names:{user}:{window_id}")
}

/// `settings:{user}` -> { setting -> JSON value }
pub fn settings(user: &UserId) -> String {
    format!("settings:{user}")
}

/// `friends:{user}` -> set of user ids
pub fn friends(user: &UserId) -> String {
    format!("friends:{user}")
}

/// `friendrequests:{user}` -> set of user ids waiting for confirmation
pub fn friend_requests(user: &UserId) -> String {
    format!("friendrequests:{user}")
}

/// `alert:{alertId}` -> { body, expiresAt }
pub fn alert(alert_id: u64) -> String {
    format!("alert:{alert_id}")
}

/// `pendingalerts:{user}` -> set of alert ids
pub fn pending_alerts(user: &UserId) -> String {
    format!("pendingalerts:{user}")
}

/// `sessions:{user}` -> set of live session ids
pub fn sessions(user: &UserId) -> String {
    format!("sessions:{user}")
}

/// `groupmembers:{group}` -> set of user ids of a native group
pub fn group_members(group: &str) -> String {
    format!("groupmembers:{group}")
}

/// `group:{group}` -> { owner, password }
pub fn group(group: &str) -> String {
    format!("group:{group}")
}
