//! Domain records read from and written to the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use switchboard_shared::protocol::{AlertFlags, MessageInfo};
use switchboard_shared::types::{Gid, MessageStatus, NetworkState, UserId, WindowId, WindowType};

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// Connection state of one user on one network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRecord {
    pub state: NetworkState,
    pub retry_count: i64,
    pub current_nick: Option<String>,
}

impl Default for NetworkRecord {
    fn default() -> Self {
        Self {
            state: NetworkState::Disconnected,
            retry_count: 0,
            current_nick: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Window
// ---------------------------------------------------------------------------

/// A conversation window owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Window {
    pub id: WindowId,
    pub network: String,
    /// Channel name for group windows, counterpart user id for 1-on-1s.
    pub name: String,
    pub window_type: WindowType,
    /// Counterpart of a 1-on-1 window.
    pub peer: Option<UserId>,
    pub password: Option<String>,
    pub topic: Option<String>,
    pub row: i64,
    pub column: i64,
    pub desktop: i64,
    pub minimized_names_list: bool,
    pub alerts: AlertFlags,
}

/// Parameters of a window about to be created.
#[derive(Debug, Clone)]
pub struct NewWindow<'a> {
    pub network: &'a str,
    pub name: &'a str,
    pub window_type: WindowType,
    pub peer: Option<&'a UserId>,
    pub password: Option<&'a str>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A stored chat line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub gid: Gid,
    pub window_id: WindowId,
    pub user_id: Option<UserId>,
    pub body: String,
    pub cat: String,
    pub ts: i64,
    pub status: MessageStatus,
    pub updated_id: Option<Gid>,
    pub updated_ts: Option<i64>,
}

impl Message {
    /// Returns `true` if a client holding every gid up to `cached_upto`
    /// still needs this record: either it is newer, or it was edited or
    /// deleted at or after the watermark.
    pub fn is_newer_than(&self, cached_upto: Gid) -> bool {
        self.gid > cached_upto || self.is_edited_since(cached_upto)
    }

    /// Edited or deleted at or after `cached_upto`.
    pub fn is_edited_since(&self, cached_upto: Gid) -> bool {
        self.status != MessageStatus::Original
            && self.updated_id.is_some_and(|updated| updated >= cached_upto)
    }

    pub fn to_info(&self) -> MessageInfo {
        MessageInfo {
            gid: self.gid,
            user_id: self.user_id.clone(),
            body: self.body.clone(),
            cat: self.cat.clone(),
            ts: self.ts,
            status: self.status,
            updated_id: self.updated_id,
            updated_ts: self.updated_ts,
        }
    }
}

/// A line about to be stored; the gid is assigned on insert.
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub window_id: WindowId,
    pub user_id: Option<&'a UserId>,
    pub body: &'a str,
    pub cat: &'a str,
    pub ts: i64,
}

// ---------------------------------------------------------------------------
// Alert
// ---------------------------------------------------------------------------

/// A broadcast announcement shown to users until it expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub id: u64,
    pub body: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(gid: u64, status: MessageStatus, updated_id: Option<u64>) -> Message {
        Message {
            gid: Gid(gid),
            window_id: WindowId(1),
            user_id: None,
            body: String::new(),
            cat: "msg".into(),
            ts: 0,
            status,
            updated_id: updated_id.map(Gid),
            updated_ts: None,
        }
    }

    #[test]
    fn test_watermark_filter() {
        let watermark = Gid(100);

        assert!(!message(95, MessageStatus::Original, None).is_newer_than(watermark));
        assert!(!message(100, MessageStatus::Original, None).is_newer_than(watermark));
        assert!(message(101, MessageStatus::Original, None).is_newer_than(watermark));
        assert!(message(102, MessageStatus::Edited, Some(105)).is_newer_than(watermark));
        assert!(message(90, MessageStatus::Deleted, Some(120)).is_newer_than(watermark));
        assert!(!message(90, MessageStatus::Edited, Some(99)).is_newer_than(watermark));
        assert!(message(90, MessageStatus::Edited, Some(100)).is_newer_than(watermark));
        assert!(!message(90, MessageStatus::Original, Some(100)).is_edited_since(watermark));
    }
}
