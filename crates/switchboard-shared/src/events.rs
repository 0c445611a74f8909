//! Payloads of courier events exchanged between the relay's endpoints.
//!
//! Every event that concerns one connection carries `userId` and `network`
//! at the top level, which is what the courier uses to keep such events in
//! arrival order.

use serde::{Deserialize, Serialize};

use crate::types::{SessionId, UserId, WindowType};

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

pub const SEND: &str = "send";
pub const JOIN: &str = "join";
pub const CREATE: &str = "create";
pub const CLOSE: &str = "close";
pub const UPDATE_PASSWORD: &str = "updatePassword";
pub const UPDATE_TOPIC: &str = "updateTopic";
pub const WHOIS: &str = "whois";
pub const CHAT: &str = "chat";

pub const RESTARTED: &str = "restarted";
pub const DATA: &str = "data";
pub const CONNECTED: &str = "connected";
pub const DISCONNECTED: &str = "disconnected";
pub const RECONNECT_IF_INACTIVE: &str = "reconnectifinactive";

pub const CONNECT: &str = "connect";
pub const WRITE: &str = "write";
pub const DISCONNECT: &str = "disconnect";

// ---------------------------------------------------------------------------
// Session -> backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SendParams {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub network: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub target_user_id: Option<UserId>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinParams {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub network: String,
    pub name: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CloseParams {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub network: String,
    pub name: String,
    pub window_type: WindowType,
    #[serde(default)]
    pub last: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PasswordParams {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub network: String,
    pub name: String,
    /// `None` removes the password.
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TopicParams {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub network: String,
    pub name: String,
    pub topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WhoisParams {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub network: String,
    pub nick: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatParams {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub network: String,
    pub target_user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateParams {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub name: String,
    #[serde(default)]
    pub password: Option<String>,
}

/// Parameters of events that concern every network of one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserParams {
    pub user_id: UserId,
}

// ---------------------------------------------------------------------------
// Gateway <-> connection manager
// ---------------------------------------------------------------------------

/// Identifies one connection. Used for `connect`, `disconnect` and the
/// `connected` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionParams {
    pub user_id: UserId,
    pub network: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WriteParams {
    pub user_id: UserId,
    pub network: String,
    /// Lines without the trailing CRLF, written in order.
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DataParams {
    pub user_id: UserId,
    pub network: String,
    pub line: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectedParams {
    pub user_id: UserId,
    pub network: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connection_events_carry_lane_fields() {
        let value = serde_json::to_value(DataParams {
            user_id: UserId::new("m1"),
            network: "IRCNet".into(),
            line: ":srv 001 alice :Welcome".into(),
        })
        .unwrap();

        assert_eq!(value["userId"], json!("m1"));
        assert_eq!(value["network"], json!("IRCNet"));
    }

    #[test]
    fn test_optional_fields_default() {
        let params: JoinParams = serde_json::from_value(json!({
            "userId": "m1",
            "sessionId": "s1",
            "network": "IRCNet",
            "name": "#rust"
        }))
        .unwrap();

        assert_eq!(params.password, None);
    }
}
