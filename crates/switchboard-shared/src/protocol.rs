//! Wire format between the relay and client sessions.
//!
//! Everything a session receives is a [`Notification`], a JSON object with a
//! `type` discriminator. Everything a session sends is a [`ClientRequest`],
//! discriminated by `id`.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{Gid, MessageStatus, Role, SessionId, UserId, WindowId, WindowType};

/// Free-form per-user settings (`theme`, `activeDesktop`, ...).
pub type Settings = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Server -> session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Notification {
    #[serde(rename = "ADD_WINDOW")]
    AddWindow(WindowInfo),

    /// Full member list of a window, sent during session start.
    #[serde(rename = "UPDATE_MEMBERS")]
    UpdateMembers(MembersUpdate),

    #[serde(rename = "ADDMEMBERS")]
    AddMembers(MembersUpdate),

    #[serde(rename = "DELMEMBERS")]
    DelMembers(MembersRemoval),

    /// Topic and/or password change of a window.
    #[serde(rename = "UPDATE")]
    Update(WindowUpdate),

    #[serde(rename = "ADD_MESSAGES")]
    AddMessages { messages: Vec<WindowMessages> },

    #[serde(rename = "UPDATE_NETWORKS")]
    UpdateNetworks { networks: Vec<String> },

    #[serde(rename = "ADD_ALERT", rename_all = "camelCase")]
    AddAlert { alert_id: u64, message: String },

    #[serde(rename = "STARTUP_SEQUENCE")]
    StartupSequence { length: usize },

    #[serde(rename = "FINISH_INIT")]
    FinishInit,

    #[serde(rename = "UPDATE_SETTINGS")]
    UpdateSettings { settings: Settings },

    #[serde(rename = "UPDATE_FRIENDS")]
    UpdateFriends { reset: bool, friends: Vec<FriendInfo> },

    /// Pending friend requests waiting for the user's answer.
    #[serde(rename = "CONFIRM_FRIENDS")]
    ConfirmFriends { friends: Vec<UserId> },

    /// Current nick of the user on every network, keyed by network name.
    #[serde(rename = "NICK")]
    Nick { nicks: BTreeMap<String, String> },

    #[serde(rename = "JOIN_RESP")]
    JoinResp(Response),

    #[serde(rename = "CREATE_RESP")]
    CreateResp(Response),

    #[serde(rename = "CHAT_RESP")]
    ChatResp(Response),

    #[serde(rename = "UPDATE_PASSWORD_RESP")]
    UpdatePasswordResp(Response),

    #[serde(rename = "UPDATE_TOPIC_RESP")]
    UpdateTopicResp(Response),
}

impl Notification {
    /// The `type` tag this notification serializes with.
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::AddWindow(_) => "ADD_WINDOW",
            Notification::UpdateMembers(_) => "UPDATE_MEMBERS",
            Notification::AddMembers(_) => "ADDMEMBERS",
            Notification::DelMembers(_) => "DELMEMBERS",
            Notification::Update(_) => "UPDATE",
            Notification::AddMessages { .. } => "ADD_MESSAGES",
            Notification::UpdateNetworks { .. } => "UPDATE_NETWORKS",
            Notification::AddAlert { .. } => "ADD_ALERT",
            Notification::StartupSequence { .. } => "STARTUP_SEQUENCE",
            Notification::FinishInit => "FINISH_INIT",
            Notification::UpdateSettings { .. } => "UPDATE_SETTINGS",
            Notification::UpdateFriends { .. } => "UPDATE_FRIENDS",
            Notification::ConfirmFriends { .. } => "CONFIRM_FRIENDS",
            Notification::Nick { .. } => "NICK",
            Notification::JoinResp(_) => "JOIN_RESP",
            Notification::CreateResp(_) => "CREATE_RESP",
            Notification::ChatResp(_) => "CHAT_RESP",
            Notification::UpdatePasswordResp(_) => "UPDATE_PASSWORD_RESP",
            Notification::UpdateTopicResp(_) => "UPDATE_TOPIC_RESP",
        }
    }

    /// Convenience constructor for a single message in a single window.
    pub fn single_message(window_id: WindowId, message: MessageInfo) -> Self {
        Notification::AddMessages {
            messages: vec![WindowMessages {
                window_id,
                messages: vec![message],
            }],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertFlags {
    pub email: bool,
    pub notification: bool,
    pub sound: bool,
    pub title: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WindowInfo {
    pub window_id: WindowId,
    pub name: String,
    /// Counterpart of a 1-on-1 window.
    pub user_id: Option<UserId>,
    pub window_type: WindowType,
    pub network: String,
    pub password: Option<String>,
    pub topic: Option<String>,
    pub alerts: AlertFlags,
    pub row: i64,
    pub column: i64,
    pub minimized_names_list: bool,
    pub desktop: i64,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub user_id: UserId,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MemberRef {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MembersUpdate {
    pub window_id: WindowId,
    /// When set, the list replaces every member the client knows of.
    pub reset: bool,
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MembersRemoval {
    pub window_id: WindowId,
    pub members: Vec<MemberRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WindowUpdate {
    pub window_id: WindowId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// `Some(None)` means the password was removed.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_or_null"
    )]
    pub password: Option<Option<String>>,
}

fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageInfo {
    pub gid: Gid,
    pub user_id: Option<UserId>,
    pub body: String,
    pub cat: String,
    /// Unix seconds.
    pub ts: i64,
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_id: Option<Gid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_ts: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WindowMessages {
    pub window_id: WindowId,
    pub messages: Vec<MessageInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FriendInfo {
    pub user_id: UserId,
    pub online: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// Answer to a client request, sent to the originating session only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            status: ResponseStatus::Ok,
            error_msg: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            error_msg: Some(msg.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Delivery target
// ---------------------------------------------------------------------------

/// Which sessions of the target user a notification goes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionTarget {
    One(SessionId),
    All,
}

// ---------------------------------------------------------------------------
// Session -> server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientRequest {
    Set {
        settings: Settings,
    },
    #[serde(rename_all = "camelCase")]
    Send {
        network: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        target_user_id: Option<UserId>,
        text: String,
    },
    Join {
        network: String,
        name: String,
        #[serde(default)]
        password: Option<String>,
    },
    Create {
        name: String,
        #[serde(default)]
        password: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Close {
        network: String,
        name: String,
        window_type: WindowType,
        #[serde(default)]
        last: bool,
    },
    UpdatePassword {
        network: String,
        name: String,
        password: Option<String>,
    },
    UpdateTopic {
        network: String,
        name: String,
        topic: String,
    },
    Whois {
        network: String,
        nick: String,
    },
    #[serde(rename_all = "camelCase")]
    Chat {
        network: String,
        target_user_id: UserId,
    },
    #[serde(rename_all = "camelCase")]
    Edit {
        window_id: WindowId,
        gid: Gid,
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Delete {
        window_id: WindowId,
        gid: Gid,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_notification_type_tags() {
        let ntf = Notification::AddMembers(MembersUpdate {
            window_id: WindowId(7),
            reset: true,
            members: vec![Member {
                user_id: UserId::new("iYWxpY2U"),
                role: Role::Oper,
            }],
        });

        let value = serde_json::to_value(&ntf).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "ADDMEMBERS",
                "windowId": 7,
                "reset": true,
                "members": [{ "userId": "iYWxpY2U", "role": "@" }]
            })
        );
        assert_eq!(value["type"], ntf.kind());
    }

    #[test]
    fn test_unit_and_struct_variants() {
        assert_eq!(
            serde_json::to_value(Notification::FinishInit).unwrap(),
            json!({ "type": "FINISH_INIT" })
        );
        assert_eq!(
            serde_json::to_value(Notification::AddAlert {
                alert_id: 3,
                message: "maintenance".into()
            })
            .unwrap(),
            json!({ "type": "ADD_ALERT", "alertId": 3, "message": "maintenance" })
        );
    }

    #[test]
    fn test_error_response_shape() {
        let value =
            serde_json::to_value(Notification::JoinResp(Response::error("nope"))).unwrap();
        assert_eq!(
            value,
            json!({ "type": "JOIN_RESP", "status": "ERROR", "errorMsg": "nope" })
        );
    }

    #[test]
    fn test_password_removal_survives_roundtrip() {
        let update = Notification::Update(WindowUpdate {
            window_id: WindowId(1),
            topic: None,
            password: Some(None),
        });
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value, json!({ "type": "UPDATE", "windowId": 1, "password": null }));

        let back: Notification = serde_json::from_value(value).unwrap();
        assert_eq!(back, update);
    }

    #[test]
    fn test_client_request_parsing() {
        let req: ClientRequest = serde_json::from_value(json!({
            "id": "UPDATE_PASSWORD",
            "network": "IRCNet",
            "name": "#foo",
            "password": null
        }))
        .unwrap();

        assert_eq!(
            req,
            ClientRequest::UpdatePassword {
                network: "IRCNet".into(),
                name: "#foo".into(),
                password: None,
            }
        );
    }
}
