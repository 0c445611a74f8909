use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;

/// Stable user identifier. Native users look like `m42`, users bridged from
/// IRC carry a pseudo id derived from their nick (see [`crate::nick`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Globally unique, monotonic window identifier.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally monotonic message sequence number.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Gid(pub u64);

impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One live client connection of a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Member role
// ---------------------------------------------------------------------------

/// Channel member role. Serialized as the glyph IRC uses in NAMES replies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    #[serde(rename = "u")]
    User,
    #[serde(rename = "+")]
    Voice,
    #[serde(rename = "@")]
    Oper,
}

impl Role {
    pub fn glyph(&self) -> &'static str {
        match self {
            Role::User => "u",
            Role::Voice => "+",
            Role::Oper => "@",
        }
    }
}

impl FromStr for Role {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "u" => Ok(Role::User),
            "+" => Ok(Role::Voice),
            "@" => Ok(Role::Oper),
            other => Err(ProtocolError::UnknownRole(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Network connection state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NetworkState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl NetworkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkState::Disconnected => "disconnected",
            NetworkState::Connecting => "connecting",
            NetworkState::Connected => "connected",
            NetworkState::Closing => "closing",
        }
    }
}

impl FromStr for NetworkState {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disconnected" => Ok(NetworkState::Disconnected),
            "connecting" => Ok(NetworkState::Connecting),
            "connected" => Ok(NetworkState::Connected),
            "closing" => Ok(NetworkState::Closing),
            other => Err(ProtocolError::UnknownNetworkState(other.to_string())),
        }
    }
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Window type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum WindowType {
    #[serde(rename = "group")]
    Group,
    #[serde(rename = "1on1")]
    OneOnOne,
}

impl WindowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowType::Group => "group",
            WindowType::OneOnOne => "1on1",
        }
    }
}

impl FromStr for WindowType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "group" => Ok(WindowType::Group),
            "1on1" => Ok(WindowType::OneOnOne),
            other => Err(ProtocolError::UnknownWindowType(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Message status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Original,
    Edited,
    Deleted,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Original => "original",
            MessageStatus::Edited => "edited",
            MessageStatus::Deleted => "deleted",
        }
    }
}

impl FromStr for MessageStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "original" => Ok(MessageStatus::Original),
            "edited" => Ok(MessageStatus::Edited),
            "deleted" => Ok(MessageStatus::Deleted),
            other => Err(ProtocolError::UnknownMessageStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_glyph_roundtrip() {
        for role in [Role::User, Role::Voice, Role::Oper] {
            assert_eq!(role.glyph().parse::<Role>().unwrap(), role);
        }
        assert!("x".parse::<Role>().is_err());
    }

    #[test]
    fn test_window_type_serializes_as_wire_name() {
        let json = serde_json::to_string(&WindowType::OneOnOne).unwrap();
        assert_eq!(json, "\"1on1\"");
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }
}
