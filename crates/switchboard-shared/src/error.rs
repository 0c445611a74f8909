use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Illegal or missing channel name.")]
    IllegalChannelName,

    #[error("Invalid pseudo user id: {0}")]
    InvalidPseudoId(String),

    #[error("Unknown role glyph: {0}")]
    UnknownRole(String),

    #[error("Unknown network state: {0}")]
    UnknownNetworkState(String),

    #[error("Unknown message status: {0}")]
    UnknownMessageStatus(String),

    #[error("Unknown window type: {0}")]
    UnknownWindowType(String),
}
