use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("Endpoint unavailable: {0}")]
    Unavailable(String),

    #[error("Endpoint {endpoint} has no handler for {event}")]
    UnknownEvent { endpoint: String, event: String },

    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("No reply received for request {0}")]
    NoReply(uuid::Uuid),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for BusError {
    fn from(e: serde_json::Error) -> Self {
        BusError::Serialization(e.to_string())
    }
}
