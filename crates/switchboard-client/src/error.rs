use thiserror::Error;

/// Errors produced while saving or restoring client state.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// Snapshot written by an incompatible client version.
    #[error("Unsupported snapshot version {0}")]
    UnsupportedVersion(u32),

    /// Snapshot belongs to a different user.
    #[error("Snapshot belongs to {0}")]
    WrongUser(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
