use thiserror::Error;

use switchboard_shared::ProtocolError;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A lookup expected a record but found none.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A stored notification could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored field holds a value outside its domain.
    #[error("Corrupt field: {0}")]
    Corrupt(#[from] ProtocolError),

    /// A stored numeric field does not parse.
    #[error("Corrupt number in {key}.{field}: {value}")]
    CorruptNumber {
        key: String,
        field: String,
        value: String,
    },

    /// Attempt to rewrite a message while keeping it `original`.
    #[error("Invalid message transition for gid {0}")]
    InvalidTransition(u64),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
