//! # switchboard-store
//!
//! Shared state of the relay, backed by SQLite.
//!
//! The schema emulates a key/value server: hashes (`kv_hash`) and sets
//! (`kv_set`) addressed by string keys such as `networks:{user}:{network}`,
//! plus two relational tables for data that needs ordered scans: chat
//! messages keyed by gid and the durable per-session outbox.
//!
//! [`Database`] is the synchronous handle with typed helpers for every
//! record kind. [`StateStore`] wraps it for use from async tasks.

pub mod database;
pub mod keys;
pub mod kv;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod networks;
pub mod outbox;
pub mod state;
pub mod users;
pub mod windows;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
pub use state::StateStore;
