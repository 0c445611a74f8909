//! # switchboard-client
//!
//! Client-side model of a switchboard session. Notifications from the relay
//! are applied with upsert-by-primary-key semantics, so replaying a
//! bootstrap the client has already seen leaves the model unchanged. The
//! model can be saved as a snapshot and restored on the next start, when its
//! `cachedUpto` watermark tells the relay which messages to skip.

pub mod snapshot;
pub mod store;

mod error;

pub use error::ClientError;
pub use snapshot::Snapshot;
pub use store::{ClientStore, WindowModel};
