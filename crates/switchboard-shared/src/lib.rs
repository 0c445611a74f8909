//! # switchboard-shared
//!
//! Types shared by every switchboard process: identifiers, member roles,
//! the notification wire format pushed to client sessions, and the small
//! protocol rules (channel names, pseudo user ids) that more than one
//! process needs to agree on.

pub mod channel;
pub mod constants;
pub mod error;
pub mod events;
pub mod nick;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
