// In-process courier: named endpoints, awaited calls and fire-and-forget
// events over tokio channels.

pub mod courier;
pub mod endpoint;
pub mod error;
pub mod lanes;

pub use courier::Courier;
pub use endpoint::{Endpoint, Handler, HandlerResult};
pub use error::BusError;
pub use lanes::lane_key;
