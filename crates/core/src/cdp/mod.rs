//! DevTools protocol transport: target discovery, typed calls, typed events.
//!
//! The wire protocol is treated as a black box: JSON-RPC style request/response
//! calls plus a stream of events. Network events are decoded into concrete sum
//! types and fanned out on a broadcast bus so any number of independent
//! consumers (the global record store, a per-navigation tracker) can observe
//! them without re-registering protocol callbacks.

mod connection;
mod events;
mod targets;

pub use connection::CdpConnection;
pub use events::{NetworkEvent, RequestInfo, ResponseInfo};
pub use targets::{Target, fetch_targets, pick_target};
