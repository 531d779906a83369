//! Network event correlation and session lifecycle for browser traffic inspection.
//!
//! `netlens` attaches to a Chromium-family browser over the DevTools protocol,
//! merges its asynchronous network event streams into per-exchange records, and
//! answers filter/sort/paginate queries over the accumulated traffic.
//!
//! The crate is layered leaves-first:
//! - [`store`] merges "request will be sent" / "response received" events into
//!   [`store::NetworkRecord`]s keyed by request id, tolerating either arrival order.
//! - [`settle`] decides when a navigation's network activity has gone quiet.
//! - [`cdp`] owns the websocket transport: typed calls, typed events, one broadcast
//!   bus with any number of independent consumers.
//! - [`launcher`] brings up (or detects) a debuggable browser process.
//! - [`query`] provides read-only filter/sort/limit/group views over snapshots.
//! - [`session`] composes the above into the four user-facing operations.

pub mod cdp;
pub mod error;
pub mod launcher;
pub mod query;
pub mod session;
pub mod settle;
pub mod store;

pub use error::{DetailError, Error, ProcessError, Result, SessionError};
pub use session::{PageLoadSummary, RecordDetail, Session, SessionInfo, StartOptions};
pub use store::{NetworkRecord, RecordStore, ResponseRecord};

/// Remote-debugging port the whole tool assumes. Callers must launch or attach
/// on this port; it is deliberately not configurable on the CLI surface.
pub const DEBUG_PORT: u16 = 9222;
