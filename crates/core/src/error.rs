//! Error taxonomy for the traffic-inspection engine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures while bringing up the debuggable browser process.
#[derive(Debug, Error)]
pub enum ProcessError {
	#[error("no Chrome/Chromium executable found; install one or pass an explicit path")]
	NoBrowser,

	#[error("failed to spawn browser at {path}")]
	SpawnFailed {
		path: String,
		#[source]
		source: std::io::Error,
	},

	#[error("browser exited before the debug endpoint came up (status: {status})")]
	ExitedEarly { status: String },

	#[error("debug endpoint on port {port} not reachable after {waited_ms}ms; killed the spawned process")]
	StartupTimeout { port: u16, waited_ms: u64 },
}

/// Failures while attaching to the remote-debugging protocol.
#[derive(Debug, Error)]
pub enum SessionError {
	#[error("no debuggable target available on port {port}")]
	NoTarget { port: u16 },

	#[error("failed to connect to debug target: {0}")]
	ConnectFailed(String),

	#[error("protocol transport error: {0}")]
	Transport(String),
}

/// Failures while assembling a single record's detail report.
///
/// Body-fetch failures are deliberately absent: they degrade to inline markers
/// in the detail instead of failing the operation.
#[derive(Debug, Error)]
pub enum DetailError {
	#[error("no record for request id {0}")]
	UnknownRequestId(String),
}

/// Unifying error for the public operations.
#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Process(#[from] ProcessError),

	#[error(transparent)]
	Session(#[from] SessionError),

	#[error(transparent)]
	Detail(#[from] DetailError),

	#[error("invalid url: {0}")]
	InvalidUrl(String),
}
