//! Session orchestration: process bring-up, protocol attachment, and the four
//! user-facing operations over the accumulated traffic.

use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine;
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cdp::{CdpConnection, fetch_targets, pick_target};
use crate::error::{DetailError, Error, Result, SessionError};
use crate::launcher::{LaunchConfig, LaunchOutcome, ensure_browser};
use crate::query::{TrafficQuery, group_by_host, run_query};
use crate::settle::{SettleOptions, await_settle};
use crate::store::{NetworkRecord, RecordStore};
use crate::DEBUG_PORT;

/// Options for [`Session::start`].
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
	pub user_data_dir: Option<PathBuf>,
	pub headless: bool,
}

/// Outcome of [`Session::start`], shaped for the start report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub pid: Option<u32>,
	pub port: u16,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub user_data_dir: Option<PathBuf>,
	pub target_count: usize,
	pub already_running: bool,
}

/// Per-navigation summary returned by [`Session::open_url`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLoadSummary {
	pub url: String,
	pub total_requests: usize,
	pub api_requests: Vec<ApiCall>,
}

/// One API-like exchange in a page-load summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCall {
	pub request_id: String,
	pub url: String,
	pub method: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub status: Option<u16>,
}

/// Full detail for one record, bodies fetched live.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDetail {
	pub record: NetworkRecord,
	pub response_body: FetchedBody,
	/// Absent for methods that carry no body and have none cached.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub request_body: Option<FetchedBody>,
}

/// Result of one best-effort body fetch. A failed fetch degrades to an inline
/// marker instead of failing the detail operation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "camelCase")]
pub enum FetchedBody {
	Content(String),
	Unavailable(String),
}

/// Lifecycle of the protocol attachment, observable for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	Absent,
	Attached,
	Stale,
}

struct Attachment {
	connection: Arc<CdpConnection>,
	store: Arc<RecordStore>,
	consumer: JoinHandle<()>,
}

/// The live session: at most one transport connection, its record store, and
/// the spawned-process bookkeeping. Held explicitly by the caller; there is no
/// hidden process-wide singleton.
pub struct Session {
	port: u16,
	attachment: Option<Attachment>,
	launched_pid: Option<u32>,
}

impl Session {
	pub fn new() -> Self {
		Self::with_port(DEBUG_PORT)
	}

	/// Port override for tests driving a fake endpoint; production callers use
	/// [`Session::new`] and the fixed [`DEBUG_PORT`].
	pub fn with_port(port: u16) -> Self {
		Self {
			port,
			attachment: None,
			launched_pid: None,
		}
	}

	pub fn state(&self) -> SessionState {
		match &self.attachment {
			None => SessionState::Absent,
			Some(attachment) if attachment.connection.is_open() => SessionState::Attached,
			Some(_) => SessionState::Stale,
		}
	}

	/// Ensures a debuggable browser is running; idempotent.
	pub async fn start(&mut self, options: StartOptions) -> Result<SessionInfo> {
		let config = LaunchConfig {
			port: self.port,
			user_data_dir: options.user_data_dir,
			headless: options.headless,
			..LaunchConfig::default()
		};
		let LaunchOutcome {
			already_running,
			target_count,
			pid,
			user_data_dir,
		} = ensure_browser(&config).await?;

		if let Some(pid) = pid {
			self.launched_pid = Some(pid);
		}

		Ok(SessionInfo {
			pid: pid.or(self.launched_pid),
			port: self.port,
			user_data_dir,
			target_count,
			already_running,
		})
	}

	/// Navigates the attached page and waits for network activity to settle.
	pub async fn open_url(&mut self, url: &str) -> Result<PageLoadSummary> {
		url::Url::parse(url).map_err(|_| Error::InvalidUrl(url.to_string()))?;

		let attachment = self.attach().await?;
		// Subscribe before navigating so the first burst is not missed.
		let events = attachment.connection.subscribe();
		attachment.connection.call("Page.navigate", json!({ "url": url })).await?;

		info!(target = "netlens.session", %url, "navigated; waiting for settle");
		let traffic = await_settle(events, SettleOptions::default()).await;

		let api_requests = traffic
			.api_requests(url)
			.into_iter()
			.map(|record| ApiCall {
				request_id: record.request_id.clone(),
				url: record.url.clone(),
				method: record.method.clone(),
				status: record.response.as_ref().map(|r| r.status),
			})
			.collect();

		Ok(PageLoadSummary {
			url: url.to_string(),
			total_requests: traffic.total_requests(),
			api_requests,
		})
	}

	/// Filter/sort/limit query over the accumulated records, grouped by host.
	/// Empty results are not errors.
	pub async fn traffic(&mut self, query: &TrafficQuery) -> Result<Vec<(String, Vec<NetworkRecord>)>> {
		let attachment = self.attach().await?;
		let snapshot = attachment.store.snapshot();
		Ok(group_by_host(run_query(snapshot, query)))
	}

	/// Full detail for one cached record, with live best-effort body fetches.
	pub async fn detail(&mut self, request_id: &str) -> Result<RecordDetail> {
		let attachment = self.attach().await?;
		let record = attachment
			.store
			.get(request_id)
			.ok_or_else(|| DetailError::UnknownRequestId(request_id.to_string()))?;

		let response_body = fetch_response_body(&attachment.connection, request_id).await;
		let request_body = match &record.post_data {
			Some(cached) => Some(FetchedBody::Content(cached.clone())),
			None if is_state_changing(&record.method) => Some(fetch_request_body(&attachment.connection, request_id).await),
			None => None,
		};

		Ok(RecordDetail {
			record,
			response_body,
			request_body,
		})
	}

	/// The process-wide connection, created or reused per the lifecycle rules.
	pub async fn connection(&mut self) -> Result<Arc<CdpConnection>> {
		Ok(Arc::clone(&self.attach().await?.connection))
	}

	/// Tears the attachment down; the record set dies with it.
	pub fn close(&mut self) {
		if let Some(attachment) = self.attachment.take() {
			debug!(target = "netlens.session", "closing session");
			attachment.connection.close();
			attachment.consumer.abort();
			attachment.store.clear();
		}
	}

	/// Reuses the held connection when its socket is still open; otherwise
	/// closes the stale handle best-effort and dials a fresh target. Every new
	/// connection gets a fresh record store with one persistent consumer.
	async fn attach(&mut self) -> Result<&Attachment> {
		if self.state() == SessionState::Stale {
			warn!(target = "netlens.session", "connection stale; reconnecting");
			self.close();
		}

		if self.attachment.is_none() {
			let targets = fetch_targets(self.port).await?;
			let target = pick_target(&targets).ok_or(SessionError::NoTarget { port: self.port })?;
			// pick_target only returns entries that carry a debugger URL.
			let ws_url = target.web_socket_debugger_url.clone().unwrap_or_default();
			debug!(target = "netlens.session", kind = %target.kind, %ws_url, "attaching to target");

			let connection = Arc::new(CdpConnection::connect(&ws_url).await?);
			// The consumer subscribes before the enable round-trips: events
			// surfaced while those calls are in flight land in the store too.
			let store = Arc::new(RecordStore::new());
			let consumer = spawn_store_consumer(&connection, Arc::clone(&store));
			for method in ["Network.enable", "Page.enable"] {
				if let Err(e) = connection.call(method, json!({})).await {
					connection.close();
					consumer.abort();
					return Err(e.into());
				}
			}
			self.attachment = Some(Attachment { connection, store, consumer });
			info!(target = "netlens.session", port = self.port, "session attached");
		}

		Ok(self.attachment.as_ref().expect("attachment just ensured"))
	}
}

impl Default for Session {
	fn default() -> Self {
		Self::new()
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		self.close();
	}
}

/// The persistent subscriber pair from the protocol's point of view: forwards
/// every network event into the session-wide store for the connection's life.
fn spawn_store_consumer(connection: &CdpConnection, store: Arc<RecordStore>) -> JoinHandle<()> {
	let mut events = connection.subscribe();
	tokio::spawn(async move {
		loop {
			match events.recv().await {
				Ok(event) => store.apply(&event),
				Err(RecvError::Lagged(skipped)) => {
					warn!(target = "netlens.session", skipped, "store consumer lagged; records dropped");
				}
				Err(RecvError::Closed) => break,
			}
		}
	})
}

fn is_state_changing(method: &str) -> bool {
	matches!(method.to_ascii_uppercase().as_str(), "POST" | "PUT" | "PATCH")
}

async fn fetch_response_body(connection: &CdpConnection, request_id: &str) -> FetchedBody {
	match connection.call("Network.getResponseBody", json!({ "requestId": request_id })).await {
		Ok(result) => {
			let body = result.get("body").and_then(|v| v.as_str()).unwrap_or_default();
			if result.get("base64Encoded").and_then(|v| v.as_bool()).unwrap_or(false) {
				match base64::engine::general_purpose::STANDARD.decode(body) {
					Ok(bytes) => FetchedBody::Content(String::from_utf8_lossy(&bytes).into_owned()),
					Err(e) => FetchedBody::Unavailable(format!("undecodable body: {e}")),
				}
			} else {
				FetchedBody::Content(body.to_string())
			}
		}
		Err(e) => FetchedBody::Unavailable(format!("body not available: {e}")),
	}
}

async fn fetch_request_body(connection: &CdpConnection, request_id: &str) -> FetchedBody {
	match connection.call("Network.getRequestPostData", json!({ "requestId": request_id })).await {
		Ok(result) => FetchedBody::Content(result.get("postData").and_then(|v| v.as_str()).unwrap_or_default().to_string()),
		Err(e) => FetchedBody::Unavailable(format!("post data not available: {e}")),
	}
}
