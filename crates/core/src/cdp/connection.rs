//! Shared websocket connection to one debug target.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use super::events::NetworkEvent;
use crate::error::SessionError;

/// Capacity of the event fan-out bus. A lagging consumer skips events rather
/// than stalling the dispatch task.
const EVENT_BUS_CAPACITY: usize = 1024;

type PendingCalls = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, String>>>>>;

/// One live protocol connection: typed request/response calls plus a broadcast
/// bus of decoded [`NetworkEvent`]s.
///
/// A dispatch task owns the socket's read half; [`CdpConnection::call`]
/// correlates replies by message id, and every decoded network event is fanned
/// out to all current [`CdpConnection::subscribe`]rs. The connection reports
/// itself stale via [`CdpConnection::is_open`] once the socket drops; staleness
/// is detected lazily by the session on next use.
pub struct CdpConnection {
	outbound: mpsc::UnboundedSender<Message>,
	pending: PendingCalls,
	events: broadcast::Sender<NetworkEvent>,
	next_id: AtomicU64,
	open: Arc<AtomicBool>,
}

impl CdpConnection {
	/// Dials `ws_url` and spawns the reader/writer tasks.
	pub async fn connect(ws_url: &str) -> Result<Self, SessionError> {
		let (socket, _) = connect_async(ws_url).await.map_err(|e| SessionError::ConnectFailed(e.to_string()))?;
		debug!(target = "netlens.cdp", %ws_url, "websocket connected");

		let (mut ws_tx, mut ws_rx) = socket.split();
		let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
		let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);
		let pending: PendingCalls = Arc::new(Mutex::new(HashMap::new()));
		let open = Arc::new(AtomicBool::new(true));

		tokio::spawn({
			let open = Arc::clone(&open);
			async move {
				while let Some(message) = outbound_rx.recv().await {
					if let Err(e) = ws_tx.send(message).await {
						debug!(target = "netlens.cdp", error = %e, "websocket write failed");
						open.store(false, Ordering::SeqCst);
						break;
					}
				}
			}
		});

		tokio::spawn({
			let pending = Arc::clone(&pending);
			let events = events.clone();
			let open = Arc::clone(&open);
			async move {
				while let Some(message) = ws_rx.next().await {
					let text = match message {
						Ok(Message::Text(text)) => text,
						Ok(Message::Close(_)) | Err(_) => break,
						Ok(_) => continue,
					};
					dispatch_message(&text, &pending, &events);
				}

				open.store(false, Ordering::SeqCst);
				// Unblock callers still waiting on a reply.
				let stranded: Vec<_> = pending.lock().drain().collect();
				for (_, tx) in stranded {
					let _ = tx.send(Err("connection closed".to_string()));
				}
				debug!(target = "netlens.cdp", "dispatch task finished");
			}
		});

		Ok(Self {
			outbound,
			pending,
			events,
			next_id: AtomicU64::new(1),
			open,
		})
	}

	/// One protocol round-trip. Resolves with the `result` payload or the
	/// protocol's error message.
	pub async fn call(&self, method: &str, params: Value) -> Result<Value, SessionError> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let (tx, rx) = oneshot::channel();
		self.pending.lock().insert(id, tx);

		trace!(target = "netlens.cdp", id, method, "sending call");
		let payload = json!({ "id": id, "method": method, "params": params });
		if self.outbound.send(Message::Text(payload.to_string())).is_err() {
			self.pending.lock().remove(&id);
			return Err(SessionError::Transport("connection closed".to_string()));
		}

		match rx.await {
			Ok(Ok(result)) => Ok(result),
			Ok(Err(message)) => Err(SessionError::Transport(message)),
			Err(_) => Err(SessionError::Transport("connection closed before reply".to_string())),
		}
	}

	/// New independent consumer of the network event stream.
	pub fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
		self.events.subscribe()
	}

	/// `false` once the underlying socket is no longer open.
	pub fn is_open(&self) -> bool {
		self.open.load(Ordering::SeqCst)
	}

	/// Best-effort close; errors are ignored by design.
	pub fn close(&self) {
		let _ = self.outbound.send(Message::Close(None));
		self.open.store(false, Ordering::SeqCst);
	}
}

fn dispatch_message(text: &str, pending: &PendingCalls, events: &broadcast::Sender<NetworkEvent>) {
	let value: Value = match serde_json::from_str(text) {
		Ok(v) => v,
		Err(e) => {
			warn!(target = "netlens.cdp", error = %e, "unparseable protocol message");
			return;
		}
	};

	if let Some(id) = value.get("id").and_then(Value::as_u64) {
		let Some(tx) = pending.lock().remove(&id) else {
			trace!(target = "netlens.cdp", id, "reply for unknown call id");
			return;
		};
		let outcome = match value.get("error") {
			Some(error) => Err(error
				.get("message")
				.and_then(Value::as_str)
				.unwrap_or("protocol error")
				.to_string()),
			None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
		};
		let _ = tx.send(outcome);
		return;
	}

	let Some(method) = value.get("method").and_then(Value::as_str) else {
		return;
	};
	let params = value.get("params").cloned().unwrap_or(Value::Null);
	if let Some(event) = NetworkEvent::decode(method, params) {
		trace!(target = "netlens.cdp", request_id = event.request_id(), "network event");
		// No receivers is fine; events are only interesting while observed.
		let _ = events.send(event);
	}
}
