//! Merge/correlation map for network request/response events.
//!
//! The transport delivers "request will be sent" and "response received" as two
//! independent streams with no ordering guarantee between them. The store keys
//! both by the protocol's opaque request id and merges them into one
//! [`NetworkRecord`] per exchange, whichever half arrives first.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::cdp::{NetworkEvent, RequestInfo, ResponseInfo};

/// Merged request+response data for one network exchange.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRecord {
	pub request_id: String,
	/// Empty until the request event arrives; a response-first arrival leaves a shell.
	#[serde(default)]
	pub url: String,
	#[serde(default)]
	pub method: String,
	#[serde(default, skip_serializing_if = "HashMap::is_empty")]
	pub request_headers: HashMap<String, String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub post_data: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub request_timestamp: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub response: Option<ResponseRecord>,
}

/// Response half of an exchange, absent while the request is pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRecord {
	pub status: u16,
	#[serde(default)]
	pub status_text: String,
	#[serde(default, skip_serializing_if = "HashMap::is_empty")]
	pub headers: HashMap<String, String>,
	#[serde(default)]
	pub mime_type: String,
	pub timestamp: f64,
}

impl NetworkRecord {
	fn shell(request_id: &str) -> Self {
		Self {
			request_id: request_id.to_string(),
			..Self::default()
		}
	}

	/// Sort key used by the query engine; records without a timestamp sort oldest.
	pub fn sort_timestamp(&self) -> f64 {
		self.request_timestamp.unwrap_or(0.0)
	}
}

/// Key→record map merging the two event streams.
///
/// Mutation arrives from the transport's dispatch task while reads come from the
/// command task, so the map sits behind a mutex. Records are never evicted; the
/// map only empties when the owning session tears it down with a fresh instance.
#[derive(Debug, Default)]
pub struct RecordStore {
	records: Mutex<HashMap<String, NetworkRecord>>,
}

impl RecordStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Ingests either event kind, merging in delivery order.
	pub fn apply(&self, event: &NetworkEvent) {
		match event {
			NetworkEvent::RequestWillBeSent {
				request_id,
				request,
				timestamp,
			} => self.on_request_sent(request_id, request, *timestamp),
			NetworkEvent::ResponseReceived {
				request_id,
				response,
				timestamp,
			} => self.on_response_received(request_id, response, *timestamp),
		}
	}

	/// Inserts or overwrites the request half. Last write wins if the same id is
	/// seen twice; an existing response half is preserved.
	pub fn on_request_sent(&self, request_id: &str, request: &RequestInfo, timestamp: f64) {
		let mut records = self.records.lock();
		let record = records.entry(request_id.to_string()).or_insert_with(|| NetworkRecord::shell(request_id));
		record.url = request.url.clone();
		record.method = request.method.clone();
		record.request_headers = request.headers.clone();
		record.post_data = request.post_data.clone();
		record.request_timestamp = Some(timestamp);
	}

	/// Merges the response half, creating an empty request shell when the
	/// response arrives first. Repeated responses replace (last write wins).
	pub fn on_response_received(&self, request_id: &str, response: &ResponseInfo, timestamp: f64) {
		let mut records = self.records.lock();
		let record = records.entry(request_id.to_string()).or_insert_with(|| NetworkRecord::shell(request_id));
		record.response = Some(ResponseRecord {
			status: response.status,
			status_text: response.status_text.clone(),
			headers: response.headers.clone(),
			mime_type: response.mime_type.clone(),
			timestamp,
		});
	}

	/// Clone of every current record; iteration order is unspecified, callers sort.
	pub fn snapshot(&self) -> Vec<NetworkRecord> {
		self.records.lock().values().cloned().collect()
	}

	pub fn get(&self, request_id: &str) -> Option<NetworkRecord> {
		self.records.lock().get(request_id).cloned()
	}

	pub fn len(&self) -> usize {
		self.records.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.lock().is_empty()
	}

	pub fn clear(&self) {
		self.records.lock().clear();
	}
}
