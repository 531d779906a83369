//! Typed network event payloads decoded from protocol notifications.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

/// One decoded network notification from the transport.
///
/// Only the two kinds the correlation engine cares about are modeled; all other
/// protocol events are dropped at the transport.
#[derive(Debug, Clone)]
pub enum NetworkEvent {
	RequestWillBeSent {
		request_id: String,
		request: RequestInfo,
		/// Monotonic, transport-assigned seconds.
		timestamp: f64,
	},
	ResponseReceived {
		request_id: String,
		response: ResponseInfo,
		timestamp: f64,
	},
}

/// Request half of an exchange as reported by the protocol.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
	pub url: String,
	pub method: String,
	pub headers: HashMap<String, String>,
	pub post_data: Option<String>,
}

/// Response half of an exchange as reported by the protocol.
#[derive(Debug, Clone, Default)]
pub struct ResponseInfo {
	pub status: u16,
	pub status_text: String,
	pub headers: HashMap<String, String>,
	pub mime_type: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRequestEvent {
	request_id: String,
	request: RawRequest,
	#[serde(default)]
	timestamp: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRequest {
	#[serde(default)]
	url: String,
	#[serde(default)]
	method: String,
	#[serde(default)]
	headers: serde_json::Map<String, Value>,
	post_data: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResponseEvent {
	request_id: String,
	response: RawResponse,
	#[serde(default)]
	timestamp: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResponse {
	#[serde(default)]
	status: u16,
	#[serde(default)]
	status_text: String,
	#[serde(default)]
	headers: serde_json::Map<String, Value>,
	#[serde(default)]
	mime_type: String,
}

/// Header values are strings on the wire, but tolerate anything JSON-shaped.
fn header_map(raw: serde_json::Map<String, Value>) -> HashMap<String, String> {
	raw.into_iter()
		.map(|(name, value)| {
			let value = match value {
				Value::String(s) => s,
				other => other.to_string(),
			};
			(name, value)
		})
		.collect()
}

impl NetworkEvent {
	/// Decodes a protocol notification, returning `None` for event kinds the
	/// engine does not track or payloads that fail to parse.
	pub fn decode(method: &str, params: Value) -> Option<Self> {
		match method {
			"Network.requestWillBeSent" => {
				let raw: RawRequestEvent = serde_json::from_value(params).ok()?;
				Some(NetworkEvent::RequestWillBeSent {
					request_id: raw.request_id,
					request: RequestInfo {
						url: raw.request.url,
						method: raw.request.method,
						headers: header_map(raw.request.headers),
						post_data: raw.request.post_data,
					},
					timestamp: raw.timestamp,
				})
			}
			"Network.responseReceived" => {
				let raw: RawResponseEvent = serde_json::from_value(params).ok()?;
				Some(NetworkEvent::ResponseReceived {
					request_id: raw.request_id,
					response: ResponseInfo {
						status: raw.response.status,
						status_text: raw.response.status_text,
						headers: header_map(raw.response.headers),
						mime_type: raw.response.mime_type,
					},
					timestamp: raw.timestamp,
				})
			}
			_ => None,
		}
	}

	pub fn request_id(&self) -> &str {
		match self {
			NetworkEvent::RequestWillBeSent { request_id, .. } | NetworkEvent::ResponseReceived { request_id, .. } => request_id,
		}
	}
}
