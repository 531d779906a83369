//! Debug-endpoint target discovery over `/json/list`.

use std::time::Duration;

use serde::Deserialize;

use crate::error::SessionError;

/// An inspectable browser surface exposed by the debug endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
	#[serde(rename = "type", default)]
	pub kind: String,
	#[serde(default)]
	pub title: String,
	#[serde(default)]
	pub url: String,
	pub web_socket_debugger_url: Option<String>,
}

/// Fetches the current target list from the debug endpoint on `port`.
///
/// Tries the loopback spellings in turn since Chromium binds differently across
/// platforms and IP stacks.
pub async fn fetch_targets(port: u16) -> Result<Vec<Target>, SessionError> {
	let client = reqwest::Client::builder()
		.timeout(Duration::from_millis(400))
		.build()
		.map_err(|e| SessionError::ConnectFailed(format!("failed to create HTTP client: {e}")))?;
	let mut last_error = "no response".to_string();

	for url in [
		format!("http://127.0.0.1:{port}/json/list"),
		format!("http://localhost:{port}/json/list"),
		format!("http://[::1]:{port}/json/list"),
	] {
		let response = match client.get(&url).send().await {
			Ok(r) => r,
			Err(e) => {
				last_error = e.to_string();
				continue;
			}
		};

		if !response.status().is_success() {
			last_error = format!("unexpected status {}", response.status());
			continue;
		}

		return response
			.json::<Vec<Target>>()
			.await
			.map_err(|e| SessionError::ConnectFailed(format!("failed to parse target list: {e}")));
	}

	Err(SessionError::ConnectFailed(format!("debug endpoint on port {port} unreachable: {last_error}")))
}

/// Picks the target to attach to: the first `type == "page"` entry with a
/// debugger URL, else the first entry that has one at all.
pub fn pick_target(targets: &[Target]) -> Option<&Target> {
	targets
		.iter()
		.find(|t| t.kind == "page" && t.web_socket_debugger_url.is_some())
		.or_else(|| targets.iter().find(|t| t.web_socket_debugger_url.is_some()))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn target(kind: &str, ws: Option<&str>) -> Target {
		Target {
			kind: kind.to_string(),
			title: String::new(),
			url: String::new(),
			web_socket_debugger_url: ws.map(str::to_string),
		}
	}

	#[test]
	fn prefers_page_targets() {
		let targets = vec![
			target("background_page", Some("ws://x/1")),
			target("page", Some("ws://x/2")),
			target("page", Some("ws://x/3")),
		];
		assert_eq!(pick_target(&targets).unwrap().web_socket_debugger_url.as_deref(), Some("ws://x/2"));
	}

	#[test]
	fn falls_back_to_any_connectable_target() {
		let targets = vec![target("page", None), target("worker", Some("ws://x/w"))];
		assert_eq!(pick_target(&targets).unwrap().kind, "worker");
	}

	#[test]
	fn no_connectable_target_yields_none() {
		assert!(pick_target(&[]).is_none());
		assert!(pick_target(&[target("page", None)]).is_none());
	}
}
