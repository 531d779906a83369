//! Quiescence detection: decides when a navigation's network burst has stopped.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Instant, sleep};
use tracing::{debug, trace};

use crate::cdp::NetworkEvent;
use crate::store::{NetworkRecord, RecordStore};

/// Trailing-window parameters for settle detection.
#[derive(Debug, Clone, Copy)]
pub struct SettleOptions {
	/// How long the stream must stay quiet before the load counts as settled.
	pub activity_window: Duration,
	/// Cadence of the quiet check.
	pub poll: Duration,
}

impl Default for SettleOptions {
	fn default() -> Self {
		Self {
			activity_window: Duration::from_millis(1000),
			poll: Duration::from_millis(100),
		}
	}
}

/// Traffic observed during one navigation, independent of the global store.
#[derive(Debug)]
pub struct PageTraffic {
	records: Vec<NetworkRecord>,
}

impl PageTraffic {
	pub fn records(&self) -> &[NetworkRecord] {
		&self.records
	}

	pub fn total_requests(&self) -> usize {
		self.records.len()
	}

	/// Responses that look like same-domain API calls, per [`is_api_like`].
	pub fn api_requests(&self, page_url: &str) -> Vec<&NetworkRecord> {
		let Some(page_host) = host_of(page_url) else {
			return Vec::new();
		};
		self.records
			.iter()
			.filter(|record| {
				record
					.response
					.as_ref()
					.is_some_and(|response| is_api_like(&record.url, &page_host, &response.mime_type))
			})
			.collect()
	}
}

/// Waits until no network activity has been observed for a full quiet window.
///
/// A temporary consumer of the event bus: each event stamps the last-activity
/// instant and is recorded into a page-load-scoped store so the caller gets a
/// per-navigation summary without diffing the global store. Resolution is a
/// heuristic: a genuine gap of one window anywhere during loading triggers it,
/// not only at the end. Always eventually resolves; with zero events the first
/// window elapsing from the start does it. Dropping the receiver on return
/// detaches this consumer; persistent consumers keep running.
pub async fn await_settle(mut events: broadcast::Receiver<NetworkEvent>, options: SettleOptions) -> PageTraffic {
	let tracker = RecordStore::new();
	let mut last_activity = Instant::now();
	let mut stream_closed = false;

	loop {
		if stream_closed {
			// No more events can arrive; just wait out the remaining window.
			let elapsed = last_activity.elapsed();
			if elapsed >= options.activity_window {
				break;
			}
			sleep(options.activity_window - elapsed).await;
			break;
		}

		tokio::select! {
			received = events.recv() => match received {
				Ok(event) => {
					trace!(target = "netlens.settle", request_id = event.request_id(), "activity");
					last_activity = Instant::now();
					tracker.apply(&event);
				}
				Err(RecvError::Lagged(skipped)) => {
					debug!(target = "netlens.settle", skipped, "event bus lagged; treating as activity");
					last_activity = Instant::now();
				}
				Err(RecvError::Closed) => stream_closed = true,
			},
			_ = sleep(options.poll) => {
				if last_activity.elapsed() >= options.activity_window {
					break;
				}
			}
		}
	}

	debug!(target = "netlens.settle", records = tracker.len(), "network settled");
	PageTraffic { records: tracker.snapshot() }
}

const STATIC_ASSET_EXTENSIONS: &[&str] = &[
	"css", "js", "png", "jpg", "jpeg", "gif", "svg", "ico", "woff", "woff2", "ttf",
];

/// Best-effort classification of a response as a same-domain API call.
///
/// True iff the URL's hostname equals `page_host`, the MIME type is not
/// html/css/javascript/image, and the path does not end in a known static-asset
/// extension. Malformed URLs are excluded rather than erroring the summary.
pub fn is_api_like(record_url: &str, page_host: &str, mime_type: &str) -> bool {
	let Some(host) = host_of(record_url) else {
		return false;
	};
	if !host.eq_ignore_ascii_case(page_host) {
		return false;
	}

	let mime = mime_type.to_ascii_lowercase();
	if mime.contains("html") || mime.contains("css") || mime.contains("javascript") || mime.starts_with("image/") {
		return false;
	}

	let path = url::Url::parse(record_url).map(|u| u.path().to_ascii_lowercase()).unwrap_or_default();
	!STATIC_ASSET_EXTENSIONS.iter().any(|ext| path.ends_with(&format!(".{ext}")))
}

fn host_of(raw: &str) -> Option<String> {
	url::Url::parse(raw).ok()?.host_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;
	use crate::cdp::{RequestInfo, ResponseInfo};

	fn request_event(id: &str, url: &str, timestamp: f64) -> NetworkEvent {
		NetworkEvent::RequestWillBeSent {
			request_id: id.to_string(),
			request: RequestInfo {
				url: url.to_string(),
				method: "GET".to_string(),
				headers: HashMap::new(),
				post_data: None,
			},
			timestamp,
		}
	}

	fn response_event(id: &str, mime: &str, timestamp: f64) -> NetworkEvent {
		NetworkEvent::ResponseReceived {
			request_id: id.to_string(),
			response: ResponseInfo {
				status: 200,
				status_text: "OK".to_string(),
				headers: HashMap::new(),
				mime_type: mime.to_string(),
			},
			timestamp,
		}
	}

	#[tokio::test(start_paused = true)]
	async fn settles_after_one_window_with_zero_events() {
		let (tx, rx) = broadcast::channel(16);
		let options = SettleOptions::default();

		let start = Instant::now();
		let traffic = await_settle(rx, options).await;
		drop(tx);

		assert!(start.elapsed() >= options.activity_window);
		assert_eq!(traffic.total_requests(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn settles_no_earlier_than_window_after_last_event() {
		let (tx, rx) = broadcast::channel(16);
		let options = SettleOptions::default();

		let sender = tokio::spawn({
			let tx = tx.clone();
			async move {
				for i in 0..3 {
					sleep(Duration::from_millis(300)).await;
					let _ = tx.send(request_event(&format!("r{i}"), "https://site.test/a", i as f64));
				}
				Instant::now()
			}
		});

		let start = Instant::now();
		let traffic = await_settle(rx, options).await;
		let last_event_at = sender.await.unwrap();

		assert!(Instant::now() - last_event_at >= options.activity_window);
		assert!(start.elapsed() >= Duration::from_millis(900) + options.activity_window);
		assert_eq!(traffic.total_requests(), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn records_per_navigation_traffic_and_classifies_api_calls() {
		let (tx, rx) = broadcast::channel(16);

		tx.send(request_event("r1", "https://site.test/api/users", 1.0)).unwrap();
		tx.send(response_event("r1", "application/json", 1.2)).unwrap();
		tx.send(request_event("r2", "https://site.test/app.js", 1.1)).unwrap();
		tx.send(response_event("r2", "application/javascript", 1.3)).unwrap();
		tx.send(request_event("r3", "https://cdn.other.test/data", 1.1)).unwrap();
		tx.send(response_event("r3", "application/json", 1.4)).unwrap();
		drop(tx);

		let traffic = await_settle(rx, SettleOptions::default()).await;
		assert_eq!(traffic.total_requests(), 3);

		let api = traffic.api_requests("https://site.test/index.html");
		assert_eq!(api.len(), 1);
		assert_eq!(api[0].url, "https://site.test/api/users");
	}

	#[test]
	fn api_like_predicate_rejects_assets_pages_and_foreign_hosts() {
		assert!(is_api_like("https://site.test/api/v1/users", "site.test", "application/json"));
		assert!(is_api_like("https://SITE.test/graphql", "site.test", "application/json"));

		// Wrong host.
		assert!(!is_api_like("https://other.test/api", "site.test", "application/json"));
		// Page/script/style/image MIME types.
		assert!(!is_api_like("https://site.test/page", "site.test", "text/html"));
		assert!(!is_api_like("https://site.test/bundle", "site.test", "application/javascript"));
		assert!(!is_api_like("https://site.test/style", "site.test", "text/css"));
		assert!(!is_api_like("https://site.test/pic", "site.test", "image/png"));
		// Static-asset extension despite an API-ish MIME type.
		assert!(!is_api_like("https://site.test/font.woff2", "site.test", "application/octet-stream"));
		// Malformed URL never classifies.
		assert!(!is_api_like("not a url", "site.test", "application/json"));
	}
}
