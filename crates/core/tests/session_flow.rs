//! End-to-end session tests against an in-process fake debug endpoint.
//!
//! A tiny HTTP listener serves `/json/list` pointing at a tungstenite server
//! that answers protocol calls and injects a scripted network burst on
//! navigation, so the whole attach → navigate → settle → query → detail path
//! runs without a browser.

use futures_util::{SinkExt, StreamExt};
use netlens::query::TrafficQuery;
use netlens::session::{FetchedBody, Session, SessionState};
use netlens::{DEBUG_PORT, Error};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

const PAGE_URL: &str = "http://site.test/";

async fn spawn_fake_browser() -> u16 {
	let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let ws_port = ws_listener.local_addr().unwrap().port();

	tokio::spawn(async move {
		loop {
			let Ok((stream, _)) = ws_listener.accept().await else {
				break;
			};
			tokio::spawn(handle_cdp_socket(stream));
		}
	});

	let http_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let http_port = http_listener.local_addr().unwrap().port();

	tokio::spawn(async move {
		let body = json!([
			{
				"type": "background_page",
				"title": "extension",
				"url": "chrome-extension://x",
				"webSocketDebuggerUrl": format!("ws://127.0.0.1:{ws_port}/devtools/page/0")
			},
			{
				"type": "page",
				"title": "tab",
				"url": PAGE_URL,
				"webSocketDebuggerUrl": format!("ws://127.0.0.1:{ws_port}/devtools/page/1")
			}
		])
		.to_string();

		loop {
			let Ok((mut stream, _)) = http_listener.accept().await else {
				break;
			};
			let body = body.clone();
			tokio::spawn(async move {
				let mut buf = [0u8; 2048];
				let _ = stream.read(&mut buf).await;
				let response = format!("HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}", body.len());
				let _ = stream.write_all(response.as_bytes()).await;
			});
		}
	});

	http_port
}

async fn handle_cdp_socket(stream: tokio::net::TcpStream) {
	let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
	let (mut tx, mut rx) = ws.split();

	while let Some(Ok(message)) = rx.next().await {
		let Message::Text(text) = message else { continue };
		let call: Value = serde_json::from_str(&text).unwrap();
		let id = call["id"].as_u64().unwrap();
		let method = call["method"].as_str().unwrap_or_default();

		match method {
			"Fake.drop" => return,
			"Network.enable" => {
				// A request already in flight when instrumentation turns on:
				// the event arrives before the enable call resolves.
				tx.send(Message::Text(enable_time_event().to_string())).await.unwrap();
				tx.send(reply(id, json!({}))).await.unwrap();
			}
			"Page.navigate" => {
				tx.send(reply(id, json!({ "frameId": "F1" }))).await.unwrap();
				for event in navigation_burst() {
					tx.send(Message::Text(event.to_string())).await.unwrap();
				}
			}
			"Network.getResponseBody" => {
				if call["params"]["requestId"] == "r1" {
					tx.send(error_reply(id, "No data found for resource")).await.unwrap();
				} else {
					tx.send(reply(id, json!({ "body": "aGVsbG8=", "base64Encoded": true }))).await.unwrap();
				}
			}
			"Network.getRequestPostData" => {
				tx.send(reply(id, json!({ "postData": "a=1&b=2" }))).await.unwrap();
			}
			_ => tx.send(reply(id, json!({}))).await.unwrap(),
		}
	}
}

fn reply(id: u64, result: Value) -> Message {
	Message::Text(json!({ "id": id, "result": result }).to_string())
}

fn error_reply(id: u64, message: &str) -> Message {
	Message::Text(json!({ "id": id, "error": { "message": message } }).to_string())
}

fn enable_time_event() -> Value {
	json!({
		"method": "Network.requestWillBeSent",
		"params": {
			"requestId": "r0",
			"timestamp": 9.0,
			"request": { "url": "http://site.test/boot.js", "method": "GET", "headers": {} }
		}
	})
}

fn navigation_burst() -> Vec<Value> {
	vec![
		json!({
			"method": "Network.requestWillBeSent",
			"params": {
				"requestId": "r1",
				"timestamp": 10.0,
				"request": { "url": PAGE_URL, "method": "GET", "headers": {} }
			}
		}),
		json!({
			"method": "Network.responseReceived",
			"params": {
				"requestId": "r1",
				"timestamp": 10.2,
				"response": { "status": 200, "statusText": "OK", "headers": {}, "mimeType": "text/html" }
			}
		}),
		json!({
			"method": "Network.requestWillBeSent",
			"params": {
				"requestId": "r2",
				"timestamp": 10.3,
				"request": { "url": "http://site.test/api/items", "method": "POST", "headers": { "accept": "application/json" } }
			}
		}),
		json!({
			"method": "Network.responseReceived",
			"params": {
				"requestId": "r2",
				"timestamp": 10.6,
				"response": { "status": 201, "statusText": "Created", "headers": {}, "mimeType": "application/json" }
			}
		}),
	]
}

#[tokio::test]
async fn open_url_settles_and_summarizes_api_traffic() {
	let port = spawn_fake_browser().await;
	let mut session = Session::with_port(port);

	let summary = session.open_url(PAGE_URL).await.unwrap();
	assert_eq!(session.state(), SessionState::Attached);
	assert_eq!(summary.total_requests, 2);
	assert_eq!(summary.api_requests.len(), 1);
	assert_eq!(summary.api_requests[0].url, "http://site.test/api/items");
	assert_eq!(summary.api_requests[0].status, Some(201));
}

#[tokio::test]
async fn traffic_query_groups_accumulated_records() {
	let port = spawn_fake_browser().await;
	let mut session = Session::with_port(port);
	session.open_url(PAGE_URL).await.unwrap();

	// The navigation pair plus the request caught while enabling.
	let grouped = session.traffic(&TrafficQuery::default()).await.unwrap();
	assert_eq!(grouped.len(), 1);
	assert_eq!(grouped[0].0, "site.test");
	assert_eq!(grouped[0].1.len(), 3);

	// Status filter excludes the 200 page load and the pending-free set has no 500s.
	let none = session
		.traffic(&TrafficQuery {
			status: Some(500),
			..TrafficQuery::default()
		})
		.await
		.unwrap();
	assert!(none.is_empty());

	let posts = session
		.traffic(&TrafficQuery {
			method: Some("post".to_string()),
			..TrafficQuery::default()
		})
		.await
		.unwrap();
	assert_eq!(posts.len(), 1);
	assert_eq!(posts[0].1[0].request_id, "r2");
}

#[tokio::test]
async fn detail_fetches_bodies_best_effort() {
	let port = spawn_fake_browser().await;
	let mut session = Session::with_port(port);
	session.open_url(PAGE_URL).await.unwrap();

	// r2 is a POST without cached post data: both live fetches run.
	let detail = session.detail("r2").await.unwrap();
	assert_eq!(detail.record.method, "POST");
	match &detail.response_body {
		FetchedBody::Content(body) => assert_eq!(body, "hello"),
		other => panic!("expected decoded body, got {other:?}"),
	}
	match detail.request_body.as_ref().unwrap() {
		FetchedBody::Content(body) => assert_eq!(body, "a=1&b=2"),
		other => panic!("expected post data, got {other:?}"),
	}

	// r1's body fetch fails server-side; the detail degrades, not errors.
	let detail = session.detail("r1").await.unwrap();
	match &detail.response_body {
		FetchedBody::Unavailable(marker) => assert!(marker.contains("No data found")),
		other => panic!("expected unavailable marker, got {other:?}"),
	}
	// GET with no cached body requests nothing.
	assert!(detail.request_body.is_none());
}

#[tokio::test]
async fn detail_for_unknown_request_id_is_an_error() {
	let port = spawn_fake_browser().await;
	let mut session = Session::with_port(port);
	session.open_url(PAGE_URL).await.unwrap();

	let err = session.detail("nope").await.unwrap_err();
	assert!(matches!(err, Error::Detail(_)), "got {err:?}");
}

#[tokio::test]
async fn dropped_socket_is_detected_lazily_and_reattached() {
	let port = spawn_fake_browser().await;
	let mut session = Session::with_port(port);
	session.open_url(PAGE_URL).await.unwrap();
	assert_eq!(session.state(), SessionState::Attached);

	// Server hangs up without replying; the in-flight call surfaces the break.
	let conn = session.connection().await.unwrap();
	assert!(conn.call("Fake.drop", json!({})).await.is_err());
	tokio::time::sleep(std::time::Duration::from_millis(50)).await;
	assert_eq!(session.state(), SessionState::Stale);

	// Next use reconnects with a fresh record set: nothing from before the drop.
	let grouped = session.traffic(&TrafficQuery::default()).await.unwrap();
	assert_eq!(session.state(), SessionState::Attached);
	assert!(grouped.iter().flat_map(|(_, records)| records).all(|record| record.request_id != "r2"));
}

#[tokio::test]
async fn events_arriving_while_domains_enable_are_stored() {
	let port = spawn_fake_browser().await;
	let mut session = Session::with_port(port);

	// Attach without navigating; the only traffic is the in-flight request
	// surfaced during the Network.enable round-trip.
	session.connection().await.unwrap();
	tokio::time::sleep(std::time::Duration::from_millis(50)).await;

	let grouped = session.traffic(&TrafficQuery::default()).await.unwrap();
	assert_eq!(grouped.len(), 1);
	assert_eq!(grouped[0].1.len(), 1);
	assert_eq!(grouped[0].1[0].request_id, "r0");
	assert_eq!(grouped[0].1[0].url, "http://site.test/boot.js");
}

#[tokio::test]
async fn one_session_carries_records_from_navigate_to_query_to_detail() {
	let port = spawn_fake_browser().await;
	let mut session = Session::with_port(port);

	let summary = session.open_url(PAGE_URL).await.unwrap();
	let id = summary.api_requests[0].request_id.clone();

	let grouped = session.traffic(&TrafficQuery::default()).await.unwrap();
	assert!(grouped.iter().flat_map(|(_, records)| records).any(|record| record.request_id == id));

	let detail = session.detail(&id).await.unwrap();
	assert_eq!(detail.record.url, "http://site.test/api/items");

	// A separate session gets a separate store; nothing carries over, which is
	// why navigate-and-query must share one session.
	drop(session);
	let mut other = Session::with_port(port);
	let grouped = other.traffic(&TrafficQuery::default()).await.unwrap();
	assert!(grouped.iter().flat_map(|(_, records)| records).all(|record| record.request_id != id));
}

#[tokio::test]
async fn no_target_is_a_terminal_error() {
	// Endpoint with an empty target list.
	let http_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let port = http_listener.local_addr().unwrap().port();
	tokio::spawn(async move {
		loop {
			let Ok((mut stream, _)) = http_listener.accept().await else {
				break;
			};
			let mut buf = [0u8; 1024];
			let _ = stream.read(&mut buf).await;
			let _ = stream
				.write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 2\r\nConnection: close\r\n\r\n[]")
				.await;
		}
	});

	let mut session = Session::with_port(port);
	let err = session.traffic(&TrafficQuery::default()).await.unwrap_err();
	assert!(matches!(err, Error::Session(_)), "got {err:?}");
}

#[test]
fn debug_port_constant_matches_the_protocol_default() {
	assert_eq!(DEBUG_PORT, 9222);
}
