//! Text and JSON rendering of command results.
//!
//! Engine errors are rendered as descriptive results too: the caller never sees
//! a panic or a bare abort, only a report and a non-zero exit code.

use std::fmt::Write as _;

use netlens::session::{FetchedBody, PageLoadSummary, RecordDetail, SessionInfo};
use netlens::store::NetworkRecord;
use serde_json::json;

use crate::cli::OutputFormat;

pub fn print_session_info(info: &SessionInfo, format: OutputFormat) {
	match format {
		OutputFormat::Json => print_json(&json!({ "ok": true, "session": info })),
		OutputFormat::Text => {
			let mut out = String::new();
			if info.already_running {
				let _ = writeln!(out, "Reusing debuggable browser on port {} ({} targets)", info.port, info.target_count);
			} else {
				let _ = writeln!(out, "Browser launched on port {} ({} targets)", info.port, info.target_count);
			}
			if let Some(pid) = info.pid {
				let _ = writeln!(out, "  pid: {pid}");
			}
			if let Some(dir) = &info.user_data_dir {
				let _ = writeln!(out, "  profile: {}", dir.display());
			}
			print!("{out}");
		}
	}
}

pub fn print_page_summary(summary: &PageLoadSummary, format: OutputFormat) {
	match format {
		OutputFormat::Json => print_json(&json!({ "ok": true, "page": summary })),
		OutputFormat::Text => {
			println!("Loaded {} — {} requests captured", summary.url, summary.total_requests);
			if summary.api_requests.is_empty() {
				println!("No same-domain API requests observed");
				return;
			}
			println!("API requests ({}):", summary.api_requests.len());
			for call in &summary.api_requests {
				let status = call.status.map(|s| s.to_string()).unwrap_or_else(|| "pending".to_string());
				println!("  [{status}] {} {}  id={}", call.method, call.url, call.request_id);
			}
		}
	}
}

pub fn print_traffic(grouped: &[(String, Vec<NetworkRecord>)], format: OutputFormat) {
	match format {
		OutputFormat::Json => {
			let domains: Vec<_> = grouped
				.iter()
				.map(|(host, records)| json!({ "host": host, "count": records.len(), "records": records }))
				.collect();
			print_json(&json!({ "ok": true, "domains": domains }));
		}
		OutputFormat::Text => {
			let total: usize = grouped.iter().map(|(_, records)| records.len()).sum();
			if total == 0 {
				println!("No matching requests captured");
				return;
			}
			println!("{total} request(s) across {} domain(s)", grouped.len());
			for (host, records) in grouped {
				println!("\n{host} ({})", records.len());
				for record in records {
					println!("  {}", record_line(record));
				}
			}
		}
	}
}

pub fn print_detail(detail: &RecordDetail, include_headers: bool, format: OutputFormat) {
	match format {
		OutputFormat::Json => {
			let mut value = json!({ "ok": true, "detail": detail });
			if !include_headers {
				if let Some(record) = value.pointer_mut("/detail/record").and_then(|r| r.as_object_mut()) {
					record.remove("requestHeaders");
				}
			}
			print_json(&value);
		}
		OutputFormat::Text => {
			let record = &detail.record;
			println!("Request {}", record.request_id);
			println!("  {} {}", record.method, record.url);
			match &record.response {
				Some(response) => {
					let mime = if response.mime_type.is_empty() { String::new() } else { format!(" ({})", response.mime_type) };
					println!("  Status: {} {}{mime}", response.status, response.status_text);
				}
				None => println!("  Status: pending"),
			}
			if include_headers && !record.request_headers.is_empty() {
				println!("  Request headers:");
				let mut names: Vec<_> = record.request_headers.keys().collect();
				names.sort();
				for name in names {
					println!("    {name}: {}", record.request_headers[name]);
				}
			}
			if let Some(body) = &detail.request_body {
				println!("  Request body:");
				println!("{}", indent(body_text(body), 4));
			}
			println!("  Response body:");
			println!("{}", indent(body_text(&detail.response_body), 4));
		}
	}
}

pub fn print_error(error: &netlens::Error, format: OutputFormat) {
	match format {
		OutputFormat::Json => print_json(&json!({ "ok": false, "error": error.to_string() })),
		OutputFormat::Text => println!("Error: {error}"),
	}
}

fn record_line(record: &NetworkRecord) -> String {
	let status = record
		.response
		.as_ref()
		.map(|r| r.status.to_string())
		.unwrap_or_else(|| "pending".to_string());
	format!("[{status}] {} {}  id={}", record.method, record.url, record.request_id)
}

fn body_text(body: &FetchedBody) -> &str {
	match body {
		FetchedBody::Content(content) if content.is_empty() => "(empty)",
		FetchedBody::Content(content) => content,
		FetchedBody::Unavailable(marker) => marker,
	}
}

fn indent(text: &str, spaces: usize) -> String {
	let pad = " ".repeat(spaces);
	text.lines().map(|line| format!("{pad}{line}")).collect::<Vec<_>>().join("\n")
}

fn print_json(value: &serde_json::Value) {
	if let Ok(rendered) = serde_json::to_string_pretty(value) {
		println!("{rendered}");
	}
}
