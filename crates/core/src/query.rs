//! Read-only filter/sort/limit/group views over record snapshots.

use regex_lite::Regex;

use crate::store::NetworkRecord;

/// Bucket name for records whose URL fails to parse.
pub const INVALID_URL_BUCKET: &str = "invalid-url";

const DEFAULT_LIMIT: usize = 50;

/// Filter/sort/paginate parameters for a traffic query.
#[derive(Debug, Clone)]
pub struct TrafficQuery {
	/// Wildcard pattern (`*` matches anything), case-insensitive, unanchored.
	pub url_filter: Option<String>,
	/// Method equality, case-insensitive.
	pub method: Option<String>,
	/// Exact status equality; pending records never match a status filter.
	pub status: Option<u16>,
	pub limit: usize,
}

impl Default for TrafficQuery {
	fn default() -> Self {
		Self {
			url_filter: None,
			method: None,
			status: None,
			limit: DEFAULT_LIMIT,
		}
	}
}

/// Filters, sorts most-recent-first, and truncates a snapshot.
///
/// Empty results are not errors; an unusable wildcard pattern degrades to
/// matching nothing rather than failing the query.
pub fn run_query(snapshot: Vec<NetworkRecord>, query: &TrafficQuery) -> Vec<NetworkRecord> {
	let url_regex = query.url_filter.as_deref().map(compile_wildcard);

	let mut records: Vec<NetworkRecord> = snapshot
		.into_iter()
		.filter(|record| match &url_regex {
			Some(Some(regex)) => regex.is_match(&record.url),
			Some(None) => false,
			None => true,
		})
		.filter(|record| {
			query
				.method
				.as_deref()
				.is_none_or(|method| record.method.eq_ignore_ascii_case(method))
		})
		.filter(|record| {
			query
				.status
				.is_none_or(|status| record.response.as_ref().is_some_and(|response| response.status == status))
		})
		.collect();

	records.sort_by(|a, b| b.sort_timestamp().total_cmp(&a.sort_timestamp()));
	records.truncate(query.limit);
	records
}

/// Partitions records by URL hostname for display.
///
/// Buckets are ordered by descending member count; within a bucket the incoming
/// (post-sort) order is preserved. Unparseable URLs all land in the single
/// [`INVALID_URL_BUCKET`].
pub fn group_by_host(records: Vec<NetworkRecord>) -> Vec<(String, Vec<NetworkRecord>)> {
	let mut buckets: Vec<(String, Vec<NetworkRecord>)> = Vec::new();

	for record in records {
		let host = url::Url::parse(&record.url)
			.ok()
			.and_then(|u| u.host_str().map(str::to_string))
			.unwrap_or_else(|| INVALID_URL_BUCKET.to_string());

		match buckets.iter_mut().find(|(name, _)| *name == host) {
			Some((_, members)) => members.push(record),
			None => buckets.push((host, vec![record])),
		}
	}

	// Stable sort keeps first-seen order among equal-sized buckets.
	buckets.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
	buckets
}

/// Compiles a `*`-wildcard into a case-insensitive, unanchored regex.
///
/// Everything except `*` is matched literally. `None` only if the built pattern
/// is somehow rejected, which callers treat as match-nothing.
fn compile_wildcard(pattern: &str) -> Option<Regex> {
	let mut built = String::with_capacity(pattern.len() + 8);
	built.push_str("(?i)");
	for ch in pattern.chars() {
		match ch {
			'*' => built.push_str(".*"),
			c if "\\.+?()[]{}|^$".contains(c) => {
				built.push('\\');
				built.push(c);
			}
			c => built.push(c),
		}
	}
	Regex::new(&built).ok()
}
