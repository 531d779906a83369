//! Command dispatch: one `Session` per invocation drives the requested
//! operations and renders the results; engine errors become reports, never
//! aborts.
//!
//! The record set lives and dies with the invocation's session, so the
//! accumulated-traffic queries run inside the invocation that captured the
//! traffic: `open` with query flags for the scripted path, the `inspect`
//! shell for everything else.

use std::process::ExitCode;

use clap::Parser;
use netlens::query::TrafficQuery;
use netlens::session::{Session, StartOptions};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::cli::{Cli, Commands, OutputFormat, ShellCommand, ShellLine};
use crate::report;

pub async fn dispatch(cli: Cli) -> ExitCode {
	let format = cli.format;
	match run(cli.command, format).await {
		Ok(()) => ExitCode::SUCCESS,
		Err(error) => {
			report::print_error(&error, format);
			ExitCode::FAILURE
		}
	}
}

async fn run(command: Commands, format: OutputFormat) -> netlens::Result<()> {
	let mut session = Session::new();

	match command {
		Commands::Start { user_data_dir, headless } => {
			let info = session.start(StartOptions { user_data_dir, headless }).await?;
			report::print_session_info(&info, format);
		}
		Commands::Open { url, filter, method, status, limit } => {
			ensure_started(&mut session).await?;
			let summary = session.open_url(&url).await?;
			report::print_page_summary(&summary, format);

			if filter.is_some() || method.is_some() || status.is_some() || limit.is_some() {
				let mut query = TrafficQuery {
					url_filter: filter,
					method,
					status,
					..TrafficQuery::default()
				};
				if let Some(limit) = limit {
					query.limit = limit;
				}
				let grouped = session.traffic(&query).await?;
				report::print_traffic(&grouped, format);
			}
		}
		Commands::Inspect => {
			ensure_started(&mut session).await?;
			shell(&mut session, format).await;
		}
	}

	Ok(())
}

/// Every traffic-facing command is self-contained: bring the browser up first
/// (a no-op when it already is), then attach on demand.
async fn ensure_started(session: &mut Session) -> netlens::Result<()> {
	let info = session.start(StartOptions::default()).await?;
	if !info.already_running {
		info!(target = "netlens", pid = info.pid, "launched browser for this command");
	}
	Ok(())
}

/// Reads shell lines from stdin until `quit` or end of input. Every inner
/// command runs against the same session, so `traffic` and `detail` see the
/// records accumulated by earlier `open`s. Operation failures are reported and
/// the loop continues.
async fn shell(session: &mut Session, format: OutputFormat) {
	let mut lines = BufReader::new(tokio::io::stdin()).lines();

	print_prompt(format);
	while let Ok(Some(line)) = lines.next_line().await {
		let words: Vec<&str> = line.split_whitespace().collect();
		if words.is_empty() {
			print_prompt(format);
			continue;
		}

		match ShellLine::try_parse_from(&words) {
			Ok(ShellLine { command: ShellCommand::Quit }) => break,
			Ok(ShellLine { command }) => {
				if let Err(error) = exec(session, command, format).await {
					report::print_error(&error, format);
				}
			}
			// Unknown commands and `help` both render through clap.
			Err(parse_error) => {
				let _ = parse_error.print();
			}
		}
		print_prompt(format);
	}
}

async fn exec(session: &mut Session, command: ShellCommand, format: OutputFormat) -> netlens::Result<()> {
	match command {
		ShellCommand::Open { url } => {
			let summary = session.open_url(&url).await?;
			report::print_page_summary(&summary, format);
		}
		ShellCommand::Traffic { filter, method, status, limit } => {
			let query = TrafficQuery {
				url_filter: filter,
				method,
				status,
				limit,
			};
			let grouped = session.traffic(&query).await?;
			report::print_traffic(&grouped, format);
		}
		ShellCommand::Detail { request_id, headers } => {
			let detail = session.detail(&request_id).await?;
			report::print_detail(&detail, headers, format);
		}
		ShellCommand::Quit => {}
	}
	Ok(())
}

fn print_prompt(format: OutputFormat) {
	// JSON mode implies a scripted reader; no prompt noise in the stream.
	if format == OutputFormat::Text {
		use std::io::Write;
		print!("netlens> ");
		let _ = std::io::stdout().flush();
	}
}
