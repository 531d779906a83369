use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Output format for command results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
	/// Human-readable text
	#[default]
	Text,
	/// JSON payload
	Json,
}

#[derive(Parser, Debug)]
#[command(name = "netlens")]
#[command(about = "Inspect browser network traffic over the remote-debugging protocol")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v debug, -vv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format
	#[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
	pub format: OutputFormat,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Launch or attach to a debuggable browser on port 9222
	Start {
		/// Profile directory (fresh temp path per launch when omitted)
		#[arg(long, value_name = "DIR")]
		user_data_dir: Option<PathBuf>,

		/// Run the browser headless
		#[arg(long)]
		headless: bool,
	},

	/// Navigate to a URL, wait for network activity to settle, and optionally
	/// query the traffic it captured
	#[command(alias = "nav")]
	Open {
		url: String,

		/// URL wildcard filter; any query flag appends a traffic report
		#[arg(short, long, value_name = "PATTERN")]
		filter: Option<String>,

		/// HTTP method filter (case-insensitive)
		#[arg(short, long, value_name = "METHOD")]
		method: Option<String>,

		/// Exact status code filter (pending requests never match)
		#[arg(short, long, value_name = "CODE")]
		status: Option<u16>,

		/// Maximum records returned (default 50)
		#[arg(short, long, value_name = "N")]
		limit: Option<usize>,
	},

	/// Interactive session: open, traffic and detail share one live record set
	#[command(alias = "shell")]
	Inspect,
}

/// One line of the interactive `inspect` session.
#[derive(Parser, Debug)]
#[command(multicall = true)]
pub struct ShellLine {
	#[command(subcommand)]
	pub command: ShellCommand,
}

#[derive(Subcommand, Debug)]
pub enum ShellCommand {
	/// Navigate to a URL and wait for network activity to settle
	#[command(alias = "nav")]
	Open { url: String },

	/// Query the accumulated records, grouped by domain
	#[command(alias = "tr")]
	Traffic {
		/// URL wildcard filter (* matches anything, case-insensitive)
		#[arg(short, long, value_name = "PATTERN")]
		filter: Option<String>,

		/// HTTP method filter (case-insensitive)
		#[arg(short, long, value_name = "METHOD")]
		method: Option<String>,

		/// Exact status code filter (pending requests never match)
		#[arg(short, long, value_name = "CODE")]
		status: Option<u16>,

		/// Maximum records returned
		#[arg(short, long, default_value = "50")]
		limit: usize,
	},

	/// Full detail for one captured request, bodies fetched live
	#[command(alias = "det")]
	Detail {
		/// Protocol request id as shown by `traffic`
		request_id: String,

		/// Include request headers in the report
		#[arg(long)]
		headers: bool,
	},

	/// Leave the session; the record set dies with it
	#[command(alias = "exit")]
	Quit,
}
