use std::process::ExitCode;

use clap::Parser;

mod cli;
mod commands;
mod logging;
mod report;

use cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);
	commands::dispatch(cli).await
}
