use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

pub fn init_logging(verbose: u8) {
	// RUST_LOG overrides; otherwise the -v flag sets the level.
	let default_level = match verbose {
		0 => "warn",
		1 => "debug",
		_ => "trace",
	};
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

	// Logs go to stderr so report output on stdout stays clean.
	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}
