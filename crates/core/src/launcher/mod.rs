//! Debuggable-browser process bring-up.
//!
//! Idempotent: a reachable debug endpoint with at least one target short-circuits
//! to "already running"; otherwise any orphaned debug-mode process on the port is
//! signalled away best-effort, a fresh browser is spawned with an isolated
//! profile and stability flags, and the endpoint is polled until reachable or the
//! bounded ceiling expires.

mod browser_finder;
mod process_killer;

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::DEBUG_PORT;
use crate::cdp::fetch_targets;
use crate::error::ProcessError;

pub use browser_finder::find_browser_executable;

/// How the supervisor should bring the browser up.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
	pub port: u16,
	/// Profile directory; a fresh temp path per launch when absent.
	pub user_data_dir: Option<PathBuf>,
	pub headless: bool,
	/// Explicit executable, bypassing platform discovery.
	pub executable: Option<PathBuf>,
	pub poll_attempts: u32,
	pub poll_interval: Duration,
}

impl Default for LaunchConfig {
	fn default() -> Self {
		Self {
			port: DEBUG_PORT,
			user_data_dir: None,
			headless: false,
			executable: None,
			poll_attempts: 15,
			poll_interval: Duration::from_millis(500),
		}
	}
}

/// Result of [`ensure_browser`].
#[derive(Debug, Clone)]
pub struct LaunchOutcome {
	pub already_running: bool,
	pub target_count: usize,
	/// Pid of the process spawned by this call; `None` when reusing.
	pub pid: Option<u32>,
	/// Profile directory of the spawned process; `None` when reusing.
	pub user_data_dir: Option<PathBuf>,
}

/// Ensures a debuggable browser is reachable on `config.port`, launching one if
/// needed. Never double-launches.
pub async fn ensure_browser(config: &LaunchConfig) -> Result<LaunchOutcome, ProcessError> {
	if let Ok(targets) = fetch_targets(config.port).await {
		if !targets.is_empty() {
			debug!(target = "netlens.launch", port = config.port, targets = targets.len(), "debug endpoint already up");
			return Ok(LaunchOutcome {
				already_running: true,
				target_count: targets.len(),
				pid: None,
				user_data_dir: None,
			});
		}
	}

	// A dead endpoint with a process still holding the port blocks relaunch.
	process_killer::kill_orphans(config.port).await;

	let executable = match &config.executable {
		Some(path) => path.clone(),
		None => find_browser_executable().ok_or(ProcessError::NoBrowser)?,
	};
	let profile_dir = resolve_profile_dir(config.user_data_dir.clone())?;
	let args = launch_args(config.port, &profile_dir, config.headless);

	info!(
		target = "netlens.launch",
		executable = %executable.display(),
		port = config.port,
		headless = config.headless,
		"spawning browser"
	);

	let mut command = Command::new(&executable);
	command.args(&args).stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

	#[cfg(unix)]
	std::os::unix::process::CommandExt::process_group(&mut command, 0);

	let mut child = command.spawn().map_err(|source| ProcessError::SpawnFailed {
		path: executable.display().to_string(),
		source,
	})?;
	let pid = child.id();

	for _ in 0..config.poll_attempts {
		tokio::time::sleep(config.poll_interval).await;

		if let Ok(Some(status)) = child.try_wait() {
			return Err(ProcessError::ExitedEarly { status: status.to_string() });
		}

		match fetch_targets(config.port).await {
			Ok(targets) => {
				info!(target = "netlens.launch", pid, targets = targets.len(), "debug endpoint reachable");
				return Ok(LaunchOutcome {
					already_running: false,
					target_count: targets.len(),
					pid: Some(pid),
					user_data_dir: Some(profile_dir),
				});
			}
			Err(e) => debug!(target = "netlens.launch", error = %e, "endpoint not ready"),
		}
	}

	warn!(target = "netlens.launch", pid, "startup ceiling hit; killing spawned browser");
	let _ = child.kill();
	let _ = child.wait();

	Err(ProcessError::StartupTimeout {
		port: config.port,
		waited_ms: config.poll_interval.as_millis() as u64 * u64::from(config.poll_attempts),
	})
}

fn resolve_profile_dir(user_data_dir: Option<PathBuf>) -> Result<PathBuf, ProcessError> {
	let dir = user_data_dir.unwrap_or_else(|| {
		let stamp = std::time::SystemTime::now()
			.duration_since(std::time::UNIX_EPOCH)
			.map(|d| d.as_millis())
			.unwrap_or_default();
		std::env::temp_dir().join(format!("netlens-profile-{}-{stamp}", std::process::id()))
	});

	std::fs::create_dir_all(&dir).map_err(|source| ProcessError::SpawnFailed {
		path: dir.display().to_string(),
		source,
	})?;
	Ok(dir)
}

/// Fixed flag set: remote debugging, isolated profile, and the throttling /
/// backgrounding features that would otherwise pause network activity in
/// unfocused or occluded windows.
fn launch_args(port: u16, profile_dir: &std::path::Path, headless: bool) -> Vec<String> {
	let mut args = vec![
		format!("--remote-debugging-port={port}"),
		format!("--user-data-dir={}", profile_dir.display()),
		"--no-first-run".to_string(),
		"--no-default-browser-check".to_string(),
		"--disable-background-timer-throttling".to_string(),
		"--disable-backgrounding-occluded-windows".to_string(),
		"--disable-renderer-backgrounding".to_string(),
	];

	if headless {
		args.push("--headless=new".to_string());
		args.push("--disable-gpu".to_string());
	}

	args
}
