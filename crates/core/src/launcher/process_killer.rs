//! Best-effort cleanup of orphaned debug-mode browser processes.

use std::process::Command;
use std::time::Duration;

use tracing::debug;

/// Signals away whatever still holds `port`, then grants a fixed grace period.
///
/// Fire-and-forget: every failure is swallowed. Finding no orphan is the normal
/// case, not an error.
pub(super) async fn kill_orphans(port: u16) {
	let signalled = signal_port_holders(port);
	if signalled {
		debug!(target = "netlens.launch", port, "signalled orphaned debug process; waiting grace period");
		tokio::time::sleep(Duration::from_secs(1)).await;
	}
}

#[cfg(unix)]
fn signal_port_holders(port: u16) -> bool {
	let output = match Command::new("lsof").args(["-ti", &format!(":{port}")]).output() {
		Ok(output) => output,
		Err(e) => {
			debug!(target = "netlens.launch", error = %e, "lsof unavailable; skipping orphan cleanup");
			return false;
		}
	};

	if !output.status.success() || output.stdout.is_empty() {
		return false;
	}

	let mut signalled = false;
	for pid in String::from_utf8_lossy(&output.stdout).split_whitespace() {
		match Command::new("kill").args(["-TERM", pid]).status() {
			Ok(status) if status.success() => {
				debug!(target = "netlens.launch", pid, port, "sent SIGTERM to orphan");
				signalled = true;
			}
			Ok(_) => debug!(target = "netlens.launch", pid, "kill -TERM returned non-zero"),
			Err(e) => debug!(target = "netlens.launch", pid, error = %e, "failed to signal orphan"),
		}
	}
	signalled
}

#[cfg(windows)]
fn signal_port_holders(port: u16) -> bool {
	let output = match Command::new("netstat").args(["-ano"]).output() {
		Ok(output) => output,
		Err(e) => {
			debug!(target = "netlens.launch", error = %e, "netstat unavailable; skipping orphan cleanup");
			return false;
		}
	};

	let stdout = String::from_utf8_lossy(&output.stdout);
	let needle = format!(":{port}");
	let mut signalled = false;

	for line in stdout.lines() {
		if !(line.contains(&needle) && line.contains("LISTENING")) {
			continue;
		}
		let Some(pid) = line.split_whitespace().last() else {
			continue;
		};
		if Command::new("taskkill")
			.args(["/PID", pid, "/F"])
			.status()
			.map(|s| s.success())
			.unwrap_or(false)
		{
			debug!(target = "netlens.launch", pid, port, "killed orphan");
			signalled = true;
		}
	}
	signalled
}

#[cfg(not(any(unix, windows)))]
fn signal_port_holders(_port: u16) -> bool {
	false
}
