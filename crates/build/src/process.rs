//! Child process execution with a deadline.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub(crate) struct Captured {
	pub status: ExitStatus,
	/// stderr followed by stdout.
	pub output: String,
}

pub(crate) enum RunError {
	Spawn(std::io::Error),
	Wait(std::io::Error),
	Timeout,
}

/// Runs `cmd` to completion, killing it once `timeout` elapses.
///
/// On unix the child leads its own process group, and a timeout kills the
/// whole group so `cc1` or `ld` cannot outlive the driver. The output readers
/// are detached rather than joined.
pub(crate) fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<Captured, RunError> {
	cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
	#[cfg(unix)]
	{
		use std::os::unix::process::CommandExt;
		cmd.process_group(0);
	}
	let mut child = cmd.spawn().map_err(RunError::Spawn)?;

	let stdout = child.stdout.take().map(spawn_reader);
	let stderr = child.stderr.take().map(spawn_reader);

	let deadline = Instant::now() + timeout;
	let status = loop {
		match child.try_wait() {
			Ok(Some(status)) => break status,
			Ok(None) if Instant::now() >= deadline => {
				kill(&mut child);
				return Err(RunError::Timeout);
			}
			Ok(None) => thread::sleep(POLL_INTERVAL),
			Err(e) => {
				kill(&mut child);
				return Err(RunError::Wait(e));
			}
		}
	};

	let mut output = join_reader(stderr);
	let stdout = join_reader(stdout);
	if !stdout.is_empty() {
		if !output.is_empty() && !output.ends_with('\n') {
			output.push('\n');
		}
		output.push_str(&stdout);
	}

	Ok(Captured { status, output })
}

fn spawn_reader(mut stream: impl Read + Send + 'static) -> JoinHandle<String> {
	thread::spawn(move || {
		let mut buf = Vec::new();
		let _ = stream.read_to_end(&mut buf);
		String::from_utf8_lossy(&buf).into_owned()
	})
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
	handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn kill(child: &mut Child) {
	#[cfg(unix)]
	{
		use rustix::process::{Pid, Signal, kill_process_group};
		if let Some(group) = Pid::from_raw(child.id() as i32) {
			let _ = kill_process_group(group, Signal::KILL);
		}
	}
	let _ = child.kill();
	let _ = child.wait();
}
