use std::io;
use std::sync::{Arc, Mutex};
use std::thread;

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use signal_hook::consts::SIGCHLD;
use signal_hook::iterator::Signals;

/// Table of live background pids, shared between the main loop (which
/// appends on spawn) and the reaper thread (which removes the finished).
///
/// SIGCHLD is not handled in signal context at all: signal-hook turns each
/// delivery into a message consumed by an ordinary thread, so the table is a
/// plain mutex-guarded vector and insertion cannot race a mid-scan handler.
#[derive(Clone)]
pub struct JobRegistry {
	pids: Arc<Mutex<Vec<Pid>>>,
}

impl JobRegistry {
	pub fn new() -> JobRegistry {
		JobRegistry { pids: Arc::new(Mutex::new(Vec::new())) }
	}

	/// Starts the reaper thread. Each SIGCHLD triggers one non-blocking scan
	/// of the table; a pid whose SIGCHLD fired before it was registered is
	/// picked up on the next delivery.
	pub fn start(&self) -> io::Result<()> {
		let mut signals = Signals::new([SIGCHLD])?;
		let pids = Arc::clone(&self.pids);
		thread::spawn(move || {
			for _ in signals.forever() {
				let mut pids = pids.lock().expect("job table poisoned");
				pids.retain(|&pid| still_running(pid));
			}
		});
		Ok(())
	}

	pub fn add(&self, pid: Pid) {
		self.pids.lock().expect("job table poisoned").push(pid);
	}

	pub fn len(&self) -> usize {
		self.pids.lock().expect("job table poisoned").len()
	}
}

fn still_running(pid: Pid) -> bool {
	match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
		Ok(WaitStatus::StillAlive) => true,
		Ok(_) => false,
		// already collected elsewhere, or never ours
		Err(Errno::ECHILD) => false,
		Err(_) => true,
	}
}
