use std::ffi::CString;
use std::fs;
use std::io::{self, IsTerminal};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};
use thiserror::Error;

use crate::builtin;
use crate::global::State;
use crate::types::*;

/// Runs a validated, non-empty pipeline and reports its exit status: the
/// last stage's exit code, 128 + signal number if that stage was killed, 0
/// right away for a background pipeline.
pub fn run(state: &mut State, pipeline: &mut Pipeline, tracing: bool) -> i32 {
	assert!(!pipeline.stages.is_empty());

	if tracing {
		for stage in &pipeline.stages {
			eprintln!("+ {}", stage.argv.join(" "));
		}
	}

	if pipeline.stages.len() == 1 {
		if let Some(builtin) = builtin::match_builtin(&pipeline.stages[0].argv[0]) {
			return builtin(state, &pipeline.stages[0].argv[1..]);
		}
	}

	spawn_pipeline(state, pipeline)
}

fn open_input(path: &str) -> Option<OwnedFd> {
	match fs::File::open(path) {
		Ok(file) => Some(OwnedFd::from(file)),
		Err(e) => {
			eprintln!("{}: {}", path, e);
			None
		},
	}
}

// `>` overwrites in place rather than truncating; `>>` adds O_APPEND.
fn open_output(path: &str, mode: OutputMode) -> Option<OwnedFd> {
	let mut options = fs::OpenOptions::new();
	options.write(true).create(true).mode(0o644);
	if mode == OutputMode::Append {
		options.append(true);
	}
	match options.open(path) {
		Ok(file) => Some(OwnedFd::from(file)),
		Err(e) => {
			eprintln!("{}: {}", path, e);
			None
		},
	}
}

fn spawn_pipeline(state: &mut State, pipeline: &mut Pipeline) -> i32 {
	let n = pipeline.stages.len();
	let background = pipeline.background;
	// read end of the pipe created by the previous stage
	let mut carried: Option<OwnedFd> = None;
	let mut pgid: Option<Pid> = None;

	for i in 0..n {
		let infd = match &pipeline.stages[i].input {
			Input::Default => None,
			Input::Pipe => carried.take(),
			Input::File(path) => match open_input(path) {
				Some(fd) => Some(fd),
				None => continue, // skip this stage, keep the pipeline going
			},
		};
		let outfd = match &pipeline.stages[i].output {
			Output::Default => None,
			// O_CLOEXEC on both ends: exec drops every copy except the
			// dup2'd stdin/stdout, so no end leaks past the handoff.
			Output::Pipe => match unistd::pipe2(OFlag::O_CLOEXEC) {
				Ok((read, write)) => {
					carried = Some(read);
					Some(write)
				},
				Err(e) => {
					eprintln!("pipe: {}", e);
					break; // spawned stages are still waited on below
				},
			},
			Output::File(path, mode) => match open_output(path, *mode) {
				Some(fd) => Some(fd),
				None => continue,
			},
		};

		let pid = match unsafe { unistd::fork() } {
			Ok(ForkResult::Child) => exec_stage(&pipeline.stages[i], pgid, infd, outfd),
			Ok(ForkResult::Parent { child }) => child,
			Err(e) => {
				eprintln!("fork: {}", e);
				return 1;
			},
		};
		pipeline.stages[i].pid = Some(pid);

		// Mirror the child's setpgid so the group exists before any
		// tcsetpgrp, whichever side runs first.
		match pgid {
			Some(group) => {
				let _ = unistd::setpgid(pid, group);
			},
			None => {
				pgid = Some(pid);
				let _ = unistd::setpgid(pid, pid);
				if !background && io::stdout().is_terminal() {
					// hand the terminal to the job so Ctrl-C and Ctrl-Z
					// reach it instead of the shell
					if let Err(e) = unistd::tcsetpgrp(io::stdout(), pid) {
						eprintln!("tcsetpgrp: {}", e);
					}
				}
			},
		}

		if background {
			state.jobs.add(pid);
		}
		// parent's copies of infd/outfd close here
	}
	drop(carried);

	if background {
		return 0;
	}

	let mut status = 0;
	for (i, stage) in pipeline.stages.iter().enumerate() {
		let Some(pid) = stage.pid else { continue };
		match waitpid(pid, None) {
			Ok(result) => {
				let code = match result {
					WaitStatus::Exited(_, code) => code,
					WaitStatus::Signaled(_, sig, _) => 128 + sig as i32,
					_ => 1,
				};
				if i == n - 1 {
					status = code;
				}
			},
			Err(e) => eprintln!("waitpid: {}", e),
		}
	}

	if pgid.is_some() && io::stdout().is_terminal() {
		// reclaiming the terminal from a non-foreground group raises
		// SIGTTOU, so hold it off for the duration of the call
		unsafe {
			let _ = signal(Signal::SIGTTOU, SigHandler::SigIgn);
		}
		if let Err(e) = unistd::tcsetpgrp(io::stdout(), unistd::getpgrp()) {
			eprintln!("tcsetpgrp: {}", e);
		}
		unsafe {
			let _ = signal(Signal::SIGTTOU, SigHandler::SigDfl);
		}
	}

	status
}

#[derive(Debug, Error)]
enum SpawnError {
	#[error("{0}")]
	Sys(#[from] Errno),
	#[error("nul byte in argument")]
	Nul(#[from] std::ffi::NulError),
}

fn exec_stage(stage: &Command, pgid: Option<Pid>, infd: Option<OwnedFd>, outfd: Option<OwnedFd>) -> ! {
	let status = do_exec(stage, pgid, infd, outfd).unwrap_or_else(|e| {
		eprintln!("{}: {}", stage.argv[0], e);
		127
	});
	unsafe { libc::_exit(status) }
}

fn do_exec(stage: &Command, pgid: Option<Pid>, infd: Option<OwnedFd>, outfd: Option<OwnedFd>) -> Result<i32, SpawnError> {
	// the shell ignores SIGINT; the job must not
	unsafe {
		let _ = signal(Signal::SIGINT, SigHandler::SigDfl);
	}
	let zero = Pid::from_raw(0);
	let _ = unistd::setpgid(zero, pgid.unwrap_or(zero));

	if let Some(fd) = &infd {
		unistd::dup2(fd.as_raw_fd(), libc::STDIN_FILENO)?;
	}
	if let Some(fd) = &outfd {
		unistd::dup2(fd.as_raw_fd(), libc::STDOUT_FILENO)?;
	}

	let argv = stage.argv.iter()
		.map(|arg| CString::new(arg.as_str()))
		.collect::<Result<Vec<CString>, _>>()?;
	match unistd::execvp(&argv[0], &argv) {
		Err(Errno::ENOENT) => {
			eprintln!("{}: command not found", stage.argv[0]);
			Ok(127)
		},
		Err(e) => {
			eprintln!("{}: {}", stage.argv[0], e);
			Ok(127)
		},
		Ok(infallible) => match infallible {},
	}
}
