mod builtin;
mod eval;
mod global;
mod job;
mod parser;
mod types;

use std::env;
use std::process;

use argh::FromArgs;
use nix::sys::signal::{signal, SigHandler, Signal};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::global::State;
use crate::job::JobRegistry;

const PROMPT: &str = "sish$ ";

/// sish: a simple shell.
#[derive(FromArgs)]
struct Options {
	/// print each pipeline stage before executing it
	#[argh(switch, short = 'x')]
	trace: bool,
	/// execute a single command line and exit with its status
	#[argh(option, short = 'c')]
	command: Option<String>,
}

/// Parses, validates, and runs one line. `None` means there is no status to
/// record: a blank line, or a line rejected before execution.
fn run_line(state: &mut State, line: &str, tracing: bool) -> Option<i32> {
	let mut pipeline = match parser::parse(line) {
		Ok(pipeline) => pipeline,
		Err(e) => {
			eprintln!("{}", e);
			return None;
		},
	};
	if pipeline.stages.is_empty() {
		return None;
	}
	if let Err(e) = parser::validate(&pipeline) {
		eprintln!("{}", e);
		return None;
	}
	Some(eval::run(state, &mut pipeline, tracing))
}

fn main() {
	let options: Options = argh::from_env();

	// Ctrl-C is for the foreground job, never for the shell itself
	unsafe {
		let _ = signal(Signal::SIGINT, SigHandler::SigIgn);
	}

	let jobs = JobRegistry::new();
	if let Err(e) = jobs.start() {
		eprintln!("sish: cannot start job reaper: {}", e);
	}

	let shell_path = env::current_exe()
		.map(|path| path.to_string_lossy().into_owned())
		.unwrap_or_else(|_| String::from("sish"));
	env::set_var("SHELL", shell_path);

	let mut state = State::new(jobs);

	if let Some(line) = options.command {
		process::exit(run_line(&mut state, &line, options.trace).unwrap_or(1));
	}

	let mut editor = match DefaultEditor::new() {
		Ok(editor) => editor,
		Err(e) => {
			eprintln!("sish: {}", e);
			process::exit(1);
		},
	};
	loop {
		match editor.readline(PROMPT) {
			Ok(line) => {
				let _ = editor.add_history_entry(line.as_str());
				if let Some(status) = run_line(&mut state, &line, options.trace) {
					state.last_status = status;
				}
			},
			Err(ReadlineError::Interrupted) => continue,
			Err(ReadlineError::Eof) => break,
			Err(e) => {
				eprintln!("sish: {}", e);
				break;
			},
		}
	}
	process::exit(state.last_status);
}
