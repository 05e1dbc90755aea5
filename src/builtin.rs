use std::env;
use std::path::PathBuf;
use std::process;

use nix::unistd;

use crate::global::State;

pub type Builtin = fn(&mut State, &[String]) -> i32;

/// Builtins run in-process, without forking, and never touch process groups
/// or the terminal. The engine consults this table only for single-stage
/// pipelines.
pub fn match_builtin(name: &str) -> Option<Builtin> {
	match name {
		"cd" => Some(builtin_cd),
		"echo" => Some(builtin_echo),
		"exit" => Some(builtin_exit),
		_ => None,
	}
}

fn home_directory() -> Option<PathBuf> {
	if let Some(home) = env::var_os("HOME") {
		return Some(PathBuf::from(home));
	}
	// HOME unset: fall back to the password database
	match unistd::User::from_uid(unistd::getuid()) {
		Ok(Some(user)) => Some(user.dir),
		Ok(None) | Err(_) => None,
	}
}

fn builtin_cd(_: &mut State, args: &[String]) -> i32 {
	let target = match args.first() {
		Some(dir) => PathBuf::from(dir),
		None => match home_directory() {
			Some(home) => home,
			None => {
				eprintln!("cd: cannot determine home directory");
				return 1;
			},
		},
	};
	if let Err(e) = env::set_current_dir(&target) {
		eprintln!("cd: {}: {}", target.display(), e);
		return 1;
	}
	0
}

fn builtin_echo(state: &mut State, args: &[String]) -> i32 {
	let Some(arg) = args.first() else {
		eprintln!("echo: missing argument");
		return 1;
	};
	match arg.as_str() {
		"$$" => println!("{}", unistd::getpid()),
		"$?" => println!("{}", state.last_status),
		other => println!("{}", other),
	}
	0
}

fn builtin_exit(state: &mut State, _: &[String]) -> i32 {
	process::exit(state.last_status)
}
