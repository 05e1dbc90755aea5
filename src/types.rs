use nix::unistd::Pid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode { Truncate, Append }

/// Where a stage reads its stdin from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
	Default,
	Pipe,
	File(String),
}

/// Where a stage sends its stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
	Default,
	Pipe,
	File(String, OutputMode),
}

/// One stage of a pipeline. `pid` is set when the stage is forked; builtins
/// and skipped stages never get one.
#[derive(Debug)]
pub struct Command {
	pub argv: Vec<String>,
	pub input: Input,
	pub output: Output,
	pub pid: Option<Pid>,
}

impl Command {
	pub fn new(input: Input) -> Command {
		Command { argv: Vec::new(), input, output: Output::Default, pid: None }
	}
}

/// An ordered chain of stages. `background` applies to the whole pipeline,
/// wherever the `&` appeared in the line.
#[derive(Debug)]
pub struct Pipeline {
	pub stages: Vec<Command>,
	pub background: bool,
}
