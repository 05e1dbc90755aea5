use std::mem;

use thiserror::Error;

use crate::types::*;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
	#[error("duplicate file redirection")]
	DuplicateOutputRedirect,
	#[error("invalid pipes and file redirection")]
	ConflictingInputRedirect,
	#[error("invalid pipes and file redirection")]
	PipeAfterOutputRedirect,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
	#[error("missing command")]
	MissingCommand,
	#[error("invalid pipes")]
	InvalidPipeTopology,
	#[error("sish: missing input filename for `{0}'")]
	MissingInputFilename(String),
	#[error("sish: missing output filename for `{0}'")]
	MissingOutputFilename(String),
}

struct Scanner<'a> {
	line: &'a str,
	i: usize,
}

impl<'a> Scanner<'a> {
	fn proceed_while<F>(&mut self, f: F) where F: Fn(u8) -> bool {
		while let Some(&c) = self.line.as_bytes().get(self.i) {
			if !f(c) { break; }
			self.i += 1;
		}
	}

	fn is_whitespace(c: u8) -> bool {
		matches!(c, b' ' | b'\t')
	}

	fn is_word(c: u8) -> bool {
		match c {
			b'<' | b'>' | b'|' | b'&' => false,
			_ => !Scanner::is_whitespace(c),
		}
	}

	fn skip_whitespace(&mut self) {
		self.proceed_while(Scanner::is_whitespace);
	}

	// Delimiters are all ASCII, so the run is always a char boundary.
	fn read_word(&mut self) -> &'a str {
		let orig = self.i;
		self.proceed_while(Scanner::is_word);
		&self.line[orig .. self.i]
	}

	fn peek(&self) -> Option<u8> {
		self.line.as_bytes().get(self.i).copied()
	}

	fn bump(&mut self) {
		self.i += 1;
	}

	// The filename after a redirection operator is the next word; an operator
	// or end of line right away leaves it empty for validate() to reject.
	fn read_filename(&mut self) -> String {
		self.skip_whitespace();
		self.read_word().to_string()
	}
}

/// Splits one input line into a pipeline. A blank line is a valid pipeline
/// with no stages; the caller skips it instead of running anything.
pub fn parse(line: &str) -> Result<Pipeline, ParseError> {
	let mut scanner = Scanner { line, i: 0 };
	let mut stages: Vec<Command> = Vec::new();
	let mut current = Command::new(Input::Default);
	let mut background = false;

	loop {
		let word = scanner.read_word();
		if !word.is_empty() {
			current.argv.push(word.to_string());
		}
		let Some(c) = scanner.peek() else { break };
		match c {
			b' ' | b'\t' => scanner.skip_whitespace(),
			b'<' => {
				scanner.bump();
				if current.input != Input::Default {
					return Err(ParseError::ConflictingInputRedirect);
				}
				current.input = Input::File(scanner.read_filename());
			},
			b'>' => {
				scanner.bump();
				if current.output != Output::Default {
					return Err(ParseError::DuplicateOutputRedirect);
				}
				let mode = if scanner.peek() == Some(b'>') {
					scanner.bump();
					OutputMode::Append
				} else {
					OutputMode::Truncate
				};
				current.output = Output::File(scanner.read_filename(), mode);
			},
			b'|' => {
				scanner.bump();
				if current.output != Output::Default {
					return Err(ParseError::PipeAfterOutputRedirect);
				}
				current.output = Output::Pipe;
				stages.push(mem::replace(&mut current, Command::new(Input::Pipe)));
			},
			b'&' => {
				scanner.bump();
				background = true;
			},
			_ => unreachable!("read_word stops only at delimiters"),
		}
	}

	let blank = stages.is_empty() && !background
		&& current.argv.is_empty()
		&& current.input == Input::Default
		&& current.output == Output::Default;
	if !blank {
		stages.push(current);
	}
	Ok(Pipeline { stages, background })
}

/// Checks a parsed pipeline stage by stage, in textual order, returning the
/// first violation. A pipeline that passes is safe to hand to the engine.
pub fn validate(pipeline: &Pipeline) -> Result<(), ValidationError> {
	for (i, stage) in pipeline.stages.iter().enumerate() {
		if stage.argv.is_empty() {
			return Err(ValidationError::MissingCommand);
		}
		if stage.output == Output::Pipe {
			let piped_next = matches!(
				pipeline.stages.get(i + 1),
				Some(next) if next.input == Input::Pipe
			);
			if !piped_next {
				return Err(ValidationError::InvalidPipeTopology);
			}
		}
		if let Input::File(name) = &stage.input {
			if name.is_empty() {
				return Err(ValidationError::MissingInputFilename(stage.argv[0].clone()));
			}
		}
		if let Output::File(name, _) = &stage.output {
			if name.is_empty() {
				return Err(ValidationError::MissingOutputFilename(stage.argv[0].clone()));
			}
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn argv(stage: &Command) -> Vec<&str> {
		stage.argv.iter().map(|s| s.as_str()).collect()
	}

	#[test]
	fn two_stage_pipeline() {
		let p = parse("ls -l | wc -l").unwrap();
		assert_eq!(p.stages.len(), 2);
		assert!(!p.background);
		assert_eq!(argv(&p.stages[0]), ["ls", "-l"]);
		assert_eq!(p.stages[0].input, Input::Default);
		assert_eq!(p.stages[0].output, Output::Pipe);
		assert_eq!(argv(&p.stages[1]), ["wc", "-l"]);
		assert_eq!(p.stages[1].input, Input::Pipe);
		assert_eq!(p.stages[1].output, Output::Default);
	}

	#[test]
	fn output_redirection_truncates() {
		let p = parse("echo hi > out.txt").unwrap();
		assert_eq!(p.stages.len(), 1);
		assert_eq!(argv(&p.stages[0]), ["echo", "hi"]);
		assert_eq!(p.stages[0].output,
			Output::File("out.txt".to_string(), OutputMode::Truncate));
	}

	#[test]
	fn output_redirection_appends() {
		let p = parse("cmd >> log.txt").unwrap();
		assert_eq!(p.stages[0].output,
			Output::File("log.txt".to_string(), OutputMode::Append));
	}

	#[test]
	fn input_redirection() {
		let p = parse("wc -w < data.txt").unwrap();
		assert_eq!(p.stages[0].input, Input::File("data.txt".to_string()));
	}

	#[test]
	fn redirection_without_space() {
		let p = parse("cmd >out <in").unwrap();
		assert_eq!(p.stages[0].output,
			Output::File("out".to_string(), OutputMode::Truncate));
		assert_eq!(p.stages[0].input, Input::File("in".to_string()));
	}

	#[test]
	fn blank_line_has_no_stages() {
		assert!(parse("").unwrap().stages.is_empty());
		assert!(parse(" \t ").unwrap().stages.is_empty());
	}

	#[test]
	fn background_marks_whole_pipeline() {
		let p = parse("sleep 1 &").unwrap();
		assert!(p.background);
		assert_eq!(argv(&p.stages[0]), ["sleep", "1"]);

		// `&` does not terminate the scan
		let p = parse("a & b").unwrap();
		assert!(p.background);
		assert_eq!(argv(&p.stages[0]), ["a", "b"]);
	}

	#[test]
	fn duplicate_output_redirect_is_rejected() {
		let e = parse("a > b > c").unwrap_err();
		assert_eq!(e, ParseError::DuplicateOutputRedirect);
		assert_eq!(e.to_string(), "duplicate file redirection");
	}

	#[test]
	fn double_less_is_two_input_redirects() {
		// `<<` is not a heredoc; the second `<` collides with the first
		let e = parse("a << b").unwrap_err();
		assert_eq!(e, ParseError::ConflictingInputRedirect);
		assert_eq!(e.to_string(), "invalid pipes and file redirection");
	}

	#[test]
	fn pipe_after_file_output_is_rejected() {
		let e = parse("a > f | b").unwrap_err();
		assert_eq!(e, ParseError::PipeAfterOutputRedirect);
	}

	#[test]
	fn input_redirect_on_piped_stage_is_rejected() {
		let e = parse("a | b < f").unwrap_err();
		assert_eq!(e, ParseError::ConflictingInputRedirect);
	}

	#[test]
	fn empty_filename_is_left_for_validation() {
		let p = parse("cmd >").unwrap();
		assert_eq!(p.stages[0].output,
			Output::File(String::new(), OutputMode::Truncate));
		assert_eq!(validate(&p).unwrap_err(),
			ValidationError::MissingOutputFilename("cmd".to_string()));
	}

	#[test]
	fn missing_input_filename_names_the_command() {
		let p = parse("cmd <").unwrap();
		let e = validate(&p).unwrap_err();
		assert_eq!(e, ValidationError::MissingInputFilename("cmd".to_string()));
		assert_eq!(e.to_string(), "sish: missing input filename for `cmd'");
	}

	#[test]
	fn trailing_pipe_leaves_an_empty_stage() {
		let p = parse("ls |").unwrap();
		assert_eq!(p.stages.len(), 2);
		assert_eq!(validate(&p).unwrap_err(), ValidationError::MissingCommand);
	}

	#[test]
	fn lone_ampersand_is_missing_command() {
		let p = parse("&").unwrap();
		assert_eq!(validate(&p).unwrap_err(), ValidationError::MissingCommand);
	}

	#[test]
	fn pipe_into_nothing_is_invalid_topology() {
		// not reachable through parse(); built by hand
		let mut stage = Command::new(Input::Default);
		stage.argv.push("ls".to_string());
		stage.output = Output::Pipe;
		let p = Pipeline { stages: vec![stage], background: false };
		assert_eq!(validate(&p).unwrap_err(), ValidationError::InvalidPipeTopology);
	}

	#[test]
	fn valid_pipelines_have_nonempty_argv() {
		for line in ["ls", "ls -l | wc -l", "a < in | b | c >> out &"] {
			let p = parse(line).unwrap();
			validate(&p).unwrap();
			assert!(p.stages.iter().all(|s| !s.argv.is_empty()));
		}
	}
}
