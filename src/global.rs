use crate::job::JobRegistry;

/// Interpreter-wide state: the last recorded exit status (feeds `echo $?`
/// and `exit`) and the background job table.
pub struct State {
	pub last_status: i32,
	pub jobs: JobRegistry,
}

impl State {
	pub fn new(jobs: JobRegistry) -> State {
		State { last_status: 0, jobs }
	}
}
