use super::lock;
use crate::{
	command::{CommandLine, CommandOutput, CommandRunner},
	error::CommandError,
};

use async_trait::async_trait;
use std::{
	collections::{HashMap, HashSet, VecDeque},
	io,
	sync::Mutex,
	time::Duration,
};

/// [`CommandRunner`] that answers from a script and records every command line.
///
/// Unscripted commands succeed with empty output. Responses are matched on the
/// rendered command line: exact matches first, then prefixes in registration order.
#[derive(Debug, Default)]
pub struct FakeCommandRunner {
	state: Mutex<Script>,
}

#[derive(Debug, Default)]
struct Script {
	exact: HashMap<String, VecDeque<CommandOutput>>,
	prefixes: Vec<(String, CommandOutput)>,
	missing: HashSet<String>,
	timeouts: HashSet<String>,
	calls: Vec<String>,
	spawned: Vec<String>,
}

impl FakeCommandRunner {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn respond(&self, command: &str, output: CommandOutput) {
		self.respond_sequence(command, vec![output]);
	}

	/// Answers successive runs of `command` in order; the last answer repeats.
	pub fn respond_sequence(&self, command: &str, outputs: Vec<CommandOutput>) {
		lock(&self.state)
			.exact
			.insert(command.to_string(), outputs.into());
	}

	pub fn respond_prefix(&self, prefix: &str, output: CommandOutput) {
		lock(&self.state)
			.prefixes
			.push((prefix.to_string(), output));
	}

	/// Makes `program` fail to start as if it were not installed.
	pub fn missing_program(&self, program: &str) {
		lock(&self.state).missing.insert(program.to_string());
	}

	/// Makes every command starting with `prefix` hit its timeout.
	pub fn time_out(&self, prefix: &str) {
		lock(&self.state).timeouts.insert(prefix.to_string());
	}

	/// Command lines passed to `output`/`run`, in order.
	#[must_use]
	pub fn calls(&self) -> Vec<String> {
		lock(&self.state).calls.clone()
	}

	/// Command lines passed to `spawn`, in order.
	#[must_use]
	pub fn spawned(&self) -> Vec<String> {
		lock(&self.state).spawned.clone()
	}

	fn not_found(command: &CommandLine) -> CommandError {
		CommandError::Spawn {
			program: command.program.clone(),
			source: io::Error::from(io::ErrorKind::NotFound),
		}
	}
}

#[async_trait]
impl CommandRunner for FakeCommandRunner {
	async fn output(
		&self,
		command: &CommandLine,
		timeout: Duration,
	) -> Result<CommandOutput, CommandError> {
		let line = command.to_string();
		let mut script = lock(&self.state);
		script.calls.push(line.clone());

		if script.missing.contains(&command.program) {
			return Err(Self::not_found(command));
		}

		if script.timeouts.iter().any(|prefix| line.starts_with(prefix)) {
			return Err(CommandError::Timeout {
				program: command.program.clone(),
				timeout,
			});
		}

		if let Some(queue) = script.exact.get_mut(&line) {
			let next = if queue.len() > 1 {
				queue.pop_front()
			} else {
				queue.front().cloned()
			};
			if let Some(output) = next {
				return Ok(output);
			}
		}

		Ok(script
			.prefixes
			.iter()
			.find(|(prefix, _)| line.starts_with(prefix.as_str()))
			.map_or_else(CommandOutput::success, |(_, output)| output.clone()))
	}

	async fn spawn(&self, command: &CommandLine) -> Result<(), CommandError> {
		let mut script = lock(&self.state);
		script.spawned.push(command.to_string());

		if script.missing.contains(&command.program) {
			Err(Self::not_found(command))
		} else {
			Ok(())
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[tokio::test]
	async fn sequences_repeat_their_last_answer() {
		let runner = FakeCommandRunner::new();
		runner.respond_sequence(
			"diskutil eject /Volumes/Backup",
			vec![CommandOutput::success(), CommandOutput::failure(1, "")],
		);
		let eject = CommandLine::new("diskutil").args(["eject", "/Volumes/Backup"]);
		let timeout = Duration::from_secs(1);

		let codes = [
			runner.output(&eject, timeout).await.unwrap().code,
			runner.output(&eject, timeout).await.unwrap().code,
			runner.output(&eject, timeout).await.unwrap().code,
		];
		assert_eq!(codes, [Some(0), Some(1), Some(1)]);
		assert_eq!(runner.calls().len(), 3);
	}

	#[tokio::test]
	async fn missing_programs_fail_to_spawn() {
		let runner = FakeCommandRunner::new();
		runner.missing_program("gio");

		let err = runner
			.run(&CommandLine::new("gio").arg("set"), Duration::from_secs(1))
			.await
			.unwrap_err();
		assert!(err.is_not_found());
		assert!(runner.spawn(&CommandLine::new("gio")).await.is_err());
	}
}
