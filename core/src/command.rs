//! External command execution behind a trait, so every platform path can run against fakes.

use crate::error::CommandError;

use async_trait::async_trait;
use std::{fmt, process::Stdio, time::Duration};
use tokio::process::Command;
use tracing::{debug, trace};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// A program and its arguments, kept as plain strings so they can be logged and matched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandLine {
	pub program: String,
	pub args: Vec<String>,
}

impl CommandLine {
	pub fn new(program: impl Into<String>) -> Self {
		Self {
			program: program.into(),
			args: Vec::new(),
		}
	}

	#[must_use]
	pub fn arg(mut self, arg: impl Into<String>) -> Self {
		self.args.push(arg.into());
		self
	}

	#[must_use]
	pub fn args<I, S>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.args.extend(args.into_iter().map(Into::into));
		self
	}
}

impl fmt::Display for CommandLine {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.program)?;
		for arg in &self.args {
			if arg.is_empty() || arg.contains(char::is_whitespace) {
				write!(f, " \"{arg}\"")?;
			} else {
				write!(f, " {arg}")?;
			}
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
	/// `None` when the process was terminated by a signal.
	pub code: Option<i32>,
	pub stdout: String,
	pub stderr: String,
}

impl CommandOutput {
	#[must_use]
	pub fn success() -> Self {
		Self {
			code: Some(0),
			..Default::default()
		}
	}

	#[must_use]
	pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
		Self {
			code: Some(code),
			stderr: stderr.into(),
			..Default::default()
		}
	}

	#[must_use]
	pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
		self.stdout = stdout.into();
		self
	}

	#[must_use]
	pub const fn succeeded(&self) -> bool {
		matches!(self.code, Some(0))
	}

	/// Turns a non-zero exit into [`CommandError::Failed`].
	pub fn check(self, command: &CommandLine) -> Result<Self, CommandError> {
		if self.succeeded() {
			Ok(self)
		} else {
			Err(CommandError::Failed {
				program: command.program.clone(),
				code: self.code,
				stderr: self.stderr.trim().to_string(),
			})
		}
	}
}

#[async_trait]
pub trait CommandRunner: fmt::Debug + Send + Sync {
	/// Runs to completion, giving up (and killing the child) after `timeout`.
	async fn output(
		&self,
		command: &CommandLine,
		timeout: Duration,
	) -> Result<CommandOutput, CommandError>;

	/// Starts a long-lived process without waiting on it.
	async fn spawn(&self, command: &CommandLine) -> Result<(), CommandError>;

	/// Shorthand for `output` followed by [`CommandOutput::check`].
	async fn run(
		&self,
		command: &CommandLine,
		timeout: Duration,
	) -> Result<CommandOutput, CommandError> {
		self.output(command, timeout).await?.check(command)
	}
}

/// Runs commands on the host through `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
	fn command(command: &CommandLine) -> Command {
		let mut cmd = Command::new(&command.program);
		cmd.args(&command.args).stdin(Stdio::null());
		#[cfg(windows)]
		cmd.creation_flags(CREATE_NO_WINDOW);
		cmd
	}
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
	async fn output(
		&self,
		command: &CommandLine,
		timeout: Duration,
	) -> Result<CommandOutput, CommandError> {
		trace!(%command, ?timeout, "Running command");

		let child = Self::command(command)
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true)
			.spawn()
			.map_err(|source| CommandError::Spawn {
				program: command.program.clone(),
				source,
			})?;

		// Dropping the future on expiry drops the child, which kills it.
		let output = tokio::time::timeout(timeout, child.wait_with_output())
			.await
			.map_err(|_| CommandError::Timeout {
				program: command.program.clone(),
				timeout,
			})?
			.map_err(|source| CommandError::Io {
				program: command.program.clone(),
				source,
			})?;

		let output = CommandOutput {
			code: output.status.code(),
			stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
			stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
		};

		debug!(%command, code = ?output.code, "Command finished");

		Ok(output)
	}

	async fn spawn(&self, command: &CommandLine) -> Result<(), CommandError> {
		debug!(%command, "Spawning detached command");

		Self::command(command)
			.stdout(Stdio::null())
			.stderr(Stdio::null())
			.spawn()
			.map(drop)
			.map_err(|source| CommandError::Spawn {
				program: command.program.clone(),
				source,
			})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn display_quotes_arguments_with_spaces() {
		let command = CommandLine::new("reg")
			.arg("add")
			.arg(r"HKCU\Software\Drive Icons")
			.args(["/ve", "/f"]);
		assert_eq!(
			command.to_string(),
			r#"reg add "HKCU\Software\Drive Icons" /ve /f"#
		);
	}

	#[test]
	fn check_maps_non_zero_exits() {
		let command = CommandLine::new("udisksctl").args(["unmount", "-b", "/dev/sdb1"]);
		assert!(CommandOutput::success().check(&command).is_ok());

		let err = CommandOutput::failure(1, "  nope \n").check(&command).unwrap_err();
		assert!(matches!(
			err,
			CommandError::Failed { code: Some(1), ref stderr, .. } if stderr == "nope"
		));
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn system_runner_reports_exit_codes() {
		let runner = SystemCommandRunner;

		let ok = runner
			.output(&CommandLine::new("true"), Duration::from_secs(5))
			.await
			.unwrap();
		assert!(ok.succeeded());

		let failed = runner
			.output(&CommandLine::new("false"), Duration::from_secs(5))
			.await
			.unwrap();
		assert!(!failed.succeeded());
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn system_runner_times_out() {
		let err = SystemCommandRunner
			.output(
				&CommandLine::new("sleep").arg("5"),
				Duration::from_millis(50),
			)
			.await
			.unwrap_err();
		assert!(matches!(err, CommandError::Timeout { .. }));
	}

	#[tokio::test]
	async fn missing_programs_are_not_found() {
		let err = SystemCommandRunner
			.output(
				&CommandLine::new("definitely-not-a-real-binary-name"),
				Duration::from_secs(1),
			)
			.await
			.unwrap_err();
		assert!(err.is_not_found());
	}
}
