//! Access to the Windows registry through `reg.exe`.

use crate::{
	command::{CommandLine, CommandRunner},
	error::CommandError,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hive {
	/// `HKEY_LOCAL_MACHINE`, visible to every user, writable only when elevated.
	Machine,
	/// `HKEY_CURRENT_USER`
	User,
}

impl Hive {
	pub const ALL: [Self; 2] = [Self::Machine, Self::User];

	#[must_use]
	pub const fn short_name(self) -> &'static str {
		match self {
			Self::Machine => "HKLM",
			Self::User => "HKCU",
		}
	}
}

impl fmt::Display for Hive {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.short_name())
	}
}

#[derive(Error, Debug)]
pub enum RegistryError {
	#[error("access denied to {hive}\\{key}")]
	AccessDenied { hive: Hive, key: String },
	#[error("registry command failed for {hive}\\{key}: {source}")]
	Command {
		hive: Hive,
		key: String,
		#[source]
		source: CommandError,
	},
}

impl RegistryError {
	fn from_command(hive: Hive, key: &str, source: CommandError) -> Self {
		if source.is_permission_denied() {
			Self::AccessDenied {
				hive,
				key: key.to_string(),
			}
		} else {
			Self::Command {
				hive,
				key: key.to_string(),
				source,
			}
		}
	}

	#[must_use]
	pub const fn is_access_denied(&self) -> bool {
		matches!(self, Self::AccessDenied { .. })
	}
}

/// The three registry operations the icon store needs: default values and whole-tree deletes.
#[async_trait]
pub trait Registry: fmt::Debug + Send + Sync {
	async fn set_default(&self, hive: Hive, key: &str, value: &str) -> Result<(), RegistryError>;

	async fn get_default(&self, hive: Hive, key: &str) -> Result<Option<String>, RegistryError>;

	/// Deletes `key` and everything under it. Returns whether anything was there.
	async fn delete_tree(&self, hive: Hive, key: &str) -> Result<bool, RegistryError>;
}

/// [`Registry`] backed by the stock `reg.exe` tool.
#[derive(Debug, Clone)]
pub struct RegExe {
	runner: Arc<dyn CommandRunner>,
	timeout: Duration,
}

impl RegExe {
	pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
		Self { runner, timeout }
	}

	fn path(hive: Hive, key: &str) -> String {
		format!("{}\\{key}", hive.short_name())
	}
}

fn is_missing_key(stderr: &str) -> bool {
	stderr.to_lowercase().contains("unable to find")
}

/// Picks the value out of `reg query /ve` output:
///
/// ```text
/// HKEY_CURRENT_USER\SOFTWARE\...\DefaultIcon
///     (Default)    REG_SZ    D:\icons\drive_E.ico
/// ```
fn parse_default_value(stdout: &str) -> Option<String> {
	stdout.lines().find_map(|line| {
		let (_, value) = line.split_once("REG_SZ")?;
		let value = value.trim();
		(!value.is_empty()).then(|| value.to_string())
	})
}

#[async_trait]
impl Registry for RegExe {
	async fn set_default(&self, hive: Hive, key: &str, value: &str) -> Result<(), RegistryError> {
		let command = CommandLine::new("reg")
			.arg("add")
			.arg(Self::path(hive, key))
			.args(["/ve", "/t", "REG_SZ", "/d"])
			.arg(value)
			.arg("/f");

		self.runner
			.run(&command, self.timeout)
			.await
			.map(drop)
			.map_err(|e| RegistryError::from_command(hive, key, e))
	}

	async fn get_default(&self, hive: Hive, key: &str) -> Result<Option<String>, RegistryError> {
		let command = CommandLine::new("reg")
			.arg("query")
			.arg(Self::path(hive, key))
			.arg("/ve");

		let output = self
			.runner
			.output(&command, self.timeout)
			.await
			.map_err(|e| RegistryError::from_command(hive, key, e))?;

		if output.succeeded() {
			return Ok(parse_default_value(&output.stdout));
		}

		if is_missing_key(&output.stderr) || (output.code == Some(1) && output.stderr.is_empty()) {
			trace!(%hive, key, "Registry key not present");
			return Ok(None);
		}

		output
			.check(&command)
			.map(|_| None)
			.map_err(|e| RegistryError::from_command(hive, key, e))
	}

	async fn delete_tree(&self, hive: Hive, key: &str) -> Result<bool, RegistryError> {
		let command = CommandLine::new("reg")
			.arg("delete")
			.arg(Self::path(hive, key))
			.arg("/f");

		let output = self
			.runner
			.output(&command, self.timeout)
			.await
			.map_err(|e| RegistryError::from_command(hive, key, e))?;

		if output.succeeded() {
			Ok(true)
		} else if is_missing_key(&output.stderr) {
			Ok(false)
		} else {
			output
				.check(&command)
				.map(|_| false)
				.map_err(|e| RegistryError::from_command(hive, key, e))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{command::CommandOutput, testing::FakeCommandRunner};
	use pretty_assertions::assert_eq;

	const KEY: &str = r"SOFTWARE\Microsoft\Windows\CurrentVersion\Explorer\DriveIcons\E\DefaultIcon";

	#[test]
	fn parses_query_output() {
		let stdout = "\r\nHKEY_CURRENT_USER\\SOFTWARE\\X\\DefaultIcon\r\n    (Default)    REG_SZ    C:\\ProgramData\\DriveIcons\\drive_E.ico\r\n\r\n";
		assert_eq!(
			parse_default_value(stdout),
			Some(r"C:\ProgramData\DriveIcons\drive_E.ico".to_string())
		);
		assert_eq!(parse_default_value("    (Default)    REG_SZ    \r\n"), None);
	}

	#[tokio::test]
	async fn commands_target_the_requested_hive() {
		let runner = Arc::new(FakeCommandRunner::new());
		let reg = RegExe::new(runner.clone(), Duration::from_secs(1));

		reg.set_default(Hive::User, KEY, r"C:\icons\e.ico").await.unwrap();

		assert_eq!(
			runner.calls(),
			vec![format!(r"reg add HKCU\{KEY} /ve /t REG_SZ /d C:\icons\e.ico /f")]
		);
	}

	#[tokio::test]
	async fn missing_keys_read_as_none_and_delete_as_absent() {
		let runner = Arc::new(FakeCommandRunner::new());
		let missing = CommandOutput::failure(
			1,
			"ERROR: The system was unable to find the specified registry key or value.",
		);
		runner.respond(&format!(r"reg query HKLM\{KEY} /ve"), missing.clone());
		runner.respond(&format!(r"reg delete HKLM\{KEY} /f"), missing);
		let reg = RegExe::new(runner, Duration::from_secs(1));

		assert_eq!(reg.get_default(Hive::Machine, KEY).await.unwrap(), None);
		assert!(!reg.delete_tree(Hive::Machine, KEY).await.unwrap());
	}

	#[tokio::test]
	async fn access_denied_is_typed() {
		let runner = Arc::new(FakeCommandRunner::new());
		runner.respond_prefix("reg add HKLM", CommandOutput::failure(1, "ERROR: Access is denied."));
		let reg = RegExe::new(runner, Duration::from_secs(1));

		let err = reg.set_default(Hive::Machine, KEY, "x").await.unwrap_err();
		assert!(err.is_access_denied());
	}
}
