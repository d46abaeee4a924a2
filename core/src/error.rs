use crate::pipeline::Step;

use di_utils::FileIOError;
use serde::{Deserialize, Serialize};
use std::{fmt, io, path::PathBuf, time::Duration};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// How a failure affects a run.
///
/// Only [`FailureKind::FatalInput`] and [`FailureKind::PermissionDenied`] end a run;
/// the rest are collected as [`Advisory`] records and leave `ok` untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
	FatalInput,
	PermissionDenied,
	SoftShellFailure,
	PartialWriteFailure,
	EjectFailure,
}

impl FailureKind {
	#[must_use]
	pub const fn is_terminal(self) -> bool {
		matches!(self, Self::FatalInput | Self::PermissionDenied)
	}

	/// Follow-up text shown to the user for advisories of this kind.
	#[must_use]
	pub const fn follow_up(self) -> &'static str {
		match self {
			Self::FatalInput => "check the volume and the source image, then try again",
			Self::PermissionDenied => {
				"run drive-icon again from an elevated (administrator or root) session"
			}
			Self::SoftShellFailure => "the icon may need a manual refresh or a restart of the shell",
			Self::PartialWriteFailure => {
				"some platform markers were not written; the icon may not show everywhere"
			}
			Self::EjectFailure => "the volume could not be ejected safely; unplug it manually once idle",
		}
	}
}

impl fmt::Display for FailureKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::FatalInput => "fatal input",
			Self::PermissionDenied => "permission denied",
			Self::SoftShellFailure => "shell refresh failure",
			Self::PartialWriteFailure => "partial write failure",
			Self::EjectFailure => "eject failure",
		})
	}
}

/// Terminal failures of a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
	#[error("invalid volume <root='{}'>: {reason}", root.display())]
	InvalidVolume { root: PathBuf, reason: String },
	#[error("the source image could not be used: {0}")]
	Image(#[from] di_images::Error),
	#[error("permission denied while {action}: {message}")]
	PermissionDenied { action: String, message: String },
	#[error(transparent)]
	Io(#[from] FileIOError),
}

impl PipelineError {
	pub fn invalid_volume(root: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
		Self::InvalidVolume {
			root: root.into(),
			reason: reason.into(),
		}
	}

	#[must_use]
	pub fn kind(&self) -> FailureKind {
		match self {
			Self::InvalidVolume { .. } | Self::Image(_) => FailureKind::FatalInput,
			Self::PermissionDenied { .. } => FailureKind::PermissionDenied,
			Self::Io(e) if e.is_permission_denied() => FailureKind::PermissionDenied,
			Self::Io(_) => FailureKind::FatalInput,
		}
	}
}

/// A non-terminal failure recorded against the step that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advisory {
	pub kind: FailureKind,
	pub step: Step,
	pub message: String,
}

impl Advisory {
	pub fn new(kind: FailureKind, step: Step, message: impl Into<String>) -> Self {
		Self {
			kind,
			step,
			message: message.into(),
		}
	}
}

impl fmt::Display for Advisory {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[{}] {}: {}", self.step, self.kind, self.message)
	}
}

/// Failures of an external command invocation.
#[derive(Error, Debug)]
pub enum CommandError {
	#[error("failed to start `{program}`: {source}")]
	Spawn {
		program: String,
		#[source]
		source: io::Error,
	},
	#[error("`{program}` did not finish within {timeout:?}")]
	Timeout { program: String, timeout: Duration },
	#[error("`{program}` exited with status {code:?}: {stderr}")]
	Failed {
		program: String,
		code: Option<i32>,
		stderr: String,
	},
	#[error("i/o error while waiting on `{program}`: {source}")]
	Io {
		program: String,
		#[source]
		source: io::Error,
	},
}

impl CommandError {
	/// Missing binaries are expected on hosts without a given desktop tool.
	#[must_use]
	pub fn is_not_found(&self) -> bool {
		matches!(self, Self::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound)
	}

	#[must_use]
	pub fn is_permission_denied(&self) -> bool {
		match self {
			Self::Spawn { source, .. } | Self::Io { source, .. } => {
				source.kind() == io::ErrorKind::PermissionDenied
			}
			Self::Failed { stderr, .. } => {
				let stderr = stderr.to_lowercase();
				stderr.contains("access is denied") || stderr.contains("permission denied")
			}
			Self::Timeout { .. } => false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::path::Path;

	#[test]
	fn io_failures_are_reclassified_when_denied() {
		let denied = PipelineError::from(FileIOError::from((
			Path::new("/vol/.icons"),
			io::Error::from(io::ErrorKind::PermissionDenied),
		)));
		assert_eq!(denied.kind(), FailureKind::PermissionDenied);

		let other = PipelineError::from(FileIOError::from((
			Path::new("/vol/.icons"),
			io::Error::from(io::ErrorKind::Other),
		)));
		assert_eq!(other.kind(), FailureKind::FatalInput);
	}

	#[test]
	fn only_input_and_permission_failures_are_terminal() {
		assert!(FailureKind::FatalInput.is_terminal());
		assert!(FailureKind::PermissionDenied.is_terminal());
		assert!(!FailureKind::SoftShellFailure.is_terminal());
		assert!(!FailureKind::PartialWriteFailure.is_terminal());
		assert!(!FailureKind::EjectFailure.is_terminal());
	}

	#[test]
	fn reg_exe_access_denied_counts_as_permission_failure() {
		let err = CommandError::Failed {
			program: "reg".into(),
			code: Some(1),
			stderr: "ERROR: Access is denied.".into(),
		};
		assert!(err.is_permission_denied());
	}
}
