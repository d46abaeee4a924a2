//! Shell cache invalidation, shell stop/start and change notification.
//!
//! Every operation is best effort: failures come back as [`ShellError`] for the
//! caller to record, and never stop the next operation from being attempted.

pub mod notify;
pub mod profile;

pub use notify::{ChangeNotifier, MtimeNotifier, NotifyError};
pub use profile::ShellProfile;

use crate::{
	command::{CommandLine, CommandRunner},
	config::ShellTiming,
	error::CommandError,
	sys::HostTables,
	volume::{Volume, VolumeClassifier},
};

use serde::{Deserialize, Serialize};
use std::{
	fmt,
	path::{Path, PathBuf},
	sync::Arc,
};
use thiserror::Error;
use tokio::{fs, time::sleep};
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ShellError {
	#[error(transparent)]
	Command(#[from] CommandError),
	#[error("{process} was still running after {polls} checks")]
	StopTimeout { process: &'static str, polls: u32 },
	#[error("{process} did not come back after {polls} checks; restart it manually or sign out and back in")]
	StartTimeout { process: &'static str, polls: u32 },
	#[error(transparent)]
	Notify(#[from] NotifyError),
	#[error("{failed} of {total} icon cache files could not be deleted")]
	CacheFiles { failed: usize, total: usize },
}

/// Last completed phase of a refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellState {
	Idle,
	CacheCleared,
	ShellStopped,
	ShellRestarted,
	NotifiesSent,
}

/// What a successful shell operation amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellAction {
	Done(String),
	Skipped(String),
}

impl fmt::Display for ShellAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Done(detail) => f.write_str(detail),
			Self::Skipped(reason) => write!(f, "skipped: {reason}"),
		}
	}
}

#[derive(Debug)]
pub struct ShellCacheController {
	profile: Option<ShellProfile>,
	shell_cache_dir: Option<PathBuf>,
	runner: Arc<dyn CommandRunner>,
	system: Arc<dyn HostTables>,
	notifier: Arc<dyn ChangeNotifier>,
	timing: ShellTiming,
	state: ShellState,
	stopped_by_us: bool,
}

impl ShellCacheController {
	pub fn new(
		profile: Option<ShellProfile>,
		shell_cache_dir: Option<PathBuf>,
		runner: Arc<dyn CommandRunner>,
		system: Arc<dyn HostTables>,
		notifier: Arc<dyn ChangeNotifier>,
		timing: ShellTiming,
	) -> Self {
		Self {
			profile,
			shell_cache_dir,
			runner,
			system,
			notifier,
			timing,
			state: ShellState::Idle,
			stopped_by_us: false,
		}
	}

	#[must_use]
	pub const fn state(&self) -> ShellState {
		self.state
	}

	fn transition(&mut self, to: ShellState) {
		debug!(from = ?self.state, ?to, "Shell state transition");
		self.state = to;
	}

	/// `None` when the process table could not be read.
	async fn process_running(&self, profile: &ShellProfile) -> Option<bool> {
		let running = self.system.is_running(profile.process).await;
		if running.is_none() {
			warn!(process = profile.process, "Process table unreadable");
		}
		running
	}

	async fn wait_for(&self, profile: &ShellProfile, running: bool) -> bool {
		let (polls, interval) = if running {
			(self.timing.start_polls, self.timing.start_poll_interval())
		} else {
			(self.timing.stop_polls, self.timing.stop_poll_interval())
		};

		for attempt in 1..=polls {
			if self.process_running(profile).await == Some(running) {
				debug!(process = profile.process, running, attempt, "Shell reached expected state");
				return true;
			}
			if attempt < polls {
				sleep(interval).await;
			}
		}

		false
	}

	/// Stops the shell and waits (bounded) until it is gone.
	pub async fn stop_shell(&mut self) -> Result<ShellAction, ShellError> {
		let Some(profile) = self.profile.clone() else {
			return Ok(ShellAction::Skipped("no managed shell on this desktop".into()));
		};

		if self.process_running(&profile).await == Some(false) {
			return Ok(ShellAction::Skipped(format!("{} is not running", profile.process)));
		}

		info!(process = profile.process, "Stopping shell");
		// Exit status is unreliable (`nautilus -q` exits 1 when nothing was open); polling decides.
		if let Err(e) = self
			.runner
			.output(&profile.stop, self.timing.command_timeout())
			.await
		{
			warn!(?e, command = %profile.stop, "Shell stop command failed");
			return Err(e.into());
		}
		self.stopped_by_us = true;

		if !self.wait_for(&profile, false).await {
			return Err(ShellError::StopTimeout {
				process: profile.process,
				polls: self.timing.stop_polls,
			});
		}

		self.transition(ShellState::ShellStopped);
		Ok(ShellAction::Done(format!("{} stopped", profile.process)))
	}

	/// Starts the shell if we stopped it (or it is essential) and waits until it is back.
	pub async fn start_shell(&mut self) -> Result<ShellAction, ShellError> {
		let Some(profile) = self.profile.clone() else {
			return Ok(ShellAction::Skipped("no managed shell on this desktop".into()));
		};

		if self.process_running(&profile).await == Some(true) {
			self.stopped_by_us = false;
			self.transition(ShellState::ShellRestarted);
			return Ok(ShellAction::Skipped(format!("{} is already running", profile.process)));
		}

		if !self.stopped_by_us && !profile.essential {
			return Ok(ShellAction::Skipped(format!(
				"{} was not running before",
				profile.process
			)));
		}

		info!(process = profile.process, "Starting shell");
		self.runner.spawn(&profile.start).await?;

		if !self.wait_for(&profile, true).await {
			return Err(ShellError::StartTimeout {
				process: profile.process,
				polls: self.timing.start_polls,
			});
		}

		self.stopped_by_us = false;
		sleep(self.timing.settle()).await;
		self.transition(ShellState::ShellRestarted);
		Ok(ShellAction::Done(format!("{} restarted", profile.process)))
	}

	/// Stop followed by start; a failed stop still attempts the start.
	pub async fn restart_shell(&mut self) -> Result<ShellAction, ShellError> {
		let stopped = self.stop_shell().await;
		if let Err(e) = &stopped {
			warn!(?e, "Shell stop failed, attempting start anyway");
		}

		let started = self.start_shell().await?;
		stopped.map(|_| started)
	}

	/// Deletes on-disk icon cache databases and runs the shell's cache-clearing tool.
	pub async fn invalidate(
		&mut self,
		classifier: &VolumeClassifier,
	) -> Result<ShellAction, ShellError> {
		let Some(profile) = self.profile.clone() else {
			return Ok(ShellAction::Skipped("no managed shell on this desktop".into()));
		};

		let (deleted, failed) = match &self.shell_cache_dir {
			Some(dir) => remove_cache_files(dir, classifier).await,
			None => (0, 0),
		};

		let mut first_error = None;
		for command in &profile.cache_clear {
			if let Err(e) = self
				.runner
				.run(command, self.timing.cache_tool_timeout())
				.await
			{
				warn!(?e, %command, "Cache clearing tool failed");
				first_error.get_or_insert(ShellError::Command(e));
			}
		}

		self.transition(ShellState::CacheCleared);

		if failed > 0 {
			return Err(ShellError::CacheFiles {
				failed,
				total: deleted + failed,
			});
		}
		if let Some(e) = first_error {
			return Err(e);
		}

		Ok(if deleted == 0 && profile.cache_clear.is_empty() {
			ShellAction::Skipped("no icon cache to clear".into())
		} else {
			ShellAction::Done(format!("{deleted} cache files deleted"))
		})
	}

	/// Runs the shell's cache rebuild tools, if it has any.
	pub async fn rebuild_cache(&mut self) -> Result<ShellAction, ShellError> {
		let commands = self
			.profile
			.as_ref()
			.map(|profile| profile.cache_rebuild.clone())
			.unwrap_or_default();

		if commands.is_empty() {
			return Ok(ShellAction::Skipped("shell rebuilds its cache on demand".into()));
		}

		for command in &commands {
			self.runner
				.run(command, self.timing.cache_tool_timeout())
				.await?;
		}

		Ok(ShellAction::Done(
			commands
				.iter()
				.map(CommandLine::to_string)
				.collect::<Vec<_>>()
				.join(", "),
		))
	}

	/// Sends change notifications for the volume root, repeated per the shell's profile.
	pub async fn notify_change(&mut self, volume: &Volume) -> Result<ShellAction, ShellError> {
		let repeats = self
			.profile
			.as_ref()
			.map_or(1, |profile| profile.notify_repeats.max(1));

		for round in 0..repeats {
			if round > 0 {
				sleep(self.timing.notify_gap()).await;
			}
			self.notifier.notify(&volume.root).await?;
		}

		self.transition(ShellState::NotifiesSent);
		self.transition(ShellState::Idle);
		Ok(ShellAction::Done(format!("{repeats} change notification(s) sent")))
	}

	/// Full cycle for callers that don't need per-step reporting.
	/// Returns every failure; an empty list means a clean refresh.
	pub async fn refresh(
		&mut self,
		volume: &Volume,
		classifier: &VolumeClassifier,
	) -> Vec<ShellError> {
		let mut errors = Vec::new();
		if let Err(e) = self.stop_shell().await {
			errors.push(e);
		}
		if let Err(e) = self.invalidate(classifier).await {
			errors.push(e);
		}
		if let Err(e) = self.start_shell().await {
			errors.push(e);
		}
		if let Err(e) = self.notify_change(volume).await {
			errors.push(e);
		}
		errors
	}
}

async fn remove_cache_files(dir: &Path, classifier: &VolumeClassifier) -> (usize, usize) {
	let mut read_dir = match fs::read_dir(dir).await {
		Ok(read_dir) => read_dir,
		Err(e) => {
			debug!(?e, dir = %dir.display(), "Icon cache directory not readable");
			return (0, 0);
		}
	};

	let (mut deleted, mut failed) = (0, 0);
	while let Ok(Some(entry)) = read_dir.next_entry().await {
		let path = entry.path();
		if !classifier.is_safe(&path) {
			continue;
		}

		match fs::remove_file(&path).await {
			Ok(()) => deleted += 1,
			Err(e) => {
				// Explorer holds these open until it is stopped.
				warn!(?e, path = %path.display(), "Icon cache file is locked, skipping");
				failed += 1;
			}
		}
	}

	(deleted, failed)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		context::{DesktopEnvironment, Platform, PlatformContext},
		testing::{FakeCommandRunner, FakeHostTables, RecordingNotifier},
		volume::VolumeKind,
	};
	use pretty_assertions::assert_eq;

	fn controller(
		platform: Platform,
		desktop: DesktopEnvironment,
		runner: Arc<FakeCommandRunner>,
		system: Arc<FakeHostTables>,
		notifier: Arc<RecordingNotifier>,
		cache_dir: Option<PathBuf>,
	) -> ShellCacheController {
		let ctx = PlatformContext::new(platform, desktop, false, "/", "/store", cache_dir.clone());
		ShellCacheController::new(
			ShellProfile::for_context(&ctx),
			cache_dir,
			runner,
			system,
			notifier,
			ShellTiming::immediate(),
		)
	}

	#[tokio::test]
	async fn stop_then_start_polls_until_the_shell_is_back() {
		let runner = Arc::new(FakeCommandRunner::new());
		let system = Arc::new(FakeHostTables::new());
		system.running_sequence("nautilus", vec![true, false, false, true]);
		let notifier = Arc::new(RecordingNotifier::default());
		let mut shell = controller(
			Platform::Linux,
			DesktopEnvironment::Gnome,
			runner.clone(),
			system.clone(),
			notifier,
			None,
		);

		assert!(matches!(shell.stop_shell().await.unwrap(), ShellAction::Done(_)));
		assert_eq!(shell.state(), ShellState::ShellStopped);
		assert!(matches!(shell.start_shell().await.unwrap(), ShellAction::Done(_)));
		assert_eq!(shell.state(), ShellState::ShellRestarted);

		assert_eq!(runner.spawned(), vec!["nautilus --gapplication-service".to_string()]);
		assert!(runner.calls().contains(&"nautilus -q".to_string()));
		assert_eq!(system.checks().len(), 4);
	}

	#[tokio::test]
	async fn start_timeout_is_reported() {
		let system = Arc::new(FakeHostTables::new());
		system.set_running("plasmashell", false);
		let mut shell = controller(
			Platform::Linux,
			DesktopEnvironment::Kde,
			Arc::new(FakeCommandRunner::new()),
			system,
			Arc::new(RecordingNotifier::default()),
			None,
		);

		let err = shell.start_shell().await.unwrap_err();
		assert!(matches!(err, ShellError::StartTimeout { process: "plasmashell", .. }));
	}

	#[tokio::test]
	async fn non_essential_shells_are_not_started_from_scratch() {
		let runner = Arc::new(FakeCommandRunner::new());
		let system = Arc::new(FakeHostTables::new());
		system.set_running("thunar", false);
		let mut shell = controller(
			Platform::Linux,
			DesktopEnvironment::Xfce,
			runner.clone(),
			system,
			Arc::new(RecordingNotifier::default()),
			None,
		);

		assert!(matches!(shell.stop_shell().await.unwrap(), ShellAction::Skipped(_)));
		assert!(matches!(shell.start_shell().await.unwrap(), ShellAction::Skipped(_)));
		assert!(runner.spawned().is_empty());
	}

	#[tokio::test]
	async fn generic_desktops_skip_everything_but_notify() {
		let runner = Arc::new(FakeCommandRunner::new());
		let notifier = Arc::new(RecordingNotifier::default());
		let system = Arc::new(FakeHostTables::new());
		let mut shell = controller(
			Platform::Linux,
			DesktopEnvironment::Generic,
			runner.clone(),
			system.clone(),
			notifier.clone(),
			None,
		);
		let volume = Volume::new("/media/usb", VolumeKind::Removable);

		let errors = shell
			.refresh(&volume, &VolumeClassifier::new(&volume.root))
			.await;
		assert!(errors.is_empty());
		assert!(runner.calls().is_empty());
		assert!(system.checks().is_empty());
		assert_eq!(notifier.paths(), vec![volume.root.clone()]);
		assert_eq!(shell.state(), ShellState::Idle);
	}

	#[tokio::test]
	async fn explorer_cache_files_are_deleted_through_the_classifier() {
		let cache = tempfile::tempdir().unwrap();
		std::fs::write(cache.path().join("iconcache_32.db"), b"x").unwrap();
		std::fs::write(cache.path().join("thumbcache_256.db"), b"x").unwrap();
		std::fs::write(cache.path().join("ExplorerStartupLog.etl"), b"x").unwrap();

		let runner = Arc::new(FakeCommandRunner::new());
		let notifier = Arc::new(RecordingNotifier::default());
		let mut shell = controller(
			Platform::Windows,
			DesktopEnvironment::Generic,
			runner.clone(),
			Arc::new(FakeHostTables::new()),
			notifier.clone(),
			Some(cache.path().to_path_buf()),
		);
		let classifier =
			VolumeClassifier::new("E:\\").with_shell_cache(Some(cache.path().to_path_buf()));

		let action = shell.invalidate(&classifier).await.unwrap();
		assert_eq!(action, ShellAction::Done("2 cache files deleted".into()));
		assert!(cache.path().join("ExplorerStartupLog.etl").exists());
		assert_eq!(runner.calls(), vec!["ie4uinit.exe -ClearIconCache".to_string()]);

		shell
			.notify_change(&Volume::new("E:\\", VolumeKind::Removable))
			.await
			.unwrap();
		assert_eq!(notifier.paths().len(), 2);
	}
}
