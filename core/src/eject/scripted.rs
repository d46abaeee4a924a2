//! Eject methods that drive the host's own tools.

use super::{EjectError, EjectMethod};
use crate::{
	command::{CommandLine, CommandRunner},
	config::ShellTiming,
	error::CommandError,
	sys::HostTables,
	volume::{guard, Volume},
};

use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::{debug, warn};

fn busy_or_command(e: CommandError) -> EjectError {
	match &e {
		CommandError::Failed { stderr, .. }
			if stderr.contains("busy") || stderr.contains("in use") =>
		{
			EjectError::Busy(stderr.clone())
		}
		_ => EjectError::Command(e),
	}
}

/// `udisksctl unmount` followed by `udisksctl power-off` on the device backing the mount.
#[derive(Debug, Clone)]
pub struct UdisksEject {
	runner: Arc<dyn CommandRunner>,
	system: Arc<dyn HostTables>,
	timeout: Duration,
}

impl UdisksEject {
	pub fn new(
		runner: Arc<dyn CommandRunner>,
		system: Arc<dyn HostTables>,
		timeout: Duration,
	) -> Self {
		Self {
			runner,
			system,
			timeout,
		}
	}
}

#[async_trait]
impl EjectMethod for UdisksEject {
	fn name(&self) -> &str {
		"udisksctl"
	}

	async fn eject(&self, volume: &Volume) -> Result<String, EjectError> {
		let device = self
			.system
			.device_for_mount(&volume.root)
			.await
			.ok_or_else(|| {
				EjectError::Failed(format!("no block device mounted at {}", volume.root.display()))
			})?;

		self.runner
			.run(
				&CommandLine::new("udisksctl").args(["unmount", "-b", &device]),
				self.timeout,
			)
			.await
			.map_err(busy_or_command)?;

		match self
			.runner
			.run(
				&CommandLine::new("udisksctl").args(["power-off", "-b", &device]),
				self.timeout,
			)
			.await
		{
			Ok(_) => Ok(format!("{device} unmounted and powered off")),
			Err(e) => {
				// Unmounted is already safe to unplug.
				warn!(?e, %device, "Power-off failed after unmount");
				Ok(format!("{device} unmounted; power-off was refused"))
			}
		}
	}
}

/// `gio mount -e`, which goes through the same volume monitor the file manager uses.
#[derive(Debug, Clone)]
pub struct GioEject {
	runner: Arc<dyn CommandRunner>,
	timeout: Duration,
}

impl GioEject {
	pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
		Self { runner, timeout }
	}
}

#[async_trait]
impl EjectMethod for GioEject {
	fn name(&self) -> &str {
		"gio mount"
	}

	async fn eject(&self, volume: &Volume) -> Result<String, EjectError> {
		self.runner
			.run(
				&CommandLine::new("gio")
					.args(["mount", "-e"])
					.arg(volume.root.to_string_lossy()),
				self.timeout,
			)
			.await
			.map_err(busy_or_command)?;

		Ok(format!("{} ejected through gio", volume.root.display()))
	}
}

#[derive(Debug, Clone)]
pub struct DiskutilEject {
	runner: Arc<dyn CommandRunner>,
	timeout: Duration,
}

impl DiskutilEject {
	pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
		Self { runner, timeout }
	}
}

#[async_trait]
impl EjectMethod for DiskutilEject {
	fn name(&self) -> &str {
		"diskutil"
	}

	async fn eject(&self, volume: &Volume) -> Result<String, EjectError> {
		let output = self
			.runner
			.run(
				&CommandLine::new("diskutil")
					.arg("eject")
					.arg(volume.root.to_string_lossy()),
				self.timeout,
			)
			.await
			.map_err(busy_or_command)?;

		Ok(output.stdout.trim().to_string())
	}
}

/// Asks Finder to eject the disk by name.
#[derive(Debug, Clone)]
pub struct FinderEject {
	runner: Arc<dyn CommandRunner>,
	timeout: Duration,
}

impl FinderEject {
	pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
		Self { runner, timeout }
	}
}

fn disk_name(volume: &Volume) -> Option<String> {
	volume
		.label
		.clone()
		.or_else(|| {
			volume
				.root
				.file_name()
				.map(|name| name.to_string_lossy().into_owned())
		})
		.map(|name| name.replace('"', ""))
		.filter(|name| !name.is_empty())
}

#[async_trait]
impl EjectMethod for FinderEject {
	fn name(&self) -> &str {
		"finder"
	}

	async fn eject(&self, volume: &Volume) -> Result<String, EjectError> {
		let name = disk_name(volume)
			.ok_or_else(|| EjectError::Unsupported("volume has no disk name".into()))?;

		self.runner
			.run(
				&CommandLine::new("osascript").arg("-e").arg(format!(
					"tell application \"Finder\" to eject disk \"{name}\""
				)),
				self.timeout,
			)
			.await
			.map_err(busy_or_command)?;

		Ok(format!("Finder ejected \"{name}\""))
	}
}

/// Invokes Explorer's own "Eject" verb, then waits for the drive to disappear.
#[derive(Debug, Clone)]
pub struct ShellVerbEject {
	runner: Arc<dyn CommandRunner>,
	timing: ShellTiming,
}

impl ShellVerbEject {
	pub fn new(runner: Arc<dyn CommandRunner>, timing: ShellTiming) -> Self {
		Self { runner, timing }
	}
}

#[async_trait]
impl EjectMethod for ShellVerbEject {
	fn name(&self) -> &str {
		"shell verb"
	}

	async fn eject(&self, volume: &Volume) -> Result<String, EjectError> {
		let letter = volume
			.drive_letter
			.ok_or_else(|| EjectError::Unsupported("volume has no drive letter".into()))?;

		// Namespace 17 is "This PC".
		let script = format!(
			"(New-Object -comObject Shell.Application).Namespace(17).ParseName('{letter}:').InvokeVerb('Eject')"
		);
		self.runner
			.run(
				&CommandLine::new("powershell")
					.args(["-NoProfile", "-NonInteractive", "-Command"])
					.arg(script),
				self.timing.cache_tool_timeout(),
			)
			.await?;

		// InvokeVerb returns before Explorer acts and reports nothing on refusal.
		for attempt in 1..=self.timing.stop_polls.max(1) {
			if !guard::exists(&volume.root).await.unwrap_or(true) {
				debug!(attempt, volume = %volume.id(), "Drive disappeared after eject verb");
				return Ok(format!("{letter}: ejected through Explorer"));
			}
			sleep(self.timing.stop_poll_interval()).await;
		}

		Err(EjectError::StillMounted(volume.root.clone()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		command::CommandOutput,
		testing::{FakeCommandRunner, FakeHostTables},
		volume::VolumeKind,
	};
	use pretty_assertions::assert_eq;

	fn usb_stick() -> Arc<FakeHostTables> {
		let system = Arc::new(FakeHostTables::new());
		system.mount("/", "/dev/sda2");
		system.mount("/media/me/USB STICK", "/dev/sdb1");
		system
	}

	#[tokio::test]
	async fn udisks_unmounts_then_powers_off() {
		let runner = Arc::new(FakeCommandRunner::new());
		let method = UdisksEject::new(runner.clone(), usb_stick(), Duration::from_secs(1));

		let detail = method
			.eject(&Volume::new("/media/me/USB STICK", VolumeKind::Removable))
			.await
			.unwrap();
		assert!(detail.contains("/dev/sdb1"));
		assert_eq!(
			runner.calls(),
			vec![
				"udisksctl unmount -b /dev/sdb1".to_string(),
				"udisksctl power-off -b /dev/sdb1".to_string(),
			]
		);
	}

	#[tokio::test]
	async fn busy_unmounts_are_typed() {
		let runner = Arc::new(FakeCommandRunner::new());
		runner.respond_prefix(
			"udisksctl unmount",
			CommandOutput::failure(1, "Error unmounting /dev/sdb1: target is busy"),
		);
		let err = UdisksEject::new(runner.clone(), usb_stick(), Duration::from_secs(1))
			.eject(&Volume::new("/media/me/USB STICK", VolumeKind::Removable))
			.await
			.unwrap_err();

		assert!(matches!(err, EjectError::Busy(_)));
		assert_eq!(runner.calls().len(), 1);
	}

	#[tokio::test]
	async fn unmounted_roots_are_not_sent_to_udisks() {
		let runner = Arc::new(FakeCommandRunner::new());
		let err = UdisksEject::new(runner.clone(), usb_stick(), Duration::from_secs(1))
			.eject(&Volume::new("/media/me/OTHER", VolumeKind::Removable))
			.await
			.unwrap_err();

		assert!(matches!(err, EjectError::Failed(_)));
		assert!(runner.calls().is_empty());
	}

	#[tokio::test]
	async fn shell_verb_waits_for_the_drive_to_vanish() {
		let runner = Arc::new(FakeCommandRunner::new());
		let method = ShellVerbEject::new(runner.clone(), ShellTiming::immediate());

		let gone = Volume::new(r"Q:\", VolumeKind::Removable);
		assert!(method.eject(&gone).await.is_ok());
		assert!(runner.calls()[0].contains("ParseName('Q:')"));

		let present = tempfile::tempdir().unwrap();
		let still_there = Volume::new(present.path(), VolumeKind::Removable).with_drive_letter('R');
		assert!(matches!(
			method.eject(&still_there).await,
			Err(EjectError::StillMounted(_))
		));
	}

	#[tokio::test]
	async fn finder_quotes_the_disk_name() {
		let runner = Arc::new(FakeCommandRunner::new());
		FinderEject::new(runner.clone(), Duration::from_secs(1))
			.eject(&Volume::new("/Volumes/Backup", VolumeKind::Removable))
			.await
			.unwrap();
		assert_eq!(
			runner.calls(),
			vec![r#"osascript -e "tell application "Finder" to eject disk "Backup"""#.to_string()]
		);
	}
}
