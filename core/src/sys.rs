//! Process and disk lookups against the host's live tables.

use async_trait::async_trait;
use std::{
	fmt,
	path::{Path, PathBuf},
};
use sysinfo::{Disks, ProcessRefreshKind, RefreshKind, System};
use tracing::{trace, warn};

/// Linux truncates process names to 15 bytes in `/proc/<pid>/stat`.
const COMM_NAME_LEN: usize = 15;

#[async_trait]
pub trait HostTables: fmt::Debug + Send + Sync {
	/// Whether a process with exactly this name is running; `None` when the table could not be read.
	async fn is_running(&self, process: &str) -> Option<bool>;

	/// The block device mounted at `root`.
	async fn device_for_mount(&self, root: &Path) -> Option<String>;
}

/// [`HostTables`] backed by `sysinfo`. Each call takes a fresh snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoTables;

fn matches_process_name(candidate: &str, wanted: &str) -> bool {
	candidate.eq_ignore_ascii_case(wanted)
		|| (wanted.len() > COMM_NAME_LEN
			&& wanted.is_char_boundary(COMM_NAME_LEN)
			&& candidate == &wanted[..COMM_NAME_LEN])
}

/// Last mount wins when mounts are stacked on the same point.
#[must_use]
pub fn device_at<'a>(
	mounts: impl IntoIterator<Item = (&'a str, &'a Path)>,
	root: &Path,
) -> Option<String> {
	mounts
		.into_iter()
		.filter(|(device, mount_point)| *mount_point == root && device.starts_with("/dev/"))
		.last()
		.map(|(device, _)| device.to_string())
}

#[async_trait]
impl HostTables for SysinfoTables {
	async fn is_running(&self, process: &str) -> Option<bool> {
		let wanted = process.to_string();

		tokio::task::spawn_blocking(move || {
			let system = System::new_with_specifics(
				RefreshKind::new().with_processes(ProcessRefreshKind::new()),
			);
			let running = system
				.processes()
				.values()
				.any(|candidate| matches_process_name(&candidate.name().to_string_lossy(), &wanted));
			trace!(process = %wanted, running, "Process table checked");
			running
		})
		.await
		.map_err(|e| warn!(?e, "Process table task failed"))
		.ok()
	}

	async fn device_for_mount(&self, root: &Path) -> Option<String> {
		let root = root.to_path_buf();

		tokio::task::spawn_blocking(move || {
			let disks = Disks::new_with_refreshed_list();
			let mounts = disks
				.list()
				.iter()
				.map(|disk| {
					(
						disk.name().to_string_lossy().into_owned(),
						disk.mount_point().to_path_buf(),
					)
				})
				.collect::<Vec<(String, PathBuf)>>();

			device_at(
				mounts
					.iter()
					.map(|(device, mount_point)| (device.as_str(), mount_point.as_path())),
				&root,
			)
		})
		.await
		.map_err(|e| warn!(?e, "Disk list task failed"))
		.ok()
		.flatten()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn truncated_process_names_still_match() {
		assert!(matches_process_name("explorer.exe", "explorer.exe"));
		assert!(matches_process_name("Explorer.EXE", "explorer.exe"));
		assert!(matches_process_name("dde-file-manage", "dde-file-manager"));
		assert!(!matches_process_name("nautilus-extra", "nautilus"));
		assert!(!matches_process_name("thunar", "nautilus"));
	}

	#[test]
	fn devices_are_resolved_from_the_mount_point() {
		let mounts = [
			("sysfs", Path::new("/sys")),
			("/dev/sda2", Path::new("/")),
			("/dev/sdb1", Path::new("/media/me/USB STICK")),
			("/dev/sdc1", Path::new("/media/me/USB STICK")),
		];

		assert_eq!(
			device_at(mounts, Path::new("/media/me/USB STICK")),
			Some("/dev/sdc1".to_string())
		);
		assert_eq!(device_at(mounts, Path::new("/sys")), None);
		assert_eq!(device_at(mounts, Path::new("/media/other")), None);
	}

	#[tokio::test]
	async fn sysinfo_sees_this_test_process() {
		let system = System::new_with_specifics(
			RefreshKind::new().with_processes(ProcessRefreshKind::new()),
		);
		let Some(me) = sysinfo::get_current_pid()
			.ok()
			.and_then(|pid| system.process(pid))
			.map(|process| process.name().to_string_lossy().into_owned())
		else {
			return;
		};

		assert_eq!(SysinfoTables.is_running(&me).await, Some(true));
	}
}
