//! Telling a running shell that a volume's appearance changed.

use async_trait::async_trait;
use std::{
	fmt, io,
	path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
	#[error("failed to signal change for <path='{}'>: {source}", path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("notification task panicked or was cancelled")]
	Join,
}

#[async_trait]
pub trait ChangeNotifier: fmt::Debug + Send + Sync {
	async fn notify(&self, path: &Path) -> Result<(), NotifyError>;
}

/// Bumps the root's modification time so inotify/FSEvents watchers in file managers re-read it.
#[derive(Debug, Default, Clone, Copy)]
pub struct MtimeNotifier;

#[async_trait]
impl ChangeNotifier for MtimeNotifier {
	async fn notify(&self, path: &Path) -> Result<(), NotifyError> {
		let path = path.to_path_buf();
		tokio::task::spawn_blocking(move || {
			std::fs::File::open(&path)
				.and_then(|dir| dir.set_modified(std::time::SystemTime::now()))
				.map_err(|source| NotifyError::Io { path, source })
		})
		.await
		.map_err(|_| NotifyError::Join)?
	}
}

/// `SHChangeNotify` with the events Explorer listens to for drive icon changes.
#[cfg(windows)]
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellChangeNotifier;

#[cfg(windows)]
#[async_trait]
impl ChangeNotifier for ShellChangeNotifier {
	async fn notify(&self, path: &Path) -> Result<(), NotifyError> {
		use std::os::windows::ffi::OsStrExt;
		use windows_sys::Win32::UI::Shell::{
			SHChangeNotify, SHCNE_ASSOCCHANGED, SHCNE_RENAMEFOLDER, SHCNE_UPDATEITEM,
			SHCNF_IDLIST, SHCNF_PATHW,
		};

		let wide_path = path
			.as_os_str()
			.encode_wide()
			.chain(std::iter::once(0))
			.collect::<Vec<u16>>();

		tokio::task::spawn_blocking(move || {
			let item = wide_path.as_ptr().cast::<std::ffi::c_void>();
			// SAFETY: `wide_path` is NUL terminated and outlives these synchronous calls
			unsafe {
				SHChangeNotify(SHCNE_UPDATEITEM, SHCNF_PATHW, item, std::ptr::null());
				SHChangeNotify(SHCNE_RENAMEFOLDER, SHCNF_PATHW, item, item);
				SHChangeNotify(
					SHCNE_ASSOCCHANGED,
					SHCNF_IDLIST,
					std::ptr::null(),
					std::ptr::null(),
				);
			}
		})
		.await
		.map_err(|_| NotifyError::Join)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::{Duration, SystemTime};

	#[cfg(unix)]
	#[tokio::test]
	async fn mtime_notifier_touches_the_directory() {
		let dir = tempfile::tempdir().unwrap();
		let old = SystemTime::now() - Duration::from_secs(3600);
		std::fs::File::open(dir.path()).unwrap().set_modified(old).unwrap();

		MtimeNotifier.notify(dir.path()).await.unwrap();

		let modified = std::fs::metadata(dir.path()).unwrap().modified().unwrap();
		assert!(modified > old + Duration::from_secs(60));
	}

	#[tokio::test]
	async fn mtime_notifier_reports_missing_roots() {
		let err = MtimeNotifier
			.notify(Path::new("/definitely/not/mounted"))
			.await
			.unwrap_err();
		assert!(matches!(err, NotifyError::Io { .. }));
	}
}
