//! Filesystem mutations that refuse to run on anything the classifier doesn't recognize.

use super::classification::{MetadataEntry, VolumeClassifier};

use di_utils::FileIOError;
use std::{
	io,
	path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum GuardError {
	#[error("refusing to modify unclassified path <path='{}'>", .0.display())]
	Refused(PathBuf),
	#[error(transparent)]
	Io(#[from] FileIOError),
}

impl GuardError {
	#[must_use]
	pub fn is_permission_denied(&self) -> bool {
		matches!(self, Self::Io(e) if e.is_permission_denied())
	}
}

#[derive(Debug, Clone, Copy)]
pub struct GuardedFs<'a> {
	classifier: &'a VolumeClassifier,
}

impl<'a> GuardedFs<'a> {
	#[must_use]
	pub const fn new(classifier: &'a VolumeClassifier) -> Self {
		Self { classifier }
	}

	fn check(&self, path: &Path) -> Result<MetadataEntry, GuardError> {
		self.classifier
			.entry(path)
			.ok_or_else(|| GuardError::Refused(path.to_path_buf()))
	}

	pub async fn create_dir(&self, path: impl AsRef<Path>) -> Result<MetadataEntry, GuardError> {
		let path = path.as_ref();
		let entry = self.check(path)?;
		fs::create_dir_all(path)
			.await
			.map_err(|e| FileIOError::from((path, e, "creating marker directory")))?;
		Ok(entry)
	}

	/// Creates or truncates `path` with `contents`.
	pub async fn write(
		&self,
		path: impl AsRef<Path>,
		contents: impl AsRef<[u8]> + Send,
	) -> Result<MetadataEntry, GuardError> {
		let path = path.as_ref();
		let entry = self.check(path)?;
		fs::write(path, contents)
			.await
			.map_err(|e| FileIOError::from((path, e)))?;
		debug!(path = %path.display(), role = ?entry.role, "Wrote metadata entry");
		Ok(entry)
	}

	/// Writes only when nothing exists at `path`. `None` means an existing entry was left alone.
	pub async fn write_if_absent(
		&self,
		path: impl AsRef<Path>,
		contents: impl AsRef<[u8]> + Send,
	) -> Result<Option<MetadataEntry>, GuardError> {
		let path = path.as_ref();
		self.check(path)?;
		if exists(path).await? {
			debug!(path = %path.display(), "Keeping existing entry");
			return Ok(None);
		}
		self.write(path, contents).await.map(Some)
	}

	/// Removes a file, a symlink, or a marker directory. Children of a directory are
	/// removed only when they are themselves classified safe; the directory itself is
	/// kept when anything foreign remains inside it.
	///
	/// Returns how many entries were deleted, `0` when nothing was there.
	pub async fn remove(&self, path: impl AsRef<Path>) -> Result<usize, GuardError> {
		let path = path.as_ref();
		self.check(path)?;

		let metadata = match fs::symlink_metadata(path).await {
			Ok(metadata) => metadata,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
			Err(e) => return Err(FileIOError::from((path, e)).into()),
		};

		if !metadata.is_dir() {
			fs::remove_file(path)
				.await
				.map_err(|e| FileIOError::from((path, e)))?;
			debug!(path = %path.display(), "Removed metadata entry");
			return Ok(1);
		}

		let mut removed = 0;
		let mut kept = 0;
		let mut read_dir = fs::read_dir(path)
			.await
			.map_err(|e| FileIOError::from((path, e)))?;

		while let Some(child) = read_dir
			.next_entry()
			.await
			.map_err(|e| FileIOError::from((path, e)))?
		{
			let child_path = child.path();
			let is_file = child
				.file_type()
				.await
				.map(|file_type| !file_type.is_dir())
				.unwrap_or(false);

			if is_file && self.classifier.is_safe(&child_path) {
				fs::remove_file(&child_path)
					.await
					.map_err(|e| FileIOError::from((&child_path, e)))?;
				removed += 1;
			} else {
				warn!(path = %child_path.display(), "Leaving unrecognized entry in marker directory");
				kept += 1;
			}
		}

		if kept == 0 {
			fs::remove_dir(path)
				.await
				.map_err(|e| FileIOError::from((path, e)))?;
			removed += 1;
		}

		debug!(path = %path.display(), removed, kept, "Removed marker directory contents");

		Ok(removed)
	}
}

pub async fn exists(path: &Path) -> Result<bool, FileIOError> {
	match fs::symlink_metadata(path).await {
		Ok(_) => Ok(true),
		Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
		Err(e) => Err(FileIOError::from((path, e))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::volume::layout::{DESKTOP_INI, ICON_DIR, ICO_FILE};
	use pretty_assertions::assert_eq;

	#[tokio::test]
	async fn refuses_unclassified_paths() {
		let dir = tempfile::tempdir().unwrap();
		let classifier = VolumeClassifier::new(dir.path());
		let guarded = GuardedFs::new(&classifier);

		let user_file = dir.path().join("thesis.docx");
		std::fs::write(&user_file, b"important").unwrap();

		assert!(matches!(
			guarded.write(&user_file, b"oops").await,
			Err(GuardError::Refused(_))
		));
		assert!(matches!(
			guarded.remove(&user_file).await,
			Err(GuardError::Refused(_))
		));
		assert_eq!(std::fs::read(&user_file).unwrap(), b"important");
	}

	#[tokio::test]
	async fn removing_marker_dir_keeps_foreign_children() {
		let dir = tempfile::tempdir().unwrap();
		let classifier = VolumeClassifier::new(dir.path());
		let guarded = GuardedFs::new(&classifier);

		let icons = dir.path().join(ICON_DIR);
		guarded.create_dir(&icons).await.unwrap();
		guarded.write(icons.join(ICO_FILE), b"ico").await.unwrap();
		std::fs::write(icons.join("my-own.png"), b"user").unwrap();

		assert_eq!(guarded.remove(&icons).await.unwrap(), 1);
		assert!(icons.join("my-own.png").exists());
		assert!(!icons.join(ICO_FILE).exists());

		std::fs::remove_file(icons.join("my-own.png")).unwrap();
		assert_eq!(guarded.remove(&icons).await.unwrap(), 1);
		assert!(!icons.exists());
		assert_eq!(guarded.remove(&icons).await.unwrap(), 0);
	}

	#[tokio::test]
	async fn write_if_absent_never_overwrites() {
		let dir = tempfile::tempdir().unwrap();
		let classifier = VolumeClassifier::new(dir.path());
		let guarded = GuardedFs::new(&classifier);
		let ini = dir.path().join(DESKTOP_INI);

		assert!(guarded.write_if_absent(&ini, b"first").await.unwrap().is_some());
		assert!(guarded.write_if_absent(&ini, b"second").await.unwrap().is_none());
		assert_eq!(std::fs::read(&ini).unwrap(), b"first");
	}
}
