//! Read-only snapshot of everything the pipeline would touch on a volume.

use crate::{
	context::{DesktopEnvironment, Platform},
	store::StoreState,
	volume::{
		layout::{HIDDEN_LIST, ICON_DIR, ROOT_MARKERS},
		Classification, Volume, VolumeClassifier, VolumeKind,
	},
};

use serde::{Deserialize, Serialize};
use std::{
	fmt,
	fs::Metadata,
	path::{Path, PathBuf},
};
use tokio::fs;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerStatus {
	pub name: String,
	pub path: PathBuf,
	pub present: bool,
	pub hidden: bool,
	pub classification: Classification,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconFileStatus {
	pub name: String,
	pub size: u64,
	pub hidden: bool,
	pub safe: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnoseReport {
	pub platform: Platform,
	pub desktop: DesktopEnvironment,
	pub elevated: bool,
	pub volume: String,
	pub root: PathBuf,
	pub kind: VolumeKind,
	pub writable: bool,
	pub root_exists: bool,
	pub store: StoreState,
	pub markers: Vec<MarkerStatus>,
	pub icon_files: Vec<IconFileStatus>,
}

impl DiagnoseReport {
	/// Whether any trace of a custom icon was found.
	#[must_use]
	pub fn has_icon_state(&self) -> bool {
		self.store.asset_present
			|| self.store.registered_icon.is_some()
			|| self.store.marker.is_some()
			|| self.markers.iter().any(|marker| marker.present)
	}
}

impl fmt::Display for DiagnoseReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let yes_no = |flag: bool| if flag { "yes" } else { "no" };

		writeln!(f, "Volume {} ({})", self.volume, self.root.display())?;
		writeln!(
			f,
			"  platform: {}  desktop: {}  elevated: {}",
			self.platform,
			self.desktop,
			yes_no(self.elevated)
		)?;
		writeln!(
			f,
			"  kind: {}  writable: {}  mounted: {}",
			self.kind,
			yes_no(self.writable),
			yes_no(self.root_exists)
		)?;

		writeln!(f, "Icon store")?;
		match &self.store.asset {
			Some(asset) => writeln!(
				f,
				"  asset: {} (present: {})",
				asset.display(),
				yes_no(self.store.asset_present)
			)?,
			None => writeln!(f, "  asset: none")?,
		}
		for entry in &self.store.hives {
			writeln!(
				f,
				"  {}: icon={} label={}",
				entry.hive.map_or_else(|| "?".to_string(), |hive| hive.to_string()),
				entry.icon.as_deref().unwrap_or("-"),
				entry.label.as_deref().unwrap_or("-")
			)?;
		}
		if let Some(marker) = &self.store.marker {
			writeln!(f, "  marker: {}", marker.display())?;
		}

		writeln!(f, "Markers")?;
		for marker in &self.markers {
			writeln!(
				f,
				"  {:<24} present: {:<3}  hidden: {:<3}  safe: {}",
				marker.name,
				yes_no(marker.present),
				yes_no(marker.hidden),
				yes_no(marker.classification.is_safe())
			)?;
		}

		if !self.icon_files.is_empty() {
			writeln!(f, "{ICON_DIR}/")?;
			for file in &self.icon_files {
				writeln!(
					f,
					"  {:<24} {:>8} bytes  hidden: {:<3}  safe: {}",
					file.name,
					file.size,
					yes_no(file.hidden),
					yes_no(file.safe)
				)?;
			}
		}

		Ok(())
	}
}

pub(super) async fn inspect_volume(
	volume: &Volume,
	classifier: &VolumeClassifier,
) -> (Vec<MarkerStatus>, Vec<IconFileStatus>) {
	let hidden_list = fs::read_to_string(volume.root.join(HIDDEN_LIST))
		.await
		.unwrap_or_default();

	let mut markers = Vec::with_capacity(ROOT_MARKERS.len() + 1);
	for name in std::iter::once(ICON_DIR).chain(ROOT_MARKERS) {
		let path = volume.root.join(name);
		let metadata = fs::symlink_metadata(&path).await.ok();
		markers.push(MarkerStatus {
			name: name.to_string(),
			hidden: metadata
				.as_ref()
				.is_some_and(|metadata| is_hidden(&path, metadata, &hidden_list)),
			present: metadata.is_some(),
			classification: classifier.classify(&path),
			path,
		});
	}

	let mut icon_files = Vec::new();
	if let Ok(mut read_dir) = fs::read_dir(volume.root.join(ICON_DIR)).await {
		while let Ok(Some(entry)) = read_dir.next_entry().await {
			let path = entry.path();
			let Ok(metadata) = entry.metadata().await else {
				continue;
			};
			icon_files.push(IconFileStatus {
				name: entry.file_name().to_string_lossy().into_owned(),
				size: metadata.len(),
				hidden: is_hidden(&path, &metadata, ""),
				safe: classifier.is_safe(&path),
			});
		}
	}
	icon_files.sort_by(|a, b| a.name.cmp(&b.name));

	(markers, icon_files)
}

#[cfg(not(windows))]
fn is_dot_file(path: &Path) -> bool {
	path.file_name()
		.and_then(|name| name.to_str())
		.is_some_and(|name| name.starts_with('.'))
}

#[cfg(windows)]
fn is_hidden(_path: &Path, metadata: &Metadata, _hidden_list: &str) -> bool {
	use std::os::windows::fs::MetadataExt;
	use windows_sys::Win32::Storage::FileSystem::FILE_ATTRIBUTE_HIDDEN;

	metadata.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0
}

#[cfg(target_os = "macos")]
fn is_hidden(path: &Path, metadata: &Metadata, _hidden_list: &str) -> bool {
	use std::os::macos::fs::MetadataExt;
	const UF_HIDDEN: u32 = 0x8000;

	is_dot_file(path) || metadata.st_flags() & UF_HIDDEN != 0
}

#[cfg(not(any(windows, target_os = "macos")))]
fn is_hidden(path: &Path, _metadata: &Metadata, hidden_list: &str) -> bool {
	is_dot_file(path)
		|| path
			.file_name()
			.and_then(|name| name.to_str())
			.is_some_and(|name| hidden_list.lines().any(|line| line.trim() == name))
}
