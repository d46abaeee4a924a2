//! On-volume writes shared by apply and remove: assets, descriptors, hiding and cleanup.

use crate::{
	command::{CommandLine, CommandRunner},
	context::Platform,
	volume::{
		guard::{self, GuardError, GuardedFs},
		layout::{
			self, AUTORUN_INF, DESKTOP_INI, DIRECTORY_ENTRY, DS_STORE, FSEVENTSD_DIR, HIDDEN_LIST,
			ICON_DIR, METADATA_NEVER_INDEX, VOLUME_ICON_ICNS,
		},
		MetadataEntry, Volume, VolumeKind, VolumeLayout,
	},
};

use di_images::IconAssetBundle;
use di_utils::FileIOError;
use std::{
	io,
	path::{Path, PathBuf},
	time::Duration,
};
use tokio::fs;
use tracing::{debug, warn};

/// Entries cleared before a rewrite and deleted by remove, in that order.
const REWRITTEN: [&str; 5] = [ICON_DIR, DESKTOP_INI, AUTORUN_INF, DIRECTORY_ENTRY, VOLUME_ICON_ICNS];

/// Names that are not dot-files and so need an explicit entry in the `.hidden` list.
const LISTED_HIDDEN: [&str; 2] = [DESKTOP_INI, AUTORUN_INF];

/// Per-file failures that were logged and skipped.
pub type Failures = Vec<(PathBuf, String)>;

pub struct MarkerWriter<'a> {
	platform: Platform,
	runner: &'a dyn CommandRunner,
	timeout: Duration,
	guarded: GuardedFs<'a>,
	layout: VolumeLayout,
}

impl<'a> MarkerWriter<'a> {
	pub fn new(
		platform: Platform,
		runner: &'a dyn CommandRunner,
		timeout: Duration,
		guarded: GuardedFs<'a>,
		volume: &Volume,
	) -> Self {
		Self {
			platform,
			runner,
			timeout,
			guarded,
			layout: VolumeLayout::new(&volume.root),
		}
	}

	#[must_use]
	pub const fn layout(&self) -> &VolumeLayout {
		&self.layout
	}

	/// Clears read-only, hidden and system attributes so Windows lets us rewrite or delete.
	async fn unlock(&self, path: &Path) {
		if self.platform != Platform::Windows {
			return;
		}

		let command = CommandLine::new("attrib")
			.args(["-R", "-H", "-S"])
			.arg(path.to_string_lossy());
		if let Err(e) = self.runner.run(&command, self.timeout).await {
			debug!(?e, %command, "Clearing attributes failed");
		}
	}

	async fn remove(&self, path: &Path, removed: &mut Vec<PathBuf>, failures: &mut Failures) {
		match guard::exists(path).await {
			Ok(false) => return,
			Ok(true) => {}
			Err(e) => {
				failures.push((path.to_path_buf(), e.to_string()));
				return;
			}
		}

		self.unlock(path).await;
		match self.guarded.remove(path).await {
			Ok(0) => {}
			Ok(_) => removed.push(path.to_path_buf()),
			Err(e) => {
				warn!(?e, path = %path.display(), "Skipping entry that could not be removed");
				failures.push((path.to_path_buf(), e.to_string()));
			}
		}
	}

	/// Deletes assets and descriptors a previous run left behind.
	pub async fn purge(&self) -> (Vec<PathBuf>, Failures) {
		let mut removed = Vec::new();
		let mut failures = Failures::new();

		for name in REWRITTEN {
			self.remove(&self.layout.entry(name), &mut removed, &mut failures)
				.await;
		}

		(removed, failures)
	}

	/// Writes the `.icons` directory. Failing to create the directory is an error, single files are not.
	pub async fn write_assets(
		&self,
		bundle: &IconAssetBundle,
	) -> Result<(Vec<MetadataEntry>, Failures), GuardError> {
		let mut written = vec![self.guarded.create_dir(self.layout.icon_dir()).await?];
		let mut failures = Failures::new();

		let mut files = vec![(self.layout.ico(), bundle.ico.as_slice())];
		if let Ok(primary) = bundle.primary() {
			files.push((self.layout.primary_png(), primary.png.as_slice()));
		}
		if let Ok(largest) = bundle.largest() {
			files.push((self.layout.volume_icon_png(), largest.png.as_slice()));
		}
		files.extend(
			bundle
				.bitmaps
				.iter()
				.map(|bitmap| (self.layout.sized_png(bitmap.size), bitmap.png.as_slice())),
		);

		for (path, contents) in files {
			match self.guarded.write(&path, contents).await {
				Ok(entry) => written.push(entry),
				Err(e) => {
					warn!(?e, path = %path.display(), "Icon asset not written");
					failures.push((path, e.to_string()));
				}
			}
		}

		Ok((written, failures))
	}

	/// Writes every platform's root descriptors, except `skip` which the icon store already wrote.
	pub async fn write_descriptors(
		&self,
		volume: &Volume,
		bundle: &IconAssetBundle,
		label: Option<&str>,
		skip: Option<&str>,
	) -> (Vec<MetadataEntry>, Failures) {
		let mut plain: Vec<(&str, Vec<u8>)> = vec![
			(DESKTOP_INI, layout::desktop_ini(label).into_bytes()),
			(DIRECTORY_ENTRY, layout::directory_entry(label).into_bytes()),
			(VOLUME_ICON_ICNS, bundle.icns.clone()),
			(METADATA_NEVER_INDEX, Vec::new()),
		];
		if volume.kind == VolumeKind::Removable {
			plain.insert(1, (AUTORUN_INF, layout::autorun_inf(label).into_bytes()));
		}

		let mut written = Vec::new();
		let mut failures = Failures::new();
		let mut record = |path: PathBuf, result: Result<Option<MetadataEntry>, GuardError>| match result
		{
			Ok(Some(entry)) => written.push(entry),
			Ok(None) => {}
			Err(e) => {
				warn!(?e, path = %path.display(), "Platform marker not written");
				failures.push((path, e.to_string()));
			}
		};

		for (name, contents) in plain {
			if Some(name) == skip {
				continue;
			}
			let path = self.layout.entry(name);
			let result = self.guarded.write(&path, contents).await.map(Some);
			record(path, result);
		}

		// Finder owns `.DS_Store` once it exists.
		let ds_store = self.layout.entry(DS_STORE);
		let result = self
			.guarded
			.write_if_absent(&ds_store, layout::ds_store_placeholder())
			.await;
		record(ds_store, result);

		let fseventsd = self.layout.entry(FSEVENTSD_DIR);
		match self.guarded.create_dir(&fseventsd).await {
			Ok(entry) => {
				record(fseventsd, Ok(Some(entry)));
				let no_log = self.layout.fseventsd_no_log();
				let result = self.guarded.write_if_absent(&no_log, b"").await;
				record(no_log, result);
			}
			Err(e) => record(fseventsd, Err(e)),
		}

		(written, failures)
	}

	/// Hides root-level entries the way the platform's shell expects.
	pub async fn hide(&self, entries: &[MetadataEntry]) -> (Vec<PathBuf>, Failures) {
		let targets = entries
			.iter()
			.filter(|entry| entry.hidden && entry.path.parent() == Some(self.layout.root()))
			.map(|entry| entry.path.clone())
			.collect::<Vec<_>>();

		match self.platform {
			Platform::Windows => self.run_per_path(&targets, &["+H", "+S"], "attrib").await,
			Platform::MacOs => {
				let visible = targets
					.into_iter()
					.filter(|path| !is_dot_file(path))
					.collect::<Vec<_>>();
				self.run_per_path(&visible, &["hidden"], "chflags").await
			}
			Platform::Linux => self.extend_hidden_list(&targets).await,
		}
	}

	async fn run_per_path(
		&self,
		paths: &[PathBuf],
		flags: &[&str],
		program: &str,
	) -> (Vec<PathBuf>, Failures) {
		let mut hidden = Vec::new();
		let mut failures = Failures::new();

		for path in paths {
			let command = CommandLine::new(program)
				.args(flags.iter().copied())
				.arg(path.to_string_lossy());
			match self.runner.run(&command, self.timeout).await {
				Ok(_) => hidden.push(path.clone()),
				Err(e) => {
					warn!(?e, %command, "Hiding entry failed");
					failures.push((path.clone(), e.to_string()));
				}
			}
		}

		(hidden, failures)
	}

	async fn extend_hidden_list(&self, targets: &[PathBuf]) -> (Vec<PathBuf>, Failures) {
		let names = targets
			.iter()
			.filter(|path| !is_dot_file(path))
			.filter_map(|path| path.file_name()?.to_str())
			.filter(|name| LISTED_HIDDEN.contains(name))
			.collect::<Vec<_>>();

		if names.is_empty() {
			return (Vec::new(), Failures::new());
		}

		let list = self.layout.entry(HIDDEN_LIST);
		let result = async {
			let existing = read_optional(&list).await?;
			let merged = layout::merge_hidden_list(&existing, &names);
			if merged != existing {
				self.guarded.write(&list, merged).await?;
			}
			Ok::<_, GuardError>(())
		}
		.await;

		match result {
			Ok(()) => (
				targets
					.iter()
					.filter(|path| !is_dot_file(path))
					.cloned()
					.collect(),
				Failures::new(),
			),
			Err(e) => {
				warn!(?e, path = %list.display(), "Hidden list not updated");
				(Vec::new(), vec![(list, e.to_string())])
			}
		}
	}

	/// Deletes everything apply may have written to the volume.
	pub async fn remove_all(&self) -> (Vec<PathBuf>, Failures) {
		let (mut removed, mut failures) = self.purge().await;

		for name in [FSEVENTSD_DIR, METADATA_NEVER_INDEX] {
			self.remove(&self.layout.entry(name), &mut removed, &mut failures)
				.await;
		}

		let ds_store = self.layout.entry(DS_STORE);
		match fs::read(&ds_store).await {
			Ok(bytes) if layout::is_ds_store_placeholder(&bytes) => {
				self.remove(&ds_store, &mut removed, &mut failures).await;
			}
			Ok(_) => debug!("Keeping .DS_Store written by Finder"),
			Err(e) if e.kind() == io::ErrorKind::NotFound => {}
			Err(e) => failures.push((ds_store, e.to_string())),
		}

		let list = self.layout.entry(HIDDEN_LIST);
		if let Err(e) = self.strip_hidden_list(&list, &mut removed).await {
			warn!(?e, path = %list.display(), "Hidden list not cleaned");
			failures.push((list, e.to_string()));
		}

		(removed, failures)
	}

	async fn strip_hidden_list(
		&self,
		list: &Path,
		changed: &mut Vec<PathBuf>,
	) -> Result<(), GuardError> {
		if !guard::exists(list).await? {
			return Ok(());
		}

		let existing = read_optional(list).await?;
		match layout::strip_hidden_list(&existing, &LISTED_HIDDEN) {
			None => {
				if self.guarded.remove(list).await? > 0 {
					changed.push(list.to_path_buf());
				}
			}
			Some(stripped) if stripped != existing => {
				self.guarded.write(list, stripped).await?;
				changed.push(list.to_path_buf());
			}
			Some(_) => {}
		}

		Ok(())
	}
}

fn is_dot_file(path: &Path) -> bool {
	path.file_name()
		.and_then(|name| name.to_str())
		.is_some_and(|name| name.starts_with('.'))
}

async fn read_optional(path: &Path) -> Result<String, FileIOError> {
	match fs::read_to_string(path).await {
		Ok(text) => Ok(text),
		Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
		Err(e) => Err(FileIOError::from((path, e, "reading hidden list"))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{testing::FakeCommandRunner, volume::VolumeClassifier};
	use di_images::IconAssetBuilder;
	use pretty_assertions::assert_eq;

	fn bundle() -> IconAssetBundle {
		IconAssetBuilder::new()
			.build(&di_images::DynamicImage::new_rgba8(8, 8))
			.unwrap()
	}

	#[tokio::test]
	async fn linux_hides_non_dot_descriptors_through_the_hidden_list() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join(HIDDEN_LIST), "Photos\n").unwrap();
		let volume = Volume::new(dir.path(), VolumeKind::Removable);
		let classifier = VolumeClassifier::new(dir.path());
		let runner = FakeCommandRunner::new();
		let writer = MarkerWriter::new(
			Platform::Linux,
			&runner,
			Duration::from_secs(1),
			GuardedFs::new(&classifier),
			&volume,
		);

		let (written, failures) = writer
			.write_descriptors(&volume, &bundle(), Some("Stick"), None)
			.await;
		assert!(failures.is_empty(), "{failures:?}");
		writer.hide(&written).await;

		let list = std::fs::read_to_string(dir.path().join(HIDDEN_LIST)).unwrap();
		assert_eq!(list, "Photos\ndesktop.ini\nautorun.inf\n");
		assert!(runner.calls().is_empty());

		writer.remove_all().await;
		let list = std::fs::read_to_string(dir.path().join(HIDDEN_LIST)).unwrap();
		assert_eq!(list, "Photos\n");
		assert!(!dir.path().join(DESKTOP_INI).exists());
	}

	#[tokio::test]
	async fn finder_state_is_never_overwritten_or_removed() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join(DS_STORE), b"Bud1 real finder data").unwrap();
		let volume = Volume::new(dir.path(), VolumeKind::Fixed);
		let classifier = VolumeClassifier::new(dir.path());
		let runner = FakeCommandRunner::new();
		let writer = MarkerWriter::new(
			Platform::MacOs,
			&runner,
			Duration::from_secs(1),
			GuardedFs::new(&classifier),
			&volume,
		);

		let (written, _) = writer.write_descriptors(&volume, &bundle(), None, None).await;
		assert!(!dir.path().join(AUTORUN_INF).exists());
		assert!(written.iter().all(|entry| !entry.path.ends_with(DS_STORE)));

		writer.remove_all().await;
		assert_eq!(
			std::fs::read(dir.path().join(DS_STORE)).unwrap(),
			b"Bud1 real finder data"
		);
	}

	#[tokio::test]
	async fn windows_unlocks_before_removal_and_hides_with_attrib() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join(DESKTOP_INI), "old").unwrap();
		let volume = Volume::new(dir.path(), VolumeKind::Removable);
		let classifier = VolumeClassifier::new(dir.path());
		let runner = FakeCommandRunner::new();
		let writer = MarkerWriter::new(
			Platform::Windows,
			&runner,
			Duration::from_secs(1),
			GuardedFs::new(&classifier),
			&volume,
		);

		let (removed, _) = writer.purge().await;
		assert_eq!(removed, vec![dir.path().join(DESKTOP_INI)]);
		assert!(runner.calls()[0].starts_with("attrib -R -H -S"));

		let (entries, _) = writer.write_assets(&bundle()).await.unwrap();
		let (hidden, failures) = writer.hide(&entries).await;
		assert!(failures.is_empty());
		assert_eq!(hidden, vec![dir.path().join(ICON_DIR)]);
	}
}
