//! POSIX persistence: a shell descriptor at the volume root plus desktop metadata hints.

use crate::{
	command::{CommandLine, CommandRunner},
	context::{DesktopEnvironment, Platform},
	volume::{
		guard::{self, GuardError, GuardedFs},
		layout,
		Volume,
	},
};

use di_images::IconAssetBundle;
use std::{
	path::{Path, PathBuf},
	sync::Arc,
	time::Duration,
};
use tracing::{debug, warn};

const GIO_CUSTOM_ICON: &str = "metadata::custom-icon";

/// Best-effort hints that did not make it, as human-readable lines.
pub type Warnings = Vec<String>;

#[derive(Debug, Clone)]
pub struct MarkerStore {
	platform: Platform,
	desktop: DesktopEnvironment,
	runner: Arc<dyn CommandRunner>,
	timeout: Duration,
}

impl MarkerStore {
	pub fn new(
		platform: Platform,
		desktop: DesktopEnvironment,
		runner: Arc<dyn CommandRunner>,
		timeout: Duration,
	) -> Self {
		Self {
			platform,
			desktop,
			runner,
			timeout,
		}
	}

	/// The descriptor this platform's shell reads, relative to the volume root.
	#[must_use]
	pub const fn marker_name(&self) -> &'static str {
		match self.platform {
			Platform::MacOs => layout::VOLUME_ICON_ICNS,
			Platform::Linux | Platform::Windows => layout::DIRECTORY_ENTRY,
		}
	}

	#[must_use]
	pub fn marker_path(&self, volume: &Volume) -> PathBuf {
		volume.root.join(self.marker_name())
	}

	/// Writes the native descriptor, then applies the desktop's metadata hint.
	pub async fn write_marker(
		&self,
		guarded: &GuardedFs<'_>,
		volume: &Volume,
		bundle: &IconAssetBundle,
		asset: &Path,
		label: Option<&str>,
	) -> Result<(PathBuf, Warnings), GuardError> {
		let marker = self.marker_path(volume);
		match self.platform {
			Platform::MacOs => guarded.write(&marker, &bundle.icns).await?,
			Platform::Linux | Platform::Windows => {
				guarded
					.write(&marker, layout::directory_entry(label))
					.await?
			}
		};

		let mut warnings = Warnings::new();
		if let Some(hint) = self.metadata_hint(volume, Some(asset)) {
			if let Err(e) = self.runner.run(&hint, self.timeout).await {
				warn!(?e, command = %hint, "Desktop metadata hint failed");
				warnings.push(format!("`{hint}` failed: {e}"));
			}
		}

		debug!(marker = %marker.display(), volume = %volume.id(), "Marker written");

		Ok((marker, warnings))
	}

	/// Removes the native descriptor and clears the metadata hint. Returns what was deleted.
	pub async fn remove_marker(
		&self,
		guarded: &GuardedFs<'_>,
		volume: &Volume,
	) -> Result<(Vec<PathBuf>, Warnings), GuardError> {
		let marker = self.marker_path(volume);
		let mut removed = Vec::new();
		if guarded.remove(&marker).await? > 0 {
			removed.push(marker);
		}

		let mut warnings = Warnings::new();
		if let Some(hint) = self.metadata_hint(volume, None) {
			match self.runner.run(&hint, self.timeout).await {
				Ok(_) => {}
				Err(e) if e.is_not_found() => debug!(command = %hint, "Metadata tool missing"),
				Err(e) => {
					warn!(?e, command = %hint, "Clearing desktop metadata hint failed");
					warnings.push(format!("`{hint}` failed: {e}"));
				}
			}
		}

		Ok((removed, warnings))
	}

	pub async fn read_marker(&self, volume: &Volume) -> Option<PathBuf> {
		let marker = self.marker_path(volume);
		guard::exists(&marker)
			.await
			.unwrap_or(false)
			.then_some(marker)
	}

	/// `gio` on GVfs desktops, `SetFile` on macOS. `asset = None` clears the hint.
	fn metadata_hint(&self, volume: &Volume, asset: Option<&Path>) -> Option<CommandLine> {
		let root = volume.root.to_string_lossy();
		match self.platform {
			Platform::Linux if self.desktop.uses_gvfs_metadata() => Some(match asset {
				Some(asset) => CommandLine::new("gio")
					.arg("set")
					.arg(root)
					.arg(GIO_CUSTOM_ICON)
					.arg(format!("file://{}", asset.display())),
				None => CommandLine::new("gio")
					.args(["set", "-t", "unset"])
					.arg(root)
					.arg(GIO_CUSTOM_ICON),
			}),
			Platform::MacOs => Some(
				CommandLine::new("SetFile")
					.arg("-a")
					.arg(if asset.is_some() { "C" } else { "c" })
					.arg(root),
			),
			Platform::Linux | Platform::Windows => None,
		}
	}
}

/// Where the primary bitmap is persisted for `volume` outside the volume itself.
#[must_use]
pub fn persisted_png(store_dir: &Path, volume: &Volume) -> PathBuf {
	let slug = volume
		.root
		.to_string_lossy()
		.chars()
		.map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
		.collect::<String>();
	let slug = slug.trim_matches('_');
	store_dir.join(format!(
		"drive_{}.png",
		if slug.is_empty() { "root" } else { slug }
	))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{testing::FakeCommandRunner, volume::VolumeKind};
	use pretty_assertions::assert_eq;

	#[test]
	fn persisted_png_names_are_flat() {
		let volume = Volume::new("/media/me/USB STICK", VolumeKind::Removable);
		assert_eq!(
			persisted_png(Path::new("/store"), &volume),
			PathBuf::from("/store/drive_media_me_USB_STICK.png")
		);
		assert_eq!(
			persisted_png(Path::new("/store"), &Volume::new("/", VolumeKind::System)),
			PathBuf::from("/store/drive_root.png")
		);
	}

	#[test]
	fn hints_follow_platform_and_desktop() {
		let runner = Arc::new(FakeCommandRunner::new());
		let volume = Volume::new("/media/usb", VolumeKind::Removable);
		let asset = Path::new("/store/drive_media_usb.png");

		let gnome = MarkerStore::new(
			Platform::Linux,
			DesktopEnvironment::Gnome,
			runner.clone(),
			Duration::from_secs(1),
		);
		assert_eq!(
			gnome.metadata_hint(&volume, Some(asset)).unwrap().to_string(),
			"gio set /media/usb metadata::custom-icon file:///store/drive_media_usb.png"
		);

		let kde = MarkerStore::new(
			Platform::Linux,
			DesktopEnvironment::Kde,
			runner.clone(),
			Duration::from_secs(1),
		);
		assert!(kde.metadata_hint(&volume, Some(asset)).is_none());

		let mac = MarkerStore::new(
			Platform::MacOs,
			DesktopEnvironment::Generic,
			runner,
			Duration::from_secs(1),
		);
		assert_eq!(mac.marker_name(), layout::VOLUME_ICON_ICNS);
		assert_eq!(
			mac.metadata_hint(&volume, None).unwrap().to_string(),
			"SetFile -a c /media/usb"
		);
	}
}
