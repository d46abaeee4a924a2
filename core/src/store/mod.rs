//! Durable association between a volume and its icon, wherever the host OS keeps it.

pub mod marker;
pub mod registry;
pub mod windows;

pub use marker::MarkerStore;
pub use registry::{Hive, RegExe, Registry, RegistryError};
pub use windows::{HiveEntry, StoreError, WindowsIconStore};

use crate::{
	command::CommandRunner,
	context::{Platform, PlatformContext},
	volume::{
		guard::{self, GuardError, GuardedFs},
		Volume,
	},
};

use di_images::IconAssetBundle;
use di_utils::FileIOError;
use serde::{Deserialize, Serialize};
use std::{
	path::PathBuf,
	sync::Arc,
	time::Duration,
};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum PersistError {
	#[error(transparent)]
	Store(#[from] StoreError),
	#[error(transparent)]
	Write(#[from] GuardError),
	#[error(transparent)]
	Io(#[from] FileIOError),
	#[error(transparent)]
	Asset(#[from] di_images::Error),
	#[error("volume {0} has no drive letter to register an icon under")]
	NoDriveLetter(String),
}

/// What a successful persist or unpersist changed.
#[derive(Debug, Default)]
pub struct PersistOutcome {
	pub asset: Option<PathBuf>,
	pub marker: Option<PathBuf>,
	pub changed: Vec<String>,
	/// Non-fatal misses: the machine-wide hive, desktop metadata hints.
	pub warnings: Vec<String>,
}

/// Read-only snapshot used by diagnose.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreState {
	pub asset: Option<PathBuf>,
	pub asset_present: bool,
	pub registered_icon: Option<PathBuf>,
	pub hives: Vec<HiveEntry>,
	pub marker: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum StoreBackend {
	Registry(WindowsIconStore),
	Marker(MarkerStore),
}

#[derive(Debug, Clone)]
pub struct PersistentIconStore {
	store_dir: PathBuf,
	backend: StoreBackend,
}

impl PersistentIconStore {
	/// Picks the backend for `ctx.platform`.
	pub fn for_platform(
		ctx: &PlatformContext,
		runner: Arc<dyn CommandRunner>,
		registry: Arc<dyn Registry>,
		timeout: Duration,
	) -> Self {
		let backend = match ctx.platform {
			Platform::Windows => StoreBackend::Registry(WindowsIconStore::new(registry)),
			Platform::Linux | Platform::MacOs => StoreBackend::Marker(MarkerStore::new(
				ctx.platform,
				ctx.desktop,
				runner,
				timeout,
			)),
		};

		Self {
			store_dir: ctx.icon_store_dir.clone(),
			backend,
		}
	}

	/// The asset kept outside the volume so the reference survives remounts.
	pub fn asset_path(&self, volume: &Volume) -> Result<PathBuf, PersistError> {
		match &self.backend {
			StoreBackend::Registry(_) => volume
				.drive_letter
				.map(|letter| self.store_dir.join(format!("drive_{letter}.ico")))
				.ok_or_else(|| PersistError::NoDriveLetter(volume.id())),
			StoreBackend::Marker(_) => Ok(marker::persisted_png(&self.store_dir, volume)),
		}
	}

	/// Name of the root descriptor this backend writes itself, if any.
	#[must_use]
	pub const fn native_marker(&self) -> Option<&'static str> {
		match &self.backend {
			StoreBackend::Registry(_) => None,
			StoreBackend::Marker(store) => Some(store.marker_name()),
		}
	}

	/// Copies the asset into the store and registers it.
	///
	/// Errors are terminal: a failed asset copy or a failed user-scope registration
	/// leaves nothing that would display.
	pub async fn persist(
		&self,
		guarded: &GuardedFs<'_>,
		volume: &Volume,
		bundle: &IconAssetBundle,
		label: Option<&str>,
	) -> Result<PersistOutcome, PersistError> {
		let asset = self.asset_path(volume)?;
		let mut outcome = PersistOutcome::default();

		tokio::fs::create_dir_all(&self.store_dir)
			.await
			.map_err(|e| FileIOError::from((&self.store_dir, e, "creating icon store")))?;

		match &self.backend {
			StoreBackend::Registry(store) => {
				guarded.write(&asset, &bundle.ico).await?;
				let letter = volume
					.drive_letter
					.ok_or_else(|| PersistError::NoDriveLetter(volume.id()))?;

				let hives = store.set_icon(letter, &asset, label).await?;
				if let Some(e) = hives.machine_error {
					outcome.warnings.push(format!(
						"machine-wide registry entry not written ({e}); the icon applies to the current user only"
					));
				}
				outcome.changed.extend(
					hives
						.touched
						.iter()
						.map(|hive| format!("registry {hive} drive icon for {letter}:")),
				);
			}
			StoreBackend::Marker(store) => {
				guarded.write(&asset, &bundle.primary()?.png).await?;

				let (marker, warnings) = store
					.write_marker(guarded, volume, bundle, &asset, label)
					.await?;
				outcome.changed.push(marker.display().to_string());
				outcome.warnings.extend(warnings);
				outcome.marker = Some(marker);
			}
		}

		outcome.changed.insert(0, asset.display().to_string());
		info!(volume = %volume.id(), asset = %asset.display(), "Icon persisted");
		outcome.asset = Some(asset);

		Ok(outcome)
	}

	/// Reverses [`persist`](Self::persist). Nothing to remove is a success.
	pub async fn unpersist(
		&self,
		guarded: &GuardedFs<'_>,
		volume: &Volume,
	) -> Result<PersistOutcome, PersistError> {
		let mut outcome = PersistOutcome::default();

		match &self.backend {
			StoreBackend::Registry(store) => {
				if let Some(letter) = volume.drive_letter {
					let hives = store.remove_icon(letter).await?;
					if let Some(e) = hives.machine_error {
						outcome
							.warnings
							.push(format!("machine-wide registry entry not removed ({e})"));
					}
					outcome.changed.extend(
						hives
							.touched
							.iter()
							.map(|hive| format!("registry {hive} drive icon for {letter}:")),
					);
				}
			}
			StoreBackend::Marker(store) => {
				let (removed, warnings) = store.remove_marker(guarded, volume).await?;
				outcome
					.changed
					.extend(removed.iter().map(|path| path.display().to_string()));
				outcome.warnings.extend(warnings);
			}
		}

		if let Ok(asset) = self.asset_path(volume) {
			if guarded.remove(&asset).await? > 0 {
				outcome.changed.push(asset.display().to_string());
			}
		}

		Ok(outcome)
	}

	pub async fn inspect(&self, volume: &Volume) -> StoreState {
		let asset = self.asset_path(volume).ok();
		let asset_present = match &asset {
			Some(asset) => guard::exists(asset).await.unwrap_or(false),
			None => false,
		};

		let mut state = StoreState {
			asset,
			asset_present,
			..Default::default()
		};

		match &self.backend {
			StoreBackend::Registry(store) => {
				if let Some(letter) = volume.drive_letter {
					state.registered_icon = store.get_icon(letter).await.ok().flatten();
					state.hives = store.entries(letter).await;
				}
			}
			StoreBackend::Marker(store) => state.marker = store.read_marker(volume).await,
		}

		state
	}
}
