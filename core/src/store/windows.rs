//! Explorer's per-drive icon override, duplicated in the machine and user hives.

use super::registry::{Hive, Registry, RegistryError};

use serde::{Deserialize, Serialize};
use std::{
	path::{Path, PathBuf},
	sync::Arc,
};
use thiserror::Error;
use tracing::{debug, warn};

const DRIVE_ICONS_KEY: &str = r"SOFTWARE\Microsoft\Windows\CurrentVersion\Explorer\DriveIcons";
const DEFAULT_ICON: &str = "DefaultIcon";
const DEFAULT_LABEL: &str = "DefaultLabel";

#[must_use]
pub fn drive_key(letter: char) -> String {
	format!("{DRIVE_ICONS_KEY}\\{}", letter.to_ascii_uppercase())
}

#[derive(Error, Debug)]
pub enum StoreError {
	/// The current-user write failed; nothing would display even for this user.
	#[error("failed to update the current user's drive icon entry: {0}")]
	UserScope(#[source] RegistryError),
}

impl StoreError {
	#[must_use]
	pub const fn is_access_denied(&self) -> bool {
		match self {
			Self::UserScope(e) => e.is_access_denied(),
		}
	}
}

/// Result of a write or delete that succeeded for the current user.
#[derive(Debug, Default)]
pub struct HiveOutcome {
	/// Set when the machine-wide half failed; the user entry still applies.
	pub machine_error: Option<RegistryError>,
	/// Hives where the entry was present (for deletes) or written (for sets).
	pub touched: Vec<Hive>,
}

/// Icon and label stored for one drive in one hive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiveEntry {
	pub hive: Option<Hive>,
	pub icon: Option<String>,
	pub label: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WindowsIconStore {
	registry: Arc<dyn Registry>,
}

impl WindowsIconStore {
	pub fn new(registry: Arc<dyn Registry>) -> Self {
		Self { registry }
	}

	async fn write_hive(
		&self,
		hive: Hive,
		letter: char,
		icon: &str,
		label: Option<&str>,
	) -> Result<(), RegistryError> {
		let key = drive_key(letter);
		self.registry
			.set_default(hive, &format!("{key}\\{DEFAULT_ICON}"), icon)
			.await?;

		let label_key = format!("{key}\\{DEFAULT_LABEL}");
		match label {
			Some(label) => self.registry.set_default(hive, &label_key, label).await,
			None => self.registry.delete_tree(hive, &label_key).await.map(drop),
		}
	}

	/// Points both hives at `asset`. Only a failure in the user hive is an error.
	pub async fn set_icon(
		&self,
		letter: char,
		asset: &Path,
		label: Option<&str>,
	) -> Result<HiveOutcome, StoreError> {
		let icon = asset.display().to_string();
		let mut outcome = HiveOutcome::default();

		match self.write_hive(Hive::Machine, letter, &icon, label).await {
			Ok(()) => outcome.touched.push(Hive::Machine),
			Err(e) => {
				warn!(?e, %letter, "Machine-wide drive icon entry not written, continuing with the user entry");
				outcome.machine_error = Some(e);
			}
		}

		self.write_hive(Hive::User, letter, &icon, label)
			.await
			.map_err(StoreError::UserScope)?;
		outcome.touched.push(Hive::User);

		debug!(%letter, %icon, hives = ?outcome.touched, "Drive icon registered");

		Ok(outcome)
	}

	/// The registered icon, preferring the machine-wide value.
	pub async fn get_icon(&self, letter: char) -> Result<Option<PathBuf>, RegistryError> {
		let key = format!("{}\\{DEFAULT_ICON}", drive_key(letter));

		match self.registry.get_default(Hive::Machine, &key).await {
			Ok(Some(icon)) => return Ok(Some(PathBuf::from(icon))),
			Ok(None) => {}
			Err(e) => warn!(?e, %letter, "Failed to read machine-wide drive icon, trying the user entry"),
		}

		Ok(self
			.registry
			.get_default(Hive::User, &key)
			.await?
			.map(PathBuf::from))
	}

	/// Both hives' values, for diagnostics. Read failures are reported as empty entries.
	pub async fn entries(&self, letter: char) -> Vec<HiveEntry> {
		let key = drive_key(letter);
		let mut entries = Vec::with_capacity(Hive::ALL.len());

		for hive in Hive::ALL {
			entries.push(HiveEntry {
				hive: Some(hive),
				icon: self.read_value(hive, &format!("{key}\\{DEFAULT_ICON}")).await,
				label: self.read_value(hive, &format!("{key}\\{DEFAULT_LABEL}")).await,
			});
		}

		entries
	}

	async fn read_value(&self, hive: Hive, key: &str) -> Option<String> {
		self.registry
			.get_default(hive, key)
			.await
			.map_err(|e| warn!(?e, %hive, "Failed to read drive icon entry"))
			.ok()
			.flatten()
	}

	/// Deletes the drive's key tree in both hives. Absent keys are not an error.
	pub async fn remove_icon(&self, letter: char) -> Result<HiveOutcome, StoreError> {
		let key = drive_key(letter);
		let mut outcome = HiveOutcome::default();

		match self.registry.delete_tree(Hive::Machine, &key).await {
			Ok(true) => outcome.touched.push(Hive::Machine),
			Ok(false) => {}
			Err(e) => {
				warn!(?e, %letter, "Machine-wide drive icon entry not removed");
				outcome.machine_error = Some(e);
			}
		}

		if self
			.registry
			.delete_tree(Hive::User, &key)
			.await
			.map_err(StoreError::UserScope)?
		{
			outcome.touched.push(Hive::User);
		}

		Ok(outcome)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::InMemoryRegistry;
	use pretty_assertions::assert_eq;

	#[tokio::test]
	async fn set_then_get_round_trips() {
		let store = WindowsIconStore::new(Arc::new(InMemoryRegistry::default()));
		let asset = Path::new(r"C:\ProgramData\DriveIcons\drive_E.ico");

		store.set_icon('e', asset, Some("Backups")).await.unwrap();
		assert_eq!(store.get_icon('E').await.unwrap(), Some(asset.to_path_buf()));

		let entries = store.entries('E').await;
		assert_eq!(entries.len(), 2);
		assert!(entries
			.iter()
			.all(|entry| entry.label.as_deref() == Some("Backups")));

		store.remove_icon('E').await.unwrap();
		assert_eq!(store.get_icon('E').await.unwrap(), None);
	}

	#[tokio::test]
	async fn machine_failure_is_advisory() {
		let registry = Arc::new(InMemoryRegistry::default());
		registry.deny(Hive::Machine);
		let store = WindowsIconStore::new(registry.clone());
		let asset = Path::new(r"C:\icons\drive_F.ico");

		let outcome = store.set_icon('F', asset, None).await.unwrap();
		assert!(outcome.machine_error.is_some());
		assert_eq!(outcome.touched, vec![Hive::User]);
		assert_eq!(store.get_icon('F').await.unwrap(), Some(asset.to_path_buf()));
	}

	#[tokio::test]
	async fn user_failure_is_fatal() {
		let registry = Arc::new(InMemoryRegistry::default());
		registry.deny(Hive::User);
		let store = WindowsIconStore::new(registry);

		let err = store
			.set_icon('G', Path::new(r"C:\icons\drive_G.ico"), None)
			.await
			.unwrap_err();
		assert!(err.is_access_denied());
	}

	#[tokio::test]
	async fn removing_nothing_succeeds() {
		let store = WindowsIconStore::new(Arc::new(InMemoryRegistry::default()));
		let outcome = store.remove_icon('H').await.unwrap();
		assert!(outcome.touched.is_empty());
		assert!(outcome.machine_error.is_none());
	}

	#[tokio::test]
	async fn clearing_the_label_removes_the_label_key() {
		let registry = Arc::new(InMemoryRegistry::default());
		let store = WindowsIconStore::new(registry.clone());
		let asset = Path::new(r"C:\icons\drive_E.ico");

		store.set_icon('E', asset, Some("Old")).await.unwrap();
		store.set_icon('E', asset, None).await.unwrap();

		assert!(store.entries('E').await.iter().all(|entry| entry.label.is_none()));
	}
}
