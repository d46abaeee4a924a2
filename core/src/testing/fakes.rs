use super::lock;
use crate::{
	eject::{EjectError, EjectMethod},
	shell::{ChangeNotifier, NotifyError},
	store::{Hive, Registry, RegistryError},
	volume::Volume,
};

use async_trait::async_trait;
use std::{
	collections::{BTreeMap, HashSet},
	path::{Path, PathBuf},
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc, Mutex,
	},
};

/// Registry held in memory. Keys compare case-insensitively, as in the real thing.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
	values: Mutex<BTreeMap<(Hive, String), String>>,
	denied: Mutex<HashSet<Hive>>,
}

impl InMemoryRegistry {
	/// Makes writes and deletes in `hive` fail with access denied. Reads still work.
	pub fn deny(&self, hive: Hive) {
		lock(&self.denied).insert(hive);
	}

	#[must_use]
	pub fn len(&self) -> usize {
		lock(&self.values).len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn check(&self, hive: Hive, key: &str) -> Result<(), RegistryError> {
		if lock(&self.denied).contains(&hive) {
			Err(RegistryError::AccessDenied {
				hive,
				key: key.to_string(),
			})
		} else {
			Ok(())
		}
	}
}

fn normalize(key: &str) -> String {
	key.to_ascii_lowercase()
}

#[async_trait]
impl Registry for InMemoryRegistry {
	async fn set_default(&self, hive: Hive, key: &str, value: &str) -> Result<(), RegistryError> {
		self.check(hive, key)?;
		lock(&self.values).insert((hive, normalize(key)), value.to_string());
		Ok(())
	}

	async fn get_default(&self, hive: Hive, key: &str) -> Result<Option<String>, RegistryError> {
		Ok(lock(&self.values).get(&(hive, normalize(key))).cloned())
	}

	async fn delete_tree(&self, hive: Hive, key: &str) -> Result<bool, RegistryError> {
		self.check(hive, key)?;
		let key = normalize(key);
		let children = format!("{key}\\");

		let mut values = lock(&self.values);
		let before = values.len();
		values.retain(|(entry_hive, entry_key), _| {
			*entry_hive != hive || (*entry_key != key && !entry_key.starts_with(&children))
		});

		Ok(values.len() != before)
	}
}

/// Records the paths it was asked to announce.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
	paths: Mutex<Vec<PathBuf>>,
}

impl RecordingNotifier {
	#[must_use]
	pub fn paths(&self) -> Vec<PathBuf> {
		lock(&self.paths).clone()
	}
}

#[async_trait]
impl ChangeNotifier for RecordingNotifier {
	async fn notify(&self, path: &Path) -> Result<(), NotifyError> {
		lock(&self.paths).push(path.to_path_buf());
		Ok(())
	}
}

/// Shared view of how many times a [`ScriptedEjectMethod`] ran, usable after it was boxed.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
	#[must_use]
	pub fn get(&self) -> usize {
		self.0.load(Ordering::SeqCst)
	}

	fn bump(&self) {
		self.0.fetch_add(1, Ordering::SeqCst);
	}
}

#[derive(Debug)]
pub struct ScriptedEjectMethod {
	name: String,
	outcome: Result<String, String>,
	calls: CallCounter,
}

impl ScriptedEjectMethod {
	pub fn succeeding(name: impl Into<String>) -> Self {
		let name = name.into();
		Self {
			outcome: Ok(format!("{name} ejected the volume")),
			name,
			calls: CallCounter::default(),
		}
	}

	pub fn failing(name: impl Into<String>, reason: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			outcome: Err(reason.into()),
			calls: CallCounter::default(),
		}
	}

	#[must_use]
	pub fn calls(&self) -> CallCounter {
		self.calls.clone()
	}
}

#[async_trait]
impl EjectMethod for ScriptedEjectMethod {
	fn name(&self) -> &str {
		&self.name
	}

	async fn eject(&self, _volume: &Volume) -> Result<String, EjectError> {
		self.calls.bump();
		self.outcome.clone().map_err(EjectError::Failed)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn deleting_a_key_takes_its_subkeys_only() {
		let registry = InMemoryRegistry::default();
		registry.set_default(Hive::User, r"A\E\DefaultIcon", "e").await.unwrap();
		registry.set_default(Hive::User, r"A\EF", "ef").await.unwrap();
		registry.set_default(Hive::Machine, r"A\E\DefaultIcon", "e").await.unwrap();

		assert!(registry.delete_tree(Hive::User, r"a\e").await.unwrap());
		assert_eq!(registry.get_default(Hive::User, r"A\E\DefaultIcon").await.unwrap(), None);
		assert_eq!(registry.get_default(Hive::User, r"A\EF").await.unwrap().as_deref(), Some("ef"));
		assert_eq!(registry.len(), 2);
		assert!(!registry.delete_tree(Hive::User, r"A\E").await.unwrap());
	}
}
