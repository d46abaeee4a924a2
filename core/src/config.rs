//! Persistent settings, stored as `drive-icon.json` in the data directory.

use crate::pipeline::ApplyOptions;

use serde::{Deserialize, Serialize};
use std::{
	fs, io,
	path::{Path, PathBuf},
	time::Duration,
};
use thiserror::Error;
use tracing::{info, warn};

pub const CONFIG_FILE_NAME: &str = "drive-icon.json";

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("failed to access config <path='{}'>: {source}", path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("failed to parse config <path='{}'>: {source}", path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},
	#[error("unknown config version {found}, this build understands up to {supported}")]
	UnknownVersion { found: u32, supported: u32 },
	#[error("no config directory could be determined for this user")]
	NoDataDir,
}

/// Wait budgets for shell control and external commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellTiming {
	pub command_timeout_ms: u64,
	pub cache_tool_timeout_ms: u64,
	pub stop_polls: u32,
	pub stop_poll_interval_ms: u64,
	pub start_polls: u32,
	pub start_poll_interval_ms: u64,
	pub settle_ms: u64,
	pub notify_gap_ms: u64,
}

impl Default for ShellTiming {
	fn default() -> Self {
		Self {
			command_timeout_ms: 15_000,
			cache_tool_timeout_ms: 30_000,
			stop_polls: 30,
			stop_poll_interval_ms: 200,
			start_polls: 40,
			start_poll_interval_ms: 300,
			settle_ms: 2_000,
			notify_gap_ms: 500,
		}
	}
}

impl ShellTiming {
	/// No waiting at all, with a single poll per phase. Used by tests and dry runs.
	#[must_use]
	pub const fn immediate() -> Self {
		Self {
			command_timeout_ms: 1_000,
			cache_tool_timeout_ms: 1_000,
			stop_polls: 1,
			stop_poll_interval_ms: 0,
			start_polls: 1,
			start_poll_interval_ms: 0,
			settle_ms: 0,
			notify_gap_ms: 0,
		}
	}

	#[must_use]
	pub const fn command_timeout(&self) -> Duration {
		Duration::from_millis(self.command_timeout_ms)
	}

	#[must_use]
	pub const fn cache_tool_timeout(&self) -> Duration {
		Duration::from_millis(self.cache_tool_timeout_ms)
	}

	#[must_use]
	pub const fn stop_poll_interval(&self) -> Duration {
		Duration::from_millis(self.stop_poll_interval_ms)
	}

	#[must_use]
	pub const fn start_poll_interval(&self) -> Duration {
		Duration::from_millis(self.start_poll_interval_ms)
	}

	#[must_use]
	pub const fn settle(&self) -> Duration {
		Duration::from_millis(self.settle_ms)
	}

	#[must_use]
	pub const fn notify_gap(&self) -> Duration {
		Duration::from_millis(self.notify_gap_ms)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconConfig {
	/// Config schema version
	pub version: u32,

	/// Directory this config was loaded from; not serialized.
	#[serde(skip)]
	pub data_dir: PathBuf,

	/// `EnvFilter` directive used when `RUST_LOG` is unset
	pub log_level: String,

	/// Overrides the platform default location for persisted icon assets
	#[serde(default)]
	pub icon_store_dir: Option<PathBuf>,

	#[serde(default)]
	pub timing: ShellTiming,

	/// Options used when the caller doesn't specify any
	#[serde(default)]
	pub defaults: ApplyOptions,
}

impl IconConfig {
	pub const CURRENT_VERSION: u32 = 1;

	#[must_use]
	pub fn default_with_dir(data_dir: impl Into<PathBuf>) -> Self {
		Self {
			version: Self::CURRENT_VERSION,
			data_dir: data_dir.into(),
			log_level: "info".to_string(),
			icon_store_dir: None,
			timing: ShellTiming::default(),
			defaults: ApplyOptions::default(),
		}
	}

	pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
		dirs::config_dir()
			.map(|dir| dir.join("drive-icon"))
			.ok_or(ConfigError::NoDataDir)
	}

	/// Load configuration from a specific data directory
	pub fn load_from(data_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let data_dir = data_dir.as_ref();
		let path = data_dir.join(CONFIG_FILE_NAME);

		info!(path = %path.display(), "Loading config");
		let json = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
			path: path.clone(),
			source,
		})?;

		let mut config =
			serde_json::from_str::<Self>(&json).map_err(|source| ConfigError::Parse {
				path: path.clone(),
				source,
			})?;

		match config.version {
			0 => {
				info!(
					from = config.version,
					to = Self::CURRENT_VERSION,
					"Migrating config"
				);
				config.version = Self::CURRENT_VERSION;
				config.data_dir = data_dir.to_path_buf();
				config.save()?;
			}
			Self::CURRENT_VERSION => config.data_dir = data_dir.to_path_buf(),
			found => {
				return Err(ConfigError::UnknownVersion {
					found,
					supported: Self::CURRENT_VERSION,
				})
			}
		}

		Ok(config)
	}

	/// Loads the config, writing defaults first when none exists yet.
	pub fn load_or_create(data_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let data_dir = data_dir.as_ref();
		if data_dir.join(CONFIG_FILE_NAME).exists() {
			Self::load_from(data_dir)
		} else {
			warn!(data_dir = %data_dir.display(), "No config found, creating default");
			let config = Self::default_with_dir(data_dir);
			config.save()?;
			Ok(config)
		}
	}

	/// Save configuration to disk
	pub fn save(&self) -> Result<(), ConfigError> {
		fs::create_dir_all(&self.data_dir).map_err(|source| ConfigError::Io {
			path: self.data_dir.clone(),
			source,
		})?;

		let path = self.config_path();
		let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
			path: path.clone(),
			source,
		})?;
		fs::write(&path, json).map_err(|source| ConfigError::Io {
			path: path.clone(),
			source,
		})?;

		info!(path = %path.display(), "Saved config");
		Ok(())
	}

	#[must_use]
	pub fn config_path(&self) -> PathBuf {
		self.data_dir.join(CONFIG_FILE_NAME)
	}

	/// Log files live beside the config so logging can start before it is read.
	#[must_use]
	pub fn logs_dir_in(data_dir: impl AsRef<Path>) -> PathBuf {
		data_dir.as_ref().join("logs")
	}
}
