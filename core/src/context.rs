//! Host facts every component needs, detected once and passed down explicitly.

use serde::{Deserialize, Serialize};
use std::{
	env, fmt,
	path::{Path, PathBuf},
};
use tracing::debug;

/// Operating-system family the pipeline drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
	Windows,
	Linux,
	#[serde(rename = "macos")]
	MacOs,
}

impl Platform {
	#[must_use]
	pub const fn current() -> Self {
		if cfg!(target_os = "windows") {
			Self::Windows
		} else if cfg!(target_os = "macos") {
			Self::MacOs
		} else {
			Self::Linux
		}
	}
}

impl fmt::Display for Platform {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Windows => "windows",
			Self::Linux => "linux",
			Self::MacOs => "macos",
		})
	}
}

/// Linux desktop environment, as far as the shell profile table cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesktopEnvironment {
	Gnome,
	Kde,
	Xfce,
	Cinnamon,
	Mate,
	Lxde,
	Lxqt,
	Unity,
	Pantheon,
	Budgie,
	Deepin,
	Generic,
}

impl DesktopEnvironment {
	/// Matches `XDG_CURRENT_DESKTOP` and `DESKTOP_SESSION` the same way the
	/// common session managers advertise themselves. Order matters: a
	/// `Budgie:GNOME` session is driven through the GNOME profile.
	#[must_use]
	pub fn from_env_values(current_desktop: Option<&str>, session: Option<&str>) -> Self {
		let desktop = current_desktop.unwrap_or_default().to_lowercase();
		let session = session.unwrap_or_default().to_lowercase();
		let has = |needle: &str| desktop.contains(needle) || session.contains(needle);

		if has("gnome") {
			Self::Gnome
		} else if has("kde") || session.contains("plasma") {
			Self::Kde
		} else if has("xfce") {
			Self::Xfce
		} else if has("cinnamon") {
			Self::Cinnamon
		} else if has("mate") {
			Self::Mate
		} else if has("lxde") {
			Self::Lxde
		} else if has("lxqt") {
			Self::Lxqt
		} else if has("unity") {
			Self::Unity
		} else if has("pantheon") {
			Self::Pantheon
		} else if has("budgie") {
			Self::Budgie
		} else if has("deepin") {
			Self::Deepin
		} else {
			Self::Generic
		}
	}

	#[must_use]
	pub fn detect() -> Self {
		Self::from_env_values(
			env::var("XDG_CURRENT_DESKTOP").ok().as_deref(),
			env::var("DESKTOP_SESSION").ok().as_deref(),
		)
	}

	/// Desktops whose file manager honours GVfs `metadata::custom-icon`.
	#[must_use]
	pub const fn uses_gvfs_metadata(self) -> bool {
		matches!(
			self,
			Self::Gnome | Self::Unity | Self::Pantheon | Self::Budgie | Self::Cinnamon | Self::Mate
		)
	}
}

impl fmt::Display for DesktopEnvironment {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = serde_json::to_value(self)
			.ok()
			.and_then(|value| value.as_str().map(str::to_string))
			.unwrap_or_else(|| "generic".to_string());
		f.write_str(&name)
	}
}

/// Replaces the process-wide detection globals: built once and handed to the
/// store, shell and eject components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformContext {
	pub platform: Platform,
	pub desktop: DesktopEnvironment,
	pub elevated: bool,
	/// `C:` style prefix on Windows, `/` elsewhere.
	pub system_drive: String,
	/// Where persisted icon assets live outside the volume.
	pub icon_store_dir: PathBuf,
	/// Explorer's icon cache directory. `None` on shells without an on-disk cache we manage.
	pub shell_cache_dir: Option<PathBuf>,
}

impl PlatformContext {
	#[must_use]
	pub fn new(
		platform: Platform,
		desktop: DesktopEnvironment,
		elevated: bool,
		system_drive: impl Into<String>,
		icon_store_dir: impl Into<PathBuf>,
		shell_cache_dir: Option<PathBuf>,
	) -> Self {
		Self {
			platform,
			desktop,
			elevated,
			system_drive: system_drive.into(),
			icon_store_dir: icon_store_dir.into(),
			shell_cache_dir,
		}
	}

	/// Reads the host. `icon_store_dir` overrides the platform default when set.
	#[must_use]
	pub fn detect(icon_store_dir: Option<&Path>) -> Self {
		let platform = Platform::current();
		let desktop = if platform == Platform::Linux {
			DesktopEnvironment::detect()
		} else {
			DesktopEnvironment::Generic
		};

		let system_drive = match platform {
			Platform::Windows => env::var("SystemDrive").unwrap_or_else(|_| "C:".to_string()),
			Platform::Linux | Platform::MacOs => "/".to_string(),
		};

		let icon_store_dir = icon_store_dir
			.map(Path::to_path_buf)
			.unwrap_or_else(|| default_icon_store_dir(platform, &system_drive));

		let shell_cache_dir = match platform {
			Platform::Windows => env::var_os("LOCALAPPDATA").map(|local| {
				PathBuf::from(local)
					.join("Microsoft")
					.join("Windows")
					.join("Explorer")
			}),
			Platform::Linux | Platform::MacOs => None,
		};

		let ctx = Self {
			platform,
			desktop,
			elevated: is_elevated(),
			system_drive,
			icon_store_dir,
			shell_cache_dir,
		};

		debug!(
			platform = %ctx.platform,
			desktop = %ctx.desktop,
			elevated = ctx.elevated,
			icon_store_dir = %ctx.icon_store_dir.display(),
			"Detected platform context"
		);

		ctx
	}
}

fn default_icon_store_dir(platform: Platform, system_drive: &str) -> PathBuf {
	match platform {
		Platform::Windows => env::var_os("ProgramData")
			.map_or_else(
				|| PathBuf::from(format!("{system_drive}\\ProgramData")),
				PathBuf::from,
			)
			.join("DriveIcons"),
		Platform::Linux | Platform::MacOs => dirs::config_dir()
			.unwrap_or_else(env::temp_dir)
			.join("drive-icon")
			.join("icons"),
	}
}

#[cfg(unix)]
fn is_elevated() -> bool {
	// SAFETY: geteuid has no preconditions and cannot fail
	unsafe { libc::geteuid() == 0 }
}

#[cfg(windows)]
fn is_elevated() -> bool {
	// SAFETY: IsUserAnAdmin takes no arguments and only reads the process token
	unsafe { windows_sys::Win32::UI::Shell::IsUserAnAdmin() != 0 }
}

#[cfg(not(any(unix, windows)))]
const fn is_elevated() -> bool {
	false
}
