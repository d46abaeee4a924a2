//! Path classification: which entries the pipeline may create, hide or delete.
//!
//! Classification is fail-closed. A path is only safe when it is one of our
//! own canonical names in the place we put it; deny-listed names and anything
//! unrecognized are never touched.

use super::layout::{
	AUTORUN_INF, DESKTOP_INI, DIRECTORY_ENTRY, DS_STORE, FSEVENTSD_DIR, FSEVENTSD_NO_LOG,
	HIDDEN_LIST, ICON_DIR, ICO_FILE, METADATA_NEVER_INDEX, PRIMARY_PNG, VOLUME_ICON_ICNS,
	VOLUME_ICON_PNG,
};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::error;

/// Names that are never ours, matched case-insensitively against every path component,
/// the volume root's own components included.
///
/// Union of the trash, boot, paging and OS-tree names seen across all supported platforms.
pub const DENY_LIST: &[&str] = &[
	"$RECYCLE.BIN",
	"RECYCLER",
	"System Volume Information",
	".Trashes",
	".Trash",
	".Trash-*",
	".Spotlight-V100",
	".DocumentRevisions-V100",
	".TemporaryItems",
	"._*",
	"pagefile.sys",
	"hiberfil.sys",
	"swapfile.sys",
	"swapfile",
	"bootmgr",
	"BOOTNXT",
	"Boot",
	"EFI",
	"Windows",
	"Program Files",
	"Program Files (x86)",
	"ProgramData",
	"lost+found",
	"System",
	"Library",
	"Applications",
	"Users",
	"private",
	"bin",
	"boot",
	"etc",
	"usr",
	"var",
];

const STORE_PATTERNS: &[&str] = &["drive_*.ico", "drive_*.png"];
const CACHE_PATTERNS: &[&str] = &["iconcache*.db", "thumbcache*.db"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	/// Icon bitmaps and containers, plus the directory holding them.
	IconFile,
	/// Descriptors the current platform's shell reads.
	ShellMarker,
	/// Descriptors and suppression markers for other platforms or legacy shells.
	CompatibilityMarker,
	/// Shell icon cache databases outside the volume.
	CacheEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "class", content = "role")]
pub enum Classification {
	Safe(Role),
	Protected,
	Unrecognized,
}

impl Classification {
	#[must_use]
	pub const fn is_safe(self) -> bool {
		matches!(self, Self::Safe(_))
	}
}

/// An object the pipeline may create or delete. Only built for classifier-safe paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
	pub path: PathBuf,
	pub role: Role,
	/// Whether the pipeline hides this entry from normal listings.
	pub hidden: bool,
}

#[derive(Debug, Clone)]
pub struct VolumeClassifier {
	root: PathBuf,
	icon_store_dir: Option<PathBuf>,
	shell_cache_dir: Option<PathBuf>,
	/// `None` if the pattern sets failed to build, in which case nothing is safe.
	patterns: Option<Patterns>,
}

#[derive(Debug, Clone)]
struct Patterns {
	deny: GlobSet,
	store: GlobSet,
	cache: GlobSet,
}

impl Patterns {
	fn build() -> Result<Self, globset::Error> {
		Ok(Self {
			deny: glob_set(DENY_LIST)?,
			store: glob_set(STORE_PATTERNS)?,
			cache: glob_set(CACHE_PATTERNS)?,
		})
	}
}

fn glob_set(patterns: &[&str]) -> Result<GlobSet, globset::Error> {
	let mut builder = GlobSetBuilder::new();
	for pattern in patterns {
		builder.add(
			GlobBuilder::new(pattern)
				.case_insensitive(true)
				.literal_separator(true)
				.build()?,
		);
	}
	builder.build()
}

impl VolumeClassifier {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		let patterns = Patterns::build()
			.map_err(|e| {
				error!(?e, "Failed to build classifier patterns, treating every path as protected");
			})
			.ok();

		Self {
			root: root.into(),
			icon_store_dir: None,
			shell_cache_dir: None,
			patterns,
		}
	}

	/// Also accept persisted icon assets inside `dir`.
	#[must_use]
	pub fn with_icon_store(mut self, dir: impl Into<PathBuf>) -> Self {
		self.icon_store_dir = Some(dir.into());
		self
	}

	/// Also accept shell icon cache databases inside `dir`.
	#[must_use]
	pub fn with_shell_cache(mut self, dir: Option<PathBuf>) -> Self {
		self.shell_cache_dir = dir;
		self
	}

	#[must_use]
	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Whether the volume root itself lies in or under a deny-listed location.
	#[must_use]
	pub fn root_is_protected(&self) -> bool {
		let Some(patterns) = &self.patterns else {
			return true;
		};

		self.root.components().any(|component| match component {
			Component::Normal(name) => patterns.deny.is_match(Path::new(name)),
			Component::ParentDir => true,
			Component::Prefix(_) | Component::RootDir | Component::CurDir => false,
		})
	}

	#[must_use]
	pub fn is_safe(&self, path: impl AsRef<Path>) -> bool {
		self.classify(path).is_safe()
	}

	/// A [`MetadataEntry`] for `path`, or `None` when it must not be touched.
	#[must_use]
	pub fn entry(&self, path: impl AsRef<Path>) -> Option<MetadataEntry> {
		let path = path.as_ref();
		match self.classify(path) {
			Classification::Safe(role) => Some(MetadataEntry {
				path: path.to_path_buf(),
				role,
				hidden: role != Role::CacheEntry && path.starts_with(&self.root),
			}),
			Classification::Protected | Classification::Unrecognized => None,
		}
	}

	#[must_use]
	pub fn classify(&self, path: impl AsRef<Path>) -> Classification {
		let path = path.as_ref();
		let Some(patterns) = &self.patterns else {
			return Classification::Protected;
		};

		if path
			.components()
			.any(|component| matches!(component, Component::ParentDir))
		{
			return Classification::Protected;
		}

		if let Some(name) = single_child_of(path, self.icon_store_dir.as_deref()) {
			if patterns.store.is_match(name) {
				return Classification::Safe(Role::IconFile);
			}
		}

		if let Some(name) = single_child_of(path, self.shell_cache_dir.as_deref()) {
			if patterns.cache.is_match(name) {
				return Classification::Safe(Role::CacheEntry);
			}
		}

		// Checked last: on a system volume the store and cache live under the root.
		if let Ok(relative) = path.strip_prefix(&self.root) {
			if self.root_is_protected() {
				return Classification::Protected;
			}
			return Self::classify_on_volume(patterns, relative);
		}

		Classification::Unrecognized
	}

	fn classify_on_volume(patterns: &Patterns, relative: &Path) -> Classification {
		let mut names = Vec::new();
		for component in relative.components() {
			match component {
				Component::Normal(name) => match name.to_str() {
					Some(name) => names.push(name),
					None => return Classification::Unrecognized,
				},
				Component::CurDir => {}
				// Prefixes, roots and `..` can't appear in a path stripped of the volume root.
				_ => return Classification::Protected,
			}
		}

		if names.iter().any(|name| patterns.deny.is_match(name)) {
			return Classification::Protected;
		}

		match names.as_slice() {
			// The volume root itself.
			[] => Classification::Protected,
			[name] => {
				root_entry_role(name).map_or(Classification::Unrecognized, Classification::Safe)
			}
			[ICON_DIR, name] if is_icon_asset_name(name) => Classification::Safe(Role::IconFile),
			[FSEVENTSD_DIR, FSEVENTSD_NO_LOG] => Classification::Safe(Role::CompatibilityMarker),
			_ => Classification::Unrecognized,
		}
	}
}

fn single_child_of<'a>(path: &'a Path, dir: Option<&Path>) -> Option<&'a str> {
	let dir = dir?;
	let name = path.strip_prefix(dir).ok()?;
	let mut components = name.components();
	match (components.next(), components.next()) {
		(Some(Component::Normal(name)), None) => name.to_str(),
		_ => None,
	}
}

fn root_entry_role(name: &str) -> Option<Role> {
	match name {
		ICON_DIR | VOLUME_ICON_ICNS => Some(Role::IconFile),
		DIRECTORY_ENTRY | HIDDEN_LIST => Some(Role::ShellMarker),
		DS_STORE | FSEVENTSD_DIR | METADATA_NEVER_INDEX => Some(Role::CompatibilityMarker),
		// FAT volumes often surface these upper-cased.
		name if name.eq_ignore_ascii_case(DESKTOP_INI) => Some(Role::ShellMarker),
		name if name.eq_ignore_ascii_case(AUTORUN_INF) => Some(Role::CompatibilityMarker),
		_ => None,
	}
}

fn is_icon_asset_name(name: &str) -> bool {
	if matches!(name, ICO_FILE | PRIMARY_PNG | VOLUME_ICON_PNG) {
		return true;
	}

	name.strip_prefix(".drive_icon_")
		.and_then(|rest| rest.strip_suffix(".png"))
		.is_some_and(|size| !size.is_empty() && size.bytes().all(|b| b.is_ascii_digit()))
}
