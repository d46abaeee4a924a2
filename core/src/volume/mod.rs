//! The volume record handed to the pipeline, plus the rules for what may be touched on it.

pub mod classification;
pub mod guard;
pub mod layout;

pub use classification::{Classification, MetadataEntry, Role, VolumeClassifier};
pub use guard::{GuardError, GuardedFs};
pub use layout::VolumeLayout;

use serde::{Deserialize, Serialize};
use std::{
	fmt,
	path::{Path, PathBuf},
	str::FromStr,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeKind {
	Fixed,
	Removable,
	Network,
	System,
}

impl VolumeKind {
	/// Only removable or external media may be ejected.
	#[must_use]
	pub const fn is_ejectable(self) -> bool {
		matches!(self, Self::Removable)
	}
}

impl fmt::Display for VolumeKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Fixed => "fixed",
			Self::Removable => "removable",
			Self::Network => "network",
			Self::System => "system",
		})
	}
}

impl FromStr for VolumeKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"fixed" => Ok(Self::Fixed),
			"removable" | "external" => Ok(Self::Removable),
			"network" => Ok(Self::Network),
			"system" => Ok(Self::System),
			other => Err(format!("unknown volume kind '{other}'")),
		}
	}
}

/// A mounted root as reported by volume enumeration. Read-only to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
	pub root: PathBuf,
	pub kind: VolumeKind,
	pub writable: bool,
	pub label: Option<String>,
	/// Windows drive letter, upper-cased. Registry entries are keyed by it.
	pub drive_letter: Option<char>,
}

impl Volume {
	/// Builds a record for `root`, deriving the drive letter from a `X:\` style path.
	pub fn new(root: impl Into<PathBuf>, kind: VolumeKind) -> Self {
		let root = root.into();
		let drive_letter = drive_letter_of(&root);
		Self {
			root,
			kind,
			writable: true,
			label: None,
			drive_letter,
		}
	}

	#[must_use]
	pub fn with_drive_letter(mut self, letter: char) -> Self {
		self.drive_letter = Some(letter.to_ascii_uppercase());
		self
	}

	#[must_use]
	pub fn with_label(mut self, label: impl Into<String>) -> Self {
		self.label = Some(label.into());
		self
	}

	#[must_use]
	pub const fn with_writable(mut self, writable: bool) -> Self {
		self.writable = writable;
		self
	}

	/// Stable identifier used in logs and the registry: the drive letter when known.
	#[must_use]
	pub fn id(&self) -> String {
		self.drive_letter.map_or_else(
			|| self.root.display().to_string(),
			|letter| format!("{letter}:"),
		)
	}

	#[must_use]
	pub const fn is_ejectable(&self) -> bool {
		self.kind.is_ejectable()
	}

	#[must_use]
	pub const fn is_system(&self) -> bool {
		matches!(self.kind, VolumeKind::System)
	}
}

fn drive_letter_of(root: &Path) -> Option<char> {
	let root = root.to_str()?;
	let mut chars = root.chars();
	match (chars.next(), chars.next()) {
		(Some(letter), Some(':')) if letter.is_ascii_alphabetic() => {
			Some(letter.to_ascii_uppercase())
		}
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn drive_letters_are_derived_from_windows_roots() {
		assert_eq!(Volume::new(r"e:\", VolumeKind::Removable).drive_letter, Some('E'));
		assert_eq!(Volume::new("/media/usb", VolumeKind::Removable).drive_letter, None);
		assert_eq!(
			Volume::new("/media/usb", VolumeKind::Removable)
				.with_drive_letter('f')
				.id(),
			"F:"
		);
	}

	#[test]
	fn only_removable_volumes_are_ejectable() {
		assert!(VolumeKind::Removable.is_ejectable());
		for kind in [VolumeKind::Fixed, VolumeKind::Network, VolumeKind::System] {
			assert!(!kind.is_ejectable(), "{kind}");
		}
	}

	#[test]
	fn kinds_parse_case_insensitively() {
		assert_eq!("Removable".parse::<VolumeKind>(), Ok(VolumeKind::Removable));
		assert_eq!("external".parse::<VolumeKind>(), Ok(VolumeKind::Removable));
		assert!("floppy".parse::<VolumeKind>().is_err());
	}
}
