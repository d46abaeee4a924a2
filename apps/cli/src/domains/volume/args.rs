use clap::Args;
use di_core::{ApplyOptions, Volume, VolumeKind};
use std::{fs, path::PathBuf};

#[derive(Args, Debug, Clone)]
pub struct VolumeArgs {
	/// Mount point or drive root (`E:\`, `/media/usb`, `/Volumes/Backup`)
	pub root: PathBuf,

	/// Volume kind as reported by the system
	#[arg(long, default_value = "fixed")]
	pub kind: VolumeKind,

	/// Drive letter, when the root doesn't start with one
	#[arg(long)]
	pub drive_letter: Option<char>,
}

impl VolumeArgs {
	pub fn to_volume(&self) -> Volume {
		let mut volume = Volume::new(&self.root, self.kind);
		if let Some(letter) = self.drive_letter {
			volume = volume.with_drive_letter(letter);
		}

		let read_only = fs::metadata(&self.root)
			.map(|metadata| metadata.permissions().readonly())
			.unwrap_or(false);
		volume.with_writable(!read_only)
	}
}

#[derive(Args, Debug, Clone)]
pub struct ApplyArgs {
	#[command(flatten)]
	pub volume: VolumeArgs,

	/// Source picture (PNG, JPEG, BMP, ICO, ...)
	pub image: PathBuf,

	/// Volume label written next to the icon
	#[arg(long)]
	pub label: Option<String>,

	/// Leave written assets visible
	#[arg(long, default_value_t = false)]
	pub no_hide: bool,

	/// Eject the volume once the icon is applied (removable volumes only)
	#[arg(long, default_value_t = false)]
	pub eject: bool,

	/// Only write descriptors on the volume, skip the system store
	#[arg(long, default_value_t = false)]
	pub portable: bool,
}

impl ApplyArgs {
	/// Flags can only turn behaviour on top of the configured defaults.
	pub fn options(&self, defaults: &ApplyOptions) -> ApplyOptions {
		ApplyOptions {
			hide_asset_files: defaults.hide_asset_files && !self.no_hide,
			eject_after_apply: defaults.eject_after_apply || self.eject,
			portable_only: defaults.portable_only || self.portable,
		}
	}
}

#[derive(Args, Debug, Clone)]
pub struct EjectArgs {
	/// Mount point or drive root
	pub root: PathBuf,

	/// Volume kind as reported by the system
	#[arg(long, default_value = "removable")]
	pub kind: VolumeKind,
}

impl EjectArgs {
	pub fn to_volume(&self) -> Volume {
		Volume::new(&self.root, self.kind)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn apply_args(no_hide: bool, eject: bool) -> ApplyArgs {
		ApplyArgs {
			volume: VolumeArgs {
				root: PathBuf::from("E:\\"),
				kind: VolumeKind::Removable,
				drive_letter: None,
			},
			image: PathBuf::from("logo.png"),
			label: None,
			no_hide,
			eject,
			portable: false,
		}
	}

	#[test]
	fn flags_layer_over_configured_defaults() {
		let defaults = ApplyOptions::default();

		let options = apply_args(true, true).options(&defaults);
		assert!(!options.hide_asset_files);
		assert!(options.eject_after_apply);
		assert!(!options.portable_only);

		assert_eq!(apply_args(false, false).options(&defaults), defaults);
	}

	#[test]
	fn drive_letter_comes_from_the_root_or_the_flag() {
		let args = apply_args(false, false);
		assert_eq!(args.volume.to_volume().drive_letter, Some('E'));

		let args = VolumeArgs {
			root: PathBuf::from("/media/usb"),
			kind: VolumeKind::Removable,
			drive_letter: Some('f'),
		};
		assert_eq!(args.to_volume().drive_letter, Some('F'));
	}
}
