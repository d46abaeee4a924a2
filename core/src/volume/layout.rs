//! Canonical on-volume names and the text descriptors shells read from a volume root.

use di_utils::chain_optional_iter;
use std::path::{Path, PathBuf};

pub const ICON_DIR: &str = ".icons";
pub const ICO_FILE: &str = "drive_icon.ico";
pub const PRIMARY_PNG: &str = ".drive_icon.png";
pub const VOLUME_ICON_PNG: &str = ".VolumeIcon.png";

pub const DESKTOP_INI: &str = "desktop.ini";
pub const AUTORUN_INF: &str = "autorun.inf";
pub const DIRECTORY_ENTRY: &str = ".directory";
pub const VOLUME_ICON_ICNS: &str = ".VolumeIcon.icns";
pub const DS_STORE: &str = ".DS_Store";
pub const FSEVENTSD_DIR: &str = ".fseventsd";
pub const FSEVENTSD_NO_LOG: &str = "no_log";
pub const METADATA_NEVER_INDEX: &str = ".metadata_never_index";
pub const HIDDEN_LIST: &str = ".hidden";

/// Size of the zero-filled `.DS_Store` we create when none exists.
pub const DS_STORE_PLACEHOLDER_LEN: usize = 4096;

/// Entries written at the root of a volume, in the order they are checked by diagnose.
pub const ROOT_MARKERS: [&str; 8] = [
	DESKTOP_INI,
	AUTORUN_INF,
	DIRECTORY_ENTRY,
	VOLUME_ICON_ICNS,
	DS_STORE,
	FSEVENTSD_DIR,
	METADATA_NEVER_INDEX,
	HIDDEN_LIST,
];

const ICO_RELATIVE_WINDOWS: &str = r".icons\drive_icon.ico";
const PRIMARY_RELATIVE_POSIX: &str = "./.icons/.drive_icon.png";

#[must_use]
pub fn sized_png_name(size: u32) -> String {
	format!(".drive_icon_{size}.png")
}

/// Absolute paths of every canonical entry under one volume root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeLayout {
	root: PathBuf,
}

impl VolumeLayout {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	#[must_use]
	pub fn root(&self) -> &Path {
		&self.root
	}

	#[must_use]
	pub fn entry(&self, name: &str) -> PathBuf {
		self.root.join(name)
	}

	#[must_use]
	pub fn icon_dir(&self) -> PathBuf {
		self.root.join(ICON_DIR)
	}

	#[must_use]
	pub fn ico(&self) -> PathBuf {
		self.icon_dir().join(ICO_FILE)
	}

	#[must_use]
	pub fn primary_png(&self) -> PathBuf {
		self.icon_dir().join(PRIMARY_PNG)
	}

	#[must_use]
	pub fn sized_png(&self, size: u32) -> PathBuf {
		self.icon_dir().join(sized_png_name(size))
	}

	#[must_use]
	pub fn volume_icon_png(&self) -> PathBuf {
		self.icon_dir().join(VOLUME_ICON_PNG)
	}

	#[must_use]
	pub fn fseventsd_no_log(&self) -> PathBuf {
		self.root.join(FSEVENTSD_DIR).join(FSEVENTSD_NO_LOG)
	}
}

/// Strips line breaks so a label can never start a new descriptor key.
fn sanitize_label(label: &str) -> String {
	label
		.chars()
		.filter(|c| !matches!(c, '\r' | '\n'))
		.collect::<String>()
		.trim()
		.to_string()
}

fn render(lines: Vec<String>, newline: &str) -> String {
	let mut out = lines.join(newline);
	out.push_str(newline);
	out
}

/// Explorer folder customization, CRLF terminated.
#[must_use]
pub fn desktop_ini(label: Option<&str>) -> String {
	render(
		chain_optional_iter(
			[
				"[.ShellClassInfo]".to_string(),
				format!("IconResource={ICO_RELATIVE_WINDOWS},0"),
				format!("IconFile={ICO_RELATIVE_WINDOWS}"),
				"IconIndex=0".to_string(),
			],
			[label.map(|label| format!("LocalizedResourceName={}", sanitize_label(label)))],
		),
		"\r\n",
	)
}

/// Legacy autorun descriptor, only meaningful on removable media. CRLF terminated.
#[must_use]
pub fn autorun_inf(label: Option<&str>) -> String {
	render(
		chain_optional_iter(
			[
				"[autorun]".to_string(),
				format!("icon={ICO_RELATIVE_WINDOWS}"),
			],
			[label.map(|label| format!("label={}", sanitize_label(label)))],
		),
		"\r\n",
	)
}

/// freedesktop directory entry read by KDE, XFCE and friends. LF terminated.
#[must_use]
pub fn directory_entry(label: Option<&str>) -> String {
	render(
		chain_optional_iter(
			[
				"[Desktop Entry]".to_string(),
				format!("Icon={PRIMARY_RELATIVE_POSIX}"),
				"Type=Directory".to_string(),
			],
			[label.map(|label| format!("Name={}", sanitize_label(label)))],
		),
		"\n",
	)
}

#[must_use]
pub fn ds_store_placeholder() -> Vec<u8> {
	vec![0; DS_STORE_PLACEHOLDER_LEN]
}

/// Whether `bytes` is exactly what [`ds_store_placeholder`] writes, as opposed to real Finder state.
#[must_use]
pub fn is_ds_store_placeholder(bytes: &[u8]) -> bool {
	bytes.len() == DS_STORE_PLACEHOLDER_LEN && bytes.iter().all(|b| *b == 0)
}

/// Appends missing `names` to a Nautilus `.hidden` list. Existing content is kept byte for byte.
#[must_use]
pub fn merge_hidden_list(existing: &str, names: &[&str]) -> String {
	let mut merged = existing.to_string();

	for name in names {
		if merged.lines().any(|line| line.trim() == *name) {
			continue;
		}
		if !merged.is_empty() && !merged.ends_with('\n') {
			merged.push('\n');
		}
		merged.push_str(name);
		merged.push('\n');
	}

	merged
}

/// Drops the lines naming `names` from a `.hidden` list and keeps every other line as it was.
/// `None` means only blank lines are left and the file should go.
#[must_use]
pub fn strip_hidden_list(existing: &str, names: &[&str]) -> Option<String> {
	let kept = existing
		.split_inclusive('\n')
		.filter(|line| !names.contains(&line.trim()))
		.collect::<String>();

	(!kept.trim().is_empty()).then_some(kept)
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn desktop_ini_uses_crlf_and_optional_label() {
		assert_eq!(
			desktop_ini(Some("Backups")),
			"[.ShellClassInfo]\r\nIconResource=.icons\\drive_icon.ico,0\r\nIconFile=.icons\\drive_icon.ico\r\nIconIndex=0\r\nLocalizedResourceName=Backups\r\n"
		);
		assert!(!desktop_ini(None).contains("LocalizedResourceName"));
	}

	#[test]
	fn autorun_inf_matches_legacy_schema() {
		assert_eq!(
			autorun_inf(Some("USB")),
			"[autorun]\r\nicon=.icons\\drive_icon.ico\r\nlabel=USB\r\n"
		);
		assert_eq!(autorun_inf(None), "[autorun]\r\nicon=.icons\\drive_icon.ico\r\n");
	}

	#[test]
	fn directory_entry_uses_lf() {
		assert_eq!(
			directory_entry(Some("Photos")),
			"[Desktop Entry]\nIcon=./.icons/.drive_icon.png\nType=Directory\nName=Photos\n"
		);
	}

	#[test]
	fn labels_cannot_inject_keys() {
		let rendered = directory_entry(Some("evil\nIcon=/etc/passwd"));
		assert_eq!(rendered.lines().filter(|l| l.starts_with("Icon=")).count(), 1);
	}

	#[test]
	fn hidden_list_merge_and_strip_preserve_foreign_lines() {
		let merged = merge_hidden_list("snap\n", &[DIRECTORY_ENTRY, ICON_DIR]);
		assert_eq!(merged, "snap\n.directory\n.icons\n");
		assert_eq!(merge_hidden_list(&merged, &[ICON_DIR]), merged);

		assert_eq!(
			strip_hidden_list(&merged, &[DIRECTORY_ENTRY, ICON_DIR]),
			Some("snap\n".to_string())
		);
		assert_eq!(strip_hidden_list(".icons\n", &[ICON_DIR]), None);
	}

	#[test]
	fn hidden_list_keeps_blank_lines_and_line_endings() {
		let existing = "snap\n\n  \r\nbackups";
		let merged = merge_hidden_list(existing, &[DESKTOP_INI]);
		assert_eq!(merged, "snap\n\n  \r\nbackups\ndesktop.ini\n");
		assert!(merged.starts_with(existing));

		assert_eq!(
			strip_hidden_list(&merged, &[DESKTOP_INI]),
			Some("snap\n\n  \r\nbackups\n".to_string())
		);
		assert_eq!(strip_hidden_list("\n\ndesktop.ini\n", &[DESKTOP_INI]), None);
		assert_eq!(merge_hidden_list("", &[DESKTOP_INI]), "desktop.ini\n");
	}

	#[test]
	fn only_the_zero_filled_ds_store_is_ours() {
		assert!(is_ds_store_placeholder(&ds_store_placeholder()));
		let mut real = ds_store_placeholder();
		real[10] = 1;
		assert!(!is_ds_store_placeholder(&real));
		assert!(!is_ds_store_placeholder(&[0; 16]));
	}
}
