//! Which process renders volume icons on each desktop, and how to bounce it.

use crate::{
	command::CommandLine,
	context::{DesktopEnvironment, Platform, PlatformContext},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellProfile {
	/// Process name as the host's process table reports it.
	pub process: &'static str,
	pub stop: CommandLine,
	pub start: CommandLine,
	/// Run after stopping, before anything is rebuilt.
	pub cache_clear: Vec<CommandLine>,
	pub cache_rebuild: Vec<CommandLine>,
	/// The desktop is unusable without it, so it is started even if it wasn't running.
	pub essential: bool,
	/// How many times a change notification is sent.
	pub notify_repeats: u32,
}

/// One row of the Linux file manager table: process, stop args, start args.
struct LinuxRow {
	process: &'static str,
	stop: &'static [&'static str],
	start: &'static [&'static str],
	cache_rebuild: Option<&'static str>,
	essential: bool,
}

const fn linux_row(desktop: DesktopEnvironment) -> Option<LinuxRow> {
	use DesktopEnvironment as De;

	Some(match desktop {
		De::Gnome | De::Unity | De::Pantheon | De::Budgie => LinuxRow {
			process: "nautilus",
			stop: &["nautilus", "-q"],
			start: &["nautilus", "--gapplication-service"],
			cache_rebuild: None,
			essential: false,
		},
		De::Cinnamon => LinuxRow {
			process: "nemo",
			stop: &["nemo", "-q"],
			start: &["nemo", "--no-default-window"],
			cache_rebuild: None,
			essential: false,
		},
		De::Mate => LinuxRow {
			process: "caja",
			stop: &["caja", "-q"],
			start: &["caja", "--no-default-window"],
			cache_rebuild: None,
			essential: false,
		},
		De::Xfce => LinuxRow {
			process: "thunar",
			stop: &["thunar", "-q"],
			start: &["thunar", "--daemon"],
			cache_rebuild: None,
			essential: false,
		},
		De::Kde => LinuxRow {
			process: "plasmashell",
			stop: &["kquitapp5", "plasmashell"],
			start: &["kstart5", "plasmashell"],
			cache_rebuild: Some("kbuildsycoca5"),
			essential: true,
		},
		De::Lxde => LinuxRow {
			process: "pcmanfm",
			stop: &["pkill", "-x", "pcmanfm"],
			start: &["pcmanfm", "--desktop"],
			cache_rebuild: None,
			essential: false,
		},
		De::Lxqt => LinuxRow {
			process: "pcmanfm-qt",
			stop: &["pkill", "-x", "pcmanfm-qt"],
			start: &["pcmanfm-qt", "--desktop"],
			cache_rebuild: None,
			essential: false,
		},
		De::Deepin => LinuxRow {
			process: "dde-file-manager",
			stop: &["pkill", "-x", "dde-file-manager"],
			start: &["dde-file-manager", "-d"],
			cache_rebuild: None,
			essential: false,
		},
		De::Generic => return None,
	})
}

fn command(parts: &[&str]) -> CommandLine {
	let (program, args) = parts.split_first().map_or(("", &[][..]), |(p, a)| (*p, a));
	CommandLine::new(program).args(args.iter().copied())
}

impl ShellProfile {
	/// `None` when nothing on this host is ours to manage (unknown Linux desktops).
	#[must_use]
	pub fn for_context(ctx: &PlatformContext) -> Option<Self> {
		match ctx.platform {
			Platform::Windows => Some(Self::explorer()),
			Platform::MacOs => Some(Self::finder()),
			Platform::Linux => linux_row(ctx.desktop).map(|row| Self {
				process: row.process,
				stop: command(row.stop),
				start: command(row.start),
				cache_clear: Vec::new(),
				cache_rebuild: row.cache_rebuild.map(CommandLine::new).into_iter().collect(),
				essential: row.essential,
				notify_repeats: 1,
			}),
		}
	}

	fn explorer() -> Self {
		Self {
			process: "explorer.exe",
			stop: CommandLine::new("taskkill").args(["/F", "/IM", "explorer.exe"]),
			start: CommandLine::new("explorer.exe"),
			cache_clear: vec![CommandLine::new("ie4uinit.exe").arg("-ClearIconCache")],
			cache_rebuild: vec![CommandLine::new("ie4uinit.exe").arg("-show")],
			essential: true,
			notify_repeats: 2,
		}
	}

	fn finder() -> Self {
		Self {
			process: "Finder",
			stop: CommandLine::new("killall").arg("Finder"),
			start: CommandLine::new("open").args(["-a", "Finder"]),
			cache_clear: Vec::new(),
			cache_rebuild: Vec::new(),
			essential: true,
			notify_repeats: 1,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;
	use std::path::PathBuf;

	fn ctx(platform: Platform, desktop: DesktopEnvironment) -> PlatformContext {
		PlatformContext::new(platform, desktop, false, "/", PathBuf::from("/store"), None)
	}

	#[test]
	fn linux_desktops_map_to_their_file_manager() {
		let cases = [
			(DesktopEnvironment::Gnome, "nautilus", "nautilus -q"),
			(DesktopEnvironment::Budgie, "nautilus", "nautilus -q"),
			(DesktopEnvironment::Cinnamon, "nemo", "nemo -q"),
			(DesktopEnvironment::Mate, "caja", "caja -q"),
			(DesktopEnvironment::Xfce, "thunar", "thunar -q"),
			(DesktopEnvironment::Kde, "plasmashell", "kquitapp5 plasmashell"),
			(DesktopEnvironment::Lxqt, "pcmanfm-qt", "pkill -x pcmanfm-qt"),
		];

		for (desktop, process, stop) in cases {
			let profile = ShellProfile::for_context(&ctx(Platform::Linux, desktop)).unwrap();
			assert_eq!(profile.process, process);
			assert_eq!(profile.stop.to_string(), stop);
		}
	}

	#[test]
	fn unknown_desktops_have_no_profile() {
		assert!(ShellProfile::for_context(&ctx(Platform::Linux, DesktopEnvironment::Generic)).is_none());
	}

	#[test]
	fn kde_rebuilds_its_service_cache() {
		let profile = ShellProfile::for_context(&ctx(Platform::Linux, DesktopEnvironment::Kde)).unwrap();
		assert_eq!(profile.cache_rebuild, vec![CommandLine::new("kbuildsycoca5")]);
		assert!(profile.essential);
	}

	#[test]
	fn explorer_is_bounced_with_taskkill_and_notified_twice() {
		let profile =
			ShellProfile::for_context(&ctx(Platform::Windows, DesktopEnvironment::Generic)).unwrap();
		assert_eq!(profile.stop.to_string(), "taskkill /F /IM explorer.exe");
		assert_eq!(profile.notify_repeats, 2);
		assert_eq!(profile.cache_clear[0].to_string(), "ie4uinit.exe -ClearIconCache");
	}
}
