//! Safe detachment of removable media through an ordered chain of methods.

pub mod scripted;

#[cfg(windows)]
pub mod native;

pub use scripted::{DiskutilEject, FinderEject, GioEject, ShellVerbEject, UdisksEject};

use crate::{
	command::CommandRunner,
	config::ShellTiming,
	context::{Platform, PlatformContext},
	error::CommandError,
	sys::HostTables,
	volume::Volume,
};

use async_trait::async_trait;
use di_utils::chain_optional_iter;
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const MANUAL_REMOVAL_HINT: &str = "unplug manually once the drive is idle";

#[derive(Error, Debug)]
pub enum EjectError {
	#[error(transparent)]
	Command(#[from] CommandError),
	#[error("volume is in use: {0}")]
	Busy(String),
	#[error("not supported here: {0}")]
	Unsupported(String),
	#[error("<root='{}'> is still mounted after the eject request", .0.display())]
	StillMounted(PathBuf),
	#[error("{0}")]
	Failed(String),
}

/// One way of detaching a volume. Implementations never force removal.
#[async_trait]
pub trait EjectMethod: fmt::Debug + Send + Sync {
	fn name(&self) -> &str;

	/// Returns a short description of what happened on success.
	async fn eject(&self, volume: &Volume) -> Result<String, EjectError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EjectAttempt {
	pub method: String,
	pub ok: bool,
	pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EjectReport {
	pub ok: bool,
	pub detail: String,
	/// Every method tried, in order.
	pub attempts: Vec<EjectAttempt>,
}

#[derive(Debug)]
pub struct EjectController {
	methods: Vec<Box<dyn EjectMethod>>,
}

impl EjectController {
	#[must_use]
	pub fn new(methods: Vec<Box<dyn EjectMethod>>) -> Self {
		Self { methods }
	}

	/// Fastest native primitive first, scripted fallback second.
	pub fn for_platform(
		ctx: &PlatformContext,
		runner: Arc<dyn CommandRunner>,
		system: Arc<dyn HostTables>,
		timing: &ShellTiming,
	) -> Self {
		let methods: Vec<Box<dyn EjectMethod>> = match ctx.platform {
			Platform::Windows => chain_optional_iter(
				[],
				[
					native_method(),
					Some(Box::new(ShellVerbEject::new(runner, timing.clone())) as Box<dyn EjectMethod>),
				],
			),
			Platform::Linux => vec![
				Box::new(UdisksEject::new(
					runner.clone(),
					system,
					timing.cache_tool_timeout(),
				)),
				Box::new(GioEject::new(runner, timing.cache_tool_timeout())),
			],
			Platform::MacOs => vec![
				Box::new(DiskutilEject::new(runner.clone(), timing.cache_tool_timeout())),
				Box::new(FinderEject::new(runner, timing.cache_tool_timeout())),
			],
		};

		Self::new(methods)
	}

	pub fn method_names(&self) -> impl Iterator<Item = &str> {
		self.methods.iter().map(|method| method.name())
	}

	/// Tries each method in order until one succeeds. Never retries a method.
	pub async fn eject(&self, volume: &Volume) -> EjectReport {
		if !volume.is_ejectable() {
			return EjectReport {
				ok: false,
				detail: format!("{} is a {} volume and cannot be ejected", volume.id(), volume.kind),
				attempts: Vec::new(),
			};
		}

		let mut attempts = Vec::with_capacity(self.methods.len());
		for method in &self.methods {
			debug!(volume = %volume.id(), method = method.name(), "Trying eject method");
			match method.eject(volume).await {
				Ok(detail) => {
					info!(volume = %volume.id(), method = method.name(), "Volume ejected");
					attempts.push(EjectAttempt {
						method: method.name().to_string(),
						ok: true,
						detail: detail.clone(),
					});
					return EjectReport {
						ok: true,
						detail: format!("{} ejected ({detail})", volume.id()),
						attempts,
					};
				}
				Err(e) => {
					warn!(?e, volume = %volume.id(), method = method.name(), "Eject method failed");
					attempts.push(EjectAttempt {
						method: method.name().to_string(),
						ok: false,
						detail: e.to_string(),
					});
				}
			}
		}

		let tried = attempts
			.iter()
			.map(|attempt| format!("{}: {}", attempt.method, attempt.detail))
			.collect::<Vec<_>>()
			.join("; ");

		EjectReport {
			ok: false,
			detail: if tried.is_empty() {
				format!("no eject method available for {}; {MANUAL_REMOVAL_HINT}", volume.id())
			} else {
				format!("{} could not be ejected ({tried}); {MANUAL_REMOVAL_HINT}", volume.id())
			},
			attempts,
		}
	}
}

#[cfg(windows)]
fn native_method() -> Option<Box<dyn EjectMethod>> {
	Some(Box::new(native::IoctlEject))
}

#[cfg(not(windows))]
fn native_method() -> Option<Box<dyn EjectMethod>> {
	None
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		context::DesktopEnvironment,
		testing::{FakeCommandRunner, FakeHostTables, ScriptedEjectMethod},
		volume::VolumeKind,
	};
	use pretty_assertions::assert_eq;

	#[tokio::test]
	async fn falls_back_in_order_and_stops_at_first_success() {
		let primary = ScriptedEjectMethod::failing("primary", "volume is busy");
		let secondary = ScriptedEjectMethod::succeeding("secondary");
		let never = ScriptedEjectMethod::succeeding("never");
		let (primary_calls, secondary_calls, never_calls) =
			(primary.calls(), secondary.calls(), never.calls());

		let controller =
			EjectController::new(vec![Box::new(primary), Box::new(secondary), Box::new(never)]);
		let report = controller
			.eject(&Volume::new("/media/usb", VolumeKind::Removable))
			.await;

		assert!(report.ok);
		assert_eq!(
			report
				.attempts
				.iter()
				.map(|attempt| (attempt.method.as_str(), attempt.ok))
				.collect::<Vec<_>>(),
			vec![("primary", false), ("secondary", true)]
		);
		assert_eq!(primary_calls.get(), 1);
		assert_eq!(secondary_calls.get(), 1);
		assert_eq!(never_calls.get(), 0);
	}

	#[tokio::test]
	async fn exhausted_methods_ask_for_manual_removal() {
		let controller = EjectController::new(vec![
			Box::new(ScriptedEjectMethod::failing("primary", "busy")),
			Box::new(ScriptedEjectMethod::failing("secondary", "still mounted")),
		]);
		let report = controller
			.eject(&Volume::new("/media/usb", VolumeKind::Removable))
			.await;

		assert!(!report.ok);
		assert_eq!(report.attempts.len(), 2);
		assert!(report.detail.contains(MANUAL_REMOVAL_HINT));
		assert!(report.detail.contains("still mounted"));
	}

	#[tokio::test]
	async fn fixed_volumes_are_refused_without_trying() {
		let method = ScriptedEjectMethod::succeeding("primary");
		let calls = method.calls();
		let report = EjectController::new(vec![Box::new(method)])
			.eject(&Volume::new("/", VolumeKind::System))
			.await;

		assert!(!report.ok);
		assert!(report.attempts.is_empty());
		assert_eq!(calls.get(), 0);
	}

	#[test]
	fn platform_chains_put_native_primitives_first() {
		let runner = Arc::new(FakeCommandRunner::new());
		let system = Arc::new(FakeHostTables::new());
		let timing = ShellTiming::immediate();
		let ctx = |platform| {
			PlatformContext::new(platform, DesktopEnvironment::Generic, false, "/", "/store", None)
		};

		let linux = EjectController::for_platform(
			&ctx(Platform::Linux),
			runner.clone(),
			system.clone(),
			&timing,
		);
		assert_eq!(linux.method_names().collect::<Vec<_>>(), vec!["udisksctl", "gio mount"]);

		let mac = EjectController::for_platform(
			&ctx(Platform::MacOs),
			runner.clone(),
			system.clone(),
			&timing,
		);
		assert_eq!(mac.method_names().collect::<Vec<_>>(), vec!["diskutil", "finder"]);

		let windows =
			EjectController::for_platform(&ctx(Platform::Windows), runner, system, &timing);
		assert_eq!(windows.method_names().last(), Some("shell verb"));
	}
}
