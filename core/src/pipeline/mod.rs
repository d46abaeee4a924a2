//! The icon pipeline: apply, remove and diagnose over the store, shell and eject components.
//!
//! Each run executes its plan strictly in order on the caller's task. Only
//! [`FailureKind::FatalInput`] and [`FailureKind::PermissionDenied`] end a run
//! early; everything else is recorded as an [`Advisory`] and the run carries on.

pub mod diagnose;
pub mod markers;
pub mod progress;

pub use diagnose::{DiagnoseReport, IconFileStatus, MarkerStatus};
pub use progress::{ProgressEvent, ProgressKind, StatusReporter};

use crate::{
	command::{CommandRunner, SystemCommandRunner},
	config::ShellTiming,
	context::{Platform, PlatformContext},
	eject::{EjectController, EjectReport},
	error::{Advisory, FailureKind, PipelineError},
	shell::{ChangeNotifier, ShellAction, ShellCacheController, ShellError},
	store::{PersistError, PersistentIconStore, RegExe, Registry},
	sys::{HostTables, SysinfoTables},
	volume::{guard, GuardError, GuardedFs, Volume, VolumeClassifier},
};

use di_images::{IconAssetBuilder, IconAssetBundle};
use markers::{Failures, MarkerWriter};
use serde::{Deserialize, Serialize};
use std::{
	fmt, io,
	path::{Path, PathBuf},
	sync::Arc,
};
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
	Init,
	StopShell,
	ClearCache,
	PurgeOldAssets,
	BuildAssets,
	PersistIcon,
	WritePlatformMarkers,
	SafeHideAssets,
	RebuildCache,
	StartShell,
	Notify,
	Eject,
	RemoveStoreEntries,
	RemoveMarkers,
	RestartShell,
}

impl Step {
	#[must_use]
	pub const fn name(self) -> &'static str {
		match self {
			Self::Init => "init",
			Self::StopShell => "stop_shell",
			Self::ClearCache => "clear_cache",
			Self::PurgeOldAssets => "purge_old_assets",
			Self::BuildAssets => "build_assets",
			Self::PersistIcon => "persist_icon",
			Self::WritePlatformMarkers => "write_platform_markers",
			Self::SafeHideAssets => "safe_hide_assets",
			Self::RebuildCache => "rebuild_cache",
			Self::StartShell => "start_shell",
			Self::Notify => "notify",
			Self::Eject => "eject",
			Self::RemoveStoreEntries => "remove_store_entries",
			Self::RemoveMarkers => "remove_markers",
			Self::RestartShell => "restart_shell",
		}
	}
}

impl fmt::Display for Step {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// Apply steps in execution order. `Eject` only runs when requested for a removable volume.
pub const APPLY_PLAN: [Step; 12] = [
	Step::Init,
	Step::StopShell,
	Step::ClearCache,
	Step::PurgeOldAssets,
	Step::BuildAssets,
	Step::PersistIcon,
	Step::WritePlatformMarkers,
	Step::SafeHideAssets,
	Step::RebuildCache,
	Step::StartShell,
	Step::Notify,
	Step::Eject,
];

pub const REMOVE_PLAN: [Step; 6] = [
	Step::Init,
	Step::RemoveStoreEntries,
	Step::RemoveMarkers,
	Step::ClearCache,
	Step::RestartShell,
	Step::Notify,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyOptions {
	/// Mark written assets and descriptors hidden.
	pub hide_asset_files: bool,
	/// Eject after a successful apply. Removable volumes only.
	pub eject_after_apply: bool,
	/// Skip registry and native marker integration; write only the cross-platform descriptors.
	pub portable_only: bool,
}

impl Default for ApplyOptions {
	fn default() -> Self {
		Self {
			hide_asset_files: true,
			eject_after_apply: false,
			portable_only: false,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
	Apply,
	Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
	Done,
	Skipped,
	Warned,
	Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
	pub step: Step,
	pub number: usize,
	pub outcome: StepOutcome,
	pub detail: String,
}

/// Terminal result of an apply or remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
	pub operation: Operation,
	pub volume: String,
	pub ok: bool,
	/// Set only when `ok` is false.
	pub failure: Option<FailureKind>,
	pub message: String,
	pub changed: Vec<String>,
	pub skipped: Vec<String>,
	pub advisories: Vec<Advisory>,
	/// The icon is in place but only shows after a reboot (system volumes).
	pub requires_restart: bool,
	pub eject: Option<EjectReport>,
	pub steps: Vec<StepRecord>,
}

impl RunReport {
	/// One line per distinct follow-up, terminal failure first.
	#[must_use]
	pub fn follow_ups(&self) -> Vec<&'static str> {
		let mut follow_ups = Vec::new();
		for kind in self
			.failure
			.into_iter()
			.chain(self.advisories.iter().map(|advisory| advisory.kind))
		{
			let line = kind.follow_up();
			if !follow_ups.contains(&line) {
				follow_ups.push(line);
			}
		}
		follow_ups
	}
}

/// Book-keeping for one run: step numbering, progress events and the report under construction.
struct Run {
	plan: Vec<Step>,
	reporter: StatusReporter,
	number: usize,
	shell_stop_attempted: bool,
	report: RunReport,
}

impl Run {
	fn new(operation: Operation, volume: &Volume, plan: Vec<Step>, reporter: StatusReporter) -> Self {
		Self {
			plan,
			reporter,
			number: 0,
			shell_stop_attempted: false,
			report: RunReport {
				operation,
				volume: volume.id(),
				ok: true,
				failure: None,
				message: String::new(),
				changed: Vec::new(),
				skipped: Vec::new(),
				advisories: Vec::new(),
				requires_restart: false,
				eject: None,
				steps: Vec::new(),
			},
		}
	}

	fn current_step(&self) -> Step {
		self.report
			.steps
			.last()
			.map_or(Step::Init, |record| record.step)
	}

	fn emit(&mut self, kind: ProgressKind, message: impl Into<String>) {
		let step = self.current_step();
		let total = self.plan.len();
		self.reporter.emit(step, self.number, total, kind, message);
	}

	fn set_outcome(&mut self, outcome: StepOutcome) {
		if let Some(record) = self.report.steps.last_mut() {
			record.outcome = record.outcome.max_with(outcome);
		}
	}

	fn start(&mut self, step: Step, message: impl Into<String>) {
		let message = message.into();
		self.number = self
			.plan
			.iter()
			.position(|planned| *planned == step)
			.map_or(self.number + 1, |index| index + 1);
		self.report.steps.push(StepRecord {
			step,
			number: self.number,
			outcome: StepOutcome::Done,
			detail: message.clone(),
		});
		self.emit(ProgressKind::Started, message);
	}

	fn detail(&mut self, message: impl Into<String>) {
		self.emit(ProgressKind::Detail, message);
	}

	fn skip(&mut self, reason: impl Into<String>) {
		let reason = reason.into();
		let entry = format!("{}: {reason}", self.current_step());
		self.set_outcome(StepOutcome::Skipped);
		self.report.skipped.push(entry);
		self.emit(ProgressKind::Detail, format!("skipped: {reason}"));
	}

	fn advise(&mut self, kind: FailureKind, message: impl Into<String>) {
		let advisory = Advisory::new(kind, self.current_step(), message);
		self.set_outcome(StepOutcome::Warned);
		self.emit(ProgressKind::Warning, advisory.message.clone());
		self.report.advisories.push(advisory);
	}

	fn advise_failures(&mut self, kind: FailureKind, failures: Failures) {
		for (path, message) in failures {
			self.advise(kind, format!("{}: {message}", path.display()));
		}
	}

	fn changed(&mut self, entries: impl IntoIterator<Item = String>) {
		let before = self.report.changed.len();
		self.report.changed.extend(entries);
		let count = self.report.changed.len() - before;
		if count > 0 {
			self.detail(format!("{count} entries changed"));
		}
	}

	fn shell(&mut self, result: Result<ShellAction, ShellError>) {
		match result {
			Ok(ShellAction::Done(detail)) => self.detail(detail),
			Ok(ShellAction::Skipped(reason)) => self.skip(reason),
			Err(e) => self.advise(FailureKind::SoftShellFailure, e.to_string()),
		}
	}

	fn fail(&mut self, e: &PipelineError) {
		let kind = e.kind();
		error!(step = %self.current_step(), ?kind, error = %e, "Pipeline run failed");
		self.set_outcome(StepOutcome::Failed);
		self.emit(ProgressKind::Warning, e.to_string());
		self.report.ok = false;
		self.report.failure = Some(kind);
		self.report.message = e.to_string();
	}
}

impl StepOutcome {
	/// Outcomes only get worse within a step.
	const fn max_with(self, other: Self) -> Self {
		if (other as u8) > (self as u8) {
			other
		} else {
			self
		}
	}
}

fn guard_failure(volume: &Volume, e: GuardError) -> PipelineError {
	match e {
		GuardError::Io(e) => PipelineError::Io(e),
		GuardError::Refused(path) => PipelineError::invalid_volume(
			&volume.root,
			format!("refusing to modify {}", path.display()),
		),
	}
}

fn persist_failure(volume: &Volume, e: PersistError) -> PipelineError {
	match e {
		PersistError::Store(e) => PipelineError::PermissionDenied {
			action: "registering the drive icon for the current user".to_string(),
			message: e.to_string(),
		},
		PersistError::Write(e) => guard_failure(volume, e),
		PersistError::Io(e) => PipelineError::Io(e),
		PersistError::Asset(e) => PipelineError::Image(e),
		PersistError::NoDriveLetter(id) => {
			PipelineError::invalid_volume(&volume.root, format!("{id} has no drive letter"))
		}
	}
}

fn display_all(paths: impl IntoIterator<Item = PathBuf>) -> impl Iterator<Item = String> {
	paths.into_iter().map(|path| path.display().to_string())
}

#[derive(Debug)]
pub struct IconPipeline {
	ctx: PlatformContext,
	runner: Arc<dyn CommandRunner>,
	system: Arc<dyn HostTables>,
	notifier: Arc<dyn ChangeNotifier>,
	store: PersistentIconStore,
	eject: EjectController,
	builder: IconAssetBuilder,
	timing: ShellTiming,
}

impl IconPipeline {
	pub fn new(
		ctx: PlatformContext,
		runner: Arc<dyn CommandRunner>,
		system: Arc<dyn HostTables>,
		registry: Arc<dyn Registry>,
		notifier: Arc<dyn ChangeNotifier>,
		eject: EjectController,
		timing: ShellTiming,
	) -> Self {
		let store = PersistentIconStore::for_platform(
			&ctx,
			runner.clone(),
			registry,
			timing.command_timeout(),
		);

		Self {
			ctx,
			runner,
			system,
			notifier,
			store,
			eject,
			builder: IconAssetBuilder::new(),
			timing,
		}
	}

	/// Wires the real command runner, process table, registry, notifier and eject chain for this host.
	pub fn for_host(ctx: PlatformContext, timing: ShellTiming) -> Self {
		let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);
		let system: Arc<dyn HostTables> = Arc::new(SysinfoTables);
		let registry = Arc::new(RegExe::new(runner.clone(), timing.command_timeout()));
		let eject = EjectController::for_platform(&ctx, runner.clone(), system.clone(), &timing);
		Self::new(ctx, runner, system, registry, host_notifier(), eject, timing)
	}

	#[must_use]
	pub fn with_builder(mut self, builder: IconAssetBuilder) -> Self {
		self.builder = builder;
		self
	}

	#[must_use]
	pub const fn context(&self) -> &PlatformContext {
		&self.ctx
	}

	#[must_use]
	pub fn classifier(&self, volume: &Volume) -> VolumeClassifier {
		VolumeClassifier::new(&volume.root)
			.with_icon_store(&self.ctx.icon_store_dir)
			.with_shell_cache(self.ctx.shell_cache_dir.clone())
	}

	fn shell(&self) -> ShellCacheController {
		ShellCacheController::new(
			crate::shell::ShellProfile::for_context(&self.ctx),
			self.ctx.shell_cache_dir.clone(),
			self.runner.clone(),
			self.system.clone(),
			self.notifier.clone(),
			self.timing.clone(),
		)
	}

	fn writer<'a>(&'a self, classifier: &'a VolumeClassifier, volume: &Volume) -> MarkerWriter<'a> {
		MarkerWriter::new(
			self.ctx.platform,
			self.runner.as_ref(),
			self.timing.command_timeout(),
			GuardedFs::new(classifier),
			volume,
		)
	}

	async fn validate(
		&self,
		classifier: &VolumeClassifier,
		volume: &Volume,
		needs_letter: bool,
	) -> Result<(), PipelineError> {
		if classifier.root_is_protected() {
			return Err(PipelineError::invalid_volume(
				&volume.root,
				"this location belongs to the operating system or the trash",
			));
		}

		let metadata = match tokio::fs::metadata(&volume.root).await {
			Ok(metadata) => metadata,
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				return Err(PipelineError::invalid_volume(&volume.root, "not mounted"))
			}
			Err(e) => return Err(di_utils::FileIOError::from((&volume.root, e)).into()),
		};

		if !metadata.is_dir() {
			return Err(PipelineError::invalid_volume(&volume.root, "not a directory"));
		}
		if !volume.writable {
			return Err(PipelineError::invalid_volume(&volume.root, "volume is read-only"));
		}
		if needs_letter && volume.drive_letter.is_none() {
			return Err(PipelineError::invalid_volume(
				&volume.root,
				"drive icons are registered per drive letter and this volume has none",
			));
		}

		Ok(())
	}

	async fn render(&self, image: &Path) -> Result<IconAssetBundle, PipelineError> {
		let builder = self.builder.clone();
		let image = image.to_path_buf();

		tokio::task::spawn_blocking(move || builder.build_from_path(image))
			.await
			.map_err(|e| di_images::Error::Io(io::Error::other(e.to_string())))?
			.map_err(Into::into)
	}

	/// Applies `image` as the icon of `volume`.
	#[instrument(skip(self, volume, options, reporter), fields(volume = %volume.id()))]
	pub async fn apply(
		&self,
		volume: &Volume,
		image: &Path,
		label: Option<&str>,
		options: &ApplyOptions,
		reporter: StatusReporter,
	) -> RunReport {
		let eject_planned = options.eject_after_apply && volume.is_ejectable();
		let plan = APPLY_PLAN
			.into_iter()
			.filter(|step| *step != Step::Eject || eject_planned)
			.collect();

		let mut run = Run::new(Operation::Apply, volume, plan, reporter);
		let classifier = self.classifier(volume);
		let mut shell = self.shell();

		if let Err(e) = self
			.apply_steps(&mut run, &mut shell, &classifier, volume, image, label, options)
			.await
		{
			run.fail(&e);
			self.recover_shell(&mut run, &mut shell).await;
		} else if volume.is_system() {
			run.report.requires_restart = true;
		}

		let report = finish(run, volume);
		info!(ok = report.ok, message = %report.message, "Apply finished");
		report
	}

	#[allow(clippy::too_many_arguments)]
	async fn apply_steps(
		&self,
		run: &mut Run,
		shell: &mut ShellCacheController,
		classifier: &VolumeClassifier,
		volume: &Volume,
		image: &Path,
		label: Option<&str>,
		options: &ApplyOptions,
	) -> Result<(), PipelineError> {
		run.start(
			Step::Init,
			format!("checking {} and rendering {}", volume.id(), image.display()),
		);
		self.validate(
			classifier,
			volume,
			self.ctx.platform == Platform::Windows && !options.portable_only,
		)
		.await?;
		if options.eject_after_apply && !volume.is_ejectable() {
			run.skip(format!(
				"eject requested but {} is a {} volume; it will not be ejected",
				volume.id(),
				volume.kind
			));
		}
		let mut bundle = self.render(image).await?;
		run.detail(format!("rendered {} bitmaps", bundle.bitmaps.len()));

		run.start(Step::StopShell, "stopping the shell");
		run.shell_stop_attempted = true;
		run.shell(shell.stop_shell().await);

		run.start(Step::ClearCache, "clearing the shell icon cache");
		run.shell(shell.invalidate(classifier).await);

		let writer = self.writer(classifier, volume);
		let guarded = GuardedFs::new(classifier);

		run.start(Step::PurgeOldAssets, "removing assets from earlier runs");
		let (removed, failures) = writer.purge().await;
		run.changed(display_all(removed).map(|path| format!("removed {path}")));
		for (path, message) in failures {
			run.skip(format!("left {} in place: {message}", path.display()));
		}

		run.start(Step::BuildAssets, "writing icon assets");
		let (entries, failures) = writer
			.write_assets(&bundle)
			.await
			.map_err(|e| guard_failure(volume, e))?;
		bundle.set_primary_asset(writer.layout().primary_png());
		run.changed(entries.iter().map(|entry| entry.path.display().to_string()));
		run.advise_failures(FailureKind::PartialWriteFailure, failures);
		let mut written = entries;

		run.start(Step::PersistIcon, "registering the icon with the system");
		let mut native_marker = None;
		if options.portable_only {
			run.skip("portable mode leaves OS integration alone");
		} else {
			let outcome = self
				.store
				.persist(&guarded, volume, &bundle, label)
				.await
				.map_err(|e| persist_failure(volume, e))?;
			run.changed(outcome.changed);
			for warning in outcome.warnings {
				run.advise(FailureKind::PartialWriteFailure, warning);
			}
			if let Some(entry) = outcome.marker.and_then(|marker| classifier.entry(marker)) {
				written.push(entry);
				native_marker = self.store.native_marker();
			}
		}

		run.start(Step::WritePlatformMarkers, "writing cross-platform descriptors");
		let (entries, failures) = writer
			.write_descriptors(volume, &bundle, label, native_marker)
			.await;
		run.changed(entries.iter().map(|entry| entry.path.display().to_string()));
		run.advise_failures(FailureKind::PartialWriteFailure, failures);
		written.extend(entries);

		run.start(Step::SafeHideAssets, "hiding icon metadata");
		if options.hide_asset_files {
			let (hidden, failures) = writer.hide(&written).await;
			run.detail(format!("{} entries hidden", hidden.len()));
			run.advise_failures(FailureKind::PartialWriteFailure, failures);
		} else {
			run.skip("asset hiding disabled");
		}

		run.start(Step::RebuildCache, "rebuilding the shell icon cache");
		run.shell(shell.rebuild_cache().await);

		run.start(Step::StartShell, "starting the shell");
		match shell.start_shell().await {
			Err(e) => run.advise(
				FailureKind::SoftShellFailure,
				format!("{e}; the icon is applied but the shell needs a manual restart"),
			),
			result => run.shell(result),
		}

		run.start(Step::Notify, "notifying the shell");
		run.shell(shell.notify_change(volume).await);

		if run.plan.contains(&Step::Eject) {
			run.start(Step::Eject, format!("ejecting {}", volume.id()));
			let report = self.eject.eject(volume).await;
			if report.ok {
				run.detail(report.detail.clone());
			} else {
				run.advise(FailureKind::EjectFailure, report.detail.clone());
			}
			run.report.eject = Some(report);
		}

		Ok(())
	}

	/// Never leave the desktop without its file browser after a terminal failure.
	async fn recover_shell(&self, run: &mut Run, shell: &mut ShellCacheController) {
		if !run.shell_stop_attempted {
			return;
		}

		match shell.start_shell().await {
			Ok(action) => info!(%action, "Shell recovered after failed run"),
			Err(e) => {
				warn!(?e, "Shell could not be restarted after failed run");
				run.report.advisories.push(Advisory::new(
					FailureKind::SoftShellFailure,
					Step::StartShell,
					e.to_string(),
				));
			}
		}
	}

	/// Reverses everything apply wrote. A volume without icon state is a successful no-op.
	#[instrument(skip(self, volume, reporter), fields(volume = %volume.id()))]
	pub async fn remove(&self, volume: &Volume, reporter: StatusReporter) -> RunReport {
		let mut run = Run::new(Operation::Remove, volume, REMOVE_PLAN.to_vec(), reporter);
		let classifier = self.classifier(volume);
		let mut shell = self.shell();

		if let Err(e) = self
			.remove_steps(&mut run, &mut shell, &classifier, volume)
			.await
		{
			run.fail(&e);
			self.recover_shell(&mut run, &mut shell).await;
		}

		let report = finish(run, volume);
		info!(ok = report.ok, message = %report.message, "Remove finished");
		report
	}

	async fn remove_steps(
		&self,
		run: &mut Run,
		shell: &mut ShellCacheController,
		classifier: &VolumeClassifier,
		volume: &Volume,
	) -> Result<(), PipelineError> {
		run.start(Step::Init, format!("checking {}", volume.id()));
		self.validate(classifier, volume, false).await?;

		let guarded = GuardedFs::new(classifier);
		let writer = self.writer(classifier, volume);

		run.start(Step::RemoveStoreEntries, "removing the system icon registration");
		let outcome = self
			.store
			.unpersist(&guarded, volume)
			.await
			.map_err(|e| persist_failure(volume, e))?;
		run.changed(outcome.changed);
		for warning in outcome.warnings {
			run.advise(FailureKind::PartialWriteFailure, warning);
		}

		run.start(Step::RemoveMarkers, "removing markers and assets");
		let (removed, failures) = writer.remove_all().await;
		run.changed(display_all(removed));
		run.advise_failures(FailureKind::PartialWriteFailure, failures);

		run.start(Step::ClearCache, "clearing the shell icon cache");
		run.shell(shell.invalidate(classifier).await);

		run.start(Step::RestartShell, "restarting the shell");
		run.shell_stop_attempted = true;
		run.shell(shell.restart_shell().await);

		run.start(Step::Notify, "notifying the shell");
		run.shell(shell.notify_change(volume).await);

		Ok(())
	}

	/// Read-only report of store state, markers and classifier flags.
	pub async fn diagnose(&self, volume: &Volume) -> DiagnoseReport {
		let classifier = self.classifier(volume);
		let root_exists = guard::exists(&volume.root).await.unwrap_or(false);
		let store = self.store.inspect(volume).await;
		let (markers, icon_files) = diagnose::inspect_volume(volume, &classifier).await;

		DiagnoseReport {
			platform: self.ctx.platform,
			desktop: self.ctx.desktop,
			elevated: self.ctx.elevated,
			volume: volume.id(),
			root: volume.root.clone(),
			kind: volume.kind,
			writable: volume.writable,
			root_exists,
			store,
			markers,
			icon_files,
		}
	}

	/// Ejects without applying anything. Non-removable volumes are refused.
	pub async fn eject(&self, volume: &Volume) -> EjectReport {
		self.eject.eject(volume).await
	}
}

fn finish(mut run: Run, volume: &Volume) -> RunReport {
	let report = &mut run.report;
	let id = &report.volume;

	if report.ok {
		let mut message = match report.operation {
			Operation::Apply => format!("Icon applied to {id}"),
			Operation::Remove if report.changed.is_empty() => {
				format!("Nothing to remove from {id}; no icon state was found")
			}
			Operation::Remove => format!("Icon removed from {id}"),
		};

		if !report.changed.is_empty() {
			message.push_str(&format!(" ({} entries changed)", report.changed.len()));
		}
		match &report.eject {
			Some(eject) if eject.ok => message.push_str(&format!(" and ejected: {}", eject.detail)),
			Some(_) => message.push_str("; the volume could not be ejected"),
			None => {}
		}
		if report.requires_restart {
			message.push_str(&format!(
				"; {} is a system volume, restart to see the new icon everywhere",
				volume.id()
			));
		}
		if !report.advisories.is_empty() {
			message.push_str(&format!("; {} warning(s)", report.advisories.len()));
		}
		report.message = message;
	} else if let Some(kind) = report.failure {
		report.message = format!("{} failed ({kind}): {}", operation_name(report.operation), report.message);
	}

	let follow_ups = report.follow_ups();
	if !follow_ups.is_empty() {
		report.message.push_str(". Next: ");
		report.message.push_str(&follow_ups.join("; "));
	}

	run.report
}

const fn operation_name(operation: Operation) -> &'static str {
	match operation {
		Operation::Apply => "Apply",
		Operation::Remove => "Remove",
	}
}

#[cfg(windows)]
fn host_notifier() -> Arc<dyn ChangeNotifier> {
	Arc::new(crate::shell::notify::ShellChangeNotifier)
}

#[cfg(not(windows))]
fn host_notifier() -> Arc<dyn ChangeNotifier> {
	Arc::new(crate::shell::MtimeNotifier)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn plans_follow_the_documented_order() {
		assert_eq!(APPLY_PLAN.first(), Some(&Step::Init));
		assert_eq!(APPLY_PLAN.last(), Some(&Step::Eject));
		assert_eq!(
			REMOVE_PLAN.map(Step::name),
			[
				"init",
				"remove_store_entries",
				"remove_markers",
				"clear_cache",
				"restart_shell",
				"notify"
			]
		);
	}

	#[test]
	fn step_names_match_serde() {
		for step in APPLY_PLAN.into_iter().chain(REMOVE_PLAN) {
			assert_eq!(
				serde_json::to_value(step).unwrap(),
				serde_json::Value::String(step.name().to_string())
			);
		}
	}

	#[test]
	fn outcomes_only_escalate() {
		assert_eq!(StepOutcome::Warned.max_with(StepOutcome::Skipped), StepOutcome::Warned);
		assert_eq!(StepOutcome::Done.max_with(StepOutcome::Failed), StepOutcome::Failed);
	}

	#[test]
	fn follow_ups_are_deduplicated() {
		let volume = Volume::new("/media/usb", crate::volume::VolumeKind::Removable);
		let mut run = Run::new(
			Operation::Apply,
			&volume,
			APPLY_PLAN.to_vec(),
			StatusReporter::silent(),
		);
		run.start(Step::StopShell, "stop");
		run.advise(FailureKind::SoftShellFailure, "a");
		run.advise(FailureKind::SoftShellFailure, "b");

		let report = finish(run, &volume);
		assert_eq!(report.follow_ups().len(), 1);
		assert!(report.ok);
		assert_eq!(report.steps[0].outcome, StepOutcome::Warned);
	}

	#[test]
	fn default_options_hide_assets() {
		let options = ApplyOptions::default();
		assert!(options.hide_asset_files);
		assert!(!options.eject_after_apply);
		assert!(!options.portable_only);
	}
}
