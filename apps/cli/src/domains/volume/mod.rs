mod args;

pub use args::{ApplyArgs, EjectArgs, VolumeArgs};

use crate::{context::Context, util::prelude::*};

use anyhow::Result;
use di_core::{DiagnoseReport, EjectReport, ProgressEvent, RunReport, StatusReporter};
use std::process::ExitCode;
use tokio::{sync::mpsc, task::JoinHandle};

/// Prints progress lines as they arrive. Finishes once the reporter is dropped.
fn spawn_printer(human: bool, mut rx: mpsc::UnboundedReceiver<ProgressEvent>) -> JoinHandle<()> {
	tokio::spawn(async move {
		while let Some(event) = rx.recv().await {
			if human {
				println!("{event}");
			}
		}
	})
}

fn print_run(report: &RunReport) {
	for advisory in &report.advisories {
		println!(
			"warning [{}] {}: {}",
			advisory.kind, advisory.step, advisory.message
		);
	}
	println!("{}", report.message);
}

pub async fn apply(ctx: &Context, args: ApplyArgs) -> Result<ExitCode> {
	let volume = args.volume.to_volume();
	let options = args.options(&ctx.config.defaults);

	let (reporter, rx) = StatusReporter::channel();
	let printer = spawn_printer(ctx.is_human(), rx);
	let report = ctx
		.pipeline
		.apply(&volume, &args.image, args.label.as_deref(), &options, reporter)
		.await;
	printer.await?;

	print_output!(ctx, &report, print_run);
	Ok(exit_code(report.ok))
}

pub async fn remove(ctx: &Context, args: VolumeArgs) -> Result<ExitCode> {
	let volume = args.to_volume();

	let (reporter, rx) = StatusReporter::channel();
	let printer = spawn_printer(ctx.is_human(), rx);
	let report = ctx.pipeline.remove(&volume, reporter).await;
	printer.await?;

	print_output!(ctx, &report, print_run);
	Ok(exit_code(report.ok))
}

pub async fn diagnose(ctx: &Context, args: VolumeArgs) -> Result<ExitCode> {
	let report = ctx.pipeline.diagnose(&args.to_volume()).await;

	print_output!(ctx, &report, |report: &DiagnoseReport| print!("{report}"));
	Ok(ExitCode::SUCCESS)
}

pub async fn eject(ctx: &Context, args: EjectArgs) -> Result<ExitCode> {
	let report = ctx.pipeline.eject(&args.to_volume()).await;

	print_output!(ctx, &report, |report: &EjectReport| {
		for attempt in &report.attempts {
			let outcome = if attempt.ok { "ok" } else { "failed" };
			println!("  {} {outcome}: {}", attempt.method, attempt.detail);
		}
		println!("{}", report.detail);
	});
	Ok(exit_code(report.ok))
}
