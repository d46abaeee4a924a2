mod context;
mod domains;
mod util;

use crate::{
	context::{Context, OutputFormat},
	domains::volume::{self, ApplyArgs, EjectArgs, VolumeArgs},
};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use di_core::{IconConfig, IconPipeline, PlatformContext};
use std::{
	path::{Path, PathBuf},
	process::ExitCode,
};
use tracing::info;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
	filter::LevelFilter, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter,
	Layer, Registry,
};

/// Used until the config has been read.
const BOOTSTRAP_LOG_LEVEL: &str = "info";

type FilterHandle = reload::Handle<EnvFilter, Registry>;

#[derive(Parser, Debug)]
#[command(
	name = "drive-icon",
	version,
	about = "Apply, remove and inspect custom drive icons"
)]
struct Cli {
	/// Directory holding drive-icon.json and the logs
	#[arg(long, global = true)]
	data_dir: Option<PathBuf>,

	/// Output format
	#[arg(long, value_enum, default_value = "human", global = true)]
	format: OutputFormat,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Render an image and apply it as the volume's icon
	Apply(ApplyArgs),
	/// Remove every trace of a custom icon from the volume and the system
	Remove(VolumeArgs),
	/// Show what is currently in place, without changing anything
	Diagnose(VolumeArgs),
	/// Safely eject a removable volume
	Eject(EjectArgs),
}

/// Every workspace crate that logs gets the same level.
fn default_directives(level: &str) -> String {
	["drive_icon", "di_core", "di_images"]
		.map(|target| format!("{target}={level}"))
		.join(",")
}

fn env_filter(level: &str) -> EnvFilter {
	EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

/// Console gets warnings only so progress lines stay readable; the daily file gets everything.
/// The returned handle swaps in the configured level once the config is loaded.
fn init_tracing(data_dir: &Path) -> Result<(WorkerGuard, FilterHandle)> {
	let logs_dir = IconConfig::logs_dir_in(data_dir);
	std::fs::create_dir_all(&logs_dir)
		.with_context(|| format!("Failed to create logs directory {}", logs_dir.display()))?;

	let (file_writer, guard) =
		tracing_appender::non_blocking(rolling::daily(&logs_dir, "drive-icon.log"));
	let (filter, handle) = reload::Layer::new(env_filter(BOOTSTRAP_LOG_LEVEL));

	tracing_subscriber::registry()
		.with(filter)
		.with(
			fmt::layer()
				.with_target(false)
				.with_writer(std::io::stderr)
				.with_filter(LevelFilter::WARN),
		)
		.with(
			fmt::layer()
				.with_target(true)
				.with_thread_ids(true)
				.with_ansi(false)
				.with_writer(file_writer),
		)
		.try_init()?;

	Ok((guard, handle))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
	let cli = Cli::parse();

	let data_dir = match cli.data_dir {
		Some(data_dir) => data_dir,
		None => IconConfig::default_data_dir()?,
	};
	let (_guard, filter) = init_tracing(&data_dir)?;
	let config = IconConfig::load_or_create(&data_dir)?;
	filter
		.reload(env_filter(&config.log_level))
		.context("Failed to apply the configured log level")?;

	let platform = PlatformContext::detect(config.icon_store_dir.as_deref());
	info!(
		data_dir = %data_dir.display(),
		platform = %platform.platform,
		elevated = platform.elevated,
		"drive-icon starting"
	);

	let pipeline = IconPipeline::for_host(platform, config.timing.clone());
	let ctx = Context::new(pipeline, config, cli.format);

	match cli.command {
		Commands::Apply(args) => volume::apply(&ctx, args).await,
		Commands::Remove(args) => volume::remove(&ctx, args).await,
		Commands::Diagnose(args) => volume::diagnose(&ctx, args).await,
		Commands::Eject(args) => volume::eject(&ctx, args).await,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn image_rendering_logs_at_the_configured_level() {
		assert_eq!(
			default_directives("debug"),
			"drive_icon=debug,di_core=debug,di_images=debug"
		);
	}

	#[test]
	fn logs_dir_is_known_before_the_config_exists() {
		let data_dir = tempfile::tempdir().unwrap();

		assert_eq!(
			IconConfig::logs_dir_in(data_dir.path()),
			data_dir.path().join("logs")
		);
		assert!(!data_dir.path().join("drive-icon.json").exists());
	}
}
