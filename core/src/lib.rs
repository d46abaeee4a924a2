#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	clippy::expect_used,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::dbg_macro
)]
#![allow(
	clippy::missing_errors_doc,
	clippy::module_name_repetitions,
	clippy::cast_possible_truncation
)]

//! Drive and folder icon customization for Windows, Linux and macOS.
//!
//! [`IconPipeline`] is the entry point: it renders an image into every icon
//! container the shells read, persists it through the host's own mechanism,
//! writes cross-platform descriptors on the volume, refreshes the shell and
//! optionally ejects the volume afterwards.

pub mod command;
pub mod config;
pub mod context;
pub mod eject;
pub mod error;
pub mod pipeline;
pub mod shell;
pub mod store;
pub mod sys;
pub mod testing;
pub mod volume;

pub use command::{CommandLine, CommandOutput, CommandRunner, SystemCommandRunner};
pub use config::{ConfigError, IconConfig, ShellTiming};
pub use context::{DesktopEnvironment, Platform, PlatformContext};
pub use eject::{EjectAttempt, EjectController, EjectMethod, EjectReport};
pub use error::{Advisory, CommandError, FailureKind, PipelineError};
pub use pipeline::{
	ApplyOptions, DiagnoseReport, IconPipeline, ProgressEvent, ProgressKind, RunReport,
	StatusReporter, Step,
};
pub use shell::{ShellCacheController, ShellState};
pub use store::PersistentIconStore;
pub use sys::{HostTables, SysinfoTables};
pub use volume::{Volume, VolumeClassifier, VolumeKind};
