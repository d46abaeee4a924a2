use di_core::{IconConfig, IconPipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
	Human,
	Json,
}

/// Everything a command needs, built once in `main`.
pub struct Context {
	pub pipeline: IconPipeline,
	pub config: IconConfig,
	pub format: OutputFormat,
}

impl Context {
	pub const fn new(pipeline: IconPipeline, config: IconConfig, format: OutputFormat) -> Self {
		Self {
			pipeline,
			config,
			format,
		}
	}

	pub fn is_human(&self) -> bool {
		self.format == OutputFormat::Human
	}
}
