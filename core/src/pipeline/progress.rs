//! Fire-and-forget progress stream for a running pipeline.

use super::Step;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
	Started,
	Detail,
	Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
	/// Strictly increasing across every event of one run, starting at 1.
	pub sequence: u64,
	pub step: Step,
	/// Position of `step` in the run's plan, starting at 1.
	pub number: usize,
	pub total: usize,
	pub kind: ProgressKind,
	pub at: DateTime<Utc>,
	pub message: String,
}

impl fmt::Display for ProgressEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let marker = match self.kind {
			ProgressKind::Started => "",
			ProgressKind::Detail => "  ",
			ProgressKind::Warning => "  warning: ",
		};
		write!(
			f,
			"[{}/{}] {} {marker}{}",
			self.number,
			self.total,
			self.at.format("%H:%M:%S"),
			self.message
		)
	}
}

/// Sends [`ProgressEvent`]s to whoever is listening. Nobody listening is fine.
#[derive(Debug, Default)]
pub struct StatusReporter {
	tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
	sequence: u64,
}

impl StatusReporter {
	#[must_use]
	pub const fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
		Self {
			tx: Some(tx),
			sequence: 0,
		}
	}

	#[must_use]
	pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(Self::new(tx), rx)
	}

	/// Reports nowhere; progress still reaches the logs.
	#[must_use]
	pub fn silent() -> Self {
		Self::default()
	}

	pub(crate) fn emit(
		&mut self,
		step: Step,
		number: usize,
		total: usize,
		kind: ProgressKind,
		message: impl Into<String>,
	) {
		self.sequence += 1;
		let event = ProgressEvent {
			sequence: self.sequence,
			step,
			number,
			total,
			kind,
			at: Utc::now(),
			message: message.into(),
		};

		match kind {
			ProgressKind::Warning => warn!(%step, number, message = %event.message, "Pipeline warning"),
			ProgressKind::Started | ProgressKind::Detail => {
				info!(%step, number, message = %event.message, "Pipeline progress");
			}
		}

		if let Some(tx) = &self.tx {
			if tx.send(event).is_err() {
				// Receiver went away; keep running without it.
				self.tx = None;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn dropped_receivers_never_fail_the_sender() {
		let (mut reporter, rx) = StatusReporter::channel();
		drop(rx);

		reporter.emit(Step::Init, 1, 2, ProgressKind::Started, "validating");
		reporter.emit(Step::StopShell, 2, 2, ProgressKind::Started, "stopping");
		assert!(reporter.tx.is_none());
		assert_eq!(reporter.sequence, 2);
	}

	#[tokio::test]
	async fn sequence_numbers_increase() {
		let (mut reporter, mut rx) = StatusReporter::channel();
		reporter.emit(Step::Init, 1, 1, ProgressKind::Started, "a");
		reporter.emit(Step::Init, 1, 1, ProgressKind::Detail, "b");
		drop(reporter);

		let mut sequences = Vec::new();
		while let Some(event) = rx.recv().await {
			sequences.push(event.sequence);
		}
		assert_eq!(sequences, vec![1, 2]);
	}
}
