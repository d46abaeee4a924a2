use super::lock;
use crate::sys::HostTables;

use async_trait::async_trait;
use std::{
	collections::{HashMap, VecDeque},
	path::{Path, PathBuf},
	sync::Mutex,
};

/// [`HostTables`] answering from scripted process states and a fixed mount table.
///
/// Unscripted processes are not running. Every process check is recorded.
#[derive(Debug, Default)]
pub struct FakeHostTables {
	state: Mutex<Tables>,
}

#[derive(Debug, Default)]
struct Tables {
	processes: HashMap<String, VecDeque<bool>>,
	mounts: Vec<(PathBuf, String)>,
	unreadable: bool,
	checks: Vec<String>,
}

impl FakeHostTables {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_running(&self, process: &str, running: bool) {
		self.running_sequence(process, vec![running]);
	}

	/// Answers successive checks of `process` in order; the last answer repeats.
	pub fn running_sequence(&self, process: &str, states: Vec<bool>) {
		lock(&self.state)
			.processes
			.insert(process.to_string(), states.into());
	}

	pub fn mount(&self, root: impl Into<PathBuf>, device: &str) {
		lock(&self.state)
			.mounts
			.push((root.into(), device.to_string()));
	}

	/// Makes every process check fail as if the table could not be read.
	pub fn unreadable(&self) {
		lock(&self.state).unreadable = true;
	}

	/// Process names checked, in order.
	#[must_use]
	pub fn checks(&self) -> Vec<String> {
		lock(&self.state).checks.clone()
	}
}

#[async_trait]
impl HostTables for FakeHostTables {
	async fn is_running(&self, process: &str) -> Option<bool> {
		let mut tables = lock(&self.state);
		tables.checks.push(process.to_string());

		if tables.unreadable {
			return None;
		}

		let Some(queue) = tables.processes.get_mut(process) else {
			return Some(false);
		};
		let next = if queue.len() > 1 {
			queue.pop_front()
		} else {
			queue.front().copied()
		};
		Some(next.unwrap_or(false))
	}

	async fn device_for_mount(&self, root: &Path) -> Option<String> {
		lock(&self.state)
			.mounts
			.iter()
			.rev()
			.find(|(mount_point, _)| mount_point == root)
			.map(|(_, device)| device.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[tokio::test]
	async fn process_sequences_repeat_their_last_answer() {
		let system = FakeHostTables::new();
		system.running_sequence("Finder", vec![true, false]);

		let states = [
			system.is_running("Finder").await,
			system.is_running("Finder").await,
			system.is_running("Finder").await,
			system.is_running("nautilus").await,
		];
		assert_eq!(states, [Some(true), Some(false), Some(false), Some(false)]);
		assert_eq!(system.checks().len(), 4);

		system.unreadable();
		assert_eq!(system.is_running("Finder").await, None);
	}
}
