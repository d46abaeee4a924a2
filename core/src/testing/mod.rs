//! In-process stand-ins for every OS seam, so each platform's pipeline runs on any host.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use di_core::{command::CommandOutput, testing::{FakeCommandRunner, FakeHostTables}};
//!
//! let runner = Arc::new(FakeCommandRunner::new());
//! runner.respond("nautilus -q", CommandOutput::failure(1, ""));
//!
//! let system = Arc::new(FakeHostTables::new());
//! system.running_sequence("nautilus", vec![true, false]);
//! ```

mod fakes;
mod runner;
mod system;

pub use fakes::{CallCounter, InMemoryRegistry, RecordingNotifier, ScriptedEjectMethod};
pub use runner::FakeCommandRunner;
pub use system::FakeHostTables;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// A panicking test thread must not cascade into every other assertion.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
