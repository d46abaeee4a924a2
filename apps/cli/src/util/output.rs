use anyhow::Result;
use serde::Serialize;
use std::process::ExitCode;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

/// Non-zero whenever the run did not succeed.
pub fn exit_code(ok: bool) -> ExitCode {
	if ok {
		ExitCode::SUCCESS
	} else {
		ExitCode::FAILURE
	}
}
