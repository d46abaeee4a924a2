pub mod error;

pub use error::FileIOError;

/// Combines an iterator of `T` and an iterator of `Option<T>`,
/// removing any `None` values in the process
pub fn chain_optional_iter<T>(
	required: impl IntoIterator<Item = T>,
	optional: impl IntoIterator<Item = Option<T>>,
) -> Vec<T> {
	required
		.into_iter()
		.map(Some)
		.chain(optional)
		.flatten()
		.collect()
}

#[cfg(test)]
mod tests {
	use super::chain_optional_iter;

	#[test]
	fn optional_items_are_dropped_when_none() {
		let lines = chain_optional_iter(["[autorun]", "icon=x"], [None, Some("label=y")]);
		assert_eq!(lines, vec!["[autorun]", "icon=x", "label=y"]);
	}
}
