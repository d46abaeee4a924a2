use std::num::TryFromIntError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("error while loading the image (via the `image` crate): {0}")]
	Image(#[from] image::ImageError),
	#[error("there was an i/o error: {0}")]
	Io(#[from] std::io::Error),
	#[error("the image provided is too large (over {limit} bytes)")]
	TooLarge { limit: u64 },
	#[error("the image provided has no pixels")]
	Empty,
	#[error("no {0}px bitmap was rendered")]
	MissingSize(u32),
	#[error("error while converting a container length")]
	TryFromInt(#[from] TryFromIntError),
}
