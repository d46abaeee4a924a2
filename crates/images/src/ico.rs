use crate::error::Result;
use image::{
	codecs::ico::{IcoEncoder, IcoFrame},
	ExtendedColorType, ImageResult, RgbaImage,
};

/// Packs the given square frames into one `.ico` container, each frame stored as PNG.
pub fn encode<'a>(frames: impl IntoIterator<Item = &'a RgbaImage>) -> Result<Vec<u8>> {
	let frames = frames
		.into_iter()
		.map(|img| {
			IcoFrame::as_png(
				img.as_raw(),
				img.width(),
				img.height(),
				ExtendedColorType::Rgba8,
			)
		})
		.collect::<ImageResult<Vec<_>>>()?;

	let mut out = Vec::new();
	IcoEncoder::new(&mut out).encode_images(&frames)?;

	Ok(out)
}
