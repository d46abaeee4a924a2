use crate::{
	consts::{BITMAP_SIZES, ICNS_TYPES, ICO_SIZES, MAXIMUM_FILE_SIZE, PRIMARY_SIZE},
	error::{Error, Result},
	icns, ico,
};
use image::{
	codecs::png::PngEncoder, imageops::FilterType, DynamicImage, ExtendedColorType,
	ImageEncoder, RgbaImage,
};
use std::{
	collections::BTreeMap,
	fs,
	io::Read,
	path::{Path, PathBuf},
};
use tracing::debug;

/// One square PNG-encoded rendition of the source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
	pub size: u32,
	pub png: Vec<u8>,
}

/// Everything a run writes to a volume, rendered up front.
#[derive(Debug, Clone)]
pub struct IconAssetBundle {
	/// Ordered largest first, one entry per [`BITMAP_SIZES`] element.
	pub bitmaps: Vec<Bitmap>,
	pub ico: Vec<u8>,
	pub icns: Vec<u8>,
	/// Where the primary asset ended up once persisted; `None` until then.
	pub primary_asset: Option<PathBuf>,
}

impl IconAssetBundle {
	#[must_use]
	pub fn bitmap(&self, size: u32) -> Option<&Bitmap> {
		self.bitmaps.iter().find(|bitmap| bitmap.size == size)
	}

	/// The rendition shell descriptors reference directly.
	pub fn primary(&self) -> Result<&Bitmap> {
		self.bitmap(PRIMARY_SIZE)
			.ok_or(Error::MissingSize(PRIMARY_SIZE))
	}

	pub fn largest(&self) -> Result<&Bitmap> {
		self.bitmaps.first().ok_or(Error::Empty)
	}

	pub fn set_primary_asset(&mut self, path: impl Into<PathBuf>) {
		self.primary_asset = Some(path.into());
	}
}

#[derive(Debug, Clone)]
pub struct IconAssetBuilder {
	maximum_size: u64,
	filter: FilterType,
}

impl Default for IconAssetBuilder {
	fn default() -> Self {
		Self {
			maximum_size: MAXIMUM_FILE_SIZE,
			filter: FilterType::Lanczos3,
		}
	}
}

impl IconAssetBuilder {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub const fn with_maximum_size(mut self, bytes: u64) -> Self {
		self.maximum_size = bytes;
		self
	}

	#[must_use]
	pub const fn with_filter(mut self, filter: FilterType) -> Self {
		self.filter = filter;
		self
	}

	pub fn build_from_path(&self, path: impl AsRef<Path>) -> Result<IconAssetBundle> {
		let data = self.read_source(path.as_ref())?; // this also makes sure the file isn't above the maximum size
		self.build_from_memory(&data)
	}

	pub fn build_from_memory(&self, data: &[u8]) -> Result<IconAssetBundle> {
		if data.len() as u64 > self.maximum_size {
			return Err(Error::TooLarge {
				limit: self.maximum_size,
			});
		}

		self.build(&image::load_from_memory(data)?)
	}

	pub fn build(&self, source: &DynamicImage) -> Result<IconAssetBundle> {
		if source.width() == 0 || source.height() == 0 {
			return Err(Error::Empty);
		}

		let rendered = BITMAP_SIZES
			.iter()
			.map(|&size| (size, self.render(source, size)))
			.collect::<BTreeMap<_, _>>();

		let bitmaps = BITMAP_SIZES
			.iter()
			.map(|&size| {
				let img = rendered.get(&size).ok_or(Error::MissingSize(size))?;
				Ok(Bitmap {
					size,
					png: encode_png(img)?,
				})
			})
			.collect::<Result<Vec<_>>>()?;

		let ico = ico::encode(
			ICO_SIZES
				.iter()
				.map(|size| rendered.get(size).ok_or(Error::MissingSize(*size)))
				.collect::<Result<Vec<_>>>()?,
		)?;

		let icns = icns::encode(
			ICNS_TYPES
				.iter()
				.map(|(size, os_type)| {
					bitmaps
						.iter()
						.find(|bitmap| bitmap.size == *size)
						.map(|bitmap| (*os_type, bitmap.png.as_slice()))
						.ok_or(Error::MissingSize(*size))
				})
				.collect::<Result<Vec<_>>>()?,
		)?;

		debug!(
			source_width = source.width(),
			source_height = source.height(),
			ico_bytes = ico.len(),
			icns_bytes = icns.len(),
			"Rendered icon asset bundle"
		);

		Ok(IconAssetBundle {
			bitmaps,
			ico,
			icns,
			primary_asset: None,
		})
	}

	fn read_source(&self, path: &Path) -> Result<Vec<u8>> {
		let mut file = fs::File::open(path)?;
		if file.metadata()?.len() > self.maximum_size {
			Err(Error::TooLarge {
				limit: self.maximum_size,
			})
		} else {
			let mut data = vec![];
			file.read_to_end(&mut data)?;
			Ok(data)
		}
	}

	/// Center-crops to a square and scales to `size`.
	fn render(&self, source: &DynamicImage, size: u32) -> RgbaImage {
		source.resize_to_fill(size, size, self.filter).into_rgba8()
	}
}

fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
	let mut out = Vec::new();
	PngEncoder::new(&mut out).write_image(
		img.as_raw(),
		img.width(),
		img.height(),
		ExtendedColorType::Rgba8,
	)?;
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;
	use image::{ImageFormat, Rgba};
	use pretty_assertions::assert_eq;
	use std::io::Cursor;

	fn sample_png(width: u32, height: u32) -> Vec<u8> {
		let img = RgbaImage::from_fn(width, height, |x, y| {
			Rgba([(x * 4 % 256) as u8, (y * 4 % 256) as u8, 128, 255])
		});
		let mut out = Cursor::new(Vec::new());
		DynamicImage::ImageRgba8(img)
			.write_to(&mut out, ImageFormat::Png)
			.unwrap();
		out.into_inner()
	}

	#[test]
	fn bundle_holds_every_size_largest_first() {
		let bundle = IconAssetBuilder::new()
			.with_filter(FilterType::Triangle)
			.build_from_memory(&sample_png(64, 64))
			.unwrap();

		let sizes = bundle.bitmaps.iter().map(|b| b.size).collect::<Vec<_>>();
		assert_eq!(sizes, BITMAP_SIZES.to_vec());

		for bitmap in &bundle.bitmaps {
			let decoded = image::load_from_memory(&bitmap.png).unwrap();
			assert_eq!((decoded.width(), decoded.height()), (bitmap.size, bitmap.size));
		}

		assert_eq!(bundle.primary().unwrap().size, PRIMARY_SIZE);
		assert_eq!(bundle.largest().unwrap().size, 512);
		assert!(bundle.primary_asset.is_none());
	}

	#[test]
	fn ico_container_lists_all_frames() {
		let bundle = IconAssetBuilder::new()
			.with_filter(FilterType::Triangle)
			.build_from_memory(&sample_png(64, 64))
			.unwrap();

		// ICONDIR: reserved(0), type(1 = icon), count
		assert_eq!(&bundle.ico[..4], &[0, 0, 1, 0]);
		assert_eq!(
			u16::from_le_bytes([bundle.ico[4], bundle.ico[5]]) as usize,
			ICO_SIZES.len()
		);

		let decoded = image::load_from_memory_with_format(&bundle.ico, ImageFormat::Ico).unwrap();
		assert_eq!(decoded.width(), 256);
	}

	#[test]
	fn icns_container_is_self_describing() {
		let bundle = IconAssetBuilder::new()
			.with_filter(FilterType::Triangle)
			.build_from_memory(&sample_png(64, 64))
			.unwrap();

		assert_eq!(&bundle.icns[..4], b"icns");
		let total = u32::from_be_bytes([
			bundle.icns[4],
			bundle.icns[5],
			bundle.icns[6],
			bundle.icns[7],
		]);
		assert_eq!(total as usize, bundle.icns.len());
		assert_eq!(&bundle.icns[8..12], b"icp4");
	}

	#[test]
	fn non_square_sources_are_cropped_to_fill() {
		let bundle = IconAssetBuilder::new()
			.with_filter(FilterType::Triangle)
			.build_from_memory(&sample_png(80, 40))
			.unwrap();

		let decoded = image::load_from_memory(&bundle.bitmap(48).unwrap().png).unwrap();
		assert_eq!((decoded.width(), decoded.height()), (48, 48));
	}

	#[test]
	fn corrupt_data_is_rejected() {
		let err = IconAssetBuilder::new()
			.build_from_memory(b"definitely not an image")
			.unwrap_err();
		assert!(matches!(err, Error::Image(_)));
	}

	#[test]
	fn oversized_sources_are_rejected_before_decoding() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("big.png");
		fs::write(&path, sample_png(16, 16)).unwrap();

		let err = IconAssetBuilder::new()
			.with_maximum_size(8)
			.build_from_path(&path)
			.unwrap_err();
		assert!(matches!(err, Error::TooLarge { limit: 8 }));
	}

	#[test]
	fn missing_source_is_an_io_error() {
		let err = IconAssetBuilder::new()
			.build_from_path("/definitely/not/here.png")
			.unwrap_err();
		assert!(matches!(err, Error::Io(_)));
	}
}
