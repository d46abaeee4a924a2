//! Minimal Apple Icon Image writer.
//!
//! Layout: the magic `icns`, a big-endian `u32` total length, then elements of
//! `(OSType, u32 length including its 8 byte header, payload)`. Every element
//! written here carries a PNG payload, which Finder accepts for all the types
//! in [`crate::consts::ICNS_TYPES`].

use crate::error::Result;

const MAGIC: &[u8; 4] = b"icns";
const HEADER_LEN: usize = 8;

pub fn encode<'a>(elements: impl IntoIterator<Item = ([u8; 4], &'a [u8])>) -> Result<Vec<u8>> {
	let mut body = Vec::new();

	for (os_type, payload) in elements {
		let len = u32::try_from(payload.len() + HEADER_LEN)?;
		body.extend_from_slice(&os_type);
		body.extend_from_slice(&len.to_be_bytes());
		body.extend_from_slice(payload);
	}

	let total = u32::try_from(body.len() + HEADER_LEN)?;
	let mut out = Vec::with_capacity(body.len() + HEADER_LEN);
	out.extend_from_slice(MAGIC);
	out.extend_from_slice(&total.to_be_bytes());
	out.extend(body);

	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn read_u32(bytes: &[u8]) -> u32 {
		u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
	}

	#[test]
	fn element_lengths_include_their_header() {
		let out = encode([(*b"icp4", &[1_u8, 2, 3][..]), (*b"ic07", &[9_u8][..])]).unwrap();

		assert_eq!(&out[..4], b"icns");
		assert_eq!(read_u32(&out[4..8]) as usize, out.len());

		assert_eq!(&out[8..12], b"icp4");
		assert_eq!(read_u32(&out[12..16]), 11);
		assert_eq!(&out[16..19], &[1, 2, 3]);

		assert_eq!(&out[19..23], b"ic07");
		assert_eq!(read_u32(&out[23..27]), 9);
	}

	#[test]
	fn empty_container_is_just_the_header() {
		let out = encode(std::iter::empty()).unwrap();
		assert_eq!(out, b"icns\0\0\0\x08");
	}
}
