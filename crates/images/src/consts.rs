/// Square bitmap resolutions rendered for every bundle, largest first.
pub const BITMAP_SIZES: [u32; 7] = [512, 256, 128, 64, 48, 32, 16];

/// Frames packed into the Windows `.ico` container.
pub const ICO_SIZES: [u32; 6] = [256, 128, 64, 48, 32, 16];

/// PNG-payload element types of the `.icns` container, keyed by edge length.
pub const ICNS_TYPES: [(u32, [u8; 4]); 6] = [
	(16, *b"icp4"),
	(32, *b"icp5"),
	(64, *b"icp6"),
	(128, *b"ic07"),
	(256, *b"ic08"),
	(512, *b"ic09"),
];

/// Edge length of the bitmap shell descriptors point at.
pub const PRIMARY_SIZE: u32 = 256;

/// The maximum file size that a source image can be in order to be turned into icons.
///
/// This value is in MiB.
pub(crate) const MAXIMUM_FILE_SIZE: u64 = MIB * 20;

/// The size of 1MiB in bytes
const MIB: u64 = 1_048_576;
