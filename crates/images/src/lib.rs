#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	clippy::expect_used,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::dbg_macro
)]
#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

//! Turns a single source picture into every icon container the desktop shells read.
//!
//! Rendering is a pure function of the input bytes: nothing here touches a volume.

mod builder;
pub mod consts;
mod error;
mod icns;
mod ico;

pub use builder::{Bitmap, IconAssetBuilder, IconAssetBundle};
pub use error::{Error, Result};
pub use image::DynamicImage;
