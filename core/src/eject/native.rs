//! Lock, dismount and eject through volume IOCTLs.

use super::{EjectError, EjectMethod};
use crate::volume::Volume;

use async_trait::async_trait;
use std::{io, mem, ptr};
use tracing::debug;
use windows_sys::Win32::{
	Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE},
	Storage::FileSystem::{CreateFileW, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING},
	System::{
		Ioctl::{
			FSCTL_DISMOUNT_VOLUME, FSCTL_LOCK_VOLUME, IOCTL_STORAGE_EJECT_MEDIA,
			IOCTL_STORAGE_MEDIA_REMOVAL, PREVENT_MEDIA_REMOVAL,
		},
		IO::DeviceIoControl,
	},
};

const GENERIC_READ_WRITE: u32 = 0x8000_0000 | 0x4000_0000;

#[derive(Debug, Default, Clone, Copy)]
pub struct IoctlEject;

struct VolumeHandle(HANDLE);

impl VolumeHandle {
	fn open(letter: char) -> io::Result<Self> {
		let device = format!(r"\\.\{letter}:")
			.encode_utf16()
			.chain(std::iter::once(0))
			.collect::<Vec<u16>>();

		// SAFETY: `device` is a NUL terminated UTF-16 string that outlives the call
		let handle = unsafe {
			CreateFileW(
				device.as_ptr(),
				GENERIC_READ_WRITE,
				FILE_SHARE_READ | FILE_SHARE_WRITE,
				ptr::null(),
				OPEN_EXISTING,
				0,
				0,
			)
		};

		if handle == INVALID_HANDLE_VALUE {
			Err(io::Error::last_os_error())
		} else {
			Ok(Self(handle))
		}
	}

	fn control(&self, code: u32, input: Option<&PREVENT_MEDIA_REMOVAL>) -> io::Result<()> {
		let mut returned = 0u32;
		let (input_ptr, input_len) = input.map_or((ptr::null(), 0), |input| {
			(
				ptr::from_ref(input).cast::<std::ffi::c_void>(),
				mem::size_of::<PREVENT_MEDIA_REMOVAL>() as u32,
			)
		});

		// SAFETY: the handle is open for the lifetime of `self` and the input buffer is borrowed
		let ok = unsafe {
			DeviceIoControl(
				self.0,
				code,
				input_ptr,
				input_len,
				ptr::null_mut(),
				0,
				&mut returned,
				ptr::null_mut(),
			)
		};

		if ok == 0 {
			Err(io::Error::last_os_error())
		} else {
			Ok(())
		}
	}
}

impl Drop for VolumeHandle {
	fn drop(&mut self) {
		// SAFETY: the handle came from a successful CreateFileW and is closed exactly once
		unsafe {
			CloseHandle(self.0);
		}
	}
}

fn eject_blocking(letter: char) -> Result<String, EjectError> {
	let volume = VolumeHandle::open(letter)
		.map_err(|e| EjectError::Failed(format!("opening {letter}: failed: {e}")))?;

	// No lock means open handles; dismounting now would lose their writes.
	volume
		.control(FSCTL_LOCK_VOLUME, None)
		.map_err(|e| EjectError::Busy(format!("{letter}: could not be locked: {e}")))?;

	volume
		.control(FSCTL_DISMOUNT_VOLUME, None)
		.map_err(|e| EjectError::Failed(format!("dismounting {letter}: failed: {e}")))?;

	volume
		.control(
			IOCTL_STORAGE_MEDIA_REMOVAL,
			Some(&PREVENT_MEDIA_REMOVAL {
				PreventMediaRemoval: 0,
			}),
		)
		.map_err(|e| EjectError::Failed(format!("allowing removal of {letter}: failed: {e}")))?;

	volume
		.control(IOCTL_STORAGE_EJECT_MEDIA, None)
		.map_err(|e| EjectError::Failed(format!("ejecting {letter}: failed: {e}")))?;

	debug!(%letter, "Volume locked, dismounted and ejected");

	Ok(format!("{letter}: dismounted and ejected"))
}

#[async_trait]
impl EjectMethod for IoctlEject {
	fn name(&self) -> &str {
		"volume ioctl"
	}

	async fn eject(&self, volume: &Volume) -> Result<String, EjectError> {
		let letter = volume
			.drive_letter
			.ok_or_else(|| EjectError::Unsupported("volume has no drive letter".into()))?;

		tokio::task::spawn_blocking(move || eject_blocking(letter))
			.await
			.map_err(|e| EjectError::Failed(format!("eject task failed: {e}")))?
	}
}
