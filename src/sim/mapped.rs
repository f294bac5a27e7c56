use std::fs;
use std::io::{
	self,
	Write,
};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::ptr;

use libc::{
	MAP_FAILED,
	MAP_SHARED,
	MS_SYNC,
	PROT_READ,
	PROT_WRITE,
	c_void,
	mmap,
	msync,
	munmap,
};

use super::Storage;

/// Image file mapped into memory (shared, writable).
#[derive(Debug)]
pub struct Mapped {
	ptr: ptr::NonNull<u8>, // u8 instead of void for easier offset operations
	len: usize,
	_file: fs::File,
}

impl Drop for Mapped {
	fn drop(&mut self) {
		unsafe {
			let res = munmap(
				self.ptr.as_ptr() as *mut c_void,
				self.len,
			);
			if 0 != res {
				panic!("munmap failed: {}", io::Error::last_os_error());
			}
		}
	}
}

impl Mapped {
	pub fn len(&self) -> usize {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		0 == self.len
	}

	pub fn read_byte(&self, offset: usize) -> u8 {
		assert!(offset < self.len);
		unsafe { ptr::read(self.ptr.as_ptr().add(offset)) }
	}

	pub fn write_byte(&mut self, offset: usize, data: u8) {
		assert!(offset < self.len);
		unsafe { ptr::write(self.ptr.as_ptr().add(offset), data) }
	}

	pub fn fill(&mut self, offset: usize, len: usize, value: u8) {
		assert!(offset <= self.len && len <= self.len - offset);
		unsafe { ptr::write_bytes(self.ptr.as_ptr().add(offset), value, len) }
	}

	/// write changes back to the image file
	pub fn sync(&self) -> io::Result<()> {
		let res = unsafe {
			msync(self.ptr.as_ptr() as *mut c_void, self.len, MS_SYNC)
		};
		if 0 != res {
			return Err(io::Error::last_os_error());
		}
		Ok(())
	}
}

impl Storage for Mapped {
	fn len(&self) -> usize {
		Mapped::len(self)
	}

	fn read_byte(&self, offset: usize) -> u8 {
		Mapped::read_byte(self, offset)
	}

	fn write_byte(&mut self, offset: usize, data: u8) {
		Mapped::write_byte(self, offset, data)
	}

	fn fill(&mut self, offset: usize, len: usize, value: u8) {
		Mapped::fill(self, offset, len, value)
	}
}

/// Maps the image file at `path`, which must have exactly `len` bytes; a
/// missing file is created in erased state (all bytes 0xff).
pub fn open_image(path: &Path, len: usize) -> crate::AResult<Mapped> {
	with_context!(("couldn't open flash image {}", path.display()), {
		ensure!(len > 0, "empty image");

		let file = if path.exists() {
			fs::OpenOptions::new().read(true).write(true).open(path)?
		} else {
			info!("creating erased image {} (0x{:x} bytes)", path.display(), len);
			let mut file = fs::OpenOptions::new().read(true).write(true).create_new(true).open(path)?;
			file.write_all(&vec![0xffu8; len])?;
			file.sync_all()?;
			file
		};

		let size = file.metadata()?.len();
		ensure!(size == len as u64, "image has 0x{:x} bytes, expected 0x{:x}", size, len);

		let area = unsafe {
			mmap(
				ptr::null_mut(),
				len,
				PROT_READ | PROT_WRITE,
				MAP_SHARED,
				file.as_raw_fd(),
				0,
			)
		};

		if area == MAP_FAILED {
			return Err(io::Error::last_os_error().into());
		}
		match ptr::NonNull::new(area as *mut u8) {
			None => bail!("mmap shouldn't return NULL ever"),
			Some(area) => Ok(Mapped {
				ptr: area,
				len,
				_file: file,
			}),
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	use std::env;
	use std::process;

	#[test]
	fn image_roundtrip() {
		let path = env::temp_dir().join(format!("sst25vf-span-mapped-{}.bin", process::id()));
		let _ = fs::remove_file(&path);

		{
			let mut image = open_image(&path, 0x1000).unwrap();
			assert_eq!(image.len(), 0x1000);
			assert_eq!(image.read_byte(0x0fff), 0xff);
			image.write_byte(0x10, 0x42);
			image.fill(0x20, 4, 0x00);
			image.sync().unwrap();
		}

		let content = fs::read(&path).unwrap();
		assert_eq!(content.len(), 0x1000);
		assert_eq!(content[0x10], 0x42);
		assert_eq!(&content[0x20..0x25], &[0, 0, 0, 0, 0xff]);

		// size mismatch
		assert!(open_image(&path, 0x2000).is_err());

		fs::remove_file(&path).unwrap();
	}
}
