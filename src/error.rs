use failure::Fail;

use crate::sst25vf::StatusRegister;

/// Errors of the chip protocol and the spanned volume.
///
/// Parameter errors (`OutOfRange`, `BlockOutOfRange`) are reported before
/// any bus activity happens; the volume is unaffected by them.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Fail)]
pub enum Error {
	#[fail(display = "flash volume not initialized")]
	NotInitialized,

	#[fail(display = "invalid device count {} (supported: 1..={})", count, max)]
	InvalidDeviceCount { count: usize, max: usize },

	#[fail(display = "unsupported block size 0x{:x} (no matching erase command)", block_size)]
	UnsupportedBlockSize { block_size: u32 },

	#[fail(display = "device {}: unrecognized identity", device)]
	UnknownIdentity { device: u8 },

	#[fail(display = "device {}: unsupported capacity 0x{:x}", device, capacity)]
	UnsupportedCapacity { device: u8, capacity: u32 },

	#[fail(display = "device {}: capacity 0x{:x} is not a multiple of block size 0x{:x}", device, capacity, block_size)]
	CapacityNotBlockAligned { device: u8, capacity: u32, block_size: u32 },

	#[fail(display = "access at 0x{:08x} (+0x{:x} bytes) outside of volume (0x{:x} bytes)", address, length, size)]
	OutOfRange { address: u32, length: usize, size: u64 },

	#[fail(display = "block {} outside of volume ({} blocks)", block, block_count)]
	BlockOutOfRange { block: u32, block_count: u32 },

	#[fail(display = "device {}: timeout waiting for write cycle (status {})", device, status)]
	DeviceTimeout { device: u8, status: StatusRegister },
}

pub type FlashResult<T> = std::result::Result<T, Error>;
