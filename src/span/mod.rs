//! One linear volume spanning several flash chips.
//!
//! Devices may have different capacities but share one block size. Bytes
//! and blocks are numbered consecutively: device 0 first, then device 1,
//! and so on. Reads and writes crossing a device boundary are split into
//! one chip operation per device.
//!
//! Erasing before writing is the caller's job; so is recovering from a
//! write that failed on a later device of a split (the earlier devices
//! keep what was written to them).

use crate::bus::Bus;
use crate::error::Error;
use crate::sst25vf::consts::MAX_ADDRESS;
use crate::sst25vf::{
	BusyTimeout,
	Chip,
	DeviceId,
	EraseOpcode,
	IdentityTable,
};

mod segments;

pub use self::segments::Segment;

use self::segments::{
	resolve,
	split,
};

/// one chip enable line per device
pub const MAX_DEVICES: usize = 8;

/// Runtime configuration of a volume.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SpanConfig {
	/// erase block size in bytes; must match an erase command
	pub block_size: u32,
	pub device_count: usize,
	pub identities: IdentityTable,
	pub busy_timeout: BusyTimeout,
}

impl SpanConfig {
	pub fn new(block_size: u32, device_count: usize) -> Self {
		SpanConfig {
			block_size,
			device_count,
			identities: IdentityTable::default(),
			busy_timeout: BusyTimeout::default(),
		}
	}

	pub fn with_identities(mut self, identities: IdentityTable) -> Self {
		self.identities = identities;
		self
	}

	pub fn with_busy_timeout(mut self, busy_timeout: BusyTimeout) -> Self {
		self.busy_timeout = busy_timeout;
		self
	}

	/// checks everything that doesn't need the bus
	pub fn erase_opcode(&self) -> crate::FlashResult<EraseOpcode> {
		if 0 == self.device_count || self.device_count > MAX_DEVICES {
			return Err(Error::InvalidDeviceCount { count: self.device_count, max: MAX_DEVICES });
		}
		EraseOpcode::for_block_size(self.block_size)
			.ok_or(Error::UnsupportedBlockSize { block_size: self.block_size })
	}
}

/// Layout of an initialized volume.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct VolumeDescriptor {
	device_ids: Vec<DeviceId>,
	device_blocks: Vec<u32>,
	block_count: u32,
}

impl VolumeDescriptor {
	/// blocks per device, indexed by device
	pub fn device_blocks(&self) -> &[u32] {
		&self.device_blocks
	}

	pub fn device_ids(&self) -> &[DeviceId] {
		&self.device_ids
	}

	/// sum of `device_blocks`
	pub fn block_count(&self) -> u32 {
		self.block_count
	}
}

/// Device and byte offset within it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Location {
	pub device: u8,
	pub offset: u32,
}

struct Ready {
	descriptor: VolumeDescriptor,
	erase: EraseOpcode,
}

pub struct FlashSpan<B: Bus> {
	bus: B,
	config: SpanConfig,
	ready: Option<Ready>,
}

impl<B: Bus> FlashSpan<B> {
	/// uninitialized; call `init` before anything else
	pub fn new(bus: B, config: SpanConfig) -> Self {
		FlashSpan {
			bus,
			config,
			ready: None,
		}
	}

	pub fn config(&self) -> &SpanConfig {
		&self.config
	}

	pub fn bus(&self) -> &B {
		&self.bus
	}

	pub fn bus_mut(&mut self) -> &mut B {
		&mut self.bus
	}

	pub fn into_bus(self) -> B {
		self.bus
	}

	pub fn is_ready(&self) -> bool {
		self.ready.is_some()
	}

	fn ready(&self) -> crate::FlashResult<&Ready> {
		self.ready.as_ref().ok_or(Error::NotInitialized)
	}

	fn chip(&mut self, device: u8) -> Chip<B> {
		Chip::select(&mut self.bus, device).with_timeout(self.config.busy_timeout)
	}

	/// Identifies every configured device; fails unless all of them are
	/// known. A failed init leaves the volume uninitialized.
	pub fn init(&mut self) -> crate::FlashResult<VolumeDescriptor> {
		self.ready = None;
		let erase = self.config.erase_opcode()?;
		let block_size = self.config.block_size;

		let mut device_ids = Vec::with_capacity(self.config.device_count);
		let mut device_blocks = Vec::with_capacity(self.config.device_count);
		let mut block_count = 0u32;
		let identities = self.config.identities.clone();
		for device in 0..self.config.device_count as u8 {
			let id = self.chip(device).identify(&identities);
			let capacity = match identities.capacity(id) {
				Some(c) => c,
				None => return Err(Error::UnknownIdentity { device }),
			};
			if 0 == capacity || capacity > MAX_ADDRESS + 1 {
				return Err(Error::UnsupportedCapacity { device, capacity });
			}
			if 0 != capacity % block_size {
				return Err(Error::CapacityNotBlockAligned { device, capacity, block_size });
			}
			let blocks = capacity / block_size;
			info!("device {}: {:?}, {} blocks of 0x{:x} bytes", device, id, blocks, block_size);
			device_ids.push(id);
			device_blocks.push(blocks);
			block_count += blocks;
		}

		let descriptor = VolumeDescriptor {
			device_ids,
			device_blocks,
			block_count,
		};
		info!("flash volume: {} blocks, 0x{:x} bytes", block_count, block_count as u64 * block_size as u64);
		self.ready = Some(Ready {
			descriptor: descriptor.clone(),
			erase,
		});
		Ok(descriptor)
	}

	pub fn descriptor(&self) -> Option<&VolumeDescriptor> {
		self.ready.as_ref().map(|r| &r.descriptor)
	}

	pub fn block_size(&self) -> u32 {
		self.config.block_size
	}

	pub fn block_count(&self) -> crate::FlashResult<u32> {
		Ok(self.ready()?.descriptor.block_count)
	}

	/// total bytes
	pub fn capacity(&self) -> crate::FlashResult<u64> {
		Ok(self.block_count()? as u64 * self.config.block_size as u64)
	}

	fn check_range(&self, address: u32, length: usize) -> crate::FlashResult<()> {
		let size = self.capacity()?;
		if address as u64 >= size || address as u64 + length as u64 > size {
			return Err(Error::OutOfRange { address, length, size });
		}
		Ok(())
	}

	pub fn resolve_address(&self, address: u32) -> crate::FlashResult<Location> {
		self.check_range(address, 0)?;
		let (device, offset) = resolve(&self.ready()?.descriptor.device_blocks, self.config.block_size, address);
		Ok(Location { device, offset })
	}

	/// device and block number within that device
	pub fn resolve_block(&self, block: u32) -> crate::FlashResult<(u8, u32)> {
		let descriptor = &self.ready()?.descriptor;
		if block >= descriptor.block_count {
			return Err(Error::BlockOutOfRange { block, block_count: descriptor.block_count });
		}
		Ok(resolve(&descriptor.device_blocks, 1, block))
	}

	fn segments(&self, address: u32, length: usize) -> crate::FlashResult<Vec<Segment>> {
		self.check_range(address, length)?;
		let device_blocks = &self.ready()?.descriptor.device_blocks;
		Ok(split(device_blocks, self.config.block_size, address, length))
	}

	pub fn read(&mut self, address: u32, target: &mut [u8]) -> crate::FlashResult<()> {
		for segment in self.segments(address, target.len())? {
			debug!("read {:?}", segment);
			self.chip(segment.device).read(segment.offset, &mut target[segment.range()]);
		}
		Ok(())
	}

	pub fn write(&mut self, address: u32, data: &[u8]) -> crate::FlashResult<()> {
		let mut written = 0;
		for segment in self.segments(address, data.len())? {
			debug!("write {:?}", segment);
			if let Err(e) = self.chip(segment.device).write(segment.offset, &data[segment.range()]) {
				if written > 0 {
					warn!("write at 0x{:08x}: only 0x{:x} of 0x{:x} bytes written before device {} failed",
						address, written, data.len(), segment.device);
				}
				return Err(e);
			}
			written += segment.len;
		}
		Ok(())
	}

	pub fn erase_block(&mut self, block: u32) -> crate::FlashResult<()> {
		let (device, local_block) = self.resolve_block(block)?;
		let erase = self.ready()?.erase;
		let offset = local_block * self.config.block_size;
		debug!("erase block {}: device {} offset 0x{:x} ({:?})", block, device, offset, erase);
		self.chip(device).erase(offset, erase)
	}

	/// chip erase on every device, in order
	pub fn erase_all(&mut self) -> crate::FlashResult<()> {
		self.ready()?;
		for device in 0..self.config.device_count as u8 {
			debug!("erase device {}", device);
			self.chip(device).erase_chip()?;
		}
		Ok(())
	}
}
