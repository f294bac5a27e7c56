//! Command protocol of SST25VF serial flash chips (and compatible parts).
//!
//! Every command is one chip-enabled sequence: opcode, optional 24-bit
//! big-endian address, optional data. Program and erase commands need the
//! write enable latch (WREN) and start an internal write cycle; the next
//! command must wait until the BUSY status bit is clear again.
//!
//! There are no pages: bytes are programmed one at a time, or in pairs
//! with "auto address increment" (AAI): the first AAI command carries the
//! (even) address and two bytes, every following AAI command only two
//! more bytes. WRDI ends AAI mode.

use std::time::{
	Duration,
	Instant,
};

use crate::bus::{
	Bus,
	Transaction,
};
use crate::error::Error;

mod identity;
mod status;

pub use self::identity::{
	DeviceId,
	IdentityTable,
	KNOWN_MODELS,
	Model,
	model_by_name,
};
pub use self::status::StatusRegister;

#[allow(dead_code)]
pub mod consts {
	pub const READ_OPCODE:         u8 = 0x03;
	pub const ERASE_4K_OPCODE:     u8 = 0x20;
	pub const ERASE_32K_OPCODE:    u8 = 0x52;
	pub const ERASE_64K_OPCODE:    u8 = 0xd8;
	pub const CHIP_ERASE_OPCODE:   u8 = 0x60;
	pub const BYTE_PROGRAM_OPCODE: u8 = 0x02;
	pub const AAI_OPCODE:          u8 = 0xad; // auto address increment word program
	pub const RDSR_OPCODE:         u8 = 0x05; // read status register
	pub const EWSR_OPCODE:         u8 = 0x50; // enable write status register
	pub const WRSR_OPCODE:         u8 = 0x01; // write status register
	pub const WREN_OPCODE:         u8 = 0x06; // write enable (sets WEL)
	pub const WRDI_OPCODE:         u8 = 0x04; // write disable (clears WEL, ends AAI)
	pub const RDID_OPCODE:         u8 = 0x90; // manufacturer + device id
	pub const JEDEC_ID_OPCODE:     u8 = 0x9f;
	pub const EBSY_OPCODE:         u8 = 0x70; // enable BUSY status on SO during AAI
	pub const DBSY_OPCODE:         u8 = 0x80; // disable BUSY status on SO

	pub const STATUS_BUSY:    u8 = 0x01;
	pub const STATUS_WEL:     u8 = 0x02;
	pub const STATUS_BP0:     u8 = 0x04;
	pub const STATUS_BP1:     u8 = 0x08;
	pub const STATUS_BP2:     u8 = 0x10;
	pub const STATUS_BP3:     u8 = 0x20;
	pub const STATUS_AAI:     u8 = 0x40;
	pub const STATUS_BPL:     u8 = 0x80;
	pub const STATUS_BP_MASK: u8 = STATUS_BP0 | STATUS_BP1 | STATUS_BP2 | STATUS_BP3;

	/// addresses are sent as 3 bytes
	pub const MAX_ADDRESS: u32 = 0x00ff_ffff;
}

use self::consts::*;

/// Erase command matching the block size of a volume.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum EraseOpcode {
	Sector4k,
	Block32k,
	Block64k,
}

impl EraseOpcode {
	pub fn for_block_size(block_size: u32) -> Option<Self> {
		match block_size {
			0x1000 => Some(EraseOpcode::Sector4k),
			0x8000 => Some(EraseOpcode::Block32k),
			0x1_0000 => Some(EraseOpcode::Block64k),
			_ => None,
		}
	}

	pub fn opcode(self) -> u8 {
		match self {
			EraseOpcode::Sector4k => ERASE_4K_OPCODE,
			EraseOpcode::Block32k => ERASE_32K_OPCODE,
			EraseOpcode::Block64k => ERASE_64K_OPCODE,
		}
	}

	/// bytes erased by one command
	pub fn size(self) -> u32 {
		match self {
			EraseOpcode::Sector4k => 0x1000,
			EraseOpcode::Block32k => 0x8000,
			EraseOpcode::Block64k => 0x1_0000,
		}
	}
}

/// How long to poll the BUSY bit before giving up on a chip.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum BusyTimeout {
	/// poll forever
	Unbounded,
	After(Duration),
}

impl Default for BusyTimeout {
	fn default() -> Self {
		// chip erase takes up to 50ms (SST25VF016B)
		BusyTimeout::After(Duration::from_secs(1))
	}
}

fn address_bytes(address: u32) -> [u8; 3] {
	assert!(address <= MAX_ADDRESS, "address 0x{:x} needs more than 24 bits", address);
	[(address >> 16) as u8, (address >> 8) as u8, address as u8]
}

/// Handle for one device on the bus; every command is sent to `device`.
pub struct Chip<'a, B: Bus + ?Sized + 'a> {
	bus: &'a mut B,
	device: u8,
	timeout: BusyTimeout,
}

impl<'a, B: Bus + ?Sized> Chip<'a, B> {
	pub fn select(bus: &'a mut B, device: u8) -> Self {
		Chip {
			bus,
			device,
			timeout: BusyTimeout::default(),
		}
	}

	pub fn with_timeout(mut self, timeout: BusyTimeout) -> Self {
		self.timeout = timeout;
		self
	}

	pub fn device(&self) -> u8 {
		self.device
	}

	fn transaction(&mut self) -> Transaction<B> {
		Transaction::open(&mut *self.bus, self.device)
	}

	/// single byte command (WREN, WRDI, EWSR, EBSY, DBSY)
	pub fn command(&mut self, opcode: u8) {
		self.transaction().exchange(opcode);
	}

	pub fn read_id(&mut self) -> DeviceId {
		let mut tx = self.transaction();
		tx.exchange(RDID_OPCODE);
		// address 0: manufacturer first
		tx.send_frame(&address_bytes(0));
		let mut id = [0u8; 2];
		tx.read_frame(&mut id);
		DeviceId(u16::from_be_bytes(id))
	}

	/// Reads the identity; known chips (per `table`) get their block
	/// protection cleared and BUSY output on SO disabled.
	///
	/// Returns `DeviceId::INVALID` for unknown chips.
	pub fn identify(&mut self, table: &IdentityTable) -> DeviceId {
		let id = self.read_id();
		if !table.contains(id) {
			warn!("device {}: unknown identity {:?}", self.device, id);
			return DeviceId::INVALID;
		}
		self.write_status(0x00);
		self.command(DBSY_OPCODE);
		id
	}

	pub fn jedec_id(&mut self) -> u32 {
		let mut tx = self.transaction();
		tx.exchange(JEDEC_ID_OPCODE);
		let mut id = [0u8; 3];
		tx.read_frame(&mut id);
		(id[0] as u32) << 16 | (id[1] as u32) << 8 | id[2] as u32
	}

	pub fn read_status(&mut self) -> StatusRegister {
		let mut tx = self.transaction();
		tx.exchange(RDSR_OPCODE);
		StatusRegister(tx.exchange(crate::bus::DUMMY_BYTE))
	}

	pub fn write_status(&mut self, status: u8) {
		self.command(EWSR_OPCODE);
		let mut tx = self.transaction();
		tx.exchange(WRSR_OPCODE);
		tx.exchange(status);
	}

	/// returns once BUSY is clear; returns error on timeout
	pub fn wait_while_busy(&mut self) -> crate::FlashResult<()> {
		let deadline = match self.timeout {
			BusyTimeout::Unbounded => None,
			BusyTimeout::After(d) => Some(Instant::now() + d),
		};
		loop {
			let status = self.read_status();
			if !status.is_busy() {
				return Ok(());
			}
			if let Some(deadline) = deadline {
				if Instant::now() >= deadline {
					error!("device {}: still busy after {:?}: {:?}", self.device, self.timeout, status);
					return Err(Error::DeviceTimeout { device: self.device, status });
				}
			}
		}
	}

	pub fn read(&mut self, address: u32, target: &mut [u8]) {
		let mut tx = self.transaction();
		tx.exchange(READ_OPCODE);
		tx.send_frame(&address_bytes(address));
		tx.read_frame(target);
	}

	pub fn write_byte(&mut self, address: u32, data: u8) -> crate::FlashResult<()> {
		self.command(WREN_OPCODE);
		{
			let mut tx = self.transaction();
			tx.exchange(BYTE_PROGRAM_OPCODE);
			tx.send_frame(&address_bytes(address));
			tx.exchange(data);
		}
		self.wait_while_busy()
	}

	/// AAI programming for all complete pairs; single bytes at an odd start
	/// address or at the end are programmed with `write_byte`.
	pub fn write(&mut self, mut address: u32, mut data: &[u8]) -> crate::FlashResult<()> {
		if data.is_empty() {
			return Ok(());
		}
		let end = address as u64 + data.len() as u64;
		assert!(end <= MAX_ADDRESS as u64 + 1, "write of {} bytes at 0x{:x} beyond 24-bit address range", data.len(), address);

		if 0 != address & 1 {
			self.write_byte(address, data[0])?;
			address += 1;
			data = &data[1..];
		}

		let pairs = data.len() / 2;
		if pairs > 0 {
			let result = self.write_pairs(address, &data[..2 * pairs]);
			// leave AAI mode even if a write cycle didn't finish
			self.command(WRDI_OPCODE);
			result?;
			self.wait_while_busy()?;
			address += 2 * pairs as u32;
			data = &data[2 * pairs..];
		}

		if let Some(&last) = data.first() {
			self.write_byte(address, last)?;
		}

		Ok(())
	}

	fn write_pairs(&mut self, address: u32, data: &[u8]) -> crate::FlashResult<()> {
		let mut pairs = data.chunks(2);
		if let Some(first) = pairs.next() {
			self.aai_start(address, first[0], first[1]);
			self.wait_while_busy()?;
		}
		for pair in pairs {
			self.aai_continue(pair[0], pair[1]);
			self.wait_while_busy()?;
		}
		Ok(())
	}

	/// byte-at-a-time programming, without AAI
	pub fn write_slow(&mut self, address: u32, data: &[u8]) -> crate::FlashResult<()> {
		for (i, b) in data.iter().enumerate() {
			self.write_byte(address + i as u32, *b)?;
		}
		Ok(())
	}

	/// starts AAI mode at `address` (should be even); doesn't wait for BUSY
	pub fn aai_start(&mut self, address: u32, d0: u8, d1: u8) {
		self.command(WREN_OPCODE);
		let mut tx = self.transaction();
		tx.exchange(AAI_OPCODE);
		tx.send_frame(&address_bytes(address));
		tx.send_frame(&[d0, d1]);
	}

	/// next pair in AAI mode; doesn't wait for BUSY
	pub fn aai_continue(&mut self, d0: u8, d1: u8) {
		let mut tx = self.transaction();
		tx.send_frame(&[AAI_OPCODE, d0, d1]);
	}

	pub fn erase(&mut self, address: u32, erase: EraseOpcode) -> crate::FlashResult<()> {
		self.command(WREN_OPCODE);
		{
			let mut tx = self.transaction();
			tx.exchange(erase.opcode());
			tx.send_frame(&address_bytes(address));
		}
		self.wait_while_busy()
	}

	pub fn erase_4k(&mut self, address: u32) -> crate::FlashResult<()> {
		self.erase(address, EraseOpcode::Sector4k)
	}

	pub fn erase_32k(&mut self, address: u32) -> crate::FlashResult<()> {
		self.erase(address, EraseOpcode::Block32k)
	}

	pub fn erase_64k(&mut self, address: u32) -> crate::FlashResult<()> {
		self.erase(address, EraseOpcode::Block64k)
	}

	pub fn erase_chip(&mut self) -> crate::FlashResult<()> {
		self.command(WREN_OPCODE);
		self.command(CHIP_ERASE_OPCODE);
		self.wait_while_busy()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sim::{
		SimBus,
		SimChip,
	};

	fn sst25vf040() -> SimBus {
		SimBus::new().with_chip(SimChip::new(DeviceId(0xbf8d), 0x8_0000))
	}

	// sequences except status polling
	fn commands(bus: &SimBus) -> Vec<Vec<u8>> {
		bus.trace().iter()
			.filter(|s| s.opcode() != Some(RDSR_OPCODE))
			.map(|s| s.bytes.clone())
			.collect()
	}

	#[test]
	fn erase_opcode_by_block_size() {
		assert_eq!(EraseOpcode::for_block_size(0x1000), Some(EraseOpcode::Sector4k));
		assert_eq!(EraseOpcode::for_block_size(0x8000), Some(EraseOpcode::Block32k));
		assert_eq!(EraseOpcode::for_block_size(0x1_0000), Some(EraseOpcode::Block64k));
		assert_eq!(EraseOpcode::for_block_size(0xc800), None);
		assert_eq!(EraseOpcode::Block32k.opcode(), 0x52);
		assert_eq!(EraseOpcode::Block64k.size(), 0x1_0000);
	}

	#[test]
	fn identify_known_chip() {
		let mut bus = sst25vf040();
		let id = Chip::select(&mut bus, 0).identify(&IdentityTable::default());
		assert_eq!(id, DeviceId(0xbf8d));
		assert_eq!(commands(&bus), vec![
			vec![RDID_OPCODE, 0, 0, 0, 0xff, 0xff],
			vec![EWSR_OPCODE],
			vec![WRSR_OPCODE, 0x00],
			vec![DBSY_OPCODE],
		]);
		// block protection is gone
		assert!(!Chip::select(&mut bus, 0).read_status().is_protected());
	}

	#[test]
	fn identify_unknown_chip() {
		let mut bus = SimBus::new().with_chip(SimChip::new(DeviceId(0xbf25), 0x1000));
		let id = Chip::select(&mut bus, 0).identify(&IdentityTable::default());
		assert_eq!(id, DeviceId::INVALID);
		assert_eq!(commands(&bus).len(), 1);
	}

	#[test]
	fn jedec_id() {
		let mut bus = sst25vf040();
		assert_eq!(Chip::select(&mut bus, 0).jedec_id(), 0xbf_258d);
	}

	#[test]
	fn write_then_read_back() {
		let mut bus = sst25vf040();
		let mut chip = Chip::select(&mut bus, 0);
		chip.write_status(0);
		chip.write(0x101, &[0xd0, 0xd1, 0xd2]).unwrap();
		chip.write_slow(0x200, &[0xe0, 0xe1]).unwrap();

		let mut buf = [0u8; 5];
		chip.read(0x100, &mut buf);
		assert_eq!(buf, [0xff, 0xd0, 0xd1, 0xd2, 0xff]);
		chip.read(0x200, &mut buf[..2]);
		assert_eq!(buf[..2], [0xe0, 0xe1]);
	}

	#[test]
	fn pairing_alignment() {
		let mut bus = sst25vf040();
		Chip::select(&mut bus, 0).write_status(0);
		bus.clear_trace();

		Chip::select(&mut bus, 0).write(0x0003, &[0xd0, 0xd1, 0xd2]).unwrap();
		assert_eq!(commands(&bus), vec![
			vec![WREN_OPCODE],
			vec![BYTE_PROGRAM_OPCODE, 0x00, 0x00, 0x03, 0xd0],
			vec![WREN_OPCODE],
			vec![AAI_OPCODE, 0x00, 0x00, 0x04, 0xd1, 0xd2],
			vec![WRDI_OPCODE],
		]);
	}

	#[test]
	fn auto_increment_with_trailing_byte() {
		let mut bus = sst25vf040();
		Chip::select(&mut bus, 0).write_status(0);
		bus.clear_trace();

		Chip::select(&mut bus, 0).write(0x0010, &[1, 2, 3, 4, 5]).unwrap();
		assert_eq!(commands(&bus), vec![
			vec![WREN_OPCODE],
			vec![AAI_OPCODE, 0x00, 0x00, 0x10, 1, 2],
			vec![AAI_OPCODE, 3, 4],
			vec![WRDI_OPCODE],
			vec![WREN_OPCODE],
			vec![BYTE_PROGRAM_OPCODE, 0x00, 0x00, 0x14, 5],
		]);
		// every write cycle is followed by status polling
		let polls = bus.trace().iter().filter(|s| s.opcode() == Some(RDSR_OPCODE)).count();
		assert!(polls >= 4);
	}

	#[test]
	fn single_byte_write() {
		let mut bus = sst25vf040();
		Chip::select(&mut bus, 0).write_status(0);
		bus.clear_trace();

		Chip::select(&mut bus, 0).write(0x0020, &[0x5a]).unwrap();
		assert_eq!(commands(&bus), vec![
			vec![WREN_OPCODE],
			vec![BYTE_PROGRAM_OPCODE, 0x00, 0x00, 0x20, 0x5a],
		]);
	}

	#[test]
	fn erase_commands() {
		let mut bus = sst25vf040();
		let mut chip = Chip::select(&mut bus, 0);
		chip.erase_32k(0x01_8000).unwrap();
		chip.erase_chip().unwrap();
		assert_eq!(commands(&bus), vec![
			vec![WREN_OPCODE],
			vec![ERASE_32K_OPCODE, 0x01, 0x80, 0x00],
			vec![WREN_OPCODE],
			vec![CHIP_ERASE_OPCODE],
		]);
	}

	#[test]
	fn busy_timeout() {
		let mut bus = sst25vf040();
		bus.chip_mut(0).set_stuck_busy(true);
		let err = Chip::select(&mut bus, 0)
			.with_timeout(BusyTimeout::After(Duration::from_millis(0)))
			.erase_chip()
			.unwrap_err();
		match err {
			Error::DeviceTimeout { device: 0, status } => assert!(status.is_busy()),
			e => panic!("unexpected error: {:?}", e),
		}
	}

	#[test]
	fn auto_increment_ended_after_timeout() {
		let mut bus = sst25vf040();
		Chip::select(&mut bus, 0).write_status(0);
		bus.chip_mut(0).set_stuck_busy(true);
		bus.clear_trace();

		let result = Chip::select(&mut bus, 0)
			.with_timeout(BusyTimeout::After(Duration::from_millis(0)))
			.write(0, &[1, 2, 3, 4]);
		assert!(result.is_err());
		assert_eq!(commands(&bus).last(), Some(&vec![WRDI_OPCODE]));
	}

	#[test]
	fn unbounded_wait_finishes() {
		let mut bus = SimBus::new().with_chip(SimChip::new(DeviceId(0xbf8d), 0x8_0000).with_busy_polls(50));
		Chip::select(&mut bus, 0).write_status(0);
		bus.clear_trace();
		Chip::select(&mut bus, 0)
			.with_timeout(BusyTimeout::Unbounded)
			.erase_4k(0)
			.unwrap();
		let polls = bus.trace().iter().filter(|s| s.opcode() == Some(RDSR_OPCODE)).count();
		assert_eq!(polls, 51);
	}

	#[test]
	#[should_panic]
	fn address_beyond_24_bits() {
		let mut bus = sst25vf040();
		let mut buf = [0u8; 1];
		Chip::select(&mut bus, 0).read(0x0100_0000, &mut buf);
	}
}
