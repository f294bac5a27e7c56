use std::mem;

use crate::sst25vf::consts::*;
use crate::sst25vf::{
	DeviceId,
	Model,
	StatusRegister,
};

use super::Storage;

/// status reads reporting BUSY after each program/erase command
pub const DEFAULT_BUSY_POLLS: u32 = 2;

/// block protection is enabled after power-up
const POWER_UP_STATUS: u8 = STATUS_BP_MASK;

/// Emulated SST25VF chip.
///
/// Commands are decoded when chip enable is released, like the real chip
/// does. Programming can only clear bits, erasing sets them again. While a
/// write cycle is running (or in AAI mode) unrelated commands are ignored.
pub struct SimChip<S: Storage = Vec<u8>> {
	id: DeviceId,
	jedec_id: u32,
	memory: S,
	status: u8, // without BUSY
	status_write_enabled: bool,
	busy_output: bool,
	busy_polls: u32,
	busy_remaining: u32,
	stuck_busy: bool,
	aai_address: Option<u32>,
	command: Vec<u8>,
}

impl SimChip<Vec<u8>> {
	/// erased chip with `capacity` bytes
	pub fn new(id: DeviceId, capacity: u32) -> Self {
		SimChip::with_storage(id, vec![0xff; capacity as usize])
	}

	pub fn from_model(model: &Model) -> Self {
		SimChip::new(model.id, model.capacity)
	}
}

impl<S: Storage> SimChip<S> {
	pub fn with_storage(id: DeviceId, memory: S) -> Self {
		assert!(memory.len() > 0, "chip without memory");
		SimChip {
			id,
			jedec_id: id.model().map_or(0, |m| m.jedec_id),
			memory,
			status: POWER_UP_STATUS,
			status_write_enabled: false,
			busy_output: true,
			busy_polls: DEFAULT_BUSY_POLLS,
			busy_remaining: 0,
			stuck_busy: false,
			aai_address: None,
			command: Vec::new(),
		}
	}

	pub fn with_busy_polls(mut self, polls: u32) -> Self {
		self.busy_polls = polls;
		self
	}

	/// a stuck chip never finishes its write cycle
	pub fn set_stuck_busy(&mut self, stuck: bool) {
		self.stuck_busy = stuck;
	}

	pub fn id(&self) -> DeviceId {
		self.id
	}

	pub fn capacity(&self) -> usize {
		self.memory.len()
	}

	pub fn memory(&self) -> &S {
		&self.memory
	}

	pub fn memory_mut(&mut self) -> &mut S {
		&mut self.memory
	}

	pub fn into_memory(self) -> S {
		self.memory
	}

	pub fn is_busy(&self) -> bool {
		self.stuck_busy || self.busy_remaining > 0
	}

	/// BUSY output on SO during AAI (EBSY/DBSY)
	pub fn is_busy_output_enabled(&self) -> bool {
		self.busy_output
	}

	/// status register as RDSR would report it (without counting a poll)
	pub fn status(&self) -> StatusRegister {
		if self.is_busy() {
			StatusRegister(self.status | STATUS_BUSY)
		} else {
			StatusRegister(self.status)
		}
	}

	fn poll_status(&mut self) -> StatusRegister {
		let status = self.status();
		if self.busy_remaining > 0 {
			self.busy_remaining -= 1;
		}
		status
	}

	fn address(command: &[u8]) -> u32 {
		(command[1] as u32) << 16 | (command[2] as u32) << 8 | command[3] as u32
	}

	fn wrap(&self, address: u32) -> usize {
		address as usize % self.memory.len()
	}

	/// byte clocked in while chip enable is asserted; returns the byte
	/// clocked out at the same time
	pub(super) fn exchange(&mut self, data: u8) -> u8 {
		let position = self.command.len();
		self.command.push(data);
		if 0 == position {
			return 0xff;
		}

		match self.command[0] {
			RDSR_OPCODE => self.poll_status().0,
			READ_OPCODE if position >= 4 => {
				let address = Self::address(&self.command).wrapping_add((position - 4) as u32);
				self.memory.read_byte(self.wrap(address))
			},
			RDID_OPCODE if position >= 4 => {
				// address bit 0 selects manufacturer (0) or device (1); alternates
				if 0 == (position - 4 + self.command[3] as usize) % 2 {
					self.id.manufacturer()
				} else {
					self.id.device()
				}
			},
			JEDEC_ID_OPCODE if position <= 3 => (self.jedec_id >> (8 * (3 - position))) as u8,
			_ => 0xff,
		}
	}

	/// chip enable released: execute the received command
	pub(super) fn finish(&mut self) {
		let command = mem::replace(&mut self.command, Vec::new());
		let opcode = match command.first() {
			Some(&op) => op,
			None => return,
		};

		if RDSR_OPCODE == opcode {
			return;
		}
		if self.is_busy() {
			trace!("{}: ignoring {:02x?} during write cycle", self.id, command);
			return;
		}
		if self.aai_address.is_some() && AAI_OPCODE != opcode && WRDI_OPCODE != opcode {
			trace!("{}: ignoring {:02x?} in AAI mode", self.id, command);
			return;
		}

		match (opcode, command.len()) {
			(WREN_OPCODE, 1) => self.status |= STATUS_WEL,
			(WRDI_OPCODE, 1) => {
				self.status &= !(STATUS_WEL | STATUS_AAI);
				self.aai_address = None;
			},
			(EWSR_OPCODE, 1) => self.status_write_enabled = true,
			(WRSR_OPCODE, 2) => {
				if self.status_write_enabled || 0 != self.status & STATUS_WEL {
					const WRITABLE: u8 = STATUS_BP_MASK | STATUS_BPL;
					self.status = (self.status & !WRITABLE) | (command[1] & WRITABLE);
				}
				self.status_write_enabled = false;
				self.status &= !STATUS_WEL;
			},
			(EBSY_OPCODE, 1) => self.busy_output = true,
			(DBSY_OPCODE, 1) => self.busy_output = false,
			(BYTE_PROGRAM_OPCODE, 5) => {
				if self.take_write_enable() {
					self.program(Self::address(&command), &command[4..]);
				}
			},
			(AAI_OPCODE, _) => self.auto_increment(&command),
			(ERASE_4K_OPCODE, 4) => self.erase(Self::address(&command), 0x1000),
			(ERASE_32K_OPCODE, 4) => self.erase(Self::address(&command), 0x8000),
			(ERASE_64K_OPCODE, 4) => self.erase(Self::address(&command), 0x1_0000),
			(CHIP_ERASE_OPCODE, 1) | (0xc7, 1) => {
				if self.take_write_enable() {
					let len = self.memory.len();
					self.memory.fill(0, len, 0xff);
					self.start_write_cycle();
				}
			},
			_ => trace!("{}: ignoring {:02x?}", self.id, command),
		}
	}

	fn start_write_cycle(&mut self) {
		self.busy_remaining = self.busy_polls;
	}

	// WEL is cleared by every program/erase command, even rejected ones
	fn take_write_enable(&mut self) -> bool {
		let enabled = 0 != self.status & STATUS_WEL;
		self.status &= !STATUS_WEL;
		if enabled && StatusRegister(self.status).is_protected() {
			trace!("{}: write protected (status {:?})", self.id, StatusRegister(self.status));
			return false;
		}
		enabled
	}

	fn program(&mut self, address: u32, data: &[u8]) {
		for (i, b) in data.iter().enumerate() {
			let offset = self.wrap(address.wrapping_add(i as u32));
			let current = self.memory.read_byte(offset);
			self.memory.write_byte(offset, current & b);
		}
		self.start_write_cycle();
	}

	fn auto_increment(&mut self, command: &[u8]) {
		match (self.aai_address, command.len()) {
			(None, 6) => {
				if 0 == self.status & STATUS_WEL || StatusRegister(self.status).is_protected() {
					trace!("{}: AAI start rejected (status {:?})", self.id, StatusRegister(self.status));
					return;
				}
				let address = Self::address(command) & !1;
				self.status |= STATUS_AAI;
				self.aai_address = Some(address.wrapping_add(2));
				self.program(address, &command[4..6]);
			},
			(Some(address), 3) => {
				self.aai_address = Some(address.wrapping_add(2));
				self.program(address, &command[1..3]);
			},
			_ => trace!("{}: malformed AAI command {:02x?}", self.id, command),
		}
	}

	fn erase(&mut self, address: u32, size: usize) {
		if self.take_write_enable() {
			let start = self.wrap(address) & !(size - 1);
			let len = size.min(self.memory.len() - start);
			self.memory.fill(start, len, 0xff);
			self.start_write_cycle();
		}
	}
}
