//! Emulated chip array on a shared bus.
//!
//! `SimBus` implements `Bus` for a set of emulated SST25VF chips (one per
//! chip enable line) and records every command sequence, so tests can
//! check exactly what was sent to which device. Chips either keep their
//! memory in a `Vec<u8>` or in a memory-mapped image file.

mod chip;
mod mapped;
mod storage;

use std::mem;

pub use self::chip::{
	DEFAULT_BUSY_POLLS,
	SimChip,
};
pub use self::mapped::{
	Mapped,
	open_image,
};
pub use self::storage::Storage;

use crate::bus::Bus;
use crate::sst25vf::consts::*;

/// Bytes sent to one device between select and deselect.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Sequence {
	pub device: u8,
	pub bytes: Vec<u8>,
}

impl Sequence {
	pub fn opcode(&self) -> Option<u8> {
		self.bytes.first().cloned()
	}

	/// 24-bit address of addressed commands (AAI only for the first pair)
	pub fn address(&self) -> Option<u32> {
		let addressed = match self.opcode()? {
			READ_OPCODE | BYTE_PROGRAM_OPCODE | RDID_OPCODE
			| ERASE_4K_OPCODE | ERASE_32K_OPCODE | ERASE_64K_OPCODE => true,
			AAI_OPCODE => 6 == self.bytes.len(),
			_ => false,
		};
		if !addressed || self.bytes.len() < 4 {
			return None;
		}
		Some((self.bytes[1] as u32) << 16 | (self.bytes[2] as u32) << 8 | self.bytes[3] as u32)
	}

	/// data bytes following opcode and address
	pub fn payload(&self) -> &[u8] {
		match self.opcode() {
			Some(AAI_OPCODE) if 3 == self.bytes.len() => &self.bytes[1..],
			_ if self.address().is_some() => &self.bytes[4..],
			_ => &self.bytes[self.bytes.len().min(1)..],
		}
	}
}

pub struct SimBus<S: Storage = Vec<u8>> {
	chips: Vec<SimChip<S>>,
	selected: Option<u8>,
	current: Vec<u8>,
	trace: Vec<Sequence>,
	tracing: bool,
}

impl<S: Storage> SimBus<S> {
	pub fn new() -> Self {
		SimBus {
			chips: Vec::new(),
			selected: None,
			current: Vec::new(),
			trace: Vec::new(),
			tracing: true,
		}
	}

	/// next chip enable line gets `chip`
	pub fn with_chip(mut self, chip: SimChip<S>) -> Self {
		self.chips.push(chip);
		self
	}

	pub fn add_chip(&mut self, chip: SimChip<S>) {
		self.chips.push(chip);
	}

	pub fn chips(&self) -> &[SimChip<S>] {
		&self.chips
	}

	pub fn chip(&self, device: u8) -> &SimChip<S> {
		&self.chips[device as usize]
	}

	pub fn chip_mut(&mut self, device: u8) -> &mut SimChip<S> {
		&mut self.chips[device as usize]
	}

	pub fn into_chips(self) -> Vec<SimChip<S>> {
		self.chips
	}

	/// recording is on by default
	pub fn set_tracing(&mut self, tracing: bool) {
		self.tracing = tracing;
	}

	pub fn trace(&self) -> &[Sequence] {
		&self.trace
	}

	pub fn clear_trace(&mut self) {
		self.trace.clear();
	}

	pub fn take_trace(&mut self) -> Vec<Sequence> {
		mem::replace(&mut self.trace, Vec::new())
	}
}

impl<S: Storage> Default for SimBus<S> {
	fn default() -> Self {
		SimBus::new()
	}
}

impl<S: Storage> Bus for SimBus<S> {
	fn select(&mut self, device: u8) {
		assert!(self.selected.is_none(), "selecting device {} while device {:?} is enabled", device, self.selected);
		self.selected = Some(device);
	}

	fn deselect(&mut self) {
		let device = match self.selected.take() {
			Some(d) => d,
			None => panic!("deselect without selected device"),
		};
		if let Some(chip) = self.chips.get_mut(device as usize) {
			chip.finish();
		}
		let bytes = mem::replace(&mut self.current, Vec::new());
		if self.tracing {
			trace!("device {}: {:02x?}", device, bytes);
			self.trace.push(Sequence { device, bytes });
		}
	}

	fn exchange(&mut self, data: u8) -> u8 {
		let device = match self.selected {
			Some(d) => d,
			None => panic!("bus transfer without selected device"),
		};
		if self.tracing {
			self.current.push(data);
		}
		match self.chips.get_mut(device as usize) {
			Some(chip) => chip.exchange(data),
			// nobody drives SO: pulled up
			None => 0xff,
		}
	}
}
