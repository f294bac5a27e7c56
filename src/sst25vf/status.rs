use std::fmt;

use super::consts::*;

/// Content of the status register (RDSR).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StatusRegister(pub u8);

impl StatusRegister {
	/// write (or erase) cycle in progress
	pub fn is_busy(&self) -> bool {
		0 != self.0 & STATUS_BUSY
	}
	/// write enable latch
	pub fn is_write_enabled(&self) -> bool {
		0 != self.0 & STATUS_WEL
	}
	/// auto-increment (AAI) programming mode active
	pub fn is_auto_increment(&self) -> bool {
		0 != self.0 & STATUS_AAI
	}
	/// block protection bits are read-only
	pub fn is_protection_locked(&self) -> bool {
		0 != self.0 & STATUS_BPL
	}

	/// BP3..BP0
	pub fn block_protection(&self) -> u8 {
		(self.0 & STATUS_BP_MASK) >> 2
	}
	pub fn is_protected(&self) -> bool {
		0 != self.block_protection()
	}
}

impl fmt::Display for StatusRegister {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "0x{:02x}", self.0)
	}
}

impl fmt::Debug for StatusRegister {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "0x{:02x} (block protection: 0b{:04b}", self.0, self.block_protection())?;
		if self.is_busy() { write!(f, " [BUSY]")?; }
		if self.is_write_enabled() { write!(f, " [WEL]")?; }
		if self.is_auto_increment() { write!(f, " [AAI]")?; }
		if self.is_protection_locked() { write!(f, " [BPL]")?; }
		write!(f, ")")
	}
}
