//! Shared serial bus with one chip-enable line per device.
//!
//! Only one device is enabled at a time; every command sequence is
//! bracketed by `select`/`deselect` (use `Transaction` to get that right).
//! Transports only move bytes; they don't know any chip commands.

mod transaction;

pub use self::transaction::Transaction;

/// clocked out while receiving
pub const DUMMY_BYTE: u8 = 0xff;

pub trait Bus {
	/// assert chip enable of `device` (index in the physical array)
	fn select(&mut self, device: u8);

	/// release chip enable of the selected device
	fn deselect(&mut self);

	/// full-duplex exchange of a single byte
	fn exchange(&mut self, data: u8) -> u8;

	fn send_frame(&mut self, data: &[u8]) {
		for b in data {
			self.exchange(*b);
		}
	}

	fn read_frame(&mut self, target: &mut [u8]) {
		for t in target.iter_mut() {
			*t = self.exchange(DUMMY_BYTE);
		}
	}
}

impl<'a, B: ?Sized + Bus> Bus for &'a mut B {
	fn select(&mut self, device: u8) {
		B::select(*self, device)
	}

	fn deselect(&mut self) {
		B::deselect(*self)
	}

	fn exchange(&mut self, data: u8) -> u8 {
		B::exchange(*self, data)
	}

	fn send_frame(&mut self, data: &[u8]) {
		B::send_frame(*self, data)
	}

	fn read_frame(&mut self, target: &mut [u8]) {
		B::read_frame(*self, target)
	}
}
