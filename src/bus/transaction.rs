use std::ops::{
	Deref,
	DerefMut,
};

use super::Bus;

/// One command sequence on a single device: chip enable is asserted when
/// the transaction is opened and released when it is dropped.
pub struct Transaction<'a, B: ?Sized + Bus + 'a> {
	bus: &'a mut B,
	device: u8,
}

impl<'a, B: ?Sized + Bus> Transaction<'a, B> {
	pub fn open(bus: &'a mut B, device: u8) -> Self {
		bus.select(device);
		Transaction { bus, device }
	}

	pub fn device(&self) -> u8 {
		self.device
	}
}

impl<'a, B: ?Sized + Bus> Drop for Transaction<'a, B> {
	fn drop(&mut self) {
		self.bus.deselect();
	}
}

impl<'a, B: ?Sized + Bus> Deref for Transaction<'a, B> {
	type Target = B;

	fn deref(&self) -> &Self::Target {
		&self.bus
	}
}

impl<'a, B: ?Sized + Bus> DerefMut for Transaction<'a, B> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		&mut self.bus
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Default)]
	struct Recorder {
		events: Vec<String>,
	}

	impl Bus for Recorder {
		fn select(&mut self, device: u8) {
			self.events.push(format!("select {}", device));
		}

		fn deselect(&mut self) {
			self.events.push("deselect".into());
		}

		fn exchange(&mut self, data: u8) -> u8 {
			self.events.push(format!("tx {:02x}", data));
			!data
		}
	}

	#[test]
	fn brackets_sequence_with_chip_enable() {
		let mut bus = Recorder::default();
		{
			let mut tx = Transaction::open(&mut bus, 3);
			assert_eq!(tx.device(), 3);
			assert_eq!(tx.exchange(0x0f), 0xf0);
			tx.send_frame(&[0x01, 0x02]);
		}
		assert_eq!(bus.events, vec![
			"select 3", "tx 0f", "tx 01", "tx 02", "deselect",
		]);
	}

	#[test]
	fn read_frame_clocks_dummy_bytes() {
		let mut bus = Recorder::default();
		let mut buf = [0u8; 2];
		Transaction::open(&mut bus, 0).read_frame(&mut buf);
		assert_eq!(buf, [0x00, 0x00]);
		assert_eq!(bus.events, vec!["select 0", "tx ff", "tx ff", "deselect"]);
	}
}
