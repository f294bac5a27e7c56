use std::ops::Range;

/// Part of a volume access that stays on one device.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Segment {
	pub device: u8,
	/// byte offset within the device
	pub offset: u32,
	/// offset within the caller's buffer
	pub start: usize,
	pub len: usize,
}

impl Segment {
	/// range within the caller's buffer
	pub fn range(&self) -> Range<usize> {
		self.start..self.start + self.len
	}
}

/// Walks the devices until `value` falls into one; `unit` is the size of a
/// block in whatever `value` counts (bytes: block size, blocks: 1).
///
/// `value` must be within the volume.
pub(super) fn resolve(device_blocks: &[u32], unit: u32, value: u32) -> (u8, u32) {
	let mut rest = value as u64;
	for (device, &blocks) in device_blocks.iter().enumerate() {
		let size = blocks as u64 * unit as u64;
		if rest < size {
			return (device as u8, rest as u32);
		}
		rest -= size;
	}
	panic!("0x{:x} beyond end of volume", value);
}

/// Splits `length` bytes at `address` into per-device pieces, in device
/// order. The range must be within the volume.
pub(super) fn split(device_blocks: &[u32], block_size: u32, address: u32, length: usize) -> Vec<Segment> {
	let mut segments = Vec::new();
	if 0 == length {
		return segments;
	}
	let (mut device, mut offset) = resolve(device_blocks, block_size, address);
	let mut start = 0;
	loop {
		let size = device_blocks[device as usize] as u64 * block_size as u64;
		let available = (size - offset as u64) as usize;
		let remaining = length - start;
		if remaining <= available {
			segments.push(Segment { device, offset, start, len: remaining });
			return segments;
		}
		segments.push(Segment { device, offset, start, len: available });
		start += available;
		device += 1;
		offset = 0;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn resolve_bytes() {
		let blocks = [1, 3, 1];
		assert_eq!(resolve(&blocks, 0x1000, 0), (0, 0));
		assert_eq!(resolve(&blocks, 0x1000, 0xfff), (0, 0xfff));
		assert_eq!(resolve(&blocks, 0x1000, 0x1000), (1, 0));
		assert_eq!(resolve(&blocks, 0x1000, 0x3fff), (1, 0x2fff));
		assert_eq!(resolve(&blocks, 0x1000, 0x4000), (2, 0));
	}

	#[test]
	fn resolve_blocks() {
		let blocks = [1, 3, 1];
		assert_eq!(resolve(&blocks, 1, 0), (0, 0));
		assert_eq!(resolve(&blocks, 1, 1), (1, 0));
		assert_eq!(resolve(&blocks, 1, 3), (1, 2));
		assert_eq!(resolve(&blocks, 1, 4), (2, 0));
	}

	#[test]
	#[should_panic]
	fn resolve_beyond_end() {
		resolve(&[1, 1], 0x1000, 0x2000);
	}

	#[test]
	fn split_within_device() {
		assert_eq!(split(&[1, 1], 0x1000, 0x1010, 0x20), vec![
			Segment { device: 1, offset: 0x10, start: 0, len: 0x20 },
		]);
		assert!(split(&[1, 1], 0x1000, 0x10, 0).is_empty());
	}

	#[test]
	fn split_across_boundary() {
		assert_eq!(split(&[1, 1], 0x1000, 0x800, 0x1800), vec![
			Segment { device: 0, offset: 0x800, start: 0, len: 0x800 },
			Segment { device: 1, offset: 0, start: 0x800, len: 0x1000 },
		]);
	}

	#[test]
	fn split_spanning_devices() {
		let segments = split(&[1, 1, 2], 0x1000, 0xfff, 0x1002);
		assert_eq!(segments, vec![
			Segment { device: 0, offset: 0xfff, start: 0, len: 1 },
			Segment { device: 1, offset: 0, start: 1, len: 0x1000 },
			Segment { device: 2, offset: 0, start: 0x1001, len: 1 },
		]);
		assert_eq!(segments[2].range(), 0x1001..0x1002);
	}

	#[test]
	fn split_ending_on_boundary() {
		assert_eq!(split(&[1, 1], 0x1000, 0, 0x1000), vec![
			Segment { device: 0, offset: 0, start: 0, len: 0x1000 },
		]);
	}
}
