use std::fmt;

/// Manufacturer and device id as returned by RDID (manufacturer in the
/// high byte).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(pub u16);

impl DeviceId {
	/// reported by `Chip::identify` for chips not in the identity table
	pub const INVALID: DeviceId = DeviceId(0x0000);

	pub fn manufacturer(&self) -> u8 {
		(self.0 >> 8) as u8
	}

	pub fn device(&self) -> u8 {
		self.0 as u8
	}

	pub fn is_valid(&self) -> bool {
		*self != DeviceId::INVALID
	}

	pub fn model(&self) -> Option<&'static Model> {
		KNOWN_MODELS.iter().find(|m| m.id == *self)
	}
}

impl fmt::Display for DeviceId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "0x{:04x}", self.0)
	}
}

impl fmt::Debug for DeviceId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self.model() {
			Some(m) => write!(f, "0x{:04x} ({})", self.0, m.name),
			None => write!(f, "0x{:04x}", self.0),
		}
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Model {
	pub name: &'static str,
	pub id: DeviceId,
	/// manufacturer, memory type, capacity code
	pub jedec_id: u32,
	/// bytes
	pub capacity: u32,
}

pub const KNOWN_MODELS: [Model; 5] = [
	Model { name: "SST25VF040", id: DeviceId(0xbf8d), jedec_id: 0x00bf_258d, capacity: 0x0008_0000 },
	Model { name: "SST25VF080", id: DeviceId(0xbf8e), jedec_id: 0x00bf_258e, capacity: 0x0010_0000 },
	Model { name: "SST25VF016", id: DeviceId(0xbf41), jedec_id: 0x00bf_2541, capacity: 0x0020_0000 },
	Model { name: "SST25VF032", id: DeviceId(0xbf4a), jedec_id: 0x00bf_254a, capacity: 0x0040_0000 },
	// 1 Mbit, same size as the SST25VF010
	Model { name: "MX25R1035F", id: DeviceId(0xc211), jedec_id: 0x00c2_2811, capacity: 0x0002_0000 },
];

pub fn model_by_name(name: &str) -> Option<&'static Model> {
	KNOWN_MODELS.iter().find(|m| m.name.eq_ignore_ascii_case(name))
}

/// Maps identity codes to usable capacity in bytes.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct IdentityTable {
	entries: Vec<(DeviceId, u32)>,
}

impl IdentityTable {
	pub fn empty() -> Self {
		IdentityTable { entries: Vec::new() }
	}

	/// replaces an existing entry for the same id
	pub fn insert(&mut self, id: DeviceId, capacity: u32) {
		assert!(id.is_valid(), "can't map the invalid identity");
		match self.entries.iter_mut().find(|(e, _)| *e == id) {
			Some(entry) => entry.1 = capacity,
			None => self.entries.push((id, capacity)),
		}
	}

	pub fn with(mut self, id: DeviceId, capacity: u32) -> Self {
		self.insert(id, capacity);
		self
	}

	pub fn capacity(&self, id: DeviceId) -> Option<u32> {
		self.entries.iter().find(|(e, _)| *e == id).map(|(_, c)| *c)
	}

	pub fn contains(&self, id: DeviceId) -> bool {
		self.capacity(id).is_some()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

impl Default for IdentityTable {
	fn default() -> Self {
		KNOWN_MODELS.iter().fold(IdentityTable::empty(), |t, m| t.with(m.id, m.capacity))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_table_has_known_models() {
		let table = IdentityTable::default();
		assert_eq!(table.len(), KNOWN_MODELS.len());
		assert_eq!(table.capacity(DeviceId(0xbf8d)), Some(0x8_0000));
		assert_eq!(table.capacity(DeviceId(0xbf4a)), Some(0x40_0000));
		assert_eq!(table.capacity(DeviceId(0xc211)), Some(0x2_0000));
		assert!(!table.contains(DeviceId(0xbf25)));
		assert!(!table.contains(DeviceId::INVALID));
	}

	#[test]
	fn insert_replaces() {
		let mut table = IdentityTable::empty().with(DeviceId(0x1234), 0x1000);
		table.insert(DeviceId(0x1234), 0x2000);
		assert_eq!(table.len(), 1);
		assert_eq!(table.capacity(DeviceId(0x1234)), Some(0x2000));
	}

	#[test]
	#[should_panic]
	fn invalid_identity_cannot_be_mapped() {
		IdentityTable::empty().insert(DeviceId::INVALID, 0x1000);
	}

	#[test]
	fn ids_and_names() {
		let id = DeviceId(0xbf41);
		assert_eq!(id.manufacturer(), 0xbf);
		assert_eq!(id.device(), 0x41);
		assert_eq!(format!("{:?}", id), "0xbf41 (SST25VF016)");
		assert_eq!(format!("{}", id), "0xbf41");
		assert_eq!(model_by_name("sst25vf016").map(|m| m.id), Some(id));
		assert!(model_by_name("W25Q80").is_none());
	}
}
