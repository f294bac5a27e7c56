/// Memory array behind an emulated chip.
pub trait Storage {
	fn len(&self) -> usize;

	fn read_byte(&self, offset: usize) -> u8;
	fn write_byte(&mut self, offset: usize, data: u8);

	fn fill(&mut self, offset: usize, len: usize, value: u8) {
		for o in offset..offset + len {
			self.write_byte(o, value);
		}
	}

	fn read_into_vec(&self) -> Vec<u8> {
		(0..self.len()).map(|o| self.read_byte(o)).collect()
	}
}

impl Storage for Vec<u8> {
	fn len(&self) -> usize {
		Vec::len(self)
	}

	fn read_byte(&self, offset: usize) -> u8 {
		self[offset]
	}

	fn write_byte(&mut self, offset: usize, data: u8) {
		self[offset] = data;
	}

	fn fill(&mut self, offset: usize, len: usize, value: u8) {
		for b in &mut self[offset..offset + len] {
			*b = value;
		}
	}

	fn read_into_vec(&self) -> Vec<u8> {
		self.clone()
	}
}

impl<'a, S: ?Sized + Storage> Storage for &'a mut S {
	fn len(&self) -> usize {
		S::len(*self)
	}

	fn read_byte(&self, offset: usize) -> u8 {
		S::read_byte(*self, offset)
	}

	fn write_byte(&mut self, offset: usize, data: u8) {
		S::write_byte(*self, offset, data)
	}

	fn fill(&mut self, offset: usize, len: usize, value: u8) {
		S::fill(*self, offset, len, value)
	}

	fn read_into_vec(&self) -> Vec<u8> {
		S::read_into_vec(*self)
	}
}
