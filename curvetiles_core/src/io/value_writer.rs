use byteorder::{ByteOrder, LE};

/// Writes values into a growable byte buffer, mirroring [`super::ValueReaderSlice`].
/// Used by the vector-tile encoder and by tests that build synthetic tiles.
#[derive(Default)]
pub struct ValueWriterVec {
	buffer: Vec<u8>,
}

impl ValueWriterVec {
	pub fn new() -> ValueWriterVec {
		ValueWriterVec::default()
	}

	pub fn len(&self) -> usize {
		self.buffer.len()
	}

	pub fn is_empty(&self) -> bool {
		self.buffer.is_empty()
	}

	pub fn into_vec(self) -> Vec<u8> {
		self.buffer
	}

	pub fn write_u8(&mut self, value: u8) {
		self.buffer.push(value);
	}

	pub fn write_varint(&mut self, mut value: u64) {
		loop {
			let mut byte = (value & 0x7F) as u8;
			value >>= 7;
			if value != 0 {
				byte |= 0x80;
			}
			self.buffer.push(byte);
			if value == 0 {
				break;
			}
		}
	}

	pub fn write_svarint(&mut self, value: i64) {
		self.write_varint(((value << 1) ^ (value >> 63)) as u64);
	}

	pub fn write_f32(&mut self, value: f32) {
		let mut bytes = [0u8; 4];
		LE::write_f32(&mut bytes, value);
		self.buffer.extend_from_slice(&bytes);
	}

	pub fn write_f64(&mut self, value: f64) {
		let mut bytes = [0u8; 8];
		LE::write_f64(&mut bytes, value);
		self.buffer.extend_from_slice(&bytes);
	}

	pub fn write_pbf_key(&mut self, field_number: u32, wire_type: u8) {
		self.write_varint((u64::from(field_number) << 3) | u64::from(wire_type));
	}

	pub fn write_pbf_string(&mut self, value: &str) {
		self.write_varint(value.len() as u64);
		self.buffer.extend_from_slice(value.as_bytes());
	}

	pub fn write_pbf_bytes(&mut self, value: &[u8]) {
		self.write_varint(value.len() as u64);
		self.buffer.extend_from_slice(value);
	}

	pub fn write_pbf_packed_u32(&mut self, values: &[u32]) {
		let mut packed = ValueWriterVec::new();
		for value in values {
			packed.write_varint(u64::from(*value));
		}
		self.write_pbf_bytes(&packed.into_vec());
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::io::ValueReaderSlice;

	#[test]
	fn varint_round_trip() {
		let mut writer = ValueWriterVec::new();
		writer.write_varint(300);
		let data = writer.into_vec();
		assert_eq!(data, vec![0xAC, 0x02]);
		assert_eq!(ValueReaderSlice::new(&data).read_varint().unwrap(), 300);
	}

	#[test]
	fn svarint_round_trip() {
		for value in [0i64, 1, -1, 75, -75, i64::MAX, i64::MIN] {
			let mut writer = ValueWriterVec::new();
			writer.write_svarint(value);
			let data = writer.into_vec();
			assert_eq!(ValueReaderSlice::new(&data).read_svarint().unwrap(), value, "value {value}");
		}
	}

	#[test]
	fn pbf_framing_round_trip() {
		let mut writer = ValueWriterVec::new();
		writer.write_pbf_key(3, 2);
		writer.write_pbf_string("roads");
		writer.write_pbf_key(5, 0);
		writer.write_varint(4096);

		let data = writer.into_vec();
		let mut reader = ValueReaderSlice::new(&data);
		assert_eq!(reader.read_pbf_key().unwrap(), (3, 2));
		assert_eq!(reader.read_pbf_string().unwrap(), "roads");
		assert_eq!(reader.read_pbf_key().unwrap(), (5, 0));
		assert_eq!(reader.read_varint().unwrap(), 4096);
	}

	#[test]
	fn packed_u32_round_trip() {
		let mut writer = ValueWriterVec::new();
		writer.write_pbf_packed_u32(&[100, 150, 300]);
		let data = writer.into_vec();
		assert_eq!(
			ValueReaderSlice::new(&data).read_pbf_packed_u32().unwrap(),
			vec![100, 150, 300]
		);
	}
}
