use anyhow::{Context, Result, bail, ensure};
use byteorder::{ByteOrder, LE};

/// Reads values from a byte slice: varints, zigzag svarints, floats and the
/// protobuf framing primitives (keys, length-delimited fields, packed ints).
pub struct ValueReaderSlice<'a> {
	data: &'a [u8],
	position: usize,
}

impl<'a> ValueReaderSlice<'a> {
	pub fn new(data: &'a [u8]) -> ValueReaderSlice<'a> {
		ValueReaderSlice { data, position: 0 }
	}

	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	pub fn position(&self) -> usize {
		self.position
	}

	pub fn has_remaining(&self) -> bool {
		self.position < self.data.len()
	}

	fn take(&mut self, length: usize) -> Result<&'a [u8]> {
		ensure!(
			self.position + length <= self.data.len(),
			"read of {length} bytes at offset {} overruns buffer of {}",
			self.position,
			self.data.len()
		);
		let slice = &self.data[self.position..self.position + length];
		self.position += length;
		Ok(slice)
	}

	pub fn read_u8(&mut self) -> Result<u8> {
		Ok(self.take(1)?[0])
	}

	/// Reads a variable-length unsigned integer.
	pub fn read_varint(&mut self) -> Result<u64> {
		let mut value = 0u64;
		let mut shift = 0;
		loop {
			let byte = self.read_u8().context("truncated varint")?;
			value |= (u64::from(byte) & 0x7F) << shift;
			if byte & 0x80 == 0 {
				break;
			}
			shift += 7;
			if shift >= 70 {
				bail!("varint too long");
			}
		}
		Ok(value)
	}

	/// Reads a zigzag-encoded signed integer.
	pub fn read_svarint(&mut self) -> Result<i64> {
		let value = self.read_varint()? as i64;
		Ok((value >> 1) ^ -(value & 1))
	}

	pub fn read_f32(&mut self) -> Result<f32> {
		Ok(LE::read_f32(self.take(4)?))
	}

	pub fn read_f64(&mut self) -> Result<f64> {
		Ok(LE::read_f64(self.take(8)?))
	}

	/// Reads a protobuf key, returning `(field_number, wire_type)`.
	pub fn read_pbf_key(&mut self) -> Result<(u32, u8)> {
		let value = self.read_varint().context("failed to read pbf key")?;
		Ok(((value >> 3) as u32, (value & 0x07) as u8))
	}

	pub fn read_pbf_string(&mut self) -> Result<String> {
		let length = self.read_varint().context("failed to read string length")? as usize;
		Ok(String::from_utf8(self.take(length)?.to_vec())?)
	}

	pub fn read_pbf_bytes(&mut self) -> Result<Vec<u8>> {
		let length = self.read_varint().context("failed to read bytes length")? as usize;
		Ok(self.take(length)?.to_vec())
	}

	/// Returns a reader over the next length-delimited field.
	pub fn read_pbf_sub_reader(&mut self) -> Result<ValueReaderSlice<'a>> {
		let length = self.read_varint().context("failed to read message length")? as usize;
		Ok(ValueReaderSlice::new(self.take(length)?))
	}

	/// Reads a packed repeated uint32 field.
	pub fn read_pbf_packed_u32(&mut self) -> Result<Vec<u32>> {
		let mut sub = self.read_pbf_sub_reader().context("failed to read packed field")?;
		let mut values = Vec::new();
		while sub.has_remaining() {
			values.push(sub.read_varint()? as u32);
		}
		Ok(values)
	}

	/// Skips one field of the given wire type, for forward compatibility
	/// with fields this decoder does not know.
	pub fn skip_pbf_field(&mut self, wire_type: u8) -> Result<()> {
		match wire_type {
			0 => {
				self.read_varint()?;
			}
			1 => {
				self.take(8)?;
			}
			2 => {
				let length = self.read_varint()? as usize;
				self.take(length)?;
			}
			5 => {
				self.take(4)?;
			}
			_ => bail!("cannot skip unsupported wire type {wire_type}"),
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn read_varint() {
		let mut reader = ValueReaderSlice::new(&[0xAC, 0x02]);
		assert_eq!(reader.read_varint().unwrap(), 300);
		assert!(!reader.has_remaining());
	}

	#[test]
	fn read_varint_rejects_overlong() {
		let data = [0xFF; 11];
		let mut reader = ValueReaderSlice::new(&data);
		assert!(reader.read_varint().is_err());
	}

	#[test]
	fn read_svarint_zigzag() {
		let mut reader = ValueReaderSlice::new(&[0x96, 0x01]);
		assert_eq!(reader.read_svarint().unwrap(), 75);
		let mut reader = ValueReaderSlice::new(&[0x95, 0x01]);
		assert_eq!(reader.read_svarint().unwrap(), -75);
	}

	#[test]
	fn read_floats() {
		let mut reader = ValueReaderSlice::new(&[0, 0, 0x80, 0x3F]);
		assert_eq!(reader.read_f32().unwrap(), 1.0);
		let mut reader = ValueReaderSlice::new(&[0, 0, 0, 0, 0, 0, 0xF0, 0x3F]);
		assert_eq!(reader.read_f64().unwrap(), 1.0);
	}

	#[test]
	fn read_pbf_key_splits_field_and_wire_type() {
		let mut reader = ValueReaderSlice::new(&[0x1A]);
		assert_eq!(reader.read_pbf_key().unwrap(), (3, 2));
	}

	#[test]
	fn read_pbf_string_and_bytes() {
		let mut reader = ValueReaderSlice::new(&[0x05, b'h', b'e', b'l', b'l', b'o']);
		assert_eq!(reader.read_pbf_string().unwrap(), "hello");

		let mut reader = ValueReaderSlice::new(&[0x03, 1, 2, 3]);
		assert_eq!(reader.read_pbf_bytes().unwrap(), vec![1, 2, 3]);
	}

	#[test]
	fn read_packed_u32() {
		let mut reader = ValueReaderSlice::new(&[0x05, 0x64, 0x96, 0x01, 0xAC, 0x02]);
		assert_eq!(reader.read_pbf_packed_u32().unwrap(), vec![100, 150, 300]);
	}

	#[test]
	fn sub_reader_is_bounded() {
		let mut reader = ValueReaderSlice::new(&[0x02, 0x0A, 0x0B, 0xFF]);
		let mut sub = reader.read_pbf_sub_reader().unwrap();
		assert_eq!(sub.read_u8().unwrap(), 0x0A);
		assert_eq!(sub.read_u8().unwrap(), 0x0B);
		assert!(!sub.has_remaining());
		assert_eq!(reader.read_u8().unwrap(), 0xFF);
	}

	#[test]
	fn truncated_read_is_an_error() {
		let mut reader = ValueReaderSlice::new(&[0x05, b'h', b'i']);
		assert!(reader.read_pbf_string().is_err());
	}

	#[test]
	fn skip_field_by_wire_type() {
		let mut reader = ValueReaderSlice::new(&[0x96, 0x01, 0x02, 0xAA, 0xBB, 0x42]);
		reader.skip_pbf_field(0).unwrap();
		reader.skip_pbf_field(2).unwrap();
		assert_eq!(reader.read_u8().unwrap(), 0x42);
		assert!(reader.skip_pbf_field(3).is_err());
	}
}
