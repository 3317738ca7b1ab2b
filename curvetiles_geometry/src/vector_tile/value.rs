use anyhow::{Context, Result, anyhow};
use curvetiles_core::io::{ValueReaderSlice, ValueWriterVec};

/// A typed property value from an MVT layer's value table.
#[derive(Clone, Debug, PartialEq)]
pub enum TileValue {
	String(String),
	Float(f32),
	Double(f64),
	Int(i64),
	UInt(u64),
	Bool(bool),
}

impl TileValue {
	pub fn read(reader: &mut ValueReaderSlice) -> Result<TileValue> {
		let mut value: Option<TileValue> = None;

		while reader.has_remaining() {
			let (field, wire_type) = reader.read_pbf_key().context("failed to read value key")?;
			value = Some(match (field, wire_type) {
				(1, 2) => TileValue::String(reader.read_pbf_string().context("failed to read string value")?),
				(2, 5) => TileValue::Float(reader.read_f32().context("failed to read float value")?),
				(3, 1) => TileValue::Double(reader.read_f64().context("failed to read double value")?),
				(4, 0) => TileValue::Int(reader.read_varint().context("failed to read int value")? as i64),
				(5, 0) => TileValue::UInt(reader.read_varint().context("failed to read uint value")?),
				(6, 0) => TileValue::Int(reader.read_svarint().context("failed to read sint value")?),
				(7, 0) => TileValue::Bool(reader.read_varint().context("failed to read bool value")? != 0),
				_ => {
					reader.skip_pbf_field(wire_type)?;
					continue;
				}
			});
		}

		value.ok_or_else(|| anyhow!("empty value message"))
	}

	pub fn to_bytes(&self) -> Vec<u8> {
		let mut writer = ValueWriterVec::new();
		match self {
			TileValue::String(value) => {
				writer.write_pbf_key(1, 2);
				writer.write_pbf_string(value);
			}
			TileValue::Float(value) => {
				writer.write_pbf_key(2, 5);
				writer.write_f32(*value);
			}
			TileValue::Double(value) => {
				writer.write_pbf_key(3, 1);
				writer.write_f64(*value);
			}
			TileValue::Int(value) => {
				writer.write_pbf_key(6, 0);
				writer.write_svarint(*value);
			}
			TileValue::UInt(value) => {
				writer.write_pbf_key(5, 0);
				writer.write_varint(*value);
			}
			TileValue::Bool(value) => {
				writer.write_pbf_key(7, 0);
				writer.write_varint(u64::from(*value));
			}
		}
		writer.into_vec()
	}

	/// Renders a string or numeric value as a string; `None` for booleans.
	/// Curvature scores arrive as either form depending on the cutter.
	pub fn as_property_string(&self) -> Option<String> {
		match self {
			TileValue::String(value) => Some(value.clone()),
			TileValue::Float(value) => Some(value.to_string()),
			TileValue::Double(value) => Some(value.to_string()),
			TileValue::Int(value) => Some(value.to_string()),
			TileValue::UInt(value) => Some(value.to_string()),
			TileValue::Bool(_) => None,
		}
	}
}

impl From<&str> for TileValue {
	fn from(value: &str) -> Self {
		TileValue::String(value.to_string())
	}
}
