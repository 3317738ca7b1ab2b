use super::{feature::VectorTileFeature, value::TileValue};
use anyhow::{Context, Result, anyhow};
use curvetiles_core::io::{ValueReaderSlice, ValueWriterVec};

/// One named layer of an MVT tile, with its interned key and value tables.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VectorTileLayer {
	pub name: String,
	pub extent: u32,
	pub version: u32,
	pub keys: Vec<String>,
	pub values: Vec<TileValue>,
	pub features: Vec<VectorTileFeature>,
}

impl VectorTileLayer {
	/// An empty layer with the standard 4096 extent.
	pub fn new(name: &str) -> VectorTileLayer {
		VectorTileLayer {
			name: name.to_string(),
			extent: 4096,
			version: 2,
			keys: Vec::new(),
			values: Vec::new(),
			features: Vec::new(),
		}
	}

	pub fn read(reader: &mut ValueReaderSlice) -> Result<VectorTileLayer> {
		let mut layer = VectorTileLayer {
			name: String::new(),
			extent: 4096,
			version: 1,
			keys: Vec::new(),
			values: Vec::new(),
			features: Vec::new(),
		};
		let mut has_name = false;

		while reader.has_remaining() {
			let (field, wire_type) = reader.read_pbf_key().context("failed to read layer key")?;
			match (field, wire_type) {
				(1, 2) => {
					layer.name = reader.read_pbf_string().context("failed to read layer name")?;
					has_name = true;
				}
				(2, 2) => {
					let mut sub = reader.read_pbf_sub_reader().context("failed to read feature message")?;
					layer
						.features
						.push(VectorTileFeature::read(&mut sub).context("failed to decode feature")?);
				}
				(3, 2) => layer.keys.push(reader.read_pbf_string().context("failed to read property key")?),
				(4, 2) => {
					let mut sub = reader.read_pbf_sub_reader().context("failed to read value message")?;
					layer
						.values
						.push(TileValue::read(&mut sub).context("failed to decode property value")?);
				}
				(5, 0) => layer.extent = reader.read_varint().context("failed to read extent")? as u32,
				(15, 0) => layer.version = reader.read_varint().context("failed to read version")? as u32,
				_ => reader.skip_pbf_field(wire_type)?,
			}
		}

		if !has_name {
			return Err(anyhow!("layer is missing its name"));
		}
		Ok(layer)
	}

	pub fn to_bytes(&self) -> Vec<u8> {
		let mut writer = ValueWriterVec::new();

		writer.write_pbf_key(1, 2);
		writer.write_pbf_string(&self.name);

		for feature in &self.features {
			writer.write_pbf_key(2, 2);
			writer.write_pbf_bytes(&feature.to_bytes());
		}
		for key in &self.keys {
			writer.write_pbf_key(3, 2);
			writer.write_pbf_string(key);
		}
		for value in &self.values {
			writer.write_pbf_key(4, 2);
			writer.write_pbf_bytes(&value.to_bytes());
		}

		if self.extent != 4096 {
			writer.write_pbf_key(5, 0);
			writer.write_varint(u64::from(self.extent));
		}
		if self.version != 1 {
			writer.write_pbf_key(15, 0);
			writer.write_varint(u64::from(self.version));
		}

		writer.into_vec()
	}

	/// Looks up a feature property by key through the layer tables.
	pub fn feature_property<'a>(&'a self, feature: &VectorTileFeature, key: &str) -> Option<&'a TileValue> {
		for pair in feature.tag_ids.chunks_exact(2) {
			let key_index = pair[0] as usize;
			let value_index = pair[1] as usize;
			if self.keys.get(key_index).map(String::as_str) == Some(key) {
				return self.values.get(value_index);
			}
		}
		None
	}

	/// Adds a feature, interning its properties into the layer tables.
	pub fn add_feature(&mut self, mut feature: VectorTileFeature, properties: &[(&str, TileValue)]) {
		let mut tag_ids = Vec::with_capacity(properties.len() * 2);
		for (key, value) in properties {
			let key_index = match self.keys.iter().position(|k| k == key) {
				Some(index) => index,
				None => {
					self.keys.push((*key).to_string());
					self.keys.len() - 1
				}
			};
			let value_index = match self.values.iter().position(|v| v == value) {
				Some(index) => index,
				None => {
					self.values.push(value.clone());
					self.values.len() - 1
				}
			};
			tag_ids.push(key_index as u32);
			tag_ids.push(value_index as u32);
		}
		feature.tag_ids = tag_ids;
		self.features.push(feature);
	}
}
