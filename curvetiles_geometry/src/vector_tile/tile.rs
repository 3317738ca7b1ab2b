use super::layer::VectorTileLayer;
use anyhow::{Context, Result};
use curvetiles_core::io::{ValueReaderSlice, ValueWriterVec};

/// A decoded MVT tile: a list of named layers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VectorTile {
	pub layers: Vec<VectorTileLayer>,
}

impl VectorTile {
	pub fn new(layers: Vec<VectorTileLayer>) -> VectorTile {
		VectorTile { layers }
	}

	pub fn from_bytes(data: &[u8]) -> Result<VectorTile> {
		let mut reader = ValueReaderSlice::new(data);
		let mut tile = VectorTile::default();

		while reader.has_remaining() {
			let (field, wire_type) = reader.read_pbf_key().context("failed to read tile key")?;
			match (field, wire_type) {
				(3, 2) => {
					let mut sub = reader.read_pbf_sub_reader().context("failed to read layer message")?;
					tile
						.layers
						.push(VectorTileLayer::read(&mut sub).context("failed to decode layer")?);
				}
				_ => reader.skip_pbf_field(wire_type)?,
			}
		}

		Ok(tile)
	}

	pub fn to_bytes(&self) -> Vec<u8> {
		let mut writer = ValueWriterVec::new();
		for layer in &self.layers {
			writer.write_pbf_key(3, 2);
			writer.write_pbf_bytes(&layer.to_bytes());
		}
		writer.into_vec()
	}

	pub fn find_layer(&self, name: &str) -> Option<&VectorTileLayer> {
		self.layers.iter().find(|layer| layer.name == name)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::vector_tile::{GeomType, TileValue, VectorTileFeature};
	use pretty_assertions::assert_eq;

	fn example_tile() -> VectorTile {
		let mut roads = VectorTileLayer::new("roads");
		roads.add_feature(
			VectorTileFeature::from_lines(Some(1), vec![], GeomType::LineString, &[vec![(0, 0), (4095, 4095)]]),
			&[("Name", TileValue::from("NF-73"))],
		);
		let water = VectorTileLayer::new("water");
		VectorTile::new(vec![roads, water])
	}

	#[test]
	fn tile_round_trip() {
		let tile = example_tile();
		let decoded = VectorTile::from_bytes(&tile.to_bytes()).unwrap();
		assert_eq!(decoded, tile);
	}

	#[test]
	fn find_layer_by_name() {
		let tile = example_tile();
		assert!(tile.find_layer("roads").is_some());
		assert!(tile.find_layer("water").is_some());
		assert!(tile.find_layer("buildings").is_none());
	}

	#[test]
	fn empty_tile_decodes() {
		let tile = VectorTile::from_bytes(&[]).unwrap();
		assert!(tile.layers.is_empty());
	}

	#[test]
	fn garbage_is_an_error() {
		assert!(VectorTile::from_bytes(&[0xFF, 0xFF, 0xFF]).is_err());
	}
}
