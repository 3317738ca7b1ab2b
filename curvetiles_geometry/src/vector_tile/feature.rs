use super::geometry_type::GeomType;
use anyhow::{Context, Result, bail, ensure};
use curvetiles_core::io::{ValueReaderSlice, ValueWriterVec};

/// One feature inside an MVT layer. Geometry stays in its encoded form until
/// [`lines`](Self::lines) is called; bounding-box extraction only needs the
/// vertex set, not a full geometry model.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VectorTileFeature {
	pub id: Option<u64>,
	/// Alternating (key index, value index) pairs into the layer tables.
	pub tag_ids: Vec<u32>,
	pub geom_type: GeomType,
	pub geom_data: Vec<u8>,
}

impl VectorTileFeature {
	pub fn read(reader: &mut ValueReaderSlice) -> Result<VectorTileFeature> {
		let mut feature = VectorTileFeature::default();

		while reader.has_remaining() {
			let (field, wire_type) = reader.read_pbf_key().context("failed to read feature key")?;
			match (field, wire_type) {
				(1, 0) => feature.id = Some(reader.read_varint().context("failed to read feature id")?),
				(2, 2) => feature.tag_ids = reader.read_pbf_packed_u32().context("failed to read feature tags")?,
				(3, 0) => feature.geom_type = GeomType::from(reader.read_varint().context("failed to read geometry type")?),
				(4, 2) => feature.geom_data = reader.read_pbf_bytes().context("failed to read geometry data")?,
				_ => reader.skip_pbf_field(wire_type)?,
			}
		}

		Ok(feature)
	}

	pub fn to_bytes(&self) -> Vec<u8> {
		let mut writer = ValueWriterVec::new();

		if let Some(id) = self.id {
			writer.write_pbf_key(1, 0);
			writer.write_varint(id);
		}
		if !self.tag_ids.is_empty() {
			writer.write_pbf_key(2, 2);
			writer.write_pbf_packed_u32(&self.tag_ids);
		}
		writer.write_pbf_key(3, 0);
		writer.write_varint(self.geom_type.as_u64());
		if !self.geom_data.is_empty() {
			writer.write_pbf_key(4, 2);
			writer.write_pbf_bytes(&self.geom_data);
		}

		writer.into_vec()
	}

	/// Decodes the geometry commands into line sequences in tile space.
	///
	/// MoveTo starts a new line, LineTo extends it, ClosePath repeats the
	/// first point (rings arrive as closed lines). Points come back as
	/// one-element lines, which downstream bounding-box code handles as
	/// degenerate extents.
	pub fn lines(&self) -> Result<Vec<Vec<(i64, i64)>>> {
		// https://github.com/mapbox/vector-tile-spec/blob/master/2.1/README.md#43-geometry-encoding
		let mut reader = ValueReaderSlice::new(&self.geom_data);

		let mut lines: Vec<Vec<(i64, i64)>> = Vec::new();
		let mut line: Vec<(i64, i64)> = Vec::new();
		let mut x = 0i64;
		let mut y = 0i64;

		while reader.has_remaining() {
			let value = reader.read_varint().context("failed to read geometry command")?;
			let command = value & 0x7;
			let count = value >> 3;

			match command {
				1 | 2 => {
					for _ in 0..count {
						if command == 1 && !line.is_empty() {
							// MoveTo starts a new line sequence
							lines.push(std::mem::take(&mut line));
						}
						x += reader.read_svarint().context("failed to read x delta")?;
						y += reader.read_svarint().context("failed to read y delta")?;
						line.push((x, y));
					}
				}
				7 => {
					ensure!(!line.is_empty(), "ClosePath on an empty line");
					line.push(line[0]);
				}
				_ => bail!("unknown geometry command {command}"),
			}
		}

		if !line.is_empty() {
			lines.push(line);
		}

		Ok(lines)
	}

	/// Every vertex of the feature, across all its lines.
	pub fn vertices(&self) -> Result<Vec<(i64, i64)>> {
		Ok(self.lines()?.into_iter().flatten().collect())
	}

	/// Encodes line sequences back into geometry commands. Used by tests and
	/// fixtures that build synthetic tiles.
	pub fn from_lines(
		id: Option<u64>,
		tag_ids: Vec<u32>,
		geom_type: GeomType,
		lines: &[Vec<(i64, i64)>],
	) -> VectorTileFeature {
		let mut writer = ValueWriterVec::new();
		let mut previous = (0i64, 0i64);

		for line in lines {
			if line.is_empty() {
				continue;
			}
			writer.write_varint(1 << 3 | 0x1); // MoveTo, count 1
			writer.write_svarint(line[0].0 - previous.0);
			writer.write_svarint(line[0].1 - previous.1);
			previous = line[0];

			if line.len() > 1 {
				writer.write_varint(((line.len() - 1) as u64) << 3 | 0x2); // LineTo
				for point in &line[1..] {
					writer.write_svarint(point.0 - previous.0);
					writer.write_svarint(point.1 - previous.1);
					previous = *point;
				}
			}
		}

		VectorTileFeature {
			id,
			tag_ids,
			geom_type,
			geom_data: writer.into_vec(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn line_round_trip() {
		let lines = vec![vec![(0, 1), (0, 3), (5, 3)]];
		let feature = VectorTileFeature::from_lines(None, vec![], GeomType::LineString, &lines);
		assert_eq!(feature.lines().unwrap(), lines);
	}

	#[test]
	fn multi_line_round_trip() {
		let lines = vec![vec![(0, 0), (10, 0), (10, 10)], vec![(100, 100), (120, 140)]];
		let feature = VectorTileFeature::from_lines(Some(7), vec![0, 0], GeomType::LineString, &lines);
		assert_eq!(feature.lines().unwrap(), lines);
		assert_eq!(feature.id, Some(7));
	}

	#[test]
	fn single_point_round_trip() {
		let lines = vec![vec![(2048, 2048)]];
		let feature = VectorTileFeature::from_lines(None, vec![], GeomType::Point, &lines);
		assert_eq!(feature.vertices().unwrap(), vec![(2048, 2048)]);
	}

	#[test]
	fn feature_message_round_trip() {
		let feature = VectorTileFeature::from_lines(
			Some(42),
			vec![0, 1, 2, 3],
			GeomType::LineString,
			&[vec![(0, 0), (100, 200)]],
		);
		let bytes = feature.to_bytes();
		let mut reader = ValueReaderSlice::new(&bytes);
		let decoded = VectorTileFeature::read(&mut reader).unwrap();
		assert_eq!(decoded, feature);
	}

	#[test]
	fn negative_deltas_survive() {
		let lines = vec![vec![(4000, 4000), (100, 50), (2000, 3000)]];
		let feature = VectorTileFeature::from_lines(None, vec![], GeomType::LineString, &lines);
		assert_eq!(feature.lines().unwrap(), lines);
	}

	#[test]
	fn unknown_command_is_an_error() {
		let feature = VectorTileFeature {
			geom_data: vec![0x03], // command 3, count 0
			..Default::default()
		};
		assert!(feature.lines().is_err());
	}
}
