/// Feature geometry type as encoded in the MVT `type` field.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum GeomType {
	#[default]
	Unknown,
	Point,
	LineString,
	Polygon,
}

impl From<u64> for GeomType {
	fn from(value: u64) -> Self {
		match value {
			1 => GeomType::Point,
			2 => GeomType::LineString,
			3 => GeomType::Polygon,
			_ => GeomType::Unknown,
		}
	}
}

impl GeomType {
	pub fn as_u64(self) -> u64 {
		match self {
			GeomType::Unknown => 0,
			GeomType::Point => 1,
			GeomType::LineString => 2,
			GeomType::Polygon => 3,
		}
	}
}
