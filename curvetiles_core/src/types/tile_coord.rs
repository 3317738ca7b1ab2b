//! Tile coordinates in the web-mercator scheme, plus the projection from
//! in-tile vector coordinates back to geographic latitude/longitude.

use anyhow::{Context, Result, ensure};
use std::{
	f64::consts::PI,
	fmt::{self, Debug, Display},
	path::Path,
};

/// A tile address `(z, x, y)` in the standard web-mercator scheme.
///
/// Invariants: `x, y < 2^z` and `z <= 30`.
#[derive(Eq, PartialEq, Clone, Hash, Copy)]
pub struct TileCoord {
	pub z: u8,
	pub x: u32,
	pub y: u32,
}

impl TileCoord {
	pub fn new(z: u8, x: u32, y: u32) -> Result<TileCoord> {
		ensure!(z <= 30, "zoom ({z}) must be <= 30");
		let max = 2u32.pow(u32::from(z));
		ensure!(x < max, "x ({x}) must be < 2^{z}");
		ensure!(y < max, "y ({y}) must be < 2^{z}");
		Ok(TileCoord { z, x, y })
	}

	/// Projects a point in this tile's integer space to `(lat, lng)` degrees.
	///
	/// `extent` is the tile span (4096 for standard MVT). Uses the inverse
	/// web-mercator formula; latitude is *not* linear in `ty`, so anything
	/// interpolating the tile's geographic bound drifts at high zooms.
	pub fn project(&self, tx: f64, ty: f64, extent: f64) -> (f64, f64) {
		let n = 2.0f64.powi(i32::from(self.z));
		let lng = ((f64::from(self.x) + tx / extent) / n) * 360.0 - 180.0;
		let lat_rad = (PI * (1.0 - 2.0 * (f64::from(self.y) + ty / extent) / n)).sinh().atan();
		(lat_rad * 180.0 / PI, lng)
	}

	/// Relative path of this tile inside a pyramid, e.g. `5/10/20.pbf`.
	pub fn path_fragment(&self) -> String {
		format!("{}/{}/{}.pbf", self.z, self.x, self.y)
	}
}

impl Display for TileCoord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}/{}", self.z, self.x, self.y)
	}
}

impl Debug for TileCoord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_fmt(format_args!("TileCoord({}, [{}, {}])", self.z, self.x, self.y))
	}
}

impl Ord for TileCoord {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self
			.z
			.cmp(&other.z)
			.then(self.y.cmp(&other.y))
			.then(self.x.cmp(&other.x))
	}
}

impl PartialOrd for TileCoord {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

/// Parses a tile address from the last three segments of a pyramid path.
///
/// Accepts any path ending in `<z>/<x>/<y>.pbf` where all three segments are
/// non-negative integers; everything before them is ignored.
pub fn parse_tile_path(path: &Path) -> Result<TileCoord> {
	let mut parts = path.iter().rev().map(|p| p.to_string_lossy());

	let file = parts.next().context("empty tile path")?;
	let y_str = file
		.strip_suffix(".pbf")
		.with_context(|| format!("tile file {file:?} is not a .pbf"))?;
	let x_str = parts.next().with_context(|| format!("{path:?} has no x segment"))?;
	let z_str = parts.next().with_context(|| format!("{path:?} has no z segment"))?;

	let z = z_str
		.parse::<u8>()
		.with_context(|| format!("zoom segment {z_str:?} is not an integer"))?;
	let x = x_str
		.parse::<u32>()
		.with_context(|| format!("x segment {x_str:?} is not an integer"))?;
	let y = y_str
		.parse::<u32>()
		.with_context(|| format!("y segment {y_str:?} is not an integer"))?;

	Ok(TileCoord { z, x, y })
}
