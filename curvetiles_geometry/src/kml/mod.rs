//! KML parsing for the upstream curvature archives.
//!
//! The upstream data groups each physical road as a `Folder` whose
//! `Placemark` children carry the road's segments. The parser therefore
//! emits one [`KmlRoad`] per top-level folder, concatenating segment
//! coordinates in document order.

mod parser;

pub use parser::parse_kml;

/// One road, as grouped by a KML `Folder`.
#[derive(Clone, Debug, PartialEq)]
pub struct KmlRoad {
	/// The folder name; empty when the folder carries none.
	pub name: String,
	/// All placemark coordinates in document order, as `[lng, lat]`.
	pub coordinates: Vec<[f64; 2]>,
	/// Opaque curvature score scraped from a description field.
	pub curvature: Option<String>,
}
