//! Mapbox Vector Tile (MVT) support.
//!
//! Implements the protobuf wire format for MVT tiles: decoding the tiles the
//! cutter emits (the pipeline's bounding-box extraction reads these) and
//! enough encoding to build synthetic tiles in tests.

mod feature;
mod geometry_type;
mod layer;
mod tile;
mod value;

pub use feature::VectorTileFeature;
pub use geometry_type::GeomType;
pub use layer::VectorTileLayer;
pub use tile::VectorTile;
pub use value::TileValue;
