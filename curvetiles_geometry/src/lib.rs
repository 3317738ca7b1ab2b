//! Geometry handling for the curvetiles pipeline: KML parsing, the GeoJSON
//! intermediate format fed to the tile cutter, and the Mapbox Vector Tile
//! codec used to read the cutter's output back.

pub mod geojson;
pub mod kml;
pub mod vector_tile;

pub use geojson::{RoadCollection, RoadFeature, haversine_m};
pub use kml::KmlRoad;
pub use vector_tile::{VectorTile, VectorTileLayer};
