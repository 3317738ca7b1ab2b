//! Core data model: tile coordinates, geographic bounding boxes, road
//! records, job state and extraction checkpoints.

mod geo_bbox;
mod job;
mod progress;
mod road;
mod tile_coord;

pub use geo_bbox::GeoBBox;
pub use job::{JobOptions, JobStatus, TileJob};
pub use progress::ExtractionProgress;
pub use road::RoadBounds;
pub use tile_coord::{TileCoord, parse_tile_path};
