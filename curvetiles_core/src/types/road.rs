use super::GeoBBox;
use serde::{Deserialize, Serialize};

/// One road's aggregated bounding box, the durable product of extraction.
///
/// `road_id` is always prefixed with the region (`<region>_<name>`) so that
/// regions sharing a road name ("Main St") cannot collide in the relational
/// store; the unique key there is `(roadId, region)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadBounds {
	pub road_id: String,
	pub region: String,
	#[serde(flatten)]
	pub bbox: GeoBBox,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub curvature: Option<String>,
}

impl RoadBounds {
	pub fn new(road_id: String, region: String, bbox: GeoBBox) -> RoadBounds {
		RoadBounds {
			road_id,
			region,
			bbox,
			curvature: None,
		}
	}
}
