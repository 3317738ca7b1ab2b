//! The GeoJSON intermediate format handed to the tile cutter: one
//! `LineString` feature per road with length, endpoint and curvature
//! properties.

use crate::kml::KmlRoad;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Mean Earth radius in meters, as used by the upstream data.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two `[lng, lat]` points, in meters.
pub fn haversine_m(a: [f64; 2], b: [f64; 2]) -> f64 {
	let lat1 = a[1].to_radians();
	let lat2 = b[1].to_radians();
	let d_lat = (b[1] - a[1]).to_radians();
	let d_lng = (b[0] - a[0]).to_radians();

	let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
	2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Sum of haversine distances between consecutive vertices, in meters.
pub fn polyline_length_m(coordinates: &[[f64; 2]]) -> f64 {
	coordinates.windows(2).map(|pair| haversine_m(pair[0], pair[1])).sum()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoadProperties {
	#[serde(rename = "Name")]
	pub name: String,
	pub length: f64,
	#[serde(rename = "startLat")]
	pub start_lat: f64,
	#[serde(rename = "startLng")]
	pub start_lng: f64,
	#[serde(rename = "endLat")]
	pub end_lat: f64,
	#[serde(rename = "endLng")]
	pub end_lng: f64,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub curvature: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineStringGeometry {
	#[serde(rename = "type")]
	pub kind: String,
	pub coordinates: Vec<[f64; 2]>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoadFeature {
	#[serde(rename = "type")]
	pub kind: String,
	pub properties: RoadProperties,
	pub geometry: LineStringGeometry,
}

/// A GeoJSON `FeatureCollection` of road line strings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoadCollection {
	#[serde(rename = "type")]
	pub kind: String,
	pub features: Vec<RoadFeature>,
}

impl RoadFeature {
	/// Builds one feature from a parsed KML road. Every source coordinate is
	/// preserved; the caller guarantees at least one exists.
	pub fn from_kml_road(road: KmlRoad) -> RoadFeature {
		let first = road.coordinates[0];
		let last = road.coordinates[road.coordinates.len() - 1];
		RoadFeature {
			kind: "Feature".to_string(),
			properties: RoadProperties {
				name: road.name,
				length: polyline_length_m(&road.coordinates),
				start_lat: first[1],
				start_lng: first[0],
				end_lat: last[1],
				end_lng: last[0],
				curvature: road.curvature,
			},
			geometry: LineStringGeometry {
				kind: "LineString".to_string(),
				coordinates: road.coordinates,
			},
		}
	}
}

impl RoadCollection {
	pub fn from_kml_roads(roads: Vec<KmlRoad>) -> RoadCollection {
		RoadCollection {
			kind: "FeatureCollection".to_string(),
			features: roads.into_iter().map(RoadFeature::from_kml_road).collect(),
		}
	}

	/// Total vertex count across all features.
	pub fn coordinate_count(&self) -> usize {
		self.features.iter().map(|f| f.geometry.coordinates.len()).sum()
	}

	pub fn write_to(&self, path: &Path) -> Result<()> {
		let json = serde_json::to_string(self).context("failed to serialize GeoJSON")?;
		fs::write(path, json).with_context(|| format!("failed to write GeoJSON to {path:?}"))
	}
}
