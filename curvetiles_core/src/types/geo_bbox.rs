//! Geographic bounding boxes in WGS84 degrees.

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A rectangular area on the globe, in WGS84 degrees.
///
/// Field order matches the roads-file JSON shape. Zero is a valid value for
/// any extent (equator and prime-meridian crossings); only a box where **all
/// four** extents are exactly zero is treated as degenerate, since no real
/// polyline projects there.
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoBBox {
	pub min_lat: f64,
	pub max_lat: f64,
	pub min_lng: f64,
	pub max_lng: f64,
}

impl GeoBBox {
	/// A degenerate box around a single point. `min == max` is valid.
	pub fn from_point(lat: f64, lng: f64) -> GeoBBox {
		GeoBBox {
			min_lat: lat,
			max_lat: lat,
			min_lng: lng,
			max_lng: lng,
		}
	}

	/// Builds the bounding box of a point set. `None` for an empty set.
	pub fn from_points<I: IntoIterator<Item = (f64, f64)>>(points: I) -> Option<GeoBBox> {
		let mut iter = points.into_iter();
		let (lat, lng) = iter.next()?;
		let mut bbox = GeoBBox::from_point(lat, lng);
		for (lat, lng) in iter {
			bbox.include(lat, lng);
		}
		Some(bbox)
	}

	/// Grows the box to include a point.
	pub fn include(&mut self, lat: f64, lng: f64) {
		self.min_lat = self.min_lat.min(lat);
		self.max_lat = self.max_lat.max(lat);
		self.min_lng = self.min_lng.min(lng);
		self.max_lng = self.max_lng.max(lng);
	}

	/// Grows the box to include the area covered by `other`.
	///
	/// This is the cross-tile union: every tile carrying a segment of a road
	/// contributes a partial box in the same reference frame, so reducing
	/// with min/max yields the road's full extent.
	pub fn extend(&mut self, other: &GeoBBox) {
		self.min_lat = self.min_lat.min(other.min_lat);
		self.max_lat = self.max_lat.max(other.max_lat);
		self.min_lng = self.min_lng.min(other.min_lng);
		self.max_lng = self.max_lng.max(other.max_lng);
	}

	/// True when all four extents are exactly zero.
	pub fn is_all_zero(&self) -> bool {
		self.min_lat == 0.0 && self.max_lat == 0.0 && self.min_lng == 0.0 && self.max_lng == 0.0
	}

	pub fn validate(&self) -> Result<()> {
		ensure!(self.min_lat >= -90.0, "min_lat ({}) must be >= -90", self.min_lat);
		ensure!(self.max_lat <= 90.0, "max_lat ({}) must be <= 90", self.max_lat);
		ensure!(self.min_lng >= -180.0, "min_lng ({}) must be >= -180", self.min_lng);
		ensure!(self.max_lng <= 180.0, "max_lng ({}) must be <= 180", self.max_lng);
		ensure!(
			self.min_lat <= self.max_lat,
			"min_lat ({}) must be <= max_lat ({})",
			self.min_lat,
			self.max_lat
		);
		ensure!(
			self.min_lng <= self.max_lng,
			"min_lng ({}) must be <= max_lng ({})",
			self.min_lng,
			self.max_lng
		);
		Ok(())
	}
}

impl Debug for GeoBBox {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"GeoBBox(lat {}..{}, lng {}..{})",
			self.min_lat, self.max_lat, self.min_lng, self.max_lng
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn from_point_is_degenerate_but_valid() {
		let bbox = GeoBBox::from_point(45.5, -122.6);
		assert_eq!(bbox.min_lat, bbox.max_lat);
		assert_eq!(bbox.min_lng, bbox.max_lng);
		bbox.validate().unwrap();
		assert!(!bbox.is_all_zero());
	}

	#[test]
	fn include_grows_all_sides() {
		let mut bbox = GeoBBox::from_point(10.0, 10.0);
		bbox.include(-5.0, 20.0);
		bbox.include(12.0, -3.0);
		assert_eq!(bbox.min_lat, -5.0);
		assert_eq!(bbox.max_lat, 12.0);
		assert_eq!(bbox.min_lng, -3.0);
		assert_eq!(bbox.max_lng, 20.0);
	}

	#[test]
	fn extend_unions_partial_boxes() {
		let mut west = GeoBBox::from_points(vec![(45.0, -123.0), (45.2, -122.8)]).unwrap();
		let east = GeoBBox::from_points(vec![(45.1, -122.8), (45.3, -122.5)]).unwrap();
		west.extend(&east);
		assert_eq!(west.min_lat, 45.0);
		assert_eq!(west.max_lat, 45.3);
		assert_eq!(west.min_lng, -123.0);
		assert_eq!(west.max_lng, -122.5);
	}

	#[test]
	fn equator_crossing_is_valid() {
		// A road running along the equator has zero latitudes everywhere;
		// that must not be mistaken for a projection bug.
		let bbox = GeoBBox::from_points(vec![(0.0, 36.8), (0.0, 36.9)]).unwrap();
		bbox.validate().unwrap();
		assert!(!bbox.is_all_zero());
	}

	#[test]
	fn all_zero_detection() {
		assert!(GeoBBox::from_point(0.0, 0.0).is_all_zero());
		assert!(!GeoBBox::from_point(0.0, 0.1).is_all_zero());
	}

	#[test]
	fn validate_rejects_inverted_boxes() {
		let bbox = GeoBBox {
			min_lat: 5.0,
			max_lat: -5.0,
			min_lng: 0.0,
			max_lng: 1.0,
		};
		assert!(bbox.validate().is_err());
	}

	#[test]
	fn serde_uses_camel_case() {
		let bbox = GeoBBox::from_point(1.5, 2.5);
		let json = serde_json::to_string(&bbox).unwrap();
		assert_eq!(json, r#"{"minLat":1.5,"maxLat":1.5,"minLng":2.5,"maxLng":2.5}"#);
	}
}
