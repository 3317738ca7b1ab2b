//! KML → GeoJSON conversion: one LineString feature per road folder, with
//! length, endpoint and curvature properties.

use crate::archive::ExtractedArchive;
use anyhow::{Context, Result, ensure};
use curvetiles_geometry::{RoadCollection, kml::parse_kml};
use std::{fs, path::PathBuf};

#[derive(Debug)]
pub struct ConvertReport {
	pub geojson_path: PathBuf,
	pub roads: usize,
	pub coordinates: usize,
}

/// Converts the extracted KML into `<work_dir>/<region>.geojson`.
///
/// The output preserves every valid source coordinate; downstream
/// verification counts on `coordinates` matching the source total.
pub fn convert_region(archive: &ExtractedArchive, region: &str) -> Result<ConvertReport> {
	let xml = fs::read_to_string(&archive.kml_path)
		.with_context(|| format!("failed to read {:?}", archive.kml_path))?;

	let roads = parse_kml(&xml).with_context(|| format!("failed to parse KML for region {region:?}"))?;
	ensure!(!roads.is_empty(), "KML for region {region:?} yielded no roads");

	let collection = RoadCollection::from_kml_roads(roads);
	let coordinates = collection.coordinate_count();

	let geojson_path = archive.work_dir.join(format!("{region}.geojson"));
	collection.write_to(&geojson_path)?;

	log::info!(
		"converted region {region}: {} roads, {coordinates} coordinates",
		collection.features.len()
	);
	Ok(ConvertReport {
		geojson_path,
		roads: collection.features.len(),
		coordinates,
	})
}
