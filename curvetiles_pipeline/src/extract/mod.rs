//! Bounding-box extraction: decodes every tile of a regional pyramid,
//! projects the `roads` layer back to geographic coordinates and unions
//! per-road bounding boxes across tiles. Progress is checkpointed so an
//! interrupted run resumes instead of restarting.

mod checkpoint;

pub use checkpoint::CheckpointStore;

use crate::error::{Cancelled, IntegrityViolation, is_integrity_violation};
use crate::walk::enumerate_tiles;
use anyhow::{Context, Result, bail};
use curvetiles_core::{CancellationToken, ExtractionProgress, GeoBBox, RoadBounds, TileCoord};
use curvetiles_geometry::VectorTile;
use std::{collections::BTreeMap, fs, path::Path};

/// Layer the cutter writes road features into.
const ROADS_LAYER: &str = "roads";

/// Log (and checkpoint) cadence, in tiles.
const PROGRESS_INTERVAL: u64 = 500;

/// More all-zero boxes than this means the projection is broken, not the data.
const MAX_ZERO_BBOX_ROADS: u64 = 100;

/// Accumulates per-road bounding boxes across the tiles of one region.
pub struct BboxAggregator {
	region: String,
	roads: BTreeMap<String, RoadBounds>,
	zero_bbox_roads: u64,
}

impl BboxAggregator {
	pub fn new(region: &str) -> BboxAggregator {
		BboxAggregator {
			region: region.to_string(),
			roads: BTreeMap::new(),
			zero_bbox_roads: 0,
		}
	}

	/// Rehydrates the aggregator from a checkpointed partial road list.
	pub fn from_roads(region: &str, roads: Vec<RoadBounds>) -> BboxAggregator {
		BboxAggregator {
			region: region.to_string(),
			roads: roads.into_iter().map(|road| (road.road_id.clone(), road)).collect(),
			zero_bbox_roads: 0,
		}
	}

	pub fn road_count(&self) -> u64 {
		self.roads.len() as u64
	}

	/// Sorted road list; ordering is stable so the roads file is byte-stable.
	pub fn into_roads(self) -> Vec<RoadBounds> {
		self.roads.into_values().collect()
	}

	/// Cloned road list for periodic checkpoints.
	fn road_snapshot(&self) -> Vec<RoadBounds> {
		self.roads.values().cloned().collect()
	}

	/// Decodes one tile and folds its road features into the aggregate.
	pub fn process_tile(&mut self, coord: TileCoord, data: &[u8]) -> Result<()> {
		let tile = VectorTile::from_bytes(data).with_context(|| format!("failed to decode tile {coord}"))?;
		let Some(layer) = tile.find_layer(ROADS_LAYER) else {
			return Ok(());
		};
		let extent = f64::from(layer.extent);

		for (index, feature) in layer.features.iter().enumerate() {
			let road_id = match layer.feature_property(feature, "Name").and_then(|v| v.as_property_string()) {
				Some(name) if !name.is_empty() => format!("{}_{name}", self.region),
				_ => match feature.id {
					Some(id) => format!("{}_{id}", self.region),
					None => format!("{}_road_{}_{}_{}_{index}", self.region, coord.z, coord.x, coord.y),
				},
			};
			let curvature = layer
				.feature_property(feature, "curvature")
				.and_then(|v| v.as_property_string());

			let vertices = feature
				.vertices()
				.with_context(|| format!("bad geometry in tile {coord}, feature {index}"))?;
			let Some(bbox) = GeoBBox::from_points(
				vertices
					.iter()
					.map(|(tx, ty)| coord.project(*tx as f64, *ty as f64, extent)),
			) else {
				continue;
			};

			// Zero is a valid coordinate; only an all-zero box is impossible
			// for a real polyline.
			if bbox.is_all_zero() {
				self.zero_bbox_roads += 1;
				if self.zero_bbox_roads > MAX_ZERO_BBOX_ROADS {
					return Err(anyhow::Error::new(IntegrityViolation(format!(
						"{} roads with all-zero bounding boxes; the tile projection is broken",
						self.zero_bbox_roads
					))));
				}
				continue;
			}

			self
				.roads
				.entry(road_id)
				.and_modify(|road| {
					road.bbox.extend(&bbox);
					if road.curvature.is_none() {
						road.curvature = curvature.clone();
					}
				})
				.or_insert_with_key(|key| {
					let mut road = RoadBounds::new(key.clone(), self.region.clone(), bbox);
					road.curvature = curvature.clone();
					road
				});
		}
		Ok(())
	}
}

#[derive(Debug)]
pub struct ExtractReport {
	pub roads: Vec<RoadBounds>,
	pub total_tiles: u64,
	pub processed_tiles: u64,
	pub resumed: bool,
}

/// Runs extraction over a pyramid, checkpointing through `store`.
///
/// CPU-bound; the cancellation token is checked between tiles, and progress
/// is written before returning [`Cancelled`] so the next run resumes.
pub fn extract_roads(
	pyramid: &Path,
	region: &str,
	store: &CheckpointStore,
	cancel: &CancellationToken,
) -> Result<ExtractReport> {
	let tiles = enumerate_tiles(pyramid)?;
	let total_tiles = tiles.len() as u64;

	let mut aggregator = BboxAggregator::new(region);
	let mut start_index = 0usize;
	let mut resumed = false;

	if let Some((previous, roads)) = store.load()? {
		if let Some(position) = tiles
			.iter()
			.position(|(coord, _)| coord.to_string() == previous.last_processed_tile)
		{
			start_index = position + 1;
			aggregator = BboxAggregator::from_roads(region, roads);
			resumed = true;
			log::info!(
				"resuming extraction for {region}: processed={} roads={}",
				previous.processed_tiles,
				aggregator.road_count()
			);
		} else {
			log::warn!(
				"checkpoint for {region} references unknown tile {:?}; starting over",
				previous.last_processed_tile
			);
		}
	}

	let mut progress = ExtractionProgress::new(total_tiles);
	progress.processed_tiles = start_index as u64;

	let mut decoded = 0u64;
	let mut failed = 0u64;

	for (coord, path) in &tiles[start_index..] {
		if cancel.is_cancelled() {
			progress.extracted_roads = aggregator.road_count();
			progress.status = "cancelled".to_string();
			store.save(&progress, &aggregator.into_roads())?;
			return Err(anyhow::Error::new(Cancelled)).context("extraction interrupted");
		}

		let data = fs::read(path).with_context(|| format!("failed to read tile {path:?}"))?;
		match aggregator.process_tile(*coord, &data) {
			Ok(()) => decoded += 1,
			Err(error) if is_integrity_violation(&error) => return Err(error),
			Err(error) => {
				failed += 1;
				log::warn!("skipping undecodable tile {coord}: {error:#}");
			}
		}

		progress.processed_tiles += 1;
		progress.last_processed_tile = coord.to_string();

		if progress.processed_tiles % PROGRESS_INTERVAL == 0 {
			progress.extracted_roads = aggregator.road_count();
			log::info!(
				"extraction progress for {region}: {}/{total_tiles} tiles, {} roads",
				progress.processed_tiles,
				progress.extracted_roads
			);
			store.save(&progress, &aggregator.road_snapshot())?;
		}
	}

	if total_tiles > 0 && decoded == 0 && start_index == 0 {
		bail!("no tile in {pyramid:?} could be decoded ({failed} failures)");
	}

	progress.extracted_roads = aggregator.road_count();
	progress.status = "complete".to_string();
	let roads = aggregator.into_roads();
	store.save(&progress, &roads)?;

	log::info!("extracted {} roads from {total_tiles} tiles for {region}", roads.len());
	Ok(ExtractReport {
		roads,
		total_tiles,
		processed_tiles: progress.processed_tiles,
		resumed,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use curvetiles_geometry::vector_tile::{GeomType, TileValue, VectorTileFeature, VectorTileLayer};
	use pretty_assertions::assert_eq;

	fn tile_bytes(roads: &[(&str, Option<&str>, Vec<(i64, i64)>)]) -> Vec<u8> {
		let mut layer = VectorTileLayer::new(ROADS_LAYER);
		for (name, curvature, line) in roads {
			let mut properties: Vec<(&str, TileValue)> = vec![("Name", TileValue::from(*name))];
			if let Some(curvature) = curvature {
				properties.push(("curvature", TileValue::from(*curvature)));
			}
			layer.add_feature(
				VectorTileFeature::from_lines(None, vec![], GeomType::LineString, &[line.clone()]),
				&properties,
			);
		}
		VectorTile::new(vec![layer]).to_bytes()
	}

	#[test]
	fn single_tile_produces_valid_boxes() {
		let coord = TileCoord::new(5, 10, 20).unwrap();
		let mut aggregator = BboxAggregator::new("oregon");
		aggregator
			.process_tile(
				coord,
				&tile_bytes(&[("NF-73", Some("1445"), vec![(0, 0), (4095, 4095)])]),
			)
			.unwrap();

		let roads = aggregator.into_roads();
		assert_eq!(roads.len(), 1);
		let road = &roads[0];
		assert_eq!(road.road_id, "oregon_NF-73");
		assert_eq!(road.curvature.as_deref(), Some("1445"));
		road.bbox.validate().unwrap();
		assert!(road.bbox.max_lat > road.bbox.min_lat);
		assert!(road.bbox.max_lng > road.bbox.min_lng);
	}

	#[test]
	fn road_spanning_two_tiles_is_unioned() {
		// The same road appears in two horizontally adjacent tiles; the
		// union must cover both partial boxes.
		let left = TileCoord::new(5, 10, 20).unwrap();
		let right = TileCoord::new(5, 11, 20).unwrap();
		let mut aggregator = BboxAggregator::new("oregon");
		aggregator
			.process_tile(left, &tile_bytes(&[("NF-73", None, vec![(2000, 2000), (4095, 2000)])]))
			.unwrap();
		aggregator
			.process_tile(right, &tile_bytes(&[("NF-73", None, vec![(0, 2000), (2000, 2000)])]))
			.unwrap();

		let roads = aggregator.into_roads();
		assert_eq!(roads.len(), 1);
		let bbox = roads[0].bbox;

		let (_, expected_min_lng) = left.project(2000.0, 2000.0, 4096.0);
		let (_, expected_max_lng) = right.project(2000.0, 2000.0, 4096.0);
		assert!((bbox.min_lng - expected_min_lng).abs() < 1e-9);
		assert!((bbox.max_lng - expected_max_lng).abs() < 1e-9);
	}

	#[test]
	fn feature_without_name_falls_back_to_id_then_position() {
		let coord = TileCoord::new(5, 10, 20).unwrap();
		let mut layer = VectorTileLayer::new(ROADS_LAYER);
		layer.add_feature(
			VectorTileFeature::from_lines(Some(99), vec![], GeomType::LineString, &[vec![(0, 0), (10, 10)]]),
			&[],
		);
		layer.add_feature(
			VectorTileFeature::from_lines(None, vec![], GeomType::LineString, &[vec![(100, 100), (200, 200)]]),
			&[],
		);
		let data = VectorTile::new(vec![layer]).to_bytes();

		let mut aggregator = BboxAggregator::new("oregon");
		aggregator.process_tile(coord, &data).unwrap();
		let ids: Vec<String> = aggregator.into_roads().into_iter().map(|r| r.road_id).collect();
		assert_eq!(ids, ["oregon_99", "oregon_road_5_10_20_1"]);
	}

	#[test]
	fn equator_latitudes_are_accepted() {
		// Tile (1,1,1) has the equator as its top edge: ty=0 projects to
		// exactly lat 0 there.
		let coord = TileCoord::new(1, 1, 1).unwrap();
		let mut aggregator = BboxAggregator::new("kenya");
		aggregator
			.process_tile(coord, &tile_bytes(&[("Equator Hwy", None, vec![(1000, 0), (3000, 0)])]))
			.unwrap();

		let roads = aggregator.into_roads();
		assert_eq!(roads.len(), 1);
		assert_eq!(roads[0].bbox.min_lat, 0.0);
		assert_eq!(roads[0].bbox.max_lat, 0.0);
		assert!(roads[0].bbox.min_lng > 0.0);
	}

	#[test]
	fn single_vertex_yields_degenerate_bbox() {
		let coord = TileCoord::new(5, 10, 20).unwrap();
		let mut layer = VectorTileLayer::new(ROADS_LAYER);
		layer.add_feature(
			VectorTileFeature::from_lines(None, vec![], GeomType::Point, &[vec![(2048, 2048)]]),
			&[("Name", TileValue::from("Dot"))],
		);
		let data = VectorTile::new(vec![layer]).to_bytes();

		let mut aggregator = BboxAggregator::new("oregon");
		aggregator.process_tile(coord, &data).unwrap();
		let roads = aggregator.into_roads();
		assert_eq!(roads[0].bbox.min_lat, roads[0].bbox.max_lat);
		assert_eq!(roads[0].bbox.min_lng, roads[0].bbox.max_lng);
	}

	#[test]
	fn tiles_without_roads_layer_are_skipped() {
		let coord = TileCoord::new(5, 10, 20).unwrap();
		let layer = VectorTileLayer::new("water");
		let data = VectorTile::new(vec![layer]).to_bytes();

		let mut aggregator = BboxAggregator::new("oregon");
		aggregator.process_tile(coord, &data).unwrap();
		assert_eq!(aggregator.road_count(), 0);
	}

	#[test]
	fn numeric_curvature_becomes_a_string() {
		let coord = TileCoord::new(5, 10, 20).unwrap();
		let mut layer = VectorTileLayer::new(ROADS_LAYER);
		layer.add_feature(
			VectorTileFeature::from_lines(None, vec![], GeomType::LineString, &[vec![(0, 0), (10, 10)]]),
			&[("Name", TileValue::from("R")), ("curvature", TileValue::UInt(892))],
		);
		let data = VectorTile::new(vec![layer]).to_bytes();

		let mut aggregator = BboxAggregator::new("oregon");
		aggregator.process_tile(coord, &data).unwrap();
		assert_eq!(aggregator.into_roads()[0].curvature.as_deref(), Some("892"));
	}

	mod driver {
		use super::*;
		use crate::walk::test_support::write_test_tile;
		use pretty_assertions::assert_eq;
		use std::path::Path;

		fn build_pyramid(root: &Path, tiles: u32) -> Vec<TileCoord> {
			let mut coords = Vec::new();
			for index in 0..tiles {
				let coord = TileCoord::new(8, index % 16, index / 16).unwrap();
				write_test_tile(root, coord, &format!("road-{index}"), &[(0, 0), (100, 100)]);
				coords.push(coord);
			}
			coords
		}

		#[test]
		fn full_run_writes_complete_checkpoint() {
			let dir = tempfile::tempdir().unwrap();
			build_pyramid(dir.path(), 10);
			let store = CheckpointStore::new(dir.path(), "oregon");

			let report = extract_roads(dir.path(), "oregon", &store, &CancellationToken::new()).unwrap();
			assert_eq!(report.total_tiles, 10);
			assert_eq!(report.roads.len(), 10);
			assert!(!report.resumed);

			let (progress, roads) = store.load().unwrap().unwrap();
			assert_eq!(progress.status, "complete");
			assert_eq!(progress.processed_tiles, 10);
			assert_eq!(roads.len(), 10);
		}

		#[test]
		fn resumed_run_matches_single_shot_result() {
			let dir = tempfile::tempdir().unwrap();
			build_pyramid(dir.path(), 20);

			// Single-shot reference.
			let reference_store = CheckpointStore::new(dir.path(), "reference");
			let reference = extract_roads(dir.path(), "reference", &reference_store, &CancellationToken::new())
				.unwrap()
				.roads;

			// Simulate a crash after 7 tiles by checkpointing a partial run.
			let store = CheckpointStore::new(dir.path(), "oregon");
			let tiles = enumerate_tiles(dir.path()).unwrap();
			let mut aggregator = BboxAggregator::new("oregon");
			for (coord, path) in &tiles[..7] {
				aggregator.process_tile(*coord, &fs::read(path).unwrap()).unwrap();
			}
			let mut progress = ExtractionProgress::new(tiles.len() as u64);
			progress.processed_tiles = 7;
			progress.last_processed_tile = tiles[6].0.to_string();
			store.save(&progress, &aggregator.into_roads()).unwrap();

			let report = extract_roads(dir.path(), "oregon", &store, &CancellationToken::new()).unwrap();
			assert!(report.resumed);
			assert_eq!(report.roads.len(), reference.len());

			let road_ids: Vec<&str> = report.roads.iter().map(|r| r.road_id.as_str()).collect();
			let reference_ids: Vec<String> = reference
				.iter()
				.map(|r| r.road_id.replace("reference_", "oregon_"))
				.collect();
			assert_eq!(road_ids, reference_ids.iter().map(String::as_str).collect::<Vec<_>>());
		}

		#[test]
		fn cancellation_saves_progress_and_reports_cancelled() {
			let dir = tempfile::tempdir().unwrap();
			build_pyramid(dir.path(), 5);
			let store = CheckpointStore::new(dir.path(), "oregon");

			let cancel = CancellationToken::new();
			cancel.cancel();
			let error = extract_roads(dir.path(), "oregon", &store, &cancel).unwrap_err();
			assert!(crate::error::is_cancelled(&error));
		}

		#[test]
		fn undecodable_pyramid_is_fatal() {
			let dir = tempfile::tempdir().unwrap();
			let bad = dir.path().join("8/0/0.pbf");
			fs::create_dir_all(bad.parent().unwrap()).unwrap();
			fs::write(&bad, [0xFF, 0xFF, 0xFF]).unwrap();
			let store = CheckpointStore::new(dir.path(), "oregon");

			assert!(extract_roads(dir.path(), "oregon", &store, &CancellationToken::new()).is_err());
		}
	}
}
