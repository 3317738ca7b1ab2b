//! Integrity checks: pyramid zoom coverage, merge completeness and a
//! spot-check of uploaded objects. Each check returns a structured report
//! with an overall verdict rather than failing on first finding.

use crate::{merge::MERGED_DIR, walk};
use anyhow::Result;
use curvetiles_core::TileCoord;
use object_store::{ObjectStore, path::Path as ObjectPath};
use rand::seq::SliceRandom;
use std::{collections::HashSet, path::Path, sync::Arc};

/// How many missing merge coordinates are listed verbatim in the report.
const MAX_REPORTED_MISSING: usize = 20;

#[derive(Debug, Default)]
pub struct ZoomSummary {
	pub zoom: u8,
	pub tiles: u64,
	pub bytes: u64,
	pub min_x: u32,
	pub max_x: u32,
	pub min_y: u32,
	pub max_y: u32,
}

#[derive(Debug)]
pub struct TileDirReport {
	pub ok: bool,
	pub total_tiles: u64,
	pub total_bytes: u64,
	pub zooms: Vec<ZoomSummary>,
	pub missing_zooms: Vec<u8>,
}

/// Walks a pyramid and buckets every tile into its zoom. A zoom within
/// `min_zoom..=max_zoom` with no tiles at all is an error.
pub fn verify_tile_dir(dir: &Path, min_zoom: u8, max_zoom: u8) -> Result<TileDirReport> {
	let tiles = walk::enumerate_tiles(dir)?;

	let mut zooms: Vec<ZoomSummary> = Vec::new();
	let mut total_bytes = 0u64;
	for (coord, path) in &tiles {
		let size = std::fs::metadata(path)?.len();
		total_bytes += size;
		let summary = match zooms.iter_mut().find(|s| s.zoom == coord.z) {
			Some(summary) => summary,
			None => {
				zooms.push(ZoomSummary {
					zoom: coord.z,
					min_x: u32::MAX,
					min_y: u32::MAX,
					..ZoomSummary::default()
				});
				zooms.last_mut().unwrap()
			}
		};
		summary.tiles += 1;
		summary.bytes += size;
		summary.min_x = summary.min_x.min(coord.x);
		summary.max_x = summary.max_x.max(coord.x);
		summary.min_y = summary.min_y.min(coord.y);
		summary.max_y = summary.max_y.max(coord.y);
	}
	zooms.sort_by_key(|s| s.zoom);

	let missing_zooms: Vec<u8> = (min_zoom..=max_zoom)
		.filter(|zoom| !zooms.iter().any(|s| s.zoom == *zoom))
		.collect();

	for zoom in &missing_zooms {
		log::error!("pyramid {dir:?} has no tiles at zoom {zoom}");
	}

	Ok(TileDirReport {
		ok: missing_zooms.is_empty() && !tiles.is_empty(),
		total_tiles: tiles.len() as u64,
		total_bytes,
		zooms,
		missing_zooms,
	})
}

#[derive(Debug)]
pub struct MergeCheckReport {
	pub ok: bool,
	pub checked: u64,
	pub missing_total: u64,
	/// The first few missing coordinates, for the log.
	pub missing: Vec<TileCoord>,
	/// Merged tiles smaller than their regional counterpart. Merging should
	/// only grow tiles, so these are warnings, not errors.
	pub smaller: u64,
}

/// Asserts every tile of `regional` also exists in the merged pyramid.
pub fn verify_merge(regional: &Path, output_dir: &Path) -> Result<MergeCheckReport> {
	let merged_dir = output_dir.join(MERGED_DIR);
	let mut report = MergeCheckReport {
		ok: true,
		checked: 0,
		missing_total: 0,
		missing: Vec::new(),
		smaller: 0,
	};

	for (coord, path) in walk::enumerate_tiles(regional)? {
		report.checked += 1;
		let merged_path = merged_dir.join(coord.path_fragment());
		if !merged_path.is_file() {
			report.missing_total += 1;
			if report.missing.len() < MAX_REPORTED_MISSING {
				report.missing.push(coord);
			}
			continue;
		}
		let regional_size = std::fs::metadata(&path)?.len();
		let merged_size = std::fs::metadata(&merged_path)?.len();
		if merged_size < regional_size {
			report.smaller += 1;
			log::warn!("merged tile {coord} is smaller than its regional source ({merged_size} < {regional_size})");
		}
	}

	report.ok = report.missing_total == 0;
	Ok(report)
}

#[derive(Debug)]
pub struct UploadCheckReport {
	pub ok: bool,
	pub sampled: u64,
	pub missing: Vec<String>,
}

/// Samples up to `samples_per_zoom` tiles per zoom from the local pyramid
/// and HEADs each object key. A 404 records the key as missing; other
/// errors are logged and skipped, since transient network failures should
/// not fail the check.
pub async fn verify_upload(
	store: Arc<dyn ObjectStore>,
	dir: &Path,
	prefix: &str,
	samples_per_zoom: usize,
) -> Result<UploadCheckReport> {
	let tiles = walk::enumerate_tiles(dir)?;
	let zooms: HashSet<u8> = tiles.iter().map(|(coord, _)| coord.z).collect();

	let mut rng = rand::thread_rng();
	let mut report = UploadCheckReport {
		ok: true,
		sampled: 0,
		missing: Vec::new(),
	};

	for zoom in zooms {
		let candidates: Vec<&(TileCoord, std::path::PathBuf)> =
			tiles.iter().filter(|(coord, _)| coord.z == zoom).collect();
		for (coord, _) in candidates.choose_multiple(&mut rng, samples_per_zoom).copied() {
			let key = format!("{}/{}", prefix.trim_end_matches('/'), coord.path_fragment());
			report.sampled += 1;
			match store.head(&ObjectPath::from(key.as_str())).await {
				Ok(_) => {}
				Err(object_store::Error::NotFound { .. }) => {
					log::error!("uploaded tile missing: {key}");
					report.missing.push(key);
				}
				Err(error) => {
					log::warn!("spot-check of {key} errored (not counted as missing): {error}");
				}
			}
		}
	}

	report.ok = report.missing.is_empty();
	Ok(report)
}
