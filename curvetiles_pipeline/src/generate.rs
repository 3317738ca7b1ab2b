//! Tile generation: drives the external tile cutter over the region's
//! GeoJSON and summarizes its output pyramid.

use crate::{subprocess::run_tool, walk::pyramid_totals};
use anyhow::{Context, Result};
use curvetiles_core::{CancellationToken, ToolsConfig, utils::format_bytes};
use std::{
	fs,
	path::{Path, PathBuf},
};
use tokio::process::Command;

/// Attribute names the cutter is told to retain. Everything else is dropped
/// at the tile level; the extractor depends on `Name` and `curvature`.
pub const TILE_ATTRIBUTES: [&str; 8] = [
	"Name", "length", "startLat", "startLng", "endLat", "endLng", "curvature", "roadId",
];

#[derive(Debug)]
pub struct GenerateReport {
	pub tile_dir: PathBuf,
	pub tiles: u64,
	pub bytes: u64,
}

/// Builds the regional pyramid at `<output_dir>/<region>`.
///
/// Any pre-existing region directory is removed first; stale tiles from a
/// prior build must never survive into a new one, so a failed removal is
/// fatal. The cutter itself decides feature dropping; this wrapper only
/// pins the flag set so builds are reproducible.
pub async fn generate_tiles(
	tools: &ToolsConfig,
	geojson: &Path,
	output_dir: &Path,
	region: &str,
	min_zoom: u8,
	max_zoom: u8,
	cancel: &CancellationToken,
) -> Result<GenerateReport> {
	let tile_dir = output_dir.join(region);
	if tile_dir.exists() {
		fs::remove_dir_all(&tile_dir)
			.with_context(|| format!("failed to remove stale tile directory {tile_dir:?}"))?;
	}
	fs::create_dir_all(output_dir).with_context(|| format!("failed to create {output_dir:?}"))?;

	let mut command = Command::new(&tools.tippecanoe);
	command
		.arg("-f")
		.arg("-e")
		.arg(&tile_dir)
		.arg("-Z")
		.arg(min_zoom.to_string())
		.arg("-z")
		.arg(max_zoom.to_string())
		.arg("-l")
		.arg("roads")
		.arg("--preserve-input-order")
		.arg("--no-tile-compression");
	for attribute in TILE_ATTRIBUTES {
		command.arg("-y").arg(attribute);
	}
	command.arg(geojson);

	log::info!("generating tiles for {region} (zooms {min_zoom}..{max_zoom})");
	run_tool(&mut command, &tools.tippecanoe, cancel)
		.await
		.with_context(|| format!("tile generation failed for region {region:?}"))?;

	let (tiles, bytes) = pyramid_totals(&tile_dir)?;
	log::info!("generated {tiles} tiles ({}) for {region}", format_bytes(bytes));

	Ok(GenerateReport { tile_dir, tiles, bytes })
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::walk::test_support::write_test_tile;
	use curvetiles_core::TileCoord;

	/// A fake cutter that records its arguments next to its output directory
	/// and emits one tile.
	fn fake_cutter(dir: &Path) -> String {
		let script = dir.join("fake-tippecanoe");
		fs::write(
			&script,
			"#!/bin/sh\necho \"$@\" > \"$2.args\"\nmkdir -p \"$2/5/10\"\nprintf tile > \"$2/5/10/20.pbf\"\n",
		)
		.unwrap();
		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
		}
		script.to_string_lossy().into_owned()
	}

	#[tokio::test]
	async fn invokes_cutter_with_pinned_flags_and_counts_output() {
		let dir = tempfile::tempdir().unwrap();

		let tools = ToolsConfig {
			tippecanoe: fake_cutter(dir.path()),
			tile_join: "tile-join".to_string(),
		};
		let geojson = dir.path().join("oregon.geojson");
		fs::write(&geojson, "{}").unwrap();
		let output_dir = dir.path().join("tiles");

		let report = generate_tiles(
			&tools,
			&geojson,
			&output_dir,
			"oregon",
			5,
			8,
			&CancellationToken::new(),
		)
		.await
		.unwrap();

		assert_eq!(report.tiles, 1);
		assert!(report.bytes > 0);
		assert_eq!(report.tile_dir, output_dir.join("oregon"));

		let args = fs::read_to_string(output_dir.join("oregon.args")).unwrap();
		assert!(args.contains("-f"));
		assert!(args.contains("-Z 5"));
		assert!(args.contains("-z 8"));
		assert!(args.contains("-l roads"));
		assert!(args.contains("--preserve-input-order"));
		assert!(args.contains("--no-tile-compression"));
		assert!(args.contains("-y Name"));
		assert!(args.contains("-y curvature"));
	}

	#[tokio::test]
	async fn stale_region_directory_is_replaced() {
		let dir = tempfile::tempdir().unwrap();
		let output_dir = dir.path().join("tiles");
		let stale = output_dir.join("oregon");
		write_test_tile(&stale, TileCoord::new(9, 100, 100).unwrap(), "old", &[(0, 0), (1, 1)]);

		let tools = ToolsConfig {
			tippecanoe: fake_cutter(dir.path()),
			tile_join: "tile-join".to_string(),
		};
		let geojson = dir.path().join("oregon.geojson");
		fs::write(&geojson, "{}").unwrap();

		let report = generate_tiles(
			&tools,
			&geojson,
			&output_dir,
			"oregon",
			5,
			8,
			&CancellationToken::new(),
		)
		.await
		.unwrap();

		// Only the freshly cut tile remains.
		assert_eq!(report.tiles, 1);
		assert!(!stale.join("9").exists());
	}

	#[tokio::test]
	async fn cutter_failure_is_fatal() {
		let dir = tempfile::tempdir().unwrap();
		let tools = ToolsConfig {
			tippecanoe: "false".to_string(),
			tile_join: "tile-join".to_string(),
		};
		let geojson = dir.path().join("r.geojson");
		fs::write(&geojson, "{}").unwrap();

		let result = generate_tiles(
			&tools,
			&geojson,
			&dir.path().join("tiles"),
			"r",
			5,
			8,
			&CancellationToken::new(),
		)
		.await;
		assert!(result.is_err());
	}
}
