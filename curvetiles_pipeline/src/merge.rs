//! Regional pyramid discovery and the cross-region merge.
//!
//! Merges are globally serialized by convention: the `merged` directory is a
//! shared resource and this process never schedules two merges in parallel.

use crate::{subprocess::run_tool, walk};
use anyhow::{Context, Result, ensure};
use curvetiles_core::{CancellationToken, TileCoord, ToolsConfig, parse_tile_path, utils::format_bytes};
use std::{
	collections::HashSet,
	fs,
	path::{Path, PathBuf},
};
use tokio::process::Command;

/// Name of the cross-region output directory; never a region itself.
pub const MERGED_DIR: &str = "merged";

#[derive(Debug)]
pub struct MergeOutput {
	pub merged_dir: PathBuf,
	pub inputs: Vec<String>,
	pub tiles: u64,
	pub bytes: u64,
}

/// True when `dir` looks like a regional pyramid: named like a region (not
/// `merged`, not numeric, not hidden) and containing at least one zoom level.
fn is_region_pyramid(dir: &Path) -> bool {
	let Some(name) = dir.file_name().map(|n| n.to_string_lossy()) else {
		return false;
	};
	if name == MERGED_DIR || name.starts_with('.') || name.parse::<u64>().is_ok() {
		return false;
	}
	walk::numeric_zoom_dirs(dir).map(|zooms| !zooms.is_empty()).unwrap_or(false)
}

/// Lists the regional pyramids under the output directory.
pub fn discover_pyramids(output_dir: &Path) -> Result<Vec<String>> {
	let mut regions = Vec::new();
	for entry in fs::read_dir(output_dir).with_context(|| format!("failed to read {output_dir:?}"))? {
		let entry = entry?;
		if entry.file_type()?.is_dir() && is_region_pyramid(&entry.path()) {
			regions.push(entry.file_name().to_string_lossy().into_owned());
		}
	}
	regions.sort();
	Ok(regions)
}

/// All tile coordinates of a pyramid.
pub fn tile_set(pyramid: &Path) -> Result<HashSet<TileCoord>> {
	Ok(walk::enumerate_tiles(pyramid)?.into_iter().map(|(coord, _)| coord).collect())
}

/// Early-exit overlap test: walks `pyramid` and stops at the first tile that
/// is also in `target`. Orders of magnitude cheaper than a full tile-set
/// comparison when neighbours share any tile at all.
fn has_overlap(pyramid: &Path, target: &HashSet<TileCoord>) -> Result<bool> {
	for (_, zoom_dir) in walk::numeric_zoom_dirs(pyramid)? {
		for x_entry in fs::read_dir(&zoom_dir)? {
			let x_dir = x_entry?.path();
			if !x_dir.is_dir() {
				continue;
			}
			for y_entry in fs::read_dir(&x_dir)? {
				let tile_path = y_entry?.path();
				if let Ok(coord) = parse_tile_path(&tile_path) {
					if target.contains(&coord) {
						return Ok(true);
					}
				}
			}
		}
	}
	Ok(false)
}

/// Chooses the merge inputs for `target`: the target itself plus every
/// region whose pyramid overlaps it. With `merge_all` every pyramid joins.
pub fn select_regions(output_dir: &Path, target: &str, merge_all: bool) -> Result<Vec<String>> {
	let all = discover_pyramids(output_dir)?;
	ensure!(
		all.iter().any(|region| region == target),
		"no pyramid found for region {target:?} under {output_dir:?}"
	);
	if merge_all {
		return Ok(all);
	}

	let target_tiles = tile_set(&output_dir.join(target))?;
	let mut selected = vec![target.to_string()];
	for region in all {
		if region == target {
			continue;
		}
		if has_overlap(&output_dir.join(&region), &target_tiles)? {
			selected.push(region);
		}
	}
	Ok(selected)
}

/// Runs the external merge tool over the selected pyramids, writing into
/// `<output_dir>/merged`.
pub async fn merge_pyramids(
	tools: &ToolsConfig,
	output_dir: &Path,
	regions: &[String],
	zoom_range: Option<(u8, u8)>,
	cancel: &CancellationToken,
) -> Result<MergeOutput> {
	ensure!(!regions.is_empty(), "nothing to merge");
	let merged_dir = output_dir.join(MERGED_DIR);

	let mut command = Command::new(&tools.tile_join);
	command.arg("-f").arg("-e").arg(&merged_dir).arg("--no-tile-compression");
	if let Some((min_zoom, max_zoom)) = zoom_range {
		command.arg("-Z").arg(min_zoom.to_string());
		command.arg("-z").arg(max_zoom.to_string());
	}
	for region in regions {
		command.arg(output_dir.join(region));
	}

	log::info!("merging {} pyramids: {}", regions.len(), regions.join(", "));
	run_tool(&mut command, &tools.tile_join, cancel)
		.await
		.context("pyramid merge failed")?;

	let (tiles, bytes) = walk::pyramid_totals(&merged_dir)?;
	log::info!("merged pyramid has {tiles} tiles ({})", format_bytes(bytes));
	Ok(MergeOutput {
		merged_dir,
		inputs: regions.to_vec(),
		tiles,
		bytes,
	})
}
