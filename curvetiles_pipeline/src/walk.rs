//! Filesystem walks over tile pyramids.

use anyhow::{Context, Result};
use curvetiles_core::{TileCoord, parse_tile_path};
use std::{
	fs,
	path::{Path, PathBuf},
};

/// Recursively collects every `.pbf` file under `dir` with its size.
pub fn walk_pbf_files(dir: &Path) -> Result<Vec<(PathBuf, u64)>> {
	let mut files = Vec::new();
	walk_into(dir, &mut files)?;
	Ok(files)
}

fn walk_into(dir: &Path, files: &mut Vec<(PathBuf, u64)>) -> Result<()> {
	for entry in fs::read_dir(dir).with_context(|| format!("failed to read directory {dir:?}"))? {
		let entry = entry?;
		let path = entry.path();
		let file_type = entry.file_type()?;
		if file_type.is_dir() {
			walk_into(&path, files)?;
		} else if path.extension().is_some_and(|ext| ext == "pbf") {
			files.push((path, entry.metadata()?.len()));
		}
	}
	Ok(())
}

/// Recursively collects every regular file under `dir` with its size,
/// keeping paths relative to `dir`.
pub fn walk_files_relative(dir: &Path) -> Result<Vec<(PathBuf, u64)>> {
	fn inner(root: &Path, dir: &Path, files: &mut Vec<(PathBuf, u64)>) -> Result<()> {
		for entry in fs::read_dir(dir).with_context(|| format!("failed to read directory {dir:?}"))? {
			let entry = entry?;
			let path = entry.path();
			if entry.file_type()?.is_dir() {
				inner(root, &path, files)?;
			} else {
				let relative = path.strip_prefix(root).expect("walk stays under root").to_path_buf();
				files.push((relative, entry.metadata()?.len()));
			}
		}
		Ok(())
	}
	let mut files = Vec::new();
	inner(dir, dir, &mut files)?;
	files.sort();
	Ok(files)
}

/// Tile count and byte total of a pyramid.
pub fn pyramid_totals(dir: &Path) -> Result<(u64, u64)> {
	let files = walk_pbf_files(dir)?;
	let bytes = files.iter().map(|(_, size)| size).sum();
	Ok((files.len() as u64, bytes))
}

/// Enumerates a pyramid's tiles in a deterministic order (z, then y, then x).
/// Checkpoint resume depends on this order being stable between runs.
pub fn enumerate_tiles(pyramid: &Path) -> Result<Vec<(TileCoord, PathBuf)>> {
	let mut tiles: Vec<(TileCoord, PathBuf)> = Vec::new();
	for (path, _) in walk_pbf_files(pyramid)? {
		match parse_tile_path(&path) {
			Ok(coord) => tiles.push((coord, path)),
			Err(error) => log::debug!("skipping non-tile file {path:?}: {error}"),
		}
	}
	tiles.sort_by_key(|(coord, _)| *coord);
	Ok(tiles)
}

/// Immediate numeric subdirectories of a pyramid, i.e. its zoom levels.
pub fn numeric_zoom_dirs(pyramid: &Path) -> Result<Vec<(u8, PathBuf)>> {
	let mut zooms = Vec::new();
	for entry in fs::read_dir(pyramid).with_context(|| format!("failed to read pyramid {pyramid:?}"))? {
		let entry = entry?;
		if !entry.file_type()?.is_dir() {
			continue;
		}
		if let Ok(zoom) = entry.file_name().to_string_lossy().parse::<u8>() {
			zooms.push((zoom, entry.path()));
		}
	}
	zooms.sort_by_key(|(zoom, _)| *zoom);
	Ok(zooms)
}

#[cfg(test)]
pub(crate) mod test_support {
	use super::*;
	use curvetiles_geometry::vector_tile::{GeomType, TileValue, VectorTile, VectorTileFeature, VectorTileLayer};

	/// Writes a synthetic single-road tile at `pyramid/z/x/y.pbf`.
	pub fn write_test_tile(pyramid: &Path, coord: TileCoord, road_name: &str, line: &[(i64, i64)]) {
		let mut layer = VectorTileLayer::new("roads");
		layer.add_feature(
			VectorTileFeature::from_lines(Some(1), vec![], GeomType::LineString, &[line.to_vec()]),
			&[("Name", TileValue::from(road_name))],
		);
		let tile = VectorTile::new(vec![layer]);
		let path = pyramid.join(coord.path_fragment());
		fs::create_dir_all(path.parent().unwrap()).unwrap();
		fs::write(path, tile.to_bytes()).unwrap();
	}
}
