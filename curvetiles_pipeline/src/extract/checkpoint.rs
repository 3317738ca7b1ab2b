//! Persistence for extraction progress: a progress file plus a partial
//! roads file, both JSON, living next to the pyramids in the output
//! directory. Removed once the roads have been inserted.

use anyhow::{Context, Result};
use curvetiles_core::{ExtractionProgress, RoadBounds};
use std::{fs, path::PathBuf};

pub struct CheckpointStore {
	progress_path: PathBuf,
	roads_path: PathBuf,
}

impl CheckpointStore {
	pub fn new(base_dir: &std::path::Path, region: &str) -> CheckpointStore {
		CheckpointStore {
			progress_path: base_dir.join(format!(".extract-progress-{region}.json")),
			roads_path: base_dir.join(format!(".extracted-roads-{region}.json")),
		}
	}

	pub fn roads_path(&self) -> &std::path::Path {
		&self.roads_path
	}

	/// Loads a resumable checkpoint. Returns `None` unless both files exist
	/// and at least one tile was processed.
	pub fn load(&self) -> Result<Option<(ExtractionProgress, Vec<RoadBounds>)>> {
		if !self.progress_path.is_file() || !self.roads_path.is_file() {
			return Ok(None);
		}
		let progress: ExtractionProgress = serde_json::from_str(
			&fs::read_to_string(&self.progress_path)
				.with_context(|| format!("failed to read {:?}", self.progress_path))?,
		)
		.with_context(|| format!("malformed progress file {:?}", self.progress_path))?;

		if progress.last_processed_tile.is_empty() {
			return Ok(None);
		}

		let roads: Vec<RoadBounds> = serde_json::from_str(
			&fs::read_to_string(&self.roads_path).with_context(|| format!("failed to read {:?}", self.roads_path))?,
		)
		.with_context(|| format!("malformed roads file {:?}", self.roads_path))?;

		Ok(Some((progress, roads)))
	}

	pub fn save(&self, progress: &ExtractionProgress, roads: &[RoadBounds]) -> Result<()> {
		fs::write(&self.progress_path, serde_json::to_string(progress)?)
			.with_context(|| format!("failed to write {:?}", self.progress_path))?;
		fs::write(&self.roads_path, serde_json::to_string(roads)?)
			.with_context(|| format!("failed to write {:?}", self.roads_path))?;
		Ok(())
	}

	/// Removes both checkpoint files; called after successful insertion.
	pub fn remove(&self) -> Result<()> {
		for path in [&self.progress_path, &self.roads_path] {
			if path.exists() {
				fs::remove_file(path).with_context(|| format!("failed to remove {path:?}"))?;
			}
		}
		Ok(())
	}
}
