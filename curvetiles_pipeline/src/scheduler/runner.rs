//! The per-job pipeline driver: archive → convert → generate →
//! [extract-geometry → insert] → [merge] → [upload] → cleanup, strictly in
//! order, with status transitions published at every boundary.

use super::state::JobState;
use crate::{
	archive,
	convert,
	db::{MAX_BATCH_ROWS, insert_road_geometries},
	error::Cancelled,
	extract::{CheckpointStore, extract_roads},
	generate,
	merge,
	upload::{UploadCounters, plan_directory_zoom_filtered, plan_tile_set, upload_objects},
	walk,
};
use anyhow::{Context, Result, ensure};
use curvetiles_core::{CancellationToken, Config, JobOptions, JobStatus, TileCoord};
use object_store::ObjectStore;
use std::{
	collections::HashSet,
	fs,
	path::{Path, PathBuf},
	sync::Arc,
	time::Duration,
};
use tokio::sync::Mutex;

/// Shared collaborators of every pipeline run. The merge lock serializes
/// merges process-wide: the `merged` directory is a shared resource and
/// concurrent merges corrupt it.
pub struct PipelineDeps {
	pub config: Arc<Config>,
	pub object_store: Arc<dyn ObjectStore>,
	pub merge_lock: Mutex<()>,
}

impl PipelineDeps {
	pub fn new(config: Arc<Config>, object_store: Arc<dyn ObjectStore>) -> PipelineDeps {
		PipelineDeps {
			config,
			object_store,
			merge_lock: Mutex::new(()),
		}
	}

	#[cfg(test)]
	pub fn for_tests() -> PipelineDeps {
		use curvetiles_core::{PathsConfig, StorageConfig, ToolsConfig};
		PipelineDeps::new(
			Arc::new(Config {
				database: None,
				storage: StorageConfig {
					access_key: "test".to_string(),
					secret_key: "test".to_string(),
					endpoint: "http://localhost:9000".to_string(),
					region: "us-east-1".to_string(),
					bucket: "tiles".to_string(),
					bucket_path: "tiles".to_string(),
				},
				paths: PathsConfig {
					archive_dir: std::env::temp_dir(),
					output_dir: std::env::temp_dir(),
				},
				tools: ToolsConfig::default(),
			}),
			Arc::new(object_store::memory::InMemory::new()),
		)
	}
}

fn bail_if_cancelled(cancel: &CancellationToken) -> Result<()> {
	if cancel.is_cancelled() {
		return Err(anyhow::Error::new(Cancelled));
	}
	Ok(())
}

/// Runs every phase of one job. The caller owns the terminal transition;
/// this function reports success, failure or cancellation through `Result`.
pub async fn run_pipeline(
	deps: &Arc<PipelineDeps>,
	state: &JobState,
	job_id: &str,
	cancel: &CancellationToken,
) -> Result<()> {
	let job = state.get(job_id).await.context("job disappeared from the map")?;
	let region = job.region.clone();
	let options = job.options;
	let paths = deps.config.paths.clone();

	if options.skip_generation {
		// Reuse the pyramid from a prior build.
		let tile_dir = paths.output_dir.join(&region);
		ensure!(
			tile_dir.is_dir(),
			"skipGeneration requested but no pyramid exists at {tile_dir:?}"
		);
		let (tiles, bytes) = walk::pyramid_totals(&tile_dir)?;
		state
			.update(job_id, |job| {
				job.tiles_generated = tiles;
				job.total_size_bytes = bytes;
				job.set_step("reusing existing pyramid");
			})
			.await;
		return finish_phases(deps, state, job_id, cancel, &region, options, &tile_dir).await;
	}

	// Archive extraction
	state
		.update(job_id, |job| {
			job.set_status(JobStatus::Extracting);
			job.set_step("extracting archive");
		})
		.await;
	let extracted = {
		let archive_dir = paths.archive_dir.clone();
		let region = region.clone();
		tokio::task::spawn_blocking(move || archive::extract_archive(&archive_dir, &region))
			.await
			.context("archive extraction task panicked")??
	};
	let work_dir = extracted.work_dir.clone();

	let result = build_phases(deps, state, job_id, cancel, &region, options, extracted).await;

	// The job owns its work directory; remove it unless asked not to.
	if options.no_cleanup {
		log::info!("keeping work directory {work_dir:?}");
	} else if let Err(error) = fs::remove_dir_all(&work_dir) {
		log::warn!("failed to clean up {work_dir:?}: {error}");
	}

	result
}

/// Conversion and tile generation, then the shared tail of the pipeline.
async fn build_phases(
	deps: &Arc<PipelineDeps>,
	state: &JobState,
	job_id: &str,
	cancel: &CancellationToken,
	region: &str,
	options: JobOptions,
	extracted: archive::ExtractedArchive,
) -> Result<()> {
	let paths = deps.config.paths.clone();

	// KML → GeoJSON
	bail_if_cancelled(cancel)?;
	state
		.update(job_id, |job| {
			job.set_status(JobStatus::Converting);
			job.set_step("converting KML to GeoJSON");
		})
		.await;
	let converted = {
		let region = region.to_string();
		tokio::task::spawn_blocking(move || convert::convert_region(&extracted, &region))
			.await
			.context("conversion task panicked")??
	};

	// Tile generation
	bail_if_cancelled(cancel)?;
	state
		.update(job_id, |job| {
			job.set_status(JobStatus::Generating);
			job.set_step("cutting vector tiles");
		})
		.await;
	let generated = generate::generate_tiles(
		&deps.config.tools,
		&converted.geojson_path,
		&paths.output_dir,
		region,
		options.min_zoom,
		options.max_zoom,
		cancel,
	)
	.await?;
	state
		.update(job_id, |job| {
			job.tiles_generated = generated.tiles;
			job.total_size_bytes = generated.bytes;
		})
		.await;

	finish_phases(deps, state, job_id, cancel, region, options, &generated.tile_dir).await
}

/// Extraction, insertion, merge and publish over an existing pyramid.
async fn finish_phases(
	deps: &Arc<PipelineDeps>,
	state: &JobState,
	job_id: &str,
	cancel: &CancellationToken,
	region: &str,
	options: JobOptions,
	tile_dir: &Path,
) -> Result<()> {
	let paths = deps.config.paths.clone();

	// Bounding-box extraction and geometry insertion
	if options.extract_geometry {
		bail_if_cancelled(cancel)?;
		state
			.update(job_id, |job| {
				job.set_status(JobStatus::ExtractingGeometry);
				job.set_step("extracting road bounding boxes");
			})
			.await;
		let report = {
			let tile_dir = tile_dir.to_path_buf();
			let region = region.to_string();
			let output_dir = paths.output_dir.clone();
			let cancel = cancel.clone();
			tokio::task::spawn_blocking(move || {
				let checkpoint = CheckpointStore::new(&output_dir, &region);
				extract_roads(&tile_dir, &region, &checkpoint, &cancel)
			})
			.await
			.context("extraction task panicked")??
		};
		state
			.update(job_id, |job| job.roads_extracted = report.roads.len() as u64)
			.await;

		if options.skip_geometry_insertion {
			log::info!("skipping geometry insertion for {region} as requested");
		} else if let Some(pool) = state.store().pool() {
			state
				.update(job_id, |job| {
					job.set_status(JobStatus::Inserting);
					job.set_step("upserting road geometries");
				})
				.await;
			insert_road_geometries(pool, &report.roads, MAX_BATCH_ROWS, cancel).await?;
			CheckpointStore::new(&paths.output_dir, region).remove()?;
		} else {
			log::warn!("database disabled; roads checkpoint for {region} kept for insert-geometries");
		}
	}

	// Regional merge, serialized process-wide
	let mut publish_dir: PathBuf = tile_dir.to_path_buf();
	let mut publish_tiles: Option<HashSet<TileCoord>> = None;
	if options.skip_merge {
		log::info!("skipping merge for {region} as requested");
	} else {
		bail_if_cancelled(cancel)?;
		state
			.update(job_id, |job| job.set_step("merging overlapping regions"))
			.await;
		let _merge_guard = deps.merge_lock.lock().await;
		let selected = merge::select_regions(&paths.output_dir, region, options.merge_all)?;
		let merged = merge::merge_pyramids(
			&deps.config.tools,
			&paths.output_dir,
			&selected,
			Some((options.min_zoom, options.max_zoom)),
			cancel,
		)
		.await?;
		publish_tiles = Some(merge::tile_set(tile_dir)?);
		publish_dir = merged.merged_dir;
	}

	// Publish
	if options.skip_upload {
		log::info!("skipping upload for {region} as requested");
		return Ok(());
	}
	bail_if_cancelled(cancel)?;
	state
		.update(job_id, |job| {
			job.set_status(JobStatus::Uploading);
			job.set_step("publishing tiles");
		})
		.await;

	let bucket_path = deps.config.storage.bucket_path.clone();
	let plan = match &publish_tiles {
		// Publishing out of the merged pyramid: only this region's
		// coordinates, so other regions' tiles are never overwritten.
		Some(tiles) => plan_tile_set(&publish_dir, &format!("{bucket_path}/{}", merge::MERGED_DIR), tiles)?,
		None => plan_directory_zoom_filtered(
			&publish_dir,
			&format!("{bucket_path}/{region}"),
			options.min_zoom,
			options.max_zoom,
		)?,
	};

	let total_objects = plan.len() as u64;
	let counters = Arc::new(UploadCounters::default());
	let progress_task = spawn_upload_progress(state.clone(), job_id.to_string(), Arc::clone(&counters), total_objects);

	let upload_result = upload_objects(Arc::clone(&deps.object_store), plan, counters, cancel).await;
	progress_task.abort();
	let report = upload_result?;

	state
		.update(job_id, |job| {
			job.upload_progress = 1.0;
			job.uploaded_bytes = report.bytes;
		})
		.await;
	Ok(())
}

/// Periodically mirrors the upload counters into the job record so SSE
/// subscribers see progress, not just phase boundaries.
fn spawn_upload_progress(
	state: JobState,
	job_id: String,
	counters: Arc<UploadCounters>,
	total_objects: u64,
) -> tokio::task::JoinHandle<()> {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(Duration::from_secs(2));
		loop {
			ticker.tick().await;
			let objects = counters.objects_done.load(std::sync::atomic::Ordering::Relaxed);
			let bytes = counters.bytes_done.load(std::sync::atomic::Ordering::Relaxed);
			state
				.update(&job_id, |job| {
					job.upload_progress = if total_objects == 0 {
						1.0
					} else {
						objects as f64 / total_objects as f64
					};
					job.uploaded_bytes = bytes;
				})
				.await;
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::db::JobStore;
	use crate::walk::test_support::write_test_tile;
	use curvetiles_core::TileJob;

	#[tokio::test]
	async fn missing_archive_fails_the_job_with_a_clear_message() {
		let deps = Arc::new(PipelineDeps::for_tests());
		let state = JobState::new(JobStore::Disabled);
		let job = TileJob::new("no-such-region", JobOptions::default());
		let id = job.id.clone();
		state.insert(job, CancellationToken::new()).await;

		let error = run_pipeline(&deps, &state, &id, &CancellationToken::new())
			.await
			.unwrap_err();
		assert!(error.to_string().contains("no archive found"), "{error:#}");
	}

	#[tokio::test]
	async fn skip_generation_requires_an_existing_pyramid() {
		let deps = Arc::new(PipelineDeps::for_tests());
		let state = JobState::new(JobStore::Disabled);
		let mut job = TileJob::new("definitely-not-a-region", JobOptions::default());
		job.options.skip_generation = true;
		let id = job.id.clone();
		state.insert(job, CancellationToken::new()).await;

		let error = run_pipeline(&deps, &state, &id, &CancellationToken::new())
			.await
			.unwrap_err();
		assert!(error.to_string().contains("skipGeneration"), "{error:#}");
	}

	#[tokio::test]
	async fn skip_generation_runs_tail_phases_against_existing_tiles() {
		// An existing pyramid, no merge, no upload, no database: the job
		// extracts geometry and succeeds without touching archives.
		let output = tempfile::tempdir().unwrap();
		let region_dir = output.path().join("rerun-region");
		write_test_tile(
			&region_dir,
			curvetiles_core::TileCoord::new(5, 10, 20).unwrap(),
			"NF-73",
			&[(0, 0), (500, 500)],
		);

		let mut deps = PipelineDeps::for_tests();
		{
			let config = Arc::get_mut(&mut deps.config).unwrap();
			config.paths.output_dir = output.path().to_path_buf();
		}
		let deps = Arc::new(deps);

		let state = JobState::new(JobStore::Disabled);
		let mut job = TileJob::new("rerun-region", JobOptions::default());
		job.options.skip_generation = true;
		job.options.skip_merge = true;
		job.options.skip_upload = true;
		let id = job.id.clone();
		state.insert(job, CancellationToken::new()).await;

		run_pipeline(&deps, &state, &id, &CancellationToken::new()).await.unwrap();

		let job = state.get(&id).await.unwrap();
		assert_eq!(job.tiles_generated, 1);
		assert_eq!(job.roads_extracted, 1);
	}
}
