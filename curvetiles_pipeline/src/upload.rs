//! Parallel publish of tile pyramids into the object store.
//!
//! Three planning variants feed one worker pool: the full tree, a
//! zoom-filtered subset (numeric zoom directories within a range), and an
//! exact tile set (so publishing one region out of a merged pyramid cannot
//! overwrite other regions' tiles at shared coordinates).

use crate::error::Cancelled;
use crate::walk::{numeric_zoom_dirs, walk_files_relative};
use anyhow::{Context, Result};
use curvetiles_core::{CancellationToken, StorageConfig, TileCoord, utils::format_bytes};
use futures::{StreamExt, TryStreamExt};
use object_store::{ClientOptions, ObjectStore, PutPayload, aws::AmazonS3Builder, path::Path as ObjectPath};
use std::{
	collections::HashSet,
	path::{Path, PathBuf},
	sync::{
		Arc,
		atomic::{AtomicU64, Ordering},
	},
	time::Duration,
};

/// Fixed worker pool size for uploads. The HTTP client keeps at least this
/// many idle connections per host so workers do not pay a TLS handshake per
/// request.
pub const UPLOAD_WORKERS: usize = 100;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UploadObject {
	pub local: PathBuf,
	pub key: String,
	pub size: u64,
}

#[derive(Debug, Default)]
pub struct UploadCounters {
	pub objects_done: AtomicU64,
	pub bytes_done: AtomicU64,
}

#[derive(Debug)]
pub struct UploadReport {
	pub objects: u64,
	pub bytes: u64,
}

/// Builds the shared S3 client from configuration. Publication visibility
/// relies on bucket policy; the client exposes no canned ACLs.
pub fn build_store(storage: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
	let client_options = ClientOptions::new()
		.with_timeout(Duration::from_secs(300))
		.with_connect_timeout(Duration::from_secs(10))
		.with_pool_max_idle_per_host(UPLOAD_WORKERS);

	let store = AmazonS3Builder::new()
		.with_access_key_id(&storage.access_key)
		.with_secret_access_key(&storage.secret_key)
		.with_endpoint(&storage.endpoint)
		.with_region(&storage.region)
		.with_bucket_name(&storage.bucket)
		.with_allow_http(storage.endpoint.starts_with("http://"))
		.with_client_options(client_options)
		.build()
		.context("failed to configure object store client")?;

	log::debug!("object store client ready (bucket {:?}); public access is bucket policy's concern", storage.bucket);
	Ok(Arc::new(store))
}

fn object_key(prefix: &str, relative: &Path) -> String {
	let mut key = String::from(prefix.trim_end_matches('/'));
	for component in relative.components() {
		key.push('/');
		key.push_str(&component.as_os_str().to_string_lossy());
	}
	key
}

/// Plans an upload of a whole directory tree under `prefix`.
pub fn plan_directory(dir: &Path, prefix: &str) -> Result<Vec<UploadObject>> {
	Ok(
		walk_files_relative(dir)?
			.into_iter()
			.map(|(relative, size)| UploadObject {
				key: object_key(prefix, &relative),
				local: dir.join(&relative),
				size,
			})
			.collect(),
	)
}

/// Plans an upload of only the zoom directories within `min_zoom..=max_zoom`.
/// Non-numeric subdirectories never upload through this variant.
pub fn plan_directory_zoom_filtered(
	dir: &Path,
	prefix: &str,
	min_zoom: u8,
	max_zoom: u8,
) -> Result<Vec<UploadObject>> {
	let mut objects = Vec::new();
	for (zoom, zoom_dir) in numeric_zoom_dirs(dir)? {
		if zoom < min_zoom || zoom > max_zoom {
			continue;
		}
		for (relative, size) in walk_files_relative(&zoom_dir)? {
			let relative_with_zoom = Path::new(&zoom.to_string()).join(&relative);
			objects.push(UploadObject {
				key: object_key(prefix, &relative_with_zoom),
				local: zoom_dir.join(&relative),
				size,
			});
		}
	}
	Ok(objects)
}

/// Plans an upload of exactly the tiles in `tiles`, ignoring everything else
/// in the directory.
pub fn plan_tile_set(dir: &Path, prefix: &str, tiles: &HashSet<TileCoord>) -> Result<Vec<UploadObject>> {
	let mut objects = Vec::new();
	for (coord, path) in crate::walk::enumerate_tiles(dir)? {
		if !tiles.contains(&coord) {
			continue;
		}
		let size = std::fs::metadata(&path)?.len();
		objects.push(UploadObject {
			key: object_key(prefix, Path::new(&coord.path_fragment())),
			local: path,
			size,
		});
	}
	Ok(objects)
}

/// Drains the upload plan through [`UPLOAD_WORKERS`] concurrent workers.
///
/// The first failure aborts the whole operation; cancellation abandons
/// in-flight uploads. `counters` is updated live so the caller can surface
/// progress.
pub async fn upload_objects(
	store: Arc<dyn ObjectStore>,
	objects: Vec<UploadObject>,
	counters: Arc<UploadCounters>,
	cancel: &CancellationToken,
) -> Result<UploadReport> {
	let total_objects = objects.len() as u64;
	let total_bytes: u64 = objects.iter().map(|object| object.size).sum();
	log::info!("uploading {total_objects} objects ({})", format_bytes(total_bytes));

	let uploads = futures::stream::iter(objects.into_iter().map(|object| {
		let store = Arc::clone(&store);
		let counters = Arc::clone(&counters);
		let cancel = cancel.clone();
		async move {
			if cancel.is_cancelled() {
				return Err(anyhow::Error::new(Cancelled));
			}
			let data = tokio::fs::read(&object.local)
				.await
				.with_context(|| format!("failed to read {:?}", object.local))?;
			store
				.put(&ObjectPath::from(object.key.as_str()), PutPayload::from(data))
				.await
				.with_context(|| format!("failed to upload {}", object.key))?;
			counters.objects_done.fetch_add(1, Ordering::Relaxed);
			counters.bytes_done.fetch_add(object.size, Ordering::Relaxed);
			Ok(())
		}
	}))
	.buffer_unordered(UPLOAD_WORKERS)
	// Stops at the first failed worker; unfinished uploads are dropped.
	.try_for_each(|()| futures::future::ready(Ok(())));

	tokio::select! {
		() = cancel.cancelled() => {
			return Err(anyhow::Error::new(Cancelled)).context("upload aborted");
		}
		result = uploads => result?,
	}

	Ok(UploadReport {
		objects: total_objects,
		bytes: total_bytes,
	})
}
