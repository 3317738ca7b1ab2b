//! Locating and unpacking the per-region KMZ archives.

use anyhow::{Context, Result, bail};
use std::{
	fs,
	io,
	path::{Path, PathBuf},
	process,
};
use zip::ZipArchive;

/// An unpacked archive: the temporary working directory and the KML file
/// found inside it. The directory is owned by the job and removed at cleanup
/// unless `no_cleanup` is set.
#[derive(Debug)]
pub struct ExtractedArchive {
	pub work_dir: PathBuf,
	pub kml_path: PathBuf,
}

/// Probes for the region's archive: the `us-` prefixed name first, then the
/// bare region name.
pub fn find_archive(archive_dir: &Path, region: &str) -> Result<PathBuf> {
	let candidates = [
		archive_dir.join(format!("us-{region}.c_1000.curves.kmz")),
		archive_dir.join(format!("{region}.c_1000.curves.kmz")),
	];
	for candidate in &candidates {
		if candidate.is_file() {
			return Ok(candidate.clone());
		}
	}
	bail!("no archive found for region {region:?} in {archive_dir:?} (tried us-{region}.c_1000.curves.kmz and {region}.c_1000.curves.kmz)");
}

/// Unpacks the region's KMZ into a unique temporary directory and locates the
/// first `.kml` member, at any depth.
pub fn extract_archive(archive_dir: &Path, region: &str) -> Result<ExtractedArchive> {
	let archive_path = find_archive(archive_dir, region)?;

	let work_dir = tempfile::Builder::new()
		.prefix(&format!("curvetiles-{region}-{}-", process::id()))
		.tempdir()
		.context("failed to create extraction directory")?
		.keep();

	let result = unpack_into(&archive_path, &work_dir);
	if result.is_err() {
		let _ = fs::remove_dir_all(&work_dir);
	}
	result?;

	let Some(kml_path) = find_kml(&work_dir)? else {
		let _ = fs::remove_dir_all(&work_dir);
		bail!("archive {archive_path:?} contains no .kml member");
	};

	log::debug!("extracted {archive_path:?} to {work_dir:?}, kml at {kml_path:?}");
	Ok(ExtractedArchive { work_dir, kml_path })
}

fn unpack_into(archive_path: &Path, target: &Path) -> Result<()> {
	let file = fs::File::open(archive_path).with_context(|| format!("failed to open archive {archive_path:?}"))?;
	let mut archive = ZipArchive::new(file).with_context(|| format!("{archive_path:?} is not a valid zip archive"))?;

	for index in 0..archive.len() {
		let mut entry = archive.by_index(index).context("failed to read zip entry")?;
		let Some(relative) = entry.enclosed_name() else {
			log::warn!("skipping zip entry with unsafe path: {:?}", entry.name());
			continue;
		};
		let destination = target.join(relative);
		if entry.is_dir() {
			fs::create_dir_all(&destination)?;
			continue;
		}
		if let Some(parent) = destination.parent() {
			fs::create_dir_all(parent)?;
		}
		let mut out = fs::File::create(&destination).with_context(|| format!("failed to create {destination:?}"))?;
		io::copy(&mut entry, &mut out).with_context(|| format!("failed to extract {destination:?}"))?;
	}
	Ok(())
}

/// Depth-independent search for the first `.kml` file; archives sometimes
/// nest the document in a folder.
fn find_kml(dir: &Path) -> Result<Option<PathBuf>> {
	let mut subdirs = Vec::new();
	for entry in fs::read_dir(dir).with_context(|| format!("failed to read {dir:?}"))? {
		let entry = entry?;
		let path = entry.path();
		if entry.file_type()?.is_dir() {
			subdirs.push(path);
		} else if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("kml")) {
			return Ok(Some(path));
		}
	}
	for subdir in subdirs {
		if let Some(found) = find_kml(&subdir)? {
			return Ok(Some(found));
		}
	}
	Ok(None)
}
