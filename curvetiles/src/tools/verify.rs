use anyhow::{Result, bail};
use curvetiles_pipeline::verify::{verify_merge, verify_tile_dir, verify_upload};
use std::{path::PathBuf, sync::Arc};

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true)]
pub struct Subcommand {
	#[command(subcommand)]
	pub check: Check,
}

#[derive(clap::Subcommand, Debug)]
pub enum Check {
	/// Per-zoom coverage and extents of a pyramid
	Tiles {
		/// Region name or pyramid directory
		target: String,
		#[arg(long, default_value_t = 5)]
		min_zoom: u8,
		#[arg(long, default_value_t = 16)]
		max_zoom: u8,
	},

	/// Every regional tile must exist in the merged pyramid
	Merge {
		/// Region name or pyramid directory
		target: String,
	},

	/// HEAD a random sample of uploaded tiles per zoom
	Upload {
		/// Region name or pyramid directory
		target: String,
		#[arg(long, default_value_t = 5)]
		samples: usize,
	},
}

#[tokio::main]
pub async fn run(arguments: &Subcommand) -> Result<()> {
	let (deps, _) = super::build_deps().await?;

	// A target naming an existing directory is used verbatim; otherwise it
	// is a region under the output directory.
	let resolve = |target: &str| -> (String, PathBuf) {
		let as_path = PathBuf::from(target);
		if as_path.is_dir() {
			let region = as_path
				.file_name()
				.map_or_else(|| target.to_string(), |name| name.to_string_lossy().into_owned());
			(region, as_path)
		} else {
			(target.to_string(), deps.config.paths.output_dir.join(target))
		}
	};

	match &arguments.check {
		Check::Tiles {
			target,
			min_zoom,
			max_zoom,
		} => {
			let (_, dir) = resolve(target);
			let report = verify_tile_dir(&dir, *min_zoom, *max_zoom)?;
			for zoom in &report.zooms {
				log::info!(
					"zoom {:>2}: {:>8} tiles, x {}..{}, y {}..{}",
					zoom.zoom,
					zoom.tiles,
					zoom.min_x,
					zoom.max_x,
					zoom.min_y,
					zoom.max_y
				);
			}
			if !report.ok {
				bail!("pyramid {dir:?} is missing zooms {:?}", report.missing_zooms);
			}
			log::info!("pyramid ok: {} tiles", report.total_tiles);
		}
		Check::Merge { target } => {
			let (_, dir) = resolve(target);
			let report = verify_merge(&dir, &deps.config.paths.output_dir)?;
			if !report.ok {
				for coord in &report.missing {
					log::error!("missing from merged pyramid: {coord}");
				}
				bail!(
					"{} of {} tiles are missing from the merged pyramid",
					report.missing_total,
					report.checked
				);
			}
			log::info!("merge ok: {} tiles checked, {} smaller (warnings)", report.checked, report.smaller);
		}
		Check::Upload { target, samples } => {
			let (region, dir) = resolve(target);
			let prefix = format!("{}/{region}", deps.config.storage.bucket_path);
			let report = verify_upload(Arc::clone(&deps.object_store), &dir, &prefix, *samples).await?;
			if !report.ok {
				bail!("{} sampled tiles are missing from the object store", report.missing.len());
			}
			log::info!("upload ok: {} tiles sampled", report.sampled);
		}
	}
	Ok(())
}
