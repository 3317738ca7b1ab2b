use anyhow::Result;
use curvetiles_core::CancellationToken;
use curvetiles_pipeline::{
	merge::{self, MERGED_DIR},
	upload::{UploadCounters, plan_directory, plan_directory_zoom_filtered, plan_tile_set, upload_objects},
};
use std::sync::Arc;

#[derive(clap::Args, Debug)]
pub struct Subcommand {
	/// Regions to merge; all discovered pyramids when omitted
	pub regions: Vec<String>,

	/// Merge only pyramids overlapping this region, then publish its
	/// coordinates out of the merged pyramid
	#[arg(long = "for", value_name = "REGION")]
	pub for_region: Option<String>,

	/// Do not publish the merge result
	#[arg(long)]
	pub skip_upload: bool,

	#[arg(long, default_value_t = -1)]
	pub min_zoom: i32,

	#[arg(long, default_value_t = -1)]
	pub max_zoom: i32,
}

#[tokio::main]
pub async fn run(arguments: &Subcommand) -> Result<()> {
	let (deps, _) = super::build_deps().await?;
	let output_dir = deps.config.paths.output_dir.clone();

	let cancel = CancellationToken::new();
	super::cancel_on_signals(cancel.clone());

	let selected = if let Some(target) = &arguments.for_region {
		merge::select_regions(&output_dir, target, false)?
	} else if arguments.regions.is_empty() {
		merge::discover_pyramids(&output_dir)?
	} else {
		arguments.regions.clone()
	};

	let zoom_range = super::zoom_range(arguments.min_zoom, arguments.max_zoom);
	let output = merge::merge_pyramids(&deps.config.tools, &output_dir, &selected, zoom_range, &cancel).await?;

	if arguments.skip_upload {
		return Ok(());
	}

	let prefix = format!("{}/{MERGED_DIR}", deps.config.storage.bucket_path);
	let plan = if let Some(target) = &arguments.for_region {
		// Publish only the target region's coordinates so tiles shared with
		// other regions are not overwritten by this merge.
		let tiles = merge::tile_set(&output_dir.join(target))?;
		plan_tile_set(&output.merged_dir, &prefix, &tiles)?
	} else {
		match zoom_range {
			Some((min_zoom, max_zoom)) => {
				plan_directory_zoom_filtered(&output.merged_dir, &prefix, min_zoom, max_zoom)?
			}
			None => plan_directory(&output.merged_dir, &prefix)?,
		}
	};

	let report = upload_objects(
		Arc::clone(&deps.object_store),
		plan,
		Arc::new(UploadCounters::default()),
		&cancel,
	)
	.await?;
	log::info!("published {} merged objects", report.objects);
	Ok(())
}
