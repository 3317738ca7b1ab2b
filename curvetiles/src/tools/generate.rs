use anyhow::{Result, bail};
use clap::ArgAction;
use curvetiles_core::{CancellationToken, JobOptions};
use curvetiles_pipeline::scheduler::{JobState, batch::run_batch};

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true)]
pub struct Subcommand {
	/// Regions to build, e.g. `oregon asia-japan`
	#[arg(required = true)]
	pub regions: Vec<String>,

	#[arg(long, default_value_t = 5)]
	pub min_zoom: u8,

	#[arg(long, default_value_t = 16)]
	pub max_zoom: u8,

	/// Do not publish to the object store
	#[arg(long)]
	pub skip_upload: bool,

	/// Do not merge with overlapping regional pyramids
	#[arg(long)]
	pub skip_merge: bool,

	/// Keep temporary archive and GeoJSON files
	#[arg(long)]
	pub no_cleanup: bool,

	/// Extract per-road bounding boxes from the generated tiles
	#[arg(long, default_value_t = true, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
	pub extract_geometry: bool,

	/// Extract but do not insert geometries (checkpoint is kept)
	#[arg(long)]
	pub skip_geometry_insertion: bool,

	/// Merge every pyramid instead of only overlapping ones
	#[arg(long)]
	pub merge_all: bool,

	/// Concurrent regions in batch mode
	#[arg(long, default_value_t = 1)]
	pub workers: usize,
}

#[tokio::main]
pub async fn run(arguments: &Subcommand) -> Result<()> {
	let (deps, job_store) = super::build_deps().await?;
	let state = JobState::new(job_store);

	let cancel = CancellationToken::new();
	super::cancel_on_signals(cancel.clone());

	let options = JobOptions {
		min_zoom: arguments.min_zoom,
		max_zoom: arguments.max_zoom,
		skip_upload: arguments.skip_upload,
		skip_merge: arguments.skip_merge,
		skip_generation: false,
		no_cleanup: arguments.no_cleanup,
		extract_geometry: arguments.extract_geometry,
		skip_geometry_insertion: arguments.skip_geometry_insertion,
		merge_all: arguments.merge_all,
	};

	let report = run_batch(
		deps,
		state,
		arguments.regions.clone(),
		options,
		arguments.workers,
		cancel,
	)
	.await;

	for region in &report.succeeded {
		log::info!("region {region}: ok");
	}
	for (region, message) in &report.failed {
		log::error!("region {region}: {message}");
	}
	for region in &report.cancelled {
		log::warn!("region {region}: cancelled");
	}

	if !report.all_succeeded() {
		bail!(
			"{} of {} regions did not complete",
			report.failed.len() + report.cancelled.len(),
			report.failed.len() + report.cancelled.len() + report.succeeded.len()
		);
	}
	Ok(())
}
