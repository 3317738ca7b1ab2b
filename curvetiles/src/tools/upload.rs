use anyhow::{Context, Result};
use curvetiles_core::CancellationToken;
use curvetiles_pipeline::upload::{UploadCounters, plan_directory, plan_directory_zoom_filtered, upload_objects};
use std::{path::PathBuf, sync::Arc};

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true)]
pub struct Subcommand {
	/// Local pyramid to publish; the region is the final path segment
	pub tiles_dir: PathBuf,

	/// Lowest zoom to publish; -1 means no lower bound
	#[arg(long, default_value_t = -1)]
	pub min_zoom: i32,

	/// Highest zoom to publish; -1 means no upper bound
	#[arg(long, default_value_t = -1)]
	pub max_zoom: i32,
}

#[tokio::main]
pub async fn run(arguments: &Subcommand) -> Result<()> {
	let (deps, _) = super::build_deps().await?;

	let region = arguments
		.tiles_dir
		.file_name()
		.map(|name| name.to_string_lossy().into_owned())
		.with_context(|| format!("cannot infer region from {:?}", arguments.tiles_dir))?;
	let prefix = format!("{}/{region}", deps.config.storage.bucket_path);

	let plan = match super::zoom_range(arguments.min_zoom, arguments.max_zoom) {
		Some((min_zoom, max_zoom)) => {
			plan_directory_zoom_filtered(&arguments.tiles_dir, &prefix, min_zoom, max_zoom)?
		}
		None => plan_directory(&arguments.tiles_dir, &prefix)?,
	};

	let cancel = CancellationToken::new();
	super::cancel_on_signals(cancel.clone());

	let report = upload_objects(
		Arc::clone(&deps.object_store),
		plan,
		Arc::new(UploadCounters::default()),
		&cancel,
	)
	.await?;
	log::info!("published {} objects for {region}", report.objects);
	Ok(())
}
