use anyhow::{Context, Result};
use curvetiles_core::CancellationToken;
use curvetiles_pipeline::{
	db::{MAX_BATCH_ROWS, insert_road_geometries},
	extract::{CheckpointStore, extract_roads},
};
use std::path::PathBuf;

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true)]
pub struct Subcommand {
	/// Existing pyramid to extract from; the region is the final path segment
	pub tiles_dir: PathBuf,
}

#[tokio::main]
pub async fn run(arguments: &Subcommand) -> Result<()> {
	let (_, job_store) = super::build_deps().await?;

	let region = arguments
		.tiles_dir
		.file_name()
		.map(|name| name.to_string_lossy().into_owned())
		.with_context(|| format!("cannot infer region from {:?}", arguments.tiles_dir))?;
	let base_dir = arguments
		.tiles_dir
		.parent()
		.with_context(|| format!("{:?} has no parent directory", arguments.tiles_dir))?
		.to_path_buf();

	let cancel = CancellationToken::new();
	super::cancel_on_signals(cancel.clone());

	let report = {
		let tiles_dir = arguments.tiles_dir.clone();
		let region = region.clone();
		let base_dir = base_dir.clone();
		let cancel = cancel.clone();
		tokio::task::spawn_blocking(move || {
			let checkpoint = CheckpointStore::new(&base_dir, &region);
			extract_roads(&tiles_dir, &region, &checkpoint, &cancel)
		})
		.await
		.context("extraction task panicked")??
	};
	log::info!(
		"extracted {} roads from {} tiles{}",
		report.roads.len(),
		report.total_tiles,
		if report.resumed { " (resumed)" } else { "" }
	);

	let Some(pool) = job_store.pool() else {
		log::warn!("database not configured; roads kept in the checkpoint file for insert-geometries");
		return Ok(());
	};

	let inserted = insert_road_geometries(pool, &report.roads, MAX_BATCH_ROWS, &cancel).await?;
	CheckpointStore::new(&base_dir, &region).remove()?;
	log::info!("inserted {inserted} road geometries for {region}");
	Ok(())
}
