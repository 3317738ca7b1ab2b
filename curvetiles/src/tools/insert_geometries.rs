use anyhow::{Context, Result, ensure};
use curvetiles_core::{CancellationToken, RoadBounds};
use curvetiles_pipeline::{
	db::{MAX_BATCH_ROWS, insert_road_geometries},
	extract::CheckpointStore,
};
use std::{fs, path::PathBuf};

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true)]
pub struct Subcommand {
	/// A region name (resolves that region's checkpoint under the output
	/// directory) or a path to a roads file
	pub target: String,
}

#[tokio::main]
pub async fn run(arguments: &Subcommand) -> Result<()> {
	let (deps, job_store) = super::build_deps().await?;
	let pool = job_store
		.pool()
		.context("insert-geometries requires a configured database")?;

	let cancel = CancellationToken::new();
	super::cancel_on_signals(cancel.clone());

	// Resolve to a roads file plus (when addressed by region) its checkpoint.
	let path = PathBuf::from(&arguments.target);
	let (roads_path, checkpoint) = if path.is_file() {
		(path, None)
	} else {
		let checkpoint = CheckpointStore::new(&deps.config.paths.output_dir, &arguments.target);
		(checkpoint.roads_path().to_path_buf(), Some(checkpoint))
	};

	let roads: Vec<RoadBounds> = serde_json::from_str(
		&fs::read_to_string(&roads_path).with_context(|| format!("failed to read roads file {roads_path:?}"))?,
	)
	.with_context(|| format!("malformed roads file {roads_path:?}"))?;
	ensure!(!roads.is_empty(), "roads file {roads_path:?} is empty");

	let inserted = insert_road_geometries(pool, &roads, MAX_BATCH_ROWS, &cancel).await?;
	log::info!("inserted {inserted} road geometries from {roads_path:?}");

	if let Some(checkpoint) = checkpoint {
		checkpoint.remove()?;
	}
	Ok(())
}
