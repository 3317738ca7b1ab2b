//! One module per CLI subcommand. Each exposes a clap `Subcommand` args
//! struct and a `run` entry point that owns its tokio runtime.

pub mod extract;
pub mod generate;
pub mod insert_geometries;
pub mod merge;
pub mod serve;
pub mod upload;
pub mod verify;

use anyhow::Result;
use curvetiles_core::{CancellationToken, Config};
use curvetiles_pipeline::{db::JobStore, scheduler::PipelineDeps, upload::build_store};
use std::sync::Arc;

/// Loads configuration and builds the shared pipeline collaborators.
pub(crate) async fn build_deps() -> Result<(Arc<PipelineDeps>, JobStore)> {
	let config = Arc::new(Config::from_env()?);
	let job_store = JobStore::connect(config.database.as_ref()).await;
	let object_store = build_store(&config.storage)?;
	Ok((Arc::new(PipelineDeps::new(config, object_store)), job_store))
}

/// Cancels the token on SIGINT or SIGTERM so every phase can wind down at
/// its next suspension point.
pub(crate) fn cancel_on_signals(cancel: CancellationToken) {
	tokio::spawn(async move {
		let ctrl_c = tokio::signal::ctrl_c();
		#[cfg(unix)]
		{
			let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
				.expect("failed to install SIGTERM handler");
			tokio::select! {
				_ = ctrl_c => {}
				_ = sigterm.recv() => {}
			}
		}
		#[cfg(not(unix))]
		{
			let _ = ctrl_c.await;
		}
		log::warn!("shutdown signal received; cancelling work");
		cancel.cancel();
	});
}

/// Interprets `-1` zoom arguments: negative means unbounded.
pub(crate) fn zoom_range(min_zoom: i32, max_zoom: i32) -> Option<(u8, u8)> {
	if min_zoom < 0 && max_zoom < 0 {
		return None;
	}
	let min = if min_zoom < 0 { 0 } else { min_zoom as u8 };
	let max = if max_zoom < 0 { 30 } else { max_zoom as u8 };
	Some((min, max))
}

#[cfg(test)]
mod tests {
	use super::zoom_range;

	#[test]
	fn negative_zooms_mean_unbounded() {
		assert_eq!(zoom_range(-1, -1), None);
		assert_eq!(zoom_range(0, 6), Some((0, 6)));
		assert_eq!(zoom_range(-1, 6), Some((0, 6)));
		assert_eq!(zoom_range(5, -1), Some((5, 30)));
	}
}
