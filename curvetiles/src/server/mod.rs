//! The HTTP surface: job submission, status streaming, cancellation, region
//! discovery and raw tile serving.

mod handlers;
mod routes;

use anyhow::{Context, Result};
use curvetiles_pipeline::scheduler::{PipelineDeps, Scheduler};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Clone)]
pub struct AppState {
	pub scheduler: Arc<Scheduler>,
	pub deps: Arc<PipelineDeps>,
}

/// Binds the service and runs until SIGINT/SIGTERM. Shutdown cancels every
/// queued and in-flight job; the wind-down budget is seconds, not minutes.
pub async fn serve(port: u16, scheduler: Arc<Scheduler>, deps: Arc<PipelineDeps>) -> Result<()> {
	let state = AppState {
		scheduler: Arc::clone(&scheduler),
		deps,
	};
	let app = routes::router(state);

	let listener = TcpListener::bind(("0.0.0.0", port))
		.await
		.with_context(|| format!("failed to bind port {port}"))?;
	log::info!("listening on 0.0.0.0:{port}");

	axum::serve(listener, app)
		.with_graceful_shutdown(async move {
			shutdown_signal().await;
			log::warn!("shutting down; cancelling jobs");
			scheduler.shutdown();
		})
		.await
		.context("http server failed")
}

async fn shutdown_signal() {
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
}
