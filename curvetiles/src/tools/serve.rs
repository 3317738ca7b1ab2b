use crate::server;
use anyhow::Result;
use curvetiles_pipeline::scheduler::{JobState, Scheduler};
use std::sync::Arc;

#[derive(clap::Args, Debug)]
pub struct Subcommand {
	/// Port to listen on
	#[arg(short, long, default_value_t = 8080)]
	pub port: u16,
}

#[tokio::main]
pub async fn run(arguments: &Subcommand) -> Result<()> {
	let (deps, job_store) = super::build_deps().await?;
	let state = JobState::new(job_store);
	let scheduler = Arc::new(Scheduler::start(Arc::clone(&deps), state));

	server::serve(arguments.port, scheduler, deps).await
}
