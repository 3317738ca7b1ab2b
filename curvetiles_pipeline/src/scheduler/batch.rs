//! Batch mode: a worker pool drains a list of regions, each through the full
//! pipeline. Workers are independent; one region's failure never stops its
//! siblings.

use super::{runner::run_pipeline, state::JobState};
use crate::error::is_cancelled;
use crate::scheduler::PipelineDeps;
use curvetiles_core::{CancellationToken, JobOptions, JobStatus, TileJob};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct BatchReport {
	pub succeeded: Vec<String>,
	pub failed: Vec<(String, String)>,
	pub cancelled: Vec<String>,
}

impl BatchReport {
	pub fn all_succeeded(&self) -> bool {
		self.failed.is_empty() && self.cancelled.is_empty()
	}
}

/// Runs the pipeline for every region with at most `workers` in flight.
pub async fn run_batch(
	deps: Arc<PipelineDeps>,
	state: JobState,
	regions: Vec<String>,
	options: JobOptions,
	workers: usize,
	cancel: CancellationToken,
) -> BatchReport {
	let workers = workers.max(1);
	let report = Arc::new(Mutex::new(BatchReport::default()));
	log::info!("batch run over {} regions with {workers} workers", regions.len());

	futures::stream::iter(regions)
		.for_each_concurrent(workers, |region| {
			let deps = Arc::clone(&deps);
			let state = state.clone();
			let report = Arc::clone(&report);
			let cancel = cancel.clone();
			async move {
				let outcome = run_region(&deps, &state, &region, options, &cancel).await;
				let mut report = report.lock().await;
				match outcome {
					RegionOutcome::Succeeded => report.succeeded.push(region),
					RegionOutcome::Cancelled => report.cancelled.push(region),
					RegionOutcome::Failed(message) => report.failed.push((region, message)),
				}
			}
		})
		.await;

	let report = Arc::try_unwrap(report).map_or_else(|_| BatchReport::default(), Mutex::into_inner);
	log::info!(
		"batch finished: {} succeeded, {} failed, {} cancelled",
		report.succeeded.len(),
		report.failed.len(),
		report.cancelled.len()
	);
	report
}

enum RegionOutcome {
	Succeeded,
	Failed(String),
	Cancelled,
}

async fn run_region(
	deps: &Arc<PipelineDeps>,
	state: &JobState,
	region: &str,
	options: JobOptions,
	cancel: &CancellationToken,
) -> RegionOutcome {
	let mut job = TileJob::new(region, options);
	job.set_status(JobStatus::Processing);
	let job_id = job.id.clone();
	state.insert(job, cancel.child_token()).await;

	match run_pipeline(deps, state, &job_id, cancel).await {
		Ok(()) => {
			state
				.update(&job_id, |job| job.set_status(JobStatus::Completed))
				.await;
			RegionOutcome::Succeeded
		}
		Err(error) if is_cancelled(&error) => {
			state
				.update(&job_id, |job| job.set_status(JobStatus::Cancelled))
				.await;
			RegionOutcome::Cancelled
		}
		Err(error) => {
			log::error!("region {region} failed: {error:#}");
			state
				.update(&job_id, |job| job.fail(format!("{error:#}"), Some(format!("{error:?}"))))
				.await;
			RegionOutcome::Failed(format!("{error:#}"))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::db::JobStore;

	#[tokio::test]
	async fn failures_do_not_stop_siblings() {
		// No archives exist, so every region fails -- but every region is
		// attempted and reported.
		let deps = Arc::new(PipelineDeps::for_tests());
		let state = JobState::new(JobStore::Disabled);
		let regions: Vec<String> = ["a", "b", "c", "d"].iter().map(ToString::to_string).collect();

		let report = run_batch(
			deps,
			state.clone(),
			regions,
			JobOptions::default(),
			4,
			CancellationToken::new(),
		)
		.await;

		assert_eq!(report.failed.len(), 4);
		assert!(report.succeeded.is_empty());
		assert!(!report.all_succeeded());
		assert_eq!(state.list().await.len(), 4);
	}

	#[tokio::test]
	async fn pre_cancelled_batch_reports_cancellations_or_failures() {
		let deps = Arc::new(PipelineDeps::for_tests());
		let state = JobState::new(JobStore::Disabled);
		let cancel = CancellationToken::new();
		cancel.cancel();

		let report = run_batch(
			deps,
			state,
			vec!["a".to_string()],
			JobOptions::default(),
			2,
			cancel,
		)
		.await;
		assert!(report.succeeded.is_empty());
	}
}
