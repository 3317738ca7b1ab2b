//! The job scheduler: an in-memory queue of capacity 100 drained by a single
//! worker task, a shared job map behind a reader-writer lock, and per-job
//! status broadcasts for SSE subscribers.

pub mod batch;
mod runner;
mod state;

pub use runner::{PipelineDeps, run_pipeline};
pub use state::{JobState, SubscribeResult};

use crate::error::is_cancelled;
use curvetiles_core::{CancellationToken, JobOptions, JobStatus, TileJob};
use std::{
	fmt::{self, Display},
	sync::Arc,
};
use tokio::sync::mpsc;

/// Submission past this capacity fails fast instead of queueing unbounded.
pub const QUEUE_CAPACITY: usize = 100;

/// Submission failure: the queue is at capacity.
#[derive(Debug)]
pub struct QueueFull;

impl Display for QueueFull {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("job queue is full")
	}
}

impl std::error::Error for QueueFull {}

pub struct Scheduler {
	state: JobState,
	queue: mpsc::Sender<String>,
	root_cancel: CancellationToken,
}

impl Scheduler {
	/// Starts the worker task and returns the handle used by the HTTP layer.
	pub fn start(deps: Arc<PipelineDeps>, state: JobState) -> Scheduler {
		let (queue, mut receiver) = mpsc::channel::<String>(QUEUE_CAPACITY);
		let root_cancel = CancellationToken::new();

		let worker_state = state.clone();
		let worker_cancel = root_cancel.clone();
		tokio::spawn(async move {
			while let Some(job_id) = receiver.recv().await {
				process_job(&deps, &worker_state, &job_id).await;
				if worker_cancel.is_cancelled() {
					break;
				}
			}
			log::info!("job worker stopped");
		});

		Scheduler {
			state,
			queue,
			root_cancel,
		}
	}

	pub fn state(&self) -> &JobState {
		&self.state
	}

	/// Queues a new job. Fails fast with [`QueueFull`] at capacity.
	pub async fn submit(&self, region: &str, options: JobOptions) -> Result<TileJob, QueueFull> {
		let job = TileJob::new(region, options);
		let cancel = self.root_cancel.child_token();
		self.state.insert(job.clone(), cancel).await;

		if self.queue.try_send(job.id.clone()).is_err() {
			self.state.remove(&job.id).await;
			return Err(QueueFull);
		}
		log::info!("queued job {} for region {region}", job.id);
		Ok(job)
	}

	/// Cancels everything: queued jobs never start, in-flight jobs stop at
	/// their next suspension point.
	pub fn shutdown(&self) {
		self.root_cancel.cancel();
	}
}

async fn process_job(deps: &Arc<PipelineDeps>, state: &JobState, job_id: &str) {
	let Some((job, cancel)) = state.entry(job_id).await else {
		log::error!("queued job {job_id} has no entry");
		return;
	};

	// Cancelled while still queued: never run.
	if cancel.is_cancelled() || job.status == JobStatus::Cancelled {
		state
			.update(job_id, |job| {
				if !job.status.is_terminal() {
					job.set_status(JobStatus::Cancelled);
				}
			})
			.await;
		return;
	}

	state
		.update(job_id, |job| {
			job.set_status(JobStatus::Processing);
			job.set_step("starting pipeline");
		})
		.await;

	match run_pipeline(deps, state, job_id, &cancel).await {
		Ok(()) => {
			state
				.update(job_id, |job| {
					job.set_step("done");
					job.set_status(JobStatus::Completed);
				})
				.await;
		}
		Err(error) if is_cancelled(&error) => {
			log::info!("job {job_id} cancelled");
			state
				.update(job_id, |job| job.set_status(JobStatus::Cancelled))
				.await;
		}
		Err(error) => {
			log::error!("job {job_id} failed: {error:#}");
			state
				.update(job_id, |job| {
					job.fail(format!("{error:#}"), Some(format!("{error:?}")));
				})
				.await;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::db::JobStore;

	#[tokio::test]
	async fn queue_full_submission_fails_fast_and_leaves_no_entry() {
		// A scheduler whose worker is never driven: fill the queue.
		let state = JobState::new(JobStore::Disabled);
		let (queue, _receiver) = mpsc::channel::<String>(2);
		let scheduler = Scheduler {
			state: state.clone(),
			queue,
			root_cancel: CancellationToken::new(),
		};

		scheduler.submit("a", JobOptions::default()).await.unwrap();
		scheduler.submit("b", JobOptions::default()).await.unwrap();
		let error = scheduler.submit("c", JobOptions::default()).await.unwrap_err();
		assert_eq!(error.to_string(), "job queue is full");
		// The rejected job does not linger in the map.
		assert_eq!(state.list().await.len(), 2);
	}

	#[tokio::test]
	async fn cancel_before_start_never_runs() {
		let state = JobState::new(JobStore::Disabled);
		let job = TileJob::new("oregon", JobOptions::default());
		let cancel = CancellationToken::new();
		state.insert(job.clone(), cancel.clone()).await;
		state.cancel(&job.id).await;

		// Worker picks it up afterwards.
		let deps = Arc::new(PipelineDeps::for_tests());
		process_job(&deps, &state, &job.id).await;

		let stored = state.get(&job.id).await.unwrap();
		assert_eq!(stored.status, JobStatus::Cancelled);
	}
}
