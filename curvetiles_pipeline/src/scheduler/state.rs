//! The shared in-memory job map. List endpoints take the read lock,
//! mutations the write lock; every mutation broadcasts a snapshot to the
//! job's subscribers and persists the record.

use crate::db::JobStore;
use curvetiles_core::{CancellationToken, JobStatus, TileJob};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{RwLock, broadcast};

/// Buffered status events per subscriber; slow subscribers lag and drop.
const EVENT_BUFFER: usize = 32;

struct JobEntry {
	job: TileJob,
	cancel: CancellationToken,
	events: broadcast::Sender<TileJob>,
}

pub struct SubscribeResult {
	pub job: TileJob,
	pub events: broadcast::Receiver<TileJob>,
}

#[derive(Clone)]
pub struct JobState {
	entries: Arc<RwLock<HashMap<String, JobEntry>>>,
	store: JobStore,
}

impl JobState {
	pub fn new(store: JobStore) -> JobState {
		JobState {
			entries: Arc::new(RwLock::new(HashMap::new())),
			store,
		}
	}

	pub fn store(&self) -> &JobStore {
		&self.store
	}

	pub async fn insert(&self, job: TileJob, cancel: CancellationToken) {
		let (events, _) = broadcast::channel(EVENT_BUFFER);
		let snapshot = job.clone();
		self.entries.write().await.insert(
			job.id.clone(),
			JobEntry { job, cancel, events },
		);
		if let Err(error) = self.store.save_job(&snapshot).await {
			log::error!("failed to persist new job {}: {error:#}", snapshot.id);
		}
	}

	pub async fn remove(&self, id: &str) {
		self.entries.write().await.remove(id);
	}

	/// Mutates a job under the write lock, then broadcasts and persists the
	/// resulting snapshot. The broadcast is non-blocking; subscribers that
	/// cannot keep up miss intermediate states, never block the pipeline.
	pub async fn update<F>(&self, id: &str, mutate: F) -> Option<TileJob>
	where
		F: FnOnce(&mut TileJob),
	{
		let snapshot = {
			let mut entries = self.entries.write().await;
			let entry = entries.get_mut(id)?;
			mutate(&mut entry.job);
			let snapshot = entry.job.clone();
			let _ = entry.events.send(snapshot.clone());
			snapshot
		};
		if let Err(error) = self.store.save_job(&snapshot).await {
			log::error!("failed to persist job {id}: {error:#}");
		}
		Some(snapshot)
	}

	pub async fn list(&self) -> Vec<TileJob> {
		let entries = self.entries.read().await;
		let mut jobs: Vec<TileJob> = entries.values().map(|entry| entry.job.clone()).collect();
		jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
		jobs
	}

	pub async fn get(&self, id: &str) -> Option<TileJob> {
		self.entries.read().await.get(id).map(|entry| entry.job.clone())
	}

	/// Falls back to the relational store when the job is not in memory,
	/// e.g. after a restart.
	pub async fn get_or_fetch(&self, id: &str) -> Option<TileJob> {
		if let Some(job) = self.get(id).await {
			return Some(job);
		}
		match self.store.fetch_job(id).await {
			Ok(job) => job,
			Err(error) => {
				log::error!("failed to fetch job {id}: {error:#}");
				None
			}
		}
	}

	pub(crate) async fn entry(&self, id: &str) -> Option<(TileJob, CancellationToken)> {
		self
			.entries
			.read()
			.await
			.get(id)
			.map(|entry| (entry.job.clone(), entry.cancel.clone()))
	}

	pub async fn subscribe(&self, id: &str) -> Option<SubscribeResult> {
		let entries = self.entries.read().await;
		let entry = entries.get(id)?;
		Some(SubscribeResult {
			job: entry.job.clone(),
			events: entry.events.subscribe(),
		})
	}

	/// Requests cancellation. Queued jobs flip to `cancelled` immediately;
	/// running jobs observe the token at their next suspension point.
	pub async fn cancel(&self, id: &str) -> bool {
		let pending = {
			let entries = self.entries.read().await;
			let Some(entry) = entries.get(id) else {
				return false;
			};
			entry.cancel.cancel();
			entry.job.status == JobStatus::Pending
		};
		if pending {
			self.update(id, |job| job.set_status(JobStatus::Cancelled)).await;
		}
		true
	}
}
