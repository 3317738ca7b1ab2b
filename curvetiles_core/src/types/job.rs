//! Job records: the unit of durability for one pipeline invocation.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use time::OffsetDateTime;
use uuid::Uuid;

/// Per-job state machine. `Completed`, `Failed` and `Cancelled` are terminal;
/// their emission closes subscriber streams.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
	Pending,
	Processing,
	Extracting,
	Converting,
	Generating,
	ExtractingGeometry,
	Inserting,
	Uploading,
	Completed,
	Failed,
	Cancelled,
}

impl JobStatus {
	pub fn is_terminal(&self) -> bool {
		matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			JobStatus::Pending => "pending",
			JobStatus::Processing => "processing",
			JobStatus::Extracting => "extracting",
			JobStatus::Converting => "converting",
			JobStatus::Generating => "generating",
			JobStatus::ExtractingGeometry => "extracting-geometry",
			JobStatus::Inserting => "inserting",
			JobStatus::Uploading => "uploading",
			JobStatus::Completed => "completed",
			JobStatus::Failed => "failed",
			JobStatus::Cancelled => "cancelled",
		}
	}
}

impl Display for JobStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::str::FromStr for JobStatus {
	type Err = anyhow::Error;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		Ok(match value {
			"pending" => JobStatus::Pending,
			"processing" => JobStatus::Processing,
			"extracting" => JobStatus::Extracting,
			"converting" => JobStatus::Converting,
			"generating" => JobStatus::Generating,
			"extracting-geometry" => JobStatus::ExtractingGeometry,
			"inserting" => JobStatus::Inserting,
			"uploading" => JobStatus::Uploading,
			"completed" => JobStatus::Completed,
			"failed" => JobStatus::Failed,
			"cancelled" => JobStatus::Cancelled,
			other => anyhow::bail!("unknown job status {other:?}"),
		})
	}
}

/// Per-job option flags, set at submission and immutable afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobOptions {
	pub min_zoom: u8,
	pub max_zoom: u8,
	pub skip_upload: bool,
	pub skip_merge: bool,
	/// Reuse the existing regional pyramid instead of cutting tiles; used to
	/// re-run extraction or publishing against a prior build.
	pub skip_generation: bool,
	pub no_cleanup: bool,
	pub extract_geometry: bool,
	pub skip_geometry_insertion: bool,
	pub merge_all: bool,
}

impl Default for JobOptions {
	fn default() -> Self {
		JobOptions {
			min_zoom: 5,
			max_zoom: 16,
			skip_upload: false,
			skip_merge: false,
			skip_generation: false,
			no_cleanup: false,
			extract_geometry: true,
			skip_geometry_insertion: false,
			merge_all: false,
		}
	}
}

/// A stored record of one pipeline invocation. In-memory state may be lost,
/// but a stored job can be reopened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileJob {
	pub id: String,
	pub region: String,
	pub status: JobStatus,
	#[serde(flatten)]
	pub options: JobOptions,

	pub roads_extracted: u64,
	pub tiles_generated: u64,
	pub total_size_bytes: u64,
	/// Fraction of upload objects completed, 0.0..=1.0.
	pub upload_progress: f64,
	pub uploaded_bytes: u64,

	pub current_step: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error_message: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error_log: Option<String>,

	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
	#[serde(
		with = "time::serde::rfc3339::option",
		skip_serializing_if = "Option::is_none",
		default
	)]
	pub started_at: Option<OffsetDateTime>,
	#[serde(
		with = "time::serde::rfc3339::option",
		skip_serializing_if = "Option::is_none",
		default
	)]
	pub completed_at: Option<OffsetDateTime>,
}

impl TileJob {
	pub fn new(region: &str, options: JobOptions) -> TileJob {
		let now = OffsetDateTime::now_utc();
		TileJob {
			id: Uuid::new_v4().to_string(),
			region: region.to_string(),
			status: JobStatus::Pending,
			options,
			roads_extracted: 0,
			tiles_generated: 0,
			total_size_bytes: 0,
			upload_progress: 0.0,
			uploaded_bytes: 0,
			current_step: String::new(),
			error_message: None,
			error_log: None,
			created_at: now,
			updated_at: now,
			started_at: None,
			completed_at: None,
		}
	}

	pub fn set_status(&mut self, status: JobStatus) {
		let now = OffsetDateTime::now_utc();
		if status == JobStatus::Processing && self.started_at.is_none() {
			self.started_at = Some(now);
		}
		if status.is_terminal() {
			self.completed_at = Some(now);
		}
		self.status = status;
		self.updated_at = now;
	}

	pub fn set_step(&mut self, step: &str) {
		self.current_step = step.to_string();
		self.updated_at = OffsetDateTime::now_utc();
	}

	pub fn fail(&mut self, message: String, error_log: Option<String>) {
		self.error_message = Some(message);
		self.error_log = error_log;
		self.set_status(JobStatus::Failed);
	}
}
