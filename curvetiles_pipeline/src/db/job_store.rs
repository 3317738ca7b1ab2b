//! Durable job records. The store is deliberately tolerant at startup: a
//! missing or unreachable database downgrades to `Disabled`, where every
//! call is a logged no-op. Losing the database mid-job is a hard error at
//! the call site instead.

use super::schema::ensure_schema;
use anyhow::{Context, Result};
use curvetiles_core::{DatabaseConfig, JobOptions, JobStatus, TileJob};
use sqlx::{PgPool, Row, postgres::PgPoolOptions, postgres::PgRow};
use std::time::Duration;
use time::OffsetDateTime;

#[derive(Clone)]
pub enum JobStore {
	Postgres(PgPool),
	Disabled,
}

impl JobStore {
	/// Connects and bootstraps the schema; any failure produces the
	/// `Disabled` store with a warning.
	pub async fn connect(database: Option<&DatabaseConfig>) -> JobStore {
		let Some(database) = database else {
			return JobStore::Disabled;
		};
		match JobStore::try_connect(database).await {
			Ok(pool) => JobStore::Postgres(pool),
			Err(error) => {
				log::warn!("database unavailable ({error:#}); job tracking is disabled");
				JobStore::Disabled
			}
		}
	}

	async fn try_connect(database: &DatabaseConfig) -> Result<PgPool> {
		let pool = PgPoolOptions::new()
			.max_connections(25)
			.min_connections(5)
			.max_lifetime(Duration::from_secs(300))
			.acquire_timeout(Duration::from_secs(5))
			.connect(&database.url())
			.await
			.context("failed to connect to database")?;

		tokio::time::timeout(Duration::from_secs(5), sqlx::query("SELECT 1").execute(&pool))
			.await
			.context("database ping timed out")?
			.context("database ping failed")?;

		ensure_schema(&pool).await?;
		Ok(pool)
	}

	pub fn is_enabled(&self) -> bool {
		matches!(self, JobStore::Postgres(_))
	}

	pub fn pool(&self) -> Option<&PgPool> {
		match self {
			JobStore::Postgres(pool) => Some(pool),
			JobStore::Disabled => None,
		}
	}

	/// Upserts the full job record; called at every status transition.
	pub async fn save_job(&self, job: &TileJob) -> Result<()> {
		let JobStore::Postgres(pool) = self else {
			log::debug!("job store disabled; not persisting job {}", job.id);
			return Ok(());
		};

		sqlx::query(
			r#"INSERT INTO "TileJob" (
				"id", "region", "status",
				"minZoom", "maxZoom", "skipUpload", "skipMerge", "skipGeneration",
				"noCleanup", "extractGeometry", "skipGeometryInsertion", "mergeAll",
				"roadsExtracted", "tilesGenerated", "totalSizeBytes",
				"uploadProgress", "uploadedBytes",
				"currentStep", "errorMessage", "errorLog",
				"createdAt", "updatedAt", "startedAt", "completedAt"
			) VALUES (
				$1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
				$13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24
			)
			ON CONFLICT ("id") DO UPDATE SET
				"status" = EXCLUDED."status",
				"roadsExtracted" = EXCLUDED."roadsExtracted",
				"tilesGenerated" = EXCLUDED."tilesGenerated",
				"totalSizeBytes" = EXCLUDED."totalSizeBytes",
				"uploadProgress" = EXCLUDED."uploadProgress",
				"uploadedBytes" = EXCLUDED."uploadedBytes",
				"currentStep" = EXCLUDED."currentStep",
				"errorMessage" = EXCLUDED."errorMessage",
				"errorLog" = EXCLUDED."errorLog",
				"updatedAt" = EXCLUDED."updatedAt",
				"startedAt" = EXCLUDED."startedAt",
				"completedAt" = EXCLUDED."completedAt""#,
		)
		.bind(&job.id)
		.bind(&job.region)
		.bind(job.status.as_str())
		.bind(i16::from(job.options.min_zoom))
		.bind(i16::from(job.options.max_zoom))
		.bind(job.options.skip_upload)
		.bind(job.options.skip_merge)
		.bind(job.options.skip_generation)
		.bind(job.options.no_cleanup)
		.bind(job.options.extract_geometry)
		.bind(job.options.skip_geometry_insertion)
		.bind(job.options.merge_all)
		.bind(job.roads_extracted as i64)
		.bind(job.tiles_generated as i64)
		.bind(job.total_size_bytes as i64)
		.bind(job.upload_progress)
		.bind(job.uploaded_bytes as i64)
		.bind(&job.current_step)
		.bind(&job.error_message)
		.bind(&job.error_log)
		.bind(job.created_at)
		.bind(job.updated_at)
		.bind(job.started_at)
		.bind(job.completed_at)
		.execute(pool)
		.await
		.with_context(|| format!("failed to persist job {}", job.id))?;

		Ok(())
	}

	/// Fetches one job by id; `Ok(None)` when absent or disabled.
	pub async fn fetch_job(&self, id: &str) -> Result<Option<TileJob>> {
		let JobStore::Postgres(pool) = self else {
			return Ok(None);
		};

		let row = sqlx::query(r#"SELECT * FROM "TileJob" WHERE "id" = $1"#)
			.bind(id)
			.fetch_optional(pool)
			.await
			.with_context(|| format!("failed to fetch job {id}"))?;

		row.map(|row| job_from_row(&row)).transpose()
	}
}

fn job_from_row(row: &PgRow) -> Result<TileJob> {
	let status: String = row.try_get("status")?;
	Ok(TileJob {
		id: row.try_get("id")?,
		region: row.try_get("region")?,
		status: status.parse::<JobStatus>()?,
		options: JobOptions {
			min_zoom: row.try_get::<i16, _>("minZoom")? as u8,
			max_zoom: row.try_get::<i16, _>("maxZoom")? as u8,
			skip_upload: row.try_get("skipUpload")?,
			skip_merge: row.try_get("skipMerge")?,
			skip_generation: row.try_get("skipGeneration")?,
			no_cleanup: row.try_get("noCleanup")?,
			extract_geometry: row.try_get("extractGeometry")?,
			skip_geometry_insertion: row.try_get("skipGeometryInsertion")?,
			merge_all: row.try_get("mergeAll")?,
		},
		roads_extracted: row.try_get::<i64, _>("roadsExtracted")? as u64,
		tiles_generated: row.try_get::<i64, _>("tilesGenerated")? as u64,
		total_size_bytes: row.try_get::<i64, _>("totalSizeBytes")? as u64,
		upload_progress: row.try_get("uploadProgress")?,
		uploaded_bytes: row.try_get::<i64, _>("uploadedBytes")? as u64,
		current_step: row.try_get("currentStep")?,
		error_message: row.try_get("errorMessage")?,
		error_log: row.try_get("errorLog")?,
		created_at: row.try_get::<OffsetDateTime, _>("createdAt")?,
		updated_at: row.try_get::<OffsetDateTime, _>("updatedAt")?,
		started_at: row.try_get::<Option<OffsetDateTime>, _>("startedAt")?,
		completed_at: row.try_get::<Option<OffsetDateTime>, _>("completedAt")?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn disabled_store_is_a_no_op() {
		let store = JobStore::connect(None).await;
		assert!(!store.is_enabled());
		assert!(store.pool().is_none());

		let job = TileJob::new("oregon", JobOptions::default());
		store.save_job(&job).await.unwrap();
		assert!(store.fetch_job(&job.id).await.unwrap().is_none());
	}
}
