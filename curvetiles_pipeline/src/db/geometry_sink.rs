//! Batched upsert of road geometries, sized for ~10^6 rows per region.

use crate::error::Cancelled;
use anyhow::{Context, Result};
use curvetiles_core::{CancellationToken, RoadBounds};
use sqlx::{PgPool, Postgres, QueryBuilder};

/// Bind parameters per row: roadId, region, four extents, curvature.
pub const PARAMS_PER_ROW: usize = 7;

/// Batch bounds. 9,000 rows keep the statement at 63,000 parameters, safely
/// under the 65,535 ceiling of the wire protocol.
pub const MIN_BATCH_ROWS: usize = 5_000;
pub const MAX_BATCH_ROWS: usize = 9_000;

/// Rows per transaction. One transaction per region accumulates excessive
/// WAL; one per statement pays too many commit fees.
const ROWS_PER_TRANSACTION: usize = 500_000;

/// Clamps a caller-supplied batch size into the supported window.
pub fn clamp_batch_size(requested: usize) -> usize {
	requested.clamp(MIN_BATCH_ROWS, MAX_BATCH_ROWS)
}

fn push_upsert<'a>(builder: &mut QueryBuilder<'a, Postgres>, batch: &'a [RoadBounds]) {
	builder.push_values(batch, |mut row, road| {
		row
			.push_bind(&road.road_id)
			.push_bind(&road.region)
			.push_bind(road.bbox.min_lat)
			.push_bind(road.bbox.max_lat)
			.push_bind(road.bbox.min_lng)
			.push_bind(road.bbox.max_lng)
			.push_bind(&road.curvature);
	});
	builder.push(
		r#" ON CONFLICT ("roadId", "region") DO UPDATE SET
			"minLat" = EXCLUDED."minLat",
			"maxLat" = EXCLUDED."maxLat",
			"minLng" = EXCLUDED."minLng",
			"maxLng" = EXCLUDED."maxLng",
			"curvature" = EXCLUDED."curvature",
			"updatedAt" = now()"#,
	);
}

fn new_builder<'a>() -> QueryBuilder<'a, Postgres> {
	QueryBuilder::new(
		r#"INSERT INTO "RoadGeometry"
			("roadId", "region", "minLat", "maxLat", "minLng", "maxLng", "curvature") "#,
	)
}

/// Upserts all `roads`, returning the affected row count.
///
/// Conflicts on `(roadId, region)` overwrite the extents and curvature, so
/// re-extracting a region converges to identical final state and re-running
/// after a mid-insert failure is idempotent: committed chunks simply upsert
/// again.
pub async fn insert_road_geometries(
	pool: &PgPool,
	roads: &[RoadBounds],
	batch_size: usize,
	cancel: &CancellationToken,
) -> Result<u64> {
	let batch_size = clamp_batch_size(batch_size);
	let mut inserted = 0u64;

	for chunk in roads.chunks(ROWS_PER_TRANSACTION) {
		let mut tx = pool.begin().await.context("failed to open transaction")?;

		for batch in chunk.chunks(batch_size) {
			if cancel.is_cancelled() {
				tx.rollback().await.ok();
				return Err(anyhow::Error::new(Cancelled)).context("geometry insertion interrupted");
			}

			let mut builder = new_builder();
			push_upsert(&mut builder, batch);
			let result = builder.build().execute(&mut *tx).await;
			match result {
				Ok(done) => inserted += done.rows_affected(),
				Err(error) => {
					// Committed chunks stay; the upsert makes re-runs converge.
					tx.rollback().await.ok();
					return Err(error).context("geometry batch upsert failed");
				}
			}
		}

		tx.commit().await.context("failed to commit geometry chunk")?;
	}

	log::info!("upserted {inserted} road geometries");
	Ok(inserted)
}
