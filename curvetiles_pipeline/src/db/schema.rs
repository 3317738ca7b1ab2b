use anyhow::{Context, Result};
use sqlx::PgPool;

/// Bootstrap DDL, idempotent by construction.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS "TileJob" (
	"id" TEXT PRIMARY KEY,
	"region" TEXT NOT NULL,
	"status" TEXT NOT NULL,
	"minZoom" SMALLINT NOT NULL,
	"maxZoom" SMALLINT NOT NULL,
	"skipUpload" BOOLEAN NOT NULL DEFAULT FALSE,
	"skipMerge" BOOLEAN NOT NULL DEFAULT FALSE,
	"skipGeneration" BOOLEAN NOT NULL DEFAULT FALSE,
	"noCleanup" BOOLEAN NOT NULL DEFAULT FALSE,
	"extractGeometry" BOOLEAN NOT NULL DEFAULT TRUE,
	"skipGeometryInsertion" BOOLEAN NOT NULL DEFAULT FALSE,
	"mergeAll" BOOLEAN NOT NULL DEFAULT FALSE,
	"roadsExtracted" BIGINT NOT NULL DEFAULT 0,
	"tilesGenerated" BIGINT NOT NULL DEFAULT 0,
	"totalSizeBytes" BIGINT NOT NULL DEFAULT 0,
	"uploadProgress" DOUBLE PRECISION NOT NULL DEFAULT 0,
	"uploadedBytes" BIGINT NOT NULL DEFAULT 0,
	"currentStep" TEXT NOT NULL DEFAULT '',
	"errorMessage" TEXT,
	"errorLog" TEXT,
	"createdAt" TIMESTAMPTZ NOT NULL,
	"updatedAt" TIMESTAMPTZ NOT NULL,
	"startedAt" TIMESTAMPTZ,
	"completedAt" TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS "TileJob_region_idx" ON "TileJob" ("region");

CREATE TABLE IF NOT EXISTS "RoadGeometry" (
	"id" BIGSERIAL PRIMARY KEY,
	"roadId" TEXT NOT NULL,
	"region" TEXT NOT NULL,
	"minLat" DOUBLE PRECISION NOT NULL,
	"maxLat" DOUBLE PRECISION NOT NULL,
	"minLng" DOUBLE PRECISION NOT NULL,
	"maxLng" DOUBLE PRECISION NOT NULL,
	"curvature" TEXT,
	"createdAt" TIMESTAMPTZ NOT NULL DEFAULT now(),
	"updatedAt" TIMESTAMPTZ NOT NULL DEFAULT now(),
	CONSTRAINT "RoadGeometry_roadId_region_key" UNIQUE ("roadId", "region")
);

CREATE INDEX IF NOT EXISTS "RoadGeometry_region_idx" ON "RoadGeometry" ("region");

CREATE INDEX IF NOT EXISTS "RoadGeometry_bbox_idx"
	ON "RoadGeometry" ("minLat", "maxLat", "minLng", "maxLng");
"#;

/// Creates the `TileJob` and `RoadGeometry` tables and their indices. The
/// composite bbox index backs the overlap lookups of the consuming API.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
	sqlx::raw_sql(SCHEMA_SQL)
		.execute(pool)
		.await
		.context("failed to apply database schema")?;
	Ok(())
}
