//! Relational store: schema bootstrap, the batched geometry upsert and the
//! job record store. All of it degrades to warnings when no database is
//! configured; only mid-job loss is fatal.

mod geometry_sink;
mod job_store;
mod schema;

pub use geometry_sink::{MAX_BATCH_ROWS, MIN_BATCH_ROWS, clamp_batch_size, insert_road_geometries};
pub use job_store::JobStore;
pub use schema::ensure_schema;
