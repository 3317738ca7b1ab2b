//! Shared types and low-level utilities for the curvetiles pipeline:
//! tile coordinates, geographic bounding boxes, job records, configuration
//! and the little-endian value readers used by the vector-tile codec.

pub mod config;
pub use config::*;
pub mod io;
pub mod types;
pub use types::*;
pub mod utils;

/// Cancellation token threaded through every pipeline phase.
pub use tokio_util::sync::CancellationToken;
