use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Extraction checkpoint, persisted next to the partial roads file so an
/// interrupted run can resume after the last processed tile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionProgress {
	pub total_tiles: u64,
	pub processed_tiles: u64,
	pub extracted_roads: u64,
	/// Empty until the first tile has been processed; resume is only
	/// attempted when nonempty.
	pub last_processed_tile: String,
	#[serde(with = "time::serde::rfc3339")]
	pub started_at: OffsetDateTime,
	pub status: String,
}

impl ExtractionProgress {
	pub fn new(total_tiles: u64) -> ExtractionProgress {
		ExtractionProgress {
			total_tiles,
			processed_tiles: 0,
			extracted_roads: 0,
			last_processed_tile: String::new(),
			started_at: OffsetDateTime::now_utc(),
			status: "running".to_string(),
		}
	}
}
