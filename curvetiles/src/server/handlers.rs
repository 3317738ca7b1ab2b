use super::AppState;
use axum::{
	Json,
	extract::{Path, State},
	http::{StatusCode, header},
	response::{
		IntoResponse, Response,
		sse::{Event, KeepAlive, Sse},
	},
};
use curvetiles_core::{JobOptions, TileJob};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{convert::Infallible, time::Duration};
use tokio::sync::broadcast;

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateRequest {
	pub region: String,
	pub min_zoom: u8,
	pub max_zoom: u8,
	pub skip_upload: bool,
	pub skip_generation: bool,
	pub extract_geometry: Option<bool>,
	pub skip_geometry_insertion: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
	pub job_id: String,
	pub message: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
	(status, Json(json!({ "error": message }))).into_response()
}

pub async fn submit_job(State(state): State<AppState>, Json(request): Json<GenerateRequest>) -> Response {
	if request.region.trim().is_empty() {
		return error_response(StatusCode::BAD_REQUEST, "region is required");
	}

	let options = JobOptions {
		// Zero means "use the defaults", which pin the production minimum.
		min_zoom: if request.min_zoom == 0 { 5 } else { request.min_zoom },
		max_zoom: if request.max_zoom == 0 { 16 } else { request.max_zoom },
		skip_upload: request.skip_upload,
		skip_generation: request.skip_generation,
		extract_geometry: request.extract_geometry.unwrap_or(true),
		skip_geometry_insertion: request.skip_geometry_insertion,
		..JobOptions::default()
	};

	match state.scheduler.submit(&request.region, options).await {
		Ok(job) => Json(SubmitResponse {
			job_id: job.id,
			message: format!("job queued for region {}", request.region),
		})
		.into_response(),
		Err(error) => error_response(StatusCode::SERVICE_UNAVAILABLE, &error.to_string()),
	}
}

pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<TileJob>> {
	Json(state.scheduler.state().list().await)
}

pub async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> Response {
	// In-memory first; fall back to the relational store after restarts.
	match state.scheduler.state().get_or_fetch(&id).await {
		Some(job) => Json(job).into_response(),
		None => error_response(StatusCode::NOT_FOUND, "job not found"),
	}
}

pub async fn cancel_job(State(state): State<AppState>, Path(id): Path<String>) -> Response {
	if state.scheduler.state().cancel(&id).await {
		Json(json!({ "message": "cancellation requested" })).into_response()
	} else {
		error_response(StatusCode::NOT_FOUND, "job not found")
	}
}

struct StreamState {
	events: broadcast::Receiver<TileJob>,
	pending: Option<TileJob>,
	done: bool,
}

/// SSE stream of job status updates: the current snapshot first, then one
/// event per update. A terminal status closes the stream; keepalive
/// comments flow every 30 seconds in between.
pub async fn stream_job(State(state): State<AppState>, Path(id): Path<String>) -> Response {
	let Some(subscription) = state.scheduler.state().subscribe(&id).await else {
		return error_response(StatusCode::NOT_FOUND, "job not found");
	};

	let initial_done = subscription.job.status.is_terminal();
	let stream = futures::stream::unfold(
		StreamState {
			events: subscription.events,
			pending: Some(subscription.job),
			done: initial_done,
		},
		|mut stream_state| async move {
			if let Some(job) = stream_state.pending.take() {
				let event = Event::default().json_data(&job).ok()?;
				return Some((Ok::<_, Infallible>(event), stream_state));
			}
			if stream_state.done {
				return None;
			}
			loop {
				match stream_state.events.recv().await {
					Ok(job) => {
						stream_state.done = job.status.is_terminal();
						let event = Event::default().json_data(&job).ok()?;
						return Some((Ok(event), stream_state));
					}
					Err(broadcast::error::RecvError::Lagged(missed)) => {
						log::debug!("sse subscriber lagged by {missed} events");
					}
					Err(broadcast::error::RecvError::Closed) => return None,
				}
			}
		},
	);

	Sse::new(stream)
		.keep_alive(KeepAlive::new().interval(Duration::from_secs(30)).text("keepalive"))
		.into_response()
}

/// Regions available for generation, inferred from the archive directory.
pub async fn list_regions(State(state): State<AppState>) -> Response {
	let archive_dir = state.deps.config.paths.archive_dir.clone();
	let mut regions = Vec::new();
	match std::fs::read_dir(&archive_dir) {
		Ok(entries) => {
			for entry in entries.flatten() {
				let name = entry.file_name().to_string_lossy().into_owned();
				if let Some(stem) = name.strip_suffix(".c_1000.curves.kmz") {
					regions.push(stem.strip_prefix("us-").unwrap_or(stem).to_string());
				}
			}
		}
		Err(error) => {
			log::error!("failed to read archive directory {archive_dir:?}: {error}");
			return error_response(StatusCode::INTERNAL_SERVER_ERROR, "archive directory unavailable");
		}
	}
	regions.sort();
	regions.dedup();
	Json(regions).into_response()
}

pub async fn health() -> Json<serde_json::Value> {
	let time = time::OffsetDateTime::now_utc()
		.format(&time::format_description::well_known::Rfc3339)
		.unwrap_or_default();
	Json(json!({ "status": "ok", "time": time }))
}

/// Serves a raw tile from disk: `/tiles/{region}/{z}/{x}/{y}.pbf`.
pub async fn serve_tile(
	State(state): State<AppState>,
	Path((region, z, x, y)): Path<(String, String, String, String)>,
) -> Response {
	// Path parameters cannot contain '/', but dotted names could still
	// escape the output directory.
	if region.starts_with('.') || region.contains("..") {
		return error_response(StatusCode::NOT_FOUND, "tile not found");
	}
	let Some(y) = y.strip_suffix(".pbf") else {
		return error_response(StatusCode::NOT_FOUND, "tile not found");
	};
	let (Ok(z), Ok(x), Ok(y)) = (z.parse::<u8>(), x.parse::<u32>(), y.parse::<u32>()) else {
		return error_response(StatusCode::NOT_FOUND, "tile not found");
	};

	let path = state
		.deps
		.config
		.paths
		.output_dir
		.join(&region)
		.join(z.to_string())
		.join(x.to_string())
		.join(format!("{y}.pbf"));

	match tokio::fs::read(&path).await {
		Ok(data) => ([(header::CONTENT_TYPE, "application/x-protobuf")], data).into_response(),
		Err(_) => error_response(StatusCode::NOT_FOUND, "tile not found"),
	}
}
