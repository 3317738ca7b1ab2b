use super::{AppState, handlers};
use axum::{
	Router,
	routing::{get, post},
};

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/api/generate", post(handlers::submit_job))
		.route("/api/jobs", get(handlers::list_jobs))
		.route("/api/jobs/{id}", get(handlers::get_job))
		.route("/api/stream/{id}", get(handlers::stream_job))
		.route("/api/cancel/{id}", post(handlers::cancel_job))
		.route("/api/regions", get(handlers::list_regions))
		.route("/health", get(handlers::health))
		.route("/tiles/{region}/{z}/{x}/{y}", get(handlers::serve_tile))
		.with_state(state)
}
