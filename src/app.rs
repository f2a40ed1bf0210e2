use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::shared::AppState;
use crate::stats::handlers;

/// Builds the HTTP surface: mutation ingress plus per-tournament bucket reads
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/mutations", post(handlers::post_mutation))
        .route(
            "/tournaments/:tournament_id/buckets",
            get(handlers::list_buckets),
        )
        .route(
            "/tournaments/:tournament_id/buckets/:period",
            get(handlers::get_bucket),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
