use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{routes, state::AppState};

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(allowed))
    }
}

/// Construct the [`Router`] with all routes and middleware attached.
///
/// CORS is open unless `GROWTHHUB_CORS_ORIGINS` lists explicit origins.
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/alerts", post(routes::alerts::evaluate_alerts))
        .route("/api/segments", get(routes::segments::list_segments))
        .route(
            "/api/segments/compare",
            post(routes::segments::compare_segments),
        )
        .route(
            "/api/segments/{id}/metrics",
            post(routes::segments::refresh_metrics),
        )
        .route("/api/usage/{user_id}", get(routes::usage::get_usage))
        .route(
            "/api/usage/{user_id}/logs",
            get(routes::usage::list_usage_logs),
        )
        .route("/api/generate", post(routes::generate::generate))
        .route("/api/errors/classify", post(routes::errors::classify))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
