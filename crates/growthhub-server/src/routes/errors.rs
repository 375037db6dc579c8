use axum::{response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use growthhub_core::fallback::classify_error;

#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    pub message: String,
}

/// `POST /api/errors/classify` — map an error message to a display kind and
/// recovery actions.
pub async fn classify(Json(req): Json<ClassifyRequest>) -> impl IntoResponse {
    let kind = classify_error(&req.message);
    Json(json!({
        "data": {
            "kind": kind,
            "title": kind.title(),
            "message": req.message,
            "actions": kind.actions(),
        }
    }))
}
