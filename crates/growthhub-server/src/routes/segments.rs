use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use growthhub_core::segments::{
    calculate_segment_priority, compare_segments as compare, generate_segment_recommendations,
    rank_segments_by_priority, refresh_segment_metrics, Record, Segment,
};

use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize)]
pub struct RankedSegment {
    #[serde(flatten)]
    pub segment: Segment,
    pub priority: f64,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct MetricsRequest {
    #[serde(default)]
    pub records: Vec<Record>,
}

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    pub segment1_id: String,
    pub segment2_id: String,
}

/// `GET /api/segments` — active segments, highest priority first.
pub async fn list_segments(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let active: Vec<Segment> = state
        .segments
        .iter()
        .filter(|s| s.is_active)
        .cloned()
        .collect();
    let ranked: Vec<RankedSegment> = rank_segments_by_priority(active)
        .into_iter()
        .map(|segment| RankedSegment {
            priority: calculate_segment_priority(&segment),
            recommendations: generate_segment_recommendations(&segment),
            segment,
        })
        .collect();
    Json(json!({ "data": ranked }))
}

/// `POST /api/segments/{id}/metrics` — recompute a segment's metrics from raw
/// records. The catalog entry itself is left untouched.
pub async fn refresh_metrics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<MetricsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let segment = state
        .find_segment(&id)
        .ok_or_else(|| AppError::NotFound(format!("segment {id}")))?;
    let refreshed = refresh_segment_metrics(segment, &req.records);
    tracing::info!(
        segment_id = %id,
        records = req.records.len(),
        customers = refreshed.metrics.total_customers,
        "segment metrics refreshed"
    );
    Ok(Json(json!({ "data": refreshed })))
}

/// `POST /api/segments/compare` — pairwise comparison with insights.
pub async fn compare_segments(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CompareRequest>,
) -> Result<impl IntoResponse, AppError> {
    let first = state
        .find_segment(&req.segment1_id)
        .ok_or_else(|| AppError::NotFound(format!("segment {}", req.segment1_id)))?;
    let second = state
        .find_segment(&req.segment2_id)
        .ok_or_else(|| AppError::NotFound(format!("segment {}", req.segment2_id)))?;
    Ok(Json(json!({ "data": compare(first, second) })))
}
