use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use growthhub_core::usage::PlanTier;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub plan: Option<String>,
}

/// `GET /api/usage/{user_id}?plan=` — current usage against plan limits.
pub async fn get_usage(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<UsageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let plan = PlanTier::parse(query.plan.as_deref())?;
    let summary = state.gate.get_user_usage(&user_id, plan).await;
    Ok(Json(json!({ "data": summary })))
}

const DEFAULT_LOG_LIMIT: u32 = 50;
const MAX_LOG_LIMIT: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct UsageLogsQuery {
    pub limit: Option<u32>,
}

/// `GET /api/usage/{user_id}/logs?limit=` — newest usage entries first.
pub async fn list_usage_logs(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<UsageLogsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .clamp(1, MAX_LOG_LIMIT);
    let logs = state.db.list_usage_logs(&user_id, limit).await?;
    Ok(Json(json!({ "data": logs })))
}
