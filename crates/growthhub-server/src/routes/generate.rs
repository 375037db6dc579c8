use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use growthhub_core::usage::PlanTier;

use crate::{error::AppError, state::AppState};

const MAX_PROMPT_CHARS: usize = 8000;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub user_id: String,
    pub prompt: String,
    pub plan: Option<String>,
}

/// `POST /api/generate` — quota-checked text generation.
///
/// Quota denials and generator failures are reported in the body
/// (`success: false`), not as HTTP errors.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = req.user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::invalid("user_id", "user_id must not be empty"));
    }
    if req.prompt.trim().is_empty() {
        return Err(AppError::invalid("prompt", "prompt must not be empty"));
    }
    if req.prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(AppError::invalid(
            "prompt",
            format!("prompt must be {MAX_PROMPT_CHARS} characters or fewer"),
        ));
    }
    let plan = PlanTier::parse(req.plan.as_deref())?;

    let result = state
        .gate
        .generate_text_with_limit(user_id, &req.prompt, plan)
        .await;
    Ok(Json(json!({ "data": result })))
}
