use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use growthhub_core::alerts::{
    active_alerts, deduplicate_alerts, filter_expired_alerts, generate_all_alerts,
    sort_by_severity, Alert, CouponMetrics, KpiMetrics, ReferralMetrics,
};
use growthhub_core::usage::{PlanTier, UsageCheck};

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct AlertsRequest {
    #[serde(default)]
    pub kpi: KpiMetrics,
    #[serde(default)]
    pub coupon: CouponMetrics,
    #[serde(default)]
    pub referral: ReferralMetrics,
    pub usage_info: Option<UsageCheck>,
    pub user_id: Option<String>,
    pub plan: Option<String>,
    /// Alerts the client already holds, including dismissals.
    #[serde(default)]
    pub previous_alerts: Vec<Alert>,
}

/// `POST /api/alerts` — evaluate the current metrics into alerts.
///
/// Previously held alerts come first so their dismissal state survives
/// deduplication against freshly generated ones.
pub async fn evaluate_alerts(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AlertsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let plan = PlanTier::parse(req.plan.as_deref())?;
    let usage = match (req.usage_info, req.user_id.as_deref().map(str::trim)) {
        (Some(info), _) => Some(info),
        (None, Some("")) => return Err(AppError::invalid("user_id", "user_id must not be empty")),
        (None, Some(user_id)) => Some(state.gate.check_usage_limit(user_id, plan).await),
        (None, None) => None,
    };

    let now = Utc::now();
    let mut merged = req.previous_alerts;
    merged.extend(generate_all_alerts(
        &req.kpi,
        &req.coupon,
        &req.referral,
        usage.as_ref(),
        now,
    ));
    let mut alerts = active_alerts(deduplicate_alerts(filter_expired_alerts(merged, now)));
    sort_by_severity(&mut alerts);

    tracing::debug!(count = alerts.len(), "alerts evaluated");
    Ok(Json(json!({ "data": alerts })))
}
