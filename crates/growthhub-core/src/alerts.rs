//! Rule-based alert generation over KPI, coupon, referral and usage snapshots.
//!
//! Every generator is a pure function of its snapshot and the generation
//! instant. A missing snapshot simply contributes no alerts.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::format::{format_fixed, format_grouped, format_number};
use crate::usage::UsageCheck;

pub const SALES_DECLINE_THRESHOLD: f64 = -10.0;
pub const CVR_DECLINE_THRESHOLD: f64 = -15.0;
pub const CUSTOMER_DECLINE_THRESHOLD: f64 = -20.0;
pub const AOV_DECLINE_THRESHOLD: f64 = -5.0;
pub const COUPON_LOW_STOCK_REMAINING: u32 = 5;
pub const COUPON_EXPIRING_DAYS: u32 = 7;
pub const REFERRAL_LOW_COMPLETION_RATE: f64 = 60.0;
pub const REFERRAL_HIGH_REWARD_COST: f64 = 50_000.0;
pub const USAGE_LOW_REMAINING_DAILY: u32 = 3;

/// Alerts older than this are dropped by [`filter_expired_alerts`].
pub const ALERT_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Warning,
    Error,
    Info,
    Success,
}

/// Ordered so that `High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    Kpi,
    Coupon,
    Referral,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub title: String,
    pub message: String,
    pub action: String,
    pub severity: Severity,
    pub category: AlertCategory,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dismissed: Option<bool>,
}

impl Alert {
    #[allow(clippy::too_many_arguments)]
    fn new(
        kind: &str,
        alert_type: AlertType,
        title: String,
        message: &str,
        action: &str,
        severity: Severity,
        category: AlertCategory,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("{kind}-{}", now.timestamp_millis()),
            alert_type,
            title,
            message: message.to_string(),
            action: action.to_string(),
            severity,
            category,
            timestamp: now,
            dismissed: None,
        }
    }

    pub fn dismiss(&mut self) {
        self.dismissed = Some(true);
    }

    pub fn is_dismissed(&self) -> bool {
        self.dismissed == Some(true)
    }
}

/// One KPI with its period-over-period change in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct MetricDelta {
    pub current: f64,
    pub previous: f64,
    pub change: f64,
}

impl MetricDelta {
    /// Derive `change` from the raw values; a zero baseline yields 0.
    pub fn new(current: f64, previous: f64) -> Self {
        let change = if previous == 0.0 {
            0.0
        } else {
            (current - previous) / previous * 100.0
        };
        Self {
            current,
            previous,
            change,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct KpiMetrics {
    pub sales: MetricDelta,
    pub new_customers: MetricDelta,
    pub conversion_rate: MetricDelta,
    pub average_order_value: MetricDelta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CouponMetrics {
    pub active_coupons: u32,
    pub total_usage: u32,
    #[serde(default)]
    pub low_stock_coupons: Vec<String>,
    #[serde(default)]
    pub expiring_coupons: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ReferralMetrics {
    pub total_referrals: u32,
    pub completed_referrals: u32,
    #[serde(default)]
    pub conversion_rate: f64,
    pub avg_reward_amount: f64,
}

impl ReferralMetrics {
    /// Completed share in percent, `None` when there are no referrals.
    pub fn completion_rate(&self) -> Option<f64> {
        if self.total_referrals == 0 {
            return None;
        }
        Some(f64::from(self.completed_referrals) / f64::from(self.total_referrals) * 100.0)
    }

    pub fn total_reward_cost(&self) -> f64 {
        f64::from(self.total_referrals) * self.avg_reward_amount
    }
}

pub fn generate_kpi_alerts(kpi: &KpiMetrics, now: DateTime<Utc>) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if kpi.sales.change < SALES_DECLINE_THRESHOLD {
        alerts.push(Alert::new(
            "sales-decline",
            AlertType::Warning,
            format!("売上が前月比{}%下落", format_number(kpi.sales.change.abs())),
            "売上の急激な下落が検出されました。マーケティング施策の見直しを推奨します。",
            "売上分析レポート確認",
            Severity::High,
            AlertCategory::Kpi,
            now,
        ));
    }

    if kpi.conversion_rate.change < CVR_DECLINE_THRESHOLD {
        alerts.push(Alert::new(
            "cvr-decline",
            AlertType::Warning,
            format!(
                "CVRが前週比{}%低下",
                format_number(kpi.conversion_rate.change.abs())
            ),
            "コンバージョン率が急落しています。カート放棄メールの送信を推奨します。",
            "カート放棄メール送信",
            Severity::Medium,
            AlertCategory::Kpi,
            now,
        ));
    }

    if kpi.new_customers.change < CUSTOMER_DECLINE_THRESHOLD {
        alerts.push(Alert::new(
            "customers-decline",
            AlertType::Warning,
            format!(
                "新規顧客が前月比{}%減少",
                format_number(kpi.new_customers.change.abs())
            ),
            "新規顧客の獲得が減少しています。集客施策の強化を検討してください。",
            "集客施策強化",
            Severity::Medium,
            AlertCategory::Kpi,
            now,
        ));
    }

    if kpi.average_order_value.change < AOV_DECLINE_THRESHOLD {
        alerts.push(Alert::new(
            "aov-decline",
            AlertType::Info,
            format!(
                "AOVが前月比{}%低下",
                format_number(kpi.average_order_value.change.abs())
            ),
            "平均注文額が低下しています。クロスセル・アップセル施策の見直しを推奨します。",
            "クロスセル施策確認",
            Severity::Low,
            AlertCategory::Kpi,
            now,
        ));
    }

    alerts
}

/// Only the first low-stock and the first expiring code are reported.
pub fn generate_coupon_alerts(coupon: &CouponMetrics, now: DateTime<Utc>) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if let Some(code) = coupon.low_stock_coupons.first() {
        alerts.push(Alert::new(
            "coupon-low-stock",
            AlertType::Warning,
            format!("クーポン「{code}」残り{COUPON_LOW_STOCK_REMAINING}回"),
            "新規顧客限定クーポンの利用可能回数が少なくなっています。",
            "クーポン追加発行",
            Severity::Medium,
            AlertCategory::Coupon,
            now,
        ));
    }

    if let Some(code) = coupon.expiring_coupons.first() {
        alerts.push(Alert::new(
            "coupon-expiring",
            AlertType::Info,
            format!("クーポン「{code}」が{COUPON_EXPIRING_DAYS}日後に期限切れ"),
            "クーポンの有効期限が近づいています。利用促進を検討してください。",
            "利用促進キャンペーン",
            Severity::Low,
            AlertCategory::Coupon,
            now,
        ));
    }

    alerts
}

pub fn generate_referral_alerts(referral: &ReferralMetrics, now: DateTime<Utc>) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if let Some(rate) = referral.completion_rate() {
        if rate < REFERRAL_LOW_COMPLETION_RATE {
            alerts.push(Alert::new(
                "referral-low-rate",
                AlertType::Warning,
                format!("紹介完了率が{}%と低い", format_fixed(rate, 1)),
                "紹介の完了率が低下しています。紹介プロセスの改善を検討してください。",
                "紹介プロセス改善",
                Severity::Medium,
                AlertCategory::Referral,
                now,
            ));
        }
    }

    let cost = referral.total_reward_cost();
    if cost > REFERRAL_HIGH_REWARD_COST {
        alerts.push(Alert::new(
            "referral-high-cost",
            AlertType::Info,
            format!("紹介報酬コストが{}円と高額", format_grouped(cost)),
            "紹介報酬の総コストが高くなっています。報酬設定の見直しを検討してください。",
            "報酬設定見直し",
            Severity::Low,
            AlertCategory::Referral,
            now,
        ));
    }

    alerts
}

pub fn generate_system_alerts(usage: Option<&UsageCheck>, now: DateTime<Utc>) -> Vec<Alert> {
    let Some(usage) = usage else {
        return Vec::new();
    };
    let mut alerts = Vec::new();

    if !usage.can_use {
        let message = usage.message.as_deref().unwrap_or(
            "本日の利用制限に達しました。プランのアップグレードを検討してください。",
        );
        alerts.push(Alert::new(
            "usage-limit",
            AlertType::Error,
            "利用制限に達しました".to_string(),
            message,
            "プランアップグレード",
            Severity::High,
            AlertCategory::System,
            now,
        ));
    }

    if usage.remaining.daily < USAGE_LOW_REMAINING_DAILY {
        alerts.push(Alert::new(
            "usage-warning",
            AlertType::Warning,
            format!("本日の利用回数が残り{}回", usage.remaining.daily),
            "本日の利用回数が少なくなっています。重要な分析は早めに実行してください。",
            "利用制限確認",
            Severity::Medium,
            AlertCategory::System,
            now,
        ));
    }

    alerts
}

/// All generators in KPI, coupon, referral, system order, then stable-sorted
/// by severity (high first).
pub fn generate_all_alerts(
    kpi: &KpiMetrics,
    coupon: &CouponMetrics,
    referral: &ReferralMetrics,
    usage: Option<&UsageCheck>,
    now: DateTime<Utc>,
) -> Vec<Alert> {
    let mut alerts = generate_kpi_alerts(kpi, now);
    alerts.extend(generate_coupon_alerts(coupon, now));
    alerts.extend(generate_referral_alerts(referral, now));
    alerts.extend(generate_system_alerts(usage, now));
    sort_by_severity(&mut alerts);
    alerts
}

pub fn sort_by_severity(alerts: &mut [Alert]) {
    alerts.sort_by(|a, b| b.severity.cmp(&a.severity));
}

/// Keep the first alert seen for each `(category, title)` pair.
///
/// Two distinct conditions that happen to render the same title in the same
/// category collapse into one.
pub fn deduplicate_alerts(alerts: Vec<Alert>) -> Vec<Alert> {
    let mut seen: HashSet<(AlertCategory, String)> = HashSet::new();
    alerts
        .into_iter()
        .filter(|alert| seen.insert((alert.category, alert.title.clone())))
        .collect()
}

/// Keep alerts strictly newer than `now - 24h`.
pub fn filter_expired_alerts(alerts: Vec<Alert>, now: DateTime<Utc>) -> Vec<Alert> {
    let cutoff = now - Duration::hours(ALERT_TTL_HOURS);
    alerts
        .into_iter()
        .filter(|alert| alert.timestamp > cutoff)
        .collect()
}

pub fn active_alerts(alerts: Vec<Alert>) -> Vec<Alert> {
    alerts.into_iter().filter(|a| !a.is_dismissed()).collect()
}
