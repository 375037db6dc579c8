//! Plan tiers, usage-log records and quota window arithmetic.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const STORE_FAILURE_MESSAGE: &str = "利用状況の確認に失敗しました";
pub const CHECK_FAILURE_MESSAGE: &str = "利用制限の確認に失敗しました";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    #[default]
    Free,
    Personal,
    Business,
}

impl PlanTier {
    pub fn parse(raw: Option<&str>) -> Result<Self, CoreError> {
        match raw.map(str::trim) {
            None | Some("") | Some("free") => Ok(Self::Free),
            Some("personal") => Ok(Self::Personal),
            Some("business") => Ok(Self::Business),
            Some(other) => Err(CoreError::UnknownPlan(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Personal => "personal",
            Self::Business => "business",
        }
    }

    pub fn limits(&self) -> PlanLimits {
        match self {
            Self::Free => PlanLimits::new(5, 50, "フリープラン"),
            Self::Personal => PlanLimits::new(100, 3000, "パーソナルプラン"),
            Self::Business => PlanLimits::new(500, 15000, "ビジネスプラン"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    pub daily: u32,
    pub monthly: u32,
    pub name: String,
}

impl PlanLimits {
    fn new(daily: u32, monthly: u32, name: &str) -> Self {
        Self {
            daily,
            monthly,
            name: name.to_string(),
        }
    }
}

impl Default for PlanLimits {
    fn default() -> Self {
        PlanTier::Free.limits()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApiType {
    #[default]
    Gemini,
    Other,
}

impl ApiType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "gemini" => Self::Gemini,
            _ => Self::Other,
        }
    }
}

/// One billed generation call. Rows are only ever appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageLog {
    pub id: String,
    pub user_id: String,
    pub plan_type: PlanTier,
    pub api_type: ApiType,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<i64>,
}

impl UsageLog {
    pub fn new(
        user_id: &str,
        plan_type: PlanTier,
        api_type: ApiType,
        tokens_used: Option<i64>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            plan_type,
            api_type,
            created_at,
            tokens_used,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Remaining {
    pub daily: u32,
    pub monthly: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UsageCounts {
    pub daily: u64,
    pub monthly: u64,
}

/// Outcome of a quota check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageCheck {
    pub can_use: bool,
    pub remaining: Remaining,
    #[serde(default)]
    pub limits: PlanLimits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl UsageCheck {
    /// Denial used whenever usage cannot be determined. Never fails open.
    pub fn fail_closed(limits: PlanLimits, message: &str) -> Self {
        Self {
            can_use: false,
            remaining: Remaining::default(),
            limits,
            message: Some(message.to_string()),
        }
    }
}

/// Start instants of the current daily and monthly quota windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageWindows {
    pub day_start: DateTime<Utc>,
    pub month_start: DateTime<Utc>,
}

impl UsageWindows {
    /// Windows containing `now`, bounded by local midnight and the first of
    /// the month in `tz`. Returns `None` when local midnight does not exist
    /// (a DST gap at 00:00).
    pub fn at(now: DateTime<Utc>, tz: Tz) -> Option<Self> {
        let today = now.with_timezone(&tz).date_naive();
        let month_first = NaiveDate::from_ymd_opt(today.year(), today.month(), 1)?;
        Some(Self {
            day_start: local_midnight(today, tz)?,
            month_start: local_midnight(month_first, tz)?,
        })
    }
}

fn local_midnight(date: NaiveDate, tz: Tz) -> Option<DateTime<Utc>> {
    let naive = date.and_hms_opt(0, 0, 0)?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

fn remaining_of(limit: u32, used: u64) -> u32 {
    u64::from(limit)
        .saturating_sub(used)
        .try_into()
        .unwrap_or(0)
}

/// Compare window counts against plan limits. The daily message wins when
/// both windows are exhausted.
pub fn evaluate_usage(limits: PlanLimits, counts: UsageCounts) -> UsageCheck {
    let remaining = Remaining {
        daily: remaining_of(limits.daily, counts.daily),
        monthly: remaining_of(limits.monthly, counts.monthly),
    };
    let can_use = remaining.daily > 0 && remaining.monthly > 0;

    let message = if can_use {
        None
    } else if remaining.daily == 0 {
        Some(format!(
            "本日の利用制限（{}回）に達しました。明日までお待ちください。",
            limits.daily
        ))
    } else {
        Some(format!(
            "今月の利用制限（{}回）に達しました。来月までお待ちください。",
            limits.monthly
        ))
    };

    UsageCheck {
        can_use,
        remaining,
        limits,
        message,
    }
}

/// Per-user usage overview shown on the usage status screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSummary {
    pub plan: PlanTier,
    pub limits: PlanLimits,
    pub usage: UsageCounts,
    pub remaining: Remaining,
    pub can_use: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl UsageSummary {
    pub fn from_check(plan: PlanTier, check: UsageCheck) -> Self {
        let usage = UsageCounts {
            daily: u64::from(check.limits.daily.saturating_sub(check.remaining.daily)),
            monthly: u64::from(check.limits.monthly.saturating_sub(check.remaining.monthly)),
        };
        Self {
            plan,
            limits: check.limits,
            usage,
            remaining: check.remaining,
            can_use: check.can_use,
            message: check.message,
        }
    }
}

/// Append-only usage log storage.
///
/// Windows are expressed as a lower bound only; counts include every row at
/// or after `since`.
#[async_trait]
pub trait UsageLogStore: Send + Sync + 'static {
    async fn count_usage_since(&self, user_id: &str, since: DateTime<Utc>) -> anyhow::Result<u64>;
    async fn append_usage_log(&self, log: &UsageLog) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .expect("valid timestamp")
            .with_timezone(&Utc)
    }

    fn log_at(user: &str, raw: &str) -> UsageLog {
        UsageLog::new(user, PlanTier::Free, ApiType::Gemini, None, at(raw))
    }

    #[test]
    fn plan_limits_are_fixed() {
        assert_eq!(PlanTier::Free.limits(), PlanLimits::new(5, 50, "フリープラン"));
        assert_eq!(PlanTier::Personal.limits().daily, 100);
        assert_eq!(PlanTier::Personal.limits().monthly, 3000);
        assert_eq!(PlanTier::Business.limits().daily, 500);
        assert_eq!(PlanTier::Business.limits().monthly, 15000);
    }

    #[test]
    fn plan_parse_defaults_to_free() {
        assert_eq!(PlanTier::parse(None).expect("plan"), PlanTier::Free);
        assert_eq!(PlanTier::parse(Some("business")).expect("plan"), PlanTier::Business);
        assert!(PlanTier::parse(Some("enterprise")).is_err());
    }

    #[test]
    fn windows_follow_local_midnight() {
        // 2026-03-01 16:30 UTC is already 2026-03-02 01:30 in Tokyo.
        let windows = UsageWindows::at(at("2026-03-01T16:30:00Z"), chrono_tz::Asia::Tokyo)
            .expect("windows");
        assert_eq!(windows.day_start, at("2026-03-01T15:00:00Z"));
        assert_eq!(windows.month_start, at("2026-02-28T15:00:00Z"));
    }

    #[test]
    fn counts_reset_by_window_boundary() {
        let now = at("2026-05-20T12:00:00Z");
        let windows = UsageWindows::at(now, chrono_tz::UTC).expect("windows");
        let logs = vec![
            log_at("u1", "2026-05-20T00:00:00Z"),
            log_at("u1", "2026-05-20T11:59:00Z"),
            log_at("u1", "2026-05-19T23:59:59Z"),
            log_at("u1", "2026-05-01T00:00:00Z"),
            log_at("u1", "2026-04-30T23:59:59Z"),
            log_at("someone-else", "2026-05-20T10:00:00Z"),
        ];
        let mine = logs.iter().filter(|log| log.user_id == "u1");
        let daily = mine.clone().filter(|log| log.created_at >= windows.day_start).count();
        let monthly = mine.filter(|log| log.created_at >= windows.month_start).count();
        assert_eq!((daily, monthly), (2, 4));
    }

    #[test]
    fn daily_exhaustion_denies_regardless_of_monthly() {
        let check = evaluate_usage(
            PlanTier::Free.limits(),
            UsageCounts { daily: 5, monthly: 5 },
        );
        assert!(!check.can_use);
        assert_eq!(check.remaining.daily, 0);
        assert_eq!(check.remaining.monthly, 45);
        let message = check.message.expect("message");
        assert!(message.contains("本日の利用制限"));
        assert!(message.contains('5'));
    }

    #[test]
    fn daily_message_takes_priority_over_monthly() {
        let check = evaluate_usage(
            PlanTier::Free.limits(),
            UsageCounts { daily: 7, monthly: 60 },
        );
        assert_eq!(check.remaining, Remaining { daily: 0, monthly: 0 });
        assert!(check.message.expect("message").contains("本日"));
    }

    #[test]
    fn monthly_exhaustion_message() {
        let check = evaluate_usage(
            PlanTier::Free.limits(),
            UsageCounts { daily: 1, monthly: 50 },
        );
        assert!(!check.can_use);
        assert_eq!(check.remaining.daily, 4);
        assert!(check.message.expect("message").contains("今月の利用制限（50回）"));
    }

    #[test]
    fn allowed_check_has_no_message() {
        let check = evaluate_usage(
            PlanTier::Personal.limits(),
            UsageCounts { daily: 10, monthly: 100 },
        );
        assert!(check.can_use);
        assert_eq!(check.remaining, Remaining { daily: 90, monthly: 2900 });
        assert!(check.message.is_none());
    }

    #[test]
    fn summary_derives_used_counts() {
        let check = evaluate_usage(
            PlanTier::Free.limits(),
            UsageCounts { daily: 3, monthly: 20 },
        );
        let summary = UsageSummary::from_check(PlanTier::Free, check);
        assert_eq!(summary.usage, UsageCounts { daily: 3, monthly: 20 });
        assert_eq!(summary.remaining, Remaining { daily: 2, monthly: 30 });
        assert!(summary.can_use);
    }
}
