//! Segment filtering, aggregate metrics, comparison and prioritisation.
//!
//! Records are flat JSON objects. Field values are coerced loosely so that
//! numbers stored as strings still take part in numeric comparisons.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::format::{format_currency, format_fixed, format_number};

pub type Record = Map<String, Value>;

/// Unit cost attributed to each customer of channel and campaign segments.
pub const ACQUISITION_COST_PER_CUSTOMER: f64 = 1000.0;
/// Share of revenue attributed as cost for every other segment type.
pub const DEFAULT_COST_RATIO: f64 = 0.1;

pub const EQUIVALENT_PERFORMANCE_INSIGHT: &str = "両セグメントのパフォーマンスは同等です";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentType {
    Channel,
    Ltv,
    CustomerType,
    Campaign,
    ReferralSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    Contains,
    GreaterThan,
    LessThan,
    In,
    NotIn,
    /// Any operator name this build does not know; matches every record.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentFilter {
    pub field: String,
    pub operator: FilterOperator,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct SegmentMetrics {
    pub total_customers: u64,
    pub total_revenue: f64,
    pub average_order_value: f64,
    pub conversion_rate: f64,
    pub repeat_purchase_rate: f64,
    pub customer_lifetime_value: f64,
    pub roi: f64,
    pub growth_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub segment_type: SegmentType,
    pub description: String,
    pub filter: SegmentFilter,
    pub metrics: SegmentMetrics,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct SegmentDifferences {
    pub revenue: f64,
    pub conversion_rate: f64,
    pub aov: f64,
    pub roi: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentComparison {
    pub segment1: Segment,
    pub segment2: Segment,
    pub differences: SegmentDifferences,
    pub insights: Vec<String>,
}

// ---------------------------------------------------------------------------
// Loose value coercion
// ---------------------------------------------------------------------------

fn coerce_string(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(format_number)
            .unwrap_or_else(|| n.to_string()),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => coerce_string(Some(other)),
            })
            .collect::<Vec<_>>()
            .join(","),
        Some(Value::Object(_)) => "[object Object]".to_string(),
    }
}

fn coerce_number(value: Option<&Value>) -> f64 {
    match value {
        None => f64::NAN,
        Some(Value::Null) => 0.0,
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse::<f64>().unwrap_or(f64::NAN)
            }
        }
        Some(Value::Array(items)) => match items.as_slice() {
            [] => 0.0,
            [single] => coerce_number(Some(single)),
            _ => f64::NAN,
        },
        Some(Value::Object(_)) => f64::NAN,
    }
}

/// Strict equality: same kind and same value. Numbers compare numerically,
/// arrays and objects never compare equal.
fn strict_equals(field: Option<&Value>, expected: &Value) -> bool {
    match (field, expected) {
        (Some(Value::Number(a)), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        (Some(Value::String(a)), Value::String(b)) => a == b,
        (Some(Value::Bool(a)), Value::Bool(b)) => a == b,
        (Some(Value::Null), Value::Null) => true,
        _ => false,
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0 && !v.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Numeric field value; missing or non-numeric values count as zero.
fn numeric_or_zero(record: &Record, field: &str) -> f64 {
    let v = coerce_number(record.get(field));
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Epoch milliseconds of the record's `date` field, `None` when unparseable.
fn record_timestamp(record: &Record) -> Option<i64> {
    match record.get("date")? {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).map(|v| v as i64),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.timestamp_millis());
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                return Some(dt.and_utc().timestamp_millis());
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc().timestamp_millis())
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Filtering and aggregation
// ---------------------------------------------------------------------------

impl SegmentFilter {
    pub fn matches(&self, record: &Record) -> bool {
        let field = record.get(&self.field);
        match self.operator {
            FilterOperator::Equals => strict_equals(field, &self.value),
            FilterOperator::Contains => {
                coerce_string(field).contains(&coerce_string(Some(&self.value)))
            }
            FilterOperator::GreaterThan => {
                coerce_number(field) > coerce_number(Some(&self.value))
            }
            FilterOperator::LessThan => coerce_number(field) < coerce_number(Some(&self.value)),
            FilterOperator::In => match &self.value {
                Value::Array(items) => items.iter().any(|item| strict_equals(field, item)),
                _ => false,
            },
            FilterOperator::NotIn => match &self.value {
                Value::Array(items) => !items.iter().any(|item| strict_equals(field, item)),
                _ => false,
            },
            FilterOperator::Unknown => true,
        }
    }
}

pub fn filter_data_by_segment<'a>(records: &'a [Record], filter: &SegmentFilter) -> Vec<&'a Record> {
    records.iter().filter(|r| filter.matches(r)).collect()
}

fn sum_revenue(records: &[&Record]) -> f64 {
    records.iter().map(|r| numeric_or_zero(r, "revenue")).sum()
}

/// Revenue over attributed cost, as a multiplier.
///
/// Channel and campaign costs scale with the segment's configured customer
/// count rather than the filtered record count.
pub fn calculate_roi(segment: &Segment, revenue: f64) -> f64 {
    let cost = match segment.segment_type {
        SegmentType::Channel | SegmentType::Campaign => {
            segment.metrics.total_customers as f64 * ACQUISITION_COST_PER_CUSTOMER
        }
        _ => revenue * DEFAULT_COST_RATIO,
    };
    if cost > 0.0 {
        revenue / cost
    } else {
        0.0
    }
}

/// Percentage change of revenue between the later and earlier half of the
/// records ordered by `date`. Undated records sort after dated ones.
pub fn calculate_growth_rate(records: &[&Record]) -> f64 {
    if records.len() < 2 {
        return 0.0;
    }

    let mut sorted: Vec<(Option<i64>, &Record)> =
        records.iter().map(|r| (record_timestamp(r), *r)).collect();
    sorted.sort_by(|(a, _), (b, _)| match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    let mid = sorted.len() / 2;
    let first: f64 = sorted[..mid]
        .iter()
        .map(|(_, r)| numeric_or_zero(r, "revenue"))
        .sum();
    let second: f64 = sorted[mid..]
        .iter()
        .map(|(_, r)| numeric_or_zero(r, "revenue"))
        .sum();

    if first == 0.0 {
        return 0.0;
    }
    (second - first) / first * 100.0
}

/// Recompute every metric from the records matching the segment's filter.
///
/// `customer_lifetime_value` deliberately uses the same per-customer revenue
/// formula as `average_order_value`.
pub fn calculate_segment_metrics(segment: &Segment, records: &[Record]) -> SegmentMetrics {
    let filtered = filter_data_by_segment(records, &segment.filter);
    if filtered.is_empty() {
        return SegmentMetrics::default();
    }

    let count = filtered.len() as f64;
    let total_revenue = sum_revenue(&filtered);
    let converted = filtered
        .iter()
        .filter(|r| is_truthy(r.get("converted")))
        .count() as f64;
    let repeat = filtered
        .iter()
        .filter(|r| coerce_number(r.get("purchase_count")) > 1.0)
        .count() as f64;

    SegmentMetrics {
        total_customers: filtered.len() as u64,
        total_revenue,
        average_order_value: total_revenue / count,
        conversion_rate: converted / count * 100.0,
        repeat_purchase_rate: repeat / count * 100.0,
        customer_lifetime_value: total_revenue / count,
        roi: calculate_roi(segment, total_revenue),
        growth_rate: calculate_growth_rate(&filtered),
    }
}

/// Copy of `segment` with its metrics recomputed from `records`.
pub fn refresh_segment_metrics(segment: &Segment, records: &[Record]) -> Segment {
    Segment {
        metrics: calculate_segment_metrics(segment, records),
        ..segment.clone()
    }
}

// ---------------------------------------------------------------------------
// Comparison, priority, recommendations
// ---------------------------------------------------------------------------

pub fn compare_segments(segment1: &Segment, segment2: &Segment) -> SegmentComparison {
    let a = &segment1.metrics;
    let b = &segment2.metrics;
    let differences = SegmentDifferences {
        revenue: a.total_revenue - b.total_revenue,
        conversion_rate: a.conversion_rate - b.conversion_rate,
        aov: a.average_order_value - b.average_order_value,
        roi: a.roi - b.roi,
    };
    let insights = generate_insights(segment1, segment2, &differences);

    SegmentComparison {
        segment1: segment1.clone(),
        segment2: segment2.clone(),
        differences,
        insights,
    }
}

fn generate_insights(s1: &Segment, s2: &Segment, diff: &SegmentDifferences) -> Vec<String> {
    let mut insights = Vec::new();

    if diff.revenue > 0.0 {
        insights.push(format!(
            "{}は{}より{}の売上貢献が高い",
            s1.name,
            s2.name,
            format_currency(diff.revenue)
        ));
    }
    if diff.conversion_rate > 2.0 {
        insights.push(format!(
            "{}のCVRが{}より{}%高い",
            s1.name,
            s2.name,
            format_fixed(diff.conversion_rate, 1)
        ));
    }
    if diff.aov > 5000.0 {
        insights.push(format!(
            "{}のAOVが{}より{}高い",
            s1.name,
            s2.name,
            format_currency(diff.aov)
        ));
    }
    if diff.roi > 5.0 {
        insights.push(format!(
            "{}のROIが{}より{}倍高い",
            s1.name,
            s2.name,
            format_fixed(diff.roi, 1)
        ));
    }

    if insights.is_empty() {
        insights.push(EQUIVALENT_PERFORMANCE_INSIGHT.to_string());
    }
    insights
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorityWeights {
    pub roi: f64,
    pub growth_rate: f64,
    pub conversion_rate: f64,
    pub repeat_purchase_rate: f64,
    pub total_customers: f64,
}

pub const PRIORITY_WEIGHTS: PriorityWeights = PriorityWeights {
    roi: 0.30,
    growth_rate: 0.25,
    conversion_rate: 0.20,
    repeat_purchase_rate: 0.15,
    total_customers: 0.10,
};

fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Weighted score in `[0, 1]`. ROI saturates at 20x, growth at 20%,
/// CVR at 10%, customer count at 100.
pub fn calculate_segment_priority(segment: &Segment) -> f64 {
    let m = &segment.metrics;
    let w = PRIORITY_WEIGHTS;
    unit(m.roi / 20.0) * w.roi
        + unit(m.growth_rate / 20.0) * w.growth_rate
        + unit(m.conversion_rate / 10.0) * w.conversion_rate
        + unit(m.repeat_purchase_rate / 100.0) * w.repeat_purchase_rate
        + unit(m.total_customers as f64 / 100.0) * w.total_customers
}

/// Highest priority first; equal scores keep their input order.
pub fn rank_segments_by_priority(mut segments: Vec<Segment>) -> Vec<Segment> {
    segments.sort_by(|a, b| calculate_segment_priority(b).total_cmp(&calculate_segment_priority(a)));
    segments
}

pub fn generate_segment_recommendations(segment: &Segment) -> Vec<String> {
    let m = &segment.metrics;
    let mut recommendations = Vec::new();

    if m.conversion_rate < 3.0 {
        recommendations.push("CVR向上のため、ターゲティング広告の最適化を検討".to_string());
    }
    if m.repeat_purchase_rate < 30.0 {
        recommendations.push("リピート率向上のため、フォローアップメールの強化を推奨".to_string());
    }
    if m.roi < 10.0 {
        recommendations.push("ROI改善のため、コスト構造の見直しを検討".to_string());
    }
    if m.growth_rate < 5.0 {
        recommendations.push("成長率向上のため、新規顧客獲得施策の強化を推奨".to_string());
    }

    recommendations
}

// ---------------------------------------------------------------------------
// Default catalog
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn catalog_entry(
    id: &str,
    name: &str,
    segment_type: SegmentType,
    description: &str,
    field: &str,
    operator: FilterOperator,
    value: Value,
    metrics: SegmentMetrics,
) -> Segment {
    Segment {
        id: id.to_string(),
        name: name.to_string(),
        segment_type,
        description: description.to_string(),
        filter: SegmentFilter {
            field: field.to_string(),
            operator,
            value,
        },
        metrics,
        is_active: true,
    }
}

/// Segments configured at startup, with their last known metrics.
pub fn default_segments() -> Vec<Segment> {
    vec![
        catalog_entry(
            "line-referrals",
            "LINE経由紹介",
            SegmentType::Channel,
            "LINE公式アカウント経由の紹介顧客",
            "referral_channel",
            FilterOperator::Equals,
            json!("line"),
            SegmentMetrics {
                total_customers: 45,
                total_revenue: 890_000.0,
                average_order_value: 19_778.0,
                conversion_rate: 4.2,
                repeat_purchase_rate: 35.0,
                customer_lifetime_value: 45_000.0,
                roi: 18.5,
                growth_rate: 12.3,
            },
        ),
        catalog_entry(
            "instagram-referrals",
            "Instagram経由紹介",
            SegmentType::Channel,
            "Instagram経由の紹介顧客",
            "referral_channel",
            FilterOperator::Equals,
            json!("instagram"),
            SegmentMetrics {
                total_customers: 28,
                total_revenue: 520_000.0,
                average_order_value: 18_571.0,
                conversion_rate: 3.8,
                repeat_purchase_rate: 42.0,
                customer_lifetime_value: 38_000.0,
                roi: 15.2,
                growth_rate: 8.7,
            },
        ),
        catalog_entry(
            "high-ltv",
            "高LTV顧客",
            SegmentType::Ltv,
            "顧客生涯価値が高い顧客層",
            "customer_lifetime_value",
            FilterOperator::GreaterThan,
            json!(50_000),
            SegmentMetrics {
                total_customers: 23,
                total_revenue: 1_200_000.0,
                average_order_value: 52_174.0,
                conversion_rate: 6.5,
                repeat_purchase_rate: 78.0,
                customer_lifetime_value: 85_000.0,
                roi: 25.3,
                growth_rate: 15.8,
            },
        ),
        catalog_entry(
            "new-customers",
            "新規顧客",
            SegmentType::CustomerType,
            "初回購入の新規顧客",
            "purchase_count",
            FilterOperator::Equals,
            json!(1),
            SegmentMetrics {
                total_customers: 156,
                total_revenue: 2_840_000.0,
                average_order_value: 18_205.0,
                conversion_rate: 3.2,
                repeat_purchase_rate: 0.0,
                customer_lifetime_value: 18_205.0,
                roi: 12.7,
                growth_rate: 9.9,
            },
        ),
        catalog_entry(
            "repeat-customers",
            "リピート顧客",
            SegmentType::CustomerType,
            "2回以上の購入実績がある顧客",
            "purchase_count",
            FilterOperator::GreaterThan,
            json!(1),
            SegmentMetrics {
                total_customers: 89,
                total_revenue: 2_100_000.0,
                average_order_value: 23_596.0,
                conversion_rate: 5.8,
                repeat_purchase_rate: 100.0,
                customer_lifetime_value: 42_000.0,
                roi: 18.9,
                growth_rate: 12.1,
            },
        ),
        catalog_entry(
            "welcome-coupon",
            "WELCOME1000クーポン利用",
            SegmentType::Campaign,
            "新規顧客限定クーポンを利用した顧客",
            "used_coupons",
            FilterOperator::Contains,
            json!("WELCOME1000"),
            SegmentMetrics {
                total_customers: 45,
                total_revenue: 180_000.0,
                average_order_value: 4_000.0,
                conversion_rate: 4.5,
                repeat_purchase_rate: 22.0,
                customer_lifetime_value: 12_000.0,
                roi: 3.2,
                growth_rate: 8.3,
            },
        ),
    ]
}
