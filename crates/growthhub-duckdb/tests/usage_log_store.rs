use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use growthhub_core::{
    generation::{GenerationError, TextGenerator},
    quota::UsageQuotaGate,
    usage::{ApiType, PlanTier, UsageLog, UsageLogStore},
};
use growthhub_duckdb::DuckDbBackend;

fn at(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

fn entry(user_id: &str, created_at: DateTime<Utc>) -> UsageLog {
    UsageLog::new(user_id, PlanTier::Free, ApiType::Gemini, Some(120), created_at)
}

struct EchoGenerator;

#[async_trait]
impl TextGenerator for EchoGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        Ok(format!("echo: {prompt}"))
    }
}

// ---------------------------------------------------------------------------
// BDD: counts only include the user's rows at or after the lower bound
// ---------------------------------------------------------------------------
#[tokio::test]
async fn counts_rows_since_lower_bound() {
    let db = DuckDbBackend::open_in_memory().expect("open");
    for raw in [
        "2026-05-19T23:59:59Z",
        "2026-05-20T00:00:00Z",
        "2026-05-20T09:30:00Z",
    ] {
        db.append_usage_log(&entry("u1", at(raw))).await.expect("append");
    }
    db.append_usage_log(&entry("u2", at("2026-05-20T10:00:00Z")))
        .await
        .expect("append");

    let store: &dyn UsageLogStore = &db;
    let today = store
        .count_usage_since("u1", at("2026-05-20T00:00:00Z"))
        .await
        .expect("count");
    assert_eq!(today, 2);
    let month = store
        .count_usage_since("u1", at("2026-05-01T00:00:00Z"))
        .await
        .expect("count");
    assert_eq!(month, 3);
    let nobody = store
        .count_usage_since("ghost", at("2026-01-01T00:00:00Z"))
        .await
        .expect("count");
    assert_eq!(nobody, 0);
}

// ---------------------------------------------------------------------------
// BDD: listing returns stored fields newest first
// ---------------------------------------------------------------------------
#[tokio::test]
async fn lists_logs_newest_first() {
    let db = DuckDbBackend::open_in_memory().expect("open");
    let older = entry("u1", at("2026-05-20T08:00:00.250Z"));
    let newer = UsageLog::new(
        "u1",
        PlanTier::Business,
        ApiType::Other,
        None,
        at("2026-05-20T09:00:00Z"),
    );
    db.append_usage_log(&older).await.expect("append");
    db.append_usage_log(&newer).await.expect("append");

    let logs = db.list_usage_logs("u1", 10).await.expect("list");
    assert_eq!(logs, vec![newer, older]);

    let limited = db.list_usage_logs("u1", 1).await.expect("list");
    assert_eq!(limited.len(), 1);
}

// ---------------------------------------------------------------------------
// BDD: schema is idempotent and records its migration
// ---------------------------------------------------------------------------
#[tokio::test]
async fn schema_records_migration() {
    let db = DuckDbBackend::open_in_memory().expect("open");
    db.ping().await.expect("ping");
    let conn = db.conn_for_test().await;
    let applied: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM _migrations WHERE id = '0001_usage_logs'",
            [],
            |row| row.get(0),
        )
        .expect("query");
    assert_eq!(applied, 1);
}

// ---------------------------------------------------------------------------
// BDD: the quota gate over DuckDB denies the sixth free call of the day
// ---------------------------------------------------------------------------
#[tokio::test]
async fn gate_denies_after_free_daily_limit() {
    let db = Arc::new(DuckDbBackend::open_in_memory().expect("open"));
    let gate = UsageQuotaGate::new(db.clone(), Arc::new(EchoGenerator), chrono_tz::UTC);

    for i in 0..5 {
        let result = gate
            .generate_text_with_limit("demo-user", &format!("分析 {i}"), PlanTier::Free)
            .await;
        assert!(result.success, "call {i} should pass");
    }

    let denied = gate
        .generate_text_with_limit("demo-user", "分析 5", PlanTier::Free)
        .await;
    assert!(!denied.success);
    assert!(denied.message.expect("message").contains("（5回）"));

    let since = Utc::now() - Duration::days(1);
    assert_eq!(db.count_usage_since("demo-user", since).await.expect("count"), 5);
}
