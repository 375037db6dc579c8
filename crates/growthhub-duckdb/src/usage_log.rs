use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};

use growthhub_core::usage::{ApiType, PlanTier, UsageLog, UsageLogStore};

use crate::DuckDbBackend;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

fn to_sql_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

fn from_sql_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .with_context(|| format!("invalid usage_logs.created_at: {raw}"))?;
    Ok(naive.and_utc())
}

impl DuckDbBackend {
    pub async fn append_usage_log(&self, log: &UsageLog) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO usage_logs (id, user_id, plan_type, api_type, tokens_used, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, CAST(?6 AS TIMESTAMP))",
            duckdb::params![
                log.id,
                log.user_id,
                log.plan_type.as_str(),
                log.api_type.as_str(),
                log.tokens_used,
                to_sql_timestamp(log.created_at),
            ],
        )?;
        Ok(())
    }

    /// Rows for `user_id` with `created_at >= since`.
    pub async fn count_usage_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<u64> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT COUNT(*) FROM usage_logs \
             WHERE user_id = ?1 AND created_at >= CAST(?2 AS TIMESTAMP)",
        )?;
        let count: i64 = stmt.query_row(
            duckdb::params![user_id, to_sql_timestamp(since)],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Most recent entries for `user_id`, newest first.
    pub async fn list_usage_logs(&self, user_id: &str, limit: u32) -> Result<Vec<UsageLog>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, plan_type, api_type, tokens_used, CAST(created_at AS VARCHAR) \
             FROM usage_logs WHERE user_id = ?1 \
             ORDER BY created_at DESC, id LIMIT ?2",
        )?;
        let rows = stmt.query_map(duckdb::params![user_id, i64::from(limit)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<i64>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut logs = Vec::new();
        for row in rows {
            let (id, user_id, plan_type, api_type, tokens_used, created_at) = row?;
            logs.push(UsageLog {
                id,
                user_id,
                plan_type: PlanTier::parse(Some(&plan_type))?,
                api_type: ApiType::parse(&api_type),
                tokens_used,
                created_at: from_sql_timestamp(&created_at)?,
            });
        }
        Ok(logs)
    }
}

#[async_trait]
impl UsageLogStore for DuckDbBackend {
    async fn count_usage_since(&self, user_id: &str, since: DateTime<Utc>) -> anyhow::Result<u64> {
        DuckDbBackend::count_usage_since(self, user_id, since).await
    }

    async fn append_usage_log(&self, log: &UsageLog) -> anyhow::Result<()> {
        DuckDbBackend::append_usage_log(self, log).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_round_trip_through_sql_text() {
        let at = DateTime::parse_from_rfc3339("2026-05-20T12:34:56.789Z")
            .expect("ts")
            .with_timezone(&Utc);
        assert_eq!(to_sql_timestamp(at), "2026-05-20 12:34:56.789");
        assert_eq!(from_sql_timestamp("2026-05-20 12:34:56.789").expect("parse"), at);
        assert!(from_sql_timestamp("2026-05-20 00:00:00").is_ok());
    }
}
