/// Schema SQL executed at open time.
///
/// Every statement is `IF NOT EXISTS`, so re-running on each startup is a
/// no-op. An explicit memory limit is always set; DuckDB's default of 80% of
/// system RAM is too much for a server process.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- USAGE LOGS (append-only, one row per billed generation)
-- ===========================================
CREATE TABLE IF NOT EXISTS usage_logs (
    id              VARCHAR PRIMARY KEY,           -- uuid v4
    user_id         VARCHAR NOT NULL,
    plan_type       VARCHAR NOT NULL,              -- 'free' | 'personal' | 'business'
    api_type        VARCHAR NOT NULL,              -- 'gemini' | 'other'
    tokens_used     BIGINT,
    created_at      TIMESTAMP NOT NULL             -- UTC
);
CREATE INDEX IF NOT EXISTS idx_usage_logs_user_time
    ON usage_logs(user_id, created_at);
"#
    )
}

/// Migrations tracking table. Created before [`init_sql`] runs.
pub const MIGRATIONS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS _migrations (
    id          VARCHAR PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

/// Migration ids covered by [`init_sql`], recorded on every open.
pub const APPLIED_MIGRATIONS: &[&str] = &["0001_usage_logs"];
