//! Database module - PostgreSQL connection and migrations

use sqlx::{postgres::PgPoolOptions, PgPool};

/// Create database connection pool
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;

    tracing::info!("Database schema applied successfully");
    Ok(())
}

/// Database schema SQL
///
/// `raw_logs` is filled by the log collector; only `session_id` is written here.
const SCHEMA_SQL: &str = r#"
-- Sessions (one row per reconstructed client session)
CREATE TABLE IF NOT EXISTS sessions (
    id BIGSERIAL PRIMARY KEY,
    session_id TEXT NOT NULL UNIQUE,
    ip_address VARCHAR(45),
    user_agent TEXT,
    start_time TIMESTAMPTZ NOT NULL,
    end_time TIMESTAMPTZ NOT NULL,
    label VARCHAR(32) NOT NULL,
    confidence VARCHAR(8),
    classifier_raw TEXT,
    classification TEXT,
    created_at TIMESTAMPTZ DEFAULT NOW(),
    updated_at TIMESTAMPTZ DEFAULT NOW(),
    CONSTRAINT sessions_time_order CHECK (start_time <= end_time)
);

-- Raw WAF audit records
CREATE TABLE IF NOT EXISTS raw_logs (
    id BIGSERIAL PRIMARY KEY,
    transaction_id VARCHAR(128) UNIQUE,
    timestamp TEXT NOT NULL,
    remote_host VARCHAR(45),
    user_agent TEXT,
    method VARCHAR(16),
    uri TEXT,
    request_body TEXT,
    matched_rules JSONB,
    audit_summary JSONB,
    session_id BIGINT REFERENCES sessions(id) ON DELETE SET NULL,
    created_at TIMESTAMPTZ DEFAULT NOW()
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_raw_logs_unlinked ON raw_logs(id) WHERE session_id IS NULL;
CREATE INDEX IF NOT EXISTS idx_raw_logs_session ON raw_logs(session_id);
CREATE INDEX IF NOT EXISTS idx_sessions_label ON sessions(label);
CREATE INDEX IF NOT EXISTS idx_sessions_start ON sessions(start_time);
"#;
