use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::DbPoolConfig;

pub async fn make_pool(database_url: &str, cfg: &DbPoolConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(cfg.max_connections)
        .acquire_timeout(cfg.acquire_timeout)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Idempotent table bootstrap, run at startup. There is no migration history:
/// every statement is safe to repeat against an existing schema.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS analysis_jobs (
        id UUID PRIMARY KEY,
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'processing', 'completed', 'failed')),
        file_path TEXT NOT NULL,
        original_filename TEXT,
        query TEXT NOT NULL,
        result_text TEXT,
        error_message TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        CONSTRAINT analysis_jobs_payload_matches_status CHECK (
            (status = 'completed' AND result_text IS NOT NULL AND error_message IS NULL)
            OR (status = 'failed' AND error_message IS NOT NULL AND result_text IS NULL)
            OR (status IN ('pending', 'processing') AND result_text IS NULL AND error_message IS NULL)
        )
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS analysis_jobs_status_created_idx
        ON analysis_jobs (status, created_at DESC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS task_queue (
        id UUID PRIMARY KEY,
        queue TEXT NOT NULL,
        task_name TEXT NOT NULL,
        payload_json JSONB NOT NULL,
        status TEXT NOT NULL DEFAULT 'queued'
            CHECK (status IN ('queued', 'running', 'done')),
        deliveries INT NOT NULL DEFAULT 0,
        locked_by TEXT,
        locked_at TIMESTAMPTZ,
        lock_expires_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS task_queue_runnable_idx
        ON task_queue (queue, status, created_at)
    "#,
];

pub async fn ensure_schema(pool: &PgPool) -> anyhow::Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
