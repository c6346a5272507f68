use docanalyzer::db;
use docanalyzer::jobs::NewJob;
use sqlx::{postgres::PgPoolOptions, PgPool};

/// Connects to `TEST_DATABASE_URL`, bootstraps the schema and empties both tables.
///
/// Returns `None` when the variable is unset so the suite still passes on
/// machines without postgres.
pub async fn setup_db() -> Option<PgPool> {
    let _ = dotenvy::dotenv();

    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set; skipping postgres test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .expect("failed to connect to TEST_DATABASE_URL");

    db::ensure_schema(&pool).await.expect("schema bootstrap failed");

    sqlx::query("TRUNCATE TABLE analysis_jobs, task_queue")
        .execute(&pool)
        .await
        .expect("truncate failed");

    Some(pool)
}

#[allow(dead_code)]
pub fn new_job(name: &str) -> NewJob {
    NewJob {
        query: "Analyze this financial document for investment insights".into(),
        file_path: format!("/tmp/financial_document_{name}.pdf"),
        original_filename: Some(format!("{name}.pdf")),
    }
}
