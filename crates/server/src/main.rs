use std::sync::Arc;

use docanalyzer::api;
use docanalyzer::config;
use docanalyzer::db;
use docanalyzer::jobs::{JobsRepo, PgTaskQueue};
use docanalyzer::logging;
use docanalyzer::offload::AnalysisPool;
use docanalyzer::uploads::UploadDir;
use docanalyzer::DocumentAnalyzer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::Config::from_env()?;
    logging::init("info,tower_http=info,sqlx=warn", cfg.log_format);

    let pool = db::make_pool(&cfg.database_url, &cfg.db).await?;
    let broker_pool = if cfg.broker_url == cfg.database_url {
        pool.clone()
    } else {
        db::make_pool(&cfg.broker_url, &cfg.db).await?
    };

    if cfg.init_schema {
        db::ensure_schema(&pool).await?;
        if cfg.broker_url != cfg.database_url {
            db::ensure_schema(&broker_pool).await?;
        }
    }

    let uploads = UploadDir::new(cfg.upload_dir());
    uploads.ensure().await?;

    let state = api::ApiState {
        jobs: Arc::new(JobsRepo::new(pool.clone())),
        queue: Arc::new(PgTaskQueue::new(broker_pool, cfg.worker.queue.clone())),
        analyzer: Arc::new(DocumentAnalyzer::from_config(&cfg.llm)?),
        pool: AnalysisPool::new(cfg.sync_concurrency),
        uploads,
        max_upload_bytes: cfg.max_upload_bytes,
    };

    tracing::info!(
        bind = %cfg.bind_addr,
        agent = state.analyzer.agent_name(),
        model = state.analyzer.model(),
        queue = %cfg.worker.queue,
        upload_dir = %state.uploads.root().display(),
        sync_concurrency = state.pool.size(),
        init_schema = cfg.init_schema,
        "docanalyzer server starting"
    );

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!("listening on http://{}", cfg.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
