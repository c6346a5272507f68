use docanalyzer::config;
use docanalyzer::db;
use docanalyzer::jobs::{AnalysisRunner, JobsRepo, PgTaskQueue, TaskQueue};
use docanalyzer::logging;
use docanalyzer::DocumentAnalyzer;

use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::Instrument;

mod delivery;
mod handlers;
#[cfg(test)]
mod testing;

use handlers::{build_registry, TaskContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::Config::from_env()?;
    logging::init("info,sqlx=warn", cfg.log_format);
    let wcfg = cfg.worker.clone();

    tracing::info!(
        worker_id = %wcfg.worker_id,
        queue = %wcfg.queue,
        lease_seconds = wcfg.lease_seconds,
        concurrency = wcfg.concurrency,
        poll_interval_ms = wcfg.poll_interval.as_millis() as u64,
        reap_interval_ms = wcfg.reap_interval.as_millis() as u64,
        analysis_timeout_secs = wcfg.analysis_timeout.map(|d| d.as_secs()),
        extract_timeout_secs = cfg.llm.extract_timeout.as_secs(),
        provider = cfg.llm.provider.as_str(),
        model = %cfg.llm.model,
        "docanalyzer worker starting"
    );

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

    let queue = PgTaskQueue::new(broker_pool, wcfg.queue.clone());
    let analyzer = Arc::new(DocumentAnalyzer::from_config(&cfg.llm)?);
    let runner = AnalysisRunner::new(
        Arc::new(JobsRepo::new(pool.clone())),
        analyzer,
        wcfg.analysis_timeout,
    );

    let registry = build_registry(Some(wcfg.concurrency));
    let ctx = TaskContext {
        runner,
        worker_id: wcfg.worker_id.clone(),
    };

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut in_flight: JoinSet<()> = JoinSet::new();
    let mut last_reap_at = Instant::now() - wcfg.reap_interval;

    loop {
        // reclaim tasks from dead workers on a fixed interval, not on every poll.
        if last_reap_at.elapsed() >= wcfg.reap_interval {
            match queue.reap_expired().await {
                Ok(n) if n > 0 => tracing::warn!(reaped = n, "requeued tasks with expired leases"),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "reap failed"),
            }
            last_reap_at = Instant::now();
        }

        while let Some(joined) = in_flight.try_join_next() {
            log_join(joined);
        }

        if in_flight.len() >= wcfg.concurrency {
            tokio::select! {
                _ = &mut shutdown => break,
                joined = in_flight.join_next() => {
                    if let Some(joined) = joined {
                        log_join(joined);
                    }
                }
            }
            continue;
        }

        let leased = match queue.lease(&wcfg.worker_id, wcfg.lease_seconds).await {
            Ok(task) => task,
            Err(e) => {
                tracing::error!(error = %e, "lease failed");
                None
            }
        };

        match leased {
            Some(task) => {
                let span = tracing::info_span!(
                    "task",
                    task_id = %task.id,
                    task_name = %task.task_name,
                    deliveries = task.deliveries
                );
                let (registry, ctx, queue) = (registry.clone(), ctx.clone(), queue.clone());
                in_flight.spawn(
                    async move {
                        delivery::execute(task, &registry, &ctx, &queue).await;
                    }
                    .instrument(span),
                );
            }
            None => {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(wcfg.poll_interval) => {}
                }
            }
        }
    }

    tracing::info!(in_flight = in_flight.len(), "shutdown requested; finishing in-flight tasks");
    while let Some(joined) = in_flight.join_next().await {
        log_join(joined);
    }
    tracing::info!("worker stopped");

    Ok(())
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "task panicked");
    }
}
