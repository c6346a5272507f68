use docanalyzer::config::{DbPoolConfig, DEFAULT_DATABASE_URL};
use docanalyzer::db;
use docanalyzer::jobs::{Job, JobStatus, JobStore, JobsRepo, PgTaskQueue, TaskQueue};
use std::env;
use uuid::Uuid;

const USAGE: &str = "analyzerctl <command>\n\
Commands:\n\
- init-schema\n\
- job <job_id>\n\
- jobs [status] [limit]\n\
- queue-depth\n\
- reset\n\
\n\
Uses DATABASE_URL or TEST_DATABASE_URL, BROKER_URL and ANALYZER_QUEUE.\n";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let args: Vec<String> = env::args().collect();
    let Some(command) = args.get(1) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let url = env::var("DATABASE_URL")
        .or_else(|_| env::var("TEST_DATABASE_URL"))
        .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
    let broker_url = env::var("BROKER_URL").unwrap_or_else(|_| url.clone());
    let queue_name = env::var("ANALYZER_QUEUE").unwrap_or_else(|_| "analysis".to_string());

    let pool_cfg = DbPoolConfig::from_env();
    let pool = db::make_pool(&url, &pool_cfg).await?;
    let broker_pool = if broker_url == url {
        pool.clone()
    } else {
        db::make_pool(&broker_url, &pool_cfg).await?
    };

    let jobs = JobsRepo::new(pool.clone());
    let queue = PgTaskQueue::new(broker_pool.clone(), queue_name);

    match command.as_str() {
        "init-schema" => {
            db::ensure_schema(&pool).await?;
            if broker_url != url {
                db::ensure_schema(&broker_pool).await?;
            }
            println!("schema OK");
        }
        "job" => {
            let Some(id) = args.get(2) else {
                anyhow::bail!("usage: analyzerctl job <job_id>");
            };
            let job_id: Uuid = id.parse()?;
            print_job(&jobs.get(job_id).await?);
        }
        "jobs" => {
            let status = match args.get(2) {
                Some(s) if s != "all" => Some(
                    JobStatus::parse(s).ok_or_else(|| anyhow::anyhow!("unknown status {s}"))?,
                ),
                _ => None,
            };
            let limit: i64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(20);

            let rows = jobs.list_recent(status, limit).await?;
            println!("{:<36}  {:<10}  {:<25}  file", "job_id", "status", "updated_at");
            for job in &rows {
                println!(
                    "{:<36}  {:<10}  {:<25}  {}",
                    job.id,
                    job.status,
                    job.updated_at.to_rfc3339(),
                    job.original_filename.as_deref().unwrap_or("-")
                );
            }
            println!("{} job(s)", rows.len());
        }
        "queue-depth" => {
            println!("{} {}", queue.queue(), queue.depth().await?);
        }
        "reset" => {
            let deleted_jobs = jobs.truncate().await?;
            let deleted_tasks = queue.purge().await?;
            println!("reset OK jobs={deleted_jobs} tasks={deleted_tasks}");
        }
        other => {
            eprintln!("Unknown command: {other}\n\n{USAGE}");
            std::process::exit(2);
        }
    }

    Ok(())
}

fn print_job(job: &Job) {
    println!("job_id      {}", job.id);
    println!("status      {}", job.status);
    println!("file        {}", job.original_filename.as_deref().unwrap_or("-"));
    println!("file_path   {}", job.file_path);
    println!("query       {}", job.query);
    println!("created_at  {}", job.created_at.to_rfc3339());
    println!("updated_at  {}", job.updated_at.to_rfc3339());

    if let Some(err) = &job.error_message {
        println!("\nerror:\n{err}");
    }
    if let Some(text) = &job.result_text {
        println!("\nanalysis:\n{text}");
    }
}
