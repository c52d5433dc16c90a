use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use shelter_sync::config;
use shelter_sync::db::{self, SqliteSink};
use shelter_sync::model::SyncWindow;
use shelter_sync::shelter::RegistryClient;
use shelter_sync::sync::{retry_plans, ReferenceSync, RunReport, SyncPlan, SyncSettings};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run a manual shelter registry sync (full backfill or selected pages) and exit"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Sync window as yyyyMMdd (default: yesterday)
    #[arg(long)]
    date: Option<String>,

    /// Re-ingest only these shelter-post pages of the window, e.g. `--pages 3,4`
    #[arg(long, value_delimiter = ',', conflicts_with = "retry_failed")]
    pages: Vec<u32>,

    /// Re-ingest what the most recent run failed on (pages, a whole window, or a full run)
    #[arg(long)]
    retry_failed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let client = RegistryClient::from_config(&cfg.shelter)?;
    let sync = ReferenceSync::new(
        Arc::new(client),
        Arc::new(SqliteSink::new(pool.clone())),
        SyncSettings::from(&cfg.shelter),
    );

    let window = match &args.date {
        Some(date) => SyncWindow::parse(date)?,
        None => SyncWindow::yesterday(Local::now().date_naive()),
    };

    let mut reports = Vec::new();
    if args.retry_failed {
        let Some(last) = db::latest_run(&pool, None).await? else {
            info!("no recorded sync run, nothing to retry");
            return Ok(());
        };
        let failed = db::failed_pages(&pool, &last.run_id).await?;
        let plans = retry_plans(&last, &failed)?;
        if plans.is_empty() {
            info!(run_id = %last.run_id, "last run has no failed pages");
            return Ok(());
        }
        for (plan, window) in plans {
            info!(run_id = %last.run_id, %window, ?plan, "retrying failed pages");
            reports.push(sync.run(plan, window).await);
        }
    } else if !args.pages.is_empty() {
        reports.push(sync.run(SyncPlan::Pages(args.pages.clone()), window).await);
    } else {
        reports.push(sync.run(SyncPlan::Full, window).await);
    }

    for report in &reports {
        db::record_run(&pool, report).await?;
    }
    summarize(&reports)
}

fn summarize(reports: &[RunReport]) -> Result<()> {
    let mut failed_runs = 0;
    for report in reports {
        info!(
            run_id = %report.run_id,
            plan = report.plan.as_str(),
            window = %report.window,
            pages = report.pages_ingested(),
            failed_pages = report.failures.len(),
            completed = report.is_completed(),
            "backfill run finished"
        );
        if !report.is_completed() {
            failed_runs += 1;
        }
    }
    if failed_runs > 0 {
        bail!("{failed_runs} sync run(s) failed");
    }
    Ok(())
}
