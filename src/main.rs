use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use shelter_sync::config;
use shelter_sync::db::{self, SqliteSink};
use shelter_sync::model::SyncWindow;
use shelter_sync::shelter::RegistryClient;
use shelter_sync::sync::{ReferenceSync, SyncPlan, SyncSettings};

#[derive(Debug, Parser)]
#[command(author, version, about = "Daily shelter registry sync daemon")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Run a full sync of every stage before entering the daily loop
    #[arg(long)]
    run_now: bool,
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
    let schedule = cfg.daily_schedule()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let client = RegistryClient::from_config(&cfg.shelter)?;
    let sync = ReferenceSync::new(
        Arc::new(client),
        Arc::new(SqliteSink::new(pool.clone())),
        SyncSettings::from(&cfg.shelter),
    );

    if args.run_now {
        let window = SyncWindow::yesterday(Local::now().date_naive());
        let report = sync.run(SyncPlan::Full, window).await;
        if let Err(err) = db::record_run(&pool, &report).await {
            error!(?err, run_id = %report.run_id, "failed to record sync run");
        }
    }

    info!(daily_at = %schedule.at(), "starting scheduled sync");
    schedule
        .run_forever(|| {
            let sync = &sync;
            let pool = &pool;
            async move {
                let window = SyncWindow::yesterday(Local::now().date_naive());
                let report = sync.run(SyncPlan::Daily, window).await;
                if let Err(err) = db::record_run(pool, &report).await {
                    error!(?err, run_id = %report.run_id, "failed to record sync run");
                }
            }
        })
        .await;

    Ok(())
}
