mod config;

use std::{env, process, str::FromStr, sync::Arc};

use chrono::Utc;
use config::{AppConfig, ConfigError, Environment};
use core_types::retry::RetryPolicy;
use harvest_engine::fetch::{FetchError, HttpPageSource, PageFetcher};
use harvest_engine::{HarvestConfig, Harvester, InstrumentOutcome};
use history_store::{CsvDatasetStore, DatasetStore, JsonWatermarkStore, StoreError};
use log::warn;
use thiserror::Error;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("msehist failed: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    let config = {
        let env = parse_environment()?;
        AppConfig::load(env)?
    };
    std::fs::create_dir_all(&config.state_dir)?;
    println!(
        "msehist booted in {} mode; {} instruments, state at {:?}",
        config.env_label(),
        config.instruments.len(),
        config.state_dir
    );
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_harvest(config))
}

async fn run_harvest(config: AppConfig) -> Result<(), AppError> {
    let watermarks = Arc::new(JsonWatermarkStore::new(config.watermark_path()));
    let dataset = Arc::new(CsvDatasetStore::open(config.dataset_path())?);
    let source = Arc::new(HttpPageSource::new(config.base_url, config.fetch_timeout)?);
    let fetcher = PageFetcher::new(
        source,
        RetryPolicy::new(config.fetch_attempts, 500, 4_000, 0.25),
    );
    let harvester = Harvester::new(
        HarvestConfig::new()
            .with_max_span_days(config.max_span_days)
            .with_lookback_days(config.lookback_days)
            .with_max_parallel(config.max_parallel),
        fetcher,
        watermarks,
        dataset.clone(),
    );

    let cancel = harvester.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; letting in-flight instruments finish");
            cancel.cancel();
        }
    });

    let today = Utc::now().date_naive();
    let report = harvester.run(&config.instruments, today).await;

    println!(
        "Harvest through {}: {} succeeded, {} failed; {} rows merged, {} duplicates dropped",
        today,
        report.succeeded(),
        report.failed(),
        report.merge.inserted,
        report.merge.duplicates
    );
    for entry in &report.outcomes {
        if let InstrumentOutcome::Failed { reason } = &entry.outcome {
            println!("  {}: {}", entry.instrument, reason);
        }
    }
    println!("Dataset now holds {} rows", dataset.count()?);
    let metrics = harvester.metrics().snapshot();
    println!(
        "Fetched {} pages ({} rows parsed)",
        metrics.pages_fetched, metrics.rows_fetched
    );
    Ok(())
}

fn parse_environment() -> Result<Environment, AppError> {
    let arg = env::args().nth(1).ok_or(AppError::Usage)?;
    Environment::from_str(&arg).map_err(AppError::from)
}

#[derive(Debug, Error)]
enum AppError {
    #[error("usage: msehist <dev|prod>")]
    Usage,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
