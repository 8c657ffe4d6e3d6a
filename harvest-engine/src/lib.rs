//! Incremental scrape pipeline for exchange symbol history.
//!
//! One task per instrument fans out over a bounded worker pool; each task
//! runs the instrument's watermark-to-today window sequence. After a join
//! barrier the orchestrator commits in two stages: merge every successful
//! instrument's rows into the dataset, then advance watermarks. Data always
//! lands before the watermark that claims it.

pub mod fetch;
mod metrics;
pub mod parse;
mod scraper;

pub use metrics::{HarvestMetrics, HarvestMetricsSnapshot};
pub use scraper::{InstrumentScraper, ScrapeOutcome, DEFAULT_LOOKBACK_DAYS};

use std::sync::Arc;

use chrono::NaiveDate;
use core_types::window::DEFAULT_MAX_SPAN_DAYS;
use history_store::{DatasetStore, MergeStats, WatermarkStore};
use log::{error, info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::fetch::PageFetcher;

const DEFAULT_MAX_PARALLEL: usize = 8;

/// Knobs for one harvester instance.
#[derive(Clone, Debug)]
pub struct HarvestConfig {
    pub max_span_days: u32,
    pub lookback_days: u64,
    pub max_parallel: usize,
}

impl HarvestConfig {
    pub fn new() -> Self {
        Self {
            max_span_days: DEFAULT_MAX_SPAN_DAYS,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }

    pub fn with_max_span_days(mut self, days: u32) -> Self {
        self.max_span_days = days.max(1);
        self
    }

    pub fn with_lookback_days(mut self, days: u64) -> Self {
        self.lookback_days = days;
        self
    }

    pub fn with_max_parallel(mut self, tasks: usize) -> Self {
        self.max_parallel = tasks.max(1);
        self
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-instrument result in the run report.
#[derive(Debug)]
pub enum InstrumentOutcome {
    /// Rows merged and watermark advanced.
    Committed { rows_fetched: usize },
    Failed { reason: String },
}

#[derive(Debug)]
pub struct InstrumentReport {
    pub instrument: String,
    pub outcome: InstrumentOutcome,
}

/// What one run did. Partial failure is steady state: failed instruments
/// keep their old watermark and retry naturally next run.
#[derive(Debug, Default)]
pub struct HarvestReport {
    pub outcomes: Vec<InstrumentReport>,
    pub merge: MergeStats,
}

impl HarvestReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|entry| matches!(entry.outcome, InstrumentOutcome::Committed { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Fans the per-instrument scraper out across the instrument list and owns
/// the staged commit into the two stores.
pub struct Harvester {
    scraper: Arc<InstrumentScraper>,
    watermarks: Arc<dyn WatermarkStore>,
    dataset: Arc<dyn DatasetStore>,
    max_parallel: usize,
    metrics: HarvestMetrics,
    cancel: CancellationToken,
}

impl Harvester {
    pub fn new(
        config: HarvestConfig,
        fetcher: PageFetcher,
        watermarks: Arc<dyn WatermarkStore>,
        dataset: Arc<dyn DatasetStore>,
    ) -> Self {
        let metrics = HarvestMetrics::new();
        Self {
            scraper: Arc::new(InstrumentScraper::new(
                fetcher,
                watermarks.clone(),
                config.max_span_days,
                config.lookback_days,
                metrics.clone(),
            )),
            watermarks,
            dataset,
            max_parallel: config.max_parallel,
            metrics,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops dispatching further instruments when triggered;
    /// in-flight instruments finish normally.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn metrics(&self) -> HarvestMetrics {
        self.metrics.clone()
    }

    pub async fn run(&self, instruments: &[String], today: NaiveDate) -> HarvestReport {
        info!(
            "harvest run starting: {} instruments, {} parallel, through {}",
            instruments.len(),
            self.max_parallel,
            today
        );
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut dispatched: Vec<(String, JoinHandle<ScrapeOutcome>)> = Vec::new();
        let mut failures: Vec<(String, String)> = Vec::new();
        for instrument in instruments {
            if self.cancel.is_cancelled() {
                failures.push((instrument.clone(), "cancelled before dispatch".to_string()));
                continue;
            }
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                failures.push((instrument.clone(), "worker pool closed".to_string()));
                continue;
            };
            let scraper = self.scraper.clone();
            let name = instrument.clone();
            dispatched.push((
                instrument.clone(),
                tokio::spawn(async move {
                    let _permit = permit;
                    scraper.sync_instrument(&name, today).await
                }),
            ));
        }

        // Barrier: every dispatched task settles before any dataset write.
        let mut synced: Vec<(String, usize, NaiveDate)> = Vec::new();
        let mut pending_rows = Vec::new();
        for (instrument, handle) in dispatched {
            match handle.await {
                Ok(ScrapeOutcome::Success {
                    rows,
                    synced_through,
                }) => {
                    synced.push((instrument, rows.len(), synced_through));
                    pending_rows.extend(rows);
                }
                Ok(ScrapeOutcome::Failure { reason }) => {
                    failures.push((instrument, reason));
                }
                Err(join_err) => {
                    failures.push((instrument, format!("task aborted: {join_err}")));
                }
            }
        }

        let mut report = HarvestReport::default();
        if synced.is_empty() {
            info!("no instrument completed; dataset untouched");
        } else {
            // Stage one: rows become durable. Stage two: watermarks advance.
            // A merge failure must leave every watermark where it was.
            match self.dataset.merge_append(pending_rows) {
                Ok(stats) => {
                    self.metrics.record_merge(stats.inserted, stats.duplicates);
                    report.merge = stats;
                    for (instrument, rows_fetched, synced_through) in synced {
                        match self.watermarks.set(&instrument, synced_through) {
                            Ok(()) => {
                                self.metrics.record_instrument_synced();
                                report.outcomes.push(InstrumentReport {
                                    instrument,
                                    outcome: InstrumentOutcome::Committed { rows_fetched },
                                });
                            }
                            Err(err) => {
                                error!("{}: watermark write failed: {}", instrument, err);
                                failures
                                    .push((instrument, format!("watermark write failed: {err}")));
                            }
                        }
                    }
                }
                Err(err) => {
                    error!("dataset merge failed; no watermark advanced: {}", err);
                    let reason = format!("dataset merge failed: {err}");
                    for (instrument, _, _) in synced {
                        failures.push((instrument, reason.clone()));
                    }
                }
            }
        }

        for (instrument, reason) in failures {
            warn!("{}: {}", instrument, reason);
            self.metrics.record_instrument_failed();
            report.outcomes.push(InstrumentReport {
                instrument,
                outcome: InstrumentOutcome::Failed { reason },
            });
        }
        info!(
            "harvest run finished: {} succeeded, {} failed, {} rows merged, {} duplicates dropped",
            report.succeeded(),
            report.failed(),
            report.merge.inserted,
            report.merge.duplicates
        );
        report
    }
}
