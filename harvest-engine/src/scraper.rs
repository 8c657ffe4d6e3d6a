use std::sync::Arc;

use chrono::{Days, NaiveDate};
use core_types::{record::HistoryRecord, window::WindowPlan};
use history_store::WatermarkStore;
use log::{debug, info, warn};

use crate::{fetch::PageFetcher, metrics::HarvestMetrics, parse::parse_history_page};

/// How far back a never-synced instrument's history is requested.
pub const DEFAULT_LOOKBACK_DAYS: u64 = 3_650;

/// Result of one instrument's incremental sync. The commit itself (persist
/// rows, then advance the watermark) belongs to the orchestrator.
#[derive(Debug)]
pub enum ScrapeOutcome {
    /// Every pending window fetched and parsed.
    Success {
        rows: Vec<HistoryRecord>,
        /// Date the watermark advances to on commit: the run date, not the
        /// last row's date, so quiet trading days are not re-requested.
        synced_through: NaiveDate,
    },
    /// A window's fetch budget was exhausted; any rows accumulated this run
    /// are discarded and the watermark stays put, so the next run resumes
    /// from the same point.
    Failure { reason: String },
}

/// One instrument's end-to-end incremental sync: watermark read, window
/// planning, sequential fetch and parse per window.
pub struct InstrumentScraper {
    fetcher: PageFetcher,
    watermarks: Arc<dyn WatermarkStore>,
    max_span_days: u32,
    lookback_days: u64,
    metrics: HarvestMetrics,
}

impl InstrumentScraper {
    pub fn new(
        fetcher: PageFetcher,
        watermarks: Arc<dyn WatermarkStore>,
        max_span_days: u32,
        lookback_days: u64,
        metrics: HarvestMetrics,
    ) -> Self {
        Self {
            fetcher,
            watermarks,
            max_span_days,
            lookback_days,
            metrics,
        }
    }

    pub async fn sync_instrument(&self, instrument: &str, today: NaiveDate) -> ScrapeOutcome {
        let watermark = self.watermarks.get(instrument).unwrap_or_else(|| {
            today
                .checked_sub_days(Days::new(self.lookback_days))
                .unwrap_or(NaiveDate::MIN)
        });
        let plan = WindowPlan::new(watermark, today, self.max_span_days);
        let mut rows = Vec::new();
        // Windows run strictly in order; a later window is only requested
        // once every earlier one has been fetched in full.
        for window in plan {
            match self.fetcher.fetch(instrument, window).await {
                Ok(body) => {
                    let parsed = parse_history_page(&body, instrument);
                    self.metrics.record_page_fetched(parsed.len());
                    debug!(
                        "{}: {} rows in [{} - {}]",
                        instrument,
                        parsed.len(),
                        window.start,
                        window.end
                    );
                    rows.extend(parsed);
                }
                Err(err) => {
                    let reason =
                        format!("window [{} - {}]: {}", window.start, window.end, err);
                    warn!("{}: sync aborted, {}", instrument, reason);
                    return ScrapeOutcome::Failure { reason };
                }
            }
        }
        info!("{}: {} new rows through {}", instrument, rows.len(), today);
        ScrapeOutcome::Success {
            rows,
            synced_through: today,
        }
    }
}
