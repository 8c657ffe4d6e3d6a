//! End-to-end pipeline checks against the real file-backed stores.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use core_types::retry::RetryPolicy;
use core_types::window::FetchWindow;
use harvest_engine::fetch::{FetchError, PageFetcher, PageSource};
use harvest_engine::{HarvestConfig, Harvester};
use history_store::{CsvDatasetStore, DatasetStore, JsonWatermarkStore, WatermarkStore};
use tempfile::tempdir;

/// Five rows for instrument A in its single pending window; permanent 503
/// for instrument B.
struct SplitSource {
    b_attempts: AtomicUsize,
}

#[async_trait]
impl PageSource for SplitSource {
    async fn fetch_page(&self, instrument: &str, window: FetchWindow) -> Result<String, FetchError> {
        if instrument == "B" {
            self.b_attempts.fetch_add(1, Ordering::SeqCst);
            return Err(FetchError::Status(503));
        }
        let rows: String = (0u64..5)
            .map(|offset| {
                let date = window.start + Days::new(offset);
                format!(
                    "<tr><td>{}</td><td>1,250.00</td><td>1,260.00</td><td>1,240.00</td>\
                     <td>1,251.30</td><td>0.16</td><td>120</td><td>150,156.00</td>\
                     <td>150,156.00</td></tr>",
                    date.format("%m/%d/%Y")
                )
            })
            .collect();
        Ok(format!("<tbody>{rows}</tbody>"))
    }
}

/// Returns a page with no rows for everyone; used to model a re-run with no
/// new upstream data.
struct QuietSource;

#[async_trait]
impl PageSource for QuietSource {
    async fn fetch_page(&self, _: &str, _: FetchWindow) -> Result<String, FetchError> {
        Ok("<tbody></tbody>".to_string())
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn partial_failure_commits_only_the_surviving_instrument() {
    let dir = tempdir().unwrap();
    let watermarks = Arc::new(JsonWatermarkStore::new(dir.path().join("watermarks.json")));
    let dataset = Arc::new(CsvDatasetStore::open(dir.path().join("history.csv")).unwrap());
    let today = date(2024, 6, 10);
    // A is ten days behind; B has never synced.
    watermarks
        .set("A", today.checked_sub_days(Days::new(10)).unwrap())
        .unwrap();

    let source = Arc::new(SplitSource {
        b_attempts: AtomicUsize::new(0),
    });
    let harvester = Harvester::new(
        HarvestConfig::new(),
        PageFetcher::new(source.clone(), RetryPolicy::new(3, 1, 1, 0.0)),
        watermarks.clone(),
        dataset.clone(),
    );

    let report = harvester
        .run(&["A".to_string(), "B".to_string()], today)
        .await;

    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.merge.inserted, 5);
    assert_eq!(dataset.count().unwrap(), 5);
    assert_eq!(watermarks.get("A"), Some(today));
    assert_eq!(watermarks.get("B"), None);
    assert_eq!(source.b_attempts.load(Ordering::SeqCst), 3);

    // Rows landed normalized under A's key space only.
    let rows = dataset.by_instrument("A").unwrap();
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0].last_trade_price, "1.250,00");
}

#[tokio::test]
async fn a_second_run_with_no_new_data_changes_nothing() {
    let dir = tempdir().unwrap();
    let watermark_path = dir.path().join("watermarks.json");
    let dataset_path = dir.path().join("history.csv");
    let today = date(2024, 6, 10);

    {
        let watermarks = Arc::new(JsonWatermarkStore::new(&watermark_path));
        watermarks
            .set("A", today.checked_sub_days(Days::new(10)).unwrap())
            .unwrap();
        let dataset = Arc::new(CsvDatasetStore::open(&dataset_path).unwrap());
        let harvester = Harvester::new(
            HarvestConfig::new(),
            PageFetcher::new(
                Arc::new(SplitSource {
                    b_attempts: AtomicUsize::new(0),
                }),
                RetryPolicy::new(3, 1, 1, 0.0),
            ),
            watermarks,
            dataset,
        );
        harvester.run(&["A".to_string()], today).await;
    }

    // Fresh handles over the same files, nothing new upstream.
    let watermarks = Arc::new(JsonWatermarkStore::new(&watermark_path));
    let dataset = Arc::new(CsvDatasetStore::open(&dataset_path).unwrap());
    let before_rows = dataset.snapshot().unwrap();
    let before_watermark = watermarks.get("A");

    let harvester = Harvester::new(
        HarvestConfig::new(),
        PageFetcher::new(Arc::new(QuietSource), RetryPolicy::new(3, 1, 1, 0.0)),
        watermarks.clone(),
        dataset.clone(),
    );
    let report = harvester.run(&["A".to_string()], today).await;

    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.merge.inserted, 0);
    assert_eq!(dataset.snapshot().unwrap(), before_rows);
    assert_eq!(watermarks.get("A"), before_watermark);
}

#[tokio::test]
async fn refetched_windows_never_duplicate_existing_rows() {
    let dir = tempdir().unwrap();
    let watermarks = Arc::new(JsonWatermarkStore::new(dir.path().join("watermarks.json")));
    let dataset = Arc::new(CsvDatasetStore::open(dir.path().join("history.csv")).unwrap());
    let today = date(2024, 6, 10);
    let start = today.checked_sub_days(Days::new(10)).unwrap();

    let build = |wm: Arc<JsonWatermarkStore>, ds: Arc<CsvDatasetStore>| {
        Harvester::new(
            HarvestConfig::new(),
            PageFetcher::new(
                Arc::new(SplitSource {
                    b_attempts: AtomicUsize::new(0),
                }),
                RetryPolicy::new(3, 1, 1, 0.0),
            ),
            wm,
            ds,
        )
    };

    watermarks.set("A", start).unwrap();
    build(watermarks.clone(), dataset.clone())
        .run(&["A".to_string()], today)
        .await;
    assert_eq!(dataset.count().unwrap(), 5);

    // Wind the watermark back so the same window is requested again. The
    // store refuses regressions, so go through a fresh file.
    let rewound = Arc::new(JsonWatermarkStore::new(dir.path().join("rewound.json")));
    rewound.set("A", start).unwrap();
    let report = build(rewound, dataset.clone())
        .run(&["A".to_string()], today)
        .await;

    assert_eq!(report.merge.inserted, 0);
    assert_eq!(report.merge.duplicates, 5);
    assert_eq!(dataset.count().unwrap(), 5);
}
