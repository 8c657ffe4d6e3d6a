//! Watermark and dataset persistence for the history harvester.
//!
//! Both stores are flat-file backed and safe to share across instrument
//! tasks; interior locking keeps writes serialized per store.

mod dataset;
mod watermark;

pub use dataset::CsvDatasetStore;
pub use watermark::JsonWatermarkStore;

use chrono::NaiveDate;
use core_types::record::HistoryRecord;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Per-instrument last-synced-date state.
pub trait WatermarkStore: Send + Sync {
    /// Last fully synced date, `None` when the instrument has never synced.
    /// Read failures degrade to `None` rather than aborting the caller.
    fn get(&self, instrument: &str) -> Option<NaiveDate>;

    /// Idempotent upsert. Only called once the instrument's rows are durable;
    /// a regressing date is refused so a watermark never moves backwards.
    fn set(&self, instrument: &str, date: NaiveDate) -> Result<(), StoreError>;
}

/// Counters from one `merge_append` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: usize,
    pub duplicates: usize,
}

/// Durable row storage with dedup-on-write.
pub trait DatasetStore: Send + Sync {
    /// Inserts rows; a row whose (instrument, date) key already exists is
    /// discarded, never overwritten. Atomic: on error nothing is persisted.
    fn merge_append(&self, rows: Vec<HistoryRecord>) -> Result<MergeStats, StoreError>;

    /// All rows for one instrument, date-ordered.
    fn by_instrument(&self, instrument: &str) -> Result<Vec<HistoryRecord>, StoreError>;

    fn count(&self) -> Result<usize, StoreError>;

    /// Full dataset ordered by (instrument, date).
    fn snapshot(&self) -> Result<Vec<HistoryRecord>, StoreError>;
}
