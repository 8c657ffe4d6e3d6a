use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

#[derive(Default)]
struct HarvestMetricsInner {
    pages_fetched: AtomicU64,
    rows_fetched: AtomicU64,
    rows_merged: AtomicU64,
    duplicates_dropped: AtomicU64,
    instruments_synced: AtomicU64,
    instruments_failed: AtomicU64,
}

/// Run-level counters shared by the scraper tasks and the orchestrator.
#[derive(Clone, Default)]
pub struct HarvestMetrics {
    inner: Arc<HarvestMetricsInner>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarvestMetricsSnapshot {
    pub pages_fetched: u64,
    pub rows_fetched: u64,
    pub rows_merged: u64,
    pub duplicates_dropped: u64,
    pub instruments_synced: u64,
    pub instruments_failed: u64,
}

impl HarvestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_page_fetched(&self, rows: usize) {
        self.inner.pages_fetched.fetch_add(1, Ordering::Relaxed);
        if rows > 0 {
            self.inner
                .rows_fetched
                .fetch_add(rows as u64, Ordering::Relaxed);
        }
    }

    pub fn record_merge(&self, inserted: usize, duplicates: usize) {
        self.inner
            .rows_merged
            .fetch_add(inserted as u64, Ordering::Relaxed);
        self.inner
            .duplicates_dropped
            .fetch_add(duplicates as u64, Ordering::Relaxed);
    }

    pub fn record_instrument_synced(&self) {
        self.inner
            .instruments_synced
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_instrument_failed(&self) {
        self.inner
            .instruments_failed
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HarvestMetricsSnapshot {
        HarvestMetricsSnapshot {
            pages_fetched: self.inner.pages_fetched.load(Ordering::Relaxed),
            rows_fetched: self.inner.rows_fetched.load(Ordering::Relaxed),
            rows_merged: self.inner.rows_merged.load(Ordering::Relaxed),
            duplicates_dropped: self.inner.duplicates_dropped.load(Ordering::Relaxed),
            instruments_synced: self.inner.instruments_synced.load(Ordering::Relaxed),
            instruments_failed: self.inner.instruments_failed.load(Ordering::Relaxed),
        }
    }
}
