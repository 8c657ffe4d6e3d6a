use std::{
    collections::{btree_map::Entry, BTreeMap},
    fs,
    path::PathBuf,
};

use core_types::record::{HistoryRecord, RecordKey};
use parking_lot::Mutex;

use crate::{DatasetStore, MergeStats, StoreError};

/// Full-dataset CSV snapshot with an in-memory key index.
///
/// The index is the source of truth between merges; each successful merge
/// rewrites the snapshot through a tmp file and renames it into place, so a
/// crash mid-write leaves the previous snapshot intact.
pub struct CsvDatasetStore {
    path: PathBuf,
    index: Mutex<BTreeMap<RecordKey, HistoryRecord>>,
}

impl CsvDatasetStore {
    /// Loads the snapshot at `path`; a missing file is an empty dataset.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut index = BTreeMap::new();
        if path.exists() {
            let mut reader = csv::Reader::from_path(&path)?;
            for row in reader.deserialize() {
                let record: HistoryRecord = row?;
                index.insert(record.key(), record);
            }
        }
        Ok(Self {
            path,
            index: Mutex::new(index),
        })
    }

    fn persist(&self, index: &BTreeMap<RecordKey, HistoryRecord>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp)?;
            for record in index.values() {
                writer.serialize(record)?;
            }
            writer.flush().map_err(StoreError::Io)?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl DatasetStore for CsvDatasetStore {
    fn merge_append(&self, rows: Vec<HistoryRecord>) -> Result<MergeStats, StoreError> {
        let mut index = self.index.lock();
        // Stage into a copy so a failed persist leaves the index matching the
        // snapshot on disk.
        let mut staged = index.clone();
        let mut stats = MergeStats::default();
        for row in rows {
            let row = row.normalized();
            match staged.entry(row.key()) {
                Entry::Vacant(slot) => {
                    slot.insert(row);
                    stats.inserted += 1;
                }
                Entry::Occupied(_) => stats.duplicates += 1,
            }
        }
        if stats.inserted > 0 {
            self.persist(&staged)?;
            *index = staged;
        }
        Ok(stats)
    }

    fn by_instrument(&self, instrument: &str) -> Result<Vec<HistoryRecord>, StoreError> {
        let index = self.index.lock();
        Ok(index
            .values()
            .filter(|record| record.instrument == instrument)
            .cloned()
            .collect())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.index.lock().len())
    }

    fn snapshot(&self) -> Result<Vec<HistoryRecord>, StoreError> {
        Ok(self.index.lock().values().cloned().collect())
    }
}
