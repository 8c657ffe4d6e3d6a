// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use log::{error, warn};
use parking_lot::Mutex;

use crate::{StoreError, WatermarkStore};

/// Single JSON file mapping instrument code to the last synced date.
///
/// The whole map is small (one entry per listed instrument), so every write
/// re-serializes it and swaps the file into place atomically.
pub struct JsonWatermarkStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonWatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> BTreeMap<String, NaiveDate> {
        if !self.path.exists() {
            return BTreeMap::new();
        }
        match read_map(&self.path) {
            Ok(map) => map,
            Err(err) => {
                error!(
                    "failed to read watermark file {:?}; treating all instruments as unsynced: {}",
                    self.path, err
                );
                BTreeMap::new()
            }
        }
    }

    fn persist(&self, map: &BTreeMap<String, NaiveDate>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(map)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn read_map(path: &Path) -> Result<BTreeMap<String, NaiveDate>, StoreError> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

impl WatermarkStore for JsonWatermarkStore {
    fn get(&self, instrument: &str) -> Option<NaiveDate> {
        let _guard = self.lock.lock();
        self.load().get(instrument).copied()
    }

    fn set(&self, instrument: &str, date: NaiveDate) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut map = self.load();
        if let Some(current) = map.get(instrument) {
            if *current > date {
                warn!(
                    "refusing watermark regression for {}: {} -> {}",
                    instrument, current, date
                );
                return Ok(());
            }
        }
        map.insert(instrument.to_string(), date);
        self.persist(&map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn absent_instrument_has_no_watermark() {
        let dir = tempdir().unwrap();
        let store = JsonWatermarkStore::new(dir.path().join("watermarks.json"));
        assert_eq!(store.get("ALK"), None);
    }

    #[test]
    fn set_then_get_roundtrips_through_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("watermarks.json");
        let store = JsonWatermarkStore::new(&path);
        store.set("ALK", date(2024, 6, 10)).unwrap();
        store.set("KMB", date(2024, 6, 11)).unwrap();
        assert_eq!(store.get("ALK"), Some(date(2024, 6, 10)));

        let reopened = JsonWatermarkStore::new(&path);
        assert_eq!(reopened.get("KMB"), Some(date(2024, 6, 11)));
    }

    #[test]
    fn upsert_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = JsonWatermarkStore::new(dir.path().join("watermarks.json"));
        store.set("ALK", date(2024, 6, 10)).unwrap();
        store.set("ALK", date(2024, 6, 10)).unwrap();
        assert_eq!(store.get("ALK"), Some(date(2024, 6, 10)));
    }

    #[test]
    fn regressing_date_is_refused() {
        let dir = tempdir().unwrap();
        let store = JsonWatermarkStore::new(dir.path().join("watermarks.json"));
        store.set("ALK", date(2024, 6, 10)).unwrap();
        store.set("ALK", date(2024, 6, 1)).unwrap();
        assert_eq!(store.get("ALK"), Some(date(2024, 6, 10)));
    }

    #[test]
    fn corrupt_file_degrades_to_unsynced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("watermarks.json");
        fs::write(&path, "not json").unwrap();
        let store = JsonWatermarkStore::new(&path);
        assert_eq!(store.get("ALK"), None);
        // A write replaces the corrupt file with a valid one.
        store.set("ALK", date(2024, 6, 10)).unwrap();
        assert_eq!(store.get("ALK"), Some(date(2024, 6, 10)));
    }
}
