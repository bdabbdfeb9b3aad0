pub mod cache;
pub mod csv;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use polars::prelude::DataFrame;
use serde::Serialize;

use crate::error::{BacktestError, Result};
use crate::indicators::{self, IndicatorId};
use cache::{DiskCache, SeriesCache};

/// Relative locations probed for a symbol's cleaned daily quotes.
const CANDIDATE_LAYOUTS: [&str; 4] = [
    "cleaned_stocks/{symbol}/historical_quotes.csv",
    "cleaned_stocks/{symbol}/cleaned_data.csv",
    "historical_quotes/{symbol}.csv",
    "cleaned_stocks/{symbol}.csv",
];

#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub memory_entries: usize,
    pub disk_entries: usize,
    pub capacity: usize,
    pub cache_dir: PathBuf,
}

/// Loads cleaned OHLCV series, augments them with the indicator columns a
/// strategy requires, and caches the result in memory and on disk. Safe to
/// share across threads: the memory cache sits behind a mutex, and writes
/// back to a symbol's CSV are serialized through a per-symbol lock table.
pub struct DataManager {
    data_root: PathBuf,
    memory: Mutex<SeriesCache>,
    capacity: usize,
    disk: DiskCache,
    write_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl DataManager {
    pub fn new(data_root: impl Into<PathBuf>, cache_capacity: usize) -> Result<Self> {
        let data_root = data_root.into();
        let disk = DiskCache::new(data_root.join("data_cache"))?;
        // Stale indicator columns must not leak across runs.
        disk.clear()?;
        Ok(Self {
            data_root,
            memory: Mutex::new(SeriesCache::new(cache_capacity)),
            capacity: cache_capacity,
            disk,
            write_locks: DashMap::new(),
        })
    }

    /// Build from the environment: `DATA_ROOT` (default `./data`).
    pub fn from_env(cache_capacity: usize) -> Result<Self> {
        let root = std::env::var("DATA_ROOT").unwrap_or_else(|_| "./data".to_string());
        Self::new(root, cache_capacity)
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Directory where backtest artifacts for a symbol are written.
    pub fn output_dir(&self, symbol: &str) -> PathBuf {
        self.data_root
            .join("cleaned_stocks")
            .join(symbol)
            .join("backtest_results")
    }

    /// Load a symbol's series, guaranteeing that every requested indicator
    /// column is present. The frame comes back sorted ascending by date.
    pub fn load(&self, symbol: &str, required: &[IndicatorId]) -> Result<DataFrame> {
        let key = format!("{symbol}_cleaned_true");

        let cached = self
            .memory
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&key);
        if let Some(mut frame) = cached {
            tracing::debug!(%symbol, "series served from memory cache");
            indicators::augment(&mut frame, required)?;
            return Ok(frame);
        }

        let path = self
            .locate(symbol)
            .ok_or_else(|| BacktestError::DataNotFound(symbol.to_string()))?;
        let mut frame = csv::read_ohlcv_csv(&path)?;
        let added = indicators::augment(&mut frame, required)?;
        if !added.is_empty() {
            self.persist_indicators(symbol, &frame, &path)?;
        }

        if let Err(e) = self.disk.store(&key, &frame) {
            tracing::warn!(%symbol, error = %e, "disk cache write failed");
        }
        self.memory
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key, frame.clone());
        tracing::info!(%symbol, rows = frame.height(), "loaded and cached series");
        Ok(frame)
    }

    /// Symbols available under the data layout: 6-digit directories or CSV
    /// stems in the known locations.
    pub fn list_symbols(&self) -> Result<Vec<String>> {
        let mut symbols: Vec<String> = Vec::new();
        for dir in ["cleaned_stocks", "historical_quotes"] {
            let root = self.data_root.join(dir);
            if !root.exists() {
                continue;
            }
            for entry in std::fs::read_dir(&root)? {
                let path = entry?.path();
                let stem = match path.file_stem().and_then(|s| s.to_str()) {
                    Some(s) => s.to_string(),
                    None => continue,
                };
                let looks_like_symbol =
                    stem.len() == 6 && stem.bytes().all(|b| b.is_ascii_digit());
                let is_csv_or_dir =
                    path.is_dir() || path.extension().is_some_and(|e| e == "csv");
                if looks_like_symbol && is_csv_or_dir && !symbols.contains(&stem) {
                    symbols.push(stem);
                }
            }
        }
        symbols.sort();
        Ok(symbols)
    }

    pub fn cache_info(&self) -> CacheInfo {
        CacheInfo {
            memory_entries: self
                .memory
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .len(),
            disk_entries: self.disk.len(),
            capacity: self.capacity,
            cache_dir: self.disk.dir().to_path_buf(),
        }
    }

    pub fn clear_cache(&self) -> Result<()> {
        self.memory
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
        self.disk.clear()
    }

    fn locate(&self, symbol: &str) -> Option<PathBuf> {
        CANDIDATE_LAYOUTS.iter().find_map(|layout| {
            let path = self.data_root.join(layout.replace("{symbol}", symbol));
            path.exists().then_some(path)
        })
    }

    /// Merge newly computed indicator columns back into the source CSV.
    /// Read-modify-write, serialized per symbol.
    fn persist_indicators(&self, symbol: &str, frame: &DataFrame, path: &Path) -> Result<()> {
        let lock = self
            .write_locks
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let existing = csv::read_ohlcv_csv(path)?;
        let merged = csv::merge_preserving(frame, &existing)?;
        csv::write_csv_desc(path, &merged)?;
        tracing::info!(%symbol, columns = merged.width(), "indicator columns persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn seed_symbol(root: &Path, symbol: &str, rows: usize) {
        let dir = root.join("cleaned_stocks").join(symbol);
        std::fs::create_dir_all(&dir).unwrap();
        let mut body = String::from("date,open,high,low,close,volume\n");
        for i in 0..rows {
            let day = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                + chrono::Duration::days(i as i64);
            let px = 10.0 + 0.05 * i as f64;
            body.push_str(&format!(
                "{day},{px:.2},{:.2},{:.2},{px:.2},{}\n",
                px + 0.2,
                px - 0.2,
                100_000 + i
            ));
        }
        let mut f = std::fs::File::create(dir.join("historical_quotes.csv")).unwrap();
        f.write_all(body.as_bytes()).unwrap();
    }

    #[test]
    fn load_missing_symbol_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let dm = DataManager::new(dir.path(), 10).unwrap();
        let err = dm.load("999999", &[]).unwrap_err();
        assert!(matches!(err, BacktestError::DataNotFound(_)));
    }

    #[test]
    fn load_augments_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        seed_symbol(dir.path(), "000001", 60);
        let dm = DataManager::new(dir.path(), 10).unwrap();

        let required = [IndicatorId::Ma(5), IndicatorId::Rsi];
        let first = dm.load("000001", &required).unwrap();
        assert!(first.column("MA5").is_ok());
        assert!(first.column("RSI").is_ok());

        // Same request twice yields the same columns.
        let second = dm.load("000001", &required).unwrap();
        assert_eq!(first.get_column_names(), second.get_column_names());

        // A superset request only adds the new columns.
        let superset = dm
            .load("000001", &[IndicatorId::Ma(5), IndicatorId::Rsi, IndicatorId::Obv])
            .unwrap();
        assert!(superset.column("OBV").is_ok());
        assert_eq!(superset.width(), second.width() + 1);
    }

    #[test]
    fn computed_indicators_survive_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        seed_symbol(dir.path(), "000002", 40);
        {
            let dm = DataManager::new(dir.path(), 10).unwrap();
            dm.load("000002", &[IndicatorId::Ma(5)]).unwrap();
        }
        // A fresh manager (cleared caches) still finds MA5 in the CSV.
        let dm = DataManager::new(dir.path(), 10).unwrap();
        let frame = dm.load("000002", &[]).unwrap();
        assert!(frame.column("MA5").is_ok());
    }

    #[test]
    fn list_symbols_finds_seeded() {
        let dir = tempfile::tempdir().unwrap();
        seed_symbol(dir.path(), "000001", 5);
        seed_symbol(dir.path(), "600519", 5);
        let dm = DataManager::new(dir.path(), 10).unwrap();
        assert_eq!(dm.list_symbols().unwrap(), vec!["000001", "600519"]);
    }
}
