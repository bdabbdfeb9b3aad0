use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use polars::prelude::*;

use crate::error::Result;

struct CacheEntry {
    frame: DataFrame,
    hits: u64,
}

/// In-memory cache of augmented series, bounded by capacity. Eviction drops
/// the least-accessed entries first.
pub struct SeriesCache {
    entries: HashMap<String, CacheEntry>,
    capacity: usize,
}

impl SeriesCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&mut self, key: &str) -> Option<DataFrame> {
        let entry = self.entries.get_mut(key)?;
        entry.hits += 1;
        Some(entry.frame.clone())
    }

    pub fn insert(&mut self, key: String, frame: DataFrame) {
        self.entries.insert(key, CacheEntry { frame, hits: 1 });
        while self.entries.len() > self.capacity {
            let coldest = self
                .entries
                .iter()
                .min_by_key(|(name, e)| (e.hits, (*name).clone()))
                .map(|(name, _)| name.clone());
            match coldest {
                Some(name) => {
                    self.entries.remove(&name);
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Write-through disk cache of augmented frames, one parquet file per key.
/// Cleared on manager construction so stale indicators never survive a run.
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn clear(&self) -> Result<()> {
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "parquet") {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    pub fn store(&self, key: &str, frame: &DataFrame) -> Result<()> {
        let path = self.dir.join(format!("{key}.parquet"));
        let file = File::create(&path)?;
        ParquetWriter::new(file).finish(&mut frame.clone())?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        std::fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .filter_map(std::result::Result::ok)
                    .filter(|e| e.path().extension().is_some_and(|x| x == "parquet"))
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
