//! Content-hash cache for stage outputs (spec.md §4.2, §4.3, §9).
//!
//! A cache hit bypasses recomputation entirely. Insertion is write-once: the
//! only lock in the pipeline guards the file-create step, everything else is
//! lock-free, per spec.md §5.

use crate::error::{PipelineError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct ContentCache {
    root: PathBuf,
    insert_lock: Mutex<()>,
}

impl ContentCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            insert_lock: Mutex::new(()),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key))
    }

    /// Returns `Some(value)` on a cache hit. A corrupt cache entry is a
    /// correctness bug per spec.md §9, so it surfaces as `CacheCorrupt`
    /// rather than being silently treated as a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        let value = serde_json::from_slice(&bytes).map_err(|e| PipelineError::CacheCorrupt(format!("{}: {}", path.display(), e)))?;
        Ok(Some(value))
    }

    /// Write-once insert: if another worker already wrote this key while we
    /// were computing, keep the existing entry rather than overwrite it,
    /// which keeps concurrent inserts for the same key race-free without a
    /// hot-path lock.
    pub fn insert<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let _guard = self.insert_lock.lock().unwrap();
        let path = self.path_for(key);
        if path.exists() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.root)?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serde_json::to_vec(value)?)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.path_for(key).exists()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(tmp.path());
        assert!(cache.get::<Vec<i32>>("k1").unwrap().is_none());
        cache.insert("k1", &vec![1, 2, 3]).unwrap();
        let hit: Vec<i32> = cache.get("k1").unwrap().unwrap();
        assert_eq!(hit, vec![1, 2, 3]);
    }

    #[test]
    fn second_insert_does_not_clobber_first() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(tmp.path());
        cache.insert("k1", &1u32).unwrap();
        cache.insert("k1", &2u32).unwrap();
        let v: u32 = cache.get("k1").unwrap().unwrap();
        assert_eq!(v, 1);
    }

    #[test]
    fn corrupt_entry_surfaces_as_error() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(tmp.path());
        std::fs::write(tmp.path().join("bad.json"), b"not json").unwrap();
        let result: Result<Option<u32>> = cache.get("bad");
        assert!(matches!(result, Err(PipelineError::CacheCorrupt(_))));
    }
}
