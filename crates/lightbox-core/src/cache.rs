//! Persistent rating cache.
//!
//! Scores are expensive to compute, so every rating earned in a run is
//! written back keyed by the original source file name; entries survive
//! a change of display format. A missing or corrupt cache file degrades
//! to an empty cache with a warning; it never aborts a run.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{StageError, StageResult};

/// File-backed map of source file name to aesthetic rating.
pub struct RatingCache {
    path: PathBuf,
    ratings: HashMap<String, f32>,
    dirty: bool,
}

impl RatingCache {
    /// Load the cache from disk.
    ///
    /// A missing or unparseable file yields an empty cache, with a
    /// warning, so a damaged cache costs a re-score rather than a
    /// failed run.
    pub fn load(path: &Path) -> Self {
        let ratings = match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!(
                        "Ignoring unreadable rating cache {}: {}",
                        path.display(),
                        e
                    );
                    HashMap::new()
                }
            },
            Err(e) => {
                tracing::warn!("No rating cache at {}: {}", path.display(), e);
                HashMap::new()
            }
        };

        Self {
            path: path.to_path_buf(),
            ratings,
            dirty: false,
        }
    }

    pub fn get(&self, file_name: &str) -> Option<f32> {
        self.ratings.get(file_name).copied()
    }

    pub fn insert(&mut self, file_name: &str, rating: f32) {
        self.ratings.insert(file_name.to_string(), rating);
        self.dirty = true;
    }

    /// Number of cached ratings.
    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }

    /// True if ratings were added since load.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write the cache back to disk if anything changed.
    ///
    /// A run that served every photo from cache leaves the file untouched.
    pub fn save(&mut self) -> StageResult<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StageError::Cache {
                path: self.path.clone(),
                message: format!("failed to create cache directory: {}", e),
            })?;
        }
        let json = serde_json::to_string_pretty(&self.ratings).map_err(|e| StageError::Cache {
            path: self.path.clone(),
            message: format!("failed to serialize ratings: {}", e),
        })?;
        fs::write(&self.path, json).map_err(|e| StageError::Cache {
            path: self.path.clone(),
            message: format!("failed to write cache: {}", e),
        })?;
        self.dirty = false;
        tracing::debug!(
            "Saved {} ratings to {}",
            self.ratings.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file_yields_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RatingCache::load(&dir.path().join("ratings.json"));
        assert!(cache.is_empty());
        assert!(!cache.is_dirty());
    }

    #[test]
    fn test_load_corrupt_file_yields_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratings.json");
        fs::write(&path, "{not json").unwrap();

        let cache = RatingCache::load(&path);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_insert_save_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratings.json");

        let mut cache = RatingCache::load(&path);
        cache.insert("P1090567.jpg", 6.3);
        cache.insert("P1090568.jpg", 4.8);
        assert!(cache.is_dirty());
        cache.save().unwrap();
        assert!(!cache.is_dirty());

        let reloaded = RatingCache::load(&path);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("P1090567.jpg"), Some(6.3));
        assert_eq!(reloaded.get("P1090568.jpg"), Some(4.8));
    }

    #[test]
    fn test_save_without_changes_does_not_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratings.json");

        let mut cache = RatingCache::load(&path);
        cache.save().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ratings.json");

        let mut cache = RatingCache::load(&path);
        cache.insert("a.jpg", 5.5);
        cache.save().unwrap();
        assert!(path.exists());
    }
}
