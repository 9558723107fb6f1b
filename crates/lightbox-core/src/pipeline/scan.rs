//! Source discovery: list, filter, and time-order the photographs to ingest.

use std::path::Path;
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::error::{StageError, StageResult};
use crate::types::SourceImage;

/// macOS resource-fork marker; these shadow files are never photographs.
const HIDDEN_MARKER: &str = "._";

/// Discovers source photographs in a flat directory.
pub struct Scanner;

impl Scanner {
    /// List the source directory and return images sorted ascending by
    /// modification time.
    ///
    /// Filters: regular files only, case-insensitive `.jpg`/`.jpeg`
    /// extension, no `._` hidden-marker prefix. Returns
    /// [`StageError::DirectoryNotFound`] if the directory is absent:
    /// fatal for a from-source run, recoverable (fall back to the
    /// derived output) for a cached run.
    pub fn scan(dir: &Path) -> StageResult<Vec<SourceImage>> {
        if !dir.is_dir() {
            return Err(StageError::DirectoryNotFound(dir.to_path_buf()));
        }

        let mut images = Vec::new();

        // One flat directory: no recursion into subdirectories.
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_file() || !Self::is_source(path) {
                continue;
            }
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            images.push(SourceImage {
                path: path.to_path_buf(),
                modified,
            });
        }

        images.sort_by_key(|img| img.modified);
        Ok(images)
    }

    /// Check whether a path looks like a source photograph.
    fn is_source(path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if name.starts_with(HIDDEN_MARKER) {
            return false;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                ext == "jpg" || ext == "jpeg"
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::path::PathBuf;
    use std::time::Duration;

    fn touch(dir: &Path, name: &str, mtime: SystemTime) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        file.set_modified(mtime).unwrap();
        path
    }

    #[test]
    fn test_is_source_filtering() {
        assert!(Scanner::is_source(Path::new("P1090567.JPG")));
        assert!(Scanner::is_source(Path::new("holiday.jpeg")));
        assert!(Scanner::is_source(Path::new("mixed.Jpg")));
        assert!(!Scanner::is_source(Path::new("._P1090567.JPG")));
        assert!(!Scanner::is_source(Path::new("notes.txt")));
        assert!(!Scanner::is_source(Path::new("raw.CR2")));
        assert!(!Scanner::is_source(Path::new("no_extension")));
    }

    #[test]
    fn test_scan_missing_directory() {
        let result = Scanner::scan(Path::new("/nonexistent/photos"));
        assert!(matches!(result, Err(StageError::DirectoryNotFound(_))));
    }

    #[test]
    fn test_scan_sorts_by_mtime_ascending() {
        let dir = tempfile::tempdir().unwrap();
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);

        // Create in reverse chronological order to prove sorting happens.
        touch(dir.path(), "c.jpg", base + Duration::from_secs(30));
        touch(dir.path(), "a.jpg", base + Duration::from_secs(10));
        touch(dir.path(), "b.jpg", base + Duration::from_secs(20));
        touch(dir.path(), "._a.jpg", base);
        touch(dir.path(), "skip.png", base);

        let images = Scanner::scan(dir.path()).unwrap();
        let names: Vec<_> = images.iter().map(|i| i.file_name().to_string()).collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "c.jpg"]);
    }

    #[test]
    fn test_scan_skips_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        File::create(dir.path().join("nested").join("deep.jpg")).unwrap();
        File::create(dir.path().join("top.jpg")).unwrap();

        let images = Scanner::scan(dir.path()).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].file_name(), "top.jpg");
    }
}
