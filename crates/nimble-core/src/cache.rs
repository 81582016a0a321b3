//! Per-folder record of donor files that were already merged
//!
//! The cache lives in a `.cache` file inside the donor folder, one
//! `path : timestamp` line per processed file. It is only ever appended to,
//! one line right after each donor is merged, so an interrupted merge keeps
//! the entries of the donors it finished.

use crate::error::{Error, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Name of the cache file inside a donor folder
pub const CACHE_FILE_NAME: &str = ".cache";

/// `strftime` format of cached timestamps (local time)
pub const TIMESTAMP_FORMAT: &str = "%F %T";

const FIELD_SEPARATOR: &str = " : ";

/// A processed donor file and its last-write time when it was merged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Path with `/` separators
    pub path: String,
    /// Last-write time formatted with [`TIMESTAMP_FORMAT`]
    pub timestamp: String,
}

impl CacheEntry {
    /// Create a new cache entry
    pub fn new(path: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            timestamp: timestamp.into(),
        }
    }

    /// Entry for a file as it currently is on disk
    pub fn for_file(path: &Path) -> Result<Self> {
        Ok(Self::new(cache_key(path), last_write_time(path)?))
    }
}

/// The cache of one donor folder
#[derive(Debug, Clone, Default)]
pub struct FolderCache {
    file: PathBuf,
    entries: Vec<CacheEntry>,
}

impl FolderCache {
    /// An empty cache for a folder, without reading the cache file
    pub fn empty<P: AsRef<Path>>(folder: P) -> Self {
        Self {
            file: folder.as_ref().join(CACHE_FILE_NAME),
            entries: Vec::new(),
        }
    }

    /// Read a folder's cache, or create an empty one if there is no cache file
    pub fn load<P: AsRef<Path>>(folder: P) -> Result<Self> {
        let mut cache = Self::empty(folder);
        if !cache.file.exists() {
            return Ok(cache);
        }

        let content = fs::read_to_string(&cache.file).map_err(|e| Error::FileRead {
            path: cache.file.clone(),
            source: e,
        })?;
        cache.entries = content
            .lines()
            .filter_map(|line| line.rsplit_once(FIELD_SEPARATOR))
            .map(|(path, timestamp)| CacheEntry::new(path, timestamp.trim_end()))
            .collect();
        Ok(cache)
    }

    /// Path of the cache file
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// All entries, oldest first
    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    /// Whether a file was merged before and has not been written since
    pub fn is_unchanged(&self, path: &str, timestamp: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.path == path && e.timestamp == timestamp)
    }

    /// Record a processed file, appending it to the cache file immediately
    pub fn append(&mut self, entry: CacheEntry) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file)?;
        writeln!(file, "{}{}{}", entry.path, FIELD_SEPARATOR, entry.timestamp)?;
        self.entries.push(entry);
        Ok(())
    }
}

/// Cache key of a path: its text with `/` as the only separator
pub fn cache_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Last-write time of a file in local time, formatted for the cache
pub fn last_write_time(path: &Path) -> Result<String> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(DateTime::<Local>::from(modified)
        .format(TIMESTAMP_FORMAT)
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_cache_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FolderCache::load(dir.path()).unwrap();
        assert!(cache.entries().is_empty());
        assert_eq!(cache.file(), dir.path().join(".cache"));
    }

    #[test]
    fn test_append_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = FolderCache::load(dir.path()).unwrap();
        cache
            .append(CacheEntry::new("in/a.csv", "2024-05-01 08:30:00"))
            .unwrap();
        cache
            .append(CacheEntry::new("in/b.xlsx", "2024-05-02 09:00:00"))
            .unwrap();

        let content = fs::read_to_string(cache.file()).unwrap();
        assert_eq!(
            content,
            "in/a.csv : 2024-05-01 08:30:00\nin/b.xlsx : 2024-05-02 09:00:00\n"
        );

        let reloaded = FolderCache::load(dir.path()).unwrap();
        assert_eq!(reloaded.entries().len(), 2);
        assert!(reloaded.is_unchanged("in/a.csv", "2024-05-01 08:30:00"));
        assert!(!reloaded.is_unchanged("in/a.csv", "2024-05-01 08:30:01"));
        assert!(!reloaded.is_unchanged("in/c.csv", "2024-05-01 08:30:00"));
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CACHE_FILE_NAME),
            "garbage\nx.csv : 2024-01-01 00:00:00\r\n",
        )
        .unwrap();
        let cache = FolderCache::load(dir.path()).unwrap();
        assert_eq!(
            cache.entries(),
            &[CacheEntry::new("x.csv", "2024-01-01 00:00:00")]
        );
    }

    #[test]
    fn test_cache_key_normalizes_separators() {
        assert_eq!(cache_key(Path::new(r"C:\in\a.csv")), "C:/in/a.csv");
    }

    #[test]
    fn test_entry_for_file_uses_timestamp_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        fs::write(&path, "DATA").unwrap();
        let entry = CacheEntry::for_file(&path).unwrap();
        assert_eq!(entry.timestamp.len(), "2024-01-01 00:00:00".len());
        assert!(entry.path.ends_with("/a.csv"));
    }
}
