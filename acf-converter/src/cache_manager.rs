//! Per-file scan result cache
//!
//! Tracks file mtimes so unchanged theme files are not parsed again.
//! Entries live in an LRU; with persistence enabled they are also written
//! to `.acf-converter/cache.json` under the theme root.

use anyhow::{Context, Result};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::diagnostics::Diagnostics;
use crate::extractor::ExtractOutcome;

/// Current cache version - increment when cache format changes
const CACHE_VERSION: u32 = 1;

/// Cache file name, relative to the theme root
const CACHE_FILE: &str = ".acf-converter/cache.json";

/// Stored file modification time
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileMtime {
    pub mtime_secs: u64,
    pub mtime_nanos: u32,
}

impl FileMtime {
    /// Create from SystemTime
    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(SystemTime::UNIX_EPOCH) {
            Ok(duration) => FileMtime {
                mtime_secs: duration.as_secs(),
                mtime_nanos: duration.subsec_nanos(),
            },
            Err(_) => FileMtime {
                mtime_secs: 0,
                mtime_nanos: 0,
            },
        }
    }

    /// Get mtime from a file path
    pub fn from_path(path: &Path) -> Option<Self> {
        fs::metadata(path)
            .ok()
            .and_then(|m| m.modified().ok())
            .map(Self::from_system_time)
    }
}

/// What one scan of one file produced
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedFile {
    pub mtime: FileMtime,
    pub groups: Vec<Value>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl CachedFile {
    pub fn new(mtime: FileMtime, outcome: &ExtractOutcome) -> Self {
        Self {
            mtime,
            groups: outcome.groups.clone(),
            errors: outcome.diagnostics.errors.clone(),
            warnings: outcome.diagnostics.warnings.clone(),
        }
    }

    /// Rebuild the outcome without logging the stored diagnostics again
    pub fn to_outcome(&self) -> ExtractOutcome {
        ExtractOutcome {
            groups: self.groups.clone(),
            diagnostics: Diagnostics {
                errors: self.errors.clone(),
                warnings: self.warnings.clone(),
            },
        }
    }
}

/// The cache structure stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DiskCache {
    /// Cache version for compatibility checking
    version: u32,
    theme_root: PathBuf,
    /// Keyed by path relative to the theme root
    files: HashMap<String, CachedFile>,
}

/// Manages cached scan results for one theme
pub struct ScanCache {
    theme_root: PathBuf,
    /// None when the cache is memory-only
    cache_path: Option<PathBuf>,
    entries: LruCache<PathBuf, CachedFile>,
}

impl ScanCache {
    /// A cache that never touches the disk
    pub fn in_memory(theme_root: &Path, capacity: usize) -> Self {
        Self {
            theme_root: theme_root.to_path_buf(),
            cache_path: None,
            entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    /// Load the persisted cache for a theme root
    ///
    /// A missing, unreadable or outdated cache file just means starting
    /// empty.
    pub fn load(theme_root: &Path, capacity: usize) -> Self {
        let cache_path = theme_root.join(CACHE_FILE);
        let mut cache = Self::in_memory(theme_root, capacity);
        cache.cache_path = Some(cache_path.clone());

        if !cache_path.exists() {
            debug!("No cache file found at {:?}", cache_path);
            return cache;
        }

        match fs::read_to_string(&cache_path) {
            Ok(content) => match serde_json::from_str::<DiskCache>(&content) {
                Ok(disk) => {
                    if disk.version != CACHE_VERSION {
                        info!(
                            "Cache version mismatch (got {}, expected {}), will rescan",
                            disk.version, CACHE_VERSION
                        );
                    } else if disk.theme_root != theme_root {
                        info!("Cache theme root mismatch, will rescan");
                    } else {
                        info!("Loaded cache: {} file(s)", disk.files.len());
                        for (relative, entry) in disk.files {
                            cache.entries.put(theme_root.join(relative), entry);
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to parse cache file: {}", e);
                }
            },
            Err(e) => {
                debug!("Failed to read cache file: {}", e);
            }
        }

        cache
    }

    /// Save cache to disk; a no-op for memory-only caches
    pub fn save(&self) -> Result<()> {
        let Some(cache_path) = &self.cache_path else {
            return Ok(());
        };

        if let Some(parent) = cache_path.parent() {
            fs::create_dir_all(parent).context("Failed to create cache directory")?;
        }

        let files = self
            .entries
            .iter()
            .map(|(path, entry)| {
                let relative = path
                    .strip_prefix(&self.theme_root)
                    .unwrap_or(path)
                    .to_string_lossy()
                    .to_string();
                (relative, entry.clone())
            })
            .collect();

        let disk = DiskCache {
            version: CACHE_VERSION,
            theme_root: self.theme_root.clone(),
            files,
        };

        let content = serde_json::to_string_pretty(&disk).context("Failed to serialize cache")?;
        fs::write(cache_path, content).context("Failed to write cache file")?;

        info!("Saved cache to {:?}", cache_path);
        Ok(())
    }

    /// Cached result for a file whose mtime has not changed
    ///
    /// A stale entry is dropped.
    pub fn get(&mut self, path: &Path) -> Option<&CachedFile> {
        let current = FileMtime::from_path(path);
        let fresh = match (self.entries.peek(path), current) {
            (Some(entry), Some(mtime)) => entry.mtime == mtime,
            (Some(_), None) => false,
            (None, _) => return None,
        };

        if fresh {
            self.entries.get(path)
        } else {
            debug!("Cache entry for {:?} is stale", path);
            self.entries.pop(path);
            None
        }
    }

    pub fn insert(&mut self, path: PathBuf, entry: CachedFile) {
        self.entries.put(path, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
