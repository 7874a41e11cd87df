//! Theme directory scanning
//!
//! Walks a theme, runs the extractor over every allowed PHP file and merges
//! the results by field-group key. One broken file never stops the scan;
//! its problems are reported next to everything else that was found.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cache_manager::{CachedFile, FileMtime, ScanCache};
use crate::config::ConverterSettings;
use crate::convert::{Converter, PhpToJson};
use crate::extractor::SourceExtractor;
use crate::security::PathGuard;

/// A problem tied to one scanned file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub path: PathBuf,
    pub message: String,
}

/// Everything one theme scan produced
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    /// Unique by `key`, in scan order
    pub groups: Vec<Value>,
    pub files_scanned: usize,
    pub files_from_cache: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FileError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<FileError>,
}

impl ScanReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Add one file's groups; the first group seen for a key wins
    fn merge_groups(&mut self, path: &Path, groups: Vec<Value>) {
        for group in groups {
            let Some(key) = group.get("key").and_then(Value::as_str).map(str::to_string) else {
                continue;
            };
            let existing = self
                .groups
                .iter()
                .find(|known| known.get("key").and_then(Value::as_str) == Some(key.as_str()));
            match existing {
                None => self.groups.push(group),
                Some(known) if *known == group => {}
                Some(_) => {
                    let message = format!("Field group '{}' is defined more than once; keeping the first", key);
                    warn!("{:?}: {}", path, message);
                    self.warnings.push(FileError {
                        path: path.to_path_buf(),
                        message,
                    });
                }
            }
        }
    }
}

pub struct ThemeScanner {
    root: PathBuf,
    extractor: SourceExtractor,
    guard: PathGuard,
    excludes: Vec<glob::Pattern>,
    cache: ScanCache,
}

impl ThemeScanner {
    pub fn new(root: &Path, settings: &ConverterSettings) -> Result<Self> {
        let excludes = settings
            .exclude_patterns
            .iter()
            .map(|pattern| {
                glob::Pattern::new(pattern).with_context(|| format!("Invalid exclude pattern '{}'", pattern))
            })
            .collect::<Result<Vec<_>>>()?;

        let cache = if settings.persist_cache {
            ScanCache::load(root, settings.cache_capacity)
        } else {
            ScanCache::in_memory(root, settings.cache_capacity)
        };

        Ok(Self {
            root: root.to_path_buf(),
            extractor: SourceExtractor::new(settings),
            guard: PathGuard::new(root),
            excludes,
            cache,
        })
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        self.excludes.iter().any(|pattern| pattern.matches_path(relative))
    }

    /// PHP files under the root, in a stable order, minus excluded ones
    pub fn php_files(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "php"))
            .filter(|path| !self.is_excluded(path))
            .collect()
    }

    pub fn scan(&mut self) -> ScanReport {
        let mut report = ScanReport::default();

        for path in self.php_files() {
            if !self.guard.validate_path(&path) {
                debug!("Skipping {:?}: rejected by path guard", path);
                continue;
            }

            let outcome = match self.cache.get(&path) {
                Some(cached) => {
                    report.files_from_cache += 1;
                    cached.to_outcome()
                }
                None => {
                    let outcome = self.extractor.parse_file(&path);
                    if let Some(mtime) = FileMtime::from_path(&path) {
                        self.cache.insert(path.clone(), CachedFile::new(mtime, &outcome));
                    }
                    outcome
                }
            };
            report.files_scanned += 1;

            let file_error = |message: String| FileError {
                path: path.clone(),
                message,
            };
            report.errors.extend(outcome.diagnostics.errors.into_iter().map(file_error));
            report.warnings.extend(outcome.diagnostics.warnings.into_iter().map(file_error));
            report.merge_groups(&path, outcome.groups);
        }

        info!(
            "Scanned {} file(s) ({} from cache): {} field group(s), {} error(s)",
            report.files_scanned,
            report.files_from_cache,
            report.groups.len(),
            report.errors.len()
        );
        report
    }

    /// Persist the scan cache, if persistence is enabled
    pub fn save_cache(&self) -> Result<()> {
        self.cache.save()
    }
}

/// Convert groups to ACF JSON and write them as `<key>.json` in `dir`
///
/// Groups whose conversion fails are skipped and logged. Returns the
/// written paths.
pub fn write_json_files(groups: &[Value], dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory {:?}", dir))?;

    let converter = PhpToJson::new();
    let mut written = Vec::new();

    for group in groups {
        let result = converter.convert(group);
        let Some(data) = result.data else {
            warn!("Not writing field group: {}", result.errors.join("; "));
            continue;
        };
        let Some(key) = data.get("key").and_then(Value::as_str) else {
            continue;
        };

        let path = dir.join(format!("{}.json", key));
        let content = serde_json::to_string_pretty(&data).context("Failed to serialize field group")?;
        fs::write(&path, content).with_context(|| format!("Failed to write {:?}", path))?;
        info!("Wrote {:?}", path);
        written.push(path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn group_php(key: &str, title: &str) -> String {
        format!(
            "<?php\nacf_add_local_field_group(array('key' => '{}', 'title' => '{}', 'fields' => array()));\n",
            key, title
        )
    }

    #[test]
    fn test_merge_keeps_first_definition() {
        let mut report = ScanReport::default();
        let a = serde_json::json!({"key": "group_a", "title": "A"});
        let b = serde_json::json!({"key": "group_a", "title": "B"});
        report.merge_groups(Path::new("one.php"), vec![a.clone(), a.clone()]);
        report.merge_groups(Path::new("two.php"), vec![b]);
        assert_eq!(report.groups, vec![a]);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].path, PathBuf::from("two.php"));
    }

    #[test]
    fn test_excluded_files_are_not_listed() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("vendor").join("pkg")).unwrap();
        fs::write(temp.path().join("vendor").join("pkg").join("x.php"), group_php("group_v", "V")).unwrap();
        fs::write(temp.path().join("fields.php"), group_php("group_f", "F")).unwrap();

        let scanner = ThemeScanner::new(temp.path(), &ConverterSettings::default()).unwrap();
        let files = scanner.php_files();
        assert_eq!(files, vec![temp.path().join("fields.php")]);
    }

    #[test]
    fn test_second_scan_uses_cache() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("fields.php"), group_php("group_f", "F")).unwrap();

        let mut scanner = ThemeScanner::new(temp.path(), &ConverterSettings::default()).unwrap();
        let first = scanner.scan();
        assert_eq!(first.groups.len(), 1);
        assert_eq!(first.files_from_cache, 0);

        let second = scanner.scan();
        assert_eq!(second.groups, first.groups);
        assert_eq!(second.files_from_cache, 1);
    }

    #[test]
    fn test_invalid_exclude_pattern() {
        let temp = TempDir::new().unwrap();
        let settings = ConverterSettings {
            exclude_patterns: vec!["[".to_string()],
            ..ConverterSettings::default()
        };
        assert!(ThemeScanner::new(temp.path(), &settings).is_err());
    }
}
