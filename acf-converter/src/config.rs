//! Converter settings and WordPress theme discovery
//!
//! Settings come from an optional `acf-converter.json` found by walking up
//! from the theme directory. Every field has a default, so an empty file or
//! no file at all is valid.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Name of the settings file searched for from the theme directory upward
pub const SETTINGS_FILE_NAME: &str = "acf-converter.json";

/// Default number of per-file scan results kept in memory
const DEFAULT_CACHE_CAPACITY: usize = 512;

/// Settings for the extractor and the scanner
///
/// ```json
/// { "functionNames": ["acf_add_local_field_group"], "excludePatterns": ["vendor/**"] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverterSettings {
    /// Registration functions whose calls carry a field group
    #[serde(default = "default_function_names")]
    pub function_names: Vec<String>,

    /// Action hooks whose callbacks are searched in functions.php
    #[serde(default = "default_hook_names")]
    pub hook_names: Vec<String>,

    /// Glob patterns, relative to the theme root, that the scanner skips
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Keep scan results in `.acf-converter/cache.json` between runs
    #[serde(default)]
    pub persist_cache: bool,

    /// Directory, relative to the theme root, for written JSON files
    #[serde(default = "default_json_output_dir")]
    pub json_output_dir: String,
}

fn default_function_names() -> Vec<String> {
    vec![
        "acf_add_local_field_group".to_string(),
        "register_field_group".to_string(),
    ]
}

fn default_hook_names() -> Vec<String> {
    ["acf/init", "acf/include_fields", "init", "after_setup_theme", "wp_loaded"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_exclude_patterns() -> Vec<String> {
    vec!["vendor/**".to_string(), "node_modules/**".to_string()]
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

fn default_json_output_dir() -> String {
    "acf-json".to_string()
}

impl Default for ConverterSettings {
    fn default() -> Self {
        Self {
            function_names: default_function_names(),
            hook_names: default_hook_names(),
            exclude_patterns: default_exclude_patterns(),
            cache_capacity: default_cache_capacity(),
            persist_cache: false,
            json_output_dir: default_json_output_dir(),
        }
    }
}

impl ConverterSettings {
    /// Load settings for a directory
    ///
    /// Uses the nearest `acf-converter.json` at or above `dir`. No file means
    /// defaults; a file that fails to parse is an error.
    pub fn load_from(dir: &Path) -> Result<Self> {
        match find_settings_file(dir) {
            Some(path) => Self::load_file(&path),
            None => {
                debug!("No {} found above {:?}, using defaults", SETTINGS_FILE_NAME, dir);
                Ok(Self::default())
            }
        }
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read settings file {:?}", path))?;
        let settings: Self =
            serde_json::from_str(&content).with_context(|| format!("Invalid settings file {:?}", path))?;
        info!("Loaded settings from {:?}", path);
        Ok(settings)
    }
}

/// Walk up from `start` looking for the settings file
pub fn find_settings_file(start: &Path) -> Option<PathBuf> {
    let mut current = if start.is_file() { start.parent()? } else { start };

    loop {
        let candidate = current.join(SETTINGS_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        current = current.parent()?;
    }
}

/// Find the WordPress theme root by walking up from a path
///
/// A theme root holds both `style.css` and `functions.php`.
/// Returns None if no theme root is found.
pub fn find_theme_root(path: &Path) -> Option<PathBuf> {
    let mut current = path;

    // If it's a file, start from its parent directory
    if current.is_file() {
        current = current.parent()?;
    }

    loop {
        let has_style = current.join("style.css").is_file();
        let has_functions = current.join("functions.php").is_file();

        if has_style && has_functions {
            info!("Found theme root at {:?}", current);
            return Some(current.to_path_buf());
        }

        current = current.parent()?;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_no_file() {
        let dir = TempDir::new().unwrap();
        let settings = ConverterSettings::load_from(dir.path()).unwrap();
        assert_eq!(settings, ConverterSettings::default());
        assert!(settings.function_names.contains(&"acf_add_local_field_group".to_string()));
        assert_eq!(settings.cache_capacity, 512);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(SETTINGS_FILE_NAME),
            r#"{ "functionNames": ["my_register_group"], "persistCache": true }"#,
        )
        .unwrap();

        let nested = dir.path().join("inc").join("acf");
        fs::create_dir_all(&nested).unwrap();

        let settings = ConverterSettings::load_from(&nested).unwrap();
        assert_eq!(settings.function_names, vec!["my_register_group".to_string()]);
        assert!(settings.persist_cache);
        assert_eq!(settings.hook_names, default_hook_names());
        assert_eq!(settings.json_output_dir, "acf-json");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(SETTINGS_FILE_NAME), "{ not json").unwrap();
        let err = ConverterSettings::load_from(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid settings file"));
    }

    #[test]
    fn test_find_theme_root() {
        let dir = TempDir::new().unwrap();
        let theme = dir.path().join("wp-content").join("themes").join("starter");
        let inc = theme.join("inc");
        fs::create_dir_all(&inc).unwrap();
        fs::write(theme.join("style.css"), "/* Theme Name: Starter */").unwrap();
        fs::write(theme.join("functions.php"), "<?php\n").unwrap();
        fs::write(inc.join("fields.php"), "<?php\n").unwrap();

        assert_eq!(find_theme_root(&inc.join("fields.php")), Some(theme.clone()));
        assert_eq!(find_theme_root(&theme), Some(theme));
    }

    #[test]
    fn test_no_theme_root() {
        let dir = TempDir::new().unwrap();
        assert_eq!(find_theme_root(dir.path()), None);
    }
}
