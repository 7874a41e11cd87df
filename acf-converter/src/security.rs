//! Path allow-listing for files handed to the extractor
//!
//! The scanner asks [`PathGuard::validate_path`] before parsing anything.
//! A path passes when it resolves (symlinks included) to a `.php` file
//! inside the theme root.

use std::path::{Path, PathBuf};

use tracing::warn;

#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    /// Guard for a root directory; the root is canonicalized when possible
    pub fn new(root: &Path) -> Self {
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        Self { root }
    }

    pub fn validate_path(&self, path: &Path) -> bool {
        let is_php = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ext.eq_ignore_ascii_case("php"));
        if !is_php {
            return false;
        }

        match path.canonicalize() {
            Ok(resolved) if resolved.starts_with(&self.root) => true,
            Ok(resolved) => {
                warn!("Rejecting {:?}: resolves outside {:?}", resolved, self.root);
                false
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_accepts_php_inside_root() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("inc").join("fields.php");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, "<?php\n").unwrap();

        let guard = PathGuard::new(temp.path());
        assert!(guard.validate_path(&file));
        assert!(guard.validate_path(&temp.path().join("inc").join("..").join("inc").join("fields.php")));
    }

    #[test]
    fn test_rejects_other_extensions_and_missing_files() {
        let temp = TempDir::new().unwrap();
        let css = temp.path().join("style.css");
        fs::write(&css, "").unwrap();

        let guard = PathGuard::new(temp.path());
        assert!(!guard.validate_path(&css));
        assert!(!guard.validate_path(&temp.path().join("missing.php")));
    }

    #[test]
    fn test_rejects_paths_outside_root() {
        let outside = TempDir::new().unwrap();
        let theme = TempDir::new().unwrap();
        let file = outside.path().join("evil.php");
        fs::write(&file, "<?php\n").unwrap();

        let guard = PathGuard::new(theme.path());
        assert!(!guard.validate_path(&file));
        assert!(!guard.validate_path(&theme.path().join("..").join(file.file_name().unwrap())));
    }
}
