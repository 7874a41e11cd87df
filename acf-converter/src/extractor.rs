//! Source-Call Extractor
//!
//! Finds field-group registration calls in theme PHP and evaluates their
//! array-literal argument without running the file.
//!
//! Every file gets the top-level scan: calls outside any function, closure
//! or class body. Files named `functions.php` are also searched inside
//! callbacks attached to known action hooks (named functions and closures)
//! and inside the usual "is ACF active?" guard blocks.
//!
//! A call that fails to evaluate, or evaluates to something that is not a
//! field group, is recorded as an error and skipped. Nothing short of a
//! missing or unreadable file stops a scan.

use std::borrow::Cow;
use std::fs;
use std::io;
use std::ops::Range;
use std::path::Path;
use std::time::UNIX_EPOCH;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::ConverterSettings;
use crate::diagnostics::Diagnostics;
use crate::errors::ParseFileError;
use crate::evaluator::ArrayLiteralEvaluator;
use crate::parser::{ensure_php_open_tag, has_syntax_errors, language_php, looks_like_php, parse_php};
use crate::queries::find_function_calls;
use crate::validator::FieldGroupValidator;

/// Provenance attached to every extracted group until PHP→JSON conversion
pub const PROVENANCE_KEY: &str = "_acf_php_json_converter";

/// Older name for the provenance entry, stripped the same way
pub const LEGACY_PROVENANCE_KEY: &str = "_source_provenance";

const FUNCTIONS_PHP: &str = "functions.php";

lazy_static! {
    /// add_action('hook', 'callback_name'
    static ref NAMED_HOOK: Regex = Regex::new(
        r#"add_action\s*\(\s*['"]([^'"]+)['"]\s*,\s*['"]\\?([A-Za-z_][A-Za-z0-9_]*)['"]"#
    )
    .unwrap();

    /// add_action('hook', function (...) or add_action('hook', static function (...)
    static ref ANONYMOUS_HOOK: Regex = Regex::new(
        r#"add_action\s*\(\s*['"]([^'"]+)['"]\s*,\s*(?:static\s+)?function\s*\("#
    )
    .unwrap();

    /// if (function_exists('acf_add_local_field_group')) {, class_exists('ACF'), is_plugin_active(...)
    static ref CONDITIONAL_GUARD: Regex = Regex::new(
        r#"(?i)\bif\s*\(\s*(?:function_exists\s*\(\s*['"]acf_add_local_field_group['"]\s*\)|class_exists\s*\(\s*['"]\\?ACF['"]\s*\)|is_plugin_active\s*\(\s*['"][^'"]*['"]\s*\))\s*\)\s*\{"#
    )
    .unwrap();
}

/// Where an extracted group came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    FunctionsPhp,
    ThemeFile,
}

impl SourceType {
    pub fn for_path(path: &str) -> Self {
        let is_functions = Path::new(path)
            .file_name()
            .and_then(|name| name.to_str())
            .map_or(false, |name| name.eq_ignore_ascii_case(FUNCTIONS_PHP));
        if is_functions {
            SourceType::FunctionsPhp
        } else {
            SourceType::ThemeFile
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::FunctionsPhp => "functions_php",
            SourceType::ThemeFile => "theme_file",
        }
    }
}

/// Groups found in one source text, with everything that went wrong
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractOutcome {
    pub groups: Vec<Value>,
    pub diagnostics: Diagnostics,
}

impl ExtractOutcome {
    fn failed(message: String) -> Self {
        let mut diagnostics = Diagnostics::new();
        diagnostics.error(message);
        Self {
            groups: Vec::new(),
            diagnostics,
        }
    }
}

/// Return the text strictly between the first `{` at or after `from` and
/// its matching `}`
///
/// Braces inside string literals and comments are ignored. Returns None if
/// there is no opening brace or the braces never balance.
pub fn extract_braced_body(text: &str, from: usize) -> Option<&str> {
    braced_body_range(text, from).map(|range| &text[range])
}

fn braced_body_range(text: &str, from: usize) -> Option<Range<usize>> {
    let bytes = text.as_bytes();
    let mut i = from;
    let mut open = None;
    let mut depth = 0usize;

    while i < bytes.len() {
        if let Some(end) = skip_literal(text, i) {
            i = end + 1;
            continue;
        }
        match bytes[i] {
            b'{' => {
                if open.is_none() {
                    open = Some(i);
                }
                depth += 1;
            }
            b'}' if open.is_some() => {
                depth -= 1;
                if depth == 0 {
                    return Some(open? + 1..i);
                }
            }
            _ => {}
        }
        i += 1;
    }

    None
}

/// Number of unclosed `{` before `pos`, strings and comments ignored
fn brace_depth_at(text: &str, pos: usize) -> usize {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;

    while i < pos.min(bytes.len()) {
        if let Some(end) = skip_literal(text, i) {
            i = end + 1;
            continue;
        }
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
        i += 1;
    }

    depth
}

/// If a string literal or comment starts at `i`, the index of its last byte
fn skip_literal(text: &str, i: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    match bytes[i] {
        quote @ (b'\'' | b'"') => {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j] != quote {
                if bytes[j] == b'\\' {
                    j += 1;
                }
                j += 1;
            }
            Some(j)
        }
        b'#' => Some(line_end(bytes, i)),
        b'/' if bytes.get(i + 1) == Some(&b'/') => Some(line_end(bytes, i)),
        b'/' if bytes.get(i + 1) == Some(&b'*') => Some(
            text[i + 2..]
                .find("*/")
                .map_or(bytes.len(), |end| i + 2 + end + 1),
        ),
        _ => None,
    }
}

fn line_end(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |offset| from + offset)
}

/// Drop ranges nested inside an earlier one
fn outermost(mut ranges: Vec<Range<usize>>) -> Vec<Range<usize>> {
    ranges.sort_by_key(|range| (range.start, std::cmp::Reverse(range.end)));
    let mut kept: Vec<Range<usize>> = Vec::new();
    for range in ranges {
        if kept.last().map_or(true, |last| range.start >= last.end) {
            kept.push(range);
        }
    }
    kept
}

/// Locates and evaluates field-group registration calls
///
/// Holds no per-call state; one extractor can serve many files.
#[derive(Debug, Clone)]
pub struct SourceExtractor {
    function_names: Vec<String>,
    hook_names: Vec<String>,
    evaluator: ArrayLiteralEvaluator,
    validator: FieldGroupValidator,
}

impl Default for SourceExtractor {
    fn default() -> Self {
        Self::new(&ConverterSettings::default())
    }
}

impl SourceExtractor {
    pub fn new(settings: &ConverterSettings) -> Self {
        Self {
            function_names: settings.function_names.clone(),
            hook_names: settings.hook_names.clone(),
            evaluator: ArrayLiteralEvaluator::new(),
            validator: FieldGroupValidator::strict(),
        }
    }

    /// Top-level calls to `function_name` in `source`
    ///
    /// A bare fragment without an open tag is treated as PHP. No provenance
    /// is attached.
    pub fn extract_function_calls(&self, source: &str, function_name: &str) -> ExtractOutcome {
        let mut diagnostics = Diagnostics::new();
        let groups = self.scan_top_level(source, 1, &[function_name], &mut diagnostics);
        ExtractOutcome { groups, diagnostics }
    }

    /// Every group in one file's content, with provenance attached
    ///
    /// `source_file` names the file for provenance and decides whether the
    /// `functions.php` hook and guard search runs.
    pub fn extract_from_source(&self, source: &str, source_file: &str, modified: Option<i64>) -> ExtractOutcome {
        let mut diagnostics = Diagnostics::new();
        let names: Vec<&str> = self.function_names.iter().map(String::as_str).collect();
        let source_type = SourceType::for_path(source_file);

        let mut groups = self.scan_top_level(source, 1, &names, &mut diagnostics);

        if source_type == SourceType::FunctionsPhp {
            let mut bodies = self.hook_bodies(source);
            bodies.extend(nested_guard_bodies(source));

            for body in outermost(bodies) {
                let first_line = source[..body.start].matches('\n').count() + 1;
                groups.extend(self.scan_top_level(&source[body], first_line, &names, &mut diagnostics));
            }
        }

        let mut unique: Vec<Value> = Vec::with_capacity(groups.len());
        for group in groups {
            if !unique.contains(&group) {
                unique.push(group);
            }
        }

        for group in &mut unique {
            if let Value::Object(map) = group {
                map.insert(
                    PROVENANCE_KEY.to_string(),
                    json!({
                        "source_file": source_file,
                        "source_type": source_type.as_str(),
                        "modified_date": modified,
                    }),
                );
            }
        }

        debug!("{}: {} field group(s)", source_file, unique.len());
        ExtractOutcome {
            groups: unique,
            diagnostics,
        }
    }

    /// Read and scan one file
    ///
    /// Files other than `functions.php` must also pass the syntax check.
    pub fn parse_file(&self, path: &Path) -> ExtractOutcome {
        let (content, modified) = match read_source(path) {
            Ok(read) => read,
            Err(e) => return ExtractOutcome::failed(e.to_string()),
        };

        if !looks_like_php(&content) {
            return ExtractOutcome::failed(ParseFileError::NotPhp(path.to_path_buf()).to_string());
        }

        let source_file = path.to_string_lossy();
        if SourceType::for_path(&source_file) == SourceType::ThemeFile && has_syntax_errors(&content) {
            return ExtractOutcome::failed(ParseFileError::SyntaxErrors(path.to_path_buf()).to_string());
        }

        let outcome = self.extract_from_source(&content, &source_file, modified);
        info!("Parsed {:?}: {} field group(s)", path, outcome.groups.len());
        outcome
    }

    /// Evaluate the top-level calls in `source`, whose first line is
    /// `first_line` of the file it came from
    fn scan_top_level(
        &self,
        source: &str,
        first_line: usize,
        names: &[&str],
        diagnostics: &mut Diagnostics,
    ) -> Vec<Value> {
        let source = ensure_php_open_tag(source);
        let added_lines = if matches!(source, Cow::Owned(_)) { 1 } else { 0 };
        let tree = match parse_php(&source) {
            Ok(tree) => tree,
            Err(e) => {
                diagnostics.error(ParseFileError::Parser(e.to_string()).to_string());
                return Vec::new();
            }
        };

        let calls = match find_function_calls(&tree, &source, &language_php(), names) {
            Ok(calls) => calls,
            Err(e) => {
                diagnostics.error(ParseFileError::Parser(e.to_string()).to_string());
                return Vec::new();
            }
        };

        let mut groups = Vec::new();
        for call in calls.iter().filter(|call| !call.in_scope) {
            let line = call.row + first_line - added_lines;
            let Some(argument) = call.first_argument else {
                diagnostics.error(format!("{}() call on line {} has no arguments", call.function_name, line));
                continue;
            };

            let value = match self.evaluator.evaluate(argument) {
                Ok(value) => value,
                Err(e) => {
                    diagnostics.error(format!(
                        "Could not evaluate {}() call on line {}: {}",
                        call.function_name, line, e
                    ));
                    continue;
                }
            };

            match self.validator.check_field_group(&value, diagnostics) {
                Ok(()) => groups.push(value),
                Err(e) => diagnostics.error(format!(
                    "Skipping {}() call on line {}: {}",
                    call.function_name, line, e
                )),
            }
        }
        groups
    }

    /// Bodies of callbacks registered on known hooks
    fn hook_bodies(&self, source: &str) -> Vec<Range<usize>> {
        let mut bodies = Vec::new();

        for captures in NAMED_HOOK.captures_iter(source) {
            let (Some(hook), Some(callback)) = (captures.get(1), captures.get(2)) else {
                continue;
            };
            if !self.is_known_hook(hook.as_str()) || callback.as_str().eq_ignore_ascii_case("function") {
                continue;
            }
            let definition = format!(r"(?i)\bfunction\s+{}\s*\(", regex::escape(callback.as_str()));
            let Ok(definition) = Regex::new(&definition) else {
                continue;
            };
            match definition.find(source).and_then(|m| braced_body_range(source, m.end())) {
                Some(body) => bodies.push(body),
                None => debug!("No body found for hook callback {}", callback.as_str()),
            }
        }

        for captures in ANONYMOUS_HOOK.captures_iter(source) {
            let (Some(hook), Some(whole)) = (captures.get(1), captures.get(0)) else {
                continue;
            };
            if !self.is_known_hook(hook.as_str()) {
                continue;
            }
            if let Some(body) = braced_body_range(source, whole.end()) {
                bodies.push(body);
            }
        }

        bodies
    }

    fn is_known_hook(&self, hook: &str) -> bool {
        self.hook_names.iter().any(|known| known == hook)
    }
}

/// Bodies of `if (function_exists('acf_add_local_field_group')) { ... }` and
/// friends that sit inside some other block
///
/// Guards at file level need no special handling; the top-level scan
/// already sees into them.
fn nested_guard_bodies(source: &str) -> Vec<Range<usize>> {
    CONDITIONAL_GUARD
        .find_iter(source)
        .filter(|m| brace_depth_at(source, m.start()) > 0)
        .filter_map(|m| braced_body_range(source, m.end() - 1))
        .collect()
}

fn read_source(path: &Path) -> Result<(String, Option<i64>), ParseFileError> {
    if !path.exists() {
        return Err(ParseFileError::NotFound(path.to_path_buf()));
    }
    let unreadable = |source: io::Error| ParseFileError::Unreadable {
        path: path.to_path_buf(),
        source,
    };

    let bytes = fs::read(path).map_err(unreadable)?;
    let content = String::from_utf8_lossy(&bytes).into_owned();

    let modified = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|duration| duration.as_secs() as i64);

    Ok((content, modified))
}

/// Remove provenance from a group, returning it
pub fn take_provenance(group: &mut serde_json::Map<String, Value>) -> Option<Value> {
    let current = group.shift_remove(PROVENANCE_KEY);
    let legacy = group.shift_remove(LEGACY_PROVENANCE_KEY);
    current.or(legacy)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROUP: &str = "array('key' => 'group_x', 'title' => 'T', 'fields' => array())";

    #[test]
    fn test_extract_braced_body() {
        let text = "function f() { if ($a) { echo '}'; } // }\n return 1; }";
        assert_eq!(
            extract_braced_body(text, 0),
            Some(" if ($a) { echo '}'; } // }\n return 1; ")
        );
        assert_eq!(extract_braced_body("function f() { {", 0), None);
        assert_eq!(extract_braced_body("no braces", 0), None);
    }

    #[test]
    fn test_top_level_call() {
        let source = format!("<?php\nacf_add_local_field_group({});\n", GROUP);
        let outcome = SourceExtractor::default().extract_function_calls(&source, "acf_add_local_field_group");
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.groups[0]["key"], "group_x");
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn test_fragment_without_open_tag() {
        let source = format!("acf_add_local_field_group({});", GROUP);
        let outcome = SourceExtractor::default().extract_function_calls(&source, "acf_add_local_field_group");
        assert_eq!(outcome.groups.len(), 1);
    }

    #[test]
    fn test_closure_hook_only_in_functions_php() {
        let source = format!(
            "<?php\nadd_action('acf/init', function() {{ acf_add_local_field_group({}); }});\n",
            GROUP
        );
        let extractor = SourceExtractor::default();

        let outcome = extractor.extract_from_source(&source, "/theme/functions.php", None);
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.groups[0]["key"], "group_x");

        let outcome = extractor.extract_from_source(&source, "/theme/inc/fields.php", None);
        assert!(outcome.groups.is_empty());
    }

    #[test]
    fn test_named_callback_hook() {
        let source = format!(
            "<?php\nfunction theme_register_fields() {{\n    acf_add_local_field_group({});\n}}\nadd_action('acf/init', 'theme_register_fields');\n",
            GROUP
        );
        let outcome = SourceExtractor::default().extract_from_source(&source, "functions.php", Some(1_700_000_000));
        assert_eq!(outcome.groups.len(), 1);

        let provenance = &outcome.groups[0][PROVENANCE_KEY];
        assert_eq!(provenance["source_type"], "functions_php");
        assert_eq!(provenance["source_file"], "functions.php");
        assert_eq!(provenance["modified_date"], 1_700_000_000);
    }

    #[test]
    fn test_unknown_hook_is_ignored() {
        let source = format!(
            "<?php\nadd_action('admin_menu', function() {{ acf_add_local_field_group({}); }});\n",
            GROUP
        );
        let outcome = SourceExtractor::default().extract_from_source(&source, "functions.php", None);
        assert!(outcome.groups.is_empty());
    }

    #[test]
    fn test_guard_block_is_deduplicated() {
        let source = format!(
            "<?php\nif (function_exists('acf_add_local_field_group')) {{\n    acf_add_local_field_group({});\n}}\n",
            GROUP
        );
        let outcome = SourceExtractor::default().extract_from_source(&source, "functions.php", None);
        assert_eq!(outcome.groups.len(), 1);
    }

    #[test]
    fn test_failing_guarded_call_reported_once() {
        let source = "<?php\n\nif (function_exists('acf_add_local_field_group')) {\n    acf_add_local_field_group(array('key' => $key));\n}\n";
        let outcome = SourceExtractor::default().extract_from_source(source, "functions.php", None);
        assert!(outcome.groups.is_empty());
        assert_eq!(outcome.diagnostics.errors.len(), 1);
        assert!(outcome.diagnostics.errors[0].contains("line 4"));
    }

    #[test]
    fn test_guard_inside_hook_callback() {
        let source = format!(
            "<?php\nfunction theme_fields() {{\n    if (class_exists('ACF')) {{\n        acf_add_local_field_group({});\n        acf_add_local_field_group(array('key' => $key));\n    }}\n}}\nadd_action('acf/init', 'theme_fields');\n",
            GROUP
        );
        let outcome = SourceExtractor::default().extract_from_source(&source, "functions.php", None);
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.diagnostics.errors.len(), 1);
        assert!(outcome.diagnostics.errors[0].contains("line 5"));
    }

    #[test]
    fn test_guard_inside_unhooked_function() {
        let source = format!(
            "<?php\nfunction theme_fields() {{\n    if (function_exists('acf_add_local_field_group')) {{\n        acf_add_local_field_group({});\n    }}\n}}\n",
            GROUP
        );
        let outcome = SourceExtractor::default().extract_from_source(&source, "functions.php", None);
        assert_eq!(outcome.groups.len(), 1);
    }

    #[test]
    fn test_bad_call_does_not_stop_the_scan() {
        let source = format!(
            "<?php\nacf_add_local_field_group(array('key' => $key));\nacf_add_local_field_group(array('title' => 'No key'));\nacf_add_local_field_group({});\n",
            GROUP
        );
        let outcome = SourceExtractor::default().extract_from_source(&source, "fields.php", None);
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.diagnostics.errors.len(), 2);
        assert!(outcome.diagnostics.errors[0].contains("line 2"));
        assert!(outcome.diagnostics.errors[1].contains("missing required field: key"));
    }

    #[test]
    fn test_deeply_nested_call_fails_alone() {
        let source = format!(
            "<?php\nacf_add_local_field_group(array('key' => {}{}));\nacf_add_local_field_group({});\n",
            "[".repeat(2000),
            "]".repeat(2000),
            GROUP
        );
        let outcome = SourceExtractor::default().extract_from_source(&source, "fields.php", None);
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.diagnostics.errors.len(), 1);
        assert!(outcome.diagnostics.errors[0].contains("nested too deeply"));
    }

    #[test]
    fn test_key_format_errors_do_not_reject() {
        let source = "<?php acf_add_local_field_group(array('key' => 'hero', 'title' => 'Hero', 'fields' => array()));";
        let outcome = SourceExtractor::default().extract_from_source(source, "fields.php", None);
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.diagnostics.errors.len(), 1);
    }

    #[test]
    fn test_parse_file_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let extractor = SourceExtractor::default();

        let missing = extractor.parse_file(&dir.path().join("missing.php"));
        assert!(missing.diagnostics.errors[0].starts_with("File not found"));

        let html = dir.path().join("page.php");
        fs::write(&html, "<html></html>").unwrap();
        assert!(extractor.parse_file(&html).diagnostics.errors[0].contains("no open tag"));

        let broken = dir.path().join("broken.php");
        fs::write(&broken, "<?php acf_add_local_field_group(array(;").unwrap();
        assert!(extractor.parse_file(&broken).diagnostics.errors[0].contains("syntax errors"));
    }

    #[test]
    fn test_take_provenance() {
        let mut group = serde_json::Map::new();
        group.insert("key".into(), json!("group_x"));
        group.insert(LEGACY_PROVENANCE_KEY.into(), json!({"modified_date": 5}));
        assert_eq!(take_provenance(&mut group), Some(json!({"modified_date": 5})));
        assert!(!group.contains_key(LEGACY_PROVENANCE_KEY));
    }
}
