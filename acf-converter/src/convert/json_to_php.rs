use chrono::DateTime;
use serde_json::{Map, Value};

use super::Converter;
use crate::diagnostics::{ConversionResult, Diagnostics};
use crate::extractor::{LEGACY_PROVENANCE_KEY, PROVENANCE_KEY};
use crate::keys::{canonical_index, is_sequential_keys};
use crate::validator::check_input_shape;

const INDENT: &str = "    ";

/// Format of the `@modified` doc-comment line
const MODIFIED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Canonical ACF JSON tree → PHP registration code
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonToPhp;

impl JsonToPhp {
    pub fn new() -> Self {
        Self
    }
}

impl Converter for JsonToPhp {
    type Output = String;

    fn convert(&self, tree: &Value) -> ConversionResult<String> {
        let mut diagnostics = Diagnostics::new();

        let group = match check_input_shape(tree, "Field group") {
            Ok(map) => map,
            Err(e) => {
                diagnostics.error(e.to_string());
                return ConversionResult::failed(diagnostics);
            }
        };

        let mut canonical = group.clone();
        canonical.shift_remove(PROVENANCE_KEY);
        canonical.shift_remove(LEGACY_PROVENANCE_KEY);

        let php = render_field_group(&canonical, &mut diagnostics);
        ConversionResult::from_data(php, diagnostics)
    }
}

fn render_field_group(group: &Map<String, Value>, diagnostics: &mut Diagnostics) -> String {
    let title = group.get("title").and_then(Value::as_str).unwrap_or_default();

    let mut php = String::from("<?php\n");
    php.push_str("/**\n");
    php.push_str(&format!(" * ACF field group: {}\n", doc_comment_safe(title)));

    if let Some(modified) = group.get("modified").filter(|m| !m.is_null()) {
        match modified.as_i64().and_then(|ts| DateTime::from_timestamp(ts, 0)) {
            Some(date) => php.push_str(&format!(" *\n * @modified {}\n", date.format(MODIFIED_FORMAT))),
            None => diagnostics.warning(format!("Ignoring non-timestamp 'modified' value {}", modified)),
        }
    }
    php.push_str(" */\n\n");

    php.push_str("if (function_exists('acf_add_local_field_group')) {\n");
    php.push_str(INDENT);
    php.push_str("acf_add_local_field_group(");
    php.push_str(&render_map(group, 1));
    php.push_str(");\n}\n");
    php
}

/// Keep a title from closing the doc comment early
fn doc_comment_safe(text: &str) -> String {
    text.replace("*/", "*\\/").replace(['\n', '\r'], " ")
}

/// Single-quoted PHP string literal; only `\` and `'` need escaping
pub fn quote_php_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if ch == '\\' || ch == '\'' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

/// Render a value as PHP literal syntax
///
/// `level` is the nesting depth of the value itself; nested entries are
/// indented one level further, four spaces per level.
pub fn render_php_value(value: &Value, level: usize) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_php_string(s),
        Value::Array(items) => render_entries(items.iter().map(|item| (None, item)), level),
        Value::Object(map) => render_map(map, level),
    }
}

fn render_map(map: &Map<String, Value>, level: usize) -> String {
    if is_sequential_keys(map) {
        render_entries(map.values().map(|value| (None, value)), level)
    } else {
        render_entries(map.iter().map(|(key, value)| (Some(key.as_str()), value)), level)
    }
}

fn render_entries<'a>(entries: impl ExactSizeIterator<Item = (Option<&'a str>, &'a Value)>, level: usize) -> String {
    if entries.len() == 0 {
        return "array()".to_string();
    }

    let inner = INDENT.repeat(level + 1);
    let mut out = String::from("array(\n");
    for (key, value) in entries {
        out.push_str(&inner);
        if let Some(key) = key {
            out.push_str(&render_key(key));
            out.push_str(" => ");
        }
        out.push_str(&render_php_value(value, level + 1));
        out.push_str(",\n");
    }
    out.push_str(&INDENT.repeat(level));
    out.push(')');
    out
}

/// Integer keys are written bare, as PHP would store them anyway
fn render_key(key: &str) -> String {
    let digits = key.strip_prefix('-').unwrap_or(key);
    let is_integer = canonical_index(digits) && key != "-0" && key.parse::<i64>().is_ok();
    if is_integer {
        key.to_string()
    } else {
        quote_php_string(key)
    }
}
