use chrono::NaiveDateTime;
use serde_json::{Map, Value};

use super::Converter;
use crate::diagnostics::{ConversionResult, Diagnostics};
use crate::extractor::take_provenance;
use crate::keys::{is_clone_target, is_group_key, rewrite_key, KeyKind};
use crate::validator::{check_input_shape, has_sub_fields};

/// Format of `modified_date` strings in provenance
const PROVENANCE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Extracted PHP array tree → canonical ACF JSON tree
#[derive(Debug, Clone, Copy, Default)]
pub struct PhpToJson;

impl PhpToJson {
    pub fn new() -> Self {
        Self
    }
}

impl Converter for PhpToJson {
    type Output = Value;

    fn convert(&self, tree: &Value) -> ConversionResult<Value> {
        let mut diagnostics = Diagnostics::new();

        let mut group = match check_input_shape(tree, "Field group") {
            Ok(map) => map.clone(),
            Err(e) => {
                diagnostics.error(e.to_string());
                return ConversionResult::failed(diagnostics);
            }
        };

        if let Some(provenance) = take_provenance(&mut group) {
            promote_modified(&mut group, &provenance, &mut diagnostics);
        }

        if let Some(Value::String(key)) = group.get_mut("key") {
            if !is_group_key(key) {
                let rewritten = rewrite_key(KeyKind::Group, key);
                diagnostics.warning(format!("Field group key '{}' rewritten to '{}'", key, rewritten));
                *key = rewritten;
            }
        }

        if let Some(Value::Array(fields)) = group.get_mut("fields") {
            normalize_fields(fields, &mut diagnostics);
        }

        ConversionResult::from_data(Value::Object(group), diagnostics)
    }
}

/// Copy provenance `modified_date` to `modified` unless already set
fn promote_modified(group: &mut Map<String, Value>, provenance: &Value, diagnostics: &mut Diagnostics) {
    if group.get("modified").map_or(false, |m| !m.is_null()) {
        return;
    }
    let timestamp = match provenance.get("modified_date") {
        None | Some(Value::Null) => return,
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s.trim(), PROVENANCE_DATE_FORMAT)
                    .ok()
                    .map(|date| date.and_utc().timestamp())
            }),
        Some(_) => None,
    };
    match timestamp {
        Some(timestamp) => {
            group.insert("modified".to_string(), Value::from(timestamp));
        }
        None => diagnostics.warning(format!(
            "Ignoring unreadable modified_date {} in provenance",
            provenance["modified_date"]
        )),
    }
}

fn normalize_fields(fields: &mut [Value], diagnostics: &mut Diagnostics) {
    for field in fields.iter_mut() {
        let Value::Object(field) = field else { continue };
        let field_type = field.get("type").and_then(Value::as_str).unwrap_or_default().to_string();

        match field_type.as_str() {
            t if has_sub_fields(t) => {
                if let Some(Value::Array(sub_fields)) = field.get_mut("sub_fields") {
                    normalize_fields(sub_fields, diagnostics);
                }
            }
            "flexible_content" => match field.get_mut("layouts") {
                Some(Value::Array(layouts)) => normalize_layouts(layouts.iter_mut(), diagnostics),
                Some(Value::Object(layouts)) => normalize_layouts(layouts.values_mut(), diagnostics),
                _ => {}
            },
            "clone" => {
                if let Some(Value::Array(targets)) = field.get_mut("clone") {
                    rewrite_clone_targets(targets, diagnostics);
                }
            }
            _ => {}
        }
    }
}

fn normalize_layouts<'a>(layouts: impl Iterator<Item = &'a mut Value>, diagnostics: &mut Diagnostics) {
    for layout in layouts {
        if let Some(Value::Array(sub_fields)) = layout.get_mut("sub_fields") {
            normalize_fields(sub_fields, diagnostics);
        }
    }
}

fn rewrite_clone_targets(targets: &mut [Value], diagnostics: &mut Diagnostics) {
    for target in targets.iter_mut() {
        let Value::String(key) = target else { continue };
        if !is_clone_target(key) {
            let rewritten = rewrite_key(KeyKind::Field, key);
            diagnostics.warning(format!("Clone target '{}' rewritten to '{}'", key, rewritten));
            *key = rewritten;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Status;
    use crate::extractor::PROVENANCE_KEY;
    use serde_json::json;

    fn tree() -> Value {
        json!({
            "key": "group_hero",
            "title": "Hero",
            "fields": [
                {"key": "field_heading", "label": "Heading", "name": "heading", "type": "text"}
            ],
            "location": [[{"param": "post_type", "operator": "==", "value": "page"}]]
        })
    }

    #[test]
    fn test_clean_tree_is_success() {
        let result = PhpToJson::new().convert(&tree());
        assert_eq!(result.status, Status::Success);
        assert_eq!(result.data, Some(tree()));
    }

    #[test]
    fn test_provenance_is_stripped_and_promoted() {
        let mut input = tree();
        input[PROVENANCE_KEY] = json!({
            "source_file": "functions.php",
            "source_type": "functions_php",
            "modified_date": 1_700_000_000
        });

        let data = PhpToJson::new().convert(&input).data.unwrap();
        assert!(data.get(PROVENANCE_KEY).is_none());
        assert_eq!(data["modified"], 1_700_000_000);
    }

    #[test]
    fn test_existing_modified_wins() {
        let mut input = tree();
        input["modified"] = json!(42);
        input["_source_provenance"] = json!({"modified_date": "2024-01-02 03:04:05"});

        let data = PhpToJson::new().convert(&input).data.unwrap();
        assert_eq!(data["modified"], 42);
        assert!(data.get("_source_provenance").is_none());
    }

    #[test]
    fn test_modified_date_string_is_parsed() {
        let mut input = tree();
        input[PROVENANCE_KEY] = json!({"modified_date": "2024-01-02 03:04:05"});
        let data = PhpToJson::new().convert(&input).data.unwrap();
        assert_eq!(data["modified"], 1_704_164_645);
    }

    #[test]
    fn test_key_rewrites_are_warnings() {
        let input = json!({
            "key": "hero",
            "title": "Hero",
            "fields": [{
                "key": "field_rows", "label": "Rows", "name": "rows", "type": "repeater",
                "sub_fields": [{
                    "key": "field_copy", "label": "Copy", "name": "copy", "type": "clone",
                    "clone": ["group_seo", "seo settings"]
                }]
            }]
        });

        let result = PhpToJson::new().convert(&input);
        assert_eq!(result.status, Status::Warning);
        assert_eq!(result.warnings.len(), 2);

        let data = result.data.unwrap();
        assert_eq!(data["key"], rewrite_key(KeyKind::Group, "hero"));
        let targets = &data["fields"][0]["sub_fields"][0]["clone"];
        assert_eq!(targets[0], "group_seo");
        assert_eq!(targets[1], rewrite_key(KeyKind::Field, "seo settings"));
    }

    #[test]
    fn test_layout_map_sub_fields_are_normalized() {
        let input = json!({
            "key": "group_page",
            "title": "Page",
            "fields": [{
                "key": "field_sections", "label": "Sections", "name": "sections", "type": "flexible_content",
                "layouts": {"layout_a": {"key": "layout_a", "name": "a", "label": "A", "sub_fields": [
                    {"key": "field_c", "label": "C", "name": "c", "type": "clone", "clone": ["bad key"]}
                ]}}
            }]
        });
        let result = PhpToJson::new().convert(&input);
        assert_eq!(result.status, Status::Warning);
        let target = &result.data.unwrap()["fields"][0]["layouts"]["layout_a"]["sub_fields"][0]["clone"][0];
        assert!(target.as_str().unwrap().starts_with("field_"));
    }

    #[test]
    fn test_input_shape_errors() {
        let result = PhpToJson::new().convert(&json!("nope"));
        assert_eq!(result.status, Status::Error);
        assert!(result.data.is_none());

        let result = PhpToJson::new().convert(&json!({"key": "group_a", "title": "A", "fields": {}}));
        assert_eq!(result.status, Status::Error);
        assert!(result.errors[0].contains("fields"));
    }

    #[test]
    fn test_empty_fields_converts() {
        let result = PhpToJson::new().convert(&json!({"key": "group_a", "title": "A", "fields": []}));
        assert_eq!(result.status, Status::Success);
    }
}
