//! Field-Group Structural Validator
//!
//! Two checks live here:
//!
//! - [`FieldGroupValidator::validate_field_group`] walks one tree top-down.
//!   A missing required property stops the walk at once with status `error`;
//!   key-format deviations and unknown field types only accumulate.
//! - [`FieldGroupValidator::validate_conversion`] diffs an original tree
//!   against its converted counterpart. Content missing from the converted
//!   side is an error, extra content is a warning.
//!
//! The validator never mutates its input.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use serde_json::{Map, Value};

use crate::diagnostics::{Diagnostics, ValidationReport};
use crate::errors::StructureError;
use crate::keys::{is_clone_target, is_field_key, is_group_key};

/// Field types shipped with ACF and ACF Pro
///
/// Third-party plugins register more, so anything else is only a warning.
static KNOWN_FIELD_TYPES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "text",
        "textarea",
        "number",
        "range",
        "email",
        "url",
        "password",
        "image",
        "file",
        "wysiwyg",
        "oembed",
        "gallery",
        "select",
        "checkbox",
        "radio",
        "button_group",
        "true_false",
        "link",
        "post_object",
        "page_link",
        "relationship",
        "taxonomy",
        "user",
        "google_map",
        "date_picker",
        "date_time_picker",
        "time_picker",
        "color_picker",
        "icon_picker",
        "message",
        "accordion",
        "tab",
        "group",
        "repeater",
        "flexible_content",
        "clone",
    ]
    .into_iter()
    .collect()
});

const GROUP_REQUIRED: [&str; 3] = ["key", "title", "fields"];
const FIELD_REQUIRED: [&str; 4] = ["key", "label", "name", "type"];
const LAYOUT_REQUIRED: [&str; 3] = ["key", "name", "label"];

pub fn is_known_field_type(field_type: &str) -> bool {
    KNOWN_FIELD_TYPES.contains(field_type)
}

/// Does this field type carry a `sub_fields` list?
pub fn has_sub_fields(field_type: &str) -> bool {
    matches!(field_type, "repeater" | "group")
}

/// Layouts of a flexible content field, accepted as a list or a keyed map
pub fn layout_nodes(layouts: &Value) -> Option<Vec<&Value>> {
    match layouts {
        Value::Array(items) => Some(items.iter().collect()),
        Value::Object(map) => Some(map.values().collect()),
        _ => None,
    }
}

/// Shared input-shape check: an object carrying `key`, `title` and a
/// `fields` list
///
/// Used by both converters and by [`FieldGroupValidator::validate_conversion`].
pub fn check_input_shape<'a>(
    tree: &'a Value,
    context: &str,
) -> Result<&'a Map<String, Value>, StructureError> {
    let map = tree.as_object().ok_or_else(|| StructureError::NotAnObject {
        context: context.to_string(),
    })?;
    for property in GROUP_REQUIRED {
        if is_missing(map.get(property)) {
            return Err(StructureError::MissingProperty {
                context: context.to_string(),
                property: property.to_string(),
            });
        }
    }
    if !map.get("fields").map_or(false, Value::is_array) {
        return Err(StructureError::NotAnArray {
            context: context.to_string(),
            property: "fields".to_string(),
        });
    }
    Ok(map)
}

fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        _ => false,
    }
}

fn require(map: &Map<String, Value>, properties: &[&str], context: &str) -> Result<(), StructureError> {
    for property in properties {
        if map.get(*property).map_or(true, Value::is_null) {
            return Err(StructureError::MissingProperty {
                context: context.to_string(),
                property: property.to_string(),
            });
        }
    }
    Ok(())
}

fn require_array<'a>(
    map: &'a Map<String, Value>,
    property: &str,
    context: &str,
) -> Result<&'a Vec<Value>, StructureError> {
    match map.get(property) {
        None | Some(Value::Null) => Err(StructureError::MissingProperty {
            context: context.to_string(),
            property: property.to_string(),
        }),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(StructureError::NotAnArray {
            context: context.to_string(),
            property: property.to_string(),
        }),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s),
        other => other.to_string(),
    }
}

fn describe_field(field: &Value, index: usize) -> String {
    match field.get("key").and_then(Value::as_str) {
        Some(key) if !key.is_empty() => format!("Field '{}'", key),
        _ => format!("Field #{}", index + 1),
    }
}

/// Validates field-group trees against the ACF schema
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldGroupValidator {
    key_format_is_error: bool,
}

impl FieldGroupValidator {
    /// Key-format deviations are warnings
    pub fn new() -> Self {
        Self {
            key_format_is_error: false,
        }
    }

    /// Key-format deviations are recorded as errors, but do not stop the walk
    pub fn strict() -> Self {
        Self {
            key_format_is_error: true,
        }
    }

    fn key_issue(&self, diagnostics: &mut Diagnostics, message: String) {
        if self.key_format_is_error {
            diagnostics.error(message);
        } else {
            diagnostics.warning(message);
        }
    }

    pub fn validate_field_group(&self, tree: &Value) -> ValidationReport {
        let mut diagnostics = Diagnostics::new();
        if let Err(e) = self.check_field_group(tree, &mut diagnostics) {
            diagnostics.error(e.to_string());
        }
        ValidationReport::from(diagnostics)
    }

    /// Walk a tree, recording soft issues into `diagnostics`
    ///
    /// Returns the first hard structural error. Callers that only need to
    /// know whether a tree is usable (the extractor) act on the `Result`
    /// and keep the soft issues as they are.
    pub fn check_field_group(
        &self,
        tree: &Value,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), StructureError> {
        let context = "Field group";
        let map = check_input_shape(tree, context)?;

        if let Some(key) = map.get("key").and_then(Value::as_str) {
            if !is_group_key(key) {
                self.key_issue(
                    diagnostics,
                    format!("Field group key '{}' does not match the group_* format", key),
                );
            }
        }

        if let Some(Value::Array(fields)) = map.get("fields") {
            self.check_fields(fields, diagnostics)?;
        }

        if let Some(location) = map.get("location") {
            check_rule_groups(location, "param", "Location")?;
        }

        Ok(())
    }

    fn check_fields(&self, fields: &[Value], diagnostics: &mut Diagnostics) -> Result<(), StructureError> {
        for (index, field) in fields.iter().enumerate() {
            self.check_field(field, index, diagnostics)?;
        }
        Ok(())
    }

    fn check_field(
        &self,
        field: &Value,
        index: usize,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), StructureError> {
        let context = describe_field(field, index);
        let map = field.as_object().ok_or_else(|| StructureError::NotAnObject {
            context: context.clone(),
        })?;
        require(map, &FIELD_REQUIRED, &context)?;

        if let Some(key) = map.get("key").and_then(Value::as_str) {
            if !is_field_key(key) {
                self.key_issue(
                    diagnostics,
                    format!("Field key '{}' does not match the field_* format", key),
                );
            }
        }

        let field_type = map.get("type").and_then(Value::as_str).unwrap_or_default();
        if !is_known_field_type(field_type) {
            diagnostics.warning(format!("{}: unknown field type '{}'", context, field_type));
        }

        match field_type {
            "repeater" | "group" => {
                let sub_fields = require_array(map, "sub_fields", &context)?;
                self.check_fields(sub_fields, diagnostics)?;
            }
            "flexible_content" => self.check_layouts(map, &context, diagnostics)?,
            "clone" => {
                let targets = require_array(map, "clone", &context)?;
                for target in targets {
                    match target.as_str() {
                        Some(key) if is_clone_target(key) => {}
                        _ => self.key_issue(
                            diagnostics,
                            format!("{}: clone target {} is not a field_* or group_* key", context, display(target)),
                        ),
                    }
                }
            }
            _ => {}
        }

        if let Some(logic) = map.get("conditional_logic") {
            if !conditional_logic_disabled(logic) {
                let logic_context = format!("{} conditional logic", context);
                if !logic.is_array() {
                    return Err(StructureError::InvalidConditionalLogic { context });
                }
                check_rule_groups(logic, "field", &logic_context)?;
            }
        }

        Ok(())
    }

    fn check_layouts(
        &self,
        map: &Map<String, Value>,
        context: &str,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), StructureError> {
        let layouts = match map.get("layouts") {
            None | Some(Value::Null) => {
                return Err(StructureError::MissingProperty {
                    context: context.to_string(),
                    property: "layouts".to_string(),
                })
            }
            Some(layouts) => layout_nodes(layouts).ok_or_else(|| StructureError::NotAnArray {
                context: context.to_string(),
                property: "layouts".to_string(),
            })?,
        };
        if layouts.is_empty() {
            return Err(StructureError::EmptyLayouts {
                context: context.to_string(),
            });
        }

        for (index, layout) in layouts.into_iter().enumerate() {
            let layout_context = match layout.get("name").and_then(Value::as_str) {
                Some(name) => format!("{} layout '{}'", context, name),
                None => format!("{} layout #{}", context, index + 1),
            };
            let layout_map = layout.as_object().ok_or_else(|| StructureError::NotAnObject {
                context: layout_context.clone(),
            })?;
            require(layout_map, &LAYOUT_REQUIRED, &layout_context)?;
            let sub_fields = require_array(layout_map, "sub_fields", &layout_context)?;
            self.check_fields(sub_fields, diagnostics)?;
        }
        Ok(())
    }

    pub fn validate_conversion(&self, original: &Value, converted: &Value) -> ValidationReport {
        let mut diagnostics = Diagnostics::new();

        let shapes = check_input_shape(original, "Original field group")
            .and_then(|o| check_input_shape(converted, "Converted field group").map(|c| (o, c)));
        let (original, converted) = match shapes {
            Ok(pair) => pair,
            Err(e) => {
                diagnostics.error(e.to_string());
                return ValidationReport::from(diagnostics);
            }
        };

        for property in ["key", "title"] {
            compare_values(&original[property], &converted[property], "Field group", property, &mut diagnostics);
        }

        if let (Some(Value::Array(a)), Some(Value::Array(b))) = (original.get("fields"), converted.get("fields")) {
            compare_fields(a, b, "fields", &mut diagnostics);
        }

        compare_locations(original.get("location"), converted.get("location"), &mut diagnostics);

        ValidationReport::from(diagnostics)
    }
}

/// `0`, `false`, `null`, `""` and `"0"` all mean "no conditional logic"
fn conditional_logic_disabled(logic: &Value) -> bool {
    match logic {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(items) => items.is_empty(),
        Value::Object(_) => false,
    }
}

/// OR-groups of AND-rules; every rule needs `subject`, `operator` and `value`
fn check_rule_groups(groups: &Value, subject: &str, context: &str) -> Result<(), StructureError> {
    let groups = match groups {
        Value::Array(groups) => groups,
        _ => {
            return Err(StructureError::NotAnArray {
                context: context.to_string(),
                property: "rule groups".to_string(),
            })
        }
    };

    for (group_index, group) in groups.iter().enumerate() {
        let group_context = format!("{} rule group #{}", context, group_index + 1);
        let rules = group.as_array().ok_or_else(|| StructureError::NotAnArray {
            context: group_context.clone(),
            property: "rules".to_string(),
        })?;
        for (rule_index, rule) in rules.iter().enumerate() {
            let rule_context = format!("{} rule #{}", group_context, rule_index + 1);
            let rule = rule.as_object().ok_or_else(|| StructureError::NotAnObject {
                context: rule_context.clone(),
            })?;
            for property in [subject, "operator", "value"] {
                if !rule.contains_key(property) {
                    return Err(StructureError::MissingProperty {
                        context: rule_context,
                        property: property.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Arrays are compared by element count only, scalars by value
fn compare_values(original: &Value, converted: &Value, context: &str, property: &str, diagnostics: &mut Diagnostics) {
    if original == converted {
        return;
    }
    match (original, converted) {
        (Value::Array(a), Value::Array(b)) => diagnostics.warning(format!(
            "{}: '{}' differs (original has {} elements, converted has {})",
            context,
            property,
            a.len(),
            b.len()
        )),
        _ => diagnostics.warning(format!(
            "{}: '{}' differs (original {}, converted {})",
            context,
            property,
            display(original),
            display(converted)
        )),
    }
}

fn index_by_key(items: &[Value]) -> HashMap<&str, &Value> {
    items
        .iter()
        .filter_map(|item| item.get("key").and_then(Value::as_str).map(|key| (key, item)))
        .collect()
}

fn compare_fields(original: &[Value], converted: &[Value], path: &str, diagnostics: &mut Diagnostics) {
    if original.len() != converted.len() {
        diagnostics.warning(format!(
            "Field count differs in {} (original {}, converted {})",
            path,
            original.len(),
            converted.len()
        ));
    }

    let converted_by_key = index_by_key(converted);
    let original_by_key = index_by_key(original);

    for field in original {
        let Some(key) = field.get("key").and_then(Value::as_str) else {
            continue;
        };
        let Some(other) = converted_by_key.get(key) else {
            diagnostics.error(format!("Field '{}' is missing from converted {}", key, path));
            continue;
        };

        let context = format!("Field '{}'", key);
        for property in FIELD_REQUIRED {
            compare_values(&field[property], &other[property], &context, property, diagnostics);
        }

        match field.get("type").and_then(Value::as_str) {
            Some(t) if has_sub_fields(t) => {
                let nested = format!("{}.sub_fields", key);
                compare_field_lists(field.get("sub_fields"), other.get("sub_fields"), &nested, diagnostics);
            }
            Some("flexible_content") => compare_layouts(key, field, other, diagnostics),
            _ => {}
        }
    }

    for field in converted {
        if let Some(key) = field.get("key").and_then(Value::as_str) {
            if !original_by_key.contains_key(key) {
                diagnostics.warning(format!("Field '{}' is extra in converted {}", key, path));
            }
        }
    }
}

fn compare_field_lists(original: Option<&Value>, converted: Option<&Value>, path: &str, diagnostics: &mut Diagnostics) {
    let empty = Vec::new();
    let original = original.and_then(Value::as_array).unwrap_or(&empty);
    let converted = converted.and_then(Value::as_array).unwrap_or(&empty);
    compare_fields(original, converted, path, diagnostics);
}

fn layout_key(layout: &Value) -> Option<String> {
    layout.get("key").and_then(Value::as_str).map(str::to_string)
}

fn compare_layouts(field_key: &str, original: &Value, converted: &Value, diagnostics: &mut Diagnostics) {
    let original_layouts = original.get("layouts").and_then(layout_nodes).unwrap_or_default();
    let converted_layouts = converted.get("layouts").and_then(layout_nodes).unwrap_or_default();

    let converted_by_key: HashMap<String, &Value> = converted_layouts
        .iter()
        .filter_map(|layout| layout_key(layout).map(|key| (key, *layout)))
        .collect();

    for layout in &original_layouts {
        let Some(key) = layout_key(layout) else { continue };
        match converted_by_key.get(&key) {
            None => diagnostics.error(format!(
                "Layout '{}' of field '{}' is missing from converted",
                key, field_key
            )),
            Some(other) => {
                let context = format!("Layout '{}'", key);
                for property in LAYOUT_REQUIRED {
                    compare_values(&layout[property], &other[property], &context, property, diagnostics);
                }
                let nested = format!("{}.layouts.{}.sub_fields", field_key, key);
                compare_field_lists(layout.get("sub_fields"), other.get("sub_fields"), &nested, diagnostics);
            }
        }
    }

    let original_keys: HashSet<String> = original_layouts.iter().filter_map(|l| layout_key(l)).collect();
    for key in converted_by_key.keys() {
        if !original_keys.contains(key) {
            diagnostics.warning(format!("Layout '{}' of field '{}' is extra in converted", key, field_key));
        }
    }
}

/// Location groups are compared by position, down to each rule triple
fn compare_locations(original: Option<&Value>, converted: Option<&Value>, diagnostics: &mut Diagnostics) {
    let empty = Vec::new();
    let null = Value::Null;
    let original = original.and_then(Value::as_array).unwrap_or(&empty);
    let converted = converted.and_then(Value::as_array).unwrap_or(&empty);

    if original.len() != converted.len() {
        diagnostics.warning(format!(
            "Location group count differs (original {}, converted {})",
            original.len(),
            converted.len()
        ));
    }

    for (group_index, (a, b)) in original.iter().zip(converted).enumerate() {
        let a = a.as_array().unwrap_or(&empty);
        let b = b.as_array().unwrap_or(&empty);
        if a.len() != b.len() {
            diagnostics.warning(format!(
                "Location group #{} rule count differs (original {}, converted {})",
                group_index + 1,
                a.len(),
                b.len()
            ));
        }
        for (rule_index, (rule_a, rule_b)) in a.iter().zip(b).enumerate() {
            let context = format!("Location group #{} rule #{}", group_index + 1, rule_index + 1);
            for property in ["param", "operator", "value"] {
                let left = rule_a.get(property).unwrap_or(&null);
                let right = rule_b.get(property).unwrap_or(&null);
                compare_values(left, right, &context, property, diagnostics);
            }
        }
    }
}

/// Validate one tree with a default (non-strict) validator
pub fn validate_field_group(tree: &Value) -> ValidationReport {
    FieldGroupValidator::new().validate_field_group(tree)
}

/// Diff an original tree against its converted counterpart
pub fn validate_conversion(original: &Value, converted: &Value) -> ValidationReport {
    FieldGroupValidator::new().validate_conversion(original, converted)
}
