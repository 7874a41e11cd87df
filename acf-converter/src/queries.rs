/// This module handles tree-sitter query execution for locating registration calls
///
/// The query lives in queries/php.scm and is embedded at compile time with
/// include_str!, so no query file has to ship next to the binary.

use anyhow::{anyhow, Result};
use tree_sitter::{Language, Node, Query, QueryCursor, StreamingIterator, Tree};

// ============================================================================
// PART 1: Query File Embedding
// ============================================================================

/// Embed the PHP query file at compile time
const PHP_QUERY: &str = include_str!("../queries/php.scm");

/// Node kinds that open a scope of their own
///
/// A call inside one of these only runs when something else calls the
/// enclosing function, so it is not a top-level registration.
const SCOPE_KINDS: &[&str] = &[
    "function_definition",
    "method_declaration",
    "anonymous_function",
    "anonymous_function_creation_expression",
    "arrow_function",
    "class_declaration",
    "trait_declaration",
    "interface_declaration",
    "enum_declaration",
];

// ============================================================================
// PART 2: Query Compilation
// ============================================================================

pub fn compile_php_query(language: &Language) -> Result<Query> {
    Query::new(language, PHP_QUERY).map_err(|e| anyhow!("Failed to compile PHP query: {:?}", e))
}

// ============================================================================
// PART 3: Pattern Detection
// ============================================================================

/// A call to one of the target functions
///
/// Holds references into the source text, so it can't outlive it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallMatch<'a> {
    /// Callee as written, leading `\` included
    pub function_name: &'a str,
    /// Text of the first argument, None for an empty argument list
    pub first_argument: Option<&'a str>,
    /// Is the call nested in a function, closure or class body?
    pub in_scope: bool,
    /// Zero-based
    pub row: usize,
}

/// Find calls to any of `function_names`
///
/// Names compare case-insensitively with any namespace backslash stripped,
/// as PHP resolves `\acf_add_local_field_group(...)` to the global function.
pub fn find_function_calls<'a>(
    tree: &Tree,
    source: &'a str,
    language: &Language,
    function_names: &[&str],
) -> Result<Vec<CallMatch<'a>>> {
    let query = compile_php_query(language)?;
    let mut cursor = QueryCursor::new();
    let mut results = Vec::new();

    let root_node = tree.root_node();
    let source_bytes = source.as_bytes();

    let name_index = capture_index(&query, "function_name")?;
    let arguments_index = capture_index(&query, "arguments")?;
    let call_index = capture_index(&query, "call")?;

    let mut matches = cursor.matches(&query, root_node, source_bytes);

    while let Some(query_match) = matches.next() {
        let mut name_node = None;
        let mut arguments_node = None;
        let mut call_node = None;

        for capture in query_match.captures {
            if capture.index == name_index {
                name_node = Some(capture.node);
            } else if capture.index == arguments_index {
                arguments_node = Some(capture.node);
            } else if capture.index == call_index {
                call_node = Some(capture.node);
            }
        }

        let (Some(name_node), Some(arguments_node), Some(call_node)) = (name_node, arguments_node, call_node)
        else {
            continue;
        };

        let function_name = &source[name_node.byte_range()];
        let bare_name = function_name.trim_start_matches('\\');
        if !function_names.iter().any(|target| target.eq_ignore_ascii_case(bare_name)) {
            continue;
        }

        results.push(CallMatch {
            function_name,
            first_argument: first_argument(arguments_node).map(|node| &source[node.byte_range()]),
            in_scope: is_in_scope(call_node),
            row: call_node.start_position().row,
        });
    }

    Ok(results)
}

fn capture_index(query: &Query, name: &str) -> Result<u32> {
    query
        .capture_index_for_name(name)
        .ok_or_else(|| anyhow!("PHP query has no @{} capture", name))
}

fn first_argument(arguments: Node<'_>) -> Option<Node<'_>> {
    let mut cursor = arguments.walk();
    let found = arguments.named_children(&mut cursor).find(|child| child.kind() == "argument");
    found
}

fn is_in_scope(node: Node<'_>) -> bool {
    let mut current = node.parent();
    while let Some(parent) = current {
        if SCOPE_KINDS.contains(&parent.kind()) {
            return true;
        }
        current = parent.parent();
    }
    false
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{language_php, parse_php};

    const TARGETS: &[&str] = &["acf_add_local_field_group", "register_field_group"];

    fn calls(source: &str) -> Vec<CallMatch<'_>> {
        let tree = parse_php(source).expect("Should parse");
        find_function_calls(&tree, source, &language_php(), TARGETS).expect("Query should run")
    }

    #[test]
    fn test_query_compiles() {
        assert!(compile_php_query(&language_php()).is_ok());
    }

    #[test]
    fn test_finds_top_level_call() {
        let source = "<?php\nacf_add_local_field_group(array('key' => 'group_1'));\n";
        let found = calls(source);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].first_argument, Some("array('key' => 'group_1')"));
        assert!(!found[0].in_scope);
        assert_eq!(found[0].row, 1);
    }

    #[test]
    fn test_names_are_case_insensitive_and_namespaced() {
        let source = "<?php\n\\ACF_Add_Local_Field_Group(array());\nregister_field_group(array());\nother_function(array());\n";
        let found = calls(source);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].function_name, "\\ACF_Add_Local_Field_Group");
    }

    #[test]
    fn test_calls_in_closures_are_scoped() {
        let source = r#"<?php
add_action('acf/init', function() {
    acf_add_local_field_group(array('key' => 'group_x'));
});
if (function_exists('acf_add_local_field_group')) {
    acf_add_local_field_group(array('key' => 'group_y'));
}
"#;
        let found = calls(source);
        assert_eq!(found.len(), 2);
        assert!(found[0].in_scope);
        assert!(!found[1].in_scope);
    }

    #[test]
    fn test_empty_argument_list() {
        let found = calls("<?php acf_add_local_field_group();");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].first_argument, None);
    }
}
