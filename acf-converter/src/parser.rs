//! This module provides the tree-sitter parser for PHP source.
//!
//! Tree-sitter turns theme files into syntax trees that the extractor walks
//! to find field-group registration calls. It is also used as the syntax
//! "linter" for theme files and for the PHP we generate.

use std::borrow::Cow;

use tree_sitter::{Language, Parser};

/// The PHP open tag prepended to bare fragments
const PHP_OPEN_TAG: &str = "<?php\n";

// ============================================================================
// PART 1: Language Definition
// ============================================================================

/// Gets the tree-sitter language definition for PHP
///
/// `LANGUAGE_PHP` parses full PHP files (HTML text outside `<?php` tags
/// included), which is what theme files look like.
pub fn language_php() -> Language {
    tree_sitter_php::LANGUAGE_PHP.into()
}

// ============================================================================
// PART 2: Parser Creation
// ============================================================================

/// Creates a new tree-sitter parser configured for PHP
///
/// A Parser is stateful and not thread-safe, so we create one per parse.
pub fn create_php_parser() -> anyhow::Result<Parser> {
    let mut parser = Parser::new();

    parser
        .set_language(&language_php())
        .map_err(|e| anyhow::anyhow!("Failed to set PHP language: {:?}", e))?;

    Ok(parser)
}

// ============================================================================
// PART 3: Helper Functions for Parsing
// ============================================================================

/// Parse PHP source code into a syntax tree
///
/// Tree-sitter is error tolerant: a tree is returned even for source with
/// syntax errors. Use [`has_syntax_errors`] to find out.
pub fn parse_php(source: &str) -> anyhow::Result<tree_sitter::Tree> {
    let mut parser = create_php_parser()?;

    parser
        .parse(source, None)
        .ok_or_else(|| anyhow::anyhow!("Failed to parse PHP source"))
}

/// Does the text carry a PHP open tag?
///
/// Files without one are plain HTML/text as far as PHP is concerned.
pub fn looks_like_php(source: &str) -> bool {
    source.contains("<?php") || source.contains("<?=") || source.contains("<?\n") || source.contains("<? ")
}

/// Treat a bare fragment as embedded PHP
///
/// Function bodies cut out of a larger file have no open tag; without one
/// tree-sitter would read them as inline HTML.
pub fn ensure_php_open_tag(source: &str) -> Cow<'_, str> {
    if source.trim_start().starts_with("<?") {
        Cow::Borrowed(source)
    } else {
        Cow::Owned(format!("{}{}", PHP_OPEN_TAG, source))
    }
}

/// Check source for syntax errors
///
/// A tree with ERROR or MISSING nodes counts as a failed lint. If the
/// parser itself cannot run, the source is reported as broken too.
pub fn has_syntax_errors(source: &str) -> bool {
    match parse_php(source) {
        Ok(tree) => tree.root_node().has_error(),
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_php_language_loads() {
        let lang = language_php();
        assert!(lang.node_kind_count() > 0);
    }

    #[test]
    fn test_parse_simple_php() {
        let php_code = r#"<?php
        acf_add_local_field_group(array('key' => 'group_1'));
        "#;

        let tree = parse_php(php_code).expect("Should parse valid PHP");
        assert!(tree.root_node().child_count() > 0);
        assert!(!tree.root_node().has_error());
    }

    #[test]
    fn test_php_parser_reusable() {
        let mut parser = create_php_parser().expect("Should create parser");

        let tree1 = parser.parse("<?php echo 'hello'; ?>", None).expect("Should parse");
        assert!(tree1.root_node().child_count() > 0);

        let tree2 = parser.parse("<?php $x = 42; ?>", None).expect("Should parse");
        assert!(tree2.root_node().child_count() > 0);
    }

    #[test]
    fn test_looks_like_php() {
        assert!(looks_like_php("<?php\necho 1;"));
        assert!(looks_like_php("<html><?= $title ?></html>"));
        assert!(!looks_like_php("just some text"));
    }

    #[test]
    fn test_ensure_php_open_tag() {
        assert_eq!(ensure_php_open_tag("<?php echo 1;"), "<?php echo 1;");
        assert_eq!(ensure_php_open_tag("echo 1;"), "<?php\necho 1;");
    }

    #[test]
    fn test_has_syntax_errors() {
        assert!(!has_syntax_errors("<?php $a = array('x' => 1);"));
        assert!(has_syntax_errors("<?php $a = array('x' => ;"));
    }
}
