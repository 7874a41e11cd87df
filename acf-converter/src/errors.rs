//! Centralized error types for the converter
//!
//! Expected failures are values of these enums. They are turned into
//! `errors`/`warnings` entries at the public entry points and never escape
//! as panics.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from the tier-3 literal grammar
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LiteralError {
    #[error("Unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("Unterminated string starting at offset {0}")]
    UnterminatedString(usize),

    #[error("Unterminated comment starting at offset {0}")]
    UnterminatedComment(usize),

    #[error("Invalid number '{text}' at offset {offset}")]
    InvalidNumber { text: String, offset: usize },

    #[error("Unexpected token {found} at offset {offset}: expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: String,
        offset: usize,
    },

    #[error("Unexpected end of input: expected {0}")]
    UnexpectedEnd(String),

    #[error("Unsupported expression '{text}' at offset {offset}: only literal values are allowed")]
    Unsupported { text: String, offset: usize },

    #[error("Array nested too deeply at offset {offset}")]
    TooDeep { offset: usize },
}

/// Errors from the Array-Literal Evaluator
#[derive(Error, Debug)]
pub enum EvalError {
    #[error("Argument text is empty")]
    Empty,

    #[error("Tier {tier} rewrite failed: {reason}")]
    Rewrite { tier: u8, reason: String },

    #[error("Tier {tier} JSON parse failed: {source}")]
    Json {
        tier: u8,
        #[source]
        source: serde_json::Error,
    },

    #[error("Tier 3 literal parse failed: {0}")]
    Literal(#[from] LiteralError),

    #[error("Refusing to evaluate disallowed construct '{0}'")]
    Disallowed(String),

    #[error("Evaluated value is not an array")]
    NotArray,

    #[error("Could not evaluate array literal ({strict}; {permissive}; {literal})")]
    AllTiersFailed {
        strict: Box<EvalError>,
        permissive: Box<EvalError>,
        literal: Box<EvalError>,
    },
}

/// A field-group tree that violates a required structural invariant
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructureError {
    #[error("{context} must be an object")]
    NotAnObject { context: String },

    #[error("{context} is missing required field: {property}")]
    MissingProperty { context: String, property: String },

    #[error("{context}: '{property}' must be an array")]
    NotAnArray { context: String, property: String },

    #[error("{context}: flexible content field must have at least one layout")]
    EmptyLayouts { context: String },

    #[error("{context}: conditional_logic must be 0 or an array of rule groups")]
    InvalidConditionalLogic { context: String },
}

/// Errors that make a whole file unusable for the extractor
#[derive(Error, Debug)]
pub enum ParseFileError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("File is not readable: {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("File does not look like PHP (no open tag): {0}")]
    NotPhp(PathBuf),

    #[error("File has PHP syntax errors: {0}")]
    SyntaxErrors(PathBuf),

    #[error("PHP parser failure: {0}")]
    Parser(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structure_error_display() {
        let err = StructureError::MissingProperty {
            context: "Field group".to_string(),
            property: "key".to_string(),
        };
        assert_eq!(err.to_string(), "Field group is missing required field: key");
    }

    #[test]
    fn test_parse_file_error_display_distinguishes_causes() {
        let missing = ParseFileError::NotFound(PathBuf::from("/theme/missing.php"));
        let unreadable = ParseFileError::Unreadable {
            path: PathBuf::from("/theme/locked.php"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(missing.to_string().starts_with("File not found"));
        assert!(unreadable.to_string().starts_with("File is not readable"));
    }

    #[test]
    fn test_all_tiers_failed_lists_each_tier() {
        let err = EvalError::AllTiersFailed {
            strict: Box::new(EvalError::Rewrite { tier: 1, reason: "bad".into() }),
            permissive: Box::new(EvalError::Rewrite { tier: 2, reason: "worse".into() }),
            literal: Box::new(EvalError::Disallowed("system(".into())),
        };
        let message = err.to_string();
        assert!(message.contains("Tier 1"));
        assert!(message.contains("Tier 2"));
        assert!(message.contains("system("));
    }
}
