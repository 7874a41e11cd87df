//! Array-Literal Evaluator
//!
//! Turns the argument text of a registration call into a JSON value without
//! executing any PHP. Three tiers are tried in order:
//!
//! 1. [`rewrite::strict_rewrite`]: token-driven rewrite to JSON, then parse
//! 2. [`rewrite::permissive_rewrite`]: regex-driven rewrite to JSON, then parse
//! 3. [`literal_parser::parse_literal`]: literal-only recursive descent parser,
//!    reached only when the text passes [`find_disallowed_construct`]
//!
//! Maps keyed exactly `"0".."n-1"` become sequences at every depth, so all
//! tiers agree on the shape of the result.
//!
//! Known blind spots: no variables, no constants, no expressions. Anything
//! other than literal arrays and scalars fails every tier.

pub mod lexer;
pub mod literal_parser;
pub mod rewrite;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use self::lexer::{Lexer, TokenKind};
use crate::errors::EvalError;
use crate::keys::is_sequential_keys;

lazy_static! {
    static ref DISALLOWED_WORD: Regex = Regex::new(
        r"(?i)^(function|fn|class|new|eval|assert|system|exec|shell_exec|passthru|proc_open|popen|pcntl_exec|include|include_once|require|require_once|echo|print|exit|die|unlink|fopen|fwrite|file_[a-z_]+)$"
    )
    .unwrap();
}

/// First disallowed construct in the text's tokens, if any
///
/// Variables and backticks are rejected outright, as are keywords and
/// primitives that define code or touch the shell or filesystem. String
/// contents and comments are never looked at. Text the lexer cannot read
/// is left for the literal parser to reject.
pub fn find_disallowed_construct(text: &str) -> Option<String> {
    let tokens = Lexer::new(text).tokenize().ok()?;
    tokens.into_iter().find_map(|token| match token.kind {
        TokenKind::Variable(name) => Some(format!("${}", name)),
        TokenKind::Other('`') => Some("`".to_string()),
        TokenKind::Ident(word) => {
            let name = word.rsplit('\\').next().unwrap_or_default();
            DISALLOWED_WORD.is_match(name).then_some(word)
        }
        _ => None,
    })
}

/// Convert maps keyed `"0".."n-1"` into sequences, bottom-up
///
/// An empty map becomes an empty sequence, matching an empty PHP array.
pub fn normalize_sequences(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let map: serde_json::Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, normalize_sequences(v)))
                .collect();
            if is_sequential_keys(&map) {
                Value::Array(map.into_iter().map(|(_, v)| v).collect())
            } else {
                Value::Object(map)
            }
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_sequences).collect()),
        other => other,
    }
}

/// Stateless three-tier evaluator; one instance can be shared freely
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayLiteralEvaluator;

impl ArrayLiteralEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, text: &str) -> Result<Value, EvalError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EvalError::Empty);
        }

        let strict = match self.strict_tier(text) {
            Ok(value) => {
                debug!("Evaluated array literal with tier 1");
                return Ok(value);
            }
            Err(e) => e,
        };
        debug!("Tier 1 failed: {}", strict);

        let permissive = match self.permissive_tier(text) {
            Ok(value) => {
                debug!("Evaluated array literal with tier 2");
                return Ok(value);
            }
            Err(e) => e,
        };
        debug!("Tier 2 failed: {}", permissive);

        let literal = match self.literal_tier(text) {
            Ok(value) => {
                debug!("Evaluated array literal with tier 3");
                return Ok(value);
            }
            Err(e) => e,
        };
        debug!("Tier 3 failed: {}", literal);

        Err(EvalError::AllTiersFailed {
            strict: Box::new(strict),
            permissive: Box::new(permissive),
            literal: Box::new(literal),
        })
    }

    fn strict_tier(&self, text: &str) -> Result<Value, EvalError> {
        let json = rewrite::strict_rewrite(text)?;
        let value: Value =
            serde_json::from_str(&json).map_err(|source| EvalError::Json { tier: 1, source })?;
        Ok(normalize_sequences(value))
    }

    fn permissive_tier(&self, text: &str) -> Result<Value, EvalError> {
        let json = rewrite::permissive_rewrite(text)?;
        let value: Value =
            serde_json::from_str(&json).map_err(|source| EvalError::Json { tier: 2, source })?;
        Ok(normalize_sequences(value))
    }

    fn literal_tier(&self, text: &str) -> Result<Value, EvalError> {
        if let Some(construct) = find_disallowed_construct(text) {
            return Err(EvalError::Disallowed(construct));
        }
        match literal_parser::parse_literal(text)? {
            value @ (Value::Array(_) | Value::Object(_)) => Ok(value),
            _ => Err(EvalError::NotArray),
        }
    }
}

/// Evaluate argument text with a default evaluator
pub fn evaluate(text: &str) -> Result<Value, EvalError> {
    ArrayLiteralEvaluator::new().evaluate(text)
}
