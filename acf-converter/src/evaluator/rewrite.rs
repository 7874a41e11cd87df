//! Tiers 1 and 2: rewrite PHP array-literal text into JSON text
//!
//! Tier 1 walks the literal's tokens and rewrites them one to one. It only
//! copes with arrays where every element has a key (the shape ACF's own
//! exporter produces). Tier 2 works on the raw text with regexes, is more
//! forgiving about spacing and quoting, and finishes by turning brace groups
//! without any `key:` member into JSON arrays.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use super::lexer::{Lexer, TokenKind};
use crate::errors::EvalError;

lazy_static! {
    static ref ARRAY_OPEN: Regex = Regex::new(r"(?i)\barray\s*\(").unwrap();
    static ref ARROW: Regex = Regex::new(r"\s*=>\s*").unwrap();
    static ref LITERAL_WORD: Regex = Regex::new(r"(?i)\b(true|false|null)\b").unwrap();
    static ref BARE_KEY: Regex =
        Regex::new(r"(^|[{,])\s*(-?[0-9]+|[A-Za-z_][A-Za-z0-9_]*)\s*:").unwrap();
    static ref TRAILING_COMMA: Regex = Regex::new(r",\s*\}").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

fn tier1_error(reason: impl Into<String>) -> EvalError {
    EvalError::Rewrite {
        tier: 1,
        reason: reason.into(),
    }
}

fn tier2_error(reason: impl Into<String>) -> EvalError {
    EvalError::Rewrite {
        tier: 2,
        reason: reason.into(),
    }
}

fn json_string(value: &str) -> String {
    // Serializing a &str cannot fail
    serde_json::to_string(value).unwrap_or_else(|_| String::from("\"\""))
}

fn json_float(value: f64) -> Option<String> {
    serde_json::Number::from_f64(value).map(|n| n.to_string())
}

// ============================================================================
// Tier 1: token-driven rewrite
// ============================================================================

/// Rewrite literal text to JSON, token by token
///
/// `array(` and `[` open a JSON object, their closers close it, `=>` becomes
/// `:`, strings are re-quoted as JSON strings, bare keys get quoted and
/// trailing commas are dropped.
pub fn strict_rewrite(text: &str) -> Result<String, EvalError> {
    let tokens = Lexer::new(text)
        .tokenize()
        .map_err(|e| tier1_error(e.to_string()))?;

    let mut out = String::with_capacity(text.len());
    let mut closers: Vec<TokenKind> = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let next = tokens.get(i + 1).map(|t| &t.kind);
        let is_key = |index: usize| matches!(tokens.get(index).map(|t| &t.kind), Some(TokenKind::Arrow));

        match &tokens[i].kind {
            TokenKind::Ident(word)
                if word.eq_ignore_ascii_case("array") && next == Some(&TokenKind::LeftParen) =>
            {
                out.push('{');
                closers.push(TokenKind::RightParen);
                i += 2;
                continue;
            }
            TokenKind::LeftBracket => {
                out.push('{');
                closers.push(TokenKind::RightBracket);
            }
            closer @ (TokenKind::RightParen | TokenKind::RightBracket) => {
                if closers.pop().as_ref() != Some(closer) {
                    return Err(tier1_error(format!(
                        "unbalanced {} at offset {}",
                        closer.describe(),
                        tokens[i].offset
                    )));
                }
                out.push('}');
            }
            TokenKind::Arrow => out.push(':'),
            TokenKind::Comma => {
                if !matches!(next, Some(TokenKind::RightParen | TokenKind::RightBracket)) {
                    out.push(',');
                }
            }
            TokenKind::Str(value) => out.push_str(&json_string(value)),
            TokenKind::Integer(n) => {
                if is_key(i + 1) {
                    out.push_str(&json_string(&n.to_string()));
                } else {
                    out.push_str(&n.to_string());
                }
            }
            TokenKind::Float(f) => {
                if is_key(i + 1) {
                    return Err(tier1_error("float array keys are not supported"));
                }
                out.push_str(&json_float(*f).ok_or_else(|| tier1_error("non-finite float"))?);
            }
            sign @ (TokenKind::Minus | TokenKind::Plus) => {
                let negative = matches!(sign, TokenKind::Minus);
                let literal = match next {
                    Some(TokenKind::Integer(n)) => {
                        let n = if negative { -n } else { *n };
                        if is_key(i + 2) {
                            json_string(&n.to_string())
                        } else {
                            n.to_string()
                        }
                    }
                    Some(TokenKind::Float(f)) if !is_key(i + 2) => {
                        let f = if negative { -f } else { *f };
                        json_float(f).ok_or_else(|| tier1_error("non-finite float"))?
                    }
                    _ => {
                        return Err(tier1_error(format!(
                            "operator {} at offset {}",
                            sign.describe(),
                            tokens[i].offset
                        )))
                    }
                };
                out.push_str(&literal);
                i += 2;
                continue;
            }
            TokenKind::Ident(word) => {
                let lower = word.to_ascii_lowercase();
                let is_literal = matches!(lower.as_str(), "true" | "false" | "null");
                if is_key(i + 1) {
                    out.push_str(&json_string(if is_literal { &lower } else { word }));
                } else if is_literal {
                    out.push_str(&lower);
                } else {
                    return Err(tier1_error(format!(
                        "bare constant '{}' at offset {}",
                        word, tokens[i].offset
                    )));
                }
            }
            other => {
                return Err(tier1_error(format!(
                    "unexpected {} at offset {}",
                    other.describe(),
                    tokens[i].offset
                )))
            }
        }
        i += 1;
    }

    if !closers.is_empty() {
        return Err(tier1_error("unclosed array"));
    }

    Ok(out)
}

// ============================================================================
// Tier 2: regex-driven rewrite
// ============================================================================

/// Rewrite literal text to JSON with regexes
///
/// String literals and comments are cut out first so the code rewrites
/// never touch their contents.
pub fn permissive_rewrite(text: &str) -> Result<String, EvalError> {
    let mut out = String::with_capacity(text.len());

    for piece in split_source(text) {
        match piece {
            Piece::Code(code) => out.push_str(&rewrite_code_segment(&code)),
            Piece::Str(literal) => out.push_str(&json_string(&decode_string_literal(literal)?)),
        }
    }

    Ok(keyless_groups_to_arrays(out.trim()))
}

/// A run of code (comments already replaced by a space) or one quoted
/// string literal, quotes included
#[derive(Debug, PartialEq)]
enum Piece<'a> {
    Code(String),
    Str(&'a str),
}

/// Split literal text into code and string literals, dropping comments
///
/// Quotes inside comments and comment markers inside strings are both
/// ignored, the same way the lexer reads them.
fn split_source(text: &str) -> Vec<Piece<'_>> {
    let bytes = text.as_bytes();
    let mut pieces = Vec::new();
    let mut code = String::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let comment_end = match bytes[i] {
            b'#' => Some(line_end(text, i)),
            b'/' if bytes.get(i + 1) == Some(&b'/') => Some(line_end(text, i)),
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                Some(text[i + 2..].find("*/").map_or(bytes.len(), |end| i + 2 + end + 2))
            }
            _ => None,
        };
        if let Some(end) = comment_end {
            code.push_str(&text[start..i]);
            code.push(' ');
            i = end;
            start = end;
            continue;
        }

        if let quote @ (b'\'' | b'"') = bytes[i] {
            code.push_str(&text[start..i]);
            if !code.is_empty() {
                pieces.push(Piece::Code(std::mem::take(&mut code)));
            }
            let mut j = i + 1;
            while j < bytes.len() && bytes[j] != quote {
                if bytes[j] == b'\\' {
                    j += 1;
                }
                j += 1;
            }
            let end = (j + 1).min(bytes.len());
            pieces.push(Piece::Str(&text[i..end]));
            i = end;
            start = end;
            continue;
        }

        i += 1;
    }

    code.push_str(&text[start..]);
    if !code.is_empty() {
        pieces.push(Piece::Code(code));
    }
    pieces
}

/// Index of the newline ending the line that contains `from`, or the end
fn line_end(text: &str, from: usize) -> usize {
    text[from..].find('\n').map_or(text.len(), |offset| from + offset)
}

/// Decode one quoted PHP string with the lexer's escape rules
fn decode_string_literal(literal: &str) -> Result<String, EvalError> {
    let tokens = Lexer::new(literal)
        .tokenize()
        .map_err(|e| tier2_error(e.to_string()))?;
    match tokens.as_slice() {
        [token] => match &token.kind {
            TokenKind::Str(value) => Ok(value.clone()),
            other => Err(tier2_error(format!("expected a string, found {}", other.describe()))),
        },
        _ => Err(tier2_error(format!("malformed string literal {}", literal))),
    }
}

fn rewrite_code_segment(segment: &str) -> String {
    let code = ARRAY_OPEN.replace_all(segment, "{");
    let code = code.replace(')', "}").replace('[', "{").replace(']', "}");
    let code = ARROW.replace_all(&code, ":");
    let code = LITERAL_WORD.replace_all(&code, |caps: &Captures| caps[1].to_ascii_lowercase());
    let code = BARE_KEY.replace_all(&code, |caps: &Captures| {
        format!("{}{}:", &caps[1], json_string(&caps[2]))
    });
    let code = TRAILING_COMMA.replace_all(&code, "}");
    WHITESPACE.replace_all(&code, " ").into_owned()
}

/// Turn `{ a, b }` groups that contain no `key:` member into `[ a, b ]`
///
/// PHP lists written without explicit indexes come out of the rewrite as
/// keyless brace groups, which are not valid JSON objects. Empty groups are
/// left alone; sequence normalization handles them after parsing.
pub fn keyless_groups_to_arrays(json: &str) -> String {
    let mut bytes = json.as_bytes().to_vec();
    let mut stack: Vec<(usize, bool)> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for i in 0..bytes.len() {
        let b = bytes[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => stack.push((i, false)),
            b':' => {
                if let Some(top) = stack.last_mut() {
                    top.1 = true;
                }
            }
            b'}' => {
                if let Some((open, keyed)) = stack.pop() {
                    let empty = json[open + 1..i].trim().is_empty();
                    if !keyed && !empty {
                        bytes[open] = b'[';
                        bytes[i] = b']';
                    }
                }
            }
            _ => {}
        }
    }

    // Only ASCII bytes were swapped, so the text is still valid UTF-8
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn parse(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_strict_rewrite_keyed_array() {
        let json = strict_rewrite("array('key' => 'group_1', 'active' => TRUE, 'menu_order' => 0,)").unwrap();
        assert_eq!(parse(&json), json!({"key": "group_1", "active": true, "menu_order": 0}));
    }

    #[test]
    fn test_strict_rewrite_numeric_and_bare_keys() {
        let json = strict_rewrite("[0 => ['a' => -1.5], label => null, -1 => 'neg']").unwrap();
        assert_eq!(parse(&json), json!({"0": {"a": -1.5}, "label": null, "-1": "neg"}));
    }

    #[test]
    fn test_strict_rewrite_escapes_double_quotes() {
        let json = strict_rewrite(r#"array('label' => 'Say "hi"')"#).unwrap();
        assert_eq!(parse(&json), json!({"label": "Say \"hi\""}));
    }

    #[test]
    fn test_strict_rewrite_rejects_constants_and_variables() {
        assert!(strict_rewrite("array('a' => SOME_CONSTANT)").is_err());
        assert!(strict_rewrite("array('a' => $value)").is_err());
        assert!(strict_rewrite("array('a' => 1").is_err());
    }

    #[test]
    fn test_strict_rewrite_leaves_keyless_lists_invalid() {
        let json = strict_rewrite("array('a', 'b')").unwrap();
        assert!(serde_json::from_str::<Value>(&json).is_err());
    }

    #[test]
    fn test_permissive_rewrite_keyless_lists() {
        let json = permissive_rewrite(
            "array( 'fields' => array ( array('key' => 'field_1'), array('key' => 'field_2'), ), 'hide' => array('a', \"b\") )",
        )
        .unwrap();
        assert_eq!(
            parse(&json),
            json!({
                "fields": [{"key": "field_1"}, {"key": "field_2"}],
                "hide": ["a", "b"]
            })
        );
    }

    #[test]
    fn test_permissive_rewrite_leaves_strings_untouched() {
        let json = permissive_rewrite("array('text' => 'array( true ) => [x]')").unwrap();
        assert_eq!(parse(&json), json!({"text": "array( true ) => [x]"}));
    }

    #[test]
    fn test_keyless_groups_to_arrays() {
        assert_eq!(keyless_groups_to_arrays(r#"{"a":{1,2},"b":{}}"#), r#"{"a":[1,2],"b":{}}"#);
        assert_eq!(keyless_groups_to_arrays(r#"{"x:y"}"#), r#"["x:y"]"#);
    }

    #[test]
    fn test_split_source_drops_comments() {
        let pieces = split_source("array( // don't\n 'a' /* '} */ => '#1')");
        assert_eq!(
            pieces,
            vec![
                Piece::Code("array(  \n ".to_string()),
                Piece::Str("'a'"),
                Piece::Code("   => ".to_string()),
                Piece::Str("'#1'"),
                Piece::Code(")".to_string()),
            ]
        );
    }

    #[test]
    fn test_permissive_rewrite_with_commented_apostrophe() {
        let json = permissive_rewrite(
            "array(\n    // Don't rename these keys\n    'title' => 'New arrivals',\n    # it's a list\n    'hide' => array('the_content'),\n)",
        )
        .unwrap();
        assert_eq!(parse(&json), json!({"title": "New arrivals", "hide": ["the_content"]}));
    }
}
