//! Tier 3: literal-only recursive descent parser
//!
//! Grammar:
//!
//! ```text
//! arguments := expr ("," expr)* ","?
//! expr      := array | string | number | sign number | true | false | null
//! array     := "array" "(" elements ")" | "[" elements "]"
//! elements  := (element ("," element)* ","?)?
//! element   := expr ("=>" expr)?
//! ```
//!
//! Nothing outside this grammar can be expressed, so no PHP code is ever run.
//! Keys follow PHP's rules: integer-like strings become integer keys,
//! keyless elements take the next integer index and a repeated key
//! overwrites the earlier value in place.

use serde_json::{Map, Number, Value};

use super::lexer::{Lexer, Token, TokenKind};
use crate::errors::LiteralError;
use crate::keys::is_sequential_keys;

/// Deepest array nesting accepted, the same limit serde_json applies
pub const MAX_DEPTH: usize = 128;

/// A PHP array key after PHP's key casting
#[derive(Debug, Clone, PartialEq)]
enum ArrayKey {
    Int(i64),
    Str(String),
}

impl ArrayKey {
    fn into_string(self) -> String {
        match self {
            ArrayKey::Int(n) => n.to_string(),
            ArrayKey::Str(s) => s,
        }
    }
}

pub struct LiteralParser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
}

impl LiteralParser {
    pub fn new(input: &str) -> Result<Self, LiteralError> {
        let tokens = Lexer::new(input).tokenize()?;
        Ok(Self {
            tokens,
            position: 0,
            depth: 0,
        })
    }

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn current_kind(&self) -> Option<&TokenKind> {
        self.current().map(|t| &t.kind)
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn unexpected(&self, expected: &str) -> LiteralError {
        match self.current() {
            Some(token) => LiteralError::UnexpectedToken {
                found: token.kind.describe(),
                expected: expected.to_string(),
                offset: token.offset,
            },
            None => LiteralError::UnexpectedEnd(expected.to_string()),
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<(), LiteralError> {
        if self.current_kind() == Some(&kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    /// Parse an argument list and return its first value
    ///
    /// Later arguments must still be literals but are otherwise ignored.
    pub fn parse_arguments(&mut self) -> Result<Value, LiteralError> {
        let first = self.parse_expression()?;

        while self.current_kind() == Some(&TokenKind::Comma) {
            self.advance();
            if self.current().is_none() {
                break;
            }
            self.parse_expression()?;
        }

        if self.current().is_some() {
            return Err(self.unexpected("end of input"));
        }
        Ok(first)
    }

    fn parse_expression(&mut self) -> Result<Value, LiteralError> {
        let token = match self.current() {
            Some(token) => token.clone(),
            None => return Err(LiteralError::UnexpectedEnd("a value".to_string())),
        };

        match token.kind {
            TokenKind::Str(value) => {
                self.advance();
                Ok(Value::String(value))
            }
            TokenKind::Integer(n) => {
                self.advance();
                Ok(Value::from(n))
            }
            TokenKind::Float(f) => {
                self.advance();
                float_value(f, token.offset)
            }
            TokenKind::Minus | TokenKind::Plus => {
                let negative = token.kind == TokenKind::Minus;
                self.advance();
                match self.current_kind().cloned() {
                    Some(TokenKind::Integer(n)) => {
                        self.advance();
                        Ok(Value::from(if negative { -n } else { n }))
                    }
                    Some(TokenKind::Float(f)) => {
                        self.advance();
                        float_value(if negative { -f } else { f }, token.offset)
                    }
                    _ => Err(self.unexpected("a number after the sign")),
                }
            }
            TokenKind::LeftBracket => {
                self.advance();
                self.parse_nested(TokenKind::RightBracket, token.offset)
            }
            TokenKind::Ident(word) => {
                let lower = word.to_ascii_lowercase();
                match lower.trim_start_matches('\\') {
                    "true" => {
                        self.advance();
                        Ok(Value::Bool(true))
                    }
                    "false" => {
                        self.advance();
                        Ok(Value::Bool(false))
                    }
                    "null" => {
                        self.advance();
                        Ok(Value::Null)
                    }
                    "array" => {
                        self.advance();
                        self.expect(TokenKind::LeftParen, "'(' after array")?;
                        self.parse_nested(TokenKind::RightParen, token.offset)
                    }
                    _ => Err(LiteralError::Unsupported {
                        text: word,
                        offset: token.offset,
                    }),
                }
            }
            TokenKind::Variable(name) => Err(LiteralError::Unsupported {
                text: format!("${}", name),
                offset: token.offset,
            }),
            _ => Err(self.unexpected("a value")),
        }
    }

    /// Parse one array level, refusing to go deeper than [`MAX_DEPTH`]
    fn parse_nested(&mut self, closer: TokenKind, offset: usize) -> Result<Value, LiteralError> {
        if self.depth >= MAX_DEPTH {
            return Err(LiteralError::TooDeep { offset });
        }
        self.depth += 1;
        let result = self.parse_elements(closer);
        self.depth -= 1;
        result
    }

    /// Parse array elements up to and including `closer`
    fn parse_elements(&mut self, closer: TokenKind) -> Result<Value, LiteralError> {
        let mut entries: Map<String, Value> = Map::new();
        let mut next_index: i64 = 0;

        loop {
            if self.current_kind() == Some(&closer) {
                self.advance();
                break;
            }

            let offset = self.current().map(|t| t.offset).unwrap_or_default();
            let first = self.parse_expression()?;

            let (key, value) = if self.current_kind() == Some(&TokenKind::Arrow) {
                self.advance();
                let key = array_key(first, offset)?;
                (key, self.parse_expression()?)
            } else {
                (ArrayKey::Int(next_index), first)
            };

            if let ArrayKey::Int(n) = key {
                next_index = next_index.max(n.saturating_add(1));
            }
            entries.insert(key.into_string(), value);

            match self.current_kind() {
                Some(TokenKind::Comma) => self.advance(),
                Some(kind) if *kind == closer => {}
                _ => return Err(self.unexpected(&format!("',' or {}", closer.describe()))),
            }
        }

        if is_sequential_keys(&entries) {
            Ok(Value::Array(entries.into_iter().map(|(_, v)| v).collect()))
        } else {
            Ok(Value::Object(entries))
        }
    }
}

fn float_value(f: f64, offset: usize) -> Result<Value, LiteralError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| LiteralError::InvalidNumber {
            text: f.to_string(),
            offset,
        })
}

/// PHP key casting: "8" becomes 8, "08" stays a string, true becomes 1,
/// null becomes "", floats are truncated
fn array_key(value: Value, offset: usize) -> Result<ArrayKey, LiteralError> {
    match value {
        Value::String(s) => Ok(match integer_like(&s) {
            Some(n) => ArrayKey::Int(n),
            None => ArrayKey::Str(s),
        }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(ArrayKey::Int(i)),
            None => Ok(ArrayKey::Int(n.as_f64().unwrap_or_default().trunc() as i64)),
        },
        Value::Bool(b) => Ok(ArrayKey::Int(i64::from(b))),
        Value::Null => Ok(ArrayKey::Str(String::new())),
        Value::Array(_) | Value::Object(_) => Err(LiteralError::Unsupported {
            text: "array used as key".to_string(),
            offset,
        }),
    }
}

fn integer_like(s: &str) -> Option<i64> {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let canonical = !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
        && (digits == "0" || !digits.starts_with('0'))
        && s != "-0";
    if canonical {
        s.parse().ok()
    } else {
        None
    }
}

/// Parse literal argument text into a value
pub fn parse_literal(text: &str) -> Result<Value, LiteralError> {
    LiteralParser::new(text)?.parse_arguments()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_field_group_literal() {
        let value = parse_literal(
            r#"array(
                'key' => 'group_abc',
                'title' => "Hero",
                'fields' => array(
                    array('key' => 'field_1', 'label' => 'Title', 'name' => 'title', 'type' => 'text'),
                ),
                'active' => true,
                'menu_order' => -2,
            )"#,
        )
        .unwrap();

        assert_eq!(
            value,
            json!({
                "key": "group_abc",
                "title": "Hero",
                "fields": [
                    {"key": "field_1", "label": "Title", "name": "title", "type": "text"}
                ],
                "active": true,
                "menu_order": -2
            })
        );
    }

    #[test]
    fn test_short_array_syntax_and_mixed_keys() {
        let value = parse_literal("['a', 'k' => 'v', 'b']").unwrap();
        assert_eq!(value, json!({"0": "a", "k": "v", "1": "b"}));
    }

    #[test]
    fn test_integer_like_string_keys() {
        let value = parse_literal("array('0' => 'x', '1' => 'y')").unwrap();
        assert_eq!(value, json!(["x", "y"]));

        let value = parse_literal("array('01' => 'x')").unwrap();
        assert_eq!(value, json!({"01": "x"}));
    }

    #[test]
    fn test_duplicate_key_overwrites_in_place() {
        let value = parse_literal("array('a' => 1, 'b' => 2, 'a' => 3)").unwrap();
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"a":3,"b":2}"#);
    }

    #[test]
    fn test_empty_array_is_a_list() {
        assert_eq!(parse_literal("array()").unwrap(), json!([]));
        assert_eq!(parse_literal("[]").unwrap(), json!([]));
    }

    #[test]
    fn test_nesting_limit() {
        let text = |depth: usize| format!("array('x' => {}{})", "[".repeat(depth), "]".repeat(depth));

        assert!(parse_literal(&text(MAX_DEPTH - 1)).is_ok());
        assert!(matches!(
            parse_literal(&text(MAX_DEPTH)),
            Err(LiteralError::TooDeep { .. })
        ));
        assert!(matches!(
            parse_literal(&text(1000)),
            Err(LiteralError::TooDeep { .. })
        ));
    }

    #[test]
    fn test_extra_arguments_are_ignored() {
        let value = parse_literal("array('key' => 'group_1'), true").unwrap();
        assert_eq!(value, json!({"key": "group_1"}));
    }

    #[test]
    fn test_rejects_non_literals() {
        assert!(matches!(
            parse_literal("array('a' => $b)"),
            Err(LiteralError::Unsupported { .. })
        ));
        assert!(matches!(
            parse_literal("array('a' => __('Label', 'theme'))"),
            Err(LiteralError::Unsupported { .. })
        ));
        assert!(matches!(
            parse_literal("array('a' => 1 + 2)"),
            Err(LiteralError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse_literal("array('a' => 1"),
            Err(LiteralError::UnexpectedEnd(_))
        ));
    }
}
