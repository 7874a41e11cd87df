//! PHP literal lexer - tokenizes the argument text of a registration call
//!
//! Only the pieces of PHP that can appear in a literal array are recognized.
//! Everything else comes out as `Variable` or `Other` tokens so the callers
//! can reject it with a precise offset.

use std::iter::Peekable;
use std::str::CharIndices;

use crate::errors::LiteralError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// A quoted string, already unescaped
    Str(String),
    /// An integer number
    Integer(i64),
    /// A floating point number
    Float(f64),
    /// A bare word: array, true, false, null, constants
    Ident(String),
    /// $name
    Variable(String),
    /// =>
    Arrow,
    /// ,
    Comma,
    /// (
    LeftParen,
    /// )
    RightParen,
    /// [
    LeftBracket,
    /// ]
    RightBracket,
    /// -
    Minus,
    /// +
    Plus,
    /// Anything else
    Other(char),
}

impl TokenKind {
    /// Short human readable form for error messages
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Str(s) => format!("string '{}'", s),
            TokenKind::Integer(n) => format!("integer {}", n),
            TokenKind::Float(f) => format!("float {}", f),
            TokenKind::Ident(name) => format!("'{}'", name),
            TokenKind::Variable(name) => format!("variable ${}", name),
            TokenKind::Arrow => "'=>'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::LeftParen => "'('".to_string(),
            TokenKind::RightParen => "')'".to_string(),
            TokenKind::LeftBracket => "'['".to_string(),
            TokenKind::RightBracket => "']'".to_string(),
            TokenKind::Minus => "'-'".to_string(),
            TokenKind::Plus => "'+'".to_string(),
            TokenKind::Other(c) => format!("'{}'", c),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character
    pub offset: usize,
}

impl Token {
    pub fn new(kind: TokenKind, offset: usize) -> Self {
        Self { kind, offset }
    }
}

pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    /// Tokenize the whole input
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LiteralError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    /// Character after the next one, without consuming anything
    fn peek_second(&self) -> Option<char> {
        let mut lookahead = self.chars.clone();
        lookahead.next();
        lookahead.next().map(|(_, c)| c)
    }

    fn next_token(&mut self) -> Result<Option<Token>, LiteralError> {
        loop {
            let (offset, ch) = match self.chars.peek() {
                Some(&(offset, ch)) => (offset, ch),
                None => return Ok(None),
            };

            if ch.is_whitespace() {
                self.chars.next();
                continue;
            }

            // Comments: // ..., # ..., /* ... */
            if ch == '#' || (ch == '/' && self.peek_second() == Some('/')) {
                self.skip_line_comment();
                continue;
            }
            if ch == '/' && self.peek_second() == Some('*') {
                self.skip_block_comment(offset)?;
                continue;
            }

            let kind = match ch {
                '\'' => {
                    self.chars.next();
                    TokenKind::Str(self.read_single_quoted(offset)?)
                }
                '"' => {
                    self.chars.next();
                    TokenKind::Str(self.read_double_quoted(offset)?)
                }
                '=' if self.peek_second() == Some('>') => {
                    self.chars.next();
                    self.chars.next();
                    TokenKind::Arrow
                }
                ',' => self.single(TokenKind::Comma),
                '(' => self.single(TokenKind::LeftParen),
                ')' => self.single(TokenKind::RightParen),
                '[' => self.single(TokenKind::LeftBracket),
                ']' => self.single(TokenKind::RightBracket),
                '-' => self.single(TokenKind::Minus),
                '+' => self.single(TokenKind::Plus),
                '$' => {
                    self.chars.next();
                    TokenKind::Variable(self.read_word())
                }
                c if c.is_ascii_digit() => self.read_number(offset)?,
                '.' if self.peek_second().map_or(false, |c| c.is_ascii_digit()) => {
                    self.read_number(offset)?
                }
                c if is_word_start(c) => TokenKind::Ident(self.read_word()),
                other => self.single(TokenKind::Other(other)),
            };

            return Ok(Some(Token::new(kind, offset)));
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.chars.next();
        kind
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek_char() {
            if c == '\n' {
                break;
            }
            self.chars.next();
        }
    }

    fn skip_block_comment(&mut self, start: usize) -> Result<(), LiteralError> {
        // consume "/*"
        self.chars.next();
        self.chars.next();
        let mut previous = '\0';
        for (_, c) in self.chars.by_ref() {
            if previous == '*' && c == '/' {
                return Ok(());
            }
            previous = c;
        }
        Err(LiteralError::UnterminatedComment(start))
    }

    /// Identifier characters, including namespace separators
    fn read_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek_char() {
            if is_word_char(c) {
                word.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        word
    }

    /// Single-quoted: only \' and \\ are escapes, everything else is literal
    fn read_single_quoted(&mut self, start: usize) -> Result<String, LiteralError> {
        let mut result = String::new();
        while let Some((_, c)) = self.chars.next() {
            match c {
                '\'' => return Ok(result),
                '\\' => match self.peek_char() {
                    Some(next @ ('\'' | '\\')) => {
                        result.push(next);
                        self.chars.next();
                    }
                    _ => result.push('\\'),
                },
                other => result.push(other),
            }
        }
        Err(LiteralError::UnterminatedString(start))
    }

    /// Double-quoted: PHP escape sequences; interpolation is not a literal
    fn read_double_quoted(&mut self, start: usize) -> Result<String, LiteralError> {
        let mut result = String::new();
        while let Some((offset, c)) = self.chars.next() {
            match c {
                '"' => return Ok(result),
                '$' if self.peek_char().map_or(false, |n| is_word_start(n) || n == '{') => {
                    return Err(LiteralError::Unsupported {
                        text: "string interpolation".to_string(),
                        offset,
                    });
                }
                '{' if self.peek_char() == Some('$') => {
                    return Err(LiteralError::Unsupported {
                        text: "string interpolation".to_string(),
                        offset,
                    });
                }
                '\\' => self.read_double_escape(&mut result),
                other => result.push(other),
            }
        }
        Err(LiteralError::UnterminatedString(start))
    }

    fn read_double_escape(&mut self, result: &mut String) {
        let next = match self.peek_char() {
            Some(c) => c,
            None => {
                result.push('\\');
                return;
            }
        };

        let simple = match next {
            'n' => Some('\n'),
            't' => Some('\t'),
            'r' => Some('\r'),
            'v' => Some('\u{0B}'),
            'e' => Some('\u{1B}'),
            'f' => Some('\u{0C}'),
            '\\' => Some('\\'),
            '$' => Some('$'),
            '"' => Some('"'),
            _ => None,
        };
        if let Some(c) = simple {
            self.chars.next();
            result.push(c);
            return;
        }

        match next {
            'x' => {
                self.chars.next();
                let digits = self.take_while_max(|c| c.is_ascii_hexdigit(), 2);
                match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
                    Some(c) if !digits.is_empty() => result.push(c),
                    _ => {
                        result.push_str("\\x");
                        result.push_str(&digits);
                    }
                }
            }
            'u' if self.peek_second() == Some('{') => {
                self.chars.next();
                self.chars.next();
                let digits = self.take_while_max(|c| c.is_ascii_hexdigit(), 6);
                if self.peek_char() == Some('}') {
                    self.chars.next();
                }
                match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
                    Some(c) => result.push(c),
                    None => result.push('\u{FFFD}'),
                }
            }
            '0'..='7' => {
                let digits = self.take_while_max(|c| ('0'..='7').contains(&c), 3);
                match u32::from_str_radix(&digits, 8).ok().and_then(char::from_u32) {
                    Some(c) => result.push(c),
                    None => result.push('\u{FFFD}'),
                }
            }
            _ => result.push('\\'),
        }
    }

    fn take_while_max(&mut self, predicate: impl Fn(char) -> bool, max: usize) -> String {
        let mut taken = String::new();
        while taken.len() < max {
            match self.peek_char() {
                Some(c) if predicate(c) => {
                    taken.push(c);
                    self.chars.next();
                }
                _ => break,
            }
        }
        taken
    }

    fn read_number(&mut self, start: usize) -> Result<TokenKind, LiteralError> {
        let mut end = start;
        while let Some(&(offset, c)) = self.chars.peek() {
            let exponent_sign = (c == '+' || c == '-')
                && matches!(self.input[start..offset].chars().last(), Some('e' | 'E'))
                && !self.input[start..offset].starts_with("0x")
                && !self.input[start..offset].starts_with("0X");
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || exponent_sign {
                end = offset + c.len_utf8();
                self.chars.next();
            } else {
                break;
            }
        }

        let text = &self.input[start..end];
        parse_php_number(text).ok_or_else(|| LiteralError::InvalidNumber {
            text: text.to_string(),
            offset: start,
        })
    }
}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '\\'
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '\\'
}

/// Parse a PHP numeric literal (decimal, hex, octal, binary, float)
///
/// Integers that overflow become floats, as they do in PHP.
fn parse_php_number(text: &str) -> Option<TokenKind> {
    let cleaned: String = text.chars().filter(|&c| c != '_').collect();
    let lower = cleaned.to_ascii_lowercase();

    let radix_literal = if let Some(hex) = lower.strip_prefix("0x") {
        Some((hex.to_string(), 16))
    } else if let Some(bin) = lower.strip_prefix("0b") {
        Some((bin.to_string(), 2))
    } else if let Some(oct) = lower.strip_prefix("0o") {
        Some((oct.to_string(), 8))
    } else if lower.len() > 1
        && lower.starts_with('0')
        && lower.chars().all(|c| c.is_ascii_digit())
    {
        Some((lower[1..].to_string(), 8))
    } else {
        None
    };

    if let Some((digits, radix)) = radix_literal {
        if digits.is_empty() {
            return None;
        }
        return match i64::from_str_radix(&digits, radix) {
            Ok(n) => Some(TokenKind::Integer(n)),
            Err(_) => u128::from_str_radix(&digits, radix)
                .ok()
                .map(|n| TokenKind::Float(n as f64)),
        };
    }

    if lower.chars().all(|c| c.is_ascii_digit()) {
        return match lower.parse::<i64>() {
            Ok(n) => Some(TokenKind::Integer(n)),
            Err(_) => lower.parse::<f64>().ok().map(TokenKind::Float),
        };
    }

    lower
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(TokenKind::Float)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_array_tokens() {
        assert_eq!(
            kinds("array('key' => 'group_1', )"),
            vec![
                TokenKind::Ident("array".into()),
                TokenKind::LeftParen,
                TokenKind::Str("key".into()),
                TokenKind::Arrow,
                TokenKind::Str("group_1".into()),
                TokenKind::Comma,
                TokenKind::RightParen,
            ]
        );
    }

    #[test]
    fn test_single_quoted_escapes() {
        assert_eq!(kinds(r"'It\'s a \\ path \n'"), vec![TokenKind::Str("It's a \\ path \\n".into())]);
    }

    #[test]
    fn test_double_quoted_escapes() {
        assert_eq!(
            kinds(r#""line\nnext \"quoted\" \x41\u{1F600}""#),
            vec![TokenKind::Str("line\nnext \"quoted\" A\u{1F600}".into())]
        );
    }

    #[test]
    fn test_interpolation_is_rejected() {
        let err = Lexer::new(r#""Hello $name""#).tokenize().unwrap_err();
        assert!(matches!(err, LiteralError::Unsupported { .. }));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("42 3.5 0x1F 0b11 017 1_000 2e3"),
            vec![
                TokenKind::Integer(42),
                TokenKind::Float(3.5),
                TokenKind::Integer(31),
                TokenKind::Integer(3),
                TokenKind::Integer(15),
                TokenKind::Integer(1000),
                TokenKind::Float(2000.0),
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("array( // line\n 'a' /* block */ => 1 # hash\n)"),
            vec![
                TokenKind::Ident("array".into()),
                TokenKind::LeftParen,
                TokenKind::Str("a".into()),
                TokenKind::Arrow,
                TokenKind::Integer(1),
                TokenKind::RightParen,
            ]
        );
    }

    #[test]
    fn test_variables_and_other_tokens() {
        assert_eq!(
            kinds("$value . 'x'"),
            vec![
                TokenKind::Variable("value".into()),
                TokenKind::Other('.'),
                TokenKind::Str("x".into()),
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("'open").tokenize().unwrap_err();
        assert_eq!(err, LiteralError::UnterminatedString(0));
    }
}
