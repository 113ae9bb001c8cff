//! Lexer for GraphQL executable documents.

use crate::token::{Token, TokenKind};
use gqlx_core::Span;

/// A lexer over GraphQL source text.
pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: u32,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
        }
    }

    /// Returns the current position.
    #[inline]
    pub fn pos(&self) -> u32 {
        self.pos
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos as usize).copied()
    }

    #[inline]
    fn peek_at(&self, offset: u32) -> Option<u8> {
        self.bytes.get((self.pos + offset) as usize).copied()
    }

    #[inline]
    fn advance(&mut self) {
        self.pos += 1;
    }

    #[inline]
    fn advance_by(&mut self, n: u32) {
        self.pos += n;
    }

    /// Scans the next token.
    pub fn next_token(&mut self) -> Token {
        self.skip_ignored();

        let start = self.pos;

        let Some(c) = self.peek() else {
            return Token::new(TokenKind::Eof, Span::empty(start));
        };

        let kind = match c {
            b'{' => self.single(TokenKind::LBrace),
            b'}' => self.single(TokenKind::RBrace),
            b'(' => self.single(TokenKind::LParen),
            b')' => self.single(TokenKind::RParen),
            b'[' => self.single(TokenKind::LBracket),
            b']' => self.single(TokenKind::RBracket),
            b':' => self.single(TokenKind::Colon),
            b'=' => self.single(TokenKind::Eq),
            b'|' => self.single(TokenKind::Pipe),
            b'&' => self.single(TokenKind::Amp),
            b'@' => self.single(TokenKind::At),
            b'!' => self.single(TokenKind::Bang),
            b'$' => self.single(TokenKind::Dollar),
            b'.' => {
                if self.peek_at(1) == Some(b'.') && self.peek_at(2) == Some(b'.') {
                    self.advance_by(3);
                    TokenKind::Spread
                } else {
                    self.advance();
                    TokenKind::Error
                }
            }
            b'"' => self.scan_string(),
            b'-' | b'0'..=b'9' => self.scan_number(),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.scan_name(),
            _ => {
                // Consume a whole character so spans stay on UTF-8 boundaries.
                let width = self.source[self.pos as usize..]
                    .chars()
                    .next()
                    .map_or(1, char::len_utf8);
                self.advance_by(width as u32);
                TokenKind::Error
            }
        };

        Token::new(kind, Span::new(start, self.pos))
    }

    #[inline]
    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    /// Skips whitespace, line terminators, commas and comments.
    fn skip_ignored(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n' | b',') => {
                    self.advance();
                }
                Some(b'#') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' || c == b'\r' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some(0xEF) if self.peek_at(1) == Some(0xBB) && self.peek_at(2) == Some(0xBF) => {
                    // UTF-8 BOM
                    self.advance_by(3);
                }
                _ => break,
            }
        }
    }

    fn scan_name(&mut self) -> TokenKind {
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' {
                self.advance();
            } else {
                break;
            }
        }
        TokenKind::Name
    }

    fn scan_digits(&mut self) -> usize {
        let mut count = 0;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
                count += 1;
            } else {
                break;
            }
        }
        count
    }

    fn scan_number(&mut self) -> TokenKind {
        let mut is_float = false;

        if self.peek() == Some(b'-') {
            self.advance();
        }

        match self.peek() {
            Some(b'0') => {
                self.advance();
                // Leading zeros are not allowed.
                if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.scan_digits();
                    return TokenKind::Error;
                }
            }
            Some(b'1'..=b'9') => {
                self.scan_digits();
            }
            _ => return TokenKind::Error,
        }

        if self.peek() == Some(b'.') {
            is_float = true;
            self.advance();
            if self.scan_digits() == 0 {
                return TokenKind::Error;
            }
        }

        if let Some(b'e' | b'E') = self.peek() {
            is_float = true;
            self.advance();
            if let Some(b'+' | b'-') = self.peek() {
                self.advance();
            }
            if self.scan_digits() == 0 {
                return TokenKind::Error;
            }
        }

        // A number may not be directly followed by a name start or a dot.
        if self
            .peek()
            .is_some_and(|c| c == b'.' || c == b'_' || c.is_ascii_alphabetic())
        {
            self.scan_name();
            return TokenKind::Error;
        }

        if is_float {
            TokenKind::FloatLiteral
        } else {
            TokenKind::IntLiteral
        }
    }

    fn scan_string(&mut self) -> TokenKind {
        self.advance(); // Opening quote

        if self.peek() == Some(b'"') && self.peek_at(1) == Some(b'"') {
            self.advance_by(2);
            return self.scan_block_string();
        }

        loop {
            match self.peek() {
                None | Some(b'\n' | b'\r') => return TokenKind::Error,
                Some(b'"') => {
                    self.advance();
                    return TokenKind::StringLiteral;
                }
                Some(b'\\') => {
                    self.advance();
                    if self.peek().is_some() {
                        self.advance();
                    }
                }
                _ => self.advance(),
            }
        }
    }

    fn scan_block_string(&mut self) -> TokenKind {
        loop {
            match self.peek() {
                None => return TokenKind::Error,
                Some(b'"') if self.peek_at(1) == Some(b'"') && self.peek_at(2) == Some(b'"') => {
                    self.advance_by(3);
                    return TokenKind::BlockStringLiteral;
                }
                Some(b'\\')
                    if self.peek_at(1) == Some(b'"')
                        && self.peek_at(2) == Some(b'"')
                        && self.peek_at(3) == Some(b'"') =>
                {
                    self.advance_by(4);
                }
                _ => self.advance(),
            }
        }
    }

    /// Gets the text at the given span.
    pub fn span_text(&self, span: Span) -> &'a str {
        &self.source[span.start as usize..span.end as usize]
    }
}

/// Decodes the raw text of a quoted string token, including its quotes.
pub fn unescape_string(raw: &str) -> Result<String, String> {
    let inner = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| "unterminated string".to_string())?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('b') => out.push('\u{0008}'),
            Some('f') => out.push('\u{000C}'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('u') => {
                let high = read_hex4(&mut chars)?;
                let code = if (0xD800..0xDC00).contains(&high) {
                    // Surrogate pair: expect a following \uXXXX low half.
                    if chars.next() != Some('\\') || chars.next() != Some('u') {
                        return Err("unpaired surrogate in unicode escape".to_string());
                    }
                    let low = read_hex4(&mut chars)?;
                    if !(0xDC00..0xE000).contains(&low) {
                        return Err("invalid low surrogate in unicode escape".to_string());
                    }
                    0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
                } else {
                    high
                };
                let ch = char::from_u32(code)
                    .ok_or_else(|| format!("invalid unicode escape \\u{code:04X}"))?;
                out.push(ch);
            }
            Some(other) => return Err(format!("invalid escape sequence \\{other}")),
            None => return Err("unterminated escape sequence".to_string()),
        }
    }
    Ok(out)
}

fn read_hex4(chars: &mut std::str::Chars<'_>) -> Result<u32, String> {
    let mut code = 0;
    for _ in 0..4 {
        let digit = chars
            .next()
            .and_then(|c| c.to_digit(16))
            .ok_or_else(|| "invalid unicode escape".to_string())?;
        code = code * 16 + digit;
    }
    Ok(code)
}

/// Computes the value of a block string token, including its triple quotes.
///
/// Applies the common-indentation removal and blank-line trimming rules.
pub fn block_string_value(raw: &str) -> String {
    let inner = raw
        .strip_prefix("\"\"\"")
        .and_then(|s| s.strip_suffix("\"\"\""))
        .unwrap_or(raw)
        .replace("\\\"\"\"", "\"\"\"");

    let lines: Vec<&str> = inner.split('\n').map(|l| l.trim_end_matches('\r')).collect();

    let common_indent = lines
        .iter()
        .skip(1)
        .filter_map(|line| {
            let indent = line.len() - line.trim_start_matches([' ', '\t']).len();
            (indent < line.len()).then_some(indent)
        })
        .min()
        .unwrap_or(0);

    let mut trimmed: Vec<&str> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                *line
            } else if line.len() < common_indent {
                line.trim_start_matches([' ', '\t'])
            } else {
                &line[common_indent..]
            }
        })
        .collect();

    while trimmed.first().is_some_and(|l| l.trim().is_empty()) {
        trimmed.remove(0);
    }
    while trimmed.last().is_some_and(|l| l.trim().is_empty()) {
        trimmed.pop();
    }

    trimmed.join("\n")
}

/// Tokenizes the entire source.
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();

    loop {
        let token = lexer.next_token();
        let is_eof = token.kind == TokenKind::Eof;
        tokens.push(token);
        if is_eof {
            break;
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_punctuation() {
        assert_eq!(
            kinds("{ } ( ) [ ] : ... = | & @ ! $"),
            vec![
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::Colon,
                TokenKind::Spread,
                TokenKind::Eq,
                TokenKind::Pipe,
                TokenKind::Amp,
                TokenKind::At,
                TokenKind::Bang,
                TokenKind::Dollar,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_commas_and_comments_are_ignored() {
        assert_eq!(
            kinds("a, b # trailing comment\n,c"),
            vec![
                TokenKind::Name,
                TokenKind::Name,
                TokenKind::Name,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("42 -17 0 3.14 1e10 2.5e-3"),
            vec![
                TokenKind::IntLiteral,
                TokenKind::IntLiteral,
                TokenKind::IntLiteral,
                TokenKind::FloatLiteral,
                TokenKind::FloatLiteral,
                TokenKind::FloatLiteral,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_invalid_numbers() {
        assert_eq!(kinds("007")[0], TokenKind::Error);
        assert_eq!(kinds("1.")[0], TokenKind::Error);
        assert_eq!(kinds("12abc")[0], TokenKind::Error);
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            kinds(r#""hello" "wo\"rld" """block string""""#),
            vec![
                TokenKind::StringLiteral,
                TokenKind::StringLiteral,
                TokenKind::BlockStringLiteral,
                TokenKind::Eof,
            ]
        );
        assert_eq!(kinds("\"open\n\"")[0], TokenKind::Error);
    }

    #[test]
    fn test_unescape_string() {
        assert_eq!(unescape_string(r#""a\nb""#).unwrap(), "a\nb");
        assert_eq!(unescape_string(r#""é\"""#).unwrap(), "é\"");
        assert_eq!(unescape_string(r#""\uD83D\uDE00""#).unwrap(), "😀");
        assert!(unescape_string(r#""\q""#).is_err());
        assert!(unescape_string(r#""\u12""#).is_err());
    }

    #[test]
    fn test_token_spans() {
        let source = "query($id: ID!) {\n  user(id: $id) { ...F }\n}";
        let rendered: Vec<String> = tokenize(source)
            .iter()
            .map(|t| {
                let text = &source[t.span.start as usize..t.span.end as usize];
                format!("{:?} {}..{} {:?}", t.kind, t.span.start, t.span.end, text)
            })
            .collect();
        insta::assert_snapshot!(rendered.join("\n"), @r#"
        Name 0..5 "query"
        LParen 5..6 "("
        Dollar 6..7 "$"
        Name 7..9 "id"
        Colon 9..10 ":"
        Name 11..13 "ID"
        Bang 13..14 "!"
        RParen 14..15 ")"
        LBrace 16..17 "{"
        Name 20..24 "user"
        LParen 24..25 "("
        Name 25..27 "id"
        Colon 27..28 ":"
        Dollar 29..30 "$"
        Name 30..32 "id"
        RParen 32..33 ")"
        LBrace 34..35 "{"
        Spread 36..39 "..."
        Name 39..40 "F"
        RBrace 41..42 "}"
        RBrace 43..44 "}"
        Eof 44..44 ""
        "#);
    }

    #[test]
    fn test_block_string_value() {
        let raw = "\"\"\"\n    Hello,\n      World!\n\n    Yours\n  \"\"\"";
        assert_eq!(block_string_value(raw), "Hello,\n  World!\n\nYours");
    }
}
