//! PDF tokenizer.
//!
//! Turns raw bytes into primitive tokens. Scanning never fails: malformed
//! escapes, stray hex digits and unterminated strings degrade to the best
//! token that can be recovered, and the caller decides what to do with it.

use crate::model::objects::{Cmd, Name};
use bytes::Bytes;

/// Structural keywords get their own variants; every other bare word is an
/// interned `Cmd` (content-stream operators, `true`/`false` excluded).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
    BraceOpen,
    BraceClose,
    Null,
    Obj,
    EndObj,
    R,
    Stream,
    EndStream,
    Xref,
    Trailer,
    StartXref,
    Cmd(Cmd),
}

impl Keyword {
    pub fn from_bytes(b: &[u8]) -> Self {
        match b {
            b"null" => Self::Null,
            b"obj" => Self::Obj,
            b"endobj" => Self::EndObj,
            b"R" => Self::R,
            b"stream" => Self::Stream,
            b"endstream" => Self::EndStream,
            b"xref" => Self::Xref,
            b"trailer" => Self::Trailer,
            b"startxref" => Self::StartXref,
            other => Self::Cmd(Cmd::new(&latin1(other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ArrayStart => "[",
            Self::ArrayEnd => "]",
            Self::DictStart => "<<",
            Self::DictEnd => ">>",
            Self::BraceOpen => "{",
            Self::BraceClose => "}",
            Self::Null => "null",
            Self::Obj => "obj",
            Self::EndObj => "endobj",
            Self::R => "R",
            Self::Stream => "stream",
            Self::EndStream => "endstream",
            Self::Xref => "xref",
            Self::Trailer => "trailer",
            Self::StartXref => "startxref",
            Self::Cmd(c) => c.as_str(),
        }
    }

    /// True for a bare command spelled `s`.
    pub fn is_cmd(&self, s: &str) -> bool {
        matches!(self, Self::Cmd(c) if c.as_str() == s)
    }
}

/// Lexer token types.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Real(f64),
    Bool(bool),
    Name(Name),
    String(Vec<u8>),
    Keyword(Keyword),
}

/// PDF tokenizer over a shared byte buffer.
#[derive(Debug, Clone)]
pub struct Lexer {
    data: Bytes,
    pos: usize,
    /// Start of the most recently returned token.
    token_pos: usize,
    comments: Option<Vec<(usize, Vec<u8>)>>,
}

impl Lexer {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
            token_pos: 0,
            comments: None,
        }
    }

    /// Starts recording `%` comments instead of discarding them.
    pub fn record_comments(&mut self) {
        self.comments.get_or_insert_with(Vec::new);
    }

    /// Comments seen so far as (offset, text without `%`).
    pub fn take_comments(&mut self) -> Vec<(usize, Vec<u8>)> {
        self.comments.as_mut().map(std::mem::take).unwrap_or_default()
    }

    /// Current position in the buffer.
    pub fn tell(&self) -> usize {
        self.pos
    }

    /// Position where the last token started.
    pub fn token_pos(&self) -> usize {
        self.token_pos
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
        self.token_pos = self.pos;
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    pub const fn is_whitespace(b: u8) -> bool {
        matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x00' | b'\x0c')
    }

    pub const fn is_delimiter(b: u8) -> bool {
        matches!(
            b,
            b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
        )
    }

    const fn is_keyword_end(b: u8) -> bool {
        Self::is_whitespace(b) || Self::is_delimiter(b)
    }

    /// Skips whitespace and comments.
    pub fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if b == b'%' {
                let start = self.pos;
                self.pos += 1;
                let end = self.data[self.pos..]
                    .iter()
                    .position(|&c| c == b'\r' || c == b'\n')
                    .map_or(self.data.len(), |off| self.pos + off);
                if let Some(comments) = self.comments.as_mut() {
                    comments.push((start, self.data[start + 1..end].to_vec()));
                }
                self.pos = end;
                continue;
            }
            if !Self::is_whitespace(b) {
                return;
            }
            self.pos += 1;
        }
    }

    /// Skips the single end-of-line marker that follows a `stream` keyword.
    pub fn skip_stream_eol(&mut self) {
        match self.peek() {
            Some(b'\r') => {
                self.pos += 1;
                if self.peek() == Some(b'\n') {
                    self.pos += 1;
                }
            }
            Some(b'\n') => self.pos += 1,
            // Some writers put spaces before the newline.
            Some(b' ') => {
                let rest = &self.data[self.pos..];
                let spaces = rest.iter().take_while(|&&b| b == b' ').count();
                if matches!(rest.get(spaces), Some(b'\r' | b'\n')) {
                    self.pos += spaces;
                    self.skip_stream_eol();
                }
            }
            _ => {}
        }
    }

    /// Offset of the next occurrence of `needle` at or after `from`.
    pub fn find(&self, needle: &[u8], from: usize) -> Option<usize> {
        if from >= self.data.len() || needle.is_empty() {
            return None;
        }
        self.data[from..]
            .windows(needle.len())
            .position(|w| w == needle)
            .map(|off| from + off)
    }

    /// Parses a name (`/Name`) with `#XX` escapes.
    fn parse_name(&mut self) -> Token {
        self.advance();
        let mut name = Vec::new();
        while let Some(b) = self.peek() {
            if Self::is_keyword_end(b) {
                break;
            }
            if b == b'#'
                && let (Some(h), Some(l)) = (
                    self.peek_at(1).and_then(hex_value),
                    self.peek_at(2).and_then(hex_value),
                )
            {
                name.push((h << 4) | l);
                self.pos += 3;
                continue;
            }
            name.push(b);
            self.pos += 1;
        }
        Token::Name(Name::new(&latin1(&name)))
    }

    /// Parses a number. A `.` anywhere makes it real, otherwise integer.
    fn parse_number(&mut self) -> Token {
        let start = self.pos;
        let mut has_dot = false;
        if matches!(self.peek(), Some(b'+' | b'-')) {
            self.pos += 1;
            // Doubled signs ("--5") are seen in the wild; only the first counts.
            while matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
        }
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.pos += 1;
            } else if b == b'.' && !has_dot {
                has_dot = true;
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = &self.data[start..self.pos];
        let negative = text.first() == Some(&b'-');
        let digits: String = text
            .iter()
            .filter(|&&b| b != b'+' && b != b'-')
            .map(|&b| b as char)
            .collect();

        let magnitude = if has_dot {
            let digits = if digits == "." { "0".to_string() } else { digits };
            Token::Real(digits.parse().unwrap_or(0.0))
        } else {
            match digits.parse::<i64>() {
                Ok(n) => Token::Int(n),
                Err(_) if !digits.is_empty() => Token::Real(digits.parse().unwrap_or(0.0)),
                Err(_) => Token::Int(0),
            }
        };
        match (magnitude, negative) {
            (Token::Int(n), true) => Token::Int(-n),
            (Token::Real(n), true) => Token::Real(-n),
            (t, _) => t,
        }
    }

    /// Parses a literal string `( ... )`.
    fn parse_string(&mut self) -> Token {
        self.advance();
        let mut result = Vec::new();
        let mut depth = 1usize;
        while let Some(c) = self.advance() {
            match c {
                b'(' => {
                    depth += 1;
                    result.push(c);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    result.push(c);
                }
                b'\\' => match self.advance() {
                    Some(b'n') => result.push(b'\n'),
                    Some(b'r') => result.push(b'\r'),
                    Some(b't') => result.push(b'\t'),
                    Some(b'b') => result.push(0x08),
                    Some(b'f') => result.push(0x0c),
                    Some(b'\r') => {
                        if self.peek() == Some(b'\n') {
                            self.pos += 1;
                        }
                    }
                    Some(b'\n') => {}
                    Some(d @ b'0'..=b'7') => {
                        let mut octal = u32::from(d - b'0');
                        for _ in 0..2 {
                            match self.peek() {
                                Some(d @ b'0'..=b'7') => {
                                    self.pos += 1;
                                    octal = octal * 8 + u32::from(d - b'0');
                                }
                                _ => break,
                            }
                        }
                        result.push((octal & 0xFF) as u8);
                    }
                    Some(other) => result.push(other),
                    None => break,
                },
                _ => result.push(c),
            }
        }
        Token::String(result)
    }

    /// Parses a hex string `< ... >`. Non-hex characters are dropped and an
    /// odd digit count is padded with a trailing zero nibble.
    fn parse_hex_string(&mut self) -> Token {
        self.advance();
        let mut result = Vec::new();
        let mut pending: Option<u8> = None;
        while let Some(c) = self.advance() {
            if c == b'>' {
                break;
            }
            let Some(nibble) = hex_value(c) else {
                continue;
            };
            match pending.take() {
                Some(high) => result.push((high << 4) | nibble),
                None => pending = Some(nibble),
            }
        }
        if let Some(high) = pending {
            result.push(high << 4);
        }
        Token::String(result)
    }

    fn parse_keyword(&mut self) -> Token {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if Self::is_keyword_end(b) {
                break;
            }
            self.pos += 1;
        }
        match &self.data[start..self.pos] {
            b"true" => Token::Bool(true),
            b"false" => Token::Bool(false),
            bytes => Token::Keyword(Keyword::from_bytes(bytes)),
        }
    }

    /// Returns the next token and its start offset, or `None` at end of data.
    pub fn next_token(&mut self) -> Option<(usize, Token)> {
        self.skip_whitespace();
        let b = self.peek()?;
        self.token_pos = self.pos;

        let token = match b {
            b'/' => self.parse_name(),
            b'(' => self.parse_string(),
            b'<' if self.peek_at(1) == Some(b'<') => {
                self.pos += 2;
                Token::Keyword(Keyword::DictStart)
            }
            b'<' => self.parse_hex_string(),
            b'>' if self.peek_at(1) == Some(b'>') => {
                self.pos += 2;
                Token::Keyword(Keyword::DictEnd)
            }
            b'[' => {
                self.pos += 1;
                Token::Keyword(Keyword::ArrayStart)
            }
            b']' => {
                self.pos += 1;
                Token::Keyword(Keyword::ArrayEnd)
            }
            b'{' => {
                self.pos += 1;
                Token::Keyword(Keyword::BraceOpen)
            }
            b'}' => {
                self.pos += 1;
                Token::Keyword(Keyword::BraceClose)
            }
            b'+' | b'-' | b'.' => {
                let next = self.data[self.pos + 1..]
                    .iter()
                    .find(|&&c| c != b'+' && c != b'-')
                    .copied();
                if matches!(next, Some(c) if c.is_ascii_digit() || (c == b'.' && b != b'.')) {
                    self.parse_number()
                } else {
                    self.parse_keyword()
                }
            }
            c if c.is_ascii_digit() => self.parse_number(),
            // Lone ')' or '>' cannot start a keyword; consume one byte.
            b')' | b'>' => {
                self.pos += 1;
                Token::Keyword(Keyword::Cmd(Cmd::new(&(b as char).to_string())))
            }
            _ => self.parse_keyword(),
        };

        Some((self.token_pos, token))
    }
}

impl Iterator for Lexer {
    type Item = (usize, Token);

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

const fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Bytes to a string, one char per byte.
pub(crate) fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &'static [u8]) -> Vec<Token> {
        Lexer::new(Bytes::from_static(input)).map(|(_, t)| t).collect()
    }

    #[test]
    fn test_numbers_int_vs_real() {
        assert_eq!(tokens(b"42"), [Token::Int(42)]);
        assert_eq!(tokens(b"3.14"), [Token::Real(3.14)]);
        assert_eq!(tokens(b"-.5 +7 4."), [
            Token::Real(-0.5),
            Token::Int(7),
            Token::Real(4.0)
        ]);
    }

    #[test]
    fn test_doubled_sign() {
        assert_eq!(tokens(b"--5"), [Token::Int(-5)]);
    }

    #[test]
    fn test_name_hex_escape() {
        assert_eq!(tokens(b"/A#20B"), [Token::Name(Name::new("A B"))]);
        // An invalid escape keeps the '#'.
        assert_eq!(tokens(b"/A#zz"), [Token::Name(Name::new("A#zz"))]);
    }

    #[test]
    fn test_literal_string_escapes() {
        assert_eq!(tokens(b"(a\\n\\101(b)\\\nc)"), [Token::String(
            b"a\nA(b)c".to_vec()
        )]);
    }

    #[test]
    fn test_unterminated_string_is_not_an_error() {
        assert_eq!(tokens(b"(abc"), [Token::String(b"abc".to_vec())]);
    }

    #[test]
    fn test_hex_string_padding_and_junk() {
        assert_eq!(tokens(b"<48656C6C6F>"), [Token::String(b"Hello".to_vec())]);
        assert_eq!(tokens(b"<7>"), [Token::String(vec![0x70])]);
        assert_eq!(tokens(b"<4 8zz6>"), [Token::String(vec![0x48, 0x60])]);
    }

    #[test]
    fn test_delimiters_and_keywords() {
        let toks = tokens(b"<< /K [1 2 R] >> obj true null BT");
        assert_eq!(toks[0], Token::Keyword(Keyword::DictStart));
        assert_eq!(toks[2], Token::Keyword(Keyword::ArrayStart));
        assert_eq!(toks[5], Token::Keyword(Keyword::R));
        assert_eq!(toks[8], Token::Keyword(Keyword::Obj));
        assert_eq!(toks[9], Token::Bool(true));
        assert_eq!(toks[10], Token::Keyword(Keyword::Null));
        assert!(matches!(toks[11], Token::Keyword(k) if k.is_cmd("BT")));
    }

    #[test]
    fn test_comments_are_side_reported() {
        let mut lx = Lexer::new(Bytes::from_static(b"%PDF-1.7\n1 % note\n2"));
        lx.record_comments();
        let toks: Vec<_> = lx.by_ref().map(|(_, t)| t).collect();
        assert_eq!(toks, [Token::Int(1), Token::Int(2)]);
        let comments = lx.take_comments();
        assert_eq!(comments[0], (0, b"PDF-1.7".to_vec()));
        assert_eq!(comments[1].1, b" note".to_vec());
    }

    #[test]
    fn test_token_positions() {
        let mut lx = Lexer::new(Bytes::from_static(b"  /Foo 12"));
        assert_eq!(lx.next_token().map(|(p, _)| p), Some(2));
        assert_eq!(lx.next_token().map(|(p, _)| p), Some(7));
        assert_eq!(lx.next_token(), None);
    }
}
