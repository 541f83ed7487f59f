//! Content stream parser.
//!
//! Splits a content stream into operands and operators. Arrays and
//! dictionaries are composed here; inline images (`BI ... ID data EI`) are
//! returned whole, with abbreviated keys and names expanded, because their
//! binary data must never be tokenized.

use super::operators::OperandBuffer;
use crate::codec::canonical_filter;
use crate::model::objects::{Cmd, Dict, Name, PDFObject};
use crate::parser::lexer::{Keyword, Lexer, Token};
use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

/// Arrays and dictionaries nested deeper than this are truncated.
const MAX_NESTING: usize = 64;

/// What the parser stopped at.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentItem {
    /// An operator; its operands are in the buffer passed to `read`.
    Operator(Cmd),
    InlineImage { dict: Dict, data: Bytes },
}

#[derive(Debug)]
pub struct ContentParser {
    lexer: Lexer,
}

fn expand_key(key: &str) -> &str {
    match key {
        "BPC" => "BitsPerComponent",
        "CS" => "ColorSpace",
        "D" => "Decode",
        "DP" => "DecodeParms",
        "F" => "Filter",
        "H" => "Height",
        "W" => "Width",
        "IM" => "ImageMask",
        "I" => "Interpolate",
        "L" => "Length",
        other => other,
    }
}

fn expand_color_space(name: &str) -> &str {
    match name {
        "G" => "DeviceGray",
        "RGB" => "DeviceRGB",
        "CMYK" => "DeviceCMYK",
        "I" => "Indexed",
        other => other,
    }
}

/// Expands abbreviated names inside an inline image value.
fn expand_value(key: &str, value: PDFObject) -> PDFObject {
    let expand = |obj: PDFObject| match obj {
        PDFObject::Name(n) => PDFObject::Name(match key {
            "Filter" => Name::new(canonical_filter(n.as_str())),
            "ColorSpace" => Name::new(expand_color_space(n.as_str())),
            _ => n,
        }),
        other => other,
    };
    match value {
        PDFObject::Array(items) => PDFObject::Array(items.into_iter().map(expand).collect()),
        other => expand(other),
    }
}

impl ContentParser {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            lexer: Lexer::new(data),
        }
    }

    /// Parser over the concatenation of several content streams. Parts
    /// are joined with a newline so a token cannot span two streams.
    pub fn from_parts(parts: &[Bytes]) -> Self {
        match parts {
            [single] => Self::new(single.clone()),
            _ => {
                let mut joined = BytesMut::with_capacity(parts.iter().map(|p| p.len() + 1).sum());
                for part in parts {
                    joined.extend_from_slice(part);
                    joined.extend_from_slice(b"\n");
                }
                Self::new(joined.freeze())
            }
        }
    }

    /// Current byte offset.
    pub fn pos(&self) -> usize {
        self.lexer.tell()
    }

    /// Reads operands into `operands` up to the next operator or inline
    /// image. Returns `None` at the end of the stream; operands left over
    /// at that point stay in the buffer.
    pub fn read(&mut self, operands: &mut OperandBuffer) -> Option<ContentItem> {
        loop {
            let (pos, token) = self.lexer.next_token()?;
            match token {
                Token::Keyword(Keyword::Cmd(cmd)) if cmd.as_str() == "BI" => {
                    operands.clear();
                    match self.read_inline_image() {
                        Some(item) => return Some(item),
                        None => {
                            warn!(pos, "truncated inline image");
                            return None;
                        }
                    }
                }
                Token::Keyword(Keyword::Cmd(cmd)) => return Some(ContentItem::Operator(cmd)),
                // Structural keywords in a content stream are stray operators.
                Token::Keyword(
                    kw @ (Keyword::Obj
                    | Keyword::EndObj
                    | Keyword::R
                    | Keyword::Stream
                    | Keyword::EndStream
                    | Keyword::Xref
                    | Keyword::Trailer
                    | Keyword::StartXref),
                ) => return Some(ContentItem::Operator(Cmd::new(kw.as_str()))),
                other => {
                    if let Some(value) = self.compose(pos, other, 0) {
                        operands.push(value);
                    }
                }
            }
        }
    }

    /// Builds a value from `token`, reading nested arrays and dicts.
    fn compose(&mut self, pos: usize, token: Token, depth: usize) -> Option<PDFObject> {
        Some(match token {
            Token::Int(n) => PDFObject::Int(n),
            Token::Real(n) => PDFObject::Real(n),
            Token::Bool(b) => PDFObject::Bool(b),
            Token::Name(n) => PDFObject::Name(n),
            Token::String(s) => PDFObject::String(s),
            Token::Keyword(Keyword::Null) => PDFObject::Null,
            Token::Keyword(Keyword::ArrayStart) => PDFObject::Array(self.compose_array(depth + 1)),
            Token::Keyword(Keyword::DictStart) => PDFObject::Dict(self.compose_dict(depth + 1)),
            Token::Keyword(kw) => {
                debug!(pos, keyword = kw.as_str(), "stray token in content stream");
                return None;
            }
        })
    }

    fn compose_array(&mut self, depth: usize) -> Vec<PDFObject> {
        let mut items = Vec::new();
        while let Some((pos, token)) = self.lexer.next_token() {
            match token {
                Token::Keyword(Keyword::ArrayEnd) => break,
                _ if depth > MAX_NESTING => continue,
                token => items.extend(self.compose(pos, token, depth)),
            }
        }
        items
    }

    fn compose_dict(&mut self, depth: usize) -> Dict {
        let mut dict = Dict::new();
        let mut key: Option<Name> = None;
        while let Some((pos, token)) = self.lexer.next_token() {
            if token == Token::Keyword(Keyword::DictEnd) {
                break;
            }
            match (key.take(), token) {
                (None, Token::Name(name)) => key = Some(name),
                (None, other) => debug!(pos, token = ?other, "non-name dictionary key in content stream"),
                (Some(k), token) => {
                    if let Some(value) = self.compose(pos, token, depth) {
                        dict.insert(k, value);
                    }
                }
            }
        }
        dict
    }

    /// Reads the image dictionary after `BI`, then the data after `ID`.
    fn read_inline_image(&mut self) -> Option<ContentItem> {
        let mut dict = Dict::new();
        loop {
            let (pos, token) = self.lexer.next_token()?;
            match token {
                Token::Keyword(kw) if kw.is_cmd("ID") => break,
                Token::Name(key) => {
                    let (vpos, vtok) = self.lexer.next_token()?;
                    if let Some(value) = self.compose(vpos, vtok, 0) {
                        let key = expand_key(key.as_str());
                        dict.insert(key, expand_value(key, value));
                    }
                }
                other => debug!(pos, token = ?other, "unexpected token in inline image dictionary"),
            }
        }

        // A single whitespace byte separates `ID` from the data.
        let data = self.lexer.data().clone();
        let mut start = self.lexer.tell();
        if data.get(start).is_some_and(|&b| Lexer::is_whitespace(b)) {
            start += 1;
        }
        let (end, resume) = self.find_inline_end(&dict, start);
        self.lexer.set_pos(resume);
        Some(ContentItem::InlineImage {
            data: data.slice(start..end),
            dict,
        })
    }

    /// Returns `(end of data, position after EI)`.
    fn find_inline_end(&self, dict: &Dict, start: usize) -> (usize, usize) {
        let data = self.lexer.data();
        if let Some(len) = dict.get("Length").and_then(|l| l.as_int().ok())
            && let Ok(len) = usize::try_from(len)
            && start + len <= data.len()
        {
            let end = start + len;
            let after = self.lexer.find(b"EI", end).map_or(data.len(), |at| at + 2);
            return (end, after);
        }

        let is_a85 = match dict.get("Filter") {
            Some(PDFObject::Name(n)) => *n == "ASCII85Decode",
            Some(PDFObject::Array(items)) => items.first().is_some_and(|f| f.is_name("ASCII85Decode")),
            _ => false,
        };
        if is_a85 && let Some(at) = self.lexer.find(b"~>", start) {
            let end = at + 2;
            let after = self.lexer.find(b"EI", end).map_or(data.len(), |at| at + 2);
            return (end, after);
        }

        let mut search = start;
        while let Some(at) = self.lexer.find(b"EI", search) {
            let before_ok = at == start || Lexer::is_whitespace(data[at - 1]);
            let after_ok = data.get(at + 2).is_none_or(|&b| Lexer::is_whitespace(b));
            // Image bytes can spell `EI`; real content follows with text.
            let tail_ok = data[at + 2..]
                .iter()
                .take(10)
                .all(|&b| b == b'\t' || b == b'\n' || b == b'\r' || (0x20..0x7F).contains(&b));
            if before_ok && after_ok && tail_ok {
                let end = if at > start { at - 1 } else { at };
                return (end, at + 2);
            }
            search = at + 2;
        }
        (data.len(), data.len())
    }
}
