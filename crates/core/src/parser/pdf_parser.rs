//! PDF object parser - composes lexer tokens into objects.
//!
//! Recursive descent over the token stream. Two details matter:
//!
//! * `num gen R` is recognized by buffering the two integers until the
//!   third token decides between a reference and plain numbers.
//! * A dictionary closed inside a top-level indirect object and followed by
//!   `stream` takes the next `Length` bytes verbatim; the body is never
//!   tokenized.

use crate::error::{PdfError, Result};
use crate::model::objects::{Dict, Name, ObjRef, PDFObject, PDFStream};
use crate::parser::lexer::{Keyword, Lexer, Token};
use bytes::Bytes;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Resolves an indirect `/Length` while a stream is being read.
pub type LengthResolver<'a> = &'a dyn Fn(ObjRef) -> Option<i64>;

/// PDF Parser - parses PDF object syntax.
pub struct PDFParser<'a> {
    lexer: Lexer,
    /// Tokens read ahead while checking for `num gen R`.
    lookahead: VecDeque<(usize, Token)>,
    recovery: bool,
    resolve_length: Option<LengthResolver<'a>>,
}

impl<'a> PDFParser<'a> {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            lexer: Lexer::new(data),
            lookahead: VecDeque::new(),
            recovery: false,
            resolve_length: None,
        }
    }

    /// Substitute placeholders for malformed structure instead of failing.
    pub fn with_recovery(mut self, recovery: bool) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_length_resolver(mut self, resolver: LengthResolver<'a>) -> Self {
        self.resolve_length = Some(resolver);
        self
    }

    /// Moves the parser to `pos`, dropping any lookahead.
    pub fn seek(&mut self, pos: usize) {
        self.lookahead.clear();
        self.lexer.set_pos(pos);
    }

    /// Byte position of the next unread token.
    pub fn tell(&self) -> usize {
        self.lookahead
            .front()
            .map_or_else(|| self.lexer.tell(), |(pos, _)| *pos)
    }

    pub fn lexer(&self) -> &Lexer {
        &self.lexer
    }

    /// Next token (from lookahead or lexer).
    pub fn next_token(&mut self) -> Option<(usize, Token)> {
        self.lookahead
            .pop_front()
            .or_else(|| self.lexer.next_token())
    }

    fn push_front(&mut self, tok: (usize, Token)) {
        self.lookahead.push_front(tok);
    }

    /// Parses the next object. `objref` marks a top-level indirect object,
    /// which is the only place a stream body may follow a dictionary.
    pub fn get_obj(&mut self, objref: Option<ObjRef>) -> Result<PDFObject> {
        let (pos, token) = self.next_token().ok_or(PdfError::UnexpectedEof)?;
        self.token_to_object(pos, token, objref)
    }

    /// Parses `num gen obj <value> [endobj]`.
    pub fn parse_indirect(&mut self) -> Result<(ObjRef, PDFObject)> {
        let num = self.expect_int()?;
        let generation = self.expect_int()?;
        match self.next_token() {
            Some((_, Token::Keyword(Keyword::Obj))) => {}
            Some((pos, tok)) => {
                return Err(PdfError::SyntaxError(format!(
                    "expected 'obj' at {pos}, found {tok:?}"
                )));
            }
            None => return Err(PdfError::UnexpectedEof),
        }
        let objref = ObjRef::new(
            u32::try_from(num).map_err(|_| PdfError::SyntaxError(format!("bad object number {num}")))?,
            u16::try_from(generation).unwrap_or(0),
        );
        let obj = self.get_obj(Some(objref))?;
        if let Some((pos, tok)) = self.next_token()
            && tok != Token::Keyword(Keyword::EndObj)
        {
            debug!(%objref, pos, "missing endobj");
            self.push_front((pos, tok));
        }
        Ok((objref, obj))
    }

    fn expect_int(&mut self) -> Result<i64> {
        match self.next_token() {
            Some((_, Token::Int(n))) => Ok(n),
            Some((pos, tok)) => Err(PdfError::TokenError {
                pos,
                msg: format!("expected integer, found {tok:?}"),
            }),
            None => Err(PdfError::UnexpectedEof),
        }
    }

    fn token_to_object(
        &mut self,
        pos: usize,
        token: Token,
        objref: Option<ObjRef>,
    ) -> Result<PDFObject> {
        match token {
            Token::Int(n) => Ok(self.maybe_ref(n)),
            Token::Real(n) => Ok(PDFObject::Real(n)),
            Token::Bool(b) => Ok(PDFObject::Bool(b)),
            Token::Name(n) => Ok(PDFObject::Name(n)),
            Token::String(s) => Ok(PDFObject::String(s)),
            Token::Keyword(Keyword::Null) => Ok(PDFObject::Null),
            Token::Keyword(Keyword::ArrayStart) => self.parse_array(),
            Token::Keyword(Keyword::DictStart) => {
                let dict = self.parse_dict()?;
                match objref {
                    Some(r) if self.at_stream_keyword() => Ok(PDFObject::Stream(Box::new(
                        self.make_stream(dict, r)?,
                    ))),
                    _ => Ok(PDFObject::Dict(dict)),
                }
            }
            Token::Keyword(kw) => {
                if self.recovery {
                    warn!(pos, keyword = kw.as_str(), "unexpected keyword in object, using null");
                    Ok(PDFObject::Null)
                } else {
                    Err(PdfError::TokenError {
                        pos,
                        msg: format!("unexpected keyword: {}", kw.as_str()),
                    })
                }
            }
        }
    }

    /// Collapses `n g R` into a reference; otherwise pushes the lookahead back.
    fn maybe_ref(&mut self, n: i64) -> PDFObject {
        let Some(tok2) = self.next_token() else {
            return PDFObject::Int(n);
        };
        if let (_, Token::Int(g)) = tok2 {
            if let Some(tok3) = self.next_token() {
                if tok3.1 == Token::Keyword(Keyword::R)
                    && let (Ok(num), Ok(generation)) = (u32::try_from(n), u16::try_from(g))
                {
                    return PDFObject::Ref(ObjRef::new(num, generation));
                }
                self.push_front(tok3);
            }
        }
        self.push_front(tok2);
        PDFObject::Int(n)
    }

    /// Parses array contents until `]`.
    fn parse_array(&mut self) -> Result<PDFObject> {
        let mut arr = Vec::new();
        loop {
            let Some((pos, token)) = self.next_token() else {
                if self.recovery {
                    debug!("array truncated at end of data");
                    return Ok(PDFObject::Array(arr));
                }
                return Err(PdfError::UnexpectedEof);
            };
            if token == Token::Keyword(Keyword::ArrayEnd) {
                return Ok(PDFObject::Array(arr));
            }
            if self.recovery && matches!(token, Token::Keyword(Keyword::EndObj | Keyword::DictEnd)) {
                self.push_front((pos, token));
                return Ok(PDFObject::Array(arr));
            }
            arr.push(self.token_to_object(pos, token, None)?);
        }
    }

    /// Parses dictionary contents until `>>`.
    fn parse_dict(&mut self) -> Result<Dict> {
        let mut dict = Dict::new();
        loop {
            let Some((pos, token)) = self.next_token() else {
                if self.recovery {
                    debug!("dictionary truncated at end of data");
                    return Ok(dict);
                }
                return Err(PdfError::UnexpectedEof);
            };
            let key = match token {
                Token::Keyword(Keyword::DictEnd) => return Ok(dict),
                Token::Name(name) => name,
                Token::Keyword(Keyword::EndObj) if self.recovery => {
                    self.push_front((pos, token));
                    return Ok(dict);
                }
                other => {
                    if !self.recovery {
                        return Err(PdfError::TokenError {
                            pos,
                            msg: format!("expected name as dict key, found {other:?}"),
                        });
                    }
                    debug!(pos, "malformed dictionary key, using /invalid");
                    Name::new("invalid")
                }
            };
            let value = match self.next_token() {
                Some((_, Token::Keyword(Keyword::DictEnd))) if self.recovery => {
                    dict.insert(key, PDFObject::Null);
                    return Ok(dict);
                }
                Some((vpos, vtok)) => self.token_to_object(vpos, vtok, None)?,
                None if self.recovery => PDFObject::Null,
                None => return Err(PdfError::UnexpectedEof),
            };
            dict.insert(key, value);
        }
    }

    /// Consumes a following `stream` keyword if present. The lexer is
    /// rewound otherwise, so the next token is read again normally.
    fn at_stream_keyword(&mut self) -> bool {
        if !self.lookahead.is_empty() {
            return false;
        }
        let save = self.lexer.tell();
        match self.lexer.next_token() {
            Some((_, Token::Keyword(Keyword::Stream))) => true,
            _ => {
                self.lexer.set_pos(save);
                false
            }
        }
    }

    /// Reads the stream body that starts right after the `stream` keyword.
    fn make_stream(&mut self, dict: Dict, objref: ObjRef) -> Result<PDFStream> {
        self.lexer.skip_stream_eol();
        let start = self.lexer.tell();
        let total = self.lexer.len();

        let declared = match dict.get("Length") {
            Some(PDFObject::Int(n)) => Some(*n),
            Some(PDFObject::Ref(r)) => self.resolve_length.and_then(|f| f(*r)),
            _ => None,
        };

        let end = match declared.and_then(|n| usize::try_from(n).ok()) {
            Some(len) if start + len <= total && self.endstream_follows(start + len) => start + len,
            other => {
                // Missing or wrong Length: fall back to scanning for the keyword.
                match self.lexer.find(b"endstream", start) {
                    Some(mut at) => {
                        if other.is_some() {
                            warn!(%objref, "stream Length does not match data, scanning for endstream");
                        }
                        if at > start && self.lexer.data()[at - 1] == b'\n' {
                            at -= 1;
                        }
                        if at > start && self.lexer.data()[at - 1] == b'\r' {
                            at -= 1;
                        }
                        at
                    }
                    None => match other {
                        Some(len) => (start + len).min(total),
                        None => {
                            return Err(PdfError::SyntaxError(format!(
                                "stream {objref} has no Length and no endstream"
                            )));
                        }
                    },
                }
            }
        };

        let raw = self.lexer.data().slice(start..end);
        self.lexer.set_pos(end);
        match self.lexer.next_token() {
            Some((_, Token::Keyword(Keyword::EndStream))) | None => {}
            Some(tok) => {
                debug!(%objref, "endstream missing after stream data");
                self.push_front(tok);
            }
        }
        Ok(PDFStream::new(dict, raw).with_ref(objref))
    }

    /// True when `endstream` follows `pos` after optional whitespace.
    fn endstream_follows(&self, pos: usize) -> bool {
        let data = self.lexer.data();
        let rest = &data[pos.min(data.len())..];
        let skip = rest.iter().take_while(|&&b| Lexer::is_whitespace(b)).count();
        rest[skip..].starts_with(b"endstream")
    }
}

/// Parses a single direct object from `data` (no streams, strict mode).
pub fn parse_object(data: impl Into<Bytes>) -> Result<PDFObject> {
    PDFParser::new(data).get_obj(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser(data: &'static [u8]) -> PDFParser<'static> {
        PDFParser::new(Bytes::from_static(data))
    }

    #[test]
    fn test_reference_lookahead() {
        let obj = parse_object(Bytes::from_static(b"[1 0 R 2 3 4]")).unwrap();
        assert_eq!(
            obj,
            PDFObject::Array(vec![
                PDFObject::Ref(ObjRef::new(1, 0)),
                PDFObject::Int(2),
                PDFObject::Int(3),
                PDFObject::Int(4),
            ])
        );
    }

    #[test]
    fn test_nested_dict() {
        let obj = parse_object(Bytes::from_static(b"<< /A << /B (x) >> /C [true null] >>")).unwrap();
        let d = obj.as_dict().unwrap();
        let inner = d.get("A").unwrap().as_dict().unwrap();
        assert_eq!(inner.get("B"), Some(&PDFObject::String(b"x".to_vec())));
        assert_eq!(
            d.get("C"),
            Some(&PDFObject::Array(vec![PDFObject::Bool(true), PDFObject::Null]))
        );
    }

    #[test]
    fn test_stream_body_is_not_tokenized() {
        let mut p = parser(b"5 0 obj\n<< /Length 12 >>\nstream\nendobj (((((\nendstream\nendobj\n6 0 obj 7 endobj");
        let (r, obj) = p.parse_indirect().unwrap();
        assert_eq!(r, ObjRef::new(5, 0));
        let stream = obj.as_stream().unwrap();
        assert_eq!(stream.raw(), b"endobj (((((");
        assert_eq!(stream.objref, Some(r));
        let (r2, obj2) = p.parse_indirect().unwrap();
        assert_eq!((r2, obj2), (ObjRef::new(6, 0), PDFObject::Int(7)));
    }

    #[test]
    fn test_dict_without_objref_is_not_a_stream() {
        let mut p = parser(b"<< /Length 3 >> stream\nabc\nendstream");
        let obj = p.get_obj(None).unwrap();
        assert!(matches!(obj, PDFObject::Dict(_)));
    }

    #[test]
    fn test_wrong_length_falls_back_to_endstream_scan() {
        let mut p = parser(b"1 0 obj << /Length 99 >> stream\r\nabc\r\nendstream endobj");
        let (_, obj) = p.parse_indirect().unwrap();
        assert_eq!(obj.as_stream().unwrap().raw(), b"abc");
    }

    #[test]
    fn test_indirect_length() {
        let resolver = |r: ObjRef| (r == ObjRef::new(9, 0)).then_some(2i64);
        let mut p = PDFParser::new(Bytes::from_static(b"1 0 obj << /Length 9 0 R >> stream\nxyendstream"))
            .with_length_resolver(&resolver);
        let (_, obj) = p.parse_indirect().unwrap();
        assert_eq!(obj.as_stream().unwrap().raw(), b"xy");
    }

    #[test]
    fn test_recovery_invalid_key_and_truncated_array() {
        assert!(parse_object(Bytes::from_static(b"<< 1 /V >>")).is_err());
        let mut p = parser(b"<< 1 /V >>").with_recovery(true);
        let d = p.get_obj(None).unwrap();
        assert_eq!(d.as_dict().unwrap().get("invalid"), Some(&PDFObject::Name(Name::new("V"))));

        let mut p = parser(b"[1 2").with_recovery(true);
        assert_eq!(
            p.get_obj(None).unwrap(),
            PDFObject::Array(vec![PDFObject::Int(1), PDFObject::Int(2)])
        );
        assert!(matches!(parse_object(Bytes::from_static(b"[1 2")), Err(PdfError::UnexpectedEof)));
    }
}
