//! CMaps: embedded encoding CMaps of composite fonts and ToUnicode maps.
//!
//! Both kinds share one parser. Codespace ranges decide how many bytes
//! make up a code; `cidchar`/`cidrange` map codes to CIDs and
//! `bfchar`/`bfrange` map codes to Unicode.

use super::encoding::name_to_unicode;
use crate::parser::lexer::{Keyword, Lexer, Token};
use bytes::Bytes;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CodespaceRange {
    len: usize,
    low: u32,
    high: u32,
}

#[derive(Debug, Clone, PartialEq)]
struct CidRange {
    low: u32,
    high: u32,
    cid: u32,
}

/// `bfrange` entry whose destination increments with the code.
#[derive(Debug, Clone, PartialEq)]
struct UnicodeRange {
    low: u32,
    high: u32,
    dst: Vec<u8>,
}

/// Operand collected while reading CMap tokens.
#[derive(Debug, Clone)]
enum Operand {
    Int(i64),
    Str(Vec<u8>),
    Name(String),
    Array(Vec<Operand>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CMap {
    name: Option<String>,
    vertical: bool,
    /// Two-byte codes that are their own CIDs (`Identity-H`/`Identity-V`).
    identity: bool,
    codespace: Vec<CodespaceRange>,
    cid_map: FxHashMap<u32, u32>,
    cid_ranges: Vec<CidRange>,
    unicode_map: FxHashMap<u32, String>,
    unicode_ranges: Vec<UnicodeRange>,
}

fn be_value(bytes: &[u8]) -> u32 {
    bytes.iter().take(4).fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
}

/// Decodes a `bfchar` destination: UTF-16BE, or a single byte code point.
fn decode_destination(dst: &[u8]) -> String {
    if dst.len() < 2 {
        return dst.iter().map(|&b| char::from(b)).collect();
    }
    let units: Vec<u16> = dst
        .chunks(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Adds `offset` to the last byte group of a destination, carrying left.
fn increment_destination(dst: &[u8], offset: u32) -> Vec<u8> {
    let mut out = dst.to_vec();
    let mut carry = offset;
    for byte in out.iter_mut().rev() {
        if carry == 0 {
            break;
        }
        let sum = u32::from(*byte) + (carry & 0xFF);
        *byte = sum as u8;
        carry = (carry >> 8) + (sum >> 8);
    }
    out
}

impl CMap {
    /// The predefined `Identity-H` (or `Identity-V`) CMap.
    pub fn identity(vertical: bool) -> Self {
        Self {
            name: Some(if vertical { "Identity-V" } else { "Identity-H" }.to_string()),
            vertical,
            identity: true,
            codespace: vec![CodespaceRange {
                len: 2,
                low: 0,
                high: 0xFFFF,
            }],
            ..Self::default()
        }
    }

    /// Parses CMap program text. Unknown operators and malformed entries
    /// are skipped.
    pub fn parse(data: &[u8]) -> Self {
        let mut cmap = Self::default();
        let mut stack: Vec<Operand> = Vec::new();
        let mut arrays: Vec<Vec<Operand>> = Vec::new();
        let mut lexer = Lexer::new(Bytes::copy_from_slice(data));

        while let Some((_, token)) = lexer.next_token() {
            let operand = match token {
                Token::Int(n) => Operand::Int(n),
                Token::Real(n) => Operand::Int(n as i64),
                Token::String(s) => Operand::Str(s),
                Token::Name(n) => Operand::Name(n.as_str().to_string()),
                Token::Bool(_) => continue,
                Token::Keyword(Keyword::ArrayStart) => {
                    arrays.push(Vec::new());
                    continue;
                }
                Token::Keyword(Keyword::ArrayEnd) => match arrays.pop() {
                    Some(items) => Operand::Array(items),
                    None => continue,
                },
                Token::Keyword(kw) => {
                    arrays.clear();
                    cmap.apply_operator(kw.as_str(), &mut stack);
                    continue;
                }
            };
            match arrays.last_mut() {
                Some(array) => array.push(operand),
                None => stack.push(operand),
            }
        }
        cmap
    }

    fn apply_operator(&mut self, op: &str, stack: &mut Vec<Operand>) {
        match op {
            "endcodespacerange" => {
                for pair in stack.chunks_exact(2) {
                    if let [Operand::Str(lo), Operand::Str(hi)] = pair
                        && !lo.is_empty()
                    {
                        self.codespace.push(CodespaceRange {
                            len: lo.len().min(4),
                            low: be_value(lo),
                            high: be_value(hi),
                        });
                    }
                }
            }
            "endcidchar" => {
                for pair in stack.chunks_exact(2) {
                    if let [Operand::Str(code), Operand::Int(cid)] = pair {
                        self.cid_map.insert(be_value(code), *cid as u32);
                    }
                }
            }
            "endcidrange" => {
                for triple in stack.chunks_exact(3) {
                    if let [Operand::Str(lo), Operand::Str(hi), Operand::Int(cid)] = triple {
                        self.cid_ranges.push(CidRange {
                            low: be_value(lo),
                            high: be_value(hi),
                            cid: *cid as u32,
                        });
                    }
                }
            }
            "endbfchar" => {
                for pair in stack.chunks_exact(2) {
                    match pair {
                        [Operand::Str(code), Operand::Str(dst)] => {
                            self.unicode_map.insert(be_value(code), decode_destination(dst));
                        }
                        [Operand::Str(code), Operand::Name(glyph)] => {
                            if let Some(text) = name_to_unicode(glyph) {
                                self.unicode_map.insert(be_value(code), text);
                            }
                        }
                        _ => debug!("skipping malformed bfchar entry"),
                    }
                }
            }
            "endbfrange" => {
                for triple in stack.chunks_exact(3) {
                    let [Operand::Str(lo), Operand::Str(hi), dst] = triple else {
                        debug!("skipping malformed bfrange entry");
                        continue;
                    };
                    let (low, high) = (be_value(lo), be_value(hi));
                    match dst {
                        Operand::Str(dst) => self.unicode_ranges.push(UnicodeRange {
                            low,
                            high,
                            dst: dst.clone(),
                        }),
                        Operand::Array(items) => {
                            for (code, item) in (low..=high).zip(items) {
                                if let Operand::Str(dst) = item {
                                    self.unicode_map.insert(code, decode_destination(dst));
                                }
                            }
                        }
                        _ => debug!("skipping malformed bfrange destination"),
                    }
                }
            }
            "def" => {
                if let [.., Operand::Name(key), value] = stack.as_slice() {
                    match (key.as_str(), value) {
                        ("WMode", Operand::Int(mode)) => self.vertical = *mode == 1,
                        ("CMapName", Operand::Name(name)) => self.name = Some(name.clone()),
                        _ => {}
                    }
                }
            }
            "usecmap" => {
                if let Some(Operand::Name(parent)) = stack.last() {
                    warn!(%parent, "usecmap of a predefined CMap is not supported");
                }
            }
            _ => {}
        }
        stack.clear();
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_vertical(&self) -> bool {
        self.vertical
    }

    pub fn is_identity(&self) -> bool {
        self.identity
    }

    pub fn has_unicode(&self) -> bool {
        !self.unicode_map.is_empty() || !self.unicode_ranges.is_empty()
    }

    /// Reads one character code at `pos`; returns `(code, byte length)`.
    ///
    /// Codes are matched against the codespace ranges one byte length at a
    /// time. Without a match a single byte is consumed.
    pub fn read_code(&self, data: &[u8], pos: usize) -> (u32, usize) {
        if self.codespace.is_empty() {
            let len = if self.identity { 2 } else { 1 };
            let end = (pos + len).min(data.len());
            return (be_value(&data[pos..end]), end - pos);
        }
        let mut code: u32 = 0;
        for n in 1..=4 {
            let Some(&byte) = data.get(pos + n - 1) else {
                break;
            };
            code = (code << 8) | u32::from(byte);
            if self
                .codespace
                .iter()
                .any(|r| r.len == n && r.low <= code && code <= r.high)
            {
                return (code, n);
            }
        }
        (data.get(pos).map_or(0, |&b| u32::from(b)), 1)
    }

    /// CID of `code`; unmapped codes map to CID 0.
    pub fn lookup_cid(&self, code: u32) -> u32 {
        if self.identity {
            return code;
        }
        if let Some(&cid) = self.cid_map.get(&code) {
            return cid;
        }
        self.cid_ranges
            .iter()
            .find(|r| r.low <= code && code <= r.high)
            .map_or(0, |r| r.cid + (code - r.low))
    }

    pub fn lookup_unicode(&self, code: u32) -> Option<String> {
        if let Some(text) = self.unicode_map.get(&code) {
            return Some(text.clone());
        }
        self.unicode_ranges
            .iter()
            .find(|r| r.low <= code && code <= r.high)
            .map(|r| decode_destination(&increment_destination(&r.dst, code - r.low)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TO_UNICODE: &[u8] = b"/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
/CMapName /Adobe-Identity-UCS def
/CMapType 2 def
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
2 beginbfchar
<0003> <0020>
<0011> <D83DDE00>
endbfchar
2 beginbfrange
<0024> <0026> <0041>
<0030> <0031> [<0066006C> <00E9>]
endbfrange
endcmap
CMapName currentdict /CMap defineresource pop
end
end";

    #[test]
    fn test_bfchar_and_bfrange() {
        let cmap = CMap::parse(TO_UNICODE);
        assert_eq!(cmap.name(), Some("Adobe-Identity-UCS"));
        assert_eq!(cmap.lookup_unicode(3).as_deref(), Some(" "));
        assert_eq!(cmap.lookup_unicode(0x11).as_deref(), Some("\u{1F600}"));
        assert_eq!(cmap.lookup_unicode(0x26).as_deref(), Some("C"));
        assert_eq!(cmap.lookup_unicode(0x30).as_deref(), Some("fl"));
        assert_eq!(cmap.lookup_unicode(0x31).as_deref(), Some("é"));
        assert_eq!(cmap.lookup_unicode(0x27), None);
    }

    #[test]
    fn test_codespace_decides_code_length() {
        let cmap = CMap::parse(
            b"2 begincodespacerange <00> <80> <8140> <9FFC> endcodespacerange
              1 begincidrange <8140> <817E> 633 endcidrange
              1 begincidchar <41> 34 endcidchar",
        );
        let data = [0x41, 0x81, 0x41];
        assert_eq!(cmap.read_code(&data, 0), (0x41, 1));
        assert_eq!(cmap.read_code(&data, 1), (0x8141, 2));
        assert_eq!(cmap.lookup_cid(0x41), 34);
        assert_eq!(cmap.lookup_cid(0x8141), 634);
        assert_eq!(cmap.lookup_cid(0x20), 0);
        // 0xA0 is outside every range: consume one byte.
        assert_eq!(cmap.read_code(&[0xA0, 0x00], 0), (0xA0, 1));
    }

    #[test]
    fn test_identity_and_wmode() {
        let id = CMap::identity(true);
        assert_eq!(id.read_code(&[0x01, 0x02, 0x03], 0), (0x0102, 2));
        assert_eq!(id.read_code(&[0x01, 0x02, 0x03], 2), (0x03, 1));
        assert_eq!(id.lookup_cid(0x0102), 0x0102);
        assert!(id.is_vertical());
        assert!(CMap::parse(b"/WMode 1 def").is_vertical());
    }

    #[test]
    fn test_increment_carries() {
        assert_eq!(increment_destination(&[0x00, 0xFF], 1), vec![0x01, 0x00]);
    }
}
