//! Simple-font encodings and glyph-name to Unicode conversion.
//!
//! Glyph names follow the Adobe Glyph List conventions: `uniXXXX`
//! sequences, `uXXXX[XX]` code points, `_` ligature components and a
//! `.suffix` that is ignored.

use super::latin_enc::{LATIN_GLYPHS, LatinGlyph};
use crate::model::objects::{Name, PDFObject};
use rustc_hash::FxHashMap;
use std::sync::LazyLock;

/// Names outside the Latin set that show up in real-world Differences.
const EXTRA_GLYPHS: &[(&str, char)] = &[
    ("ff", '\u{fb00}'),
    ("ffi", '\u{fb03}'),
    ("ffl", '\u{fb04}'),
    ("nbspace", '\u{a0}'),
    ("nonbreakingspace", '\u{a0}'),
    ("sfthyphen", '\u{ad}'),
    ("softhyphen", '\u{ad}'),
    ("Delta", '\u{2206}'),
    ("Omega", '\u{2126}'),
    ("mu", '\u{b5}'),
    ("pi", '\u{3c0}'),
    ("summation", '\u{2211}'),
    ("product", '\u{220f}'),
    ("radical", '\u{221a}'),
    ("infinity", '\u{221e}'),
    ("integral", '\u{222b}'),
    ("approxequal", '\u{2248}'),
    ("notequal", '\u{2260}'),
    ("lessequal", '\u{2264}'),
    ("greaterequal", '\u{2265}'),
    ("partialdiff", '\u{2202}'),
    ("lozenge", '\u{25ca}'),
    ("apple", '\u{f8ff}'),
    ("arrowright", '\u{2192}'),
    ("arrowleft", '\u{2190}'),
    ("arrowup", '\u{2191}'),
    ("arrowdown", '\u{2193}'),
    ("checkmark", '\u{2713}'),
];

static GLYPH_TO_CHAR: LazyLock<FxHashMap<&'static str, char>> = LazyLock::new(|| {
    LATIN_GLYPHS
        .iter()
        .map(|&(name, ch, ..)| (name, ch))
        .chain(EXTRA_GLYPHS.iter().copied())
        .collect()
});

fn parse_hex(hex: &str) -> Option<u32> {
    (!hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()))
        .then(|| u32::from_str_radix(hex, 16).ok())
        .flatten()
}

fn decode_component(part: &str, out: &mut String) -> bool {
    if let Some(hex) = part.strip_prefix("uni")
        && hex.len() >= 4
        && hex.len() % 4 == 0
    {
        let mut decoded = String::new();
        for chunk in hex.as_bytes().chunks(4) {
            let Some(cp) = std::str::from_utf8(chunk).ok().and_then(parse_hex) else {
                return false;
            };
            match char::from_u32(cp) {
                Some(ch) => decoded.push(ch),
                None => return false,
            }
        }
        out.push_str(&decoded);
        return true;
    }
    if let Some(hex) = part.strip_prefix('u')
        && (4..=6).contains(&hex.len())
        && let Some(ch) = parse_hex(hex).and_then(char::from_u32)
    {
        out.push(ch);
        return true;
    }
    match GLYPH_TO_CHAR.get(part) {
        Some(&ch) => {
            out.push(ch);
            true
        }
        None => false,
    }
}

/// Unicode text for a glyph name, if it can be derived from the name.
pub fn name_to_unicode(name: &str) -> Option<String> {
    let base = name.split('.').next().unwrap_or_default();
    if base.is_empty() || base == "notdef" {
        return None;
    }
    let mut out = String::new();
    for part in base.split('_') {
        if !decode_component(part, &mut out) {
            return None;
        }
    }
    Some(out)
}

/// Predefined simple-font encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseEncoding {
    Standard,
    MacRoman,
    WinAnsi,
    PdfDoc,
}

impl BaseEncoding {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "StandardEncoding" => Self::Standard,
            "MacRomanEncoding" => Self::MacRoman,
            "WinAnsiEncoding" => Self::WinAnsi,
            "PDFDocEncoding" => Self::PdfDoc,
            _ => return None,
        })
    }

    fn code_of(self, glyph: &LatinGlyph) -> Option<u8> {
        match self {
            Self::Standard => glyph.2,
            Self::MacRoman => glyph.3,
            Self::WinAnsi => glyph.4,
            Self::PdfDoc => glyph.5,
        }
    }
}

/// Code to glyph-name table of a simple font.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoding {
    glyphs: [Option<Name>; 256],
}

impl Encoding {
    pub fn new(base: BaseEncoding) -> Self {
        let mut glyphs = [None; 256];
        for glyph in LATIN_GLYPHS {
            if let Some(code) = base.code_of(glyph) {
                glyphs[code as usize] = Some(Name::new(glyph.0));
            }
        }
        // WinAnsi maps the unused code 0xA0 to space as well.
        if base == BaseEncoding::WinAnsi && glyphs[0xA0].is_none() {
            glyphs[0xA0] = Some(Name::new("space"));
        }
        Self { glyphs }
    }

    /// Applies a `Differences` array: an integer sets the next code, each
    /// following name fills one code.
    pub fn apply_differences(&mut self, differences: &[PDFObject]) {
        let mut code: Option<usize> = None;
        for item in differences {
            match item {
                PDFObject::Int(n) => code = usize::try_from(*n).ok().filter(|c| *c < 256),
                PDFObject::Real(n) if n.fract() == 0.0 => code = Some(*n as usize).filter(|c| *c < 256),
                PDFObject::Name(name) => {
                    if let Some(c) = code {
                        self.glyphs[c] = Some(*name);
                        code = (c + 1 < 256).then_some(c + 1);
                    }
                }
                _ => {}
            }
        }
    }

    pub fn glyph_name(&self, code: u8) -> Option<Name> {
        self.glyphs[code as usize]
    }

    pub fn to_unicode(&self, code: u8) -> Option<String> {
        name_to_unicode(self.glyph_name(code)?.as_str())
    }
}
