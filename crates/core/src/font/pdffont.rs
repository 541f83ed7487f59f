//! Loaded fonts: simple fonts (Type1, TrueType, Type3) and composite
//! (Type0) fonts.
//!
//! A `PdfFont` knows how to split a shown string into character codes and
//! how wide and what Unicode text each code is. Glyph outlines are never
//! read; missing embedded programs only affect the `missing_file` flag.

use super::cmap::CMap;
use super::encoding::{BaseEncoding, Encoding};
use super::metrics::StandardMetrics;
use crate::document::xref::XRef;
use crate::error::{PdfError, Result};
use crate::model::objects::{Dict, ObjRef, PDFObject};
use crate::utils::Matrix;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

/// Font descriptor flag bits (PDF 32000 Table 123).
pub mod flags {
    pub const FIXED_PITCH: u32 = 1;
    pub const SERIF: u32 = 1 << 1;
    pub const SYMBOLIC: u32 = 1 << 2;
    pub const NONSYMBOLIC: u32 = 1 << 5;
    pub const ITALIC: u32 = 1 << 6;
    pub const FORCE_BOLD: u32 = 1 << 18;
}

const TEXT_SPACE_SCALE: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum FontType {
    Type1,
    MMType1,
    TrueType,
    Type3,
    Type0,
}

impl FontType {
    fn from_subtype(subtype: &str) -> Option<Self> {
        Some(match subtype {
            "Type1" => Self::Type1,
            "MMType1" => Self::MMType1,
            "TrueType" => Self::TrueType,
            "Type3" => Self::Type3,
            "Type0" => Self::Type0,
            _ => return None,
        })
    }
}

/// One character code of a shown string.
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub code: u32,
    pub unicode: String,
    /// Horizontal advance per unit of font size.
    pub width: f64,
    /// Vertical advance per unit of font size (vertical fonts only).
    pub vertical_advance: f64,
    /// A single-byte code 32; only these receive word spacing.
    pub is_space: bool,
}

#[derive(Debug, Clone)]
pub struct PdfFont {
    /// Key the font is cached and referenced under in operator lists.
    pub loaded_name: String,
    /// `BaseFont` without a subset prefix.
    pub name: String,
    pub font_type: FontType,
    pub objref: Option<ObjRef>,
    encoding: Option<Encoding>,
    cmap: Option<CMap>,
    to_unicode: Option<CMap>,
    widths: FxHashMap<u32, f64>,
    default_width: f64,
    default_vertical_advance: f64,
    metrics: Option<StandardMetrics>,
    pub ascent: f64,
    pub descent: f64,
    pub vertical: bool,
    pub font_matrix: Matrix,
    pub flags: u32,
    /// No embedded font program was found.
    pub missing_file: bool,
    /// Type 3 glyph procedures.
    pub char_procs: Option<Dict>,
    /// Type 3 glyph resources.
    pub resources: Option<Dict>,
}

fn num(xref: &XRef, dict: &Dict, key: &str) -> Option<f64> {
    xref.get(dict, key)?.as_num().ok()
}

/// Reads a CIDFont `W` array: `c [w1 w2 ...]` and `c_first c_last w`.
fn cid_widths(xref: &XRef, items: &[PDFObject]) -> FxHashMap<u32, f64> {
    let mut widths = FxHashMap::default();
    let mut pending: Vec<f64> = Vec::new();
    for item in items {
        let Some(item) = xref.resolve(item) else { continue };
        match &*item {
            PDFObject::Array(list) => {
                if let Some(first) = pending.pop() {
                    for (i, w) in list.iter().enumerate() {
                        if let Some(w) = xref.resolve(w).and_then(|w| w.as_num().ok()) {
                            widths.insert(first as u32 + i as u32, w);
                        }
                    }
                }
                pending.clear();
            }
            other => {
                let Ok(n) = other.as_num() else { continue };
                pending.push(n);
                if let &[first, last, w] = pending.as_slice() {
                    // Cap pathological ranges.
                    for cid in (first as u32)..=(last as u32).min(first as u32 + 0xFFFF) {
                        widths.insert(cid, w);
                    }
                    pending.clear();
                }
            }
        }
    }
    widths
}

fn strip_subset(name: &str) -> &str {
    match name.split_once('+') {
        Some((prefix, rest)) if prefix.len() == 6 && prefix.bytes().all(|b| b.is_ascii_uppercase()) => rest,
        _ => name,
    }
}

impl PdfFont {
    /// Loads the font dictionary `dict` (fetched from `objref`, if any).
    pub fn load(xref: &XRef, dict: &Dict, objref: Option<ObjRef>) -> Result<Self> {
        if !dict.get_name("Type").is_none_or(|t| t == "Font") {
            return Err(PdfError::TypeError {
                expected: "font dictionary",
                got: "dict",
            });
        }
        let font_type = match dict.get_name("Subtype") {
            Some(sub) => FontType::from_subtype(sub.as_str()).unwrap_or_else(|| {
                warn!(subtype = sub.as_str(), "unknown font subtype, loading as Type1");
                FontType::Type1
            }),
            None => {
                warn!("font without /Subtype, loading as Type1");
                FontType::Type1
            }
        };
        let base_font = xref
            .get(dict, "BaseFont")
            .and_then(|n| n.as_name().ok())
            .map(|n| strip_subset(n.as_str()).to_string())
            .unwrap_or_default();
        let loaded_name = match objref {
            Some(r) => format!("f{}_{}", r.num, r.generation),
            None => format!("f_{base_font}"),
        };

        let mut font = Self {
            loaded_name,
            name: base_font,
            font_type,
            objref,
            encoding: None,
            cmap: None,
            to_unicode: None,
            widths: FxHashMap::default(),
            default_width: 0.0,
            default_vertical_advance: -1.0,
            metrics: None,
            ascent: 0.0,
            descent: 0.0,
            vertical: false,
            font_matrix: (TEXT_SPACE_SCALE, 0.0, 0.0, TEXT_SPACE_SCALE, 0.0, 0.0),
            flags: 0,
            missing_file: true,
            char_procs: None,
            resources: None,
        };

        let descriptor_owner = if font_type == FontType::Type0 {
            font.load_composite(xref, dict)?
        } else {
            font.load_simple(xref, dict);
            dict.clone()
        };
        font.load_descriptor(xref, &descriptor_owner);

        if let Some(stream) = xref.get(dict, "ToUnicode")
            && let Ok(stream) = stream.as_stream()
        {
            match xref.decode_stream(stream) {
                Ok(decoded) => font.to_unicode = Some(CMap::parse(&decoded.data)),
                Err(e) => warn!(font = %font.name, "unreadable ToUnicode stream: {e}"),
            }
        }
        debug!(font = %font.name, kind = ?font.font_type, "loaded font");
        Ok(font)
    }

    fn load_simple(&mut self, xref: &XRef, dict: &Dict) {
        if self.font_type == FontType::Type3 {
            if let Some(m) = xref.get(dict, "FontMatrix").and_then(|m| m.as_matrix().ok()) {
                self.font_matrix = m;
            }
            self.char_procs = xref.get_dict(dict, "CharProcs");
            self.resources = xref.get_dict(dict, "Resources");
            self.missing_file = false;
        }
        let first_char = num(xref, dict, "FirstChar").unwrap_or(0.0).max(0.0) as u32;
        if let Some(widths) = xref.get(dict, "Widths")
            && let Ok(widths) = widths.as_array()
        {
            for (i, w) in widths.iter().enumerate() {
                if let Some(w) = xref.resolve(w).and_then(|w| w.as_num().ok()) {
                    self.widths.insert(first_char + i as u32, w);
                }
            }
        } else if self.font_type != FontType::Type3 {
            self.metrics = Some(StandardMetrics::lookup(&self.name));
        }

        let default_base = if self.font_type == FontType::TrueType {
            BaseEncoding::WinAnsi
        } else {
            BaseEncoding::Standard
        };
        let encoding = match xref.get(dict, "Encoding").as_deref() {
            Some(PDFObject::Name(name)) => {
                let base = BaseEncoding::from_name(name.as_str()).unwrap_or_else(|| {
                    warn!(encoding = name.as_str(), "unknown base encoding");
                    default_base
                });
                Encoding::new(base)
            }
            Some(PDFObject::Dict(enc_dict)) => {
                let base = enc_dict
                    .get_name("BaseEncoding")
                    .and_then(|n| BaseEncoding::from_name(n.as_str()))
                    .unwrap_or(default_base);
                let mut enc = Encoding::new(base);
                if let Some(diffs) = xref.get(enc_dict, "Differences")
                    && let Ok(diffs) = diffs.as_array()
                {
                    enc.apply_differences(diffs);
                }
                enc
            }
            _ => Encoding::new(default_base),
        };
        self.encoding = Some(encoding);
    }

    /// Loads the Type0 parts and returns the descendant (which carries the
    /// font descriptor).
    fn load_composite(&mut self, xref: &XRef, dict: &Dict) -> Result<Dict> {
        let descendant = xref
            .get(dict, "DescendantFonts")
            .and_then(|d| {
                let first = d.as_array().ok()?.first()?.clone();
                xref.resolve(&first)?.as_dict().ok().cloned()
            })
            .ok_or_else(|| PdfError::KeyError("DescendantFonts".into()))?;

        let cmap = match xref.get(dict, "Encoding").as_deref() {
            Some(PDFObject::Name(name)) => match name.as_str() {
                "Identity-H" => CMap::identity(false),
                "Identity-V" => CMap::identity(true),
                other => {
                    warn!(cmap = other, "predefined CMap not bundled, using identity");
                    CMap::identity(other.ends_with("-V"))
                }
            },
            Some(PDFObject::Stream(stream)) => CMap::parse(&xref.decode_stream(stream)?.data),
            _ => {
                warn!(font = %self.name, "Type0 font without an encoding, using Identity-H");
                CMap::identity(false)
            }
        };
        self.vertical = cmap.is_vertical();
        self.cmap = Some(cmap);

        self.default_width = num(xref, &descendant, "DW").unwrap_or(1000.0);
        if let Some(w) = xref.get(&descendant, "W")
            && let Ok(w) = w.as_array()
        {
            self.widths = cid_widths(xref, w);
        }
        if let Some(dw2) = xref.get(&descendant, "DW2").and_then(|d| d.as_num_array().ok())
            && let [_, advance] = dw2.as_slice()
        {
            self.default_vertical_advance = advance * TEXT_SPACE_SCALE;
        }
        Ok(descendant)
    }

    fn load_descriptor(&mut self, xref: &XRef, owner: &Dict) {
        let Some(desc) = xref.get_dict(owner, "FontDescriptor") else {
            if let Some(m) = self.metrics.or_else(|| {
                (self.font_type != FontType::Type3).then(|| StandardMetrics::lookup(&self.name))
            }) {
                self.ascent = m.ascent;
                self.descent = m.descent;
                if m.is_fixed_pitch() {
                    self.flags |= flags::FIXED_PITCH;
                }
                if m.is_serif() {
                    self.flags |= flags::SERIF;
                }
            }
            return;
        };
        self.flags = num(xref, &desc, "Flags").unwrap_or(0.0) as u32;
        let scale = if self.font_type == FontType::Type3 {
            self.font_matrix.3
        } else {
            TEXT_SPACE_SCALE
        };
        self.ascent = num(xref, &desc, "Ascent").map_or(0.8, |a| a * scale);
        self.descent = num(xref, &desc, "Descent").map_or(-0.2, |d| d * scale);
        if self.descent > 0.0 {
            self.descent = -self.descent;
        }
        if let Some(missing) = num(xref, &desc, "MissingWidth")
            && self.font_type != FontType::Type0
        {
            self.default_width = missing;
        }
        if self.font_type != FontType::Type3 {
            self.missing_file = !["FontFile", "FontFile2", "FontFile3"]
                .iter()
                .any(|key| desc.contains(key));
        }
    }

    pub fn is_composite(&self) -> bool {
        self.font_type == FontType::Type0
    }

    pub fn is_type3(&self) -> bool {
        self.font_type == FontType::Type3
    }

    pub fn is_monospace(&self) -> bool {
        self.flags & flags::FIXED_PITCH != 0
    }

    pub fn is_serif(&self) -> bool {
        self.flags & flags::SERIF != 0
    }

    pub fn is_italic(&self) -> bool {
        self.flags & flags::ITALIC != 0 || self.name.contains("Italic") || self.name.contains("Oblique")
    }

    pub fn is_bold(&self) -> bool {
        self.flags & flags::FORCE_BOLD != 0 || self.name.contains("Bold")
    }

    /// Generic CSS-like family for text styles.
    pub fn generic_family(&self) -> &'static str {
        if self.is_monospace() {
            "monospace"
        } else if self.is_serif() {
            "serif"
        } else {
            "sans-serif"
        }
    }

    /// Glyph name of a simple-font code, used to look up Type 3 procedures.
    pub fn glyph_name(&self, code: u32) -> Option<crate::model::Name> {
        self.encoding.as_ref()?.glyph_name(u8::try_from(code).ok()?)
    }

    fn width_of(&self, code: u32, cid: u32) -> f64 {
        let raw = if self.is_composite() {
            self.widths.get(&cid).copied().unwrap_or(self.default_width)
        } else if let Some(&w) = self.widths.get(&code) {
            w
        } else if let Some(m) = &self.metrics {
            m.width(code)
        } else {
            self.default_width
        };
        if self.is_type3() {
            raw * self.font_matrix.0
        } else {
            raw * TEXT_SPACE_SCALE
        }
    }

    fn unicode_of(&self, code: u32, cid: u32) -> String {
        if let Some(text) = self.to_unicode.as_ref().and_then(|m| m.lookup_unicode(code)) {
            return text;
        }
        if self.is_composite() {
            // Without a ToUnicode map a CID has no reliable Unicode value.
            return char::from_u32(cid)
                .filter(|_| self.cmap.as_ref().is_some_and(CMap::is_identity) && cid < 0x80)
                .map_or_else(|| "\u{FFFD}".to_string(), String::from);
        }
        let byte = code as u8;
        self.encoding
            .as_ref()
            .and_then(|e| e.to_unicode(byte))
            .unwrap_or_else(|| {
                if byte >= 0x20 {
                    char::from(byte).to_string()
                } else {
                    String::new()
                }
            })
    }

    /// Splits `bytes` into glyphs.
    pub fn glyphs(&self, bytes: &[u8]) -> Vec<Glyph> {
        let mut out = Vec::with_capacity(bytes.len());
        let mut pos = 0;
        while pos < bytes.len() {
            let (code, len) = match &self.cmap {
                Some(cmap) => cmap.read_code(bytes, pos),
                None => (u32::from(bytes[pos]), 1),
            };
            let cid = self.cmap.as_ref().map_or(code, |c| c.lookup_cid(code));
            out.push(Glyph {
                code,
                unicode: self.unicode_of(code, cid),
                width: self.width_of(code, cid),
                vertical_advance: self.default_vertical_advance,
                is_space: len == 1 && code == 32,
            });
            pos += len.max(1);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::xref_with;

    fn load(xref: &XRef, num: u32) -> PdfFont {
        let r = ObjRef::new(num, 0);
        PdfFont::load(xref, &xref.fetch_dict(r).unwrap(), Some(r)).unwrap()
    }

    #[test]
    fn test_simple_font_widths_and_differences() {
        let xref = xref_with(&[(
            2,
            "<< /Type /Font /Subtype /Type1 /BaseFont /ABCDEF+Foo /FirstChar 32 /Widths [250 0 500]
                /Encoding << /Differences [33 /Euro] >> >>",
        )]);
        let font = load(&xref, 2);
        assert_eq!(font.name, "Foo");
        assert_eq!(font.loaded_name, "f2_0");
        let glyphs = font.glyphs(b" !\"#");
        assert_eq!(glyphs.len(), 4);
        assert!(glyphs[0].is_space);
        assert_eq!(glyphs[0].width, 0.25);
        assert_eq!(glyphs[1].unicode, "€");
        assert_eq!(glyphs[2].width, 0.5);
        assert_eq!(glyphs[3].width, 0.0);
        assert!(font.missing_file);
    }

    #[test]
    fn test_standard_font_without_widths_uses_metrics() {
        let xref = xref_with(&[(2, "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>")]);
        let font = load(&xref, 2);
        let glyphs = font.glyphs(b"W");
        assert!((glyphs[0].width - 0.944).abs() < 1e-9);
        assert_eq!(font.ascent, 0.718);
        assert_eq!(font.generic_family(), "sans-serif");
    }

    #[test]
    fn test_type0_identity_with_w_array() {
        let xref = xref_with(&[
            (2, "<< /Type /Font /Subtype /Type0 /BaseFont /Bar /Encoding /Identity-H /DescendantFonts [3 0 R] /ToUnicode 5 0 R >>"),
            (3, "<< /Type /Font /Subtype /CIDFontType2 /DW 500 /W [1 [100 200] 10 12 300] /FontDescriptor 4 0 R >>"),
            (4, "<< /Type /FontDescriptor /Ascent 900 /Descent -100 /Flags 1 /FontFile2 6 0 R >>"),
            (5, "<< /Length 53 >>\nstream\n1 begincodespacerange <0000> <FFFF> endcodespacerange\nendstream"),
        ]);
        let font = load(&xref, 2);
        assert!(font.is_composite());
        assert!(!font.missing_file);
        assert_eq!((font.ascent, font.descent), (0.9, -0.1));
        assert!(font.is_monospace());
        let glyphs = font.glyphs(&[0x00, 0x01, 0x00, 0x02, 0x00, 0x0B, 0x00, 0x20]);
        let widths: Vec<f64> = glyphs.iter().map(|g| g.width).collect();
        assert_eq!(widths, vec![0.1, 0.2, 0.3, 0.5]);
        // A two-byte code 32 is not a word space.
        assert!(!glyphs[3].is_space);
        assert_eq!(glyphs[3].unicode, " ");
    }

    #[test]
    fn test_type3_scales_by_font_matrix() {
        let xref = xref_with(&[(
            2,
            "<< /Type /Font /Subtype /Type3 /FontMatrix [0.01 0 0 0.01 0 0] /FirstChar 65 /Widths [50]
                /CharProcs << /A 3 0 R >> /Encoding << /Differences [65 /A] >> >>",
        )]);
        let font = load(&xref, 2);
        assert_eq!(font.glyphs(b"A")[0].width, 0.5);
        assert_eq!(font.glyph_name(65).map(|n| n.as_str()), Some("A"));
        assert!(font.char_procs.is_some());
    }

    #[test]
    fn test_non_font_dictionary_is_rejected() {
        let xref = xref_with(&[(2, "<< /Type /XObject >>")]);
        let d = xref.fetch_dict(ObjRef::new(2, 0)).unwrap();
        assert!(PdfFont::load(&xref, &d, None).is_err());
    }
}
