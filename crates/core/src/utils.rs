//! Geometry, text-string and numbering helpers shared across modules.

/// A 2D point (x, y).
pub type Point = (f64, f64);

/// A rectangle (x0, y0, x1, y1), normalized so that x0 <= x1 and y0 <= y1.
pub type Rect = (f64, f64, f64, f64);

/// A 6-element affine transformation matrix (a, b, c, d, e, f).
/// Transforms point (x, y) to (ax + cy + e, bx + dy + f).
pub type Matrix = (f64, f64, f64, f64, f64, f64);

/// Identity transformation matrix.
pub const MATRIX_IDENTITY: Matrix = (1.0, 0.0, 0.0, 1.0, 0.0, 0.0);

/// Multiplies two matrices: result = m1 * m0.
/// This applies m1 first, then m0.
pub fn mult_matrix(m1: Matrix, m0: Matrix) -> Matrix {
    let (a1, b1, c1, d1, e1, f1) = m1;
    let (a0, b0, c0, d0, e0, f0) = m0;
    (
        a0 * a1 + c0 * b1,
        b0 * a1 + d0 * b1,
        a0 * c1 + c0 * d1,
        b0 * c1 + d0 * d1,
        a0 * e1 + c0 * f1 + e0,
        b0 * e1 + d0 * f1 + f0,
    )
}

/// Applies a matrix to a point.
pub fn apply_matrix_pt(m: Matrix, v: Point) -> Point {
    let (a, b, c, d, e, f) = m;
    let (x, y) = v;
    (a * x + c * y + e, b * x + d * y + f)
}

/// Applies a matrix to a rectangle and returns the axis-aligned bounds
/// of the transformed corners.
pub fn apply_matrix_rect(m: Matrix, rect: Rect) -> Rect {
    let (x0, y0, x1, y1) = rect;
    let corners = [
        apply_matrix_pt(m, (x0, y0)),
        apply_matrix_pt(m, (x1, y0)),
        apply_matrix_pt(m, (x1, y1)),
        apply_matrix_pt(m, (x0, y1)),
    ];
    corners.iter().fold(
        (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        |(lx, ly, hx, hy), &(x, y)| (lx.min(x), ly.min(y), hx.max(x), hy.max(y)),
    )
}

/// Inverts an affine matrix. Singular matrices yield `None`.
pub fn invert_matrix(m: Matrix) -> Option<Matrix> {
    let (a, b, c, d, e, f) = m;
    let det = a * d - b * c;
    if det.abs() < 1e-12 {
        return None;
    }
    Some((
        d / det,
        -b / det,
        -c / det,
        a / det,
        (c * f - d * e) / det,
        (b * e - a * f) / det,
    ))
}

/// Normalizes a rectangle so that the first corner is the lower-left one.
pub fn normalize_rect(r: Rect) -> Rect {
    (r.0.min(r.2), r.1.min(r.3), r.0.max(r.2), r.1.max(r.3))
}

/// Intersects two normalized rectangles; disjoint rectangles yield `None`.
pub fn intersect_rect(a: Rect, b: Rect) -> Option<Rect> {
    let x0 = a.0.max(b.0);
    let y0 = a.1.max(b.1);
    let x1 = a.2.min(b.2);
    let y1 = a.3.min(b.3);
    (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
}

/// PDFDocEncoding table - maps bytes 0-255 to Unicode code points.
const PDF_DOC_ENCODING: [u32; 256] = [
    0x0000, 0x0001, 0x0002, 0x0003, 0x0004, 0x0005, 0x0006, 0x0007, 0x0008, 0x0009, 0x000A, 0x000B,
    0x000C, 0x000D, 0x000E, 0x000F, 0x0010, 0x0011, 0x0012, 0x0013, 0x0014, 0x0015, 0x0016, 0x0017,
    0x02D8, 0x02C7, 0x02C6, 0x02D9, 0x02DD, 0x02DB, 0x02DA, 0x02DC, 0x0020, 0x0021, 0x0022, 0x0023,
    0x0024, 0x0025, 0x0026, 0x0027, 0x0028, 0x0029, 0x002A, 0x002B, 0x002C, 0x002D, 0x002E, 0x002F,
    0x0030, 0x0031, 0x0032, 0x0033, 0x0034, 0x0035, 0x0036, 0x0037, 0x0038, 0x0039, 0x003A, 0x003B,
    0x003C, 0x003D, 0x003E, 0x003F, 0x0040, 0x0041, 0x0042, 0x0043, 0x0044, 0x0045, 0x0046, 0x0047,
    0x0048, 0x0049, 0x004A, 0x004B, 0x004C, 0x004D, 0x004E, 0x004F, 0x0050, 0x0051, 0x0052, 0x0053,
    0x0054, 0x0055, 0x0056, 0x0057, 0x0058, 0x0059, 0x005A, 0x005B, 0x005C, 0x005D, 0x005E, 0x005F,
    0x0060, 0x0061, 0x0062, 0x0063, 0x0064, 0x0065, 0x0066, 0x0067, 0x0068, 0x0069, 0x006A, 0x006B,
    0x006C, 0x006D, 0x006E, 0x006F, 0x0070, 0x0071, 0x0072, 0x0073, 0x0074, 0x0075, 0x0076, 0x0077,
    0x0078, 0x0079, 0x007A, 0x007B, 0x007C, 0x007D, 0x007E, 0x0000, 0x2022, 0x2020, 0x2021, 0x2026,
    0x2014, 0x2013, 0x0192, 0x2044, 0x2039, 0x203A, 0x2212, 0x2030, 0x201E, 0x201C, 0x201D, 0x2018,
    0x2019, 0x201A, 0x2122, 0xFB01, 0xFB02, 0x0141, 0x0152, 0x0160, 0x0178, 0x017D, 0x0131, 0x0142,
    0x0153, 0x0161, 0x017E, 0x0000, 0x20AC, 0x00A1, 0x00A2, 0x00A3, 0x00A4, 0x00A5, 0x00A6, 0x00A7,
    0x00A8, 0x00A9, 0x00AA, 0x00AB, 0x00AC, 0x0000, 0x00AE, 0x00AF, 0x00B0, 0x00B1, 0x00B2, 0x00B3,
    0x00B4, 0x00B5, 0x00B6, 0x00B7, 0x00B8, 0x00B9, 0x00BA, 0x00BB, 0x00BC, 0x00BD, 0x00BE, 0x00BF,
    0x00C0, 0x00C1, 0x00C2, 0x00C3, 0x00C4, 0x00C5, 0x00C6, 0x00C7, 0x00C8, 0x00C9, 0x00CA, 0x00CB,
    0x00CC, 0x00CD, 0x00CE, 0x00CF, 0x00D0, 0x00D1, 0x00D2, 0x00D3, 0x00D4, 0x00D5, 0x00D6, 0x00D7,
    0x00D8, 0x00D9, 0x00DA, 0x00DB, 0x00DC, 0x00DD, 0x00DE, 0x00DF, 0x00E0, 0x00E1, 0x00E2, 0x00E3,
    0x00E4, 0x00E5, 0x00E6, 0x00E7, 0x00E8, 0x00E9, 0x00EA, 0x00EB, 0x00EC, 0x00ED, 0x00EE, 0x00EF,
    0x00F0, 0x00F1, 0x00F2, 0x00F3, 0x00F4, 0x00F5, 0x00F6, 0x00F7, 0x00F8, 0x00F9, 0x00FA, 0x00FB,
    0x00FC, 0x00FD, 0x00FE, 0x00FF,
];

/// Decodes a PDF text string.
///
/// UTF-16BE (with BOM) and UTF-8 (with BOM) are honored; everything else
/// is read as PDFDocEncoding.
pub fn decode_text(s: &[u8]) -> String {
    if let Some(rest) = s.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(rest) = s.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    s.iter()
        .filter_map(|&c| char::from_u32(PDF_DOC_ENCODING[c as usize]))
        .filter(|&c| c != '\0')
        .collect()
}

/// Encodes text as a PDF text string: PDFDocEncoding when every character
/// fits, UTF-16BE with a BOM otherwise.
pub fn encode_text(s: &str) -> Vec<u8> {
    let mut doc = Vec::with_capacity(s.len());
    for ch in s.chars() {
        match PDF_DOC_ENCODING.iter().position(|&cp| cp == ch as u32 && cp != 0) {
            Some(byte) => doc.push(byte as u8),
            None => {
                let mut out = vec![0xFE, 0xFF];
                for unit in s.encode_utf16() {
                    out.extend_from_slice(&unit.to_be_bytes());
                }
                return out;
            }
        }
    }
    doc
}

/// Largest value written as Roman numerals; larger ones use decimal digits.
const MAX_ROMAN: u32 = 10_000;

/// Longest letter run for alphabetic numbering; past it decimal digits
/// are used.
const MAX_ALPHA_RUN: u32 = 100;

/// Formats a positive number as Roman numerals. Values of 4000 and above
/// are prefixed with the matching count of `M`s, up to `MAX_ROMAN`.
pub fn format_roman(value: u32, lowercase: bool) -> String {
    if value > MAX_ROMAN {
        return value.to_string();
    }
    const TABLE: [(u32, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut value = value;
    let mut out = String::new();
    for &(n, glyphs) in &TABLE {
        while value >= n {
            out.push_str(glyphs);
            value -= n;
        }
    }
    if lowercase {
        out.make_ascii_lowercase();
    }
    out
}

/// Formats a positive number with letters: A..Z, then AA..ZZ, AAA.., the
/// letter repeating once per wrap-around at 26.
pub fn format_alpha(value: u32, lowercase: bool) -> String {
    if value == 0 {
        return String::new();
    }
    if (value - 1) / 26 >= MAX_ALPHA_RUN {
        return value.to_string();
    }
    let base = if lowercase { b'a' } else { b'A' };
    let letter = (base + ((value - 1) % 26) as u8) as char;
    let count = ((value - 1) / 26 + 1) as usize;
    std::iter::repeat_n(letter, count).collect()
}

/// Hex-encodes bytes in lowercase.
pub fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mult_matrix_applies_first_argument_first() {
        let scale = (2.0, 0.0, 0.0, 2.0, 0.0, 0.0);
        let translate = (1.0, 0.0, 0.0, 1.0, 10.0, 0.0);
        let m = mult_matrix(scale, translate);
        assert_eq!(apply_matrix_pt(m, (1.0, 1.0)), (12.0, 2.0));
    }

    #[test]
    fn test_invert_matrix() {
        let m = (2.0, 0.0, 0.0, 4.0, 3.0, 5.0);
        let inv = invert_matrix(m).unwrap();
        let id = mult_matrix(m, inv);
        assert!((id.0 - 1.0).abs() < 1e-9 && (id.3 - 1.0).abs() < 1e-9);
        assert!(id.4.abs() < 1e-9 && id.5.abs() < 1e-9);
        assert!(invert_matrix((0.0, 0.0, 0.0, 0.0, 1.0, 1.0)).is_none());
    }

    #[test]
    fn test_decode_text_utf16_and_doc_encoding() {
        assert_eq!(decode_text(b"\xfe\xff\x00H\x00i"), "Hi");
        assert_eq!(decode_text(b"caf\xe9"), "café");
        assert_eq!(decode_text(b"\x93"), "\u{fb01}");
    }

    #[test]
    fn test_encode_text_falls_back_to_utf16() {
        assert_eq!(encode_text("abc"), b"abc");
        assert_eq!(encode_text("\u{3042}"), vec![0xFE, 0xFF, 0x30, 0x42]);
    }

    #[test]
    fn test_format_roman() {
        assert_eq!(format_roman(1994, false), "MCMXCIV");
        assert_eq!(format_roman(4, true), "iv");
    }

    #[test]
    fn test_format_alpha_wraps_by_repeating() {
        assert_eq!(format_alpha(1, false), "A");
        assert_eq!(format_alpha(26, false), "Z");
        assert_eq!(format_alpha(27, false), "AA");
        assert_eq!(format_alpha(54, true), "bbb");
        assert_eq!(format_alpha(2600, false).len(), 100);
        assert_eq!(format_alpha(2601, false), "2601");
    }

    #[test]
    fn test_huge_numbers_fall_back_to_decimal() {
        assert_eq!(format_roman(10_000, false), "M".repeat(10));
        assert_eq!(format_roman(u32::MAX, true), u32::MAX.to_string());
    }
}
