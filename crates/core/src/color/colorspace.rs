//! Color spaces (PDF 32000 8.6) and their conversion to 8-bit RGB.
//!
//! Device CMYK uses the additive formula. ICC profiles are replaced by
//! their alternate space. CIE-based spaces go through XYZ to sRGB.

use crate::color::function::PdfFunction;
use crate::document::xref::XRef;
use crate::error::{PdfError, Result};
use crate::model::objects::{Dict, Name, PDFObject};
use crate::model::state::Components;
use smallvec::smallvec;
use std::sync::Arc;
use tracing::warn;

const MAX_DEPTH: usize = 8;

const D65: [f64; 3] = [0.9505, 1.0, 1.0890];

const BRADFORD: [f64; 9] = [0.8951, 0.2664, -0.1614, -0.7502, 1.7135, 0.0367, 0.0389, -0.0685, 1.0296];
const BRADFORD_INV: [f64; 9] = [
    0.9869929, -0.1470543, 0.1599627, 0.4323053, 0.5183603, 0.0492912, -0.0085287, 0.0400428, 0.9684867,
];
const XYZ_TO_SRGB: [f64; 9] = [
    3.2404542, -1.5371385, -0.4985314, -0.9692660, 1.8760108, 0.0415560, 0.0556434, -0.2040259, 1.0572252,
];

#[derive(Debug, Clone, PartialEq)]
pub enum ColorSpace {
    DeviceGray,
    DeviceRGB,
    DeviceCMYK,
    CalGray {
        white_point: [f64; 3],
        black_point: [f64; 3],
        gamma: f64,
    },
    CalRGB {
        white_point: [f64; 3],
        black_point: [f64; 3],
        gamma: [f64; 3],
        matrix: [f64; 9],
    },
    Lab {
        white_point: [f64; 3],
        black_point: [f64; 3],
        /// `[amin amax bmin bmax]`.
        range: [f64; 4],
    },
    Indexed {
        base: Arc<ColorSpace>,
        hival: usize,
        lookup: Vec<u8>,
    },
    /// Pattern color space; uncolored patterns carry their base space.
    Pattern { base: Option<Arc<ColorSpace>> },
    /// Separation and DeviceN: components go through `tint` into `alt`.
    Alternate {
        name: Name,
        num_comps: usize,
        alt: Arc<ColorSpace>,
        tint: Arc<PdfFunction>,
    },
}

fn clip01(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

fn to_byte(v: f64) -> u8 {
    (clip01(v) * 255.0).round() as u8
}

fn mat_mul(m: &[f64; 9], v: [f64; 3]) -> [f64; 3] {
    [
        m[0] * v[0] + m[1] * v[1] + m[2] * v[2],
        m[3] * v[0] + m[4] * v[1] + m[5] * v[2],
        m[6] * v[0] + m[7] * v[1] + m[8] * v[2],
    ]
}

/// Chromatic adaptation of `xyz` from `white` to D65 (Bradford).
fn adapt_to_d65(xyz: [f64; 3], white: [f64; 3]) -> [f64; 3] {
    let src = mat_mul(&BRADFORD, white);
    let dst = mat_mul(&BRADFORD, D65);
    let lms = mat_mul(&BRADFORD, xyz);
    let scaled = [
        lms[0] * dst[0] / src[0],
        lms[1] * dst[1] / src[1],
        lms[2] * dst[2] / src[2],
    ];
    mat_mul(&BRADFORD_INV, scaled)
}

fn srgb_gamma(c: f64) -> f64 {
    let c = clip01(c);
    if c <= 0.0031308 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn xyz_to_rgb(xyz: [f64; 3], white: [f64; 3]) -> [u8; 3] {
    let adapted = adapt_to_d65(xyz, white);
    let lin = mat_mul(&XYZ_TO_SRGB, adapted);
    [
        to_byte(srgb_gamma(lin[0])),
        to_byte(srgb_gamma(lin[1])),
        to_byte(srgb_gamma(lin[2])),
    ]
}

/// Lab decoding helper (inverse of the CIE f function).
fn lab_g(x: f64) -> f64 {
    if x >= 6.0 / 29.0 {
        x * x * x
    } else {
        (108.0 / 841.0) * (x - 4.0 / 29.0)
    }
}

fn triple(xref: &XRef, dict: &Dict, key: &str, default: [f64; 3]) -> [f64; 3] {
    match xref.get(dict, key).and_then(|v| v.as_num_array().ok()).as_deref() {
        Some(&[a, b, c]) => [a, b, c],
        _ => default,
    }
}

impl ColorSpace {
    /// Parses a color-space operand or resource value. Names that are not
    /// family names are looked up in `resources /ColorSpace`.
    pub fn parse(obj: &PDFObject, xref: &XRef, resources: Option<&Dict>) -> Result<Self> {
        Self::parse_depth(obj, xref, resources, 0)
    }

    fn parse_depth(obj: &PDFObject, xref: &XRef, resources: Option<&Dict>, depth: usize) -> Result<Self> {
        if depth > MAX_DEPTH {
            return Err(PdfError::SyntaxError("color space nested too deeply".into()));
        }
        let obj = xref
            .resolve(obj)
            .ok_or_else(|| PdfError::ObjectNotFound("color space".into()))?;
        match &*obj {
            PDFObject::Name(name) => match name.as_str() {
                "DeviceGray" | "G" => Ok(Self::DeviceGray),
                "DeviceRGB" | "RGB" => Ok(Self::DeviceRGB),
                "DeviceCMYK" | "CMYK" => Ok(Self::DeviceCMYK),
                "Pattern" => Ok(Self::Pattern { base: None }),
                other => {
                    let named = resources
                        .and_then(|res| xref.get_dict(res, "ColorSpace"))
                        .and_then(|spaces| spaces.get(other).cloned())
                        .ok_or_else(|| PdfError::KeyError(format!("color space /{other}")))?;
                    Self::parse_depth(&named, xref, resources, depth + 1)
                }
            },
            PDFObject::Array(items) => Self::parse_array(items, xref, resources, depth),
            other => Err(PdfError::TypeError {
                expected: "color space",
                got: other.type_name(),
            }),
        }
    }

    fn parse_array(items: &[PDFObject], xref: &XRef, resources: Option<&Dict>, depth: usize) -> Result<Self> {
        let family = items
            .first()
            .and_then(|f| xref.resolve(f))
            .and_then(|f| f.as_name().ok())
            .ok_or_else(|| PdfError::SyntaxError("color space array without a family name".into()))?;
        let operand = |i: usize| {
            items
                .get(i)
                .ok_or_else(|| PdfError::SyntaxError(format!("/{family} color space is missing operand {i}")))
        };
        let dict_operand = |i: usize| -> Result<Dict> {
            xref.resolve(operand(i)?)
                .and_then(|d| d.as_dict().ok().cloned())
                .ok_or_else(|| PdfError::SyntaxError(format!("/{family} needs a dictionary")))
        };
        match family.as_str() {
            "DeviceGray" | "G" | "DeviceRGB" | "RGB" | "DeviceCMYK" | "CMYK" => {
                Self::parse_depth(&PDFObject::Name(family), xref, resources, depth + 1)
            }
            "CalGray" => {
                let dict = dict_operand(1)?;
                Ok(Self::CalGray {
                    white_point: triple(xref, &dict, "WhitePoint", [1.0, 1.0, 1.0]),
                    black_point: triple(xref, &dict, "BlackPoint", [0.0; 3]),
                    gamma: xref
                        .get(&dict, "Gamma")
                        .and_then(|g| g.as_num().ok())
                        .unwrap_or(1.0),
                })
            }
            "CalRGB" => {
                let dict = dict_operand(1)?;
                let matrix = match xref.get(&dict, "Matrix").and_then(|m| m.as_num_array().ok()) {
                    Some(m) if m.len() == 9 => {
                        let mut out = [0.0; 9];
                        out.copy_from_slice(&m);
                        out
                    }
                    _ => [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
                };
                Ok(Self::CalRGB {
                    white_point: triple(xref, &dict, "WhitePoint", [1.0, 1.0, 1.0]),
                    black_point: triple(xref, &dict, "BlackPoint", [0.0; 3]),
                    gamma: triple(xref, &dict, "Gamma", [1.0; 3]),
                    matrix,
                })
            }
            "Lab" => {
                let dict = dict_operand(1)?;
                let range = match xref.get(&dict, "Range").and_then(|r| r.as_num_array().ok()).as_deref() {
                    Some(&[a, b, c, d]) => [a.min(b), a.max(b), c.min(d), c.max(d)],
                    _ => [-100.0, 100.0, -100.0, 100.0],
                };
                Ok(Self::Lab {
                    white_point: triple(xref, &dict, "WhitePoint", [1.0, 1.0, 1.0]),
                    black_point: triple(xref, &dict, "BlackPoint", [0.0; 3]),
                    range,
                })
            }
            "ICCBased" => {
                let dict = dict_operand(1)?;
                if let Some(alt) = dict.get("Alternate") {
                    match Self::parse_depth(alt, xref, resources, depth + 1) {
                        Ok(cs) => return Ok(cs),
                        Err(e) => warn!("ignoring bad ICC /Alternate: {e}"),
                    }
                }
                match xref.get(&dict, "N").and_then(|n| n.as_int().ok()) {
                    Some(1) => Ok(Self::DeviceGray),
                    Some(3) => Ok(Self::DeviceRGB),
                    Some(4) => Ok(Self::DeviceCMYK),
                    other => Err(PdfError::SyntaxError(format!("ICCBased stream with N={other:?}"))),
                }
            }
            "Indexed" | "I" => {
                let base = Arc::new(Self::parse_depth(operand(1)?, xref, resources, depth + 1)?);
                let hival = xref
                    .resolve(operand(2)?)
                    .and_then(|h| h.as_int().ok())
                    .ok_or_else(|| PdfError::SyntaxError("Indexed hival must be an integer".into()))?
                    .clamp(0, 255) as usize;
                let lookup_obj = xref
                    .resolve(operand(3)?)
                    .ok_or_else(|| PdfError::ObjectNotFound("Indexed lookup".into()))?;
                let mut lookup = match &*lookup_obj {
                    PDFObject::String(s) => s.clone(),
                    PDFObject::Stream(s) => xref.decode_stream(s)?.data,
                    other => {
                        return Err(PdfError::TypeError {
                            expected: "lookup string or stream",
                            got: other.type_name(),
                        });
                    }
                };
                let needed = (hival + 1) * base.num_comps();
                if lookup.len() < needed {
                    warn!(needed, got = lookup.len(), "Indexed lookup table is short, padding");
                    lookup.resize(needed, 0);
                }
                Ok(Self::Indexed { base, hival, lookup })
            }
            "Pattern" => {
                let base = match items.get(1) {
                    Some(b) => Some(Arc::new(Self::parse_depth(b, xref, resources, depth + 1)?)),
                    None => None,
                };
                Ok(Self::Pattern { base })
            }
            "Separation" | "DeviceN" => {
                let num_comps = if family == "Separation" {
                    1
                } else {
                    xref.resolve(operand(1)?)
                        .and_then(|n| n.as_array().map(<[PDFObject]>::len).ok())
                        .ok_or_else(|| PdfError::SyntaxError("DeviceN names must be an array".into()))?
                };
                let alt = Arc::new(Self::parse_depth(operand(2)?, xref, resources, depth + 1)?);
                let tint = Arc::new(PdfFunction::parse(xref, operand(3)?)?);
                Ok(Self::Alternate {
                    name: family,
                    num_comps,
                    alt,
                    tint,
                })
            }
            other => Err(PdfError::SyntaxError(format!("unknown color space family /{other}"))),
        }
    }

    /// Family name as written in a PDF.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DeviceGray => "DeviceGray",
            Self::DeviceRGB => "DeviceRGB",
            Self::DeviceCMYK => "DeviceCMYK",
            Self::CalGray { .. } => "CalGray",
            Self::CalRGB { .. } => "CalRGB",
            Self::Lab { .. } => "Lab",
            Self::Indexed { .. } => "Indexed",
            Self::Pattern { .. } => "Pattern",
            Self::Alternate { name, .. } => name.as_str(),
        }
    }

    pub fn num_comps(&self) -> usize {
        match self {
            Self::DeviceGray | Self::CalGray { .. } | Self::Indexed { .. } => 1,
            Self::DeviceRGB | Self::CalRGB { .. } | Self::Lab { .. } => 3,
            Self::DeviceCMYK => 4,
            Self::Pattern { base } => base.as_ref().map_or(1, |b| b.num_comps()),
            Self::Alternate { num_comps, .. } => *num_comps,
        }
    }

    /// Initial color set by `cs`/`CS` (PDF 32000 Table 73).
    pub fn default_color(&self) -> Components {
        match self {
            Self::DeviceCMYK => smallvec![0.0, 0.0, 0.0, 1.0],
            Self::Lab { range, .. } => smallvec![0.0, 0.0_f64.clamp(range[0], range[1]), 0.0_f64.clamp(range[2], range[3])],
            Self::Alternate { num_comps, .. } => smallvec![1.0; *num_comps],
            Self::Pattern { base: None } => smallvec![0.0],
            other => smallvec![0.0; other.num_comps()],
        }
    }

    /// Default `Decode` array for image samples of `bits` per component.
    pub fn default_decode(&self, bits: u32) -> Vec<f64> {
        match self {
            Self::Indexed { .. } => vec![0.0, ((1u64 << bits.min(16)) - 1) as f64],
            Self::Lab { range, .. } => vec![0.0, 100.0, range[0], range[1], range[2], range[3]],
            other => [0.0, 1.0].repeat(other.num_comps()),
        }
    }

    /// Converts one color to 8-bit RGB; components are clamped into range.
    pub fn get_rgb(&self, comps: &[f64]) -> [u8; 3] {
        let c = |i: usize| comps.get(i).copied().unwrap_or(0.0);
        match self {
            Self::DeviceGray => {
                let g = to_byte(c(0));
                [g, g, g]
            }
            Self::DeviceRGB => [to_byte(c(0)), to_byte(c(1)), to_byte(c(2))],
            Self::DeviceCMYK => {
                let k = clip01(c(3));
                [
                    to_byte(1.0 - (clip01(c(0)) + k).min(1.0)),
                    to_byte(1.0 - (clip01(c(1)) + k).min(1.0)),
                    to_byte(1.0 - (clip01(c(2)) + k).min(1.0)),
                ]
            }
            Self::CalGray { white_point, gamma, .. } => {
                let a = clip01(c(0));
                let l = white_point[1] * a.powf(*gamma);
                let v = (295.8 * l.cbrt() - 40.8).max(0.0);
                let v = v.min(255.0).round() as u8;
                [v, v, v]
            }
            Self::CalRGB {
                white_point,
                gamma,
                matrix,
                ..
            } => {
                let agr = clip01(c(0)).powf(gamma[0]);
                let bgg = clip01(c(1)).powf(gamma[1]);
                let cgb = clip01(c(2)).powf(gamma[2]);
                // Matrix columns are the XYZ of each primary.
                let xyz = [
                    matrix[0] * agr + matrix[3] * bgg + matrix[6] * cgb,
                    matrix[1] * agr + matrix[4] * bgg + matrix[7] * cgb,
                    matrix[2] * agr + matrix[5] * bgg + matrix[8] * cgb,
                ];
                xyz_to_rgb(xyz, *white_point)
            }
            Self::Lab {
                white_point, range, ..
            } => {
                let l = c(0).clamp(0.0, 100.0);
                let a = c(1).clamp(range[0], range[1]);
                let b = c(2).clamp(range[2], range[3]);
                let m = (l + 16.0) / 116.0;
                let xyz = [
                    white_point[0] * lab_g(m + a / 500.0),
                    white_point[1] * lab_g(m),
                    white_point[2] * lab_g(m - b / 200.0),
                ];
                let (r, g, b) = if white_point[2] < 1.0 {
                    (
                        xyz[0] * 3.1339 + xyz[1] * -1.617 + xyz[2] * -0.4906,
                        xyz[0] * -0.9785 + xyz[1] * 1.916 + xyz[2] * 0.0333,
                        xyz[0] * 0.072 + xyz[1] * -0.229 + xyz[2] * 1.4057,
                    )
                } else {
                    (
                        xyz[0] * 3.2406 + xyz[1] * -1.5372 + xyz[2] * -0.4986,
                        xyz[0] * -0.9689 + xyz[1] * 1.8758 + xyz[2] * 0.0415,
                        xyz[0] * 0.0557 + xyz[1] * -0.204 + xyz[2] * 1.057,
                    )
                };
                [to_byte(clip01(r).sqrt()), to_byte(clip01(g).sqrt()), to_byte(clip01(b).sqrt())]
            }
            Self::Indexed { base, hival, lookup } => {
                let index = c(0).round();
                let index = if index < 0.0 || index > *hival as f64 {
                    0
                } else {
                    index as usize
                };
                let n = base.num_comps();
                let raw: Vec<f64> = lookup[index * n..(index + 1) * n]
                    .iter()
                    .map(|&b| f64::from(b) / 255.0)
                    .collect();
                base.get_rgb(&base.from_unit(&raw))
            }
            Self::Pattern { base } => base.as_ref().map_or([0, 0, 0], |b| b.get_rgb(comps)),
            Self::Alternate { alt, tint, num_comps, .. } => {
                let input: Vec<f64> = (0..*num_comps).map(|i| clip01(c(i))).collect();
                alt.get_rgb(&tint.eval(&input))
            }
        }
    }

    /// Maps components given as 0..1 fractions into this space's natural
    /// ranges (only Lab differs).
    fn from_unit(&self, unit: &[f64]) -> Vec<f64> {
        match self {
            Self::Lab { range, .. } => {
                let at = |i: usize| unit.get(i).copied().unwrap_or(0.0);
                vec![
                    at(0) * 100.0,
                    range[0] + at(1) * (range[1] - range[0]),
                    range[2] + at(2) * (range[3] - range[2]),
                ]
            }
            _ => unit.to_vec(),
        }
    }

    /// Converts packed image samples to an RGB buffer. `decode` maps raw
    /// sample values; `None` uses the default decode for `bits`. Trailing
    /// partial pixels are ignored and each row starts on a byte boundary.
    pub fn get_rgb_buffer(&self, data: &[u8], bits: u32, width: usize, decode: Option<&[f64]>) -> Vec<u8> {
        let n = self.num_comps();
        let bits = bits.clamp(1, 16);
        let default;
        let decode = match decode {
            Some(d) if d.len() >= 2 * n => d,
            _ => {
                default = self.default_decode(bits);
                &default[..]
            }
        };
        let max = ((1u64 << bits) - 1) as f64;
        let row_bits = width * n * bits as usize;
        let row_bytes = row_bits.div_ceil(8);
        if row_bytes == 0 {
            return Vec::new();
        }
        let rows = data.len() / row_bytes;
        let mut out = Vec::with_capacity(rows * width * 3);
        let mut comps = vec![0.0; n];
        for row in data.chunks_exact(row_bytes) {
            let mut bit = 0usize;
            for _ in 0..width {
                for (k, slot) in comps.iter_mut().enumerate() {
                    let mut v: u64 = 0;
                    for _ in 0..bits {
                        let byte = row[bit / 8];
                        v = (v << 1) | u64::from((byte >> (7 - bit % 8)) & 1);
                        bit += 1;
                    }
                    let (dmin, dmax) = (decode[2 * k], decode[2 * k + 1]);
                    *slot = dmin + v as f64 * (dmax - dmin) / max;
                }
                out.extend_from_slice(&self.get_rgb(&comps));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::pdf_parser::parse_object;
    use crate::test_utils::xref_with;

    fn parse(src: &str) -> Result<ColorSpace> {
        let xref = xref_with(&[]);
        ColorSpace::parse(&parse_object(src.as_bytes().to_vec()).unwrap(), &xref, None)
    }

    #[test]
    fn test_device_spaces_and_abbreviations() {
        assert_eq!(parse("/G").unwrap(), ColorSpace::DeviceGray);
        assert_eq!(parse("/DeviceRGB").unwrap().num_comps(), 3);
        assert_eq!(parse("[/CMYK]").unwrap(), ColorSpace::DeviceCMYK);
        assert!(matches!(parse("/Unknown"), Err(PdfError::KeyError(_))));
    }

    #[test]
    fn test_named_resource_lookup() {
        let xref = xref_with(&[(2, "[/ICCBased 3 0 R]"), (3, "<< /N 3 /Length 0 >>\nstream\n\nendstream")]);
        let mut spaces = Dict::new();
        spaces.insert("CS0", crate::model::ObjRef::new(2, 0));
        let mut res = Dict::new();
        res.insert("ColorSpace", spaces);
        let cs = ColorSpace::parse(&PDFObject::Name(Name::new("CS0")), &xref, Some(&res)).unwrap();
        assert_eq!(cs, ColorSpace::DeviceRGB);
    }

    #[test]
    fn test_get_rgb_clamps() {
        assert_eq!(ColorSpace::DeviceRGB.get_rgb(&[2.0, -1.0, 0.5]), [255, 0, 128]);
        assert_eq!(ColorSpace::DeviceCMYK.get_rgb(&[0.0, 0.0, 0.0, 1.0]), [0, 0, 0]);
        assert_eq!(ColorSpace::DeviceCMYK.get_rgb(&[1.0, 0.0, 0.0, 0.0]), [0, 255, 255]);
    }

    #[test]
    fn test_indexed_out_of_range_uses_entry_zero() {
        let cs = parse("[/Indexed /DeviceRGB 1 <FF000000FF00>]").unwrap();
        assert_eq!(cs.get_rgb(&[1.0]), [0, 255, 0]);
        assert_eq!(cs.get_rgb(&[7.0]), [255, 0, 0]);
        assert_eq!(cs.get_rgb(&[-3.0]), [255, 0, 0]);
        assert_eq!(cs.default_color().as_slice(), &[0.0]);
    }

    #[test]
    fn test_cie_white_maps_to_white() {
        let gray = parse("[/CalGray << /WhitePoint [0.9505 1 1.089] >>]").unwrap();
        assert_eq!(gray.get_rgb(&[1.0]), [255, 255, 255]);
        assert_eq!(gray.get_rgb(&[0.0]), [0, 0, 0]);
        let lab = parse("[/Lab << /WhitePoint [0.9505 1 1.089] >>]").unwrap();
        let white = lab.get_rgb(&[100.0, 0.0, 0.0]);
        assert!(white.iter().all(|&c| c >= 250), "{white:?}");
        let rgb = parse("[/CalRGB << /WhitePoint [0.9505 1 1.089] /Matrix [0.4124 0.2126 0.0193 0.3576 0.7152 0.1192 0.1805 0.0722 0.9505] >>]").unwrap();
        let white = rgb.get_rgb(&[1.0, 1.0, 1.0]);
        assert!(white.iter().all(|&c| c >= 250), "{white:?}");
    }

    #[test]
    fn test_separation_uses_tint_transform() {
        let cs = parse("[/Separation /Spot /DeviceCMYK << /FunctionType 2 /Domain [0 1] /C0 [0 0 0 0] /C1 [0 0 0 1] /N 1 >>]")
            .unwrap();
        assert_eq!(cs.num_comps(), 1);
        assert_eq!(cs.default_color().as_slice(), &[1.0]);
        assert_eq!(cs.get_rgb(&[1.0]), [0, 0, 0]);
        assert_eq!(cs.get_rgb(&[0.0]), [255, 255, 255]);
    }

    #[test]
    fn test_rgb_buffer_from_one_bit_gray() {
        let out = ColorSpace::DeviceGray.get_rgb_buffer(&[0b1010_0000], 1, 3, None);
        assert_eq!(out, vec![255, 255, 255, 0, 0, 0, 255, 255, 255]);
        let inverted = ColorSpace::DeviceGray.get_rgb_buffer(&[0b1000_0000], 1, 1, Some(&[1.0, 0.0]));
        assert_eq!(inverted, vec![0, 0, 0]);
    }
}
