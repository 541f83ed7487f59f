//! Shadings and patterns in paint-ready form.
//!
//! Axial and radial shadings are sampled into RGB color stops so a
//! renderer only needs a gradient primitive. Function-based and mesh
//! shadings are not sampled; they are reported and skipped.

use super::operator_list::OperatorList;
use crate::color::{ColorSpace, PdfFunction};
use crate::document::xref::XRef;
use crate::error::{PdfError, Result};
use crate::model::objects::{Dict, PDFObject};
use crate::utils::{MATRIX_IDENTITY, Matrix, Rect};
use tracing::warn;

/// Samples taken across the shading domain.
const STOP_SAMPLES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ColorStop {
    /// Position in [0, 1] along the gradient.
    pub offset: f64,
    pub rgb: [u8; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ShadingKind {
    Axial,
    Radial,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Shading {
    pub kind: ShadingKind,
    /// `[x0 y0 x1 y1]` (axial) or `[x0 y0 r0 x1 y1 r1]` (radial).
    pub coords: Vec<f64>,
    pub domain: (f64, f64),
    pub extend: (bool, bool),
    pub stops: Vec<ColorStop>,
    pub bbox: Option<Rect>,
    pub background: Option<[u8; 3]>,
}

/// Evaluates `functions` at `t`: one function with n outputs, or n
/// functions with one output each.
fn eval_functions(functions: &[PdfFunction], t: f64) -> Vec<f64> {
    match functions {
        [single] => single.eval(&[t]),
        many => many
            .iter()
            .map(|f| f.eval(&[t]).first().copied().unwrap_or(0.0))
            .collect(),
    }
}

/// Drops interior stops whose color matches both neighbours.
fn collapse_stops(stops: Vec<ColorStop>) -> Vec<ColorStop> {
    let mut out: Vec<ColorStop> = Vec::with_capacity(stops.len());
    for (i, stop) in stops.iter().enumerate() {
        let same_as_prev = out.last().is_some_and(|p| p.rgb == stop.rgb);
        let same_as_next = stops.get(i + 1).is_some_and(|n| n.rgb == stop.rgb);
        if same_as_prev && same_as_next {
            continue;
        }
        out.push(*stop);
    }
    out
}

impl Shading {
    /// Parses a shading dictionary (or stream). Unsupported shading types
    /// warn and yield `Ok(None)`.
    pub fn parse(xref: &XRef, obj: &PDFObject, resources: Option<&Dict>) -> Result<Option<Self>> {
        let resolved = xref.resolve(obj).ok_or(PdfError::MissingData("shading"))?;
        let dict = resolved.as_dict()?;
        let shading_type = xref
            .get(dict, "ShadingType")
            .ok_or_else(|| PdfError::KeyError("ShadingType".into()))?
            .as_int()?;
        let kind = match shading_type {
            2 => ShadingKind::Axial,
            3 => ShadingKind::Radial,
            1 | 4..=7 => {
                warn!(shading_type, "unsupported shading type");
                return Ok(None);
            }
            other => return Err(PdfError::SyntaxError(format!("unknown shading type {other}"))),
        };

        let cs_obj = dict
            .get("ColorSpace")
            .ok_or_else(|| PdfError::KeyError("ColorSpace".into()))?;
        let cs = ColorSpace::parse(cs_obj, xref, resources)?;

        let expected = if kind == ShadingKind::Axial { 4 } else { 6 };
        let coords = xref
            .get(dict, "Coords")
            .ok_or_else(|| PdfError::KeyError("Coords".into()))?
            .as_num_array()?;
        if coords.len() != expected {
            return Err(PdfError::SyntaxError(format!(
                "shading Coords has {} values, expected {expected}",
                coords.len()
            )));
        }
        let domain = match xref.get(dict, "Domain").and_then(|d| d.as_num_array().ok()).as_deref() {
            Some(&[t0, t1]) => (t0, t1),
            _ => (0.0, 1.0),
        };
        let extend = match xref.get(dict, "Extend").map(|e| e.into_owned()) {
            Some(PDFObject::Array(items)) => (
                items.first().and_then(|b| b.as_bool().ok()).unwrap_or(false),
                items.get(1).and_then(|b| b.as_bool().ok()).unwrap_or(false),
            ),
            _ => (false, false),
        };
        let bbox = xref.get(dict, "BBox").and_then(|b| b.as_rect().ok());
        let background = xref
            .get(dict, "Background")
            .and_then(|b| b.as_num_array().ok())
            .map(|comps| cs.get_rgb(&comps));

        let fn_obj = dict
            .get("Function")
            .ok_or_else(|| PdfError::KeyError("Function".into()))?;
        let functions = match xref.resolve(fn_obj).map(|f| f.into_owned()) {
            Some(PDFObject::Array(items)) => items
                .iter()
                .map(|f| PdfFunction::parse(xref, f))
                .collect::<Result<Vec<_>>>()?,
            Some(_) => vec![PdfFunction::parse(xref, fn_obj)?],
            None => return Err(PdfError::MissingData("shading function")),
        };

        let (t0, t1) = domain;
        let stops = (0..=STOP_SAMPLES)
            .map(|i| {
                let offset = i as f64 / STOP_SAMPLES as f64;
                let comps = eval_functions(&functions, t0 + (t1 - t0) * offset);
                ColorStop {
                    offset,
                    rgb: cs.get_rgb(&comps),
                }
            })
            .collect();

        Ok(Some(Self {
            kind,
            coords,
            domain,
            extend,
            stops: collapse_stops(stops),
            bbox,
            background,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum Pattern {
    Tiling {
        /// 1 = colored, 2 = uncolored.
        paint_type: i64,
        tiling_type: i64,
        bbox: Rect,
        x_step: f64,
        y_step: f64,
        matrix: Matrix,
        /// Paint color of an uncolored pattern.
        color: Option<[u8; 3]>,
        operator_list: OperatorList,
    },
    Shading {
        shading: Shading,
        matrix: Matrix,
    },
}

/// Geometry of a tiling pattern, read before its content is evaluated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilingParams {
    pub paint_type: i64,
    pub tiling_type: i64,
    pub bbox: Rect,
    pub x_step: f64,
    pub y_step: f64,
    pub matrix: Matrix,
}

impl TilingParams {
    pub fn parse(xref: &XRef, dict: &Dict) -> Result<Self> {
        let int = |key: &str| {
            xref.get(dict, key)
                .ok_or_else(|| PdfError::KeyError(key.into()))?
                .as_int()
        };
        let num = |key: &str| {
            xref.get(dict, key)
                .ok_or_else(|| PdfError::KeyError(key.into()))?
                .as_num()
        };
        let bbox = xref
            .get(dict, "BBox")
            .ok_or_else(|| PdfError::KeyError("BBox".into()))?
            .as_rect()?;
        Ok(Self {
            paint_type: int("PaintType")?,
            tiling_type: int("TilingType").unwrap_or(1),
            bbox,
            x_step: num("XStep")?,
            y_step: num("YStep")?,
            matrix: pattern_matrix(xref, dict),
        })
    }

    pub fn into_pattern(self, color: Option<[u8; 3]>, operator_list: OperatorList) -> Pattern {
        Pattern::Tiling {
            paint_type: self.paint_type,
            tiling_type: self.tiling_type,
            bbox: self.bbox,
            x_step: self.x_step,
            y_step: self.y_step,
            matrix: self.matrix,
            color,
            operator_list,
        }
    }
}

/// The pattern's `Matrix`, identity when absent or malformed.
pub fn pattern_matrix(xref: &XRef, dict: &Dict) -> Matrix {
    xref.get(dict, "Matrix")
        .and_then(|m| m.as_matrix().ok())
        .unwrap_or(MATRIX_IDENTITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::objects::ObjRef;
    use crate::test_utils::xref_with;

    fn shading(xref: &XRef, num: u32) -> Option<Shading> {
        let obj = PDFObject::Ref(ObjRef::new(num, 0));
        Shading::parse(xref, &obj, None).unwrap()
    }

    #[test]
    fn test_axial_black_to_white() {
        let xref = xref_with(&[(
            2,
            "<< /ShadingType 2 /ColorSpace /DeviceGray /Coords [0 0 100 0] /Extend [true false] \
             /Function << /FunctionType 2 /Domain [0 1] /C0 [0] /C1 [1] /N 1 >> >>",
        )]);
        let sh = shading(&xref, 2).unwrap();
        assert_eq!(sh.kind, ShadingKind::Axial);
        assert_eq!(sh.extend, (true, false));
        let first = sh.stops.first().unwrap();
        let last = sh.stops.last().unwrap();
        assert_eq!((first.offset, first.rgb), (0.0, [0, 0, 0]));
        assert_eq!((last.offset, last.rgb), (1.0, [255, 255, 255]));
    }

    #[test]
    fn test_constant_color_collapses_to_two_stops() {
        let xref = xref_with(&[(
            2,
            "<< /ShadingType 3 /ColorSpace /DeviceRGB /Coords [0 0 0 0 0 10] \
             /Function << /FunctionType 2 /Domain [0 1] /C0 [1 0 0] /C1 [1 0 0] /N 1 >> >>",
        )]);
        let sh = shading(&xref, 2).unwrap();
        assert_eq!(sh.kind, ShadingKind::Radial);
        assert_eq!(sh.stops.len(), 2);
        assert!(sh.stops.iter().all(|s| s.rgb == [255, 0, 0]));
    }

    #[test]
    fn test_mesh_shading_is_skipped() {
        let xref = xref_with(&[(2, "<< /ShadingType 4 /ColorSpace /DeviceRGB >>")]);
        assert!(shading(&xref, 2).is_none());
    }

    #[test]
    fn test_tiling_params() {
        let xref = xref_with(&[]);
        let dict = crate::parser::pdf_parser::parse_object(
            "<< /PatternType 1 /PaintType 2 /TilingType 1 /BBox [0 0 10 10] /XStep 10 /YStep 12 /Matrix [2 0 0 2 0 0] >>",
        )
        .unwrap();
        let params = TilingParams::parse(&xref, dict.as_dict().unwrap()).unwrap();
        assert_eq!(params.paint_type, 2);
        assert_eq!((params.x_step, params.y_step), (10.0, 12.0));
        assert_eq!(params.matrix, (2.0, 0.0, 0.0, 2.0, 0.0, 0.0));
    }
}
