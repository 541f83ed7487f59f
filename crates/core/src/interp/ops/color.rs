//! Color operators.
//!
//! Handles: G, g, RG, rg, K, k, CS, cs, SC, SCN, sc, scn
//!
//! Colors are converted to RGB as they are set, so the operator list only
//! carries `Set*RGBColor` ops. Pattern colors carry the evaluated pattern
//! instead.

use crate::color::ColorSpace;
use crate::error::{PdfError, Result};
use crate::interp::evaluator::{EvalSink, EvaluatorTask};
use crate::interp::operator_list::{OpArg, OpCode};
use crate::interp::pattern::{Pattern, Shading, TilingParams, pattern_matrix};
use crate::model::objects::{Name, PDFObject};
use std::sync::Arc;
use tracing::warn;

const fn rgb_op(stroke: bool) -> OpCode {
    if stroke {
        OpCode::SetStrokeRGBColor
    } else {
        OpCode::SetFillRGBColor
    }
}

impl<S: EvalSink> EvaluatorTask<'_, S> {
    /// G, g, RG, rg, K, k - Select a device space and set a color in it.
    pub(crate) fn do_device_color(&mut self, stroke: bool, cs: ColorSpace, comps: &[f64]) {
        let rgb = cs.get_rgb(comps);
        self.set_color(stroke, Arc::new(cs), comps);
        self.emit(rgb_op(stroke), vec![OpArg::Rgb(rgb)]);
    }

    fn set_color(&mut self, stroke: bool, cs: Arc<ColorSpace>, comps: &[f64]) {
        let gs = &mut self.state.state;
        if stroke {
            gs.stroke_color_space = cs;
            gs.stroke_color = comps.iter().copied().collect();
        } else {
            gs.fill_color_space = cs;
            gs.fill_color = comps.iter().copied().collect();
        }
    }

    /// CS, cs - Set the color space and its initial color.
    pub(crate) fn do_cs(&mut self, obj: &PDFObject, stroke: bool) -> Result<()> {
        let resources = self.resources();
        let cs = ColorSpace::parse(obj, self.ev.xref, resources.as_deref())?;
        let initial = cs.default_color();
        self.set_color(stroke, Arc::new(cs), &initial);
        Ok(())
    }

    /// SC, SCN, sc, scn - Set a color in the current color space.
    ///
    /// Under a `Pattern` space the last operand names the pattern; the
    /// numbers before it color an uncolored tiling pattern.
    pub(crate) fn do_sc(&mut self, stroke: bool) -> Result<()> {
        let cs = if stroke {
            self.state.state.stroke_color_space.clone()
        } else {
            self.state.state.fill_color_space.clone()
        };
        if let ColorSpace::Pattern { base } = cs.as_ref() {
            let name = self.operands.pop_name()?;
            let comps = self
                .operands
                .take_all()
                .iter()
                .map(PDFObject::as_num)
                .collect::<Result<Vec<_>>>()?;
            return self.set_pattern(stroke, name, &comps, base.clone());
        }

        let operands = self.operands.take_all();
        if operands.is_empty() {
            return Err(PdfError::MissingData("color components"));
        }
        let comps = operands.iter().map(PDFObject::as_num).collect::<Result<Vec<_>>>()?;
        let rgb = cs.get_rgb(&comps);
        self.set_color(stroke, cs, &comps);
        self.emit(rgb_op(stroke), vec![OpArg::Rgb(rgb)]);
        Ok(())
    }

    fn set_pattern(&mut self, stroke: bool, name: Name, comps: &[f64], base: Option<Arc<ColorSpace>>) -> Result<()> {
        let Some(obj) = self.resource("Pattern", name) else {
            warn!(%name, "pattern resource not found");
            return Ok(());
        };
        if !self.sink.wants_paint() {
            return Ok(());
        }
        let xref = self.ev.xref;
        let resolved = xref.resolve(&obj).ok_or(PdfError::MissingData("pattern"))?;
        let dict = resolved.as_dict()?;
        let pattern_type = xref.get(dict, "PatternType").and_then(|t| t.as_int().ok());
        let pattern = match pattern_type {
            Some(1) => {
                let stream = resolved.as_stream()?;
                let params = TilingParams::parse(xref, dict)?;
                let color = match (params.paint_type, &base) {
                    (2, Some(base)) => Some(base.get_rgb(comps)),
                    _ => None,
                };
                let resources = xref.get_dict(dict, "Resources").map(Arc::new).or_else(|| self.resources());
                let list = self.ev.nested_operator_list(stream, resources, &self.cancel)?;
                for dep in &list.dependencies {
                    self.sink.add_dependency(dep);
                }
                params.into_pattern(color, list)
            }
            Some(2) => {
                let shading_obj = dict
                    .get("Shading")
                    .ok_or_else(|| PdfError::KeyError("Shading".into()))?;
                let resources = self.resources();
                let Some(shading) = Shading::parse(xref, shading_obj, resources.as_deref())? else {
                    return Ok(());
                };
                Pattern::Shading {
                    shading,
                    matrix: pattern_matrix(xref, dict),
                }
            }
            other => {
                warn!(%name, pattern_type = ?other, "unknown pattern type");
                return Ok(());
            }
        };
        let op = if stroke {
            OpCode::SetStrokeColorN
        } else {
            OpCode::SetFillColorN
        };
        self.emit(op, vec![OpArg::Pattern(Arc::new(pattern))]);
        Ok(())
    }
}
