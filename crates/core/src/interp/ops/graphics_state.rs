//! Graphics state operators.
//!
//! Handles: q, Q, cm, w, J, j, M, d, ri, i, gs
//!
//! - q/Q: push/pop the graphics state; a `Q` without a matching `q` in the
//!   same content stream or form is ignored
//! - cm: concatenate onto the CTM
//! - gs: apply an `ExtGState` resource

use crate::error::Result;
use crate::interp::evaluator::{EvalSink, EvaluatorTask};
use crate::interp::operator_list::{OpArg, OpCode};
use crate::model::objects::{Dict, Name, PDFObject};
use crate::model::state::SoftMaskState;
use crate::utils::Matrix;
use tracing::{debug, warn};

fn nums(values: &[f64]) -> Vec<OpArg> {
    values.iter().copied().map(OpArg::Num).collect()
}

#[allow(non_snake_case)]
impl<S: EvalSink> EvaluatorTask<'_, S> {
    /// PDF operator: `q`
    pub(crate) fn do_q(&mut self) {
        self.state.save();
        self.emit(OpCode::Save, vec![]);
    }

    /// PDF operator: `Q`
    pub(crate) fn do_Q(&mut self) {
        if !self.can_restore() {
            debug!("Q without matching q, ignored");
            return;
        }
        self.state.restore();
        self.emit(OpCode::Restore, vec![]);
    }

    /// PDF operator: `cm`
    pub(crate) fn do_cm(&mut self, m: Matrix) {
        self.state.transform(m);
        self.emit(OpCode::Transform, nums(&[m.0, m.1, m.2, m.3, m.4, m.5]));
    }

    /// PDF operator: `w`
    pub(crate) fn do_w(&mut self, width: f64) {
        self.state.state.line_width = width;
        self.emit(OpCode::SetLineWidth, vec![OpArg::Num(width)]);
    }

    /// PDF operator: `J`
    pub(crate) fn do_J(&mut self, cap: i64) {
        self.state.state.line_cap = cap;
        self.emit(OpCode::SetLineCap, vec![OpArg::Int(cap)]);
    }

    /// PDF operator: `j`
    pub(crate) fn do_j(&mut self, join: i64) {
        self.state.state.line_join = join;
        self.emit(OpCode::SetLineJoin, vec![OpArg::Int(join)]);
    }

    /// PDF operator: `M`
    pub(crate) fn do_M(&mut self, limit: f64) {
        self.state.state.miter_limit = limit;
        self.emit(OpCode::SetMiterLimit, vec![OpArg::Num(limit)]);
    }

    /// PDF operator: `d`
    pub(crate) fn do_d(&mut self, array: Vec<f64>, phase: f64) {
        self.emit(OpCode::SetDash, vec![OpArg::Nums(array.clone()), OpArg::Num(phase)]);
        self.state.state.dash = (array, phase);
    }

    /// PDF operator: `ri`
    pub(crate) fn do_ri(&mut self, intent: Name) {
        self.state.state.rendering_intent = Some(intent);
        self.emit(OpCode::SetRenderingIntent, vec![OpArg::Name(intent)]);
    }

    /// PDF operator: `i`
    pub(crate) fn do_i(&mut self, flatness: f64) {
        self.state.state.flatness = flatness;
        self.emit(OpCode::SetFlatness, vec![OpArg::Num(flatness)]);
    }

    /// PDF operator: `gs`
    ///
    /// Every applied entry is reported in one `SetGState` op, in dictionary
    /// order. Overprint entries are not supported and are skipped with a
    /// warning.
    pub(crate) fn do_gs(&mut self, name: Name) -> Result<()> {
        let Some(obj) = self.resource("ExtGState", name) else {
            warn!(%name, "ExtGState resource not found");
            return Ok(());
        };
        let Some(dict) = self.ev.xref.resolve(&obj).and_then(|d| d.as_dict().ok().cloned()) else {
            warn!(%name, "ExtGState resource is not a dictionary");
            return Ok(());
        };

        let mut entries = Vec::new();
        for (key, value) in dict.iter() {
            let Some(value) = self.ev.xref.resolve(value) else {
                continue;
            };
            if let Some(arg) = self.apply_gstate_entry(key, &value)? {
                entries.push((key, arg));
            }
        }
        if !entries.is_empty() {
            self.emit(OpCode::SetGState, vec![OpArg::Entries(entries)]);
        }
        Ok(())
    }

    fn apply_gstate_entry(&mut self, key: Name, value: &PDFObject) -> Result<Option<OpArg>> {
        let gs = &mut self.state.state;
        let arg = match key.as_str() {
            "Type" => return Ok(None),
            "LW" => {
                gs.line_width = value.as_num()?;
                OpArg::Num(gs.line_width)
            }
            "LC" => {
                gs.line_cap = value.as_int()?;
                OpArg::Int(gs.line_cap)
            }
            "LJ" => {
                gs.line_join = value.as_int()?;
                OpArg::Int(gs.line_join)
            }
            "ML" => {
                gs.miter_limit = value.as_num()?;
                OpArg::Num(gs.miter_limit)
            }
            "D" => {
                let parts = value.as_array()?;
                let array = parts.first().map(PDFObject::as_num_array).transpose()?.unwrap_or_default();
                let phase = parts.get(1).map(PDFObject::as_num).transpose()?.unwrap_or(0.0);
                gs.dash = (array.clone(), phase);
                OpArg::Entries(vec![
                    (Name::new("Array"), OpArg::Nums(array)),
                    (Name::new("Phase"), OpArg::Num(phase)),
                ])
            }
            "RI" => {
                let intent = value.as_name()?;
                gs.rendering_intent = Some(intent);
                OpArg::Name(intent)
            }
            "FL" => {
                gs.flatness = value.as_num()?;
                OpArg::Num(gs.flatness)
            }
            "Font" => return self.apply_gstate_font(value),
            "BM" => {
                // An array lists fallbacks; the first entry is used.
                let mode = match value {
                    PDFObject::Array(items) => items.first().map(PDFObject::as_name).transpose()?,
                    other => Some(other.as_name()?),
                };
                gs.blend_mode = mode.filter(|m| *m != "Normal" && *m != "Compatible");
                OpArg::Name(mode.unwrap_or_else(|| Name::new("Normal")))
            }
            "SMask" => match value {
                PDFObject::Name(n) if *n == "None" => {
                    gs.soft_mask = None;
                    OpArg::Bool(false)
                }
                other => {
                    let mask = soft_mask(other.as_dict()?);
                    let mut fields = vec![(Name::new("S"), OpArg::Name(mask.subtype))];
                    if let Some(backdrop) = &mask.backdrop {
                        fields.push((Name::new("BC"), OpArg::Nums(backdrop.to_vec())));
                    }
                    gs.soft_mask = Some(mask);
                    OpArg::Entries(fields)
                }
            },
            "ca" => {
                gs.fill_alpha = value.as_num()?.clamp(0.0, 1.0);
                OpArg::Num(gs.fill_alpha)
            }
            "CA" => {
                gs.stroke_alpha = value.as_num()?.clamp(0.0, 1.0);
                OpArg::Num(gs.stroke_alpha)
            }
            "AIS" => {
                gs.alpha_is_shape = value.as_bool()?;
                OpArg::Bool(gs.alpha_is_shape)
            }
            "TK" => {
                gs.text_knockout = value.as_bool()?;
                OpArg::Bool(gs.text_knockout)
            }
            "OP" | "op" | "OPM" => {
                warn!(key = key.as_str(), "overprint is not supported, ignoring");
                return Ok(None);
            }
            other => {
                debug!(key = other, "ExtGState entry not applied");
                return Ok(None);
            }
        };
        Ok(Some(arg))
    }

    /// `Font [font size]` inside an ExtGState.
    fn apply_gstate_font(&mut self, value: &PDFObject) -> Result<Option<OpArg>> {
        let parts = value.as_array()?;
        let (Some(font_obj), Some(size)) = (parts.first(), parts.get(1)) else {
            warn!("ExtGState Font entry is malformed");
            return Ok(None);
        };
        let size = size.as_num()?;
        self.state.state.text.font_size = size;
        let Some(font) = self.ev.load_font(font_obj) else {
            self.state.state.text.font = None;
            return Ok(None);
        };
        self.sink.add_dependency(&font.loaded_name);
        let arg = OpArg::Entries(vec![
            (Name::new("Name"), OpArg::Str(font.loaded_name.clone())),
            (Name::new("Size"), OpArg::Num(size)),
        ]);
        self.state.state.text.font = Some(font);
        Ok(Some(arg))
    }
}

fn soft_mask(dict: &Dict) -> SoftMaskState {
    SoftMaskState {
        subtype: dict.get_name("S").unwrap_or_else(|| Name::new("Alpha")),
        backdrop: dict
            .get("BC")
            .and_then(|bc| bc.as_num_array().ok())
            .map(|bc| bc.into_iter().collect()),
    }
}

#[cfg(test)]
mod tests {
    use crate::config::EvaluatorOptions;
    use crate::interp::evaluator::{Evaluator, ResourceCache};
    use crate::interp::operator_list::{OpArg, OpCode, OperatorList};
    use crate::model::objects::{Dict, Name};
    use crate::parser::pdf_parser::parse_object;
    use crate::test_utils::xref_with;
    use crate::utils::MATRIX_IDENTITY;
    use bytes::Bytes;

    fn resources(src: &'static str) -> Dict {
        parse_object(src).unwrap().as_dict().unwrap().clone()
    }

    #[test]
    fn test_gs_applies_supported_keys() {
        let xref = xref_with(&[(
            2,
            "<< /Type /ExtGState /LW 3 /LC 1 /D [[2 1] 0] /ca 0.5 /CA 2 /BM /Multiply /OP true /SMask /None >>",
        )]);
        let cache = ResourceCache::new();
        let options = EvaluatorOptions::default();
        let list: OperatorList = Evaluator::new(&xref, &cache, &options)
            .operator_list(
                &[Bytes::from_static(b"/G1 gs")],
                Some(resources("<< /ExtGState << /G1 2 0 R >> >>")),
                MATRIX_IDENTITY,
            )
            .unwrap();
        assert_eq!(list.fn_array, [OpCode::SetGState]);
        let OpArg::Entries(entries) = &list.args_array[0][0] else {
            panic!("expected entries");
        };
        let keys: Vec<_> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["LW", "LC", "D", "ca", "CA", "BM", "SMask"]);
        assert_eq!(entries[4].1, OpArg::Num(1.0));
        assert_eq!(entries[5].1, OpArg::Name(Name::new("Multiply")));
    }

    #[test]
    fn test_missing_extgstate_is_skipped() {
        let xref = xref_with(&[]);
        let cache = ResourceCache::new();
        let options = EvaluatorOptions::default();
        let list = Evaluator::new(&xref, &cache, &options)
            .operator_list(&[Bytes::from_static(b"/Nope gs 1 w")], None, MATRIX_IDENTITY)
            .unwrap();
        assert_eq!(list.fn_array, [OpCode::SetLineWidth]);
    }

    #[test]
    fn test_cm_is_emitted_with_operands() {
        let xref = xref_with(&[]);
        let cache = ResourceCache::new();
        let options = EvaluatorOptions::default();
        let list = Evaluator::new(&xref, &cache, &options)
            .operator_list(&[Bytes::from_static(b"q 2 0 0 2 10 20 cm Q")], None, MATRIX_IDENTITY)
            .unwrap();
        assert_eq!(list.fn_array, [OpCode::Save, OpCode::Transform, OpCode::Restore]);
        assert_eq!(list.args_array[1][4], OpArg::Num(10.0));
    }
}
