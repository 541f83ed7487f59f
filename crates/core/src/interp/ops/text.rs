//! Text operators.
//!
//! Handles: BT, ET, Tc, Tw, Tz, TL, Tf, Tr, Ts, Td, TD, Tm, T*, Tj, TJ, ', "
//!
//! Text state:
//! - Tc, Tw, Tz, TL, Tr, Ts: spacing, scaling, leading, mode and rise
//! - Tf: font and size; the font is looked up in the `Font` resources
//!
//! Text positioning:
//! - Td/TD: move to the next line (TD also sets the leading to -ty)
//! - Tm: set text and line matrices
//! - T*: next line by the current leading
//!
//! Text showing:
//! - Tj, TJ, ', ": glyphs are advanced one by one; word spacing applies
//!   only to the single-byte code 32 and never to strings inside `TJ`

use crate::error::Result;
use crate::font::PdfFont;
use crate::interp::evaluator::{EvalSink, EvaluatorTask, ShownGlyph};
use crate::interp::operator_list::{OpArg, OpCode, OperatorList, TextPart};
use crate::model::objects::{Name, PDFObject};
use crate::model::state::TextRenderMode;
use crate::utils::{Matrix, mult_matrix};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[allow(non_snake_case)]
impl<S: EvalSink> EvaluatorTask<'_, S> {
    // ========================================================================
    // Text Object Operators
    // ========================================================================

    /// BT - Begin text object.
    pub(crate) fn do_BT(&mut self) {
        self.state.state.text.begin_text();
        self.emit(OpCode::BeginText, vec![]);
    }

    /// ET - End text object.
    pub(crate) fn do_ET(&mut self) {
        self.emit(OpCode::EndText, vec![]);
    }

    // ========================================================================
    // Text State Operators
    // ========================================================================

    pub(crate) fn do_Tc(&mut self, spacing: f64) {
        self.state.state.text.char_spacing = spacing;
        self.emit(OpCode::SetCharSpacing, vec![OpArg::Num(spacing)]);
    }

    pub(crate) fn do_Tw(&mut self, spacing: f64) {
        self.state.state.text.word_spacing = spacing;
        self.emit(OpCode::SetWordSpacing, vec![OpArg::Num(spacing)]);
    }

    /// Tz - Horizontal scaling in percent.
    pub(crate) fn do_Tz(&mut self, scale: f64) {
        self.state.state.text.h_scale = scale / 100.0;
        self.emit(OpCode::SetHScale, vec![OpArg::Num(scale)]);
    }

    pub(crate) fn do_TL(&mut self, leading: f64) {
        self.state.state.text.leading = leading;
        self.emit(OpCode::SetLeading, vec![OpArg::Num(leading)]);
    }

    /// Tf - Set text font and size.
    ///
    /// A name missing from the resources leaves no font selected; the size
    /// still applies, and strings shown until the next `Tf` are skipped.
    pub(crate) fn do_Tf(&mut self, name: Name, size: f64) -> Result<()> {
        self.state.state.text.font_size = size;
        let font = match self.resource("Font", name) {
            Some(obj) => self.ev.load_font(&obj),
            None => {
                warn!(font = %name, "font not found in resources");
                None
            }
        };
        let Some(font) = font else {
            self.state.state.text.font = None;
            return Ok(());
        };
        self.sink.add_dependency(&font.loaded_name);
        self.emit(OpCode::SetFont, vec![OpArg::Str(font.loaded_name.clone()), OpArg::Num(size)]);
        if font.is_type3() {
            self.compile_type3_glyphs(&font);
        }
        self.state.state.text.font = Some(font);
        Ok(())
    }

    /// Evaluates the glyph procedures of a Type 3 font once per sink.
    fn compile_type3_glyphs(&mut self, font: &PdfFont) {
        if self.ev.depth > 0 || !self.sink.wants_paint() || !self.sink.wants_type3_glyphs(&font.loaded_name) {
            return;
        }
        let Some(procs) = &font.char_procs else {
            return;
        };
        let resources = font
            .resources
            .clone()
            .map(Arc::new)
            .or_else(|| self.resources());
        let mut glyphs: IndexMap<String, OperatorList> = IndexMap::new();
        for (glyph, proc) in procs.iter() {
            let Some(proc) = self.ev.xref.resolve(proc) else {
                continue;
            };
            let Ok(stream) = proc.as_stream() else {
                debug!(%glyph, "Type 3 glyph procedure is not a stream");
                continue;
            };
            match self.ev.nested_operator_list(stream, resources.clone(), &self.cancel) {
                Ok(list) => {
                    glyphs.insert(glyph.as_str().to_string(), list);
                }
                Err(err) => warn!(font = %font.loaded_name, %glyph, %err, "failed to evaluate Type 3 glyph"),
            }
        }
        self.sink.add_type3_glyphs(&font.loaded_name, glyphs);
    }

    /// Tr - Set text rendering mode.
    pub(crate) fn do_Tr(&mut self, mode: i64) {
        match TextRenderMode::from_i64(mode) {
            Some(m) => self.state.state.text.render_mode = m,
            None => warn!(mode, "invalid text rendering mode"),
        }
        self.emit(OpCode::SetTextRenderingMode, vec![OpArg::Int(mode)]);
    }

    pub(crate) fn do_Ts(&mut self, rise: f64) {
        self.state.state.text.rise = rise;
        self.emit(OpCode::SetTextRise, vec![OpArg::Num(rise)]);
    }

    // ========================================================================
    // Text Positioning Operators
    // ========================================================================

    pub(crate) fn do_Td(&mut self, tx: f64, ty: f64) {
        self.state.state.text.translate_line(tx, ty);
        self.emit(OpCode::MoveText, vec![OpArg::Num(tx), OpArg::Num(ty)]);
    }

    /// TD - Move to the next line and set the leading to `-ty`.
    pub(crate) fn do_TD(&mut self, tx: f64, ty: f64) {
        self.state.state.text.leading = -ty;
        self.state.state.text.translate_line(tx, ty);
        self.emit(OpCode::SetLeadingMoveText, vec![OpArg::Num(tx), OpArg::Num(ty)]);
    }

    pub(crate) fn do_Tm(&mut self, m: Matrix) {
        self.state.state.text.set_matrix(m);
        self.emit(
            OpCode::SetTextMatrix,
            [m.0, m.1, m.2, m.3, m.4, m.5].into_iter().map(OpArg::Num).collect(),
        );
    }

    pub(crate) fn do_T_star(&mut self) {
        self.state.state.text.next_line();
        self.emit(OpCode::NextLine, vec![]);
    }

    // ========================================================================
    // Text Showing Operators
    // ========================================================================

    pub(crate) fn do_Tj(&mut self, s: &[u8]) {
        let mut parts = Vec::new();
        if self.show_string(s, false, &mut parts) {
            self.emit(OpCode::ShowText, vec![OpArg::Glyphs(parts)]);
        }
    }

    /// TJ - Strings and positioning adjustments in thousandths of a text
    /// space unit.
    pub(crate) fn do_TJ(&mut self, items: &[PDFObject]) {
        if self.state.state.text.font.is_none() {
            debug!("TJ without a font, skipped");
            return;
        }
        let mut parts = Vec::new();
        for item in items {
            match item {
                PDFObject::String(s) => {
                    self.show_string(s, true, &mut parts);
                }
                other => match other.as_num() {
                    Ok(adjust) => {
                        self.adjust_position(adjust);
                        parts.push(TextPart::Spacing(adjust));
                    }
                    Err(_) => debug!(got = other.type_name(), "ignoring TJ element"),
                },
            }
        }
        self.emit(OpCode::ShowSpacedText, vec![OpArg::Glyphs(parts)]);
    }

    /// ' - Move to the next line and show a string.
    pub(crate) fn do_quote(&mut self, s: &[u8]) {
        self.state.state.text.next_line();
        self.emit(OpCode::NextLine, vec![]);
        self.do_Tj(s);
    }

    /// " - Set word and character spacing, then behave like `'`.
    pub(crate) fn do_double_quote(&mut self, word_spacing: f64, char_spacing: f64, s: &[u8]) {
        self.do_Tw(word_spacing);
        self.do_Tc(char_spacing);
        self.do_quote(s);
    }

    fn adjust_position(&mut self, adjust: f64) {
        let text = &mut self.state.state.text;
        let offset = -adjust / 1000.0 * text.font_size;
        let vertical = text.font.as_ref().is_some_and(|f| f.vertical);
        if vertical {
            text.advance(0.0, offset);
        } else {
            text.advance(offset * text.h_scale, 0.0);
        }
    }

    /// Advances through the glyphs of `s`, reporting each to the sink and
    /// appending it to `parts`. Returns false when no font is selected.
    fn show_string(&mut self, s: &[u8], in_array: bool, parts: &mut Vec<TextPart>) -> bool {
        let Some(font) = self.state.state.text.font.clone() else {
            debug!("text shown without a font, skipped");
            return false;
        };
        let ctm = self.state.state.ctm;
        for glyph in font.glyphs(s) {
            let text = &self.state.state.text;
            let size = text.font_size;
            let word_spacing = if glyph.is_space && !in_array {
                text.word_spacing
            } else {
                0.0
            };
            let (tx, ty) = if font.vertical {
                (0.0, glyph.vertical_advance * size + text.char_spacing + word_spacing)
            } else {
                ((glyph.width * size + text.char_spacing + word_spacing) * text.h_scale, 0.0)
            };
            let m = mult_matrix(text.text_matrix, ctm);
            let shown = ShownGlyph {
                font: &font,
                glyph: &glyph,
                font_size: size,
                trm: text.rendering_matrix(ctm),
                advance: (tx * m.0 + ty * m.2, tx * m.1 + ty * m.3),
                render_mode: text.render_mode,
            };
            if !self.is_hidden() {
                self.sink.show_glyph(&shown);
            }
            self.state.state.text.advance(tx, ty);
            parts.push(TextPart::Glyph {
                code: glyph.code,
                unicode: glyph.unicode,
                width: glyph.width,
            });
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::config::EvaluatorOptions;
    use crate::interp::evaluator::{Evaluator, ResourceCache};
    use crate::interp::operator_list::{OpArg, OpCode, OperatorList, TextPart};
    use crate::model::objects::Dict;
    use crate::parser::pdf_parser::parse_object;
    use crate::test_utils::xref_with;
    use crate::utils::MATRIX_IDENTITY;
    use bytes::Bytes;

    const FONT: (u32, &str) = (
        2,
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /FirstChar 32 /LastChar 65 \
         /Widths [250 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 500] >>",
    );

    fn run(content: &'static [u8], objects: &[(u32, &str)], resources: &'static str) -> OperatorList {
        let xref = xref_with(objects);
        let cache = ResourceCache::new();
        let options = EvaluatorOptions::default();
        let resources: Dict = parse_object(resources).unwrap().as_dict().unwrap().clone();
        Evaluator::new(&xref, &cache, &options)
            .operator_list(&[Bytes::from_static(content)], Some(resources), MATRIX_IDENTITY)
            .unwrap()
    }

    #[test]
    fn test_tf_and_tj_emit_font_and_glyphs() {
        let list = run(b"BT /F1 12 Tf (A A) Tj ET", &[FONT], "<< /Font << /F1 2 0 R >> >>");
        assert_eq!(
            list.fn_array,
            [OpCode::BeginText, OpCode::SetFont, OpCode::ShowText, OpCode::EndText]
        );
        assert_eq!(list.args_array[1], [OpArg::Str("f2_0".into()), OpArg::Num(12.0)]);
        assert!(list.dependencies.contains("f2_0"));
        let OpArg::Glyphs(parts) = &list.args_array[2][0] else {
            panic!("expected glyphs");
        };
        assert_eq!(parts.len(), 3);
        assert!(matches!(&parts[1], TextPart::Glyph { code: 32, width, .. } if *width == 0.25));
    }

    #[test]
    fn test_missing_font_skips_text() {
        let list = run(b"BT /F9 12 Tf (Hello) Tj ET", &[], "<< /Font << >> >>");
        assert_eq!(list.fn_array, [OpCode::BeginText, OpCode::EndText]);
    }

    #[test]
    fn test_tj_array_keeps_adjustments() {
        let list = run(b"BT /F1 10 Tf [(A) -250 (A)] TJ ET", &[FONT], "<< /Font << /F1 2 0 R >> >>");
        let OpArg::Glyphs(parts) = &list.args_array[2][0] else {
            panic!("expected glyphs");
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1], TextPart::Spacing(-250.0));
    }

    #[test]
    fn test_double_quote_sets_spacing_first() {
        let list = run(b"BT /F1 10 Tf 2 1 (A) \" ET", &[FONT], "<< /Font << /F1 2 0 R >> >>");
        assert_eq!(
            &list.fn_array[2..6],
            [
                OpCode::SetWordSpacing,
                OpCode::SetCharSpacing,
                OpCode::NextLine,
                OpCode::ShowText
            ]
        );
    }
}
