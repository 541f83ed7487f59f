//! Operator lists: the renderer-facing output of an evaluation.
//!
//! An `OperatorList` holds two parallel sequences, `fn_array` (what to do)
//! and `args_array` (with what), plus the ids of fonts and images the ops
//! refer to. Opcode names follow the usual content-stream operator naming
//! (`SetFillRGBColor`, `PaintFormXObjectBegin`, ...).

use super::evaluator::EvalSink;
use super::image::ImageData;
use super::pattern::{Pattern, Shading};
use crate::model::objects::{Dict, Name};
use crate::utils::{Matrix, Rect};
use indexmap::{IndexMap, IndexSet};
use std::sync::Arc;

/// Operation codes. Content-stream operators map onto these through the
/// operator table; a few (`PaintFormXObjectBegin`, `BeginGroup`, ...) are
/// only produced by the evaluator itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum OpCode {
    SetLineWidth,
    SetLineCap,
    SetLineJoin,
    SetMiterLimit,
    SetDash,
    SetRenderingIntent,
    SetFlatness,
    SetGState,
    Save,
    Restore,
    Transform,
    MoveTo,
    LineTo,
    CurveTo,
    CurveTo2,
    CurveTo3,
    ClosePath,
    Rectangle,
    Stroke,
    CloseStroke,
    Fill,
    EoFill,
    FillStroke,
    EoFillStroke,
    CloseFillStroke,
    CloseEoFillStroke,
    EndPath,
    Clip,
    EoClip,
    BeginText,
    EndText,
    SetCharSpacing,
    SetWordSpacing,
    SetHScale,
    SetLeading,
    SetFont,
    SetTextRenderingMode,
    SetTextRise,
    MoveText,
    SetLeadingMoveText,
    SetTextMatrix,
    NextLine,
    ShowText,
    ShowSpacedText,
    NextLineShowText,
    NextLineSetSpacingShowText,
    SetCharWidth,
    SetCharWidthAndBounds,
    SetStrokeColorSpace,
    SetFillColorSpace,
    SetStrokeColor,
    SetStrokeColorN,
    SetFillColor,
    SetFillColorN,
    SetStrokeGray,
    SetFillGray,
    SetStrokeRGBColor,
    SetFillRGBColor,
    SetStrokeCMYKColor,
    SetFillCMYKColor,
    ShadingFill,
    BeginInlineImage,
    BeginImageData,
    EndInlineImage,
    PaintXObject,
    MarkPoint,
    MarkPointProps,
    BeginMarkedContent,
    BeginMarkedContentProps,
    EndMarkedContent,
    BeginCompat,
    EndCompat,
    PaintFormXObjectBegin,
    PaintFormXObjectEnd,
    BeginGroup,
    EndGroup,
    PaintImageMaskXObject,
    PaintImageXObject,
    PaintInlineImageXObject,
}

/// One element of a shown string.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum TextPart {
    Glyph {
        code: u32,
        unicode: String,
        /// Advance in text space units, before font size scaling.
        width: f64,
    },
    /// A `TJ` adjustment in thousandths of a text space unit.
    Spacing(f64),
}

/// Operation argument.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum OpArg {
    Num(f64),
    Int(i64),
    Bool(bool),
    Name(Name),
    Str(String),
    Nums(Vec<f64>),
    Rgb([u8; 3]),
    Glyphs(Vec<TextPart>),
    /// Applied ExtGState entries or transparency group parameters.
    Entries(Vec<(Name, OpArg)>),
    Dict(Dict),
    Image(Arc<ImageData>),
    Shading(Arc<Shading>),
    Pattern(Arc<Pattern>),
}

impl OpArg {
    pub fn matrix(m: Matrix) -> Self {
        Self::Nums(vec![m.0, m.1, m.2, m.3, m.4, m.5])
    }

    pub fn rect(r: Rect) -> Self {
        Self::Nums(vec![r.0, r.1, r.2, r.3])
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct OperatorList {
    pub fn_array: Vec<OpCode>,
    pub args_array: Vec<Vec<OpArg>>,
    /// Loaded font names and image ids referenced by the ops.
    pub dependencies: IndexSet<String>,
    /// Glyph procedures of the Type 3 fonts in use, keyed by loaded font
    /// name and then glyph name.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub type3_glyphs: IndexMap<String, IndexMap<String, OperatorList>>,
}

impl OperatorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_op(&mut self, op: OpCode, args: Vec<OpArg>) {
        self.fn_array.push(op);
        self.args_array.push(args);
    }

    pub fn add_dependency(&mut self, id: impl Into<String>) {
        self.dependencies.insert(id.into());
    }

    pub fn len(&self) -> usize {
        self.fn_array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fn_array.is_empty()
    }

    /// `(op, args)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (OpCode, &[OpArg])> {
        self.fn_array
            .iter()
            .copied()
            .zip(self.args_array.iter().map(Vec::as_slice))
    }

    /// Number of occurrences of `op`.
    pub fn count(&self, op: OpCode) -> usize {
        self.fn_array.iter().filter(|&&o| o == op).count()
    }
}

impl EvalSink for OperatorList {
    fn add_op(&mut self, op: OpCode, args: Vec<OpArg>) {
        OperatorList::add_op(self, op, args);
    }

    fn add_dependency(&mut self, id: &str) {
        OperatorList::add_dependency(self, id);
    }

    fn wants_type3_glyphs(&self, font: &str) -> bool {
        !self.type3_glyphs.contains_key(font)
    }

    fn add_type3_glyphs(&mut self, font: &str, glyphs: IndexMap<String, OperatorList>) {
        self.type3_glyphs.insert(font.to_string(), glyphs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallel_arrays_stay_aligned() {
        let mut list = OperatorList::new();
        list.add_op(OpCode::Save, vec![]);
        list.add_op(OpCode::Transform, vec![OpArg::matrix((2.0, 0.0, 0.0, 2.0, 0.0, 0.0))]);
        list.add_op(OpCode::Restore, vec![]);
        assert_eq!(list.len(), 3);
        assert_eq!(list.fn_array.len(), list.args_array.len());
        let ops: Vec<_> = list.iter().map(|(op, _)| op).collect();
        assert_eq!(ops, [OpCode::Save, OpCode::Transform, OpCode::Restore]);
        assert_eq!(list.count(OpCode::Save), 1);
    }

    #[test]
    fn test_dependencies_are_deduplicated() {
        let mut list = OperatorList::new();
        list.add_dependency("f3_0");
        list.add_dependency("f3_0");
        list.add_dependency("img_5_0");
        assert_eq!(list.dependencies.len(), 2);
    }

    #[test]
    fn test_serializes_as_parallel_arrays() {
        let mut list = OperatorList::new();
        list.add_op(OpCode::SetFillRGBColor, vec![OpArg::Rgb([255, 0, 0])]);
        let json = serde_json::to_string(&list).unwrap();
        insta::assert_snapshot!(json, @r#"{"fn_array":["SetFillRGBColor"],"args_array":[[[255,0,0]]],"dependencies":[]}"#);
    }
}
