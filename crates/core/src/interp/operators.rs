//! Content-stream operator table and the operand buffer.
//!
//! Each operator has a fixed operand count, except the `sc`/`scn` color
//! family whose count is only bounded. The evaluator uses the counts to
//! drop surplus operands and to skip operators that arrive short.

use super::operator_list::OpCode;
use crate::error::{PdfError, Result};
use crate::model::objects::{Name, PDFObject};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpInfo {
    pub code: OpCode,
    pub num_args: usize,
    pub variadic: bool,
}

const fn fixed(code: OpCode, num_args: usize) -> OpInfo {
    OpInfo {
        code,
        num_args,
        variadic: false,
    }
}

const fn variadic(code: OpCode, max_args: usize) -> OpInfo {
    OpInfo {
        code,
        num_args: max_args,
        variadic: true,
    }
}

static OPERATORS: LazyLock<FxHashMap<&'static str, OpInfo>> = LazyLock::new(|| {
    use OpCode as O;
    [
        // Graphics state
        ("w", fixed(O::SetLineWidth, 1)),
        ("J", fixed(O::SetLineCap, 1)),
        ("j", fixed(O::SetLineJoin, 1)),
        ("M", fixed(O::SetMiterLimit, 1)),
        ("d", fixed(O::SetDash, 2)),
        ("ri", fixed(O::SetRenderingIntent, 1)),
        ("i", fixed(O::SetFlatness, 1)),
        ("gs", fixed(O::SetGState, 1)),
        ("q", fixed(O::Save, 0)),
        ("Q", fixed(O::Restore, 0)),
        ("cm", fixed(O::Transform, 6)),
        // Path
        ("m", fixed(O::MoveTo, 2)),
        ("l", fixed(O::LineTo, 2)),
        ("c", fixed(O::CurveTo, 6)),
        ("v", fixed(O::CurveTo2, 4)),
        ("y", fixed(O::CurveTo3, 4)),
        ("h", fixed(O::ClosePath, 0)),
        ("re", fixed(O::Rectangle, 4)),
        ("S", fixed(O::Stroke, 0)),
        ("s", fixed(O::CloseStroke, 0)),
        ("f", fixed(O::Fill, 0)),
        ("F", fixed(O::Fill, 0)),
        ("f*", fixed(O::EoFill, 0)),
        ("B", fixed(O::FillStroke, 0)),
        ("B*", fixed(O::EoFillStroke, 0)),
        ("b", fixed(O::CloseFillStroke, 0)),
        ("b*", fixed(O::CloseEoFillStroke, 0)),
        ("n", fixed(O::EndPath, 0)),
        ("W", fixed(O::Clip, 0)),
        ("W*", fixed(O::EoClip, 0)),
        // Text
        ("BT", fixed(O::BeginText, 0)),
        ("ET", fixed(O::EndText, 0)),
        ("Tc", fixed(O::SetCharSpacing, 1)),
        ("Tw", fixed(O::SetWordSpacing, 1)),
        ("Tz", fixed(O::SetHScale, 1)),
        ("TL", fixed(O::SetLeading, 1)),
        ("Tf", fixed(O::SetFont, 2)),
        ("Tr", fixed(O::SetTextRenderingMode, 1)),
        ("Ts", fixed(O::SetTextRise, 1)),
        ("Td", fixed(O::MoveText, 2)),
        ("TD", fixed(O::SetLeadingMoveText, 2)),
        ("Tm", fixed(O::SetTextMatrix, 6)),
        ("T*", fixed(O::NextLine, 0)),
        ("Tj", fixed(O::ShowText, 1)),
        ("TJ", fixed(O::ShowSpacedText, 1)),
        ("'", fixed(O::NextLineShowText, 1)),
        ("\"", fixed(O::NextLineSetSpacingShowText, 3)),
        // Type 3 glyphs
        ("d0", fixed(O::SetCharWidth, 2)),
        ("d1", fixed(O::SetCharWidthAndBounds, 6)),
        // Color
        ("CS", fixed(O::SetStrokeColorSpace, 1)),
        ("cs", fixed(O::SetFillColorSpace, 1)),
        ("SC", variadic(O::SetStrokeColor, 4)),
        ("SCN", variadic(O::SetStrokeColorN, 33)),
        ("sc", variadic(O::SetFillColor, 4)),
        ("scn", variadic(O::SetFillColorN, 33)),
        ("G", fixed(O::SetStrokeGray, 1)),
        ("g", fixed(O::SetFillGray, 1)),
        ("RG", fixed(O::SetStrokeRGBColor, 3)),
        ("rg", fixed(O::SetFillRGBColor, 3)),
        ("K", fixed(O::SetStrokeCMYKColor, 4)),
        ("k", fixed(O::SetFillCMYKColor, 4)),
        // Shading, images, XObjects
        ("sh", fixed(O::ShadingFill, 1)),
        ("BI", fixed(O::BeginInlineImage, 0)),
        ("ID", fixed(O::BeginImageData, 0)),
        ("EI", fixed(O::EndInlineImage, 1)),
        ("Do", fixed(O::PaintXObject, 1)),
        // Marked content
        ("MP", fixed(O::MarkPoint, 1)),
        ("DP", fixed(O::MarkPointProps, 2)),
        ("BMC", fixed(O::BeginMarkedContent, 1)),
        ("BDC", fixed(O::BeginMarkedContentProps, 2)),
        ("EMC", fixed(O::EndMarkedContent, 0)),
        // Compatibility
        ("BX", fixed(O::BeginCompat, 0)),
        ("EX", fixed(O::EndCompat, 0)),
    ]
    .into_iter()
    .collect()
});

/// Table entry for a content-stream command.
pub fn lookup(cmd: &str) -> Option<OpInfo> {
    OPERATORS.get(cmd).copied()
}

/// Operands collected since the last operator.
///
/// `pop` and `shift` fail with `MissingData` on an empty buffer so a
/// truncated stream is distinguishable from invalid content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperandBuffer(VecDeque<PDFObject>);

impl OperandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, obj: PDFObject) {
        self.0.push_back(obj);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Removes the last operand.
    pub fn pop(&mut self) -> Result<PDFObject> {
        self.0.pop_back().ok_or(PdfError::MissingData("operand"))
    }

    /// Removes the first operand.
    pub fn shift(&mut self) -> Result<PDFObject> {
        self.0.pop_front().ok_or(PdfError::MissingData("operand"))
    }

    pub fn pop_num(&mut self) -> Result<f64> {
        self.pop()?.as_num()
    }

    pub fn pop_int(&mut self) -> Result<i64> {
        self.pop()?.as_int()
    }

    pub fn pop_name(&mut self) -> Result<Name> {
        self.pop()?.as_name()
    }

    /// The last `n` operands as numbers, in stream order.
    pub fn pop_nums(&mut self, n: usize) -> Result<Vec<f64>> {
        if self.0.len() < n {
            return Err(PdfError::MissingData("numeric operands"));
        }
        let mut out = vec![0.0; n];
        for slot in out.iter_mut().rev() {
            *slot = self.pop_num()?;
        }
        Ok(out)
    }

    /// Drains every operand in stream order.
    pub fn take_all(&mut self) -> Vec<PDFObject> {
        self.0.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_counts() {
        let cm = lookup("cm").unwrap();
        assert_eq!((cm.code, cm.num_args, cm.variadic), (OpCode::Transform, 6, false));
        assert!(lookup("scn").unwrap().variadic);
        assert_eq!(lookup("F").unwrap().code, OpCode::Fill);
        assert!(lookup("Xx").is_none());
    }

    #[test]
    fn test_empty_buffer_signals_missing_data() {
        let mut buf = OperandBuffer::new();
        assert!(matches!(buf.pop(), Err(PdfError::MissingData(_))));
        assert!(matches!(buf.shift(), Err(PdfError::MissingData(_))));
        buf.push(PDFObject::Int(1));
        assert!(matches!(buf.pop_nums(2), Err(PdfError::MissingData(_))));
    }

    #[test]
    fn test_pop_and_shift_ends() {
        let mut buf = OperandBuffer::new();
        for n in 1..=3 {
            buf.push(PDFObject::Int(n));
        }
        assert_eq!(buf.shift().unwrap(), PDFObject::Int(1));
        assert_eq!(buf.pop_nums(2).unwrap(), vec![2.0, 3.0]);
        assert!(buf.is_empty());
    }
}
