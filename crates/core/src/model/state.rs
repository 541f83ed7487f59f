//! Graphics and text state carried by the evaluator.
//!
//! The whole state is a single value object: `q` pushes a clone and `Q`
//! pops it back, so nothing in here is shared between stack levels except
//! the immutable font and color-space handles.

use crate::color::ColorSpace;
use crate::font::PdfFont;
use crate::model::objects::Name;
use crate::utils::{MATRIX_IDENTITY, Matrix, mult_matrix};
use smallvec::{SmallVec, smallvec};
use std::sync::Arc;

/// Color components in the current color space.
pub type Components = SmallVec<[f64; 4]>;

/// Text rendering mode (`Tr`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextRenderMode {
    #[default]
    Fill,
    Stroke,
    FillStroke,
    Invisible,
    FillClip,
    StrokeClip,
    FillStrokeClip,
    Clip,
}

impl TextRenderMode {
    pub const fn from_i64(mode: i64) -> Option<Self> {
        Some(match mode {
            0 => Self::Fill,
            1 => Self::Stroke,
            2 => Self::FillStroke,
            3 => Self::Invisible,
            4 => Self::FillClip,
            5 => Self::StrokeClip,
            6 => Self::FillStrokeClip,
            7 => Self::Clip,
            _ => return None,
        })
    }
}

/// Text state parameters (PDF 32000 9.3) plus the text and line matrices.
#[derive(Debug, Clone)]
pub struct TextState {
    pub font: Option<Arc<PdfFont>>,
    pub font_size: f64,
    pub char_spacing: f64,
    pub word_spacing: f64,
    /// Horizontal scaling as a fraction (1.0 = 100%).
    pub h_scale: f64,
    pub leading: f64,
    pub render_mode: TextRenderMode,
    pub rise: f64,
    pub text_matrix: Matrix,
    pub line_matrix: Matrix,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: None,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            h_scale: 1.0,
            leading: 0.0,
            render_mode: TextRenderMode::Fill,
            rise: 0.0,
            text_matrix: MATRIX_IDENTITY,
            line_matrix: MATRIX_IDENTITY,
        }
    }
}

impl TextState {
    /// Resets the text and line matrices; called at `BT`.
    pub fn begin_text(&mut self) {
        self.text_matrix = MATRIX_IDENTITY;
        self.line_matrix = MATRIX_IDENTITY;
    }

    /// Moves to the start of the next line offset by (tx, ty) (`Td`).
    pub fn translate_line(&mut self, tx: f64, ty: f64) {
        let m = self.line_matrix;
        self.line_matrix = (m.0, m.1, m.2, m.3, tx * m.0 + ty * m.2 + m.4, tx * m.1 + ty * m.3 + m.5);
        self.text_matrix = self.line_matrix;
    }

    /// Replaces both matrices (`Tm`).
    pub fn set_matrix(&mut self, m: Matrix) {
        self.text_matrix = m;
        self.line_matrix = m;
    }

    /// `T*`: next line using the current leading.
    pub fn next_line(&mut self) {
        self.translate_line(0.0, -self.leading);
    }

    /// Advances the text matrix by (tx, ty) in text space after a glyph.
    pub fn advance(&mut self, tx: f64, ty: f64) {
        self.text_matrix = mult_matrix((1.0, 0.0, 0.0, 1.0, tx, ty), self.text_matrix);
    }

    /// Text rendering matrix: text space to device space.
    pub fn rendering_matrix(&self, ctm: Matrix) -> Matrix {
        let params = (
            self.font_size * self.h_scale,
            0.0,
            0.0,
            self.font_size,
            0.0,
            self.rise,
        );
        mult_matrix(mult_matrix(params, self.text_matrix), ctm)
    }
}

/// Soft-mask reference applied by `gs /SMask`.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftMaskState {
    pub subtype: Name,
    pub backdrop: Option<Components>,
}

/// The complete graphics state at one point of a content stream.
#[derive(Debug, Clone)]
pub struct GraphicsState {
    pub ctm: Matrix,
    pub fill_color_space: Arc<ColorSpace>,
    pub stroke_color_space: Arc<ColorSpace>,
    pub fill_color: Components,
    pub stroke_color: Components,
    pub line_width: f64,
    pub line_cap: i64,
    pub line_join: i64,
    pub miter_limit: f64,
    pub dash: (Vec<f64>, f64),
    pub rendering_intent: Option<Name>,
    pub flatness: f64,
    pub blend_mode: Option<Name>,
    pub soft_mask: Option<SoftMaskState>,
    pub fill_alpha: f64,
    pub stroke_alpha: f64,
    pub alpha_is_shape: bool,
    pub text_knockout: bool,
    pub text: TextState,
}

impl Default for GraphicsState {
    fn default() -> Self {
        let gray = Arc::new(ColorSpace::DeviceGray);
        Self {
            ctm: MATRIX_IDENTITY,
            fill_color_space: gray.clone(),
            stroke_color_space: gray,
            fill_color: smallvec![0.0],
            stroke_color: smallvec![0.0],
            line_width: 1.0,
            line_cap: 0,
            line_join: 0,
            miter_limit: 10.0,
            dash: (Vec::new(), 0.0),
            rendering_intent: None,
            flatness: 0.0,
            blend_mode: None,
            soft_mask: None,
            fill_alpha: 1.0,
            stroke_alpha: 1.0,
            alpha_is_shape: false,
            text_knockout: true,
            text: TextState::default(),
        }
    }
}

impl GraphicsState {
    /// Initial state for a page or form drawn with `ctm`.
    pub fn with_ctm(ctm: Matrix) -> Self {
        Self {
            ctm,
            ..Self::default()
        }
    }
}

/// A strict save/restore stack around the current state.
#[derive(Debug, Clone, Default)]
pub struct StateManager {
    pub state: GraphicsState,
    stack: Vec<GraphicsState>,
}

impl StateManager {
    pub fn new(state: GraphicsState) -> Self {
        Self {
            state,
            stack: Vec::new(),
        }
    }

    pub fn save(&mut self) {
        self.stack.push(self.state.clone());
    }

    /// Restores the last saved state. Returns false (and leaves the state
    /// untouched) when the stack is empty.
    pub fn restore(&mut self) -> bool {
        match self.stack.pop() {
            Some(prev) => {
                self.state = prev;
                true
            }
            None => false,
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Pops back down to `depth`, discarding unbalanced saves.
    pub fn restore_to(&mut self, depth: usize) {
        while self.stack.len() > depth {
            self.restore();
        }
    }

    /// `cm`: new CTM = operand x current CTM.
    pub fn transform(&mut self, m: Matrix) {
        self.state.ctm = mult_matrix(m, self.state.ctm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restore_on_empty_stack_is_noop() {
        let mut mgr = StateManager::default();
        mgr.state.line_width = 3.0;
        assert!(!mgr.restore());
        assert_eq!(mgr.state.line_width, 3.0);
    }

    #[test]
    fn test_save_restore_round_trip() {
        let mut mgr = StateManager::default();
        mgr.save();
        mgr.state.line_width = 7.0;
        mgr.transform((2.0, 0.0, 0.0, 2.0, 0.0, 0.0));
        assert!(mgr.restore());
        assert_eq!(mgr.state.line_width, 1.0);
        assert_eq!(mgr.state.ctm, MATRIX_IDENTITY);
    }

    #[test]
    fn test_transform_premultiplies_operand() {
        let mut mgr = StateManager::new(GraphicsState::with_ctm((1.0, 0.0, 0.0, 1.0, 5.0, 0.0)));
        mgr.transform((2.0, 0.0, 0.0, 2.0, 0.0, 0.0));
        assert_eq!(mgr.state.ctm, (2.0, 0.0, 0.0, 2.0, 5.0, 0.0));
    }

    #[test]
    fn test_text_line_moves() {
        let mut ts = TextState::default();
        ts.translate_line(10.0, 20.0);
        ts.leading = 12.0;
        ts.next_line();
        assert_eq!(ts.text_matrix, (1.0, 0.0, 0.0, 1.0, 10.0, 8.0));
        ts.advance(5.0, 0.0);
        assert_eq!(ts.text_matrix.4, 15.0);
        assert_eq!(ts.line_matrix.4, 10.0);
    }
}
