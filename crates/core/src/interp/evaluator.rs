//! Content-stream evaluation.
//!
//! An `EvaluatorTask` walks a page's content (and the forms it paints)
//! operator by operator, keeps the graphics state, and reports what it
//! sees to an `EvalSink`. The operator-list builder and the text extractor
//! are both sinks over the same walk.
//!
//! Work is done in batches through `step`, so a caller can interleave other
//! work or abandon an evaluation through its `CancellationToken`. Nested
//! forms are pushed as frames instead of recursing, which keeps the whole
//! evaluation resumable.

use super::content::{ContentItem, ContentParser};
use super::image::ImageData;
use super::operator_list::{OpArg, OpCode, OperatorList};
use super::operators::{self, OperandBuffer};
use crate::config::EvaluatorOptions;
use crate::document::xref::XRef;
use crate::error::{PdfError, Result};
use crate::font::PdfFont;
use crate::font::pdffont::Glyph;
use crate::model::objects::{Cmd, Dict, Name, ObjRef, PDFObject, PDFStream};
use crate::model::state::{GraphicsState, StateManager, TextRenderMode};
use crate::utils::{MATRIX_IDENTITY, Matrix, Point};
use bytes::Bytes;
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace, warn};

/// A glyph as it is painted.
#[derive(Debug)]
pub struct ShownGlyph<'a> {
    pub font: &'a PdfFont,
    pub glyph: &'a Glyph,
    pub font_size: f64,
    /// Text rendering matrix at the glyph origin.
    pub trm: Matrix,
    /// Advance of the glyph in device space.
    pub advance: Point,
    pub render_mode: TextRenderMode,
}

/// Receiver of an evaluation.
///
/// Only `add_op` is required. The other hooks default to doing nothing so a
/// sink picks the events it cares about.
pub trait EvalSink {
    fn add_op(&mut self, op: OpCode, args: Vec<OpArg>);

    fn add_dependency(&mut self, _id: &str) {}

    /// False when painting operations (images, shadings, patterns) need not
    /// be built.
    fn wants_paint(&self) -> bool {
        true
    }

    fn show_glyph(&mut self, _glyph: &ShownGlyph<'_>) {}

    fn begin_marked_content(&mut self, _tag: Name, _props: Option<&Dict>) {}

    fn end_marked_content(&mut self) {}

    /// True when the glyph procedures of the Type 3 font `font` should be
    /// compiled and handed to `add_type3_glyphs`.
    fn wants_type3_glyphs(&self, _font: &str) -> bool {
        false
    }

    fn add_type3_glyphs(&mut self, _font: &str, _glyphs: IndexMap<String, OperatorList>) {}
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// More content remains.
    Pending,
    Done,
    /// The token was cancelled; the sink holds what was produced so far.
    Cancelled,
}

/// Fonts and images loaded for a document, keyed by object reference.
///
/// Failed font loads are cached too so a broken font is reported once.
#[derive(Debug, Default)]
pub struct ResourceCache {
    fonts: Mutex<FxHashMap<ObjRef, Option<Arc<PdfFont>>>>,
    images: Mutex<FxHashMap<ObjRef, Arc<ImageData>>>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn font(&self, r: ObjRef) -> Option<Option<Arc<PdfFont>>> {
        self.fonts.lock().unwrap_or_else(|e| e.into_inner()).get(&r).cloned()
    }

    pub(crate) fn insert_font(&self, r: ObjRef, font: Option<Arc<PdfFont>>) {
        self.fonts.lock().unwrap_or_else(|e| e.into_inner()).insert(r, font);
    }

    pub(crate) fn image(&self, r: ObjRef) -> Option<Arc<ImageData>> {
        self.images.lock().unwrap_or_else(|e| e.into_inner()).get(&r).cloned()
    }

    pub(crate) fn insert_image(&self, r: ObjRef, image: Arc<ImageData>) {
        self.images.lock().unwrap_or_else(|e| e.into_inner()).insert(r, image);
    }

    pub fn clear(&self) {
        self.fonts.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.images.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Evaluation context shared by a task and the sub-evaluations it starts.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    pub xref: &'a XRef,
    pub(crate) cache: &'a ResourceCache,
    pub options: &'a EvaluatorOptions,
    /// Optional content groups whose marked content is skipped.
    pub(crate) hidden_groups: Option<&'a FxHashSet<ObjRef>>,
    /// Nesting level of tiling patterns and Type 3 glyph procedures.
    pub(crate) depth: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(xref: &'a XRef, cache: &'a ResourceCache, options: &'a EvaluatorOptions) -> Self {
        Self {
            xref,
            cache,
            options,
            hidden_groups: None,
            depth: 0,
        }
    }

    pub fn with_hidden_groups(mut self, groups: &'a FxHashSet<ObjRef>) -> Self {
        self.hidden_groups = Some(groups);
        self
    }

    /// Starts an evaluation of the content `parts` (the streams of one
    /// `Contents` array, in order).
    pub fn task<S: EvalSink>(
        self,
        parts: &[Bytes],
        resources: Option<Dict>,
        ctm: Matrix,
        sink: S,
        cancel: CancellationToken,
    ) -> EvaluatorTask<'a, S> {
        EvaluatorTask::new(self, parts, resources.map(Arc::new), ctm, sink, cancel)
    }

    /// Evaluates `parts` to completion into an operator list.
    pub fn operator_list(self, parts: &[Bytes], resources: Option<Dict>, ctm: Matrix) -> Result<OperatorList> {
        let mut task = self.task(parts, resources, ctm, OperatorList::new(), CancellationToken::new());
        task.run()?;
        Ok(task.into_sink())
    }

    /// Evaluates a self-contained stream (pattern cell, glyph procedure)
    /// one level deeper.
    pub(crate) fn nested_operator_list(
        self,
        stream: &PDFStream,
        resources: Option<Arc<Dict>>,
        cancel: &CancellationToken,
    ) -> Result<OperatorList> {
        if self.depth >= self.options.max_form_depth {
            return Err(PdfError::SyntaxError("content nested too deeply".into()));
        }
        let data = Bytes::from(self.xref.decode_stream(stream)?.data);
        let nested = Self {
            depth: self.depth + 1,
            ..self
        };
        let mut task = EvaluatorTask::new(
            nested,
            &[data],
            resources,
            MATRIX_IDENTITY,
            OperatorList::new(),
            cancel.clone(),
        );
        task.run()?;
        Ok(task.into_sink())
    }

    /// Loads (or fetches from the cache) the font an entry of a `Font`
    /// resource dictionary names. Direct font dictionaries are not cached.
    pub fn load_font(&self, obj: &PDFObject) -> Option<Arc<PdfFont>> {
        match obj {
            PDFObject::Ref(r) => {
                if let Some(cached) = self.cache.font(*r) {
                    return cached;
                }
                let font = match self.xref.fetch_dict(*r) {
                    Some(dict) => match PdfFont::load(self.xref, &dict, Some(*r)) {
                        Ok(font) => Some(Arc::new(font)),
                        Err(err) => {
                            warn!(font = %r, %err, "failed to load font");
                            None
                        }
                    },
                    None => {
                        warn!(font = %r, "font object is missing");
                        None
                    }
                };
                self.cache.insert_font(*r, font.clone());
                font
            }
            PDFObject::Dict(dict) => match PdfFont::load(self.xref, dict, None) {
                Ok(font) => Some(Arc::new(font)),
                Err(err) => {
                    warn!(%err, "failed to load inline font dictionary");
                    None
                }
            },
            other => {
                warn!(got = other.type_name(), "font resource is not a dictionary");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    Content,
    Form { group: bool, objref: Option<ObjRef> },
}

#[derive(Debug)]
pub(crate) struct Frame {
    parser: ContentParser,
    resources: Option<Arc<Dict>>,
    /// Save depth the frame started at; `Q` never pops below it.
    base_depth: usize,
    kind: FrameKind,
}

/// One resumable evaluation.
#[derive(Debug)]
pub struct EvaluatorTask<'a, S: EvalSink> {
    pub(crate) ev: Evaluator<'a>,
    frames: Vec<Frame>,
    pub(crate) state: StateManager,
    pub(crate) operands: OperandBuffer,
    pub(crate) sink: S,
    pub(crate) cancel: CancellationToken,
    pub(crate) compat_depth: usize,
    /// One entry per open marked-content section: true when it hides its
    /// content.
    pub(crate) marked: Vec<bool>,
    pub(crate) hidden_depth: usize,
    pub(crate) inline_images: usize,
    done: bool,
}

impl<'a, S: EvalSink> EvaluatorTask<'a, S> {
    fn new(
        ev: Evaluator<'a>,
        parts: &[Bytes],
        resources: Option<Arc<Dict>>,
        ctm: Matrix,
        sink: S,
        cancel: CancellationToken,
    ) -> Self {
        let frame = Frame {
            parser: ContentParser::from_parts(parts),
            resources,
            base_depth: 0,
            kind: FrameKind::Content,
        };
        Self {
            ev,
            frames: vec![frame],
            state: StateManager::new(GraphicsState::with_ctm(ctm)),
            operands: OperandBuffer::new(),
            sink,
            cancel,
            compat_depth: 0,
            marked: Vec::new(),
            hidden_depth: 0,
            inline_images: 0,
            done: false,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Processes up to `batch_size` operators.
    pub fn step(&mut self) -> Result<StepOutcome> {
        if self.done {
            return Ok(StepOutcome::Done);
        }
        if self.cancel.is_cancelled() {
            debug!("evaluation cancelled");
            self.done = true;
            return Ok(StepOutcome::Cancelled);
        }
        let mut budget = self.ev.options.batch_size.max(1);
        while budget > 0 {
            let Some(frame) = self.frames.last_mut() else {
                break;
            };
            match frame.parser.read(&mut self.operands) {
                None => self.end_frame(),
                Some(ContentItem::Operator(cmd)) => {
                    budget -= 1;
                    self.dispatch(cmd)?;
                }
                Some(ContentItem::InlineImage { dict, data }) => {
                    budget -= 1;
                    self.operands.clear();
                    let result = self.do_inline_image(dict, data);
                    self.check(result, "BI")?;
                }
            }
        }
        if self.frames.is_empty() {
            self.done = true;
            return Ok(StepOutcome::Done);
        }
        Ok(StepOutcome::Pending)
    }

    /// Steps until done or cancelled. Cancellation is not an error.
    pub fn run(&mut self) -> Result<()> {
        while self.step()? == StepOutcome::Pending {}
        Ok(())
    }

    pub(crate) fn resources(&self) -> Option<Arc<Dict>> {
        self.frames.last().and_then(|f| f.resources.clone())
    }

    /// Looks up `name` in the `category` dictionary of the current
    /// resources (`Font`, `XObject`, `ExtGState`, ...). The entry is
    /// returned unresolved.
    pub(crate) fn resource(&self, category: &str, name: Name) -> Option<PDFObject> {
        let resources = self.resources()?;
        let dict = self.ev.xref.get(&resources, category)?;
        dict.as_dict().ok()?.get_by_name(name).cloned()
    }

    /// Adds an op unless the content is inside a hidden optional-content
    /// section.
    pub(crate) fn emit(&mut self, op: OpCode, args: Vec<OpArg>) {
        if self.hidden_depth == 0 {
            self.sink.add_op(op, args);
        }
    }

    pub(crate) fn is_hidden(&self) -> bool {
        self.hidden_depth > 0
    }

    fn base_depth(&self) -> usize {
        self.frames.last().map_or(0, |f| f.base_depth)
    }

    /// True when a `Q` at this point matches a `q` of the current frame.
    pub(crate) fn can_restore(&self) -> bool {
        self.state.depth() > self.base_depth()
    }

    /// Emits a `Restore` for every save the current frame left open.
    fn close_pending_saves(&mut self, depth: usize) {
        while self.state.depth() > depth {
            self.state.restore();
            self.emit(OpCode::Restore, vec![]);
        }
    }

    fn end_frame(&mut self) {
        let Some(frame) = self.frames.last() else {
            return;
        };
        let (base, kind) = (frame.base_depth, frame.kind);
        self.operands.clear();
        self.close_pending_saves(base);
        self.frames.pop();
        if let FrameKind::Form { group, .. } = kind {
            self.state.restore();
            self.emit(OpCode::PaintFormXObjectEnd, vec![]);
            if group {
                self.emit(OpCode::EndGroup, vec![]);
            }
        }
    }

    /// True when the form `r` is already being painted further up.
    pub(crate) fn form_in_progress(&self, r: ObjRef) -> bool {
        self.frames
            .iter()
            .any(|f| matches!(f.kind, FrameKind::Form { objref: Some(o), .. } if o == r))
    }

    pub(crate) fn form_depth(&self) -> usize {
        self.frames
            .iter()
            .filter(|f| matches!(f.kind, FrameKind::Form { .. }))
            .count()
    }

    /// Pushes a form's content as a new frame. The caller has already
    /// saved the state and applied the form matrix.
    pub(crate) fn push_form(&mut self, data: Bytes, resources: Option<Arc<Dict>>, group: bool, objref: Option<ObjRef>) {
        self.frames.push(Frame {
            parser: ContentParser::new(data),
            resources,
            base_depth: self.state.depth(),
            kind: FrameKind::Form { group, objref },
        });
    }

    /// Applies the failure policy to an operator result.
    fn check(&self, result: Result<()>, op: &str) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(err) if self.ev.options.ignore_errors => {
                warn!(op, %err, "operator failed, skipping");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn dispatch(&mut self, cmd: Cmd) -> Result<()> {
        let op = cmd.as_str();
        let Some(info) = operators::lookup(op) else {
            if self.compat_depth > 0 {
                debug!(op, "unknown operator inside BX/EX");
            } else {
                warn!(op, "unknown operator");
            }
            self.operands.clear();
            return Ok(());
        };
        if !info.variadic && self.operands.len() < info.num_args {
            warn!(
                op,
                expected = info.num_args,
                got = self.operands.len(),
                "too few operands, skipping operator"
            );
            self.operands.clear();
            return Ok(());
        }
        while self.operands.len() > info.num_args {
            let extra = self.operands.shift()?;
            trace!(op, dropped = extra.type_name(), "surplus operand");
        }
        let result = self.execute(info.code);
        self.operands.clear();
        self.check(result, op)
    }

    #[allow(non_snake_case)]
    fn execute(&mut self, code: OpCode) -> Result<()> {
        use OpCode as O;
        match code {
            // Graphics state
            O::Save => self.do_q(),
            O::Restore => self.do_Q(),
            O::Transform => {
                let m = self.pop_matrix()?;
                self.do_cm(m);
            }
            O::SetLineWidth => {
                let w = self.operands.pop_num()?;
                self.do_w(w);
            }
            O::SetLineCap => {
                let cap = self.operands.pop_int()?;
                self.do_J(cap);
            }
            O::SetLineJoin => {
                let join = self.operands.pop_int()?;
                self.do_j(join);
            }
            O::SetMiterLimit => {
                let limit = self.operands.pop_num()?;
                self.do_M(limit);
            }
            O::SetDash => {
                let phase = self.operands.pop_num()?;
                let array = self.operands.pop()?.as_num_array()?;
                self.do_d(array, phase);
            }
            O::SetRenderingIntent => {
                let intent = self.operands.pop_name()?;
                self.do_ri(intent);
            }
            O::SetFlatness => {
                let flatness = self.operands.pop_num()?;
                self.do_i(flatness);
            }
            O::SetGState => {
                let name = self.operands.pop_name()?;
                self.do_gs(name)?;
            }

            // Path construction and painting
            O::MoveTo
            | O::LineTo
            | O::CurveTo
            | O::CurveTo2
            | O::CurveTo3
            | O::Rectangle
            | O::ClosePath
            | O::Stroke
            | O::CloseStroke
            | O::Fill
            | O::EoFill
            | O::FillStroke
            | O::EoFillStroke
            | O::CloseFillStroke
            | O::CloseEoFillStroke
            | O::EndPath
            | O::Clip
            | O::EoClip => self.do_path(code)?,

            // Text
            O::BeginText => self.do_BT(),
            O::EndText => self.do_ET(),
            O::SetCharSpacing => {
                let v = self.operands.pop_num()?;
                self.do_Tc(v);
            }
            O::SetWordSpacing => {
                let v = self.operands.pop_num()?;
                self.do_Tw(v);
            }
            O::SetHScale => {
                let v = self.operands.pop_num()?;
                self.do_Tz(v);
            }
            O::SetLeading => {
                let v = self.operands.pop_num()?;
                self.do_TL(v);
            }
            O::SetFont => {
                let size = self.operands.pop_num()?;
                let name = self.operands.pop_name()?;
                self.do_Tf(name, size)?;
            }
            O::SetTextRenderingMode => {
                let mode = self.operands.pop_int()?;
                self.do_Tr(mode);
            }
            O::SetTextRise => {
                let v = self.operands.pop_num()?;
                self.do_Ts(v);
            }
            O::MoveText => {
                let ty = self.operands.pop_num()?;
                let tx = self.operands.pop_num()?;
                self.do_Td(tx, ty);
            }
            O::SetLeadingMoveText => {
                let ty = self.operands.pop_num()?;
                let tx = self.operands.pop_num()?;
                self.do_TD(tx, ty);
            }
            O::SetTextMatrix => {
                let m = self.pop_matrix()?;
                self.do_Tm(m);
            }
            O::NextLine => self.do_T_star(),
            O::ShowText => {
                let s = self.pop_string()?;
                self.do_Tj(&s);
            }
            O::ShowSpacedText => {
                let items = self.operands.pop()?;
                self.do_TJ(items.as_array()?);
            }
            O::NextLineShowText => {
                let s = self.pop_string()?;
                self.do_quote(&s);
            }
            O::NextLineSetSpacingShowText => {
                let s = self.pop_string()?;
                let char_spacing = self.operands.pop_num()?;
                let word_spacing = self.operands.pop_num()?;
                self.do_double_quote(word_spacing, char_spacing, &s);
            }
            O::SetCharWidth => {
                let nums = self.operands.pop_nums(2)?;
                self.emit(code, nums.into_iter().map(OpArg::Num).collect());
            }
            O::SetCharWidthAndBounds => {
                let nums = self.operands.pop_nums(6)?;
                self.emit(code, nums.into_iter().map(OpArg::Num).collect());
            }

            // Color
            O::SetStrokeColorSpace | O::SetFillColorSpace => {
                let name = self.operands.pop()?;
                self.do_cs(&name, code == O::SetStrokeColorSpace)?;
            }
            O::SetStrokeColor | O::SetStrokeColorN => self.do_sc(true)?,
            O::SetFillColor | O::SetFillColorN => self.do_sc(false)?,
            O::SetStrokeGray | O::SetFillGray => {
                let nums = self.operands.pop_nums(1)?;
                self.do_device_color(code == O::SetStrokeGray, crate::color::ColorSpace::DeviceGray, &nums);
            }
            O::SetStrokeRGBColor | O::SetFillRGBColor => {
                let nums = self.operands.pop_nums(3)?;
                self.do_device_color(code == O::SetStrokeRGBColor, crate::color::ColorSpace::DeviceRGB, &nums);
            }
            O::SetStrokeCMYKColor | O::SetFillCMYKColor => {
                let nums = self.operands.pop_nums(4)?;
                self.do_device_color(code == O::SetStrokeCMYKColor, crate::color::ColorSpace::DeviceCMYK, &nums);
            }

            // Shading, XObjects
            O::ShadingFill => {
                let name = self.operands.pop_name()?;
                self.do_sh(name)?;
            }
            O::PaintXObject => {
                let name = self.operands.pop_name()?;
                self.do_Do(name)?;
            }
            O::BeginInlineImage | O::BeginImageData | O::EndInlineImage => {
                debug!(op = ?code, "stray inline image operator");
            }

            // Marked content
            O::BeginMarkedContent => {
                let tag = self.operands.pop_name()?;
                self.do_BMC(tag);
            }
            O::BeginMarkedContentProps => {
                let props = self.operands.pop()?;
                let tag = self.operands.pop_name()?;
                self.do_BDC(tag, props);
            }
            O::EndMarkedContent => self.do_EMC(),
            O::MarkPoint => {
                let tag = self.operands.pop_name()?;
                self.do_MP(tag);
            }
            O::MarkPointProps => {
                let props = self.operands.pop()?;
                let tag = self.operands.pop_name()?;
                self.do_DP(tag, props);
            }

            // Compatibility sections
            O::BeginCompat => self.compat_depth += 1,
            O::EndCompat => self.compat_depth = self.compat_depth.saturating_sub(1),

            O::PaintFormXObjectBegin
            | O::PaintFormXObjectEnd
            | O::BeginGroup
            | O::EndGroup
            | O::PaintImageMaskXObject
            | O::PaintImageXObject
            | O::PaintInlineImageXObject => {}
        }
        Ok(())
    }

    fn pop_matrix(&mut self) -> Result<Matrix> {
        let m = self.operands.pop_nums(6)?;
        Ok((m[0], m[1], m[2], m[3], m[4], m[5]))
    }

    fn pop_string(&mut self) -> Result<Vec<u8>> {
        match self.operands.pop()? {
            PDFObject::String(s) => Ok(s),
            other => Err(PdfError::TypeError {
                expected: "string",
                got: other.type_name(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::xref_with;

    fn eval(content: &str) -> OperatorList {
        eval_with(content, None, EvaluatorOptions::default())
    }

    fn eval_with(content: &str, resources: Option<Dict>, options: EvaluatorOptions) -> OperatorList {
        let xref = xref_with(&[]);
        let cache = ResourceCache::new();
        Evaluator::new(&xref, &cache, &options)
            .operator_list(&[Bytes::copy_from_slice(content.as_bytes())], resources, MATRIX_IDENTITY)
            .unwrap()
    }

    #[test]
    fn test_empty_content_yields_empty_list() {
        assert!(eval("").is_empty());
    }

    #[test]
    fn test_excess_restore_is_ignored() {
        let list = eval("q Q Q 1 w");
        assert_eq!(list.fn_array, [OpCode::Save, OpCode::Restore, OpCode::SetLineWidth]);
    }

    #[test]
    fn test_unbalanced_save_is_closed() {
        let list = eval("q q 2 w Q");
        assert_eq!(
            list.fn_array,
            [OpCode::Save, OpCode::Save, OpCode::SetLineWidth, OpCode::Restore, OpCode::Restore]
        );
    }

    #[test]
    fn test_unknown_operator_is_dropped() {
        let list = eval("1 2 foo 3 w");
        assert_eq!(list.fn_array, [OpCode::SetLineWidth]);
        assert_eq!(list.args_array[0], [OpArg::Num(3.0)]);
    }

    #[test]
    fn test_short_operator_is_skipped_and_extras_dropped() {
        let list = eval("1 2 re 9 1 2 3 4 re");
        assert_eq!(list.fn_array, [OpCode::Rectangle]);
        assert_eq!(list.args_array[0].len(), 4);
        assert_eq!(list.args_array[0][0], OpArg::Num(1.0));
    }

    #[test]
    fn test_type_error_propagates_without_ignore_errors() {
        let xref = xref_with(&[]);
        let cache = ResourceCache::new();
        let options = EvaluatorOptions::default().ignore_errors(false);
        let result = Evaluator::new(&xref, &cache, &options).operator_list(
            &[Bytes::from_static(b"(x) w")],
            None,
            MATRIX_IDENTITY,
        );
        assert!(matches!(result, Err(PdfError::TypeError { .. })));
        assert!(eval("(x) w").is_empty());
    }

    #[test]
    fn test_steps_in_batches_and_cancels() {
        let xref = xref_with(&[]);
        let cache = ResourceCache::new();
        let options = EvaluatorOptions::default().batch_size(2);
        let cancel = CancellationToken::new();
        let mut task = Evaluator::new(&xref, &cache, &options).task(
            &[Bytes::from_static(b"1 w 2 w 3 w 4 w")],
            None,
            MATRIX_IDENTITY,
            OperatorList::new(),
            cancel.clone(),
        );
        assert_eq!(task.step().unwrap(), StepOutcome::Pending);
        assert_eq!(task.sink().len(), 2);
        cancel.cancel();
        assert_eq!(task.step().unwrap(), StepOutcome::Cancelled);
        assert!(task.run().is_ok());
        assert_eq!(task.into_sink().len(), 2);
    }

    #[test]
    fn test_unknown_operator_in_compat_section() {
        let list = eval("BX 1 xyz EX 0 g");
        assert_eq!(list.fn_array, [OpCode::SetFillRGBColor]);
    }
}
