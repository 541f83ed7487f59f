//! Text extraction.
//!
//! `TextContentSink` rides the same evaluation as the operator-list
//! builder but only listens to glyphs and marked content. Consecutive
//! glyphs of one font that continue along the same baseline are merged
//! into a run; a run ends at a font change, a line change or a backwards
//! jump. Each finished run becomes one `TextItem`, reordered to logical
//! order when it contains right-to-left text.

use super::evaluator::{CancellationToken, EvalSink, Evaluator, ShownGlyph};
use super::operator_list::{OpArg, OpCode};
use crate::error::Result;
use crate::font::PdfFont;
use crate::model::objects::{Dict, Name};
use crate::utils::{Matrix, Point};
use bytes::Bytes;
use indexmap::IndexMap;
use unicode_bidi::BidiInfo;
use unicode_normalization::UnicodeNormalization;

/// Writing direction of a text item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextDirection {
    Ltr,
    Rtl,
    Ttb,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextItem {
    pub str: String,
    pub dir: TextDirection,
    /// Extent of the run in device space.
    pub width: f64,
    pub height: f64,
    /// Text rendering matrix at the first glyph.
    pub transform: Matrix,
    pub font_name: String,
    /// The next item starts on a new line.
    pub has_eol: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TextContentItem {
    Text(TextItem),
    BeginMarkedContent { tag: String, id: Option<String> },
    EndMarkedContent,
}

/// Font metrics shared by the items that reference a font.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    pub ascent: f64,
    pub descent: f64,
    pub vertical: bool,
    pub font_family: String,
}

impl TextStyle {
    fn from_font(font: &PdfFont) -> Self {
        Self {
            ascent: font.ascent,
            descent: font.descent,
            vertical: font.vertical,
            font_family: font.generic_family().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct TextContent {
    pub items: Vec<TextContentItem>,
    /// Styles keyed by the fonts' loaded names.
    pub styles: IndexMap<String, TextStyle>,
}

impl TextContent {
    /// Text items only, in content order.
    pub fn text_items(&self) -> impl Iterator<Item = &TextItem> {
        self.items.iter().filter_map(|item| match item {
            TextContentItem::Text(text) => Some(text),
            _ => None,
        })
    }

    /// Concatenated text, one line per end-of-line item.
    pub fn to_plain_text(&self) -> String {
        let mut out = String::new();
        for item in self.text_items() {
            out.push_str(&item.str);
            if item.has_eol {
                out.push('\n');
            }
        }
        out
    }
}

#[derive(Debug)]
struct TextRun {
    font: String,
    vertical: bool,
    text: String,
    transform: Matrix,
    height: f64,
    start: Point,
    end: Point,
    /// Unit vector of the writing direction in device space.
    dir: Point,
}

enum Placement {
    Continue { gap: bool },
    Break { eol: bool },
}

impl TextRun {
    fn new(glyph: &ShownGlyph<'_>) -> Self {
        let trm = glyph.trm;
        let height = trm.2.hypot(trm.3);
        let start = (trm.4, trm.5);
        let dir = if glyph.font.vertical {
            unit((-trm.2, -trm.3))
        } else {
            unit((trm.0, trm.1))
        };
        Self {
            font: glyph.font.loaded_name.clone(),
            vertical: glyph.font.vertical,
            text: String::new(),
            transform: trm,
            height,
            start,
            end: start,
            dir,
        }
    }

    fn placement(&self, origin: Point) -> Placement {
        let d = (origin.0 - self.end.0, origin.1 - self.end.1);
        let along = d.0 * self.dir.0 + d.1 * self.dir.1;
        let across = d.0 * self.dir.1 - d.1 * self.dir.0;
        if across.abs() > self.height * 0.5 {
            Placement::Break { eol: true }
        } else if along < -self.height {
            Placement::Break { eol: false }
        } else {
            Placement::Continue {
                gap: along > self.height * 0.1,
            }
        }
    }

    fn push(&mut self, glyph: &ShownGlyph<'_>) {
        self.text.push_str(&glyph.glyph.unicode);
        self.end = (
            glyph.trm.4 + glyph.advance.0,
            glyph.trm.5 + glyph.advance.1,
        );
    }

    fn extent(&self) -> f64 {
        ((self.end.0 - self.start.0) * self.dir.0 + (self.end.1 - self.start.1) * self.dir.1).abs()
    }
}

fn unit(v: Point) -> Point {
    let len = v.0.hypot(v.1);
    if len == 0.0 { (1.0, 0.0) } else { (v.0 / len, v.1 / len) }
}

/// Normalizes a finished run and brings right-to-left text from the
/// visual order it is painted in to logical order.
pub(crate) fn finish_text(text: &str, normalize: bool, vertical: bool) -> (String, TextDirection) {
    let text: String = if normalize { text.nfkc().collect() } else { text.to_string() };
    if vertical {
        return (text, TextDirection::Ttb);
    }
    let info = BidiInfo::new(&text, None);
    if !info.has_rtl() {
        return (text, TextDirection::Ltr);
    }
    let rtl = info.paragraphs.first().is_some_and(|p| p.level.is_rtl());
    let mut out = String::with_capacity(text.len());
    for para in &info.paragraphs {
        out.push_str(&info.reorder_line(para, para.range.clone()));
    }
    (out, if rtl { TextDirection::Rtl } else { TextDirection::Ltr })
}

/// Evaluation sink that accumulates `TextContent`.
#[derive(Debug)]
pub struct TextContentSink {
    normalize: bool,
    include_marked_content: bool,
    page_index: usize,
    content: TextContent,
    run: Option<TextRun>,
}

impl TextContentSink {
    pub fn new(normalize: bool, include_marked_content: bool, page_index: usize) -> Self {
        Self {
            normalize,
            include_marked_content,
            page_index,
            content: TextContent::default(),
            run: None,
        }
    }

    /// Flushes the pending run and returns everything collected.
    pub fn finish(mut self) -> TextContent {
        self.flush(false);
        self.content
    }

    fn flush(&mut self, has_eol: bool) {
        let Some(run) = self.run.take() else {
            return;
        };
        if run.text.is_empty() {
            return;
        }
        let (text, dir) = finish_text(&run.text, self.normalize, run.vertical);
        let extent = run.extent();
        let (width, height) = if run.vertical {
            (run.height, extent)
        } else {
            (extent, run.height)
        };
        self.content.items.push(TextContentItem::Text(TextItem {
            str: text,
            dir,
            width,
            height,
            transform: run.transform,
            font_name: run.font,
            has_eol,
        }));
    }
}

impl EvalSink for TextContentSink {
    fn add_op(&mut self, _op: OpCode, _args: Vec<OpArg>) {}

    fn wants_paint(&self) -> bool {
        false
    }

    fn show_glyph(&mut self, glyph: &ShownGlyph<'_>) {
        let font = glyph.font;
        if !self.content.styles.contains_key(&font.loaded_name) {
            self.content
                .styles
                .insert(font.loaded_name.clone(), TextStyle::from_font(font));
        }
        let origin = (glyph.trm.4, glyph.trm.5);
        let placement = match &self.run {
            Some(run) if run.font == font.loaded_name => run.placement(origin),
            Some(_) => Placement::Break { eol: false },
            None => Placement::Break { eol: false },
        };
        match placement {
            Placement::Continue { gap } => {
                if let Some(run) = &mut self.run {
                    if gap && !run.text.ends_with(' ') && !glyph.glyph.unicode.starts_with(' ') {
                        run.text.push(' ');
                    }
                    run.push(glyph);
                }
            }
            Placement::Break { eol } => {
                self.flush(eol);
                let mut run = TextRun::new(glyph);
                run.push(glyph);
                self.run = Some(run);
            }
        }
    }

    fn begin_marked_content(&mut self, tag: Name, props: Option<&Dict>) {
        if !self.include_marked_content {
            return;
        }
        self.flush(false);
        let id = props
            .and_then(|p| p.get("MCID"))
            .and_then(|m| m.as_int().ok())
            .map(|mcid| format!("p{}_mc{mcid}", self.page_index));
        self.content.items.push(TextContentItem::BeginMarkedContent {
            tag: tag.as_str().to_string(),
            id,
        });
    }

    fn end_marked_content(&mut self) {
        if !self.include_marked_content {
            return;
        }
        self.flush(false);
        self.content.items.push(TextContentItem::EndMarkedContent);
    }
}

impl Evaluator<'_> {
    /// Extracts the text of the content `parts`. `page_index` prefixes
    /// marked-content ids.
    pub fn text_content(
        self,
        parts: &[Bytes],
        resources: Option<Dict>,
        ctm: Matrix,
        page_index: usize,
        cancel: CancellationToken,
    ) -> Result<TextContent> {
        let sink = TextContentSink::new(
            self.options.normalize_unicode,
            self.options.include_marked_content,
            page_index,
        );
        let mut task = self.task(parts, resources, ctm, sink, cancel);
        task.run()?;
        Ok(task.into_sink().finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvaluatorOptions;
    use crate::interp::evaluator::ResourceCache;
    use crate::parser::pdf_parser::parse_object;
    use crate::test_utils::xref_with;
    use crate::utils::MATRIX_IDENTITY;

    const FONT: (u32, &str) = (
        2,
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /FirstChar 32 /LastChar 65 \
         /Widths [250 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 500] >>",
    );

    fn extract(content: &'static [u8], options: EvaluatorOptions) -> TextContent {
        let xref = xref_with(&[FONT]);
        let cache = ResourceCache::new();
        let resources: Dict = parse_object("<< /Font << /F1 2 0 R >> >>")
            .unwrap()
            .as_dict()
            .unwrap()
            .clone();
        Evaluator::new(&xref, &cache, &options)
            .text_content(
                &[Bytes::from_static(content)],
                Some(resources),
                MATRIX_IDENTITY,
                0,
                CancellationToken::new(),
            )
            .unwrap()
    }

    #[test]
    fn test_run_is_one_item() {
        let content = extract(b"BT /F1 10 Tf 100 700 Td (A A) Tj ET", EvaluatorOptions::default());
        let items: Vec<_> = content.text_items().collect();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].str, "A A");
        assert_eq!(items[0].transform, (10.0, 0.0, 0.0, 10.0, 100.0, 700.0));
        assert!((items[0].width - 12.5).abs() < 1e-9);
        assert_eq!(items[0].height, 10.0);
        assert_eq!(items[0].dir, TextDirection::Ltr);
        assert_eq!(content.styles["f2_0"].font_family, "sans-serif");
    }

    #[test]
    fn test_gap_inserts_space_and_line_change_ends_item() {
        let content = extract(
            b"BT /F1 10 Tf 100 700 Td (A) Tj 20 0 Td (A) Tj 0 -20 Td (A) Tj ET",
            EvaluatorOptions::default(),
        );
        let items: Vec<_> = content.text_items().collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].str, "A A");
        assert!(items[0].has_eol);
        assert!(!items[1].has_eol);
        assert_eq!(content.to_plain_text(), "A A\nA");
    }

    #[test]
    fn test_marked_content_items() {
        let options = EvaluatorOptions::default().include_marked_content(true);
        let content = extract(b"/P << /MCID 3 >> BDC BT /F1 10 Tf (A) Tj ET EMC", options);
        assert_eq!(content.items.len(), 3);
        assert_eq!(
            content.items[0],
            TextContentItem::BeginMarkedContent {
                tag: "P".into(),
                id: Some("p0_mc3".into()),
            }
        );
        assert_eq!(content.items[2], TextContentItem::EndMarkedContent);

        let plain = extract(b"/P << /MCID 3 >> BDC BT /F1 10 Tf (A) Tj ET EMC", EvaluatorOptions::default());
        assert_eq!(plain.items.len(), 1);
    }

    #[test]
    fn test_finish_text_reorders_rtl() {
        let (text, dir) = finish_text("\u{05D0}\u{05D1}\u{05D2}", false, false);
        assert_eq!(text, "\u{05D2}\u{05D1}\u{05D0}");
        assert_eq!(dir, TextDirection::Rtl);
        assert_eq!(finish_text("abc 123", false, false), ("abc 123".to_string(), TextDirection::Ltr));
    }

    #[test]
    fn test_finish_text_normalizes() {
        assert_eq!(finish_text("\u{FB01}le", true, false).0, "file");
        assert_eq!(finish_text("\u{FB01}le", false, false).0, "\u{FB01}le");
        assert_eq!(finish_text("ab", false, true).1, TextDirection::Ttb);
    }
}
