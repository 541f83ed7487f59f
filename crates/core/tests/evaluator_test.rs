//! Page evaluation through the document API: operator lists, text content,
//! optional content and annotations.

mod common;

use common::{HELVETICA, PdfBuilder, single_page};
use quire_core::config::{EvaluatorOptions, Intent};
use quire_core::document::AnnotationType;
use quire_core::interp::{CancellationToken, StepOutcome};
use quire_core::{OpArg, OpCode, OperatorList};

fn ops(content: &str, resources: &str) -> OperatorList {
    single_page(content, resources)
        .open()
        .get_operator_list(0, &EvaluatorOptions::default())
        .unwrap()
}

#[test]
fn test_save_restore_balance() {
    let list = ops("q 1 0 0 1 5 5 cm q 2 w Q Q Q 3 w q", "<< >>");
    let saves = list.count(OpCode::Save);
    let restores = list.count(OpCode::Restore);
    assert_eq!(saves, 3);
    assert_eq!(saves, restores);
    assert_eq!(list.fn_array.last(), Some(&OpCode::Restore));
}

#[test]
fn test_device_colors_are_bounded_bytes() {
    let list = ops("2 -1 0.5 rg 0 0 0 1 K 0.25 g 1.5 G", "<< >>");
    assert_eq!(
        list.fn_array,
        [
            OpCode::SetFillRGBColor,
            OpCode::SetStrokeRGBColor,
            OpCode::SetFillRGBColor,
            OpCode::SetStrokeRGBColor,
        ]
    );
    assert_eq!(list.args_array[0], [OpArg::Rgb([255, 0, 128])]);
    assert_eq!(list.args_array[1], [OpArg::Rgb([0, 0, 0])]);
    assert_eq!(list.args_array[2], [OpArg::Rgb([64, 64, 64])]);
    assert_eq!(list.args_array[3], [OpArg::Rgb([255, 255, 255])]);
}

#[test]
fn test_missing_font_does_not_show_text() {
    let list = ops("BT /F9 12 Tf 10 10 Td (Hello) Tj ET", "<< /Font << >> >>");
    assert!(!list.fn_array.contains(&OpCode::SetFont));
    assert!(!list.fn_array.contains(&OpCode::ShowText));
    assert!(list.fn_array.contains(&OpCode::BeginText));
    assert!(list.fn_array.contains(&OpCode::EndText));
}

#[test]
fn test_standard_font_text_and_dependency() {
    let list = single_page("BT /F1 12 Tf 72 700 Td (Hi) Tj ET", "<< /Font << /F1 5 0 R >> >>")
        .object(5, HELVETICA)
        .open()
        .get_operator_list(0, &EvaluatorOptions::default())
        .unwrap();
    assert_eq!(
        list.fn_array,
        [OpCode::BeginText, OpCode::SetFont, OpCode::MoveText, OpCode::ShowText, OpCode::EndText]
    );
    assert_eq!(list.dependencies.len(), 1);
    let OpArg::Glyphs(parts) = &list.args_array[3][0] else {
        panic!("ShowText carries glyphs");
    };
    assert_eq!(parts.len(), 2);
}

#[test]
fn test_text_content_positions() {
    let doc = single_page(
        "BT /F1 12 Tf 72 700 Td (Hello) Tj 0 -14 Td (World) Tj ET",
        "<< /Font << /F1 5 0 R >> >>",
    )
    .object(5, HELVETICA)
    .open();
    let content = doc.get_text_content(0, &EvaluatorOptions::default()).unwrap();
    let items: Vec<_> = content.text_items().collect();
    assert!(items.iter().any(|i| i.str == "Hello"));
    let hello = items.iter().find(|i| i.str == "Hello").unwrap();
    assert_eq!((hello.transform.4, hello.transform.5), (72.0, 700.0));
    assert!(content.styles.contains_key(&hello.font_name));
    let text = content.to_plain_text();
    assert!(text.contains("Hello"));
    assert!(text.contains("World"));
}

#[test]
fn test_form_xobject_runs_inside_brackets() {
    let list = single_page("/Fm1 Do", "<< /XObject << /Fm1 5 0 R >> >>")
        .stream(5, "/Type /XObject /Subtype /Form /BBox [0 0 10 10]", b"0 0 m 5 5 l S")
        .open()
        .get_operator_list(0, &EvaluatorOptions::default())
        .unwrap();
    assert_eq!(
        list.fn_array,
        [
            OpCode::PaintFormXObjectBegin,
            OpCode::MoveTo,
            OpCode::LineTo,
            OpCode::Stroke,
            OpCode::PaintFormXObjectEnd,
        ]
    );
}

#[test]
fn test_content_array_is_one_stream() {
    let doc = PdfBuilder::new()
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 10 10] /Contents [4 0 R 5 0 R] >>")
        .stream(4, "", b"1 0 0")
        .stream(5, "", b"rg")
        .open();
    let list = doc.get_operator_list(0, &EvaluatorOptions::default()).unwrap();
    assert_eq!(list.fn_array, [OpCode::SetFillRGBColor]);
    assert_eq!(list.args_array[0], [OpArg::Rgb([255, 0, 0])]);
}

#[test]
fn test_hidden_optional_content_under_oc_intent() {
    let doc = PdfBuilder::new()
        .object(
            1,
            "<< /Type /Catalog /Pages 2 0 R /OCProperties << /OCGs [6 0 R] /D << /OFF [6 0 R] >> >> >>",
        )
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(
            3,
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 10 10] /Resources << /Properties << /oc1 6 0 R >> >> /Contents 4 0 R >>",
        )
        .stream(4, "", b"/OC /oc1 BDC 1 w EMC 2 w")
        .object(6, "<< /Type /OCG /Name (Draft) >>")
        .open();

    let shown = doc.get_operator_list(0, &EvaluatorOptions::default()).unwrap();
    assert_eq!(shown.count(OpCode::SetLineWidth), 2);

    let oc = EvaluatorOptions::default().intent(Intent::Oc);
    let filtered = doc.get_operator_list(0, &oc).unwrap();
    assert_eq!(filtered.fn_array, [OpCode::SetLineWidth]);
    assert_eq!(filtered.args_array[0], [OpArg::Num(2.0)]);

    let config = doc.optional_content_config().unwrap();
    assert!(!config.is_visible(quire_core::ObjRef::new(6, 0)));
}

#[test]
fn test_stepping_and_cancellation() {
    let content = "1 w ".repeat(20);
    let doc = single_page(&content, "<< >>").open();
    let options = EvaluatorOptions::default().batch_size(5);

    let mut task = doc
        .page_task(0, &options, OperatorList::new(), CancellationToken::new())
        .unwrap();
    assert_eq!(task.step().unwrap(), StepOutcome::Pending);
    assert_eq!(task.sink().len(), 5);
    task.run().unwrap();
    assert!(task.is_done());
    assert_eq!(task.into_sink().len(), 20);

    let token = CancellationToken::new();
    let mut task = doc.page_task(0, &options, OperatorList::new(), token.clone()).unwrap();
    assert_eq!(task.step().unwrap(), StepOutcome::Pending);
    token.cancel();
    assert_eq!(task.step().unwrap(), StepOutcome::Cancelled);
    assert_eq!(task.into_sink().len(), 5);
}

#[test]
fn test_annotations_filtered_by_intent() {
    let doc = PdfBuilder::new()
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(
            3,
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 200] /Annots [5 0 R 6 0 R 7 0 R] >>",
        )
        .object(
            5,
            "<< /Type /Annot /Subtype /Link /Rect [10 10 50 30] /F 4 /A << /S /URI /URI (https://example.org) >> >>",
        )
        .object(6, "<< /Type /Annot /Subtype /Text /Rect [60 60 80 80] /Contents (Note) >>")
        .object(7, "<< /Type /Annot /Subtype /Square /Rect [0 0 5 5] /F 2 >>")
        .open();

    let display = doc.get_annotations(0, Intent::Display).unwrap();
    assert_eq!(display.len(), 2);
    assert_eq!(display[0].annotation_type, AnnotationType::Link);
    assert_eq!(display[0].id, "5R0");
    assert_eq!(display[1].contents.as_deref(), Some("Note"));

    let print = doc.get_annotations(0, Intent::Print).unwrap();
    assert_eq!(print.len(), 1);
    assert_eq!(print[0].annotation_type, AnnotationType::Link);
}

#[test]
fn test_cleanup_keeps_results_stable() {
    let doc = single_page("BT /F1 10 Tf (A) Tj ET", "<< /Font << /F1 5 0 R >> >>")
        .object(5, HELVETICA)
        .open();
    let options = EvaluatorOptions::default();
    let before = doc.get_operator_list(0, &options).unwrap();
    doc.cleanup();
    let after = doc.get_operator_list(0, &options).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_operator_list_with_image_serializes() {
    let list = ops("q 10 0 0 10 0 0 cm BI /W 2 /H 1 /CS /G /BPC 8 /F /AHx ID 4080> EI Q", "<< >>");
    let at = list.fn_array.iter().position(|op| *op == OpCode::PaintInlineImageXObject).unwrap();
    let json = serde_json::to_value(&list).unwrap();
    assert_eq!(json["fn_array"].as_array().unwrap().len(), list.len());
    let image = &json["args_array"][at][0];
    assert_eq!(image["width"], 2);
    assert_eq!(image["height"], 1);
}
