//! Rewriting documents and reading the result back.

mod common;

use common::{Encryption, HELVETICA, PdfBuilder, single_page};
use quire_core::config::{DocumentOptions, EvaluatorOptions};
use quire_core::document::{FieldValue, XRefEntry};
use quire_core::parser::PDFParser;
use quire_core::writer::{AnnotationStorage, Writer, write_xref_table};
use quire_core::{Dict, ObjRef, PDFDocument, PDFObject};

fn reopen(bytes: Vec<u8>) -> PDFDocument {
    PDFDocument::open(bytes, DocumentOptions::default().recovery(false)).unwrap()
}

#[test]
fn test_every_offset_points_at_its_object() {
    let doc = single_page("BT /F1 12 Tf (x) Tj ET", "<< /Font << /F1 5 0 R >> >>")
        .object(5, HELVETICA)
        .object(7, "[1 2 (three)]")
        .open();
    let bytes = Writer::new(&doc).write().unwrap();
    let out = reopen(bytes.clone());
    assert!(!out.xref().recovered());

    for num in out.xref().object_numbers() {
        let Some(XRefEntry::Offset { offset, generation }) = out.xref().entry(num) else {
            continue;
        };
        let mut parser = PDFParser::new(bytes.clone());
        parser.seek(offset);
        let (r, _) = parser.parse_indirect().unwrap();
        assert_eq!(r, ObjRef::new(num, generation));
    }
}

#[test]
fn test_xref_table_layout() {
    let mut out = Vec::new();
    write_xref_table(&mut out, 0, &[Some((9, 0)), Some((17, 0)), None, Some((1234, 2))]);
    let text = String::from_utf8(out).unwrap();
    assert_eq!(
        text,
        "xref\n0 4\n\
         0000000000 65535 f\r\n\
         0000000017 00000 n\r\n\
         0000000000 65535 f\r\n\
         0000001234 00002 n\r\n"
    );
    // Each row is exactly 20 bytes.
    assert!(text.split_inclusive('\n').skip(2).all(|l| l.len() == 20));
}

#[test]
fn test_rewrite_preserves_content() {
    let doc = single_page("q 1 0 0 rg 0 0 5 5 re f Q", "<< >>").open();
    let options = EvaluatorOptions::default();
    let before = doc.get_operator_list(0, &options).unwrap();
    let out = reopen(Writer::new(&doc).write().unwrap());
    assert_eq!(out.num_pages(), 1);
    assert_eq!(out.get_operator_list(0, &options).unwrap(), before);
}

#[test]
fn test_update_replaces_info() {
    let doc = single_page("", "<< >>")
        .object(9, "<< /Title (Draft) >>")
        .trailer("/Info 9 0 R")
        .open();
    let mut writer = Writer::new(&doc);
    let mut info = Dict::new();
    info.insert("Title", PDFObject::String(b"Final".to_vec()));
    writer.update(ObjRef::new(9, 0), PDFObject::Dict(info));
    let out = reopen(writer.write().unwrap());
    assert_eq!(out.document_info().title.as_deref(), Some("Final"));
}

#[test]
fn test_encrypted_input_is_written_decrypted() {
    let enc = Encryption::rc4(2, "", "owner");
    let doc = single_page("0.5 g", "<< >>").encrypt(enc).open();
    assert!(doc.is_encrypted());
    let out = reopen(Writer::new(&doc).write().unwrap());
    assert!(!out.is_encrypted());
    let list = out.get_operator_list(0, &EvaluatorOptions::default()).unwrap();
    assert_eq!(list.len(), 1);
}

#[test]
fn test_form_values_are_saved() {
    let doc = PdfBuilder::new()
        .object(1, "<< /Type /Catalog /Pages 2 0 R /AcroForm 8 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 200] /Annots [5 0 R 6 0 R] >>")
        .object(
            5,
            "<< /Type /Annot /Subtype /Widget /FT /Tx /T (name) /Rect [10 10 100 30] /P 3 0 R >>",
        )
        .object(
            6,
            "<< /Type /Annot /Subtype /Widget /FT /Btn /T (agree) /Rect [10 40 20 50] /P 3 0 R /AS /Off /AP << /N << /On 7 0 R /Off 7 0 R >> >> >>",
        )
        .stream(7, "/Subtype /Form /BBox [0 0 10 10]", b"")
        .object(8, "<< /Fields [5 0 R 6 0 R] >>")
        .open();

    let mut storage = AnnotationStorage::new();
    storage.set("5R0", FieldValue::Text("Ada".into()));
    storage.set("6R0", FieldValue::Bool(true));
    let mut writer = Writer::new(&doc);
    writer.apply_annotation_storage(&storage);
    let out = reopen(writer.write().unwrap());

    let fields = out.field_objects();
    let name = &fields.get("name").unwrap()[0];
    assert_eq!(name.widget.field_value, Some(FieldValue::Text("Ada".into())));
    let agree = &fields.get("agree").unwrap()[0];
    assert_eq!(agree.widget.field_value, Some(FieldValue::Name("On".into())));

    let widget = out.xref().fetch_dict(ObjRef::new(6, 0)).unwrap();
    assert_eq!(widget.get_name("AS").map(|n| n.as_str()), Some("On"));
    let form = out.xref().fetch_dict(ObjRef::new(8, 0)).unwrap();
    assert_eq!(form.get("NeedAppearances"), Some(&PDFObject::Bool(true)));
}
