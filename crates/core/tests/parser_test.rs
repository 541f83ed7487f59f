//! Object model, tokenizer and object parser through the public API.

mod common;

use bytes::Bytes;
use common::PdfBuilder;
use quire_core::config::DocumentOptions;
use quire_core::parser::{Keyword, Lexer, PDFParser, Token};
use quire_core::{Name, ObjRef, PDFDocument, PDFObject};

fn tokens(data: &[u8]) -> Vec<Token> {
    let mut lexer = Lexer::new(data.to_vec());
    std::iter::from_fn(|| lexer.next_token().map(|(_, t)| t)).collect()
}

#[test]
fn test_names_are_interned() {
    let a = Name::new("FontFile2");
    let b = Name::new("FontFile2");
    assert_eq!(a, b);
    assert_eq!(a.as_str(), "FontFile2");
    assert_ne!(a, Name::new("FontFile3"));
}

#[test]
fn test_ref_key_round_trip() {
    let r = ObjRef::new(12, 3);
    assert_eq!(r.to_string(), "12R3");
    assert_eq!(ObjRef::parse_key("12R3"), Some(r));
    assert_eq!(ObjRef::parse_key("12 0 R"), None);
    assert_eq!(ObjRef::parse_key("R"), None);
}

#[test]
fn test_numeric_tokens() {
    assert_eq!(
        tokens(b"42 -7 +3 3.25 -.5 4. 0.0"),
        [
            Token::Int(42),
            Token::Int(-7),
            Token::Int(3),
            Token::Real(3.25),
            Token::Real(-0.5),
            Token::Real(4.0),
            Token::Real(0.0),
        ]
    );
}

#[test]
fn test_mixed_tokens() {
    let toks = tokens(b"/Type /Page#20X (a\\)b) <48 49> true [ ] << >> % comment\nnull");
    assert_eq!(toks[0], Token::Name(Name::new("Type")));
    assert_eq!(toks[1], Token::Name(Name::new("Page X")));
    assert_eq!(toks[2], Token::String(b"a)b".to_vec()));
    assert_eq!(toks[3], Token::String(b"HI".to_vec()));
    assert_eq!(toks[4], Token::Bool(true));
    assert_eq!(toks[5], Token::Keyword(Keyword::ArrayStart));
    assert_eq!(toks[6], Token::Keyword(Keyword::ArrayEnd));
    assert_eq!(toks[7], Token::Keyword(Keyword::DictStart));
    assert_eq!(toks[8], Token::Keyword(Keyword::DictEnd));
    assert_eq!(toks[9], Token::Keyword(Keyword::Null));
    assert_eq!(toks.len(), 10);
}

#[test]
fn test_stream_body_may_contain_endobj() {
    let body = b"BT (endobj) Tj ET\nendobj";
    let mut data = format!("5 0 obj\n<< /Length {} >>\nstream\n", body.len()).into_bytes();
    data.extend_from_slice(body);
    data.extend_from_slice(b"\nendstream\nendobj\n6 0 obj 42 endobj");

    let mut parser = PDFParser::new(Bytes::from(data));
    let (r, obj) = parser.parse_indirect().unwrap();
    assert_eq!(r, ObjRef::new(5, 0));
    assert_eq!(obj.as_stream().unwrap().raw(), body);

    let (r, obj) = parser.parse_indirect().unwrap();
    assert_eq!(r, ObjRef::new(6, 0));
    assert_eq!(obj, PDFObject::Int(42));
}

#[test]
fn test_reference_vs_two_integers() {
    let mut parser = PDFParser::new(Bytes::from_static(b"[1 0 R 2 3 4 0 R]"));
    let obj = parser.get_obj(None).unwrap();
    assert_eq!(
        obj.as_array().unwrap(),
        [
            PDFObject::Ref(ObjRef::new(1, 0)),
            PDFObject::Int(2),
            PDFObject::Int(3),
            PDFObject::Ref(ObjRef::new(4, 0)),
        ]
    );
}

/// Catalog, page tree and page live in an object stream indexed by an
/// xref stream.
fn compressed_document() -> Vec<u8> {
    let members = [
        "<< /Type /Catalog /Pages 2 0 R >>",
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 50 50] >>",
    ];
    let mut header = String::new();
    let mut body = String::new();
    for (i, m) in members.iter().enumerate() {
        header.push_str(&format!("{} {} ", i + 1, body.len()));
        body.push_str(m);
        body.push(' ');
    }
    let first = header.len();
    let stream = format!("{header}{body}");

    let mut out = b"%PDF-1.5\n".to_vec();
    let objstm_at = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj\n<< /Type /ObjStm /N 3 /First {first} /Length {} >>\nstream\n{stream}\nendstream\nendobj\n",
            stream.len()
        )
        .as_bytes(),
    );
    let xref_at = out.len();
    let mut rows: Vec<u8> = Vec::new();
    rows.extend_from_slice(&[0, 0, 0, 0xFF]);
    for index in 0..3u8 {
        rows.extend_from_slice(&[2, 0, 4, index]);
    }
    rows.extend_from_slice(&[1, (objstm_at >> 8) as u8, objstm_at as u8, 0]);
    rows.extend_from_slice(&[1, (xref_at >> 8) as u8, xref_at as u8, 0]);
    out.extend_from_slice(
        format!(
            "5 0 obj\n<< /Type /XRef /Size 6 /W [1 2 1] /Root 1 0 R /Length {} >>\nstream\n",
            rows.len()
        )
        .as_bytes(),
    );
    out.extend_from_slice(&rows);
    out.extend_from_slice(format!("\nendstream\nendobj\nstartxref\n{xref_at}\n%%EOF\n").as_bytes());
    out
}

#[test]
fn test_object_stream_document() {
    let doc = PDFDocument::open(compressed_document(), DocumentOptions::default().recovery(false)).unwrap();
    assert!(!doc.xref().recovered());
    assert_eq!(doc.num_pages(), 1);
    assert_eq!(doc.get_page(0).unwrap().media_box, (0.0, 0.0, 50.0, 50.0));
    assert_eq!(doc.pdf_format_version().as_deref(), Some("1.5"));
}

#[test]
fn test_unused_object_numbers_are_free() {
    let doc = PdfBuilder::new()
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
        .object(5, "(orphan)")
        .open();
    assert!(doc.xref().fetch(ObjRef::new(3, 0)).is_none());
    assert_eq!(
        doc.xref().fetch(ObjRef::new(5, 0)).as_deref(),
        Some(&PDFObject::String(b"orphan".to_vec()))
    );
    assert_eq!(doc.num_pages(), 0);
}
