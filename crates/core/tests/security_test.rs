//! Standard security handler (RC4, revisions 2 and 3) end to end.

mod common;

use common::{Encryption, single_page};
use quire_core::config::{DocumentOptions, EvaluatorOptions};
use quire_core::{OpArg, OpCode, PDFDocument, PasswordCode, PdfError};

const CONTENT: &str = "1 0 0 rg 0 0 10 10 re f";

fn encrypted(enc: &Encryption) -> Vec<u8> {
    single_page(CONTENT, "<< >>")
        .object(9, &format!("<< /Title {} >>", enc.hex_string(9, "Secret plans")))
        .trailer("/Info 9 0 R")
        .encrypt(enc.clone())
        .build()
}

fn assert_content_readable(doc: &PDFDocument) {
    let list = doc.get_operator_list(0, &EvaluatorOptions::default()).unwrap();
    assert_eq!(list.fn_array, [OpCode::SetFillRGBColor, OpCode::Rectangle, OpCode::Fill]);
    assert_eq!(list.args_array[0], [OpArg::Rgb([255, 0, 0])]);
    assert_eq!(doc.document_info().title.as_deref(), Some("Secret plans"));
}

#[test]
fn test_opens_without_password_and_defers_failure() {
    let enc = Encryption::rc4(2, "user", "owner");
    let doc = PDFDocument::open(encrypted(&enc), DocumentOptions::default()).unwrap();
    assert!(doc.is_encrypted());
    assert_eq!(doc.num_pages(), 1);
    assert_eq!(doc.permissions(), Some(-3904));

    let err = doc.get_operator_list(0, &EvaluatorOptions::default()).unwrap_err();
    assert_eq!(err.password_code(), Some(PasswordCode::NeedPassword));
}

#[test]
fn test_wrong_password_is_incorrect() {
    let enc = Encryption::rc4(2, "user", "owner");
    let doc = PDFDocument::open(encrypted(&enc), DocumentOptions::default()).unwrap();
    let err = doc.check_password(b"guess").unwrap_err();
    assert!(matches!(err, PdfError::Password(PasswordCode::IncorrectPassword)));
}

#[test]
fn test_user_password_unlocks_r2() {
    let enc = Encryption::rc4(2, "user", "owner");
    let doc = PDFDocument::open(encrypted(&enc), DocumentOptions::default()).unwrap();
    doc.check_password(b"user").unwrap();
    assert_content_readable(&doc);
}

#[test]
fn test_owner_password_unlocks_r3() {
    let enc = Encryption::rc4(3, "user", "owner");
    let doc = PDFDocument::open(encrypted(&enc), DocumentOptions::default()).unwrap();
    doc.check_password(b"owner").unwrap();
    assert_content_readable(&doc);
}

#[test]
fn test_password_in_options() {
    let enc = Encryption::rc4(3, "user", "");
    let options = DocumentOptions::default().password("user");
    let doc = PDFDocument::open(encrypted(&enc), options).unwrap();
    assert_content_readable(&doc);
}

#[test]
fn test_wrong_password_in_options_reports_incorrect() {
    let enc = Encryption::rc4(2, "user", "owner");
    let options = DocumentOptions::default().password("nope");
    let doc = PDFDocument::open(encrypted(&enc), options).unwrap();
    let err = doc.get_operator_list(0, &EvaluatorOptions::default()).unwrap_err();
    assert_eq!(err.password_code(), Some(PasswordCode::IncorrectPassword));
}

#[test]
fn test_empty_user_password_opens_directly() {
    let enc = Encryption::rc4(2, "", "owner");
    let doc = PDFDocument::open(encrypted(&enc), DocumentOptions::default()).unwrap();
    assert_content_readable(&doc);
}

#[test]
fn test_unsupported_handler_is_deferred() {
    let bytes = single_page(CONTENT, "<< >>")
        .object(9, "<< /Filter /Adobe.PubSec /V 4 /R 4 >>")
        .trailer("/Encrypt 9 0 R /ID [<00112233> <00112233>]")
        .build();
    let doc = PDFDocument::open(bytes, DocumentOptions::default()).unwrap();
    assert_eq!(doc.num_pages(), 1);
    let err = doc.get_operator_list(0, &EvaluatorOptions::default()).unwrap_err();
    assert!(matches!(err, PdfError::EncryptionError(_)));
}
