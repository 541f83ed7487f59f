//! Fixture builders shared by unit tests.

use crate::config::DocumentOptions;
use crate::document::xref::XRef;
use bytes::Bytes;

/// Builds a file with a correct classic table from `(num, body)` pairs.
/// Object 1 is the `Root`.
pub fn build(objects: &[(u32, &str)], trailer_extra: &str) -> Vec<u8> {
    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (num, body) in objects {
        offsets.push((*num, out.len()));
        out.extend_from_slice(format!("{num} 0 obj\n{body}\nendobj\n").as_bytes());
    }
    let size = objects.iter().map(|(n, _)| n + 1).max().unwrap_or(1);
    let xref_at = out.len();
    out.extend_from_slice(format!("xref\n0 {size}\n0000000000 65535 f\r\n").as_bytes());
    for num in 1..size {
        match offsets.iter().find(|(n, _)| *n == num) {
            Some((_, off)) => out.extend_from_slice(format!("{off:010} 00000 n\r\n").as_bytes()),
            None => out.extend_from_slice(b"0000000000 00001 f\r\n"),
        }
    }
    out.extend_from_slice(
        format!("trailer\n<< /Size {size} /Root 1 0 R {trailer_extra}>>\nstartxref\n{xref_at}\n%%EOF\n").as_bytes(),
    );
    out
}

/// An `XRef` over `objects`, with a catalog stub as object 1 when the
/// caller does not supply one.
pub fn xref_with(objects: &[(u32, &str)]) -> XRef {
    let mut all: Vec<(u32, &str)> = Vec::new();
    if !objects.iter().any(|(n, _)| *n == 1) {
        all.push((1, "<< /Type /Catalog >>"));
    }
    all.extend_from_slice(objects);
    XRef::parse(Bytes::from(build(&all, "")), &DocumentOptions::default()).expect("fixture xref")
}
