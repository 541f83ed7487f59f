//! In-memory PDF fixtures for integration tests and benches.
#![allow(dead_code)]

use quire_core::document::security::{
    StandardSecurityHandler, compute_file_key, compute_o_value, compute_u_value,
};
use quire_core::{DocumentOptions, ObjRef, PDFDocument};

/// RC4 standard security parameters for an encrypted fixture.
#[derive(Debug, Clone)]
pub struct Encryption {
    pub revision: i64,
    /// Key length in bytes.
    pub key_len: usize,
    pub user: Vec<u8>,
    pub owner: Vec<u8>,
    pub p: i32,
    pub id0: Vec<u8>,
}

impl Encryption {
    pub fn rc4(revision: i64, user: &str, owner: &str) -> Self {
        Self {
            revision,
            key_len: if revision == 2 { 5 } else { 16 },
            user: user.as_bytes().to_vec(),
            owner: owner.as_bytes().to_vec(),
            p: -3904,
            id0: b"quire-fixture-id".to_vec(),
        }
    }

    pub fn o(&self) -> Vec<u8> {
        compute_o_value(self.revision, self.key_len, &self.owner, &self.user)
    }

    pub fn file_key(&self) -> Vec<u8> {
        compute_file_key(self.revision, self.key_len, &self.user, &self.o(), self.p, &self.id0)
    }

    pub fn u(&self) -> Vec<u8> {
        compute_u_value(self.revision, &self.file_key(), &self.id0)
    }

    /// RC4 is symmetric, so the decrypting handler also encrypts.
    pub fn encrypt(&self, r: ObjRef, data: &[u8]) -> Vec<u8> {
        let handler = StandardSecurityHandler::new(
            self.revision,
            self.key_len,
            self.o(),
            self.u(),
            self.p,
            &self.id0,
        );
        handler.decrypt(&self.file_key(), r, data)
    }

    /// A hex string literal holding `plain` encrypted for object `num`.
    pub fn hex_string(&self, num: u32, plain: &str) -> String {
        format!("<{}>", hex::encode(self.encrypt(ObjRef::new(num, 0), plain.as_bytes())))
    }

    fn dict(&self) -> String {
        let length = if self.revision == 2 {
            String::new()
        } else {
            format!(" /Length {}", self.key_len * 8)
        };
        format!(
            "<< /Filter /Standard /V {} /R {}{length} /O <{}> /U <{}> /P {} >>",
            if self.revision == 2 { 1 } else { 2 },
            self.revision,
            hex::encode(self.o()),
            hex::encode(self.u()),
            self.p
        )
    }
}

enum Body {
    Object(String),
    Stream { dict: String, data: Vec<u8> },
}

/// Writes a one-revision file with a classic xref table. Object 1 is the
/// `Root` unless the trailer says otherwise.
pub struct PdfBuilder {
    version: &'static str,
    objects: Vec<(u32, Body)>,
    trailer: String,
    encryption: Option<Encryption>,
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            version: "1.7",
            objects: Vec::new(),
            trailer: String::new(),
            encryption: None,
        }
    }

    pub fn version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    pub fn object(mut self, num: u32, body: &str) -> Self {
        self.objects.push((num, Body::Object(body.to_string())));
        self
    }

    /// A stream; `/Length` is added to `dict_entries`.
    pub fn stream(mut self, num: u32, dict_entries: &str, data: &[u8]) -> Self {
        self.objects.push((
            num,
            Body::Stream {
                dict: dict_entries.to_string(),
                data: data.to_vec(),
            },
        ));
        self
    }

    pub fn trailer(mut self, entries: &str) -> Self {
        self.trailer.push(' ');
        self.trailer.push_str(entries);
        self
    }

    /// Encrypts stream data with `encryption`; strings must be supplied
    /// already encrypted (see [`Encryption::hex_string`]).
    pub fn encrypt(mut self, encryption: Encryption) -> Self {
        self.encryption = Some(encryption);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = format!("%PDF-{}\n%\u{e2}\u{e3}\n", self.version).into_bytes();
        let mut offsets: Vec<(u32, usize)> = Vec::new();
        let mut max = self.objects.iter().map(|(n, _)| *n).max().unwrap_or(0);

        for (num, body) in &self.objects {
            offsets.push((*num, out.len()));
            out.extend_from_slice(format!("{num} 0 obj\n").as_bytes());
            match body {
                Body::Object(text) => out.extend_from_slice(text.as_bytes()),
                Body::Stream { dict, data } => {
                    let data = match &self.encryption {
                        Some(enc) => enc.encrypt(ObjRef::new(*num, 0), data),
                        None => data.clone(),
                    };
                    out.extend_from_slice(format!("<< /Length {} {dict} >>\nstream\n", data.len()).as_bytes());
                    out.extend_from_slice(&data);
                    out.extend_from_slice(b"\nendstream");
                }
            }
            out.extend_from_slice(b"\nendobj\n");
        }

        let mut trailer = self.trailer.clone();
        if let Some(enc) = &self.encryption {
            max += 1;
            offsets.push((max, out.len()));
            out.extend_from_slice(format!("{max} 0 obj\n{}\nendobj\n", enc.dict()).as_bytes());
            let id = hex::encode(&enc.id0);
            trailer.push_str(&format!(" /Encrypt {max} 0 R /ID [<{id}> <{id}>]"));
        }
        if !trailer.contains("/Root") {
            trailer.push_str(" /Root 1 0 R");
        }

        let size = max + 1;
        let xref_at = out.len();
        out.extend_from_slice(format!("xref\n0 {size}\n0000000000 65535 f\r\n").as_bytes());
        for num in 1..size {
            match offsets.iter().find(|(n, _)| *n == num) {
                Some((_, off)) => out.extend_from_slice(format!("{off:010} 00000 n\r\n").as_bytes()),
                None => out.extend_from_slice(b"0000000000 00001 f\r\n"),
            }
        }
        out.extend_from_slice(
            format!("trailer\n<< /Size {size}{trailer} >>\nstartxref\n{xref_at}\n%%EOF\n").as_bytes(),
        );
        out
    }

    pub fn open(&self) -> PDFDocument {
        PDFDocument::open(self.build(), DocumentOptions::default()).expect("fixture opens")
    }
}

/// Catalog, a one-page tree and the page itself (objects 1 to 3) with
/// `content` as object 4.
pub fn single_page(content: &str, resources: &str) -> PdfBuilder {
    PdfBuilder::new()
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(
            3,
            &format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources {resources} /Contents 4 0 R >>"
            ),
        )
        .stream(4, "", content.as_bytes())
}

/// `n` pages under one `Pages` node; page `i` is object `3 + i` and has
/// no contents. `catalog_entries` is spliced into the catalog.
pub fn pages(n: u32, catalog_entries: &str) -> PdfBuilder {
    let kids: Vec<String> = (0..n).map(|i| format!("{} 0 R", 3 + i)).collect();
    let mut builder = PdfBuilder::new()
        .object(1, &format!("<< /Type /Catalog /Pages 2 0 R {catalog_entries} >>"))
        .object(
            2,
            &format!("<< /Type /Pages /Kids [{}] /Count {n} /MediaBox [0 0 612 792] >>", kids.join(" ")),
        );
    for i in 0..n {
        builder = builder.object(3 + i, "<< /Type /Page /Parent 2 0 R >>");
    }
    builder
}

/// Helvetica as a simple Type 1 font dictionary.
pub const HELVETICA: &str = "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>";
