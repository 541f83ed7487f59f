//! Full-rewrite serializer.
//!
//! `Writer` walks every object the cross-reference data knows about,
//! overlays pending edits, and writes a fresh file: header, objects, one
//! classic xref section and a trailer. Object and xref streams are not
//! reproduced; their members are written as ordinary indirect objects.
//! Objects come from `XRef::fetch`, so an encrypted input is written
//! decrypted and without `Encrypt`.

use crate::document::annotation::{FieldValue, widget_data};
use crate::document::catalog::PDFDocument;
use crate::document::xref::XRefEntry;
use crate::error::Result;
use crate::model::objects::{Dict, Name, ObjRef, PDFObject, PDFStream};
use crate::parser::lexer::Lexer;
use crate::utils::encode_text;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::io::Write;
use tracing::{debug, warn};

const DEFAULT_VERSION: &str = "1.7";

/// Form values to merge into the document before saving, keyed by
/// annotation id (`"12R0"`).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct AnnotationStorage(IndexMap<String, FieldValue>);

impl AnnotationStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, id: impl Into<String>, value: FieldValue) {
        self.0.insert(id.into(), value);
    }

    pub fn get(&self, id: &str) -> Option<&FieldValue> {
        self.0.get(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<FieldValue> {
        self.0.shift_remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One row of a classic xref table. `None` is a free entry.
pub type XRefRow = Option<(usize, u16)>;

pub struct Writer<'a> {
    doc: &'a PDFDocument,
    updates: BTreeMap<u32, (u16, PDFObject)>,
}

impl<'a> Writer<'a> {
    pub fn new(doc: &'a PDFDocument) -> Self {
        Self {
            doc,
            updates: BTreeMap::new(),
        }
    }

    /// Replaces (or adds) object `r`.
    pub fn update(&mut self, r: ObjRef, obj: PDFObject) {
        self.updates.insert(r.num, (r.generation, obj));
    }

    /// Next unused object number, for callers adding objects.
    pub fn next_object_number(&self) -> u32 {
        let last_update = self.updates.keys().next_back().map_or(0, |n| n + 1);
        self.doc.xref().size().max(last_update)
    }

    /// Current value of `r`: a pending edit, or the document's object.
    fn current(&self, r: ObjRef) -> Option<PDFObject> {
        if let Some((_, obj)) = self.updates.get(&r.num) {
            return Some(obj.clone());
        }
        self.doc.xref().fetch(r).map(|o| (*o).clone())
    }

    fn current_dict(&self, r: ObjRef) -> Option<Dict> {
        match self.current(r)? {
            PDFObject::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Writes the values in `storage` into their fields. Button widgets
    /// also get their appearance state switched, and the form is flagged
    /// with `NeedAppearances` since no appearance streams are generated.
    /// Ids that do not name a dictionary are skipped with a warning.
    pub fn apply_annotation_storage(&mut self, storage: &AnnotationStorage) {
        if storage.is_empty() {
            return;
        }
        let doc = self.doc;
        let xref = doc.xref();
        for (id, value) in storage.iter() {
            let Some(r) = ObjRef::parse_key(id) else {
                warn!(id, "annotation id is not an object key, skipped");
                continue;
            };
            let Some(mut widget) = self.current_dict(r) else {
                warn!(id, "annotation not found, skipped");
                continue;
            };
            let data = widget_data(xref, &widget);
            let is_button = data.checkbox || data.radio_button;
            let state = match value {
                FieldValue::Bool(true) => Some(data.export_value.clone().unwrap_or_else(|| "Yes".into())),
                FieldValue::Bool(false) => Some("Off".to_string()),
                FieldValue::Name(n) if is_button => Some(n.clone()),
                _ => None,
            };
            let v = match (&state, value) {
                (Some(state), _) => PDFObject::Name(Name::new(state)),
                (None, FieldValue::Text(s)) => PDFObject::String(encode_text(s)),
                (None, FieldValue::Name(n)) => PDFObject::Name(Name::new(n)),
                (None, FieldValue::Choice(items)) if items.len() == 1 => PDFObject::String(encode_text(&items[0])),
                (None, FieldValue::Choice(items)) => {
                    PDFObject::Array(items.iter().map(|s| PDFObject::String(encode_text(s))).collect())
                }
                (None, FieldValue::Bool(b)) => PDFObject::Bool(*b),
            };

            // Kids without a partial name are widgets of their parent field.
            let parent = widget.get("Parent").and_then(|p| p.as_ref().ok());
            match parent.filter(|_| !widget.contains("T")) {
                Some(parent_ref) => {
                    if let Some(mut field) = self.current_dict(parent_ref) {
                        field.insert("V", v);
                        if data.radio_button
                            && let Some(state) = &state
                        {
                            self.set_radio_states(&field, r, state);
                        }
                        self.update(parent_ref, PDFObject::Dict(field));
                    }
                }
                None => {
                    widget.insert("V", v);
                }
            }
            if let Some(state) = state {
                widget.insert("AS", Name::new(&state));
            }
            debug!(id, "field value applied");
            self.update(r, PDFObject::Dict(widget));
        }
        self.set_need_appearances();
    }

    /// Switches every sibling radio widget except `chosen` off.
    fn set_radio_states(&mut self, field: &Dict, chosen: ObjRef, state: &str) {
        let kids: Vec<ObjRef> = match field.get("Kids") {
            Some(PDFObject::Array(kids)) => kids.iter().filter_map(|k| k.as_ref().ok()).collect(),
            _ => return,
        };
        for kid in kids.into_iter().filter(|k| *k != chosen) {
            let Some(mut dict) = self.current_dict(kid) else { continue };
            let on = widget_data(self.doc.xref(), &dict).export_value;
            let kid_state = if on.as_deref() == Some(state) { state } else { "Off" };
            dict.insert("AS", Name::new(kid_state));
            self.update(kid, PDFObject::Dict(dict));
        }
    }

    fn set_need_appearances(&mut self) {
        let Some(root) = self.doc.xref().root_ref() else { return };
        let Some(mut catalog) = self.current_dict(root) else { return };
        match catalog.get("AcroForm") {
            Some(PDFObject::Ref(r)) => {
                let r = *r;
                if let Some(mut form) = self.current_dict(r) {
                    form.insert("NeedAppearances", true);
                    self.update(r, PDFObject::Dict(form));
                }
            }
            Some(PDFObject::Dict(form)) => {
                let mut form = form.clone();
                form.insert("NeedAppearances", true);
                catalog.insert("AcroForm", form);
                self.update(root, PDFObject::Dict(catalog));
            }
            _ => debug!("no AcroForm to flag"),
        }
    }

    /// Serializes the whole document.
    pub fn write(&self) -> Result<Vec<u8>> {
        let xref = self.doc.xref();
        xref.ensure_unlocked()?;
        let encrypt_ref = xref.trailer().get("Encrypt").and_then(|e| e.as_ref().ok());

        let version = self
            .doc
            .pdf_format_version()
            .unwrap_or_else(|| DEFAULT_VERSION.to_string());
        let mut out = Vec::new();
        out.extend_from_slice(format!("%PDF-{version}").as_bytes());
        out.extend_from_slice(b"\n%\xE2\xE3\xCF\xD3\n");

        let mut objects: BTreeMap<u32, u16> = BTreeMap::new();
        for num in xref.object_numbers() {
            match xref.entry(num) {
                Some(XRefEntry::Offset { generation, .. }) => {
                    objects.insert(num, generation);
                }
                Some(XRefEntry::Compressed { .. }) => {
                    objects.insert(num, 0);
                }
                Some(XRefEntry::Free { .. }) | None => {}
            }
        }
        for (num, (generation, _)) in &self.updates {
            objects.insert(*num, *generation);
        }
        objects.remove(&0);

        let size = objects.keys().next_back().map_or(1, |n| n + 1);
        let mut rows: Vec<XRefRow> = vec![None; size as usize];
        for (num, generation) in objects {
            let r = ObjRef::new(num, generation);
            if Some(r) == encrypt_ref {
                continue;
            }
            let obj = match self.updates.get(&num) {
                Some((_, obj)) => obj.clone(),
                None => match xref.fetch(r) {
                    Some(obj) => (*obj).clone(),
                    None => {
                        debug!(object = %r, "unreadable object left out");
                        continue;
                    }
                },
            };
            if let PDFObject::Stream(s) = &obj
                && (s.dict.is_type("ObjStm") || s.dict.is_type("XRef"))
            {
                continue;
            }
            rows[num as usize] = Some((out.len(), generation));
            out.extend_from_slice(format!("{num} {generation} obj\n").as_bytes());
            serialize_object(&mut out, &obj);
            out.extend_from_slice(b"\nendobj\n");
        }

        let startxref = out.len();
        write_xref_table(&mut out, 0, &rows);

        let mut trailer = Dict::new();
        trailer.insert("Size", i64::from(size));
        for key in ["Root", "Info", "ID"] {
            if let Some(value) = xref.trailer().get(key) {
                trailer.insert(key, value.clone());
            }
        }
        out.extend_from_slice(b"trailer\n");
        serialize_dict(&mut out, &trailer);
        out.extend_from_slice(format!("\nstartxref\n{startxref}\n%%EOF\n").as_bytes());
        Ok(out)
    }
}

/// Writes one xref section covering objects `first..first + rows.len()`.
/// Object 0 and every free row use the canonical free entry.
pub fn write_xref_table(out: &mut Vec<u8>, first: u32, rows: &[XRefRow]) {
    out.extend_from_slice(format!("xref\n{first} {}\n", rows.len()).as_bytes());
    for (i, row) in rows.iter().enumerate() {
        match row {
            Some((offset, generation)) if first as usize + i != 0 => {
                out.extend_from_slice(format!("{offset:010} {generation:05} n\r\n").as_bytes());
            }
            _ => out.extend_from_slice(b"0000000000 65535 f\r\n"),
        }
    }
}

/// Serializes a value the way it would appear in a file body.
pub fn serialize_object(out: &mut Vec<u8>, obj: &PDFObject) {
    match obj {
        PDFObject::Null => out.extend_from_slice(b"null"),
        PDFObject::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        PDFObject::Int(i) => out.extend_from_slice(i.to_string().as_bytes()),
        PDFObject::Real(r) => out.extend_from_slice(format_real(*r).as_bytes()),
        PDFObject::Name(n) => write_name(out, n.as_str()),
        PDFObject::String(s) => write_string(out, s),
        PDFObject::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                serialize_object(out, item);
            }
            out.push(b']');
        }
        PDFObject::Dict(d) => serialize_dict(out, d),
        PDFObject::Stream(s) => write_stream(out, s),
        PDFObject::Ref(r) => {
            let _ = write!(out, "{} {} R", r.num, r.generation);
        }
    }
}

fn serialize_dict(out: &mut Vec<u8>, dict: &Dict) {
    out.extend_from_slice(b"<<");
    for (key, value) in dict.iter() {
        out.push(b' ');
        write_name(out, key.as_str());
        out.push(b' ');
        serialize_object(out, value);
    }
    out.extend_from_slice(b" >>");
}

/// Dictionary with `Length` set to the raw byte count, then the raw
/// (still filter-encoded) data.
fn write_stream(out: &mut Vec<u8>, stream: &PDFStream) {
    let mut dict = stream.dict.clone();
    dict.insert("Length", stream.raw().len() as i64);
    serialize_dict(out, &dict);
    out.extend_from_slice(b"\nstream\n");
    out.extend_from_slice(stream.raw());
    out.extend_from_slice(b"\nendstream");
}

/// Shortest decimal form that reads back to the same value. `f64`
/// `Display` never uses an exponent.
fn format_real(v: f64) -> String {
    if !v.is_finite() {
        return "0".into();
    }
    if v.fract() == 0.0 && v.abs() < 1e15 {
        return format!("{}", v as i64);
    }
    format!("{v}")
}

fn write_name(out: &mut Vec<u8>, name: &str) {
    out.push(b'/');
    for &b in name.as_bytes() {
        if b == b'#' || !(b'!'..=b'~').contains(&b) || Lexer::is_delimiter(b) || Lexer::is_whitespace(b) {
            let _ = write!(out, "#{b:02X}");
        } else {
            out.push(b);
        }
    }
}

/// Literal string with `\`, parentheses and line breaks escaped. Other
/// bytes are written as they are.
fn write_string(out: &mut Vec<u8>, s: &[u8]) {
    out.push(b'(');
    for &b in s {
        match b {
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'(' => out.extend_from_slice(b"\\("),
            b')' => out.extend_from_slice(b"\\)"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\n' => out.extend_from_slice(b"\\n"),
            _ => out.push(b),
        }
    }
    out.push(b')');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocumentOptions;
    use crate::parser::pdf_parser::parse_object;
    use crate::test_utils::build;

    fn to_string(obj: &PDFObject) -> String {
        let mut out = Vec::new();
        serialize_object(&mut out, obj);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_serialize_values() {
        let obj = parse_object("<< /Type /Annot /A [1 2.5 -0.25 true null 3 0 R] /S (a\\(b\\)\\\\c) /N /x#20y >>").unwrap();
        insta::assert_snapshot!(to_string(&obj), @r"<< /Type /Annot /A [1 2.5 -0.25 true null 3 0 R] /S (a\(b\)\\c) /N /x#20y >>");
        assert_eq!(format_real(3.0), "3");
        assert_eq!(format_real(-0.0), "0");
    }

    #[test]
    fn test_reals_survive_a_rewrite() {
        for v in [0.00048828125, 0.1234567, 1e-7, -2.5e-9, 612.000001, 1.0 / 3.0] {
            let text = to_string(&PDFObject::Real(v));
            assert!(!text.contains('e'), "{text}");
            assert_eq!(parse_object(text.clone()).unwrap(), PDFObject::Real(v), "{text}");
        }
    }

    #[test]
    fn test_stream_length_corrected() {
        let obj = PDFObject::Stream(Box::new(PDFStream::new(
            parse_object("<< /Length 99 >>").unwrap().as_dict().unwrap().clone(),
            &b"abc"[..],
        )));
        assert_eq!(to_string(&obj), "<< /Length 3 >>\nstream\nabc\nendstream");
    }

    #[test]
    fn test_xref_table_free_rows_are_canonical() {
        let mut out = Vec::new();
        write_xref_table(&mut out, 0, &[Some((5, 0)), Some((17, 2)), None]);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "xref\n0 3\n0000000000 65535 f\r\n0000000017 00002 n\r\n0000000000 65535 f\r\n"
        );
    }

    fn sample() -> PDFDocument {
        let data = build(
            &[
                (1, "<< /Type /Catalog /Pages 2 0 R /AcroForm << /Fields [4 0 R 5 0 R] >> >>"),
                (2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>"),
                (3, "<< /Type /Page /MediaBox [0 0 200 200] /Annots [4 0 R 5 0 R] >>"),
                (4, "<< /Type /Annot /Subtype /Widget /FT /Tx /T (name) /Rect [0 0 10 10] >>"),
                (5, "<< /Type /Annot /Subtype /Widget /FT /Btn /T (agree) /V /Off /AS /Off /Rect [0 0 10 10] /AP << /N << /On 6 0 R /Off 6 0 R >> >> >>"),
                (6, "<< /Length 0 >>\nstream\n\nendstream"),
            ],
            "/ID [<AA> <BB>] ",
        );
        PDFDocument::open(data, DocumentOptions::default()).unwrap()
    }

    #[test]
    fn test_rewrite_reopens_with_same_pages() {
        let doc = sample();
        let out = Writer::new(&doc).write().unwrap();
        let reopened = PDFDocument::open(out, DocumentOptions::default()).unwrap();
        assert!(!reopened.xref().recovered());
        assert_eq!(reopened.num_pages(), 1);
        assert_eq!(reopened.get_page(0).unwrap().media_box, (0.0, 0.0, 200.0, 200.0));
        assert_eq!(reopened.fingerprints(), ("aa".to_string(), Some("bb".to_string())));
    }

    #[test]
    fn test_annotation_storage_applied() {
        let doc = sample();
        let mut storage = AnnotationStorage::new();
        storage.set("4R0", FieldValue::Text("Ada".into()));
        storage.set("5R0", FieldValue::Bool(true));
        storage.set("99R0", FieldValue::Text("ignored".into()));
        let mut writer = Writer::new(&doc);
        writer.apply_annotation_storage(&storage);
        let out = writer.write().unwrap();

        let reopened = PDFDocument::open(out, DocumentOptions::default()).unwrap();
        let fields = reopened.field_objects();
        assert_eq!(fields["name"][0].widget.field_value, Some(FieldValue::Text("Ada".into())));
        assert_eq!(fields["agree"][0].widget.field_value, Some(FieldValue::Name("On".into())));
        let xref = reopened.xref();
        let widget = xref.fetch_dict(ObjRef::new(5, 0)).unwrap();
        assert_eq!(widget.get_name("AS").unwrap(), "On");
        let form = xref.get_dict(&reopened.catalog(), "AcroForm").unwrap();
        assert_eq!(form.get("NeedAppearances"), Some(&PDFObject::Bool(true)));
    }

    #[test]
    fn test_update_adds_object() {
        let doc = sample();
        let mut writer = Writer::new(&doc);
        let num = writer.next_object_number();
        assert_eq!(num, 7);
        writer.update(ObjRef::new(num, 0), PDFObject::Int(42));
        let reopened = PDFDocument::open(writer.write().unwrap(), DocumentOptions::default()).unwrap();
        assert_eq!(reopened.xref().fetch(ObjRef::new(7, 0)).as_deref(), Some(&PDFObject::Int(42)));
    }
}
