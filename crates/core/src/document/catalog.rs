//! PDF Document - main entry point.
//!
//! Handles:
//! - Opening a byte buffer (through `XRef`)
//! - Page tree lookup with `Count` descent, and a flat walk when counts
//!   are missing
//! - Catalog projections (labels, destinations, outline, attachments, ...)
//! - Document info and fingerprints
//! - Per-page evaluation into operator lists and text content
//!
//! Every catalog accessor is lenient: a missing or mistyped entry yields
//! `None` or an empty collection instead of an error.

use super::annotation::{Annotation, WidgetData, full_field_name, widget_data};
use super::name_tree::{name_tree_entries, name_tree_lookup, number_tree_entries};
use super::optional_content::OptionalContentConfig;
use super::page::{Inherited, PDFPage};
use super::struct_tree::StructTreeNode;
use super::xref::{XRef, XRefEntry};
use crate::config::{DocumentOptions, EvaluatorOptions, Intent};
use crate::error::{PdfError, Result};
use crate::interp::evaluator::{CancellationToken, EvalSink, Evaluator, EvaluatorTask, ResourceCache};
use crate::interp::operator_list::OperatorList;
use crate::interp::text_content::{TextContent, TextContentSink};
use crate::model::objects::{Dict, Name, ObjRef, PDFObject};
use crate::utils::{MATRIX_IDENTITY, Rect, decode_text, format_alpha, format_roman, to_hex};
use bytes::Bytes;
use indexmap::IndexMap;
use regex::bytes::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::{Arc, LazyLock, Mutex, OnceLock};
use tracing::{debug, warn};

/// Bytes hashed for the fingerprint when the trailer has no usable `ID`.
const FINGERPRINT_BYTES: usize = 1024;
const MAX_OUTLINE_DEPTH: usize = 64;

static HEADER_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%PDF-(\d\.\d)").expect("static regex"));

const PAGE_LAYOUTS: [&str; 6] = [
    "SinglePage",
    "OneColumn",
    "TwoColumnLeft",
    "TwoColumnRight",
    "TwoPageLeft",
    "TwoPageRight",
];

const PAGE_MODES: [&str; 6] = [
    "UseNone",
    "UseOutlines",
    "UseThumbs",
    "FullScreen",
    "UseOC",
    "UseAttachments",
];

/// `Info` dictionary plus structural facts about the file.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DocumentInfo {
    #[serde(rename = "PDFFormatVersion")]
    pub pdf_format_version: Option<String>,
    pub is_linearized: bool,
    pub is_acro_form_present: bool,
    #[serde(rename = "IsXFAPresent")]
    pub is_xfa_present: bool,
    pub is_collection_present: bool,
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub mod_date: Option<String>,
    /// Other text entries of `Info`.
    pub custom: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineItem {
    pub title: String,
    pub dest: Option<PDFObject>,
    pub url: Option<String>,
    pub action: Option<String>,
    pub bold: bool,
    pub italic: bool,
    pub color: Option<[u8; 3]>,
    pub count: Option<i64>,
    pub items: Vec<OutlineItem>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Attachment {
    pub filename: String,
    pub description: Option<String>,
    #[serde(skip)]
    pub content: Vec<u8>,
}

/// A terminal form field.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldObject {
    pub id: String,
    pub page_ref: Option<ObjRef>,
    pub rect: Option<Rect>,
    #[serde(flatten)]
    pub widget: WidgetData,
}

/// How pages are found, decided once per document.
#[derive(Debug)]
enum PageTree {
    /// The root `Count` is trusted; pages are found by descent.
    Counted(usize),
    /// Pages collected by walking the tree (or scanning the file).
    Flat(Vec<(ObjRef, Inherited)>),
}

/// An open PDF document.
#[derive(Debug)]
pub struct PDFDocument {
    xref: XRef,
    options: DocumentOptions,
    cache: ResourceCache,
    page_tree: OnceLock<PageTree>,
    pages: Mutex<FxHashMap<usize, Arc<PDFPage>>>,
    hidden_groups: OnceLock<FxHashSet<ObjRef>>,
}

impl PDFDocument {
    /// Opens `data`. Fails only when no cross-reference data (or no
    /// trailer with a `Root`) can be found; an encrypted document opens
    /// without its password and reports the password code on content
    /// access.
    pub fn open(data: impl Into<Bytes>, options: DocumentOptions) -> Result<Self> {
        let xref = XRef::parse(data.into(), &options)?;
        if xref.root_ref().is_none() {
            return Err(PdfError::ObjectNotFound("trailer Root".into()));
        }
        debug!(objects = xref.size(), recovered = xref.recovered(), "document opened");
        Ok(Self {
            xref,
            options,
            cache: ResourceCache::new(),
            page_tree: OnceLock::new(),
            pages: Mutex::new(FxHashMap::default()),
            hidden_groups: OnceLock::new(),
        })
    }

    pub const fn xref(&self) -> &XRef {
        &self.xref
    }

    pub const fn options(&self) -> &DocumentOptions {
        &self.options
    }

    /// The catalog dictionary; empty when `Root` cannot be read.
    pub fn catalog(&self) -> Dict {
        self.xref
            .root_ref()
            .and_then(|r| self.xref.fetch_dict(r))
            .unwrap_or_default()
    }

    // ---- security ---------------------------------------------------------

    pub fn is_encrypted(&self) -> bool {
        self.xref.is_encrypted()
    }

    /// Tries `password`; on success everything read so far is re-read
    /// decrypted.
    pub fn check_password(&self, password: &[u8]) -> Result<()> {
        self.xref.check_password(password)?;
        self.pages.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.cache.clear();
        Ok(())
    }

    pub fn permissions(&self) -> Option<i32> {
        self.xref.permissions()
    }

    // ---- pages ------------------------------------------------------------

    fn page_tree(&self) -> &PageTree {
        self.page_tree.get_or_init(|| {
            let catalog = self.catalog();
            if let Some(pages) = self.xref.get_dict(&catalog, "Pages")
                && let Some(count) = self.xref.get(&pages, "Count").and_then(|c| c.as_int().ok())
                && count >= 0
            {
                return PageTree::Counted(count as usize);
            }
            warn!("page tree has no usable Count, walking it");
            let mut flat = self.walk_page_tree(&catalog);
            if flat.is_empty() {
                warn!("no pages reachable from the catalog, scanning objects");
                flat = self.scan_pages();
            }
            PageTree::Flat(flat)
        })
    }

    pub fn num_pages(&self) -> usize {
        match self.page_tree() {
            PageTree::Counted(n) => *n,
            PageTree::Flat(pages) => pages.len(),
        }
    }

    /// Depth-first walk of the whole page tree.
    fn walk_page_tree(&self, catalog: &Dict) -> Vec<(ObjRef, Inherited)> {
        let Some(root) = catalog.get("Pages").and_then(|p| p.as_ref().ok()) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut visited = FxHashSet::default();
        let mut stack = vec![(root, Inherited::default(), 0usize)];
        while let Some((r, mut inherited, depth)) = stack.pop() {
            if !visited.insert(r) || depth > self.options.max_page_tree_depth {
                warn!(node = %r, "page tree node revisited or too deep, skipped");
                continue;
            }
            let Some(node) = self.xref.fetch_dict(r) else { continue };
            inherited.absorb(&node);
            match self.xref.get(&node, "Kids") {
                Some(kids) if !node.is_type("Page") => {
                    let Ok(kids) = kids.as_array() else { continue };
                    for kid in kids.iter().rev() {
                        if let Ok(kid) = kid.as_ref() {
                            stack.push((kid, inherited.clone(), depth + 1));
                        }
                    }
                }
                _ => out.push((r, inherited)),
            }
        }
        out
    }

    /// Every `/Type /Page` object in the file, in object-number order.
    fn scan_pages(&self) -> Vec<(ObjRef, Inherited)> {
        self.xref
            .object_numbers()
            .into_iter()
            .filter_map(|num| {
                let generation = self.xref.entry(num)?.generation();
                let r = ObjRef::new(num, generation);
                let dict = self.xref.fetch_dict(r)?;
                dict.is_type("Page").then(|| {
                    let mut inherited = Inherited::default();
                    inherited.absorb(&dict);
                    (r, inherited)
                })
            })
            .collect()
    }

    /// Finds page `index` by descending through `Kids`, skipping subtrees
    /// by their `Count`.
    fn descend(&self, index: usize) -> Result<(ObjRef, Dict, Inherited)> {
        let xref = &self.xref;
        let catalog = self.catalog();
        let mut node_ref = catalog
            .get("Pages")
            .and_then(|p| p.as_ref().ok())
            .ok_or_else(|| PdfError::SyntaxError("catalog has no Pages reference".into()))?;
        let mut remaining = index;
        let mut inherited = Inherited::default();
        let mut visited = FxHashSet::default();

        for _ in 0..self.options.max_page_tree_depth {
            if !visited.insert(node_ref) {
                return Err(PdfError::SyntaxError(format!("cycle in page tree at {node_ref}")));
            }
            let node = xref
                .fetch_dict(node_ref)
                .ok_or_else(|| PdfError::ObjectNotFound(node_ref.to_string()))?;
            inherited.absorb(&node);
            let kids = xref
                .get(&node, "Kids")
                .and_then(|k| k.as_array().ok().map(<[PDFObject]>::to_vec));
            let Some(kids) = kids.filter(|_| !node.is_type("Page")) else {
                if remaining == 0 {
                    return Ok((node_ref, node, inherited));
                }
                break;
            };

            let mut next = None;
            for kid in &kids {
                let Ok(kid_ref) = kid.as_ref() else {
                    debug!("page tree kid is not a reference, skipped");
                    continue;
                };
                let Some(kid_dict) = xref.fetch_dict(kid_ref) else { continue };
                let is_node = kid_dict.is_type("Pages") || (!kid_dict.is_type("Page") && kid_dict.contains("Kids"));
                if is_node {
                    let count = xref
                        .get(&kid_dict, "Count")
                        .and_then(|c| c.as_int().ok())
                        .unwrap_or(0)
                        .max(0) as usize;
                    if remaining < count {
                        next = Some(kid_ref);
                        break;
                    }
                    remaining -= count;
                } else if remaining == 0 {
                    inherited.absorb(&kid_dict);
                    return Ok((kid_ref, kid_dict, inherited));
                } else {
                    remaining -= 1;
                }
            }
            match next {
                Some(r) => node_ref = r,
                None => break,
            }
        }
        Err(PdfError::SyntaxError(format!("page {index} not found in page tree")))
    }

    /// Page `index` (zero-based). Out-of-range indices are an
    /// `InvalidArgument` error.
    pub fn get_page(&self, index: usize) -> Result<Arc<PDFPage>> {
        let count = self.num_pages();
        if index >= count {
            return Err(PdfError::InvalidArgument(format!(
                "page index {index} out of range (document has {count} pages)"
            )));
        }
        if let Some(page) = self.pages.lock().unwrap_or_else(|e| e.into_inner()).get(&index) {
            return Ok(page.clone());
        }
        let (objref, dict, inherited) = match self.page_tree() {
            PageTree::Counted(_) => self.descend(index)?,
            PageTree::Flat(pages) => {
                let (r, inherited) = pages[index].clone();
                let dict = self
                    .xref
                    .fetch_dict(r)
                    .ok_or_else(|| PdfError::ObjectNotFound(r.to_string()))?;
                (r, dict, inherited)
            }
        };
        let page = Arc::new(PDFPage::new(&self.xref, index, objref, dict, &inherited));
        self.pages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(index, page.clone());
        Ok(page)
    }

    /// Index of the page whose object is `r`.
    pub fn page_index_of(&self, r: ObjRef) -> Option<usize> {
        (0..self.num_pages()).find(|&i| self.get_page(i).is_ok_and(|p| p.objref == r))
    }

    /// Dense label list covering every page, or `None` without
    /// `PageLabels`. Pages before the first range get an empty label.
    pub fn page_labels(&self) -> Option<Vec<String>> {
        let catalog = self.catalog();
        let entries = number_tree_entries(&self.xref, catalog.get("PageLabels")?);
        if entries.is_empty() {
            return None;
        }
        let count = self.num_pages();
        let mut labels = Vec::with_capacity(count);
        let mut ranges = entries.iter().peekable();
        let mut style: Option<Name> = None;
        let mut prefix = String::new();
        let mut value: u32 = 1;
        for i in 0..count {
            while let Some((start, range)) = ranges.next_if(|(start, _)| *start <= i as i64) {
                if *start != i as i64 {
                    continue;
                }
                let range = self
                    .xref
                    .resolve(range)
                    .and_then(|r| r.as_dict().ok().cloned())
                    .unwrap_or_default();
                style = range.get_name("S");
                prefix = self
                    .xref
                    .get(&range, "P")
                    .and_then(|p| p.as_string().ok().map(decode_text))
                    .unwrap_or_default();
                value = self
                    .xref
                    .get(&range, "St")
                    .and_then(|s| s.as_int().ok())
                    .and_then(|s| u32::try_from(s).ok())
                    .filter(|s| *s >= 1)
                    .unwrap_or(1);
            }
            let number = match style.as_ref().map(Name::as_str) {
                Some("D") => value.to_string(),
                Some("R") => format_roman(value, false),
                Some("r") => format_roman(value, true),
                Some("A") => format_alpha(value, false),
                Some("a") => format_alpha(value, true),
                _ => String::new(),
            };
            labels.push(format!("{prefix}{number}"));
            value = value.saturating_add(1);
        }
        Some(labels)
    }

    // ---- evaluation -------------------------------------------------------

    fn hidden_groups(&self) -> &FxHashSet<ObjRef> {
        self.hidden_groups.get_or_init(|| {
            self.optional_content_config()
                .map(|c| c.hidden_groups())
                .unwrap_or_default()
        })
    }

    /// Starts a resumable evaluation of page `index` into `sink`.
    pub fn page_task<'a, S: EvalSink>(
        &'a self,
        index: usize,
        options: &'a EvaluatorOptions,
        sink: S,
        cancel: CancellationToken,
    ) -> Result<EvaluatorTask<'a, S>> {
        self.xref.ensure_unlocked()?;
        let page = self.get_page(index)?;
        let parts = page.content_data(&self.xref);
        let mut ev = Evaluator::new(&self.xref, &self.cache, options);
        if options.intent == Intent::Oc {
            ev = ev.with_hidden_groups(self.hidden_groups());
        }
        Ok(ev.task(&parts, page.resources.clone(), MATRIX_IDENTITY, sink, cancel))
    }

    /// The operator list of page `index`, evaluated to completion.
    pub fn get_operator_list(&self, index: usize, options: &EvaluatorOptions) -> Result<OperatorList> {
        let mut task = self.page_task(index, options, OperatorList::new(), CancellationToken::new())?;
        task.run()?;
        Ok(task.into_sink())
    }

    pub fn get_text_content(&self, index: usize, options: &EvaluatorOptions) -> Result<TextContent> {
        let sink = TextContentSink::new(options.normalize_unicode, options.include_marked_content, index);
        let mut task = self.page_task(index, options, sink, CancellationToken::new())?;
        task.run()?;
        Ok(task.into_sink().finish())
    }

    pub fn get_annotations(&self, index: usize, intent: Intent) -> Result<Vec<Annotation>> {
        self.xref.ensure_unlocked()?;
        self.get_page(index)?.annotations(&self.xref, intent)
    }

    /// Drops cached fonts and images.
    pub fn cleanup(&self) {
        self.cache.clear();
    }

    // ---- document info ----------------------------------------------------

    /// Version from the header, raised by a catalog `Version` entry.
    pub fn pdf_format_version(&self) -> Option<String> {
        let data = self.xref.data();
        let head = &data[..data.len().min(FINGERPRINT_BYTES)];
        let header = HEADER_VERSION
            .captures(head)
            .and_then(|c| c.get(1))
            .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned());
        let catalog = self.catalog().get_name("Version").map(|v| v.as_str().to_string());
        match (header, catalog) {
            (Some(h), Some(c)) => Some(if c > h { c } else { h }),
            (h, c) => h.or(c),
        }
    }

    /// True when the first object is a linearization dictionary whose `L`
    /// matches the file length.
    pub fn is_linearized(&self) -> bool {
        let first = self
            .xref
            .object_numbers()
            .into_iter()
            .filter_map(|num| match self.xref.entry(num)? {
                XRefEntry::Offset { offset, generation } => Some((offset, ObjRef::new(num, generation))),
                _ => None,
            })
            .min_by_key(|(offset, _)| *offset);
        let Some((_, r)) = first else { return false };
        let Some(dict) = self.xref.fetch_dict(r) else { return false };
        dict.contains("Linearized")
            && self
                .xref
                .get(&dict, "L")
                .and_then(|l| l.as_int().ok())
                .is_some_and(|l| l as usize == self.xref.data().len())
    }

    pub fn document_info(&self) -> DocumentInfo {
        let xref = &self.xref;
        let catalog = self.catalog();
        let acro_form = xref.get_dict(&catalog, "AcroForm");
        let is_xfa_present = acro_form.as_ref().is_some_and(|af| match xref.get(af, "XFA").as_deref() {
            Some(PDFObject::Stream(_)) => true,
            Some(PDFObject::Array(items)) => !items.is_empty(),
            _ => false,
        });
        let has_fields = acro_form.as_ref().is_some_and(|af| {
            xref.get(af, "Fields")
                .is_some_and(|f| f.as_array().is_ok_and(|f| !f.is_empty()))
        });

        let mut info = DocumentInfo {
            pdf_format_version: self.pdf_format_version(),
            is_linearized: self.is_linearized(),
            is_acro_form_present: has_fields || is_xfa_present,
            is_xfa_present,
            is_collection_present: xref.get_dict(&catalog, "Collection").is_some(),
            ..DocumentInfo::default()
        };
        let Some(dict) = xref.get_dict(xref.trailer(), "Info") else {
            return info;
        };
        for (key, value) in dict.iter() {
            let Some(value) = xref.resolve(value) else { continue };
            let Ok(s) = value.as_string() else {
                debug!(%key, "non-string Info entry skipped");
                continue;
            };
            let text = decode_text(s);
            match key.as_str() {
                "Title" => info.title = Some(text),
                "Author" => info.author = Some(text),
                "Subject" => info.subject = Some(text),
                "Keywords" => info.keywords = Some(text),
                "Creator" => info.creator = Some(text),
                "Producer" => info.producer = Some(text),
                "CreationDate" => info.creation_date = Some(text),
                "ModDate" => info.mod_date = Some(text),
                other => {
                    info.custom.insert(other.to_string(), text);
                }
            }
        }
        info
    }

    /// `[ID[0] or md5 of the first bytes, ID[1]]` as lowercase hex.
    pub fn fingerprints(&self) -> (String, Option<String>) {
        let ids: Vec<Vec<u8>> = self
            .xref
            .get(self.xref.trailer(), "ID")
            .and_then(|id| {
                id.as_array()
                    .ok()
                    .map(|items| items.iter().filter_map(|i| i.as_string().ok().map(<[u8]>::to_vec)).collect())
            })
            .unwrap_or_default();
        let usable = |id: &[u8]| !id.is_empty() && id.iter().any(|b| *b != 0);
        let first = match ids.first().filter(|id| usable(id.as_slice())) {
            Some(id) => to_hex(id),
            None => {
                let data = self.xref.data();
                to_hex(&md5::compute(&data[..data.len().min(FINGERPRINT_BYTES)]).0)
            }
        };
        let second = ids.get(1).filter(|id| usable(id.as_slice())).map(|id| to_hex(id));
        (first, second)
    }

    // ---- catalog projections ----------------------------------------------

    pub fn page_layout(&self) -> Option<&'static str> {
        self.catalog()
            .get_name("PageLayout")
            .map(|n| n.as_str())
            .filter(|n| PAGE_LAYOUTS.contains(n))
    }

    pub fn page_mode(&self) -> &'static str {
        self.catalog()
            .get_name("PageMode")
            .map(|n| n.as_str())
            .filter(|n| PAGE_MODES.contains(n))
            .unwrap_or("UseNone")
    }

    pub fn lang(&self) -> Option<String> {
        self.xref
            .get(&self.catalog(), "Lang")
            .and_then(|l| l.as_string().ok().map(decode_text))
    }

    /// XMP metadata stream as text.
    pub fn metadata(&self) -> Option<String> {
        let catalog = self.catalog();
        let stream = self.xref.get(&catalog, "Metadata")?;
        let stream = stream.as_stream().ok()?;
        match self.xref.decode_stream(stream) {
            Ok(decoded) => Some(String::from_utf8_lossy(&decoded.data).into_owned()),
            Err(err) => {
                warn!(%err, "metadata stream could not be decoded");
                None
            }
        }
    }

    /// `OpenAction` as a destination array or action dictionary.
    pub fn open_action(&self) -> Option<PDFObject> {
        self.xref.get(&self.catalog(), "OpenAction").map(|a| a.into_owned())
    }

    fn names_tree(&self, key: &str) -> Option<PDFObject> {
        let names = self.xref.get_dict(&self.catalog(), "Names")?;
        names.get(key).cloned()
    }

    /// A destination value: explicit arrays stay as they are, dictionaries
    /// are unwrapped to their `D` entry.
    fn dest_value(&self, value: &PDFObject) -> Option<PDFObject> {
        let value = self.xref.resolve(value)?;
        if value.as_array().is_ok() {
            return Some(value.into_owned());
        }
        let dict = value.as_dict().ok()?;
        self.xref.get(dict, "D").map(|d| d.into_owned())
    }

    /// Named destinations from the `Dests` name tree and the legacy
    /// catalog `Dests` dictionary.
    pub fn destinations(&self) -> IndexMap<String, PDFObject> {
        let mut out = IndexMap::new();
        if let Some(tree) = self.names_tree("Dests") {
            for (name, value) in name_tree_entries(&self.xref, &tree) {
                if let Some(dest) = self.dest_value(&value) {
                    out.insert(String::from_utf8_lossy(&name).into_owned(), dest);
                }
            }
        }
        if let Some(legacy) = self.xref.get_dict(&self.catalog(), "Dests") {
            for (name, value) in legacy.iter() {
                if let Some(dest) = self.dest_value(value) {
                    out.insert(name.as_str().to_string(), dest);
                }
            }
        }
        out
    }

    pub fn get_destination(&self, name: &str) -> Option<PDFObject> {
        if let Some(tree) = self.names_tree("Dests")
            && let Some(value) = name_tree_lookup(&self.xref, &tree, name.as_bytes())
        {
            return self.dest_value(&value);
        }
        let legacy = self.xref.get_dict(&self.catalog(), "Dests")?;
        self.dest_value(legacy.get(name)?)
    }

    /// Embedded files keyed by their name-tree name.
    pub fn attachments(&self) -> IndexMap<String, Attachment> {
        let mut out = IndexMap::new();
        let Some(tree) = self.names_tree("EmbeddedFiles") else {
            return out;
        };
        let xref = &self.xref;
        for (name, spec) in name_tree_entries(xref, &tree) {
            let Some(spec) = xref.resolve(&spec).and_then(|s| s.as_dict().ok().cloned()) else {
                continue;
            };
            let text = |key: &str| xref.get(&spec, key).and_then(|v| v.as_string().ok().map(decode_text));
            let filename = text("UF").or_else(|| text("F")).unwrap_or_default();
            let content = xref
                .get_dict(&spec, "EF")
                .and_then(|ef| xref.get(&ef, "UF").or_else(|| xref.get(&ef, "F")).map(|s| s.into_owned()))
                .and_then(|s| s.as_stream().ok().and_then(|s| xref.decode_stream(s).ok()))
                .map(|d| d.data)
                .unwrap_or_default();
            out.insert(
                String::from_utf8_lossy(&name).into_owned(),
                Attachment {
                    filename,
                    description: text("Desc"),
                    content,
                },
            );
        }
        out
    }

    fn javascript_source(&self, action: &PDFObject) -> Option<String> {
        let action = self.xref.resolve(action)?;
        let action = action.as_dict().ok()?;
        if action.get_name("S").is_none_or(|s| s != "JavaScript") {
            return None;
        }
        let js = self.xref.get(action, "JS")?;
        match &*js {
            PDFObject::String(s) => Some(decode_text(s)),
            PDFObject::Stream(s) => self
                .xref
                .decode_stream(s)
                .ok()
                .map(|d| String::from_utf8_lossy(&d.data).into_owned()),
            _ => None,
        }
    }

    /// Document-level scripts: the `JavaScript` name tree, then a
    /// JavaScript `OpenAction`.
    pub fn javascript(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .names_tree("JavaScript")
            .map(|tree| {
                name_tree_entries(&self.xref, &tree)
                    .iter()
                    .filter_map(|(_, action)| self.javascript_source(action))
                    .collect()
            })
            .unwrap_or_default();
        if let Some(action) = self.catalog().get("OpenAction")
            && let Some(js) = self.javascript_source(action)
        {
            out.push(js);
        }
        out
    }

    /// The document outline (bookmarks).
    pub fn outline(&self) -> Vec<OutlineItem> {
        let Some(outlines) = self.xref.get_dict(&self.catalog(), "Outlines") else {
            return Vec::new();
        };
        let mut visited = FxHashSet::default();
        self.outline_level(outlines.get("First"), &mut visited, 0)
    }

    fn outline_level(&self, first: Option<&PDFObject>, visited: &mut FxHashSet<ObjRef>, depth: usize) -> Vec<OutlineItem> {
        let xref = &self.xref;
        let mut items = Vec::new();
        if depth > MAX_OUTLINE_DEPTH {
            warn!("outline deeper than {MAX_OUTLINE_DEPTH} levels");
            return items;
        }
        let mut current = first.and_then(|f| f.as_ref().ok());
        while let Some(r) = current {
            if !visited.insert(r) {
                warn!(item = %r, "outline loops back, stopping");
                break;
            }
            let Some(node) = xref.fetch_dict(r) else { break };
            let mut dest = node.get("Dest").and_then(|d| self.dest_value(d).or_else(|| xref.resolve(d).map(|d| d.into_owned())));
            let mut url = None;
            let mut action = None;
            if let Some(a) = xref.get_dict(&node, "A") {
                match a.get_name("S").as_ref().map(Name::as_str) {
                    Some("URI") => {
                        url = xref
                            .get(&a, "URI")
                            .and_then(|u| u.as_string().ok().map(|s| String::from_utf8_lossy(s).into_owned()));
                    }
                    Some("GoTo") => dest = xref.get(&a, "D").map(|d| d.into_owned()),
                    Some("Named") => action = a.get_name("N").map(|n| n.as_str().to_string()),
                    _ => {}
                }
            }
            let style = xref.get(&node, "F").and_then(|f| f.as_int().ok()).unwrap_or(0);
            let color = xref
                .get(&node, "C")
                .and_then(|c| c.as_num_array().ok())
                .filter(|c| c.len() == 3)
                .map(|c| crate::color::ColorSpace::DeviceRGB.get_rgb(&c));
            items.push(OutlineItem {
                title: xref
                    .get(&node, "Title")
                    .and_then(|t| t.as_string().ok().map(decode_text))
                    .unwrap_or_default(),
                dest,
                url,
                action,
                bold: style & 2 != 0,
                italic: style & 1 != 0,
                color,
                count: xref.get(&node, "Count").and_then(|c| c.as_int().ok()),
                items: self.outline_level(node.get("First"), visited, depth + 1),
            });
            current = node.get("Next").and_then(|n| n.as_ref().ok());
        }
        items
    }

    /// The whole logical structure tree.
    pub fn struct_tree(&self) -> Option<StructTreeNode> {
        let root = self.xref.get_dict(&self.catalog(), "StructTreeRoot")?;
        Some(StructTreeNode::build(&self.xref, &root))
    }

    /// The structure tree restricted to page `index`.
    pub fn page_struct_tree(&self, index: usize) -> Result<Option<StructTreeNode>> {
        let page = self.get_page(index)?;
        Ok(self.struct_tree().and_then(|t| t.for_page(page.objref)))
    }

    /// Terminal form fields grouped by fully qualified name.
    pub fn field_objects(&self) -> IndexMap<String, Vec<FieldObject>> {
        let mut out: IndexMap<String, Vec<FieldObject>> = IndexMap::new();
        let Some(acro_form) = self.xref.get_dict(&self.catalog(), "AcroForm") else {
            return out;
        };
        let Some(fields) = self.xref.get(&acro_form, "Fields") else {
            return out;
        };
        let Ok(fields) = fields.as_array() else {
            return out;
        };
        let mut visited = FxHashSet::default();
        for field in fields {
            self.collect_fields(field, &mut visited, &mut out, 0);
        }
        out
    }

    fn collect_fields(
        &self,
        field: &PDFObject,
        visited: &mut FxHashSet<ObjRef>,
        out: &mut IndexMap<String, Vec<FieldObject>>,
        depth: usize,
    ) {
        let xref = &self.xref;
        let Ok(r) = field.as_ref() else { return };
        if !visited.insert(r) || depth > MAX_OUTLINE_DEPTH {
            return;
        }
        let Some(dict) = xref.fetch_dict(r) else { return };
        let kids: Vec<PDFObject> = xref
            .get(&dict, "Kids")
            .and_then(|k| k.as_array().ok().map(<[PDFObject]>::to_vec))
            .unwrap_or_default();
        // Kids without their own partial name are widgets of this field.
        let has_child_fields = kids
            .iter()
            .any(|k| xref.resolve(k).is_some_and(|k| k.as_dict().is_ok_and(|d| d.contains("T"))));
        if has_child_fields {
            for kid in &kids {
                self.collect_fields(kid, visited, out, depth + 1);
            }
            return;
        }
        let name = full_field_name(xref, &dict);
        out.entry(name).or_default().push(FieldObject {
            id: r.to_string(),
            page_ref: dict.get("P").and_then(|p| p.as_ref().ok()),
            rect: xref.get(&dict, "Rect").and_then(|rect| rect.as_rect().ok()),
            widget: widget_data(xref, &dict),
        });
    }

    /// The default optional content configuration, if the document has
    /// one.
    pub fn optional_content_config(&self) -> Option<OptionalContentConfig> {
        let props = self.xref.get_dict(&self.catalog(), "OCProperties")?;
        OptionalContentConfig::parse(&self.xref, &props)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::build;

    fn open(objects: &[(u32, &str)], trailer: &str) -> PDFDocument {
        PDFDocument::open(build(objects, trailer), DocumentOptions::default()).unwrap()
    }

    #[test]
    fn test_nested_page_tree_descent() {
        let doc = open(
            &[
                (1, "<< /Type /Catalog /Pages 2 0 R >>"),
                (2, "<< /Type /Pages /Kids [3 0 R 6 0 R] /Count 3 /MediaBox [0 0 100 100] >>"),
                (3, "<< /Type /Pages /Parent 2 0 R /Kids [4 0 R 5 0 R] /Count 2 /Rotate 90 >>"),
                (4, "<< /Type /Page /Parent 3 0 R >>"),
                (5, "<< /Type /Page /Parent 3 0 R /MediaBox [0 0 50 50] >>"),
                (6, "<< /Type /Page /Parent 2 0 R >>"),
            ],
            "",
        );
        assert_eq!(doc.num_pages(), 3);
        let p1 = doc.get_page(1).unwrap();
        assert_eq!(p1.objref, ObjRef::new(5, 0));
        assert_eq!(p1.media_box, (0.0, 0.0, 50.0, 50.0));
        assert_eq!(p1.rotate, 90);
        let p2 = doc.get_page(2).unwrap();
        assert_eq!(p2.objref, ObjRef::new(6, 0));
        assert_eq!(p2.rotate, 0);
        assert!(matches!(doc.get_page(3), Err(PdfError::InvalidArgument(_))));
        assert_eq!(doc.page_index_of(ObjRef::new(6, 0)), Some(2));
    }

    #[test]
    fn test_missing_count_walks_tree() {
        let doc = open(
            &[
                (1, "<< /Type /Catalog /Pages 2 0 R >>"),
                (2, "<< /Type /Pages /Kids [3 0 R 4 0 R] >>"),
                (3, "<< /Type /Page >>"),
                (4, "<< /Type /Page >>"),
            ],
            "",
        );
        assert_eq!(doc.num_pages(), 2);
        assert_eq!(doc.get_page(1).unwrap().objref, ObjRef::new(4, 0));
    }

    fn labelled(labels: &str) -> PDFDocument {
        let catalog = format!("<< /Type /Catalog /Pages 2 0 R /PageLabels << /Nums {labels} >> >>");
        let catalog: &'static str = Box::leak(catalog.into_boxed_str());
        open(
            &[
                (1, catalog),
                (2, "<< /Type /Pages /Kids [3 0 R 4 0 R 5 0 R] /Count 3 >>"),
                (3, "<< /Type /Page >>"),
                (4, "<< /Type /Page >>"),
                (5, "<< /Type /Page >>"),
            ],
            "",
        )
    }

    #[test]
    fn test_page_labels_styles() {
        assert_eq!(labelled("[0 << /S /D /St 1 >>]").page_labels().unwrap(), ["1", "2", "3"]);
        assert_eq!(labelled("[0 << /S /A >>]").page_labels().unwrap(), ["A", "B", "C"]);
        assert_eq!(
            labelled("[0 << /S /r >> 2 << /S /D /P (p-) /St 7 >>]").page_labels().unwrap(),
            ["i", "ii", "p-7"]
        );
        assert_eq!(labelled("[1 << /S /D >>]").page_labels().unwrap(), ["", "1", "2"]);
    }

    #[test]
    fn test_page_label_start_out_of_range() {
        assert_eq!(labelled("[0 << /S /D /St 4294967296 >>]").page_labels().unwrap(), ["1", "2", "3"]);
        assert_eq!(
            labelled("[0 << /S /R /St 4294967294 >>]").page_labels().unwrap(),
            ["4294967294", "4294967295", "4294967295"]
        );
    }

    #[test]
    fn test_fingerprints_from_id_and_fallback() {
        let objects = [
            (1, "<< /Type /Catalog /Pages 2 0 R >>"),
            (2, "<< /Type /Pages /Kids [] /Count 0 >>"),
        ];
        let doc = open(&objects, "/ID [<0102ABCD> <00000000>] ");
        assert_eq!(doc.fingerprints(), ("0102abcd".to_string(), None));

        let doc = open(&objects, "");
        let (first, second) = doc.fingerprints();
        assert_eq!(first.len(), 32);
        assert_eq!(second, None);
    }

    #[test]
    fn test_document_info() {
        let doc = open(
            &[
                (1, "<< /Type /Catalog /Pages 2 0 R /AcroForm << /Fields [3 0 R] >> >>"),
                (2, "<< /Type /Pages /Kids [] /Count 0 >>"),
                (3, "<< /FT /Tx /T (name) >>"),
                (4, "<< /Title (Report) /Producer <FEFF00710075> /Custom (x) /Trapped /False >>"),
            ],
            "/Info 4 0 R ",
        );
        let info = doc.document_info();
        assert_eq!(info.pdf_format_version.as_deref(), Some("1.4"));
        assert!(info.is_acro_form_present);
        assert!(!info.is_xfa_present);
        assert!(!info.is_linearized);
        assert_eq!(info.title.as_deref(), Some("Report"));
        assert_eq!(info.producer.as_deref(), Some("qu"));
        assert_eq!(info.custom.get("Custom").map(String::as_str), Some("x"));
        assert_eq!(doc.field_objects()["name"][0].id, "3R0");
    }

    #[test]
    fn test_destinations_and_outline() {
        let doc = open(
            &[
                (1, "<< /Type /Catalog /Pages 2 0 R /Names << /Dests 5 0 R >> /Outlines 6 0 R /PageMode /UseOutlines /PageLayout /Bogus >>"),
                (2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>"),
                (3, "<< /Type /Page >>"),
                (5, "<< /Names [(intro) [3 0 R /Fit] (toc) << /D [3 0 R /XYZ 0 0 0] >>] >>"),
                (6, "<< /First 7 0 R /Last 8 0 R >>"),
                (7, "<< /Title (One) /Dest (intro) /Next 8 0 R /F 2 >>"),
                (8, "<< /Title (Two) /A << /S /URI /URI (https://example.org) >> /Next 7 0 R >>"),
            ],
            "",
        );
        let dests = doc.destinations();
        assert_eq!(dests.len(), 2);
        assert!(doc.get_destination("toc").is_some_and(|d| d.as_array().is_ok_and(|a| a.len() == 5)));
        assert_eq!(doc.page_mode(), "UseOutlines");
        assert_eq!(doc.page_layout(), None);

        let outline = doc.outline();
        assert_eq!(outline.len(), 2);
        assert!(outline[0].bold);
        assert_eq!(outline[1].url.as_deref(), Some("https://example.org"));
    }
}
