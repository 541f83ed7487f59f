//! Cross-reference resolution and object fetching.
//!
//! The table is read once at construction, following `Prev` from the
//! section at `startxref` towards older sections. Objects are parsed lazily
//! on first `fetch` and cached; the cache also remembers objects that could
//! not be read so a bad entry is only reported once.

use crate::codec::{self, Decoded};
use crate::config::DocumentOptions;
use crate::document::security::StandardSecurityHandler;
use crate::error::{PasswordCode, PdfError, Result};
use crate::model::objects::{Dict, Name, ObjRef, PDFObject};
use crate::parser::lexer::{Keyword, Lexer, Token};
use crate::parser::pdf_parser::PDFParser;
use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use regex::bytes::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::ops::Deref;
use std::sync::{Arc, LazyLock, Mutex, OnceLock, RwLock};
use tracing::{debug, warn};

/// How far back from the end of the file `startxref` is searched for.
const STARTXREF_WINDOW: usize = 1024;

static OBJ_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)[\x00\t\n\x0C\r ]+(\d+)[\x00\t\n\x0C\r ]+obj\b").expect("static regex"));

/// Where an object lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    Free { generation: u16 },
    Offset { offset: usize, generation: u16 },
    /// Member `index` of object stream `stream_num`.
    Compressed { stream_num: u32, index: u32 },
}

impl XRefEntry {
    pub const fn generation(&self) -> u16 {
        match self {
            Self::Free { generation } | Self::Offset { generation, .. } => *generation,
            Self::Compressed { .. } => 0,
        }
    }
}

enum Security {
    None,
    Unlocked {
        handler: StandardSecurityHandler,
        key: Vec<u8>,
        encrypt_ref: Option<ObjRef>,
    },
    Locked {
        handler: StandardSecurityHandler,
        code: PasswordCode,
        encrypt_ref: Option<ObjRef>,
    },
    Unsupported(String),
}

/// Either a borrowed direct value or a fetched indirect one.
#[derive(Debug, Clone)]
pub enum Resolved<'a> {
    Borrowed(&'a PDFObject),
    Shared(Arc<PDFObject>),
}

impl Deref for Resolved<'_> {
    type Target = PDFObject;

    fn deref(&self) -> &PDFObject {
        match self {
            Self::Borrowed(obj) => obj,
            Self::Shared(obj) => obj,
        }
    }
}

impl Resolved<'_> {
    pub fn into_owned(self) -> PDFObject {
        match self {
            Self::Borrowed(obj) => obj.clone(),
            Self::Shared(obj) => Arc::unwrap_or_clone(obj),
        }
    }
}

thread_local! {
    static RESOLVING: RefCell<FxHashSet<u32>> = RefCell::new(FxHashSet::default());
}

/// Marks `num` as being fetched on this thread; cleared on drop.
struct ResolveGuard(u32);

impl ResolveGuard {
    fn enter(num: u32) -> Option<Self> {
        RESOLVING
            .with(|set| set.borrow_mut().insert(num))
            .then(|| Self(num))
    }
}

impl Drop for ResolveGuard {
    fn drop(&mut self) {
        RESOLVING.with(|set| {
            set.borrow_mut().remove(&self.0);
        });
    }
}

/// Cross-reference table plus the object cache of one document.
pub struct XRef {
    data: Bytes,
    entries: FxHashMap<u32, XRefEntry>,
    /// Merged trailer: newest section first, older sections fill gaps.
    trailer: Dict,
    /// Trailer of every section read, newest first.
    trailers: Vec<Dict>,
    startxref: usize,
    recovered: bool,
    recovery: bool,
    cache: Mutex<FxHashMap<u32, Option<Arc<PDFObject>>>>,
    cache_capacity: usize,
    /// Object headers found by scanning the file, built on demand.
    scan_index: OnceLock<FxHashMap<u32, usize>>,
    security: RwLock<Security>,
}

impl std::fmt::Debug for XRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XRef")
            .field("entries", &self.entries.len())
            .field("startxref", &self.startxref)
            .field("recovered", &self.recovered)
            .finish_non_exhaustive()
    }
}

impl XRef {
    /// Reads the cross-reference data of `data`.
    ///
    /// Fails with `NoValidXRef` when `startxref` is absent from the end of
    /// the file, or when the section it points to is unreadable and
    /// recovery is disabled.
    pub fn parse(data: Bytes, options: &DocumentOptions) -> Result<Self> {
        let startxref = find_startxref(&data).ok_or(PdfError::NoValidXRef)?;
        let mut xref = Self {
            data,
            entries: FxHashMap::default(),
            trailer: Dict::new(),
            trailers: Vec::new(),
            startxref,
            recovered: false,
            recovery: options.recovery,
            cache: Mutex::new(FxHashMap::default()),
            cache_capacity: options.cache_capacity,
            scan_index: OnceLock::new(),
            security: RwLock::new(Security::None),
        };

        match xref.read_chain(startxref) {
            Ok(()) if xref.trailer.contains("Root") => {}
            Err(err) if xref.trailer.contains("Root") => {
                warn!(%err, "older cross-reference section unreadable, keeping newer ones");
            }
            outcome => {
                if !xref.recovery {
                    return Err(outcome.err().unwrap_or(PdfError::NoValidXRef));
                }
                if let Err(err) = outcome {
                    warn!(%err, startxref, "cross-reference data unreadable, scanning objects");
                } else {
                    warn!("trailer has no Root, scanning objects");
                }
                xref.rebuild_from_scan()?;
            }
        }

        xref.setup_security(options.password.as_deref());
        Ok(xref)
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn trailer(&self) -> &Dict {
        &self.trailer
    }

    pub fn trailers(&self) -> &[Dict] {
        &self.trailers
    }

    pub const fn startxref(&self) -> usize {
        self.startxref
    }

    /// True when the table was rebuilt by scanning the file.
    pub const fn recovered(&self) -> bool {
        self.recovered
    }

    pub fn root_ref(&self) -> Option<ObjRef> {
        self.trailer.get("Root").and_then(|r| r.as_ref().ok())
    }

    pub fn entry(&self, num: u32) -> Option<XRefEntry> {
        self.entries.get(&num).copied()
    }

    /// All known object numbers in ascending order.
    pub fn object_numbers(&self) -> Vec<u32> {
        let mut nums: Vec<u32> = self.entries.keys().copied().collect();
        nums.sort_unstable();
        nums
    }

    /// Highest object number plus one, or the trailer `Size` if larger.
    pub fn size(&self) -> u32 {
        let max = self.entries.keys().max().map_or(1, |n| n + 1);
        let declared = self
            .trailer
            .get("Size")
            .and_then(|s| s.as_int().ok())
            .and_then(|s| u32::try_from(s).ok())
            .unwrap_or(0);
        max.max(declared)
    }

    // ---- reading sections ------------------------------------------------

    fn read_chain(&mut self, start: usize) -> Result<()> {
        let mut visited = FxHashSet::default();
        let mut pos = Some(start);
        while let Some(offset) = pos.take() {
            if !visited.insert(offset) {
                warn!(offset, "Prev chain loops back, stopping");
                break;
            }
            let (mut section, trailer) = self.read_section(offset)?;

            if let Some(stm) = trailer.get("XRefStm").and_then(|v| v.as_int().ok())
                && let Ok(stm) = usize::try_from(stm)
                && visited.insert(stm)
            {
                match self.read_xref_stream(stm) {
                    Ok((stm_entries, _)) => {
                        for (num, entry) in stm_entries {
                            let slot = section.entry(num).or_insert(entry);
                            if matches!(slot, XRefEntry::Free { .. }) {
                                *slot = entry;
                            }
                        }
                    }
                    Err(err) => warn!(%err, offset = stm, "unreadable XRefStm"),
                }
            }

            for (num, entry) in section {
                self.entries.entry(num).or_insert(entry);
            }
            pos = trailer
                .get("Prev")
                .and_then(|p| p.as_int().ok())
                .and_then(|p| usize::try_from(p).ok());
            self.merge_trailer(trailer);
        }
        Ok(())
    }

    fn merge_trailer(&mut self, trailer: Dict) {
        for (key, value) in trailer.iter() {
            if matches!(key.as_str(), "Prev" | "XRefStm") || self.trailer.get_by_name(key).is_some() {
                continue;
            }
            self.trailer.insert(key, value.clone());
        }
        self.trailers.push(trailer);
    }

    fn read_section(&self, offset: usize) -> Result<(FxHashMap<u32, XRefEntry>, Dict)> {
        if offset >= self.data.len() {
            return Err(PdfError::SyntaxError(format!("xref offset {offset} beyond end of file")));
        }
        let mut lexer = Lexer::new(self.data.clone());
        lexer.set_pos(offset);
        match lexer.next_token() {
            Some((_, Token::Keyword(Keyword::Xref))) => self.read_xref_table(lexer),
            _ => self.read_xref_stream(offset),
        }
    }

    /// Classic `xref` table followed by `trailer << ... >>`.
    fn read_xref_table(&self, mut lexer: Lexer) -> Result<(FxHashMap<u32, XRefEntry>, Dict)> {
        let mut entries = FxHashMap::default();
        loop {
            let (pos, tok) = lexer.next_token().ok_or(PdfError::UnexpectedEof)?;
            let start = match tok {
                Token::Keyword(Keyword::Trailer) => break,
                Token::Int(n) => n,
                other => {
                    return Err(PdfError::TokenError {
                        pos,
                        msg: format!("expected subsection header, found {other:?}"),
                    });
                }
            };
            let count = match lexer.next_token() {
                Some((_, Token::Int(n))) => n,
                _ => return Err(PdfError::SyntaxError("bad xref subsection count".into())),
            };
            let mut first = u32::try_from(start)
                .map_err(|_| PdfError::SyntaxError(format!("bad subsection start {start}")))?;
            let count = u32::try_from(count.max(0)).unwrap_or(u32::MAX);
            for i in 0..count {
                let (Some((_, Token::Int(offset))), Some((_, Token::Int(generation))), Some((_, Token::Keyword(kind)))) =
                    (lexer.next_token(), lexer.next_token(), lexer.next_token())
                else {
                    return Err(PdfError::SyntaxError("malformed xref entry".into()));
                };
                // Some writers start the first subsection at 1 but still emit
                // the free head of the list.
                if i == 0 && first == 1 && offset == 0 && generation == 65535 && kind.is_cmd("f") {
                    first = 0;
                }
                let generation = u16::try_from(generation).unwrap_or(u16::MAX);
                let entry = if kind.is_cmd("n") {
                    XRefEntry::Offset {
                        offset: usize::try_from(offset).unwrap_or(usize::MAX),
                        generation,
                    }
                } else if kind.is_cmd("f") {
                    XRefEntry::Free { generation }
                } else {
                    return Err(PdfError::SyntaxError(format!(
                        "bad xref entry type {}",
                        kind.as_str()
                    )));
                };
                let num = first
                    .checked_add(i)
                    .ok_or_else(|| PdfError::SyntaxError(format!("xref subsection {first} overflows")))?;
                entries.entry(num).or_insert(entry);
            }
        }

        let mut parser = PDFParser::new(self.data.clone()).with_recovery(self.recovery);
        parser.seek(lexer.tell());
        let trailer = parser.get_obj(None)?.as_dict()?.clone();
        Ok((entries, trailer))
    }

    /// Cross-reference stream object at `offset`.
    fn read_xref_stream(&self, offset: usize) -> Result<(FxHashMap<u32, XRefEntry>, Dict)> {
        let mut parser = PDFParser::new(self.data.slice(offset..)).with_recovery(self.recovery);
        let (_, obj) = parser.parse_indirect()?;
        let stream = obj.as_stream()?;
        if !stream.dict.is_type("XRef") {
            return Err(PdfError::SyntaxError(format!("no xref table or stream at {offset}")));
        }

        let widths: Vec<usize> = stream
            .get("W")
            .ok_or_else(|| PdfError::KeyError("W".into()))?
            .as_array()?
            .iter()
            .map(|w| w.as_int().map(|w| w.max(0) as usize))
            .collect::<Result<_>>()?;
        let &[w0, w1, w2] = widths.as_slice() else {
            return Err(PdfError::SyntaxError("W must have three entries".into()));
        };
        if w0 > 8 || w1 > 8 || w2 > 8 {
            return Err(PdfError::SyntaxError("W field wider than 8 bytes".into()));
        }
        let size = stream.get("Size").ok_or_else(|| PdfError::KeyError("Size".into()))?.as_int()?;
        let index: Vec<(i64, i64)> = match stream.get("Index") {
            Some(idx) => idx
                .as_num_array()?
                .chunks_exact(2)
                .map(|pair| (pair[0] as i64, pair[1] as i64))
                .collect(),
            None => vec![(0, size)],
        };

        let body = codec::decode_stream(stream)?.data;
        let record = w0 + w1 + w2;
        let field = |rec: &[u8], from: usize, width: usize| -> u64 {
            if width == 0 { 0 } else { BigEndian::read_uint(&rec[from..from + width], width) }
        };

        let mut entries = FxHashMap::default();
        let mut records = body.chunks_exact(record.max(1));
        'sections: for (start, count) in index {
            for i in 0..count.max(0) {
                let Some(rec) = records.next() else { break 'sections };
                let kind = if w0 == 0 { 1 } else { field(rec, 0, w0) };
                let a = field(rec, w0, w1);
                let b = field(rec, w0 + w1, w2);
                let Some(Ok(num)) = start.checked_add(i).map(u32::try_from) else { continue };
                let entry = match kind {
                    0 => XRefEntry::Free { generation: b as u16 },
                    1 => XRefEntry::Offset {
                        offset: a as usize,
                        generation: b as u16,
                    },
                    2 => XRefEntry::Compressed {
                        stream_num: a as u32,
                        index: b as u32,
                    },
                    // Unknown types are references to the null object.
                    _ => continue,
                };
                entries.entry(num).or_insert(entry);
            }
        }

        let mut trailer = stream.dict.clone();
        for key in ["Length", "Filter", "DecodeParms", "W", "Index", "Type"] {
            trailer.remove(key);
        }
        Ok((entries, trailer))
    }

    // ---- recovery ---------------------------------------------------------

    fn scan_index(&self) -> &FxHashMap<u32, usize> {
        self.scan_index.get_or_init(|| {
            let mut index = FxHashMap::default();
            for cap in OBJ_HEADER.captures_iter(&self.data) {
                let num = std::str::from_utf8(&cap[1]).ok().and_then(|s| s.parse::<u32>().ok());
                if let (Some(num), Some(m)) = (num, cap.get(0)) {
                    // Later definitions belong to later incremental updates.
                    index.insert(num, m.start());
                }
            }
            debug!(objects = index.len(), "object scan complete");
            index
        })
    }

    /// Replaces the table with one built from object headers found in the
    /// file, and picks the last usable trailer.
    fn rebuild_from_scan(&mut self) -> Result<()> {
        self.recovered = true;
        let scanned = self.scan_index().clone();
        if scanned.is_empty() {
            return Err(PdfError::NoValidXRef);
        }
        for (&num, &offset) in &scanned {
            self.entries.insert(num, XRefEntry::Offset { offset, generation: 0 });
        }

        // Members of object streams that are not defined directly.
        let mut trailer_candidates = Vec::new();
        for (&num, &offset) in &scanned {
            let Ok(obj) = self.read_at(offset, num) else { continue };
            let Ok(stream) = obj.as_stream() else { continue };
            if stream.dict.is_type("XRef") && stream.dict.contains("Root") {
                trailer_candidates.push((offset, stream.dict.clone()));
            }
            if stream.dict.is_type("ObjStm")
                && let Ok(members) = self.object_stream_members(&obj)
            {
                for (index, (member, _)) in members.iter().enumerate() {
                    self.entries.entry(*member).or_insert(XRefEntry::Compressed {
                        stream_num: num,
                        index: index as u32,
                    });
                }
            }
        }

        let lexer = Lexer::new(self.data.clone());
        let mut from = 0;
        while let Some(at) = lexer.find(b"trailer", from) {
            from = at + 7;
            let mut parser = PDFParser::new(self.data.clone()).with_recovery(true);
            parser.seek(from);
            if let Ok(PDFObject::Dict(d)) = parser.get_obj(None)
                && d.contains("Root")
            {
                trailer_candidates.push((at, d));
            }
        }
        self.trailer = Dict::new();
        self.trailers.clear();
        match trailer_candidates.into_iter().max_by_key(|(pos, _)| *pos) {
            Some((_, trailer)) => self.merge_trailer(trailer),
            None => {
                let catalog = scanned.iter().find_map(|(&num, &offset)| {
                    let obj = self.read_at(offset, num).ok()?;
                    obj.as_dict().ok()?.is_type("Catalog").then_some(num)
                });
                let Some(num) = catalog else {
                    return Err(PdfError::NoValidXRef);
                };
                let mut trailer = Dict::new();
                trailer.insert("Root", ObjRef::new(num, 0));
                self.merge_trailer(trailer);
            }
        }
        self.clear_cache();
        Ok(())
    }

    // ---- security -----------------------------------------------------------

    fn setup_security(&mut self, password: Option<&[u8]>) {
        let Some(encrypt) = self.trailer.get("Encrypt").cloned() else {
            return;
        };
        let encrypt_ref = encrypt.as_ref().ok();
        let Some(dict) = self.resolve(&encrypt).and_then(|d| d.as_dict().ok().cloned()) else {
            warn!("Encrypt entry does not resolve to a dictionary");
            return;
        };
        let id0 = self
            .trailer
            .get("ID")
            .and_then(|id| id.as_array().ok())
            .and_then(|arr| arr.first())
            .and_then(|first| first.as_string().ok())
            .map(<[u8]>::to_vec)
            .unwrap_or_default();

        let state = match StandardSecurityHandler::from_dict(&dict, &id0) {
            Err(err) => {
                warn!(%err, "document uses an unsupported security handler");
                Security::Unsupported(err.to_string())
            }
            Ok(handler) => match handler.authenticate(password.unwrap_or(b"")) {
                Some(key) => Security::Unlocked {
                    handler,
                    key,
                    encrypt_ref,
                },
                None => Security::Locked {
                    handler,
                    code: if password.is_some() {
                        PasswordCode::IncorrectPassword
                    } else {
                        PasswordCode::NeedPassword
                    },
                    encrypt_ref,
                },
            },
        };
        *self.security.get_mut().unwrap_or_else(|e| e.into_inner()) = state;
        self.clear_cache();
    }

    pub fn is_encrypted(&self) -> bool {
        self.trailer.contains("Encrypt")
    }

    /// Checks `password` against the document. On success the document is
    /// unlocked and objects read so far are dropped from the cache.
    pub fn check_password(&self, password: &[u8]) -> Result<()> {
        let mut guard = self.security.write().unwrap_or_else(|e| e.into_inner());
        let next = match &*guard {
            Security::None => return Ok(()),
            Security::Unsupported(msg) => return Err(PdfError::EncryptionError(msg.clone())),
            Security::Unlocked { handler, encrypt_ref, .. } | Security::Locked { handler, encrypt_ref, .. } => {
                let key = handler.check_password(password)?;
                Security::Unlocked {
                    handler: handler.clone(),
                    key,
                    encrypt_ref: *encrypt_ref,
                }
            }
        };
        *guard = next;
        drop(guard);
        self.clear_cache();
        Ok(())
    }

    /// Errors with the pending password code (or the unsupported-handler
    /// message) unless content can be decrypted.
    pub fn ensure_unlocked(&self) -> Result<()> {
        match &*self.security.read().unwrap_or_else(|e| e.into_inner()) {
            Security::None | Security::Unlocked { .. } => Ok(()),
            Security::Locked { code, .. } => Err(PdfError::Password(*code)),
            Security::Unsupported(msg) => Err(PdfError::EncryptionError(msg.clone())),
        }
    }

    /// Permission flags (`P`) of the standard handler, if any.
    pub fn permissions(&self) -> Option<i32> {
        match &*self.security.read().unwrap_or_else(|e| e.into_inner()) {
            Security::Unlocked { handler, .. } | Security::Locked { handler, .. } => Some(handler.permissions()),
            _ => None,
        }
    }

    fn decrypt_object(&self, objref: ObjRef, obj: PDFObject) -> PDFObject {
        let guard = self.security.read().unwrap_or_else(|e| e.into_inner());
        let Security::Unlocked {
            handler,
            key,
            encrypt_ref,
        } = &*guard
        else {
            return obj;
        };
        if *encrypt_ref == Some(objref) {
            return obj;
        }
        if let PDFObject::Stream(s) = &obj
            && s.dict.is_type("XRef")
        {
            return obj;
        }
        decrypt_value(obj, &|data| handler.decrypt(key, objref, data))
    }

    // ---- fetching ---------------------------------------------------------

    pub fn clear_cache(&self) {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn cache_insert(&self, num: u32, value: Option<Arc<PDFObject>>) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if self.cache_capacity > 0 && cache.len() >= self.cache_capacity {
            debug!(capacity = self.cache_capacity, "object cache full, flushing");
            cache.clear();
        }
        cache.insert(num, value);
    }

    /// Fetches the object `r` points to.
    ///
    /// Free, missing and unreadable objects log a warning and yield `None`;
    /// that outcome is cached like a successful read.
    pub fn fetch(&self, r: ObjRef) -> Option<Arc<PDFObject>> {
        if let Some(hit) = self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(&r.num) {
            return hit.clone();
        }
        let Some(_guard) = ResolveGuard::enter(r.num) else {
            warn!(%r, "circular reference while fetching object");
            return None;
        };
        let result = match self.fetch_uncached(r) {
            Ok(obj) => Some(Arc::new(obj)),
            Err(err) => {
                warn!(%r, %err, "unable to fetch object");
                None
            }
        };
        self.cache_insert(r.num, result.clone());
        result
    }

    fn fetch_uncached(&self, r: ObjRef) -> Result<PDFObject> {
        let entry = self
            .entries
            .get(&r.num)
            .copied()
            .or_else(|| {
                // Objects missing from the table may still be in the file.
                let offset = *self.recovery.then(|| self.scan_index().get(&r.num))??;
                Some(XRefEntry::Offset { offset, generation: r.generation })
            })
            .ok_or_else(|| PdfError::ObjectNotFound(r.to_string()))?;
        if entry.generation() != r.generation {
            debug!(%r, entry_gen = entry.generation(), "generation mismatch, using table entry");
        }
        match entry {
            XRefEntry::Free { .. } => Err(PdfError::ObjectNotFound(format!("{r} is free"))),
            XRefEntry::Offset { offset, .. } => {
                let read = self.read_at(offset, r.num).or_else(|err| {
                    match self.recovery.then(|| self.scan_index().get(&r.num).copied()).flatten() {
                        Some(scanned) if scanned != offset => {
                            warn!(%r, offset, scanned, "object not at table offset, using scanned position");
                            self.read_at(scanned, r.num)
                        }
                        _ => Err(err),
                    }
                })?;
                Ok(self.decrypt_object(ObjRef::new(r.num, entry.generation()), read))
            }
            XRefEntry::Compressed { stream_num, index } => self.fetch_compressed(r.num, stream_num, index),
        }
    }

    /// Parses the indirect object whose header is at `offset`.
    fn read_at(&self, offset: usize, num: u32) -> Result<PDFObject> {
        if offset >= self.data.len() {
            return Err(PdfError::SyntaxError(format!("offset {offset} beyond end of file")));
        }
        let resolve_length = |r: ObjRef| self.fetch(r).and_then(|o| o.as_int().ok());
        let mut parser = PDFParser::new(self.data.slice(offset..))
            .with_recovery(self.recovery)
            .with_length_resolver(&resolve_length);
        let (found, obj) = parser.parse_indirect()?;
        if found.num != num {
            return Err(PdfError::SyntaxError(format!(
                "expected object {num} at {offset}, found {found}"
            )));
        }
        Ok(obj)
    }

    /// Object number and body slice of every member of an object stream.
    /// Member i spans `First + off[i]` up to `First + off[i+1]`.
    fn object_stream_members(&self, stream_obj: &PDFObject) -> Result<Vec<(u32, Bytes)>> {
        let stream = stream_obj.as_stream()?;
        let body = Bytes::from(self.decode_stream(stream)?.data);
        let int = |key: &str| -> Result<usize> {
            let v = self.get(&stream.dict, key).ok_or_else(|| PdfError::KeyError(key.into()))?.as_int()?;
            usize::try_from(v).map_err(|_| PdfError::SyntaxError(format!("negative {key}")))
        };
        let n = int("N")?;
        let first = int("First")?.min(body.len());

        let mut header = Lexer::new(body.slice(..first));
        let mut pairs = Vec::with_capacity(n);
        for _ in 0..n {
            match (header.next_token(), header.next_token()) {
                (Some((_, Token::Int(num))), Some((_, Token::Int(off)))) => {
                    pairs.push((num as u32, first + off.max(0) as usize));
                }
                _ => break,
            }
        }
        Ok(pairs
            .iter()
            .enumerate()
            .map(|(i, &(num, start))| {
                let end = pairs.get(i + 1).map_or(body.len(), |&(_, next)| next);
                let start = start.min(body.len());
                (num, body.slice(start..end.clamp(start, body.len())))
            })
            .collect())
    }

    /// Reads member `index` of object stream `stream_num`, caching every
    /// other member the table maps to the same stream on the way.
    fn fetch_compressed(&self, num: u32, stream_num: u32, index: u32) -> Result<PDFObject> {
        let container = self
            .fetch(ObjRef::new(stream_num, 0))
            .ok_or_else(|| PdfError::ObjectNotFound(format!("object stream {stream_num}")))?;
        let members = self.object_stream_members(&container)?;

        let mut wanted = None;
        for (i, (member, slice)) in members.into_iter().enumerate() {
            let is_target = i as u32 == index && member == num;
            let mapped_here = self.entries.get(&member)
                == Some(&XRefEntry::Compressed {
                    stream_num,
                    index: i as u32,
                });
            if !is_target && !mapped_here {
                continue;
            }
            let parsed = PDFParser::new(slice).with_recovery(self.recovery).get_obj(None);
            if is_target {
                wanted = Some(parsed);
            } else if member != num
                && let Ok(obj) = parsed
                && !self.cache.lock().unwrap_or_else(|e| e.into_inner()).contains_key(&member)
            {
                self.cache_insert(member, Some(Arc::new(obj)));
            }
        }
        wanted.unwrap_or_else(|| {
            Err(PdfError::ObjectNotFound(format!(
                "object {num} is not member {index} of stream {stream_num}"
            )))
        })
    }

    /// Follows references (including chains) to a direct value.
    pub fn resolve<'a>(&self, obj: &'a PDFObject) -> Option<Resolved<'a>> {
        let PDFObject::Ref(r) = obj else {
            return Some(Resolved::Borrowed(obj));
        };
        let mut current = self.fetch(*r)?;
        for _ in 0..8 {
            let PDFObject::Ref(next) = &*current else {
                return Some(Resolved::Shared(current));
            };
            current = self.fetch(*next)?;
        }
        warn!(%r, "reference chain too long");
        None
    }

    /// `dict[key]` with references resolved.
    pub fn get<'a>(&self, dict: &'a Dict, key: &str) -> Option<Resolved<'a>> {
        self.resolve(dict.get(key)?)
    }

    /// Resolved dictionary value of `dict[key]`, cloned.
    pub fn get_dict(&self, dict: &Dict, key: &str) -> Option<Dict> {
        self.get(dict, key)?.as_dict().ok().cloned()
    }

    /// Fetches `r` and clones it as a dictionary (stream dictionaries too).
    pub fn fetch_dict(&self, r: ObjRef) -> Option<Dict> {
        self.fetch(r)?.as_dict().ok().cloned()
    }

    /// Runs the filter chain of `stream`, resolving indirect `Filter` and
    /// `DecodeParms` entries first.
    pub fn decode_stream(&self, stream: &crate::model::objects::PDFStream) -> Result<Decoded> {
        let filters: Vec<Name> = match stream.dict.get_any(&["Filter", "F"]).and_then(|f| self.resolve(f)) {
            Some(f) => match &*f {
                PDFObject::Name(n) => vec![*n],
                PDFObject::Array(arr) => arr
                    .iter()
                    .filter_map(|item| self.resolve(item).and_then(|n| n.as_name().ok()))
                    .collect(),
                _ => Vec::new(),
            },
            None => Vec::new(),
        };
        let parms: Vec<Option<Dict>> = match stream.dict.get_any(&["DecodeParms", "DP"]).and_then(|p| self.resolve(p)) {
            Some(p) => match &*p {
                PDFObject::Dict(d) => vec![Some(d.clone())],
                PDFObject::Array(arr) => arr
                    .iter()
                    .map(|item| self.resolve(item).and_then(|d| d.as_dict().ok().cloned()))
                    .collect(),
                _ => Vec::new(),
            },
            None => Vec::new(),
        };
        codec::apply_filters(stream.raw(), &filters, &parms)
    }
}

fn decrypt_value(obj: PDFObject, decrypt: &dyn Fn(&[u8]) -> Vec<u8>) -> PDFObject {
    match obj {
        PDFObject::String(s) => PDFObject::String(decrypt(&s)),
        PDFObject::Array(arr) => PDFObject::Array(arr.into_iter().map(|o| decrypt_value(o, decrypt)).collect()),
        PDFObject::Dict(d) => PDFObject::Dict(decrypt_dict(d, decrypt)),
        PDFObject::Stream(mut s) => {
            let dict = std::mem::take(&mut s.dict);
            s.dict = decrypt_dict(dict, decrypt);
            let plain = decrypt(s.raw());
            s.set_raw(plain);
            PDFObject::Stream(s)
        }
        other => other,
    }
}

fn decrypt_dict(dict: Dict, decrypt: &dyn Fn(&[u8]) -> Vec<u8>) -> Dict {
    dict.into_iter().map(|(k, v)| (k, decrypt_value(v, decrypt))).collect()
}

/// Offset named by the last `startxref` within the final kilobyte.
fn find_startxref(data: &[u8]) -> Option<usize> {
    let window_start = data.len().saturating_sub(STARTXREF_WINDOW);
    let needle = b"startxref";
    let window = &data[window_start..];
    let at = window.windows(needle.len()).rposition(|w| w == needle)?;
    let mut lexer = Lexer::new(Bytes::copy_from_slice(&window[at + needle.len()..]));
    match lexer.next_token() {
        Some((_, Token::Int(n))) => usize::try_from(n).ok(),
        _ => None,
    }
}
