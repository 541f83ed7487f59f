//! PDF object types.
//!
//! Names and keyword commands are interned in a process-wide table so that
//! equal names compare by index. Indirect references are small `Copy` values,
//! which gives the same guarantee without a cache.

use crate::error::{PdfError, Result};
use bytes::Bytes;
use indexmap::IndexMap;
use lasso::{Spur, ThreadedRodeo};
use std::fmt;
use std::sync::LazyLock;

static NAMES: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::new);
static COMMANDS: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::new);

/// An interned PDF name such as `/Type`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(Spur);

impl Name {
    /// Interns `name` (without the leading slash).
    pub fn new(name: &str) -> Self {
        Self(NAMES.get_or_intern(name))
    }

    /// Looks up an already interned name without inserting it.
    pub fn lookup(name: &str) -> Option<Self> {
        NAMES.get(name).map(Self)
    }

    pub fn as_str(&self) -> &'static str {
        NAMES.resolve(&self.0)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.as_str())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl serde::Serialize for Name {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

/// An interned content-stream or structural keyword (`BT`, `obj`, ...).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cmd(Spur);

impl Cmd {
    pub fn new(cmd: &str) -> Self {
        Self(COMMANDS.get_or_intern(cmd))
    }

    pub fn as_str(&self) -> &'static str {
        COMMANDS.resolve(&self.0)
    }
}

impl fmt::Debug for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cmd({})", self.as_str())
    }
}

impl PartialEq<str> for Cmd {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

/// PDF indirect object reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef {
    pub num: u32,
    pub generation: u16,
}

impl ObjRef {
    pub const fn new(num: u32, generation: u16) -> Self {
        Self { num, generation }
    }

    /// Parses the `"<num>R<gen>"` key produced by `Display`.
    pub fn parse_key(key: &str) -> Option<Self> {
        let (num, generation) = key.split_once('R')?;
        Some(Self::new(num.parse().ok()?, generation.parse().ok()?))
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}R{}", self.num, self.generation)
    }
}

impl serde::Serialize for ObjRef {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

/// PDF Object types - the fundamental value type in PDF.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PDFObject {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Name(Name),
    /// Byte string; interpretation depends on context.
    String(Vec<u8>),
    Array(Vec<Self>),
    Dict(Dict),
    Stream(Box<PDFStream>),
    Ref(ObjRef),
}

impl PDFObject {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            _ => Err(self.type_error("bool")),
        }
    }

    /// Integer value; reals with no fractional part are accepted.
    pub fn as_int(&self) -> Result<i64> {
        match self {
            Self::Int(n) => Ok(*n),
            Self::Real(n) if n.fract() == 0.0 && n.is_finite() => Ok(*n as i64),
            _ => Err(self.type_error("int")),
        }
    }

    /// Numeric value (int or real coerced to f64).
    pub const fn as_num(&self) -> Result<f64> {
        match self {
            Self::Int(n) => Ok(*n as f64),
            Self::Real(n) => Ok(*n),
            _ => Err(self.type_error("number")),
        }
    }

    pub const fn as_name(&self) -> Result<Name> {
        match self {
            Self::Name(n) => Ok(*n),
            _ => Err(self.type_error("name")),
        }
    }

    pub fn as_string(&self) -> Result<&[u8]> {
        match self {
            Self::String(s) => Ok(s),
            _ => Err(self.type_error("string")),
        }
    }

    pub fn as_array(&self) -> Result<&[Self]> {
        match self {
            Self::Array(arr) => Ok(arr),
            _ => Err(self.type_error("array")),
        }
    }

    /// Dictionary view. A stream answers with its own dictionary.
    pub fn as_dict(&self) -> Result<&Dict> {
        match self {
            Self::Dict(d) => Ok(d),
            Self::Stream(s) => Ok(&s.dict),
            _ => Err(self.type_error("dict")),
        }
    }

    pub fn as_stream(&self) -> Result<&PDFStream> {
        match self {
            Self::Stream(s) => Ok(s),
            _ => Err(self.type_error("stream")),
        }
    }

    pub const fn as_ref(&self) -> Result<ObjRef> {
        match self {
            Self::Ref(r) => Ok(*r),
            _ => Err(self.type_error("ref")),
        }
    }

    /// True when this is a name equal to `name`.
    pub fn is_name(&self, name: &str) -> bool {
        matches!(self, Self::Name(n) if n.as_str() == name)
    }

    /// Numeric array as `f64`s; any non-number element makes the whole
    /// array invalid.
    pub fn as_num_array(&self) -> Result<Vec<f64>> {
        self.as_array()?.iter().map(Self::as_num).collect()
    }

    /// Four-number rectangle, normalized.
    pub fn as_rect(&self) -> Result<crate::utils::Rect> {
        match self.as_num_array()?.as_slice() {
            &[a, b, c, d] => Ok(crate::utils::normalize_rect((a, b, c, d))),
            _ => Err(self.type_error("rectangle")),
        }
    }

    /// Six-number matrix.
    pub fn as_matrix(&self) -> Result<crate::utils::Matrix> {
        match self.as_num_array()?.as_slice() {
            &[a, b, c, d, e, f] => Ok((a, b, c, d, e, f)),
            _ => Err(self.type_error("matrix")),
        }
    }

    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Real(_) => "real",
            Self::Name(_) => "name",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Dict(_) => "dict",
            Self::Stream(_) => "stream",
            Self::Ref(_) => "ref",
        }
    }

    const fn type_error(&self, expected: &'static str) -> PdfError {
        PdfError::TypeError {
            expected,
            got: self.type_name(),
        }
    }
}

impl From<Name> for PDFObject {
    fn from(n: Name) -> Self {
        Self::Name(n)
    }
}

impl From<ObjRef> for PDFObject {
    fn from(r: ObjRef) -> Self {
        Self::Ref(r)
    }
}

impl From<Dict> for PDFObject {
    fn from(d: Dict) -> Self {
        Self::Dict(d)
    }
}

impl From<i64> for PDFObject {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for PDFObject {
    fn from(n: f64) -> Self {
        Self::Real(n)
    }
}

impl From<bool> for PDFObject {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// JSON-friendly projection: names and references become strings, byte
/// strings are decoded as PDF text, streams serialize as their dictionary.
impl serde::Serialize for PDFObject {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Null => s.serialize_unit(),
            Self::Bool(b) => s.serialize_bool(*b),
            Self::Int(n) => s.serialize_i64(*n),
            Self::Real(n) => s.serialize_f64(*n),
            Self::Name(n) => serde::Serialize::serialize(n, s),
            Self::String(bytes) => s.serialize_str(&crate::utils::decode_text(bytes)),
            Self::Array(items) => s.collect_seq(items),
            Self::Dict(d) => serde::Serialize::serialize(d, s),
            Self::Stream(stream) => serde::Serialize::serialize(&stream.dict, s),
            Self::Ref(r) => serde::Serialize::serialize(r, s),
        }
    }
}

/// Ordered name-keyed dictionary.
///
/// Entries are plain values; indirect references are resolved explicitly
/// through the owning `XRef` rather than on read.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dict(IndexMap<Name, PDFObject>);

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw (unresolved) value for `key`.
    pub fn get(&self, key: &str) -> Option<&PDFObject> {
        self.0.get(&Name::lookup(key)?)
    }

    /// First present key of `keys`; used for abbreviated inline-image keys.
    pub fn get_any(&self, keys: &[&str]) -> Option<&PDFObject> {
        keys.iter().find_map(|k| self.get(k))
    }

    pub fn get_by_name(&self, key: Name) -> Option<&PDFObject> {
        self.0.get(&key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn insert(&mut self, key: impl Into<DictKey>, value: impl Into<PDFObject>) {
        self.0.insert(key.into().0, value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<PDFObject> {
        self.0.shift_remove(&Name::lookup(key)?)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Name, &PDFObject)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = Name> + '_ {
        self.0.keys().copied()
    }

    /// Name value of `key`, if it is a direct name.
    pub fn get_name(&self, key: &str) -> Option<Name> {
        self.get(key).and_then(|v| v.as_name().ok())
    }

    /// True when `/Type` equals `value`.
    pub fn is_type(&self, value: &str) -> bool {
        self.get_name("Type").is_some_and(|n| n == value)
    }
}

impl serde::Serialize for Dict {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_map(self.0.iter().map(|(k, v)| (k.as_str(), v)))
    }
}

/// Key accepted by `Dict::insert`: either an interned name or a `&str`.
pub struct DictKey(Name);

impl From<Name> for DictKey {
    fn from(n: Name) -> Self {
        Self(n)
    }
}

impl From<&str> for DictKey {
    fn from(s: &str) -> Self {
        Self(Name::new(s))
    }
}

impl FromIterator<(Name, PDFObject)> for Dict {
    fn from_iter<I: IntoIterator<Item = (Name, PDFObject)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Dict {
    type Item = (Name, PDFObject);
    type IntoIter = indexmap::map::IntoIter<Name, PDFObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// PDF Stream - dictionary attributes + a window of raw bytes.
///
/// `raw` is a zero-copy slice of the document buffer unless the stream was
/// decrypted or built in memory. Decoding goes through `codec::decode_stream`.
#[derive(Debug, Clone, PartialEq)]
pub struct PDFStream {
    pub dict: Dict,
    raw: Bytes,
    /// Reference of the indirect object this stream was read from.
    pub objref: Option<ObjRef>,
}

impl PDFStream {
    pub fn new(dict: Dict, raw: impl Into<Bytes>) -> Self {
        Self {
            dict,
            raw: raw.into(),
            objref: None,
        }
    }

    pub fn with_ref(mut self, objref: ObjRef) -> Self {
        self.objref = Some(objref);
        self
    }

    /// Raw (possibly encoded) bytes.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Raw bytes as a shared handle.
    pub fn raw_bytes(&self) -> Bytes {
        self.raw.clone()
    }

    /// Replaces the raw bytes (after decryption or an edit).
    pub fn set_raw(&mut self, raw: impl Into<Bytes>) {
        self.raw = raw.into();
    }

    pub fn get(&self, key: &str) -> Option<&PDFObject> {
        self.dict.get(key)
    }

    /// Filter names in application order.
    pub fn filters(&self) -> Vec<Name> {
        match self.dict.get_any(&["Filter", "F"]) {
            Some(PDFObject::Name(n)) => vec![*n],
            Some(PDFObject::Array(arr)) => arr.iter().filter_map(|f| f.as_name().ok()).collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_interning_is_identity() {
        let a = Name::new("Type");
        let b = Name::new("Type");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "Type");
        assert_ne!(a, Name::new("Subtype"));
        assert_eq!(format!("{a:?}"), "/Type");
    }

    #[test]
    fn test_objref_key_round_trip() {
        let r = ObjRef::new(12, 3);
        assert_eq!(r.to_string(), "12R3");
        assert_eq!(ObjRef::parse_key("12R3"), Some(r));
        assert_eq!(ObjRef::parse_key("x"), None);
    }

    #[test]
    fn test_dict_preserves_insertion_order() {
        let mut d = Dict::new();
        d.insert("Z", 1i64);
        d.insert("A", 2i64);
        let keys: Vec<_> = d.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, ["Z", "A"]);
        assert_eq!(d.get("A"), Some(&PDFObject::Int(2)));
        assert_eq!(d.get("NeverInterned_zzz"), None);
    }

    #[test]
    fn test_typed_accessors() {
        assert_eq!(PDFObject::Real(4.0).as_int().unwrap(), 4);
        assert!(PDFObject::Real(4.5).as_int().is_err());
        let rect = PDFObject::Array(vec![
            PDFObject::Int(10),
            PDFObject::Int(20),
            PDFObject::Int(0),
            PDFObject::Int(0),
        ]);
        assert_eq!(rect.as_rect().unwrap(), (0.0, 0.0, 10.0, 20.0));
        assert!(matches!(
            PDFObject::Null.as_dict(),
            Err(PdfError::TypeError { got: "null", .. })
        ));
    }

    #[test]
    fn test_stream_filters() {
        let mut d = Dict::new();
        d.insert(
            "Filter",
            PDFObject::Array(vec![
                Name::new("ASCIIHexDecode").into(),
                Name::new("FlateDecode").into(),
            ]),
        );
        let s = PDFStream::new(d, Bytes::from_static(b"00"));
        let names: Vec<_> = s.filters().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, ["ASCIIHexDecode", "FlateDecode"]);
    }
}
