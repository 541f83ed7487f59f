//! Font loading for text extraction and operator lists.
//!
//! - `pdffont` - `PdfFont`, one loaded font dictionary
//! - `cmap` - embedded and ToUnicode CMaps
//! - `encoding` - simple-font encodings and glyph names
//! - `metrics` - approximate standard 14 metrics

pub mod cmap;
pub mod encoding;
pub mod latin_enc;
pub mod metrics;
pub mod pdffont;

pub use cmap::CMap;
pub use encoding::{BaseEncoding, Encoding, name_to_unicode};
pub use pdffont::{FontType, Glyph, PdfFont};
