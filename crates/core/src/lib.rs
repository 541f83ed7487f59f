//! quire - a PDF parsing and content-stream evaluation engine.
//!
//! Bytes go in through [`PDFDocument::open`]; pages come out as operator
//! lists, text content and annotations. Incremental saves go back out
//! through [`writer::Writer`].

pub mod codec;
pub mod color;
pub mod config;
pub mod document;
pub mod error;
pub mod font;
pub mod interp;
pub mod model;
pub mod parser;
pub mod utils;
pub mod writer;

#[cfg(test)]
mod test_utils;

pub use config::{DocumentOptions, EvaluatorOptions, Intent};
pub use document::{PDFDocument, PDFPage, XRef};
pub use error::{PasswordCode, PdfError, Result};
pub use interp::{OpArg, OpCode, OperatorList, TextContent};
pub use model::{Dict, Name, ObjRef, PDFObject, PDFStream};
