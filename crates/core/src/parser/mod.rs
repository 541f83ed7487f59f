//! PDF object syntax.
//!
//! - `lexer`: byte-level tokenizer shared by files and content streams
//! - `pdf_parser`: object parser built on the lexer

pub mod lexer;
pub mod pdf_parser;

pub use lexer::{Keyword, Lexer, Token};
pub use pdf_parser::PDFParser;
