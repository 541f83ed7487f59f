//! Error types for the quire PDF engine.

use thiserror::Error;

/// Reason a password check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum PasswordCode {
    /// The document is encrypted and no password was supplied.
    NeedPassword,
    /// A password was supplied but it matches neither the user nor the owner password.
    IncorrectPassword,
}

impl std::fmt::Display for PasswordCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NeedPassword => f.write_str("password required"),
            Self::IncorrectPassword => f.write_str("incorrect password"),
        }
    }
}

/// Primary error type for PDF parsing operations.
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("invalid token at position {pos}: {msg}")]
    TokenError { pos: usize, msg: String },

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("type error: expected {expected}, got {got}")]
    TypeError {
        expected: &'static str,
        got: &'static str,
    },

    #[error("key not found: {0}")]
    KeyError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF object not found: {0}")]
    ObjectNotFound(String),

    #[error("no valid xref table found")]
    NoValidXRef,

    #[error("PDF syntax error: {0}")]
    SyntaxError(String),

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("encryption error: {0}")]
    EncryptionError(String),

    #[error("{0}")]
    Password(PasswordCode),

    /// An operand the interpreter needed was not on the operand buffer.
    #[error("missing data: {0}")]
    MissingData(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl PdfError {
    /// The password code, when this is a password failure.
    pub const fn password_code(&self) -> Option<PasswordCode> {
        match self {
            Self::Password(code) => Some(*code),
            _ => None,
        }
    }
}

/// Convenience Result type alias for PdfError.
pub type Result<T> = std::result::Result<T, PdfError>;
