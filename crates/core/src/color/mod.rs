//! Color spaces, PDF functions and the type 4 calculator.

pub mod colorspace;
pub mod function;
pub mod postscript;

pub use colorspace::ColorSpace;
pub use function::PdfFunction;
pub use postscript::PsProgram;
