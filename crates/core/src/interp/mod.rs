//! PDF content stream evaluation.
//!
//! This module contains:
//! - `operators`: operator table and operand buffer
//! - `content`: content stream tokenizer (with inline images)
//! - `evaluator`: the resumable evaluation loop and its sink trait
//! - `operator_list`: the operator list sink
//! - `text_content`: the text extraction sink
//! - `image`, `pattern`: image and shading/pattern building
//! - `ops`: operator implementations by category

pub mod content;
pub mod evaluator;
pub mod image;
pub mod operator_list;
pub mod operators;
pub mod ops;
pub mod pattern;
pub mod text_content;

// Re-export main types for convenience
pub use evaluator::{CancellationToken, EvalSink, Evaluator, EvaluatorTask, ResourceCache, ShownGlyph, StepOutcome};
pub use image::{ImageData, ImageKind};
pub use operator_list::{OpArg, OpCode, OperatorList, TextPart};
pub use pattern::{Pattern, Shading};
pub use text_content::{TextContent, TextContentItem, TextContentSink, TextDirection, TextItem, TextStyle};
