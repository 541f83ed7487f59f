//! Document structure: cross-reference data, the catalog and its
//! projections, pages and security.
//!
//! - `xref` - object lookup, recovery, object streams, decryption
//! - `catalog` - `PDFDocument`, the page tree and catalog accessors
//! - `page` - one page with its inherited attributes, and the viewport
//! - `annotation`, `struct_tree`, `optional_content` - read-only projections
//! - `name_tree` - name and number tree traversal
//! - `security` - the standard security handler

pub mod annotation;
pub mod catalog;
pub mod name_tree;
pub mod optional_content;
pub mod page;
pub mod security;
pub mod struct_tree;
pub mod xref;

pub use annotation::{Annotation, AnnotationData, AnnotationType, FieldValue, WidgetData};
pub use catalog::{Attachment, DocumentInfo, FieldObject, OutlineItem, PDFDocument};
pub use optional_content::{OptionalContentConfig, OptionalContentGroup};
pub use page::{PDFPage, Viewport};
pub use security::StandardSecurityHandler;
pub use struct_tree::StructTreeNode;
pub use xref::{XRef, XRefEntry};
