//! PDF model types: primitive objects and evaluator state.
//!
//! - `objects` - primitive values (`PDFObject`, `Name`, `ObjRef`, `Dict`, `PDFStream`)
//! - `state` - graphics and text state, save/restore stack

pub mod objects;
pub mod state;

pub use objects::{Cmd, Dict, Name, ObjRef, PDFObject, PDFStream};
pub use state::{GraphicsState, StateManager, TextState};
