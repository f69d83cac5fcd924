//! The message document the composer edits.
//!
//! The engine never talks to a rendering layer. It reads and writes nodes
//! through [`DocumentTree`], addressing them by [`TreePath`]. Paths shift on
//! every structural edit, so callers re-scan instead of holding on to them.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod node;
mod tree;

pub use error::{DocumentError, DocumentResult};
pub use node::{Node, NodeKind, VariableMarker};
pub use tree::{Cursor, Document, DocumentTree, Edge, TreePath};
