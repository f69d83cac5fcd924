//! Document errors.

use thiserror::Error;

/// Result alias for document operations.
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Errors raised by tree edits.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The path does not address a node.
    #[error("no node at path {path:?}")]
    InvalidPath {
        /// The offending path.
        path: Vec<usize>,
    },

    /// Children were addressed under a node that cannot hold any.
    #[error("node at path {path:?} cannot have children")]
    NotAContainer {
        /// Path of the leaf parent.
        path: Vec<usize>,
    },
}
