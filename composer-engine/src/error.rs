//! Engine errors.

use composer_document::DocumentError;
use composer_primitives::{SelectionId, TemplateKey};
use composer_templates::TemplateError;
use thiserror::Error;

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Infrastructure failures of the composer.
///
/// Blocked submissions and failed preprocessors are not errors; they are
/// reported through [`SubmitOutcome`](crate::SubmitOutcome).
#[derive(Debug, Error)]
pub enum EngineError {
    /// A template or instance operation failed.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// A tree edit failed.
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// The store has no definition for the key.
    #[error("template `{key}` not found")]
    TemplateNotFound {
        /// Requested key.
        key: TemplateKey,
    },

    /// No live selection matches the id.
    #[error("selection {selection_id} is not in the document")]
    SelectionNotFound {
        /// Requested selection.
        selection_id: SelectionId,
    },

    /// The chat transport rejected the message.
    #[error("chat transport failed: {reason}")]
    Transport {
        /// Human-readable reason.
        reason: String,
    },
}

impl EngineError {
    /// Creates a transport error from the supplied reason.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }
}
