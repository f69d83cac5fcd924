//! Shared error definitions for composer primitives.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the composer crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided selection identifier could not be parsed.
    #[error("invalid selection id: {source}")]
    InvalidSelectionId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// Template key failed validation.
    #[error("invalid template key `{key}`: {reason}")]
    InvalidTemplateKey {
        /// The offending key, rendered as `bundle/slug@version`.
        key: String,
        /// Human-readable reason for rejection.
        reason: String,
    },
}
