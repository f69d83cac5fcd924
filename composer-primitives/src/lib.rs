//! Core shared types for the prompt composer engine.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod ids;
mod key;

/// Error type and result alias shared across the composer crates.
pub use error::{Error, Result};
/// Stable identifier of one template insertion.
pub use ids::SelectionId;
/// Identity of a template definition in the store.
pub use key::TemplateKey;
