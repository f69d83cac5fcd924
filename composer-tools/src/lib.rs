//! Tool invocation for template preprocessors.
//!
//! The composer only needs one capability from the outside world: run a tool
//! by id with JSON arguments. [`ToolInvoker`] is that seam; [`ToolRegistry`]
//! is an in-process implementation backed by registered closures or
//! [`Tool`] implementations. [`extract`] pulls the interesting part out of a
//! raw result.

#![warn(missing_docs, clippy::pedantic)]

pub mod extract;
pub mod registry;

pub use extract::{extract_path, reject_error_payload};
pub use registry::{
    Tool, ToolError, ToolHandle, ToolInvoker, ToolMetadata, ToolRegistry, ToolResult,
};
