//! Template definitions and the pure resolution layer of the composer.
//!
//! A [`TemplateDefinition`] is immutable and fetched from a [`TemplateStore`].
//! Each insertion into a message becomes a [`TemplateSelectionInstance`] that
//! carries its own overrides, user-entered values, and preprocessor states.
//! The functions in [`effective`] and [`resolver`] compute what the user
//! actually sees from those pieces and never mutate anything.

#![warn(missing_docs, clippy::pedantic)]

pub mod definition;
pub mod effective;
mod error;
pub mod instance;
pub mod placeholder;
pub mod resolver;
pub mod store;
pub mod tool_state;
pub mod value;

pub use definition::{
    Block, BlockRole, OnErrorPolicy, PreProcessorCall, TemplateDefinition, Variable, VariableSource,
    VariableType,
};
pub use effective::{EffectiveTemplate, compute_effective_template};
pub use error::{TemplateError, TemplateResult};
pub use instance::{TemplateOverrides, TemplateSelectionInstance};
pub use placeholder::{Placeholder, scan_placeholders, token};
pub use resolver::{EffectiveArgs, ToolContext, ToolFallback, effective_args, effective_value};
pub use store::{InMemoryTemplateStore, TemplateStore};
pub use tool_state::{ToolEvent, ToolState, ToolStatus};
pub use value::{is_empty_value, render_value};
