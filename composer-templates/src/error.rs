//! Errors raised by template and instance operations.

use crate::tool_state::ToolStatus;

/// Result alias for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors that can occur while manipulating templates and selection instances.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// The definition failed structural validation.
    #[error("invalid template definition: {reason}")]
    InvalidDefinition {
        /// Reason for the failure.
        reason: String,
    },

    /// A variable name is not part of the effective schema.
    #[error("unknown variable: {name}")]
    UnknownVariable {
        /// Name of the variable.
        name: String,
    },

    /// A preprocessor id is not part of the effective template.
    #[error("unknown preprocessor: {id}")]
    UnknownPreProcessor {
        /// Identifier of the preprocessor.
        id: String,
    },

    /// A user-supplied value could not be coerced to the variable type.
    #[error("invalid value for `{name}`: {reason}")]
    InvalidValue {
        /// Name of the variable.
        name: String,
        /// Reason for the rejection.
        reason: String,
    },

    /// A tool state transition is not permitted from the current status.
    #[error("invalid transition for preprocessor `{id}` from {from:?} via {event}")]
    InvalidToolTransition {
        /// Identifier of the preprocessor.
        id: String,
        /// Status prior to the attempted transition.
        from: ToolStatus,
        /// Name of the rejected event.
        event: &'static str,
    },

    /// The template store failed to answer.
    #[error("template store error: {reason}")]
    Store {
        /// Reason for the failure.
        reason: String,
    },
}

impl TemplateError {
    /// Creates an invalid-value error.
    #[must_use]
    pub fn invalid_value(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a store error from the supplied reason.
    #[must_use]
    pub fn store(reason: impl Into<String>) -> Self {
        Self::Store {
            reason: reason.into(),
        }
    }
}
