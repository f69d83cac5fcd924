//! Immutable template definitions as served by the template store.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{TemplateError, TemplateResult};

/// Author role of a template block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockRole {
    /// Instructions aimed at the model.
    System,
    /// Text sent on behalf of the user.
    #[default]
    User,
    /// Example assistant output.
    Assistant,
}

/// One ordered text block of a template. `content` may contain `{{name}}`
/// placeholders.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Identifier unique within the template.
    pub id: String,
    /// Author role.
    #[serde(default)]
    pub role: BlockRole,
    /// Raw block text.
    pub content: String,
}

impl Block {
    /// Creates a user block.
    #[must_use]
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: BlockRole::User,
            content: content.into(),
        }
    }

    /// Sets the block role.
    #[must_use]
    pub fn with_role(mut self, role: BlockRole) -> Self {
        self.role = role;
        self
    }
}

/// Declared type of a template variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    /// Free text.
    String,
    /// Integer or floating point number.
    Number,
    /// `true` / `false`.
    Boolean,
    /// One of [`Variable::enum_values`].
    Enum,
    /// Calendar date, `YYYY-MM-DD`.
    Date,
}

/// Where a variable's value is expected to come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableSource {
    /// Typed by the user.
    #[default]
    User,
    /// Fixed by the template via [`Variable::static_val`].
    Static,
    /// Produced by a preprocessor.
    Tool,
}

/// A named placeholder declared by a template.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    /// Name, unique within the template.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub var_type: VariableType,
    /// Expected origin of the value.
    #[serde(default)]
    pub source: VariableSource,
    /// Whether submission is blocked until the variable resolves.
    #[serde(default)]
    pub required: bool,
    /// Fallback value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Value used when `source` is [`VariableSource::Static`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_val: Option<Value>,
    /// Allowed values for [`VariableType::Enum`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    /// Human-readable hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Variable {
    /// Creates an optional, user-sourced variable.
    #[must_use]
    pub fn new(name: impl Into<String>, var_type: VariableType) -> Self {
        Self {
            name: name.into(),
            var_type,
            source: VariableSource::User,
            required: false,
            default: None,
            static_val: None,
            enum_values: Vec::new(),
            description: None,
        }
    }

    /// Marks the variable as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the variable source.
    #[must_use]
    pub fn with_source(mut self, source: VariableSource) -> Self {
        self.source = source;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Makes the variable static with the supplied value.
    #[must_use]
    pub fn with_static(mut self, value: impl Into<Value>) -> Self {
        self.source = VariableSource::Static;
        self.static_val = Some(value.into());
        self
    }

    /// Sets the allowed values of an enum variable.
    #[must_use]
    pub fn with_enum_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Policy applied when a preprocessor fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnErrorPolicy {
    /// Record the error and abort submission.
    #[default]
    Fail,
    /// Record the error, mark the preprocessor done, and continue.
    Ignore,
}

/// A background tool call declared by a template.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreProcessorCall {
    /// Identifier unique within the template.
    pub id: String,
    /// Tool to invoke.
    #[serde(rename = "toolID", alias = "toolId")]
    pub tool_id: String,
    /// Variable the extracted result is written to.
    pub save_as: String,
    /// Extraction path into the raw tool result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_expr: Option<String>,
    /// Failure policy.
    #[serde(default)]
    pub on_error: OnErrorPolicy,
    /// Static arguments.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub args: Map<String, Value>,
}

impl PreProcessorCall {
    /// Creates a call without arguments or extraction path.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        tool_id: impl Into<String>,
        save_as: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            tool_id: tool_id.into(),
            save_as: save_as.into(),
            path_expr: None,
            on_error: OnErrorPolicy::Fail,
            args: Map::new(),
        }
    }

    /// Sets the extraction path.
    #[must_use]
    pub fn with_path_expr(mut self, path_expr: impl Into<String>) -> Self {
        self.path_expr = Some(path_expr.into());
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn with_on_error(mut self, policy: OnErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }

    /// Adds a static argument.
    #[must_use]
    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }
}

/// Immutable template fetched by `(bundle_id, slug, version)`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDefinition {
    /// Name shown on the selection chip.
    pub display_name: String,
    /// Longer description.
    #[serde(default)]
    pub description: String,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Ordered text blocks.
    #[serde(default)]
    pub blocks: Vec<Block>,
    /// Declared variables.
    #[serde(default)]
    pub variables_schema: Vec<Variable>,
    /// Declared preprocessors.
    #[serde(default)]
    pub pre_processors: Vec<PreProcessorCall>,
}

impl TemplateDefinition {
    /// Creates an empty definition with the supplied display name.
    #[must_use]
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            ..Self::default()
        }
    }

    /// Appends a block.
    #[must_use]
    pub fn with_block(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    /// Appends a variable declaration.
    #[must_use]
    pub fn with_variable(mut self, variable: Variable) -> Self {
        self.variables_schema.push(variable);
        self
    }

    /// Appends a preprocessor declaration.
    #[must_use]
    pub fn with_pre_processor(mut self, call: PreProcessorCall) -> Self {
        self.pre_processors.push(call);
        self
    }

    /// Looks up a variable declaration by name.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables_schema.iter().find(|var| var.name == name)
    }

    /// Looks up a preprocessor declaration by id.
    #[must_use]
    pub fn pre_processor(&self, id: &str) -> Option<&PreProcessorCall> {
        self.pre_processors.iter().find(|call| call.id == id)
    }

    /// Checks the uniqueness and shape constraints of the definition.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::InvalidDefinition`] for duplicate variable
    /// names or preprocessor ids, blank names, and enum variables without
    /// allowed values.
    pub fn validate(&self) -> TemplateResult<()> {
        let mut names = HashSet::new();
        for var in &self.variables_schema {
            if var.name.trim().is_empty() {
                return Err(invalid("variable name cannot be empty"));
            }
            if !names.insert(var.name.as_str()) {
                return Err(invalid(format!("duplicate variable `{}`", var.name)));
            }
            if var.var_type == VariableType::Enum && var.enum_values.is_empty() {
                return Err(invalid(format!(
                    "enum variable `{}` declares no values",
                    var.name
                )));
            }
        }

        let mut ids = HashSet::new();
        for call in &self.pre_processors {
            if call.id.trim().is_empty() || call.tool_id.trim().is_empty() {
                return Err(invalid("preprocessor id and tool id cannot be empty"));
            }
            if !ids.insert(call.id.as_str()) {
                return Err(invalid(format!("duplicate preprocessor `{}`", call.id)));
            }
        }

        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> TemplateError {
    TemplateError::InvalidDefinition {
        reason: reason.into(),
    }
}
