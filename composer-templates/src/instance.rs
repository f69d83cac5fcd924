//! Per-insertion template state.

use std::collections::BTreeMap;

use composer_primitives::{SelectionId, TemplateKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::definition::{Block, TemplateDefinition};
use crate::effective::{EffectiveTemplate, compute_effective_template};
use crate::error::{TemplateError, TemplateResult};
use crate::tool_state::{ToolEvent, ToolState, ToolStatus};
use crate::value::is_empty_value;

/// Instance-local edits that shadow the definition's presentation fields.
///
/// A present field always wins over the definition; an absent one falls back
/// to it. Variable and preprocessor schemas cannot be overridden.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateOverrides {
    /// Replacement display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Replacement description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Replacement tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Replacement blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<Block>>,
}

impl TemplateOverrides {
    /// Returns `true` when no field is overridden.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.description.is_none()
            && self.tags.is_none()
            && self.blocks.is_none()
    }
}

/// One insertion of a template into a message.
///
/// Carries a snapshot of the definition taken at insertion time, so the
/// instance resolves without going back to the store. Two instances created
/// from the same [`TemplateKey`] share nothing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSelectionInstance {
    selection_id: SelectionId,
    key: TemplateKey,
    definition: TemplateDefinition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    overrides: Option<TemplateOverrides>,
    #[serde(default)]
    variables: BTreeMap<String, Value>,
    #[serde(default)]
    tool_states: BTreeMap<String, ToolState>,
}

impl TemplateSelectionInstance {
    /// Creates a fresh instance with a new selection id and every
    /// preprocessor pending.
    #[must_use]
    pub fn new(key: TemplateKey, definition: TemplateDefinition) -> Self {
        Self::with_selection_id(SelectionId::random(), key, definition)
    }

    /// Creates an instance with a caller-chosen selection id.
    #[must_use]
    pub fn with_selection_id(
        selection_id: SelectionId,
        key: TemplateKey,
        definition: TemplateDefinition,
    ) -> Self {
        let tool_states = definition
            .pre_processors
            .iter()
            .map(|call| (call.id.clone(), ToolState::pending()))
            .collect();

        Self {
            selection_id,
            key,
            definition,
            overrides: None,
            variables: BTreeMap::new(),
            tool_states,
        }
    }

    /// Returns the stable selection id.
    #[must_use]
    pub const fn selection_id(&self) -> SelectionId {
        self.selection_id
    }

    /// Returns the originating template key.
    #[must_use]
    pub fn key(&self) -> &TemplateKey {
        &self.key
    }

    /// Returns the definition snapshot.
    #[must_use]
    pub fn definition(&self) -> &TemplateDefinition {
        &self.definition
    }

    /// Returns the local overrides, if any.
    #[must_use]
    pub fn overrides(&self) -> Option<&TemplateOverrides> {
        self.overrides.as_ref()
    }

    /// Replaces the local overrides. Empty overrides are stored as `None`.
    pub fn set_overrides(&mut self, overrides: TemplateOverrides) {
        self.overrides = (!overrides.is_empty()).then_some(overrides);
    }

    /// Returns the definition merged with the local overrides.
    #[must_use]
    pub fn effective(&self) -> EffectiveTemplate {
        compute_effective_template(self)
    }

    /// Returns the user-entered values.
    #[must_use]
    pub fn variables(&self) -> &BTreeMap<String, Value> {
        &self.variables
    }

    /// Returns one user-entered value.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Stores a value, or removes the key when the value is absent or empty.
    ///
    /// Returns `true` when the stored map changed.
    pub fn set_variable(&mut self, name: impl Into<String>, value: Option<Value>) -> bool {
        let name = name.into();
        match value.filter(|v| !is_empty_value(v)) {
            Some(value) => self.variables.insert(name, value.clone()).as_ref() != Some(&value),
            None => self.variables.remove(&name).is_some(),
        }
    }

    /// Parses raw user input for a declared variable and stores it.
    ///
    /// Returns `true` when the stored map changed.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::UnknownVariable`] for names outside the
    /// schema, or [`TemplateError::InvalidValue`] when coercion fails.
    pub fn commit_input(&mut self, name: &str, raw: &str) -> TemplateResult<bool> {
        let var = self
            .definition
            .variable(name)
            .ok_or_else(|| TemplateError::UnknownVariable {
                name: name.to_owned(),
            })?;
        let value = var.coerce_input(raw)?;
        Ok(self.set_variable(name, value))
    }

    /// Returns the preprocessor states keyed by preprocessor id.
    #[must_use]
    pub fn tool_states(&self) -> &BTreeMap<String, ToolState> {
        &self.tool_states
    }

    /// Returns the state of one preprocessor.
    #[must_use]
    pub fn tool_state(&self, id: &str) -> Option<&ToolState> {
        self.tool_states.get(id)
    }

    /// Applies a state-machine event to one preprocessor.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::UnknownPreProcessor`] for ids the template
    /// does not declare, or the transition error from [`ToolState::apply`].
    pub fn apply_tool_event(&mut self, id: &str, event: ToolEvent) -> TemplateResult<ToolStatus> {
        self.declared_state_mut(id)?.apply(id, event)
    }

    /// Replaces the argument overrides of one preprocessor. The status is
    /// left untouched, so a finished preprocessor needs an explicit re-run.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::UnknownPreProcessor`] for undeclared ids.
    pub fn set_tool_args(&mut self, id: &str, args: Map<String, Value>) -> TemplateResult<()> {
        self.declared_state_mut(id)?.set_arg_overrides(args);
        Ok(())
    }

    fn declared_state_mut(&mut self, id: &str) -> TemplateResult<&mut ToolState> {
        if self.definition.pre_processor(id).is_none() {
            return Err(TemplateError::UnknownPreProcessor { id: id.to_owned() });
        }
        Ok(self.tool_states.entry(id.to_owned()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{PreProcessorCall, Variable, VariableType};
    use serde_json::json;

    fn definition() -> TemplateDefinition {
        TemplateDefinition::new("Summarize")
            .with_variable(Variable::new("topic", VariableType::String).required())
            .with_variable(Variable::new("count", VariableType::Number))
            .with_pre_processor(PreProcessorCall::new("p1", "search", "summary"))
    }

    fn key() -> TemplateKey {
        TemplateKey::new("core", "summarize", "1").unwrap()
    }

    #[test]
    fn new_instance_has_pending_tools() {
        let instance = TemplateSelectionInstance::new(key(), definition());
        assert!(instance.variables().is_empty());
        assert_eq!(instance.tool_state("p1").unwrap().status, ToolStatus::Pending);
    }

    #[test]
    fn empty_values_are_never_stored() {
        let mut instance = TemplateSelectionInstance::new(key(), definition());
        assert!(instance.set_variable("topic", Some(json!("cats"))));
        assert!(!instance.set_variable("topic", Some(json!("cats"))));
        assert!(instance.set_variable("topic", Some(json!(""))));
        assert!(instance.variable("topic").is_none());
        assert!(!instance.set_variable("topic", None));
    }

    #[test]
    fn commit_input_coerces() {
        let mut instance = TemplateSelectionInstance::new(key(), definition());
        instance.commit_input("count", "3").unwrap();
        assert_eq!(instance.variable("count"), Some(&json!(3)));

        let err = instance.commit_input("missing", "x").expect_err("unknown");
        assert!(matches!(err, TemplateError::UnknownVariable { .. }));
    }

    #[test]
    fn instances_from_same_key_are_isolated() {
        let mut first = TemplateSelectionInstance::new(key(), definition());
        let second = TemplateSelectionInstance::new(key(), definition());
        first.set_variable("topic", Some(json!("cats")));
        assert_ne!(first.selection_id(), second.selection_id());
        assert!(second.variables().is_empty());
    }

    #[test]
    fn unknown_pre_processor_is_rejected() {
        let mut instance = TemplateSelectionInstance::new(key(), definition());
        let err = instance
            .apply_tool_event("nope", ToolEvent::MarkReady)
            .expect_err("unknown id");
        assert!(matches!(err, TemplateError::UnknownPreProcessor { id } if id == "nope"));
    }

    #[test]
    fn empty_overrides_are_dropped() {
        let mut instance = TemplateSelectionInstance::new(key(), definition());
        instance.set_overrides(TemplateOverrides::default());
        assert!(instance.overrides().is_none());
    }
}
