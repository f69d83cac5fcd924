//! Definition merged with instance overrides.

use crate::definition::{Block, PreProcessorCall, TemplateDefinition, Variable};
use crate::instance::TemplateSelectionInstance;

/// What the user actually works with for one selection.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectiveTemplate {
    /// Definition with presentation fields shadowed by overrides.
    pub template: TemplateDefinition,
}

impl EffectiveTemplate {
    /// Returns the effective blocks.
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.template.blocks
    }

    /// Returns the variable schema, always taken from the definition.
    #[must_use]
    pub fn variables_schema(&self) -> &[Variable] {
        &self.template.variables_schema
    }

    /// Returns the preprocessors, always taken from the definition.
    #[must_use]
    pub fn pre_processors(&self) -> &[PreProcessorCall] {
        &self.template.pre_processors
    }

    /// Looks up a variable of the effective schema.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.template.variable(name)
    }
}

/// Merges an instance's definition snapshot with its overrides.
///
/// Pure: the same instance always yields an equal result.
#[must_use]
pub fn compute_effective_template(instance: &TemplateSelectionInstance) -> EffectiveTemplate {
    let mut template = instance.definition().clone();

    if let Some(overrides) = instance.overrides() {
        if let Some(display_name) = &overrides.display_name {
            template.display_name.clone_from(display_name);
        }
        if let Some(description) = &overrides.description {
            template.description.clone_from(description);
        }
        if let Some(tags) = &overrides.tags {
            template.tags.clone_from(tags);
        }
        if let Some(blocks) = &overrides.blocks {
            template.blocks.clone_from(blocks);
        }
    }

    EffectiveTemplate { template }
}
