//! Submission gate: aggregate readiness of every selection in a document.
//!
//! Evaluation is a pure read, cheap enough to run on every keystroke.

use composer_config::ComposerConfig;
use composer_document::{DocumentTree, NodeKind, TreePath};
use composer_primitives::{SelectionId, TemplateKey};

use crate::flatten::to_plain_text_replacing_variables;
use crate::index::{SelectionIndex, instance_at};
use crate::requirements::{Requirements, requirements_for};

/// The item submission is waiting on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Blocker {
    /// A required variable has no value.
    MissingVariable {
        /// Owning selection.
        selection_id: SelectionId,
        /// Variable name.
        name: String,
    },
    /// A preprocessor was never scheduled or lacks an input.
    PendingTool {
        /// Owning selection.
        selection_id: SelectionId,
        /// Preprocessor id.
        pre_processor_id: String,
        /// Variable the result is saved to.
        save_as: String,
        /// First argument variable without a value.
        unresolved_input: Option<String>,
    },
    /// The document holds no template and no text.
    EmptyMessage,
}

impl Blocker {
    /// Returns the owning selection, if any.
    #[must_use]
    pub const fn selection_id(&self) -> Option<SelectionId> {
        match self {
            Self::MissingVariable { selection_id, .. } | Self::PendingTool { selection_id, .. } => {
                Some(*selection_id)
            }
            Self::EmptyMessage => None,
        }
    }

    /// Returns the variable whose marker should receive focus.
    #[must_use]
    pub fn focus_variable(&self) -> Option<&str> {
        match self {
            Self::MissingVariable { name, .. } => Some(name),
            Self::PendingTool {
                unresolved_input, ..
            } => unresolved_input.as_deref(),
            Self::EmptyMessage => None,
        }
    }
}

/// Requirements of one selection at evaluation time.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectionReadiness {
    /// Selection id.
    pub selection_id: SelectionId,
    /// Template key.
    pub key: TemplateKey,
    /// Chip path.
    pub path: TreePath,
    /// What still blocks the selection.
    pub requirements: Requirements,
}

/// Result of [`evaluate_submission`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GateReport {
    /// Every selection in document order.
    pub selections: Vec<SelectionReadiness>,
    /// Missing required variables across the document.
    pub required_count: usize,
    /// Blocking preprocessors across the document.
    pub pending_tool_count: usize,
    /// `true` when the empty-message rule blocks.
    pub empty_message: bool,
    /// First blocker in document order.
    pub first_blocker: Option<Blocker>,
}

impl GateReport {
    /// Returns `true` when submission may proceed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.required_count == 0 && self.pending_tool_count == 0 && !self.empty_message
    }

    /// Returns the selections that have something blocking, in document order.
    #[must_use]
    pub fn blocking_selections(&self) -> Vec<SelectionId> {
        self.selections
            .iter()
            .filter(|s| !s.requirements.is_ready())
            .map(|s| s.selection_id)
            .collect()
    }

    /// Returns the readiness of one selection.
    #[must_use]
    pub fn selection(&self, selection_id: SelectionId) -> Option<&SelectionReadiness> {
        self.selections.iter().find(|s| s.selection_id == selection_id)
    }
}

/// Decides whether the document may be sent.
#[must_use]
pub fn evaluate_submission<D>(doc: &D, config: &ComposerConfig) -> GateReport
where
    D: DocumentTree + ?Sized,
{
    let fallback = config.resolution.tool_fallback;
    let index = SelectionIndex::scan(doc);

    let selections: Vec<SelectionReadiness> = index
        .entries()
        .iter()
        .filter_map(|entry| {
            let instance = instance_at(doc, &entry.path)?;
            Some(SelectionReadiness {
                selection_id: entry.selection_id,
                key: entry.key.clone(),
                path: entry.path.clone(),
                requirements: requirements_for(instance, fallback),
            })
        })
        .collect();

    let required_count = selections.iter().map(|s| s.requirements.required_count).sum();
    let pending_tool_count = selections
        .iter()
        .map(|s| s.requirements.blocking_tool_count())
        .sum();

    let empty_message = selections.is_empty()
        && !config.gate.allow_empty_message
        && to_plain_text_replacing_variables(doc, fallback, &config.flatten.paragraph_separator)
            .trim()
            .is_empty();

    let first_blocker = first_missing_variable(doc, &index, &selections)
        .or_else(|| first_blocking_tool(&selections))
        .or_else(|| empty_message.then_some(Blocker::EmptyMessage));

    GateReport {
        selections,
        required_count,
        pending_tool_count,
        empty_message,
        first_blocker,
    }
}

fn first_missing_variable<D>(
    doc: &D,
    index: &SelectionIndex,
    selections: &[SelectionReadiness],
) -> Option<Blocker>
where
    D: DocumentTree + ?Sized,
{
    let is_missing = |selection_id: SelectionId, name: &str| {
        selections.iter().any(|s| {
            s.selection_id == selection_id
                && s.requirements.required_variables.iter().any(|n| n == name)
        })
    };

    let by_marker = doc
        .nodes_of_kind(NodeKind::Variable)
        .into_iter()
        .filter_map(|(_, node)| node.as_variable())
        .find_map(|marker| {
            let owner = index.resolve_marker(marker)?;
            is_missing(owner.selection_id, &marker.name).then(|| Blocker::MissingVariable {
                selection_id: owner.selection_id,
                name: marker.name.clone(),
            })
        });

    by_marker.or_else(|| {
        selections.iter().find_map(|s| {
            let name = s.requirements.required_variables.first()?;
            Some(Blocker::MissingVariable {
                selection_id: s.selection_id,
                name: name.clone(),
            })
        })
    })
}

fn first_blocking_tool(selections: &[SelectionReadiness]) -> Option<Blocker> {
    selections.iter().find_map(|s| {
        let tool = s.requirements.blocking_tools().next()?;
        Some(Blocker::PendingTool {
            selection_id: s.selection_id,
            pre_processor_id: tool.id.clone(),
            save_as: tool.save_as.clone(),
            unresolved_input: tool.unresolved_inputs.first().cloned(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use composer_document::{Document, Node, VariableMarker};
    use composer_templates::{
        PreProcessorCall, TemplateDefinition, TemplateSelectionInstance, Variable, VariableType,
    };
    use serde_json::json;

    fn key(slug: &str) -> TemplateKey {
        TemplateKey::new("core", slug, "1").unwrap()
    }

    fn chip_with_markers(instance: &TemplateSelectionInstance, names: &[&str]) -> Node {
        let mut children = vec![Node::selection(instance.clone())];
        children.extend(
            names
                .iter()
                .map(|name| Node::Variable(VariableMarker::for_instance(instance, *name))),
        );
        Node::paragraph(children)
    }

    #[test]
    fn empty_document_is_blocked() {
        let config = ComposerConfig::default();
        let report = evaluate_submission(&Document::new(), &config);
        assert!(!report.is_allowed());
        assert_eq!(report.first_blocker, Some(Blocker::EmptyMessage));

        let report = evaluate_submission(&Document::from_text("  \n "), &config);
        assert!(report.empty_message);

        assert!(evaluate_submission(&Document::from_text("hello"), &config).is_allowed());
    }

    #[test]
    fn empty_message_can_be_allowed() {
        let mut config = ComposerConfig::default();
        config.gate.allow_empty_message = true;
        assert!(evaluate_submission(&Document::new(), &config).is_allowed());
    }

    #[test]
    fn first_missing_variable_follows_marker_order() {
        let def = TemplateDefinition::new("Pair")
            .with_variable(Variable::new("a", VariableType::String).required())
            .with_variable(Variable::new("b", VariableType::String).required());
        let instance = TemplateSelectionInstance::new(key("pair"), def);
        let doc = Document::from_nodes(vec![chip_with_markers(&instance, &["b", "a"])]);

        let report = evaluate_submission(&doc, &ComposerConfig::default());
        assert_eq!(report.required_count, 2);
        assert_eq!(
            report.first_blocker,
            Some(Blocker::MissingVariable {
                selection_id: instance.selection_id(),
                name: "b".into(),
            })
        );
        assert_eq!(report.blocking_selections(), vec![instance.selection_id()]);
    }

    #[test]
    fn pending_tool_blocks_after_variables() {
        let def = TemplateDefinition::new("Search")
            .with_variable(Variable::new("q", VariableType::String))
            .with_pre_processor(
                PreProcessorCall::new("p1", "search", "hits").with_arg("q", "{{q}}"),
            );
        let tools = TemplateSelectionInstance::new(key("search"), def);
        let mut other = TemplateSelectionInstance::new(
            key("topic"),
            TemplateDefinition::new("Topic")
                .with_variable(Variable::new("topic", VariableType::String).required()),
        );

        let doc = Document::from_nodes(vec![
            chip_with_markers(&tools, &["q"]),
            chip_with_markers(&other, &["topic"]),
        ]);
        let report = evaluate_submission(&doc, &ComposerConfig::default());
        assert_eq!(report.pending_tool_count, 1);
        assert!(matches!(
            report.first_blocker,
            Some(Blocker::MissingVariable { ref name, .. }) if name == "topic"
        ));

        other.set_variable("topic", Some(json!("rust")));
        let doc = Document::from_nodes(vec![
            chip_with_markers(&tools, &["q"]),
            chip_with_markers(&other, &["topic"]),
        ]);
        let report = evaluate_submission(&doc, &ComposerConfig::default());
        assert_eq!(
            report.first_blocker,
            Some(Blocker::PendingTool {
                selection_id: tools.selection_id(),
                pre_processor_id: "p1".into(),
                save_as: "hits".into(),
                unresolved_input: Some("q".into()),
            })
        );
        assert_eq!(report.blocking_selections(), vec![tools.selection_id()]);
    }

    #[test]
    fn gate_does_not_mutate() {
        let def = TemplateDefinition::new("Pair")
            .with_variable(Variable::new("a", VariableType::String).required());
        let instance = TemplateSelectionInstance::new(key("pair"), def);
        let doc = Document::from_nodes(vec![chip_with_markers(&instance, &["a"])]);
        let before = doc.clone();
        let _ = evaluate_submission(&doc, &ComposerConfig::default());
        assert_eq!(doc, before);
    }
}
