//! Document node types.

use composer_primitives::{SelectionId, TemplateKey};
use composer_templates::TemplateSelectionInstance;

/// Discriminant of a [`Node`], used to enumerate nodes by kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Block container.
    Paragraph,
    /// Literal text.
    Text,
    /// Template selection chip.
    Selection,
    /// Variable marker.
    Variable,
}

/// Inline reference to one variable of one selection.
///
/// Holds no value: readers resolve it against the owning instance every time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableMarker {
    /// Template the owning selection was created from.
    pub key: TemplateKey,
    /// Owning selection.
    pub selection_id: SelectionId,
    /// Variable name.
    pub name: String,
}

impl VariableMarker {
    /// Creates a marker owned by `instance`.
    #[must_use]
    pub fn for_instance(instance: &TemplateSelectionInstance, name: impl Into<String>) -> Self {
        Self {
            key: instance.key().clone(),
            selection_id: instance.selection_id(),
            name: name.into(),
        }
    }
}

/// A node of the message document.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// Block container of inline nodes.
    Paragraph(Vec<Node>),
    /// Literal text.
    Text(String),
    /// Selection chip carrying the instance state.
    Selection(Box<TemplateSelectionInstance>),
    /// Variable marker.
    Variable(VariableMarker),
}

impl Node {
    /// Creates a text node.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Creates a paragraph.
    #[must_use]
    pub fn paragraph(children: Vec<Node>) -> Self {
        Self::Paragraph(children)
    }

    /// Creates a selection chip.
    #[must_use]
    pub fn selection(instance: TemplateSelectionInstance) -> Self {
        Self::Selection(Box::new(instance))
    }

    /// Returns the node kind.
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        match self {
            Self::Paragraph(_) => NodeKind::Paragraph,
            Self::Text(_) => NodeKind::Text,
            Self::Selection(_) => NodeKind::Selection,
            Self::Variable(_) => NodeKind::Variable,
        }
    }

    /// Returns the children of a container.
    #[must_use]
    pub fn children(&self) -> Option<&[Node]> {
        match self {
            Self::Paragraph(children) => Some(children),
            _ => None,
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Self::Paragraph(children) => Some(children),
            _ => None,
        }
    }

    /// Returns the instance of a selection chip.
    #[must_use]
    pub fn as_selection(&self) -> Option<&TemplateSelectionInstance> {
        match self {
            Self::Selection(instance) => Some(instance),
            _ => None,
        }
    }

    /// Returns the mutable instance of a selection chip.
    pub fn as_selection_mut(&mut self) -> Option<&mut TemplateSelectionInstance> {
        match self {
            Self::Selection(instance) => Some(instance),
            _ => None,
        }
    }

    /// Returns the variable marker.
    #[must_use]
    pub fn as_variable(&self) -> Option<&VariableMarker> {
        match self {
            Self::Variable(marker) => Some(marker),
            _ => None,
        }
    }
}
