//! Selection lookup rebuilt from a full tree scan.
//!
//! Paths change on every edit, so nothing here is cached across operations:
//! scan, look up, act, drop.

use composer_document::{DocumentTree, NodeKind, TreePath, VariableMarker};
use composer_primitives::{SelectionId, TemplateKey};
use composer_templates::TemplateSelectionInstance;

/// One live selection chip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectionEntry {
    /// Stable selection id.
    pub selection_id: SelectionId,
    /// Template the selection was created from.
    pub key: TemplateKey,
    /// Path of the chip at scan time.
    pub path: TreePath,
}

/// Every selection in a document, in document order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionIndex {
    entries: Vec<SelectionEntry>,
}

impl SelectionIndex {
    /// Scans the document for selection chips.
    #[must_use]
    pub fn scan<D>(doc: &D) -> Self
    where
        D: DocumentTree + ?Sized,
    {
        let entries = doc
            .nodes_of_kind(NodeKind::Selection)
            .into_iter()
            .filter_map(|(path, node)| {
                let instance = node.as_selection()?;
                Some(SelectionEntry {
                    selection_id: instance.selection_id(),
                    key: instance.key().clone(),
                    path,
                })
            })
            .collect();
        Self { entries }
    }

    /// Returns the entries in document order.
    #[must_use]
    pub fn entries(&self) -> &[SelectionEntry] {
        &self.entries
    }

    /// Returns `true` when the document holds no selection.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a selection by id only.
    #[must_use]
    pub fn by_id(&self, selection_id: SelectionId) -> Option<&SelectionEntry> {
        self.entries
            .iter()
            .find(|entry| entry.selection_id == selection_id)
    }

    /// Looks up by id, falling back to the first selection created from the
    /// same template key.
    #[must_use]
    pub fn resolve(&self, selection_id: SelectionId, key: &TemplateKey) -> Option<&SelectionEntry> {
        self.by_id(selection_id)
            .or_else(|| self.entries.iter().find(|entry| &entry.key == key))
    }

    /// Resolves the owning selection of a marker. `None` means orphaned.
    #[must_use]
    pub fn resolve_marker(&self, marker: &VariableMarker) -> Option<&SelectionEntry> {
        self.resolve(marker.selection_id, &marker.key)
    }
}

/// Returns the instance carried by the chip at `path`.
#[must_use]
pub fn instance_at<'a, D>(doc: &'a D, path: &[usize]) -> Option<&'a TemplateSelectionInstance>
where
    D: DocumentTree + ?Sized,
{
    doc.node(path)?.as_selection()
}

/// Returns every marker owned by `selection_id` with its path, in document
/// order. Markers reach their owner through the same id-then-key fallback
/// used for reads.
#[must_use]
pub fn markers_of<D>(
    doc: &D,
    index: &SelectionIndex,
    selection_id: SelectionId,
) -> Vec<(TreePath, VariableMarker)>
where
    D: DocumentTree + ?Sized,
{
    doc.nodes_of_kind(NodeKind::Variable)
        .into_iter()
        .filter_map(|(path, node)| {
            let marker = node.as_variable()?;
            let owner = index.resolve_marker(marker)?;
            (owner.selection_id == selection_id).then(|| (path, marker.clone()))
        })
        .collect()
}
