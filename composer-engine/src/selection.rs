//! Edits applied to one selection and its markers.

use composer_document::{DocumentError, DocumentTree, Edge, Node, TreePath};
use composer_primitives::SelectionId;
use composer_templates::{
    TemplateError, TemplateOverrides, TemplateSelectionInstance, ToolEvent, ToolFallback,
    ToolStatus,
};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::flatten::{build_user_inline_children_from_text, render_marker};
use crate::index::{SelectionIndex, markers_of};
use crate::observer::ComposerEvent;

/// Returns the chip path of a live selection.
///
/// # Errors
///
/// Returns [`EngineError::SelectionNotFound`] when the id does not resolve.
pub fn selection_path<D>(doc: &D, selection_id: SelectionId) -> EngineResult<TreePath>
where
    D: DocumentTree + ?Sized,
{
    SelectionIndex::scan(doc)
        .by_id(selection_id)
        .map(|entry| entry.path.clone())
        .ok_or(EngineError::SelectionNotFound { selection_id })
}

/// Returns a live instance for in-place edits.
///
/// # Errors
///
/// Returns [`EngineError::SelectionNotFound`] when the id does not resolve.
pub fn instance_mut<D>(
    doc: &mut D,
    selection_id: SelectionId,
) -> EngineResult<&mut TemplateSelectionInstance>
where
    D: DocumentTree + ?Sized,
{
    let path = selection_path(doc, selection_id)?;
    doc.node_mut(&path)
        .and_then(Node::as_selection_mut)
        .ok_or(EngineError::SelectionNotFound { selection_id })
}

/// Inserts the chip and one paragraph per effective block at `path`.
///
/// The chip opens the first paragraph. Block text is split into markers for
/// known variables.
///
/// # Errors
///
/// Propagates tree errors for invalid insertion paths.
pub fn insert_selection<D>(
    doc: &mut D,
    path: &[usize],
    instance: TemplateSelectionInstance,
) -> EngineResult<SelectionId>
where
    D: DocumentTree + ?Sized,
{
    let selection_id = instance.selection_id();
    let mut blocks: Vec<Vec<Node>> = instance
        .effective()
        .blocks()
        .iter()
        .map(|block| build_user_inline_children_from_text(&instance, &block.content))
        .collect();

    let chip = Node::selection(instance);
    match blocks.first_mut() {
        Some(children) => children.insert(0, chip),
        None => blocks.push(vec![chip]),
    }

    doc.insert_nodes(path, blocks.into_iter().map(Node::paragraph).collect())?;
    debug!(%selection_id, ?path, "selection inserted");
    Ok(selection_id)
}

/// Parses and stores a value typed into a marker. Blank input clears it.
///
/// Returns `true` when the stored values changed.
///
/// # Errors
///
/// Fails for unknown selections, undeclared variables, or input that does
/// not parse as the variable's type.
pub fn commit_variable<D>(
    doc: &mut D,
    selection_id: SelectionId,
    name: &str,
    raw: &str,
) -> EngineResult<bool>
where
    D: DocumentTree + ?Sized,
{
    Ok(instance_mut(doc, selection_id)?.commit_input(name, raw)?)
}

/// Saves the override modal: new overrides plus a batch of raw values.
///
/// Every value is parsed before anything is written, so a bad value leaves
/// the instance untouched. Returns `true` when stored values changed.
///
/// # Errors
///
/// Fails for unknown selections, undeclared variables, or unparsable input.
pub fn apply_overrides<D>(
    doc: &mut D,
    selection_id: SelectionId,
    overrides: TemplateOverrides,
    values: &[(&str, &str)],
) -> EngineResult<bool>
where
    D: DocumentTree + ?Sized,
{
    let instance = instance_mut(doc, selection_id)?;

    let parsed = values
        .iter()
        .map(|(name, raw)| {
            let var = instance
                .definition()
                .variable(name)
                .ok_or_else(|| TemplateError::UnknownVariable {
                    name: (*name).to_owned(),
                })?;
            Ok(((*name).to_owned(), var.coerce_input(raw)?))
        })
        .collect::<Result<Vec<_>, TemplateError>>()?;

    instance.set_overrides(overrides);
    let mut changed = false;
    for (name, value) in parsed {
        changed |= instance.set_variable(name, value);
    }
    Ok(changed)
}

/// Schedules a preprocessor, or re-runs a finished one.
///
/// # Errors
///
/// Fails for unknown selections or undeclared preprocessors.
pub fn mark_tool_ready<D>(
    doc: &mut D,
    selection_id: SelectionId,
    pre_processor_id: &str,
) -> EngineResult<ToolStatus>
where
    D: DocumentTree + ?Sized,
{
    Ok(instance_mut(doc, selection_id)?.apply_tool_event(pre_processor_id, ToolEvent::MarkReady)?)
}

/// Replaces the argument overrides of a preprocessor without touching its
/// status.
///
/// # Errors
///
/// Fails for unknown selections or undeclared preprocessors.
pub fn set_tool_args<D>(
    doc: &mut D,
    selection_id: SelectionId,
    pre_processor_id: &str,
    args: Map<String, Value>,
) -> EngineResult<()>
where
    D: DocumentTree + ?Sized,
{
    Ok(instance_mut(doc, selection_id)?.set_tool_args(pre_processor_id, args)?)
}

/// Removes the chip and every marker of a selection, returning its instance.
///
/// # Errors
///
/// Fails when the selection is not in the document.
pub fn remove_selection<D>(
    doc: &mut D,
    selection_id: SelectionId,
) -> EngineResult<TemplateSelectionInstance>
where
    D: DocumentTree + ?Sized,
{
    let index = SelectionIndex::scan(doc);
    let chip = index
        .by_id(selection_id)
        .map(|entry| entry.path.clone())
        .ok_or(EngineError::SelectionNotFound { selection_id })?;

    let mut paths: Vec<TreePath> = markers_of(doc, &index, selection_id)
        .into_iter()
        .map(|(path, _)| path)
        .collect();
    paths.push(chip.clone());
    remove_deepest_first(doc, paths, &chip)
}

/// Turns every marker of a selection into literal text, then removes the
/// chip. Markers keep their rendered value, or `{{name}}` when unset.
///
/// # Errors
///
/// Fails when the selection is not in the document.
pub fn flatten_selection<D>(
    doc: &mut D,
    selection_id: SelectionId,
    fallback: ToolFallback,
) -> EngineResult<TemplateSelectionInstance>
where
    D: DocumentTree + ?Sized,
{
    let index = SelectionIndex::scan(doc);
    let chip = index
        .by_id(selection_id)
        .map(|entry| entry.path.clone())
        .ok_or(EngineError::SelectionNotFound { selection_id })?;

    let mut rendered: Vec<(TreePath, String)> = markers_of(doc, &index, selection_id)
        .into_iter()
        .map(|(path, marker)| {
            let text = render_marker(doc, &index, &marker, fallback);
            (path, text)
        })
        .collect();
    rendered.sort_by(|a, b| b.0.cmp(&a.0));

    for (path, text) in rendered {
        if let Some(node) = doc.node_mut(&path) {
            *node = Node::Text(text);
        }
    }

    remove_deepest_first(doc, vec![chip.clone()], &chip)
}

fn remove_deepest_first<D>(
    doc: &mut D,
    mut paths: Vec<TreePath>,
    chip: &[usize],
) -> EngineResult<TemplateSelectionInstance>
where
    D: DocumentTree + ?Sized,
{
    paths.sort_by(|a, b| b.cmp(a));
    paths.dedup();

    let mut instance = None;
    for path in &paths {
        let node = doc.remove_node(path)?;
        if path.as_slice() == chip {
            if let Node::Selection(removed) = node {
                instance = Some(*removed);
            }
        }
    }

    instance.ok_or_else(|| {
        EngineError::Document(DocumentError::InvalidPath { path: chip.to_vec() })
    })
}

/// Moves the cursor to the end of a selection's marker for `variable`, or of
/// its chip when no such marker exists, and focuses the editor.
///
/// Returns `None` when the selection is gone.
pub fn focus_selection<D>(
    doc: &mut D,
    selection_id: SelectionId,
    variable: Option<&str>,
) -> Option<ComposerEvent>
where
    D: DocumentTree + ?Sized,
{
    let index = SelectionIndex::scan(doc);
    let chip = index.by_id(selection_id)?.path.clone();

    let marker = variable.and_then(|name| {
        markers_of(doc, &index, selection_id)
            .into_iter()
            .find(|(_, marker)| marker.name == name)
    });
    let (path, variable) = match marker {
        Some((path, marker)) => (path, Some(marker.name)),
        None => (chip, None),
    };

    doc.select_edge(&path, Edge::End).ok()?;
    doc.focus();
    Some(ComposerEvent::FocusMoved {
        selection_id,
        variable,
        path,
    })
}
