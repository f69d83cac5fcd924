//! Conversion between document trees and plain text.

use composer_document::{DocumentTree, Node, VariableMarker};
use composer_templates::{
    TemplateSelectionInstance, ToolContext, ToolFallback, effective_value, is_empty_value,
    render_value, scan_placeholders, token,
};

use crate::index::{SelectionIndex, instance_at};

/// Renders one marker the way it reads in the sent message.
///
/// Resolved values are rendered by variable type. Unset values, unknown
/// names, and orphaned markers render as a literal `{{name}}`.
#[must_use]
pub fn render_marker<D>(
    doc: &D,
    index: &SelectionIndex,
    marker: &VariableMarker,
    fallback: ToolFallback,
) -> String
where
    D: DocumentTree + ?Sized,
{
    index
        .resolve_marker(marker)
        .and_then(|entry| instance_at(doc, &entry.path))
        .and_then(|instance| resolved_text(instance, &marker.name, fallback))
        .unwrap_or_else(|| token(&marker.name))
}

fn resolved_text(
    instance: &TemplateSelectionInstance,
    name: &str,
    fallback: ToolFallback,
) -> Option<String> {
    let effective = instance.effective();
    let var = effective.variable(name)?;
    let tools = ToolContext::new(effective.pre_processors(), instance.tool_states())
        .with_fallback(fallback);
    let value = effective_value(var, instance.variables(), Some(tools))
        .filter(|v| !is_empty_value(v))?;
    Some(render_value(var.var_type, &value))
}

/// Flattens the document into the text sent to the chat backend.
///
/// Selection chips contribute nothing, markers contribute their rendered
/// value, and paragraphs are joined with `separator`. Inline nodes sitting
/// directly at the top level form a paragraph of their own.
#[must_use]
pub fn to_plain_text_replacing_variables<D>(
    doc: &D,
    fallback: ToolFallback,
    separator: &str,
) -> String
where
    D: DocumentTree + ?Sized,
{
    let index = SelectionIndex::scan(doc);
    let mut paragraphs: Vec<String> = Vec::new();
    let mut loose: Option<String> = None;

    for node in doc.top_level() {
        if let Node::Paragraph(children) = node {
            paragraphs.extend(loose.take());
            let mut text = String::new();
            for child in children {
                render_inline(doc, &index, child, fallback, &mut text);
            }
            paragraphs.push(text);
        } else {
            let out = loose.get_or_insert_with(String::new);
            render_inline(doc, &index, node, fallback, out);
        }
    }
    paragraphs.extend(loose);

    paragraphs.join(separator)
}

fn render_inline<D>(
    doc: &D,
    index: &SelectionIndex,
    node: &Node,
    fallback: ToolFallback,
    out: &mut String,
)
where
    D: DocumentTree + ?Sized,
{
    match node {
        Node::Text(text) => out.push_str(text),
        Node::Variable(marker) => out.push_str(&render_marker(doc, index, marker, fallback)),
        Node::Selection(_) => {}
        Node::Paragraph(children) => {
            for child in children {
                render_inline(doc, index, child, fallback, out);
            }
        }
    }
}

/// Splits template text into inline nodes.
///
/// Exact `{{name}}` tokens naming a variable of the instance's effective
/// schema become markers owned by the instance. Everything else stays
/// literal text, including unknown names and tokens with padding inside the
/// braces, since an unset marker always flattens back to `{{name}}`.
#[must_use]
pub fn build_user_inline_children_from_text(
    instance: &TemplateSelectionInstance,
    text: &str,
) -> Vec<Node> {
    let effective = instance.effective();
    let mut nodes = Vec::new();
    let mut pending = String::new();
    let mut last = 0;

    for placeholder in scan_placeholders(text) {
        let exact = text[placeholder.range.clone()] == token(&placeholder.name);
        if !exact || effective.variable(&placeholder.name).is_none() {
            continue;
        }
        pending.push_str(&text[last..placeholder.range.start]);
        if !pending.is_empty() {
            nodes.push(Node::Text(std::mem::take(&mut pending)));
        }
        let marker = VariableMarker::for_instance(instance, placeholder.name);
        nodes.push(Node::Variable(marker));
        last = placeholder.range.end;
    }

    pending.push_str(&text[last..]);
    if !pending.is_empty() {
        nodes.push(Node::Text(pending));
    }
    nodes
}
