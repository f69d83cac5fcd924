//! Tree contract and the in-memory document.

use tracing::debug;

use crate::error::{DocumentError, DocumentResult};
use crate::node::{Node, NodeKind};

/// Address of a node: child indices from the root.
pub type TreePath = Vec<usize>;

/// Which end of a node the cursor collapses to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    /// Before the node.
    Start,
    /// After the node.
    End,
}

/// Collapsed cursor position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cursor {
    /// Node the cursor sits next to.
    pub path: TreePath,
    /// Side of the node.
    pub edge: Edge,
}

/// Operations the composer needs from the hosting editor.
pub trait DocumentTree {
    /// Returns the top-level nodes in document order.
    fn top_level(&self) -> &[Node];

    /// Returns every node of `kind` with its path, in document order.
    fn nodes_of_kind(&self, kind: NodeKind) -> Vec<(TreePath, &Node)>;

    /// Returns the node at `path`.
    fn node(&self, path: &[usize]) -> Option<&Node>;

    /// Returns the node at `path` for attribute updates.
    fn node_mut(&mut self, path: &[usize]) -> Option<&mut Node>;

    /// Inserts `nodes` so the first lands at `path`.
    ///
    /// # Errors
    ///
    /// Fails when the parent does not exist, is not a container, or the
    /// index is past the end of its children.
    fn insert_nodes(&mut self, path: &[usize], nodes: Vec<Node>) -> DocumentResult<()>;

    /// Removes and returns the node at `path`.
    ///
    /// # Errors
    ///
    /// Fails when `path` does not address a node.
    fn remove_node(&mut self, path: &[usize]) -> DocumentResult<Node>;

    /// Collapses the cursor to one edge of the node at `path`.
    ///
    /// # Errors
    ///
    /// Fails when `path` does not address a node.
    fn select_edge(&mut self, path: &[usize], edge: Edge) -> DocumentResult<()>;

    /// Moves keyboard focus into the editor.
    fn focus(&mut self);

    /// Removes every node.
    fn clear(&mut self);
}

/// In-memory document tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    root: Vec<Node>,
    cursor: Option<Cursor>,
    focused: bool,
}

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a document from top-level nodes.
    #[must_use]
    pub fn from_nodes(nodes: Vec<Node>) -> Self {
        Self {
            root: nodes,
            ..Self::default()
        }
    }

    /// Creates a single-paragraph document holding `text`.
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::from_nodes(vec![Node::paragraph(vec![Node::text(text)])])
    }

    /// Returns the current cursor.
    #[must_use]
    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    /// Returns `true` once [`DocumentTree::focus`] has been called.
    #[must_use]
    pub const fn is_focused(&self) -> bool {
        self.focused
    }

    fn children_at_mut(&mut self, parent: &[usize]) -> DocumentResult<&mut Vec<Node>> {
        if parent.is_empty() {
            return Ok(&mut self.root);
        }
        let node = self
            .node_mut(parent)
            .ok_or_else(|| DocumentError::InvalidPath {
                path: parent.to_vec(),
            })?;
        node.children_mut().ok_or_else(|| DocumentError::NotAContainer {
            path: parent.to_vec(),
        })
    }
}

fn collect_kind<'a>(
    nodes: &'a [Node],
    kind: NodeKind,
    prefix: &mut TreePath,
    out: &mut Vec<(TreePath, &'a Node)>,
) {
    for (index, node) in nodes.iter().enumerate() {
        prefix.push(index);
        if node.kind() == kind {
            out.push((prefix.clone(), node));
        }
        if let Some(children) = node.children() {
            collect_kind(children, kind, prefix, out);
        }
        prefix.pop();
    }
}

fn split_path(path: &[usize]) -> Option<(&[usize], usize)> {
    let (last, parent) = path.split_last()?;
    Some((parent, *last))
}

impl DocumentTree for Document {
    fn top_level(&self) -> &[Node] {
        &self.root
    }

    fn nodes_of_kind(&self, kind: NodeKind) -> Vec<(TreePath, &Node)> {
        let mut out = Vec::new();
        collect_kind(&self.root, kind, &mut Vec::new(), &mut out);
        out
    }

    fn node(&self, path: &[usize]) -> Option<&Node> {
        let (first, rest) = path.split_first()?;
        let mut node = self.root.get(*first)?;
        for index in rest {
            node = node.children()?.get(*index)?;
        }
        Some(node)
    }

    fn node_mut(&mut self, path: &[usize]) -> Option<&mut Node> {
        let (first, rest) = path.split_first()?;
        let mut node = self.root.get_mut(*first)?;
        for index in rest {
            node = node.children_mut()?.get_mut(*index)?;
        }
        Some(node)
    }

    fn insert_nodes(&mut self, path: &[usize], nodes: Vec<Node>) -> DocumentResult<()> {
        let (parent, index) = split_path(path).ok_or_else(|| DocumentError::InvalidPath {
            path: path.to_vec(),
        })?;
        let children = self.children_at_mut(parent)?;
        if index > children.len() {
            return Err(DocumentError::InvalidPath {
                path: path.to_vec(),
            });
        }
        let count = nodes.len();
        children.splice(index..index, nodes);
        debug!(?path, count, "document nodes inserted");
        Ok(())
    }

    fn remove_node(&mut self, path: &[usize]) -> DocumentResult<Node> {
        let invalid = || DocumentError::InvalidPath {
            path: path.to_vec(),
        };
        let (parent, index) = split_path(path).ok_or_else(invalid)?;
        let children = self.children_at_mut(parent).map_err(|_| invalid())?;
        if index >= children.len() {
            return Err(invalid());
        }
        let removed = children.remove(index);
        if self
            .cursor
            .as_ref()
            .is_some_and(|cursor| cursor.path.starts_with(path))
        {
            self.cursor = None;
        }
        Ok(removed)
    }

    fn select_edge(&mut self, path: &[usize], edge: Edge) -> DocumentResult<()> {
        if self.node(path).is_none() {
            return Err(DocumentError::InvalidPath {
                path: path.to_vec(),
            });
        }
        self.cursor = Some(Cursor {
            path: path.to_vec(),
            edge,
        });
        Ok(())
    }

    fn focus(&mut self) {
        self.focused = true;
    }

    fn clear(&mut self) {
        self.root.clear();
        self.cursor = None;
    }
}
