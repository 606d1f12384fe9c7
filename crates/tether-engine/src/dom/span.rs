use std::cmp::Ordering;

use crate::dom::chars;
use crate::dom::tree::{DocTree, NodeId};

/// One edge of a span: a container node plus an offset.
///
/// For a text container the offset is a char offset into its content; for an
/// element container it is a child index, exactly like a DOM `Range`
/// boundary point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub node: NodeId,
    pub offset: usize,
}

/// A contiguous region of a [`DocTree`], equivalent to a DOM `Range`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomSpan {
    pub start: Boundary,
    pub end: Boundary,
}

impl DomSpan {
    pub fn new(start: Boundary, end: Boundary) -> Self {
        DomSpan { start, end }
    }

    /// A collapsed span at the start of `node`.
    pub fn collapsed_at(node: NodeId) -> Self {
        let edge = Boundary { node, offset: 0 };
        DomSpan {
            start: edge,
            end: edge,
        }
    }

    /// Span covering `node` itself (boundaries in its parent, or covering
    /// its contents when it has no parent).
    pub fn select_node(tree: &DocTree, node: NodeId) -> Self {
        match (tree.parent(node), tree.index_in_parent(node)) {
            (Some(parent), Some(idx)) => DomSpan {
                start: Boundary {
                    node: parent,
                    offset: idx,
                },
                end: Boundary {
                    node: parent,
                    offset: idx + 1,
                },
            },
            _ => Self::select_node_contents(tree, node),
        }
    }

    /// Span covering everything inside `node`.
    pub fn select_node_contents(tree: &DocTree, node: NodeId) -> Self {
        DomSpan {
            start: Boundary { node, offset: 0 },
            end: Boundary {
                node,
                offset: node_length(tree, node),
            },
        }
    }

    pub fn set_start(&mut self, node: NodeId, offset: usize) {
        self.start = Boundary { node, offset };
    }

    pub fn set_end(&mut self, node: NodeId, offset: usize) {
        self.end = Boundary { node, offset };
    }

    pub fn set_start_before(&mut self, tree: &DocTree, node: NodeId) {
        if let (Some(parent), Some(idx)) = (tree.parent(node), tree.index_in_parent(node)) {
            self.start = Boundary {
                node: parent,
                offset: idx,
            };
        }
    }

    pub fn set_start_after(&mut self, tree: &DocTree, node: NodeId) {
        if let (Some(parent), Some(idx)) = (tree.parent(node), tree.index_in_parent(node)) {
            self.start = Boundary {
                node: parent,
                offset: idx + 1,
            };
        }
    }

    pub fn set_end_before(&mut self, tree: &DocTree, node: NodeId) {
        if let (Some(parent), Some(idx)) = (tree.parent(node), tree.index_in_parent(node)) {
            self.end = Boundary {
                node: parent,
                offset: idx,
            };
        }
    }

    pub fn set_end_after(&mut self, tree: &DocTree, node: NodeId) {
        if let (Some(parent), Some(idx)) = (tree.parent(node), tree.index_in_parent(node)) {
            self.end = Boundary {
                node: parent,
                offset: idx + 1,
            };
        }
    }

    pub fn is_collapsed(&self, tree: &DocTree) -> bool {
        compare_boundaries(tree, self.start, self.end) != Ordering::Less
    }

    /// Deepest node containing both boundaries.
    pub fn common_ancestor(&self, tree: &DocTree) -> NodeId {
        let mut chain = Vec::new();
        let mut cursor = Some(self.start.node);
        while let Some(node) = cursor {
            chain.push(node);
            cursor = tree.parent(node);
        }
        let mut candidate = self.end.node;
        loop {
            if chain.contains(&candidate) {
                return candidate;
            }
            match tree.parent(candidate) {
                Some(parent) => candidate = parent,
                None => return *chain.last().expect("chain contains start node"),
            }
        }
    }

    /// The text covered by the span, like stringifying a DOM range.
    pub fn text(&self, tree: &DocTree) -> String {
        let scope = self.common_ancestor(tree);
        let mut out = String::new();
        let mut nodes = vec![scope];
        nodes.extend(tree.descendants(scope));
        for node in nodes {
            if !tree.is_text(node) {
                continue;
            }
            let content = tree.text(node).unwrap_or_default();
            let length = chars::len(content);
            // Skip text entirely before the start, stop past the end.
            if compare_boundaries(tree, Boundary { node, offset: length }, self.start)
                != Ordering::Greater
            {
                continue;
            }
            if compare_boundaries(tree, Boundary { node, offset: 0 }, self.end)
                != Ordering::Less
            {
                break;
            }
            let lo = if node == self.start.node {
                self.start.offset.min(length)
            } else {
                0
            };
            let hi = if node == self.end.node {
                self.end.offset.min(length)
            } else {
                length
            };
            if lo < hi {
                out.push_str(chars::slice(content, lo, hi));
            }
        }
        out
    }
}

/// Range length of a container: char count for text, child count for
/// elements.
pub fn node_length(tree: &DocTree, node: NodeId) -> usize {
    match tree.text(node) {
        Some(text) => chars::len(text),
        None => tree.children(node).len(),
    }
}

/// Document-order comparison of two boundary points.
pub fn compare_boundaries(tree: &DocTree, a: Boundary, b: Boundary) -> Ordering {
    if a.node == b.node {
        return a.offset.cmp(&b.offset);
    }
    boundary_path(tree, a).cmp(&boundary_path(tree, b))
}

/// Root-relative child-index path of a boundary, with the offset as the
/// final component. Lexicographic order over these paths is document order.
fn boundary_path(tree: &DocTree, boundary: Boundary) -> Vec<usize> {
    let mut path = Vec::new();
    let mut cursor = boundary.node;
    while let Some(idx) = tree.index_in_parent(cursor) {
        path.push(idx);
        cursor = tree.parent(cursor).expect("indexed node has a parent");
    }
    path.reverse();
    path.push(boundary.offset);
    path
}
