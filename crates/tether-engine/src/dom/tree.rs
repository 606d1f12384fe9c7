use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a single tree instance.
///
/// Cached locators are only replayable against the exact tree they were
/// computed from, so every [`DocTree`] gets a fresh id, including snapshot
/// trees produced by [`DocTree::snapshot_subtree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(Uuid);

impl DocumentId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Index of a node in its tree's arena. Only meaningful together with the
/// `DocTree` that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeKind {
    Element {
        tag: String,
        attrs: BTreeMap<String, String>,
    },
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An in-memory document tree with DOM-like navigation and mutation.
///
/// This is the narrow seam between the anchoring engine and whatever host
/// actually renders the document: elements with attributes, text nodes, and
/// the handful of operations the engine needs (navigation, cloning,
/// text-run normalization, metadata lookup). Nodes are arena entries
/// addressed by [`NodeId`]; detached nodes stay in the arena but become
/// unreachable from the root.
#[derive(Debug, Clone, PartialEq)]
pub struct DocTree {
    nodes: Vec<NodeData>,
    root: NodeId,
    id: DocumentId,
    meta: BTreeMap<String, String>,
}

impl DocTree {
    /// Create a tree holding a single root element.
    pub fn new(root_tag: &str) -> Self {
        let mut tree = DocTree {
            nodes: Vec::new(),
            root: NodeId(0),
            id: DocumentId::generate(),
            meta: BTreeMap::new(),
        };
        let root = tree.new_element(root_tag);
        tree.root = root;
        tree
    }

    pub fn document_id(&self) -> DocumentId {
        self.id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Document-scoped metadata, e.g. the well-known root container id.
    pub fn meta(&self, name: &str) -> Option<&str> {
        self.meta.get(name).map(String::as_str)
    }

    pub fn set_meta(&mut self, name: &str, value: &str) {
        self.meta.insert(name.to_string(), value.to_string());
    }

    // ---- construction ----

    pub fn new_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeKind::Element {
            tag: tag.to_string(),
            attrs: BTreeMap::new(),
        })
    }

    pub fn new_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()))
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Insert `child` into `parent` immediately before `reference`, which
    /// must be a current child of `parent`.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) {
        self.detach(child);
        let idx = self.nodes[parent.0]
            .children
            .iter()
            .position(|&c| c == reference)
            .unwrap_or(self.nodes[parent.0].children.len());
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(idx, child);
    }

    /// Remove a node (and implicitly its subtree) from its parent.
    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent {
            self.nodes[parent.0].children.retain(|&c| c != node);
            self.nodes[node.0].parent = None;
        }
    }

    // ---- classification and content ----

    pub fn is_text(&self, node: NodeId) -> bool {
        matches!(self.nodes[node.0].kind, NodeKind::Text(_))
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(self.nodes[node.0].kind, NodeKind::Element { .. })
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Element { tag, .. } => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Text(text) => Some(text),
            NodeKind::Element { .. } => None,
        }
    }

    pub fn set_text(&mut self, node: NodeId, text: &str) {
        if let NodeKind::Text(content) = &mut self.nodes[node.0].kind {
            *content = text.to_string();
        }
    }

    /// Concatenated text of every text node under (and including) `node`.
    pub fn text_content(&self, node: NodeId) -> String {
        match &self.nodes[node.0].kind {
            NodeKind::Text(text) => text.clone(),
            NodeKind::Element { .. } => {
                let mut out = String::new();
                for child in self.children(node) {
                    out.push_str(&self.text_content(*child));
                }
                out
            }
        }
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Element { attrs, .. } => attrs.get(name).map(String::as_str),
            NodeKind::Text(_) => None,
        }
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[node.0].kind {
            attrs.insert(name.to_string(), value.to_string());
        }
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[node.0].kind {
            attrs.remove(name);
        }
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attr(node, "class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    // ---- navigation ----

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].children.first().copied()
    }

    pub fn last_child(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].children.last().copied()
    }

    pub fn prev_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let idx = self.index_in_parent(node)?;
        if idx == 0 {
            None
        } else {
            Some(self.nodes[parent.0].children[idx - 1])
        }
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let idx = self.index_in_parent(node)?;
        self.nodes[parent.0].children.get(idx + 1).copied()
    }

    pub fn index_in_parent(&self, node: NodeId) -> Option<usize> {
        let parent = self.parent(node)?;
        self.nodes[parent.0].children.iter().position(|&c| c == node)
    }

    pub fn is_ancestor_of(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = self.parent(node);
        while let Some(n) = cursor {
            if n == ancestor {
                return true;
            }
            cursor = self.parent(n);
        }
        false
    }

    /// Next node in document order under `scope`, or `None` when the
    /// traversal would leave the scope.
    pub fn next_in_order(&self, scope: NodeId, node: NodeId) -> Option<NodeId> {
        if let Some(child) = self.first_child(node) {
            return Some(child);
        }
        let mut cursor = node;
        loop {
            if cursor == scope {
                return None;
            }
            if let Some(sibling) = self.next_sibling(cursor) {
                return Some(sibling);
            }
            cursor = self.parent(cursor)?;
        }
    }

    /// Previous node in document order under `scope`.
    pub fn prev_in_order(&self, scope: NodeId, node: NodeId) -> Option<NodeId> {
        if node == scope {
            return None;
        }
        match self.prev_sibling(node) {
            Some(sibling) => Some(self.last_descendant_or_self(sibling)),
            None => self.parent(node),
        }
    }

    /// Deepest last descendant, or the node itself if it has no children.
    pub fn last_descendant_or_self(&self, node: NodeId) -> NodeId {
        let mut cursor = node;
        while let Some(last) = self.last_child(cursor) {
            cursor = last;
        }
        cursor
    }

    /// All nodes under `root` in document order, excluding `root` itself.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.next_in_order(root, root);
        while let Some(node) = cursor {
            out.push(node);
            cursor = self.next_in_order(root, node);
        }
        out
    }

    /// Elements under `root` (in document order, `root` excluded) whose
    /// attribute `name` satisfies `accept`.
    pub fn find_by_attr<F>(&self, root: NodeId, name: &str, accept: F) -> Vec<NodeId>
    where
        F: Fn(&str) -> bool,
    {
        self.descendants(root)
            .into_iter()
            .filter(|&n| self.attr(n, name).map(&accept).unwrap_or(false))
            .collect()
    }

    // ---- cloning and normalization ----

    /// Deep-copy the subtree rooted at `node` into an independent tree with
    /// its own [`DocumentId`]. Document metadata is carried over so scope
    /// lookups behave the same against the snapshot.
    pub fn snapshot_subtree(&self, node: NodeId) -> DocTree {
        let mut snapshot = DocTree {
            nodes: Vec::new(),
            root: NodeId(0),
            id: DocumentId::generate(),
            meta: self.meta.clone(),
        };
        let root = self.copy_into(node, &mut snapshot);
        snapshot.root = root;
        snapshot
    }

    fn copy_into(&self, node: NodeId, target: &mut DocTree) -> NodeId {
        let copy = target.push(self.nodes[node.0].kind.clone());
        for &child in self.children(node) {
            let child_copy = self.copy_into(child, target);
            target.append_child(copy, child_copy);
        }
        copy
    }

    /// Coalesce runs of adjacent text children and drop empty text nodes,
    /// recursively, like DOM `Node.normalize()`.
    pub fn normalize(&mut self, node: NodeId) {
        let children: Vec<NodeId> = self.children(node).to_vec();
        let mut run_head: Option<NodeId> = None;
        for child in children {
            if self.is_text(child) {
                let content = self.text(child).unwrap_or_default().to_string();
                if content.is_empty() {
                    self.detach(child);
                    continue;
                }
                match run_head {
                    Some(head) => {
                        let merged = format!("{}{}", self.text(head).unwrap_or_default(), content);
                        self.set_text(head, &merged);
                        self.detach(child);
                    }
                    None => run_head = Some(child),
                }
            } else {
                run_head = None;
                self.normalize(child);
            }
        }
    }

    /// Markup rendering of a subtree, for tests and diagnostics.
    pub fn to_markup(&self, node: NodeId) -> String {
        match &self.nodes[node.0].kind {
            NodeKind::Text(text) => text.clone(),
            NodeKind::Element { tag, attrs } => {
                let mut out = format!("<{tag}");
                for (name, value) in attrs {
                    out.push_str(&format!(" {name}=\"{value}\""));
                }
                out.push('>');
                for child in self.children(node) {
                    out.push_str(&self.to_markup(*child));
                }
                out.push_str(&format!("</{tag}>"));
                out
            }
        }
    }
}
