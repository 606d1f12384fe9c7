use crate::dom::tree::{DocTree, NodeId};

/// Forward/backward walker over the text nodes beneath a scope node, in
/// document order.
///
/// Mirrors a DOM `TreeWalker` with `SHOW_TEXT`: the cursor can sit on any
/// node (it starts on the scope root), but `next`/`prev` only ever land on
/// text nodes. With `skip_blank` set, whitespace-only text nodes are
/// stepped over, matching the whitespace filter the anchoring engine uses
/// everywhere it walks text.
#[derive(Debug)]
pub struct TextWalker<'t> {
    tree: &'t DocTree,
    scope: NodeId,
    current: NodeId,
    skip_blank: bool,
}

impl<'t> TextWalker<'t> {
    pub fn new(tree: &'t DocTree, scope: NodeId, skip_blank: bool) -> Self {
        TextWalker {
            tree,
            scope,
            current: scope,
            skip_blank,
        }
    }

    pub fn current(&self) -> NodeId {
        self.current
    }

    /// Reposition the cursor; subsequent steps continue from `node`.
    pub fn set_current(&mut self, node: NodeId) {
        self.current = node;
    }

    fn accepts(&self, node: NodeId) -> bool {
        match self.tree.text(node) {
            Some(text) => !(self.skip_blank && text.trim().is_empty()),
            None => false,
        }
    }

    /// Advance to the next accepted text node, or return `None` and leave
    /// the cursor in place.
    pub fn next(&mut self) -> Option<NodeId> {
        let mut cursor = self.current;
        while let Some(node) = self.tree.next_in_order(self.scope, cursor) {
            if self.accepts(node) {
                self.current = node;
                return Some(node);
            }
            cursor = node;
        }
        None
    }

    /// Step back to the previous accepted text node, or return `None` and
    /// leave the cursor in place.
    pub fn prev(&mut self) -> Option<NodeId> {
        let mut cursor = self.current;
        while let Some(node) = self.tree.prev_in_order(self.scope, cursor) {
            if self.accepts(node) {
                self.current = node;
                return Some(node);
            }
            if node == self.scope {
                break;
            }
            cursor = node;
        }
        None
    }
}
