//! Purification: producing a canonical, de-noised snapshot of a subtree and
//! carrying a live span's edges into it.
//!
//! Boundary positions survive the cloning by splicing sentinel tokens into
//! the live tree (text nodes) or marker attributes (elements), snapshotting
//! the minimal anchorable ancestor, then immediately undoing the live tags.
//! The live tree is never observably different after a purification call
//! than before it.

use std::sync::OnceLock;

use regex::Regex;

use crate::anchoring::model::{Role, STABLE_ID_ATTRIBUTE};
use crate::dom::{chars, DocTree, DomSpan, NodeId};
use crate::error::{AnchorError, Result};

/// Marks an element whose own content must never anchor anything; its
/// children are re-parented into its place in canonical snapshots.
pub const NON_ANCHORABLE_ATTRIBUTE: &str = "data-non-anchorable";

/// Marks an element beneath which nothing qualifies as an anchor point.
pub const NO_ANCHORS_WITHIN_ATTRIBUTE: &str = "data-no-anchors-within";

/// Attribute/token stem used to tag boundary nodes during purification.
pub const PURIFICATION_TAG: &str = "data-purification-tag";

/// Decorative wrapper classes that are stripped from canonical snapshots
/// together with their content.
const SYNTHETIC_SPAN_CLASSES: [&[&str]; 3] = [
    &["highlight-overlay", "counter"],
    &["redaction-inline"],
    &["redaction-block"],
];

/// Id substrings of framework-generated elements that must never anchor.
const REJECTED_ID_FRAGMENTS: [&str; 2] = ["MathJax", "ext-gen"];

/// True when a node is flagged to be invisible to anchoring, either for
/// itself or for everything beneath it.
pub fn is_node_ignored(tree: &DocTree, node: NodeId) -> bool {
    tree.attr(node, NON_ANCHORABLE_ATTRIBUTE).is_some()
        || tree.attr(node, NO_ANCHORS_WITHIN_ATTRIBUTE).is_some()
}

fn unsafe_anchor_id() -> &'static Regex {
    static UNSAFE_ANCHOR_ID: OnceLock<Regex> = OnceLock::new();
    UNSAFE_ANCHOR_ID.get_or_init(|| Regex::new("^a[0-9]*$").expect("invalid unsafe-id regex"))
}

/// Whether a node qualifies as an anchor point: a non-empty text node, or
/// an element with a stable id (or a trustworthy generic id), outside any
/// `data-no-anchors-within` subtree.
pub fn is_node_anchorable(tree: &DocTree, node: NodeId, allow_unsafe: bool) -> bool {
    fn is_node_itself_anchorable(tree: &DocTree, node: NodeId, allow_unsafe: bool) -> bool {
        if tree.attr(node, NON_ANCHORABLE_ATTRIBUTE).is_some() {
            return false;
        }

        // Most common case is text.
        if let Some(text) = tree.text(node) {
            return !text.trim().is_empty();
        }

        if tree.attr(node, STABLE_ID_ATTRIBUTE).is_some() {
            return true;
        }

        let Some(id) = tree.attr(node, "id") else {
            return false;
        };
        if REJECTED_ID_FRAGMENTS.iter().any(|frag| id.contains(frag)) {
            return false;
        }
        // Short auto-incrementing anchors are not reliable across renders.
        if !allow_unsafe && unsafe_anchor_id().is_match(id) {
            return false;
        }
        true
    }

    if !is_node_itself_anchorable(tree, node, allow_unsafe) {
        return false;
    }
    let mut cursor = tree.parent(node);
    while let Some(ancestor) = cursor {
        if tree.attr(ancestor, NO_ANCHORS_WITHIN_ATTRIBUTE).is_some() {
            return false;
        }
        cursor = tree.parent(ancestor);
    }
    true
}

/// Nearest anchorable node in the parent chain, starting at `node` itself.
pub fn reference_node_for_node(
    tree: &DocTree,
    node: NodeId,
    allow_unsafe: bool,
) -> Option<NodeId> {
    let mut cursor = Some(node);
    while let Some(current) = cursor {
        if is_node_anchorable(tree, current, allow_unsafe) {
            return Some(current);
        }
        cursor = tree.parent(current);
    }
    None
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::Start => "start",
        Role::End => "end",
        Role::Ancestor => "ancestor",
    }
}

fn purification_token(role: Role) -> String {
    format!("[{}:{}]", PURIFICATION_TAG, role_name(role))
}

fn marker_attribute(role: Role) -> String {
    format!("{}-{}", PURIFICATION_TAG, role_name(role))
}

/// Tag a boundary node in place: splice the sentinel token into text
/// content at `text_offset`, or set a marker attribute on an element.
pub fn tag_boundary(tree: &mut DocTree, node: NodeId, role: Role, text_offset: usize) {
    if let Some(text) = tree.text(node) {
        let at = text_offset.min(chars::len(text));
        let tagged = format!(
            "{}{}{}",
            chars::slice(text, 0, at),
            purification_token(role),
            chars::slice_from(text, at)
        );
        tree.set_text(node, &tagged);
    } else {
        tree.set_attr(node, &marker_attribute(role), "true");
    }
}

/// Undo a boundary tag, reporting the char offset the token sat at for
/// text nodes.
pub fn untag_boundary(tree: &mut DocTree, node: NodeId, role: Role) -> Option<usize> {
    if let Some(text) = tree.text(node) {
        let token = purification_token(role);
        let offset = chars::index_of(text, &token)?;
        let cleaned = text.replacen(&token, "", 1);
        tree.set_text(node, &cleaned);
        Some(offset)
    } else {
        tree.remove_attr(node, &marker_attribute(role));
        None
    }
}

/// Find the node carrying a boundary tag, searching `root` and its subtree
/// in document order.
pub fn find_tagged_boundary(tree: &DocTree, root: NodeId, role: Role) -> Option<NodeId> {
    let token = purification_token(role);
    let attribute = marker_attribute(role);
    let mut cursor = Some(root);
    while let Some(node) = cursor {
        match tree.text(node) {
            Some(text) if text.contains(&token) => return Some(node),
            None if tree.attr(node, &attribute).is_some() => return Some(node),
            _ => {}
        }
        cursor = tree.next_in_order(root, node);
    }
    None
}

/// Is this element a decorative wrapper that must vanish from canonical
/// snapshots, content included?
pub(crate) fn is_synthetic_decoration(tree: &DocTree, node: NodeId) -> bool {
    if tree.tag(node) != Some("span") {
        return false;
    }
    SYNTHETIC_SPAN_CLASSES
        .iter()
        .any(|classes| classes.iter().all(|c| tree.has_class(node, c)))
}

/// Canonicalize a snapshot in place: drop synthetic decorations wholesale,
/// splice children of non-anchorable wrappers into their parents, then
/// coalesce adjacent text runs.
pub fn purify_node(tree: &mut DocTree, root: NodeId) {
    let synthetic: Vec<NodeId> = tree
        .descendants(root)
        .into_iter()
        .filter(|&n| is_synthetic_decoration(tree, n))
        .collect();
    for node in synthetic {
        tree.detach(node);
    }

    let wrappers: Vec<NodeId> = tree
        .descendants(root)
        .into_iter()
        .filter(|&n| tree.attr(n, NON_ANCHORABLE_ATTRIBUTE).is_some())
        .collect();
    for wrapper in wrappers {
        let Some(parent) = tree.parent(wrapper) else {
            continue;
        };
        for child in tree.children(wrapper).to_vec() {
            tree.insert_before(parent, child, wrapper);
        }
        tree.detach(wrapper);
    }

    tree.normalize(root);
}

/// A span carried into its canonical snapshot tree.
#[derive(Debug, Clone, PartialEq)]
pub struct PurifiedSpan {
    pub tree: DocTree,
    pub span: DomSpan,
}

/// Clone the span's nearest anchorable ancestor into a purified snapshot
/// and rebuild the span inside it.
///
/// The live tree is tagged only between the two `tag_boundary` calls and
/// the matching `untag_boundary` calls below; nothing in between can fail,
/// so the live tree always comes back unchanged.
pub fn purify_span(tree: &mut DocTree, span: &DomSpan) -> Result<PurifiedSpan> {
    use crate::anchoring::context::node_that_is_edge_of_span;

    let start_edge = node_that_is_edge_of_span(tree, span, true);
    let end_edge = node_that_is_edge_of_span(tree, span, false);

    let mut ancestor = Some(span.common_ancestor(tree));
    while let Some(node) = ancestor {
        if is_node_anchorable(tree, node, false) && !tree.is_text(node) {
            break;
        }
        ancestor = tree.parent(node);
    }
    let ancestor = ancestor.ok_or(AnchorError::NoAnchorableAncestor)?;

    let start_offset = if start_edge == span.start.node {
        span.start.offset
    } else {
        0
    };
    let end_offset = if end_edge == span.end.node {
        span.end.offset
    } else {
        chars::len(&tree.text_content(end_edge))
    };
    // If both edges share one text node, the start token insertion shifts
    // the end offset by the token's length.
    let end_offset = if start_edge == end_edge {
        end_offset + chars::len(&purification_token(Role::Start))
    } else {
        end_offset
    };

    tag_boundary(tree, start_edge, Role::Start, start_offset);
    tag_boundary(tree, end_edge, Role::End, end_offset);
    let mut snapshot = tree.snapshot_subtree(ancestor);
    untag_boundary(tree, start_edge, Role::Start);
    untag_boundary(tree, end_edge, Role::End);

    let snapshot_root = snapshot.root();
    purify_node(&mut snapshot, snapshot_root);

    let start_tagged = find_tagged_boundary(&snapshot, snapshot.root(), Role::Start);
    let end_tagged = find_tagged_boundary(&snapshot, snapshot.root(), Role::End);
    let start_at = start_tagged.and_then(|n| untag_boundary(&mut snapshot, n, Role::Start));
    let end_at = end_tagged.and_then(|n| untag_boundary(&mut snapshot, n, Role::End));

    let root = snapshot.root();
    let mut result = DomSpan::select_node_contents(&snapshot, root);
    match (start_tagged, end_tagged) {
        (None, Some(end)) if !snapshot.is_text(end) => {
            result = DomSpan::select_node_contents(&snapshot, end);
        }
        (start, end) => {
            if let Some(start) = start {
                if snapshot.is_text(start) {
                    result.set_start(start, start_at.unwrap_or(0));
                } else {
                    result.set_start_before(&snapshot, start);
                }
            }
            if let Some(end) = end {
                if snapshot.is_text(end) {
                    result.set_end(end, end_at.unwrap_or(0));
                } else {
                    result.set_end_after(&snapshot, end);
                }
            }
        }
    }

    Ok(PurifiedSpan {
        tree: snapshot,
        span: result,
    })
}
