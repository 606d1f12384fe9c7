//! Container scoping: which named region of the document a description
//! belongs to, and where resolution should search for it.

use crate::anchoring::model::{NAMESPACED_ID_PREFIX, STABLE_ID_ATTRIBUTE};
use crate::dom::{DocTree, NodeId};

/// Metadata key naming the document's own container id.
pub const ROOT_CONTAINER_META: &str = "root-container";

/// Element tags that may act as sub-containers when they carry a stable id.
const CONTAINER_TAGS: [&str; 2] = ["object", "figure"];

/// The container id of the document as a whole, from document metadata.
pub fn root_container_id(tree: &DocTree) -> Option<String> {
    tree.meta(ROOT_CONTAINER_META).map(str::to_string)
}

/// Whether an element is a valid sub-container: a container tag carrying a
/// stable id.
fn is_container_node(tree: &DocTree, node: NodeId) -> bool {
    tree.tag(node)
        .map(|tag| CONTAINER_TAGS.contains(&tag))
        .unwrap_or(false)
        && tree.attr(node, STABLE_ID_ATTRIBUTE).is_some()
}

/// The node a given container id names, beneath `root`. Namespaced ids are
/// matched against the stable-id attribute, anything else against `id`.
/// When the match is not a recognized container element we warn but return
/// it anyway, since old data may reference regions we no longer mark.
pub fn get_container_node(tree: &DocTree, root: NodeId, container_id: &str) -> Option<NodeId> {
    let matches = if container_id.contains(NAMESPACED_ID_PREFIX) {
        tree.find_by_attr(root, STABLE_ID_ATTRIBUTE, |v| v == container_id)
    } else {
        tree.find_by_attr(root, "id", |v| v == container_id)
    };

    if matches.len() > 1 {
        tracing::warn!(container_id, "several matches for container, using first");
    }
    let found = *matches.first()?;
    if !is_container_node(tree, found) {
        tracing::warn!(container_id, "container id names an unexpected element");
    }
    Some(found)
}

/// The node resolution should search within: the named container when one
/// is given and differs from the document's root container, else the tree
/// root.
pub fn scoped_container_node(
    tree: &DocTree,
    container_id: Option<&str>,
    root_id: Option<&str>,
) -> Option<NodeId> {
    let root = tree.root();
    let Some(container_id) = container_id else {
        return Some(root);
    };
    if root_id == Some(container_id) {
        return Some(root);
    }
    get_container_node(tree, root, container_id)
}

/// The container id to record for a node: the stable id of the nearest
/// enclosing sub-container, else the document's root container id.
pub fn container_id_for_node(tree: &DocTree, node: NodeId) -> Option<String> {
    let mut cursor = Some(node);
    while let Some(current) = cursor {
        if is_container_node(tree, current) {
            return tree.attr(current, STABLE_ID_ATTRIBUTE).map(str::to_string);
        }
        cursor = tree.parent(current);
    }
    root_container_id(tree)
}
