//! The locator codec: encoding a resolved point as a reference element
//! plus a child-index path, and replaying that path against the live tree.
//!
//! Resolution happens in a purified snapshot, but callers need positions
//! in the live tree, which still contains synthetic decorations and
//! split text runs. Replay walks the recorded indices while skipping
//! synthetics and treating adjacent text runs as one node, distributing a
//! recorded char offset across the coalesced run.

use crate::anchoring::model::{ElementPointer, Locator, LocatorEdge, Role};
use crate::anchoring::purify::{
    is_synthetic_decoration, reference_node_for_node, NON_ANCHORABLE_ATTRIBUTE,
};
use crate::anchoring::resolve::{locate_element_pointer, PointMatch};
use crate::dom::{chars, DocTree, DomSpan, NodeId};

/// Encode a resolved point as a replayable edge: climb to the nearest
/// non-text anchorable node, record the child-index path back down,
/// deepest index first.
pub fn to_reference_edge(tree: &DocTree, point: &PointMatch) -> Option<LocatorEdge> {
    let mut reference = reference_node_for_node(tree, point.node, true);
    while let Some(node) = reference {
        if !tree.is_text(node) {
            break;
        }
        reference = reference_node_for_node(tree, tree.parent(node)?, true);
    }
    let Some(reference) = reference else {
        tracing::warn!("could not locate a valid reference ancestor for locator");
        return None;
    };

    let pointer = ElementPointer::for_node(tree, reference, Role::Ancestor)?;

    let offset = match point.offset {
        Some(o) if o < 0 => {
            tracing::warn!(offset = o, "resolved point sits before its text node");
            return None;
        }
        Some(o) => Some(o as usize),
        None => None,
    };

    let mut path = Vec::new();
    let mut node = point.node;
    while node != reference {
        path.push(tree.index_in_parent(node)?);
        node = tree.parent(node)?;
    }

    Some(LocatorEdge {
        reference: pointer,
        path,
        offset,
    })
}

/// Replay an edge against the live tree: re-resolve the reference element,
/// then walk the recorded path topmost index first.
pub fn decode_edge(tree: &DocTree, edge: &LocatorEdge) -> Option<(NodeId, Option<usize>)> {
    let reference = locate_element_pointer(tree, tree.root(), &edge.reference)?.node;

    if edge.path.is_empty() {
        return Some((reference, None));
    }

    let mut container = reference;
    let mut parts = edge.path.clone();
    while parts.len() > 1 {
        let part = parts.pop()?;
        let (found, _) = ith_child_accounting_for_synthetics(tree, container, part, None)?;
        container = found;
    }
    let last = parts.pop()?;
    ith_child_accounting_for_synthetics(tree, container, last, edge.offset)
}

/// The `idx`-th child of `node` as counted with synthetics removed and
/// adjacent text runs coalesced. A char offset is resolved across the
/// coalesced run it lands in; for an element child the offset is a child
/// index one level further down.
fn ith_child_accounting_for_synthetics(
    tree: &DocTree,
    node: NodeId,
    idx: usize,
    offset: Option<usize>,
) -> Option<(NodeId, Option<usize>)> {
    let children = children_if_synthetics_removed(tree, node);
    if idx >= children.len() {
        return None;
    }

    let mut i = 0;
    let mut adjusted = 0;
    let mut child = None;
    while i < children.len() {
        child = Some(children[i]);
        if adjusted == idx {
            break;
        }
        // A text run counts once however many adjacent pieces it has.
        if tree.is_text(children[i]) {
            while i + 1 < children.len() && tree.is_text(children[i + 1]) {
                i += 1;
            }
        }
        i += 1;
        adjusted += 1;
    }
    let child = child?;
    if adjusted != idx {
        return None;
    }

    let Some(mut offset) = offset else {
        return Some((child, None));
    };

    if !tree.is_text(child) {
        return ith_child_accounting_for_synthetics(tree, child, offset, None);
    }

    // Offsets were recorded against normalized text, so spend the offset
    // across the adjacent live pieces of the run.
    while i < children.len() {
        let piece = children[i];
        if !tree.is_text(piece) {
            break;
        }
        // A boundary may sit at the very end, equal to the length.
        let limit = chars::len(tree.text(piece).unwrap_or_default());
        if offset <= limit {
            return Some((piece, Some(offset)));
        }
        offset -= limit;
        i += 1;
    }

    tracing::warn!("offset overruns the coalesced text run");
    None
}

/// Children of `node` as anchoring sees them: synthetic decorations are
/// dropped with their content, non-anchorable wrappers contribute their
/// own children in place.
fn children_if_synthetics_removed(tree: &DocTree, node: NodeId) -> Vec<NodeId> {
    if is_synthetic_decoration(tree, node) {
        return Vec::new();
    }
    let mut sanitized = Vec::new();
    for &child in tree.children(node) {
        if is_synthetic_decoration(tree, child) {
            continue;
        }
        if tree.attr(child, NON_ANCHORABLE_ATTRIBUTE).is_some() {
            sanitized.extend(children_if_synthetics_removed(tree, child));
        } else {
            sanitized.push(child);
        }
    }
    sanitized
}

/// Replay both edges of a locator and assemble the live span.
pub fn convert_locator_to_span(tree: &DocTree, locator: &Locator) -> Option<DomSpan> {
    let (start_node, start_offset) = decode_edge(tree, &locator.start)?;
    let (end_node, end_offset) = decode_edge(tree, &locator.end)?;

    let mut span = DomSpan::collapsed_at(start_node);
    match start_offset {
        Some(offset) => span.set_start(start_node, offset),
        None => span.set_start_before(tree, start_node),
    }
    match end_offset {
        Some(offset) => span.set_end(end_node, offset),
        None => span.set_end_after(tree, end_node),
    }
    Some(span)
}
