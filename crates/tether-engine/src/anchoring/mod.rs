//! Edit-resilient anchoring of document spans.
//!
//! A span is described once ([`describe_range`]) as serializable pointers
//! built from stable element ids and fuzzy text contexts, and re-located
//! later ([`resolve_range`]) in a tree that may have been edited, with a
//! confidence score deciding whether a drifted match is still acceptable.
//! Resolution happens against a purified snapshot of the tree and is
//! replayed onto the live one through a cached locator.

pub mod containers;
pub mod context;
pub mod locator;
pub mod model;
pub mod purify;
pub mod resolve;

use crate::dom::{DocTree, DocumentId, DomSpan, NodeId};
use crate::error::{AnchorError, Result};

pub use containers::{container_id_for_node, root_container_id, scoped_container_node};
pub use context::{describe_range, DescribedRange};
pub use model::{
    DomRangeDescription, ElementPointer, Locator, LocatorEdge, Pointer, RangeDescription, Role,
    TextContext, TextPointer, NAMESPACED_ID_PREFIX, STABLE_ID_ATTRIBUTE,
};
pub use purify::{
    is_node_anchorable, purify_node, purify_span, reference_node_for_node, PurifiedSpan,
    NON_ANCHORABLE_ATTRIBUTE, NO_ANCHORS_WITHIN_ATTRIBUTE,
};
pub use resolve::{locate_element_pointer, locate_pointer, locate_text_edge, PointMatch};

/// Matches scoring below this are treated as not found.
pub const CONFIDENCE_CUTOFF: f64 = 0.4;

/// The description's cached locator, provided it was recorded against this
/// exact document instance. A locator from another instance is dumped
/// rather than trusted.
pub fn cached_locator_ensuring_document(
    description: &RangeDescription,
    doc: DocumentId,
) -> Option<Locator> {
    let locator = description.locator()?;
    if locator.doc != doc {
        tracing::debug!("dumping locator recorded against a different document");
        description.attach_locator(None);
        return None;
    }
    Some(locator)
}

/// Resolve both edges of a description inside a purified snapshot and
/// record the result as a locator keyed to the live document.
///
/// `ancestor` is a node of `clean`; `doc` is the live tree's identity. The
/// locator is attached to the description before being returned, so the
/// next resolution of the same description against the same document is a
/// cheap replay.
pub fn resolve_clean_locator(
    description: &DomRangeDescription,
    clean: &DocTree,
    ancestor: NodeId,
    doc: DocumentId,
) -> Option<Locator> {
    let start = locate_pointer(clean, ancestor, &description.start, None)?;
    if start.confidence < CONFIDENCE_CUTOFF {
        tracing::debug!(
            confidence = start.confidence,
            "no start found with an acceptable confidence"
        );
        return None;
    }

    let end = locate_pointer(clean, ancestor, &description.end, Some(&start))?;
    if end.confidence < CONFIDENCE_CUTOFF {
        tracing::debug!(
            confidence = end.confidence,
            "no end found with an acceptable confidence"
        );
        return None;
    }

    tracing::debug!(
        start_confidence = start.confidence,
        end_confidence = end.confidence,
        "matched both edges"
    );

    let locator = Locator {
        start: locator::to_reference_edge(clean, &start)?,
        end: locator::to_reference_edge(clean, &end)?,
        doc,
    };
    description.attach_locator(Some(locator.clone()));
    Some(locator)
}

/// A span exactly covering the description's scoping container.
fn container_span(
    tree: &DocTree,
    container_id: Option<&str>,
    root_id: Option<&str>,
) -> Option<DomSpan> {
    let container = scoped_container_node(tree, container_id, root_id)?;
    Some(DomSpan::select_node(tree, container))
}

/// Resolve a description to a live span, or `None` when no acceptable
/// match survives in the current tree.
///
/// The cached locator short-circuits everything when the description was
/// already resolved against this document instance. Otherwise the tree is
/// snapshotted and purified, the ancestor pointer narrows the search, and
/// both edges are located and replayed onto the live tree.
pub fn resolve_range(
    description: &RangeDescription,
    tree: &DocTree,
    container_id: Option<&str>,
) -> Option<DomSpan> {
    let root_id = root_container_id(tree);

    if let Some(cached) = cached_locator_ensuring_document(description, tree.document_id()) {
        return locator::convert_locator_to_span(tree, &cached);
    }

    let desc = match description {
        RangeDescription::Empty { container_id: own } => {
            let scope = container_id.or(own.as_deref());
            return container_span(tree, scope, root_id.as_deref());
        }
        RangeDescription::Dom(desc) => desc,
    };

    if container_id.is_none() {
        tracing::debug!("no container id provided, searching from the root");
    }

    let mut clean = tree.snapshot_subtree(tree.root());
    let clean_root = clean.root();
    purify_node(&mut clean, clean_root);

    let Some(search_within) = scoped_container_node(&clean, container_id, root_id.as_deref())
    else {
        tracing::warn!(?container_id, "container not found in document");
        return None;
    };
    let ancestor = locate_element_pointer(&clean, search_within, &desc.ancestor)
        .map(|m| m.node)
        .unwrap_or(search_within);

    let found = resolve_clean_locator(desc, &clean, ancestor, tree.document_id())?;
    locator::convert_locator_to_span(tree, &found)
}

/// Whether the description still resolves somewhere in this tree.
///
/// Any cached locator is dumped first: it may have been recorded against a
/// different document instance, and this query must reflect this tree
/// alone.
pub fn range_still_resolves(description: &RangeDescription, tree: &DocTree) -> bool {
    description.attach_locator(None);
    resolve_range(description, tree, None).is_some()
}

/// Resolve locators for a batch of descriptions up front, sharing one
/// purified snapshot, so later [`resolve_range`] calls replay instead of
/// searching. Returns how many descriptions ended up with a locator.
pub fn preresolve_locators(
    descriptions: &[RangeDescription],
    tree: &DocTree,
    containers: Option<&[Option<String>]>,
) -> Result<usize> {
    if let Some(containers) = containers {
        if containers.len() != descriptions.len() {
            return Err(AnchorError::MalformedInput(
                "descriptions and containers must have the same length",
            ));
        }
    }

    let root_id = root_container_id(tree);
    let mut clean = tree.snapshot_subtree(tree.root());
    let clean_root = clean.root();
    purify_node(&mut clean, clean_root);

    let mut found = 0usize;
    for (i, description) in descriptions.iter().enumerate() {
        let container_id = containers.and_then(|c| c[i].as_deref());
        if container_id.is_none() {
            tracing::debug!("no container id provided, assuming root without validation");
        }

        let desc = match description {
            RangeDescription::Empty { .. } => {
                found += 1;
                continue;
            }
            RangeDescription::Dom(desc) => desc,
        };
        if cached_locator_ensuring_document(description, tree.document_id()).is_some() {
            found += 1;
            continue;
        }

        let Some(search_within) = scoped_container_node(&clean, container_id, root_id.as_deref())
        else {
            tracing::warn!(?container_id, "container not found while preresolving");
            continue;
        };
        let ancestor = locate_element_pointer(&clean, search_within, &desc.ancestor)
            .map(|m| m.node)
            .unwrap_or(search_within);
        if resolve_clean_locator(desc, &clean, ancestor, tree.document_id()).is_some() {
            found += 1;
        }
    }

    if found == descriptions.len() {
        tracing::info!(found, total = descriptions.len(), "preresolved locators");
    } else {
        tracing::warn!(found, total = descriptions.len(), "preresolved locators");
    }
    Ok(found)
}
