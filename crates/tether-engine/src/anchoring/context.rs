//! Context extraction: turning a live span into the text contexts and
//! pointers that make it re-locatable after the tree has been edited.

use std::sync::OnceLock;

use regex::Regex;

use crate::anchoring::model::{
    DomRangeDescription, ElementPointer, Pointer, RangeDescription, Role, TextContext, TextPointer,
};
use crate::anchoring::purify::{is_node_anchorable, purify_span, reference_node_for_node};
use crate::anchoring::containers::container_id_for_node;
use crate::dom::{chars, span::node_length, Boundary, DocTree, DomSpan, NodeId, TextWalker};
use crate::error::{AnchorError, Result};

/// Most additional contexts collected per edge.
const MAX_ADDITIONAL_CONTEXTS: usize = 5;
/// Additional-context collection stops once this many chars are gathered.
const MAX_COLLECTED_CHARS: usize = 15;

/// A built description plus the id of the container it should be searched
/// within later.
#[derive(Debug, Clone, PartialEq)]
pub struct DescribedRange {
    pub description: RangeDescription,
    pub container_id: Option<String>,
}

/// Build an edit-resilient description of `span`.
///
/// A `None` span yields an `Empty` description (anchor the whole
/// container). A span that cannot be normalized onto anchorable nodes, or
/// that collapses while doing so, is a hard error.
pub fn describe_range(tree: &mut DocTree, span: Option<&DomSpan>) -> Result<DescribedRange> {
    let Some(span) = span else {
        tracing::debug!("returning empty description for missing span");
        return Ok(DescribedRange {
            description: RangeDescription::empty(),
            container_id: None,
        });
    };

    let mut span = *span;
    clean_span_from_blank_edges(tree, &mut span);
    let span = make_span_anchorable(tree, &span)
        .filter(|s| !s.is_collapsed(tree))
        .ok_or(AnchorError::MalformedInput(
            "span has no anchorable boundaries",
        ))?;

    let purified = purify_span(tree, &span)?;
    if purified.span.is_collapsed(&purified.tree) {
        return Err(AnchorError::MalformedInput("span collapsed while purifying"));
    }

    // The ancestor pointer is taken from the live span, not the purified
    // copy, and bumped off text nodes onto a containing element.
    let mut ancestor_node = span.common_ancestor(tree);
    if tree.is_text(ancestor_node) {
        ancestor_node = tree
            .parent(ancestor_node)
            .ok_or(AnchorError::NoAnchorableAncestor)?;
    }
    let ancestor_node =
        reference_node_for_node(tree, ancestor_node, false).ok_or(AnchorError::NoAnchorableAncestor)?;
    let container_id = container_id_for_node(tree, ancestor_node);
    let ancestor = ElementPointer::for_node(tree, ancestor_node, Role::Ancestor)
        .ok_or(AnchorError::NoAnchorableAncestor)?;

    let start = create_pointer(&purified.tree, &purified.span, Role::Start)?;
    let end = create_pointer(&purified.tree, &purified.span, Role::End)?;

    Ok(DescribedRange {
        description: RangeDescription::Dom(DomRangeDescription::new(
            start,
            end,
            ancestor,
            container_id.clone(),
        )),
        container_id,
    })
}

/// Pointer for one edge of a (purified) span: a text pointer when the edge
/// lands in text, an element pointer when it lands on an identified
/// element.
pub(crate) fn create_pointer(tree: &DocTree, span: &DomSpan, role: Role) -> Result<Pointer> {
    let edge_node = node_that_is_edge_of_span(tree, span, role.is_start());
    if tree.is_text(edge_node) {
        return Ok(Pointer::Text(create_text_pointer(tree, span, role)?));
    }
    ElementPointer::for_node(tree, edge_node, role)
        .map(Pointer::Element)
        .ok_or(AnchorError::MalformedInput(
            "edge element carries no usable id",
        ))
}

/// Build the text pointer for one edge of a span whose edge lands in text.
pub(crate) fn create_text_pointer(tree: &DocTree, span: &DomSpan, role: Role) -> Result<TextPointer> {
    let start = role.is_start();
    let boundary = if start { span.start } else { span.end };
    let mut container = boundary.node;
    let mut offset = boundary.offset;

    // The reference climb starts from the original container's parent,
    // even when the edge is re-homed below.
    let parent = tree.parent(container).unwrap_or(container);

    if !tree.is_text(container) {
        container = node_that_is_edge_of_span(tree, span, start);
        offset = if start {
            0
        } else {
            chars::len(&tree.text_content(container))
        };
    }

    let reference_node =
        reference_node_for_node(tree, parent, false).ok_or(AnchorError::NoAnchorableAncestor)?;
    let ancestor = ElementPointer::for_node(tree, reference_node, Role::Ancestor)
        .ok_or(AnchorError::NoAnchorableAncestor)?;

    let content = tree.text_content(container);
    let primary = generate_primary_context(&content, offset, role)
        .ok_or(AnchorError::MalformedInput("no text at span boundary"))?;

    // edge_offset records where the boundary sits relative to the primary
    // context's position, normalized to a left-edge offset.
    let mut normalized = primary.context_offset as i64;
    if start {
        normalized = chars::len(&content) as i64 - normalized;
    }
    let edge_offset = offset as i64 - normalized;

    let mut contexts = vec![primary];
    let mut collected = 0usize;
    let mut walker = TextWalker::new(tree, reference_node, true);
    walker.set_current(container);

    loop {
        let sibling = if start { walker.prev() } else { walker.next() };
        let Some(sibling) = sibling else { break };
        if collected >= MAX_COLLECTED_CHARS || contexts.len() - 1 >= MAX_ADDITIONAL_CONTEXTS {
            break;
        }
        let Some(additional) = generate_additional_context(tree, sibling, role) else {
            break;
        };
        collected += chars::len(&additional.context_text);
        contexts.push(additional);
    }

    Ok(TextPointer {
        role,
        contexts,
        edge_offset,
        ancestor,
    })
}

/// Primary context: the word ending at the boundary plus the word starting
/// at it, located within the node's full text. As with additional
/// contexts, the offset is stored mirrored to the right edge for `start`
/// pointers.
pub(crate) fn generate_primary_context(
    content: &str,
    offset: usize,
    role: Role,
) -> Option<TextContext> {
    if content.is_empty() {
        return None;
    }
    let length = chars::len(content);
    let prefix = last_word(chars::slice(content, 0, offset.min(length)));
    let suffix = first_word(chars::slice_from(content, offset.min(length)));
    let context_text = format!("{prefix}{suffix}");
    let mut context_offset = chars::index_of(content, &context_text)?;
    if role.is_start() {
        context_offset = length - context_offset;
    }
    Some(TextContext {
        context_text,
        context_offset,
    })
}

/// One whole word from a sibling text node: the last word when walking
/// toward a `start` boundary, the first when walking toward an `end`, with
/// the offset mirrored for `start`.
pub(crate) fn generate_additional_context(
    tree: &DocTree,
    node: NodeId,
    role: Role,
) -> Option<TextContext> {
    let content = tree.text_content(node);
    let context_text = if role.is_start() {
        last_word(&content).to_string()
    } else {
        first_word(&content).to_string()
    };
    if context_text.is_empty() {
        return None;
    }
    let mut context_offset = chars::index_of(&content, &context_text)?;
    if role.is_start() {
        context_offset = chars::len(&content) - context_offset;
    }
    Some(TextContext {
        context_text,
        context_offset,
    })
}

/// Last whitespace-delimited token of `s`, keeping one trailing space.
pub(crate) fn last_word(s: &str) -> &str {
    static LAST_WORD: OnceLock<Regex> = OnceLock::new();
    let re = LAST_WORD.get_or_init(|| Regex::new(r"\S*\s?$").expect("invalid last-word regex"));
    re.find(s).map(|m| m.as_str()).unwrap_or("")
}

/// First whitespace-delimited token of `s`, keeping one leading space.
pub(crate) fn first_word(s: &str) -> &str {
    static FIRST_WORD: OnceLock<Regex> = OnceLock::new();
    let re = FIRST_WORD.get_or_init(|| Regex::new(r"^\s?\S*").expect("invalid first-word regex"));
    re.find(s).map(|m| m.as_str()).unwrap_or("")
}

/// The node that is effectively the edge of the span: the boundary's text
/// container, or the child the boundary points at (start side), or the
/// child just before it / the previous sibling (end side).
pub(crate) fn node_that_is_edge_of_span(tree: &DocTree, span: &DomSpan, start: bool) -> NodeId {
    let Boundary { node: container, offset } = if start { span.start } else { span.end };

    if tree.is_text(container) {
        return container;
    }

    if start {
        let Some(&child) = tree.children(container).get(offset) else {
            return container;
        };
        // A blank text child is no better an edge than the container.
        if tree
            .text(child)
            .map(|t| t.trim().is_empty())
            .unwrap_or(false)
        {
            return container;
        }
        return child;
    }

    if offset < 1 {
        return tree.prev_sibling(container).unwrap_or(container);
    }
    tree.children(container)
        .get(offset - 1)
        .copied()
        .unwrap_or(container)
}

/// Normalize a span so both edges land on anchorable nodes, searching
/// inward through the tree. Returns `None` when nothing anchorable exists
/// in the covered region.
pub(crate) fn make_span_anchorable(tree: &DocTree, span: &DomSpan) -> Option<DomSpan> {
    let start_edge = node_that_is_edge_of_span(tree, span, true);
    let end_edge = node_that_is_edge_of_span(tree, span, false);
    let mut start_offset = span.start.offset;
    let mut end_offset = span.end.offset;

    if start_edge == span.start.node
        && end_edge == span.end.node
        && is_node_anchorable(tree, start_edge, false)
        && is_node_anchorable(tree, end_edge, false)
    {
        return Some(*span);
    }

    let start_edge = if is_node_anchorable(tree, start_edge, false) {
        Some(start_edge)
    } else {
        start_offset = 0;
        search_forward_for_anchorable(tree, start_edge, span.common_ancestor(tree))
    };
    let end_edge = if is_node_anchorable(tree, end_edge, false) {
        Some(end_edge)
    } else {
        let found = search_backward_for_anchorable(tree, end_edge);
        if let Some(node) = found {
            if let Some(text) = tree.text(node) {
                end_offset = chars::len(text);
            }
        }
        found
    };

    let (start_edge, end_edge) = (start_edge?, end_edge?);

    if start_edge == end_edge {
        return Some(DomSpan::select_node(tree, start_edge));
    }

    let mut fixed = DomSpan::collapsed_at(start_edge);
    if tree.is_text(start_edge) {
        fixed.set_start(start_edge, start_offset);
    } else {
        fixed.set_start_before(tree, start_edge);
    }
    if tree.is_text(end_edge) {
        fixed.set_end(end_edge, end_offset);
    } else {
        fixed.set_end_after(tree, end_edge);
    }
    Some(fixed)
}

/// Forward document-order search (bounded by `scope`) for an anchorable
/// node, starting at `node` itself.
fn search_forward_for_anchorable(tree: &DocTree, node: NodeId, scope: NodeId) -> Option<NodeId> {
    let mut cursor = Some(node);
    while let Some(current) = cursor {
        if is_node_anchorable(tree, current, false) {
            return Some(current);
        }
        cursor = tree.next_in_order(scope, current);
    }
    None
}

/// Backward search for an anchorable node: dive to the last descendant,
/// then step through previous siblings (and their last descendants),
/// climbing out of exhausted parents.
fn search_backward_for_anchorable(tree: &DocTree, node: NodeId) -> Option<NodeId> {
    if is_node_anchorable(tree, node, false) {
        return Some(node);
    }
    let mut cursor = tree.last_descendant_or_self(node);
    loop {
        if is_node_anchorable(tree, cursor, false) {
            return Some(cursor);
        }
        let mut climb = cursor;
        while tree.prev_sibling(climb).is_none() {
            climb = tree.parent(climb)?;
        }
        cursor = tree.last_descendant_or_self(tree.prev_sibling(climb)?);
    }
}

/// Slide whitespace-only edge containers inward to the nearest non-blank
/// text node before describing the span.
pub(crate) fn clean_span_from_blank_edges(tree: &DocTree, span: &mut DomSpan) {
    let is_blank = |node: NodeId| {
        tree.text(node)
            .map(|t| t.trim().is_empty())
            .unwrap_or(false)
    };

    let mut scope = span.common_ancestor(tree);
    if tree.is_text(scope) {
        if let Some(parent) = tree.parent(scope) {
            scope = parent;
        }
    }
    let text_nodes: Vec<NodeId> = {
        let mut all = vec![scope];
        all.extend(tree.descendants(scope));
        all.into_iter().filter(|&n| tree.is_text(n)).collect()
    };

    if is_blank(span.start.node) {
        tracing::debug!("span starts in a whitespace-only text node");
        if let Some(at) = text_nodes.iter().position(|&n| n == span.start.node) {
            if let Some(&found) = text_nodes[at..].iter().find(|&&n| !is_blank(n)) {
                span.set_start(found, 0);
            }
        }
    }
    if is_blank(span.end.node) {
        tracing::debug!("span ends in a whitespace-only text node");
        if let Some(at) = text_nodes.iter().position(|&n| n == span.end.node) {
            if let Some(&found) = text_nodes[..=at].iter().rev().find(|&&n| !is_blank(n)) {
                span.set_end(found, node_length(tree, found));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("This is some ", "some ")]
    #[case("word", "word")]
    #[case("", "")]
    #[case("trailing  ", " ")]
    fn last_word_cases(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(last_word(input), expected);
    }

    #[rstest]
    #[case("somewhat but not", "somewhat")]
    #[case(" leading", " leading")]
    #[case("", "")]
    fn first_word_cases(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(first_word(input), expected);
    }

    #[test]
    fn primary_context_straddles_boundary() {
        let content =
            "This is some somewhat but not particularly long text for readers with short attention spans.";
        let context = generate_primary_context(content, 13, Role::End).unwrap();
        assert_eq!(context.context_text, "some somewhat");
        assert_eq!(context.context_offset, 8);
    }

    #[test]
    fn primary_context_offset_is_mirrored_for_start_pointers() {
        // 92 chars of text, context at 8 from the left = 84 from the right.
        let content =
            "This is some somewhat but not particularly long text for readers with short attention spans.";
        let context = generate_primary_context(content, 13, Role::Start).unwrap();
        assert_eq!(context.context_text, "some somewhat");
        assert_eq!(context.context_offset, 84);
    }

    #[test]
    fn primary_context_of_empty_text_is_none() {
        assert_eq!(generate_primary_context("", 0, Role::Start), None);
    }

    fn single_paragraph() -> (DocTree, NodeId) {
        let mut tree = DocTree::new("body");
        let div = tree.new_element("div");
        tree.set_attr(div, "id", "ThisIdIsTheBest");
        tree.append_child(tree.root(), div);
        let p = tree.new_element("p");
        tree.append_child(div, p);
        let t1 = tree.new_text(
            "This is some somewhat but not particularly long text for readers with short attention spans.",
        );
        tree.append_child(p, t1);
        (tree, t1)
    }

    #[test]
    fn start_pointer_mirrors_context_offset() {
        let (mut tree, t1) = single_paragraph();
        let mut span = DomSpan::collapsed_at(t1);
        span.set_start(t1, 13);
        span.set_end(t1, 47);
        let described = describe_range(&mut tree, Some(&span)).unwrap();
        let RangeDescription::Dom(desc) = &described.description else {
            panic!("expected a dom description");
        };
        let Pointer::Text(start) = &desc.start else {
            panic!("expected a text start pointer");
        };
        // 92 chars of text, context at 8 from the left = 84 from the right.
        assert_eq!(start.contexts[0].context_text, "some somewhat");
        assert_eq!(start.contexts[0].context_offset, 84);
        assert_eq!(start.edge_offset, 5);
        assert_eq!(start.ancestor.element_id, "ThisIdIsTheBest");
    }

    #[test]
    fn additional_contexts_stop_at_limits() {
        let mut tree = DocTree::new("body");
        let div = tree.new_element("div");
        tree.set_attr(div, "id", "root");
        tree.append_child(tree.root(), div);
        let mut first = None;
        for word in ["alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta"] {
            let p = tree.new_element("p");
            tree.append_child(div, p);
            let t = tree.new_text(word);
            tree.append_child(p, t);
            first.get_or_insert(t);
        }
        let first = first.unwrap();
        let mut span = DomSpan::collapsed_at(first);
        span.set_start(first, 0);
        span.set_end(first, 5);
        let described = describe_range(&mut tree, Some(&span)).unwrap();
        let RangeDescription::Dom(desc) = &described.description else {
            panic!("expected dom description");
        };
        let Pointer::Text(end) = &desc.end else {
            panic!("expected text end pointer");
        };
        // "beta" + "gamma" + "delta" + "epsilon" crosses 15 chars, so the
        // walk stops after four additional contexts.
        let texts: Vec<&str> = end.contexts[1..]
            .iter()
            .map(|c| c.context_text.as_str())
            .collect();
        assert_eq!(texts, vec!["beta", "gamma", "delta", "epsilon"]);
    }

    #[test]
    fn null_span_describes_as_empty() {
        let mut tree = DocTree::new("body");
        let described = describe_range(&mut tree, None).unwrap();
        assert!(described.description.is_empty());
    }

    #[test]
    fn unanchorable_span_is_an_error() {
        // No ids anywhere, no text: nothing to anchor to.
        let mut tree = DocTree::new("body");
        let div = tree.new_element("div");
        tree.append_child(tree.root(), div);
        let span = DomSpan::select_node_contents(&tree, div);
        let result = describe_range(&mut tree, Some(&span));
        assert!(result.is_err());
    }

    #[test]
    fn blank_edge_containers_slide_inward() {
        let mut tree = DocTree::new("body");
        let div = tree.new_element("div");
        tree.set_attr(div, "id", "root");
        tree.append_child(tree.root(), div);
        let blank = tree.new_text("   ");
        tree.append_child(div, blank);
        let real = tree.new_text("actual words here");
        tree.append_child(div, real);
        let mut span = DomSpan::collapsed_at(blank);
        span.set_start(blank, 0);
        span.set_end(real, 6);
        clean_span_from_blank_edges(&tree, &mut span);
        assert_eq!(span.start.node, real);
        assert_eq!(span.start.offset, 0);
    }
}
