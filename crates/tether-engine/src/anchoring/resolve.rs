//! Re-locating pointers in a (possibly edited) tree.
//!
//! Element pointers resolve by id lookup; text pointers resolve by scoring
//! every occurrence of the primary context against its expected offset and
//! verifying additional contexts in neighboring text nodes. Scores are
//! penalized, never zeroed, by partial context agreement, so the caller can
//! apply a confidence cutoff.

use crate::anchoring::model::{
    ElementPointer, Pointer, TextContext, TextPointer, NAMESPACED_ID_PREFIX, STABLE_ID_ATTRIBUTE,
};
use crate::dom::{chars, DocTree, NodeId, TextWalker};

/// Tag/id aliases kept for descriptions recorded against renamed wrapper
/// elements.
const CONTENT_WRAPPER_ID: &str = "DocContent";
const CONTENT_WRAPPER_TAG: &str = "DOC-CONTENT";

/// One candidate landing point for a pointer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointMatch {
    pub node: NodeId,
    /// Char offset within `node` for text matches; `None` for element
    /// matches. Signed because the recorded edge offset can pull a match
    /// before the context occurrence.
    pub offset: Option<i64>,
    pub confidence: f64,
}

impl PointMatch {
    fn exact(node: NodeId) -> Self {
        PointMatch {
            node,
            offset: None,
            confidence: 1.0,
        }
    }
}

/// Tag and id agreement between a live element and a recorded pointer.
pub(crate) fn element_matches_pointer(tree: &DocTree, node: NodeId, pointer: &ElementPointer) -> bool {
    let Some(tag) = tree.tag(node) else {
        return false;
    };
    let tag = tag.to_uppercase();
    let pointer_tag = pointer.tag_name.to_uppercase();

    let id_matches = tree.attr(node, "id") == Some(pointer.element_id.as_str())
        || tree.attr(node, STABLE_ID_ATTRIBUTE) == Some(pointer.element_id.as_str());
    let mut tag_matches = tag == pointer_tag;

    if !tag_matches && pointer.element_id == CONTENT_WRAPPER_ID && tag == CONTENT_WRAPPER_TAG {
        tag_matches = true;
    }

    id_matches && tag_matches
}

/// Find the element a pointer names, searching `ancestor` and its subtree.
///
/// Namespaced ids are matched by comma-split prefix and suffix against the
/// stable-id attribute, so regenerated middles still resolve; candidates
/// are then confirmed against the full pointer. Element matches are always
/// exact (confidence 1) or absent.
pub fn locate_element_pointer(
    tree: &DocTree,
    ancestor: NodeId,
    pointer: &ElementPointer,
) -> Option<PointMatch> {
    if element_matches_pointer(tree, ancestor, pointer) {
        return Some(PointMatch::exact(ancestor));
    }

    let id = pointer.element_id.as_str();
    let candidates = if id.starts_with(NAMESPACED_ID_PREFIX) {
        let parts: Vec<&str> = id.split(',').collect();
        if parts.len() < 2 {
            tracing::warn!(id, "namespaced-looking id does not split by comma");
            Vec::new()
        } else {
            let (prefix, suffix) = (parts[0], parts[parts.len() - 1]);
            tree.find_by_attr(ancestor, STABLE_ID_ATTRIBUTE, |v| {
                v.starts_with(prefix) && v.ends_with(suffix)
            })
        }
    } else {
        tree.find_by_attr(ancestor, "id", |v| v == id)
    };

    candidates
        .into_iter()
        .find(|&c| element_matches_pointer(tree, c, pointer))
        .map(PointMatch::exact)
}

/// Resolve any pointer beneath `ancestor`. `start_hint` carries the start
/// edge's match when resolving the end edge, letting the search resume
/// where the start landed.
pub fn locate_pointer(
    tree: &DocTree,
    ancestor: NodeId,
    pointer: &Pointer,
    start_hint: Option<&PointMatch>,
) -> Option<PointMatch> {
    match pointer {
        Pointer::Element(p) => locate_element_pointer(tree, ancestor, p),
        Pointer::Text(p) => locate_text_edge(tree, ancestor, p, start_hint),
    }
}

/// Resolve a text pointer beneath `ancestor` by fuzzy context matching.
pub fn locate_text_edge(
    tree: &DocTree,
    ancestor: NodeId,
    pointer: &TextPointer,
    start_hint: Option<&PointMatch>,
) -> Option<PointMatch> {
    // The reference climb may land above the ancestor, so search for it
    // from one level up.
    let root = tree.parent(ancestor).unwrap_or(ancestor);
    let reference = locate_element_pointer(tree, root, &pointer.ancestor);
    let found_reference = reference.is_some();
    let reference_node = reference.map(|m| m.node).unwrap_or(ancestor);

    let is_start = pointer.role.is_start();
    let mut walker = TextWalker::new(tree, reference_node, true);

    // When resolving the end edge, resume from where the start landed if
    // that was inside our reference node.
    if !is_start {
        if let Some(hint) = start_hint {
            if tree.is_ancestor_of(reference_node, hint.node) {
                walker.set_current(hint.node);
            }
        }
    }

    let contexts = pointer.non_empty_contexts();
    let mut text_node = if tree.is_text(walker.current()) {
        Some(walker.current())
    } else {
        walker.next()
    };

    let mut possible: Vec<PointMatch> = Vec::new();
    'search: while text_node.is_some() {
        let matches = current_node_matches(tree, pointer, &contexts, &mut walker);
        for candidate in matches {
            if candidate.confidence > 0.0 {
                possible.push(candidate);
            }
            // 100% sure, that is the best we can do.
            if candidate.confidence >= 1.0 {
                break 'search;
            }
        }
        text_node = walker.next();
    }

    let last = possible.last().copied()?;
    if last.confidence >= 1.0 {
        return Some(last);
    }

    // A fuzzy match is only trustworthy when the recorded reference node
    // itself resolved. Matching loosely beneath a fallback ancestor finds
    // lookalike text far too often.
    if !found_reference {
        tracing::debug!(
            role = ?pointer.role,
            "ignoring fuzzy matches because the reference node did not resolve"
        );
        return None;
    }

    let mut best = last;
    for candidate in &possible {
        if candidate.confidence > best.confidence {
            best = *candidate;
        }
    }
    Some(best)
}

/// Score every occurrence of the primary context in the walker's current
/// node, then verify additional contexts against neighboring text nodes.
/// The walker cursor is advanced during verification and restored before
/// returning.
fn current_node_matches(
    tree: &DocTree,
    pointer: &TextPointer,
    contexts: &[&TextContext],
    walker: &mut TextWalker<'_>,
) -> Vec<PointMatch> {
    let current = walker.current();
    let is_start = pointer.role.is_start();
    let mut confidence_multiplier = 1.0;

    let mut matches = primary_context_matches(tree, pointer, contexts[0], current, is_start);

    let step = |walker: &mut TextWalker<'_>| {
        if is_start {
            walker.prev()
        } else {
            walker.next()
        }
    };
    let mut looking_at = step(walker);

    if !matches.is_empty() {
        for (i, context) in contexts.iter().enumerate().skip(1) {
            if !secondary_context_match(tree, context, looking_at, is_start) {
                confidence_multiplier *= i as f64 / (i as f64 + 0.5);
                break;
            }
            // That context matched so we continue verifying.
            looking_at = step(walker);
        }
    }

    // With every recorded context verified, remaining unvisited siblings
    // mean the recording stopped at its collection limits rather than at
    // the edge of the reference node. That costs a little confidence when
    // the recording is short.
    if confidence_multiplier == 1.0 && !contains_full_context(pointer) && looking_at.is_some() {
        let n = contexts.len() as f64;
        confidence_multiplier *= n / (n + 0.5);
    }

    for candidate in &mut matches {
        candidate.confidence *= confidence_multiplier;
    }
    walker.set_current(current);
    matches
}

/// All occurrences of the primary context in `node`, scored by how far
/// each sits from the recorded offset. Longer paragraphs are expected to
/// change more, so the penalty relaxes with node length.
fn primary_context_matches(
    tree: &DocTree,
    pointer: &TextPointer,
    context: &TextContext,
    node: NodeId,
    is_start: bool,
) -> Vec<PointMatch> {
    let Some(content) = tree.text(node) else {
        return Vec::new();
    };
    let length = chars::len(content);
    let expected = if is_start {
        length as i64 - context.context_offset as i64
    } else {
        context.context_offset as i64
    };

    let f = (length as f64).sqrt() * 2.0 + 1.0;
    chars::indices_of(content, &context.context_text)
        .into_iter()
        .map(|p| {
            let score = f / (f + (p as i64 - expected).abs() as f64);
            PointMatch {
                node,
                offset: Some(p as i64 + pointer.edge_offset),
                confidence: score.max(0.25),
            }
        })
        .collect()
}

/// Does `node`'s text carry this additional context at its recorded
/// (mirrored, for start pointers) offset?
fn secondary_context_match(
    tree: &DocTree,
    context: &TextContext,
    node: Option<NodeId>,
    is_start: bool,
) -> bool {
    let Some(node) = node else {
        return false;
    };
    let Some(content) = tree.text(node) else {
        return context.context_text.is_empty();
    };
    let length = chars::len(content) as i64;
    let mut adjusted = context.context_offset as i64;
    if is_start {
        adjusted = length - adjusted;
    }
    // A negative offset counts back from the end of the text, clamped to
    // its start; past-the-end yields the empty tail.
    if adjusted < 0 {
        adjusted = (length + adjusted).max(0);
    }
    let tail = if adjusted >= length {
        ""
    } else {
        chars::slice_from(content, adjusted as usize)
    };
    tail.starts_with(context.context_text.as_str())
}

/// A pointer recorded with a full complement of context: a primary plus
/// five additional, or at least 15 chars of additional context text.
fn contains_full_context(pointer: &TextPointer) -> bool {
    if pointer.contexts.len() >= 6 {
        return true;
    }
    let collected: usize = pointer.contexts[1..]
        .iter()
        .map(|c| chars::len(&c.context_text))
        .sum();
    collected >= 15
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchoring::context::describe_range;
    use crate::anchoring::model::{Pointer, RangeDescription, Role};
    use crate::dom::DomSpan;
    use pretty_assertions::assert_eq;

    fn paragraph(text: &str) -> (DocTree, NodeId, NodeId) {
        let mut tree = DocTree::new("body");
        let div = tree.new_element("div");
        tree.set_attr(div, "id", "ThisIdIsTheBest");
        tree.append_child(tree.root(), div);
        let p = tree.new_element("p");
        tree.append_child(div, p);
        let t = tree.new_text(text);
        tree.append_child(p, t);
        (tree, div, t)
    }

    fn start_pointer(contexts: Vec<TextContext>, edge_offset: i64) -> TextPointer {
        TextPointer {
            role: Role::Start,
            contexts,
            edge_offset,
            ancestor: ElementPointer {
                role: Role::Ancestor,
                tag_name: "div".into(),
                element_id: "ThisIdIsTheBest".into(),
            },
        }
    }

    #[test]
    fn element_pointer_matches_by_stable_id() {
        let (mut tree, div, _) = paragraph("irrelevant");
        tree.set_attr(div, STABLE_ID_ATTRIBUTE, "tag:example.org,2024:part-9");
        let pointer = ElementPointer {
            role: Role::Ancestor,
            tag_name: "div".into(),
            element_id: "tag:example.org,2024:part-9".into(),
        };
        let found = locate_element_pointer(&tree, tree.root(), &pointer).unwrap();
        assert_eq!(found.node, div);
        assert_eq!(found.confidence, 1.0);
    }

    #[test]
    fn namespaced_candidates_are_confirmed_exactly() {
        let (mut tree, div, _) = paragraph("irrelevant");
        tree.set_attr(div, STABLE_ID_ATTRIBUTE, "tag:example.org,2024,part-9");
        let decoy = tree.new_element("div");
        tree.set_attr(decoy, STABLE_ID_ATTRIBUTE, "tag:example.org,other,part-9");
        tree.insert_before(tree.root(), decoy, div);
        let pointer = ElementPointer {
            role: Role::Ancestor,
            tag_name: "div".into(),
            element_id: "tag:example.org,2024,part-9".into(),
        };
        // Prefix/suffix gathering pulls in the decoy too; the exact id
        // check weeds it out.
        let found = locate_element_pointer(&tree, tree.root(), &pointer).unwrap();
        assert_eq!(found.node, div);
    }

    #[test]
    fn mismatched_tag_rejects_candidate() {
        let (tree, _, _) = paragraph("irrelevant");
        let pointer = ElementPointer {
            role: Role::Ancestor,
            tag_name: "section".into(),
            element_id: "ThisIdIsTheBest".into(),
        };
        assert!(locate_element_pointer(&tree, tree.root(), &pointer).is_none());
    }

    #[test]
    fn unmodified_text_resolves_exactly() {
        let text =
            "This is some somewhat but not particularly long text for readers with short attention spans.";
        let (tree, div, t) = paragraph(text);
        let pointer = start_pointer(
            vec![TextContext {
                context_text: "some somewhat".into(),
                context_offset: 84,
            }],
            5,
        );
        let found = locate_text_edge(&tree, div, &pointer, None).unwrap();
        assert_eq!(found.node, t);
        assert_eq!(found.offset, Some(13));
        assert_eq!(found.confidence, 1.0);
    }

    #[test]
    fn appended_text_lowers_confidence_by_offset_drift() {
        // The original 92-char paragraph grew to 119 chars, pushing the
        // expected mirrored offset from 8 to 35.
        let text = "This is some somewhat but not particularly long text for readers \
                    with short attention spans. This text was added later.";
        let (tree, div, _) = paragraph(text);
        let pointer = start_pointer(
            vec![TextContext {
                context_text: "some somewhat".into(),
                context_offset: 84,
            }],
            5,
        );
        let found = locate_text_edge(&tree, div, &pointer, None).unwrap();
        assert_eq!(found.offset, Some(13));
        let f = (119f64).sqrt() * 2.0 + 1.0;
        let expected = f / (f + 27.0);
        assert!((found.confidence - expected).abs() < 1e-12);
        assert!((found.confidence - 0.458).abs() < 0.001);
    }

    #[test]
    fn unresolved_reference_forbids_fuzzy_matches() {
        let text = "This is some somewhat but not particularly long text. And it moved.";
        let (tree, div, _) = paragraph(text);
        let mut pointer = start_pointer(
            vec![TextContext {
                context_text: "some somewhat".into(),
                context_offset: 84,
            }],
            5,
        );
        pointer.ancestor.element_id = "NoSuchId".into();
        assert!(locate_text_edge(&tree, div, &pointer, None).is_none());
    }

    #[test]
    fn score_floor_holds_at_quarter() {
        let (tree, _, t) = paragraph("word and then a long stretch of padding text follows.");
        let pointer = start_pointer(
            vec![TextContext {
                context_text: "word".into(),
                // Mirrored expectation lands at the far end of the text.
                context_offset: 0,
            }],
            0,
        );
        let matches = primary_context_matches(&tree, &pointer, &pointer.contexts[0], t, true);
        assert_eq!(matches.len(), 1);
        // f is about 15.6 against a drift of 53 chars, well under the floor.
        assert_eq!(matches[0].confidence, 0.25);
    }

    #[test]
    fn false_matching_paragraphs_score_by_offset_drift() {
        let mut tree = DocTree::new("body");
        let div = tree.new_element("div");
        tree.set_attr(div, "id", "ThisIdIsTheBest");
        tree.append_child(tree.root(), div);
        let p1 = tree.new_element("p");
        tree.append_child(div, p1);
        let t1 = tree.new_text(
            "This is some somewhat but not particularly long text for readers with short attention spans.",
        );
        tree.append_child(p1, t1);
        let p2 = tree.new_element("p");
        tree.append_child(div, p2);
        let t2 = tree.new_text("This is some more text containing many,  many uninteresting words.");
        tree.append_child(p2, t2);

        let mut span = DomSpan::collapsed_at(t1);
        span.set_start(t1, 13);
        span.set_end(t2, 22);
        let described = describe_range(&mut tree, Some(&span)).unwrap();
        let RangeDescription::Dom(desc) = &described.description else {
            panic!("expected a dom description");
        };
        let (Pointer::Text(start), Pointer::Text(end)) = (&desc.start, &desc.end) else {
            panic!("expected text pointers on both edges");
        };

        // Paragraphs echoing the recorded contexts appear on both sides.
        let p0 = tree.new_element("p");
        let t0 = tree.new_text(
            "This is some somewhat misleading (to the anchoring system) introductory text",
        );
        tree.append_child(p0, t0);
        tree.insert_before(div, p0, p1);
        let p3 = tree.new_element("p");
        tree.append_child(div, p3);
        let t3 = tree.new_text(
            "And more text containing things normal text containing which is quite hard to find",
        );
        tree.append_child(p3, t3);

        // The leading decoy holds "some somewhat" 16 chars from its
        // mirrored position.
        let contexts = start.non_empty_contexts();
        let mut walker = TextWalker::new(&tree, div, true);
        walker.set_current(t0);
        let decoys = current_node_matches(&tree, start, &contexts, &mut walker);
        assert_eq!(decoys.len(), 1);
        assert!((decoys[0].confidence - 0.535).abs() < 0.005);

        // The trailing decoy repeats "text containing" twice, at 9 and 21
        // chars of drift.
        let contexts = end.non_empty_contexts();
        let mut walker = TextWalker::new(&tree, div, true);
        walker.set_current(t3);
        let decoys = current_node_matches(&tree, end, &contexts, &mut walker);
        assert_eq!(decoys.len(), 2);
        assert!((decoys[0].confidence - 0.679).abs() < 0.005);
        assert!((decoys[1].confidence - 0.476).abs() < 0.005);

        // The true start paragraph still wins, though its newly acquired
        // sibling costs it the missing-full-context penalty.
        let found = locate_text_edge(&tree, div, start, None).unwrap();
        assert_eq!(found.node, t1);
        assert!((found.confidence - 1.0 / 1.5).abs() < 1e-12);

        // The end edge loses to the trailing decoy: the same penalty drops
        // the true paragraph below the decoy's 0.679.
        let found = locate_text_edge(&tree, div, end, None).unwrap();
        assert_eq!(found.node, t3);
        assert!((found.confidence - 0.679).abs() < 0.005);
    }

    #[test]
    fn missing_secondary_context_costs_a_penalty() {
        let mut tree = DocTree::new("body");
        let div = tree.new_element("div");
        tree.set_attr(div, "id", "ThisIdIsTheBest");
        tree.append_child(tree.root(), div);
        let p1 = tree.new_element("p");
        tree.append_child(div, p1);
        let t1 = tree.new_text("first words here");
        tree.append_child(p1, t1);
        let p2 = tree.new_element("p");
        tree.append_child(div, p2);
        let t2 = tree.new_text("second paragraph");
        tree.append_child(p2, t2);

        let pointer = TextPointer {
            role: Role::End,
            contexts: vec![
                TextContext {
                    context_text: "first".into(),
                    context_offset: 0,
                },
                TextContext {
                    context_text: "unrelated".into(),
                    context_offset: 0,
                },
            ],
            edge_offset: 5,
            ancestor: ElementPointer {
                role: Role::Ancestor,
                tag_name: "div".into(),
                element_id: "ThisIdIsTheBest".into(),
            },
        };
        let found = locate_text_edge(&tree, div, &pointer, None).unwrap();
        // Primary matched exactly; the failed first additional context
        // multiplies by 1/1.5.
        assert!((found.confidence - 1.0 / 1.5).abs() < 1e-12);
    }
}
