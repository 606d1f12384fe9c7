//! The serializable description model: what gets stored when a span is
//! anchored, and the transient locator records cached on a description after
//! it has been resolved once.

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

use crate::dom::{DocTree, DocumentId, NodeId};

/// Attribute carrying an element's stable, domain-assigned identifier.
pub const STABLE_ID_ATTRIBUTE: &str = "data-stable-id";

/// Prefix of namespaced composite ids (tag URIs). These match by
/// comma-split prefix/suffix rather than literal equality, so regenerated
/// middles don't break element resolution.
pub const NAMESPACED_ID_PREFIX: &str = "tag:";

/// Which edge of a span a pointer describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Start,
    End,
    Ancestor,
}

impl Role {
    pub fn is_start(self) -> bool {
        matches!(self, Role::Start)
    }
}

/// A short literal fragment of a text node plus where it sat.
///
/// `context_offset` is measured from the right edge of the node text for
/// `start`-role pointers and from the left edge for `end`-role pointers, so
/// appends on the far side of the boundary don't shift it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextContext {
    pub context_text: String,
    pub context_offset: usize,
}

/// Identifies an element by tag name and stable id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementPointer {
    pub role: Role,
    pub tag_name: String,
    pub element_id: String,
}

impl ElementPointer {
    /// Pointer for an element node carrying a stable id (domain id
    /// attribute preferred, generic `id` otherwise). `None` for text nodes
    /// and unidentified elements.
    pub fn for_node(tree: &DocTree, node: NodeId, role: Role) -> Option<Self> {
        let tag_name = tree.tag(node)?.to_string();
        let element_id = tree
            .attr(node, STABLE_ID_ATTRIBUTE)
            .or_else(|| tree.attr(node, "id"))?
            .to_string();
        Some(ElementPointer {
            role,
            tag_name,
            element_id,
        })
    }
}

/// Anchors one span edge inside text via surrounding context.
///
/// `contexts[0]` is the primary context (text immediately around the
/// boundary inside one text node); the rest are whole words from successive
/// sibling text nodes walking away from the boundary. `edge_offset` is the
/// signed distance from the primary context's normalized offset to the
/// anchored boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPointer {
    pub role: Role,
    pub contexts: Vec<TextContext>,
    pub edge_offset: i64,
    pub ancestor: ElementPointer,
}

impl TextPointer {
    /// Contexts that still carry text, primary always retained. Old data
    /// could contain whitespace-only additional contexts; they add nothing
    /// to matching and only make it more fragile.
    pub fn non_empty_contexts(&self) -> Vec<&TextContext> {
        self.contexts
            .iter()
            .enumerate()
            .filter(|(ix, context)| *ix == 0 || !context.context_text.trim().is_empty())
            .map(|(_, context)| context)
            .collect()
    }
}

/// A content pointer: one edge (or the ancestor) of an anchored span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Pointer {
    Element(ElementPointer),
    Text(TextPointer),
}

impl Pointer {
    pub fn role(&self) -> Role {
        match self {
            Pointer::Element(p) => p.role,
            Pointer::Text(p) => p.role,
        }
    }
}

/// One replayable edge of a resolved span: a reference element pointer plus
/// the child-index path (deepest index first) back down to the container,
/// and a char offset when the container is a text node.
///
/// Path indices count children as seen with synthetic wrappers removed and
/// adjacent text runs coalesced; replay does the same accounting against
/// the live tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorEdge {
    pub reference: ElementPointer,
    pub path: Vec<usize>,
    pub offset: Option<usize>,
}

/// A cached, cheap-to-replay encoding of a previously resolved span. Valid
/// only against the exact document instance recorded in `doc`; never
/// persisted outside the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub start: LocatorEdge,
    pub end: LocatorEdge,
    pub doc: DocumentId,
}

/// Description of an anchored span within one anchorable ancestor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomRangeDescription {
    pub start: Pointer,
    pub end: Pointer,
    pub ancestor: ElementPointer,
    pub container_id: Option<String>,
    /// Memoized resolution result. Not part of the description's identity
    /// and never serialized; replaced wholesale on each successful
    /// resolution and dumped whenever the document identity differs.
    #[serde(skip)]
    locator: RefCell<Option<Locator>>,
}

impl DomRangeDescription {
    pub fn new(
        start: Pointer,
        end: Pointer,
        ancestor: ElementPointer,
        container_id: Option<String>,
    ) -> Self {
        DomRangeDescription {
            start,
            end,
            ancestor,
            container_id,
            locator: RefCell::new(None),
        }
    }

    pub fn locator(&self) -> Option<Locator> {
        self.locator.borrow().clone()
    }

    pub fn attach_locator(&self, locator: Option<Locator>) {
        *self.locator.borrow_mut() = locator;
    }
}

/// A serializable, edit-resilient reference to a span of a document.
///
/// `Empty` anchors the whole scoping container; `Dom` carries start/end
/// content pointers beneath a named ancestor. Descriptions are value
/// objects: once built, only the locator memo slot ever mutates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RangeDescription {
    Empty { container_id: Option<String> },
    Dom(DomRangeDescription),
}

impl RangeDescription {
    pub fn empty() -> Self {
        RangeDescription::Empty { container_id: None }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RangeDescription::Empty { .. })
    }

    pub fn container_id(&self) -> Option<&str> {
        match self {
            RangeDescription::Empty { container_id } => container_id.as_deref(),
            RangeDescription::Dom(desc) => desc.container_id.as_deref(),
        }
    }

    pub fn locator(&self) -> Option<Locator> {
        match self {
            RangeDescription::Empty { .. } => None,
            RangeDescription::Dom(desc) => desc.locator(),
        }
    }

    pub fn attach_locator(&self, locator: Option<Locator>) {
        if let RangeDescription::Dom(desc) = self {
            desc.attach_locator(locator);
        }
    }
}
