//! In-memory document tree and span primitives.
//!
//! The anchoring engine never talks to a real rendering host. Everything it
//! needs from one (node classification, navigation, attributes, subtree
//! snapshots, text normalization, and DOM-`Range`-like spans) lives behind
//! this module, which keeps the resolver unit-testable against trees built
//! directly in code.

pub(crate) mod chars;
pub mod span;
pub mod tree;
pub mod walker;

pub use span::{Boundary, DomSpan, compare_boundaries, node_length};
pub use tree::{DocTree, DocumentId, NodeId};
pub use walker::TextWalker;
