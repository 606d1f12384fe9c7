pub mod anchoring;
pub mod dom;
pub mod error;

// Re-export key types for easier usage
pub use anchoring::{
    describe_range, preresolve_locators, range_still_resolves, resolve_range, DescribedRange,
    DomRangeDescription, ElementPointer, Locator, Pointer, RangeDescription, Role, TextContext,
    TextPointer, CONFIDENCE_CUTOFF,
};
pub use dom::{Boundary, DocTree, DocumentId, DomSpan, NodeId, TextWalker};
pub use error::{AnchorError, Result};
