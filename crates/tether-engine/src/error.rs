/// Hard failures of the anchoring engine.
///
/// Only construction-time problems are errors: a caller handing us something
/// unusable, or a document with no eligible anchor points at all. Failing to
/// re-locate a description in a mutated tree is an expected outcome and is
/// reported as `None` / zero confidence, never through this enum.
#[derive(Debug, thiserror::Error)]
pub enum AnchorError {
    #[error("malformed input: {0}")]
    MalformedInput(&'static str),
    #[error("no anchorable node in the ancestor chain")]
    NoAnchorableAncestor,
}

pub type Result<T> = std::result::Result<T, AnchorError>;
