//! Fatal lowering errors.
//!
//! Everything here halts compilation. Non-fatal situations (the primitive
//! analyzer declining a rewrite) are expressed as `Option`, not as errors.

use lira_ir::Span;
use thiserror::Error;

/// A fatal error raised while translating source IR to target IR.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LowerError {
    /// The source type has no target representation.
    #[error("type is not representable ({detail}) at {span}")]
    TypeLowering { detail: String, span: Span },

    /// A function definition's parameter list does not match its
    /// lowered type.
    #[error("function `{name}` binds {params} parameters but its type has {args} at {span}")]
    Arity {
        name: String,
        params: usize,
        args: usize,
        span: Span,
    },

    /// A rewriter reached an instruction shape it does not recognize.
    /// Always a backend bug, never a user error.
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}
