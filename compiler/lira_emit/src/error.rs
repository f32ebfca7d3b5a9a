//! Fatal emission errors.

use thiserror::Error;

/// A fatal error raised while ordering or emitting generated code.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EmitError {
    /// Type definitions depend on each other cyclically (other than
    /// through their own indirection).
    #[error("cycle in type definitions involving `{0}`")]
    TypeCycle(String),

    /// A representation is still polymorphic after specialization.
    #[error("type `{0}` remains polymorphic after specialization")]
    PolyLeak(String),

    /// The emitter reached a shape it does not recognize. Always a
    /// backend bug.
    #[error("internal emitter invariant violated: {0}")]
    Invariant(String),
}
