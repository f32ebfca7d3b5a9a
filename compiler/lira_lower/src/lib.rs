//! Source-IR to target-IR translation for the Lira backend.
//!
//! This crate owns the front half of the backend pipeline:
//!
//! - **Type lowering** ([`ty`]) — one target representation per source
//!   type, driven by constraint solving over integer kinds.
//! - **A-normalization** ([`norm`]) — operands of calls, branches, and
//!   projections become atoms; every atom carries its representation.
//! - **Primitive specialization** ([`primop`]) — builtin calls over
//!   known representations rewrite to inline machine-level fragments.
//! - **Instruction selection** ([`compile`]) — destination-passing
//!   translation into linear target-IR instructions.
//! - **Return rewriting** ([`returns`]) — a single exit label per
//!   function, with stack slots or caller-provided heap pointers.
//! - **Variant specialization** ([`specialize`]) — polymorphic
//!   constructors monomorphize by call-site usage.
//! - **Definition lowering** ([`fns`]) — functions, registers, and
//!   top-level lets.
//!
//! Later passes (unique names, alias removal, allocation hoisting) and
//! emission live in `lira_opt` and `lira_emit`.

pub mod compile;
pub mod ctx;
mod error;
pub mod fns;
pub mod norm;
pub mod primop;
pub mod returns;
pub mod specialize;
mod stack;
pub mod ty;

pub use compile::compile as compile_aexpr;
pub use ctx::LowerCtx;
pub use error::LowerError;
pub use fns::lower_ast;
pub use norm::{normalize, AArm, AExpr, AExprKind, ALoc, AVal};
pub use returns::{rewrite_heap, rewrite_stack};
pub use specialize::specialize_variants;
pub use ty::lower_ty;

#[cfg(test)]
mod tests;
