//! Target-IR optimization passes for the Lira backend.
//!
//! All passes rewrite lowered definitions in place and are conservative:
//! when liveness or scoping cannot be proven from the instruction
//! stream, a candidate rewrite is declined.
//!
//! - [`unique_names`] — one fresh identifier per declare that reuses an
//!   earlier name in the same function. Must run before hoisting.
//! - [`remove_alias`] / [`combine_variables`] — copy-elimination
//!   peepholes over create/copy/kill windows.
//! - [`hoist_alias`] — experimental shallow-aliasing rewrite after a
//!   reset of a struct-represented local.
//! - [`hoist_allocations`] — heap-represented locals move to the
//!   function prologue/epilogue; skipped for (mutually) recursive
//!   functions because a hoisted slot would be shared across
//!   activations.

pub mod alias;
pub mod graph;
pub mod hoist;
pub mod unique;

pub use alias::{combine_variables, hoist_alias, remove_alias};
pub use graph::recursive_fns;
pub use hoist::hoist_allocations;
pub use unique::unique_names;

#[cfg(test)]
mod tests;
