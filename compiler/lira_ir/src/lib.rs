//! Intermediate representation types for the Lira backend.
//!
//! The backend pipeline consumes a type-checked **source IR** (a typed,
//! dependently-typed term language describing instruction semantics) and
//! produces a **target IR** (a linear, imperative instruction form, "LIR")
//! that the emitter turns into portable C.
//!
//! This crate holds everything the pipeline crates share:
//!
//! - [`Sym`] / [`Interner`] — interned identifiers
//! - [`Span`] — byte-range source locations
//! - [`source`] — the source IR: types, type-level arithmetic, constraints,
//!   typed expressions, patterns, and top-level definitions
//! - [`lir`] — the target IR: runtime representations, instructions,
//!   left-values, and right-value atoms
//! - [`ModuleEnv`] / [`Prover`] — lookup environment and the constraint
//!   proving capability consulted during type lowering
//! - [`Config`] — backend configuration toggles
//! - [`zencode`] — deterministic escaping of source identifiers into the C
//!   identifier space

pub mod config;
pub mod env;
pub mod interner;
pub mod lir;
pub mod source;
pub mod span;
pub mod zencode;

pub use config::Config;
pub use env::{fold_constraint, fold_nexp, ConstProver, KidEnv, ModuleEnv, Prover};
pub use interner::{Interner, Sym};
pub use span::Span;
pub use zencode::zencode;
