//! C emission for the Lira backend.
//!
//! This crate owns the back half of the pipeline:
//!
//! - [`toposort`] — type definitions order by dependency, with cycle
//!   detection.
//! - [`c`] — the C backend: type mapping, auxiliary type
//!   deduplication, per-instruction statement translation, and the
//!   `model_init` / `model_fini` / `model_main` / `main` scaffold.
//! - [`pipeline`] — the driver that sequences lowering, the
//!   optimization passes, and emission, short-circuiting on the first
//!   fatal error.

pub mod c;
pub mod context;
mod error;
pub mod pipeline;
pub mod toposort;

pub use c::emit;
pub use context::EmitCtx;
pub use error::EmitError;
pub use pipeline::{compile_ast, PipelineError};
pub use toposort::sort_type_defs;

#[cfg(test)]
mod tests;
