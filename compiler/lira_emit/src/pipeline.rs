//! The backend pipeline driver.
//!
//! Fixed pass order: definition lowering (with primitive specialization
//! inline), variant specialization, unique names, alias passes,
//! allocation hoisting, then emission (which performs the type sort).
//! Variant specialization and the type sort always run before emission;
//! hoisting always runs after unique names; emission runs last. The
//! pipeline is `Result`-based and stops at the first fatal error.
//!
//! Each invocation owns all of its state (name counters, emitted-type
//! sets); concurrent runs in one process are not supported, but
//! sequential runs never observe each other.

use thiserror::Error;

use lira_ir::source::Ast;
use lira_ir::{Config, Interner, ModuleEnv, Prover};
use lira_lower::LowerError;

use crate::error::EmitError;

/// Any fatal error from the backend pipeline.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error(transparent)]
    Lower(#[from] LowerError),
    #[error(transparent)]
    Emit(#[from] EmitError),
}

/// Compile a type-checked input to C source text.
pub fn compile_ast(
    ast: &Ast,
    interner: &Interner,
    prover: &dyn Prover,
    config: &Config,
) -> Result<String, PipelineError> {
    let env = ModuleEnv::from_ast(ast, interner);

    tracing::debug!(defs = ast.defs.len(), "lowering definitions");
    let mut defs = lira_lower::lower_ast(ast, &env, prover, config, interner)?;

    tracing::debug!("specializing variant constructors");
    lira_lower::specialize_variants(&mut defs, interner)?;

    if config.optimize_alias || config.optimize_hoist_allocations {
        tracing::debug!("uniquifying names");
        lira_opt::unique_names(&mut defs);
    }
    if config.optimize_alias {
        tracing::debug!("running alias passes");
        lira_opt::remove_alias(&mut defs);
        lira_opt::combine_variables(&mut defs);
    }
    if config.optimize_hoist_allocations {
        tracing::debug!("hoisting heap allocations");
        lira_opt::hoist_allocations(&mut defs, interner);
    }
    if config.optimize_experimental && config.optimize_alias {
        tracing::debug!("running experimental hoist-alias");
        lira_opt::hoist_alias(&mut defs);
    }

    check_poly(&defs, interner)?;

    tracing::debug!("emitting C");
    let text = crate::c::emit(&defs, &env, interner, config)?;
    Ok(text)
}

/// A representation still polymorphic this late is fatal.
fn check_poly(defs: &[lira_ir::lir::LDef], interner: &Interner) -> Result<(), EmitError> {
    use lira_ir::lir::{LDef, LTypeDef, RetKind};
    for def in defs {
        match def {
            LDef::Type(td) => {
                let leaked = match td {
                    LTypeDef::Struct { fields, .. } => fields.iter().any(|(_, r)| r.has_poly()),
                    LTypeDef::Variant { ctors, .. } => ctors.iter().any(|(_, r)| r.has_poly()),
                    LTypeDef::Enum { .. } => false,
                };
                if leaked {
                    return Err(EmitError::PolyLeak(interner.lookup(td.id()).to_owned()));
                }
            }
            LDef::Fn(f) => {
                let ret_poly = match &f.ret {
                    RetKind::Stack(r) | RetKind::Heap(r) => r.has_poly(),
                };
                if ret_poly || f.params.iter().any(|(_, r)| r.has_poly()) {
                    return Err(EmitError::PolyLeak(interner.lookup(f.id).to_owned()));
                }
            }
            LDef::Register(r) => {
                if r.rep.has_poly() {
                    return Err(EmitError::PolyLeak(interner.lookup(r.id).to_owned()));
                }
            }
            LDef::Let(l) => {
                if l.rep.has_poly() {
                    return Err(EmitError::PolyLeak(interner.lookup(l.id).to_owned()));
                }
            }
        }
    }
    Ok(())
}
