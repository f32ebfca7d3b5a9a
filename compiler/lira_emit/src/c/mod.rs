//! The C backend: translation from the target IR to C source text.
//!
//! Emission order: include preamble, enum definitions, forward
//! declarations, auxiliary and user type definitions in dependency
//! order (auxiliary definitions deduplicated by canonical spelling),
//! register declarations, exception state, function prototypes,
//! top-level let declarations, function bodies, let initializer and
//! finalizer pairs, and the `model_init` / `model_fini` / `model_main`
//! / `main` scaffold.

pub mod expr;
pub mod function;
pub mod runtime;
pub mod types;

use lira_ir::lir::LDef;
use lira_ir::{Config, Interner, ModuleEnv};

use crate::context::EmitCtx;
use crate::error::EmitError;

/// Emit the complete C artifact for a set of lowered definitions.
pub fn emit(
    defs: &[LDef],
    env: &ModuleEnv,
    interner: &Interner,
    config: &Config,
) -> Result<String, EmitError> {
    let mut ctx = EmitCtx::new(env, interner, config);
    for def in defs {
        if let LDef::Fn(f) = def {
            ctx.fn_rets.insert(f.id, f.ret.clone());
        }
    }

    runtime::emit_preamble(&mut ctx);
    types::emit_typedefs(&mut ctx, defs)?;
    runtime::emit_registers(&mut ctx, defs);
    runtime::emit_exception_state(&mut ctx)?;
    function::emit_prototypes(&mut ctx, defs);
    runtime::emit_let_declarations(&mut ctx, defs);
    for def in defs {
        if let LDef::Fn(f) = def {
            function::emit_fn(&mut ctx, f)?;
        }
    }
    runtime::emit_let_bindings(&mut ctx, defs)?;
    runtime::emit_scaffold(&mut ctx, defs)?;

    Ok(ctx.take_output())
}
