//! Per-definition compilation: source definitions to lowered target-IR
//! definitions.
//!
//! Definitions lower in source order. Registers and top-level lets enter
//! the global environment as they are seen, so later definitions resolve
//! them; function signatures are visible everywhere through the module
//! environment.

use rustc_hash::FxHashMap;

use lira_ir::lir::{LDef, LFn, LLet, LRegister, LTypeDef, Loc, NameId, Rep, RetKind};
use lira_ir::source::{Ast, Def, FnDef, LetDef, RegisterDef, Ty, TypeDef};
use lira_ir::{zencode, Config, Interner, ModuleEnv, Prover, Sym};

use crate::compile::compile;
use crate::ctx::LowerCtx;
use crate::error::LowerError;
use crate::norm::normalize;
use crate::returns::{rewrite_heap, rewrite_stack};
use crate::ty::lower_ty;

/// Lower every definition of a type-checked input.
pub fn lower_ast(
    ast: &Ast,
    env: &ModuleEnv,
    prover: &dyn Prover,
    config: &Config,
    interner: &Interner,
) -> Result<Vec<LDef>, LowerError> {
    let mut globals: FxHashMap<Sym, Rep> = FxHashMap::default();
    let mut out = Vec::with_capacity(ast.defs.len());

    for def in &ast.defs {
        match def {
            Def::Type(td) => {
                if let Some(ltd) = lower_typedef(env, prover, config, interner, &globals, td)? {
                    out.push(LDef::Type(ltd));
                }
            }
            Def::Fn(f) => {
                let lowered = compile_fn(env, prover, config, interner, &globals, f)?;
                out.push(LDef::Fn(lowered));
            }
            Def::Register(r) => {
                let lowered = compile_register(env, prover, config, interner, &mut globals, r)?;
                out.push(LDef::Register(lowered));
            }
            Def::Let(l) => {
                let lowered = compile_let(env, prover, config, interner, &mut globals, l)?;
                out.push(LDef::Let(lowered));
            }
            // Externs carry no body; the environment already holds
            // their signature and C name.
            Def::Extern(_) => {}
        }
    }
    Ok(out)
}

fn lower_typedef(
    env: &ModuleEnv,
    prover: &dyn Prover,
    config: &Config,
    interner: &Interner,
    globals: &FxHashMap<Sym, Rep>,
    td: &TypeDef,
) -> Result<Option<LTypeDef>, LowerError> {
    if matches!(td, TypeDef::Synonym { .. }) {
        return Ok(None);
    }
    let mut ctx = LowerCtx::new(env, prover, config, interner, globals, String::new());
    let rep = lower_ty(&mut ctx, &Ty::Id(td.id()), lira_ir::Span::DUMMY)?;
    match rep {
        Rep::Struct(id, fields) => Ok(Some(LTypeDef::Struct { id, fields })),
        Rep::Variant(id, ctors) => Ok(Some(LTypeDef::Variant { id, ctors })),
        Rep::Enum(id, members) => Ok(Some(LTypeDef::Enum { id, members })),
        other => Err(LowerError::Invariant(format!(
            "type definition lowered to a non-nominal representation {other:?}"
        ))),
    }
}

fn compile_fn(
    env: &ModuleEnv,
    prover: &dyn Prover,
    config: &Config,
    interner: &Interner,
    globals: &FxHashMap<Sym, Rep>,
    f: &FnDef,
) -> Result<LFn, LowerError> {
    if f.params.len() != f.arg_tys.len() {
        return Err(LowerError::Arity {
            name: interner.lookup(f.id).to_owned(),
            params: f.params.len(),
            args: f.arg_tys.len(),
            span: f.span,
        });
    }

    let end_label = format!("end_function_{}", zencode(interner.lookup(f.id)));
    let mut ctx = LowerCtx::new(env, prover, config, interner, globals, end_label.clone());

    let mut params = Vec::with_capacity(f.params.len());
    for (p, ty) in f.params.iter().zip(&f.arg_tys) {
        let rep = lower_ty(&mut ctx, ty, f.span)?;
        ctx.bind(*p, rep.clone());
        params.push((NameId::name(*p), rep));
    }
    let ret_rep = lower_ty(&mut ctx, &f.ret_ty, f.span)?;

    let ae = normalize(&mut ctx, &f.body)?;
    let mut body = Vec::new();
    compile(
        &mut ctx,
        &ae,
        &Loc::Id(NameId::Return, ret_rep.clone()),
        &mut body,
    )?;

    let (ret, body) = if ret_rep.is_stack() {
        let slot = NameId::name(ctx.fresh("ret"));
        let rewritten = rewrite_stack(slot, &ret_rep, body, &end_label)?;
        (RetKind::Stack(ret_rep), rewritten)
    } else {
        let rewritten = rewrite_heap(body, &end_label)?;
        (RetKind::Heap(ret_rep), rewritten)
    };

    tracing::debug!(
        function = interner.lookup(f.id),
        instrs = body.len(),
        "lowered function"
    );

    Ok(LFn {
        id: f.id,
        params,
        ret,
        body,
        span: f.span,
    })
}

fn compile_register(
    env: &ModuleEnv,
    prover: &dyn Prover,
    config: &Config,
    interner: &Interner,
    globals: &mut FxHashMap<Sym, Rep>,
    r: &RegisterDef,
) -> Result<LRegister, LowerError> {
    let rep = {
        let mut ctx = LowerCtx::new(env, prover, config, interner, globals, String::new());
        lower_ty(&mut ctx, &r.ty, r.span)?
    };
    globals.insert(r.id, rep.clone());

    let mut init = Vec::new();
    if let Some(init_expr) = &r.init {
        let mut ctx = LowerCtx::new(
            env,
            prover,
            config,
            interner,
            globals,
            "end_register_init".to_owned(),
        );
        let ae = normalize(&mut ctx, init_expr)?;
        compile(&mut ctx, &ae, &Loc::Id(NameId::name(r.id), rep.clone()), &mut init)?;
    }

    Ok(LRegister {
        id: r.id,
        rep,
        init,
    })
}

fn compile_let(
    env: &ModuleEnv,
    prover: &dyn Prover,
    config: &Config,
    interner: &Interner,
    globals: &mut FxHashMap<Sym, Rep>,
    l: &LetDef,
) -> Result<LLet, LowerError> {
    let (rep, setup) = {
        let mut ctx = LowerCtx::new(
            env,
            prover,
            config,
            interner,
            globals,
            "end_letbind".to_owned(),
        );
        let rep = lower_ty(&mut ctx, &l.ty, l.span)?;
        let ae = normalize(&mut ctx, &l.body)?;
        let mut setup = Vec::new();
        compile(&mut ctx, &ae, &Loc::Id(NameId::name(l.id), rep.clone()), &mut setup)?;
        (rep, setup)
    };
    globals.insert(l.id, rep.clone());

    let teardown = if rep.is_heap() {
        vec![lira_ir::lir::Instr::new(lira_ir::lir::InstrKind::Clear(
            rep.clone(),
            NameId::name(l.id),
        ))]
    } else {
        Vec::new()
    };

    Ok(LLet {
        id: l.id,
        rep,
        setup,
        teardown,
    })
}
