//! Instruction selection: normalized expressions to linear target-IR
//! instructions.
//!
//! Compilation is destination-passing: every expression compiles into a
//! sequence of instructions that ends by assigning the designated
//! left-value. The compiler honors short-circuit evaluation (conditions
//! are branches, never strict operators), exception-propagation edges
//! (calls that can throw are followed by a pending-exception check that
//! transfers to the innermost handler), declare-before-use for every
//! introduced local, and a clear on every exit path for heap-represented
//! locals. Textual bindings get one declare each; names are made unique
//! by a later pass.

use lira_ir::lir::{CallTarget, Instr, InstrKind, Loc, NameId, Op, Rep, VLit, Val};
use lira_ir::source::Pat;
use lira_ir::zencode;

use crate::ctx::LowerCtx;
use crate::error::LowerError;
use crate::norm::{exception_rep, vlit_of_lit, AExpr, AExprKind, ALoc, AArm, AVal};
use crate::primop;

/// Compile a normalized expression into `out`, ending with an
/// assignment to `dst`.
pub fn compile(
    ctx: &mut LowerCtx<'_>,
    ae: &AExpr,
    dst: &Loc,
    out: &mut Vec<Instr>,
) -> Result<(), LowerError> {
    crate::stack::ensure_sufficient_stack(|| compile_inner(ctx, ae, dst, out))
}

fn push(out: &mut Vec<Instr>, kind: InstrKind) {
    out.push(Instr::new(kind));
}

fn compile_inner(
    ctx: &mut LowerCtx<'_>,
    ae: &AExpr,
    dst: &Loc,
    out: &mut Vec<Instr>,
) -> Result<(), LowerError> {
    match &ae.kind {
        AExprKind::Val(aval) => {
            assign_aval(ctx, aval, dst, out)?;
            Ok(())
        }

        AExprKind::App { f, args } => {
            if let Some(rewritten) = primop::analyze(ctx, *f, args, &ae.rep) {
                return assign_aval(ctx, &rewritten, dst, out);
            }
            let name = ctx.interner.lookup(*f);
            let target = if ctx.env.fn_sig(*f).is_some() {
                CallTarget::Fn(*f)
            } else if let Some(rt) = runtime_name(name) {
                CallTarget::Rt(rt)
            } else {
                return Err(LowerError::Invariant(format!(
                    "call to unknown operation `{name}` at {}",
                    ae.span
                )));
            };
            let is_lira_fn =
                matches!(&target, CallTarget::Fn(f) if ctx.env.extern_name(*f).is_none());

            let mut temps = Vec::new();
            let mut vals = Vec::with_capacity(args.len());
            for a in args {
                vals.push(val_of(ctx, a, out, &mut temps)?);
            }
            push(out, InstrKind::Call(dst.clone(), target, vals));
            clear_temps(out, &mut temps);

            if is_lira_fn && ctx.env.has_exceptions() {
                exception_check(ctx, out);
            }
            Ok(())
        }

        AExprKind::Ctor { variant, ctor, arg } => {
            let mut temps = Vec::new();
            let val = val_of(ctx, arg, out, &mut temps)?;
            push(
                out,
                InstrKind::Call(dst.clone(), CallTarget::Ctor(*variant, *ctor), vec![val]),
            );
            clear_temps(out, &mut temps);
            Ok(())
        }

        AExprKind::Field { obj, field } => {
            let mut temps = Vec::new();
            let obj = val_of(ctx, obj, out, &mut temps)?;
            push(
                out,
                InstrKind::Copy(
                    dst.clone(),
                    Val::Field(Box::new(obj), *field, ae.rep.clone()),
                ),
            );
            clear_temps(out, &mut temps);
            Ok(())
        }

        AExprKind::Let {
            mutable: _,
            id,
            rep,
            value,
            body,
        } => {
            let name = NameId::name(*id);
            push(out, InstrKind::Decl(rep.clone(), name));
            let cmark = ctx.cleanup_mark();
            if rep.is_heap() {
                ctx.cleanup_push(name, rep.clone());
            }
            compile(ctx, value, &Loc::Id(name, rep.clone()), out)?;
            let mark = ctx.mark();
            ctx.bind(*id, rep.clone());
            compile(ctx, body, dst, out)?;
            ctx.release(mark);
            if rep.is_heap() {
                push(out, InstrKind::Clear(rep.clone(), name));
            }
            ctx.cleanup_release(cmark);
            Ok(())
        }

        AExprKind::If {
            cond,
            then_e,
            else_e,
        } => {
            let mut temps = Vec::new();
            let cond = val_of(ctx, cond, out, &mut temps)?;
            let mut then_is = Vec::new();
            compile(ctx, then_e, dst, &mut then_is)?;
            let mut else_is = Vec::new();
            compile(ctx, else_e, dst, &mut else_is)?;
            push(out, InstrKind::If(cond, then_is, else_is, ae.rep.clone()));
            clear_temps(out, &mut temps);
            Ok(())
        }

        AExprKind::Match { scrutinee, arms } => {
            let mut temps = Vec::new();
            let sval = val_of(ctx, scrutinee, out, &mut temps)?;
            compile_arms(ctx, arms, &sval, dst, NoMatch::Failure, out)?;
            clear_temps(out, &mut temps);
            Ok(())
        }

        AExprKind::Try { body, arms } => {
            let handler = ctx.label("try_handler");
            let after = ctx.label("try_after");

            ctx.push_handler(handler.clone());
            let mut body_is = Vec::new();
            compile(ctx, body, dst, &mut body_is)?;
            ctx.pop_handler();

            push(out, InstrKind::TryBlock(body_is));
            push(out, InstrKind::Goto(after.clone()));
            push(out, InstrKind::Label(handler));
            push(
                out,
                InstrKind::Copy(
                    Loc::Id(NameId::HaveException, Rep::Bool),
                    Val::Lit(VLit::Bool(false), Rep::Bool),
                ),
            );
            let exc_rep = exception_rep(ctx, ae.span)?;
            let sval = Val::Id(NameId::CurrentException, exc_rep);
            compile_arms(ctx, arms, &sval, dst, NoMatch::Rethrow, out)?;
            push(out, InstrKind::Label(after));
            Ok(())
        }

        AExprKind::Block { stmts, result } => {
            for stmt in stmts {
                let gs = NameId::name(ctx.fresh("gs"));
                push(out, InstrKind::Decl(stmt.rep.clone(), gs));
                let cmark = ctx.cleanup_mark();
                if stmt.rep.is_heap() {
                    ctx.cleanup_push(gs, stmt.rep.clone());
                }
                compile(ctx, stmt, &Loc::Id(gs, stmt.rep.clone()), out)?;
                if stmt.rep.is_heap() {
                    push(out, InstrKind::Clear(stmt.rep.clone(), gs));
                }
                ctx.cleanup_release(cmark);
            }
            compile(ctx, result, dst, out)
        }

        AExprKind::Assign { dst: aloc, value } => {
            let loc = loc_of_aloc(aloc);
            compile(ctx, value, &loc, out)?;
            // The assignment expression itself is unit-valued.
            push(
                out,
                InstrKind::Copy(dst.clone(), Val::Lit(VLit::Unit, Rep::Unit)),
            );
            Ok(())
        }

        AExprKind::Return(aval) => {
            let mut temps = Vec::new();
            let val = val_of(ctx, aval, out, &mut temps)?;
            let rep = val.rep();
            push(out, InstrKind::Copy(Loc::Id(NameId::Return, rep), val));
            clear_temps(out, &mut temps);
            for (id, rep) in ctx.cleanup_since(0) {
                push(out, InstrKind::Clear(rep, id));
            }
            push(out, InstrKind::Goto(ctx.end_label.clone()));
            Ok(())
        }

        AExprKind::Throw(aval) => {
            let exc_rep = exception_rep(ctx, ae.span)?;
            let mut temps = Vec::new();
            let val = val_of(ctx, aval, out, &mut temps)?;
            push(
                out,
                InstrKind::Copy(Loc::Id(NameId::CurrentException, exc_rep), val),
            );
            push(
                out,
                InstrKind::Copy(
                    Loc::Id(NameId::ThrowLocation, Rep::String),
                    Val::Lit(VLit::String(format!("{}", ae.span)), Rep::String),
                ),
            );
            push(
                out,
                InstrKind::Copy(
                    Loc::Id(NameId::HaveException, Rep::Bool),
                    Val::Lit(VLit::Bool(true), Rep::Bool),
                ),
            );
            clear_temps(out, &mut temps);
            let (target, depth) = ctx.exception_target();
            for (id, rep) in ctx.cleanup_since(depth) {
                push(out, InstrKind::Clear(rep, id));
            }
            push(out, InstrKind::Goto(target));
            Ok(())
        }

        AExprKind::Assert { cond, msg } => {
            // Experimental mode elides assertions entirely.
            if ctx.config.optimize_experimental {
                return Ok(());
            }
            let mut temps = Vec::new();
            let cond = val_of(ctx, cond, out, &mut temps)?;
            let msg = val_of(ctx, msg, out, &mut temps)?;
            let gs = NameId::name(ctx.fresh("gs"));
            push(out, InstrKind::Decl(Rep::Unit, gs));
            push(
                out,
                InstrKind::Call(Loc::Id(gs, Rep::Unit), CallTarget::Rt("rt_assert"), vec![cond, msg]),
            );
            clear_temps(out, &mut temps);
            Ok(())
        }

        AExprKind::Exit(aval) => {
            let mut temps = Vec::new();
            let val = val_of(ctx, aval, out, &mut temps)?;
            let gs = NameId::name(ctx.fresh("gs"));
            push(out, InstrKind::Decl(Rep::Unit, gs));
            push(
                out,
                InstrKind::Call(Loc::Id(gs, Rep::Unit), CallTarget::Rt("rt_exit"), vec![val]),
            );
            clear_temps(out, &mut temps);
            Ok(())
        }

        AExprKind::RegRef(reg) => {
            let text = format!("&{}", zencode(ctx.interner.lookup(*reg)));
            push(
                out,
                InstrKind::Copy(dst.clone(), Val::Raw(text, ae.rep.clone())),
            );
            Ok(())
        }

        AExprKind::For {
            id,
            from,
            to,
            step,
            ascending,
            body,
        } => {
            let mut temps = Vec::new();
            let from = val_of(ctx, from, out, &mut temps)?;
            let to = val_of(ctx, to, out, &mut temps)?;
            let step = val_of(ctx, step, out, &mut temps)?;

            let idx = NameId::name(*id);
            let int64 = Rep::FInt(64);
            push(out, InstrKind::Decl(int64.clone(), idx));
            push(out, InstrKind::Copy(Loc::Id(idx, int64.clone()), from));

            let start = ctx.label("for_start");
            let end = ctx.label("for_end");
            let mark = ctx.mark();
            ctx.bind(*id, int64.clone());

            push(out, InstrKind::Label(start.clone()));
            let exit_op = if *ascending { Op::Igt } else { Op::Ilt };
            push(
                out,
                InstrKind::Jump(
                    Val::Call(exit_op, vec![Val::Id(idx, int64.clone()), to], Rep::Bool),
                    end.clone(),
                ),
            );

            let gs = NameId::name(ctx.fresh("gs"));
            push(out, InstrKind::Decl(body.rep.clone(), gs));
            compile(ctx, body, &Loc::Id(gs, body.rep.clone()), out)?;

            let step_op = if *ascending { Op::Iadd } else { Op::Isub };
            push(
                out,
                InstrKind::Copy(
                    Loc::Id(idx, int64.clone()),
                    Val::Call(step_op, vec![Val::Id(idx, int64.clone()), step], int64),
                ),
            );
            push(out, InstrKind::Goto(start));
            push(out, InstrKind::Label(end));

            ctx.release(mark);
            clear_temps(out, &mut temps);
            Ok(())
        }

        AExprKind::Loop { until, cond, body } => {
            let start = ctx.label("loop_start");
            let end = ctx.label("loop_end");
            let flag = NameId::name(ctx.fresh("gs"));
            push(out, InstrKind::Decl(Rep::Bool, flag));
            let flag_loc = Loc::Id(flag, Rep::Bool);
            let flag_val = Val::Id(flag, Rep::Bool);

            push(out, InstrKind::Label(start.clone()));
            if *until {
                let gs = NameId::name(ctx.fresh("gs"));
                push(out, InstrKind::Decl(body.rep.clone(), gs));
                compile(ctx, body, &Loc::Id(gs, body.rep.clone()), out)?;
                compile(ctx, cond, &flag_loc, out)?;
                push(
                    out,
                    InstrKind::Jump(
                        Val::Call(Op::Not, vec![flag_val], Rep::Bool),
                        start,
                    ),
                );
            } else {
                compile(ctx, cond, &flag_loc, out)?;
                push(
                    out,
                    InstrKind::Jump(
                        Val::Call(Op::Not, vec![flag_val], Rep::Bool),
                        end.clone(),
                    ),
                );
                let gs = NameId::name(ctx.fresh("gs"));
                push(out, InstrKind::Decl(body.rep.clone(), gs));
                compile(ctx, body, &Loc::Id(gs, body.rep.clone()), out)?;
                push(out, InstrKind::Goto(start));
            }
            push(out, InstrKind::Label(end));
            Ok(())
        }
    }
}

// ── Atoms ───────────────────────────────────────────────────────────

/// Convert an atom into a target-IR value, materializing tuples into
/// fresh temporaries. Heap temporaries are recorded in `temps` and must
/// be cleared once the consuming instruction has been pushed.
fn val_of(
    ctx: &mut LowerCtx<'_>,
    aval: &AVal,
    out: &mut Vec<Instr>,
    temps: &mut Vec<(NameId, Rep)>,
) -> Result<Val, LowerError> {
    if let Some(v) = aval.to_val() {
        return Ok(v);
    }
    match aval {
        AVal::Tuple(_) => {
            let rep = aval.rep();
            let gs = NameId::name(ctx.fresh("gs"));
            push(out, InstrKind::Decl(rep.clone(), gs));
            assign_aval(ctx, aval, &Loc::Id(gs, rep.clone()), out)?;
            if rep.is_heap() {
                temps.push((gs, rep.clone()));
            }
            Ok(Val::Id(gs, rep))
        }
        AVal::Lit(lit, rep) => Err(LowerError::Invariant(format!(
            "literal {lit:?} has no value of representation {rep:?}"
        ))),
        _ => Err(LowerError::Invariant("unconvertible atom".into())),
    }
}

fn clear_temps(out: &mut Vec<Instr>, temps: &mut Vec<(NameId, Rep)>) {
    for (id, rep) in temps.drain(..).rev() {
        push(out, InstrKind::Clear(rep, id));
    }
}

/// Assign an atom to a destination, copying tuples componentwise.
fn assign_aval(
    ctx: &mut LowerCtx<'_>,
    aval: &AVal,
    dst: &Loc,
    out: &mut Vec<Instr>,
) -> Result<(), LowerError> {
    match aval {
        AVal::Tuple(elems) => {
            for (i, elem) in elems.iter().enumerate() {
                let comp = Loc::Tuple(Box::new(dst.clone()), i);
                assign_aval(ctx, elem, &comp, out)?;
            }
            Ok(())
        }
        _ => {
            let val = aval.to_val().ok_or_else(|| {
                LowerError::Invariant("atom has no direct value form".into())
            })?;
            push(out, InstrKind::Copy(dst.clone(), val));
            Ok(())
        }
    }
}

fn loc_of_aloc(aloc: &ALoc) -> Loc {
    match aloc {
        ALoc::Id(id, rep) => Loc::Id(NameId::name(*id), rep.clone()),
        ALoc::Field(base, field, _) => Loc::Field(Box::new(loc_of_aloc(base)), *field),
    }
}

// ── Exception edges ─────────────────────────────────────────────────

/// After a call that can throw: when the pending flag is set, clear the
/// heap locals born since the target handler and transfer to it.
fn exception_check(ctx: &mut LowerCtx<'_>, out: &mut Vec<Instr>) {
    let (target, depth) = ctx.exception_target();
    let have = Val::Id(NameId::HaveException, Rep::Bool);
    let pending = ctx.cleanup_since(depth);
    if pending.is_empty() {
        push(out, InstrKind::Jump(have, target));
    } else {
        let mut cleanup = Vec::new();
        for (id, rep) in pending {
            cleanup.push(Instr::new(InstrKind::Clear(rep, id)));
        }
        cleanup.push(Instr::new(InstrKind::Goto(target)));
        push(out, InstrKind::If(have, cleanup, Vec::new(), Rep::Unit));
    }
}

// ── Match compilation ───────────────────────────────────────────────

/// What happens when no arm matches.
enum NoMatch {
    /// Raise a match failure.
    Failure,
    /// Re-set the pending flag and transfer to the enclosing handler
    /// (used for `try` arms over the current exception).
    Rethrow,
}

fn compile_arms(
    ctx: &mut LowerCtx<'_>,
    arms: &[AArm],
    sval: &Val,
    dst: &Loc,
    no_match: NoMatch,
    out: &mut Vec<Instr>,
) -> Result<(), LowerError> {
    let end = ctx.label("match_end");

    for arm in arms {
        let next = ctx.label("match_arm");
        let mark = ctx.mark();
        let cmark = ctx.cleanup_mark();

        // Tests run before any binding, so a mismatch jump never skips
        // a live heap binding.
        pat_tests(ctx, &arm.pat, sval, &next, out)?;

        let mut bound = Vec::new();
        pat_binds(ctx, &arm.pat, sval, out, &mut bound)?;
        for (id, rep) in &bound {
            if rep.is_heap() {
                ctx.cleanup_push(*id, rep.clone());
            }
        }

        if let Some(guard) = &arm.guard {
            let flag = NameId::name(ctx.fresh("gs"));
            push(out, InstrKind::Decl(Rep::Bool, flag));
            compile(ctx, guard, &Loc::Id(flag, Rep::Bool), out)?;
            // A failed guard must release this arm's heap bindings
            // before trying the next arm.
            let mut onto_next = Vec::new();
            for (id, rep) in bound.iter().rev() {
                if rep.is_heap() {
                    onto_next.push(Instr::new(InstrKind::Clear(rep.clone(), *id)));
                }
            }
            onto_next.push(Instr::new(InstrKind::Goto(next.clone())));
            push(
                out,
                InstrKind::If(
                    Val::Call(Op::Not, vec![Val::Id(flag, Rep::Bool)], Rep::Bool),
                    onto_next,
                    Vec::new(),
                    Rep::Unit,
                ),
            );
        }

        compile(ctx, &arm.body, dst, out)?;

        for (id, rep) in bound.iter().rev() {
            if rep.is_heap() {
                push(out, InstrKind::Clear(rep.clone(), *id));
            }
        }
        ctx.release(mark);
        ctx.cleanup_release(cmark);

        push(out, InstrKind::Goto(end.clone()));
        push(out, InstrKind::Label(next));
    }

    match no_match {
        NoMatch::Failure => push(out, InstrKind::MatchFailure),
        NoMatch::Rethrow => {
            push(
                out,
                InstrKind::Copy(
                    Loc::Id(NameId::HaveException, Rep::Bool),
                    Val::Lit(VLit::Bool(true), Rep::Bool),
                ),
            );
            let (target, depth) = ctx.exception_target();
            for (id, rep) in ctx.cleanup_since(depth) {
                push(out, InstrKind::Clear(rep, id));
            }
            push(out, InstrKind::Goto(target));
        }
    }
    push(out, InstrKind::Label(end));
    Ok(())
}

/// Emit the mismatch tests of a pattern: one conditional jump to
/// `fail` per refutable position.
fn pat_tests(
    ctx: &mut LowerCtx<'_>,
    pat: &Pat,
    val: &Val,
    fail: &str,
    out: &mut Vec<Instr>,
) -> Result<(), LowerError> {
    match pat {
        Pat::Wild | Pat::Id(_) => Ok(()),
        Pat::Typed(inner, _) => pat_tests(ctx, inner, val, fail, out),
        Pat::Lit(lit) => {
            if *lit == lira_ir::source::Lit::Unit {
                return Ok(());
            }
            let rep = val.rep();
            if rep.is_heap() {
                return Err(LowerError::Invariant(
                    "literal pattern over a heap representation".into(),
                ));
            }
            let Some(vlit) = vlit_of_lit(lit, &rep) else {
                return Err(LowerError::Invariant(format!(
                    "literal pattern {lit:?} has no value at {rep:?}"
                )));
            };
            push(
                out,
                InstrKind::Jump(
                    Val::Call(
                        Op::Neq,
                        vec![val.clone(), Val::Lit(vlit, rep)],
                        Rep::Bool,
                    ),
                    fail.to_owned(),
                ),
            );
            Ok(())
        }
        Pat::Tuple(pats) => {
            let Rep::Tup(reps) = val.rep() else {
                return Err(LowerError::Invariant(
                    "tuple pattern against a non-tuple value".into(),
                ));
            };
            for (i, (p, r)) in pats.iter().zip(reps).enumerate() {
                let comp = Val::Tuple(Box::new(val.clone()), i, r);
                pat_tests(ctx, p, &comp, fail, out)?;
            }
            Ok(())
        }
        Pat::Ctor(ctor, inner) => {
            push(
                out,
                InstrKind::Jump(
                    Val::Call(
                        Op::Not,
                        vec![Val::CtorKind(Box::new(val.clone()), *ctor)],
                        Rep::Bool,
                    ),
                    fail.to_owned(),
                ),
            );
            let arg_rep = ctor_arg_rep(ctx, *ctor)?;
            let unwrapped = Val::CtorUnwrap(Box::new(val.clone()), *ctor, arg_rep);
            pat_tests(ctx, inner, &unwrapped, fail, out)
        }
    }
}

/// Emit the bindings of a pattern that has already passed its tests.
fn pat_binds(
    ctx: &mut LowerCtx<'_>,
    pat: &Pat,
    val: &Val,
    out: &mut Vec<Instr>,
    bound: &mut Vec<(NameId, Rep)>,
) -> Result<(), LowerError> {
    match pat {
        Pat::Wild | Pat::Lit(_) => Ok(()),
        Pat::Id(id) => {
            let rep = val.rep();
            let name = NameId::name(*id);
            push(out, InstrKind::Init(rep.clone(), name, val.clone()));
            ctx.bind(*id, rep.clone());
            bound.push((name, rep));
            Ok(())
        }
        Pat::Typed(inner, _) => pat_binds(ctx, inner, val, out, bound),
        Pat::Tuple(pats) => {
            let Rep::Tup(reps) = val.rep() else {
                return Err(LowerError::Invariant(
                    "tuple pattern against a non-tuple value".into(),
                ));
            };
            for (i, (p, r)) in pats.iter().zip(reps).enumerate() {
                let comp = Val::Tuple(Box::new(val.clone()), i, r);
                pat_binds(ctx, p, &comp, out, bound)?;
            }
            Ok(())
        }
        Pat::Ctor(ctor, inner) => {
            let arg_rep = ctor_arg_rep(ctx, *ctor)?;
            let unwrapped = Val::CtorUnwrap(Box::new(val.clone()), *ctor, arg_rep);
            pat_binds(ctx, inner, &unwrapped, out, bound)
        }
    }
}

fn ctor_arg_rep(ctx: &mut LowerCtx<'_>, ctor: lira_ir::Sym) -> Result<Rep, LowerError> {
    let arg_ty = ctx.env.ctor_arg_ty(ctor).cloned().ok_or_else(|| {
        LowerError::Invariant(format!(
            "unknown constructor `{}` in pattern",
            ctx.interner.lookup(ctor)
        ))
    })?;
    crate::ty::lower_ty(ctx, &arg_ty, lira_ir::Span::DUMMY)
}

// ── Builtin table ───────────────────────────────────────────────────

/// Map a builtin operation name to its runtime helper. The set is
/// closed; names outside it are unknown operations.
fn runtime_name(name: &str) -> Option<&'static str> {
    // Undefined values of heap representations initialize through one
    // representation-directed runtime entry point.
    if name.starts_with("undefined_") {
        return Some("undefined");
    }
    let known: &[&'static str] = &[
        "eq_int", "neq_int", "eq_bool", "neq_bool", "eq_bit", "neq_bit", "eq_bits", "neq_bits",
        "eq_string", "lt", "lteq", "gt", "gteq", "not", "and_bool", "or_bool", "add_bits",
        "sub_bits", "and_bits", "or_bits", "xor_bits", "not_bits", "add_bits_int", "zero_extend",
        "sign_extend", "unsigned", "signed", "vector_subrange", "vector_access", "vector_update",
        "vector_update_subrange", "slice", "append", "replicate_bits", "length", "add_int",
        "sub_int", "mult_int", "tdiv_int", "tmod_int", "negate", "shiftl", "shiftr", "shift_bits_left",
        "shift_bits_right", "concat_str", "string_of_int", "string_of_bits", "print",
        "print_endline", "prerr", "prerr_endline", "internal_pick", "cons",
    ];
    known.iter().find(|&&k| k == name).copied()
}
