//! A-normalization of source expressions.
//!
//! Rewrites nested expressions so that every operand of a call, branch
//! condition, constructor application, or field access is *atomic*: a
//! literal, an identifier, a tuple of atomics, or an already-inline
//! fragment produced by the primitive analyzer. Non-atomic operands are
//! bound to fresh generated names with `Let`.
//!
//! Every atom and expression carries its lowered representation;
//! lowering runs under the kind environment in scope at that point, so
//! representation choices see the constraints of enclosing existentials
//! and match arms.

use lira_ir::lir::{NameId, Rep, VLit, Val};
use lira_ir::source::{Expr, ExprKind, LExp, Lit, Pat};
use lira_ir::{Span, Sym};

use crate::ctx::LowerCtx;
use crate::error::LowerError;
use crate::ty::lower_ty;

// ── Normalized forms ────────────────────────────────────────────────

/// An atomic value.
#[derive(Clone, Debug, PartialEq)]
pub enum AVal {
    Lit(Lit, Rep),
    Id(NameId, Rep),
    Tuple(Vec<AVal>),
    /// An already-compiled inline fragment (the primitive analyzer's
    /// output).
    Inline(Val, Rep),
}

impl AVal {
    /// The representation of this atom.
    pub fn rep(&self) -> Rep {
        match self {
            AVal::Lit(_, r) | AVal::Id(_, r) | AVal::Inline(_, r) => r.clone(),
            AVal::Tuple(elems) => Rep::Tup(elems.iter().map(AVal::rep).collect()),
        }
    }

    /// The target-IR value for this atom, when it has a direct one.
    /// Tuples (which require materialization) and unconvertible
    /// literals return `None`.
    pub fn to_val(&self) -> Option<Val> {
        match self {
            AVal::Lit(lit, rep) => Some(Val::Lit(vlit_of_lit(lit, rep)?, rep.clone())),
            AVal::Id(id, rep) => Some(Val::Id(*id, rep.clone())),
            AVal::Inline(v, _) => Some(v.clone()),
            AVal::Tuple(_) => None,
        }
    }
}

/// Convert a source literal into a target-IR literal under the given
/// representation.
pub(crate) fn vlit_of_lit(lit: &Lit, rep: &Rep) -> Option<VLit> {
    match lit {
        Lit::Unit => Some(VLit::Unit),
        Lit::Bool(b) => Some(VLit::Bool(*b)),
        Lit::Bit(b) => Some(VLit::Bit(*b)),
        Lit::Int(value) => match i64::try_from(value) {
            Ok(n) => Some(VLit::Int(n)),
            Err(_) => match rep {
                Rep::LInt => Some(VLit::Big(value.clone())),
                _ => None,
            },
        },
        Lit::Hex(digits) => {
            let len = u32::try_from(digits.len()).ok()?.checked_mul(4)?;
            if len <= 64 {
                let bits = u64::from_str_radix(digits, 16).ok()?;
                Some(VLit::Bits { bits, len })
            } else {
                let expanded: String = digits
                    .chars()
                    .map(|c| {
                        let d = c.to_digit(16).unwrap_or(0);
                        format!("{d:04b}")
                    })
                    .collect();
                Some(VLit::BitsStr(expanded))
            }
        }
        Lit::Bin(digits) => {
            let len = u32::try_from(digits.len()).ok()?;
            if len <= 64 {
                let bits = u64::from_str_radix(digits, 2).ok()?;
                Some(VLit::Bits { bits, len })
            } else {
                Some(VLit::BitsStr(digits.clone()))
            }
        }
        Lit::Str(s) => Some(VLit::String(s.clone())),
        Lit::Real(s) => Some(VLit::Real(s.clone())),
    }
}

/// A normalized expression.
#[derive(Clone, Debug, PartialEq)]
pub struct AExpr {
    pub kind: AExprKind,
    pub rep: Rep,
    pub span: Span,
}

/// One arm of a normalized match or try.
#[derive(Clone, Debug, PartialEq)]
pub struct AArm {
    pub pat: Pat,
    pub guard: Option<AExpr>,
    pub body: AExpr,
}

/// A normalized assignment target.
#[derive(Clone, Debug, PartialEq)]
pub enum ALoc {
    Id(Sym, Rep),
    Field(Box<ALoc>, Sym, Rep),
}

impl ALoc {
    pub fn rep(&self) -> Rep {
        match self {
            ALoc::Id(_, r) | ALoc::Field(_, _, r) => r.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AExprKind {
    Val(AVal),
    /// Call of a declared function or builtin over atomic operands.
    App { f: Sym, args: Vec<AVal> },
    /// Variant constructor application.
    Ctor { variant: Sym, ctor: Sym, arg: AVal },
    Field { obj: AVal, field: Sym },
    Let {
        mutable: bool,
        id: Sym,
        rep: Rep,
        value: Box<AExpr>,
        body: Box<AExpr>,
    },
    If {
        cond: AVal,
        then_e: Box<AExpr>,
        else_e: Box<AExpr>,
    },
    Match { scrutinee: AVal, arms: Vec<AArm> },
    Try { body: Box<AExpr>, arms: Vec<AArm> },
    Block {
        stmts: Vec<AExpr>,
        result: Box<AExpr>,
    },
    Assign { dst: ALoc, value: Box<AExpr> },
    Return(AVal),
    Throw(AVal),
    Assert { cond: AVal, msg: AVal },
    Exit(AVal),
    /// Register reference.
    RegRef(Sym),
    For {
        id: Sym,
        from: AVal,
        to: AVal,
        step: AVal,
        ascending: bool,
        body: Box<AExpr>,
    },
    Loop {
        until: bool,
        cond: Box<AExpr>,
        body: Box<AExpr>,
    },
}

// ── Normalizer ──────────────────────────────────────────────────────

type Lets = Vec<(Sym, Rep, AExpr)>;

/// Normalize a source expression under the given context.
pub fn normalize(ctx: &mut LowerCtx<'_>, expr: &Expr) -> Result<AExpr, LowerError> {
    crate::stack::ensure_sufficient_stack(|| norm(ctx, expr))
}

fn wrap_lets(lets: Lets, body: AExpr) -> AExpr {
    let mut out = body;
    for (id, rep, value) in lets.into_iter().rev() {
        let span = value.span;
        let body_rep = out.rep.clone();
        out = AExpr {
            kind: AExprKind::Let {
                mutable: false,
                id,
                rep,
                value: Box::new(value),
                body: Box::new(out),
            },
            rep: body_rep,
            span,
        };
    }
    out
}

fn norm_aval(ctx: &mut LowerCtx<'_>, expr: &Expr, lets: &mut Lets) -> Result<AVal, LowerError> {
    match &expr.kind {
        ExprKind::Lit(lit) => {
            let rep = lower_ty(ctx, &expr.ty, expr.span)?;
            Ok(AVal::Lit(lit.clone(), rep))
        }
        ExprKind::Id(id) => {
            if let Some(rep) = ctx.lookup(*id) {
                return Ok(AVal::Id(NameId::name(*id), rep));
            }
            if let Some(enum_id) = ctx.env.enum_of_member(*id) {
                let members = ctx.env.enum_def(enum_id).unwrap_or(&[]).to_vec();
                return Ok(AVal::Id(NameId::name(*id), Rep::Enum(enum_id, members)));
            }
            Err(LowerError::Invariant(format!(
                "unbound identifier `{}` at {}",
                ctx.interner.lookup(*id),
                expr.span
            )))
        }
        ExprKind::Tuple(elems) => {
            let mut avals = Vec::with_capacity(elems.len());
            for e in elems {
                avals.push(norm_aval(ctx, e, lets)?);
            }
            Ok(AVal::Tuple(avals))
        }
        _ => {
            let ae = norm(ctx, expr)?;
            if let AExprKind::Val(v) = ae.kind {
                return Ok(v);
            }
            let rep = ae.rep.clone();
            let fresh = ctx.fresh("gs");
            lets.push((fresh, rep.clone(), ae));
            Ok(AVal::Id(NameId::name(fresh), rep))
        }
    }
}

fn norm(ctx: &mut LowerCtx<'_>, expr: &Expr) -> Result<AExpr, LowerError> {
    crate::stack::ensure_sufficient_stack(|| norm_inner(ctx, expr))
}

fn norm_inner(ctx: &mut LowerCtx<'_>, expr: &Expr) -> Result<AExpr, LowerError> {
    let span = expr.span;
    match &expr.kind {
        ExprKind::Lit(_) | ExprKind::Id(_) | ExprKind::Tuple(_) => {
            let mut lets = Lets::new();
            let aval = norm_aval(ctx, expr, &mut lets)?;
            let rep = aval.rep();
            Ok(wrap_lets(
                lets,
                AExpr {
                    kind: AExprKind::Val(aval),
                    rep,
                    span,
                },
            ))
        }

        ExprKind::Call(f, args) => {
            let mut lets = Lets::new();
            let mut avals = Vec::with_capacity(args.len());
            for a in args {
                avals.push(norm_aval(ctx, a, &mut lets)?);
            }
            let rep = lower_ty(ctx, &expr.ty, span)?;
            Ok(wrap_lets(
                lets,
                AExpr {
                    kind: AExprKind::App { f: *f, args: avals },
                    rep,
                    span,
                },
            ))
        }

        ExprKind::Ctor(ctor, args) => {
            let variant = ctx.env.variant_of_ctor(*ctor).ok_or_else(|| {
                LowerError::Invariant(format!(
                    "`{}` is not a variant constructor",
                    ctx.interner.lookup(*ctor)
                ))
            })?;
            let mut lets = Lets::new();
            let arg = if args.len() == 1 {
                norm_aval(ctx, &args[0], &mut lets)?
            } else {
                let mut avals = Vec::with_capacity(args.len());
                for a in args {
                    avals.push(norm_aval(ctx, a, &mut lets)?);
                }
                AVal::Tuple(avals)
            };
            let rep = lower_ty(ctx, &expr.ty, span)?;
            Ok(wrap_lets(
                lets,
                AExpr {
                    kind: AExprKind::Ctor {
                        variant,
                        ctor: *ctor,
                        arg,
                    },
                    rep,
                    span,
                },
            ))
        }

        ExprKind::Field(obj, field) => {
            let mut lets = Lets::new();
            let aval = norm_aval(ctx, obj, &mut lets)?;
            let rep = lower_ty(ctx, &expr.ty, span)?;
            Ok(wrap_lets(
                lets,
                AExpr {
                    kind: AExprKind::Field {
                        obj: aval,
                        field: *field,
                    },
                    rep,
                    span,
                },
            ))
        }

        ExprKind::If {
            cond,
            then_e,
            else_e,
        } => {
            let mut lets = Lets::new();
            let cond = norm_aval(ctx, cond, &mut lets)?;
            let then_e = norm(ctx, then_e)?;
            let else_e = norm(ctx, else_e)?;
            let rep = lower_ty(ctx, &expr.ty, span)?;
            Ok(wrap_lets(
                lets,
                AExpr {
                    kind: AExprKind::If {
                        cond,
                        then_e: Box::new(then_e),
                        else_e: Box::new(else_e),
                    },
                    rep,
                    span,
                },
            ))
        }

        ExprKind::Match { scrutinee, arms } => {
            let mut lets = Lets::new();
            let scrutinee = norm_aval(ctx, scrutinee, &mut lets)?;
            let scrutinee_rep = scrutinee.rep();
            let mut out_arms = Vec::with_capacity(arms.len());
            for arm in arms {
                out_arms.push(norm_arm(ctx, &arm.pat, arm.guard.as_ref(), &arm.body, &scrutinee_rep)?);
            }
            let rep = lower_ty(ctx, &expr.ty, span)?;
            Ok(wrap_lets(
                lets,
                AExpr {
                    kind: AExprKind::Match {
                        scrutinee,
                        arms: out_arms,
                    },
                    rep,
                    span,
                },
            ))
        }

        ExprKind::Let { pat, value, body } => {
            let value_ae = norm(ctx, value)?;
            match binder_of(pat) {
                Some((id, annotation)) => {
                    let id_rep = match annotation {
                        Some(ty) => lower_ty(ctx, ty, span)?,
                        None => value_ae.rep.clone(),
                    };
                    let mark = ctx.mark();
                    ctx.bind(id, id_rep.clone());
                    let body_ae = norm(ctx, body)?;
                    ctx.release(mark);
                    let rep = body_ae.rep.clone();
                    Ok(AExpr {
                        kind: AExprKind::Let {
                            mutable: false,
                            id,
                            rep: id_rep,
                            value: Box::new(value_ae),
                            body: Box::new(body_ae),
                        },
                        rep,
                        span,
                    })
                }
                None => {
                    // Destructuring binding: reshape as a one-armed match.
                    let scrutinee_rep = value_ae.rep.clone();
                    let fresh = ctx.fresh("gs");
                    let mut lets = Lets::new();
                    lets.push((fresh, scrutinee_rep.clone(), value_ae));
                    let arm = norm_arm(ctx, pat, None, body, &scrutinee_rep)?;
                    let rep = arm.body.rep.clone();
                    Ok(wrap_lets(
                        lets,
                        AExpr {
                            kind: AExprKind::Match {
                                scrutinee: AVal::Id(NameId::name(fresh), scrutinee_rep),
                                arms: vec![arm],
                            },
                            rep,
                            span,
                        },
                    ))
                }
            }
        }

        ExprKind::Var { id, init, body } => {
            let init_ae = norm(ctx, init)?;
            let id_rep = init_ae.rep.clone();
            let mark = ctx.mark();
            ctx.bind(*id, id_rep.clone());
            let body_ae = norm(ctx, body)?;
            ctx.release(mark);
            let rep = body_ae.rep.clone();
            Ok(AExpr {
                kind: AExprKind::Let {
                    mutable: true,
                    id: *id,
                    rep: id_rep,
                    value: Box::new(init_ae),
                    body: Box::new(body_ae),
                },
                rep,
                span,
            })
        }

        ExprKind::Block(exprs) => {
            let mut stmts = Vec::new();
            for e in exprs.iter().take(exprs.len().saturating_sub(1)) {
                stmts.push(norm(ctx, e)?);
            }
            let result = match exprs.last() {
                Some(last) => norm(ctx, last)?,
                None => AExpr {
                    kind: AExprKind::Val(AVal::Lit(Lit::Unit, Rep::Unit)),
                    rep: Rep::Unit,
                    span,
                },
            };
            let rep = result.rep.clone();
            Ok(AExpr {
                kind: AExprKind::Block {
                    stmts,
                    result: Box::new(result),
                },
                rep,
                span,
            })
        }

        ExprKind::Assign(lexp, value) => {
            let dst = norm_lexp(ctx, lexp, span)?;
            let value_ae = norm(ctx, value)?;
            Ok(AExpr {
                kind: AExprKind::Assign {
                    dst,
                    value: Box::new(value_ae),
                },
                rep: Rep::Unit,
                span,
            })
        }

        ExprKind::Return(value) => {
            let mut lets = Lets::new();
            let aval = norm_aval(ctx, value, &mut lets)?;
            Ok(wrap_lets(
                lets,
                AExpr {
                    kind: AExprKind::Return(aval),
                    rep: Rep::Unit,
                    span,
                },
            ))
        }

        ExprKind::Throw(value) => {
            let mut lets = Lets::new();
            let aval = norm_aval(ctx, value, &mut lets)?;
            Ok(wrap_lets(
                lets,
                AExpr {
                    kind: AExprKind::Throw(aval),
                    rep: Rep::Unit,
                    span,
                },
            ))
        }

        ExprKind::Try { body, arms } => {
            let body_ae = norm(ctx, body)?;
            let exc_rep = exception_rep(ctx, span)?;
            let mut out_arms = Vec::with_capacity(arms.len());
            for arm in arms {
                out_arms.push(norm_arm(ctx, &arm.pat, arm.guard.as_ref(), &arm.body, &exc_rep)?);
            }
            let rep = lower_ty(ctx, &expr.ty, span)?;
            Ok(AExpr {
                kind: AExprKind::Try {
                    body: Box::new(body_ae),
                    arms: out_arms,
                },
                rep,
                span,
            })
        }

        ExprKind::Assert { cond, msg } => {
            let mut lets = Lets::new();
            let cond = norm_aval(ctx, cond, &mut lets)?;
            let msg = norm_aval(ctx, msg, &mut lets)?;
            Ok(wrap_lets(
                lets,
                AExpr {
                    kind: AExprKind::Assert { cond, msg },
                    rep: Rep::Unit,
                    span,
                },
            ))
        }

        ExprKind::Exit(value) => {
            let mut lets = Lets::new();
            let aval = norm_aval(ctx, value, &mut lets)?;
            Ok(wrap_lets(
                lets,
                AExpr {
                    kind: AExprKind::Exit(aval),
                    rep: Rep::Unit,
                    span,
                },
            ))
        }

        ExprKind::Ref(reg) => {
            let reg_rep = ctx.lookup(*reg).ok_or_else(|| {
                LowerError::Invariant(format!(
                    "reference to unknown register `{}`",
                    ctx.interner.lookup(*reg)
                ))
            })?;
            Ok(AExpr {
                kind: AExprKind::RegRef(*reg),
                rep: Rep::Ref(Box::new(reg_rep)),
                span,
            })
        }

        ExprKind::For {
            id,
            from,
            to,
            step,
            ascending,
            body,
        } => {
            let mut lets = Lets::new();
            let from = norm_aval(ctx, from, &mut lets)?;
            let to = norm_aval(ctx, to, &mut lets)?;
            let step = norm_aval(ctx, step, &mut lets)?;
            // Loop indices always fit the fixed 64-bit form.
            let mark = ctx.mark();
            ctx.bind(*id, Rep::FInt(64));
            let body_ae = norm(ctx, body)?;
            ctx.release(mark);
            Ok(wrap_lets(
                lets,
                AExpr {
                    kind: AExprKind::For {
                        id: *id,
                        from,
                        to,
                        step,
                        ascending: *ascending,
                        body: Box::new(body_ae),
                    },
                    rep: Rep::Unit,
                    span,
                },
            ))
        }

        ExprKind::Loop { until, cond, body } => {
            // The condition re-evaluates every iteration, so it stays a
            // full expression rather than being atomized here.
            let cond_ae = norm(ctx, cond)?;
            let body_ae = norm(ctx, body)?;
            Ok(AExpr {
                kind: AExprKind::Loop {
                    until: *until,
                    cond: Box::new(cond_ae),
                    body: Box::new(body_ae),
                },
                rep: Rep::Unit,
                span,
            })
        }
    }
}

/// Normalize one arm, binding its pattern variables for the guard and
/// body.
fn norm_arm(
    ctx: &mut LowerCtx<'_>,
    pat: &Pat,
    guard: Option<&Expr>,
    body: &Expr,
    scrutinee_rep: &Rep,
) -> Result<AArm, LowerError> {
    let mark = ctx.mark();
    bind_pattern(ctx, pat, scrutinee_rep)?;
    let guard = match guard {
        Some(g) => Some(norm(ctx, g)?),
        None => None,
    };
    let body = norm(ctx, body)?;
    ctx.release(mark);
    Ok(AArm {
        pat: pat.clone(),
        guard,
        body,
    })
}

/// Bind the variables of a pattern at the given scrutinee
/// representation.
pub(crate) fn bind_pattern(
    ctx: &mut LowerCtx<'_>,
    pat: &Pat,
    rep: &Rep,
) -> Result<(), LowerError> {
    match pat {
        Pat::Wild | Pat::Lit(_) => Ok(()),
        Pat::Id(id) => {
            ctx.bind(*id, rep.clone());
            Ok(())
        }
        Pat::Typed(inner, ty) => {
            let rep = lower_ty(ctx, ty, Span::DUMMY)?;
            bind_pattern(ctx, inner, &rep)
        }
        Pat::Tuple(pats) => {
            let Rep::Tup(reps) = rep else {
                return Err(LowerError::Invariant(
                    "tuple pattern against a non-tuple representation".into(),
                ));
            };
            if reps.len() != pats.len() {
                return Err(LowerError::Invariant(
                    "tuple pattern arity mismatch".into(),
                ));
            }
            for (p, r) in pats.iter().zip(reps) {
                bind_pattern(ctx, p, r)?;
            }
            Ok(())
        }
        Pat::Ctor(ctor, inner) => {
            let arg_ty = ctx.env.ctor_arg_ty(*ctor).cloned().ok_or_else(|| {
                LowerError::Invariant(format!(
                    "pattern names unknown constructor `{}`",
                    ctx.interner.lookup(*ctor)
                ))
            })?;
            let arg_rep = lower_ty(ctx, &arg_ty, Span::DUMMY)?;
            bind_pattern(ctx, inner, &arg_rep)
        }
    }
}

fn norm_lexp(ctx: &mut LowerCtx<'_>, lexp: &LExp, span: Span) -> Result<ALoc, LowerError> {
    match lexp {
        LExp::Id(id) => {
            let rep = ctx.lookup(*id).ok_or_else(|| {
                LowerError::Invariant(format!(
                    "assignment to unknown name `{}` at {span}",
                    ctx.interner.lookup(*id)
                ))
            })?;
            Ok(ALoc::Id(*id, rep))
        }
        LExp::Field(base, field) => {
            let base = norm_lexp(ctx, base, span)?;
            let Rep::Struct(_, fields) = base.rep() else {
                return Err(LowerError::Invariant(
                    "field assignment into a non-struct value".into(),
                ));
            };
            let field_rep = fields
                .iter()
                .find(|(f, _)| f == field)
                .map(|(_, r)| r.clone())
                .ok_or_else(|| {
                    LowerError::Invariant(format!(
                        "unknown field `{}`",
                        ctx.interner.lookup(*field)
                    ))
                })?;
            Ok(ALoc::Field(Box::new(base), *field, field_rep))
        }
    }
}

/// The exception variant's representation, required by `try`/`throw`.
pub(crate) fn exception_rep(ctx: &mut LowerCtx<'_>, span: Span) -> Result<Rep, LowerError> {
    let Some(exc) = ctx.env.exception_id() else {
        return Err(LowerError::Invariant(
            "try/throw used but no `exception` variant is declared".into(),
        ));
    };
    lower_ty(ctx, &lira_ir::source::Ty::Id(exc), span)
}

/// The single bound name of a pattern, with its type annotation when
/// present. `None` for destructuring patterns.
fn binder_of(pat: &Pat) -> Option<(Sym, Option<&lira_ir::source::Ty>)> {
    match pat {
        Pat::Id(id) => Some((*id, None)),
        Pat::Typed(inner, ty) => match inner.as_ref() {
            Pat::Id(id) => Some((*id, Some(ty))),
            _ => None,
        },
        _ => None,
    }
}
