//! Function emission: signatures, prototypes, and the per-instruction
//! translation.
//!
//! Every instruction maps onto one or more C statements. Implicit
//! conversions between representations materialize as
//! `CONVERT_OF(dst, src)` calls; deep copies of heap representations go
//! through `COPY`.
//!
//! Calling convention (asserted here, in one place): a function or
//! helper whose result representation is heap-allocated takes the
//! destination pointer as its first parameter; stack results return by
//! value.

use lira_ir::lir::{CallTarget, Instr, InstrKind, LDef, LFn, Loc, Rep, RetKind, VLit, Val};
use lira_ir::zencode;

use super::expr::{cval, name};
use super::types::ctype;
use crate::context::EmitCtx;
use crate::error::EmitError;

/// The representation a left-value stores into.
pub fn loc_rep(loc: &Loc) -> Result<Rep, EmitError> {
    match loc {
        Loc::Id(_, rep) => Ok(rep.clone()),
        Loc::Field(inner, field) => {
            let Rep::Struct(_, fields) = loc_rep(inner)? else {
                return Err(EmitError::Invariant(
                    "field left-value over a non-struct".into(),
                ));
            };
            fields
                .iter()
                .find(|(f, _)| f == field)
                .map(|(_, r)| r.clone())
                .ok_or_else(|| EmitError::Invariant("unknown field in left-value".into()))
        }
        Loc::Tuple(inner, i) => {
            let Rep::Tup(comps) = loc_rep(inner)? else {
                return Err(EmitError::Invariant(
                    "tuple left-value over a non-tuple".into(),
                ));
            };
            comps
                .get(*i)
                .cloned()
                .ok_or_else(|| EmitError::Invariant("tuple index out of range".into()))
        }
        // The stored representation of a pointer base is its pointee.
        Loc::Addr(inner) => loc_rep(inner),
    }
}

fn loc_str(loc: &Loc, ctx: &EmitCtx<'_>) -> String {
    match loc {
        Loc::Id(id, _) => name(*id, ctx.interner),
        Loc::Field(inner, f) => format!(
            "{}.{}",
            loc_str(inner, ctx),
            zencode(ctx.interner.lookup(*f))
        ),
        Loc::Tuple(inner, i) => format!("{}.ztup{i}", loc_str(inner, ctx)),
        Loc::Addr(inner) => format!("(*{})", loc_str(inner, ctx)),
    }
}

// ── Stores ──────────────────────────────────────────────────────────

fn emit_store(ctx: &mut EmitCtx<'_>, loc: &Loc, val: &Val) -> Result<(), EmitError> {
    let lrep = loc_rep(loc)?;
    let l = loc_str(loc, ctx);

    // Literals initialize heap representations through their machine
    // or textual form.
    if let Val::Lit(vlit, _) = val {
        match (vlit, &lrep) {
            (VLit::Big(n), _) => {
                ctx.writeln(&format!("CONVERT_OF(lint, str)(&{l}, \"{n}\");"));
                return Ok(());
            }
            (VLit::BitsStr(bits), _) => {
                ctx.writeln(&format!("CONVERT_OF(lbits, str)(&{l}, \"{bits}\");"));
                return Ok(());
            }
            (VLit::Int(n), Rep::LInt) => {
                ctx.writeln(&format!("CONVERT_OF(lint, i64)(&{l}, INT64_C({n}));"));
                return Ok(());
            }
            (VLit::Bits { bits, len }, Rep::LBits(_)) => {
                ctx.writeln(&format!(
                    "CONVERT_OF(lbits, fbits)(&{l}, UINT64_C(0x{bits:X}), UINT64_C({len}));"
                ));
                return Ok(());
            }
            (VLit::String(_), Rep::String) => {
                ctx.writeln(&format!(
                    "CONVERT_OF(lstr, str)(&{l}, {});",
                    super::expr::lit(vlit)
                ));
                return Ok(());
            }
            (VLit::Real(_), Rep::Real) => {
                ctx.writeln(&format!(
                    "CONVERT_OF(real, str)(&{l}, {});",
                    super::expr::lit(vlit)
                ));
                return Ok(());
            }
            _ => {}
        }
    }

    let vrep = val.rep();
    let v = cval(val, ctx.interner);
    if lrep == vrep {
        if lrep.is_heap() {
            let sfx = lrep.suffix(ctx.interner);
            ctx.writeln(&format!("COPY({sfx})(&{l}, {v});"));
        } else {
            ctx.writeln(&format!("{l} = {v};"));
        }
    } else {
        ctx.writeln(&format!(
            "CONVERT_OF({}, {})(&{l}, {v});",
            lrep.suffix(ctx.interner),
            vrep.suffix(ctx.interner)
        ));
    }
    Ok(())
}

// ── Calls ───────────────────────────────────────────────────────────

fn emit_call(
    ctx: &mut EmitCtx<'_>,
    loc: &Loc,
    target: &CallTarget,
    args: &[Val],
) -> Result<(), EmitError> {
    let l = loc_str(loc, ctx);
    let mut arg_texts: Vec<String> = args.iter().map(|a| cval(a, ctx.interner)).collect();

    match target {
        CallTarget::Fn(f) => {
            let fname = ctx.fn_name(*f);
            let is_extern = ctx.env.extern_name(*f).is_some();
            if !is_extern {
                if let Some(extra) = &ctx.config.extra_arguments {
                    arg_texts.push(extra.clone());
                }
            }
            let joined = arg_texts.join(", ");
            match ctx.fn_rets.get(f) {
                Some(RetKind::Heap(_)) => {
                    if joined.is_empty() {
                        ctx.writeln(&format!("{fname}(&{l});"));
                    } else {
                        ctx.writeln(&format!("{fname}(&{l}, {joined});"));
                    }
                }
                Some(RetKind::Stack(_)) => {
                    ctx.writeln(&format!("{l} = {fname}({joined});"));
                }
                None if is_extern => {
                    ctx.writeln(&format!("{l} = {fname}({joined});"));
                }
                None => {
                    return Err(EmitError::Invariant(format!(
                        "call to undeclared function `{fname}`"
                    )));
                }
            }
        }
        CallTarget::Ctor(_, ctor) => {
            let cz = zencode(ctx.interner.lookup(*ctor));
            let joined = arg_texts.join(", ");
            ctx.writeln(&format!("{}{cz}(&{l}, {joined});", ctx.config.prefix));
        }
        CallTarget::Rt(rt) => emit_rt_call(ctx, loc, &l, rt, args, &arg_texts)?,
    }
    Ok(())
}

fn emit_rt_call(
    ctx: &mut EmitCtx<'_>,
    loc: &Loc,
    l: &str,
    rt: &str,
    args: &[Val],
    arg_texts: &[String],
) -> Result<(), EmitError> {
    let lrep = loc_rep(loc)?;
    let joined = arg_texts.join(", ");
    match rt {
        // Undefined values of heap representations initialize through
        // one representation-directed entry point.
        "undefined" => {
            ctx.writeln(&format!(
                "UNDEFINED({})(&{l});",
                lrep.suffix(ctx.interner)
            ));
        }
        "internal_pick" => {
            let Some(Rep::List(elem)) = args.first().map(Val::rep) else {
                return Err(EmitError::Invariant(
                    "pick over a non-list representation".into(),
                ));
            };
            let list_sfx = args[0].rep().suffix(ctx.interner);
            if elem.is_stack() {
                ctx.writeln(&format!("{l} = pick_{list_sfx}({joined});"));
            } else {
                ctx.writeln(&format!("pick_{list_sfx}(&{l}, {joined});"));
            }
        }
        "cons" => {
            let Rep::List(_) = lrep else {
                return Err(EmitError::Invariant(
                    "cons into a non-list destination".into(),
                ));
            };
            ctx.writeln(&format!(
                "cons_{}(&{l}, {joined});",
                lrep.suffix(ctx.interner)
            ));
        }
        "vector_access" if matches!(args.first().map(Val::rep), Some(Rep::Vector(..))) => {
            let vec_rep = args[0].rep();
            let sfx = vec_rep.suffix(ctx.interner);
            let Rep::Vector(_, elem) = vec_rep else {
                unreachable!()
            };
            if elem.is_stack() {
                ctx.writeln(&format!("{l} = vector_access_{sfx}({joined});"));
            } else {
                ctx.writeln(&format!("vector_access_{sfx}(&{l}, {joined});"));
            }
        }
        "vector_update" if matches!(args.first().map(Val::rep), Some(Rep::Vector(..))) => {
            let sfx = args[0].rep().suffix(ctx.interner);
            ctx.writeln(&format!("vector_update_{sfx}(&{l}, {joined});"));
        }
        _ => {
            if lrep.is_heap() {
                if joined.is_empty() {
                    ctx.writeln(&format!("{rt}(&{l});"));
                } else {
                    ctx.writeln(&format!("{rt}(&{l}, {joined});"));
                }
            } else {
                ctx.writeln(&format!("{l} = {rt}({joined});"));
            }
        }
    }
    Ok(())
}

// ── Instructions ────────────────────────────────────────────────────

pub fn emit_instr(ctx: &mut EmitCtx<'_>, instr: &Instr) -> Result<(), EmitError> {
    match &instr.kind {
        InstrKind::Decl(rep, id) => {
            let n = name(*id, ctx.interner);
            ctx.writeln(&format!("{} {n};", ctype(rep, ctx.interner)));
            if rep.is_heap() {
                ctx.writeln(&format!("CREATE({})(&{n});", rep.suffix(ctx.interner)));
            }
        }
        InstrKind::Init(rep, id, val) => {
            let n = name(*id, ctx.interner);
            ctx.writeln(&format!("{} {n};", ctype(rep, ctx.interner)));
            if rep.is_heap() {
                ctx.writeln(&format!("CREATE({})(&{n});", rep.suffix(ctx.interner)));
            }
            emit_store(ctx, &Loc::Id(*id, rep.clone()), val)?;
        }
        InstrKind::Copy(loc, val) => emit_store(ctx, loc, val)?,
        InstrKind::Call(loc, target, args) => emit_call(ctx, loc, target, args)?,
        InstrKind::If(cond, then_is, else_is, _) => {
            ctx.writeln(&format!("if ({}) {{", cval(cond, ctx.interner)));
            ctx.indent();
            for i in then_is {
                emit_instr(ctx, i)?;
            }
            ctx.dedent();
            if else_is.is_empty() {
                ctx.writeln("}");
            } else {
                ctx.writeln("} else {");
                ctx.indent();
                for i in else_is {
                    emit_instr(ctx, i)?;
                }
                ctx.dedent();
                ctx.writeln("}");
            }
        }
        InstrKind::Goto(label) => ctx.writeln(&format!("goto {label};")),
        InstrKind::Block(inner) | InstrKind::TryBlock(inner) => {
            ctx.writeln("{");
            ctx.indent();
            for i in inner {
                emit_instr(ctx, i)?;
            }
            ctx.dedent();
            ctx.writeln("}");
        }
        InstrKind::Jump(cond, label) => {
            ctx.writeln(&format!("if ({}) goto {label};", cval(cond, ctx.interner)));
        }
        InstrKind::Clear(rep, id) => {
            ctx.writeln(&format!(
                "KILL({})(&{});",
                rep.suffix(ctx.interner),
                name(*id, ctx.interner)
            ));
        }
        InstrKind::Reset(rep, id) => {
            ctx.writeln(&format!(
                "RECREATE({})(&{});",
                rep.suffix(ctx.interner),
                name(*id, ctx.interner)
            ));
        }
        InstrKind::Alias(loc, val) => {
            // Shallow: no COPY even for heap representations.
            let l = loc_str(loc, ctx);
            ctx.writeln(&format!("{l} = {};", cval(val, ctx.interner)));
        }
        InstrKind::Return(val) => {
            ctx.writeln(&format!("return {};", cval(val, ctx.interner)));
        }
        InstrKind::End(_) => ctx.writeln("return;"),
        InstrKind::MatchFailure => {
            ctx.writeln(&format!("rt_match_failure(\"{}\");", ctx.current_fn));
        }
        InstrKind::Comment(text) => ctx.writeln(&format!("/* {text} */")),
        InstrKind::Raw(text) => ctx.writeln(text),
        InstrKind::Label(label) => ctx.writeln(&format!("{label}: ;")),
    }
    Ok(())
}

// ── Functions ───────────────────────────────────────────────────────

fn signature(ctx: &EmitCtx<'_>, f: &LFn) -> String {
    let fname = ctx.fn_name(f.id);
    let mut params: Vec<String> = Vec::with_capacity(f.params.len() + 1);
    let ret = match &f.ret {
        RetKind::Stack(rep) => ctype(rep, ctx.interner),
        RetKind::Heap(rep) => {
            params.push(format!("{} *lira_ret", ctype(rep, ctx.interner)));
            "void".into()
        }
    };
    for (id, rep) in &f.params {
        params.push(format!(
            "{} {}",
            ctype(rep, ctx.interner),
            name(*id, ctx.interner)
        ));
    }
    if let Some(extra) = &ctx.config.extra_params {
        params.push(extra.clone());
    }
    let linkage = if ctx.config.static_fns { "static " } else { "" };
    if params.is_empty() {
        format!("{linkage}{ret} {fname}(void)")
    } else {
        format!("{linkage}{ret} {fname}({})", params.join(", "))
    }
}

/// Emit one prototype per lowered function, so definition order never
/// constrains call order.
pub fn emit_prototypes(ctx: &mut EmitCtx<'_>, defs: &[LDef]) {
    for def in defs {
        if let LDef::Fn(f) = def {
            let sig = signature(ctx, f);
            ctx.writeln(&format!("{sig};"));
        }
    }
    ctx.newline();
}

pub fn emit_fn(ctx: &mut EmitCtx<'_>, f: &LFn) -> Result<(), EmitError> {
    ctx.current_fn = ctx.interner.lookup(f.id).to_owned();
    let sig = signature(ctx, f);
    ctx.writeln(&format!("{sig}"));
    ctx.writeln("{");
    ctx.indent();
    for instr in &f.body {
        emit_instr(ctx, instr)?;
    }
    ctx.dedent();
    ctx.writeln("}");
    ctx.newline();
    Ok(())
}
