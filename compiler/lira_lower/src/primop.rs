//! Primitive-operation specialization.
//!
//! Recognizes calls to the closed builtin set over atoms of known
//! representation and rewrites them into inline fragments. Every
//! unrecognized combination is declined by returning `None`; the general
//! compilation path then emits an ordinary helper call. Declining is
//! never an error.

use lira_ir::lir::{Op, Rep, VLit, Val};
use lira_ir::source::Lit;
use lira_ir::Sym;

use crate::ctx::LowerCtx;
use crate::norm::AVal;

/// Attempt to rewrite `f(args)` into an inline fragment with result
/// representation derived from `ret_rep`.
///
/// Returns `None` to decline; the caller keeps the call unchanged.
pub fn analyze(ctx: &LowerCtx<'_>, f: Sym, args: &[AVal], ret_rep: &Rep) -> Option<AVal> {
    if !ctx.config.optimize_primops {
        return None;
    }
    let name = ctx.interner.lookup(f);
    let rewritten = analyze_named(name, args, ret_rep)?;
    tracing::trace!(op = name, "specialized primitive call");
    Some(rewritten)
}

fn analyze_named(name: &str, args: &[AVal], ret_rep: &Rep) -> Option<AVal> {
    match name {
        // ── Equality and ordering ───────────────────────────────
        "eq_int" | "eq_bool" | "eq_bit" => comparison(args, Op::Eq, Op::Eq),
        "neq_int" | "neq_bool" | "neq_bit" => comparison(args, Op::Neq, Op::Neq),
        "eq_bits" => comparison(args, Op::Eq, Op::EqSbits),
        "neq_bits" => comparison(args, Op::Neq, Op::NeqSbits),
        "lt" => int_comparison(args, Op::Ilt),
        "lteq" => int_comparison(args, Op::Ilteq),
        "gt" => int_comparison(args, Op::Igt),
        "gteq" => int_comparison(args, Op::Igteq),

        // ── Boolean connectives ─────────────────────────────────
        "not" => {
            let [a] = args else { return None };
            if a.rep() != Rep::Bool {
                return None;
            }
            inline(Op::Not, vec![a.to_val()?], Rep::Bool)
        }
        "and_bool" | "or_bool" => {
            let [a, b] = args else { return None };
            if a.rep() != Rep::Bool || b.rep() != Rep::Bool {
                return None;
            }
            let op = if name == "and_bool" { Op::And } else { Op::Or };
            inline(op, vec![a.to_val()?, b.to_val()?], Rep::Bool)
        }

        // ── Fixed bit-vector arithmetic and logic ───────────────
        "add_bits" | "sub_bits" => {
            let [a, b] = args else { return None };
            let (Rep::FBits(n, ord), Rep::FBits(m, _)) = (a.rep(), b.rep()) else {
                return None;
            };
            // Width 64 addition could carry out of the representation.
            if n != m || n > 63 {
                return None;
            }
            let op = if name == "add_bits" { Op::Badd } else { Op::Bsub };
            inline(op, vec![a.to_val()?, b.to_val()?], Rep::FBits(n, ord))
        }
        "and_bits" | "or_bits" | "xor_bits" => {
            let [a, b] = args else { return None };
            let (Rep::FBits(n, ord), Rep::FBits(m, _)) = (a.rep(), b.rep()) else {
                return None;
            };
            if n != m {
                return None;
            }
            let op = match name {
                "and_bits" => Op::Band,
                "or_bits" => Op::Bor,
                _ => Op::Bxor,
            };
            inline(op, vec![a.to_val()?, b.to_val()?], Rep::FBits(n, ord))
        }
        "not_bits" => {
            let [a] = args else { return None };
            let Rep::FBits(n, ord) = a.rep() else {
                return None;
            };
            inline(Op::Bnot, vec![a.to_val()?], Rep::FBits(n, ord))
        }

        // ── Extension and conversion ────────────────────────────
        "zero_extend" => {
            let v = args.first()?;
            let Rep::FBits(m, _) = ret_rep else { return None };
            match v.rep() {
                Rep::FBits(n, _) | Rep::SBits(n, _) if n <= *m => {
                    inline(Op::ZeroExtend(*m), vec![v.to_val()?], ret_rep.clone())
                }
                _ => None,
            }
        }
        "sign_extend" => {
            let v = args.first()?;
            let Rep::FBits(m, _) = ret_rep else { return None };
            match v.rep() {
                Rep::FBits(n, _) | Rep::SBits(n, _) if n <= *m => {
                    inline(Op::SignExtend(*m), vec![v.to_val()?], ret_rep.clone())
                }
                _ => None,
            }
        }
        "unsigned" => {
            let [a] = args else { return None };
            let Rep::FBits(n, _) = a.rep() else {
                return None;
            };
            // Width 64 does not fit a signed 64-bit result.
            if n > 63 || !matches!(ret_rep, Rep::FInt(_)) {
                return None;
            }
            inline(Op::Unsigned(n), vec![a.to_val()?], ret_rep.clone())
        }
        "signed" => {
            let [a] = args else { return None };
            let Rep::FBits(n, _) = a.rep() else {
                return None;
            };
            if !matches!(ret_rep, Rep::FInt(_)) {
                return None;
            }
            inline(Op::Signed(n), vec![a.to_val()?], ret_rep.clone())
        }

        // ── Subranges, access, slices ───────────────────────────
        "vector_subrange" => {
            let [vec, hi, lo] = args else { return None };
            let Rep::FBits(_, ord) = vec.rep() else {
                return None;
            };
            let hi = const_int(hi)?;
            let lo = const_int(lo)?;
            let len = u32::try_from(hi.checked_sub(lo)?.checked_add(1)?).ok()?;
            if len > 64 {
                return None;
            }
            inline(
                Op::Slice(len),
                vec![vec.to_val()?, Val::Lit(VLit::Int(lo), Rep::FInt(64))],
                Rep::FBits(len, ord),
            )
        }
        "vector_access" => {
            let [vec, idx] = args else { return None };
            if !matches!(vec.rep(), Rep::FBits(..)) {
                return None;
            }
            inline(Op::Baccess, vec![vec.to_val()?, idx.to_val()?], Rep::Bit)
        }
        "slice" => {
            let [vec, lo, len] = args else { return None };
            let Rep::FBits(_, ord) = vec.rep() else {
                return None;
            };
            let len = u32::try_from(const_int(len)?).ok()?;
            if len > 64 {
                return None;
            }
            inline(
                Op::Slice(len),
                vec![vec.to_val()?, lo.to_val()?],
                Rep::FBits(len, ord),
            )
        }

        // ── Append ──────────────────────────────────────────────
        "append" => {
            let [a, b] = args else { return None };
            let (Rep::FBits(n, ord), Rep::FBits(m, _)) = (a.rep(), b.rep()) else {
                return None;
            };
            let total = n.checked_add(m)?;
            if total > 64 {
                return None;
            }
            inline(
                Op::Concat(m),
                vec![a.to_val()?, b.to_val()?],
                Rep::FBits(total, ord),
            )
        }

        // ── Replication and subrange update ─────────────────────
        "replicate_bits" => {
            let [v, times] = args else { return None };
            let Rep::FBits(n, ord) = v.rep() else {
                return None;
            };
            let times = u32::try_from(const_int(times)?).ok()?;
            let total = n.checked_mul(times)?;
            if total > 64 {
                return None;
            }
            inline(Op::Replicate(total), vec![v.to_val()?], Rep::FBits(total, ord))
        }
        "vector_update_subrange" => {
            let [vec, hi, lo, value] = args else { return None };
            let Rep::FBits(n, ord) = vec.rep() else {
                return None;
            };
            if !matches!(value.rep(), Rep::FBits(..)) {
                return None;
            }
            inline(
                Op::UpdateSubrange,
                vec![vec.to_val()?, hi.to_val()?, lo.to_val()?, value.to_val()?],
                Rep::FBits(n, ord),
            )
        }

        // ── Integer arithmetic with provably fixed destination ──
        "add_int" | "sub_int" => {
            let [a, b] = args else { return None };
            if !matches!(ret_rep, Rep::FInt(_)) {
                return None;
            }
            if !matches!(a.rep(), Rep::FInt(_)) || !matches!(b.rep(), Rep::FInt(_)) {
                return None;
            }
            let op = if name == "add_int" { Op::Iadd } else { Op::Isub };
            inline(op, vec![a.to_val()?, b.to_val()?], ret_rep.clone())
        }
        "negate" => {
            let [a] = args else { return None };
            if !matches!(ret_rep, Rep::FInt(_)) || !matches!(a.rep(), Rep::FInt(_)) {
                return None;
            }
            inline(Op::Ineg, vec![a.to_val()?], ret_rep.clone())
        }

        // ── Undefined values of recognized representations ──────
        _ if name.starts_with("undefined_") => undefined_value(ret_rep),

        _ => None,
    }
}

/// Canonical representative for an undefined value of a recognized
/// representation.
fn undefined_value(ret_rep: &Rep) -> Option<AVal> {
    let lit = match ret_rep {
        Rep::Unit => VLit::Unit,
        Rep::Bool => VLit::Bool(false),
        Rep::Bit => VLit::Bit(false),
        Rep::FInt(_) => VLit::Int(0),
        Rep::FBits(n, _) => VLit::Bits { bits: 0, len: *n },
        Rep::Enum(_, members) => {
            let first = *members.first()?;
            return Some(AVal::Inline(
                Val::Id(lira_ir::lir::NameId::name(first), ret_rep.clone()),
                ret_rep.clone(),
            ));
        }
        _ => return None,
    };
    Some(AVal::Inline(
        Val::Lit(lit, ret_rep.clone()),
        ret_rep.clone(),
    ))
}

fn inline(op: Op, args: Vec<Val>, rep: Rep) -> Option<AVal> {
    Some(AVal::Inline(Val::Call(op, args, rep.clone()), rep))
}

/// Two-operand comparison, choosing between the machine comparator and
/// the small-bits helper by representation.
fn comparison(args: &[AVal], fixed: Op, small: Op) -> Option<AVal> {
    let [a, b] = args else { return None };
    match (a.rep(), b.rep()) {
        (Rep::FBits(n, _), Rep::FBits(m, _)) if n == m => {
            inline(fixed, vec![a.to_val()?, b.to_val()?], Rep::Bool)
        }
        (Rep::SBits(..), Rep::SBits(..)) => {
            inline(small, vec![a.to_val()?, b.to_val()?], Rep::Bool)
        }
        (Rep::FInt(_), Rep::FInt(_))
        | (Rep::Bool, Rep::Bool)
        | (Rep::Bit, Rep::Bit)
        | (Rep::Enum(..), Rep::Enum(..)) => {
            inline(fixed, vec![a.to_val()?, b.to_val()?], Rep::Bool)
        }
        _ => None,
    }
}

fn int_comparison(args: &[AVal], op: Op) -> Option<AVal> {
    let [a, b] = args else { return None };
    if !matches!(a.rep(), Rep::FInt(_)) || !matches!(b.rep(), Rep::FInt(_)) {
        return None;
    }
    inline(op, vec![a.to_val()?, b.to_val()?], Rep::Bool)
}

/// Constant integer value of an atom, when it is one.
fn const_int(aval: &AVal) -> Option<i64> {
    match aval {
        AVal::Lit(Lit::Int(b), _) => i64::try_from(b).ok(),
        AVal::Inline(Val::Lit(VLit::Int(n), _), _) => Some(*n),
        _ => None,
    }
}
