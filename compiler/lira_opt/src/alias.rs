//! Copy-elimination peepholes over create/copy/kill windows.
//!
//! Three rewrites over flat instruction runs:
//!
//! - **remove-alias**: `create x; x = y; … [x mutated, y untouched];
//!   y = x; kill x` collapses onto `y`, deleting the bracketing
//!   create/kill and both copies.
//! - **combine-variables**: `create x; create y; … [y mutated, x
//!   untouched]; x = y; kill y` collapses `y` onto `x`.
//! - **hoist-alias** (experimental): after a reset of a
//!   struct-represented local whose only remaining read is a single
//!   copy out, the copy becomes a shallow alias.
//!
//! All three decline whenever a liveness condition cannot be read off
//! the instruction stream.

use lira_ir::lir::{Instr, InstrKind, LDef, Loc, NameId, Rep, Val};

/// Apply remove-alias to every function.
pub fn remove_alias(defs: &mut [LDef]) {
    for_each_body(defs, &mut |instrs| {
        while remove_alias_once(instrs) {}
    });
}

/// Apply combine-variables to every function.
pub fn combine_variables(defs: &mut [LDef]) {
    for_each_body(defs, &mut |instrs| {
        while combine_once(instrs) {}
    });
}

/// Apply the experimental hoist-alias rewrite to every function.
///
/// Not proven against all lifetime shapes; gated behind the
/// experimental toggle by the pipeline.
pub fn hoist_alias(defs: &mut [LDef]) {
    for_each_body(defs, &mut |instrs| hoist_alias_vec(instrs));
}

fn for_each_body(defs: &mut [LDef], f: &mut impl FnMut(&mut Vec<Instr>)) {
    for def in defs {
        if let LDef::Fn(func) = def {
            apply_nested(&mut func.body, f);
        }
    }
}

/// Apply a rewrite to an instruction vector and to every nested vector.
fn apply_nested(instrs: &mut Vec<Instr>, f: &mut impl FnMut(&mut Vec<Instr>)) {
    f(instrs);
    for instr in instrs {
        match &mut instr.kind {
            InstrKind::If(_, then_is, else_is, _) => {
                apply_nested(then_is, f);
                apply_nested(else_is, f);
            }
            InstrKind::Block(inner) | InstrKind::TryBlock(inner) => apply_nested(inner, f),
            _ => {}
        }
    }
}

// ── Reference queries ───────────────────────────────────────────────

/// True when the instruction mentions `id` anywhere: reads, writes,
/// declares, clears, nested instructions.
fn references(kind: &InstrKind, id: NameId) -> bool {
    let mut found = false;
    kind.each_val(&mut |v| {
        v.each_id(&mut |i| {
            if i == id {
                found = true;
            }
        });
    });
    if found {
        return true;
    }
    match kind {
        InstrKind::Decl(_, d) | InstrKind::Clear(_, d) | InstrKind::Reset(_, d)
        | InstrKind::End(d) => *d == id,
        InstrKind::Init(_, d, _) => *d == id,
        InstrKind::Copy(loc, _) | InstrKind::Alias(loc, _) | InstrKind::Call(loc, _, _) => {
            loc.base() == id || loc_mentions(loc, id)
        }
        InstrKind::If(_, then_is, else_is, _) => then_is
            .iter()
            .chain(else_is)
            .any(|i| references(&i.kind, id)),
        InstrKind::Block(inner) | InstrKind::TryBlock(inner) => {
            inner.iter().any(|i| references(&i.kind, id))
        }
        _ => false,
    }
}

fn loc_mentions(loc: &Loc, id: NameId) -> bool {
    match loc {
        Loc::Id(i, _) => *i == id,
        Loc::Field(inner, _) | Loc::Tuple(inner, _) | Loc::Addr(inner) => loc_mentions(inner, id),
    }
}

fn range_free_of(instrs: &[Instr], range: std::ops::Range<usize>, id: NameId) -> bool {
    instrs[range].iter().all(|i| !references(&i.kind, id))
}

fn rename_range(instrs: &mut [Instr], range: std::ops::Range<usize>, from: NameId, to: NameId) {
    for instr in &mut instrs[range] {
        instr.kind.map_ids(&mut |id| if id == from { to } else { id });
    }
}

/// `x = y` between two whole locals of the same representation.
fn as_plain_copy(kind: &InstrKind) -> Option<(NameId, Rep, NameId)> {
    if let InstrKind::Copy(Loc::Id(dst, dst_rep), Val::Id(src, src_rep)) = kind {
        if dst_rep == src_rep {
            return Some((*dst, dst_rep.clone(), *src));
        }
    }
    None
}

// ── remove-alias ────────────────────────────────────────────────────

fn remove_alias_once(instrs: &mut Vec<Instr>) -> bool {
    for i in 0..instrs.len() {
        let InstrKind::Decl(decl_rep, x) = &instrs[i].kind else {
            continue;
        };
        let (decl_rep, x) = (decl_rep.clone(), *x);

        // First reference to x after its declare must be `x = y`.
        let Some(fu) = (i + 1..instrs.len()).find(|&p| references(&instrs[p].kind, x)) else {
            continue;
        };
        let Some((dst, rep, y)) = as_plain_copy(&instrs[fu].kind) else {
            continue;
        };
        if dst != x || rep != decl_rep || y == x {
            continue;
        }

        // The matching kill of x.
        let Some(k) = (fu + 1..instrs.len())
            .find(|&p| matches!(&instrs[p].kind, InstrKind::Clear(_, c) if *c == x))
        else {
            continue;
        };

        // Last reference to x before the kill must be `y = x`.
        let Some(lu) = (fu + 1..k).rev().find(|&p| references(&instrs[p].kind, x)) else {
            continue;
        };
        let Some((dst2, _, src2)) = as_plain_copy(&instrs[lu].kind) else {
            continue;
        };
        if dst2 != y || src2 != x {
            continue;
        }

        // In between, x mutates freely but y must stay untouched; after
        // the kill, x must be dead.
        if !range_free_of(instrs, fu + 1..lu, y) {
            continue;
        }
        if !range_free_of(instrs, lu + 1..k, x) {
            continue;
        }
        if !range_free_of(instrs, k + 1..instrs.len(), x) {
            continue;
        }

        rename_range(instrs, fu + 1..lu, x, y);
        // Delete kill, last copy, first copy, declare (reverse order
        // keeps the indices valid).
        instrs.remove(k);
        instrs.remove(lu);
        instrs.remove(fu);
        instrs.remove(i);
        tracing::trace!("remove-alias collapsed a copy pair");
        return true;
    }
    false
}

// ── combine-variables ───────────────────────────────────────────────

fn combine_once(instrs: &mut Vec<Instr>) -> bool {
    for i in 0..instrs.len() {
        let InstrKind::Decl(x_rep, x) = &instrs[i].kind else {
            continue;
        };
        let (x_rep, x) = (x_rep.clone(), *x);

        for j in i + 1..instrs.len() {
            let InstrKind::Decl(y_rep, y) = &instrs[j].kind else {
                continue;
            };
            let y = *y;
            if *y_rep != x_rep || y == x {
                continue;
            }

            // The combining copy `x = y`.
            let Some(m) = (j + 1..instrs.len()).find(|&p| {
                matches!(as_plain_copy(&instrs[p].kind),
                    Some((dst, _, src)) if dst == x && src == y)
            }) else {
                continue;
            };
            // y's kill.
            let Some(k) = (m + 1..instrs.len())
                .find(|&p| matches!(&instrs[p].kind, InstrKind::Clear(_, c) if *c == y))
            else {
                continue;
            };

            // x stays untouched while y is built; y dies at the copy.
            if !range_free_of(instrs, i + 1..m, x) {
                continue;
            }
            if !range_free_of(instrs, m + 1..k, y) {
                continue;
            }
            if !range_free_of(instrs, k + 1..instrs.len(), y) {
                continue;
            }

            rename_range(instrs, j + 1..m, y, x);
            instrs.remove(k);
            instrs.remove(m);
            instrs.remove(j);
            tracing::trace!("combine-variables merged two locals");
            return true;
        }
    }
    false
}

// ── hoist-alias ─────────────────────────────────────────────────────

/// True when the instruction reads `id` as a value (writes and
/// declares do not count).
fn reads(kind: &InstrKind, id: NameId) -> bool {
    let mut found = false;
    kind.each_val(&mut |v| {
        v.each_id(&mut |i| {
            if i == id {
                found = true;
            }
        });
    });
    found
}

fn hoist_alias_vec(instrs: &mut Vec<Instr>) {
    for i in 0..instrs.len() {
        let InstrKind::Reset(rep, x) = &instrs[i].kind else {
            continue;
        };
        if !matches!(rep, Rep::Struct(..)) {
            continue;
        }
        let x = *x;

        // The first read of x after the reset must be a single whole
        // copy out of it.
        let Some(m) = (i + 1..instrs.len()).find(|&p| reads(&instrs[p].kind, x)) else {
            continue;
        };
        let InstrKind::Copy(loc, Val::Id(src, src_rep)) = &instrs[m].kind else {
            continue;
        };
        if *src != x {
            continue;
        }
        let (loc, src_rep) = (loc.clone(), src_rep.clone());

        // x must be dead afterwards, otherwise the alias would share
        // mutable structure.
        if !range_free_of(instrs, m + 1..instrs.len(), x) {
            continue;
        }

        instrs[m] = Instr::new(InstrKind::Alias(loc, Val::Id(x, src_rep)));
        tracing::trace!("hoist-alias replaced a struct copy");
    }
}
