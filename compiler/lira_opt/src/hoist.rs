//! Allocation hoisting.
//!
//! Heap-represented locals allocate at declare and free at clear; in a
//! hot function body that is an allocation per call. This pass moves
//! each such local to a single allocation in the function prologue and
//! a single free in the epilogue, replacing the in-body declare with a
//! reset of the already-allocated slot. Hoisted locals are renamed so a
//! slot stays distinct from anything else in the function.
//!
//! Recursive functions (directly or mutually) are skipped: a hoisted
//! slot would be reused across activations. Must run after unique
//! names.

use rustc_hash::FxHashMap;

use lira_ir::lir::{Instr, InstrKind, LDef, LFn, NameId, Rep};
use lira_ir::Interner;

use crate::graph::recursive_fns;

/// Hoist heap-represented locals in every non-recursive function.
pub fn hoist_allocations(defs: &mut [LDef], interner: &Interner) {
    let recursive = recursive_fns(defs);
    for def in defs {
        if let LDef::Fn(f) = def {
            if recursive.contains(&f.id) {
                tracing::debug!(
                    function = interner.lookup(f.id),
                    "skipping hoist: function is recursive"
                );
                continue;
            }
            hoist_fn(f, interner);
        }
    }
}

struct Hoisted {
    /// Prologue declare per hoisted local, in first-seen order.
    prologue: Vec<(Rep, NameId)>,
    /// Rename applied across the whole body.
    renames: FxHashMap<NameId, NameId>,
    counter: u32,
}

fn hoist_fn(f: &mut LFn, interner: &Interner) {
    let mut st = Hoisted {
        prologue: Vec::new(),
        renames: FxHashMap::default(),
        counter: 0,
    };

    let body = std::mem::take(&mut f.body);
    let mut body = rewrite(body, &mut st, interner);
    if st.prologue.is_empty() {
        f.body = body;
        return;
    }

    for instr in &mut body {
        instr
            .kind
            .map_ids(&mut |id| st.renames.get(&id).copied().unwrap_or(id));
    }

    // Epilogue clears go right after the function-exit label, so every
    // exit path (fallthrough, early return, exception) releases them.
    let exit = body
        .iter()
        .rposition(|i| matches!(i.kind, InstrKind::Label(_)))
        .map_or(body.len(), |p| p + 1);
    for (rep, id) in st.prologue.iter().rev() {
        body.insert(exit, Instr::new(InstrKind::Clear(rep.clone(), *id)));
    }

    let mut out = Vec::with_capacity(body.len() + st.prologue.len());
    for (rep, id) in &st.prologue {
        out.push(Instr::new(InstrKind::Decl(rep.clone(), *id)));
    }
    out.extend(body);
    f.body = out;

    tracing::debug!(
        function = interner.lookup(f.id),
        hoisted = st.prologue.len(),
        "hoisted heap allocations"
    );
}

fn rewrite(instrs: Vec<Instr>, st: &mut Hoisted, interner: &Interner) -> Vec<Instr> {
    let mut out = Vec::with_capacity(instrs.len());
    for mut instr in instrs {
        match instr.kind {
            InstrKind::Decl(rep, id) if rep.is_heap() && is_local(id) => {
                let fresh = hoist_name(st, interner, id);
                out.push(Instr::with_span(
                    InstrKind::Reset(rep.clone(), fresh),
                    instr.span,
                ));
                st.prologue.push((rep, fresh));
                st.renames.insert(id, fresh);
            }
            InstrKind::Init(rep, id, val) if rep.is_heap() && is_local(id) => {
                let fresh = hoist_name(st, interner, id);
                out.push(Instr::with_span(
                    InstrKind::Reset(rep.clone(), fresh),
                    instr.span,
                ));
                out.push(Instr::new(InstrKind::Copy(
                    lira_ir::lir::Loc::Id(fresh, rep.clone()),
                    val,
                )));
                st.prologue.push((rep, fresh));
                st.renames.insert(id, fresh);
            }
            InstrKind::Clear(_, id) if st.renames.contains_key(&id) => {
                // The paired clear moves to the epilogue.
            }
            InstrKind::If(cond, then_is, else_is, rep) => {
                let then_is = rewrite(then_is, st, interner);
                let else_is = rewrite(else_is, st, interner);
                out.push(Instr::with_span(
                    InstrKind::If(cond, then_is, else_is, rep),
                    instr.span,
                ));
            }
            InstrKind::Block(inner) => {
                let inner = rewrite(inner, st, interner);
                out.push(Instr::with_span(InstrKind::Block(inner), instr.span));
            }
            InstrKind::TryBlock(inner) => {
                let inner = rewrite(inner, st, interner);
                out.push(Instr::with_span(InstrKind::TryBlock(inner), instr.span));
            }
            other => {
                instr.kind = other;
                out.push(instr);
            }
        }
    }
    out
}

fn is_local(id: NameId) -> bool {
    matches!(id, NameId::Name(..))
}

fn hoist_name(st: &mut Hoisted, interner: &Interner, id: NameId) -> NameId {
    let base = match id {
        NameId::Name(sym, n) => format!("{}#{n}", interner.lookup(sym)),
        _ => "hoist".to_owned(),
    };
    let fresh = interner.intern(&format!("{base}#h{}", st.counter));
    st.counter += 1;
    NameId::Name(fresh, 0)
}
