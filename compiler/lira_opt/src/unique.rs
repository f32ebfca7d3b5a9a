//! Unique names.
//!
//! The IR compiler emits one declare per textual binding, so shadowed
//! names collide within a function. This pass assigns a fresh uniquing
//! suffix to every declare whose base name has been seen earlier in the
//! same function and rewrites the uses each declare dominates. Nested
//! instruction lists get a branch-local view of the substitution, so a
//! name declared inside a branch never leaks past it.

use rustc_hash::FxHashMap;

use lira_ir::lir::{Instr, InstrKind, LDef, LFn, Loc, NameId, Val};
use lira_ir::Sym;

/// Run the pass over every lowered function.
pub fn unique_names(defs: &mut [LDef]) {
    for def in defs {
        if let LDef::Fn(f) = def {
            unique_fn(f);
        }
    }
}

fn unique_fn(f: &mut LFn) {
    // Highest suffix handed out so far per base name.
    let mut seen: FxHashMap<Sym, u32> = FxHashMap::default();
    // Suffix currently in scope per base name.
    let mut subst: FxHashMap<Sym, u32> = FxHashMap::default();

    for (id, _) in &f.params {
        if let NameId::Name(sym, n) = id {
            seen.insert(*sym, *n);
            subst.insert(*sym, *n);
        }
    }

    walk(&mut f.body, &mut seen, &mut subst);
    tracing::trace!(declares = seen.len(), "uniquified function names");
}

fn walk(instrs: &mut [Instr], seen: &mut FxHashMap<Sym, u32>, subst: &mut FxHashMap<Sym, u32>) {
    for instr in instrs {
        match &mut instr.kind {
            InstrKind::Decl(_, id) => {
                declare(id, seen, subst);
            }
            InstrKind::Init(_, id, val) => {
                // The initializer evaluates before the binding exists.
                rewrite_val(val, subst);
                declare(id, seen, subst);
            }
            InstrKind::Copy(loc, val) | InstrKind::Alias(loc, val) => {
                rewrite_loc(loc, subst);
                rewrite_val(val, subst);
            }
            InstrKind::Call(loc, _, args) => {
                rewrite_loc(loc, subst);
                for a in args {
                    rewrite_val(a, subst);
                }
            }
            InstrKind::If(cond, then_is, else_is, _) => {
                rewrite_val(cond, subst);
                let mut then_subst = subst.clone();
                walk(then_is, seen, &mut then_subst);
                let mut else_subst = subst.clone();
                walk(else_is, seen, &mut else_subst);
            }
            InstrKind::Block(inner) | InstrKind::TryBlock(inner) => {
                let mut inner_subst = subst.clone();
                walk(inner, seen, &mut inner_subst);
            }
            InstrKind::Jump(val, _) | InstrKind::Return(val) => rewrite_val(val, subst),
            InstrKind::Clear(_, id) | InstrKind::Reset(_, id) | InstrKind::End(id) => {
                *id = rename(*id, subst);
            }
            InstrKind::Goto(_)
            | InstrKind::MatchFailure
            | InstrKind::Comment(_)
            | InstrKind::Raw(_)
            | InstrKind::Label(_) => {}
        }
    }
}

fn declare(id: &mut NameId, seen: &mut FxHashMap<Sym, u32>, subst: &mut FxHashMap<Sym, u32>) {
    let NameId::Name(sym, _) = id else { return };
    let n = match seen.get(sym) {
        Some(&prev) => prev + 1,
        None => 0,
    };
    seen.insert(*sym, n);
    subst.insert(*sym, n);
    *id = NameId::Name(*sym, n);
}

fn rename(id: NameId, subst: &FxHashMap<Sym, u32>) -> NameId {
    if let NameId::Name(sym, _) = id {
        if let Some(&n) = subst.get(&sym) {
            return NameId::Name(sym, n);
        }
    }
    id
}

fn rewrite_val(val: &mut Val, subst: &FxHashMap<Sym, u32>) {
    val.map_ids(&mut |id| rename(id, subst));
}

fn rewrite_loc(loc: &mut Loc, subst: &FxHashMap<Sym, u32>) {
    loc.map_ids(&mut |id| rename(id, subst));
}
