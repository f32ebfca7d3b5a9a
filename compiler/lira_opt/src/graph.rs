//! Call-graph construction and recursion detection.
//!
//! The allocation hoister must skip functions that participate in any
//! call cycle, including mutual recursion: a hoisted slot would be
//! shared across activations. The graph is an adjacency map keyed by
//! function id, walked with an explicit stack.

use rustc_hash::{FxHashMap, FxHashSet};

use lira_ir::lir::{CallTarget, Instr, InstrKind, LDef};
use lira_ir::Sym;

/// Function ids that can reach themselves through the call graph.
pub fn recursive_fns(defs: &[LDef]) -> FxHashSet<Sym> {
    let mut calls: FxHashMap<Sym, Vec<Sym>> = FxHashMap::default();
    for def in defs {
        if let LDef::Fn(f) = def {
            let mut callees = Vec::new();
            collect_callees(&f.body, &mut callees);
            calls.insert(f.id, callees);
        }
    }

    let mut recursive = FxHashSet::default();
    for &start in calls.keys() {
        if reaches(&calls, start, start) {
            recursive.insert(start);
        }
    }
    recursive
}

fn collect_callees(instrs: &[Instr], out: &mut Vec<Sym>) {
    for instr in instrs {
        match &instr.kind {
            InstrKind::Call(_, CallTarget::Fn(f), _) => out.push(*f),
            InstrKind::If(_, then_is, else_is, _) => {
                collect_callees(then_is, out);
                collect_callees(else_is, out);
            }
            InstrKind::Block(inner) | InstrKind::TryBlock(inner) => collect_callees(inner, out),
            _ => {}
        }
    }
}

/// Iterative depth-first reachability of `target` from `start` through
/// at least one edge.
fn reaches(calls: &FxHashMap<Sym, Vec<Sym>>, start: Sym, target: Sym) -> bool {
    let mut stack: Vec<Sym> = calls.get(&start).cloned().unwrap_or_default();
    let mut visited = FxHashSet::default();
    while let Some(next) = stack.pop() {
        if next == target {
            return true;
        }
        if visited.insert(next) {
            if let Some(callees) = calls.get(&next) {
                stack.extend(callees.iter().copied());
            }
        }
    }
    false
}
