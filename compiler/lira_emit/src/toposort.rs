//! Topological ordering of user type definitions.
//!
//! Builds a dependency graph over type ids where an edge `a → b` means
//! "`a` is used inside the definition of `b`", and returns an order in
//! which every used type precedes its users. Ties break by insertion
//! order. A type's references to itself (which only occur through
//! indirection, e.g. a variant embedding a list of itself) are not
//! edges; any other cycle is a fatal input error.

use rustc_hash::{FxHashMap, FxHashSet};

use lira_ir::lir::{LTypeDef, Rep};
use lira_ir::{Interner, Sym};

use crate::error::EmitError;

/// Indices of `defs` in emission order.
pub fn sort_type_defs(defs: &[LTypeDef], interner: &Interner) -> Result<Vec<usize>, EmitError> {
    let index_of: FxHashMap<Sym, usize> =
        defs.iter().enumerate().map(|(i, d)| (d.id(), i)).collect();

    // deps[i] holds the definition indices `i` uses, in reference order.
    let mut deps: Vec<Vec<usize>> = Vec::with_capacity(defs.len());
    for def in defs {
        let mut used = Vec::new();
        let mut seen = FxHashSet::default();
        for rep in def_field_reps(def) {
            collect_named(rep, &mut |id| {
                if id != def.id() {
                    if let Some(&idx) = index_of.get(&id) {
                        if seen.insert(idx) {
                            used.push(idx);
                        }
                    }
                }
            });
        }
        deps.push(used);
    }

    // Iterative depth-first postorder; an in-progress node reached
    // again is a cycle.
    const UNSEEN: u8 = 0;
    const OPEN: u8 = 1;
    const DONE: u8 = 2;
    let mut state = vec![UNSEEN; defs.len()];
    let mut order = Vec::with_capacity(defs.len());

    for root in 0..defs.len() {
        if state[root] != UNSEEN {
            continue;
        }
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        state[root] = OPEN;
        while let Some(top) = stack.last_mut() {
            let node = top.0;
            if top.1 < deps[node].len() {
                let dep = deps[node][top.1];
                top.1 += 1;
                match state[dep] {
                    UNSEEN => {
                        state[dep] = OPEN;
                        stack.push((dep, 0));
                    }
                    OPEN => {
                        return Err(EmitError::TypeCycle(
                            interner.lookup(defs[dep].id()).to_owned(),
                        ));
                    }
                    _ => {}
                }
            } else {
                state[node] = DONE;
                order.push(node);
                stack.pop();
            }
        }
    }
    Ok(order)
}

fn def_field_reps(def: &LTypeDef) -> impl Iterator<Item = &Rep> {
    let fields: &[(Sym, Rep)] = match def {
        LTypeDef::Struct { fields, .. } => fields,
        LTypeDef::Variant { ctors, .. } => ctors,
        LTypeDef::Enum { .. } => &[],
    };
    fields.iter().map(|(_, r)| r)
}

/// Visit every named type id mentioned anywhere in a representation.
pub fn collect_named(rep: &Rep, f: &mut impl FnMut(Sym)) {
    match rep {
        Rep::Enum(id, _) => f(*id),
        Rep::Struct(id, fields) | Rep::Variant(id, fields) => {
            f(*id);
            for (_, r) in fields {
                collect_named(r, f);
            }
        }
        Rep::Tup(fields) => {
            for r in fields {
                collect_named(r, f);
            }
        }
        Rep::List(elem) | Rep::Vector(_, elem) | Rep::Ref(elem) => collect_named(elem, f),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn users_come_after_used() {
        let interner = Interner::new();
        let inner = interner.intern("inner");
        let outer = interner.intern("outer");
        let f = interner.intern("f");

        // `outer` embeds `inner`, but is declared first.
        let defs = vec![
            LTypeDef::Struct {
                id: outer,
                fields: vec![(f, Rep::Struct(inner, vec![(f, Rep::Bool)]))],
            },
            LTypeDef::Struct {
                id: inner,
                fields: vec![(f, Rep::Bool)],
            },
        ];
        let order = sort_type_defs(&defs, &interner).unwrap();
        assert_eq!(order, vec![1, 0]);
    }

    #[test]
    fn insertion_order_breaks_ties() {
        let interner = Interner::new();
        let a = interner.intern("a");
        let b = interner.intern("b");
        let m = interner.intern("m");
        let defs = vec![
            LTypeDef::Enum {
                id: a,
                members: vec![m],
            },
            LTypeDef::Enum {
                id: b,
                members: vec![m],
            },
        ];
        let order = sort_type_defs(&defs, &interner).unwrap();
        assert_eq!(order, vec![0, 1]);
    }

    #[test]
    fn self_reference_through_indirection_is_allowed() {
        let interner = Interner::new();
        let tree = interner.intern("tree");
        let leaf = interner.intern("Leaf");
        let node = interner.intern("Node");
        let defs = vec![LTypeDef::Variant {
            id: tree,
            ctors: vec![
                (leaf, Rep::LInt),
                (node, Rep::List(Box::new(Rep::Variant(tree, Vec::new())))),
            ],
        }];
        assert_eq!(sort_type_defs(&defs, &interner).unwrap(), vec![0]);
    }

    #[test]
    fn mutual_cycle_is_fatal() {
        let interner = Interner::new();
        let a = interner.intern("a");
        let b = interner.intern("b");
        let f = interner.intern("f");
        let defs = vec![
            LTypeDef::Struct {
                id: a,
                fields: vec![(f, Rep::Struct(b, Vec::new()))],
            },
            LTypeDef::Struct {
                id: b,
                fields: vec![(f, Rep::Struct(a, Vec::new()))],
            },
        ];
        assert!(matches!(
            sort_type_defs(&defs, &interner),
            Err(EmitError::TypeCycle(_))
        ));
    }
}
