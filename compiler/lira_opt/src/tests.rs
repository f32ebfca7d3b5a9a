//! Pass tests over hand-built lowered functions.

#![allow(clippy::unwrap_used)]

use pretty_assertions::assert_eq;
use rustc_hash::FxHashSet;

use lira_ir::lir::{CallTarget, Instr, InstrKind, LDef, LFn, Loc, NameId, Rep, RetKind, Val};
use lira_ir::source::Order;
use lira_ir::{Interner, Span, Sym};

use crate::alias::{combine_variables, hoist_alias, remove_alias};
use crate::hoist::hoist_allocations;
use crate::unique::unique_names;

fn instr(kind: InstrKind) -> Instr {
    Instr::new(kind)
}

fn fun(interner: &Interner, name: &str, body: Vec<Instr>) -> LFn {
    LFn {
        id: interner.intern(name),
        params: Vec::new(),
        ret: RetKind::Stack(Rep::Unit),
        body,
        span: Span::DUMMY,
    }
}

fn name(interner: &Interner, s: &str) -> NameId {
    NameId::name(interner.intern(s))
}

fn declares_of(body: &[Instr]) -> Vec<NameId> {
    let mut out = Vec::new();
    fn go(instrs: &[Instr], out: &mut Vec<NameId>) {
        for i in instrs {
            if let Some(d) = i.kind.declared() {
                out.push(d);
            }
            match &i.kind {
                InstrKind::If(_, t, e, _) => {
                    go(t, out);
                    go(e, out);
                }
                InstrKind::Block(b) | InstrKind::TryBlock(b) => go(b, out),
                _ => {}
            }
        }
    }
    go(body, &mut out);
    out
}

// ── Unique names ────────────────────────────────────────────────────

#[test]
fn shadowed_declares_get_fresh_suffixes() {
    let interner = Interner::new();
    let x = interner.intern("x");
    let int64 = Rep::FInt(64);

    // let x = 1 in (let x = 2 in x) + use of outer x afterwards
    let body = vec![
        instr(InstrKind::Decl(int64.clone(), NameId::Name(x, 0))),
        instr(InstrKind::Block(vec![
            instr(InstrKind::Decl(int64.clone(), NameId::Name(x, 0))),
            instr(InstrKind::Copy(
                Loc::Id(NameId::Name(x, 0), int64.clone()),
                Val::Lit(lira_ir::lir::VLit::Int(2), int64.clone()),
            )),
        ])),
        instr(InstrKind::Copy(
            Loc::Id(NameId::Name(x, 0), int64.clone()),
            Val::Lit(lira_ir::lir::VLit::Int(1), int64.clone()),
        )),
    ];
    let mut defs = vec![LDef::Fn(fun(&interner, "f", body))];
    unique_names(&mut defs);

    let LDef::Fn(f) = &defs[0] else { unreachable!() };
    let declares = declares_of(&f.body);
    let unique: FxHashSet<NameId> = declares.iter().copied().collect();
    assert_eq!(declares.len(), unique.len(), "no two declares share a name");

    // The use after the block still refers to the outer binding.
    let InstrKind::Copy(Loc::Id(outer_use, _), _) = &f.body[2].kind else {
        panic!("expected a copy");
    };
    assert_eq!(*outer_use, NameId::Name(x, 0));
}

// ── remove-alias ────────────────────────────────────────────────────

#[test]
fn remove_alias_collapses_copy_pairs() {
    let interner = Interner::new();
    let x = name(&interner, "x");
    let y = name(&interner, "y");
    let lint = Rep::LInt;

    let body = vec![
        instr(InstrKind::Decl(lint.clone(), x)),
        instr(InstrKind::Copy(Loc::Id(x, lint.clone()), Val::Id(y, lint.clone()))),
        instr(InstrKind::Call(
            Loc::Id(x, lint.clone()),
            CallTarget::Rt("add_int"),
            vec![Val::Id(x, lint.clone())],
        )),
        instr(InstrKind::Copy(Loc::Id(y, lint.clone()), Val::Id(x, lint.clone()))),
        instr(InstrKind::Clear(lint.clone(), x)),
    ];
    let mut defs = vec![LDef::Fn(fun(&interner, "f", body))];
    remove_alias(&mut defs);

    let LDef::Fn(f) = &defs[0] else { unreachable!() };
    assert_eq!(f.body.len(), 1, "only the rewritten mutation remains");
    let InstrKind::Call(Loc::Id(dst, _), _, args) = &f.body[0].kind else {
        panic!("expected the mutation call");
    };
    assert_eq!(*dst, y);
    assert_eq!(args[0], Val::Id(y, lint));
}

#[test]
fn remove_alias_declines_when_source_is_touched() {
    let interner = Interner::new();
    let x = name(&interner, "x");
    let y = name(&interner, "y");
    let lint = Rep::LInt;

    let body = vec![
        instr(InstrKind::Decl(lint.clone(), x)),
        instr(InstrKind::Copy(Loc::Id(x, lint.clone()), Val::Id(y, lint.clone()))),
        // y is mutated between the copies: the rewrite must decline.
        instr(InstrKind::Copy(
            Loc::Id(y, lint.clone()),
            Val::Lit(lira_ir::lir::VLit::Int(0), lint.clone()),
        )),
        instr(InstrKind::Copy(Loc::Id(y, lint.clone()), Val::Id(x, lint.clone()))),
        instr(InstrKind::Clear(lint.clone(), x)),
    ];
    let before = body.clone();
    let mut defs = vec![LDef::Fn(fun(&interner, "f", body))];
    remove_alias(&mut defs);
    let LDef::Fn(f) = &defs[0] else { unreachable!() };
    assert_eq!(f.body, before);
}

// ── combine-variables ───────────────────────────────────────────────

#[test]
fn combine_variables_merges_build_then_move() {
    let interner = Interner::new();
    let x = name(&interner, "x");
    let y = name(&interner, "y");
    let lint = Rep::LInt;

    let body = vec![
        instr(InstrKind::Decl(lint.clone(), x)),
        instr(InstrKind::Decl(lint.clone(), y)),
        instr(InstrKind::Call(
            Loc::Id(y, lint.clone()),
            CallTarget::Rt("add_int"),
            vec![],
        )),
        instr(InstrKind::Copy(Loc::Id(x, lint.clone()), Val::Id(y, lint.clone()))),
        instr(InstrKind::Clear(lint.clone(), y)),
        instr(InstrKind::Clear(lint.clone(), x)),
    ];
    let mut defs = vec![LDef::Fn(fun(&interner, "f", body))];
    combine_variables(&mut defs);

    let LDef::Fn(f) = &defs[0] else { unreachable!() };
    assert_eq!(f.body.len(), 3);
    assert_eq!(f.body[0].kind, InstrKind::Decl(lint.clone(), x));
    assert!(matches!(
        &f.body[1].kind,
        InstrKind::Call(Loc::Id(dst, _), _, _) if *dst == x
    ));
    assert_eq!(f.body[2].kind, InstrKind::Clear(lint, x));
}

// ── hoist-alias ─────────────────────────────────────────────────────

#[test]
fn hoist_alias_rewrites_final_struct_copy() {
    let interner = Interner::new();
    let s = interner.intern("regs");
    let field = interner.intern("pc");
    let st_rep = Rep::Struct(s, vec![(field, Rep::LInt)]);
    let x = name(&interner, "x");
    let y = name(&interner, "y");

    let body = vec![
        instr(InstrKind::Reset(st_rep.clone(), x)),
        instr(InstrKind::Copy(
            Loc::Field(Box::new(Loc::Id(x, st_rep.clone())), field),
            Val::Lit(lira_ir::lir::VLit::Int(1), Rep::LInt),
        )),
        instr(InstrKind::Copy(
            Loc::Id(y, st_rep.clone()),
            Val::Id(x, st_rep.clone()),
        )),
    ];
    let mut defs = vec![LDef::Fn(fun(&interner, "f", body))];
    hoist_alias(&mut defs);

    let LDef::Fn(f) = &defs[0] else { unreachable!() };
    assert!(matches!(&f.body[2].kind, InstrKind::Alias(Loc::Id(dst, _), _) if *dst == y));
}

// ── S6: hoisting skips recursion, moves declare/clear pairs ─────────

fn call_fn(dst: NameId, rep: Rep, f: Sym) -> Instr {
    instr(InstrKind::Call(Loc::Id(dst, rep), CallTarget::Fn(f), vec![]))
}

#[test]
fn hoister_skips_mutually_recursive_functions() {
    let interner = Interner::new();
    let even = interner.intern("even");
    let odd = interner.intern("odd");
    let a = name(&interner, "a");

    let even_body = vec![
        instr(InstrKind::Decl(Rep::LInt, a)),
        call_fn(a, Rep::LInt, odd),
        instr(InstrKind::Clear(Rep::LInt, a)),
    ];
    let odd_body = vec![
        instr(InstrKind::Decl(Rep::LInt, a)),
        call_fn(a, Rep::LInt, even),
        instr(InstrKind::Clear(Rep::LInt, a)),
    ];
    let mut defs = vec![
        LDef::Fn(fun(&interner, "even", even_body.clone())),
        LDef::Fn(fun(&interner, "odd", odd_body.clone())),
    ];
    // Rebind ids so the call graph sees the right names.
    if let LDef::Fn(f) = &mut defs[0] {
        f.id = even;
    }
    if let LDef::Fn(f) = &mut defs[1] {
        f.id = odd;
    }

    hoist_allocations(&mut defs, &interner);

    let LDef::Fn(f0) = &defs[0] else { unreachable!() };
    let LDef::Fn(f1) = &defs[1] else { unreachable!() };
    assert_eq!(f0.body, even_body, "mutually recursive: left untouched");
    assert_eq!(f1.body, odd_body, "mutually recursive: left untouched");
}

#[test]
fn hoister_moves_two_heap_locals_to_prologue_and_epilogue() {
    let interner = Interner::new();
    let a = name(&interner, "a");
    let b = name(&interner, "b");
    let lb = Rep::LBits(Order::Dec);

    let body = vec![
        instr(InstrKind::Decl(Rep::LInt, a)),
        instr(InstrKind::Call(
            Loc::Id(a, Rep::LInt),
            CallTarget::Rt("add_int"),
            vec![],
        )),
        instr(InstrKind::Clear(Rep::LInt, a)),
        instr(InstrKind::Decl(lb.clone(), b)),
        instr(InstrKind::Clear(lb.clone(), b)),
        instr(InstrKind::Label("end_function_zf".into())),
        instr(InstrKind::Return(Val::Lit(lira_ir::lir::VLit::Unit, Rep::Unit))),
    ];
    let mut defs = vec![LDef::Fn(fun(&interner, "f", body))];
    hoist_allocations(&mut defs, &interner);

    let LDef::Fn(f) = &defs[0] else { unreachable!() };

    // Prologue: two declares of the hoisted slots.
    assert!(matches!(&f.body[0].kind, InstrKind::Decl(Rep::LInt, _)));
    assert!(matches!(&f.body[1].kind, InstrKind::Decl(Rep::LBits(_), _)));

    // Mid-body declares became resets; in-body clears are gone.
    let kinds: Vec<_> = f.body.iter().map(|i| &i.kind).collect();
    let resets = kinds
        .iter()
        .filter(|k| matches!(k, InstrKind::Reset(..)))
        .count();
    assert_eq!(resets, 2);

    // Epilogue: exactly two clears after the exit label.
    let label_pos = f
        .body
        .iter()
        .position(|i| matches!(i.kind, InstrKind::Label(_)))
        .unwrap();
    let clears_after: Vec<_> = f.body[label_pos + 1..]
        .iter()
        .filter(|i| matches!(i.kind, InstrKind::Clear(..)))
        .collect();
    assert_eq!(clears_after.len(), 2);
    let clears_before = f.body[..label_pos]
        .iter()
        .filter(|i| matches!(i.kind, InstrKind::Clear(..)))
        .count();
    assert_eq!(clears_before, 0);

    // Declares and clears stay balanced one-to-one.
    let declared: Vec<_> = declares_of(&f.body);
    let cleared: Vec<_> = f
        .body
        .iter()
        .filter_map(|i| match &i.kind {
            InstrKind::Clear(_, id) => Some(*id),
            _ => None,
        })
        .collect();
    let declared_heap: FxHashSet<_> = declared
        .iter()
        .copied()
        .filter(|id| cleared.contains(id))
        .collect();
    assert_eq!(declared_heap.len(), cleared.len());
}
