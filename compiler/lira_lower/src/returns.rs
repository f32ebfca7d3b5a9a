//! Return rewriting.
//!
//! The IR compiler targets the distinguished [`NameId::Return`] slot.
//! This pass gives every function a single exit:
//!
//! - **Stack-returning** functions get one named result slot declared in
//!   the prologue; every terminal assignment to the return slot becomes
//!   an assignment to that slot plus a jump to the function-exit label,
//!   and the label is followed by one `Return` of the slot.
//! - **Heap-returning** functions receive a caller-provided pointer;
//!   terminal assignments become copies through that pointer plus the
//!   same jump, and the exit label carries no return value.
//!
//! The rewrite descends into blocks, conditionals, calls whose
//! destination is the return slot, and direct copies to it. Any other
//! instruction shape that mentions the return slot is a backend bug.

use lira_ir::lir::{Instr, InstrKind, Loc, NameId, Rep, Val};

use crate::error::LowerError;

/// Rewrite a stack-returning body. `slot` is the fresh result slot.
pub fn rewrite_stack(
    slot: NameId,
    rep: &Rep,
    body: Vec<Instr>,
    end_label: &str,
) -> Result<Vec<Instr>, LowerError> {
    let make = |r: Rep| Loc::Id(slot, r);
    let mut out = walk(body, true, &make, end_label)?;
    out.insert(0, Instr::new(InstrKind::Decl(rep.clone(), slot)));
    out.push(Instr::new(InstrKind::Label(end_label.to_owned())));
    out.push(Instr::new(InstrKind::Return(Val::Id(slot, rep.clone()))));
    Ok(out)
}

/// Rewrite a heap-returning body. The return slot becomes a write
/// through the caller's pointer, which keeps the [`NameId::Return`]
/// name as its parameter.
pub fn rewrite_heap(body: Vec<Instr>, end_label: &str) -> Result<Vec<Instr>, LowerError> {
    let make = |r: Rep| Loc::Addr(Box::new(Loc::Id(NameId::Return, r)));
    let mut out = walk(body, true, &make, end_label)?;
    out.push(Instr::new(InstrKind::Label(end_label.to_owned())));
    out.push(Instr::new(InstrKind::End(NameId::Return)));
    Ok(out)
}

fn walk(
    instrs: Vec<Instr>,
    tail: bool,
    make: &dyn Fn(Rep) -> Loc,
    end_label: &str,
) -> Result<Vec<Instr>, LowerError> {
    let len = instrs.len();
    let mut out = Vec::with_capacity(len + 2);
    for (i, mut instr) in instrs.into_iter().enumerate() {
        let is_tail = tail && i + 1 == len;
        let mut add_goto = false;
        match &mut instr.kind {
            InstrKind::Copy(loc, val) | InstrKind::Alias(loc, val) => {
                check_no_return_read(val)?;
                if targets_return(loc) {
                    swap_base(loc, make);
                    add_goto = is_tail;
                }
            }
            InstrKind::Call(loc, _, args) => {
                for a in args.iter() {
                    check_no_return_read(a)?;
                }
                if targets_return(loc) {
                    swap_base(loc, make);
                    add_goto = is_tail;
                }
            }
            InstrKind::If(cond, then_is, else_is, _) => {
                check_no_return_read(cond)?;
                let t = std::mem::take(then_is);
                let e = std::mem::take(else_is);
                *then_is = walk(t, is_tail, make, end_label)?;
                *else_is = walk(e, is_tail, make, end_label)?;
            }
            InstrKind::Block(inner) | InstrKind::TryBlock(inner) => {
                let taken = std::mem::take(inner);
                *inner = walk(taken, is_tail, make, end_label)?;
            }
            InstrKind::Init(_, id, val) => {
                check_no_return_read(val)?;
                if *id == NameId::Return {
                    return Err(LowerError::Invariant(
                        "return slot reached an init instruction".into(),
                    ));
                }
            }
            InstrKind::Jump(val, _) | InstrKind::Return(val) => check_no_return_read(val)?,
            InstrKind::Decl(_, id) | InstrKind::Clear(_, id) | InstrKind::Reset(_, id) => {
                if *id == NameId::Return {
                    return Err(LowerError::Invariant(
                        "return slot reached a declare/clear instruction".into(),
                    ));
                }
            }
            InstrKind::Goto(_)
            | InstrKind::End(_)
            | InstrKind::MatchFailure
            | InstrKind::Comment(_)
            | InstrKind::Raw(_)
            | InstrKind::Label(_) => {}
        }
        out.push(instr);
        if add_goto {
            out.push(Instr::new(InstrKind::Goto(end_label.to_owned())));
        }
    }
    Ok(out)
}

fn targets_return(loc: &Loc) -> bool {
    match loc {
        Loc::Id(id, _) => *id == NameId::Return,
        Loc::Field(inner, _) | Loc::Tuple(inner, _) | Loc::Addr(inner) => targets_return(inner),
    }
}

/// Replace the `Return` base of a left-value in place.
fn swap_base(loc: &mut Loc, make: &dyn Fn(Rep) -> Loc) {
    match loc {
        Loc::Id(id, rep) => {
            if *id == NameId::Return {
                *loc = make(rep.clone());
            }
        }
        Loc::Field(inner, _) | Loc::Tuple(inner, _) | Loc::Addr(inner) => swap_base(inner, make),
    }
}

/// The compiler never reads the return slot; a read reaching this pass
/// is an unrecognized shape.
fn check_no_return_read(val: &Val) -> Result<(), LowerError> {
    let mut found = false;
    val.each_id(&mut |id| {
        if id == NameId::Return {
            found = true;
        }
    });
    if found {
        Err(LowerError::Invariant(
            "return slot read as a value".into(),
        ))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use lira_ir::lir::{CallTarget, VLit};
    use lira_ir::{Interner, Sym};
    use pretty_assertions::assert_eq;

    fn ret_copy(n: i64) -> Instr {
        Instr::new(InstrKind::Copy(
            Loc::Id(NameId::Return, Rep::FInt(64)),
            Val::Lit(VLit::Int(n), Rep::FInt(64)),
        ))
    }

    #[test]
    fn stack_rewrite_declares_slot_and_single_exit() {
        let interner = Interner::new();
        let slot = NameId::name(interner.intern("ret#0"));
        let body = vec![ret_copy(1)];
        let out = rewrite_stack(slot, &Rep::FInt(64), body, "fn_end").unwrap();

        assert_eq!(
            out[0].kind,
            InstrKind::Decl(Rep::FInt(64), slot),
            "slot declared in the prologue"
        );
        assert_eq!(
            out[1].kind,
            InstrKind::Copy(
                Loc::Id(slot, Rep::FInt(64)),
                Val::Lit(VLit::Int(1), Rep::FInt(64))
            )
        );
        assert_eq!(out[2].kind, InstrKind::Goto("fn_end".into()));
        assert_eq!(out[3].kind, InstrKind::Label("fn_end".into()));
        assert_eq!(
            out[4].kind,
            InstrKind::Return(Val::Id(slot, Rep::FInt(64)))
        );
    }

    #[test]
    fn rewrite_descends_into_branches() {
        let interner = Interner::new();
        let slot = NameId::name(interner.intern("ret#0"));
        let body = vec![Instr::new(InstrKind::If(
            Val::Lit(VLit::Bool(true), Rep::Bool),
            vec![ret_copy(1)],
            vec![ret_copy(2)],
            Rep::FInt(64),
        ))];
        let out = rewrite_stack(slot, &Rep::FInt(64), body, "fn_end").unwrap();

        let InstrKind::If(_, then_is, else_is, _) = &out[1].kind else {
            panic!("expected branch");
        };
        assert_eq!(then_is[1].kind, InstrKind::Goto("fn_end".into()));
        assert_eq!(else_is[1].kind, InstrKind::Goto("fn_end".into()));
        assert!(matches!(
            then_is[0].kind,
            InstrKind::Copy(Loc::Id(s, _), _) if s == slot
        ));
    }

    #[test]
    fn heap_rewrite_writes_through_pointer_without_return_value() {
        let body = vec![Instr::new(InstrKind::If(
            Val::Lit(VLit::Bool(true), Rep::Bool),
            vec![Instr::new(InstrKind::Block(vec![ret_copy(7)]))],
            vec![ret_copy(8)],
            Rep::LInt,
        ))];
        let out = rewrite_heap(body, "fn_end").unwrap();

        let InstrKind::If(_, then_is, else_is, _) = &out[0].kind else {
            panic!("expected branch");
        };
        let InstrKind::Block(inner) = &then_is[0].kind else {
            panic!("expected block");
        };
        assert!(matches!(
            &inner[0].kind,
            InstrKind::Copy(Loc::Addr(base), _)
                if matches!(base.as_ref(), Loc::Id(NameId::Return, _))
        ));
        assert_eq!(inner[1].kind, InstrKind::Goto("fn_end".into()));
        assert!(matches!(
            &else_is[0].kind,
            InstrKind::Copy(Loc::Addr(_), _)
        ));

        // Exit label is declared once, with no returned value after it.
        let labels: Vec<_> = out
            .iter()
            .filter(|i| matches!(&i.kind, InstrKind::Label(l) if l == "fn_end"))
            .collect();
        assert_eq!(labels.len(), 1);
        assert!(matches!(out.last().map(|i| &i.kind), Some(InstrKind::End(_))));
    }

    #[test]
    fn calls_into_the_return_slot_are_redirected() {
        let interner = Interner::new();
        let slot = NameId::name(interner.intern("ret#0"));
        let f = Sym::from_raw(40);
        let body = vec![Instr::new(InstrKind::Call(
            Loc::Id(NameId::Return, Rep::FInt(64)),
            CallTarget::Fn(f),
            vec![],
        ))];
        let out = rewrite_stack(slot, &Rep::FInt(64), body, "fn_end").unwrap();
        assert!(matches!(
            &out[1].kind,
            InstrKind::Call(Loc::Id(s, _), _, _) if *s == slot
        ));
        assert_eq!(out[2].kind, InstrKind::Goto("fn_end".into()));
    }

    #[test]
    fn reading_the_return_slot_is_a_bug() {
        let interner = Interner::new();
        let slot = NameId::name(interner.intern("ret#0"));
        let x = NameId::name(interner.intern("x"));
        let body = vec![Instr::new(InstrKind::Copy(
            Loc::Id(x, Rep::FInt(64)),
            Val::Id(NameId::Return, Rep::FInt(64)),
        ))];
        assert!(matches!(
            rewrite_stack(slot, &Rep::FInt(64), body, "fn_end"),
            Err(LowerError::Invariant(_))
        ));
    }
}
