//! Variant specialization: monomorphizing polymorphic tagged-union
//! constructors.
//!
//! For each variant whose constructors mention the deferred polymorphic
//! representation, every constructor call-site is unified against the
//! actual argument representation. Each deferred constituent is promoted
//! to its supremum (`FInt` to `LInt`, `FBits`/`SBits` to `LBits`), a
//! fresh monomorphic constructor is synthesized whose id encodes the
//! unifier, and the call-site is rewritten with a representation cast
//! when the actual argument differs from the promoted form. After the
//! pass the variant's constructor list holds only monomorphic entries:
//! the synthesized ones actually used plus those monomorphic from the
//! start.

use rustc_hash::FxHashMap;

use lira_ir::lir::{CallTarget, Instr, InstrKind, LDef, LTypeDef, Loc, NameId, Rep, RetKind, Val};
use lira_ir::{Interner, Sym};

use crate::error::LowerError;

struct SpecState<'a> {
    interner: &'a Interner,
    counter: u32,
    /// Declared argument representation per (variant, constructor).
    decl: FxHashMap<(Sym, Sym), Rep>,
    /// Variant → synthesized constructors in first-use order.
    used: FxHashMap<Sym, Vec<(Sym, Rep)>>,
    /// Original polymorphic constructor → its monomorphizations.
    mono_of: FxHashMap<Sym, Vec<Sym>>,
}

/// Run specialization over every lowered definition.
pub fn specialize_variants(
    defs: &mut [LDef],
    interner: &Interner,
) -> Result<(), LowerError> {
    let mut st = SpecState {
        interner,
        counter: 0,
        decl: FxHashMap::default(),
        used: FxHashMap::default(),
        mono_of: FxHashMap::default(),
    };

    for def in defs.iter() {
        if let LDef::Type(LTypeDef::Variant { id, ctors }) = def {
            for (ctor, rep) in ctors {
                st.decl.insert((*id, *ctor), rep.clone());
            }
        }
    }

    // Pass 1: rewrite constructor call-sites, synthesizing monomorphic
    // constructors.
    for def in defs.iter_mut() {
        match def {
            LDef::Fn(f) => rewrite_calls(&mut f.body, &mut st)?,
            LDef::Register(r) => rewrite_calls(&mut r.init, &mut st)?,
            LDef::Let(l) => {
                rewrite_calls(&mut l.setup, &mut st)?;
                rewrite_calls(&mut l.teardown, &mut st)?;
            }
            LDef::Type(_) => {}
        }
    }

    // Pass 2: rewrite tag tests and payload projections over
    // specialized constructors.
    for def in defs.iter_mut() {
        match def {
            LDef::Fn(f) => rewrite_pattern_vals(&mut f.body, &st)?,
            LDef::Register(r) => rewrite_pattern_vals(&mut r.init, &st)?,
            LDef::Let(l) => {
                rewrite_pattern_vals(&mut l.setup, &st)?;
                rewrite_pattern_vals(&mut l.teardown, &st)?;
            }
            LDef::Type(_) => {}
        }
    }

    // Pass 3: rebuild constructor tables and patch every embedded
    // variant representation with the new lists.
    let mut tables: FxHashMap<Sym, Vec<(Sym, Rep)>> = FxHashMap::default();
    for def in defs.iter() {
        if let LDef::Type(LTypeDef::Variant { id, ctors }) = def {
            if !ctors.iter().any(|(_, r)| r.has_poly()) {
                continue;
            }
            let mut rebuilt: Vec<(Sym, Rep)> = ctors
                .iter()
                .filter(|(_, r)| !r.has_poly())
                .cloned()
                .collect();
            if let Some(synth) = st.used.get(id) {
                rebuilt.extend(synth.iter().cloned());
            }
            tables.insert(*id, rebuilt);
        }
    }

    // The table entries may themselves embed specialized variants.
    let patched_tables = {
        let snapshot = tables.clone();
        for ctors in tables.values_mut() {
            for (_, rep) in ctors.iter_mut() {
                patch_rep(rep, &snapshot);
            }
        }
        tables
    };

    for def in defs.iter_mut() {
        match def {
            LDef::Type(td) => match td {
                LTypeDef::Variant { id, ctors } => {
                    if let Some(rebuilt) = patched_tables.get(id) {
                        *ctors = rebuilt.clone();
                    } else {
                        for (_, rep) in ctors.iter_mut() {
                            patch_rep(rep, &patched_tables);
                        }
                    }
                }
                LTypeDef::Struct { fields, .. } => {
                    for (_, rep) in fields.iter_mut() {
                        patch_rep(rep, &patched_tables);
                    }
                }
                LTypeDef::Enum { .. } => {}
            },
            LDef::Fn(f) => {
                for (_, rep) in &mut f.params {
                    patch_rep(rep, &patched_tables);
                }
                match &mut f.ret {
                    RetKind::Stack(r) | RetKind::Heap(r) => {
                        patch_rep(r, &patched_tables);
                    }
                }
                patch_instrs(&mut f.body, &patched_tables);
            }
            LDef::Register(r) => {
                patch_rep(&mut r.rep, &patched_tables);
                patch_instrs(&mut r.init, &patched_tables);
            }
            LDef::Let(l) => {
                patch_rep(&mut l.rep, &patched_tables);
                patch_instrs(&mut l.setup, &patched_tables);
                patch_instrs(&mut l.teardown, &patched_tables);
            }
        }
    }

    Ok(())
}

// ── Call-site rewriting ─────────────────────────────────────────────

fn rewrite_calls(instrs: &mut Vec<Instr>, st: &mut SpecState<'_>) -> Result<(), LowerError> {
    let mut out = Vec::with_capacity(instrs.len());
    for mut instr in instrs.drain(..) {
        match &mut instr.kind {
            InstrKind::If(_, then_is, else_is, _) => {
                rewrite_calls(then_is, st)?;
                rewrite_calls(else_is, st)?;
                out.push(instr);
            }
            InstrKind::Block(inner) | InstrKind::TryBlock(inner) => {
                rewrite_calls(inner, st)?;
                out.push(instr);
            }
            InstrKind::Call(dst, CallTarget::Ctor(variant, ctor), args) => {
                let poly = st
                    .decl
                    .get(&(*variant, *ctor))
                    .is_some_and(Rep::has_poly);
                if !poly {
                    out.push(instr);
                    continue;
                }
                let declared = st.decl[&(*variant, *ctor)].clone();
                let arg = args.first().cloned().ok_or_else(|| {
                    LowerError::Invariant("constructor call without argument".into())
                })?;
                let actual = arg.rep();

                let mut unifier = Vec::new();
                let mono_rep = unify(&declared, &actual, &mut unifier)?;

                let enc: Vec<String> =
                    unifier.iter().map(|r| r.suffix(st.interner)).collect();
                let mono_name = format!(
                    "{}_{}",
                    st.interner.lookup(*ctor),
                    enc.join("_")
                );
                let mono_ctor = st.interner.intern(&mono_name);

                let synth = st.used.entry(*variant).or_default();
                if !synth.iter().any(|(c, _)| *c == mono_ctor) {
                    synth.push((mono_ctor, mono_rep.clone()));
                }
                let monos = st.mono_of.entry(*ctor).or_default();
                if !monos.contains(&mono_ctor) {
                    monos.push(mono_ctor);
                }

                if actual == mono_rep {
                    out.push(Instr::with_span(
                        InstrKind::Call(
                            dst.clone(),
                            CallTarget::Ctor(*variant, mono_ctor),
                            vec![arg],
                        ),
                        instr.span,
                    ));
                } else {
                    // Promote through a temporary of the supremum form.
                    let tmp = NameId::name(
                        st.interner.intern(&format!("mono#{}", st.counter)),
                    );
                    st.counter += 1;
                    out.push(Instr::new(InstrKind::Decl(mono_rep.clone(), tmp)));
                    out.push(Instr::new(InstrKind::Copy(
                        Loc::Id(tmp, mono_rep.clone()),
                        arg,
                    )));
                    out.push(Instr::with_span(
                        InstrKind::Call(
                            dst.clone(),
                            CallTarget::Ctor(*variant, mono_ctor),
                            vec![Val::Id(tmp, mono_rep.clone())],
                        ),
                        instr.span,
                    ));
                    if mono_rep.is_heap() {
                        out.push(Instr::new(InstrKind::Clear(mono_rep, tmp)));
                    }
                }
            }
            _ => out.push(instr),
        }
    }
    *instrs = out;
    Ok(())
}

/// Unify a declared (possibly deferred) representation against the
/// actual argument representation, promoting each deferred constituent
/// to its supremum. The promoted constituents accumulate in `unifier`
/// in traversal order.
fn unify(declared: &Rep, actual: &Rep, unifier: &mut Vec<Rep>) -> Result<Rep, LowerError> {
    match (declared, actual) {
        (Rep::Poly, _) => {
            let promoted = actual.supremum();
            unifier.push(promoted.clone());
            Ok(promoted)
        }
        (Rep::Tup(ds), Rep::Tup(actuals)) if ds.len() == actuals.len() => {
            let mut out = Vec::with_capacity(ds.len());
            for (d, a) in ds.iter().zip(actuals) {
                out.push(unify(d, a, unifier)?);
            }
            Ok(Rep::Tup(out))
        }
        (Rep::List(d), Rep::List(a)) => Ok(Rep::List(Box::new(unify(d, a, unifier)?))),
        (Rep::Vector(ord, d), Rep::Vector(_, a)) => {
            Ok(Rep::Vector(*ord, Box::new(unify(d, a, unifier)?)))
        }
        (Rep::Ref(d), Rep::Ref(a)) => Ok(Rep::Ref(Box::new(unify(d, a, unifier)?))),
        (d, _) if !d.has_poly() => Ok(d.clone()),
        (d, a) => Err(LowerError::Invariant(format!(
            "constructor argument shape mismatch: declared {d:?}, actual {a:?}"
        ))),
    }
}

// ── Pattern rewriting ───────────────────────────────────────────────

/// Rewrite tag tests and payload projections that name specialized
/// constructors. Supported when the constructor has exactly one
/// monomorphization; anything else is a polymorphism leak.
fn rewrite_pattern_vals(instrs: &mut [Instr], st: &SpecState<'_>) -> Result<(), LowerError> {
    for instr in instrs {
        rewrite_kind_vals(&mut instr.kind, st)?;
    }
    Ok(())
}

fn rewrite_kind_vals(kind: &mut InstrKind, st: &SpecState<'_>) -> Result<(), LowerError> {
    match kind {
        InstrKind::Init(_, _, v)
        | InstrKind::Copy(_, v)
        | InstrKind::Alias(_, v)
        | InstrKind::Jump(v, _)
        | InstrKind::Return(v) => rewrite_val(v, st),
        InstrKind::Call(_, _, args) => {
            for a in args {
                rewrite_val(a, st)?;
            }
            Ok(())
        }
        InstrKind::If(cond, then_is, else_is, _) => {
            rewrite_val(cond, st)?;
            rewrite_pattern_vals(then_is, st)?;
            rewrite_pattern_vals(else_is, st)
        }
        InstrKind::Block(inner) | InstrKind::TryBlock(inner) => rewrite_pattern_vals(inner, st),
        _ => Ok(()),
    }
}

fn rewrite_val(val: &mut Val, st: &SpecState<'_>) -> Result<(), LowerError> {
    match val {
        Val::CtorKind(inner, ctor) => {
            rewrite_val(inner, st)?;
            if let Some(mono) = single_mono(st, *ctor)? {
                *ctor = mono;
            }
            Ok(())
        }
        Val::CtorUnwrap(inner, ctor, rep) => {
            rewrite_val(inner, st)?;
            if let Some(mono) = single_mono(st, *ctor)? {
                if let Some(mono_rep) = mono_rep_of(st, mono) {
                    *rep = mono_rep;
                }
                *ctor = mono;
            }
            Ok(())
        }
        Val::Field(inner, _, _) | Val::Tuple(inner, _, _) => rewrite_val(inner, st),
        Val::Call(_, args, _) => {
            for a in args {
                rewrite_val(a, st)?;
            }
            Ok(())
        }
        Val::Lit(..) | Val::Id(..) | Val::Raw(..) => Ok(()),
    }
}

/// The unique monomorphization of a specialized constructor, `None`
/// when the constructor was monomorphic from the start.
fn single_mono(st: &SpecState<'_>, ctor: Sym) -> Result<Option<Sym>, LowerError> {
    let is_poly = st
        .decl
        .iter()
        .any(|((_, c), rep)| *c == ctor && rep.has_poly());
    if !is_poly {
        return Ok(None);
    }
    match st.mono_of.get(&ctor).map(Vec::as_slice) {
        Some([single]) => Ok(Some(*single)),
        Some(monos) => Err(LowerError::Invariant(format!(
            "pattern over polymorphic constructor with {} instantiations",
            monos.len()
        ))),
        None => Err(LowerError::Invariant(
            "pattern over a polymorphic constructor that is never constructed".into(),
        )),
    }
}

fn mono_rep_of(st: &SpecState<'_>, mono: Sym) -> Option<Rep> {
    for synth in st.used.values() {
        if let Some((_, rep)) = synth.iter().find(|(c, _)| *c == mono) {
            return Some(rep.clone());
        }
    }
    None
}

// ── Representation patching ─────────────────────────────────────────

/// Replace the constructor list of every specialized variant embedded
/// in a representation.
fn patch_rep(rep: &mut Rep, tables: &FxHashMap<Sym, Vec<(Sym, Rep)>>) {
    rep.map_nested(&mut |r| {
        if let Rep::Variant(id, ctors) = r {
            if let Some(rebuilt) = tables.get(&*id) {
                if !ctors.is_empty() {
                    *ctors = rebuilt.clone();
                }
            }
        }
    });
}

fn patch_instrs(instrs: &mut [Instr], tables: &FxHashMap<Sym, Vec<(Sym, Rep)>>) {
    for instr in instrs {
        instr.kind.map_reps(&mut |r| {
            if let Rep::Variant(id, ctors) = r {
                if let Some(rebuilt) = tables.get(&*id) {
                    if !ctors.is_empty() {
                        *ctors = rebuilt.clone();
                    }
                }
            }
        });
    }
}
