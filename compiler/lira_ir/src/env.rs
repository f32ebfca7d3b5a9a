//! Module environment and the constraint-proving capability.
//!
//! [`ModuleEnv`] is the lookup side of the type checker's output: named
//! record/variant/enum definitions, synonym expansion, function
//! signatures, and extern bindings. [`Prover`] is the capability the type
//! lowerer consults when representation choices depend on type-level
//! constraints; the SMT-backed implementation lives outside this
//! repository, and [`ConstProver`] is the built-in constant-folding
//! fallback.

use num_bigint::BigInt;
use rustc_hash::FxHashMap;

use crate::interner::{Interner, Sym};
use crate::source::{Ast, Def, Kind, NConstraint, Nexp, Ty, TyArg, TypeDef};

// ── Kind environment ────────────────────────────────────────────────

/// The local kind environment: kinded type-variables in scope plus the
/// conjunction of constraints currently assumed.
#[derive(Clone, Debug, Default)]
pub struct KidEnv {
    pub kinds: FxHashMap<Sym, Kind>,
    pub constraints: Vec<NConstraint>,
}

impl KidEnv {
    /// Extend with existentially bound variables and their constraint.
    pub fn extend(&self, vars: &[(Sym, Kind)], constraint: &NConstraint) -> KidEnv {
        let mut out = self.clone();
        for (v, k) in vars {
            out.kinds.insert(*v, *k);
        }
        if *constraint != NConstraint::True {
            out.constraints.push(constraint.clone());
        }
        out
    }
}

// ── Prover ──────────────────────────────────────────────────────────

/// Constraint-proving capability consulted during type lowering.
pub trait Prover {
    /// Attempt to prove `constraint` under the assumptions in `kids`.
    ///
    /// `false` means "could not prove", never "disproved": lowering
    /// falls back to a more general representation on `false`.
    fn prove(&self, kids: &KidEnv, constraint: &NConstraint) -> bool;
}

/// Constant-folding prover.
///
/// Decides constraints whose numeric expressions fold to constants and
/// declines everything else. Folding is pure, so lowering stays
/// deterministic in the pair (type, context constraints).
#[derive(Clone, Copy, Debug, Default)]
pub struct ConstProver;

/// Fold a numeric expression to a constant, when it contains no
/// variables.
pub fn fold_nexp(nexp: &Nexp) -> Option<BigInt> {
    match nexp {
        Nexp::Const(c) => Some(c.clone()),
        Nexp::Var(_) => None,
        Nexp::Add(a, b) => Some(fold_nexp(a)? + fold_nexp(b)?),
        Nexp::Sub(a, b) => Some(fold_nexp(a)? - fold_nexp(b)?),
        Nexp::Mul(a, b) => Some(fold_nexp(a)? * fold_nexp(b)?),
        Nexp::Neg(a) => Some(-fold_nexp(a)?),
    }
}

/// Decide a constraint by constant folding, when possible.
pub fn fold_constraint(constraint: &NConstraint) -> Option<bool> {
    match constraint {
        NConstraint::True => Some(true),
        NConstraint::False => Some(false),
        NConstraint::Eq(a, b) => Some(fold_nexp(a)? == fold_nexp(b)?),
        NConstraint::NotEq(a, b) => Some(fold_nexp(a)? != fold_nexp(b)?),
        NConstraint::Lt(a, b) => Some(fold_nexp(a)? < fold_nexp(b)?),
        NConstraint::Lte(a, b) => Some(fold_nexp(a)? <= fold_nexp(b)?),
        NConstraint::Gt(a, b) => Some(fold_nexp(a)? > fold_nexp(b)?),
        NConstraint::Gte(a, b) => Some(fold_nexp(a)? >= fold_nexp(b)?),
        NConstraint::And(a, b) => Some(fold_constraint(a)? && fold_constraint(b)?),
        NConstraint::Or(a, b) => match (fold_constraint(a), fold_constraint(b)) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
    }
}

impl Prover for ConstProver {
    fn prove(&self, _kids: &KidEnv, constraint: &NConstraint) -> bool {
        fold_constraint(constraint) == Some(true)
    }
}

// ── Module environment ──────────────────────────────────────────────

/// Lookup environment over the type checker's output.
#[derive(Default)]
pub struct ModuleEnv {
    records: FxHashMap<Sym, Vec<(Sym, Ty)>>,
    variants: FxHashMap<Sym, Vec<(Sym, Ty)>>,
    enums: FxHashMap<Sym, Vec<Sym>>,
    synonyms: FxHashMap<Sym, (Vec<Sym>, Ty)>,
    externs: FxHashMap<Sym, String>,
    fn_sigs: FxHashMap<Sym, (Vec<Ty>, Ty)>,
    enum_members: FxHashMap<Sym, Sym>,
    ctor_variants: FxHashMap<Sym, Sym>,
    exception_id: Option<Sym>,
}

impl ModuleEnv {
    /// Build the environment from a definition list.
    pub fn from_ast(ast: &Ast, interner: &Interner) -> ModuleEnv {
        let mut env = ModuleEnv::default();
        for def in &ast.defs {
            match def {
                Def::Type(TypeDef::Record { id, fields }) => {
                    env.records.insert(*id, fields.clone());
                }
                Def::Type(TypeDef::Variant { id, ctors }) => {
                    for (ctor, _) in ctors {
                        env.ctor_variants.insert(*ctor, *id);
                    }
                    if interner.lookup(*id) == "exception" {
                        env.exception_id = Some(*id);
                    }
                    env.variants.insert(*id, ctors.clone());
                }
                Def::Type(TypeDef::Enum { id, members }) => {
                    for m in members {
                        env.enum_members.insert(*m, *id);
                    }
                    env.enums.insert(*id, members.clone());
                }
                Def::Type(TypeDef::Synonym { id, params, body }) => {
                    env.synonyms.insert(*id, (params.clone(), body.clone()));
                }
                Def::Fn(f) => {
                    env.fn_sigs
                        .insert(f.id, (f.arg_tys.clone(), f.ret_ty.clone()));
                }
                Def::Extern(e) => {
                    env.externs.insert(e.id, e.cname.clone());
                    env.fn_sigs
                        .insert(e.id, (e.arg_tys.clone(), e.ret_ty.clone()));
                }
                Def::Let(_) | Def::Register(_) => {}
            }
        }
        env
    }

    pub fn record(&self, id: Sym) -> Option<&[(Sym, Ty)]> {
        self.records.get(&id).map(Vec::as_slice)
    }

    pub fn variant(&self, id: Sym) -> Option<&[(Sym, Ty)]> {
        self.variants.get(&id).map(Vec::as_slice)
    }

    pub fn enum_def(&self, id: Sym) -> Option<&[Sym]> {
        self.enums.get(&id).map(Vec::as_slice)
    }

    /// The enum a member belongs to, if `id` is an enum member.
    pub fn enum_of_member(&self, id: Sym) -> Option<Sym> {
        self.enum_members.get(&id).copied()
    }

    /// The variant a constructor belongs to, if `id` is a constructor.
    pub fn variant_of_ctor(&self, id: Sym) -> Option<Sym> {
        self.ctor_variants.get(&id).copied()
    }

    /// Declared argument type of a constructor.
    pub fn ctor_arg_ty(&self, ctor: Sym) -> Option<&Ty> {
        let variant = self.ctor_variants.get(&ctor)?;
        let ctors = self.variants.get(variant)?;
        ctors.iter().find(|(c, _)| *c == ctor).map(|(_, ty)| ty)
    }

    pub fn fn_sig(&self, id: Sym) -> Option<&(Vec<Ty>, Ty)> {
        self.fn_sigs.get(&id)
    }

    pub fn extern_name(&self, id: Sym) -> Option<&str> {
        self.externs.get(&id).map(String::as_str)
    }

    /// True when the source declared an `exception` variant; exception
    /// state is only generated in that case.
    pub fn has_exceptions(&self) -> bool {
        self.exception_id.is_some()
    }

    pub fn exception_id(&self) -> Option<Sym> {
        self.exception_id
    }

    /// Expand a synonym applied to arguments, substituting its
    /// parameters in the body. Returns `None` when `id` is not a
    /// synonym.
    pub fn expand_synonym(&self, id: Sym, args: &[TyArg]) -> Option<Ty> {
        let (params, body) = self.synonyms.get(&id)?;
        let mut subst: FxHashMap<Sym, &TyArg> = FxHashMap::default();
        for (p, a) in params.iter().zip(args) {
            subst.insert(*p, a);
        }
        Some(subst_ty(body, &subst))
    }

    /// True when `id` names a synonym.
    pub fn is_synonym(&self, id: Sym) -> bool {
        self.synonyms.contains_key(&id)
    }
}

fn subst_ty(ty: &Ty, subst: &FxHashMap<Sym, &TyArg>) -> Ty {
    match ty {
        Ty::Id(id) => Ty::Id(*id),
        Ty::Var(v) => match subst.get(v) {
            Some(TyArg::Ty(t)) => t.clone(),
            _ => Ty::Var(*v),
        },
        Ty::App(id, args) => Ty::App(
            *id,
            args.iter().map(|a| subst_ty_arg(a, subst)).collect(),
        ),
        Ty::Tuple(tys) => Ty::Tuple(tys.iter().map(|t| subst_ty(t, subst)).collect()),
        Ty::Exist(vars, constraint, body) => {
            // Bound variables shadow the substitution.
            let mut inner = subst.clone();
            for (v, _) in vars {
                inner.remove(v);
            }
            Ty::Exist(
                vars.clone(),
                subst_constraint(constraint, &inner),
                Box::new(subst_ty(body, &inner)),
            )
        }
    }
}

fn subst_ty_arg(arg: &TyArg, subst: &FxHashMap<Sym, &TyArg>) -> TyArg {
    match arg {
        TyArg::Ty(t) => TyArg::Ty(subst_ty(t, subst)),
        TyArg::Nexp(n) => TyArg::Nexp(subst_nexp(n, subst)),
        TyArg::Order(o) => TyArg::Order(*o),
        TyArg::Bool(c) => TyArg::Bool(subst_constraint(c, subst)),
    }
}

fn subst_nexp(nexp: &Nexp, subst: &FxHashMap<Sym, &TyArg>) -> Nexp {
    match nexp {
        Nexp::Const(c) => Nexp::Const(c.clone()),
        Nexp::Var(v) => match subst.get(v) {
            Some(TyArg::Nexp(n)) => n.clone(),
            _ => Nexp::Var(*v),
        },
        Nexp::Add(a, b) => Nexp::Add(
            Box::new(subst_nexp(a, subst)),
            Box::new(subst_nexp(b, subst)),
        ),
        Nexp::Sub(a, b) => Nexp::Sub(
            Box::new(subst_nexp(a, subst)),
            Box::new(subst_nexp(b, subst)),
        ),
        Nexp::Mul(a, b) => Nexp::Mul(
            Box::new(subst_nexp(a, subst)),
            Box::new(subst_nexp(b, subst)),
        ),
        Nexp::Neg(a) => Nexp::Neg(Box::new(subst_nexp(a, subst))),
    }
}

fn subst_constraint(c: &NConstraint, subst: &FxHashMap<Sym, &TyArg>) -> NConstraint {
    match c {
        NConstraint::True => NConstraint::True,
        NConstraint::False => NConstraint::False,
        NConstraint::Eq(a, b) => NConstraint::Eq(subst_nexp(a, subst), subst_nexp(b, subst)),
        NConstraint::NotEq(a, b) => NConstraint::NotEq(subst_nexp(a, subst), subst_nexp(b, subst)),
        NConstraint::Lt(a, b) => NConstraint::Lt(subst_nexp(a, subst), subst_nexp(b, subst)),
        NConstraint::Lte(a, b) => NConstraint::Lte(subst_nexp(a, subst), subst_nexp(b, subst)),
        NConstraint::Gt(a, b) => NConstraint::Gt(subst_nexp(a, subst), subst_nexp(b, subst)),
        NConstraint::Gte(a, b) => NConstraint::Gte(subst_nexp(a, subst), subst_nexp(b, subst)),
        NConstraint::And(a, b) => NConstraint::And(
            Box::new(subst_constraint(a, subst)),
            Box::new(subst_constraint(b, subst)),
        ),
        NConstraint::Or(a, b) => NConstraint::Or(
            Box::new(subst_constraint(a, subst)),
            Box::new(subst_constraint(b, subst)),
        ),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn const_prover_decides_literal_constraints() {
        let prover = ConstProver;
        let kids = KidEnv::default();
        assert!(prover.prove(&kids, &NConstraint::Lte(Nexp::int(8), Nexp::int(64))));
        assert!(!prover.prove(&kids, &NConstraint::Lte(Nexp::int(65), Nexp::int(64))));
    }

    #[test]
    fn const_prover_declines_variables() {
        let prover = ConstProver;
        let kids = KidEnv::default();
        let c = NConstraint::Lte(Nexp::Var(Sym::from_raw(9)), Nexp::int(64));
        assert!(!prover.prove(&kids, &c));
    }

    #[test]
    fn synonym_expansion_substitutes_params() {
        let interner = Interner::new();
        let word = interner.intern("word");
        let n = interner.intern("n");
        let vector = interner.intern("vector");
        let bit = interner.intern("bit");

        let ast = Ast {
            defs: vec![Def::Type(TypeDef::Synonym {
                id: word,
                params: vec![n],
                body: Ty::App(
                    vector,
                    vec![
                        TyArg::Nexp(Nexp::Var(n)),
                        TyArg::Order(crate::source::Order::Dec),
                        TyArg::Ty(Ty::Id(bit)),
                    ],
                ),
            })],
        };
        let env = ModuleEnv::from_ast(&ast, &interner);
        let expanded = env
            .expand_synonym(word, &[TyArg::Nexp(Nexp::int(32))])
            .unwrap();
        assert_eq!(
            expanded,
            Ty::App(
                vector,
                vec![
                    TyArg::Nexp(Nexp::int(32)),
                    TyArg::Order(crate::source::Order::Dec),
                    TyArg::Ty(Ty::Id(bit)),
                ],
            )
        );
    }
}
