//! Type lowering: source types to target representations.
//!
//! One source type maps to exactly one [`Rep`], decided by
//! first-match-wins rules over the type's head. Integer representations
//! are driven by constraint solving: a `range`/`atom` chooses the fixed
//! 64-bit form only when its bounds are literal 64-bit constants or the
//! prover shows they fit; bit-vectors choose fixed or small forms only
//! when the length is a literal or provably at most 64.

use num_bigint::BigInt;

use lira_ir::env::{fold_nexp, KidEnv};
use lira_ir::lir::Rep;
use lira_ir::source::{NConstraint, Nexp, Order, Ty, TyArg};
#[cfg(test)]
use lira_ir::source::Kind;
use lira_ir::{Span, Sym};

use crate::ctx::LowerCtx;
use crate::error::LowerError;

/// Lower a source type to its target representation.
///
/// Fatal on unrepresentable types; never returns an error for any type
/// the checker accepts.
pub fn lower_ty(ctx: &mut LowerCtx<'_>, ty: &Ty, span: Span) -> Result<Rep, LowerError> {
    crate::stack::ensure_sufficient_stack(|| lower_ty_inner(ctx, ty, span))
}

fn lower_ty_inner(ctx: &mut LowerCtx<'_>, ty: &Ty, span: Span) -> Result<Rep, LowerError> {
    match ty {
        Ty::Id(id) => lower_named(ctx, *id, span),
        Ty::App(id, args) => lower_app(ctx, *id, args, span),
        Ty::Tuple(tys) => {
            let mut reps = Vec::with_capacity(tys.len());
            for t in tys {
                reps.push(lower_ty(ctx, t, span)?);
            }
            Ok(Rep::Tup(reps))
        }
        Ty::Var(_) => Ok(Rep::Poly),
        Ty::Exist(vars, constraint, body) => {
            let saved = ctx.kids.clone();
            ctx.kids = ctx.kids.extend(vars, constraint);
            let rep = lower_ty(ctx, body, span);
            ctx.kids = saved;
            rep
        }
    }
}

fn lower_named(ctx: &mut LowerCtx<'_>, id: Sym, span: Span) -> Result<Rep, LowerError> {
    match ctx.interner.lookup(id) {
        "bit" => return Ok(Rep::Bit),
        "bool" => return Ok(Rep::Bool),
        "int" | "nat" => return Ok(Rep::LInt),
        "unit" => return Ok(Rep::Unit),
        "string" => return Ok(Rep::String),
        "real" => return Ok(Rep::Real),
        _ => {}
    }
    lower_user_type(ctx, id, span)
}

fn lower_user_type(ctx: &mut LowerCtx<'_>, id: Sym, span: Span) -> Result<Rep, LowerError> {
    // A definition mentioning itself keeps the name only; the full
    // constructor or field list is attached at the outermost occurrence.
    if ctx.expanding_contains(id) {
        if ctx.env.variant(id).is_some() {
            return Ok(Rep::Variant(id, Vec::new()));
        }
        if ctx.env.record(id).is_some() {
            return Ok(Rep::Struct(id, Vec::new()));
        }
    }

    if let Some(fields) = ctx.env.record(id).map(<[(Sym, Ty)]>::to_vec) {
        ctx.expanding_push(id);
        let mut out = Vec::with_capacity(fields.len());
        for (f, fty) in &fields {
            out.push((*f, lower_ty(ctx, fty, span)?));
        }
        ctx.expanding_pop();
        return Ok(Rep::Struct(id, out));
    }

    if let Some(ctors) = ctx.env.variant(id).map(<[(Sym, Ty)]>::to_vec) {
        ctx.expanding_push(id);
        let mut out = Vec::with_capacity(ctors.len());
        for (c, cty) in &ctors {
            out.push((*c, lower_ty(ctx, cty, span)?));
        }
        ctx.expanding_pop();
        return Ok(Rep::Variant(id, out));
    }

    if let Some(members) = ctx.env.enum_def(id) {
        return Ok(Rep::Enum(id, members.to_vec()));
    }

    if ctx.env.is_synonym(id) {
        if let Some(expanded) = ctx.env.expand_synonym(id, &[]) {
            return lower_ty(ctx, &expanded, span);
        }
    }

    Err(LowerError::TypeLowering {
        detail: format!("unknown type `{}`", ctx.interner.lookup(id)),
        span,
    })
}

fn lower_app(
    ctx: &mut LowerCtx<'_>,
    id: Sym,
    args: &[TyArg],
    span: Span,
) -> Result<Rep, LowerError> {
    match (ctx.interner.lookup(id), args) {
        ("atom_bool", _) => Ok(Rep::Bool),
        // `itself(n)` carries the same runtime content as `atom(n)`.
        ("atom" | "implicit" | "itself", [TyArg::Nexp(n)]) => Ok(lower_int_rep(ctx, n, n)),
        ("range", [TyArg::Nexp(lo), TyArg::Nexp(hi)]) => Ok(lower_int_rep(ctx, lo, hi)),
        ("list", [TyArg::Ty(elem)]) => Ok(Rep::List(Box::new(lower_ty(ctx, elem, span)?))),
        ("vector", [TyArg::Nexp(n), TyArg::Order(ord), TyArg::Ty(elem)]) => {
            if is_bit(ctx, elem) {
                Ok(lower_bits_rep(ctx, n, *ord))
            } else {
                Ok(Rep::Vector(*ord, Box::new(lower_ty(ctx, elem, span)?)))
            }
        }
        ("register", [TyArg::Ty(inner)]) => Ok(Rep::Ref(Box::new(lower_ty(ctx, inner, span)?))),
        _ => {
            if let Some(expanded) = ctx.env.expand_synonym(id, args) {
                return lower_ty(ctx, &expanded, span);
            }
            // Applied user records/variants: the arguments only matter to
            // the specializer; the representation is the named one.
            if ctx.env.record(id).is_some()
                || ctx.env.variant(id).is_some()
                || ctx.env.enum_def(id).is_some()
            {
                return lower_user_type(ctx, id, span);
            }
            Err(LowerError::TypeLowering {
                detail: format!(
                    "unsupported type constructor `{}` with {} argument(s)",
                    ctx.interner.lookup(id),
                    args.len()
                ),
                span,
            })
        }
    }
}

/// Integer representation for a `range(lo, hi)` (or `atom(n)`, with
/// `lo = hi = n`).
fn lower_int_rep(ctx: &LowerCtx<'_>, lo: &Nexp, hi: &Nexp) -> Rep {
    let min = BigInt::from(i64::MIN);
    let max = BigInt::from(i64::MAX);

    if let (Some(l), Some(h)) = (fold_nexp(lo), fold_nexp(hi)) {
        if l >= min && h <= max {
            return Rep::FInt(64);
        }
    }

    if prove(
        ctx.prover,
        &ctx.kids,
        &NConstraint::Lte(Nexp::Const(min), lo.clone()),
    ) && prove(
        ctx.prover,
        &ctx.kids,
        &NConstraint::Lte(hi.clone(), Nexp::Const(max)),
    ) {
        Rep::FInt(64)
    } else {
        Rep::LInt
    }
}

/// Bit-vector representation for `vector(n, ord, bit)`.
fn lower_bits_rep(ctx: &LowerCtx<'_>, n: &Nexp, ord: Order) -> Rep {
    if let Some(len) = fold_nexp(n) {
        if len >= BigInt::from(0) && len <= BigInt::from(64) {
            // Safe: 0 <= len <= 64.
            let len = u32::try_from(len).unwrap_or(64);
            return Rep::FBits(len, ord);
        }
        return Rep::LBits(ord);
    }

    if prove(
        ctx.prover,
        &ctx.kids,
        &NConstraint::Lte(n.clone(), Nexp::int(64)),
    ) {
        Rep::SBits(64, ord)
    } else {
        Rep::LBits(ord)
    }
}

fn prove(prover: &dyn lira_ir::Prover, kids: &KidEnv, c: &NConstraint) -> bool {
    prover.prove(kids, c)
}

fn is_bit(ctx: &LowerCtx<'_>, ty: &Ty) -> bool {
    matches!(ty, Ty::Id(id) if ctx.interner.lookup(*id) == "bit")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use lira_ir::source::{Ast, Def, TypeDef};
    use lira_ir::{Config, ConstProver, Interner, ModuleEnv};
    use pretty_assertions::assert_eq;
    use rustc_hash::FxHashMap;

    struct Fixture {
        interner: Interner,
        env: ModuleEnv,
        config: Config,
        globals: FxHashMap<Sym, Rep>,
    }

    impl Fixture {
        fn new(ast: &Ast) -> Self {
            let interner = Interner::new();
            let env = ModuleEnv::from_ast(ast, &interner);
            Fixture {
                interner,
                env,
                config: Config::default(),
                globals: FxHashMap::default(),
            }
        }

        fn ctx<'a>(&'a self, prover: &'a dyn lira_ir::Prover) -> LowerCtx<'a> {
            LowerCtx::new(
                &self.env,
                prover,
                &self.config,
                &self.interner,
                &self.globals,
                "fn_end".into(),
            )
        }
    }

    fn bits_ty(interner: &Interner, n: i64) -> Ty {
        Ty::App(
            interner.intern("vector"),
            vec![
                TyArg::Nexp(Nexp::int(n)),
                TyArg::Order(Order::Dec),
                TyArg::Ty(Ty::Id(interner.intern("bit"))),
            ],
        )
    }

    #[test]
    fn primitives_lower_directly() {
        let fx = Fixture::new(&Ast::default());
        let prover = ConstProver;
        let mut ctx = fx.ctx(&prover);
        let cases = [
            ("bit", Rep::Bit),
            ("bool", Rep::Bool),
            ("unit", Rep::Unit),
            ("string", Rep::String),
            ("real", Rep::Real),
            ("int", Rep::LInt),
            ("nat", Rep::LInt),
        ];
        for (name, expect) in cases {
            let ty = Ty::Id(fx.interner.intern(name));
            assert_eq!(lower_ty(&mut ctx, &ty, Span::DUMMY), Ok(expect));
        }
    }

    #[test]
    fn literal_range_in_bounds_is_fixed() {
        let fx = Fixture::new(&Ast::default());
        let prover = ConstProver;
        let mut ctx = fx.ctx(&prover);
        let ty = Ty::App(
            fx.interner.intern("range"),
            vec![TyArg::Nexp(Nexp::int(0)), TyArg::Nexp(Nexp::int(31))],
        );
        assert_eq!(lower_ty(&mut ctx, &ty, Span::DUMMY), Ok(Rep::FInt(64)));
    }

    #[test]
    fn oversized_range_is_large() {
        let fx = Fixture::new(&Ast::default());
        let prover = ConstProver;
        let mut ctx = fx.ctx(&prover);
        let huge = BigInt::from(i64::MAX) + 1;
        let ty = Ty::App(
            fx.interner.intern("range"),
            vec![
                TyArg::Nexp(Nexp::int(0)),
                TyArg::Nexp(Nexp::Const(huge)),
            ],
        );
        assert_eq!(lower_ty(&mut ctx, &ty, Span::DUMMY), Ok(Rep::LInt));
    }

    #[test]
    fn variable_range_falls_back_without_proof() {
        let fx = Fixture::new(&Ast::default());
        let prover = ConstProver;
        let mut ctx = fx.ctx(&prover);
        let n = fx.interner.intern("n");
        let ty = Ty::App(
            fx.interner.intern("range"),
            vec![
                TyArg::Nexp(Nexp::Var(n)),
                TyArg::Nexp(Nexp::Var(n)),
            ],
        );
        assert_eq!(lower_ty(&mut ctx, &ty, Span::DUMMY), Ok(Rep::LInt));
    }

    #[test]
    fn variable_range_uses_prover() {
        struct YesProver;
        impl lira_ir::Prover for YesProver {
            fn prove(&self, _: &KidEnv, _: &NConstraint) -> bool {
                true
            }
        }
        let fx = Fixture::new(&Ast::default());
        let prover = YesProver;
        let mut ctx = fx.ctx(&prover);
        let n = fx.interner.intern("n");
        let ty = Ty::App(
            fx.interner.intern("range"),
            vec![TyArg::Nexp(Nexp::Var(n)), TyArg::Nexp(Nexp::Var(n))],
        );
        assert_eq!(lower_ty(&mut ctx, &ty, Span::DUMMY), Ok(Rep::FInt(64)));
    }

    #[test]
    fn bit_vectors_choose_fixed_small_or_large() {
        let fx = Fixture::new(&Ast::default());
        let prover = ConstProver;
        let mut ctx = fx.ctx(&prover);

        let b32 = bits_ty(&fx.interner, 32);
        assert_eq!(
            lower_ty(&mut ctx, &b32, Span::DUMMY),
            Ok(Rep::FBits(32, Order::Dec))
        );

        let b80 = bits_ty(&fx.interner, 80);
        assert_eq!(
            lower_ty(&mut ctx, &b80, Span::DUMMY),
            Ok(Rep::LBits(Order::Dec))
        );

        // Unknown length without a proof is large.
        let n = fx.interner.intern("n");
        let var_bits = Ty::App(
            fx.interner.intern("vector"),
            vec![
                TyArg::Nexp(Nexp::Var(n)),
                TyArg::Order(Order::Dec),
                TyArg::Ty(Ty::Id(fx.interner.intern("bit"))),
            ],
        );
        assert_eq!(
            lower_ty(&mut ctx, &var_bits, Span::DUMMY),
            Ok(Rep::LBits(Order::Dec))
        );
    }

    #[test]
    fn small_bits_when_bound_proved() {
        struct UpTo64;
        impl lira_ir::Prover for UpTo64 {
            fn prove(&self, _: &KidEnv, c: &NConstraint) -> bool {
                matches!(c, NConstraint::Lte(_, bound)
                    if bound.as_const() == Some(&BigInt::from(64)))
            }
        }
        let fx = Fixture::new(&Ast::default());
        let prover = UpTo64;
        let mut ctx = fx.ctx(&prover);
        let n = fx.interner.intern("n");
        let ty = Ty::App(
            fx.interner.intern("vector"),
            vec![
                TyArg::Nexp(Nexp::Var(n)),
                TyArg::Order(Order::Dec),
                TyArg::Ty(Ty::Id(fx.interner.intern("bit"))),
            ],
        );
        assert_eq!(
            lower_ty(&mut ctx, &ty, Span::DUMMY),
            Ok(Rep::SBits(64, Order::Dec))
        );
    }

    #[test]
    fn vectors_of_non_bit_elements() {
        let fx = Fixture::new(&Ast::default());
        let prover = ConstProver;
        let mut ctx = fx.ctx(&prover);
        let ty = Ty::App(
            fx.interner.intern("vector"),
            vec![
                TyArg::Nexp(Nexp::int(4)),
                TyArg::Order(Order::Dec),
                TyArg::Ty(Ty::Id(fx.interner.intern("bool"))),
            ],
        );
        assert_eq!(
            lower_ty(&mut ctx, &ty, Span::DUMMY),
            Ok(Rep::Vector(Order::Dec, Box::new(Rep::Bool)))
        );
    }

    #[test]
    fn registers_lower_to_references() {
        let fx = Fixture::new(&Ast::default());
        let prover = ConstProver;
        let mut ctx = fx.ctx(&prover);
        let ty = Ty::App(
            fx.interner.intern("register"),
            vec![TyArg::Ty(bits_ty(&fx.interner, 64))],
        );
        assert_eq!(
            lower_ty(&mut ctx, &ty, Span::DUMMY),
            Ok(Rep::Ref(Box::new(Rep::FBits(64, Order::Dec))))
        );
    }

    #[test]
    fn type_variables_defer() {
        let fx = Fixture::new(&Ast::default());
        let prover = ConstProver;
        let mut ctx = fx.ctx(&prover);
        let ty = Ty::Var(fx.interner.intern("a"));
        assert_eq!(lower_ty(&mut ctx, &ty, Span::DUMMY), Ok(Rep::Poly));
    }

    #[test]
    fn existentials_extend_the_environment() {
        struct FromAssumptions;
        impl lira_ir::Prover for FromAssumptions {
            fn prove(&self, kids: &KidEnv, _: &NConstraint) -> bool {
                // Stand-in for a real prover: succeed only when the
                // existential's constraint is in scope.
                !kids.constraints.is_empty()
            }
        }
        let fx = Fixture::new(&Ast::default());
        let prover = FromAssumptions;
        let mut ctx = fx.ctx(&prover);
        let n = fx.interner.intern("n");
        let inner = Ty::App(
            fx.interner.intern("atom"),
            vec![TyArg::Nexp(Nexp::Var(n))],
        );
        let ty = Ty::Exist(
            vec![(n, Kind::Int)],
            NConstraint::Lte(Nexp::Var(n), Nexp::int(64)),
            Box::new(inner),
        );
        assert_eq!(lower_ty(&mut ctx, &ty, Span::DUMMY), Ok(Rep::FInt(64)));
    }

    #[test]
    fn recursive_variant_keeps_name_only_inside_itself() {
        let interner = Interner::new();
        let tree = interner.intern("tree");
        let leaf = interner.intern("Leaf");
        let node = interner.intern("Node");
        let int_ty = Ty::Id(interner.intern("int"));
        let list_tree = Ty::App(interner.intern("list"), vec![TyArg::Ty(Ty::Id(tree))]);
        let ast = Ast {
            defs: vec![Def::Type(TypeDef::Variant {
                id: tree,
                ctors: vec![(leaf, int_ty), (node, list_tree)],
            })],
        };
        let env = ModuleEnv::from_ast(&ast, &interner);
        let config = Config::default();
        let globals = FxHashMap::default();
        let prover = ConstProver;
        let mut ctx = LowerCtx::new(&env, &prover, &config, &interner, &globals, "end".into());

        let rep = lower_ty(&mut ctx, &Ty::Id(tree), Span::DUMMY).unwrap();
        let Rep::Variant(id, ctors) = rep else {
            panic!("expected a variant representation");
        };
        assert_eq!(id, tree);
        assert_eq!(ctors[0], (leaf, Rep::LInt));
        assert_eq!(
            ctors[1],
            (node, Rep::List(Box::new(Rep::Variant(tree, Vec::new()))))
        );
    }

    #[test]
    fn unknown_types_are_fatal() {
        let fx = Fixture::new(&Ast::default());
        let prover = ConstProver;
        let mut ctx = fx.ctx(&prover);
        let ty = Ty::Id(fx.interner.intern("mystery"));
        assert!(matches!(
            lower_ty(&mut ctx, &ty, Span::new(3, 9)),
            Err(LowerError::TypeLowering { span, .. }) if span == Span::new(3, 9)
        ));
    }
}
