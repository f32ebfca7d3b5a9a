//! End-to-end pipeline tests: small programs in, C text out.

#![allow(clippy::unwrap_used)]

use num_bigint::BigInt;
use pretty_assertions::assert_eq;

use lira_ir::source::{
    Ast, Def, Expr, ExprKind, FnDef, LetDef, Lit, Nexp, Order, RegisterDef, Ty, TyArg, TypeDef,
};
use lira_ir::{Config, ConstProver, Interner, Span};

use crate::pipeline::compile_ast;

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

fn expr(kind: ExprKind, ty: Ty) -> Expr {
    Expr::new(kind, ty, Span::DUMMY)
}

/// `add32(x: bits(32), y: bits(32)) -> bits(32) = add_bits(x, y)`
fn add32_ast(interner: &Interner) -> Ast {
    let b32 = bits_ty(interner, 32);
    let x = interner.intern("x");
    let y = interner.intern("y");
    Ast {
        defs: vec![Def::Fn(FnDef {
            id: interner.intern("add32"),
            params: vec![x, y],
            arg_tys: vec![b32.clone(), b32.clone()],
            ret_ty: b32.clone(),
            body: expr(
                ExprKind::Call(
                    interner.intern("add_bits"),
                    vec![
                        expr(ExprKind::Id(x), b32.clone()),
                        expr(ExprKind::Id(y), b32),
                    ],
                ),
                bits_ty(interner, 32),
            ),
            span: Span::DUMMY,
        })],
    }
}

#[test]
fn add32_emits_masked_inline_add() {
    let interner = Interner::new();
    let text = compile_ast(&add32_ast(&interner), &interner, &ConstProver, &Config::default())
        .unwrap();

    assert!(text.contains("fbits zadd32(fbits zx, fbits zy)"), "{text}");
    assert!(
        text.contains("((zx + zy) & UINT64_C(0xFFFFFFFF))"),
        "inline masked add expected in:\n{text}"
    );
    assert!(!text.contains("add_bits("), "no helper call expected");
    assert!(text.contains("goto end_function_zadd32;"));
    assert!(text.contains("end_function_zadd32: ;"));
}

#[test]
fn disabling_the_analyzer_keeps_the_helper_call() {
    let interner = Interner::new();
    let config = Config {
        optimize_primops: false,
        ..Config::default()
    };
    let text = compile_ast(&add32_ast(&interner), &interner, &ConstProver, &config).unwrap();
    assert!(text.contains("add_bits("), "{text}");
    assert!(!text.contains("((zx + zy) & UINT64_C(0xFFFFFFFF))"));
}

#[test]
fn no_main_omits_the_wrapper_but_keeps_model_main() {
    let interner = Interner::new();
    let config = Config {
        no_main: true,
        ..Config::default()
    };
    let text = compile_ast(&add32_ast(&interner), &interner, &ConstProver, &config).unwrap();
    assert!(text.contains("int model_main(int argc, char *argv[])"));
    assert!(!text.contains("\nint main(int argc"));
}

#[test]
fn no_rts_omits_includes_and_init_fini_but_keeps_entry_points() {
    let interner = Interner::new();
    let config = Config {
        no_rts: true,
        ..Config::default()
    };
    let text = compile_ast(&add32_ast(&interner), &interner, &ConstProver, &config).unwrap();
    assert!(!text.contains("#include \"lira.h\""));
    assert!(text.contains("#include <stdint.h>"));

    // The init/fini pair is gone, definitions and calls alike.
    assert!(!text.contains("void model_init(void)"));
    assert!(!text.contains("void model_fini(void)"));
    assert!(!text.contains("model_init();"));
    assert!(!text.contains("model_fini();"));

    // Entry points are governed by `no_main` alone.
    assert!(text.contains("int model_main(int argc, char *argv[])"), "{text}");
    assert!(text.contains("int main(int argc, char *argv[])"));
    assert!(text.contains("return model_main(argc, argv);"));
}

#[test]
fn no_rts_with_no_main_leaves_only_model_main() {
    let interner = Interner::new();
    let config = Config {
        no_rts: true,
        no_main: true,
        ..Config::default()
    };
    let text = compile_ast(&add32_ast(&interner), &interner, &ConstProver, &config).unwrap();
    assert!(text.contains("int model_main(int argc, char *argv[])"));
    assert!(!text.contains("\nint main(int argc"));
}

#[test]
fn prefix_and_static_apply_to_functions() {
    let interner = Interner::new();
    let config = Config {
        prefix: "m_".into(),
        static_fns: true,
        ..Config::default()
    };
    let text = compile_ast(&add32_ast(&interner), &interner, &ConstProver, &config).unwrap();
    assert!(text.contains("static fbits m_zadd32("), "{text}");
}

#[test]
fn extra_params_thread_through_signatures_and_calls() {
    let interner = Interner::new();
    let b32 = bits_ty(&interner, 32);
    let x = interner.intern("x");
    let outer = interner.intern("outer");
    // outer(x) = add32(x, x), so there is one internal call site.
    let mut ast = add32_ast(&interner);
    ast.defs.push(Def::Fn(FnDef {
        id: outer,
        params: vec![x],
        arg_tys: vec![b32.clone()],
        ret_ty: b32.clone(),
        body: expr(
            ExprKind::Call(
                interner.intern("add32"),
                vec![
                    expr(ExprKind::Id(x), b32.clone()),
                    expr(ExprKind::Id(x), b32),
                ],
            ),
            bits_ty(&interner, 32),
        ),
        span: Span::DUMMY,
    }));

    let config = Config {
        extra_params: Some("unit *state".into()),
        extra_arguments: Some("state".into()),
        ..Config::default()
    };
    let text = compile_ast(&ast, &interner, &ConstProver, &config).unwrap();
    assert!(text.contains("fbits zadd32(fbits zx, fbits zy, unit *state)"));
    assert!(text.contains("zadd32(zx, zx, state)"), "{text}");
}

#[test]
fn registers_and_lets_get_scaffolded() {
    let interner = Interner::new();
    let b64 = bits_ty(&interner, 64);
    let int_ty = Ty::Id(interner.intern("int"));
    let ast = Ast {
        defs: vec![
            Def::Register(RegisterDef {
                id: interner.intern("PC"),
                ty: b64.clone(),
                init: Some(expr(ExprKind::Lit(Lit::Hex("0".into())), b64)),
                span: Span::DUMMY,
            }),
            Def::Let(LetDef {
                id: interner.intern("limit"),
                ty: int_ty.clone(),
                body: expr(ExprKind::Lit(Lit::Int(BigInt::from(5))), int_ty),
                span: Span::DUMMY,
            }),
        ],
    };
    let text = compile_ast(&ast, &interner, &ConstProver, &Config::default()).unwrap();

    assert!(text.contains("fbits zPC;"), "{text}");
    assert!(text.contains("lint zlimit;"));
    assert!(text.contains("void create_letbind_0(void)"));
    assert!(text.contains("CREATE(lint)(&zlimit);"));
    assert!(text.contains("CONVERT_OF(lint, i64)(&zlimit, INT64_C(5));"));
    assert!(text.contains("void kill_letbind_0(void)"));
    assert!(text.contains("KILL(lint)(&zlimit);"));
    assert!(text.contains("create_letbind_0();"));
    assert!(text.contains("kill_letbind_0();"));
}

#[test]
fn tuple_auxiliary_types_are_deduplicated() {
    let interner = Interner::new();
    let int_range = Ty::App(
        interner.intern("range"),
        vec![TyArg::Nexp(Nexp::int(0)), TyArg::Nexp(Nexp::int(7))],
    );
    let pair = Ty::Tuple(vec![int_range.clone(), Ty::Id(interner.intern("bool"))]);
    let mk = |name: &str| {
        let p = interner.intern("p");
        Def::Fn(FnDef {
            id: interner.intern(name),
            params: vec![p],
            arg_tys: vec![pair.clone()],
            ret_ty: pair.clone(),
            body: expr(ExprKind::Id(p), pair.clone()),
            span: Span::DUMMY,
        })
    };
    let ast = Ast {
        defs: vec![mk("first"), mk("second")],
    };
    let text = compile_ast(&ast, &interner, &ConstProver, &Config::default()).unwrap();
    assert_eq!(
        text.matches("struct ztup_i64_bool {").count(),
        1,
        "{text}"
    );
}

#[test]
fn type_definitions_emit_in_dependency_order() {
    let interner = Interner::new();
    let inner = interner.intern("inner");
    let outer = interner.intern("outer");
    let f = interner.intern("f");
    let g = interner.intern("g");
    let ast = Ast {
        defs: vec![
            // `outer` is declared first but uses `inner`.
            Def::Type(TypeDef::Record {
                id: outer,
                fields: vec![(f, Ty::Id(inner))],
            }),
            Def::Type(TypeDef::Record {
                id: inner,
                fields: vec![(g, Ty::Id(interner.intern("bool")))],
            }),
        ],
    };
    let text = compile_ast(&ast, &interner, &ConstProver, &Config::default()).unwrap();
    let inner_def = text.find("struct zinner {").unwrap();
    let outer_def = text.find("struct zouter {").unwrap();
    assert!(
        inner_def < outer_def,
        "used type must be defined before its user"
    );
}

#[test]
fn exception_state_is_emitted_only_when_declared() {
    let interner = Interner::new();

    let plain = compile_ast(&add32_ast(&interner), &interner, &ConstProver, &Config::default())
        .unwrap();
    assert!(!plain.contains("lira_have_exception"));

    let unit_ty = Ty::Id(interner.intern("unit"));
    let exc = interner.intern("exception");
    let error_ctor = interner.intern("Error");
    let f = interner.intern("fail");
    let ast = Ast {
        defs: vec![
            Def::Type(TypeDef::Variant {
                id: exc,
                ctors: vec![(error_ctor, unit_ty.clone())],
            }),
            Def::Fn(FnDef {
                id: f,
                params: vec![],
                arg_tys: vec![],
                ret_ty: unit_ty.clone(),
                body: expr(
                    ExprKind::Throw(Box::new(expr(
                        ExprKind::Ctor(error_ctor, vec![expr(ExprKind::Lit(Lit::Unit), unit_ty.clone())]),
                        Ty::Id(exc),
                    ))),
                    unit_ty,
                ),
                span: Span::DUMMY,
            }),
        ],
    };
    let text = compile_ast(&ast, &interner, &ConstProver, &Config::default()).unwrap();
    assert!(text.contains("struct zexception lira_current_exception;"), "{text}");
    assert!(text.contains("bool lira_have_exception = false;"));
    assert!(text.contains("lira_have_exception = true;"));
    assert!(text.contains("CREATE(u_zexception)(&lira_current_exception);"));
}

#[test]
fn recursive_variant_through_a_list_emits() {
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
    let text = compile_ast(&ast, &interner, &ConstProver, &Config::default()).unwrap();

    // Forward declarations let the node struct point back at the tree.
    assert!(text.contains("struct ztree;"), "{text}");
    assert!(text.contains("enum kind_ztree { Kind_zLeaf, Kind_zNode };"));
    let tree_def = text.find("struct ztree {").unwrap();
    let list_def = text.find("struct zlist_u_ztree {").unwrap();
    assert!(
        tree_def < list_def,
        "the list node embeds the tree by value, so the tree completes first"
    );
}
