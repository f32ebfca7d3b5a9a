//! Representation to C type mapping and generated type definitions.
//!
//! Every auxiliary type (tuples, list nodes, growable vectors) is
//! emitted at most once, keyed by the canonical spelling of its
//! representation. User types emit in topological order; an auxiliary
//! type that embeds a user type by value is emitted after it, one that
//! is only pointed to is forward-declared.

use rustc_hash::FxHashSet;

use lira_ir::lir::{Instr, LDef, LTypeDef, Rep};
use lira_ir::{zencode, Interner, Sym};

use crate::context::EmitCtx;
use crate::error::EmitError;
use crate::toposort::{collect_named, sort_type_defs};

/// C type spelling for a representation.
pub fn ctype(rep: &Rep, interner: &Interner) -> String {
    match rep {
        Rep::Unit => "unit".into(),
        Rep::Bit | Rep::FBits(..) => "fbits".into(),
        Rep::Bool => "bool".into(),
        Rep::String => "lstr".into(),
        Rep::Real => "real".into(),
        Rep::FInt(_) => "int64_t".into(),
        Rep::LInt => "lint".into(),
        Rep::SBits(..) => "sbits".into(),
        Rep::LBits(_) => "lbits".into(),
        Rep::Enum(id, _) => format!("enum {}", zencode(interner.lookup(*id))),
        Rep::Struct(id, _) | Rep::Variant(id, _) => {
            format!("struct {}", zencode(interner.lookup(*id)))
        }
        Rep::Tup(_) | Rep::Vector(..) => format!("struct z{}", rep.suffix(interner)),
        Rep::List(_) => format!("struct z{} *", rep.suffix(interner)),
        Rep::Ref(inner) => format!("{} *", ctype(inner, interner)),
        // Unreachable: the pipeline rejects leaked polymorphism before
        // emission.
        Rep::Poly => "void *".into(),
    }
}

/// Whether member equality is spelled `==` or an `EQUAL` helper call.
fn member_equal(a: &str, b: &str, rep: &Rep, interner: &Interner) -> String {
    match rep {
        Rep::Unit | Rep::Bit | Rep::Bool | Rep::FInt(_) | Rep::FBits(..) | Rep::Enum(..) => {
            format!("({a} == {b})")
        }
        _ => format!("EQUAL({})({a}, {b})", rep.suffix(interner)),
    }
}

fn member_copy(ctx: &mut EmitCtx<'_>, dst: &str, src: &str, rep: &Rep) {
    if rep.is_heap() {
        let sfx = rep.suffix(ctx.interner);
        ctx.writeln(&format!("COPY({sfx})(&{dst}, {src});"));
    } else {
        ctx.writeln(&format!("{dst} = {src};"));
    }
}

// ── Collection ──────────────────────────────────────────────────────

/// Auxiliary representations (tuples, lists, vectors) used anywhere in
/// the definitions, children before parents, deduplicated by canonical
/// spelling.
fn collect_aux(defs: &[LDef], interner: &Interner) -> Vec<Rep> {
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut out = Vec::new();

    let mut visit = |rep: &Rep| {
        let mut clone = rep.clone();
        clone.map_nested(&mut |r| {
            if matches!(r, Rep::Tup(_) | Rep::List(_) | Rep::Vector(..)) {
                let canon = r.suffix(interner);
                if seen.insert(canon) {
                    out.push(r.clone());
                }
            }
        });
    };

    for def in defs {
        match def {
            LDef::Type(td) => {
                for (_, rep) in type_fields(td) {
                    visit(rep);
                }
            }
            LDef::Fn(f) => {
                for (_, rep) in &f.params {
                    visit(rep);
                }
                visit(f.ret.rep());
                visit_instr_reps(&f.body, &mut visit);
            }
            LDef::Register(r) => {
                visit(&r.rep);
                visit_instr_reps(&r.init, &mut visit);
            }
            LDef::Let(l) => {
                visit(&l.rep);
                visit_instr_reps(&l.setup, &mut visit);
                visit_instr_reps(&l.teardown, &mut visit);
            }
        }
    }
    out
}

fn type_fields(td: &LTypeDef) -> &[(Sym, Rep)] {
    match td {
        LTypeDef::Struct { fields, .. } => fields,
        LTypeDef::Variant { ctors, .. } => ctors,
        LTypeDef::Enum { .. } => &[],
    }
}

fn visit_instr_reps(instrs: &[Instr], f: &mut impl FnMut(&Rep)) {
    for instr in instrs {
        let mut kind = instr.kind.clone();
        kind.map_reps(&mut |r| f(r));
    }
}

// ── Emission driver ─────────────────────────────────────────────────

/// Emit every generated type definition: enums first, then forward
/// declarations, then auxiliary and user definitions interleaved in
/// dependency order.
pub fn emit_typedefs(ctx: &mut EmitCtx<'_>, defs: &[LDef]) -> Result<(), EmitError> {
    let user: Vec<&LTypeDef> = defs
        .iter()
        .filter_map(|d| match d {
            LDef::Type(td) => Some(td),
            _ => None,
        })
        .collect();
    let order = sort_type_defs(
        &user.iter().map(|&t| t.clone()).collect::<Vec<_>>(),
        ctx.interner,
    )?;
    let aux = collect_aux(defs, ctx.interner);

    // Enums carry no dependencies; they all come first.
    for &i in &order {
        if let LTypeDef::Enum { id, members } = user[i] {
            emit_enum(ctx, *id, members);
        }
    }

    // Forward declarations let definitions point at each other before
    // the full definitions appear.
    for td in &user {
        if !matches!(td, LTypeDef::Enum { .. }) {
            ctx.writeln(&format!(
                "struct {};",
                zencode(ctx.interner.lookup(td.id()))
            ));
        }
    }
    for rep in &aux {
        ctx.writeln(&format!("struct z{};", rep.suffix(ctx.interner)));
    }
    ctx.newline();

    // Interleave: an auxiliary definition is ready once every user type
    // it embeds has been fully defined.
    let mut emitted_users: FxHashSet<Sym> = user
        .iter()
        .filter(|t| matches!(t, LTypeDef::Enum { .. }))
        .map(|t| t.id())
        .collect();
    let mut pending: Vec<Rep> = aux;

    flush_ready_aux(ctx, &mut pending, &emitted_users)?;
    for &i in &order {
        let td = user[i];
        if matches!(td, LTypeDef::Enum { .. }) {
            continue;
        }
        match td {
            LTypeDef::Struct { id, fields } => emit_struct(ctx, *id, fields),
            LTypeDef::Variant { id, ctors } => emit_variant(ctx, *id, ctors)?,
            LTypeDef::Enum { .. } => {}
        }
        emitted_users.insert(td.id());
        flush_ready_aux(ctx, &mut pending, &emitted_users)?;
    }
    if let Some(rep) = pending.first() {
        return Err(EmitError::Invariant(format!(
            "auxiliary type `{}` depends on an unemitted definition",
            rep.suffix(ctx.interner)
        )));
    }
    Ok(())
}

fn flush_ready_aux(
    ctx: &mut EmitCtx<'_>,
    pending: &mut Vec<Rep>,
    emitted_users: &FxHashSet<Sym>,
) -> Result<(), EmitError> {
    loop {
        let mut progressed = false;
        let mut i = 0;
        while i < pending.len() {
            let mut blocked = false;
            collect_named(&pending[i], &mut |id| {
                if !emitted_users.contains(&id) {
                    blocked = true;
                }
            });
            if blocked {
                i += 1;
                continue;
            }
            let rep = pending.remove(i);
            let canon = rep.suffix(ctx.interner);
            if ctx.mark_aux(&canon) {
                emit_aux(ctx, &rep)?;
            }
            progressed = true;
        }
        if !progressed {
            return Ok(());
        }
    }
}

// ── Enums ───────────────────────────────────────────────────────────

fn emit_enum(ctx: &mut EmitCtx<'_>, id: Sym, members: &[Sym]) {
    let z = zencode(ctx.interner.lookup(id));
    let spelled: Vec<String> = members
        .iter()
        .map(|m| zencode(ctx.interner.lookup(*m)))
        .collect();
    ctx.writeln(&format!("enum {z} {{ {} }};", spelled.join(", ")));
    ctx.newline();
    ctx.writeln(&format!(
        "static bool EQUAL(e_{z})(enum {z} op1, enum {z} op2) {{ return op1 == op2; }}"
    ));
    ctx.newline();
}

// ── Structs ─────────────────────────────────────────────────────────

fn emit_struct(ctx: &mut EmitCtx<'_>, id: Sym, fields: &[(Sym, Rep)]) {
    let z = zencode(ctx.interner.lookup(id));
    let sfx = format!("s_{z}");

    ctx.writeln(&format!("struct {z} {{"));
    ctx.indent();
    for (f, rep) in fields {
        let fz = zencode(ctx.interner.lookup(*f));
        ctx.writeln(&format!("{} {fz};", ctype(rep, ctx.interner)));
    }
    ctx.dedent();
    ctx.writeln("};");
    ctx.newline();

    let heap_fields: Vec<&(Sym, Rep)> = fields.iter().filter(|(_, r)| r.is_heap()).collect();
    if !heap_fields.is_empty() {
        for (macro_name, verb) in [("CREATE", "CREATE"), ("RECREATE", "RECREATE")] {
            ctx.writeln(&format!(
                "static void {macro_name}({sfx})(struct {z} *rop) {{"
            ));
            ctx.indent();
            for (f, rep) in &heap_fields {
                let fz = zencode(ctx.interner.lookup(*f));
                ctx.writeln(&format!(
                    "{verb}({})(&rop->{fz});",
                    rep.suffix(ctx.interner)
                ));
            }
            ctx.dedent();
            ctx.writeln("}");
            ctx.newline();
        }
        ctx.writeln(&format!("static void KILL({sfx})(struct {z} *rop) {{"));
        ctx.indent();
        for (f, rep) in &heap_fields {
            let fz = zencode(ctx.interner.lookup(*f));
            ctx.writeln(&format!("KILL({})(&rop->{fz});", rep.suffix(ctx.interner)));
        }
        ctx.dedent();
        ctx.writeln("}");
        ctx.newline();
    }

    ctx.writeln(&format!(
        "static void COPY({sfx})(struct {z} *rop, struct {z} op) {{"
    ));
    ctx.indent();
    for (f, rep) in fields {
        let fz = zencode(ctx.interner.lookup(*f));
        member_copy(ctx, &format!("rop->{fz}"), &format!("op.{fz}"), rep);
    }
    ctx.dedent();
    ctx.writeln("}");
    ctx.newline();

    ctx.writeln(&format!(
        "static bool EQUAL({sfx})(struct {z} op1, struct {z} op2) {{"
    ));
    ctx.indent();
    if fields.is_empty() {
        ctx.writeln("return true;");
    } else {
        let cmp: Vec<String> = fields
            .iter()
            .map(|(f, rep)| {
                let fz = zencode(ctx.interner.lookup(*f));
                member_equal(
                    &format!("op1.{fz}"),
                    &format!("op2.{fz}"),
                    rep,
                    ctx.interner,
                )
            })
            .collect();
        ctx.writeln(&format!("return {};", cmp.join(" && ")));
    }
    ctx.dedent();
    ctx.writeln("}");
    ctx.newline();
}

// ── Variants ────────────────────────────────────────────────────────

fn emit_variant(ctx: &mut EmitCtx<'_>, id: Sym, ctors: &[(Sym, Rep)]) -> Result<(), EmitError> {
    let z = zencode(ctx.interner.lookup(id));
    let sfx = format!("u_{z}");
    let Some((first, first_rep)) = ctors.first() else {
        return Err(EmitError::Invariant(format!(
            "variant `{z}` has no constructors"
        )));
    };

    let kinds: Vec<String> = ctors
        .iter()
        .map(|(c, _)| format!("Kind_{}", zencode(ctx.interner.lookup(*c))))
        .collect();
    ctx.writeln(&format!("enum kind_{z} {{ {} }};", kinds.join(", ")));
    ctx.newline();
    ctx.writeln(&format!("struct {z} {{"));
    ctx.indent();
    ctx.writeln(&format!("enum kind_{z} kind;"));
    ctx.writeln("union {");
    ctx.indent();
    for (c, rep) in ctors {
        let cz = zencode(ctx.interner.lookup(*c));
        ctx.writeln(&format!("{} {cz};", ctype(rep, ctx.interner)));
    }
    ctx.dedent();
    ctx.writeln("} variants;");
    ctx.dedent();
    ctx.writeln("};");
    ctx.newline();

    // CREATE parks the value on the first constructor.
    let first_z = zencode(ctx.interner.lookup(*first));
    ctx.writeln(&format!("static void CREATE({sfx})(struct {z} *rop) {{"));
    ctx.indent();
    ctx.writeln(&format!("rop->kind = Kind_{first_z};"));
    if first_rep.is_heap() {
        ctx.writeln(&format!(
            "CREATE({})(&rop->variants.{first_z});",
            first_rep.suffix(ctx.interner)
        ));
    }
    ctx.dedent();
    ctx.writeln("}");
    ctx.newline();

    ctx.writeln(&format!("static void KILL({sfx})(struct {z} *rop) {{"));
    ctx.indent();
    ctx.writeln("switch (rop->kind) {");
    ctx.indent();
    for (c, rep) in ctors {
        let cz = zencode(ctx.interner.lookup(*c));
        if rep.is_heap() {
            ctx.writeln(&format!(
                "case Kind_{cz}: KILL({})(&rop->variants.{cz}); break;",
                rep.suffix(ctx.interner)
            ));
        } else {
            ctx.writeln(&format!("case Kind_{cz}: break;"));
        }
    }
    ctx.dedent();
    ctx.writeln("}");
    ctx.dedent();
    ctx.writeln("}");
    ctx.newline();

    ctx.writeln(&format!("static void RECREATE({sfx})(struct {z} *rop) {{"));
    ctx.indent();
    ctx.writeln(&format!("KILL({sfx})(rop);"));
    ctx.writeln(&format!("CREATE({sfx})(rop);"));
    ctx.dedent();
    ctx.writeln("}");
    ctx.newline();

    ctx.writeln(&format!(
        "static void COPY({sfx})(struct {z} *rop, struct {z} op) {{"
    ));
    ctx.indent();
    ctx.writeln(&format!("KILL({sfx})(rop);"));
    ctx.writeln("rop->kind = op.kind;");
    ctx.writeln("switch (op.kind) {");
    ctx.indent();
    for (c, rep) in ctors {
        let cz = zencode(ctx.interner.lookup(*c));
        if rep.is_heap() {
            let rsfx = rep.suffix(ctx.interner);
            ctx.writeln(&format!(
                "case Kind_{cz}: CREATE({rsfx})(&rop->variants.{cz}); \
                 COPY({rsfx})(&rop->variants.{cz}, op.variants.{cz}); break;"
            ));
        } else {
            ctx.writeln(&format!(
                "case Kind_{cz}: rop->variants.{cz} = op.variants.{cz}; break;"
            ));
        }
    }
    ctx.dedent();
    ctx.writeln("}");
    ctx.dedent();
    ctx.writeln("}");
    ctx.newline();

    ctx.writeln(&format!(
        "static bool EQUAL({sfx})(struct {z} op1, struct {z} op2) {{"
    ));
    ctx.indent();
    ctx.writeln("if (op1.kind != op2.kind) return false;");
    ctx.writeln("switch (op1.kind) {");
    ctx.indent();
    for (c, rep) in ctors {
        let cz = zencode(ctx.interner.lookup(*c));
        let eq = member_equal(
            &format!("op1.variants.{cz}"),
            &format!("op2.variants.{cz}"),
            rep,
            ctx.interner,
        );
        ctx.writeln(&format!("case Kind_{cz}: return {eq};"));
    }
    ctx.dedent();
    ctx.writeln("}");
    ctx.writeln("return false;");
    ctx.dedent();
    ctx.writeln("}");
    ctx.newline();

    // One setter per constructor; call sites pass the destination
    // pointer first.
    for (c, rep) in ctors {
        let cz = zencode(ctx.interner.lookup(*c));
        ctx.writeln(&format!(
            "static void {}{cz}(struct {z} *rop, {} op) {{",
            ctx.config.prefix,
            ctype(rep, ctx.interner)
        ));
        ctx.indent();
        ctx.writeln(&format!("KILL({sfx})(rop);"));
        ctx.writeln(&format!("rop->kind = Kind_{cz};"));
        if rep.is_heap() {
            let rsfx = rep.suffix(ctx.interner);
            ctx.writeln(&format!("CREATE({rsfx})(&rop->variants.{cz});"));
            ctx.writeln(&format!("COPY({rsfx})(&rop->variants.{cz}, op);"));
        } else {
            ctx.writeln(&format!("rop->variants.{cz} = op;"));
        }
        ctx.dedent();
        ctx.writeln("}");
        ctx.newline();
    }
    Ok(())
}

// ── Auxiliary types ─────────────────────────────────────────────────

fn emit_aux(ctx: &mut EmitCtx<'_>, rep: &Rep) -> Result<(), EmitError> {
    match rep {
        Rep::Tup(fields) => {
            emit_tuple(ctx, rep, fields);
            Ok(())
        }
        Rep::List(elem) => {
            emit_list(ctx, rep, elem);
            Ok(())
        }
        Rep::Vector(_, elem) => {
            emit_vector(ctx, rep, elem);
            Ok(())
        }
        other => Err(EmitError::Invariant(format!(
            "not an auxiliary representation: {other:?}"
        ))),
    }
}

fn emit_tuple(ctx: &mut EmitCtx<'_>, rep: &Rep, fields: &[Rep]) {
    let sfx = rep.suffix(ctx.interner);
    let z = format!("z{sfx}");

    ctx.writeln(&format!("struct {z} {{"));
    ctx.indent();
    for (i, f) in fields.iter().enumerate() {
        ctx.writeln(&format!("{} ztup{i};", ctype(f, ctx.interner)));
    }
    ctx.dedent();
    ctx.writeln("};");
    ctx.newline();

    if rep.is_heap() {
        for (macro_name, verb) in [("CREATE", "CREATE"), ("RECREATE", "RECREATE")] {
            ctx.writeln(&format!("static void {macro_name}({sfx})(struct {z} *rop) {{"));
            ctx.indent();
            for (i, f) in fields.iter().enumerate() {
                if f.is_heap() {
                    ctx.writeln(&format!(
                        "{verb}({})(&rop->ztup{i});",
                        f.suffix(ctx.interner)
                    ));
                }
            }
            ctx.dedent();
            ctx.writeln("}");
            ctx.newline();
        }
        ctx.writeln(&format!("static void KILL({sfx})(struct {z} *rop) {{"));
        ctx.indent();
        for (i, f) in fields.iter().enumerate() {
            if f.is_heap() {
                ctx.writeln(&format!("KILL({})(&rop->ztup{i});", f.suffix(ctx.interner)));
            }
        }
        ctx.dedent();
        ctx.writeln("}");
        ctx.newline();
    }

    ctx.writeln(&format!(
        "static void COPY({sfx})(struct {z} *rop, struct {z} op) {{"
    ));
    ctx.indent();
    for (i, f) in fields.iter().enumerate() {
        member_copy(ctx, &format!("rop->ztup{i}"), &format!("op.ztup{i}"), f);
    }
    ctx.dedent();
    ctx.writeln("}");
    ctx.newline();

    ctx.writeln(&format!(
        "static bool EQUAL({sfx})(struct {z} op1, struct {z} op2) {{"
    ));
    ctx.indent();
    let cmp: Vec<String> = fields
        .iter()
        .enumerate()
        .map(|(i, f)| {
            member_equal(
                &format!("op1.ztup{i}"),
                &format!("op2.ztup{i}"),
                f,
                ctx.interner,
            )
        })
        .collect();
    ctx.writeln(&format!("return {};", cmp.join(" && ")));
    ctx.dedent();
    ctx.writeln("}");
    ctx.newline();
}

fn emit_list(ctx: &mut EmitCtx<'_>, rep: &Rep, elem: &Rep) {
    let sfx = rep.suffix(ctx.interner);
    let z = format!("z{sfx}");
    let elem_ty = ctype(elem, ctx.interner);
    let elem_sfx = elem.suffix(ctx.interner);

    ctx.writeln(&format!("struct {z} {{"));
    ctx.indent();
    ctx.writeln(&format!("{elem_ty} hd;"));
    ctx.writeln(&format!("struct {z} *tl;"));
    ctx.dedent();
    ctx.writeln("};");
    ctx.newline();

    ctx.writeln(&format!("static void CREATE({sfx})(struct {z} **rop) {{"));
    ctx.indent();
    ctx.writeln("*rop = NULL;");
    ctx.dedent();
    ctx.writeln("}");
    ctx.newline();

    ctx.writeln(&format!("static void KILL({sfx})(struct {z} **rop) {{"));
    ctx.indent();
    ctx.writeln("while (*rop != NULL) {");
    ctx.indent();
    ctx.writeln(&format!("struct {z} *node = *rop;"));
    if elem.is_heap() {
        ctx.writeln(&format!("KILL({elem_sfx})(&node->hd);"));
    }
    ctx.writeln("*rop = node->tl;");
    ctx.writeln("free(node);");
    ctx.dedent();
    ctx.writeln("}");
    ctx.dedent();
    ctx.writeln("}");
    ctx.newline();

    ctx.writeln(&format!("static void RECREATE({sfx})(struct {z} **rop) {{"));
    ctx.indent();
    ctx.writeln(&format!("KILL({sfx})(rop);"));
    ctx.writeln("*rop = NULL;");
    ctx.dedent();
    ctx.writeln("}");
    ctx.newline();

    ctx.writeln(&format!(
        "static void COPY({sfx})(struct {z} **rop, struct {z} *op) {{"
    ));
    ctx.indent();
    ctx.writeln(&format!("KILL({sfx})(rop);"));
    ctx.writeln(&format!("struct {z} **next = rop;"));
    ctx.writeln("while (op != NULL) {");
    ctx.indent();
    ctx.writeln(&format!("*next = malloc(sizeof(struct {z}));"));
    if elem.is_heap() {
        ctx.writeln(&format!("CREATE({elem_sfx})(&(*next)->hd);"));
        ctx.writeln(&format!("COPY({elem_sfx})(&(*next)->hd, op->hd);"));
    } else {
        ctx.writeln("(*next)->hd = op->hd;");
    }
    ctx.writeln("(*next)->tl = NULL;");
    ctx.writeln("next = &(*next)->tl;");
    ctx.writeln("op = op->tl;");
    ctx.dedent();
    ctx.writeln("}");
    ctx.dedent();
    ctx.writeln("}");
    ctx.newline();

    ctx.writeln(&format!(
        "static bool EQUAL({sfx})(struct {z} *op1, struct {z} *op2) {{"
    ));
    ctx.indent();
    ctx.writeln("while (op1 != NULL && op2 != NULL) {");
    ctx.indent();
    ctx.writeln(&format!(
        "if (!{}) return false;",
        member_equal("op1->hd", "op2->hd", elem, ctx.interner)
    ));
    ctx.writeln("op1 = op1->tl;");
    ctx.writeln("op2 = op2->tl;");
    ctx.dedent();
    ctx.writeln("}");
    ctx.writeln("return op1 == NULL && op2 == NULL;");
    ctx.dedent();
    ctx.writeln("}");
    ctx.newline();

    ctx.writeln(&format!(
        "static void cons_{sfx}(struct {z} **rop, {elem_ty} x, struct {z} *xs) {{"
    ));
    ctx.indent();
    ctx.writeln(&format!("struct {z} *node = malloc(sizeof(struct {z}));"));
    if elem.is_heap() {
        ctx.writeln(&format!("CREATE({elem_sfx})(&node->hd);"));
        ctx.writeln(&format!("COPY({elem_sfx})(&node->hd, x);"));
    } else {
        ctx.writeln("node->hd = x;");
    }
    ctx.writeln("node->tl = xs;");
    ctx.writeln("*rop = node;");
    ctx.dedent();
    ctx.writeln("}");
    ctx.newline();

    // List pick has a stack and a heap path. Both follow the one
    // calling convention of the generated code: heap results go
    // through a destination pointer passed first.
    if elem.is_stack() {
        ctx.writeln(&format!(
            "static {elem_ty} pick_{sfx}(struct {z} *xs) {{ return xs->hd; }}"
        ));
    } else {
        ctx.writeln(&format!(
            "static void pick_{sfx}({elem_ty} *rop, struct {z} *xs) {{ COPY({elem_sfx})(rop, xs->hd); }}"
        ));
    }
    ctx.newline();
}

fn emit_vector(ctx: &mut EmitCtx<'_>, rep: &Rep, elem: &Rep) {
    let sfx = rep.suffix(ctx.interner);
    let z = format!("z{sfx}");
    let elem_ty = ctype(elem, ctx.interner);
    let elem_sfx = elem.suffix(ctx.interner);

    ctx.writeln(&format!("struct {z} {{"));
    ctx.indent();
    ctx.writeln("size_t len;");
    ctx.writeln(&format!("{elem_ty} *data;"));
    ctx.dedent();
    ctx.writeln("};");
    ctx.newline();

    ctx.writeln(&format!("static void CREATE({sfx})(struct {z} *rop) {{"));
    ctx.indent();
    ctx.writeln("rop->len = 0;");
    ctx.writeln("rop->data = NULL;");
    ctx.dedent();
    ctx.writeln("}");
    ctx.newline();

    ctx.writeln(&format!("static void KILL({sfx})(struct {z} *rop) {{"));
    ctx.indent();
    if elem.is_heap() {
        ctx.writeln("for (size_t i = 0; i < rop->len; i++) {");
        ctx.indent();
        ctx.writeln(&format!("KILL({elem_sfx})(&rop->data[i]);"));
        ctx.dedent();
        ctx.writeln("}");
    }
    ctx.writeln("free(rop->data);");
    ctx.writeln("rop->len = 0;");
    ctx.writeln("rop->data = NULL;");
    ctx.dedent();
    ctx.writeln("}");
    ctx.newline();

    ctx.writeln(&format!("static void RECREATE({sfx})(struct {z} *rop) {{"));
    ctx.indent();
    ctx.writeln(&format!("KILL({sfx})(rop);"));
    ctx.dedent();
    ctx.writeln("}");
    ctx.newline();

    ctx.writeln(&format!(
        "static void COPY({sfx})(struct {z} *rop, struct {z} op) {{"
    ));
    ctx.indent();
    ctx.writeln(&format!("KILL({sfx})(rop);"));
    ctx.writeln("rop->len = op.len;");
    ctx.writeln(&format!("rop->data = malloc(op.len * sizeof({elem_ty}));"));
    ctx.writeln("for (size_t i = 0; i < op.len; i++) {");
    ctx.indent();
    if elem.is_heap() {
        ctx.writeln(&format!("CREATE({elem_sfx})(&rop->data[i]);"));
        ctx.writeln(&format!("COPY({elem_sfx})(&rop->data[i], op.data[i]);"));
    } else {
        ctx.writeln("rop->data[i] = op.data[i];");
    }
    ctx.dedent();
    ctx.writeln("}");
    ctx.dedent();
    ctx.writeln("}");
    ctx.newline();

    ctx.writeln(&format!(
        "static bool EQUAL({sfx})(struct {z} op1, struct {z} op2) {{"
    ));
    ctx.indent();
    ctx.writeln("if (op1.len != op2.len) return false;");
    ctx.writeln("for (size_t i = 0; i < op1.len; i++) {");
    ctx.indent();
    ctx.writeln(&format!(
        "if (!{}) return false;",
        member_equal("op1.data[i]", "op2.data[i]", elem, ctx.interner)
    ));
    ctx.dedent();
    ctx.writeln("}");
    ctx.writeln("return true;");
    ctx.dedent();
    ctx.writeln("}");
    ctx.newline();

    // Element access shares the pointer-first convention for heap
    // element types.
    if elem.is_stack() {
        ctx.writeln(&format!(
            "static {elem_ty} vector_access_{sfx}(struct {z} op, int64_t n) {{ return op.data[n]; }}"
        ));
    } else {
        ctx.writeln(&format!(
            "static void vector_access_{sfx}({elem_ty} *rop, struct {z} op, int64_t n) {{ COPY({elem_sfx})(rop, op.data[n]); }}"
        ));
    }
    ctx.newline();
    ctx.writeln(&format!(
        "static void vector_update_{sfx}(struct {z} *rop, struct {z} op, int64_t n, {elem_ty} x) {{"
    ));
    ctx.indent();
    ctx.writeln(&format!("COPY({sfx})(rop, op);"));
    if elem.is_heap() {
        ctx.writeln(&format!("COPY({elem_sfx})(&rop->data[n], x);"));
    } else {
        ctx.writeln("rop->data[n] = x;");
    }
    ctx.dedent();
    ctx.writeln("}");
    ctx.newline();
}
