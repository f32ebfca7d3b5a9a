//! Runtime scaffolding: includes, globals, initialization and
//! finalization, and the entry wrapper.

use lira_ir::lir::{LDef, LFn, RetKind};
use lira_ir::zencode;

use super::function::emit_instr;
use super::types::ctype;
use crate::context::EmitCtx;
use crate::error::EmitError;

/// Include preamble. The runtime headers carry the representation
/// types (`lint`, `lbits`, `sbits`, `lstr`, `real`), the
/// CREATE/RECREATE/KILL/COPY/EQUAL/CONVERT_OF/UNDEFINED macro
/// families, and the bit-manipulation helpers.
pub fn emit_preamble(ctx: &mut EmitCtx<'_>) {
    ctx.writeln("#include <stdint.h>");
    ctx.writeln("#include <stdbool.h>");
    ctx.writeln("#include <stdlib.h>");
    if !ctx.config.no_rts {
        ctx.writeln("#include \"lira.h\"");
        ctx.writeln("#include \"lira_rt.h\"");
    }
    ctx.newline();
}

/// One global per register, named by the z-encoded source name.
pub fn emit_registers(ctx: &mut EmitCtx<'_>, defs: &[LDef]) {
    let mut any = false;
    for def in defs {
        if let LDef::Register(r) = def {
            let z = zencode(ctx.interner.lookup(r.id));
            ctx.writeln(&format!("{} {z};", ctype(&r.rep, ctx.interner)));
            any = true;
        }
    }
    if any {
        ctx.newline();
    }
}

/// Process-wide exception state, present only when the source declared
/// an `exception` variant.
pub fn emit_exception_state(ctx: &mut EmitCtx<'_>) -> Result<(), EmitError> {
    let Some(exc) = ctx.env.exception_id() else {
        return Ok(());
    };
    let z = zencode(ctx.interner.lookup(exc));
    ctx.writeln(&format!("struct {z} lira_current_exception;"));
    ctx.writeln("bool lira_have_exception = false;");
    ctx.writeln("lstr lira_throw_location;");
    ctx.newline();
    Ok(())
}

/// One global per top-level let binding.
pub fn emit_let_declarations(ctx: &mut EmitCtx<'_>, defs: &[LDef]) {
    let mut any = false;
    for def in defs {
        if let LDef::Let(l) = def {
            let z = zencode(ctx.interner.lookup(l.id));
            ctx.writeln(&format!("{} {z};", ctype(&l.rep, ctx.interner)));
            any = true;
        }
    }
    if any {
        ctx.newline();
    }
}

/// Initializer/finalizer pair per let binding, called from
/// `model_init` / `model_fini` in binding order and reverse order
/// respectively.
pub fn emit_let_bindings(ctx: &mut EmitCtx<'_>, defs: &[LDef]) -> Result<(), EmitError> {
    let linkage = if ctx.config.static_fns { "static " } else { "" };
    for (i, def) in lets(defs).into_iter().enumerate() {
        ctx.current_fn = format!("create_letbind_{i}");
        ctx.writeln(&format!("{linkage}void create_letbind_{i}(void)"));
        ctx.writeln("{");
        ctx.indent();
        if def.rep.is_heap() {
            let z = zencode(ctx.interner.lookup(def.id));
            ctx.writeln(&format!(
                "CREATE({})(&{z});",
                def.rep.suffix(ctx.interner)
            ));
        }
        for instr in &def.setup {
            emit_instr(ctx, instr)?;
        }
        ctx.dedent();
        ctx.writeln("}");
        ctx.newline();

        ctx.writeln(&format!("{linkage}void kill_letbind_{i}(void)"));
        ctx.writeln("{");
        ctx.indent();
        for instr in &def.teardown {
            emit_instr(ctx, instr)?;
        }
        ctx.dedent();
        ctx.writeln("}");
        ctx.newline();
    }
    Ok(())
}

fn lets(defs: &[LDef]) -> Vec<&lira_ir::lir::LLet> {
    defs.iter()
        .filter_map(|d| match d {
            LDef::Let(l) => Some(l),
            _ => None,
        })
        .collect()
}

/// `model_init`, `model_fini`, `model_main`, and the `main` wrapper.
///
/// `no_rts` omits the init/fini pair only; `model_main` is always
/// emitted, and `main` delegates to it unless `no_main`.
pub fn emit_scaffold(ctx: &mut EmitCtx<'_>, defs: &[LDef]) -> Result<(), EmitError> {
    if !ctx.config.no_rts {
        emit_init_fini(ctx, defs)?;
    }

    // model_main
    ctx.current_fn = "model_main".into();
    ctx.writeln("int model_main(int argc, char *argv[])");
    ctx.writeln("{");
    ctx.indent();
    ctx.writeln("(void)argc;");
    ctx.writeln("(void)argv;");
    if !ctx.config.no_rts {
        ctx.writeln("model_init();");
    }
    if let Some(main_fn) = find_main(ctx, defs) {
        emit_main_call(ctx, main_fn);
    }
    if !ctx.config.no_rts {
        ctx.writeln("model_fini();");
    }
    ctx.writeln("return EXIT_SUCCESS;");
    ctx.dedent();
    ctx.writeln("}");
    ctx.newline();

    if !ctx.config.no_main {
        ctx.writeln("int main(int argc, char *argv[])");
        ctx.writeln("{");
        ctx.indent();
        ctx.writeln("return model_main(argc, argv);");
        ctx.dedent();
        ctx.writeln("}");
        ctx.newline();
    }
    Ok(())
}

fn emit_init_fini(ctx: &mut EmitCtx<'_>, defs: &[LDef]) -> Result<(), EmitError> {
    // model_init
    ctx.current_fn = "model_init".into();
    ctx.writeln("void model_init(void)");
    ctx.writeln("{");
    ctx.indent();
    ctx.writeln("setup_rts();");
    if let Some(exc) = ctx.env.exception_id() {
        let z = zencode(ctx.interner.lookup(exc));
        ctx.writeln(&format!("CREATE(u_{z})(&lira_current_exception);"));
        ctx.writeln("CREATE(lstr)(&lira_throw_location);");
        ctx.writeln("lira_have_exception = false;");
    }
    for def in defs {
        if let LDef::Register(r) = def {
            if r.rep.is_heap() {
                let z = zencode(ctx.interner.lookup(r.id));
                ctx.writeln(&format!("CREATE({})(&{z});", r.rep.suffix(ctx.interner)));
            }
            for instr in &r.init {
                emit_instr(ctx, instr)?;
            }
        }
    }
    for i in 0..lets(defs).len() {
        ctx.writeln(&format!("create_letbind_{i}();"));
    }
    ctx.dedent();
    ctx.writeln("}");
    ctx.newline();

    // model_fini
    ctx.current_fn = "model_fini".into();
    ctx.writeln("void model_fini(void)");
    ctx.writeln("{");
    ctx.indent();
    for i in (0..lets(defs).len()).rev() {
        ctx.writeln(&format!("kill_letbind_{i}();"));
    }
    for def in defs {
        if let LDef::Register(r) = def {
            if r.rep.is_heap() {
                let z = zencode(ctx.interner.lookup(r.id));
                ctx.writeln(&format!("KILL({})(&{z});", r.rep.suffix(ctx.interner)));
            }
        }
    }
    if let Some(exc) = ctx.env.exception_id() {
        let z = zencode(ctx.interner.lookup(exc));
        ctx.writeln(&format!("KILL(u_{z})(&lira_current_exception);"));
        ctx.writeln("KILL(lstr)(&lira_throw_location);");
    }
    ctx.writeln("cleanup_rts();");
    ctx.dedent();
    ctx.writeln("}");
    ctx.newline();
    Ok(())
}

fn find_main<'a>(ctx: &EmitCtx<'_>, defs: &'a [LDef]) -> Option<&'a LFn> {
    defs.iter().find_map(|d| match d {
        LDef::Fn(f) if ctx.interner.lookup(f.id) == "main" => Some(f),
        _ => None,
    })
}

fn emit_main_call(ctx: &mut EmitCtx<'_>, f: &LFn) {
    let fname = ctx.fn_name(f.id);
    let args: Vec<&str> = f.params.iter().map(|_| "UNIT").collect();
    let joined = args.join(", ");
    match &f.ret {
        RetKind::Stack(_) => {
            ctx.writeln(&format!("{fname}({joined});"));
        }
        RetKind::Heap(rep) => {
            ctx.writeln(&format!("{} model_result;", ctype(rep, ctx.interner)));
            ctx.writeln(&format!(
                "CREATE({})(&model_result);",
                rep.suffix(ctx.interner)
            ));
            if joined.is_empty() {
                ctx.writeln(&format!("{fname}(&model_result);"));
            } else {
                ctx.writeln(&format!("{fname}(&model_result, {joined});"));
            }
            ctx.writeln(&format!(
                "KILL({})(&model_result);",
                rep.suffix(ctx.interner)
            ));
        }
    }
}
