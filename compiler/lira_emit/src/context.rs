//! Emission context and state.
//!
//! One [`EmitCtx`] exists per compilation run. It owns the output
//! buffer, the indentation level, the set of already-emitted auxiliary
//! type names, and the lookup tables the per-instruction translation
//! needs (function return kinds, extern bindings, configuration).

use rustc_hash::{FxHashMap, FxHashSet};

use lira_ir::lir::RetKind;
use lira_ir::{Config, Interner, ModuleEnv, Sym};

/// Emission state for one run.
pub struct EmitCtx<'a> {
    pub env: &'a ModuleEnv,
    pub interner: &'a Interner,
    pub config: &'a Config,
    /// Return kind per lowered function, for call-site conventions.
    pub fn_rets: FxHashMap<Sym, RetKind>,
    /// Name of the function currently being emitted (for match-failure
    /// reports).
    pub current_fn: String,
    /// Canonical spellings of auxiliary types already emitted.
    emitted_aux: FxHashSet<String>,
    indent: usize,
    out: String,
}

impl<'a> EmitCtx<'a> {
    pub fn new(env: &'a ModuleEnv, interner: &'a Interner, config: &'a Config) -> Self {
        EmitCtx {
            env,
            interner,
            config,
            fn_rets: FxHashMap::default(),
            current_fn: String::new(),
            emitted_aux: FxHashSet::default(),
            indent: 0,
            out: String::with_capacity(16 * 1024),
        }
    }

    /// Record an auxiliary type as emitted; false when it already was.
    pub fn mark_aux(&mut self, canon: &str) -> bool {
        self.emitted_aux.insert(canon.to_owned())
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn dedent(&mut self) {
        debug_assert!(self.indent > 0, "dedent at zero indent");
        self.indent = self.indent.saturating_sub(1);
    }

    pub fn write(&mut self, s: &str) {
        self.out.push_str(s);
    }

    pub fn writeln(&mut self, s: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(s);
        self.out.push('\n');
    }

    pub fn newline(&mut self) {
        self.out.push('\n');
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.out)
    }

    /// The emitted identifier of a declared function: the configured
    /// prefix plus the z-encoded source name, or the extern binding's C
    /// name verbatim.
    pub fn fn_name(&self, id: Sym) -> String {
        if let Some(cname) = self.env.extern_name(id) {
            return cname.to_owned();
        }
        format!(
            "{}{}",
            self.config.prefix,
            lira_ir::zencode(self.interner.lookup(id))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lira_ir::source::Ast;
    use pretty_assertions::assert_eq;

    #[test]
    fn writeln_indents_by_level() {
        let interner = Interner::new();
        let ast = Ast::default();
        let env = ModuleEnv::from_ast(&ast, &interner);
        let config = Config::default();
        let mut ctx = EmitCtx::new(&env, &interner, &config);

        ctx.writeln("a");
        ctx.indent();
        ctx.writeln("b");
        ctx.dedent();
        ctx.writeln("c");
        assert_eq!(ctx.take_output(), "a\n    b\nc\n");
    }

    #[test]
    fn prefix_applies_to_generated_names() {
        let interner = Interner::new();
        let ast = Ast::default();
        let env = ModuleEnv::from_ast(&ast, &interner);
        let config = Config {
            prefix: "model_".into(),
            ..Config::default()
        };
        let ctx = EmitCtx::new(&env, &interner, &config);
        assert_eq!(ctx.fn_name(interner.intern("step")), "model_zstep");
    }

    #[test]
    fn aux_marking_deduplicates() {
        let interner = Interner::new();
        let ast = Ast::default();
        let env = ModuleEnv::from_ast(&ast, &interner);
        let config = Config::default();
        let mut ctx = EmitCtx::new(&env, &interner, &config);
        assert!(ctx.mark_aux("tup_i64_bool"));
        assert!(!ctx.mark_aux("tup_i64_bool"));
    }
}
