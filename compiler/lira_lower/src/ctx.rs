//! Lowering context.
//!
//! One [`LowerCtx`] exists per lowered definition. It carries the module
//! environment and prover capability, the local kind environment, the
//! local value environment (name → representation), the fresh-name
//! counter, and the exception/cleanup bookkeeping the IR compiler needs
//! to keep heap locals balanced along every exit path.

use rustc_hash::FxHashMap;

use lira_ir::lir::{NameId, Rep};
use lira_ir::{Config, Interner, KidEnv, ModuleEnv, Prover, Sym};

/// Scoped lowering state for one definition.
pub struct LowerCtx<'a> {
    pub env: &'a ModuleEnv,
    pub prover: &'a dyn Prover,
    pub config: &'a Config,
    pub interner: &'a Interner,
    /// Local kind environment; extended under existentials and match
    /// arms so type lowering re-runs under the correct assumptions.
    pub kids: KidEnv,
    /// Registers and top-level lets visible to every definition.
    pub globals: &'a FxHashMap<Sym, Rep>,
    /// Label every early function exit jumps to.
    pub end_label: String,
    /// Local bindings, innermost last. Linear back-search gives
    /// shadowing.
    locals: Vec<(Sym, Rep)>,
    counter: u32,
    /// Enclosing try-handler labels with the cleanup depth at entry.
    handlers: Vec<(String, usize)>,
    /// Heap locals that must be cleared before leaving the function.
    cleanup: Vec<(NameId, Rep)>,
    /// Named type definitions currently being lowered; breaks recursive
    /// type expansion.
    expanding: Vec<Sym>,
}

impl<'a> LowerCtx<'a> {
    pub fn new(
        env: &'a ModuleEnv,
        prover: &'a dyn Prover,
        config: &'a Config,
        interner: &'a Interner,
        globals: &'a FxHashMap<Sym, Rep>,
        end_label: String,
    ) -> Self {
        LowerCtx {
            env,
            prover,
            config,
            interner,
            kids: KidEnv::default(),
            globals,
            end_label,
            locals: Vec::new(),
            counter: 0,
            handlers: Vec::new(),
            cleanup: Vec::new(),
            expanding: Vec::new(),
        }
    }

    // ── Fresh names and labels ──────────────────────────────────

    /// Intern a fresh generated name. The `#` keeps generated names out
    /// of the user identifier space.
    pub fn fresh(&mut self, base: &str) -> Sym {
        let n = self.counter;
        self.counter += 1;
        self.interner.intern(&format!("{base}#{n}"))
    }

    /// A fresh label unique within the current definition.
    pub fn label(&mut self, base: &str) -> String {
        let n = self.counter;
        self.counter += 1;
        format!("{base}_{n}")
    }

    // ── Local value environment ─────────────────────────────────

    pub fn bind(&mut self, sym: Sym, rep: Rep) {
        self.locals.push((sym, rep));
    }

    /// Current scope depth; pass to [`LowerCtx::release`] to drop
    /// bindings introduced since.
    pub fn mark(&self) -> usize {
        self.locals.len()
    }

    pub fn release(&mut self, mark: usize) {
        self.locals.truncate(mark);
    }

    /// Resolve a name to its representation: innermost local first,
    /// then registers and top-level lets.
    pub fn lookup(&self, sym: Sym) -> Option<Rep> {
        self.locals
            .iter()
            .rev()
            .find(|(s, _)| *s == sym)
            .map(|(_, r)| r.clone())
            .or_else(|| self.globals.get(&sym).cloned())
    }

    // ── Exception targets ───────────────────────────────────────

    pub fn push_handler(&mut self, label: String) {
        self.handlers.push((label, self.cleanup.len()));
    }

    pub fn pop_handler(&mut self) {
        self.handlers.pop();
    }

    /// Where a pending exception transfers control: the innermost
    /// handler, or the function exit. Also returns the cleanup depth
    /// alive at that target, so only locals born since are cleared on
    /// the way out.
    pub fn exception_target(&self) -> (String, usize) {
        match self.handlers.last() {
            Some((label, depth)) => (label.clone(), *depth),
            None => (self.end_label.clone(), 0),
        }
    }

    // ── Heap-local cleanup tracking ─────────────────────────────

    pub fn cleanup_push(&mut self, id: NameId, rep: Rep) {
        self.cleanup.push((id, rep));
    }

    pub fn cleanup_mark(&self) -> usize {
        self.cleanup.len()
    }

    pub fn cleanup_release(&mut self, mark: usize) {
        self.cleanup.truncate(mark);
    }

    /// Heap locals declared at or above `depth`, innermost first.
    pub fn cleanup_since(&self, depth: usize) -> Vec<(NameId, Rep)> {
        self.cleanup[depth..].iter().rev().cloned().collect()
    }

    // ── Recursive type expansion guard ──────────────────────────

    pub fn expanding_contains(&self, id: Sym) -> bool {
        self.expanding.contains(&id)
    }

    pub fn expanding_push(&mut self, id: Sym) {
        self.expanding.push(id);
    }

    pub fn expanding_pop(&mut self) {
        self.expanding.pop();
    }
}
