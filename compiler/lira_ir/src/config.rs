//! Backend configuration.

/// Configuration toggles for one compilation run.
///
/// A fresh `Config` is passed to the pipeline per run; there is no
/// process-global configuration state.
#[derive(Clone, Debug)]
pub struct Config {
    /// Enable the primitive-operation analyzer. When disabled, no
    /// call-site is rewritten to an inline form.
    pub optimize_primops: bool,
    /// Enable the allocation hoister.
    pub optimize_hoist_allocations: bool,
    /// Enable the unique-names / remove-alias / combine-variables
    /// passes.
    pub optimize_alias: bool,
    /// Enable the experimental hoist-alias rewrite and elide assertions.
    pub optimize_experimental: bool,
    /// Prefix generated function and let helpers with `static`.
    pub static_fns: bool,
    /// Omit the `main` wrapper; emit only `model_main`.
    pub no_main: bool,
    /// Omit runtime-helper includes and the init/fini scaffold.
    pub no_rts: bool,
    /// Prefix prepended to generated function identifiers.
    pub prefix: String,
    /// Extra textual parameter list threaded through every non-extern
    /// function signature.
    pub extra_params: Option<String>,
    /// Extra textual argument list threaded through every non-extern
    /// call site.
    pub extra_arguments: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            optimize_primops: true,
            optimize_hoist_allocations: true,
            optimize_alias: true,
            optimize_experimental: false,
            static_fns: false,
            no_main: false,
            no_rts: false,
            prefix: String::new(),
            extra_params: None,
            extra_arguments: None,
        }
    }
}
