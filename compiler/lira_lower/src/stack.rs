//! Stack growth for deep IR recursion.
//!
//! Pattern trees produced by macro-expanded instruction decoders nest
//! deeply enough to overflow the default thread stack during
//! normalization. Recursive entry points wrap themselves in
//! [`ensure_sufficient_stack`], which grows the stack on demand.

/// Remaining stack below which we grow.
const RED_ZONE: usize = 128 * 1024;

/// Stack allocated per growth step.
const GROW_BY: usize = 2 * 1024 * 1024;

/// Run `f`, growing the stack first when little of it remains.
#[inline]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, GROW_BY, f)
}
