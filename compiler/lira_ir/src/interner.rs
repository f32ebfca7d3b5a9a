//! String interner for identifier storage.
//!
//! Provides O(1) interning and lookup. Interned strings are leaked to get a
//! `'static` lifetime, which keeps [`Sym`] a plain `Copy` index. The
//! pipeline is single-threaded, but the interner is shared by reference
//! between passes, so interior mutability goes through a `parking_lot`
//! `RwLock`.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Interned string identifier.
///
/// A 32-bit index into the owning [`Interner`]. Two `Sym`s from the same
/// interner are equal exactly when their strings are equal.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct Sym(u32);

impl Sym {
    /// Pre-interned empty string.
    pub const EMPTY: Sym = Sym(0);

    /// Create from a raw index. Only meaningful for indices previously
    /// produced by the owning interner.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Sym(raw)
    }

    /// Raw index value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Debug for Sym {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sym({})", self.0)
    }
}

struct Inner {
    map: FxHashMap<&'static str, u32>,
    strings: Vec<&'static str>,
}

/// String interner.
///
/// Lookup returns `&'static str`: the backing storage is leaked, so
/// resolved names can be held across pass boundaries without borrowing
/// the interner.
pub struct Interner {
    inner: RwLock<Inner>,
}

impl Interner {
    /// Create a new interner with the empty string pre-interned at index 0.
    pub fn new() -> Self {
        let mut inner = Inner {
            map: FxHashMap::default(),
            strings: Vec::with_capacity(256),
        };
        inner.map.insert("", 0);
        inner.strings.push("");
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Intern a string, returning its symbol.
    pub fn intern(&self, s: &str) -> Sym {
        {
            let guard = self.inner.read();
            if let Some(&idx) = guard.map.get(s) {
                return Sym(idx);
            }
        }

        let mut guard = self.inner.write();
        // Re-check under the write lock.
        if let Some(&idx) = guard.map.get(s) {
            return Sym(idx);
        }
        let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
        let idx = u32::try_from(guard.strings.len()).unwrap_or(u32::MAX);
        guard.strings.push(leaked);
        guard.map.insert(leaked, idx);
        Sym(idx)
    }

    /// Resolve a symbol back to its string.
    pub fn lookup(&self, sym: Sym) -> &'static str {
        let guard = self.inner.read();
        guard.strings.get(sym.0 as usize).copied().unwrap_or("")
    }

    /// Number of interned strings.
    pub fn len(&self) -> usize {
        self.inner.read().strings.len()
    }

    /// True if only the empty string is interned.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn intern_is_idempotent() {
        let interner = Interner::new();
        let a = interner.intern("add_bits");
        let b = interner.intern("add_bits");
        assert_eq!(a, b);
        assert_eq!(interner.lookup(a), "add_bits");
    }

    #[test]
    fn distinct_strings_get_distinct_syms() {
        let interner = Interner::new();
        let a = interner.intern("x");
        let b = interner.intern("y");
        assert_ne!(a, b);
    }

    #[test]
    fn empty_string_is_pre_interned() {
        let interner = Interner::new();
        assert_eq!(interner.intern(""), Sym::EMPTY);
        assert_eq!(interner.lookup(Sym::EMPTY), "");
    }
}
