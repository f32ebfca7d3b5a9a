//! Deterministic escaping of source identifiers into the C identifier
//! space.
//!
//! Every user-origin identifier in the generated text is spelled as its
//! z-encoded form: a `z` prefix, ASCII alphanumerics and `_` passed
//! through, a literal `z` doubled, and every other character escaped as
//! `z` followed by two uppercase hex digits. Doubling the literal `z`
//! keeps the encoding injective for ASCII identifiers: a single `z` in
//! the output is always an escape lead.

use std::fmt::Write;

/// Z-encode an identifier.
pub fn zencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 1);
    out.push('z');
    for c in s.chars() {
        match c {
            'z' => out.push_str("zz"),
            c if c.is_ascii_alphanumeric() || c == '_' => out.push(c),
            c => {
                let _ = write!(out, "z{:02X}", c as u32);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn passthrough_identifiers_get_prefixed() {
        assert_eq!(zencode("main"), "zmain");
        assert_eq!(zencode("add_bits"), "zadd_bits");
    }

    #[test]
    fn literal_z_is_doubled() {
        assert_eq!(zencode("zero"), "zzzero");
    }

    #[test]
    fn punctuation_is_escaped() {
        assert_eq!(zencode("PC'"), "zPCz27");
        assert_eq!(zencode("a#b"), "zaz23b");
    }

    #[test]
    fn encoding_is_injective_on_tricky_pairs() {
        assert_ne!(zencode("z7F"), zencode("\u{7f}"));
    }
}
