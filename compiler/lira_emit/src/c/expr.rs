//! Right-value atoms to C expression text.

use lira_ir::lir::{NameId, Op, Rep, VLit, Val};
use lira_ir::{zencode, Interner};

/// Spelled name of a target-IR name.
///
/// Uniquing suffixes render as `z__{n}`; the `z_` pair cannot occur at
/// that position in a z-encoded identifier, so generated suffixes never
/// collide with user names. The distinguished slots use a `lira_`
/// prefix, which is outside the z-encoded image entirely.
pub fn name(id: NameId, interner: &Interner) -> String {
    match id {
        NameId::Name(sym, 0) => zencode(interner.lookup(sym)),
        NameId::Name(sym, n) => format!("{}z__{n}", zencode(interner.lookup(sym))),
        NameId::Return => "lira_ret".into(),
        NameId::CurrentException => "lira_current_exception".into(),
        NameId::HaveException => "lira_have_exception".into(),
        NameId::ThrowLocation => "lira_throw_location".into(),
    }
}

fn c_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Literal text. Arbitrary-precision literals have no inline C form;
/// assignment sites route them through string conversion instead.
pub fn lit(l: &VLit) -> String {
    match l {
        VLit::Unit => "UNIT".into(),
        VLit::Bool(true) => "true".into(),
        VLit::Bool(false) => "false".into(),
        VLit::Bit(true) => "UINT64_C(1)".into(),
        VLit::Bit(false) => "UINT64_C(0)".into(),
        VLit::Int(n) => format!("INT64_C({n})"),
        VLit::Bits { bits, .. } => format!("UINT64_C(0x{bits:X})"),
        VLit::Big(n) => c_string(&n.to_string()),
        VLit::BitsStr(s) => c_string(s),
        VLit::String(s) => c_string(s),
        VLit::Real(s) => c_string(s),
    }
}

/// Render a right-value atom.
pub fn cval(val: &Val, interner: &Interner) -> String {
    match val {
        Val::Lit(l, _) => lit(l),
        Val::Id(id, _) => name(*id, interner),
        Val::Field(obj, field, _) => {
            format!("{}.{}", cval(obj, interner), zencode(interner.lookup(*field)))
        }
        Val::Tuple(obj, i, _) => format!("{}.ztup{i}", cval(obj, interner)),
        Val::CtorKind(obj, ctor) => format!(
            "({}).kind == Kind_{}",
            cval(obj, interner),
            zencode(interner.lookup(*ctor))
        ),
        Val::CtorUnwrap(obj, ctor, _) => format!(
            "({}).variants.{}",
            cval(obj, interner),
            zencode(interner.lookup(*ctor))
        ),
        Val::Call(op, args, rep) => cop(*op, args, rep, interner),
        Val::Raw(text, _) => text.clone(),
    }
}

/// Bit mask for the low `n` bits of a 64-bit word.
fn mask(n: u32) -> String {
    if n >= 64 {
        "UINT64_MAX".into()
    } else {
        format!("UINT64_C(0x{:X})", (1u64 << n) - 1)
    }
}

fn cop(op: Op, args: &[Val], rep: &Rep, interner: &Interner) -> String {
    let a = |i: usize| cval(&args[i], interner);
    match op {
        Op::Not => format!("!({})", a(0)),
        Op::And => format!("({} && {})", a(0), a(1)),
        Op::Or => format!("({} || {})", a(0), a(1)),
        Op::Eq => format!("({} == {})", a(0), a(1)),
        Op::Neq => format!("({} != {})", a(0), a(1)),
        Op::Ilt => format!("({} < {})", a(0), a(1)),
        Op::Ilteq => format!("({} <= {})", a(0), a(1)),
        Op::Igt => format!("({} > {})", a(0), a(1)),
        Op::Igteq => format!("({} >= {})", a(0), a(1)),
        Op::Iadd => format!("({} + {})", a(0), a(1)),
        Op::Isub => format!("({} - {})", a(0), a(1)),
        Op::Ineg => format!("(-{})", a(0)),
        Op::Bnot => match rep {
            Rep::FBits(n, _) => format!("(~({}) & {})", a(0), mask(*n)),
            _ => format!("(~({}))", a(0)),
        },
        Op::Band => format!("({} & {})", a(0), a(1)),
        Op::Bor => format!("({} | {})", a(0), a(1)),
        Op::Bxor => format!("({} ^ {})", a(0), a(1)),
        // Additive operations mask back to the result width.
        Op::Badd => match rep {
            Rep::FBits(n, _) => format!("(({} + {}) & {})", a(0), a(1), mask(*n)),
            _ => format!("({} + {})", a(0), a(1)),
        },
        Op::Bsub => match rep {
            Rep::FBits(n, _) => format!("(({} - {}) & {})", a(0), a(1), mask(*n)),
            _ => format!("({} - {})", a(0), a(1)),
        },
        Op::Baccess => format!("(({} >> {}) & UINT64_C(1))", a(0), a(1)),
        Op::Slice(len) => format!(
            "((UINT64_MAX >> (64 - {len})) & ({} >> {}))",
            a(0),
            a(1)
        ),
        Op::SSlice(len) => format!("sslice({}, {}, {len})", a(0), a(1)),
        Op::Concat(shift) => format!("(({} << {shift}) | {})", a(0), a(1)),
        // Zero extension of a fixed source is the identity; a small
        // source just drops its length word.
        Op::ZeroExtend(_) => match args[0].rep() {
            Rep::SBits(..) => format!("({}).bits", a(0)),
            _ => format!("({})", a(0)),
        },
        Op::SignExtend(m) => match args[0].rep() {
            Rep::FBits(n, _) => format!("fast_sign_extend({}, {n}, {m})", a(0)),
            _ => format!("fast_sign_extend2({}, {m})", a(0)),
        },
        Op::Unsigned(_) => format!("((int64_t)({}))", a(0)),
        Op::Signed(n) => format!("fast_signed({}, {n})", a(0)),
        Op::Replicate(total) => match args[0].rep() {
            Rep::FBits(n, _) if n > 0 => {
                format!("fast_replicate_bits({}, {n}, {})", a(0), total / n)
            }
            _ => format!("fast_replicate_bits({}, 1, {total})", a(0)),
        },
        Op::UpdateSubrange => format!(
            "fast_update_subrange({}, {}, {}, {})",
            a(0),
            a(1),
            a(2),
            a(3)
        ),
        Op::EqSbits => format!("eq_sbits({}, {})", a(0), a(1)),
        Op::NeqSbits => format!("neq_sbits({}, {})", a(0), a(1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lira_ir::source::Order;
    use pretty_assertions::assert_eq;

    fn id(interner: &Interner, s: &str, rep: Rep) -> Val {
        Val::Id(NameId::name(interner.intern(s)), rep)
    }

    #[test]
    fn masked_add_spells_the_expected_pattern() {
        let interner = Interner::new();
        let x = id(&interner, "x", Rep::FBits(32, Order::Dec));
        let y = id(&interner, "y", Rep::FBits(32, Order::Dec));
        let v = Val::Call(Op::Badd, vec![x, y], Rep::FBits(32, Order::Dec));
        assert_eq!(cval(&v, &interner), "((zx + zy) & UINT64_C(0xFFFFFFFF))");
    }

    #[test]
    fn slice_spells_the_mask_shift_pattern() {
        let interner = Interner::new();
        let v = Val::Call(
            Op::Slice(8),
            vec![
                id(&interner, "v", Rep::FBits(32, Order::Dec)),
                Val::Lit(VLit::Int(4), Rep::FInt(64)),
            ],
            Rep::FBits(8, Order::Dec),
        );
        assert_eq!(
            cval(&v, &interner),
            "((UINT64_MAX >> (64 - 8)) & (zv >> INT64_C(4)))"
        );
    }

    #[test]
    fn append_spells_shift_or() {
        let interner = Interner::new();
        let v = Val::Call(
            Op::Concat(20),
            vec![
                id(&interner, "v1", Rep::FBits(40, Order::Dec)),
                id(&interner, "v2", Rep::FBits(20, Order::Dec)),
            ],
            Rep::FBits(60, Order::Dec),
        );
        assert_eq!(cval(&v, &interner), "((zv1 << 20) | zv2)");
    }

    #[test]
    fn unique_suffixes_do_not_collide_with_user_names() {
        let interner = Interner::new();
        let shadowed = name(
            NameId::Name(interner.intern("x"), 1),
            &interner,
        );
        let literal = name(
            NameId::name(interner.intern("xz__1")),
            &interner,
        );
        assert_ne!(shadowed, literal);
    }

    #[test]
    fn ctor_kind_test_spells_a_tag_compare() {
        let interner = Interner::new();
        let exc = Rep::Variant(interner.intern("exception"), Vec::new());
        let v = Val::CtorKind(
            Box::new(Val::Id(NameId::CurrentException, exc)),
            interner.intern("Error"),
        );
        assert_eq!(
            cval(&v, &interner),
            "(lira_current_exception).kind == Kind_zError"
        );
    }
}
