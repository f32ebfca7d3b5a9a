//! The target IR ("LIR"): linear imperative instructions over concretely
//! represented values.
//!
//! The IR compiler lowers normalized source expressions into [`Instr`]
//! sequences; the optimization passes rewrite them in place; the emitter
//! translates each instruction into one or more C statements.
//!
//! - [`Rep`] — runtime representation of a value
//! - [`NameId`] — a local name plus uniquing suffix, or one of the
//!   distinguished slots (return, exception state)
//! - [`Loc`] — left-values
//! - [`Val`] — right-value atoms (literals, ids, projections, inline calls)
//! - [`Instr`] / [`InstrKind`] — the instruction set
//! - [`LDef`] — lowered top-level definitions

use num_bigint::BigInt;

use crate::interner::Sym;
use crate::source::Order;
use crate::span::Span;

// ── Representations ─────────────────────────────────────────────────

/// Runtime representation of a value.
///
/// The type lowerer maps every source type to exactly one `Rep`; a local's
/// representation is never re-inferred after its declaration.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Rep {
    Unit,
    Bit,
    Bool,
    /// Heap-allocated string.
    String,
    /// Exact rational, heap-allocated.
    Real,
    /// Named enumeration with its ordered members.
    Enum(Sym, Vec<Sym>),
    /// Fixed-width signed integer, width ≤ 64.
    FInt(u32),
    /// Arbitrary-precision integer, heap-allocated.
    LInt,
    /// Fixed bit-vector of width ≤ 64.
    FBits(u32, Order),
    /// Small bit-vector: capacity ≤ 64, runtime length.
    SBits(u32, Order),
    /// Arbitrary-length bit-vector, heap-allocated.
    LBits(Order),
    Tup(Vec<Rep>),
    /// Named record with its ordered fields.
    Struct(Sym, Vec<(Sym, Rep)>),
    /// Named tagged union with its ordered constructors.
    Variant(Sym, Vec<(Sym, Rep)>),
    List(Box<Rep>),
    /// Growable vector of a non-bit element representation.
    Vector(Order, Box<Rep>),
    /// Register reference.
    Ref(Box<Rep>),
    /// Deferred polymorphic representation; must not survive
    /// variant specialization.
    Poly,
}

impl Rep {
    /// True if a value of this representation lives without heap
    /// allocation.
    ///
    /// Tuples and structs are stack-representable only when every field
    /// is; variants never are; references and deferred polymorphic
    /// placeholders always are.
    pub fn is_stack(&self) -> bool {
        match self {
            Rep::Unit | Rep::Bit | Rep::Bool | Rep::Enum(..) => true,
            Rep::FInt(_) | Rep::FBits(..) | Rep::SBits(..) => true,
            Rep::LInt | Rep::LBits(_) | Rep::String | Rep::Real => false,
            Rep::List(_) | Rep::Vector(..) => false,
            Rep::Tup(fields) => fields.iter().all(Rep::is_stack),
            Rep::Struct(_, fields) => fields.iter().all(|(_, r)| r.is_stack()),
            Rep::Variant(..) => false,
            Rep::Ref(_) | Rep::Poly => true,
        }
    }

    /// True if declaring a local of this representation requires an
    /// allocate/clear pair in generated code.
    pub fn is_heap(&self) -> bool {
        !self.is_stack()
    }

    /// Supremum in the representation lattice: the promotion applied by
    /// the variant specializer. Fixed-width forms go to their
    /// arbitrary-precision counterparts; compounds promote componentwise.
    pub fn supremum(&self) -> Rep {
        match self {
            Rep::FInt(_) => Rep::LInt,
            Rep::FBits(_, ord) | Rep::SBits(_, ord) => Rep::LBits(*ord),
            Rep::Tup(fields) => Rep::Tup(fields.iter().map(Rep::supremum).collect()),
            other => other.clone(),
        }
    }

    /// Canonical spelling of a representation, used to key deduplicated
    /// auxiliary type definitions and to encode specialization unifiers
    /// into constructor names.
    pub fn suffix(&self, interner: &crate::interner::Interner) -> String {
        match self {
            Rep::Unit => "unit".into(),
            Rep::Bit => "bit".into(),
            Rep::Bool => "bool".into(),
            Rep::String => "str".into(),
            Rep::Real => "real".into(),
            Rep::Enum(id, _) => format!("e_{}", crate::zencode::zencode(interner.lookup(*id))),
            Rep::FInt(n) => format!("i{n}"),
            Rep::LInt => "lint".into(),
            Rep::FBits(n, _) => format!("b{n}"),
            Rep::SBits(n, _) => format!("sb{n}"),
            Rep::LBits(_) => "lbits".into(),
            Rep::Tup(fields) => {
                let inner: Vec<String> = fields.iter().map(|r| r.suffix(interner)).collect();
                format!("tup_{}", inner.join("_"))
            }
            Rep::Struct(id, _) => format!("s_{}", crate::zencode::zencode(interner.lookup(*id))),
            Rep::Variant(id, _) => format!("u_{}", crate::zencode::zencode(interner.lookup(*id))),
            Rep::List(elem) => format!("list_{}", elem.suffix(interner)),
            Rep::Vector(_, elem) => format!("vec_{}", elem.suffix(interner)),
            Rep::Ref(elem) => format!("ref_{}", elem.suffix(interner)),
            Rep::Poly => "poly".into(),
        }
    }

    /// Visit every nested representation bottom-up, including `self`.
    pub fn map_nested(&mut self, f: &mut impl FnMut(&mut Rep)) {
        match self {
            Rep::Tup(fields) => {
                for r in fields {
                    r.map_nested(f);
                }
            }
            Rep::Struct(_, fields) | Rep::Variant(_, fields) => {
                for (_, r) in fields {
                    r.map_nested(f);
                }
            }
            Rep::List(elem) | Rep::Vector(_, elem) | Rep::Ref(elem) => elem.map_nested(f),
            _ => {}
        }
        f(self);
    }

    /// True if this representation mentions [`Rep::Poly`] anywhere.
    pub fn has_poly(&self) -> bool {
        match self {
            Rep::Poly => true,
            Rep::Tup(fields) => fields.iter().any(Rep::has_poly),
            Rep::Struct(_, fields) | Rep::Variant(_, fields) => {
                fields.iter().any(|(_, r)| r.has_poly())
            }
            Rep::List(elem) | Rep::Vector(_, elem) | Rep::Ref(elem) => elem.has_poly(),
            _ => false,
        }
    }
}

// ── Names ───────────────────────────────────────────────────────────

/// A name in the target IR.
///
/// `Name(sym, n)` is a source-origin local; `n` is the uniquing suffix
/// assigned by the unique-names pass (0 for the original binding). The
/// remaining variants are the distinguished slots addressable by
/// left-values.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NameId {
    Name(Sym, u32),
    /// The function-return slot.
    Return,
    /// The process-wide current-exception value.
    CurrentException,
    /// The process-wide exception-pending flag.
    HaveException,
    /// The process-wide source location of the pending exception.
    ThrowLocation,
}

impl NameId {
    pub fn name(sym: Sym) -> NameId {
        NameId::Name(sym, 0)
    }
}

// ── Values ──────────────────────────────────────────────────────────

/// Literal in the target IR.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum VLit {
    Unit,
    Bool(bool),
    Bit(bool),
    /// Integer that fits a machine word.
    Int(i64),
    /// Integer wider than 64 bits; initialized via its decimal spelling.
    Big(BigInt),
    /// Fixed bit-vector value with its width.
    Bits { bits: u64, len: u32 },
    /// Bit-vector wider than 64 bits; initialized from its binary
    /// spelling.
    BitsStr(String),
    String(String),
    Real(String),
}

/// Inline operator or known helper recognized by the emitter.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    // Boolean
    Not,
    And,
    Or,
    Eq,
    Neq,
    // Fixed integer
    Ilt,
    Ilteq,
    Igt,
    Igteq,
    Iadd,
    Isub,
    Ineg,
    // Fixed bit-vector
    Bnot,
    Band,
    Bor,
    Bxor,
    /// Add masked to the result width.
    Badd,
    Bsub,
    /// Single-bit access: `args = [vec, index]`.
    Baccess,
    /// `(UINT64_MAX >> (64 - len)) & (vec >> lo)`; `args = [vec, lo]`.
    Slice(u32),
    /// Slice of a small bit-vector to the given length.
    SSlice(u32),
    /// Append of two fixed bit-vectors; `args = [hi, lo]`, shift width is
    /// the width of `lo`.
    Concat(u32),
    ZeroExtend(u32),
    SignExtend(u32),
    /// Fixed bits to unsigned integer of the given source width.
    Unsigned(u32),
    /// Fixed bits to signed integer of the given source width.
    Signed(u32),
    /// Replicate a fixed bit-vector to the given result width.
    Replicate(u32),
    /// Overwrite a subrange of a fixed bit-vector;
    /// `args = [vec, hi, lo, value]`.
    UpdateSubrange,
    /// Small bit-vector equality helpers.
    EqSbits,
    NeqSbits,
}

/// A right-value atom.
///
/// Values never allocate: they are literals, reads of names, projections,
/// and calls of [`Op`] inline helpers over other values.
#[derive(Clone, Debug, PartialEq)]
pub enum Val {
    Lit(VLit, Rep),
    Id(NameId, Rep),
    Field(Box<Val>, Sym, Rep),
    Tuple(Box<Val>, usize, Rep),
    /// Tag test: true when the variant value was built by the given
    /// constructor.
    CtorKind(Box<Val>, Sym),
    /// Payload projection out of a variant value.
    CtorUnwrap(Box<Val>, Sym, Rep),
    Call(Op, Vec<Val>, Rep),
    /// Raw C fragment with a known representation.
    Raw(String, Rep),
}

impl Val {
    /// The representation of this value.
    pub fn rep(&self) -> Rep {
        match self {
            Val::Lit(_, r)
            | Val::Id(_, r)
            | Val::Field(_, _, r)
            | Val::Tuple(_, _, r)
            | Val::CtorUnwrap(_, _, r)
            | Val::Call(_, _, r)
            | Val::Raw(_, r) => r.clone(),
            Val::CtorKind(..) => Rep::Bool,
        }
    }

    /// Visit every [`NameId`] read by this value.
    pub fn each_id(&self, f: &mut impl FnMut(NameId)) {
        match self {
            Val::Lit(..) | Val::Raw(..) => {}
            Val::Id(id, _) => f(*id),
            Val::Field(inner, _, _)
            | Val::Tuple(inner, _, _)
            | Val::CtorKind(inner, _)
            | Val::CtorUnwrap(inner, _, _) => inner.each_id(f),
            Val::Call(_, args, _) => {
                for a in args {
                    a.each_id(f);
                }
            }
        }
    }

    /// Rewrite every representation mentioned by this value.
    pub fn map_reps(&mut self, f: &mut impl FnMut(&mut Rep)) {
        match self {
            Val::Lit(_, r) | Val::Id(_, r) | Val::Raw(_, r) => r.map_nested(f),
            Val::Field(inner, _, r)
            | Val::Tuple(inner, _, r)
            | Val::CtorUnwrap(inner, _, r) => {
                inner.map_reps(f);
                r.map_nested(f);
            }
            Val::CtorKind(inner, _) => inner.map_reps(f),
            Val::Call(_, args, r) => {
                for a in args {
                    a.map_reps(f);
                }
                r.map_nested(f);
            }
        }
    }

    /// Rewrite every [`NameId`] in this value.
    pub fn map_ids(&mut self, f: &mut impl FnMut(NameId) -> NameId) {
        match self {
            Val::Lit(..) | Val::Raw(..) => {}
            Val::Id(id, _) => *id = f(*id),
            Val::Field(inner, _, _)
            | Val::Tuple(inner, _, _)
            | Val::CtorKind(inner, _)
            | Val::CtorUnwrap(inner, _, _) => inner.map_ids(f),
            Val::Call(_, args, _) => {
                for a in args {
                    a.map_ids(f);
                }
            }
        }
    }
}

// ── Left-values ─────────────────────────────────────────────────────

/// An assignment target.
#[derive(Clone, Debug, PartialEq)]
pub enum Loc {
    Id(NameId, Rep),
    Field(Box<Loc>, Sym),
    Tuple(Box<Loc>, usize),
    /// Write through a pointer (heap-return slots).
    Addr(Box<Loc>),
}

impl Loc {
    /// The name at the root of this left-value path.
    pub fn base(&self) -> NameId {
        match self {
            Loc::Id(id, _) => *id,
            Loc::Field(inner, _) | Loc::Tuple(inner, _) | Loc::Addr(inner) => inner.base(),
        }
    }

    /// Rewrite the base [`NameId`] of this left-value.
    pub fn map_ids(&mut self, f: &mut impl FnMut(NameId) -> NameId) {
        match self {
            Loc::Id(id, _) => *id = f(*id),
            Loc::Field(inner, _) | Loc::Tuple(inner, _) | Loc::Addr(inner) => inner.map_ids(f),
        }
    }

    /// Rewrite every representation mentioned by this left-value.
    pub fn map_reps(&mut self, f: &mut impl FnMut(&mut Rep)) {
        match self {
            Loc::Id(_, r) => r.map_nested(f),
            Loc::Field(inner, _) | Loc::Tuple(inner, _) | Loc::Addr(inner) => inner.map_reps(f),
        }
    }
}

// ── Instructions ────────────────────────────────────────────────────

/// Call target of an [`InstrKind::Call`].
#[derive(Clone, Debug, PartialEq)]
pub enum CallTarget {
    /// A declared Lira function (possibly extern-bound; the emitter
    /// resolves the binding).
    Fn(Sym),
    /// A variant constructor: `(variant id, constructor id)`.
    Ctor(Sym, Sym),
    /// A runtime helper called by its literal C name.
    Rt(&'static str),
}

/// A single target-IR instruction.
#[derive(Clone, Debug, PartialEq)]
pub struct Instr {
    pub kind: InstrKind,
    pub span: Span,
}

impl Instr {
    pub fn new(kind: InstrKind) -> Instr {
        Instr {
            kind,
            span: Span::DUMMY,
        }
    }

    pub fn with_span(kind: InstrKind, span: Span) -> Instr {
        Instr { kind, span }
    }
}

/// The instruction set.
#[derive(Clone, Debug, PartialEq)]
pub enum InstrKind {
    /// Declare a local. Heap representations allocate here.
    Decl(Rep, NameId),
    /// Declare and initialize in one step.
    Init(Rep, NameId, Val),
    /// Assign; deep-copies heap representations.
    Copy(Loc, Val),
    /// Call with a structured destination.
    Call(Loc, CallTarget, Vec<Val>),
    /// Structured branch; the representation is that of the value both
    /// arms assign.
    If(Val, Vec<Instr>, Vec<Instr>, Rep),
    Goto(String),
    Block(Vec<Instr>),
    /// Block in which thrown exceptions transfer to the enclosing
    /// handler label.
    TryBlock(Vec<Instr>),
    /// Conditional goto: taken when the value is true.
    Jump(Val, String),
    /// Release a heap-represented local.
    Clear(Rep, NameId),
    /// Re-initialize an already-allocated local.
    Reset(Rep, NameId),
    /// Shallow aliasing assignment (no deep copy).
    Alias(Loc, Val),
    Return(Val),
    /// Marks the function end position for a heap-returning function.
    End(NameId),
    /// Raised when no match arm applies.
    MatchFailure,
    Comment(String),
    Raw(String),
    Label(String),
}

impl InstrKind {
    /// Visit every value read by this instruction, recursing into nested
    /// instruction lists.
    pub fn each_val(&self, f: &mut impl FnMut(&Val)) {
        match self {
            InstrKind::Init(_, _, v)
            | InstrKind::Copy(_, v)
            | InstrKind::Alias(_, v)
            | InstrKind::Jump(v, _)
            | InstrKind::Return(v) => f(v),
            InstrKind::Call(_, _, args) => {
                for a in args {
                    f(a);
                }
            }
            InstrKind::If(cond, then_is, else_is, _) => {
                f(cond);
                for i in then_is.iter().chain(else_is) {
                    i.kind.each_val(f);
                }
            }
            InstrKind::Block(is) | InstrKind::TryBlock(is) => {
                for i in is {
                    i.kind.each_val(f);
                }
            }
            _ => {}
        }
    }

    /// Rewrite every [`NameId`] in this instruction, recursing into
    /// nested instruction lists.
    pub fn map_ids(&mut self, f: &mut impl FnMut(NameId) -> NameId) {
        match self {
            InstrKind::Decl(_, id) | InstrKind::Clear(_, id) | InstrKind::Reset(_, id) => {
                *id = f(*id);
            }
            InstrKind::Init(_, id, v) => {
                *id = f(*id);
                v.map_ids(f);
            }
            InstrKind::Copy(loc, v) | InstrKind::Alias(loc, v) => {
                loc.map_ids(f);
                v.map_ids(f);
            }
            InstrKind::Call(loc, _, args) => {
                loc.map_ids(f);
                for a in args {
                    a.map_ids(f);
                }
            }
            InstrKind::If(cond, then_is, else_is, _) => {
                cond.map_ids(f);
                for i in then_is.iter_mut().chain(else_is) {
                    i.kind.map_ids(f);
                }
            }
            InstrKind::Block(is) | InstrKind::TryBlock(is) => {
                for i in is {
                    i.kind.map_ids(f);
                }
            }
            InstrKind::Jump(v, _) | InstrKind::Return(v) => v.map_ids(f),
            InstrKind::End(id) => *id = f(*id),
            InstrKind::Goto(_)
            | InstrKind::MatchFailure
            | InstrKind::Comment(_)
            | InstrKind::Raw(_)
            | InstrKind::Label(_) => {}
        }
    }

    /// Rewrite every representation mentioned by this instruction,
    /// recursing into nested instruction lists.
    pub fn map_reps(&mut self, f: &mut impl FnMut(&mut Rep)) {
        match self {
            InstrKind::Decl(r, _) | InstrKind::Clear(r, _) | InstrKind::Reset(r, _) => {
                r.map_nested(f);
            }
            InstrKind::Init(r, _, v) => {
                r.map_nested(f);
                v.map_reps(f);
            }
            InstrKind::Copy(loc, v) | InstrKind::Alias(loc, v) => {
                loc.map_reps(f);
                v.map_reps(f);
            }
            InstrKind::Call(loc, _, args) => {
                loc.map_reps(f);
                for a in args {
                    a.map_reps(f);
                }
            }
            InstrKind::If(cond, then_is, else_is, r) => {
                cond.map_reps(f);
                for i in then_is.iter_mut().chain(else_is) {
                    i.kind.map_reps(f);
                }
                r.map_nested(f);
            }
            InstrKind::Block(is) | InstrKind::TryBlock(is) => {
                for i in is {
                    i.kind.map_reps(f);
                }
            }
            InstrKind::Jump(v, _) | InstrKind::Return(v) => v.map_reps(f),
            InstrKind::Goto(_)
            | InstrKind::End(_)
            | InstrKind::MatchFailure
            | InstrKind::Comment(_)
            | InstrKind::Raw(_)
            | InstrKind::Label(_) => {}
        }
    }

    /// The name declared by this instruction, if any.
    pub fn declared(&self) -> Option<NameId> {
        match self {
            InstrKind::Decl(_, id) | InstrKind::Init(_, id, _) => Some(*id),
            _ => None,
        }
    }
}

// ── Lowered definitions ─────────────────────────────────────────────

/// A lowered type definition, ready for emission.
#[derive(Clone, Debug, PartialEq)]
pub enum LTypeDef {
    Struct { id: Sym, fields: Vec<(Sym, Rep)> },
    Variant { id: Sym, ctors: Vec<(Sym, Rep)> },
    Enum { id: Sym, members: Vec<Sym> },
}

impl LTypeDef {
    pub fn id(&self) -> Sym {
        match self {
            LTypeDef::Struct { id, .. }
            | LTypeDef::Variant { id, .. }
            | LTypeDef::Enum { id, .. } => *id,
        }
    }
}

/// How a function returns its result.
#[derive(Clone, Debug, PartialEq)]
pub enum RetKind {
    /// Returned by value.
    Stack(Rep),
    /// Written through a caller-provided pointer passed as the first
    /// parameter.
    Heap(Rep),
}

impl RetKind {
    pub fn rep(&self) -> &Rep {
        match self {
            RetKind::Stack(r) | RetKind::Heap(r) => r,
        }
    }
}

/// A lowered function.
#[derive(Clone, Debug, PartialEq)]
pub struct LFn {
    pub id: Sym,
    pub params: Vec<(NameId, Rep)>,
    pub ret: RetKind,
    pub body: Vec<Instr>,
    pub span: Span,
}

/// A lowered register.
#[derive(Clone, Debug, PartialEq)]
pub struct LRegister {
    pub id: Sym,
    pub rep: Rep,
    /// Instructions run inside `model_init` to set the initial value.
    pub init: Vec<Instr>,
}

/// A lowered top-level let binding.
#[derive(Clone, Debug, PartialEq)]
pub struct LLet {
    pub id: Sym,
    pub rep: Rep,
    pub setup: Vec<Instr>,
    pub teardown: Vec<Instr>,
}

/// A lowered top-level definition.
#[derive(Clone, Debug, PartialEq)]
pub enum LDef {
    Type(LTypeDef),
    Fn(LFn),
    Register(LRegister),
    Let(LLet),
}
