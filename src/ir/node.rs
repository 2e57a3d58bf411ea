//! Nodes, operations and their input layouts.
//!
//! A node is an operation plus an ordered list of inputs. The slot of an input
//! defines its role:
//!
//! | Operation | Inputs |
//! |-----------|--------|
//! | `Start`, `Top`, `ConI(c)` | none |
//! | `Root` | sinks (`Return`, `Trap`) |
//! | `Region` | control predecessors |
//! | `Loop` | `[entry, backedge]` |
//! | `If`, `RangeCheck` | `[ctrl, cond]` |
//! | `IfTrue`, `IfFalse` | `[if]` |
//! | `Return` | `[ctrl, mem, value]` |
//! | `Trap` | `[ctrl, mem]` |
//! | `Parm(i)`, `InitMem` | `[start]` |
//! | integer binary ops, `CmpI`, `CmpU` | `[a, b]` |
//! | `Phi` | `[region, v1 .. vn]`, one value per region predecessor |
//! | `CastII` | `[ctrl, value]` |
//! | `Load` | `[ctrl, mem, index]` |
//! | `Store` | `[ctrl, mem, index, value]` |
//! | `MergeMem` | `[base, slice1 .. slicen]`, one slice per listed alias class |
//!
//! Users are never owned by a node; the graph keeps a def-use index next to the
//! arena.

use std::fmt;

use bitflags::bitflags;
use smallvec::SmallVec;
use strum::{Display, EnumDiscriminants, EnumIter};

use crate::ir::{
    alias::{AliasIdx, MemAccess},
    types::{Type, TypeInt},
};

/// Stable identity of a node: its index in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Creates a node id from a raw arena index.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the arena index.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Condition tested by a comparison node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum CmpTest {
    /// `a == b`
    Eq,
    /// `a != b`
    Ne,
    /// `a < b`
    Lt,
    /// `a <= b`
    Le,
    /// `a > b`
    Gt,
    /// `a >= b`
    Ge,
}

impl CmpTest {
    /// The test that holds exactly when `self` does not.
    #[must_use]
    pub const fn negate(self) -> Self {
        match self {
            Self::Eq => Self::Ne,
            Self::Ne => Self::Eq,
            Self::Lt => Self::Ge,
            Self::Le => Self::Gt,
            Self::Gt => Self::Le,
            Self::Ge => Self::Lt,
        }
    }

    /// The test to use when the operands are swapped.
    #[must_use]
    pub const fn commute(self) -> Self {
        match self {
            Self::Eq => Self::Eq,
            Self::Ne => Self::Ne,
            Self::Lt => Self::Gt,
            Self::Le => Self::Ge,
            Self::Gt => Self::Lt,
            Self::Ge => Self::Le,
        }
    }

    /// Evaluates the test on widened operands.
    #[must_use]
    pub fn eval(self, a: i64, b: i64) -> bool {
        match self {
            Self::Eq => a == b,
            Self::Ne => a != b,
            Self::Lt => a < b,
            Self::Le => a <= b,
            Self::Gt => a > b,
            Self::Ge => a >= b,
        }
    }

    /// Evaluates the test with signed semantics.
    #[must_use]
    pub fn eval_signed(self, a: i32, b: i32) -> bool {
        self.eval(i64::from(a), i64::from(b))
    }

    /// Evaluates the test with unsigned semantics.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn eval_unsigned(self, a: i32, b: i32) -> bool {
        self.eval(i64::from(a as u32), i64::from(b as u32))
    }
}

/// Why execution leaves optimized code at a `Trap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TrapReason {
    /// An array index was out of bounds.
    RangeCheck,
    /// A null reference was dereferenced.
    NullCheck,
    /// A path the profile never saw was taken.
    Unstable,
    /// Code the front end considers unreachable.
    Unreached,
}

/// What a phi merges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhiKind {
    /// Integer values.
    Value,
    /// Memory of one alias class (Bottom for all memory).
    Memory(AliasIdx),
}

impl fmt::Display for PhiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value => write!(f, "int"),
            Self::Memory(alias) => write!(f, "{alias}"),
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Transformation history of a loop header.
    pub struct LoopFlags: u16 {
        /// Recognized as a counted loop at least once
        const COUNTED = 0x0001;
        /// Outer loop of a strip-mined pair
        const STRIP_MINED_OUTER = 0x0002;
        /// Inner loop of a strip-mined pair
        const STRIP_MINED_INNER = 0x0004;
        /// One iteration was peeled off
        const PEELED = 0x0008;
        /// The body was duplicated once
        const UNROLLED = 0x0010;
        /// One of the two copies produced by unswitching
        const UNSWITCHED = 0x0020;
        /// Range checks were eliminated
        const RCE_DONE = 0x0040;
    }
}

impl LoopFlags {
    /// Returns `true` for either loop of a strip-mined pair.
    #[must_use]
    pub fn is_strip_mined(&self) -> bool {
        self.intersects(Self::STRIP_MINED_OUTER | Self::STRIP_MINED_INNER)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Per-node state bits.
    pub struct NodeFlags: u8 {
        /// The node was killed and its slot is garbage
        const DEAD = 0x01;
    }
}

/// An operation, with its compile-time parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumDiscriminants)]
#[strum_discriminants(
    name(OpKind),
    derive(Hash, Display, EnumIter),
    doc = "The kind of an [`Op`], without its parameters."
)]
pub enum Op {
    /// Method entry.
    Start,
    /// Anchor of liveness; inputs are the method's sinks.
    Root,
    /// The single node standing for every dead value and dead path.
    Top,
    /// Control merge.
    Region,
    /// Loop header: a merge of the entry and one backedge.
    Loop(LoopFlags),
    /// Two-way branch on `cond != 0`.
    If,
    /// A bounds check branch; the false projection leads to a range-check trap.
    RangeCheck,
    /// Taken side of an `If` or `RangeCheck`.
    IfTrue,
    /// Not-taken side of an `If` or `RangeCheck`.
    IfFalse,
    /// Normal method exit.
    Return,
    /// Exit to the unoptimized tier.
    Trap(TrapReason),
    /// Incoming argument.
    Parm(u32),
    /// Memory state on entry.
    InitMem,
    /// Integer constant.
    ConI(i32),
    /// Wrapping addition.
    AddI,
    /// Wrapping subtraction.
    SubI,
    /// Wrapping multiplication.
    MulI,
    /// Bitwise and.
    AndI,
    /// Bitwise or.
    OrI,
    /// Bitwise xor.
    XorI,
    /// Left shift; the count is masked to 5 bits.
    LShiftI,
    /// Arithmetic right shift; the count is masked to 5 bits.
    RShiftI,
    /// Logical right shift; the count is masked to 5 bits.
    URShiftI,
    /// Signed minimum.
    MinI,
    /// Signed maximum.
    MaxI,
    /// Signed comparison producing `0` or `1`.
    CmpI(CmpTest),
    /// Unsigned comparison producing `0` or `1`.
    CmpU(CmpTest),
    /// Control-dependent value or memory merge.
    Phi(PhiKind),
    /// A value narrowed to a range by a dominating test.
    CastII(TypeInt),
    /// Memory read.
    Load(MemAccess),
    /// Memory write.
    Store(MemAccess),
    /// Full memory assembled from a base and per-class slices.
    MergeMem(SmallVec<[AliasIdx; 4]>),
}

impl Op {
    /// Returns `true` for nodes that are part of the control skeleton.
    #[must_use]
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Self::Start
                | Self::Root
                | Self::Region
                | Self::Loop(_)
                | Self::If
                | Self::RangeCheck
                | Self::IfTrue
                | Self::IfFalse
                | Self::Return
                | Self::Trap(_)
        )
    }

    /// Returns `true` for `Region` and `Loop`.
    #[must_use]
    pub fn is_merge(&self) -> bool {
        matches!(self, Self::Region | Self::Loop(_))
    }

    /// Returns `true` for `If` and `RangeCheck`.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(self, Self::If | Self::RangeCheck)
    }

    /// Returns `true` for branch projections.
    #[must_use]
    pub fn is_proj(&self) -> bool {
        matches!(self, Self::IfTrue | Self::IfFalse)
    }

    /// Returns `true` for method exits.
    #[must_use]
    pub fn is_sink(&self) -> bool {
        matches!(self, Self::Return | Self::Trap(_))
    }

    /// Returns `true` if input slot 0 is a control edge.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        matches!(
            self,
            Self::If
                | Self::RangeCheck
                | Self::IfTrue
                | Self::IfFalse
                | Self::Return
                | Self::Trap(_)
                | Self::Parm(_)
                | Self::InitMem
                | Self::Phi(_)
                | Self::CastII(_)
                | Self::Load(_)
                | Self::Store(_)
        )
    }

    /// Returns `true` for pinned data nodes (not part of the control skeleton).
    #[must_use]
    pub fn is_pinned_data(&self) -> bool {
        self.is_pinned() && !self.is_control()
    }

    /// Returns `true` if the operands may be swapped freely.
    #[must_use]
    pub fn is_commutative(&self) -> bool {
        matches!(
            self,
            Self::AddI | Self::MulI | Self::AndI | Self::OrI | Self::XorI | Self::MinI | Self::MaxI
        )
    }

    /// Returns `true` for the shift operations.
    #[must_use]
    pub fn is_shift(&self) -> bool {
        matches!(self, Self::LShiftI | Self::RShiftI | Self::URShiftI)
    }

    /// Returns `true` for two-operand integer arithmetic.
    #[must_use]
    pub fn is_int_binary(&self) -> bool {
        matches!(
            self,
            Self::AddI
                | Self::SubI
                | Self::MulI
                | Self::AndI
                | Self::OrI
                | Self::XorI
                | Self::LShiftI
                | Self::RShiftI
                | Self::URShiftI
                | Self::MinI
                | Self::MaxI
        )
    }

    /// Returns `true` for `CmpI` and `CmpU`.
    #[must_use]
    pub fn is_cmp(&self) -> bool {
        matches!(self, Self::CmpI(_) | Self::CmpU(_))
    }

    /// Returns `true` for nodes producing a memory state.
    #[must_use]
    pub fn is_memory(&self) -> bool {
        matches!(
            self,
            Self::InitMem | Self::Store(_) | Self::MergeMem(_) | Self::Phi(PhiKind::Memory(_))
        )
    }

    /// Returns `true` for nodes that may be deduplicated by (operation, inputs).
    #[must_use]
    pub fn is_hashable(&self) -> bool {
        matches!(
            self,
            Self::ConI(_)
                | Self::Parm(_)
                | Self::InitMem
                | Self::Phi(_)
                | Self::CastII(_)
                | Self::Load(_)
                | Self::MergeMem(_)
        ) || self.is_int_binary()
            || self.is_cmp()
    }

    /// Number of inputs for fixed-arity operations.
    #[must_use]
    pub fn arity(&self) -> Option<usize> {
        match self {
            Self::Start | Self::Top | Self::ConI(_) => Some(0),
            Self::IfTrue | Self::IfFalse | Self::Parm(_) | Self::InitMem => Some(1),
            Self::Loop(_) | Self::If | Self::RangeCheck | Self::Trap(_) | Self::CastII(_) => Some(2),
            Self::Return | Self::Load(_) => Some(3),
            Self::Store(_) => Some(4),
            Self::MergeMem(aliases) => Some(aliases.len() + 1),
            op if op.is_int_binary() || op.is_cmp() => Some(2),
            _ => None,
        }
    }

    /// The most conservative type a node of this operation can have.
    ///
    /// New nodes start here and only ever narrow.
    #[must_use]
    pub fn bottom_type(&self) -> Type {
        match self {
            Self::Top => Type::Top,
            Self::ConI(c) => Type::con(*c),
            Self::CmpI(_) | Self::CmpU(_) => Type::BOOL,
            Self::CastII(range) => Type::Int(*range),
            Self::Phi(PhiKind::Memory(_)) | Self::InitMem | Self::Store(_) | Self::MergeMem(_) => {
                Type::Memory
            }
            op if op.is_control() => Type::Control,
            _ => Type::INT,
        }
    }

    /// Alias class of a memory operation or memory phi.
    #[must_use]
    pub fn alias(&self) -> Option<AliasIdx> {
        match self {
            Self::Load(access) | Self::Store(access) => Some(access.alias),
            Self::Phi(PhiKind::Memory(alias)) => Some(*alias),
            Self::InitMem | Self::MergeMem(_) => Some(AliasIdx::BOTTOM),
            _ => None,
        }
    }

    /// Returns the kind discriminant.
    #[must_use]
    pub fn kind(&self) -> OpKind {
        self.into()
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind();
        match self {
            Self::Loop(flags) if !flags.is_empty() => write!(f, "{kind}({flags:?})"),
            Self::Trap(reason) => write!(f, "{kind}({reason})"),
            Self::Parm(i) => write!(f, "{kind}({i})"),
            Self::ConI(c) => write!(f, "{kind}({c})"),
            Self::CmpI(test) | Self::CmpU(test) => write!(f, "{kind}({test})"),
            Self::Phi(phi) => write!(f, "{kind}({phi})"),
            Self::CastII(range) => write!(f, "{kind}({range})"),
            Self::Load(access) | Self::Store(access) => write!(f, "{kind}({access})"),
            Self::MergeMem(aliases) => {
                write!(f, "{kind}(")?;
                for (i, alias) in aliases.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{alias}")?;
                }
                write!(f, ")")
            }
            _ => write!(f, "{kind}"),
        }
    }
}

/// Inline storage for node inputs; most nodes have at most four.
pub type Inputs = SmallVec<[NodeId; 4]>;

/// A node in the graph arena.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) op: Op,
    pub(crate) inputs: Inputs,
    pub(crate) ty: Type,
    pub(crate) flags: NodeFlags,
    pub(crate) users: Vec<NodeId>,
}

impl Node {
    pub(crate) fn new(op: Op, inputs: Inputs) -> Self {
        let ty = op.bottom_type();
        Self {
            op,
            inputs,
            ty,
            flags: NodeFlags::empty(),
            users: Vec::new(),
        }
    }

    /// The operation.
    #[must_use]
    pub fn op(&self) -> &Op {
        &self.op
    }

    /// Ordered inputs.
    #[must_use]
    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    /// Users, one entry per edge.
    #[must_use]
    pub fn users(&self) -> &[NodeId] {
        &self.users
    }

    /// Cached type.
    #[must_use]
    pub fn ty(&self) -> Type {
        self.ty
    }

    /// Returns `true` once the node was killed.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.flags.contains(NodeFlags::DEAD)
    }
}
