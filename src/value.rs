//! The value graph: the arena-indexed representation described in the
//! DESIGN NOTES ("Cyclic value graphs"). Every IR node is a [`Value`]
//! living in exactly one [`crate::method::MethodBuilder`]'s arena;
//! operands are [`ValueId`]s rather than pointers, so replacement is a
//! redirection-table lookup and the graph can be cyclic (phis referencing
//! values that reference phis) without any reference counting.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::kinds::{ArithmeticFlags, BinaryArithKind, CompareFlags, CompareKind, TernaryArithKind, UnaryArithKind};
use crate::location::Location;
use crate::types::TypeId;

/// A method handle, stable within one [`crate::context::IrContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodId(pub(crate) u32);

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@m{}", self.0)
    }
}

/// A value handle, tagged with the generation of the builder that
/// produced it so stale ids from a previous (disposed) builder generation
/// cannot silently alias a new one (DATA MODEL, "Generation").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueId {
    pub(crate) generation: u32,
    pub(crate) index: u32,
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}.{}", self.generation, self.index)
    }
}

/// A basic block handle, same generation-tagging discipline as [`ValueId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId {
    pub(crate) generation: u32,
    pub(crate) index: u32,
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}.{}", self.generation, self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ConstantValue {
    Int(i64),
    Float(f64),
}

impl Eq for ConstantValue {}

impl std::hash::Hash for ConstantValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            ConstantValue::Int(i) => {
                0u8.hash(state);
                i.hash(state);
            }
            ConstantValue::Float(f) => {
                1u8.hash(state);
                f.to_bits().hash(state);
            }
        }
    }
}

impl ConstantValue {
    pub fn as_i64(self) -> Option<i64> {
        match self {
            ConstantValue::Int(i) => Some(i),
            ConstantValue::Float(_) => None,
        }
    }

    pub fn as_f64(self) -> Option<f64> {
        match self {
            ConstantValue::Float(f) => Some(f),
            ConstantValue::Int(_) => None,
        }
    }
}

impl fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantValue::Int(i) => write!(f, "{i}"),
            ConstantValue::Float(x) => write!(f, "{x}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AtomicKind {
    Add,
    Sub,
    Exchange,
    Min,
    Max,
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarrierKind {
    Local,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShuffleKind {
    Idx,
    Up,
    Down,
    Xor,
}

/// The tagged sum over every value kind the Construction API can produce.
/// A closed set by design (DESIGN NOTES, "Open-hierarchy value kinds with
/// virtual dispatch"): fold/rebuild logic dispatches on this tag in a
/// single match rather than through virtual calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    // --- Pure values ---
    Constant(ConstantValue),
    Null,
    Undef,
    SizeOf(TypeId),
    WarpSize,
    LaneIdx,
    GridDim(u32),
    GroupDim(u32),
    UnaryArith { kind: UnaryArithKind, operand: ValueId, flags: ArithmeticFlags },
    BinaryArith { kind: BinaryArithKind, lhs: ValueId, rhs: ValueId, flags: ArithmeticFlags },
    TernaryArith { kind: TernaryArithKind, a: ValueId, b: ValueId, c: ValueId, flags: ArithmeticFlags },
    Compare { kind: CompareKind, lhs: ValueId, rhs: ValueId, flags: CompareFlags },
    Convert { operand: ValueId },
    GetField { base: ValueId, index: usize },
    SetField { base: ValueId, index: usize, value: ValueId },
    ArrayLength { extent: Vec<ValueId> },
    ArrayAddress { indices: Vec<ValueId>, extent: Vec<ValueId>, offset: usize },
    Predicate { cond: ValueId, on_true: ValueId, on_false: ValueId },
    Phi { args: Vec<(BlockId, ValueId)> },

    // --- Memory values ---
    Atomic { ptr: ValueId, val: ValueId, kind: AtomicKind, flags: ArithmeticFlags },
    AtomicCas { ptr: ValueId, val: ValueId, cmp: ValueId, flags: ArithmeticFlags },
    Barrier { kind: BarrierKind },
    PredicateBarrier { predicate: ValueId, kind: BarrierKind },
    Broadcast { var: ValueId, origin: ValueId, kind: ShuffleKind },
    WarpShuffle { var: ValueId, origin: ValueId, kind: ShuffleKind },
    SubWarpShuffle { var: ValueId, origin: ValueId, width: ValueId, kind: ShuffleKind },
    WriteToOutput { expressions: Vec<ValueId>, args: Vec<ValueId> },
    Call { target: MethodId, args: Vec<ValueId> },

    // --- Terminators ---
    Return(Option<ValueId>),
    Branch(BlockId),
    IfBranch { cond: ValueId, on_true: BlockId, on_false: BlockId },
    SwitchBranch { value: ValueId, targets: Vec<BlockId> },
    BuilderTerminator,

    // --- Parameters ---
    Parameter { index: u32 },
}

impl ValueKind {
    pub fn is_pure(&self) -> bool {
        matches!(
            self,
            ValueKind::Constant(_)
                | ValueKind::Null
                | ValueKind::Undef
                | ValueKind::SizeOf(_)
                | ValueKind::WarpSize
                | ValueKind::LaneIdx
                | ValueKind::GridDim(_)
                | ValueKind::GroupDim(_)
                | ValueKind::UnaryArith { .. }
                | ValueKind::BinaryArith { .. }
                | ValueKind::TernaryArith { .. }
                | ValueKind::Compare { .. }
                | ValueKind::Convert { .. }
                | ValueKind::GetField { .. }
                | ValueKind::SetField { .. }
                | ValueKind::ArrayLength { .. }
                | ValueKind::ArrayAddress { .. }
                | ValueKind::Predicate { .. }
        )
        // Phi is pure in the sense of being unifiable-free-of-side-effects,
        // but it is never interned (its identity is tied to its block), so
        // it is deliberately excluded here; see `is_interned_eligible`.
    }

    pub fn is_interned_eligible(&self) -> bool {
        self.is_pure()
    }

    pub fn is_memory(&self) -> bool {
        matches!(
            self,
            ValueKind::Atomic { .. }
                | ValueKind::AtomicCas { .. }
                | ValueKind::Barrier { .. }
                | ValueKind::PredicateBarrier { .. }
                | ValueKind::Broadcast { .. }
                | ValueKind::WarpShuffle { .. }
                | ValueKind::SubWarpShuffle { .. }
                | ValueKind::WriteToOutput { .. }
                | ValueKind::Call { .. }
        )
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            ValueKind::Return(_)
                | ValueKind::Branch(_)
                | ValueKind::IfBranch { .. }
                | ValueKind::SwitchBranch { .. }
                | ValueKind::BuilderTerminator
        )
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, ValueKind::Phi { .. })
    }

    pub fn is_parameter(&self) -> bool {
        matches!(self, ValueKind::Parameter { .. })
    }

    /// The successor blocks named by a terminator, in order.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            ValueKind::Branch(target) => vec![*target],
            ValueKind::IfBranch { on_true, on_false, .. } => vec![*on_true, *on_false],
            ValueKind::SwitchBranch { targets, .. } => targets.clone(),
            _ => Vec::new(),
        }
    }

    /// Every operand `ValueId` referenced by this kind, in order. Does not
    /// include block targets (see [`ValueKind::successors`]).
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            ValueKind::Constant(_)
            | ValueKind::Null
            | ValueKind::Undef
            | ValueKind::SizeOf(_)
            | ValueKind::WarpSize
            | ValueKind::LaneIdx
            | ValueKind::GridDim(_)
            | ValueKind::GroupDim(_)
            | ValueKind::Barrier { .. }
            | ValueKind::Branch(_)
            | ValueKind::BuilderTerminator
            | ValueKind::Parameter { .. } => Vec::new(),
            ValueKind::UnaryArith { operand, .. } => vec![*operand],
            ValueKind::Convert { operand } => vec![*operand],
            ValueKind::BinaryArith { lhs, rhs, .. } => vec![*lhs, *rhs],
            ValueKind::Compare { lhs, rhs, .. } => vec![*lhs, *rhs],
            ValueKind::TernaryArith { a, b, c, .. } => vec![*a, *b, *c],
            ValueKind::GetField { base, .. } => vec![*base],
            ValueKind::SetField { base, value, .. } => vec![*base, *value],
            ValueKind::ArrayLength { extent } => extent.clone(),
            ValueKind::ArrayAddress { indices, extent, .. } => {
                let mut v = indices.clone();
                v.extend(extent.iter().copied());
                v
            }
            ValueKind::Predicate { cond, on_true, on_false } => vec![*cond, *on_true, *on_false],
            ValueKind::Phi { args } => args.iter().map(|(_, v)| *v).collect(),
            ValueKind::Atomic { ptr, val, .. } => vec![*ptr, *val],
            ValueKind::AtomicCas { ptr, val, cmp, .. } => vec![*ptr, *val, *cmp],
            ValueKind::PredicateBarrier { predicate, .. } => vec![*predicate],
            ValueKind::Broadcast { var, origin, .. } | ValueKind::WarpShuffle { var, origin, .. } => {
                vec![*var, *origin]
            }
            ValueKind::SubWarpShuffle { var, origin, width, .. } => vec![*var, *origin, *width],
            ValueKind::WriteToOutput { expressions, args } => {
                let mut v = expressions.clone();
                v.extend(args.iter().copied());
                v
            }
            ValueKind::Call { args, .. } => args.clone(),
            ValueKind::Return(v) => v.iter().copied().collect(),
            ValueKind::IfBranch { cond, .. } => vec![*cond],
            ValueKind::SwitchBranch { value, .. } => vec![*value],
        }
    }
}

/// A single node in the method's value arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Value {
    pub id: ValueId,
    pub ty: TypeId,
    pub location: Location,
    pub kind: ValueKind,
    pub parent_block: Option<BlockId>,
    /// Once set, every reader must treat this value as an alias for
    /// `replacement` (invariant 2). Only the SSA builder's trivial-phi
    /// elimination sets this today.
    pub replacement: Option<ValueId>,
}

impl Value {
    pub fn is_replaced(&self) -> bool {
        self.replacement.is_some()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {:?} : {}", self.id, self.kind, self.ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vid(i: u32) -> ValueId {
        ValueId { generation: 0, index: i }
    }

    #[test]
    fn operands_cover_binary_arith() {
        let kind = ValueKind::BinaryArith {
            kind: BinaryArithKind::Add,
            lhs: vid(1),
            rhs: vid(2),
            flags: ArithmeticFlags::NONE,
        };
        assert_eq!(kind.operands(), vec![vid(1), vid(2)]);
        assert!(kind.is_pure());
        assert!(kind.is_interned_eligible());
    }

    #[test]
    fn phi_operands_are_incoming_values_only() {
        let bid = BlockId { generation: 0, index: 0 };
        let kind = ValueKind::Phi { args: vec![(bid, vid(1)), (bid, vid(2))] };
        assert_eq!(kind.operands(), vec![vid(1), vid(2)]);
        assert!(kind.is_phi());
        assert!(!kind.is_interned_eligible());
    }

    #[test]
    fn terminator_successors() {
        let a = BlockId { generation: 0, index: 1 };
        let b = BlockId { generation: 0, index: 2 };
        let kind = ValueKind::IfBranch { cond: vid(0), on_true: a, on_false: b };
        assert_eq!(kind.successors(), vec![a, b]);
        assert!(kind.is_terminator());
    }

    #[test]
    fn constant_value_hash_distinguishes_int_and_float() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(ConstantValue::Int(0));
        set.insert(ConstantValue::Float(0.0));
        assert_eq!(set.len(), 2);
    }
}
