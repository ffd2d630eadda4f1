//! C1 — the per-generation value interner.
//!
//! Deduplicates pure values within a single build generation so that
//! structurally equal expressions share identity (invariant 3). Folding
//! shrinks the key space; interning makes that shrinkage global, per
//! §4.1's stated rationale.

use indexmap::IndexMap;

use crate::types::TypeId;
use crate::value::{ValueId, ValueKind};

/// `(type, kind)` is exactly invariant 3's unification key — operand
/// identities are embedded inside `ValueKind` itself, and flags are
/// embedded inside the kind's variant payload, so no separate flags field
/// is needed here.
type UnificationKey = (TypeId, ValueKind);

#[derive(Default)]
pub struct Interner {
    table: IndexMap<UnificationKey, ValueId>,
}

impl Interner {
    pub fn new() -> Self {
        Self { table: IndexMap::new() }
    }

    /// Looks up an existing representative for `(ty, kind)`. Returns
    /// `None` the first time a key is seen; the caller (the Construction
    /// API) is responsible for constructing the value and calling
    /// [`Interner::insert`] with the id it was given.
    pub fn lookup(&self, ty: TypeId, kind: &ValueKind) -> Option<ValueId> {
        debug_assert!(kind.is_interned_eligible(), "attempted to intern a non-pure value kind");
        self.table.get(&(ty, kind.clone())).copied()
    }

    pub fn insert(&mut self, ty: TypeId, kind: ValueKind, id: ValueId) {
        debug_assert!(kind.is_interned_eligible(), "attempted to intern a non-pure value kind");
        self.table.insert((ty, kind), id);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
