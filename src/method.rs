//! C3 — the method builder: owns the method under construction, the
//! value arena, the parameter list, and the block arena, and finalizes
//! them atomically into an immutable [`Method`] on disposal.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::IrContext;
use crate::diagnostics::{IrError, IrResult};
use crate::interner::Interner;
use crate::location::Location;
use crate::types::TypeContext;
use crate::types::TypeId;
use crate::value::{BlockId, MethodId, Value, ValueId, ValueKind};

/// A frozen method parameter, indexed contiguously from zero after
/// finalization (§4.3: "remaining parameters re-indexed contiguously from
/// zero").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub index: u32,
    pub ty: TypeId,
    pub name: String,
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)
    }
}

/// A basic block, as stored in the method's block arena. Owns its
/// ordered instruction list, predecessor/successor links derived from its
/// terminator, and the monotonic `processed`/`sealed` flags used by the
/// SSA builder (C5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: BlockId,
    pub location: Location,
    /// Phis first (conceptually always at the head, §4.2), then ordinary
    /// instructions, in append order.
    pub phis: Vec<ValueId>,
    pub instructions: Vec<ValueId>,
    pub terminator: Option<ValueId>,
    pub predecessors: Vec<BlockId>,
    pub successors: Vec<BlockId>,
    pub processed: bool,
    pub sealed: bool,
}

impl BasicBlock {
    fn new(id: BlockId, location: Location) -> Self {
        Self {
            id,
            location,
            phis: Vec::new(),
            instructions: Vec::new(),
            terminator: None,
            predecessors: Vec::new(),
            successors: Vec::new(),
            processed: false,
            sealed: false,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.terminator.is_some()
    }

    /// All values placed in this block, phis first, in construction order.
    pub fn ordered_values(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.phis.iter().chain(self.instructions.iter()).chain(self.terminator.iter()).copied()
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.id)?;
        for id in self.ordered_values() {
            writeln!(f, "  {}", id)?;
        }
        Ok(())
    }
}

pub(crate) struct MethodState {
    pub(crate) generation: u32,
    pub(crate) arena: Vec<Value>,
    pub(crate) blocks: Vec<BasicBlock>,
    pub(crate) interner: Interner,
    pub(crate) parameters: Vec<ValueId>,
    pub(crate) parameter_names: Vec<String>,
    pub(crate) entry_block: Option<BlockId>,
    pub(crate) return_type: TypeId,
    pub(crate) disposed: bool,
    pub(crate) block_names: HashMap<String, BlockId>,
    /// For a phi `p`, the other phis that have `p` as a direct operand.
    /// Maintained by `BlockBuilder::add_phi_operand` and consulted by
    /// trivial-phi elimination's cascade (§4.5): when `p` collapses, its
    /// users are the ones that must be re-tested for newly triggered
    /// triviality.
    pub(crate) phi_users: HashMap<ValueId, Vec<ValueId>>,
    /// The last cascade marker to visit each node, so a single trivial-phi
    /// cascade never re-enters a phi it has already resolved this pass
    /// even when the phi graph is cyclic.
    pub(crate) visit_marker: HashMap<ValueId, u64>,
}

/// The method under construction. Single-writer (§5): intended for use by
/// one thread at a time, though multiple `MethodBuilder`s against the
/// same [`IrContext`] may proceed concurrently on different methods.
pub struct MethodBuilder<'ctx> {
    pub(crate) ctx: &'ctx IrContext,
    pub(crate) types: &'ctx TypeContext,
    pub(crate) method_id: MethodId,
    pub(crate) state: RefCell<MethodState>,
}

/// A finalized, immutable method: the product of disposing a
/// [`MethodBuilder`]. Owned by the [`crate::context::IrContext`]'s method
/// registry once registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Method {
    pub id: MethodId,
    pub generation: u32,
    pub arena: Vec<Value>,
    pub blocks: Vec<BasicBlock>,
    pub parameters: Vec<Parameter>,
    pub entry_block: BlockId,
    pub return_type: TypeId,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "method {} (gen {}) -> {}", self.id, self.generation, self.return_type)?;
        for param in &self.parameters {
            writeln!(f, "  param {}", param)?;
        }
        for block in &self.blocks {
            writeln!(f, "{}:", block.id)?;
            for id in block.ordered_values() {
                writeln!(f, "  {}", self.value(id))?;
            }
        }
        Ok(())
    }
}

impl Method {
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index as usize]
    }

    pub fn value(&self, id: ValueId) -> &Value {
        &self.arena[id.index as usize]
    }

    /// The arena `ValueId` of each parameter, in parameter order. Used by
    /// the Rebuilder (C6) to seed its value map against a caller-supplied
    /// replacement for each parameter.
    pub fn parameter_value_ids(&self) -> Vec<ValueId> {
        let mut ids: Vec<(u32, ValueId)> = self
            .arena
            .iter()
            .filter_map(|v| match v.kind {
                ValueKind::Parameter { index } => Some((index, v.id)),
                _ => None,
            })
            .collect();
        ids.sort_by_key(|(index, _)| *index);
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Follows a value's replacement chain to its final representative
    /// (invariant 2: replacement is followed transitively at read time).
    pub fn resolve(&self, mut id: ValueId) -> ValueId {
        let mut steps = 0;
        while let Some(next) = self.arena[id.index as usize].replacement {
            id = next;
            steps += 1;
            debug_assert!(steps < self.arena.len() + 1, "replacement cycle detected");
        }
        id
    }
}

impl<'ctx> MethodBuilder<'ctx> {
    pub fn new(ctx: &'ctx IrContext, types: &'ctx TypeContext, method_id: MethodId, return_type: TypeId) -> Self {
        let generation = ctx.current_generation();
        Self {
            ctx,
            types,
            method_id,
            state: RefCell::new(MethodState {
                generation,
                arena: Vec::new(),
                blocks: Vec::new(),
                interner: Interner::new(),
                parameters: Vec::new(),
                parameter_names: Vec::new(),
                entry_block: None,
                return_type,
                disposed: false,
                block_names: HashMap::new(),
                phi_users: HashMap::new(),
                visit_marker: HashMap::new(),
            }),
        }
    }

    pub fn method_id(&self) -> MethodId {
        self.method_id
    }

    pub fn generation(&self) -> u32 {
        self.state.borrow().generation
    }

    pub fn return_type(&self) -> TypeId {
        self.state.borrow().return_type
    }

    pub fn types(&self) -> &'ctx TypeContext {
        self.types
    }

    pub fn context(&self) -> &'ctx IrContext {
        self.ctx
    }

    fn check_generation(&self, id: ValueId, loc: &Location) -> IrResult<()> {
        if id.generation != self.generation() {
            return Err(IrError::invariant(
                format!("value {id} belongs to a stale generation"),
                loc.clone(),
            ));
        }
        Ok(())
    }

    pub(crate) fn push_value(&self, ty: TypeId, location: Location, kind: ValueKind) -> ValueId {
        let mut state = self.state.borrow_mut();
        let index = state.arena.len() as u32;
        let id = ValueId { generation: state.generation, index };
        state.arena.push(Value { id, ty, location, kind, parent_block: None, replacement: None });
        id
    }

    /// Resolves a value through its replacement chain (invariant 2).
    pub fn resolve(&self, id: ValueId) -> ValueId {
        let state = self.state.borrow();
        let mut cur = id;
        let mut steps = 0;
        while let Some(next) = state.arena[cur.index as usize].replacement {
            cur = next;
            steps += 1;
            debug_assert!(steps < state.arena.len() + 1, "replacement cycle detected");
        }
        cur
    }

    pub fn value_type(&self, id: ValueId) -> TypeId {
        let id = self.resolve(id);
        self.state.borrow().arena[id.index as usize].ty
    }

    pub fn value_kind(&self, id: ValueId) -> ValueKind {
        let id = self.resolve(id);
        self.state.borrow().arena[id.index as usize].kind.clone()
    }

    pub fn value_location(&self, id: ValueId) -> Location {
        let id = self.resolve(id);
        self.state.borrow().arena[id.index as usize].location.clone()
    }

    pub fn parent_block(&self, id: ValueId) -> Option<BlockId> {
        let id = self.resolve(id);
        self.state.borrow().arena[id.index as usize].parent_block
    }

    /// Looks up an existing representative for `(ty, kind)` in this
    /// method's private interner (C1). Cross-generation/cross-method
    /// unification is out of scope for this crate (§5: "the per-method
    /// value interner is private to one Method builder").
    pub(crate) fn lookup_interned(&self, ty: TypeId, kind: &ValueKind) -> Option<ValueId> {
        self.state.borrow().interner.lookup(ty, kind)
    }

    pub(crate) fn insert_interned(&self, ty: TypeId, kind: ValueKind, id: ValueId) {
        self.state.borrow_mut().interner.insert(ty, kind, id);
    }

    /// Redirects every future reader of `from` to `to` (invariant 2). Used
    /// by trivial-phi elimination (C5) and by callers folding a value
    /// after the fact is never required by this crate's own peepholes
    /// (which fold *before* insertion), but the slot exists for exactly
    /// that class of post-hoc rewrite.
    pub fn replace(&self, from: ValueId, to: ValueId, location: &Location) -> IrResult<()> {
        self.check_generation(from, location)?;
        self.check_generation(to, location)?;
        let mut state = self.state.borrow_mut();
        if state.arena[from.index as usize].replacement.is_some() {
            return Err(IrError::invariant(
                format!("value {from} was already replaced"),
                location.clone(),
            ));
        }
        state.arena[from.index as usize].replacement = Some(to);
        Ok(())
    }

    /// Records that `user` (a phi) has `operand` (also a phi) as a direct
    /// argument. Called only from `BlockBuilder::add_phi_operand`.
    pub(crate) fn register_phi_user(&self, operand: ValueId, user: ValueId) {
        self.state.borrow_mut().phi_users.entry(operand).or_default().push(user);
    }

    /// The phis that have `phi` as a direct operand, as of the last time
    /// they were wired (§4.5 cascade).
    pub(crate) fn phi_users(&self, phi: ValueId) -> Vec<ValueId> {
        self.state.borrow().phi_users.get(&phi).cloned().unwrap_or_default()
    }

    /// Marks `id` as visited under `marker`. Returns `true` if `id` was
    /// already visited under this same marker (the caller should stop
    /// rather than recurse again), matching §4.5's "each traversal obtains
    /// a fresh marker from a provider" cycle-breaking discipline.
    pub(crate) fn mark_visited(&self, id: ValueId, marker: u64) -> bool {
        let mut state = self.state.borrow_mut();
        let already = state.visit_marker.get(&id) == Some(&marker);
        state.visit_marker.insert(id, marker);
        already
    }

    pub fn create_entry_block(&self, location: Location) -> IrResult<BlockId> {
        let mut state = self.state.borrow_mut();
        if state.entry_block.is_some() {
            return Err(IrError::unsupported("create_entry_block called more than once", location));
        }
        let index = state.blocks.len() as u32;
        let id = BlockId { generation: state.generation, index };
        state.blocks.push(BasicBlock::new(id, location));
        state.entry_block = Some(id);
        Ok(id)
    }

    pub fn entry_block(&self) -> Option<BlockId> {
        self.state.borrow().entry_block
    }

    /// Borrows a [`crate::block::BlockBuilder`] onto `id`. Cheap; may be
    /// called any number of times for the same block id.
    pub fn block(&self, id: BlockId) -> crate::block::BlockBuilder<'_, 'ctx> {
        crate::block::BlockBuilder::new(self, id)
    }

    /// Creates a new basic block keyed by `name`; a repeat lookup under
    /// the same name returns the same block (§4.3).
    pub fn create_basic_block(&self, location: Location, name: impl Into<String>) -> BlockId {
        let name = name.into();
        let mut state = self.state.borrow_mut();
        if let Some(id) = state.block_names.get(&name) {
            return *id;
        }
        let index = state.blocks.len() as u32;
        let id = BlockId { generation: state.generation, index };
        state.blocks.push(BasicBlock::new(id, location));
        state.block_names.insert(name, id);
        id
    }

    pub fn block_count(&self) -> usize {
        self.state.borrow().blocks.len()
    }

    pub fn predecessors(&self, block: BlockId) -> Vec<BlockId> {
        self.state.borrow().blocks[block.index as usize].predecessors.clone()
    }

    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        self.state.borrow().blocks[block.index as usize].successors.clone()
    }

    pub fn is_sealed(&self, block: BlockId) -> bool {
        self.state.borrow().blocks[block.index as usize].sealed
    }

    pub fn is_processed(&self, block: BlockId) -> bool {
        self.state.borrow().blocks[block.index as usize].processed
    }

    pub(crate) fn mark_sealed(&self, block: BlockId) {
        self.state.borrow_mut().blocks[block.index as usize].sealed = true;
    }

    pub fn mark_processed(&self, block: BlockId) {
        self.state.borrow_mut().blocks[block.index as usize].processed = true;
    }

    pub fn all_block_ids(&self) -> Vec<BlockId> {
        self.state.borrow().blocks.iter().map(|b| b.id).collect()
    }

    /// Appends a parameter at the end of the current parameter list.
    pub fn add_parameter(&self, ty: TypeId, name: impl Into<String>) -> ValueId {
        let mut state = self.state.borrow_mut();
        let param_index = state.parameters.len() as u32;
        let arena_index = state.arena.len() as u32;
        let id = ValueId { generation: state.generation, index: arena_index };
        state.arena.push(Value {
            id,
            ty,
            location: Location::unknown(),
            kind: ValueKind::Parameter { index: param_index },
            parent_block: None,
            replacement: None,
        });
        state.parameters.push(id);
        state.parameter_names.push(name.into());
        id
    }

    /// Inserts a parameter at the front of the parameter list, renumbering
    /// every existing parameter's logical index to match its new position.
    pub fn insert_parameter(&self, ty: TypeId, name: impl Into<String>) -> ValueId {
        let mut state = self.state.borrow_mut();
        let arena_index = state.arena.len() as u32;
        let id = ValueId { generation: state.generation, index: arena_index };
        state.arena.push(Value {
            id,
            ty,
            location: Location::unknown(),
            kind: ValueKind::Parameter { index: 0 },
            parent_block: None,
            replacement: None,
        });
        state.parameters.insert(0, id);
        state.parameter_names.insert(0, name.into());
        let parameters = state.parameters.clone();
        for (i, pid) in parameters.into_iter().enumerate() {
            state.arena[pid.index as usize].kind = ValueKind::Parameter { index: i as u32 };
        }
        id
    }

    pub fn parameter_count(&self) -> usize {
        self.state.borrow().parameters.len()
    }

    /// Disposes the builder, finalizing the method atomically: replaced
    /// parameters are dropped, remaining ones re-indexed from zero, and
    /// the method is handed to the IR context's registry. Disposal without
    /// calling this (simply dropping the builder) is idempotent and
    /// leaves the context unchanged (§5: "no partial methods registered").
    pub fn finalize(self) -> IrResult<Method> {
        let mut state = self.state.into_inner();
        if state.disposed {
            return Err(IrError::unsupported("method builder finalized twice", Location::unknown()));
        }
        let entry_block = state
            .entry_block
            .ok_or_else(|| IrError::unsupported("method has no entry block", Location::unknown()))?;

        let mut kept = Vec::new();
        for (pid, name) in state.parameters.iter().zip(state.parameter_names.iter()) {
            if state.arena[pid.index as usize].replacement.is_none() {
                kept.push((*pid, name.clone()));
            }
        }
        let mut parameters = Vec::with_capacity(kept.len());
        for (new_index, (pid, name)) in kept.into_iter().enumerate() {
            let entry = &mut state.arena[pid.index as usize];
            entry.kind = ValueKind::Parameter { index: new_index as u32 };
            parameters.push(Parameter {
                index: new_index as u32,
                ty: entry.ty,
                name,
            });
        }

        state.disposed = true;
        let method = Method {
            id: self.method_id,
            generation: state.generation,
            arena: state.arena,
            blocks: state.blocks,
            parameters,
            entry_block,
            return_type: state.return_type,
        };
        self.ctx.finalize_method_builder(self.method_id, method.clone());
        Ok(method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BasicValueType;

    fn setup() -> (IrContext, TypeContext) {
        (IrContext::new(), TypeContext::new())
    }

    #[test]
    fn entry_block_can_only_be_created_once() {
        let (ctx, types) = setup();
        let i32_ty = types.get_primitive(BasicValueType::Int32);
        let (id, _) = ctx.declare_method(crate::context::MethodDecl::new("f"));
        let mb = MethodBuilder::new(&ctx, &types, id, i32_ty);
        mb.create_entry_block(Location::unknown()).unwrap();
        assert!(mb.create_entry_block(Location::unknown()).is_err());
    }

    #[test]
    fn repeat_block_lookup_returns_same_id() {
        let (ctx, types) = setup();
        let i32_ty = types.get_primitive(BasicValueType::Int32);
        let (id, _) = ctx.declare_method(crate::context::MethodDecl::new("f"));
        let mb = MethodBuilder::new(&ctx, &types, id, i32_ty);
        let a = mb.create_basic_block(Location::unknown(), "loop");
        let b = mb.create_basic_block(Location::unknown(), "loop");
        assert_eq!(a, b);
    }

    #[test]
    fn finalize_reindexes_parameters_after_dropping_replaced_ones() {
        let (ctx, types) = setup();
        let i32_ty = types.get_primitive(BasicValueType::Int32);
        let (id, _) = ctx.declare_method(crate::context::MethodDecl::new("f"));
        let mb = MethodBuilder::new(&ctx, &types, id, i32_ty);
        mb.create_entry_block(Location::unknown()).unwrap();
        let p0 = mb.add_parameter(i32_ty, "a");
        let p1 = mb.add_parameter(i32_ty, "b");
        let replacement = mb.push_value(i32_ty, Location::unknown(), ValueKind::Constant(crate::value::ConstantValue::Int(0)));
        mb.replace(p0, replacement, &Location::unknown()).unwrap();
        let method = mb.finalize().unwrap();
        assert_eq!(method.parameters.len(), 1);
        assert_eq!(method.parameters[0].index, 0);
        let _ = p1;
    }
}
