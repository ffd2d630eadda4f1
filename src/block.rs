//! C2 — the block builder: the append/terminate surface of a single basic
//! block, backed by its owning [`MethodBuilder`]'s arena through shared
//! `RefCell` access rather than a borrowed `&mut` slice, so multiple block
//! builders for the same method can be held (and interleaved between) at
//! once without fighting the borrow checker.

use crate::diagnostics::{IrError, IrResult};
use crate::location::Location;
use crate::method::MethodBuilder;
use crate::types::{BasicValueType, TypeId};
use crate::value::{BlockId, ValueId, ValueKind};

/// A handle onto one basic block of a [`MethodBuilder`] under construction.
/// Cheap to copy (it is just a block id plus a borrowed method reference);
/// callers are expected to hold on to the one returned by
/// [`MethodBuilder::create_basic_block`] or create a fresh one at any
/// point, per §4.2.
#[derive(Clone, Copy)]
pub struct BlockBuilder<'m, 'ctx> {
    method: &'m MethodBuilder<'ctx>,
    block: BlockId,
}

impl<'m, 'ctx> BlockBuilder<'m, 'ctx> {
    pub(crate) fn new(method: &'m MethodBuilder<'ctx>, block: BlockId) -> Self {
        Self { method, block }
    }

    pub fn block_id(&self) -> BlockId {
        self.block
    }

    pub fn method(&self) -> &'m MethodBuilder<'ctx> {
        self.method
    }

    /// True once this block has a terminator (§4.2: "a block accepts no
    /// further instructions once terminated").
    pub fn is_finalized(&self) -> bool {
        self.method.state.borrow().blocks[self.block.index as usize].is_finalized()
    }

    /// `from_terminator` distinguishes the two callers: an ordinary append
    /// past a terminator is a recoverable caller error, but calling
    /// `set_terminator` twice on the same block is always a bug in the
    /// construction logic itself (§7: "double terminator" is an
    /// `InvariantViolation`, not an `UnsupportedOperation`).
    fn guard_open(&self, location: &Location, from_terminator: bool) -> IrResult<()> {
        if self.is_finalized() {
            return Err(if from_terminator {
                IrError::invariant(
                    "set_terminator called on an already-terminated block",
                    location.clone(),
                )
            } else {
                IrError::unsupported(
                    "append to a block that already has a terminator",
                    location.clone(),
                )
            });
        }
        Ok(())
    }

    /// Appends an ordinary (non-phi, non-terminator) value to the block's
    /// instruction list. Used by the Construction API (C4) after folding
    /// and interning have already decided a fresh node is needed.
    pub(crate) fn append(&self, ty: TypeId, location: Location, kind: ValueKind) -> IrResult<ValueId> {
        debug_assert!(!kind.is_terminator() && !kind.is_phi());
        self.guard_open(&location, false)?;
        let id = self.method.push_value(ty, location, kind);
        let mut state = self.method.state.borrow_mut();
        state.arena[id.index as usize].parent_block = Some(self.block);
        state.blocks[self.block.index as usize].instructions.push(id);
        Ok(id)
    }

    /// Appends an ordinary value to the block's instruction list without
    /// checking whether the block already has a terminator. Used only by
    /// the SSA builder (C5) to insert a primitive-type convert for a phi
    /// operand coming from an already-terminated predecessor: the convert
    /// conceptually belongs to that predecessor's instruction stream, not
    /// after its terminator, and since `terminator` is tracked in its own
    /// field rather than inline in `instructions`, appending here still
    /// renders before the terminator in block order.
    pub(crate) fn append_before_terminator(&self, ty: TypeId, location: Location, kind: ValueKind) -> IrResult<ValueId> {
        debug_assert!(!kind.is_terminator() && !kind.is_phi());
        let id = self.method.push_value(ty, location, kind);
        let mut state = self.method.state.borrow_mut();
        state.arena[id.index as usize].parent_block = Some(self.block);
        state.blocks[self.block.index as usize].instructions.push(id);
        Ok(id)
    }

    /// Appends a phi at the head of the block (§4.2: phis always precede
    /// ordinary instructions). Phis are never folded or interned — each
    /// call produces a fresh node, even with empty `args` (the SSA builder
    /// fills `args` in incrementally as predecessors are discovered).
    pub fn create_phi(&self, ty: TypeId, location: Location) -> IrResult<ValueId> {
        self.guard_open(&location, false)?;
        let kind = ValueKind::Phi { args: Vec::new() };
        let id = self.method.push_value(ty, location, kind);
        let mut state = self.method.state.borrow_mut();
        state.arena[id.index as usize].parent_block = Some(self.block);
        state.blocks[self.block.index as usize].phis.push(id);
        Ok(id)
    }

    /// Adds one more incoming `(predecessor, value)` pair to a phi created
    /// by [`BlockBuilder::create_phi`]. Called by the SSA builder (C5) as
    /// it discovers predecessors; never called by ordinary Construction
    /// API users.
    pub(crate) fn add_phi_operand(&self, phi: ValueId, predecessor: BlockId, value: ValueId) -> IrResult<()> {
        let is_phi_operand = {
            let state = self.method.state.borrow();
            matches!(state.arena[value.index as usize].kind, ValueKind::Phi { .. })
        };
        {
            let mut state = self.method.state.borrow_mut();
            let entry = &mut state.arena[phi.index as usize];
            match &mut entry.kind {
                ValueKind::Phi { args } => args.push((predecessor, value)),
                _ => {
                    return Err(IrError::invariant(
                        format!("{phi} is not a phi"),
                        entry.location.clone(),
                    ))
                }
            }
        }
        if is_phi_operand {
            self.method.register_phi_user(value, phi);
        }
        Ok(())
    }

    /// Installs the block's terminator, wiring predecessor/successor edges
    /// on both ends. A block accepts exactly one terminator; calling this
    /// twice is a caller error (§4.2).
    pub fn set_terminator(&self, kind: ValueKind, location: Location) -> IrResult<ValueId> {
        debug_assert!(kind.is_terminator());
        self.guard_open(&location, true)?;
        let successors = kind.successors();
        let none_ty = self.method.types().get_primitive(BasicValueType::None);
        let id = self.method.push_value(none_ty, location, kind);

        let mut state = self.method.state.borrow_mut();
        state.arena[id.index as usize].parent_block = Some(self.block);
        state.blocks[self.block.index as usize].terminator = Some(id);
        state.blocks[self.block.index as usize].successors = successors.clone();
        for succ in successors {
            state.blocks[succ.index as usize].predecessors.push(self.block);
        }
        Ok(id)
    }

    pub fn location(&self) -> Location {
        self.method.state.borrow().blocks[self.block.index as usize].location.clone()
    }
}
