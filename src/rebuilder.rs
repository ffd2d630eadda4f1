//! C6 — the Rebuilder: structural re-emission of a finalized [`Method`]
//! (or a fragment of one) through the Construction API (C4) of a target
//! [`MethodBuilder`], under a parameter mapping and a method mapping.
//! Used for cloning, inlining, cross-context import, and specialization
//! (§4.6).
//!
//! Every rebuilt value is constructed afresh through the same factory
//! methods ordinary callers use, so folds, peepholes, and interning apply
//! exactly as they would for a hand-built method — a fold the source
//! method never triggered (e.g. because a parameter has since become a
//! compile-time constant at the inline site) is free to fire here.

use std::cell::RefCell;
use std::collections::HashMap;

use log::trace;

use crate::block::BlockBuilder;
use crate::builder::trivial_phi_eliminate;
use crate::diagnostics::{IrError, IrResult};
use crate::location::Location;
use crate::method::{Method, MethodBuilder};
use crate::types::TypeId;
use crate::value::{BlockId, ConstantValue, MethodId, ValueId, ValueKind};

/// Distinguishes the two block-mapping strategies named in §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildMode {
    /// Keep the target's existing entry block identity; every other
    /// source block maps to a fresh target block.
    Clone { target_entry: BlockId },
    /// Every source block, including entry, maps to a fresh target block.
    Inline,
}

/// A `(exit_block, return_value)` pair collected from a rebuilt `Return`
/// terminator. The Rebuilder never materializes a `Return` terminator
/// itself — per §4.6 step 4, the caller decides how to stitch it into the
/// surrounding graph (a real `ret` for a clone, a branch to a
/// continuation block for an inline).
pub type ExitPair = (BlockId, Option<ValueId>);

/// Rewrites a [`TypeId`] during rebuild, e.g. `specialize_address_space`
/// for a memory-space-specializing inline. Identity by default.
pub type TypeSpecializer<'a> = dyn Fn(TypeId) -> TypeId + 'a;

pub struct Rebuilder<'s, 'm, 'ctx, 'a> {
    source: &'s Method,
    target: &'m MethodBuilder<'ctx>,
    method_map: &'a HashMap<MethodId, MethodId>,
    retype: Option<&'a TypeSpecializer<'a>>,
    block_map: HashMap<BlockId, BlockId>,
    value_map: RefCell<HashMap<ValueId, ValueId>>,
}

impl<'s, 'm, 'ctx, 'a> Rebuilder<'s, 'm, 'ctx, 'a> {
    /// Builds a rebuilder for `source` into `target`, seeding the value
    /// map from `param_values` (target-side replacements for each of
    /// `source`'s parameters, in parameter order — a narrower or wider
    /// list than `source.parameters` is a caller error).
    pub fn new(
        source: &'s Method,
        target: &'m MethodBuilder<'ctx>,
        mode: RebuildMode,
        param_values: &[ValueId],
        method_map: &'a HashMap<MethodId, MethodId>,
        retype: Option<&'a TypeSpecializer<'a>>,
    ) -> IrResult<Self> {
        if param_values.len() != source.parameters.len() {
            return Err(IrError::invariant(
                format!(
                    "parameter count mismatch: source has {}, {} values supplied",
                    source.parameters.len(),
                    param_values.len()
                ),
                Location::unknown(),
            ));
        }

        let mut rebuilder = Self {
            source,
            target,
            method_map,
            retype,
            block_map: HashMap::new(),
            value_map: RefCell::new(HashMap::new()),
        };

        rebuilder.seed_parameters(param_values);
        rebuilder.create_target_blocks(mode);
        rebuilder.create_target_phis()?;
        Ok(rebuilder)
    }

    fn retype(&self, ty: TypeId) -> TypeId {
        match self.retype {
            Some(f) => f(ty),
            None => ty,
        }
    }

    fn seed_parameters(&mut self, param_values: &[ValueId]) {
        let ids = self.source.parameter_value_ids();
        for (source_id, target_id) in ids.into_iter().zip(param_values.iter().copied()) {
            self.value_map.borrow_mut().insert(source_id, target_id);
        }
    }

    fn create_target_blocks(&mut self, mode: RebuildMode) {
        let rpo = reverse_post_order(self.source);
        for block in rpo {
            let target_block = match mode {
                RebuildMode::Clone { target_entry } if block == self.source.entry_block => target_entry,
                _ => {
                    let loc = self.source.block(block).location.clone();
                    self.target.create_basic_block(loc, format!("rebuilt.{block}"))
                }
            };
            self.block_map.insert(block, target_block);
        }
    }

    fn create_target_phis(&mut self) -> IrResult<()> {
        for block in reverse_post_order(self.source) {
            let source_block = self.source.block(block);
            let target_block = self.block_map[&block];
            for &phi in &source_block.phis {
                let value = self.source.value(phi);
                let ty = self.retype(value.ty);
                let target_phi = self.target.block(target_block).create_phi(ty, value.location.clone())?;
                self.value_map.borrow_mut().insert(phi, target_phi);
            }
        }
        Ok(())
    }

    /// Looks up the target-side value already rebuilt for `source_id`,
    /// following the source method's replacement chain first (invariant
    /// 2). Per §4.6's failure model, a miss here means the source graph
    /// referenced a replaced value never mapped by its caller — an
    /// invariant violation, not ordinary misuse.
    fn mapped(&self, source_id: ValueId) -> IrResult<ValueId> {
        let resolved = self.source.resolve(source_id);
        self.value_map
            .borrow()
            .get(&resolved)
            .copied()
            .ok_or_else(|| {
                IrError::invariant(
                    format!("{resolved} has no rebuilt counterpart (replacement never mapped)"),
                    self.source.value(resolved).location.clone(),
                )
            })
    }

    fn mapped_many(&self, ids: &[ValueId]) -> IrResult<Vec<ValueId>> {
        ids.iter().map(|&id| self.mapped(id)).collect()
    }

    fn mapped_block(&self, id: BlockId) -> BlockId {
        self.block_map[&id]
    }

    /// Walks the source in reverse-post-order, rebuilding every
    /// non-terminator value through the target's Construction API, then
    /// the terminator, then wires phi operands. Returns the exit pairs
    /// collected from rebuilt `Return` terminators (§4.6 step 4).
    pub fn rebuild(self) -> IrResult<Vec<ExitPair>> {
        let mut exits = Vec::new();
        for block in reverse_post_order(self.source) {
            self.rebuild_block_body(block)?;
            if let Some(exit) = self.rebuild_terminator(block)? {
                exits.push(exit);
            }
        }
        self.wire_phis()?;
        Ok(exits)
    }

    fn rebuild_block_body(&self, block: BlockId) -> IrResult<()> {
        let source_block = self.source.block(block);
        let target_block = self.mapped_block(block);
        let bb = self.target.block(target_block);
        for &id in &source_block.instructions {
            let rebuilt = self.rebuild_value(&bb, id)?;
            self.value_map.borrow_mut().insert(id, rebuilt);
        }
        Ok(())
    }

    fn rebuild_value(&self, bb: &BlockBuilder<'_, '_>, id: ValueId) -> IrResult<ValueId> {
        let value = self.source.value(id);
        let loc = value.location.clone();
        let ty = self.retype(value.ty);

        trace!("rebuilding {id} ({:?}) into {}", value.kind, bb.block_id());

        match &value.kind {
            ValueKind::Constant(ConstantValue::Int(i)) => bb.primitive_int(loc, ty, *i),
            ValueKind::Constant(ConstantValue::Float(f)) => bb.primitive_float(loc, ty, *f),
            ValueKind::Null => bb.null(loc, ty),
            ValueKind::Undef => bb.undef(loc, ty),
            ValueKind::SizeOf(target) => bb.size_of(loc, ty, self.retype(*target)),
            ValueKind::WarpSize => bb.warp_size(loc, ty),
            ValueKind::LaneIdx => bb.lane_idx(loc, ty),
            ValueKind::GridDim(d) => bb.grid_dim(loc, ty, *d),
            ValueKind::GroupDim(d) => bb.group_dim(loc, ty, *d),
            ValueKind::UnaryArith { kind, operand, flags } => {
                bb.unary(loc, self.mapped(*operand)?, *kind, *flags)
            }
            ValueKind::BinaryArith { kind, lhs, rhs, flags } => {
                bb.binary(loc, self.mapped(*lhs)?, self.mapped(*rhs)?, *kind, *flags)
            }
            ValueKind::TernaryArith { kind, a, b, c, flags } => {
                bb.ternary(loc, self.mapped(*a)?, self.mapped(*b)?, self.mapped(*c)?, *kind, *flags)
            }
            ValueKind::Compare { kind, lhs, rhs, flags } => {
                bb.compare(loc, self.mapped(*lhs)?, self.mapped(*rhs)?, *kind, *flags)
            }
            ValueKind::Convert { operand } => bb.convert(loc, self.mapped(*operand)?, ty),
            ValueKind::GetField { base, index } => bb.get_field(loc, self.mapped(*base)?, *index),
            ValueKind::SetField { base, index, value } => {
                bb.set_field(loc, self.mapped(*base)?, *index, self.mapped(*value)?)
            }
            ValueKind::ArrayLength { extent } => bb.array_length(loc, &self.mapped_many(extent)?),
            ValueKind::ArrayAddress { indices, extent, offset } => bb.array_address(
                loc,
                &self.mapped_many(indices)?,
                &self.mapped_many(extent)?,
                *offset,
            ),
            ValueKind::Predicate { cond, on_true, on_false } => bb.predicate(
                loc,
                self.mapped(*cond)?,
                self.mapped(*on_true)?,
                self.mapped(*on_false)?,
            ),
            ValueKind::Atomic { ptr, val, kind, flags } => {
                bb.atomic(loc, self.mapped(*ptr)?, self.mapped(*val)?, *kind, *flags)
            }
            ValueKind::AtomicCas { ptr, val, cmp, flags } => bb.atomic_cas(
                loc,
                self.mapped(*ptr)?,
                self.mapped(*val)?,
                self.mapped(*cmp)?,
                *flags,
            ),
            ValueKind::Barrier { kind } => bb.barrier(loc, ty, *kind),
            ValueKind::PredicateBarrier { predicate, kind } => {
                bb.predicate_barrier(loc, ty, self.mapped(*predicate)?, *kind)
            }
            ValueKind::Broadcast { var, origin, kind } => {
                bb.broadcast(loc, self.mapped(*var)?, self.mapped(*origin)?, *kind)
            }
            ValueKind::WarpShuffle { var, origin, kind } => {
                bb.warp_shuffle(loc, self.mapped(*var)?, self.mapped(*origin)?, *kind)
            }
            ValueKind::SubWarpShuffle { var, origin, width, kind } => bb.sub_warp_shuffle(
                loc,
                self.mapped(*var)?,
                self.mapped(*origin)?,
                self.mapped(*width)?,
                *kind,
            ),
            ValueKind::WriteToOutput { expressions, args } => bb.write_to_output(
                loc,
                ty,
                self.mapped_many(expressions)?,
                self.mapped_many(args)?,
            ),
            ValueKind::Call { target, args } => {
                let target = self.method_map.get(target).copied().unwrap_or(*target);
                bb.call(loc, ty, target, self.mapped_many(args)?)
            }
            ValueKind::Phi { .. } => Err(IrError::invariant(
                format!("{id} is a phi; phis are pre-created, not rebuilt as ordinary instructions"),
                loc,
            )),
            ValueKind::Parameter { .. } => Err(IrError::invariant(
                format!("{id} is a parameter with no seeded mapping"),
                loc,
            )),
            ValueKind::Return(_)
            | ValueKind::Branch(_)
            | ValueKind::IfBranch { .. }
            | ValueKind::SwitchBranch { .. }
            | ValueKind::BuilderTerminator => Err(IrError::invariant(
                format!("{id} is a terminator; rebuilt separately"),
                loc,
            )),
        }
    }

    fn rebuild_terminator(&self, block: BlockId) -> IrResult<Option<ExitPair>> {
        let source_block = self.source.block(block);
        let term_id = source_block
            .terminator
            .ok_or_else(|| IrError::invariant(format!("{block} has no terminator"), Location::unknown()))?;
        let term = self.source.value(term_id);
        let loc = term.location.clone();
        let target_block = self.mapped_block(block);
        let bb = self.target.block(target_block);

        match &term.kind {
            ValueKind::Return(v) => {
                let mapped = match v {
                    Some(v) => Some(self.mapped(*v)?),
                    None => None,
                };
                return Ok(Some((target_block, mapped)));
            }
            ValueKind::Branch(target) => {
                bb.branch(loc, self.mapped_block(*target))?;
            }
            ValueKind::IfBranch { cond, on_true, on_false } => {
                let cond = self.mapped(*cond)?;
                bb.if_branch(loc, cond, self.mapped_block(*on_true), self.mapped_block(*on_false))?;
            }
            ValueKind::SwitchBranch { value, targets } => {
                let value = self.mapped(*value)?;
                let targets = targets.iter().map(|t| self.mapped_block(*t)).collect();
                bb.switch_branch(loc, value, targets)?;
            }
            ValueKind::BuilderTerminator => {
                return Err(IrError::invariant(
                    format!("{term_id}: a builder-terminator placeholder cannot be rebuilt"),
                    loc,
                ));
            }
            _ => unreachable!("non-terminator stored as block terminator"),
        }
        Ok(None)
    }

    /// Step 5: wires every target phi's operands from its source phi's
    /// `(pred, value)` pairs, then attempts trivial-phi elimination, the
    /// same collapse the SSA builder performs during live construction.
    fn wire_phis(&self) -> IrResult<()> {
        for block in reverse_post_order(self.source) {
            let source_block = self.source.block(block);
            for &source_phi in &source_block.phis {
                let target_phi = self.mapped(source_phi)?;
                let target_block = self.mapped_block(block);
                let ValueKind::Phi { args } = self.source.value(source_phi).kind.clone() else {
                    continue;
                };
                let mut target_args = Vec::with_capacity(args.len());
                for (pred, value) in args {
                    let target_pred = self.mapped_block(pred);
                    let target_value = self.mapped(value)?;
                    self.target.block(target_block).add_phi_operand(target_phi, target_pred, target_value)?;
                    target_args.push((target_pred, target_value));
                }
                let loc = self.source.value(source_phi).location.clone();
                trivial_phi_eliminate(self.target, target_phi, &target_args, &loc)?;
            }
        }
        Ok(())
    }
}

/// Reverse-post-order over a finalized method's reachable blocks, per
/// §4.6 step 3 ("walk blocks in reverse-post-order").
fn reverse_post_order(method: &Method) -> Vec<BlockId> {
    let mut visited = vec![false; method.blocks.len()];
    let mut postorder = Vec::with_capacity(method.blocks.len());
    let mut stack = vec![(method.entry_block, 0usize)];
    visited[method.entry_block.index as usize] = true;

    while let Some((block, next_succ)) = stack.pop() {
        let successors = &method.block(block).successors;
        if next_succ < successors.len() {
            stack.push((block, next_succ + 1));
            let succ = successors[next_succ];
            if !visited[succ.index as usize] {
                visited[succ.index as usize] = true;
                stack.push((succ, 0));
            }
        } else {
            postorder.push(block);
        }
    }

    postorder.reverse();
    postorder
}
