//! C5 — the SSA builder, adapted from Braun, Buchwald, Hack, "Simple and
//! Efficient Construction of Static Single Assignment Form": per-block
//! variable caches, incomplete phis recorded against unsealed blocks, and
//! block sealing that finalizes them once every predecessor is known.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::builder::trivial_phi_eliminate;
use crate::diagnostics::{IrError, IrResult};
use crate::location::Location;
use crate::method::MethodBuilder;
use crate::value::{BlockId, ValueId};

/// A source-level mutable variable name, as the front end names it. Opaque
/// to this crate beyond identity and ordering (used only as a map key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variable(String);

impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Variable {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A phi inserted into an unsealed block, whose argument list is deferred
/// until the block is sealed (§4.5's "IncompletePhi").
struct IncompletePhi {
    var: Variable,
    phi: ValueId,
}

/// Per-method SSA construction state. Lives alongside a [`MethodBuilder`]
/// for as long as the front end is still emitting mutable-variable reads
/// and writes; `seal_remaining_blocks` is expected to run once at the end
/// of construction (§4.5).
pub struct SsaBuilder<'m, 'ctx> {
    method: &'m MethodBuilder<'ctx>,
    values: RefCell<HashMap<(BlockId, Variable), ValueId>>,
    incomplete_phis: RefCell<HashMap<BlockId, Vec<IncompletePhi>>>,
}

impl<'m, 'ctx> SsaBuilder<'m, 'ctx> {
    pub fn new(method: &'m MethodBuilder<'ctx>) -> Self {
        Self {
            method,
            values: RefCell::new(HashMap::new()),
            incomplete_phis: RefCell::new(HashMap::new()),
        }
    }

    pub fn method(&self) -> &'m MethodBuilder<'ctx> {
        self.method
    }

    /// Updates `block`'s local cache for `var` (§4.5: `set_value`).
    pub fn set_value(&self, block: BlockId, var: &Variable, value: ValueId) {
        let value = self.method.resolve(value);
        self.values.borrow_mut().insert((block, var.clone()), value);
    }

    /// Reads `var` as observed at the end of `block`, inserting phis on
    /// demand across unsealed joins (§4.5: `get_value`).
    pub fn get_value(&self, block: BlockId, var: &Variable) -> IrResult<ValueId> {
        if let Some(v) = self.values.borrow().get(&(block, var.clone())).copied() {
            return Ok(self.method.resolve(v));
        }
        self.get_value_recursive(block, var)
    }

    fn get_value_recursive(&self, block: BlockId, var: &Variable) -> IrResult<ValueId> {
        let preds = self.method.predecessors(block);

        if self.method.is_sealed(block) && preds.len() == 1 {
            let value = self.get_value(preds[0], var)?;
            self.set_value(block, var, value);
            return Ok(value);
        }

        let ty = self.phi_type_hint(var)?;
        let phi = self.method.block(block).create_phi(ty, Location::unknown())?;
        self.set_value(block, var, phi);

        if self.method.is_sealed(block) {
            let value = self.setup_phi_arguments(block, var, phi)?;
            self.set_value(block, var, value);
            Ok(value)
        } else {
            self.incomplete_phis
                .borrow_mut()
                .entry(block)
                .or_default()
                .push(IncompletePhi { var: var.clone(), phi });
            Ok(phi)
        }
    }

    /// A freshly inserted phi has no declared type of its own yet; this
    /// crate requires callers to carry a type through `Variable` lookups
    /// indirectly, by having already defined the variable at least once
    /// reachable from entry. If no definition reaches `block` at all, the
    /// read is genuinely uninitialized (§7: `NotInitialized`).
    fn phi_type_hint(&self, var: &Variable) -> IrResult<crate::types::TypeId> {
        for (key, value) in self.values.borrow().iter() {
            if key.1 == *var {
                return Ok(self.method.value_type(*value));
            }
        }
        Err(IrError::not_initialized(var.as_str(), Location::unknown()))
    }

    /// Wires a phi's operands from every predecessor, converting
    /// mismatched primitive types in the predecessor's own block, then
    /// attempts trivial-phi elimination (§4.5).
    fn setup_phi_arguments(&self, block: BlockId, var: &Variable, phi: ValueId) -> IrResult<ValueId> {
        let preds = self.method.predecessors(block);
        let phi_ty = self.method.value_type(phi);
        let mut args = Vec::with_capacity(preds.len());

        for pred in preds {
            let mut v = self.get_value(pred, var)?;
            let v_ty = self.method.value_type(v);
            if v_ty != phi_ty && self.method.types().is_primitive(phi_ty) && self.method.types().is_primitive(v_ty) {
                v = self
                    .method
                    .block(pred)
                    .append_before_terminator(phi_ty, Location::unknown(), crate::value::ValueKind::Convert { operand: v })?;
            }
            self.method.block(block).add_phi_operand(phi, pred, v)?;
            args.push((pred, v));
        }

        trivial_phi_eliminate(self.method, phi, &args, &Location::unknown())
    }

    /// Seals `block`: permitted once every predecessor is processed or
    /// sealed. Finalizes its incomplete phis and eagerly re-tests
    /// successors for sealing (§4.5).
    pub fn seal(&self, block: BlockId) -> IrResult<()> {
        if self.method.is_sealed(block) {
            return Ok(());
        }
        for pred in self.method.predecessors(block) {
            if !(self.method.is_processed(pred) || self.method.is_sealed(pred)) {
                return Err(IrError::unsupported(
                    format!("cannot seal {block}: predecessor {pred} is neither processed nor sealed"),
                    Location::unknown(),
                ));
            }
        }

        self.method.mark_sealed(block);

        let pending = self.incomplete_phis.borrow_mut().remove(&block).unwrap_or_default();
        for incomplete in pending {
            let value = self.setup_phi_arguments(block, &incomplete.var, incomplete.phi)?;
            self.set_value(block, &incomplete.var, value);
        }

        for succ in self.method.successors(block) {
            if !self.method.is_sealed(succ) {
                let _ = self.seal(succ);
            }
        }
        Ok(())
    }

    /// Seals every remaining unsealed block, closing any back edges left
    /// open by loop headers (§4.5: `seal_remaining_blocks`).
    pub fn seal_remaining_blocks(&self) -> IrResult<()> {
        loop {
            let unsealed: Vec<BlockId> = self
                .method
                .all_block_ids()
                .into_iter()
                .filter(|b| !self.method.is_sealed(*b))
                .collect();
            if unsealed.is_empty() {
                return Ok(());
            }
            let before = unsealed.len();
            for block in unsealed {
                let _ = self.seal(block);
            }
            let remaining = self
                .method
                .all_block_ids()
                .into_iter()
                .filter(|b| !self.method.is_sealed(*b))
                .count();
            if remaining == before {
                // No progress this pass: the remaining blocks are
                // unreachable or have predecessors that will never be
                // processed. Force-seal them so no phi is left pending.
                let stuck: Vec<BlockId> = self
                    .method
                    .all_block_ids()
                    .into_iter()
                    .filter(|b| !self.method.is_sealed(*b))
                    .collect();
                for block in stuck {
                    self.method.mark_sealed(block);
                    let pending = self.incomplete_phis.borrow_mut().remove(&block).unwrap_or_default();
                    for incomplete in pending {
                        let value = self.setup_phi_arguments(block, &incomplete.var, incomplete.phi)?;
                        self.set_value(block, &incomplete.var, value);
                    }
                }
                return Ok(());
            }
        }
    }
}

/// Convenience used by front ends that model a variable's declared type
/// directly rather than inferring it from a prior definition: seeds the
/// SSA cache for `block` without going through the phi path.
pub fn define_initial(ssa: &SsaBuilder, block: BlockId, var: &Variable, value: ValueId) {
    ssa.set_value(block, var, value);
}
