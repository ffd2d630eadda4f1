//! C4 — the Construction API: a typed, location-aware factory over every
//! value kind, with the mandatory folds and peepholes of §4.4 applied
//! before a node ever reaches the block or the interner.
//!
//! Implemented as an `impl` block on [`BlockBuilder`] rather than a
//! separate type: every factory method needs both the append surface
//! (C2) and the per-method interner/type context (C3), and the block the
//! caller is currently filling in is always the right place for a freshly
//! folded node to land.

use log::{debug, trace};

use crate::block::BlockBuilder;
use crate::diagnostics::{IrError, IrResult};
use crate::kinds::{
    ArithmeticFlags, BinaryArithKind, CompareFlags, CompareKind, TernaryArithKind, UnaryArithKind,
};
use crate::location::Location;
use crate::types::{BasicValueType, TypeId};
use crate::value::{
    AtomicKind, BarrierKind, ConstantValue, MethodId, ShuffleKind, ValueId, ValueKind,
};

/// A phi under construction through the raw C4 surface (§4.4.7), distinct
/// from the incremental `(predecessor, value)` wiring the SSA builder (C5)
/// performs internally through [`BlockBuilder::add_phi_operand`]. Callers
/// that already know their predecessor list up front (e.g. the Rebuilder)
/// use this instead of going through C5.
pub struct PhiBuilder<'b, 'm, 'ctx> {
    block: &'b BlockBuilder<'m, 'ctx>,
    phi: ValueId,
    ty: TypeId,
    args: Vec<(crate::value::BlockId, ValueId)>,
}

impl<'b, 'm, 'ctx> PhiBuilder<'b, 'm, 'ctx> {
    pub fn phi_id(&self) -> ValueId {
        self.phi
    }

    pub fn ty(&self) -> TypeId {
        self.ty
    }

    pub fn add_argument(&mut self, predecessor: crate::value::BlockId, value: ValueId) -> IrResult<()> {
        self.block.add_phi_operand(self.phi, predecessor, value)?;
        self.args.push((predecessor, value));
        Ok(())
    }

    /// Finalizes the phi, attempting trivial-phi elimination (§4.5): if
    /// every argument is the same value (or the phi itself), the phi is
    /// replaced by that value and its id is returned in place of the phi.
    pub fn seal(self, location: &Location) -> IrResult<ValueId> {
        trivial_phi_eliminate(self.block.method(), self.phi, &self.args, location)
    }
}

/// Shared by [`PhiBuilder::seal`] and the SSA builder's own sealing path:
/// a phi whose non-self arguments all agree on one value collapses to
/// that value. Collapsing can make one of the phi's own users trivial in
/// turn (a user phi that only disagreed with itself through this phi), so
/// the elimination cascades through the phi's use-list rather than
/// stopping at the one phi it was asked to finalize.
pub(crate) fn trivial_phi_eliminate(
    method: &crate::method::MethodBuilder,
    phi: ValueId,
    args: &[(crate::value::BlockId, ValueId)],
    location: &Location,
) -> IrResult<ValueId> {
    let marker = method.context().new_node_marker();
    cascade_trivial_phi(method, phi, args, location, marker)
}

/// One step of the cascade, guarded by `marker` so a cyclic phi graph
/// (phis referencing each other around a loop header) cannot recurse
/// forever: each node is re-examined at most once per cascade.
fn cascade_trivial_phi(
    method: &crate::method::MethodBuilder,
    phi: ValueId,
    args: &[(crate::value::BlockId, ValueId)],
    location: &Location,
    marker: u64,
) -> IrResult<ValueId> {
    if method.mark_visited(phi, marker) {
        return Ok(phi);
    }

    let mut unique: Option<ValueId> = None;
    for (_, v) in args {
        let v = method.resolve(*v);
        if v == phi {
            continue;
        }
        match unique {
            None => unique = Some(v),
            Some(existing) if existing == v => {}
            Some(_) => return Ok(phi),
        }
    }
    match unique {
        Some(value) => {
            trace!("trivial phi {phi} collapses to {value}");
            method.replace(phi, value, location)?;
            for user in method.phi_users(phi) {
                let user = method.resolve(user);
                if let ValueKind::Phi { args: user_args } = method.value_kind(user) {
                    cascade_trivial_phi(method, user, &user_args, location, marker)?;
                }
            }
            Ok(value)
        }
        // A phi with no non-self arguments (a lone self-loop) stays a phi;
        // it has nothing else to collapse to.
        None => Ok(phi),
    }
}

fn is_power_of_two(n: i64) -> Option<u32> {
    let n = n.unsigned_abs();
    if n != 0 && n & (n - 1) == 0 {
        Some(n.trailing_zeros())
    } else {
        None
    }
}

impl<'m, 'ctx> BlockBuilder<'m, 'ctx> {
    fn constant_of(&self, id: ValueId) -> Option<ConstantValue> {
        match self.method().value_kind(id) {
            ValueKind::Constant(c) => Some(c),
            _ => None,
        }
    }

    fn bvt_of(&self, ty: TypeId) -> Option<BasicValueType> {
        self.method().types().as_basic_value_type(ty)
    }

    fn emit_pure(&self, ty: TypeId, location: Location, kind: ValueKind) -> IrResult<ValueId> {
        if kind.is_interned_eligible() {
            if let Some(existing) = self.method().lookup_interned(ty, &kind) {
                return Ok(existing);
            }
            let id = self.append(ty, location, kind.clone())?;
            self.method().insert_interned(ty, kind, id);
            Ok(id)
        } else {
            self.append(ty, location, kind)
        }
    }

    // ---- constants ----

    pub fn primitive_int(&self, location: Location, ty: TypeId, value: i64) -> IrResult<ValueId> {
        self.emit_pure(ty, location, ValueKind::Constant(ConstantValue::Int(value)))
    }

    pub fn primitive_float(&self, location: Location, ty: TypeId, value: f64) -> IrResult<ValueId> {
        self.emit_pure(ty, location, ValueKind::Constant(ConstantValue::Float(value)))
    }

    pub fn null(&self, location: Location, ty: TypeId) -> IrResult<ValueId> {
        self.emit_pure(ty, location, ValueKind::Null)
    }

    pub fn undef(&self, location: Location, ty: TypeId) -> IrResult<ValueId> {
        self.emit_pure(ty, location, ValueKind::Undef)
    }

    pub fn size_of(&self, location: Location, result_ty: TypeId, target: TypeId) -> IrResult<ValueId> {
        self.emit_pure(result_ty, location, ValueKind::SizeOf(target))
    }

    pub fn warp_size(&self, location: Location, ty: TypeId) -> IrResult<ValueId> {
        self.emit_pure(ty, location, ValueKind::WarpSize)
    }

    pub fn lane_idx(&self, location: Location, ty: TypeId) -> IrResult<ValueId> {
        self.emit_pure(ty, location, ValueKind::LaneIdx)
    }

    pub fn grid_dim(&self, location: Location, ty: TypeId, dim: u32) -> IrResult<ValueId> {
        self.emit_pure(ty, location, ValueKind::GridDim(dim))
    }

    pub fn group_dim(&self, location: Location, ty: TypeId, dim: u32) -> IrResult<ValueId> {
        self.emit_pure(ty, location, ValueKind::GroupDim(dim))
    }

    // ---- arithmetic (§4.4.1) ----

    pub fn unary(
        &self,
        location: Location,
        operand: ValueId,
        kind: UnaryArithKind,
        flags: ArithmeticFlags,
    ) -> IrResult<ValueId> {
        let operand = self.method().resolve(operand);
        let operand_ty = self.method().value_type(operand);
        let result_ty = match kind {
            UnaryArithKind::IsInfF | UnaryArithKind::IsNaNF => {
                self.method().types().get_primitive(BasicValueType::Int1)
            }
            _ => operand_ty,
        };

        // Not(Not(x)) -> x
        if kind == UnaryArithKind::Not {
            if let ValueKind::UnaryArith { kind: UnaryArithKind::Not, operand: inner, .. } =
                self.method().value_kind(operand)
            {
                return Ok(self.method().resolve(inner));
            }
            // Not(Compare(..)) -> Compare(invert(k), f')
            if let ValueKind::Compare { kind: ck, lhs, rhs, flags: cf } = self.method().value_kind(operand) {
                let lhs_bvt = self.bvt_of(self.method().value_type(lhs));
                let inverted_flags = if lhs_bvt.map(|b| b.is_float()).unwrap_or(false) {
                    cf | CompareFlags::UnorderedOrUnsigned
                } else {
                    cf
                };
                return self.compare(location, lhs, rhs, ck.invert(), inverted_flags);
            }
        }

        // Neg(x: Int1) -> Not(x)
        if kind == UnaryArithKind::Neg {
            if self.bvt_of(operand_ty) == Some(BasicValueType::Int1) {
                return self.unary(location, operand, UnaryArithKind::Not, flags);
            }
        }

        // Abs(x) with Unsigned flag -> x
        if kind == UnaryArithKind::Abs && flags.contains(ArithmeticFlags::Unsigned) {
            return Ok(operand);
        }

        if let Some(c) = self.constant_of(operand) {
            let folded = fold_unary(kind, c, flags);
            trace!("folded unary {kind:?}({c}) -> {folded}");
            return self.emit_pure(result_ty, location, ValueKind::Constant(folded));
        }

        self.emit_pure(
            result_ty,
            location,
            ValueKind::UnaryArith { kind, operand, flags },
        )
    }

    pub fn binary(
        &self,
        location: Location,
        lhs: ValueId,
        rhs: ValueId,
        kind: BinaryArithKind,
        flags: ArithmeticFlags,
    ) -> IrResult<ValueId> {
        let lhs = self.method().resolve(lhs);
        let rhs = self.method().resolve(rhs);
        let ty = self.method().value_type(lhs);
        let bvt = self.bvt_of(ty);
        let is_float = bvt.map(|b| b.is_float()).unwrap_or(false);

        if kind.forbidden_on_float() && is_float {
            return Err(IrError::unsupported(format!("{kind:?} is not defined on floating-point operands"), location));
        }
        if kind.requires_float() && !is_float {
            return Err(IrError::unsupported(format!("{kind:?} requires floating-point operands"), location));
        }

        // Div with left-constant 1.0 -> RcpF(right)
        if kind == BinaryArithKind::Div && is_float {
            if let Some(c) = self.constant_of(lhs) {
                if c.as_f64() == Some(1.0) {
                    return self.unary(location, rhs, UnaryArithKind::RcpF, flags);
                }
            }
        }

        // integer Mul/Div by a power of two -> Shl/Shr, sign of k flips
        // which. Signed Div declines the rewrite (Open Question: the
        // source's rounding for negative dividends is unspecified, and an
        // implementation that cannot guarantee round-toward-zero must
        // refuse rather than guess).
        if !is_float && matches!(kind, BinaryArithKind::Mul | BinaryArithKind::Div) {
            if let Some(k) = self.constant_of(rhs).and_then(ConstantValue::as_i64) {
                if let Some(shift) = is_power_of_two(k) {
                    let unsigned = flags.contains(ArithmeticFlags::Unsigned);
                    let negative = k < 0;
                    let decline = kind == BinaryArithKind::Div && !unsigned;
                    if !decline {
                        let shift_amount = self.primitive_int(location.clone(), ty, shift as i64)?;
                        let rewritten = match (kind, negative) {
                            (BinaryArithKind::Mul, false) => BinaryArithKind::Shl,
                            (BinaryArithKind::Mul, true) => BinaryArithKind::Shr,
                            (BinaryArithKind::Div, false) => BinaryArithKind::Shr,
                            (BinaryArithKind::Div, true) => BinaryArithKind::Shl,
                            _ => unreachable!(),
                        };
                        trace!("rewrote {kind:?} by 2^{shift} into {rewritten:?}");
                        return self.binary(location, lhs, shift_amount, rewritten, flags);
                    }
                    debug!(
                        "declining power-of-two Div rewrite at {location}: cannot prove round-to-zero for signed divisor"
                    );
                }
            }
        }

        // integer Add/Sub by 0 -> left
        if !is_float && matches!(kind, BinaryArithKind::Add | BinaryArithKind::Sub) {
            if let Some(c) = self.constant_of(rhs) {
                if c.as_i64() == Some(0) {
                    return Ok(lhs);
                }
            }
        }

        if let (Some(a), Some(b)) = (self.constant_of(lhs), self.constant_of(rhs)) {
            let folded = fold_binary(kind, a, b, flags);
            trace!("folded binary {lhs} {kind:?} {rhs} -> {folded}");
            return self.emit_pure(ty, location, ValueKind::Constant(folded));
        }

        self.emit_pure(ty, location, ValueKind::BinaryArith { kind, lhs, rhs, flags })
    }

    pub fn ternary(
        &self,
        location: Location,
        a: ValueId,
        b: ValueId,
        c: ValueId,
        kind: TernaryArithKind,
        flags: ArithmeticFlags,
    ) -> IrResult<ValueId> {
        let a = self.method().resolve(a);
        let b = self.method().resolve(b);
        let c = self.method().resolve(c);
        let (left, right) = kind.decompose();

        if self.constant_of(a).is_some() && self.constant_of(b).is_some() {
            trace!("decomposed ternary {kind:?} into {left:?} then {right:?}");
            let v = self.binary(location.clone(), a, b, left, flags)?;
            return self.binary(location, v, c, right, flags);
        }

        let ty = self.method().value_type(a);
        self.emit_pure(ty, location, ValueKind::TernaryArith { kind, a, b, c, flags })
    }

    pub fn compare(
        &self,
        location: Location,
        lhs: ValueId,
        rhs: ValueId,
        kind: CompareKind,
        flags: CompareFlags,
    ) -> IrResult<ValueId> {
        let lhs = self.method().resolve(lhs);
        let rhs = self.method().resolve(rhs);
        let i1 = self.method().types().get_primitive(BasicValueType::Int1);

        if let (Some(a), Some(b)) = (self.constant_of(lhs), self.constant_of(rhs)) {
            let result = fold_compare(kind, a, b, flags);
            trace!("folded compare {lhs} {kind:?} {rhs} -> {result}");
            return self.emit_pure(i1, location, ValueKind::Constant(ConstantValue::Int(result as i64)));
        }

        self.emit_pure(i1, location, ValueKind::Compare { kind, lhs, rhs, flags })
    }

    // ---- predicate / select (§4.4.2) ----

    pub fn predicate(&self, location: Location, cond: ValueId, on_true: ValueId, on_false: ValueId) -> IrResult<ValueId> {
        let cond = self.method().resolve(cond);
        let on_true = self.method().resolve(on_true);
        let mut on_false = self.method().resolve(on_false);

        let t_ty = self.method().value_type(on_true);
        let f_ty = self.method().value_type(on_false);
        if t_ty != f_ty {
            on_false = self.convert(location.clone(), on_false, t_ty)?;
        }

        if let Some(c) = self.constant_of(cond) {
            let chosen = if c.as_i64() == Some(1) { on_true } else { on_false };
            trace!("folded predicate on constant condition {cond} -> {chosen}");
            return Ok(chosen);
        }

        let both_int1 = self.bvt_of(t_ty) == Some(BasicValueType::Int1) && self.bvt_of(f_ty) == Some(BasicValueType::Int1);
        if both_int1 {
            if self.constant_of(on_true).and_then(ConstantValue::as_i64) == Some(1) {
                // cond ? true : f -> Or(cond, f)
                return self.binary(location, cond, on_false, BinaryArithKind::Or, ArithmeticFlags::NONE);
            }
            if self.constant_of(on_true).and_then(ConstantValue::as_i64) == Some(0) {
                // cond ? false : f -> And(Not(cond), f)
                let not_cond = self.unary(location.clone(), cond, UnaryArithKind::Not, ArithmeticFlags::NONE)?;
                return self.binary(location, not_cond, on_false, BinaryArithKind::And, ArithmeticFlags::NONE);
            }
            if self.constant_of(on_false).is_some() {
                // only f constant -> swap
                let not_cond = self.unary(location.clone(), cond, UnaryArithKind::Not, ArithmeticFlags::NONE)?;
                return self.predicate(location, not_cond, on_false, on_true);
            }
        }

        // cond is Not(x) -> Predicate(x, f, t)
        if let ValueKind::UnaryArith { kind: UnaryArithKind::Not, operand, .. } = self.method().value_kind(cond) {
            return self.predicate(location, operand, on_false, on_true);
        }

        self.emit_pure(t_ty, location, ValueKind::Predicate { cond, on_true, on_false })
    }

    /// A multi-way switch predicate collapses to [`BlockBuilder::predicate`]
    /// when it names exactly three values: the condition plus two cases
    /// (§4.4.2).
    pub fn switch_predicate(&self, location: Location, cond: ValueId, cases: &[ValueId]) -> IrResult<ValueId> {
        if cases.len() == 2 {
            self.predicate(location, cond, cases[0], cases[1])
        } else {
            Err(IrError::unsupported(
                "switch predicate collapse requires exactly two cases",
                location,
            ))
        }
    }

    // ---- conversions (§4.4.3) ----

    pub fn convert(&self, location: Location, operand: ValueId, target: TypeId) -> IrResult<ValueId> {
        let operand = self.method().resolve(operand);
        let source_ty = self.method().value_type(operand);
        if source_ty == target {
            return Ok(operand);
        }

        if let Some(c) = self.constant_of(operand) {
            let source_bvt = self.bvt_of(source_ty);
            let target_bvt = self.bvt_of(target);
            if let (Some(src), Some(dst)) = (source_bvt, target_bvt) {
                let folded = fold_convert(c, src, dst);
                trace!("folded convert {operand} ({src}) -> {folded} ({dst})");
                return self.emit_pure(target, location, ValueKind::Constant(folded));
            }
        }

        self.emit_pure(target, location, ValueKind::Convert { operand })
    }

    // ---- structures / arrays (§4.4.4) ----

    pub fn get_field(&self, location: Location, base: ValueId, index: usize) -> IrResult<ValueId> {
        let mut cur = self.method().resolve(base);
        loop {
            match self.method().value_kind(cur) {
                ValueKind::SetField { base: inner_base, index: set_index, value } => {
                    if set_index == index {
                        return Ok(self.method().resolve(value));
                    }
                    cur = self.method().resolve(inner_base);
                }
                ValueKind::Null => {
                    let struct_ty = self.method().value_type(cur);
                    let field_ty = self
                        .method()
                        .types()
                        .field_type(struct_ty, index)
                        .ok_or_else(|| IrError::unsupported("field index out of range", location.clone()))?;
                    return self.null(location, field_ty);
                }
                _ => {
                    let struct_ty = self.method().value_type(cur);
                    let field_ty = self
                        .method()
                        .types()
                        .field_type(struct_ty, index)
                        .ok_or_else(|| IrError::unsupported("field index out of range", location.clone()))?;
                    return self.emit_pure(field_ty, location, ValueKind::GetField { base: cur, index });
                }
            }
        }
    }

    pub fn set_field(&self, location: Location, base: ValueId, index: usize, value: ValueId) -> IrResult<ValueId> {
        let base = self.method().resolve(base);
        let value = self.method().resolve(value);
        let struct_ty = self.method().value_type(base);
        let expected = self
            .method()
            .types()
            .field_type(struct_ty, index)
            .ok_or_else(|| IrError::unsupported("field index out of range", location.clone()))?;
        let actual = self.method().value_type(value);
        if expected != actual {
            return Err(IrError::type_mismatch(expected, actual, location));
        }
        self.emit_pure(struct_ty, location, ValueKind::SetField { base, index, value })
    }

    pub fn get_field_chain(&self, location: Location, base: ValueId, chain: &[usize]) -> IrResult<ValueId> {
        let mut cur = base;
        for &index in chain {
            cur = self.get_field(location.clone(), cur, index)?;
        }
        Ok(cur)
    }

    pub fn set_field_chain(&self, location: Location, base: ValueId, chain: &[usize], value: ValueId) -> IrResult<ValueId> {
        if chain.is_empty() {
            return Ok(value);
        }
        if chain.len() == 1 {
            return self.set_field(location, base, chain[0], value);
        }
        let head = chain[0];
        let inner_base = self.get_field(location.clone(), base, head)?;
        let updated_inner = self.set_field_chain(location.clone(), inner_base, &chain[1..], value)?;
        self.set_field(location, base, head, updated_inner)
    }

    pub fn create_structure(&self, location: Location, ty: TypeId, fields: &[ValueId]) -> IrResult<ValueId> {
        let mut cur = self.null(location.clone(), ty)?;
        for (i, &f) in fields.iter().enumerate() {
            cur = self.set_field(location.clone(), cur, i, f)?;
        }
        Ok(cur)
    }

    pub fn create_array(&self, location: Location, element_ty: TypeId, extent: &[ValueId]) -> IrResult<TypeId> {
        if extent.len() >= 2 {
            return Err(IrError::unsupported(
                "multi-dimensional arrays are not yet supported",
                location,
            ));
        }
        Ok(self.method().types().create_array(element_ty, vec![extent.len() as u32]))
    }

    /// Left-fold of `Mul` over the extent's dimension components.
    pub fn array_length(&self, location: Location, extent: &[ValueId]) -> IrResult<ValueId> {
        let mut iter = extent.iter();
        let first = *iter
            .next()
            .ok_or_else(|| IrError::unsupported("array_length requires at least one dimension", location.clone()))?;
        let mut acc = self.method().resolve(first);
        for &dim in iter {
            acc = self.binary(location.clone(), acc, dim, BinaryArithKind::Mul, ArithmeticFlags::NONE)?;
        }
        self.emit_pure(
            self.method().value_type(acc),
            location,
            ValueKind::ArrayLength { extent: extent.to_vec() },
        )
    }

    /// Right-to-left fold of `MultiplyAdd(prev, extent[i+1], idx[i])`
    /// (§4.4.4); for a single dimension this is just `idx[0]`.
    pub fn array_address(&self, location: Location, indices: &[ValueId], extent: &[ValueId], offset: usize) -> IrResult<ValueId> {
        if extent.len() >= 2 {
            return Err(IrError::unsupported(
                "multi-dimensional array addressing is not yet supported",
                location,
            ));
        }
        if indices.is_empty() {
            return Err(IrError::unsupported("array_address requires at least one index", location));
        }
        let mut acc = self.method().resolve(indices[indices.len() - 1]);
        for i in (0..indices.len() - 1).rev() {
            acc = self.ternary(
                location.clone(),
                acc,
                extent[i + offset],
                indices[i],
                TernaryArithKind::MultiplyAdd,
                ArithmeticFlags::NONE,
            )?;
        }
        Ok(acc)
    }

    // ---- atomics / barriers / warp ops (§4.4.5) ----

    pub fn atomic(&self, location: Location, ptr: ValueId, val: ValueId, kind: AtomicKind, flags: ArithmeticFlags) -> IrResult<ValueId> {
        let ptr = self.method().resolve(ptr);
        let val = self.method().resolve(val);
        let ptr_ty = self.method().value_type(ptr);
        let pointee = self
            .method()
            .types()
            .resolve(ptr_ty);
        let result_ty = match pointee {
            crate::types::Type::Pointer { pointee, .. } => pointee,
            _ => return Err(IrError::unsupported("atomic requires a pointer operand", location)),
        };
        self.append(result_ty, location, ValueKind::Atomic { ptr, val, kind, flags })
    }

    pub fn atomic_cas(&self, location: Location, ptr: ValueId, val: ValueId, cmp: ValueId, flags: ArithmeticFlags) -> IrResult<ValueId> {
        let ptr = self.method().resolve(ptr);
        let val = self.method().resolve(val);
        let cmp = self.method().resolve(cmp);
        let val_ty = self.method().value_type(val);
        let cmp_ty = self.method().value_type(cmp);
        if val_ty != cmp_ty {
            return Err(IrError::type_mismatch(val_ty, cmp_ty, location));
        }
        self.append(val_ty, location, ValueKind::AtomicCas { ptr, val, cmp, flags })
    }

    pub fn barrier(&self, location: Location, none_ty: TypeId, kind: BarrierKind) -> IrResult<ValueId> {
        self.append(none_ty, location, ValueKind::Barrier { kind })
    }

    pub fn predicate_barrier(&self, location: Location, none_ty: TypeId, predicate: ValueId, kind: BarrierKind) -> IrResult<ValueId> {
        let predicate = self.method().resolve(predicate);
        self.append(none_ty, location, ValueKind::PredicateBarrier { predicate, kind })
    }

    pub fn broadcast(&self, location: Location, var: ValueId, origin: ValueId, kind: ShuffleKind) -> IrResult<ValueId> {
        let var = self.method().resolve(var);
        let origin = self.method().resolve(origin);
        let ty = self.method().value_type(var);
        self.append(ty, location, ValueKind::Broadcast { var, origin, kind })
    }

    pub fn warp_shuffle(&self, location: Location, var: ValueId, origin: ValueId, kind: ShuffleKind) -> IrResult<ValueId> {
        let var = self.method().resolve(var);
        let origin = self.method().resolve(origin);
        let ty = self.method().value_type(var);
        self.append(ty, location, ValueKind::WarpShuffle { var, origin, kind })
    }

    /// Collapses to [`BlockBuilder::warp_shuffle`] when `width` is the full
    /// warp-size constant (§4.4.5).
    pub fn sub_warp_shuffle(&self, location: Location, var: ValueId, origin: ValueId, width: ValueId, kind: ShuffleKind) -> IrResult<ValueId> {
        let width = self.method().resolve(width);
        if matches!(self.method().value_kind(width), ValueKind::WarpSize) {
            return self.warp_shuffle(location, var, origin, kind);
        }
        let var = self.method().resolve(var);
        let origin = self.method().resolve(origin);
        let ty = self.method().value_type(var);
        self.append(ty, location, ValueKind::SubWarpShuffle { var, origin, width, kind })
    }

    pub fn write_to_output(&self, location: Location, none_ty: TypeId, expressions: Vec<ValueId>, args: Vec<ValueId>) -> IrResult<ValueId> {
        self.append(none_ty, location, ValueKind::WriteToOutput { expressions, args })
    }

    pub fn call(&self, location: Location, result_ty: TypeId, target: MethodId, args: Vec<ValueId>) -> IrResult<ValueId> {
        let args = args.into_iter().map(|a| self.method().resolve(a)).collect();
        self.append(result_ty, location, ValueKind::Call { target, args })
    }

    // ---- phis (§4.4.7) ----

    pub fn phi<'b>(&'b self, location: Location, ty: TypeId) -> IrResult<PhiBuilder<'b, 'm, 'ctx>> {
        let id = self.create_phi(ty, location)?;
        Ok(PhiBuilder { block: self, phi: id, ty, args: Vec::new() })
    }

    // ---- terminators (§4.4.6) ----

    pub fn ret(&self, location: Location, return_ty: TypeId, value: Option<ValueId>) -> IrResult<ValueId> {
        let value = match value {
            Some(v) => {
                let v = self.method().resolve(v);
                let actual = self.method().value_type(v);
                if actual != return_ty {
                    return Err(IrError::type_mismatch(return_ty, actual, location));
                }
                Some(v)
            }
            None => None,
        };
        self.set_terminator(ValueKind::Return(value), location)
    }

    pub fn branch(&self, location: Location, target: crate::value::BlockId) -> IrResult<ValueId> {
        self.set_terminator(ValueKind::Branch(target), location)
    }

    pub fn if_branch(&self, location: Location, cond: ValueId, on_true: crate::value::BlockId, on_false: crate::value::BlockId) -> IrResult<ValueId> {
        let cond = self.method().resolve(cond);
        self.set_terminator(ValueKind::IfBranch { cond, on_true, on_false }, location)
    }

    /// A switch with exactly two targets collapses to
    /// `IfBranch(Equal(value, 0), targets[0], targets[1])` (§4.4.6).
    pub fn switch_branch(&self, location: Location, value: ValueId, targets: Vec<crate::value::BlockId>) -> IrResult<ValueId> {
        let value = self.method().resolve(value);
        if targets.len() == 2 {
            trace!("collapsed two-target switch on {value} into an if-branch");
            let value_ty = self.method().value_type(value);
            let zero = self.primitive_int(location.clone(), value_ty, 0)?;
            let cond = self.compare(location.clone(), value, zero, CompareKind::Equal, CompareFlags::NONE)?;
            return self.if_branch(location, cond, targets[0], targets[1]);
        }
        self.set_terminator(ValueKind::SwitchBranch { value, targets }, location)
    }
}

fn fold_unary(kind: UnaryArithKind, operand: ConstantValue, flags: ArithmeticFlags) -> ConstantValue {
    match (kind, operand) {
        (UnaryArithKind::Neg, ConstantValue::Int(i)) => ConstantValue::Int(i.wrapping_neg()),
        (UnaryArithKind::Neg, ConstantValue::Float(f)) => ConstantValue::Float(-f),
        (UnaryArithKind::Not, ConstantValue::Int(i)) => ConstantValue::Int(!i),
        (UnaryArithKind::Abs, ConstantValue::Int(i)) => {
            ConstantValue::Int(if i == i64::MIN { i64::MIN } else { i.wrapping_abs() })
        }
        (UnaryArithKind::Abs, ConstantValue::Float(f)) => ConstantValue::Float(f.abs()),
        (UnaryArithKind::RcpF, ConstantValue::Float(f)) => ConstantValue::Float(1.0 / f),
        (UnaryArithKind::IsInfF, ConstantValue::Float(f)) => ConstantValue::Int(f.is_infinite() as i64),
        (UnaryArithKind::IsNaNF, ConstantValue::Float(f)) => ConstantValue::Int(f.is_nan() as i64),
        (UnaryArithKind::Sqrt, ConstantValue::Float(f)) => ConstantValue::Float(f.sqrt()),
        (UnaryArithKind::SinF, ConstantValue::Float(f)) => ConstantValue::Float(f.sin()),
        (UnaryArithKind::CosF, ConstantValue::Float(f)) => ConstantValue::Float(f.cos()),
        (UnaryArithKind::ExpF, ConstantValue::Float(f)) => ConstantValue::Float(f.exp()),
        (UnaryArithKind::LogF, ConstantValue::Float(f)) => ConstantValue::Float(f.ln()),
        (_, c) => {
            let _ = flags;
            c
        }
    }
}

fn fold_binary(kind: BinaryArithKind, lhs: ConstantValue, rhs: ConstantValue, flags: ArithmeticFlags) -> ConstantValue {
    let unsigned = flags.contains(ArithmeticFlags::Unsigned);
    match (lhs, rhs) {
        (ConstantValue::Int(a), ConstantValue::Int(b)) => {
            let result = match kind {
                BinaryArithKind::Add => a.wrapping_add(b),
                BinaryArithKind::Sub => a.wrapping_sub(b),
                BinaryArithKind::Mul => a.wrapping_mul(b),
                BinaryArithKind::Div => {
                    if b == 0 {
                        0
                    } else if unsigned {
                        ((a as u64) / (b as u64)) as i64
                    } else {
                        a.wrapping_div(b)
                    }
                }
                BinaryArithKind::Rem => {
                    if b == 0 {
                        0
                    } else if unsigned {
                        ((a as u64) % (b as u64)) as i64
                    } else {
                        a.wrapping_rem(b)
                    }
                }
                BinaryArithKind::And => a & b,
                BinaryArithKind::Or => a | b,
                BinaryArithKind::Xor => a ^ b,
                BinaryArithKind::Shl => a.wrapping_shl(b as u32),
                BinaryArithKind::Shr => {
                    if unsigned {
                        ((a as u64) >> (b as u64)) as i64
                    } else {
                        a.wrapping_shr(b as u32)
                    }
                }
                BinaryArithKind::Min => {
                    if unsigned {
                        (a as u64).min(b as u64) as i64
                    } else {
                        a.min(b)
                    }
                }
                BinaryArithKind::Max => {
                    if unsigned {
                        (a as u64).max(b as u64) as i64
                    } else {
                        a.max(b)
                    }
                }
                BinaryArithKind::PowF | BinaryArithKind::Atan2F => a,
            };
            ConstantValue::Int(result)
        }
        (ConstantValue::Float(a), ConstantValue::Float(b)) => {
            let result = match kind {
                BinaryArithKind::Add => a + b,
                BinaryArithKind::Sub => a - b,
                BinaryArithKind::Mul => a * b,
                BinaryArithKind::Div => a / b,
                BinaryArithKind::Rem => a % b,
                BinaryArithKind::Min => a.min(b),
                BinaryArithKind::Max => a.max(b),
                BinaryArithKind::PowF => a.powf(b),
                BinaryArithKind::Atan2F => a.atan2(b),
                BinaryArithKind::And | BinaryArithKind::Or | BinaryArithKind::Xor | BinaryArithKind::Shl | BinaryArithKind::Shr => a,
            };
            ConstantValue::Float(result)
        }
        (a, _) => a,
    }
}

fn fold_compare(kind: CompareKind, lhs: ConstantValue, rhs: ConstantValue, flags: CompareFlags) -> bool {
    let unsigned = flags.contains(CompareFlags::Unsigned);
    match (lhs, rhs) {
        (ConstantValue::Int(a), ConstantValue::Int(b)) => {
            let ord = if unsigned { (a as u64).cmp(&(b as u64)) } else { a.cmp(&b) };
            match kind {
                CompareKind::Equal => ord == std::cmp::Ordering::Equal,
                CompareKind::NotEqual => ord != std::cmp::Ordering::Equal,
                CompareKind::Less => ord == std::cmp::Ordering::Less,
                CompareKind::LessEqual => ord != std::cmp::Ordering::Greater,
                CompareKind::Greater => ord == std::cmp::Ordering::Greater,
                CompareKind::GreaterEqual => ord != std::cmp::Ordering::Less,
            }
        }
        (ConstantValue::Float(a), ConstantValue::Float(b)) => match kind {
            CompareKind::Equal => a == b,
            CompareKind::NotEqual => a != b,
            CompareKind::Less => a < b,
            CompareKind::LessEqual => a <= b,
            CompareKind::Greater => a > b,
            CompareKind::GreaterEqual => a >= b,
        },
        _ => false,
    }
}

fn fold_convert(value: ConstantValue, source: BasicValueType, target: BasicValueType) -> ConstantValue {
    match (value, target.is_float()) {
        (ConstantValue::Int(i), false) => {
            let bits = target.bit_width().max(1);
            let mask = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
            let truncated = (i as u64) & mask;
            ConstantValue::Int(truncated as i64)
        }
        (ConstantValue::Int(i), true) => ConstantValue::Float(i as f64),
        (ConstantValue::Float(f), true) => ConstantValue::Float(f),
        (ConstantValue::Float(f), false) => {
            let _ = source;
            ConstantValue::Int(f.trunc() as i64)
        }
    }
}
